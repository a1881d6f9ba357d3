//! Example: serving a live image to a peer by reference
//!
//! Runs both halves in one process:
//! 1. A listening stack (the "compute node") waits on loopback
//! 2. A connecting stack (the "observer") holds a large image in memory
//! 3. The observer serves the image on a fresh channel and ships the
//!    surrogate descriptor over a plain data channel
//! 4. The compute node unpacks a proxy and reads regions of the image
//!    as if it were local, seeing live mutations
//!
//! Run this example:
//! ```bash
//! cargo run --example image_relay
//! ```

use starbridge::{
    callback_fn, generate_surrogate_pair, unpack_surrogate, ChannelEndpoint, ImageSurrogate,
    Region, SkyImage, Stack, StackConfig, StackListener,
};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

const FILTER_KEY: &str = "demo-filter-key";
const ENC_KEY: [u8; 16] = *b"demo channel key";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("Starbridge image relay demo");
    println!("===========================\n");

    // Step 1: compute node listens on an ephemeral loopback port.
    let listener = StackListener::bind(0, FILTER_KEY).await?;
    let port = listener.local_addr()?.port();
    println!("Compute node listening on 127.0.0.1:{port}");

    let compute = tokio::spawn(async move {
        listener.accept(&ENC_KEY, StackConfig::default()).await
    });

    // Step 2: observer connects and runs the greeting and handshake.
    let observer =
        Stack::establish_connection("127.0.0.1", port, FILTER_KEY, &ENC_KEY, StackConfig::default())
            .await?;
    let compute = compute.await??;
    println!("Connection established, handshake complete");

    // Step 3: the observer fills a synthetic star field.
    let mut image = SkyImage::new(256, 256);
    for y in 0..256u32 {
        for x in 0..256u32 {
            image.set(x, y, ((x * 7 + y * 13) % 100) as f64 / 100.0);
        }
    }
    image.set(128, 128, 42.0); // a bright source
    let image = Arc::new(RwLock::new(image));

    // A plain channel carries the descriptor bytes to the compute node.
    let (descriptor_channel, descriptor_endpoint) = observer.create_new_channel().await?;
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(1);
    compute.register_channel(
        descriptor_channel,
        callback_fn(move |bytes| {
            let tx = tx.clone();
            async move {
                tx.send(bytes).await.ok();
                Ok(b"ack".to_vec())
            }
        }),
    )?;

    let surrogate = generate_surrogate_pair(&observer, image.clone()).await?;
    descriptor_endpoint
        .send_receive(descriptor_channel, &surrogate.to_bytes()?)
        .await?;
    println!(
        "Observer serves a {}x{} image on channel {}",
        surrogate.metadata.width, surrogate.metadata.height, surrogate.channel
    );

    // Step 4: the compute node works on the image by reference.
    let received = ImageSurrogate::from_bytes(&rx.recv().await.expect("descriptor"))?;
    let proxy = unpack_surrogate(&compute, &received)?;

    let metadata = proxy.metadata().await?;
    println!("Compute node sees a {}x{} image", metadata.width, metadata.height);

    let cutout = proxy.read_region(Region::new(127, 127, 3, 3)).await?;
    println!("Cutout around the bright source: {cutout:?}");

    // The observer keeps mutating; the proxy sees it live.
    image.write().await.set(128, 128, 0.0);
    let cutout = proxy.read_region(Region::new(127, 127, 3, 3)).await?;
    println!("After the source faded:         {cutout:?}");

    observer.close_channel(surrogate.channel).await?;
    println!("\nChannel closed, demo done");
    Ok(())
}
