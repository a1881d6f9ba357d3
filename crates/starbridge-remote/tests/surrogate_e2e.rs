//! End-to-end surrogate test: an image served on one stack, its
//! descriptor shipped over a data channel, and the peer's proxy observing
//! live state across real loopback TCP.

use starbridge_remote::{
    generate_surrogate_pair, unpack_surrogate, ImageSurrogate, Region, SkyImage,
};
use starbridge_stack::{Stack, StackConfig, StackListener};
use starbridge_transport::{callback_fn, ChannelEndpoint};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

const FILTER_KEY: &str = "survey-night-7";
const ENC_KEY: [u8; 16] = *b"starbridge aes k";

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init()
        .ok();
}

async fn connected_pair() -> (Stack, Stack) {
    let listener = StackListener::bind(0, FILTER_KEY).await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server_task = tokio::spawn(async move {
        listener
            .accept(&ENC_KEY, StackConfig::default())
            .await
            .unwrap()
    });
    let client = Stack::establish_connection(
        "127.0.0.1",
        port,
        FILTER_KEY,
        &ENC_KEY,
        StackConfig::default(),
    )
    .await
    .unwrap();
    (client, server_task.await.unwrap())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_surrogate_crosses_the_wire_and_tracks_live_state() {
    init_tracing();
    let (client, server) = connected_pair().await;

    // The image lives on the connecting side, which is also the side
    // allowed to allocate channel ids.
    let mut image = SkyImage::new(32, 32);
    for y in 0..32 {
        for x in 0..32 {
            image.set(x, y, (y * 32 + x) as f64);
        }
    }
    let image = Arc::new(RwLock::new(image));

    // A plain data channel carries the descriptor bytes to the peer.
    let (descriptor_channel, descriptor_endpoint) = client.create_new_channel().await.unwrap();
    let (descriptor_tx, mut descriptor_rx) = mpsc::channel::<Vec<u8>>(1);
    server
        .register_channel(
            descriptor_channel,
            callback_fn(move |bytes| {
                let descriptor_tx = descriptor_tx.clone();
                async move {
                    descriptor_tx.send(bytes).await.ok();
                    Ok(b"ack".to_vec())
                }
            }),
        )
        .unwrap();

    let surrogate = generate_surrogate_pair(&client, image.clone()).await.unwrap();
    let ack = descriptor_endpoint
        .send_receive(descriptor_channel, &surrogate.to_bytes().unwrap())
        .await
        .unwrap();
    assert_eq!(ack, b"ack");

    // The peer reconstructs the proxy from the received bytes alone.
    let received = ImageSurrogate::from_bytes(&descriptor_rx.recv().await.unwrap()).unwrap();
    assert_eq!(received, surrogate);
    let proxy = unpack_surrogate(&server, &received).unwrap();

    let metadata = proxy.metadata().await.unwrap();
    assert_eq!((metadata.width, metadata.height), (32, 32));

    // Reads reflect the host image.
    let region = Region::new(4, 4, 3, 2);
    let pixels = proxy.read_region(region).await.unwrap();
    assert_eq!(
        pixels,
        vec![132.0, 133.0, 134.0, 164.0, 165.0, 166.0]
    );

    // A host-side mutation is visible on the next call: live state, not a
    // snapshot.
    image.write().await.set(4, 4, -7.5);
    let pixels = proxy.read_region(region).await.unwrap();
    assert_eq!(pixels[0], -7.5);

    // Writes through the proxy land in the host image and read back.
    let readback = proxy
        .write_region(Region::new(0, 0, 2, 1), vec![1.5, 2.5])
        .await
        .unwrap();
    assert_eq!(readback, vec![1.5, 2.5]);
    assert_eq!(image.read().await.get(0, 0), Some(1.5));
    assert_eq!(image.read().await.get(1, 0), Some(2.5));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_proxy_dies_with_its_channel() {
    init_tracing();
    let (client, server) = connected_pair().await;

    let image = Arc::new(RwLock::new(SkyImage::new(8, 8)));
    let surrogate = generate_surrogate_pair(&client, image).await.unwrap();

    // Peer side sees the channel and can build a proxy for it.
    let proxy = unpack_surrogate(&server, &surrogate).unwrap();
    assert!(proxy.metadata().await.is_ok());

    client.close_channel(surrogate.channel).await.unwrap();

    // The channel is gone on both sides now.
    assert!(unpack_surrogate(&server, &surrogate).is_err());
    assert!(unpack_surrogate(&client, &surrogate).is_err());
}
