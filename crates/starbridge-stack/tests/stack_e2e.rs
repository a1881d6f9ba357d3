//! End-to-end tests for the connection ceremony and channel lifecycle,
//! running two stacks against each other over loopback TCP.

use bytes::Bytes;
use starbridge_proto::{Frame, CONTROL_CHANNEL, CONTROL_IV, FIRST_DATA_CHANNEL, GREETING_CHANNEL};
use starbridge_stack::{ChannelCipher, Stack, StackConfig, StackError, StackListener};
use starbridge_transport::{callback_fn, ChannelEndpoint, MessageSink, MessageSource, TcpServer};
use std::time::Duration;

const FILTER_KEY: &str = "observatory";
const ENC_KEY: [u8; 16] = *b"sixteen byte key";

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init()
        .ok();
}

/// Bring up a served listener and a connected client stack over loopback.
async fn connected_pair(config: StackConfig) -> (Stack, Stack) {
    let listener = StackListener::bind(0, FILTER_KEY).await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server_config = config.clone();
    let server_task =
        tokio::spawn(async move { listener.accept(&ENC_KEY, server_config).await.unwrap() });

    let client = Stack::establish_connection("127.0.0.1", port, FILTER_KEY, &ENC_KEY, config)
        .await
        .unwrap();
    let server = server_task.await.unwrap();
    (client, server)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_establish_open_channel_and_echo() {
    init_tracing();
    let (client, server) = connected_pair(StackConfig::default()).await;

    let (id, channel) = client.create_new_channel().await.unwrap();
    assert_eq!(id, FIRST_DATA_CHANNEL);

    // The peer holds its own channel object for the same id by now.
    server.open_channel(id).unwrap();
    server
        .register_channel(id, callback_fn(|data| async move { Ok(data) }))
        .unwrap();

    let reply = channel.send_receive(id, b"ping").await.unwrap();
    assert_eq!(reply, b"ping");

    // Round trips are byte-exact for binary payloads too.
    let payload: Vec<u8> = (0..=255).collect();
    let reply = channel.send_receive(id, &payload).await.unwrap();
    assert_eq!(reply, payload);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_wrong_greeting_is_protocol_violation() {
    init_tracing();
    let server = TcpServer::bind(0, FILTER_KEY).await.unwrap();
    let port = server.local_addr().unwrap().port();

    tokio::spawn(async move {
        let transport = server.accept().await.unwrap();
        let (mut sink, mut source) = transport.into_split();

        let frame = Frame::decode(source.recv().await.unwrap().unwrap()).unwrap();
        assert_eq!(frame.channel, GREETING_CHANNEL);

        sink.send(Frame::new(GREETING_CHANNEL, Bytes::from_static(b"NOPE")).encode())
            .await
            .unwrap();
        // Keep the connection open so the client fails on content, not EOF.
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let err = Stack::establish_connection(
        "127.0.0.1",
        port,
        FILTER_KEY,
        &ENC_KEY,
        StackConfig::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, StackError::ProtocolViolation(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_wrong_handshake_echo_is_fatal() {
    init_tracing();
    let server = TcpServer::bind(0, FILTER_KEY).await.unwrap();
    let port = server.local_addr().unwrap().port();

    tokio::spawn(async move {
        let transport = server.accept().await.unwrap();
        let (mut sink, mut source) = transport.into_split();

        let frame = Frame::decode(source.recv().await.unwrap().unwrap()).unwrap();
        assert_eq!(frame.channel, GREETING_CHANNEL);
        sink.send(Frame::new(GREETING_CHANNEL, Bytes::from_static(b"WNS-S")).encode())
            .await
            .unwrap();

        // Answer the handshake with a valid ciphertext of the wrong bytes.
        let frame = Frame::decode(source.recv().await.unwrap().unwrap()).unwrap();
        assert_eq!(frame.channel, CONTROL_CHANNEL);
        let cipher = ChannelCipher::new(&ENC_KEY, &CONTROL_IV).unwrap();
        sink.send(Frame::new(CONTROL_CHANNEL, cipher.encrypt(b"WRONG")).encode())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let err = Stack::establish_connection(
        "127.0.0.1",
        port,
        FILTER_KEY,
        &ENC_KEY,
        StackConfig::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, StackError::HandshakeFailed));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_close_channel_tears_down_both_sides() {
    init_tracing();
    let config = StackConfig {
        request_timeout: Some(Duration::from_millis(500)),
    };
    let (client, server) = connected_pair(config).await;

    let (id, channel) = client.create_new_channel().await.unwrap();
    server
        .register_channel(id, callback_fn(|data| async move { Ok(data) }))
        .unwrap();
    assert_eq!(channel.send_receive(id, b"up").await.unwrap(), b"up");

    client.close_channel(id).await.unwrap();

    // The channel is gone from both tables.
    assert!(matches!(
        client.open_channel(id),
        Err(StackError::UnknownChannel(_))
    ));
    assert!(matches!(
        server.open_channel(id),
        Err(StackError::UnknownChannel(_))
    ));

    // A stale handle gets no answer: the peer has nothing routed on the
    // id anymore, so the call times out instead of round-tripping.
    assert!(channel.send_receive(id, b"ghost").await.is_err());

    // The connection itself is still healthy.
    let (id2, channel2) = client.create_new_channel().await.unwrap();
    assert_eq!(id2, id + 1);
    server
        .register_channel(id2, callback_fn(|data| async move { Ok(data) }))
        .unwrap();
    assert_eq!(channel2.send_receive(id2, b"next").await.unwrap(), b"next");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_channels_are_independent() {
    init_tracing();
    let (client, server) = connected_pair(StackConfig::default()).await;

    let (slow_id, slow_channel) = client.create_new_channel().await.unwrap();
    let (fast_id, fast_channel) = client.create_new_channel().await.unwrap();

    server
        .register_channel(
            slow_id,
            callback_fn(|data| async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok(data)
            }),
        )
        .unwrap();
    server
        .register_channel(fast_id, callback_fn(|data| async move { Ok(data) }))
        .unwrap();

    let slow = tokio::spawn(async move { slow_channel.send_receive(slow_id, b"slow").await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = std::time::Instant::now();
    let reply = fast_channel.send_receive(fast_id, b"fast").await.unwrap();
    assert_eq!(reply, b"fast");
    assert!(
        started.elapsed() < Duration::from_millis(200),
        "fast channel serialized behind the slow one"
    );

    assert_eq!(slow.await.unwrap().unwrap(), b"slow");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_key_length_is_validated() {
    init_tracing();
    let listener = StackListener::bind(0, FILTER_KEY).await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let err = Stack::establish_connection(
        "127.0.0.1",
        port,
        FILTER_KEY,
        &[0u8; 20],
        StackConfig::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, StackError::Crypto(_)));
}
