// SPDX-License-Identifier: MIT OR Apache-2.0
//! Socket send/receive paths of `ByteBuffer` over a connected Unix pair.

use std::io::ErrorKind;
use std::time::Duration;

use bridge_buffer::{BridgeStream, ByteBuffer, Endpoint};
use tokio::io::{AsyncWriteExt, Interest};
use tokio::net::{TcpListener, UnixListener, UnixStream};

// -- 1. send_fully then receive_from exactly the sent count --
#[tokio::test]
async fn send_fully_and_receive_exact() {
    let (a, b) = UnixStream::pair().unwrap();
    let mut a = BridgeStream::from(a);
    let mut b = BridgeStream::from(b);

    let mut out = ByteBuffer::new();
    out.append_i32(7);
    out.append_string("payload").unwrap();
    let expected = out.to_vec();
    out.send_fully(&mut a).await.unwrap();
    assert!(out.is_empty());

    let mut inbound = ByteBuffer::with_capacity(2);
    inbound.receive_from(&mut b, expected.len()).await.unwrap();
    assert_eq!(inbound.as_slice(), expected.as_slice());
    assert_eq!(inbound.read_i32().unwrap(), 7);
    assert_eq!(inbound.read_string().unwrap(), "payload");
}

// -- 2. receive_from reports EOF when the peer closes early --
#[tokio::test]
async fn receive_from_short_stream_is_eof() {
    let (mut a, mut b) = UnixStream::pair().unwrap();
    a.write_all(&[1, 2, 3]).await.unwrap();
    drop(a);

    let mut inbound = ByteBuffer::new();
    let err = inbound.receive_from(&mut b, 8).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    assert_eq!(inbound.as_slice(), &[1, 2, 3]);
}

// -- 3. send_once is non-blocking and keeps the remainder --
#[tokio::test]
async fn send_once_keeps_unsent_bytes() {
    let (a, b) = UnixStream::pair().unwrap();
    let a = BridgeStream::from(a);
    let b = BridgeStream::from(b);

    // Large enough that the socket buffer cannot take it in one go.
    let mut out = ByteBuffer::from(vec![0xAB; 4 * 1024 * 1024]);
    a.ready(Interest::WRITABLE).await.unwrap();
    let sent = out.send_once(&a).unwrap();
    assert!(sent > 0);
    assert_eq!(out.len(), 4 * 1024 * 1024 - sent);

    // Socket is now full: further attempts return without blocking.
    let before = out.len();
    let again = out.send_once(&a).unwrap();
    assert_eq!(out.len(), before - again);
    assert!(!out.is_empty());

    let mut inbound = ByteBuffer::new();
    b.ready(Interest::READABLE).await.unwrap();
    let got = inbound.try_receive(&b, 1024).unwrap();
    assert!(matches!(got, Some(n) if n > 0));
    assert!(inbound.as_slice().iter().all(|&x| x == 0xAB));
}

// -- 4. try_receive distinguishes "nothing yet" from orderly close --
#[tokio::test]
async fn try_receive_would_block_then_close() {
    let (a, b) = UnixStream::pair().unwrap();
    let b = BridgeStream::from(b);
    let mut inbound = ByteBuffer::new();
    assert_eq!(inbound.try_receive(&b, 64).unwrap(), None);

    drop(a);
    tokio::time::timeout(Duration::from_secs(5), b.ready(Interest::READABLE))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(inbound.try_receive(&b, 64).unwrap(), Some(0));
}

// -- 5. connect over both transports --
#[tokio::test]
async fn connect_unix_and_tcp() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("b.sock");
    let unix = UnixListener::bind(&path).unwrap();
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let tcp_addr = tcp.local_addr().unwrap();

    let unix_endpoint = Endpoint::Unix(path.clone());
    let (client, accepted) = tokio::join!(BridgeStream::connect(&unix_endpoint), unix.accept());
    assert!(matches!(client.unwrap(), BridgeStream::Unix(_)));
    accepted.unwrap();

    let tcp_endpoint = Endpoint::Tcp(tcp_addr);
    let (client, accepted) = tokio::join!(BridgeStream::connect(&tcp_endpoint), tcp.accept());
    let client = client.unwrap();
    assert!(client.peer_label().starts_with("tcp:127.0.0.1:"));
    accepted.unwrap();
}
