//! Integration tests for rpch.
//!
//! These tests run real servers and clients over in-memory duplex streams
//! and TCP sockets, and check the exact bytes that cross the connection.

use std::sync::Arc;

use rpch::protocol::{
    encode_request, encode_response, type_kind, ResponseFrame, ResponseHeader, MAGIC_BYTES,
    RESPONSE_HEADER_SIZE,
};
use rpch::{Client, HandlerError, RpchError, Server, Service, Value};
use serde::{Deserialize, Serialize};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TwoNum {
    a: i32,
    b: i32,
}

fn math_service() -> Service {
    Service::new("math")
        .method("Add", |args| async move {
            if args.len() != 2 {
                return Err(HandlerError::recoverable("invalid argument count"));
            }
            let a: i32 = args[0].to_scalar()?;
            let b: i32 = args[1].to_scalar()?;
            Ok(Value::scalar(a + b))
        })
        .method("Validate", |args| async move {
            let n: i32 = args[0].to_scalar()?;
            if n < 0 {
                return Err(HandlerError::recoverable("bad input"));
            }
            Ok(Value::scalar(n))
        })
        .method("Sub", |args| async move {
            let a: i32 = args[0].to_scalar()?;
            let b: i32 = args[1].to_scalar()?;
            let difference = a
                .checked_sub(b)
                .ok_or_else(|| HandlerError::recoverable("overflow"))?;
            Ok(Value::scalar(difference))
        })
        .method("Multiply", |args| async move {
            let nums: TwoNum = args[0].decode_msgpack("TwoNum")?;
            Ok(Value::scalar(nums.a * nums.b))
        })
        .method("Crash", |_| async { Err(HandlerError::fault("storage offline")) })
}

/// Serve one in-memory connection; returns the peer end and the server task.
fn spawn_server(server: Server) -> (DuplexStream, JoinHandle<rpch::Result<()>>) {
    let (peer, conn) = duplex(64 * 1024);
    let task = tokio::spawn(async move { server.serve_connection(conn).await });
    (peer, task)
}

async fn read_response(stream: &mut DuplexStream) -> ResponseFrame {
    let mut head = [0u8; RESPONSE_HEADER_SIZE];
    stream.read_exact(&mut head).await.unwrap();
    let header = ResponseHeader::decode(&head).unwrap();

    let mut name = vec![0u8; header.name_len as usize];
    stream.read_exact(&mut name).await.unwrap();
    let mut data = vec![0u8; header.data_len as usize];
    stream.read_exact(&mut data).await.unwrap();

    ResponseFrame {
        seq: header.seq,
        type_kind: header.type_kind,
        name: name.into(),
        data: data.into(),
    }
}

#[tokio::test]
async fn test_add_exact_response_bytes() {
    let server = Server::builder().service(math_service()).build();
    let (mut peer, _task) = spawn_server(server);

    peer.write_all(&MAGIC_BYTES).await.unwrap();
    let request =
        encode_request(0, "math", "Add", &[Value::scalar(1i32), Value::scalar(2i32)]).unwrap();
    peer.write_all(&request).await.unwrap();

    let mut out = [0u8; RESPONSE_HEADER_SIZE + 5 + 4];
    peer.read_exact(&mut out).await.unwrap();

    let mut expected = Vec::new();
    expected.extend_from_slice(&0u64.to_le_bytes());
    expected.extend_from_slice(&0u16.to_le_bytes());
    expected.extend_from_slice(&5u16.to_le_bytes());
    expected.extend_from_slice(&4u32.to_le_bytes());
    expected.extend_from_slice(b"int32");
    expected.extend_from_slice(&[0x03, 0x00, 0x00, 0x00]);
    assert_eq!(&out[..], &expected[..]);
}

#[tokio::test]
async fn test_request_split_into_single_bytes() {
    let server = Server::builder().service(math_service()).build();
    let (mut peer, _task) = spawn_server(server);

    let mut stream = MAGIC_BYTES.to_vec();
    stream.extend_from_slice(
        &encode_request(9, "math", "Add", &[Value::scalar(40i32), Value::scalar(2i32)]).unwrap(),
    );
    for byte in stream {
        peer.write_all(&[byte]).await.unwrap();
        peer.flush().await.unwrap();
    }

    let response = read_response(&mut peer).await;
    assert_eq!(response.seq, 9);
    assert_eq!(response.into_result().unwrap().to_scalar::<i32>().unwrap(), 42);
}

#[tokio::test]
async fn test_recoverable_error_keeps_connection() {
    let server = Server::builder().service(math_service()).build();
    let (conn, _task) = spawn_server(server);
    let client = Client::connect(conn).await.unwrap();

    let err = client
        .call("math", "Validate", &[Value::scalar(-1i32)])
        .await
        .unwrap_err();
    assert!(matches!(err, RpchError::Remote(ref msg) if msg == "bad input"));

    let ok = client
        .call("math", "Validate", &[Value::scalar(5i32)])
        .await
        .unwrap();
    assert_eq!(ok.to_scalar::<i32>().unwrap(), 5);

    let wrong_count = client.call("math", "Add", &[]).await.unwrap_err();
    assert!(matches!(wrong_count, RpchError::Remote(ref msg) if msg == "invalid argument count"));
}

#[tokio::test]
async fn test_sub_overflow_is_recoverable() {
    let server = Server::builder().service(math_service()).build();
    let (conn, _task) = spawn_server(server);
    let client = Client::connect(conn).await.unwrap();

    let err = client
        .call("math", "Sub", &[Value::scalar(i32::MIN), Value::scalar(1i32)])
        .await
        .unwrap_err();
    assert!(matches!(err, RpchError::Remote(ref msg) if msg == "overflow"));

    let ok = client
        .call("math", "Sub", &[Value::scalar(10i32), Value::scalar(4i32)])
        .await
        .unwrap();
    assert_eq!(ok.to_scalar::<i32>().unwrap(), 6);
}

#[tokio::test]
async fn test_msgpack_argument() {
    let server = Server::builder().service(math_service()).build();
    let (conn, _task) = spawn_server(server);
    let client = Client::connect(conn).await.unwrap();

    let arg = Value::msgpack("TwoNum", &TwoNum { a: 6, b: 7 }).unwrap();
    let product = client.call("math", "Multiply", &[arg]).await.unwrap();
    assert_eq!(product.to_scalar::<i32>().unwrap(), 42);
}

#[tokio::test]
async fn test_slow_handler_answered_after_fast_one() {
    let gate = Arc::new(Notify::new());
    let slow_gate = gate.clone();
    let service = Service::new("timing")
        .method("Slow", move |_| {
            let gate = slow_gate.clone();
            async move {
                gate.notified().await;
                Ok(Value::scalar("slow".to_string()))
            }
        })
        .method("Fast", |_| async { Ok(Value::scalar("fast".to_string())) });

    let server = Server::builder().service(service).build();
    let (mut peer, _task) = spawn_server(server);

    peer.write_all(&MAGIC_BYTES).await.unwrap();
    peer.write_all(&encode_request(0, "timing", "Slow", &[]).unwrap())
        .await
        .unwrap();
    peer.write_all(&encode_request(1, "timing", "Fast", &[]).unwrap())
        .await
        .unwrap();

    let first = read_response(&mut peer).await;
    assert_eq!(first.seq, 1);
    assert_eq!(&first.data[..], b"fast");

    gate.notify_one();

    let second = read_response(&mut peer).await;
    assert_eq!(second.seq, 0);
    assert_eq!(&second.data[..], b"slow");
}

#[tokio::test]
async fn test_client_sequence_numbers_with_out_of_order_answers() {
    let (conn, mut peer) = duplex(64 * 1024);
    let client = Client::connect(conn).await.unwrap();

    let calls = [
        client.send("kv", "Get", &[Value::scalar("a".to_string())]).await.unwrap(),
        client.send("kv", "Get", &[Value::scalar("b".to_string())]).await.unwrap(),
        client.send("kv", "Get", &[Value::scalar("c".to_string())]).await.unwrap(),
    ];
    let seqs: Vec<u64> = calls.iter().map(|c| c.seq()).collect();
    assert_eq!(seqs, vec![0, 1, 2]);

    let mut expected = MAGIC_BYTES.to_vec();
    for (seq, key) in [(0u64, "a"), (1, "b"), (2, "c")] {
        expected.extend_from_slice(format!("kv Get 1 {}\r\n", seq).as_bytes());
        expected.extend_from_slice(&0u16.to_le_bytes());
        expected.extend_from_slice(&6u16.to_le_bytes());
        expected.extend_from_slice(&1u32.to_le_bytes());
        expected.extend_from_slice(b"string");
        expected.extend_from_slice(key.as_bytes());
    }
    let mut written = vec![0u8; expected.len()];
    peer.read_exact(&mut written).await.unwrap();
    assert_eq!(written, expected);

    for seq in [2u64, 0, 1] {
        let answer = format!("value-{}", seq);
        peer.write_all(&encode_response(seq, type_kind::VALUE, b"string", answer.as_bytes()).unwrap())
            .await
            .unwrap();
    }

    let [c0, c1, c2] = calls;
    assert_eq!(c0.wait().await.unwrap().to_scalar::<String>().unwrap(), "value-0");
    assert_eq!(c1.wait().await.unwrap().to_scalar::<String>().unwrap(), "value-1");
    assert_eq!(c2.wait().await.unwrap().to_scalar::<String>().unwrap(), "value-2");
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn test_reserved_type_kind_passes_through() {
    let (conn, mut peer) = duplex(4096);
    let client = Client::connect(conn).await.unwrap();

    let call = client.send("feed", "Next", &[]).await.unwrap();
    peer.write_all(&encode_response(call.seq(), type_kind::STREAM, b"chunk", b"xyz").unwrap())
        .await
        .unwrap();

    let value = call.wait().await.unwrap();
    assert_eq!(value.type_kind, type_kind::STREAM);
    assert_eq!(&value.data[..], b"xyz");
}

#[tokio::test]
async fn test_stale_response_is_ignored() {
    let (conn, mut peer) = duplex(4096);
    let client = Client::connect(conn).await.unwrap();

    let call = client.send("s", "m", &[]).await.unwrap();
    peer.write_all(&encode_response(77, type_kind::VALUE, b"", b"").unwrap())
        .await
        .unwrap();
    peer.write_all(&encode_response(call.seq(), type_kind::VALUE, b"int32", &1i32.to_le_bytes()).unwrap())
        .await
        .unwrap();

    assert_eq!(call.wait().await.unwrap().to_scalar::<i32>().unwrap(), 1);
}

#[tokio::test]
async fn test_bad_magic_closes_without_response() {
    let server = Server::builder().service(math_service()).build();
    let (mut peer, task) = spawn_server(server);

    let mut stream = vec![0x00, 0x00, 0x00, 0x00];
    stream.extend_from_slice(&encode_request(0, "math", "Add", &[]).unwrap());
    peer.write_all(&stream).await.unwrap();

    let mut out = Vec::new();
    peer.read_to_end(&mut out).await.unwrap();
    assert!(out.is_empty());
    assert!(matches!(task.await.unwrap(), Err(RpchError::Protocol(_))));
}

#[tokio::test]
async fn test_oversized_request_line_closes_without_response() {
    let server = Server::builder().service(math_service()).build();
    let (mut peer, task) = spawn_server(server);

    let mut stream = MAGIC_BYTES.to_vec();
    stream.extend_from_slice(&[b'a'; 4097]);
    peer.write_all(&stream).await.unwrap();

    let mut out = Vec::new();
    peer.read_to_end(&mut out).await.unwrap();
    assert!(out.is_empty());
    assert!(matches!(task.await.unwrap(), Err(RpchError::Protocol(_))));
}

#[tokio::test]
async fn test_unknown_service_closes_connection() {
    let server = Server::builder().service(math_service()).build();
    let (conn, task) = spawn_server(server);
    let client = Client::connect(conn).await.unwrap();

    let err = client.call("nope", "Add", &[]).await.unwrap_err();
    assert!(matches!(err, RpchError::ConnectionClosed));

    let server_err = task.await.unwrap().unwrap_err();
    assert!(matches!(server_err, RpchError::ServiceNotFound(ref name) if name == "nope"));
    assert_eq!(server_err.to_string(), "invalid service: nope");
}

#[tokio::test]
async fn test_call_pipelined_before_unknown_service_is_answered() {
    let server = Server::builder().service(math_service()).build();
    let (conn, task) = spawn_server(server);
    let client = Client::connect(conn).await.unwrap();

    let good = client
        .send("math", "Add", &[Value::scalar(2i32), Value::scalar(3i32)])
        .await
        .unwrap();
    let bad = client.send("nope", "Add", &[]).await.unwrap();

    assert_eq!(good.wait().await.unwrap().to_scalar::<i32>().unwrap(), 5);
    assert!(matches!(bad.wait().await, Err(RpchError::ConnectionClosed)));
    assert!(matches!(task.await.unwrap(), Err(RpchError::ServiceNotFound(_))));
}

#[tokio::test]
async fn test_unknown_method_closes_connection() {
    let server = Server::builder().service(math_service()).build();
    let (conn, task) = spawn_server(server);
    let client = Client::connect(conn).await.unwrap();

    let err = client.call("math", "Pow", &[]).await.unwrap_err();
    assert!(matches!(err, RpchError::ConnectionClosed));
    assert!(matches!(
        task.await.unwrap(),
        Err(RpchError::MethodNotFound { .. })
    ));
}

#[tokio::test]
async fn test_handler_fault_closes_connection() {
    let server = Server::builder().service(math_service()).build();
    let (conn, task) = spawn_server(server);
    let client = Client::connect(conn).await.unwrap();

    let err = client.call("math", "Crash", &[]).await.unwrap_err();
    assert!(matches!(err, RpchError::ConnectionClosed));
    assert!(matches!(task.await.unwrap(), Err(RpchError::HandlerFault(_))));

    let after = client.call("math", "Add", &[]).await.unwrap_err();
    assert!(matches!(after, RpchError::ConnectionClosed));
}

#[tokio::test]
async fn test_tcp_round_trip() {
    let listener = rpch::transport::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Server::builder().service(math_service()).build();
    tokio::spawn(async move { server.serve(listener).await });

    let client = Client::dial(addr).await.unwrap();
    let mut pending = Vec::new();
    for i in 0..10i32 {
        let call = client
            .send("math", "Add", &[Value::scalar(i), Value::scalar(i)])
            .await
            .unwrap();
        pending.push(call);
    }

    for (i, call) in pending.into_iter().enumerate() {
        let value = call.wait().await.unwrap();
        assert_eq!(value.to_scalar::<i32>().unwrap(), 2 * i as i32);
    }

    client.destroy();
}
