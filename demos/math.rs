//! Math service - server and client in one process.
//!
//! This example demonstrates:
//! - Registering a service whose methods take scalar and MsgPack arguments
//! - Returning a recoverable error the caller can handle
//! - Calling the service through a client over TCP
//!
//! ```text
//! RUST_LOG=rpch=debug cargo run --example math
//! ```

use rpch::{Client, HandlerError, RpchError, Server, Service, Value};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Serialize, Deserialize, Debug)]
struct TwoNum {
    a: i32,
    b: i32,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct Quotient {
    quo: u64,
    rem: u64,
}

fn math_service() -> Service {
    Service::new("Math")
        .method("Add", |args: Vec<Value>| async move {
            let [a, b] = two_args(&args)?;
            let sum = a
                .to_scalar::<u32>()?
                .checked_add(b.to_scalar::<u32>()?)
                .ok_or_else(|| HandlerError::recoverable("overflow"))?;
            Ok(Value::scalar(sum))
        })
        .method("Sub", |args: Vec<Value>| async move {
            let [a, b] = two_args(&args)?;
            let difference = a
                .to_scalar::<i32>()?
                .checked_sub(b.to_scalar::<i32>()?)
                .ok_or_else(|| HandlerError::recoverable("overflow"))?;
            Ok(Value::scalar(difference))
        })
        .method("Multiply", |args: Vec<Value>| async move {
            let nums: TwoNum = args
                .first()
                .ok_or_else(|| HandlerError::recoverable("missing argument"))?
                .decode_msgpack("TwoNum")?;
            Ok(Value::scalar(nums.a * nums.b))
        })
        .method("Divide", |args: Vec<Value>| async move {
            let [a, b] = two_args(&args)?;
            let (a, b) = (a.to_scalar::<u64>()?, b.to_scalar::<u64>()?);
            if b == 0 {
                return Err(HandlerError::recoverable("division by zero"));
            }
            Ok(Value::msgpack(
                "Quotient",
                &Quotient {
                    quo: a / b,
                    rem: a % b,
                },
            )?)
        })
}

fn two_args(args: &[Value]) -> Result<[&Value; 2], HandlerError> {
    match args {
        [a, b] => Ok([a, b]),
        _ => Err(HandlerError::recoverable("invalid argument count")),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let listener = rpch::transport::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server = Server::builder().service(math_service()).build();
    tokio::spawn(async move { server.serve(listener).await });

    let client = Client::dial(addr).await?;

    let sum = client
        .call("Math", "Add", &[Value::scalar(1u32), Value::scalar(2u32)])
        .await?;
    assert_eq!(sum.to_scalar::<u32>()?, 3);

    let diff = client
        .call("Math", "Sub", &[Value::scalar(-1i32), Value::scalar(4i32)])
        .await?;
    assert_eq!(diff.to_scalar::<i32>()?, -5);

    let product = client
        .call(
            "Math",
            "Multiply",
            &[Value::msgpack("TwoNum", &TwoNum { a: -4, b: 5 })?],
        )
        .await?;
    assert_eq!(product.to_scalar::<i32>()?, -20);

    let quotient: Quotient = client
        .call("Math", "Divide", &[Value::scalar(13u64), Value::scalar(3u64)])
        .await?
        .decode_msgpack("Quotient")?;
    assert_eq!(quotient, Quotient { quo: 4, rem: 1 });

    match client
        .call("Math", "Divide", &[Value::scalar(1u64), Value::scalar(0u64)])
        .await
    {
        Err(RpchError::Remote(msg)) => tracing::info!(%msg, "recoverable error returned"),
        other => return Err(format!("expected a remote error, got {:?}", other).into()),
    }

    tracing::info!("all calls succeeded");
    client.destroy();
    Ok(())
}
