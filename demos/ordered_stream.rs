//! Ordered Stream - example of observing a server-streaming RPC.
//!
//! This example demonstrates:
//! - Registering callbacks with `.on_message()`, `.on_error()`, `.on_completed()`
//! - Reading response headers from a two-parameter callback
//! - Feeding transport events through `drive()`
//!
//! A simulated transport pushes frames from a background task faster than
//! the handler consumes them. The handler still sees every frame in order,
//! one at a time.
//!
//! ```text
//! cargo run --example ordered_stream
//! ```

use std::time::Duration;

use grpc_stream_observer::{
    drive, DefaultStreamObserver, Headers, Signature, Status, StreamEvent, StreamMessage,
};
use serde::Serialize;
use tokio::sync::mpsc;

/// A quote pushed by the server.
#[derive(Serialize, Debug, Clone)]
struct Quote {
    symbol: String,
    price: f64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let observer = DefaultStreamObserver::<Quote>::builder()
        .on_message(Signature::ValueWithHeaders, |args| async move {
            let (quote, headers) = args.into_parts();
            let shard = headers
                .as_ref()
                .and_then(|h| h.get_str("x-shard").map(str::to_owned))
                .unwrap_or_default();

            // slow consumer
            tokio::time::sleep(Duration::from_millis(20)).await;
            match quote {
                Some(q) => println!(
                    "[shard {}] {}",
                    shard,
                    serde_json::to_string(&q).unwrap_or_default()
                ),
                None => println!("[shard {}] heartbeat", shard),
            }
            Ok(())
        })
        .on_error(Signature::Value, |args| async move {
            if let Some(err) = args.value() {
                eprintln!("stream failed: {}", err);
            }
            Ok(())
        })
        .on_completed(Signature::Empty, |_args| async {
            println!("stream completed");
            Ok(())
        })
        .build()?;

    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        for i in 0..5u32 {
            let headers = Headers::new().with("x-shard", "eu-1");
            let payload = (i % 4 != 3).then(|| Quote {
                symbol: "ACME".to_string(),
                price: 100.0 + f64::from(i),
            });
            if tx
                .send(StreamEvent::Message(StreamMessage::new(payload, headers)))
                .await
                .is_err()
            {
                return;
            }
        }

        let last = if std::env::args().any(|a| a == "--fail") {
            StreamEvent::Error(StreamMessage::error(
                Status::unavailable("server went away"),
                Headers::new(),
            ))
        } else {
            StreamEvent::Completed
        };
        tx.send(last).await.ok();
    });

    let events = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    });
    drive(events, &observer).await?;
    observer.wait_idle().await?;
    Ok(())
}
