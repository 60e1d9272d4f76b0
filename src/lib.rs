//! # grpc-stream-observer
//!
//! Ordered dispatch of gRPC client stream events to user callbacks.
//!
//! A streaming RPC pushes three kinds of events at the client: message
//! frames, a terminal error and a normal completion. This crate routes them
//! to the matching callback of a user handler (`onMessage`, `onError`,
//! `onCompleted`), runs the callback asynchronously and keeps at most one
//! callback per stream in flight.
//!
//! ## Architecture
//!
//! - **Handler registry**: the callbacks of a handler and their declared
//!   parameter shapes
//! - **Throttle gate**: capacity-1 admission permit, held until the callback
//!   has finished
//! - **Invoker**: runs the bound call off the transport task and releases the
//!   permit on completion
//! - **Observer**: resolves, assembles and schedules each event
//!
//! ## Example
//!
//! ```
//! use grpc_stream_observer::{DefaultStreamObserver, Headers, Signature};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), grpc_stream_observer::ObserverError> {
//!     let observer = DefaultStreamObserver::<u64>::builder()
//!         .on_message(Signature::ValueWithHeaders, |args| async move {
//!             let (value, headers) = args.into_parts();
//!             println!("{:?} {:?}", value, headers);
//!             Ok(())
//!         })
//!         .on_error(Signature::Value, |args| async move {
//!             eprintln!("stream failed: {:?}", args.value());
//!             Ok(())
//!         })
//!         .on_completed(Signature::Empty, |_args| async { Ok(()) })
//!         .build()?;
//!
//!     observer.deliver_message(Some(1), Headers::new()).await?;
//!     observer.deliver_completion().await?;
//!     observer.wait_idle().await
//! }
//! ```

pub mod connector;
pub mod error;
pub mod handler;
pub mod invoker;
pub mod message;
pub mod observer;
pub mod pump;
pub mod status;
pub mod throttle;

pub use connector::{ConnectorError, ErrorKind};
pub use error::{ObserverError, Result};
pub use handler::{Arguments, CallbackKind, HandlerRegistry, HandlerResult, Signature};
pub use invoker::{Completion, Invoker, Metadata, TokioInvoker};
pub use message::{HeaderCarrier, Headers, StreamMessage};
pub use observer::{DefaultStreamObserver, ObserverBuilder, ObserverConfig, StreamObserver};
pub use pump::{drive, StreamEvent};
pub use status::{Code, Status};
pub use throttle::{ThrottleGate, ThrottlePermit};
