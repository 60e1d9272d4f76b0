//! Handler module - callback registration and argument assembly.
//!
//! Provides:
//! - [`HandlerRegistry`] - the up to three callbacks of one stream handler
//! - [`Arguments`] - the arguments a callback is invoked with
//!
//! # Example
//!
//! ```
//! use grpc_stream_observer::handler::{HandlerRegistry, Signature};
//!
//! let mut registry = HandlerRegistry::<String>::new();
//!
//! // Payload and headers
//! registry.register_message(Signature::ValueWithHeaders, |args| async move {
//!     let (payload, headers) = args.into_parts();
//!     println!("{:?} {:?}", payload, headers.and_then(|h| h.get_str("x-id").map(str::to_owned)));
//!     Ok(())
//! });
//!
//! // Uniform error value
//! registry.register_error(Signature::Value, |args| async move {
//!     if let Some(err) = args.value() {
//!         eprintln!("stream failed: {}", err);
//!     }
//!     Ok(())
//! });
//! ```

mod arguments;
mod registry;

pub use arguments::Arguments;
pub use registry::{
    BoxFuture, Callback, CallbackDescriptor, CallbackKind, HandlerRegistry, HandlerResult,
    ParamKind, Registered, Signature, TypedCallback,
};
