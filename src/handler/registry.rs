//! Handler registry resolving the callbacks of one stream observer.
//!
//! A handler implements any subset of the three well-known callbacks
//! (`onMessage`, `onError`, `onCompleted`). Each callback is registered once,
//! together with its declared [`Signature`], and the registry is read-only
//! afterwards. Callbacks that were never registered are only reported when an
//! event of that kind actually arrives.
//!
//! # Example
//!
//! ```
//! use grpc_stream_observer::handler::{CallbackKind, HandlerRegistry, Signature};
//!
//! let mut registry = HandlerRegistry::<String>::new();
//!
//! registry.register_message(Signature::Value, |args| async move {
//!     println!("got {:?}", args.value());
//!     Ok(())
//! });
//! registry.register_completed(Signature::Empty, |_args| async { Ok(()) });
//!
//! assert!(registry.contains(CallbackKind::Message));
//! assert!(!registry.contains(CallbackKind::Error));
//! ```

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use super::Arguments;
use crate::connector::ConnectorError;

/// Result type for callbacks.
pub type HandlerResult = std::result::Result<(), ConnectorError>;

/// Boxed future for callback results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The three event kinds a handler may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    Message,
    Error,
    Completed,
}

impl CallbackKind {
    /// Every kind, in dispatch-table order.
    pub const ALL: [CallbackKind; 3] = [
        CallbackKind::Message,
        CallbackKind::Error,
        CallbackKind::Completed,
    ];

    /// Well-known callback name.
    pub fn resource_name(self) -> &'static str {
        match self {
            CallbackKind::Message => "onMessage",
            CallbackKind::Error => "onError",
            CallbackKind::Completed => "onCompleted",
        }
    }
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource_name())
    }
}

/// Semantic type of a declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Event value (payload or error).
    Value,
    /// Header carrier.
    Headers,
}

/// Parameter shapes a callback can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Signature {
    /// `fn()`
    #[default]
    Empty,
    /// `fn(value)`
    Value,
    /// `fn(value, headers)`
    ValueWithHeaders,
}

impl Signature {
    /// Declared parameter types, in order.
    pub fn params(self) -> &'static [ParamKind] {
        match self {
            Signature::Empty => &[],
            Signature::Value => &[ParamKind::Value],
            Signature::ValueWithHeaders => &[ParamKind::Value, ParamKind::Headers],
        }
    }

    /// Number of declared parameters.
    #[inline]
    pub fn param_count(self) -> usize {
        self.params().len()
    }

    /// True iff there are two parameters and the second carries headers.
    pub fn accepts_headers(self) -> bool {
        let params = self.params();
        params.len() == 2 && params[1] == ParamKind::Headers
    }
}

/// Resolved description of a registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackDescriptor {
    kind: CallbackKind,
    signature: Signature,
}

impl CallbackDescriptor {
    /// Describe a callback of `kind` declared with `signature`.
    pub fn new(kind: CallbackKind, signature: Signature) -> Self {
        Self { kind, signature }
    }

    /// Event kind the callback handles.
    #[inline]
    pub fn kind(&self) -> CallbackKind {
        self.kind
    }

    /// Well-known callback name.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.kind.resource_name()
    }

    /// Declared parameter shape.
    #[inline]
    pub fn signature(&self) -> Signature {
        self.signature
    }

    /// Declared parameter types, in order.
    pub fn param_types(&self) -> &'static [ParamKind] {
        self.signature.params()
    }

    /// Number of declared parameters.
    pub fn param_count(&self) -> usize {
        self.signature.param_count()
    }

    /// True iff the callback declares a headers parameter.
    pub fn accepts_headers(&self) -> bool {
        self.signature.accepts_headers()
    }
}

/// Trait for callback functions.
pub trait Callback<T>: Send + Sync + 'static {
    /// Run the callback with the assembled arguments.
    fn call(&self, args: Arguments<T>) -> BoxFuture<'static, HandlerResult>;
}

/// Adapter turning an async closure into a [`Callback`].
pub struct TypedCallback<F, T, Fut>
where
    F: Fn(Arguments<T>) -> Fut + Send + Sync + 'static,
    T: Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    callback: F,
    _phantom: PhantomData<fn(T) -> Fut>,
}

impl<F, T, Fut> TypedCallback<F, T, Fut>
where
    F: Fn(Arguments<T>) -> Fut + Send + Sync + 'static,
    T: Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    /// Create a new typed callback.
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, Fut> Callback<T> for TypedCallback<F, T, Fut>
where
    F: Fn(Arguments<T>) -> Fut + Send + Sync + 'static,
    T: Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, args: Arguments<T>) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.callback)(args))
    }
}

/// A callback together with its descriptor.
pub struct Registered<T> {
    descriptor: CallbackDescriptor,
    callback: Arc<dyn Callback<T>>,
}

impl<T> Registered<T> {
    /// Descriptor of the registered callback.
    #[inline]
    pub fn descriptor(&self) -> &CallbackDescriptor {
        &self.descriptor
    }

    /// Shared handle to the callback.
    pub fn callback(&self) -> Arc<dyn Callback<T>> {
        Arc::clone(&self.callback)
    }
}

impl<T> Clone for Registered<T> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor,
            callback: Arc::clone(&self.callback),
        }
    }
}

/// Registry of the callbacks a handler exposes for a stream of `M` messages.
///
/// Message callbacks receive `Arguments<M>`, error callbacks
/// `Arguments<ConnectorError>` and completion callbacks `Arguments<()>`.
pub struct HandlerRegistry<M> {
    on_message: Option<Registered<M>>,
    on_error: Option<Registered<ConnectorError>>,
    on_completed: Option<Registered<()>>,
}

impl<M: Send + 'static> HandlerRegistry<M> {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            on_message: None,
            on_error: None,
            on_completed: None,
        }
    }

    /// Register the message callback, replacing any previous one.
    pub fn register_message<F, Fut>(&mut self, signature: Signature, callback: F) -> &mut Self
    where
        F: Fn(Arguments<M>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.on_message = Some(Registered {
            descriptor: CallbackDescriptor::new(CallbackKind::Message, signature),
            callback: Arc::new(TypedCallback::new(callback)),
        });
        self
    }

    /// Register the error callback, replacing any previous one.
    pub fn register_error<F, Fut>(&mut self, signature: Signature, callback: F) -> &mut Self
    where
        F: Fn(Arguments<ConnectorError>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.on_error = Some(Registered {
            descriptor: CallbackDescriptor::new(CallbackKind::Error, signature),
            callback: Arc::new(TypedCallback::new(callback)),
        });
        self
    }

    /// Register the completion callback, replacing any previous one.
    pub fn register_completed<F, Fut>(&mut self, signature: Signature, callback: F) -> &mut Self
    where
        F: Fn(Arguments<()>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.on_completed = Some(Registered {
            descriptor: CallbackDescriptor::new(CallbackKind::Completed, signature),
            callback: Arc::new(TypedCallback::new(callback)),
        });
        self
    }
}

impl<M> HandlerRegistry<M> {
    /// Descriptor of the callback registered for `kind`.
    pub fn descriptor(&self, kind: CallbackKind) -> Option<&CallbackDescriptor> {
        match kind {
            CallbackKind::Message => self.on_message.as_ref().map(Registered::descriptor),
            CallbackKind::Error => self.on_error.as_ref().map(Registered::descriptor),
            CallbackKind::Completed => self.on_completed.as_ref().map(Registered::descriptor),
        }
    }

    /// True if a callback is registered for `kind`.
    pub fn contains(&self, kind: CallbackKind) -> bool {
        self.descriptor(kind).is_some()
    }

    /// Kinds with a registered callback.
    pub fn kinds(&self) -> impl Iterator<Item = CallbackKind> + '_ {
        CallbackKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }

    /// True if no callback is registered.
    pub fn is_empty(&self) -> bool {
        self.kinds().next().is_none()
    }

    /// Registered message callback.
    pub fn message(&self) -> Option<&Registered<M>> {
        self.on_message.as_ref()
    }

    /// Registered error callback.
    pub fn error(&self) -> Option<&Registered<ConnectorError>> {
        self.on_error.as_ref()
    }

    /// Registered completion callback.
    pub fn completed(&self) -> Option<&Registered<()>> {
        self.on_completed.as_ref()
    }
}

impl<M: Send + 'static> Default for HandlerRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for HandlerRegistry<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("on_message", &self.descriptor(CallbackKind::Message))
            .field("on_error", &self.descriptor(CallbackKind::Error))
            .field("on_completed", &self.descriptor(CallbackKind::Completed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Headers;

    #[test]
    fn test_register_message() {
        let mut registry = HandlerRegistry::<String>::new();
        registry.register_message(Signature::Value, |_args| async { Ok(()) });

        let descriptor = registry.descriptor(CallbackKind::Message).unwrap();
        assert_eq!(descriptor.name(), "onMessage");
        assert_eq!(descriptor.param_count(), 1);
        assert!(!descriptor.accepts_headers());
    }

    #[test]
    fn test_missing_callbacks_allowed() {
        let mut registry = HandlerRegistry::<u32>::new();
        assert!(registry.is_empty());

        registry.register_completed(Signature::Empty, |_args| async { Ok(()) });

        assert!(!registry.is_empty());
        assert!(registry.message().is_none());
        assert!(registry.error().is_none());
        assert_eq!(registry.kinds().collect::<Vec<_>>(), vec![CallbackKind::Completed]);
    }

    #[test]
    fn test_signature_shapes() {
        assert_eq!(Signature::Empty.param_count(), 0);
        assert_eq!(Signature::Value.params(), &[ParamKind::Value]);
        assert_eq!(
            Signature::ValueWithHeaders.params(),
            &[ParamKind::Value, ParamKind::Headers]
        );
        assert!(!Signature::Empty.accepts_headers());
        assert!(!Signature::Value.accepts_headers());
        assert!(Signature::ValueWithHeaders.accepts_headers());
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = HandlerRegistry::<u32>::new();
        registry
            .register_error(Signature::Value, |_args| async { Ok(()) })
            .register_error(Signature::ValueWithHeaders, |_args| async { Ok(()) });

        let descriptor = registry.descriptor(CallbackKind::Error).unwrap();
        assert_eq!(descriptor.signature(), Signature::ValueWithHeaders);
        assert_eq!(descriptor.kind(), CallbackKind::Error);
    }

    #[tokio::test]
    async fn test_callback_receives_arguments() {
        let mut registry = HandlerRegistry::<u32>::new();
        registry.register_message(Signature::Value, |args| async move {
            match args.value() {
                Some(&7) => Ok(()),
                other => Err(ConnectorError::internal(format!("unexpected {:?}", other))),
            }
        });

        let callback = registry.message().unwrap().callback();
        let ok = callback
            .call(Arguments::assemble(Signature::Value, Some(7), Headers::new()))
            .await;
        assert!(ok.is_ok());

        let err = callback
            .call(Arguments::assemble(Signature::Value, None, Headers::new()))
            .await;
        assert!(err.is_err());
    }

    #[test]
    fn test_resource_names() {
        let names: Vec<_> = CallbackKind::ALL.iter().map(|k| k.to_string()).collect();
        assert_eq!(names, vec!["onMessage", "onError", "onCompleted"]);
    }
}
