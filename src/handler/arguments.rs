//! Arguments assembled for a single callback invocation.
//!
//! The shape of [`Arguments`] always matches the [`Signature`] the callback
//! was registered with. A value that is `None` was not present on the event
//! (for example a frame without payload); it is never a default-filled value.
//!
//! # Example
//!
//! ```
//! use grpc_stream_observer::handler::{Arguments, Signature};
//! use grpc_stream_observer::message::Headers;
//!
//! let headers = Headers::new().with("x-trace", "1");
//! let args = Arguments::assemble(Signature::ValueWithHeaders, Some("hi"), headers);
//!
//! assert_eq!(args.value(), Some(&"hi"));
//! assert_eq!(args.headers().and_then(|h| h.get_str("x-trace")), Some("1"));
//! assert_eq!(args.arity(), 2);
//! ```

use super::Signature;
use crate::message::{HeaderCarrier, Headers};

/// Arguments passed to a callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Arguments<T> {
    /// Callback declared no parameters.
    Empty,
    /// Callback declared a single value parameter.
    Value(Option<T>),
    /// Callback declared a value and a headers parameter.
    ValueWithHeaders(Option<T>, HeaderCarrier),
}

impl<T> Arguments<T> {
    /// Assemble arguments for `signature`.
    ///
    /// The header carrier is only built when the signature asks for headers;
    /// otherwise `headers` is dropped untouched. For [`Signature::Empty`] the
    /// value is dropped as well.
    pub fn assemble(signature: Signature, value: Option<T>, headers: Headers) -> Self {
        match signature {
            Signature::Empty => Arguments::Empty,
            Signature::Value => Arguments::Value(value),
            Signature::ValueWithHeaders => {
                Arguments::ValueWithHeaders(value, HeaderCarrier::new(headers))
            }
        }
    }

    /// The value argument, if present.
    pub fn value(&self) -> Option<&T> {
        match self {
            Arguments::Empty => None,
            Arguments::Value(v) | Arguments::ValueWithHeaders(v, _) => v.as_ref(),
        }
    }

    /// Take the value argument.
    pub fn into_value(self) -> Option<T> {
        match self {
            Arguments::Empty => None,
            Arguments::Value(v) | Arguments::ValueWithHeaders(v, _) => v,
        }
    }

    /// The header carrier, if the callback declared one.
    pub fn headers(&self) -> Option<&HeaderCarrier> {
        match self {
            Arguments::ValueWithHeaders(_, h) => Some(h),
            _ => None,
        }
    }

    /// Split into value and header carrier.
    pub fn into_parts(self) -> (Option<T>, Option<HeaderCarrier>) {
        match self {
            Arguments::Empty => (None, None),
            Arguments::Value(v) => (v, None),
            Arguments::ValueWithHeaders(v, h) => (v, Some(h)),
        }
    }

    /// Signature these arguments were assembled for.
    pub fn signature(&self) -> Signature {
        match self {
            Arguments::Empty => Signature::Empty,
            Arguments::Value(_) => Signature::Value,
            Arguments::ValueWithHeaders(..) => Signature::ValueWithHeaders,
        }
    }

    /// Number of declared parameters.
    #[inline]
    pub fn arity(&self) -> usize {
        self.signature().param_count()
    }

    /// True for a callback declaring no parameters.
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Arguments::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_present() {
        let args = Arguments::assemble(Signature::Value, Some(5u32), Headers::new());
        assert_eq!(args.value(), Some(&5));
        assert!(args.headers().is_none());
        assert_eq!(args.arity(), 1);
    }

    #[test]
    fn test_value_absent_is_not_defaulted() {
        let args: Arguments<u32> = Arguments::assemble(Signature::Value, None, Headers::new());
        assert_eq!(args, Arguments::Value(None));
        assert!(args.value().is_none());
    }

    #[test]
    fn test_headers_only_for_two_params() {
        let headers = Headers::new().with("k", "v");

        let one = Arguments::assemble(Signature::Value, Some(1), headers.clone());
        assert!(one.headers().is_none());

        let two = Arguments::assemble(Signature::ValueWithHeaders, Some(1), headers);
        assert_eq!(two.headers().and_then(|h| h.get_str("k")), Some("v"));
        assert_eq!(two.arity(), 2);
    }

    #[test]
    fn test_headers_carrier_built_without_value() {
        let args: Arguments<()> =
            Arguments::assemble(Signature::ValueWithHeaders, None, Headers::new());
        let (value, carrier) = args.into_parts();
        assert!(value.is_none());
        assert!(carrier.is_some_and(|c| c.headers().is_empty()));
    }

    #[test]
    fn test_empty_drops_everything() {
        let args = Arguments::assemble(Signature::Empty, Some("x"), Headers::new().with("k", "v"));
        assert!(args.is_empty());
        assert_eq!(args.arity(), 0);
        assert!(args.into_value().is_none());
    }
}
