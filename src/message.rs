//! Stream messages and header collections.
//!
//! A [`StreamMessage`] is produced by the transport for every frame it pushes
//! into the observer and is consumed by exactly one dispatch. Headers travel
//! with it as a [`Headers`] collection; callbacks that ask for headers get them
//! wrapped in a [`HeaderCarrier`].

use std::collections::HashMap;

use bytes::Bytes;

use crate::status::Status;

/// Multi-valued gRPC metadata.
///
/// Keys are stored lower-case, as gRPC metadata keys are case-insensitive.
/// Values keep their insertion order per key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: HashMap<String, Vec<Bytes>>,
}

impl Headers {
    /// Create an empty header collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value for `key`.
    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<Bytes>) {
        self.entries
            .entry(key.as_ref().to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl AsRef<str>, value: impl Into<Bytes>) -> Self {
        self.insert(key, value);
        self
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&Bytes> {
        self.get_all(key).first()
    }

    /// First value for `key`, if it is valid UTF-8.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| std::str::from_utf8(v).ok())
    }

    /// All values for `key`, empty if absent.
    pub fn get_all(&self, key: &str) -> &[Bytes] {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// True if at least one value is stored under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_ascii_lowercase())
    }

    /// Remove every value for `key`.
    pub fn remove(&mut self, key: &str) -> Vec<Bytes> {
        self.entries
            .remove(&key.to_ascii_lowercase())
            .unwrap_or_default()
    }

    /// Header names, lower-cased.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no header is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: AsRef<str>,
    V: Into<Bytes>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

/// Header wrapper passed to callbacks that declare a headers parameter.
///
/// Only built when the resolved callback asks for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderCarrier {
    headers: Headers,
}

impl HeaderCarrier {
    /// Wrap a header collection.
    pub fn new(headers: Headers) -> Self {
        Self { headers }
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Bytes> {
        self.headers.get(key)
    }

    /// First value under `key`, if it is valid UTF-8.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.headers.get_str(key)
    }

    /// Every value stored under `key`, in insertion order.
    pub fn get_all(&self, key: &str) -> &[Bytes] {
        self.headers.get_all(key)
    }

    /// True if `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.headers.contains_key(key)
    }

    /// Underlying header collection.
    #[inline]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Unwrap into the header collection.
    pub fn into_headers(self) -> Headers {
        self.headers
    }
}

/// One event pushed by the transport.
///
/// `payload` is absent for frames that carry no message body. `error` is
/// only present for the error event.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamMessage<M> {
    payload: Option<M>,
    headers: Headers,
    error: Option<Status>,
}

impl<M> StreamMessage<M> {
    /// Message event with an optional payload.
    pub fn new(payload: Option<M>, headers: Headers) -> Self {
        Self {
            payload,
            headers,
            error: None,
        }
    }

    /// Message event carrying `payload` and no headers.
    pub fn from_payload(payload: M) -> Self {
        Self::new(Some(payload), Headers::new())
    }

    /// Message event without a payload.
    pub fn empty() -> Self {
        Self::new(None, Headers::new())
    }

    /// Error event carrying the transport status.
    pub fn error(status: Status, headers: Headers) -> Self {
        Self {
            payload: None,
            headers,
            error: Some(status),
        }
    }

    /// Replace the header collection.
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Payload of the frame, if any.
    pub fn payload(&self) -> Option<&M> {
        self.payload.as_ref()
    }

    /// Headers received with the frame.
    #[inline]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Transport status, set on error events.
    pub fn status(&self) -> Option<&Status> {
        self.error.as_ref()
    }

    /// Split into `(payload, headers, error)`.
    pub fn into_parts(self) -> (Option<M>, Headers, Option<Status>) {
        (self.payload, self.headers, self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_case_insensitive() {
        let mut headers = Headers::new();
        headers.insert("X-Request-Id", "abc");

        assert!(headers.contains_key("x-request-id"));
        assert_eq!(headers.get_str("X-REQUEST-ID"), Some("abc"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_headers_multi_value() {
        let headers = Headers::new()
            .with("accept", "a")
            .with("accept", "b")
            .with("trace-bin", Bytes::from_static(&[0xff, 0x00]));

        assert_eq!(headers.get_all("accept").len(), 2);
        assert_eq!(headers.get_str("accept"), Some("a"));
        assert_eq!(headers.get_str("trace-bin"), None);
        assert_eq!(headers.get("trace-bin").map(|v| v.len()), Some(2));
        assert!(headers.get_all("missing").is_empty());
    }

    #[test]
    fn test_headers_remove() {
        let mut headers: Headers = [("a", "1"), ("a", "2"), ("b", "3")].into_iter().collect();
        assert_eq!(headers.remove("A").len(), 2);
        assert!(!headers.contains_key("a"));
        assert_eq!(headers.keys().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn test_header_carrier() {
        let carrier = HeaderCarrier::new(Headers::new().with("k", "v"));
        assert!(carrier.contains("k"));
        assert_eq!(carrier.get_str("k"), Some("v"));
        assert_eq!(carrier.into_headers().len(), 1);
    }

    #[test]
    fn test_stream_message_parts() {
        let msg = StreamMessage::new(Some(7u32), Headers::new().with("k", "v"));
        assert_eq!(msg.payload(), Some(&7));
        assert!(msg.status().is_none());

        let (payload, headers, error) = msg.into_parts();
        assert_eq!(payload, Some(7));
        assert_eq!(headers.get_str("k"), Some("v"));
        assert!(error.is_none());
    }

    #[test]
    fn test_error_message_has_no_payload() {
        let msg: StreamMessage<String> =
            StreamMessage::error(Status::unavailable("gone"), Headers::new());
        assert!(msg.payload().is_none());
        assert_eq!(msg.status().map(Status::code), Some(crate::status::Code::Unavailable));
    }
}
