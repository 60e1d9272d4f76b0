//! Feeds a stream of transport events into an observer.
//!
//! The transport side of a client stream can be modelled as a
//! [`Stream`] of [`StreamEvent`]s. [`drive`] pulls events in order and awaits
//! each delivery, so an event is handed to the observer only once the
//! previous one has been admitted. Delivery stops after the first terminal
//! event (`Error` or `Completed`).

use futures::{Stream, StreamExt};

use crate::message::StreamMessage;
use crate::observer::StreamObserver;
use crate::status::Status;

/// Event pushed by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent<M> {
    /// A message frame.
    Message(StreamMessage<M>),
    /// The stream failed.
    Error(StreamMessage<M>),
    /// The stream completed normally.
    Completed,
}

impl<M> StreamEvent<M> {
    /// True for `Error` and `Completed`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Message(_))
    }
}

/// Deliver every event of `events` to `observer`.
///
/// Returns the status of the first fatal dispatch error. Events after a
/// terminal event are not pulled.
pub async fn drive<M, S, O>(events: S, observer: &O) -> Result<(), Status>
where
    S: Stream<Item = StreamEvent<M>>,
    O: StreamObserver<M> + ?Sized,
{
    futures::pin_mut!(events);

    let mut delivered = 0u64;
    while let Some(event) = events.next().await {
        let terminal = event.is_terminal();
        let result = match event {
            StreamEvent::Message(message) => observer.on_message(message).await,
            StreamEvent::Error(message) => observer.on_error(message).await,
            StreamEvent::Completed => observer.on_completed().await,
        };

        if let Err(e) = result {
            tracing::debug!("Stream delivery stopped after {} events: {}", delivered, e);
            return Err(e.to_status());
        }
        delivered += 1;

        if terminal {
            return Ok(());
        }
    }

    tracing::debug!(
        "Event stream ended after {} events without a terminal event",
        delivered
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ObserverError, Result};
    use crate::handler::{BoxFuture, CallbackKind};
    use crate::status::Code;
    use std::sync::Mutex;

    /// Observer recording the event kinds it was handed.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<CallbackKind>>,
        fail_on: Option<CallbackKind>,
    }

    impl Recorder {
        fn record(&self, kind: CallbackKind) -> BoxFuture<'_, Result<()>> {
            self.seen.lock().unwrap().push(kind);
            let result = match self.fail_on {
                Some(fail) if fail == kind => Err(ObserverError::MissingCallback(kind)),
                _ => Ok(()),
            };
            Box::pin(async move { result })
        }

        fn seen(&self) -> Vec<CallbackKind> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl StreamObserver<u32> for Recorder {
        fn on_message(&self, _message: StreamMessage<u32>) -> BoxFuture<'_, Result<()>> {
            self.record(CallbackKind::Message)
        }

        fn on_error(&self, _message: StreamMessage<u32>) -> BoxFuture<'_, Result<()>> {
            self.record(CallbackKind::Error)
        }

        fn on_completed(&self) -> BoxFuture<'_, Result<()>> {
            self.record(CallbackKind::Completed)
        }
    }

    fn message(n: u32) -> StreamEvent<u32> {
        StreamEvent::Message(StreamMessage::from_payload(n))
    }

    #[tokio::test]
    async fn test_drive_in_order() {
        let recorder = Recorder::default();
        let events = futures::stream::iter(vec![message(1), message(2), StreamEvent::Completed]);

        drive(events, &recorder).await.unwrap();

        assert_eq!(
            recorder.seen(),
            vec![CallbackKind::Message, CallbackKind::Message, CallbackKind::Completed]
        );
    }

    #[tokio::test]
    async fn test_drive_stops_after_terminal() {
        let recorder = Recorder::default();
        let events = futures::stream::iter(vec![
            message(1),
            StreamEvent::Error(StreamMessage::error(
                Status::unavailable("gone"),
                Default::default(),
            )),
            message(2),
            StreamEvent::Completed,
        ]);

        drive(events, &recorder).await.unwrap();

        assert_eq!(recorder.seen(), vec![CallbackKind::Message, CallbackKind::Error]);
    }

    #[tokio::test]
    async fn test_drive_returns_status_on_fatal_error() {
        let recorder = Recorder {
            fail_on: Some(CallbackKind::Message),
            ..Default::default()
        };
        let events = futures::stream::iter(vec![message(1), StreamEvent::Completed]);

        let status = drive(events, &recorder).await.unwrap_err();

        assert_eq!(status.code(), Code::Internal);
        assert!(status
            .message()
            .is_some_and(|m| m.contains("onMessage resource does not exist")));
        assert_eq!(recorder.seen(), vec![CallbackKind::Message]);
    }

    #[tokio::test]
    async fn test_drive_without_terminal_event() {
        let recorder = Recorder::default();
        let events = futures::stream::iter(vec![message(1)]);

        assert!(drive(events, &recorder).await.is_ok());
        assert_eq!(recorder.seen(), vec![CallbackKind::Message]);
    }

    #[test]
    fn test_is_terminal() {
        assert!(!message(1).is_terminal());
        assert!(StreamEvent::<u32>::Completed.is_terminal());
    }
}
