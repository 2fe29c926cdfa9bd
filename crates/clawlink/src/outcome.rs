//! Outcomes delivered to the caller.
//!
//! Every transport event, handshake result and server frame that matters to
//! the caller ends up as one [`Outcome`] on a shared, unbounded queue.

use std::sync::Arc;

use futures_util::Stream;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use tokio::sync::{mpsc, Mutex};

/// Text of the sentinel response emitted when the handshake completes.
pub const CONNECTED: &str = "CONNECTED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The handshake completed; the connection is ready for sends.
    Connected,
    /// Chat text from the gateway.
    Response(String),
    /// Something failed. The connection may or may not still be usable.
    Error(String),
}

impl Outcome {
    /// Response text, with [`Outcome::Connected`] reported as [`CONNECTED`].
    pub fn response(&self) -> Option<&str> {
        match self {
            Outcome::Connected => Some(CONNECTED),
            Outcome::Response(text) => Some(text),
            Outcome::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Outcome::Error(message) => Some(message),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error(_))
    }
}

/// Serializes as `{"response": ...}` or `{"error": ...}`.
impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Outcome", 1)?;
        match self.error() {
            Some(message) => state.serialize_field("error", message)?,
            None => state.serialize_field("response", &self.response())?,
        }
        state.end()
    }
}

/// Producer side of the outcome queue.
pub struct OutcomeChannel {
    tx: mpsc::UnboundedSender<Outcome>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Outcome>>>,
}

impl OutcomeChannel {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Enqueue an outcome. Never blocks.
    pub fn emit(&self, outcome: Outcome) {
        // The channel owns a receiver, so the queue cannot be closed here.
        let _ = self.tx.send(outcome);
    }

    /// A consumer handle. Consumers share one queue: each outcome goes to
    /// whichever consumer takes it first, and nothing is replayed.
    pub fn subscribe(&self) -> OutcomeStream {
        OutcomeStream {
            rx: Arc::clone(&self.rx),
        }
    }
}

impl Default for OutcomeChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer side of the outcome queue.
#[derive(Clone)]
pub struct OutcomeStream {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Outcome>>>,
}

impl OutcomeStream {
    /// Wait for the next outcome, in delivery order.
    ///
    /// There is no timeout; wrap this in `tokio::time::timeout` for bounded latency.
    pub async fn recv(&self) -> Option<Outcome> {
        self.rx.lock().await.recv().await
    }

    /// Take the next outcome if one is already queued and no other consumer
    /// is currently waiting.
    pub fn try_recv(&self) -> Option<Outcome> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }

    pub fn into_stream(self) -> impl Stream<Item = Outcome> {
        futures_util::stream::unfold(self, |outcomes| async move {
            let next = outcomes.recv().await;
            next.map(|o| (o, outcomes))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[test]
    fn test_outcome_json_shape() {
        assert_eq!(
            serde_json::to_string(&Outcome::Connected).unwrap(),
            r#"{"response":"CONNECTED"}"#
        );
        assert_eq!(
            serde_json::to_string(&Outcome::Response("hi".into())).unwrap(),
            r#"{"response":"hi"}"#
        );
        assert_eq!(
            serde_json::to_string(&Outcome::Error("boom".into())).unwrap(),
            r#"{"error":"boom"}"#
        );
    }

    #[tokio::test]
    async fn test_delivery_order() {
        let channel = OutcomeChannel::new();
        let outcomes = channel.subscribe();
        channel.emit(Outcome::Connected);
        channel.emit(Outcome::Response("a".into()));
        channel.emit(Outcome::Error("b".into()));

        assert_eq!(outcomes.recv().await, Some(Outcome::Connected));
        assert_eq!(outcomes.recv().await, Some(Outcome::Response("a".into())));
        assert_eq!(outcomes.recv().await, Some(Outcome::Error("b".into())));
        assert_eq!(outcomes.try_recv(), None);
    }

    #[tokio::test]
    async fn test_consumers_share_one_queue() {
        let channel = OutcomeChannel::new();
        let first = channel.subscribe();
        let second = channel.subscribe();
        channel.emit(Outcome::Response("one".into()));
        channel.emit(Outcome::Response("two".into()));

        assert_eq!(first.try_recv(), Some(Outcome::Response("one".into())));
        assert_eq!(second.try_recv(), Some(Outcome::Response("two".into())));
        assert_eq!(first.try_recv(), None);

        // A late subscriber sees only what is still queued.
        channel.emit(Outcome::Response("three".into()));
        let late = channel.subscribe();
        assert_eq!(late.recv().await, Some(Outcome::Response("three".into())));
    }

    #[tokio::test]
    async fn test_stream_is_lazy() {
        let channel = OutcomeChannel::new();
        let mut stream = Box::pin(channel.subscribe().into_stream());
        channel.emit(Outcome::Response("x".into()));
        assert_eq!(stream.next().await, Some(Outcome::Response("x".into())));

        let pending = tokio::time::timeout(std::time::Duration::from_millis(20), stream.next()).await;
        assert!(pending.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_producers() {
        let channel = Arc::new(OutcomeChannel::new());
        let outcomes = channel.subscribe();
        let tasks: Vec<_> = (0..4)
            .map(|p| {
                let channel = Arc::clone(&channel);
                tokio::spawn(async move {
                    for i in 0..25 {
                        channel.emit(Outcome::Response(format!("{p}-{i}")));
                    }
                })
            })
            .collect();
        for t in tasks {
            t.await.unwrap();
        }

        let mut received = 0;
        while outcomes.try_recv().is_some() {
            received += 1;
        }
        assert_eq!(received, 100);
    }
}
