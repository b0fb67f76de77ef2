//! Event sinks used by the review loop to publish its progress

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::event::StreamEvent;
use crate::{Error, Result};

/// Destination for loop events
///
/// `emit` suspends until the consumer has room for the event, which is the
/// loop's only backpressure point besides the decision policy.
#[async_trait]
pub trait EventSink: Send {
    /// Publish one event
    async fn emit(&mut self, event: StreamEvent) -> Result<()>;

    /// Whether the consumer is known to be gone
    fn is_closed(&self) -> bool {
        false
    }
}

/// Sink writing into a bounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<StreamEvent>,
}

impl ChannelSink {
    /// Wrap an existing sender
    pub fn new(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn emit(&mut self, event: StreamEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|e| Error::transport(format!("event consumer disconnected before '{}'", e.0.name())))
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create a bounded event channel
///
/// A capacity of 1 keeps at most one event in flight between the loop and
/// its consumer.
pub fn event_channel(capacity: usize) -> (ChannelSink, mpsc::Receiver<StreamEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ChannelSink::new(tx), rx)
}

/// Sink that keeps every event in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Vec<StreamEvent>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far
    pub fn events(&self) -> &[StreamEvent] {
        &self.events
    }

    /// Names of the events received so far
    pub fn names(&self) -> Vec<&'static str> {
        self.events.iter().map(StreamEvent::name).collect()
    }

    pub fn into_events(self) -> Vec<StreamEvent> {
        self.events
    }
}

#[async_trait]
impl EventSink for CollectingSink {
    async fn emit(&mut self, event: StreamEvent) -> Result<()> {
        self.events.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_reports_disconnect() {
        let (mut sink, rx) = event_channel(1);
        assert!(!sink.is_closed());

        drop(rx);
        assert!(sink.is_closed());

        let err = sink.emit(StreamEvent::Done).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_channel_sink_applies_backpressure() {
        let (mut sink, mut rx) = event_channel(1);
        sink.emit(StreamEvent::Rewriting { iteration: 1 }).await.unwrap();

        // The slot is taken; the next send must wait for the consumer.
        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            sink.emit(StreamEvent::Done),
        )
        .await;
        assert!(pending.is_err());

        assert_eq!(rx.recv().await, Some(StreamEvent::Rewriting { iteration: 1 }));
        sink.emit(StreamEvent::Done).await.unwrap();
        assert_eq!(rx.recv().await, Some(StreamEvent::Done));
    }

    #[tokio::test]
    async fn test_collecting_sink_keeps_order() {
        let mut sink = CollectingSink::new();
        sink.emit(StreamEvent::Rewriting { iteration: 1 }).await.unwrap();
        sink.emit(StreamEvent::Done).await.unwrap();
        assert_eq!(sink.names(), vec!["rewriting", "done"]);
    }
}
