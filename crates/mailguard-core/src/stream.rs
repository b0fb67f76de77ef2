//! Event stream wire format
//!
//! Records follow the text/event-stream framing:
//! ```text
//! event: compliance_result
//! data: {"type":"compliance_result", ...}
//!
//! : keep-alive comment
//! ```
//!
//! [`SseDecoder`] reassembles records from arbitrarily fragmented byte
//! chunks. It is pull-based: bytes are only parsed when the consumer asks
//! for the next record, so a consumer that finishes handling record N before
//! calling [`SseDecoder::next_record`] again never observes record N+1 early.
//! [`EventStreamReader`] wraps a byte stream with the same guarantee.

use bytes::{Buf, BytesMut};
use futures::{ready, Stream, StreamExt};
use pin_project::pin_project;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, trace};

use crate::event::StreamEvent;
use crate::{Error, Result};

/// One logical record of the event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseRecord {
    /// Optional `event:` field
    pub event: Option<String>,

    /// Payload, `data:` lines joined with `\n`
    pub data: String,
}

impl SseRecord {
    /// Create a new record
    pub fn new<E: Into<String>>(event: Option<E>, data: impl Into<String>) -> Self {
        Self {
            event: event.map(Into::into),
            data: data.into(),
        }
    }

    /// Serialize to wire format, including the terminating blank line
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.data.len() + 32);
        if let Some(ref event) = self.event {
            out.push_str("event: ");
            out.push_str(event);
            out.push('\n');
        }
        for line in self.data.split('\n') {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        out
    }
}

/// Encode a keep-alive comment line
pub fn keep_alive_comment(text: &str) -> String {
    format!(": {}\n\n", text)
}

/// Incremental decoder for the event stream framing
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes received but not yet split into lines
    buffer: BytesMut,

    /// `event:` field of the record being assembled
    event: Option<String>,

    /// `data:` lines of the record being assembled
    data: Vec<String>,
}

impl SseDecoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes; nothing is parsed until [`next_record`](Self::next_record)
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Parse buffered lines until one record completes
    ///
    /// Returns `None` when the buffer holds no complete record yet; the
    /// partial state is kept for the next call.
    pub fn next_record(&mut self) -> Option<SseRecord> {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line = self.buffer.split_to(pos + 1);
            line.truncate(pos);
            if line.last() == Some(&b'\r') {
                line.truncate(pos - 1);
            }

            let line = String::from_utf8_lossy(&line);
            if let Some(record) = self.process_line(&line) {
                return Some(record);
            }
        }
        None
    }

    /// Whether bytes or fields of an unterminated record are pending
    pub fn has_partial(&self) -> bool {
        self.buffer.has_remaining() || self.event.is_some() || !self.data.is_empty()
    }

    fn process_line(&mut self, line: &str) -> Option<SseRecord> {
        if line.is_empty() {
            return self.dispatch();
        }

        if line.starts_with(':') {
            trace!(comment = %line, "Skipping comment line");
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            other => trace!(field = %other, "Ignoring unsupported field"),
        }

        None
    }

    fn dispatch(&mut self) -> Option<SseRecord> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseRecord { event, data })
    }
}

/// Pull-based record reader over a fallible byte stream
///
/// The underlying stream is only polled when no complete record is
/// buffered, so reads are driven entirely by the consumer.
#[pin_project]
pub struct EventStreamReader<S> {
    #[pin]
    inner: S,
    decoder: SseDecoder,
    finished: bool,
}

impl<S> EventStreamReader<S> {
    /// Wrap a byte stream
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            decoder: SseDecoder::new(),
            finished: false,
        }
    }
}

impl<S, B, E> EventStreamReader<S>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    /// Adapt into a stream of typed events
    pub fn events(self) -> impl Stream<Item = Result<StreamEvent>> {
        self.map(|record| record.and_then(|r| StreamEvent::from_record(&r)))
    }

    /// Hand every event to `handler`, awaiting it before reading the next one
    ///
    /// Stops after the `done` marker or at end of input and returns the
    /// number of events handled.
    pub async fn for_each_event<F, Fut>(self, mut handler: F) -> Result<usize>
    where
        F: FnMut(StreamEvent) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let events = self.events();
        futures::pin_mut!(events);

        let mut handled = 0;
        while let Some(event) = events.next().await {
            let event = event?;
            let done = event.is_done();
            handler(event).await?;
            handled += 1;
            if done {
                break;
            }
        }
        Ok(handled)
    }
}

impl<S, B, E> Stream for EventStreamReader<S>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    type Item = Result<SseRecord>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(record) = this.decoder.next_record() {
                return Poll::Ready(Some(Ok(record)));
            }

            if *this.finished {
                return Poll::Ready(None);
            }

            match ready!(this.inner.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => this.decoder.feed(chunk.as_ref()),
                Some(Err(e)) => {
                    *this.finished = true;
                    return Poll::Ready(Some(Err(Error::stream(format!(
                        "failed to read event stream: {}",
                        e
                    )))));
                }
                None => {
                    *this.finished = true;
                    if this.decoder.has_partial() {
                        debug!("Event stream ended inside an unterminated record");
                    }
                }
            }
        }
    }
}

/// Decode a complete buffer into records
pub fn decode_all(bytes: &[u8]) -> Vec<SseRecord> {
    let mut decoder = SseDecoder::new();
    decoder.feed(bytes);
    std::iter::from_fn(|| decoder.next_record()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_events() -> Vec<StreamEvent> {
        vec![
            StreamEvent::Start {
                goal: "Review".to_string(),
            },
            StreamEvent::IterationStart { iteration: 1 },
            StreamEvent::ComplianceResult {
                iteration: 1,
                pass: false,
                issues_count: 2,
                summary: "Found 2 compliance issue(s)".to_string(),
            },
            StreamEvent::RewriteComplete {
                iteration: 1,
                full_text: "Dear customer,\r\nüñí text\n\nthanks".to_string(),
                preview: "Dear customer".to_string(),
            },
            StreamEvent::Done,
        ]
    }

    fn encode_events(events: &[StreamEvent]) -> Vec<u8> {
        let mut wire = String::new();
        for (i, event) in events.iter().enumerate() {
            wire.push_str(&event.to_record().unwrap().encode());
            if i == 1 {
                wire.push_str(&keep_alive_comment("ping"));
            }
        }
        wire.into_bytes()
    }

    fn decode_chunks(chunks: Vec<Vec<u8>>) -> Vec<StreamEvent> {
        let stream = futures::stream::iter(
            chunks
                .into_iter()
                .map(Ok::<_, std::io::Error>),
        );
        let reader = EventStreamReader::new(stream);
        futures::executor::block_on(async move {
            reader
                .events()
                .map(|e| e.unwrap())
                .collect::<Vec<_>>()
                .await
        })
    }

    #[test]
    fn test_single_record() {
        let records = decode_all(b"event: start\ndata: {\"a\":1}\n\n");
        assert_eq!(records, vec![SseRecord::new(Some("start"), "{\"a\":1}")]);
    }

    #[test]
    fn test_multi_line_data_joined() {
        let records = decode_all(b"data: first\ndata: second\n\n");
        assert_eq!(records[0].data, "first\nsecond");
        assert_eq!(records[0].event, None);
    }

    #[test]
    fn test_comments_discarded() {
        let records = decode_all(b": keep-alive\n\n:another\ndata: x\n\n");
        assert_eq!(records, vec![SseRecord::new(None::<&str>, "x")]);
    }

    #[test]
    fn test_crlf_normalized() {
        let records = decode_all(b"event: a\r\ndata: one\r\n\r\nevent: b\r\ndata: two\r\n\r\n");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event.as_deref(), Some("a"));
        assert_eq!(records[1].data, "two");
    }

    #[test]
    fn test_partial_record_buffered_across_feeds() {
        let mut decoder = SseDecoder::new();
        decoder.feed(b"event: rew");
        assert!(decoder.next_record().is_none());
        decoder.feed(b"riting\ndata: {\"iter");
        assert!(decoder.next_record().is_none());
        decoder.feed(b"ation\":1}\r");
        assert!(decoder.next_record().is_none());
        decoder.feed(b"\n\r\n");

        let record = decoder.next_record().unwrap();
        assert_eq!(record.event.as_deref(), Some("rewriting"));
        assert_eq!(record.data, "{\"iteration\":1}");
        assert!(!decoder.has_partial());
    }

    #[test]
    fn test_next_record_is_lazy() {
        let mut decoder = SseDecoder::new();
        decoder.feed(b"data: 1\n\ndata: 2\n\n");

        assert_eq!(decoder.next_record().unwrap().data, "1");
        // The second record is still unparsed bytes
        assert!(decoder.has_partial());
        assert_eq!(decoder.next_record().unwrap().data, "2");
        assert!(decoder.next_record().is_none());
    }

    #[test]
    fn test_record_without_data_is_dropped() {
        let records = decode_all(b"event: orphan\n\ndata: kept\n\n");
        assert_eq!(records, vec![SseRecord::new(None::<&str>, "kept")]);
    }

    #[test]
    fn test_unterminated_tail_is_not_emitted() {
        let records = decode_all(b"data: complete\n\ndata: partial");
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_one_byte_chunks_match_whole_buffer() {
        let events = sample_events();
        let wire = encode_events(&events);

        let whole = decode_chunks(vec![wire.clone()]);
        let bytewise = decode_chunks(wire.iter().map(|b| vec![*b]).collect());

        assert_eq!(whole, events);
        assert_eq!(bytewise, events);
    }

    #[test]
    fn test_stream_error_surfaces() {
        let stream = futures::stream::iter(vec![
            Ok(b"data: {\"type\":\"done\"}\n".to_vec()),
            Err("connection reset"),
        ]);
        let reader = EventStreamReader::new(stream);
        let results: Vec<_> = futures::executor::block_on(reader.collect());
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[tokio::test]
    async fn test_for_each_event_stops_at_done() {
        let mut wire = encode_events(&sample_events());
        wire.extend_from_slice(b"data: {\"type\":\"start\",\"goal\":\"ignored\"}\n\n");
        let stream = futures::stream::iter(vec![Ok::<_, std::io::Error>(wire)]);

        let mut seen = Vec::new();
        let handled = EventStreamReader::new(stream)
            .for_each_event(|event| {
                seen.push(event.name());
                async { Ok(()) }
            })
            .await
            .unwrap();

        assert_eq!(handled, 5);
        assert_eq!(seen.last(), Some(&"done"));
    }

    proptest! {
        #[test]
        fn prop_chunking_does_not_change_events(cuts in proptest::collection::vec(0usize..400, 0..20)) {
            let events = sample_events();
            let wire = encode_events(&events);

            let mut cuts: Vec<usize> = cuts.into_iter().map(|c| c % (wire.len() + 1)).collect();
            cuts.sort_unstable();
            cuts.dedup();

            let mut chunks = Vec::new();
            let mut start = 0;
            for cut in cuts {
                chunks.push(wire[start..cut].to_vec());
                start = cut;
            }
            chunks.push(wire[start..].to_vec());

            prop_assert_eq!(decode_chunks(chunks), events);
        }
    }
}
