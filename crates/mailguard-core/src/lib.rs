//! Mailguard Core
//!
//! Core types, traits, and utilities shared across Mailguard components.
//!
//! This crate provides:
//! - Compliance data model (issues, results, redactions, policy documents)
//! - Error types and result handling
//! - The typed event union describing review progress
//! - Event sinks with backpressure for publishing those events
//! - A chunk-tolerant, pull-based event stream reader

pub mod emit;
pub mod error;
pub mod event;
pub mod stream;
pub mod types;

pub use emit::{event_channel, ChannelSink, CollectingSink, EventSink};
pub use error::{Error, Result};
pub use event::StreamEvent;
pub use stream::{EventStreamReader, SseDecoder, SseRecord};
pub use types::{
    Category, ComplianceResult, Issue, IterationRecord, IterationStatus, PolicyDocument,
    Redaction, RedactionKind, RedactionOutcome, Severity, Verdict,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::emit::EventSink;
    pub use crate::error::{Error, Result};
    pub use crate::event::StreamEvent;
    pub use crate::types::{Category, ComplianceResult, Issue, Severity, Verdict};
}
