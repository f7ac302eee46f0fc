//! Telemetry for the click gate.
//!
//! The gate emits a [`GateEvent`] for every state change it commits and for every store problem
//! it runs into. Events flow through `TelemetrySink` implementations, which are plain
//! `tower::Service<GateEvent>`s, so sinks can log, buffer, fan out or forward them.
//!
//! # Event Types
//!
//! - **Admission**: `Opened`, `Expired`, `Denied`, `FloodWarning`, `Blocked`
//! - **Release**: `Finalized`, `Refused`, `Forced`
//! - **Store**: `Conflict`, `Failure`, `Timeout`
//!
//! Emission is best effort: a failing sink never changes a decision.

pub mod events;
pub mod sinks;

pub use events::{AdmissionEvent, GateEvent, ReleaseEvent, StoreEvent};
pub use sinks::{
    emit_best_effort, ComposedSinkError, LogSink, MemorySink, MulticastSink, NonBlockingSink,
    NullSink, TelemetrySink,
};
