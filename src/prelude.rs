//! Convenient re-exports for common clickgate types.
pub use crate::{
    config::{ConfigError, GateConfig},
    decision::{Decision, RenderedDecision},
    error::{AdmissionError, ErrorKind, GateError},
    gate::ClickGate,
    middleware::{ClickGateLayer, HasSubject},
    policy::{EscalationPolicy, FloodIntensity, PolicyError},
    record::{SubjectId, SubjectRecord},
    store::{InMemoryRecordStore, RecordStore},
    telemetry::{GateEvent, LogSink, MemorySink, NullSink, TelemetrySink},
};
