#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # clickgate
//!
//! Per-subject click admission with flood escalation.
//!
//! Every subject (a user id, an account, ...) gets one record holding a click counter and an
//! expiry. Clicks inside an open cycle are counted; enough of them earn a flood warning, then
//! block tiers with growing cool-downs. Closing the cycle (a "finalize") resets the counter unless
//! the subject is blocked, and a stale cycle resets itself on the next click.
//!
//! ## Features
//!
//! - **Pure state machine** ([`AdmissionEngine`]) parameterized by an [`EscalationPolicy`]
//! - **Race-free persistence**: versioned conditional writes through any [`RecordStore`]
//! - **Tower middleware** ([`ClickGateLayer`]) that gates a service and releases after the call
//! - **Telemetry** through `tower::Service` sinks, structured logging through `tracing`
//! - **Configuration** from environment variables or JSON ([`GateConfig`])
//!
//! ## Quick Start
//!
//! ```rust
//! use clickgate::{ClickGate, Decision, EscalationPolicy, InMemoryRecordStore};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), clickgate::GateError> {
//!     let gate = ClickGate::new(InMemoryRecordStore::new(), EscalationPolicy::default());
//!
//!     let decision = gate.evaluate_click("user-42").await?;
//!     assert!(decision.is_allowed());
//!
//!     // Second click inside the open cycle is counted but not admitted.
//!     let decision = gate.evaluate_click("user-42").await?;
//!     assert!(matches!(decision, Decision::Denied { .. }));
//!     assert_eq!(gate.render(&decision).declaration, "click-denied");
//!
//!     gate.finalize_click("user-42").await?;
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod format;
pub mod gate;
pub mod middleware;
pub mod policy;
pub mod prelude;
pub mod record;
pub mod sleeper;
pub mod store;
pub mod telemetry;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, GateConfig};
pub use decision::{Decision, RenderedDecision};
pub use engine::{AdmissionEngine, Step, Transition};
pub use error::{AdmissionError, BoxError, ErrorKind, GateError};
pub use format::TimeFormatter;
pub use gate::ClickGate;
pub use middleware::{ClickGateLayer, ClickGateService, HasSubject};
pub use policy::{EscalationPolicy, FloodIntensity, PolicyError, Tier};
pub use record::{CycleStatus, SubjectId, SubjectIdError, SubjectRecord};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use store::{InMemoryRecordStore, RecordStore};
