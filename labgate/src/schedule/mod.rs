//! Batch scheduling engine.
//!
//! Everything that decides *when* a batch runs and *whether* its secret may be released lives here,
//! separated from HTTP and storage concerns:
//!
//! - [`window`]: resolves local date/time pairs into UTC instants and classifies a batch's phase
//! - [`clock`]: the injectable source of "now"
//! - [`overlap`]: detects trainers who would be double-booked
//! - [`validation`]: the create/update pipeline (structure, references, time rules, guards, overlap)
//! - [`gate`]: the credential release decision
//!
//! Phases are never stored. Every read recomputes them from the clock, and nothing a client sends
//! about a batch's status is consulted.

pub mod clock;
pub mod gate;
pub mod overlap;
pub mod validation;
pub mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use window::{BatchPhase, ScheduleRules, TimeWindow};
