//! State quarantine for the resident request bridge.
//!
//! A worker reuses one application instance for every request it serves.
//! This crate owns everything that must be wiped between two requests:
//! - `Ambient` - side-channel headers, stray output and the session
//! - `StateResetRegistry` - ordered, named resets for application subsystems
//! - `UploadJanitor` - temporary upload copies awaiting deletion
//! - `QuarantineEngine` - runs all of the above after every request

mod ambient;
mod engine;
mod error;
mod janitor;
mod registry;
mod subsystems;

pub use ambient::{Ambient, OutputBuffer};
pub use engine::{QuarantineEngine, QuarantineReport};
pub use error::{RegistryError, ResetError};
pub use janitor::{SweepReport, UploadJanitor};
pub use registry::{ResetAction, Resettable, StateResetRegistry};
pub use subsystems::{Profiler, RecordLog, Stopwatch};
