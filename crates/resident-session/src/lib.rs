//! Session handling for the resident request bridge.
//!
//! - `SessionContext` - the worker-wide session identity and active session
//! - `SessionStore` / `MemorySessionStore` - persistence between requests
//! - `SessionId` - unguessable session identifiers

mod context;
mod error;
mod id;
mod store;

pub use context::{ActiveSession, PrimeOutcome, SessionContext, SessionSettings};
pub use error::SessionError;
pub use id::{SessionId, MAX_SESSION_ID_LEN};
pub use store::{MemorySessionStore, SessionData, SessionStore};
