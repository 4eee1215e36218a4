//! Core data model for the resident request bridge.
//!
//! This crate provides the values that cross the bridge:
//! - `IncomingRequest` / `OutgoingResponse` - the transport side
//! - `NativeRequest` / `NativeResponse` - the hosted application side
//! - `Headers` - case-preserving header multimap
//! - `ResponseCookie` - `Set-Cookie` serialization
//! - `RequestId` / `LifecyclePhase` - request tracking

mod context;
mod cookie;
mod headers;
mod lifecycle;
mod native;
mod request;
mod response;
mod trust;

pub use context::*;
pub use cookie::*;
pub use headers::*;
pub use lifecycle::*;
pub use native::*;
pub use request::*;
pub use response::*;
pub use trust::*;

pub use http::{Method, StatusCode};
