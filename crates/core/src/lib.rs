//! `gatepass-core`: identity primitives shared by every other crate.
//!
//! This crate contains **pure** building blocks (no I/O, no network).

pub mod clock;
pub mod error;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::DomainError;
pub use id::{ProfileId, ServiceNo, UserType};
