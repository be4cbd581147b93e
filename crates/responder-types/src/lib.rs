//! Shared domain types for the responder matching engine.
//!
//! This crate defines the entities the engine operates on (volunteers,
//! emergency requests, assignments), the events it publishes, the shared
//! error enum, and the clock abstraction that makes temporal behaviour
//! testable. Every other crate in the workspace depends on this one.

pub mod assignment;
pub mod clock;
pub mod common;
pub mod emergency;
pub mod errors;
pub mod events;
pub mod volunteer;

pub use assignment::*;
pub use clock::*;
pub use common::*;
pub use emergency::*;
pub use errors::*;
pub use events::*;
pub use volunteer::*;
