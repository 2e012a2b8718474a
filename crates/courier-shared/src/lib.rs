//! # courier-shared
//!
//! Types shared between the courier store and server: record identifiers,
//! the live-push wire envelope, and input validation helpers.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;
pub mod validation;

pub use error::{IdError, ValidationError};
