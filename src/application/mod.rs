//! Application layer: error normalization and bounded waiting
//!
//! Sits between the raw infrastructure errors and the CLI.

pub mod error;
pub mod wait;

pub use error::{classify, ErrorKind, NormalizedError};
pub use wait::{poll_until, PollOutcome, PollPolicy};
