//! Common utilities and types shared across DocVault modules.
//!
//! This module provides foundational types that are used throughout the codebase:
//! the error taxonomy, object identifiers and storage locators, an injectable
//! clock, and the bounded retry executor used against remote backends.

pub mod clock;
pub mod error;
pub mod retry;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use retry::{RetryConfig, RetryExecutor};
pub use types::{Locator, ObjectId};
