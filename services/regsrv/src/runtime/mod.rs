//! Poll/command driver and its scheduling helpers

pub mod midnight;
pub mod poll;
pub mod retry;

pub use poll::{PollDriver, PollSettings};
pub use retry::{RetryError, RetryHelper, RetryPolicy};
