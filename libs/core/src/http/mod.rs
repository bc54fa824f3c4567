mod client;
mod retry;

pub use client::{parse_retry_after, HttpError, RetryingHttpClient};
pub use retry::{retry, Attempt, RetryPolicy};
