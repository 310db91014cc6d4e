//! Request retry policy.
//!
//! Status classification against the configured code sets, the per-request
//! resend budget, and the async loop that applies both while honouring the
//! request's abort token.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify_status, StatusClass};
pub use error::{AttemptError, RequestError};
pub use policy::{RetryDecision, RetryPolicy};
pub use run::{run_with_retry, RetryExit, ABORT_GRACE};
