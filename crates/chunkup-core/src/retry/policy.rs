/// Decision returned by the retry policy after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Send the same request again.
    Resend,
    /// Stop and resolve the task as failed.
    GiveUp,
}

/// Per-request resend budget.
///
/// Each request task owns its own counter; a transport error or an
/// unclassified status spends one resend. Resends are immediate and reuse
/// the original request parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of resends after the first attempt.
    pub retry_count: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { retry_count: 3 }
    }
}

impl RetryPolicy {
    pub fn new(retry_count: u32) -> Self {
        Self { retry_count }
    }

    /// `resends` is how many resends this request has already made.
    pub fn decide(&self, resends: u32) -> RetryDecision {
        if resends < self.retry_count {
            RetryDecision::Resend
        } else {
            RetryDecision::GiveUp
        }
    }
}
