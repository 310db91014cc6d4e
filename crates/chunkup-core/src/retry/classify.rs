//! Classify HTTP status codes against the configured code sets.

use crate::config::UploadConfig;

/// Which configured set a response status falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// In `success_codes`.
    Success,
    /// In `skip_codes`.
    Skip,
    /// In `fail_codes`: the request fails without resending.
    Fail,
    /// In none of the sets: treated like a transport error (resend).
    Unclassified,
}

/// Classify `status`. The sets are disjoint once the config has been validated;
/// if they are not, success wins over skip and skip over fail.
pub fn classify_status(cfg: &UploadConfig, status: u16) -> StatusClass {
    if cfg.success_codes.contains(&status) {
        StatusClass::Success
    } else if cfg.skip_codes.contains(&status) {
        StatusClass::Skip
    } else if cfg.fail_codes.contains(&status) {
        StatusClass::Fail
    } else {
        StatusClass::Unclassified
    }
}
