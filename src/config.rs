//! # Scan Configuration
//!
//! Knobs for how a [`RangeScanner`](crate::scanner::RangeScanner) paces and
//! correlates its probes.
//!
//! The inter-request delay is a deliberate rate limit: field devices behind
//! gateways are easily overrun by back-to-back requests.

use std::time::Duration;

/// Default per-request timeout in milliseconds.
pub const DEFAULT_SCAN_TIMEOUT_MS: u64 = 1000;

/// Default delay between consecutive probes in milliseconds.
pub const DEFAULT_INTER_REQUEST_DELAY_MS: u64 = 50;

/// How TCP sessions are used across the probes of one scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPolicy {
    /// Keep one session open for the whole scan; reopen only after a fault
    #[default]
    Reuse,
    /// Connect and disconnect around every probe
    PerProbe,
}

/// Where request transaction IDs come from.
///
/// `FromTarget` reuses the probed address (or unit ID) as the transaction ID.
/// That is only sound while one request is in flight at a time, which is
/// always the case for this scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionIdMode {
    #[default]
    FromTarget,
    /// Wrapping counter starting at 1
    Sequential,
}

/// Scanner configuration.
///
/// # Example
///
/// ```rust
/// use modbus_scanner::{ScanConfig, SessionPolicy};
/// use std::time::Duration;
///
/// let config = ScanConfig::new()
///     .with_timeout(Duration::from_millis(500))
///     .with_inter_request_delay(Duration::from_millis(10))
///     .with_session_policy(SessionPolicy::PerProbe);
///
/// assert_eq!(config.timeout, Duration::from_millis(500));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    /// Per-request timeout, also used for connecting.
    pub timeout: Duration,
    /// Pause between consecutive probes; zero disables it.
    pub inter_request_delay: Duration,
    pub session_policy: SessionPolicy,
    pub transaction_ids: TransactionIdMode,
    /// Reject responses whose transaction ID differs from the request's.
    pub strict_transaction_check: bool,
}

impl ScanConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect-per-probe sweep: a fresh connection for every probe
    /// and no transaction ID check.
    pub fn legacy() -> Self {
        Self {
            session_policy: SessionPolicy::PerProbe,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_inter_request_delay(mut self, delay: Duration) -> Self {
        self.inter_request_delay = delay;
        self
    }

    pub fn with_session_policy(mut self, policy: SessionPolicy) -> Self {
        self.session_policy = policy;
        self
    }

    pub fn with_transaction_ids(mut self, mode: TransactionIdMode) -> Self {
        self.transaction_ids = mode;
        self
    }

    pub fn with_strict_transaction_check(mut self, strict: bool) -> Self {
        self.strict_transaction_check = strict;
        self
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_SCAN_TIMEOUT_MS),
            inter_request_delay: Duration::from_millis(DEFAULT_INTER_REQUEST_DELAY_MS),
            session_policy: SessionPolicy::default(),
            transaction_ids: TransactionIdMode::default(),
            strict_transaction_check: false,
        }
    }
}
