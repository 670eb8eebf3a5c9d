//! Evaluation execution controls.
//!
//! Bundles the cooperative controls an [`crate::evaluator::ExpressionEvaluator`]
//! run is given before it starts folding an expression tree:
//! - timeout / explicit cancellation ([`timeout`])
//! - resource limits on memory, result size and row width ([`limits`])
//!
//! There is no query cache here: `evaluate()` returns a lazy iterator rather
//! than a materialized, hashable query plan, so there is nothing stable to
//! key a compiled-query cache on.
//!
//! ## Example
//!
//! ```rust,no_run
//! use graphcore::execution::ExecutionConfig;
//! use std::time::Duration;
//!
//! let config = ExecutionConfig::default()
//!     .with_timeout(Duration::from_secs(30))
//!     .with_max_results(100_000);
//! ```

mod limits;
mod timeout;

pub use limits::{MemoryTracker, ResourceError, ResourceLimits};
pub use timeout::{CancelHandle, QueryTimeout, TimeoutError};

use std::time::Duration;

/// Configuration bundle threaded through a single `evaluate()` call.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Evaluation timeout duration (None = no timeout)
    pub timeout: Option<Duration>,

    /// Resource limits
    pub limits: ResourceLimits,
}

impl ExecutionConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.limits.max_result_size = Some(max);
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn timeout_controller(&self) -> QueryTimeout {
        QueryTimeout::new(self.timeout)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            timeout: Some(Duration::from_secs(60)),
            limits: ResourceLimits::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_methods_chain() {
        let config = ExecutionConfig::default()
            .with_timeout(Duration::from_secs(30))
            .with_max_results(100_000);

        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.limits.max_result_size, Some(100_000));
    }

    #[test]
    fn timeout_controller_reflects_config() {
        let config = ExecutionConfig::default().with_timeout(Duration::from_millis(5));
        let controller = config.timeout_controller();
        assert!(controller.check().is_ok());
    }
}
