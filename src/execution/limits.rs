//! Resource Limits Module
//!
//! Provides resource limit enforcement for query execution:
//! - Memory usage limits
//! - Result set size limits
//! - Intermediate result limits
//!
//! ## Design
//!
//! Uses cooperative checking - query execution code should periodically
//! call `check_*` methods to verify limits are not exceeded.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Resource limit error
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResourceError {
    /// Memory limit exceeded
    #[error("Memory limit exceeded: used {used} bytes, limit {limit} bytes")]
    MemoryLimitExceeded { limit: usize, used: usize },

    /// Result size limit exceeded
    #[error("Result size limit exceeded: {actual} tuples, limit {limit} tuples")]
    ResultSizeLimitExceeded { limit: usize, actual: usize },

    /// Intermediate result size exceeded
    #[error(
        "Intermediate result limit exceeded at '{stage}': {actual} tuples, limit {limit} tuples"
    )]
    IntermediateResultExceeded {
        limit: usize,
        actual: usize,
        stage: String,
    },

    /// Row width (tuple arity) exceeded
    #[error("Row width limit exceeded: {actual} columns, limit {limit} columns")]
    RowWidthExceeded { limit: usize, actual: usize },
}

/// Resource limits configuration
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    /// Maximum memory usage in bytes (None = unlimited)
    pub max_memory_bytes: Option<usize>,

    /// Maximum number of result tuples returned from `evaluate` (None = unlimited)
    pub max_result_size: Option<usize>,

    /// Maximum number of tuples materialized in any intermediate expression
    /// result (None = unlimited)
    pub max_intermediate_size: Option<usize>,

    /// Maximum row width (number of bound variables per result tuple)
    pub max_row_width: Option<usize>,

    /// Maximum BFS depth for variable-length edge expansion (None = unlimited)
    pub max_recursion_depth: Option<usize>,
}

impl ResourceLimits {
    /// No limits at all. Suitable for trusted, offline batch jobs.
    pub fn unlimited() -> Self {
        ResourceLimits {
            max_memory_bytes: None,
            max_result_size: None,
            max_intermediate_size: None,
            max_row_width: None,
            max_recursion_depth: None,
        }
    }

    pub fn check_memory(&self, used: usize) -> Result<(), ResourceError> {
        if let Some(limit) = self.max_memory_bytes {
            if used > limit {
                return Err(ResourceError::MemoryLimitExceeded { limit, used });
            }
        }
        Ok(())
    }

    pub fn check_result_size(&self, actual: usize) -> Result<(), ResourceError> {
        if let Some(limit) = self.max_result_size {
            if actual > limit {
                return Err(ResourceError::ResultSizeLimitExceeded { limit, actual });
            }
        }
        Ok(())
    }

    pub fn check_intermediate_size(
        &self,
        stage: &str,
        actual: usize,
    ) -> Result<(), ResourceError> {
        if let Some(limit) = self.max_intermediate_size {
            if actual > limit {
                return Err(ResourceError::IntermediateResultExceeded {
                    limit,
                    actual,
                    stage: stage.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn check_row_width(&self, actual: usize) -> Result<(), ResourceError> {
        if let Some(limit) = self.max_row_width {
            if actual > limit {
                return Err(ResourceError::RowWidthExceeded { limit, actual });
            }
        }
        Ok(())
    }

    pub fn check_recursion_depth(&self, depth: usize) -> Result<(), ResourceError> {
        if let Some(limit) = self.max_recursion_depth {
            if depth > limit {
                return Err(ResourceError::IntermediateResultExceeded {
                    limit,
                    actual: depth,
                    stage: "variable_length_expand".to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Default for ResourceLimits {
    /// Conservative defaults suitable for an interactive, multi-tenant server.
    fn default() -> Self {
        ResourceLimits {
            max_memory_bytes: Some(1 << 30), // 1 GiB
            max_result_size: Some(1_000_000),
            max_intermediate_size: Some(10_000_000),
            max_row_width: Some(64),
            max_recursion_depth: Some(10_000),
        }
    }
}

/// Tracks a running total of bytes charged against a [`ResourceLimits`]
/// memory budget. Shared across threads evaluating the same expression tree
/// via scratch-matrix allocation.
///
/// Charging is advisory: callers `track` an estimated allocation size before
/// performing it and `release` once the allocation is freed. There is no
/// hook into the global allocator, so this bounds cooperative callers only —
/// consistent with the rest of the evaluator's cancellation model, which is
/// polled rather than preemptive.
#[derive(Debug, Clone)]
pub struct MemoryTracker {
    current: Arc<AtomicUsize>,
    limit: Option<usize>,
}

impl MemoryTracker {
    pub fn new(limit: Option<usize>) -> Self {
        MemoryTracker {
            current: Arc::new(AtomicUsize::new(0)),
            limit,
        }
    }

    /// Charges `bytes` against the budget, failing without mutating state
    /// if the charge would exceed the limit.
    pub fn track(&self, bytes: usize) -> Result<(), ResourceError> {
        let prev = self.current.fetch_add(bytes, Ordering::Relaxed);
        let used = prev + bytes;
        if let Some(limit) = self.limit {
            if used > limit {
                self.current.fetch_sub(bytes, Ordering::Relaxed);
                return Err(ResourceError::MemoryLimitExceeded { limit, used });
            }
        }
        Ok(())
    }

    /// Releases a previously tracked charge. Saturates at zero so a
    /// double-release cannot underflow the counter.
    pub fn release(&self, bytes: usize) {
        self.current
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| {
                Some(cur.saturating_sub(bytes))
            })
            .ok();
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}

impl Default for MemoryTracker {
    fn default() -> Self {
        MemoryTracker::new(Some(1 << 30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_memory_within_limit() {
        let limits = ResourceLimits {
            max_memory_bytes: Some(1000),
            ..ResourceLimits::unlimited()
        };
        assert!(limits.check_memory(500).is_ok());
        assert!(limits.check_memory(1000).is_ok());
    }

    #[test]
    fn check_memory_exceeded() {
        let limits = ResourceLimits {
            max_memory_bytes: Some(1000),
            ..ResourceLimits::unlimited()
        };
        let err = limits.check_memory(1001).unwrap_err();
        assert!(matches!(err, ResourceError::MemoryLimitExceeded { limit: 1000, used: 1001 }));
    }

    #[test]
    fn unlimited_never_fails() {
        let limits = ResourceLimits::unlimited();
        assert!(limits.check_memory(usize::MAX).is_ok());
        assert!(limits.check_result_size(usize::MAX).is_ok());
        assert!(limits.check_row_width(usize::MAX).is_ok());
        assert!(limits.check_recursion_depth(usize::MAX).is_ok());
    }

    #[test]
    fn default_limits_are_finite() {
        let limits = ResourceLimits::default();
        assert!(limits.max_memory_bytes.is_some());
        assert!(limits.max_recursion_depth.is_some());
    }

    #[test]
    fn tracker_tracks_and_releases() {
        let tracker = MemoryTracker::new(Some(100));
        tracker.track(60).unwrap();
        assert_eq!(tracker.current(), 60);
        tracker.track(40).unwrap();
        assert_eq!(tracker.current(), 100);
        tracker.release(40);
        assert_eq!(tracker.current(), 60);
    }

    #[test]
    fn tracker_rejects_overcharge_without_mutating() {
        let tracker = MemoryTracker::new(Some(100));
        tracker.track(90).unwrap();
        assert!(tracker.track(20).is_err());
        assert_eq!(tracker.current(), 90);
    }

    #[test]
    fn tracker_release_saturates_at_zero() {
        let tracker = MemoryTracker::new(None);
        tracker.release(50);
        assert_eq!(tracker.current(), 0);
    }
}
