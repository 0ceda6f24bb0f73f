use crate::error::{Result, TonemarkError};
use std::time::{Duration, Instant};

/// Cooperative wall-clock budget for one decode invocation
///
/// The clock is only read when a limit is set, so unbounded decodes never
/// touch `Instant` (not available on wasm32-unknown-unknown).
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    started: Option<(Instant, Duration)>,
}

impl Budget {
    pub fn unlimited() -> Self {
        Self { started: None }
    }

    pub fn new(limit: Option<Duration>) -> Self {
        Self {
            started: limit.map(|limit| (Instant::now(), limit)),
        }
    }

    pub fn is_limited(&self) -> bool {
        self.started.is_some()
    }

    /// Fails with `Timeout` once the limit has been reached
    pub fn check(&self, candidates_found: usize) -> Result<()> {
        if let Some((start, limit)) = self.started {
            let elapsed = start.elapsed();
            if elapsed >= limit {
                return Err(TonemarkError::Timeout {
                    elapsed_ms: elapsed.as_millis() as u64,
                    candidates_found,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_never_expires() {
        let budget = Budget::unlimited();
        assert!(!budget.is_limited());
        assert!(budget.check(0).is_ok());
    }

    #[test]
    fn test_zero_budget_expires_immediately() {
        let budget = Budget::new(Some(Duration::ZERO));
        let err = budget.check(2).unwrap_err();
        assert!(matches!(err, TonemarkError::Timeout { candidates_found: 2, .. }));
    }

    #[test]
    fn test_generous_budget() {
        let budget = Budget::new(Some(Duration::from_secs(3600)));
        assert!(budget.check(0).is_ok());
    }
}
