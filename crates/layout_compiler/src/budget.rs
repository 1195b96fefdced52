//! Wall-clock budgets for compile and hydration work.

use std::time::{Duration, Instant};

use thiserror::Error;

/// How many loop iterations pass between clock reads.
pub(crate) const CHECK_INTERVAL: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("time budget of {}ms exhausted after {}ms", budget.as_millis(), elapsed.as_millis())]
pub struct BudgetExceeded {
    pub budget: Duration,
    pub elapsed: Duration,
}

/// A point in time after which work is abandoned.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    pub fn new(budget: Option<Duration>) -> Self {
        Self::starting_at(Instant::now(), budget)
    }

    pub const fn starting_at(start: Instant, budget: Option<Duration>) -> Self {
        Self { start, budget }
    }

    /// A deadline that never expires.
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        self.budget.is_some_and(|budget| self.start.elapsed() > budget)
    }

    /// Fail once the budget is spent.
    pub fn check(&self) -> Result<(), BudgetExceeded> {
        match self.budget {
            Some(budget) => {
                let elapsed = self.start.elapsed();
                if elapsed > budget {
                    tracing::warn!(
                        budget_ms = budget.as_millis(),
                        elapsed_ms = elapsed.as_millis(),
                        "time budget exhausted"
                    );
                    Err(BudgetExceeded { budget, elapsed })
                } else {
                    Ok(())
                }
            }
            None => Ok(()),
        }
    }

    /// [`check`](Self::check) every [`CHECK_INTERVAL`] iterations.
    pub(crate) fn tick(&self, iteration: usize) -> Result<(), BudgetExceeded> {
        if iteration % CHECK_INTERVAL == 0 {
            self.check()
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_budget_expires() {
        let start = Instant::now() - Duration::from_millis(5);
        let deadline = Deadline::starting_at(start, Some(Duration::ZERO));
        assert!(deadline.is_expired());
        let err = deadline.check().unwrap_err();
        assert_eq!(err.budget, Duration::ZERO);
        assert!(deadline.tick(1).is_ok());
        assert!(deadline.tick(64).is_err());
    }

    #[test]
    fn test_unbounded_never_expires() {
        let deadline = Deadline::unbounded();
        assert!(!deadline.is_expired());
        assert!(deadline.check().is_ok());
    }
}
