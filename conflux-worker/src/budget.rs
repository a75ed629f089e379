//! Polling retry budget.

/// Where the poll loop stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetState {
    /// Last poll was empty but retries remain
    Idle,
    /// Last poll returned messages
    Draining,
    /// Too many consecutive empty polls; stop
    Exhausted,
}

/// Counts consecutive empty receives. Any non-empty receive resets the
/// counter to the ceiling.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    ceiling: u32,
    remaining: u32,
    state: BudgetState,
}

impl RetryBudget {
    pub fn new(ceiling: u32) -> Self {
        Self {
            ceiling,
            remaining: ceiling,
            state: if ceiling == 0 {
                BudgetState::Exhausted
            } else {
                BudgetState::Idle
            },
        }
    }

    /// Record the size of one receive and return the new state.
    pub fn record(&mut self, received: usize) -> BudgetState {
        if self.state == BudgetState::Exhausted {
            return self.state;
        }
        if received > 0 {
            self.remaining = self.ceiling;
            self.state = BudgetState::Draining;
        } else {
            self.remaining = self.remaining.saturating_sub(1);
            self.state = if self.remaining == 0 {
                BudgetState::Exhausted
            } else {
                BudgetState::Idle
            };
        }
        self.state
    }

    pub fn state(&self) -> BudgetState {
        self.state
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == BudgetState::Exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_polls_exhaust() {
        let mut budget = RetryBudget::new(3);
        assert_eq!(budget.record(0), BudgetState::Idle);
        assert_eq!(budget.record(0), BudgetState::Idle);
        assert_eq!(budget.record(0), BudgetState::Exhausted);
        assert!(budget.is_exhausted());
        // stays exhausted
        assert_eq!(budget.record(5), BudgetState::Exhausted);
    }

    #[test]
    fn test_receipt_resets() {
        let mut budget = RetryBudget::new(3);
        budget.record(0);
        budget.record(0);
        assert_eq!(budget.remaining(), 1);
        assert_eq!(budget.record(2), BudgetState::Draining);
        assert_eq!(budget.remaining(), 3);
        assert_eq!(budget.record(0), BudgetState::Idle);
    }

    #[test]
    fn test_zero_ceiling_starts_exhausted() {
        assert!(RetryBudget::new(0).is_exhausted());
    }
}
