#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};

/// Decides whether a generative call may proceed. Consulted before every call;
/// a refusal is surfaced as `GenerativeError::BudgetExhausted`.
pub trait CostGovernor: Send + Sync {
    fn try_reserve(&self, estimated_cost: u64) -> bool;
}

/// Grants every reservation.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unlimited;

impl CostGovernor for Unlimited {
    fn try_reserve(&self, _estimated_cost: u64) -> bool {
        true
    }
}

/// A shared pool of tokens. Reservations are atomic: concurrent callers can
/// never jointly spend more than the pool holds.
#[derive(Debug)]
pub struct TokenBudget {
    remaining: AtomicU64,
}

impl TokenBudget {
    pub fn new(total: u64) -> Self {
        Self {
            remaining: AtomicU64::new(total),
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining.load(Ordering::Acquire)
    }
}

impl CostGovernor for TokenBudget {
    fn try_reserve(&self, estimated_cost: u64) -> bool {
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| {
                left.checked_sub(estimated_cost)
            })
            .is_ok()
    }
}
