//! Stability gate: refuses a build whose marker is still being written.
//!
//! A failed check does not retry in place. The caller tries again on a later
//! poll tick; the gate only counts consecutive failures so that persistent
//! instability can be reported once the retry budget is spent.

use std::path::Path;

use crate::source::SourceFs;

/// Poll intervals tolerated before instability is reported.
pub const DEFAULT_RETRY_BUDGET: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    Stable,
    /// Still being written; `attempts` consecutive failed checks so far.
    Unstable { attempts: u32 },
}

#[derive(Debug, Clone)]
pub struct StabilityGate {
    retry_budget: u32,
    failures: u32,
}

impl Default for StabilityGate {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_BUDGET)
    }
}

impl StabilityGate {
    pub fn new(retry_budget: u32) -> Self {
        Self {
            retry_budget: retry_budget.max(1),
            failures: 0,
        }
    }

    pub fn retry_budget(&self) -> u32 {
        self.retry_budget
    }

    pub fn set_retry_budget(&mut self, budget: u32) {
        self.retry_budget = budget.max(1);
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    /// True once the consecutive failures reach the budget.
    pub fn is_exhausted(&self) -> bool {
        self.failures >= self.retry_budget
    }

    pub fn check<F: SourceFs>(&mut self, fs: &F, marker: &Path) -> Stability {
        if fs.is_write_locked(marker) {
            self.failures = self.failures.saturating_add(1);
            log::debug!(
                target: "bankcache::stability",
                "{} still being written ({}/{})",
                marker.display(),
                self.failures,
                self.retry_budget
            );
            Stability::Unstable {
                attempts: self.failures,
            }
        } else {
            self.failures = 0;
            Stability::Stable
        }
    }

    pub fn is_build_stable<F: SourceFs>(&mut self, fs: &F, marker: &Path) -> bool {
        self.check(fs, marker) == Stability::Stable
    }

    /// Forget past failures, e.g. after the user cancels a pending refresh.
    pub fn reset(&mut self) {
        self.failures = 0;
    }
}
