//! Refresh cooldown: turns raw change signals into a refresh decision.
//!
//! ```text
//! Idle --change--> ChangeObserved --tick--> CountingDown --quiet >= cooldown--> Ready
//! Ready --begin--> Refreshing --success--> Idle
//! ChangeObserved --tick, Manual--> Suppressed
//! any --cancel--> Idle
//! ```
//!
//! A change observed while counting down (or while Ready but not yet consumed)
//! restarts the countdown, so a refresh only happens after a quiet period.

use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownPolicy {
    /// Refresh after this much quiet. Zero refreshes on the next tick.
    After(Duration),
    /// Never becomes Ready on its own; someone has to `confirm`.
    Prompt,
    /// Changes are suppressed; only an explicit refresh request runs.
    Manual,
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        CooldownPolicy::After(Duration::from_secs(5))
    }
}

impl CooldownPolicy {
    pub fn cooldown(self) -> Option<Duration> {
        match self {
            CooldownPolicy::After(d) => Some(d),
            _ => None,
        }
    }
}

impl fmt::Display for CooldownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CooldownPolicy::After(d) => write!(f, "{}s", d.as_secs_f32()),
            CooldownPolicy::Prompt => write!(f, "prompt"),
            CooldownPolicy::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    ChangeObserved,
    CountingDown,
    Ready,
    Refreshing,
    Suppressed,
}

#[derive(Debug, Clone)]
pub struct RefreshCooldown {
    policy: CooldownPolicy,
    state: RefreshState,
    last_change: Option<Instant>,
    changed_while_refreshing: bool,
}

impl RefreshCooldown {
    pub fn new(policy: CooldownPolicy) -> Self {
        Self {
            policy,
            state: RefreshState::Idle,
            last_change: None,
            changed_while_refreshing: false,
        }
    }

    pub fn policy(&self) -> CooldownPolicy {
        self.policy
    }

    pub fn state(&self) -> RefreshState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == RefreshState::Ready
    }

    /// A change was seen at `now`.
    pub fn observe_change(&mut self, now: Instant) {
        self.last_change = Some(now);
        match self.state {
            RefreshState::Suppressed => {}
            RefreshState::Refreshing => self.changed_while_refreshing = true,
            _ => self.transition(RefreshState::ChangeObserved),
        }
    }

    /// Advance time-driven transitions.
    pub fn tick(&mut self, now: Instant) -> RefreshState {
        if self.state == RefreshState::ChangeObserved {
            match self.policy {
                CooldownPolicy::After(_) => self.transition(RefreshState::CountingDown),
                CooldownPolicy::Prompt => {}
                CooldownPolicy::Manual => self.transition(RefreshState::Suppressed),
            }
        }

        if self.state == RefreshState::CountingDown && self.time_remaining(now) == Some(Duration::ZERO) {
            self.transition(RefreshState::Ready);
        }

        self.state
    }

    /// Time left before the countdown completes. `None` when no countdown applies.
    pub fn time_remaining(&self, now: Instant) -> Option<Duration> {
        match self.state {
            RefreshState::Ready => Some(Duration::ZERO),
            RefreshState::ChangeObserved | RefreshState::CountingDown => {
                let cooldown = self.policy.cooldown()?;
                let elapsed = now.saturating_duration_since(self.last_change?);
                Some(cooldown.saturating_sub(elapsed))
            }
            _ => None,
        }
    }

    pub fn time_since_change(&self, now: Instant) -> Option<Duration> {
        self.last_change
            .map(|at| now.saturating_duration_since(at))
    }

    /// External confirmation of a pending change (Prompt policy, or a user
    /// overriding a countdown or suppression).
    pub fn confirm(&mut self) -> bool {
        match self.state {
            RefreshState::ChangeObserved | RefreshState::CountingDown | RefreshState::Suppressed => {
                self.transition(RefreshState::Ready);
                true
            }
            _ => false,
        }
    }

    /// Refresh on the next opportunity regardless of policy.
    pub fn request_refresh(&mut self) {
        if self.state != RefreshState::Refreshing {
            self.transition(RefreshState::Ready);
        }
    }

    /// Drop any pending refresh. No mutation has happened yet, so nothing to undo.
    pub fn cancel(&mut self) {
        if self.state != RefreshState::Refreshing {
            self.transition(RefreshState::Idle);
            self.last_change = None;
        }
    }

    pub fn begin_refresh(&mut self) -> bool {
        if self.state == RefreshState::Ready {
            self.transition(RefreshState::Refreshing);
            true
        } else {
            false
        }
    }

    /// Success returns to Idle (or to ChangeObserved if files moved meanwhile);
    /// failure stays Ready so the caller retries later.
    pub fn finish_refresh(&mut self, success: bool) {
        if self.state != RefreshState::Refreshing {
            return;
        }
        if !success {
            self.transition(RefreshState::Ready);
        } else if std::mem::take(&mut self.changed_while_refreshing) {
            self.transition(RefreshState::ChangeObserved);
        } else {
            self.transition(RefreshState::Idle);
            self.last_change = None;
        }
    }

    pub fn set_policy(&mut self, policy: CooldownPolicy) {
        if policy == self.policy {
            return;
        }
        self.policy = policy;
        match (self.state, policy) {
            (RefreshState::ChangeObserved | RefreshState::CountingDown | RefreshState::Ready, CooldownPolicy::Manual) => {
                self.transition(RefreshState::Suppressed)
            }
            (RefreshState::CountingDown, CooldownPolicy::Prompt) => {
                self.transition(RefreshState::ChangeObserved)
            }
            (RefreshState::Suppressed, CooldownPolicy::After(_) | CooldownPolicy::Prompt) => {
                self.transition(RefreshState::ChangeObserved)
            }
            _ => {}
        }
    }

    fn transition(&mut self, to: RefreshState) {
        if self.state != to {
            log::debug!(target: "bankcache::cooldown", "{:?} -> {:?}", self.state, to);
            self.state = to;
        }
    }
}
