//! The coordinator: owns the cache and every timer, driven by `tick`.
//!
//! Each tick drains the change flag, runs the periodic poll when due, advances
//! the cooldown and, once it is ready, runs one rebuild to completion. Readers
//! take `Arc<Cache>` snapshots; a commit replaces the `Arc`, it never mutates
//! a snapshot someone else holds.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use bankcache_types::Cache;

use crate::builder::CacheBuilder;
use crate::config::SyncSettings;
use crate::cooldown::{CooldownPolicy, RefreshCooldown, RefreshState};
use crate::error::BuildError;
use crate::persistence;
use crate::reader::BankReader;
use crate::source::{newest_marker, SourceFs};
use crate::stability::StabilityGate;
use crate::watcher::ChangeSource;

/// What a tick (or an explicit refresh) did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing pending.
    Idle,
    /// A refresh is pending: counting down, awaiting confirmation, or waiting to retry.
    Waiting,
    /// A new cache was committed.
    Rebuilt { generation: u64 },
    /// The refresh ran and found nothing to do.
    UpToDate,
    /// Transient failure; retried after the next poll interval.
    Deferred,
    /// A bank could not be read; the previous cache is still served.
    Failed,
    /// The source is not configured or holds no banks; the cache was emptied.
    Reset,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    pub last_outcome: Option<TickOutcome>,
    /// The last error worth showing to a user. Cleared by the next successful refresh.
    pub error: Option<String>,
    /// Why there is nothing to index, when the source is unset or empty.
    pub source_problem: Option<String>,
}

pub struct BankSync<R: BankReader, F: SourceFs, C: ChangeSource> {
    settings: SyncSettings,
    changes: C,
    cooldown: RefreshCooldown,
    builder: CacheBuilder<R, F>,
    cache: Arc<Cache>,
    next_poll: Option<Instant>,
    next_attempt: Option<Instant>,
    transient_failures: u32,
    /// Marker time of a build the user cancelled; the poll leaves it alone.
    dismissed_marker_time: Option<SystemTime>,
    /// The last save failed; don't keep refreshing just to retry it.
    persist_failed: bool,
    status: SyncStatus,
}

impl<R: BankReader, F: SourceFs, C: ChangeSource> BankSync<R, F, C> {
    /// Build the coordinator, starting from the persisted cache when one is usable.
    pub fn new(settings: SyncSettings, reader: R, fs: F, mut changes: C) -> Self {
        let cache = settings
            .cache_path
            .as_deref()
            .and_then(load_persisted)
            .unwrap_or_default();
        changes.watch(settings.source_dir.as_deref());

        Self {
            cooldown: RefreshCooldown::new(settings.policy),
            builder: CacheBuilder::new(reader, fs, StabilityGate::new(settings.retry_budget)),
            cache: Arc::new(cache),
            next_poll: None,
            next_attempt: None,
            transient_failures: 0,
            dismissed_marker_time: None,
            persist_failed: false,
            status: SyncStatus::default(),
            settings,
            changes,
        }
    }

    // ============================================================
    // Reads
    // ============================================================

    /// The current cache. Stays valid (and unchanged) across later rebuilds.
    pub fn snapshot(&self) -> Arc<Cache> {
        Arc::clone(&self.cache)
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    pub fn state(&self) -> RefreshState {
        self.cooldown.state()
    }

    pub fn policy(&self) -> CooldownPolicy {
        self.cooldown.policy()
    }

    pub fn time_remaining(&self, now: Instant) -> Option<Duration> {
        self.cooldown.time_remaining(now)
    }

    pub fn time_since_change(&self, now: Instant) -> Option<Duration> {
        self.cooldown.time_since_change(now)
    }

    // ============================================================
    // Control
    // ============================================================

    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if self.changes.signal_changed() {
            log::debug!(target: "bankcache::engine", "change signalled");
            self.dismissed_marker_time = None;
            self.cooldown.observe_change(now);
        }

        if self.next_poll.map_or(true, |at| now >= at) {
            self.next_poll = Some(now + self.settings.poll_interval);
            self.poll(now);
        }

        self.cooldown.tick(now);
        if !self.cooldown.is_ready() {
            return match self.cooldown.state() {
                RefreshState::ChangeObserved | RefreshState::CountingDown => TickOutcome::Waiting,
                _ => TickOutcome::Idle,
            };
        }
        if self.next_attempt.map_or(false, |at| now < at) {
            return TickOutcome::Waiting;
        }
        self.run_refresh(now)
    }

    /// Refresh right away, regardless of policy and pending retries.
    pub fn refresh_now(&mut self, now: Instant) -> TickOutcome {
        self.next_attempt = None;
        self.dismissed_marker_time = None;
        self.cooldown.request_refresh();
        self.run_refresh(now)
    }

    /// Confirm a pending change (Prompt policy). The refresh runs on the next tick.
    pub fn confirm(&mut self) -> bool {
        self.cooldown.confirm()
    }

    /// Drop any pending refresh and forget retry state. Nothing has been mutated yet.
    ///
    /// The cancelled build stays dismissed until the watcher reports another change.
    pub fn cancel(&mut self) {
        self.dismissed_marker_time = self.newest_marker_time();
        self.cooldown.cancel();
        self.next_attempt = None;
        self.transient_failures = 0;
        self.builder.gate_mut().reset();
    }

    pub fn set_policy(&mut self, policy: CooldownPolicy) {
        self.settings.policy = policy;
        self.cooldown.set_policy(policy);
    }

    pub fn set_source_dir(&mut self, dir: Option<&Path>) {
        let mut settings = self.settings.clone();
        settings.source_dir = dir.map(Path::to_path_buf);
        self.apply_settings(settings);
    }

    pub fn apply_settings(&mut self, settings: SyncSettings) {
        let source_changed = settings.source_dir != self.settings.source_dir
            || settings.platforms != self.settings.platforms
            || settings.editor_platform != self.settings.editor_platform;
        if settings.cache_path != self.settings.cache_path {
            self.persist_failed = false;
        }

        self.cooldown.set_policy(settings.policy);
        self.builder.gate_mut().set_retry_budget(settings.retry_budget);
        self.settings = settings;

        if source_changed {
            log::info!(
                target: "bankcache::engine",
                "Source directory is now {}",
                self.settings
                    .source_dir
                    .as_deref()
                    .map_or_else(|| "<unset>".to_string(), |p| p.display().to_string())
            );
            self.changes.watch(self.settings.source_dir.as_deref());
            self.next_attempt = None;
            self.transient_failures = 0;
            self.dismissed_marker_time = None;
            self.status.source_problem = None;
            self.builder.gate_mut().reset();
            // Poll on the next tick.
            self.next_poll = None;
        }
    }

    // ============================================================
    // Internals
    // ============================================================

    /// Backstop for missed watcher events and cold starts.
    fn poll(&mut self, now: Instant) {
        // Retries attaching once the root appears.
        self.changes.watch(self.settings.source_dir.as_deref());

        let has_content = self.cache.is_valid() || !self.cache.is_empty();
        let layout = match self.settings.layout() {
            Some(layout) if self.changes.root_exists() => layout,
            other => {
                if has_content {
                    self.cooldown.request_refresh();
                } else {
                    self.report_source_problem(match other {
                        Some(layout) => BuildError::NoBanks { dir: layout.scan_dir },
                        None => BuildError::NotConfigured,
                    });
                }
                return;
            }
        };

        let marker_time = match newest_marker(self.builder.fs(), &layout.scan_dir) {
            Ok(Some((_, time))) => time,
            Ok(None) => {
                if has_content {
                    self.cooldown.request_refresh();
                } else {
                    self.report_source_problem(BuildError::NoBanks { dir: layout.scan_dir });
                }
                return;
            }
            Err(e) => {
                log::debug!(target: "bankcache::engine", "poll of {} failed: {}", layout.scan_dir.display(), e);
                return;
            }
        };

        if !self.cache.is_valid() || self.persisted_file_missing() {
            log::debug!(target: "bankcache::engine", "no usable cache; requesting refresh");
            self.cooldown.request_refresh();
        } else if self.cache.last_build_marker_time != Some(marker_time)
            && self.dismissed_marker_time != Some(marker_time)
            && self.cooldown.state() == RefreshState::Idle
        {
            log::debug!(target: "bankcache::engine", "poll found a newer build");
            self.cooldown.observe_change(now);
        }
    }

    fn run_refresh(&mut self, now: Instant) -> TickOutcome {
        if !self.cooldown.begin_refresh() {
            return TickOutcome::Idle;
        }

        let started = Instant::now();
        let result = self.attempt();
        let elapsed = started.elapsed();
        if elapsed > self.settings.slow_build_warning {
            log::warn!(target: "bankcache::engine", "Cache refresh took {:?}", elapsed);
        }

        let outcome = match result {
            Ok(next) => {
                let rebuilt = !Arc::ptr_eq(&next, &self.cache);
                self.cache = next;
                self.next_attempt = None;
                self.transient_failures = 0;
                self.dismissed_marker_time = None;
                self.status.error = None;
                self.status.source_problem = None;
                if rebuilt || self.persisted_file_missing() {
                    self.persist();
                }
                self.cooldown.finish_refresh(true);
                if rebuilt {
                    TickOutcome::Rebuilt {
                        generation: self.cache.generation,
                    }
                } else {
                    TickOutcome::UpToDate
                }
            }
            Err(e) if e.is_configuration() => {
                if self.cache.is_valid() || !self.cache.is_empty() {
                    let mut empty = Cache::new();
                    empty.generation = self.cache.generation.wrapping_add(1);
                    self.cache = Arc::new(empty);
                    log::info!(target: "bankcache::engine", "Cleared cache: {}", e);
                    self.persist();
                }
                self.next_attempt = None;
                self.transient_failures = 0;
                self.status.error = None;
                self.status.source_problem = Some(e.to_string());
                self.cooldown.finish_refresh(true);
                TickOutcome::Reset
            }
            Err(e) if e.is_retryable() => {
                self.transient_failures = self.transient_failures.saturating_add(1);
                let exhausted = self.transient_failures >= self.settings.retry_budget;
                if e.is_user_visible(exhausted) {
                    self.surface(&e);
                } else {
                    log::debug!(target: "bankcache::engine", "deferring refresh: {}", e);
                }
                self.next_attempt = Some(now + self.settings.poll_interval);
                self.cooldown.finish_refresh(false);
                TickOutcome::Deferred
            }
            Err(e) => {
                self.surface(&e);
                self.next_attempt = Some(now + self.settings.poll_interval);
                self.cooldown.finish_refresh(false);
                TickOutcome::Failed
            }
        };
        self.status.last_outcome = Some(outcome);
        outcome
    }

    fn attempt(&mut self) -> Result<Arc<Cache>, BuildError> {
        let layout = self.settings.layout().ok_or(BuildError::NotConfigured)?;
        let marker = newest_marker(self.builder.fs(), &layout.scan_dir).map_err(|source| {
            BuildError::Io {
                path: layout.scan_dir.clone(),
                source,
            }
        })?;
        let (marker, _) = marker.ok_or_else(|| BuildError::NoBanks {
            dir: layout.scan_dir.clone(),
        })?;
        self.builder.rebuild(&self.cache, &layout, &marker)
    }

    /// Log an error once per distinct message and keep it for display.
    fn surface(&mut self, e: &BuildError) {
        let message = e.to_string();
        if self.status.error.as_deref() != Some(message.as_str()) {
            match e {
                BuildError::Parse { .. } => log::error!(target: "bankcache::engine", "{}", message),
                _ => log::warn!(target: "bankcache::engine", "{}", message),
            }
        }
        self.status.error = Some(message);
    }

    /// Nothing to index and nothing cached: tell callers why without a refresh.
    fn report_source_problem(&mut self, e: BuildError) {
        let message = e.to_string();
        if self.status.source_problem.as_deref() != Some(message.as_str()) {
            log::info!(target: "bankcache::engine", "{}", message);
            self.status.source_problem = Some(message);
        }
    }

    fn newest_marker_time(&self) -> Option<SystemTime> {
        let layout = self.settings.layout()?;
        match newest_marker(self.builder.fs(), &layout.scan_dir) {
            Ok(marker) => marker.map(|(_, time)| time),
            Err(_) => None,
        }
    }

    fn persisted_file_missing(&self) -> bool {
        if self.persist_failed {
            return false;
        }
        self.settings
            .cache_path
            .as_deref()
            .map_or(false, |path| self.cache.is_valid() && !path.exists())
    }

    fn persist(&mut self) {
        let Some(path) = self.settings.cache_path.as_deref() else {
            return;
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!(target: "bankcache::engine", "could not create {}: {}", parent.display(), e);
                self.persist_failed = true;
                return;
            }
        }
        match persistence::save_cache(path, &self.cache) {
            Ok(()) => self.persist_failed = false,
            Err(e) => {
                log::warn!(target: "bankcache::engine", "could not save cache to {}: {}", path.display(), e);
                self.persist_failed = true;
            }
        }
    }
}

fn load_persisted(path: &Path) -> Option<Cache> {
    match persistence::load_cache(path) {
        Ok(cache) => cache,
        Err(e) => {
            log::warn!(target: "bankcache::engine", "ignoring unreadable cache {}: {}", path.display(), e);
            None
        }
    }
}
