#![allow(dead_code)]
//! Test harness utilities for bankcache-core integration tests.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use bankcache_core::testing::{FlagChanges, MemorySource, TestReader};
use bankcache_core::{BankSync, CooldownPolicy, SyncSettings, TickOutcome};
use bankcache_types::{BankManifest, EventDescriptor, Guid, ParameterDescriptor};

pub const ROOT: &str = "/project/Build";

pub type MemorySync = BankSync<TestReader, MemorySource, FlagChanges>;

/// File modification time `secs` after an arbitrary fixed origin.
pub fn mtime(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000 + secs)
}

pub fn bank_path(name: &str) -> PathBuf {
    Path::new(ROOT).join(name)
}

pub fn event(path: &str, guid: u128) -> EventDescriptor {
    EventDescriptor {
        guid: Guid::new(guid),
        path: path.to_string(),
        is_one_shot: true,
        min_distance: 1.0,
        max_distance: 20.0,
        ..EventDescriptor::default()
    }
}

pub fn settings(policy: CooldownPolicy) -> SyncSettings {
    SyncSettings {
        source_dir: Some(PathBuf::from(ROOT)),
        policy,
        poll_interval: Duration::from_secs(5),
        retry_budget: 3,
        ..SyncSettings::default()
    }
}

/// An engine over in-memory doubles, with handles kept for scripting.
pub struct Harness {
    pub fs: MemorySource,
    pub reader: TestReader,
    pub changes: FlagChanges,
    pub sync: MemorySync,
    pub t0: Instant,
}

impl Harness {
    /// `Master.strings.bank` + `Master.bank` shipping `event:/Explosion`, not yet built.
    pub fn new(policy: CooldownPolicy) -> Self {
        let fs = MemorySource::new();
        let reader = TestReader::new();
        let changes = FlagChanges::new();

        fs.add_file(bank_path("Master.strings.bank"), mtime(0), 16);
        reader.set_marker(bank_path("Master.strings.bank"), Guid::new(0xAA));
        fs.add_file(bank_path("Master.bank"), mtime(0), 256);
        reader.set_events(bank_path("Master.bank"), vec![event("event:/Explosion", 1)]);

        let sync = BankSync::new(settings(policy), reader.clone(), fs.clone(), changes.clone());
        Self {
            fs,
            reader,
            changes,
            sync,
            t0: Instant::now(),
        }
    }

    /// Same as `new`, with the first build already committed at `t0`.
    pub fn built(policy: CooldownPolicy) -> Self {
        let mut harness = Self::new(policy);
        let outcome = harness.tick(0.0);
        assert_eq!(outcome, TickOutcome::Rebuilt { generation: 1 });
        harness.reader.clear_opens();
        harness
    }

    pub fn at(&self, secs: f64) -> Instant {
        self.t0 + Duration::from_secs_f64(secs)
    }

    pub fn tick(&mut self, secs: f64) -> TickOutcome {
        let now = self.at(secs);
        self.sync.tick(now)
    }

    pub fn add_bank(&self, name: &str, secs: u64, events: Vec<EventDescriptor>) {
        self.fs.add_file(bank_path(name), mtime(secs), 64);
        self.reader.set_events(bank_path(name), events);
    }

    pub fn add_bank_with_globals(
        &self,
        name: &str,
        secs: u64,
        events: Vec<EventDescriptor>,
        globals: Vec<ParameterDescriptor>,
    ) {
        self.fs.add_file(bank_path(name), mtime(secs), 64);
        self.reader.set_bank(
            bank_path(name),
            BankManifest {
                guid: Guid::new(0xB0 + secs as u128),
                events,
                global_parameters: globals,
            },
        );
    }

    /// Simulate the authoring tool finishing a build: the marker is rewritten
    /// and the watcher fires.
    pub fn finish_build(&self, secs: u64) {
        self.fs.touch(bank_path("Master.strings.bank"), mtime(secs));
        self.changes.raise();
    }

    /// Tick every `step` seconds over `[from, to]`, collecting what happened.
    pub fn run(&mut self, from: f64, to: f64, step: f64) -> Vec<(f64, TickOutcome)> {
        let mut outcomes = Vec::new();
        let mut t = from;
        while t <= to + 1e-9 {
            outcomes.push((t, self.tick(t)));
            t += step;
        }
        outcomes
    }
}

pub fn rebuild_times(outcomes: &[(f64, TickOutcome)]) -> Vec<f64> {
    outcomes
        .iter()
        .filter(|(_, o)| matches!(o, TickOutcome::Rebuilt { .. }))
        .map(|(t, _)| *t)
        .collect()
}

// ============================================================
// On-disk fixtures (JSON manifests)
// ============================================================

pub fn write_manifest(path: &Path, manifest: &BankManifest, modified: SystemTime) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, serde_json::to_vec_pretty(manifest).unwrap()).unwrap();
    set_mtime(path, modified);
}

pub fn set_mtime(path: &Path, modified: SystemTime) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(modified)
        .unwrap();
}

pub fn marker_manifest(guid: u128) -> BankManifest {
    BankManifest {
        guid: Guid::new(guid),
        ..BankManifest::default()
    }
}

pub fn content_manifest(events: Vec<EventDescriptor>) -> BankManifest {
    BankManifest {
        guid: Guid::new(0x51),
        events,
        global_parameters: Vec::new(),
    }
}
