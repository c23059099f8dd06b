mod common;

use std::path::PathBuf;
use std::sync::Arc;

use bankcache_core::{CooldownPolicy, RefreshState, TickOutcome};
use common::*;

#[test]
fn build_then_noop_then_delete() {
    let mut h = Harness::new(CooldownPolicy::After(std::time::Duration::from_secs(2)));

    // First build (cold start).
    assert_eq!(h.tick(0.0), TickOutcome::Rebuilt { generation: 1 });
    let first = h.sync.snapshot();
    let events: Vec<_> = first.all_events().map(|e| e.path.as_str()).collect();
    assert_eq!(events, vec!["event:/Explosion"]);
    let explosion = first.find_event("event:/Explosion").unwrap();
    assert_eq!(explosion.banks.iter().cloned().collect::<Vec<_>>(), vec![bank_path("Master.bank")]);
    assert_eq!(first.master_banks().count(), 1);

    // Second refresh with nothing changed short-circuits on the marker time.
    h.reader.clear_opens();
    assert_eq!(h.sync.refresh_now(h.at(1.0)), TickOutcome::UpToDate);
    assert!(Arc::ptr_eq(&first, &h.sync.snapshot()));
    assert!(h.reader.opens().is_empty());

    // Third: the master bank goes away in a new build.
    h.fs.remove(bank_path("Master.bank"));
    h.finish_build(30);
    assert_eq!(h.tick(2.0), TickOutcome::Waiting);
    assert_eq!(h.tick(4.0), TickOutcome::Rebuilt { generation: 2 });

    let third = h.sync.snapshot();
    assert_eq!(third.event_count(), 0);
    assert!(third.bank(&bank_path("Master.bank")).is_none());
    assert_eq!(third.master_banks().count(), 0);
    assert_eq!(third.marker_banks().count(), 1);
    // The earlier snapshot still shows the old build.
    assert_eq!(first.event_count(), 1);
    assert_eq!(h.sync.state(), RefreshState::Idle);
}

#[test]
fn poll_catches_missed_watcher_events() {
    let mut h = Harness::built(CooldownPolicy::After(std::time::Duration::from_secs(1)));

    h.add_bank("Music.bank", 20, vec![event("event:/Music/Theme", 2)]);
    // Marker rewritten, but the watcher never fires.
    h.fs.touch(bank_path("Master.strings.bank"), mtime(20));

    assert_eq!(h.tick(1.0), TickOutcome::Idle);
    // Poll at t=5 notices, cooldown elapses a second later.
    assert_eq!(h.tick(5.0), TickOutcome::Waiting);
    assert_eq!(h.tick(6.0), TickOutcome::Rebuilt { generation: 2 });
    assert!(h.sync.cache().find_event("event:/Music/Theme").is_some());
}

#[test]
fn only_changed_banks_are_read_again() {
    let mut h = Harness::new(CooldownPolicy::After(std::time::Duration::ZERO));
    h.add_bank("Sfx/Weapons.bank", 0, vec![event("event:/Sfx/Gunshot", 3)]);
    h.add_bank("Music.bank", 0, vec![event("event:/Music/Theme", 2)]);
    assert!(matches!(h.tick(0.0), TickOutcome::Rebuilt { .. }));
    assert_eq!(
        h.sync.cache().bank(&bank_path("Sfx/Weapons.bank")).map(|b| b.name.as_str()),
        Some("Sfx/Weapons")
    );
    h.reader.clear_opens();

    h.add_bank("Music.bank", 40, vec![event("event:/Music/Battle", 4)]);
    h.finish_build(40);
    assert!(matches!(h.tick(1.0), TickOutcome::Rebuilt { .. }));

    let opened = h.reader.opens();
    assert!(opened.contains(&bank_path("Music.bank")));
    assert!(!opened.contains(&bank_path("Sfx/Weapons.bank")));
    assert!(!opened.contains(&bank_path("Master.bank")));
    let cache = h.sync.snapshot();
    assert!(cache.find_event("event:/Music/Theme").is_none());
    assert!(cache.find_event("event:/Music/Battle").is_some());
    assert!(cache.find_event("event:/Sfx/Gunshot").is_some());
}

#[test]
fn empty_source_clears_cache_and_reports() {
    let mut h = Harness::built(CooldownPolicy::After(std::time::Duration::ZERO));
    for name in ["Master.strings.bank", "Master.bank"] {
        h.fs.remove(bank_path(name));
    }
    h.fs.add_file(PathBuf::from(ROOT).join("notes.txt"), mtime(50), 1);

    assert_eq!(h.tick(5.0), TickOutcome::Reset);
    assert!(h.sync.cache().is_empty());
    assert!(!h.sync.cache().is_valid());
    let problem = h.sync.status().source_problem.clone().unwrap();
    assert!(problem.contains("doesn't contain any banks"), "{problem}");
    assert!(h.sync.status().error.is_none());

    // Nothing more to do until banks show up again.
    assert_eq!(h.tick(10.0), TickOutcome::Idle);
}

#[test]
fn empty_source_is_reported_without_a_refresh() {
    let fs = bankcache_core::testing::MemorySource::new();
    fs.add_file(PathBuf::from(ROOT).join("readme.txt"), mtime(0), 1);
    let reader = bankcache_core::testing::TestReader::new();
    let mut sync: MemorySync = bankcache_core::BankSync::new(
        settings(CooldownPolicy::After(std::time::Duration::ZERO)),
        reader.clone(),
        fs,
        bankcache_core::testing::FlagChanges::new(),
    );

    let t0 = std::time::Instant::now();
    for secs in 0..30 {
        assert_eq!(sync.tick(t0 + std::time::Duration::from_secs(secs)), TickOutcome::Idle);
    }
    let problem = sync.status().source_problem.clone().expect("empty source is reported");
    assert!(problem.contains("doesn't contain any banks"), "{problem}");
    assert!(sync.status().error.is_none());
    assert!(!sync.cache().is_valid());
    assert!(reader.opens().is_empty());
}

#[test]
fn unset_source_is_reported_on_tick() {
    let mut sync: MemorySync = bankcache_core::BankSync::new(
        bankcache_core::SyncSettings::default(),
        bankcache_core::testing::TestReader::new(),
        bankcache_core::testing::MemorySource::new(),
        bankcache_core::testing::FlagChanges::new(),
    );
    assert_eq!(sync.tick(std::time::Instant::now()), TickOutcome::Idle);
    let problem = sync.status().source_problem.clone().expect("unset source is reported");
    assert!(problem.contains("not configured"), "{problem}");
}
