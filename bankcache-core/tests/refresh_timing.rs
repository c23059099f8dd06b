mod common;

use std::time::Duration;

use bankcache_core::{CooldownPolicy, RefreshState, TickOutcome};
use common::*;

#[test]
fn burst_of_changes_rebuilds_once_after_quiet_period() {
    let mut h = Harness::built(CooldownPolicy::After(Duration::from_secs(5)));

    // The authoring tool writes files at 10, 11.5, 13 and 14 seconds.
    let mut outcomes = Vec::new();
    let writes = [10.0, 11.5, 13.0, 14.0];
    let mut t: f64 = 10.0;
    while t <= 30.0 {
        if let Some(i) = writes.iter().position(|w| (*w - t).abs() < 1e-9) {
            h.add_bank(&format!("Bank{i}.bank"), 100 + i as u64, vec![event(&format!("event:/B{i}"), 10 + i as u128)]);
            h.finish_build(100 + i as u64);
        }
        outcomes.push((t, h.tick(t)));
        t += 0.5;
    }

    let rebuilds = rebuild_times(&outcomes);
    assert_eq!(rebuilds, vec![19.0], "{outcomes:?}");
    assert_eq!(h.sync.cache().event_count(), 5);
}

#[test]
fn countdown_is_visible_while_waiting() {
    let mut h = Harness::built(CooldownPolicy::After(Duration::from_secs(5)));
    h.finish_build(50);
    h.tick(1.0);
    assert_eq!(h.sync.state(), RefreshState::CountingDown);
    assert_eq!(h.sync.time_remaining(h.at(3.0)), Some(Duration::from_secs(3)));
    assert_eq!(h.sync.time_since_change(h.at(3.0)), Some(Duration::from_secs(2)));
}

#[test]
fn manual_policy_only_refreshes_on_request() {
    let mut h = Harness::built(CooldownPolicy::Manual);
    h.add_bank("Music.bank", 60, vec![event("event:/Music/Theme", 2)]);
    h.finish_build(60);

    let outcomes = h.run(1.0, 60.0, 1.0);
    assert!(rebuild_times(&outcomes).is_empty());
    assert_eq!(h.sync.state(), RefreshState::Suppressed);

    assert!(matches!(h.sync.refresh_now(h.at(61.0)), TickOutcome::Rebuilt { .. }));
    assert!(h.sync.cache().find_event("event:/Music/Theme").is_some());
}

#[test]
fn switching_policy_releases_suppressed_change() {
    let mut h = Harness::built(CooldownPolicy::Manual);
    h.finish_build(70);
    h.tick(1.0);
    assert_eq!(h.sync.state(), RefreshState::Suppressed);

    h.sync.set_policy(CooldownPolicy::After(Duration::ZERO));
    assert!(matches!(h.tick(2.0), TickOutcome::Rebuilt { .. }));
}

#[test]
fn unstable_marker_defers_without_reading_banks() {
    let mut h = Harness::built(CooldownPolicy::After(Duration::ZERO));
    h.add_bank("Music.bank", 80, vec![event("event:/Music/Theme", 2)]);
    h.finish_build(80);
    h.fs.set_locked(bank_path("Master.strings.bank"), true);

    // Two poll cycles with the marker still held open: below the budget of 3.
    assert_eq!(h.tick(1.0), TickOutcome::Deferred);
    assert_eq!(h.tick(3.0), TickOutcome::Waiting);
    assert_eq!(h.tick(6.0), TickOutcome::Deferred);
    assert!(h.reader.opens().is_empty());
    assert!(h.sync.status().error.is_none());
    assert_eq!(h.sync.cache().generation, 1);

    h.fs.set_locked(bank_path("Master.strings.bank"), false);
    let outcomes = h.run(7.0, 20.0, 1.0);
    assert_eq!(rebuild_times(&outcomes), vec![11.0]);
    assert!(h.sync.cache().find_event("event:/Music/Theme").is_some());
    assert!(h.sync.status().error.is_none());
}

#[test]
fn persistent_instability_is_reported_once_budget_is_spent() {
    let mut h = Harness::built(CooldownPolicy::After(Duration::ZERO));
    h.finish_build(90);
    h.fs.set_locked(bank_path("Master.strings.bank"), true);

    assert_eq!(h.tick(1.0), TickOutcome::Deferred);
    assert_eq!(h.tick(6.0), TickOutcome::Deferred);
    assert!(h.sync.status().error.is_none());
    assert_eq!(h.tick(11.0), TickOutcome::Deferred);
    let error = h.sync.status().error.clone().expect("instability surfaced");
    assert!(error.contains("still being written"), "{error}");
    // The last good cache keeps being served.
    assert_eq!(h.sync.cache().generation, 1);
    assert!(h.sync.cache().find_event("event:/Explosion").is_some());

    // Cancelling forgets the pending refresh and the failure count.
    h.sync.cancel();
    assert_eq!(h.sync.state(), RefreshState::Idle);
}

#[test]
fn locked_content_bank_is_retried() {
    let mut h = Harness::built(CooldownPolicy::After(Duration::ZERO));
    h.add_bank("Music.bank", 95, vec![event("event:/Music/Theme", 2)]);
    h.reader
        .fail_open(bank_path("Music.bank"), bankcache_core::OpenErrorKind::Locked, "sharing violation");
    h.finish_build(95);

    assert_eq!(h.tick(1.0), TickOutcome::Deferred);
    h.reader.clear_failure(bank_path("Music.bank"));
    assert!(matches!(h.tick(6.0), TickOutcome::Rebuilt { .. }));
}

#[test]
fn cancelled_build_stays_dismissed_until_next_change() {
    let mut h = Harness::built(CooldownPolicy::After(Duration::from_secs(5)));
    h.finish_build(50);
    h.tick(1.0);
    assert_eq!(h.sync.state(), RefreshState::CountingDown);
    h.sync.cancel();
    assert_eq!(h.sync.state(), RefreshState::Idle);

    // The poll still sees the newer marker but leaves the dismissed build alone.
    let outcomes = h.run(2.0, 20.0, 1.0);
    assert!(rebuild_times(&outcomes).is_empty(), "{outcomes:?}");
    assert_eq!(h.sync.state(), RefreshState::Idle);
    assert_eq!(h.sync.cache().generation, 1);

    // A later write brings the refresh back.
    h.finish_build(60);
    let outcomes = h.run(21.0, 30.0, 1.0);
    assert_eq!(rebuild_times(&outcomes), vec![26.0]);
}
