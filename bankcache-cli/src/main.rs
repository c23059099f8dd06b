use std::fs::File;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bankcache_core::{
    BankReader, BankSync, ChangeDetector, ChangeSource, Config, CooldownPolicy, DiskFs,
    ManifestReader, RefreshState, SourceFs, TickOutcome,
};
use bankcache_types::{BankRole, Cache, LoadOutcome};

const TICK_INTERVAL: Duration = Duration::from_millis(250);

fn init_logging(verbose: bool) {
    use simplelog::{LevelFilter, WriteLogger};

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bankcache")
        .join("bankcache.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = match File::create(&log_path).or_else(|_| File::create("/tmp/bankcache.log")) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("bankcache: logging disabled, cannot create log file: {}", e);
            return;
        }
    };

    if WriteLogger::init(log_level, simplelog::Config::default(), log_file).is_err() {
        eprintln!("bankcache: logger already initialized");
        return;
    }

    log::info!("bankcache starting (log level: {:?})", log_level);
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1).cloned())
}

fn print_usage() {
    println!("usage: bankcache [--verbose] [--config FILE] [--source DIR] [--once]");
    println!();
    println!("  --config FILE  read settings from FILE instead of the user config");
    println!("  --source DIR   directory the banks are built into");
    println!("  --once         refresh once, print a summary and exit");
    println!("  --verbose      debug logging");
}

/// Raise `requested` for every line typed on stdin.
fn spawn_confirm_reader(requested: Arc<AtomicBool>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            if line.is_err() {
                break;
            }
            requested.store(true, Ordering::Release);
        }
    });
}

/// Confirm a pending change if the user asked for it since the last call.
fn apply_confirmation<R: BankReader, F: SourceFs, C: ChangeSource>(
    sync: &mut BankSync<R, F, C>,
    requested: &AtomicBool,
) -> bool {
    requested.swap(false, Ordering::AcqRel) && sync.confirm()
}

fn print_summary(cache: &Cache) {
    println!(
        "generation {}: {} banks, {} events, {} global parameters",
        cache.generation,
        cache.all_banks().count(),
        cache.event_count(),
        cache.all_parameters().count()
    );
    for bank in cache.all_banks() {
        let detail = match (bank.role, bank.load_outcome) {
            (BankRole::Marker, _) => "marker".to_string(),
            (role, LoadOutcome::Loaded { events }) => {
                format!("{}, {} events", role.as_str().to_lowercase(), events)
            }
            (role, _) => role.as_str().to_lowercase(),
        };
        println!("  {} ({})", bank.name, detail);
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return ExitCode::SUCCESS;
    }
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    init_logging(verbose);

    let mut config = match flag_value(&args, "--config") {
        Some(path) => Config::load_from(Path::new(&path)),
        None => Config::load(),
    };
    if let Some(dir) = flag_value(&args, "--source") {
        config.set_source_dir(Path::new(&dir));
    }
    let once = args.iter().any(|a| a == "--once");

    let settings = config.sync_settings();
    if settings.source_dir.is_none() {
        eprintln!("No source directory configured. Pass --source DIR or set [source] path in the config file.");
        if once {
            return ExitCode::FAILURE;
        }
    }
    let prompt = settings.policy == CooldownPolicy::Prompt;

    let mut sync = BankSync::new(settings, ManifestReader::new(), DiskFs, ChangeDetector::new());

    if once {
        let outcome = sync.refresh_now(Instant::now());
        let status = sync.status();
        if let Some(problem) = &status.source_problem {
            eprintln!("{}", problem);
        }
        if let Some(error) = &status.error {
            eprintln!("{}", error);
        }
        print_summary(&sync.snapshot());
        return match outcome {
            TickOutcome::Failed | TickOutcome::Deferred => ExitCode::FAILURE,
            _ => ExitCode::SUCCESS,
        };
    }

    let confirm_requested = Arc::new(AtomicBool::new(false));
    if prompt {
        spawn_confirm_reader(Arc::clone(&confirm_requested));
    }

    let mut shown_error: Option<String> = None;
    let mut last_state = sync.state();
    loop {
        if apply_confirmation(&mut sync, &confirm_requested) {
            log::debug!("refresh confirmed from stdin");
        }
        let now = Instant::now();
        if let TickOutcome::Rebuilt { .. } | TickOutcome::Reset = sync.tick(now) {
            print_summary(&sync.snapshot());
        }

        let status = sync.status();
        let error = status.error.clone().or_else(|| status.source_problem.clone());
        if error != shown_error {
            if let Some(message) = &error {
                eprintln!("{}", message);
            }
            shown_error = error;
        }

        let state = sync.state();
        if prompt && state == RefreshState::ChangeObserved && last_state != state {
            println!("Banks changed; press Enter to refresh.");
        }
        last_state = state;

        std::thread::sleep(TICK_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bankcache_core::testing::{FlagChanges, MemorySource, TestReader};
    use bankcache_core::SyncSettings;
    use bankcache_types::Guid;
    use std::time::SystemTime;

    #[test]
    fn typed_line_confirms_pending_change() {
        let fs = MemorySource::new();
        let reader = TestReader::new();
        let changes = FlagChanges::new();
        let marker = PathBuf::from("/b/Master.strings.bank");
        fs.add_file(marker.clone(), SystemTime::UNIX_EPOCH + Duration::from_secs(10), 16);
        reader.set_marker(marker.clone(), Guid::new(7));
        let settings = SyncSettings {
            source_dir: Some(PathBuf::from("/b")),
            policy: CooldownPolicy::Prompt,
            ..SyncSettings::default()
        };
        let mut sync = BankSync::new(settings, reader, fs.clone(), changes.clone());
        let t0 = Instant::now();
        assert!(matches!(sync.tick(t0), TickOutcome::Rebuilt { .. }));

        let requested = AtomicBool::new(false);
        assert!(!apply_confirmation(&mut sync, &requested));

        fs.touch(&marker, SystemTime::UNIX_EPOCH + Duration::from_secs(20));
        changes.raise();
        assert_eq!(sync.tick(t0 + Duration::from_secs(1)), TickOutcome::Waiting);
        assert_eq!(sync.state(), RefreshState::ChangeObserved);

        requested.store(true, Ordering::Release);
        assert!(apply_confirmation(&mut sync, &requested));
        assert!(!requested.load(Ordering::Acquire));
        assert!(matches!(
            sync.tick(t0 + Duration::from_secs(2)),
            TickOutcome::Rebuilt { generation: 2 }
        ));
    }
}
