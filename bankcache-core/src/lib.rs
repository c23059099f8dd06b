//! # bankcache-core
//!
//! Keeps an index of compiled audio banks (banks, events, global parameters)
//! in step with a directory the authoring tool builds into.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::time::Instant;
//! use bankcache_core::{BankSync, ChangeDetector, Config, DiskFs, ManifestReader};
//!
//! let settings = Config::load().sync_settings();
//! let mut sync = BankSync::new(settings, ManifestReader::new(), DiskFs, ChangeDetector::new());
//!
//! // From whatever loop the host runs:
//! sync.tick(Instant::now());
//! let cache = sync.snapshot();
//! if let Some(event) = cache.find_event("event:/Explosion") {
//!     println!("{} ships in {} banks", event.path, event.banks.len());
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`engine`]: `BankSync`, the coordinator driven by `tick(now)`
//! - [`watcher`]: filesystem change flag (`ChangeSource`, notify-backed `ChangeDetector`)
//! - [`cooldown`]: debounce state machine and refresh policy
//! - [`stability`]: refuses builds whose marker is still being written
//! - [`builder`]: incremental diff-and-merge rebuild on a working copy
//! - [`source`]: the bank directory: listing, stat, lock probe, platform layout
//! - [`reader`]: `BankReader` seam and the JSON manifest reader
//! - [`persistence`]: SQLite save/load of the cache
//! - [`config`]: TOML configuration resolved into `SyncSettings`
//! - [`testing`]: in-memory doubles for the seams above

pub mod builder;
pub mod config;
pub mod cooldown;
pub mod engine;
pub mod error;
pub mod persistence;
pub mod reader;
pub mod source;
pub mod stability;
pub mod testing;
pub mod watcher;

pub use builder::CacheBuilder;
pub use config::{Config, SyncSettings};
pub use cooldown::{CooldownPolicy, RefreshCooldown, RefreshState};
pub use engine::{BankSync, SyncStatus, TickOutcome};
pub use error::BuildError;
pub use reader::{BankReader, ManifestReader, OpenError, OpenErrorKind};
pub use source::{DiskFs, SourceFs, SourceLayout};
pub use stability::{Stability, StabilityGate};
pub use watcher::{ChangeDetector, ChangeSource};

pub use bankcache_types as types;
