use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::Guid;

/// What a bank file is for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BankRole {
    /// `*.strings.bank`, rewritten on every build; only its identity and mtime are used.
    Marker,
    /// The bank paired with a canonical marker.
    Master,
    #[default]
    Content,
}

impl BankRole {
    pub fn as_str(self) -> &'static str {
        match self {
            BankRole::Marker => "Marker",
            BankRole::Master => "Master",
            BankRole::Content => "Content",
        }
    }

    pub fn parse(s: &str) -> Option<BankRole> {
        match s {
            "Marker" => Some(BankRole::Marker),
            "Master" => Some(BankRole::Master),
            "Content" => Some(BankRole::Content),
            _ => None,
        }
    }
}

/// Result of the last time the reader opened this bank.
///
/// A failed open aborts the whole pass and the working copy is thrown away, so
/// a committed record never carries a failure; the reason is reported through
/// the build error instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadOutcome {
    /// Seen on disk but never opened.
    #[default]
    Pending,
    /// Content bank parsed successfully.
    Loaded { events: u32 },
    /// Marker bank opened for its identity only.
    Identified { guid: Guid },
}

/// One bank file under the source directory, keyed by its absolute path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankRecord {
    pub path: PathBuf,
    /// Path relative to the scanned folder, `/`-separated, without `.bank`.
    pub name: String,
    /// `None` until the bank has been parsed once; a mismatch with the file's
    /// mtime triggers a re-parse.
    pub last_modified: Option<SystemTime>,
    /// Scratch flag, only meaningful during a rebuild pass.
    #[serde(skip)]
    pub exists_this_pass: bool,
    /// Platform folder name -> file size in bytes. `""` when no platforms are configured.
    pub platform_sizes: BTreeMap<String, u64>,
    pub role: BankRole,
    pub load_outcome: LoadOutcome,
    /// Global parameters this bank reported when it was last parsed.
    pub global_parameters: BTreeSet<Guid>,
}

impl BankRecord {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            last_modified: None,
            exists_this_pass: false,
            platform_sizes: BTreeMap::new(),
            role: BankRole::Content,
            load_outcome: LoadOutcome::Pending,
            global_parameters: BTreeSet::new(),
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    pub fn is_at(&self, path: &Path) -> bool {
        self.path == path
    }

    /// Size of the bank for a platform, if that platform folder had a copy.
    pub fn size_for(&self, platform: &str) -> Option<u64> {
        self.platform_sizes.get(platform).copied()
    }
}
