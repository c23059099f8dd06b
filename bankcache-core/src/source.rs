//! The source bank directory as seen by the engine.
//!
//! `SourceFs` is the filesystem seam: the disk implementation walks real
//! directories and probes advisory locks, the in-memory one in
//! [`crate::testing`] lets tests script mtimes and locks.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use fs2::FileExt;
use walkdir::WalkDir;

pub const BANK_EXTENSION: &str = "bank";
pub const MARKER_SUFFIX: &str = ".strings.bank";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub modified: SystemTime,
    pub len: u64,
}

pub trait SourceFs {
    fn is_dir(&self, path: &Path) -> bool;

    /// Every `*.bank` file below `root`, recursively, in any order.
    fn list_banks(&self, root: &Path) -> io::Result<Vec<PathBuf>>;

    fn stat(&self, path: &Path) -> io::Result<FileStat>;

    /// True when another process holds the file open for writing.
    fn is_write_locked(&self, path: &Path) -> bool;
}

/// Real filesystem access.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskFs;

impl SourceFs for DiskFs {
    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn list_banks(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        let mut banks = Vec::new();
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = entry.map_err(|e| {
                e.into_io_error()
                    .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "filesystem loop"))
            })?;
            if entry.file_type().is_file() && is_bank_file(entry.path()) {
                banks.push(entry.into_path());
            }
        }
        Ok(banks)
    }

    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let meta = fs::metadata(path)?;
        Ok(FileStat {
            modified: meta.modified()?,
            len: meta.len(),
        })
    }

    fn is_write_locked(&self, path: &Path) -> bool {
        // Opening for write fails on platforms with mandatory sharing modes; the
        // exclusive advisory lock catches cooperating writers elsewhere.
        let (file, writable) = match File::options().read(true).write(true).open(path) {
            Ok(file) => (file, true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return false,
            // Read-only checkouts can still be probed with a shared lock.
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => match File::open(path) {
                Ok(file) => (file, false),
                Err(_) => return true,
            },
            Err(_) => return true,
        };
        let locked = if writable {
            FileExt::try_lock_exclusive(&file)
        } else {
            FileExt::try_lock_shared(&file)
        };
        match locked {
            Ok(()) => {
                let _ = FileExt::unlock(&file);
                false
            }
            Err(_) => true,
        }
    }
}

/// `*.bank`, excluding `._` resource-fork files.
pub fn is_bank_file(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name,
        None => return false,
    };
    !name.starts_with("._")
        && path.extension().and_then(|e| e.to_str()) == Some(BANK_EXTENSION)
}

pub fn is_marker_bank(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map_or(false, |n| n.ends_with(MARKER_SUFFIX))
}

/// `Master.strings.bank` -> `Master.bank`.
pub fn master_file_name_for(marker: &Path) -> Option<String> {
    let name = marker.file_name()?.to_str()?;
    let stem = name.strip_suffix(MARKER_SUFFIX)?;
    Some(format!("{}.{}", stem, BANK_EXTENSION))
}

/// Where banks are scanned from and which platform folders get sizes recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLayout {
    pub root: PathBuf,
    /// Folder scanned for content: `root`, or `root/<editor platform>`.
    pub scan_dir: PathBuf,
    pub platforms: Vec<String>,
}

impl SourceLayout {
    pub fn new(root: PathBuf, platforms: Vec<String>, editor_platform: Option<&str>) -> Self {
        let scan_dir = match editor_platform.or_else(|| platforms.first().map(String::as_str)) {
            Some(platform) if !platforms.is_empty() => root.join(platform),
            _ => root.clone(),
        };
        Self {
            root,
            scan_dir,
            platforms,
        }
    }

    pub fn flat(root: impl Into<PathBuf>) -> Self {
        Self::new(root.into(), Vec::new(), None)
    }

    /// `Sfx/Weapons.bank` -> `Sfx/Weapons`.
    pub fn bank_name(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.scan_dir).unwrap_or(path);
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        match name.strip_suffix(".bank") {
            Some(stem) => stem.to_string(),
            None => name,
        }
    }

    /// Size of the same relative bank in each platform folder that has it.
    pub fn platform_sizes<F: SourceFs>(
        &self,
        fs: &F,
        path: &Path,
        scanned_len: u64,
    ) -> Vec<(String, u64)> {
        if self.platforms.is_empty() {
            return vec![(String::new(), scanned_len)];
        }
        let relative = match path.strip_prefix(&self.scan_dir) {
            Ok(rel) => rel,
            Err(_) => return Vec::new(),
        };
        self.platforms
            .iter()
            .filter_map(|platform| {
                let candidate = self.root.join(platform).join(relative);
                fs.stat(&candidate).ok().map(|s| (platform.clone(), s.len))
            })
            .collect()
    }
}

/// The most recently modified marker bank under `dir`, ties broken by path.
pub fn newest_marker<F: SourceFs>(fs: &F, dir: &Path) -> io::Result<Option<(PathBuf, SystemTime)>> {
    if !fs.is_dir(dir) {
        return Ok(None);
    }
    let mut newest: Option<(PathBuf, SystemTime)> = None;
    for path in fs.list_banks(dir)?.into_iter().filter(|p| is_marker_bank(p)) {
        let modified = match fs.stat(&path) {
            Ok(stat) => stat.modified,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        let replace = match &newest {
            None => true,
            Some((best_path, best_time)) => {
                modified > *best_time || (modified == *best_time && path < *best_path)
            }
        };
        if replace {
            newest = Some((path, modified));
        }
    }
    Ok(newest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn bank_file_filters() {
        assert!(is_bank_file(Path::new("/b/Master.bank")));
        assert!(is_bank_file(Path::new("/b/Master.strings.bank")));
        assert!(!is_bank_file(Path::new("/b/._Master.bank")));
        assert!(!is_bank_file(Path::new("/b/Master.bank.meta")));
        assert!(is_marker_bank(Path::new("/b/Master.strings.bank")));
        assert!(!is_marker_bank(Path::new("/b/Master.bank")));
    }

    #[test]
    fn master_name_pairs_with_marker() {
        assert_eq!(
            master_file_name_for(Path::new("/b/Master.strings.bank")).as_deref(),
            Some("Master.bank")
        );
        assert_eq!(
            master_file_name_for(Path::new("/b/DLC Master.strings.bank")).as_deref(),
            Some("DLC Master.bank")
        );
        assert_eq!(master_file_name_for(Path::new("/b/Music.bank")), None);
    }

    #[test]
    fn layout_scans_editor_platform_folder() {
        let layout = SourceLayout::new(
            PathBuf::from("/build"),
            vec!["Desktop".into(), "Mobile".into()],
            Some("Mobile"),
        );
        assert_eq!(layout.scan_dir, PathBuf::from("/build/Mobile"));
        assert_eq!(layout.bank_name(Path::new("/build/Mobile/Sfx/Weapons.bank")), "Sfx/Weapons");

        let defaulted = SourceLayout::new(PathBuf::from("/build"), vec!["Desktop".into()], None);
        assert_eq!(defaulted.scan_dir, PathBuf::from("/build/Desktop"));

        assert_eq!(SourceLayout::flat("/build").scan_dir, PathBuf::from("/build"));
    }

    #[test]
    fn disk_listing_is_recursive_and_skips_forks() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("Sfx");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("Master.bank"), b"{}").unwrap();
        fs::write(dir.path().join("Master.strings.bank"), b"{}").unwrap();
        fs::write(dir.path().join("._Master.bank"), b"").unwrap();
        fs::write(nested.join("Weapons.bank"), b"{}").unwrap();
        fs::write(nested.join("notes.txt"), b"").unwrap();

        let mut banks = DiskFs.list_banks(dir.path()).unwrap();
        banks.sort();
        let names: Vec<_> = banks
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["Master.bank", "Master.strings.bank", "Weapons.bank"]);
    }

    #[test]
    fn disk_platform_sizes_cover_each_platform_copy() {
        let dir = tempfile::tempdir().unwrap();
        for (platform, bytes) in [("Desktop", 10usize), ("Mobile", 4)] {
            let folder = dir.path().join(platform);
            fs::create_dir_all(&folder).unwrap();
            fs::write(folder.join("Music.bank"), vec![0u8; bytes]).unwrap();
        }
        let layout = SourceLayout::new(
            dir.path().to_path_buf(),
            vec!["Desktop".into(), "Mobile".into(), "Console".into()],
            Some("Desktop"),
        );
        let scanned = layout.scan_dir.join("Music.bank");
        let sizes = layout.platform_sizes(&DiskFs, &scanned, 10);
        assert_eq!(sizes, vec![("Desktop".to_string(), 10), ("Mobile".to_string(), 4)]);
    }

    #[test]
    fn unlocked_file_is_not_write_locked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Master.strings.bank");
        fs::write(&path, b"{}").unwrap();
        assert!(!DiskFs.is_write_locked(&path));
        assert!(!DiskFs.is_write_locked(&dir.path().join("missing.bank")));
    }

    #[test]
    fn advisory_lock_holder_makes_file_unstable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Master.strings.bank");
        fs::write(&path, b"{}").unwrap();
        let writer = File::options().read(true).write(true).open(&path).unwrap();
        FileExt::lock_exclusive(&writer).unwrap();
        assert!(DiskFs.is_write_locked(&path));
        FileExt::unlock(&writer).unwrap();
        assert!(!DiskFs.is_write_locked(&path));
    }

    #[test]
    fn newest_marker_picks_latest_mtime() {
        use crate::testing::MemorySource;
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let fs = MemorySource::new();
        fs.add_file("/b/A.strings.bank", t0, 1);
        fs.add_file("/b/B.strings.bank", t0 + Duration::from_secs(5), 1);
        fs.add_file("/b/Music.bank", t0 + Duration::from_secs(50), 1);

        let (path, time) = newest_marker(&fs, Path::new("/b")).unwrap().unwrap();
        assert_eq!(path, PathBuf::from("/b/B.strings.bank"));
        assert_eq!(time, t0 + Duration::from_secs(5));
        assert_eq!(newest_marker(&fs, Path::new("/elsewhere")).unwrap(), None);
    }
}
