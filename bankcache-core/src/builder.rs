//! Incremental cache rebuild.
//!
//! A pass works on a private clone of the current cache and hands back a new
//! `Arc` only when every step succeeded. Any error drops the clone, so the cache
//! readers hold is never partially updated.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bankcache_types::{
    BankRecord, BankRole, Cache, EventRecord, Guid, LoadOutcome, CACHE_SCHEMA_VERSION,
};

use crate::error::BuildError;
use crate::reader::BankReader;
use crate::source::{is_marker_bank, master_file_name_for, FileStat, SourceFs, SourceLayout};
use crate::stability::{Stability, StabilityGate};

pub struct CacheBuilder<R, F> {
    reader: R,
    fs: F,
    gate: StabilityGate,
}

impl<R: BankReader, F: SourceFs> CacheBuilder<R, F> {
    pub fn new(reader: R, fs: F, gate: StabilityGate) -> Self {
        Self { reader, fs, gate }
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn gate(&self) -> &StabilityGate {
        &self.gate
    }

    pub fn gate_mut(&mut self) -> &mut StabilityGate {
        &mut self.gate
    }

    /// Bring `cache` up to date with the banks under `layout`, using `marker`
    /// (the newest marker bank) as the build's timestamp.
    ///
    /// Returns the same `Arc` when nothing needs doing.
    pub fn rebuild(
        &mut self,
        cache: &Arc<Cache>,
        layout: &SourceLayout,
        marker: &Path,
    ) -> Result<Arc<Cache>, BuildError> {
        let current_schema = cache.is_current_schema();
        if !current_schema {
            log::info!(
                target: "bankcache::builder",
                "Discarding cache with schema version {} (expected {})",
                cache.schema_version,
                CACHE_SCHEMA_VERSION
            );
        }

        let marker_time = self.stat(marker)?.modified;
        if current_schema && cache.last_build_marker_time == Some(marker_time) {
            log::debug!(target: "bankcache::builder", "cache is up to date with {}", marker.display());
            return Ok(Arc::clone(cache));
        }

        if let Stability::Unstable { attempts } = self.gate.check(&self.fs, marker) {
            return Err(BuildError::Unstable {
                path: marker.to_path_buf(),
                attempts,
            });
        }

        let mut work = if current_schema {
            Cache::clone(cache)
        } else {
            let mut fresh = Cache::new();
            fresh.generation = cache.generation;
            fresh
        };
        for bank in work.banks.values_mut() {
            bank.exists_this_pass = false;
        }

        let mut paths = self.fs.list_banks(&layout.scan_dir).map_err(|source| BuildError::Io {
            path: layout.scan_dir.clone(),
            source,
        })?;
        paths.sort();
        let (markers, content): (Vec<PathBuf>, Vec<PathBuf>) =
            paths.into_iter().partition(|p| is_marker_bank(p));

        // Markers: identity only, one per GUID.
        let mut seen = BTreeSet::new();
        let mut master_names = BTreeSet::new();
        for path in &markers {
            let stat = self.stat(path)?;
            let guid = self.marker_identity(&work, path, stat)?;
            if !seen.insert(guid) {
                log::debug!(
                    target: "bankcache::builder",
                    "{} duplicates marker {}; ignored",
                    path.display(),
                    guid
                );
                continue;
            }
            master_names.extend(master_file_name_for(path));
            let record = touch_bank(&mut work, layout, &self.fs, path, stat);
            record.role = BankRole::Marker;
            record.last_modified = Some(stat.modified);
            record.load_outcome = LoadOutcome::Identified { guid };
            record.global_parameters.clear();
        }

        let mut reparsed = 0usize;
        for path in &content {
            let stat = self.stat(path)?;
            let is_master = path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| master_names.contains(n));
            let record = touch_bank(&mut work, layout, &self.fs, path, stat);
            record.role = if is_master {
                BankRole::Master
            } else {
                BankRole::Content
            };
            if record.last_modified == Some(stat.modified) {
                continue;
            }

            reparse(&mut self.reader, &mut work, path)?;
            reparsed += 1;
            if let Some(record) = work.banks.get_mut(path) {
                record.last_modified = Some(stat.modified);
            }
        }

        let gone: Vec<PathBuf> = work
            .banks
            .values()
            .filter(|b| !b.exists_this_pass)
            .map(|b| b.path.clone())
            .collect();
        for path in &gone {
            log::debug!(target: "bankcache::builder", "{} no longer exists", path.display());
            work.banks.remove(path);
            work.detach_bank(path);
        }
        let orphaned = work.prune_orphan_events();

        let reported: BTreeSet<Guid> = work
            .banks
            .values()
            .flat_map(|b| b.global_parameters.iter().copied())
            .collect();
        let params_before = work.parameters.len();
        work.parameters.retain(|guid, _| reported.contains(guid));

        work.recompute_role_sets();
        for bank in work.banks.values_mut() {
            bank.exists_this_pass = false;
        }
        work.schema_version = CACHE_SCHEMA_VERSION;
        work.last_build_marker_time = Some(marker_time);
        work.generation = cache.generation.wrapping_add(1);

        log::info!(
            target: "bankcache::builder",
            "Rebuilt cache generation {}: {} banks ({} re-parsed, {} removed), {} events ({} pruned), {} parameters ({} pruned)",
            work.generation,
            work.banks.len(),
            reparsed,
            gone.len(),
            work.event_count(),
            orphaned,
            work.parameters.len(),
            params_before - work.parameters.len()
        );
        Ok(Arc::new(work))
    }

    fn stat(&self, path: &Path) -> Result<FileStat, BuildError> {
        self.fs.stat(path).map_err(|source| BuildError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reuse the recorded identity of an unchanged marker, open it otherwise.
    fn marker_identity(&mut self, work: &Cache, path: &Path, stat: FileStat) -> Result<Guid, BuildError> {
        if let Some(record) = work.bank(path) {
            if let (BankRole::Marker, LoadOutcome::Identified { guid }) = (record.role, record.load_outcome) {
                if record.last_modified == Some(stat.modified) {
                    return Ok(guid);
                }
            }
        }
        let handle = self
            .reader
            .open(path)
            .map_err(|e| BuildError::from_open(path.to_path_buf(), e))?;
        let guid = self.reader.identity(&handle);
        self.reader.close(handle);
        Ok(guid)
    }
}

/// Find or create the record for `path` and mark it present in this pass.
fn touch_bank<'a, F: SourceFs>(
    work: &'a mut Cache,
    layout: &SourceLayout,
    fs: &F,
    path: &Path,
    stat: FileStat,
) -> &'a mut BankRecord {
    let record = work
        .banks
        .entry(path.to_path_buf())
        .or_insert_with(|| BankRecord::new(path, layout.bank_name(path)));
    record.exists_this_pass = true;
    record.platform_sizes = layout.platform_sizes(fs, path, stat.len).into_iter().collect();
    record
}

/// Re-read one content bank into `work`.
///
/// Every event the bank ships is rebuilt from its descriptor, keeping its
/// associations with other banks.
fn reparse<R: BankReader>(reader: &mut R, work: &mut Cache, path: &Path) -> Result<(), BuildError> {
    work.detach_bank(path);

    let handle = reader
        .open(path)
        .map_err(|e| BuildError::from_open(path.to_path_buf(), e))?;
    let events = reader.enumerate_events(&handle);
    let globals = reader.enumerate_global_parameters();
    reader.close(handle);

    let mut loaded = 0u32;
    for desc in &events {
        if desc.path.is_empty() {
            log::debug!(target: "bankcache::builder", "{}: skipping event {} with no path", path.display(), desc.guid);
            continue;
        }
        let mut event = EventRecord::from_descriptor(desc);
        if let Some(existing) = work.event_mut(&desc.path) {
            event.banks = std::mem::take(&mut existing.banks);
        }
        event.banks.insert(path.to_path_buf());
        work.insert_event(event);
        loaded += 1;
    }

    let mut reported = BTreeSet::new();
    for param in globals.iter().filter(|p| p.global) {
        work.parameters.insert(param.guid, param.to_record());
        reported.insert(param.guid);
    }

    if let Some(record) = work.banks.get_mut(path) {
        record.global_parameters = reported;
        record.load_outcome = LoadOutcome::Loaded { events: loaded };
    }
    log::debug!(target: "bankcache::builder", "parsed {}: {} events", path.display(), loaded);
    Ok(())
}
