use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::bank::{BankRecord, BankRole};
use crate::event::EventRecord;
use crate::parameter::ParameterRecord;
use crate::Guid;

/// Version of the cache layout understood by this build. Any other version is
/// discarded wholesale.
pub const CACHE_SCHEMA_VERSION: u32 = 10;

/// The derived index of banks, events and global parameters.
///
/// Events are keyed by path with a secondary GUID index kept in step by the
/// mutation methods. Readers receive the cache behind an `Arc` and never see a
/// partially rebuilt value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cache {
    pub schema_version: u32,
    /// Modification time of the marker accepted by the last committed build.
    pub last_build_marker_time: Option<SystemTime>,
    /// Bumped on every committed rebuild.
    pub generation: u64,
    pub banks: BTreeMap<PathBuf, BankRecord>,
    events: BTreeMap<String, EventRecord>,
    #[serde(skip)]
    event_guids: BTreeMap<Guid, String>,
    pub parameters: BTreeMap<Guid, ParameterRecord>,
    pub master_banks: BTreeSet<PathBuf>,
    pub marker_banks: BTreeSet<PathBuf>,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache {
    pub fn new() -> Self {
        Self {
            schema_version: CACHE_SCHEMA_VERSION,
            last_build_marker_time: None,
            generation: 0,
            banks: BTreeMap::new(),
            events: BTreeMap::new(),
            event_guids: BTreeMap::new(),
            parameters: BTreeMap::new(),
            master_banks: BTreeSet::new(),
            marker_banks: BTreeSet::new(),
        }
    }

    /// True once at least one build has been committed.
    pub fn is_valid(&self) -> bool {
        self.last_build_marker_time.is_some()
    }

    pub fn is_current_schema(&self) -> bool {
        self.schema_version == CACHE_SCHEMA_VERSION
    }

    pub fn is_empty(&self) -> bool {
        self.banks.is_empty() && self.events.is_empty() && self.parameters.is_empty()
    }

    // ============================================================
    // Queries
    // ============================================================

    pub fn all_banks(&self) -> impl Iterator<Item = &BankRecord> {
        self.banks.values()
    }

    pub fn all_events(&self) -> impl Iterator<Item = &EventRecord> {
        self.events.values()
    }

    pub fn all_parameters(&self) -> impl Iterator<Item = &ParameterRecord> {
        self.parameters.values()
    }

    pub fn master_banks(&self) -> impl Iterator<Item = &BankRecord> {
        self.master_banks.iter().filter_map(|p| self.banks.get(p))
    }

    pub fn marker_banks(&self) -> impl Iterator<Item = &BankRecord> {
        self.marker_banks.iter().filter_map(|p| self.banks.get(p))
    }

    pub fn bank(&self, path: &Path) -> Option<&BankRecord> {
        self.banks.get(path)
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Exact path match first, then ASCII case-insensitive.
    pub fn find_event_by_path(&self, path: &str) -> Option<&EventRecord> {
        self.events.get(path).or_else(|| {
            self.events
                .values()
                .find(|e| e.path.eq_ignore_ascii_case(path))
        })
    }

    pub fn find_event_by_guid(&self, guid: Guid) -> Option<&EventRecord> {
        self.event_guids
            .get(&guid)
            .and_then(|path| self.events.get(path))
    }

    /// Look up by `{guid}` when the string starts with a brace, by path otherwise.
    pub fn find_event(&self, path_or_guid: &str) -> Option<&EventRecord> {
        if path_or_guid.starts_with('{') {
            Guid::parse(path_or_guid).and_then(|g| self.find_event_by_guid(g))
        } else {
            self.find_event_by_path(path_or_guid)
        }
    }

    pub fn find_parameter_by_name(&self, name: &str) -> Option<&ParameterRecord> {
        self.parameters
            .values()
            .find(|p| p.name == name)
            .or_else(|| {
                self.parameters
                    .values()
                    .find(|p| p.name.eq_ignore_ascii_case(name))
            })
    }

    // ============================================================
    // Mutation (used by the builder on its working copy)
    // ============================================================

    /// Reset to an empty, never-built cache of the current schema.
    pub fn clear(&mut self) {
        let generation = self.generation;
        *self = Cache::new();
        self.generation = generation;
    }

    pub fn event_mut(&mut self, path: &str) -> Option<&mut EventRecord> {
        self.events.get_mut(path)
    }

    /// Insert or replace the event stored under `event.path`.
    pub fn insert_event(&mut self, event: EventRecord) -> Option<EventRecord> {
        let previous = self.events.remove(&event.path);
        if let Some(prev) = &previous {
            if self.event_guids.get(&prev.guid) == Some(&prev.path) {
                self.event_guids.remove(&prev.guid);
            }
        }
        self.event_guids.insert(event.guid, event.path.clone());
        self.events.insert(event.path.clone(), event);
        previous
    }

    pub fn remove_event(&mut self, path: &str) -> Option<EventRecord> {
        let removed = self.events.remove(path)?;
        if self.event_guids.get(&removed.guid) == Some(&removed.path) {
            self.event_guids.remove(&removed.guid);
        }
        Some(removed)
    }

    /// Drop `bank` from every event's association set.
    pub fn detach_bank(&mut self, bank: &Path) {
        for event in self.events.values_mut() {
            event.banks.remove(bank);
        }
    }

    /// Remove every event whose bank set is empty. Returns how many went.
    pub fn prune_orphan_events(&mut self) -> usize {
        let orphans: Vec<String> = self
            .events
            .values()
            .filter(|e| e.banks.is_empty())
            .map(|e| e.path.clone())
            .collect();
        for path in &orphans {
            self.remove_event(path);
        }
        orphans.len()
    }

    /// Recompute the role-derived bank sets.
    pub fn recompute_role_sets(&mut self) {
        self.master_banks = self.paths_with_role(BankRole::Master);
        self.marker_banks = self.paths_with_role(BankRole::Marker);
    }

    fn paths_with_role(&self, role: BankRole) -> BTreeSet<PathBuf> {
        self.banks
            .values()
            .filter(|b| b.role == role)
            .map(|b| b.path.clone())
            .collect()
    }

    /// Rebuild the GUID index from the event map; needed after deserializing.
    pub fn reindex(&mut self) {
        self.event_guids = self
            .events
            .values()
            .map(|e| (e.guid, e.path.clone()))
            .collect();
    }
}
