use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use bankcache_types::{BankManifest, EventDescriptor, Guid, ParameterDescriptor};

use super::{BankReader, OpenError, OpenErrorKind};

/// Handle to a manifest opened by [`ManifestReader`].
#[derive(Debug)]
pub struct ManifestHandle {
    id: u64,
}

/// Reads banks stored as JSON [`BankManifest`] documents.
///
/// Manifests stay resident between `open` and `close` so that global parameter
/// enumeration sees every open bank.
#[derive(Debug, Default)]
pub struct ManifestReader {
    next_id: u64,
    open: BTreeMap<u64, BankManifest>,
}

impl ManifestReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }
}

impl BankReader for ManifestReader {
    type Handle = ManifestHandle;

    fn open(&mut self, path: &Path) -> Result<ManifestHandle, OpenError> {
        let contents = fs::read_to_string(path)?;
        let manifest: BankManifest = serde_json::from_str(&contents)
            .map_err(|e| OpenError::new(OpenErrorKind::Corrupt, e.to_string()))?;

        let id = self.next_id;
        self.next_id += 1;
        log::debug!(target: "bankcache::reader", "opened {} ({} events)", path.display(), manifest.events.len());
        self.open.insert(id, manifest);
        Ok(ManifestHandle { id })
    }

    fn identity(&self, handle: &ManifestHandle) -> Guid {
        self.open.get(&handle.id).map(|m| m.guid).unwrap_or_default()
    }

    fn enumerate_events(&self, handle: &ManifestHandle) -> Vec<EventDescriptor> {
        self.open
            .get(&handle.id)
            .map(|m| m.events.clone())
            .unwrap_or_default()
    }

    fn enumerate_global_parameters(&self) -> Vec<ParameterDescriptor> {
        let mut seen = BTreeMap::new();
        for param in self.open.values().flat_map(|m| m.global_parameters.iter()) {
            seen.entry(param.guid).or_insert_with(|| ParameterDescriptor {
                global: true,
                ..param.clone()
            });
        }
        seen.into_values().collect()
    }

    fn close(&mut self, handle: ManifestHandle) {
        self.open.remove(&handle.id);
    }
}
