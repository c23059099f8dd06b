use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::descriptor::EventDescriptor;
use crate::parameter::ParameterRecord;
use crate::Guid;

/// A playable event, keyed by its path (`event:/...`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub guid: Guid,
    pub path: String,
    pub is_3d: bool,
    pub is_one_shot: bool,
    pub is_stream: bool,
    /// Length in milliseconds, 0 for events with no fixed length.
    pub length: u32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub parameters: Vec<ParameterRecord>,
    /// Paths of every bank that ships this event. Never empty in a committed cache.
    pub banks: BTreeSet<PathBuf>,
}

impl EventRecord {
    /// Build a fresh record from a descriptor, associated with no banks yet.
    pub fn from_descriptor(desc: &EventDescriptor) -> Self {
        Self {
            guid: desc.guid,
            path: desc.path.clone(),
            is_3d: desc.is_3d,
            is_one_shot: desc.is_one_shot,
            is_stream: desc.is_stream,
            length: desc.length,
            min_distance: desc.min_distance,
            max_distance: desc.max_distance,
            parameters: desc
                .parameters
                .iter()
                .filter(|p| p.is_exposed())
                .map(|p| p.to_record())
                .collect(),
            banks: BTreeSet::new(),
        }
    }

    pub fn local_parameters(&self) -> Vec<&ParameterRecord> {
        let mut params: Vec<_> = self.parameters.iter().filter(|p| !p.is_global()).collect();
        params.sort_by(|a, b| a.name.cmp(&b.name));
        params
    }

    pub fn global_parameters(&self) -> Vec<&ParameterRecord> {
        let mut params: Vec<_> = self.parameters.iter().filter(|p| p.is_global()).collect();
        params.sort_by(|a, b| a.name.cmp(&b.name));
        params
    }

    /// Last segment of the event path.
    pub fn leaf_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ParameterDescriptor;

    fn desc() -> EventDescriptor {
        EventDescriptor {
            guid: Guid::new(1),
            path: "event:/Ambience/Wind".to_string(),
            is_3d: true,
            length: 2500,
            max_distance: 40.0,
            parameters: vec![
                ParameterDescriptor::local("Speed", 0.0, 10.0, 1.0),
                ParameterDescriptor::global(Guid::new(9), "Weather", 0.0, 1.0, 0.0),
                ParameterDescriptor {
                    read_only: true,
                    ..ParameterDescriptor::local("Distance", 0.0, 100.0, 0.0)
                },
                ParameterDescriptor::local("Gust", 0.0, 1.0, 0.0),
            ],
            ..EventDescriptor::default()
        }
    }

    #[test]
    fn from_descriptor_skips_read_only_locals() {
        let event = EventRecord::from_descriptor(&desc());
        let names: Vec<_> = event.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Speed", "Weather", "Gust"]);
        assert!(event.banks.is_empty());
        assert_eq!(event.length, 2500);
    }

    #[test]
    fn parameter_views_split_and_sort() {
        let event = EventRecord::from_descriptor(&desc());
        let local: Vec<_> = event.local_parameters().iter().map(|p| p.name.clone()).collect();
        let global: Vec<_> = event.global_parameters().iter().map(|p| p.name.clone()).collect();
        assert_eq!(local, vec!["Gust", "Speed"]);
        assert_eq!(global, vec!["Weather"]);
    }

    #[test]
    fn leaf_name_is_last_segment() {
        let event = EventRecord::from_descriptor(&desc());
        assert_eq!(event.leaf_name(), "Wind");
    }
}
