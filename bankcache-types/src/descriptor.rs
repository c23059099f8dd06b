//! What a bank reader reports about an opened bank.
//!
//! These mirror the reader's view of the file and are converted into cache
//! records by the builder. `BankManifest` is the on-disk shape used by the JSON
//! manifest reader.

use serde::{Deserialize, Serialize};

use crate::parameter::{ParameterKind, ParameterRecord};
use crate::Guid;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventDescriptor {
    pub guid: Guid,
    pub path: String,
    pub is_3d: bool,
    pub is_one_shot: bool,
    pub is_stream: bool,
    pub length: u32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub parameters: Vec<ParameterDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterDescriptor {
    pub guid: Guid,
    pub name: String,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    pub global: bool,
    pub read_only: bool,
    pub discrete: bool,
    pub labels: Vec<String>,
}

impl ParameterDescriptor {
    pub fn local(name: &str, min: f32, max: f32, default: f32) -> Self {
        Self {
            name: name.to_string(),
            min,
            max,
            default,
            ..Self::default()
        }
    }

    pub fn global(guid: Guid, name: &str, min: f32, max: f32, default: f32) -> Self {
        Self {
            guid,
            global: true,
            ..Self::local(name, min, max, default)
        }
    }

    /// Read-only local parameters are engine-driven and never shown.
    pub fn is_exposed(&self) -> bool {
        self.global || !self.read_only
    }

    pub fn kind(&self) -> ParameterKind {
        if !self.labels.is_empty() {
            ParameterKind::Labeled
        } else if self.discrete {
            ParameterKind::Discrete
        } else {
            ParameterKind::Continuous
        }
    }

    pub fn to_record(&self) -> ParameterRecord {
        ParameterRecord {
            guid: self.global.then_some(self.guid),
            name: self.name.clone(),
            min: self.min,
            max: self.max,
            default: self.default,
            kind: self.kind(),
            labels: self.labels.clone(),
        }
    }
}

/// A bank as described by a JSON manifest file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BankManifest {
    pub guid: Guid,
    pub events: Vec<EventDescriptor>,
    pub global_parameters: Vec<ParameterDescriptor>,
}
