use serde::{Deserialize, Serialize};

use crate::Guid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterKind {
    #[default]
    Continuous,
    Discrete,
    Labeled,
}

impl ParameterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ParameterKind::Continuous => "Continuous",
            ParameterKind::Discrete => "Discrete",
            ParameterKind::Labeled => "Labeled",
        }
    }

    pub fn parse(s: &str) -> Option<ParameterKind> {
        match s {
            "Continuous" => Some(ParameterKind::Continuous),
            "Discrete" => Some(ParameterKind::Discrete),
            "Labeled" => Some(ParameterKind::Labeled),
            _ => None,
        }
    }
}

/// A parameter as cached.
///
/// Global parameters carry their GUID, which is their identity in
/// `Cache::parameters`. Event-local parameters have no GUID and are owned by the
/// event that lists them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRecord {
    pub guid: Option<Guid>,
    pub name: String,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    pub kind: ParameterKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

impl ParameterRecord {
    pub fn is_global(&self) -> bool {
        self.guid.is_some()
    }

    /// Display path, `parameter:/<name>` for globals and
    /// `parameter:/<event leaf>/<name>` for event-local parameters.
    pub fn studio_path(&self, event_path: Option<&str>) -> String {
        match (self.guid, event_path) {
            (None, Some(event)) => {
                let leaf = event.rsplit('/').next().unwrap_or(event);
                format!("parameter:/{}/{}", leaf, self.name)
            }
            _ => format!("parameter:/{}", self.name),
        }
    }
}
