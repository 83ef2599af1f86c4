use std::collections::HashMap;
use std::fmt;

use crate::externalscaler::ScaledObjectRef;

/// The workload a request is evaluated for, together with the trigger
/// metadata KEDA copied from its `ScaledObject` spec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScaledObject {
    pub name: String,
    pub namespace: String,
    pub scaler_metadata: HashMap<String, String>,
}

impl ScaledObject {
    pub fn target_key(&self) -> TargetKey {
        TargetKey::new(&self.namespace, &self.name)
    }

    /// Looks up a metadata value, treating whitespace-only values as absent.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.scaler_metadata
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

impl From<ScaledObjectRef> for ScaledObject {
    fn from(proto: ScaledObjectRef) -> Self {
        ScaledObject {
            name: proto.name,
            namespace: proto.namespace,
            scaler_metadata: proto.scaler_metadata,
        }
    }
}

/// `{namespace}/{name}`, the form a tenant takes inside an event's target list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetKey(String);

impl TargetKey {
    pub fn new(namespace: &str, name: &str) -> Self {
        TargetKey(format!("{}/{}", namespace, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when `targets`, a comma separated list, names this key exactly.
    pub fn is_listed_in(&self, targets: &str) -> bool {
        targets.split(',').any(|target| target.trim() == self.0)
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
