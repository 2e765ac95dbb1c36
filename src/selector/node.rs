//! Backend node descriptors.

use std::collections::HashMap;
use std::fmt;

/// Seed scheduling weight for nodes that do not declare one.
pub const DEFAULT_WEIGHT: u64 = 100;

/// Immutable description of one backend endpoint.
///
/// The address is the identity of a node: two nodes with the same address
/// inside one applied set are the same logical backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    scheme: String,
    address: String,
    weight: Option<u64>,
    version: String,
    name: String,
    metadata: HashMap<String, String>,
}

impl Node {
    /// Create a node with no declared weight, version or metadata.
    pub fn new(scheme: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            address: address.into(),
            weight: None,
            version: String::new(),
            name: String::new(),
            metadata: HashMap::new(),
        }
    }

    /// Create a node whose weight, name and version come from metadata.
    ///
    /// Recognized keys are `weight` (integer), `name` and `version`. A weight
    /// that does not parse leaves the declared weight unset.
    pub fn from_metadata(
        scheme: impl Into<String>,
        address: impl Into<String>,
        metadata: HashMap<String, String>,
    ) -> Self {
        let weight = metadata.get("weight").and_then(|w| w.parse::<u64>().ok());
        let name = metadata.get("name").cloned().unwrap_or_default();
        let version = metadata.get("version").cloned().unwrap_or_default();

        Self {
            scheme: scheme.into(),
            address: address.into(),
            weight,
            version,
            name,
            metadata,
        }
    }

    /// Set the declared weight.
    pub fn with_weight(mut self, weight: u64) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Set the version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Replace the metadata.
    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Scheme used to talk to this node, e.g. `http`.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Address of the node, unique within a node set.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Declared scheduling weight, if any.
    pub fn initial_weight(&self) -> Option<u64> {
        self.weight
    }

    /// Declared weight, or [`DEFAULT_WEIGHT`] when none was declared.
    pub fn weight_or_default(&self) -> u64 {
        self.weight.unwrap_or(DEFAULT_WEIGHT)
    }

    /// Node version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Service name taken from the `name` metadata key.
    pub fn service_name(&self) -> &str {
        &self.name
    }

    /// Key/value metadata associated with the node.
    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.address)
    }
}

/// Build a metadata map from key/value pairs.
pub fn raw_metadata<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> HashMap<String, String>
where
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
