//! State snapshots
//!
//! A [`StateSnapshot`] is the engine's record of every resource instance it
//! tracks for one deployment, plus the `serial` used for optimistic
//! concurrency. Resources are held flattened, keyed by instance address;
//! the grouped on-disk layout lives in [`crate::tfstate`].

use crate::address::ResourceAddress;
use crate::error::StateError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::path::{Component, Path};

/// Workspace used when a document does not name one
pub const DEFAULT_WORKSPACE: &str = "default";

/// Identity of one state blob: a configuration directory plus a workspace
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeploymentId {
    dir: String,
    workspace: String,
}

impl DeploymentId {
    /// Deployment in the default workspace
    #[inline]
    #[must_use]
    pub fn new(dir: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            workspace: DEFAULT_WORKSPACE.to_string(),
        }
    }

    /// With a named workspace
    #[inline]
    #[must_use]
    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = workspace.into();
        self
    }

    /// Configuration directory
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &str {
        &self.dir
    }

    /// Workspace name
    #[inline]
    #[must_use]
    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    /// True for the `default` workspace
    #[inline]
    #[must_use]
    pub fn is_default_workspace(&self) -> bool {
        self.workspace == DEFAULT_WORKSPACE
    }

    /// Check that `dir` and `workspace` stay below a state root
    ///
    /// # Errors
    /// Returns [`StateError::InvalidDeployment`] for an absolute `dir`, a
    /// `..` component, or a workspace that is not one plain path segment
    pub fn validate(&self) -> Result<(), StateError> {
        let invalid = |reason: &str| StateError::InvalidDeployment {
            deployment: self.clone(),
            reason: reason.to_string(),
        };
        if Path::new(&self.dir)
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(invalid("dir must be a relative path without `..`"));
        }
        let mut workspace = Path::new(&self.workspace).components();
        match (workspace.next(), workspace.next()) {
            (Some(Component::Normal(_)), None) => Ok(()),
            _ => Err(invalid("workspace must be a single path segment")),
        }
    }
}

impl Display for DeploymentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.dir, self.workspace)
    }
}

/// Everything the state records about one resource instance
///
/// The attribute body is opaque to the engine; actions move it around but
/// never look inside except for the `id` attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Provider configuration address, e.g. `provider["registry.terraform.io/hashicorp/aws"]`
    pub provider: String,
    /// Provider schema version of the attributes
    #[serde(default)]
    pub schema_version: u64,
    /// Opaque attribute object
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Addresses this instance depends on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Instance fields carried through untouched: `status`, `private`,
    /// `sensitive_attributes`, `create_before_destroy` and the like
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResourceRecord {
    /// Record with the given provider and attributes
    #[must_use]
    pub fn new(provider: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Self {
            provider: provider.into(),
            schema_version: 0,
            attributes,
            dependencies: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Record created by an import: only the remote id is known
    #[must_use]
    pub fn imported(provider: impl Into<String>, external_id: impl Into<String>) -> Self {
        let mut attributes = Map::new();
        attributes.insert("id".to_string(), Value::String(external_id.into()));
        Self::new(provider, attributes)
    }

    /// Remote object id, if the attributes carry one
    #[inline]
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.attributes.get("id").and_then(Value::as_str)
    }

    /// True when the engine marked the object for replacement
    #[inline]
    #[must_use]
    pub fn is_tainted(&self) -> bool {
        self.extra.get("status").and_then(Value::as_str) == Some("tainted")
    }
}

/// Versioned record of all tracked resources of one deployment
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub(crate) terraform_version: String,
    pub(crate) serial: u64,
    pub(crate) lineage: String,
    pub(crate) outputs: Map<String, Value>,
    pub(crate) resources: BTreeMap<ResourceAddress, ResourceRecord>,
    pub(crate) extra: Map<String, Value>,
}

impl StateSnapshot {
    /// Empty state with a fresh lineage and serial 0
    #[must_use]
    pub fn empty() -> Self {
        Self::with_lineage(uuid::Uuid::new_v4().to_string())
    }

    /// Empty state with a fixed lineage
    #[must_use]
    pub fn with_lineage(lineage: impl Into<String>) -> Self {
        Self {
            terraform_version: String::new(),
            serial: 0,
            lineage: lineage.into(),
            outputs: Map::new(),
            resources: BTreeMap::new(),
            extra: Map::new(),
        }
    }

    /// With an explicit serial
    #[inline]
    #[must_use]
    pub fn with_serial(mut self, serial: u64) -> Self {
        self.serial = serial;
        self
    }

    /// With a resource instance added
    #[must_use]
    pub fn with_resource(mut self, address: ResourceAddress, record: ResourceRecord) -> Self {
        self.resources.insert(address, record);
        self
    }

    /// Version token, incremented by every backend write
    #[inline]
    #[must_use]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Identity of this state's history
    #[inline]
    #[must_use]
    pub fn lineage(&self) -> &str {
        &self.lineage
    }

    /// Version of the engine that last wrote the state
    #[inline]
    #[must_use]
    pub fn terraform_version(&self) -> &str {
        &self.terraform_version
    }

    /// Root module outputs, kept verbatim
    #[inline]
    #[must_use]
    pub fn outputs(&self) -> &Map<String, Value> {
        &self.outputs
    }

    /// Top-level state fields carried through untouched, e.g. `check_results`
    #[inline]
    #[must_use]
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// All resource instances by address
    #[inline]
    #[must_use]
    pub fn resources(&self) -> &BTreeMap<ResourceAddress, ResourceRecord> {
        &self.resources
    }

    /// Number of tracked instances
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// True when nothing is tracked
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Record at an exact instance address
    #[inline]
    #[must_use]
    pub fn get(&self, address: &ResourceAddress) -> Option<&ResourceRecord> {
        self.resources.get(address)
    }

    /// Instance addresses that fall under `address`, in order
    #[must_use]
    pub fn matching(&self, address: &ResourceAddress) -> Vec<ResourceAddress> {
        self.resources
            .keys()
            .filter(|candidate| address.contains(candidate))
            .cloned()
            .collect()
    }

    /// Whether any instance falls under `address`
    #[must_use]
    pub fn contains(&self, address: &ResourceAddress) -> bool {
        self.resources.keys().any(|candidate| address.contains(candidate))
    }

    /// Insert or replace an instance, returning the previous record
    pub fn insert(
        &mut self,
        address: ResourceAddress,
        record: ResourceRecord,
    ) -> Option<ResourceRecord> {
        self.resources.insert(address, record)
    }

    /// Remove an instance
    pub fn remove(&mut self, address: &ResourceAddress) -> Option<ResourceRecord> {
        self.resources.remove(address)
    }

    /// Mutable access to all records, for whole-state rewrites
    pub fn records_mut(&mut self) -> impl Iterator<Item = (&ResourceAddress, &mut ResourceRecord)> {
        self.resources.iter_mut()
    }

    /// True when both snapshots track the same instances with the same bodies
    ///
    /// Ignores serial and lineage.
    #[must_use]
    pub fn same_resources(&self, other: &Self) -> bool {
        self.resources == other.resources
    }
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn addr(s: &str) -> ResourceAddress {
        s.parse().unwrap()
    }

    fn record(id: &str) -> ResourceRecord {
        ResourceRecord::imported("provider[\"registry.terraform.io/hashicorp/aws\"]", id)
    }

    #[test]
    fn deployment_display_and_workspace() {
        let d = DeploymentId::new("envs/prod");
        assert!(d.is_default_workspace());
        assert_eq!(d.to_string(), "envs/prod:default");

        let staging = d.with_workspace("staging");
        assert_eq!(staging.workspace(), "staging");
        assert!(!staging.is_default_workspace());
    }

    #[test]
    fn deployment_must_stay_below_the_root() {
        assert!(DeploymentId::new("envs/prod").validate().is_ok());
        assert!(DeploymentId::new("").validate().is_ok());
        assert!(DeploymentId::new("./app").validate().is_ok());

        for dir in ["/etc", "../outside", "envs/../../outside"] {
            let err = DeploymentId::new(dir).validate().unwrap_err();
            assert!(matches!(err, StateError::InvalidDeployment { .. }), "{dir}");
        }
        for workspace in ["..", "a/b", "", "/abs"] {
            assert!(
                DeploymentId::new("app").with_workspace(workspace).validate().is_err(),
                "{workspace}"
            );
        }
    }

    #[test]
    fn imported_record_carries_only_id() {
        let r = record("i-123");
        assert_eq!(r.id(), Some("i-123"));
        assert_eq!(r.attributes.len(), 1);
    }

    #[test]
    fn matching_by_module_and_resource() {
        let state = StateSnapshot::with_lineage("l")
            .with_resource(addr("module.db.aws_db_instance.main"), record("db-1"))
            .with_resource(addr("module.db.aws_db_subnet_group.sg"), record("sg-1"))
            .with_resource(addr("aws_instance.web[0]"), record("i-0"))
            .with_resource(addr("aws_instance.web[1]"), record("i-1"));

        assert_eq!(state.matching(&addr("module.db")).len(), 2);
        assert_eq!(state.matching(&addr("aws_instance.web")).len(), 2);
        assert_eq!(
            state.matching(&addr("aws_instance.web[1]")),
            vec![addr("aws_instance.web[1]")]
        );
        assert!(!state.contains(&addr("module.db_primary")));
    }

    #[test]
    fn same_resources_ignores_serial() {
        let a = StateSnapshot::with_lineage("l")
            .with_serial(3)
            .with_resource(addr("aws_instance.web"), record("i-1"));
        let mut b = a.clone().with_serial(9);
        assert!(a.same_resources(&b));

        b.records_mut().for_each(|(_, r)| {
            r.attributes.insert("tags".to_string(), json!({}));
        });
        assert!(!a.same_resources(&b));
    }
}
