//! Terraform v4 state codec
//!
//! The state file groups instances by resource:
//!
//! ```json
//! {"version": 4, "serial": 7, "lineage": "...", "outputs": {},
//!  "resources": [{"module": "module.db", "mode": "managed",
//!                 "type": "aws_db_instance", "name": "main",
//!                 "provider": "provider[\"registry.terraform.io/hashicorp/aws\"]",
//!                 "instances": [{"schema_version": 0, "attributes": {...}}]}]}
//! ```
//!
//! [`StateSnapshot`] is flattened by instance address. This module converts
//! between the two; it is both the persisted format of the local backend
//! and the format handed to the diff oracle.
//!
//! Fields the engine does not interpret (instance `status`, `private`,
//! `sensitive_attributes`, top-level `check_results`, ...) are carried
//! through unchanged. A block's `each` is derived from its instance keys.

use crate::address::{InstanceKey, ModuleStep, ResourceAddress, ResourceMode, ResourceRef};
use crate::error::StateError;
use crate::snapshot::{ResourceRecord, StateSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// State format version this codec reads and writes
pub const STATE_FORMAT_VERSION: u32 = 4;

#[derive(Serialize, Deserialize)]
struct RawState {
    version: u32,
    #[serde(default)]
    terraform_version: String,
    serial: u64,
    lineage: String,
    #[serde(default)]
    outputs: Map<String, Value>,
    #[serde(default)]
    resources: Vec<RawResource>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize)]
struct RawResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    module: Option<String>,
    mode: String,
    #[serde(rename = "type")]
    type_name: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    each: Option<String>,
    provider: String,
    instances: Vec<RawInstance>,
}

#[derive(Serialize, Deserialize)]
struct RawInstance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    index_key: Option<Value>,
    #[serde(default)]
    schema_version: u64,
    #[serde(default)]
    attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    dependencies: Vec<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Grouping key: one state file resource block
type BlockKey = (Vec<ModuleStep>, ResourceMode, String, String);

/// `each` of a block whose instances are keyed like `key`
fn each_mode(key: Option<&InstanceKey>) -> Option<&'static str> {
    match key {
        None => None,
        Some(InstanceKey::Index(_)) => Some("list"),
        Some(InstanceKey::Name(_)) => Some("map"),
    }
}

impl TryFrom<&StateSnapshot> for RawState {
    type Error = StateError;

    fn try_from(snapshot: &StateSnapshot) -> Result<Self, Self::Error> {
        let mut blocks: BTreeMap<BlockKey, RawResource> = BTreeMap::new();

        for (address, record) in &snapshot.resources {
            let Some(resource) = address.resource() else {
                continue;
            };
            let key = (
                address.module_path().to_vec(),
                resource.mode,
                resource.type_name.clone(),
                resource.name.clone(),
            );
            let each = each_mode(resource.key.as_ref());
            let block = blocks.entry(key).or_insert_with(|| RawResource {
                module: address.module_string(),
                mode: resource.mode.as_str().to_string(),
                type_name: resource.type_name.clone(),
                name: resource.name.clone(),
                each: each.map(str::to_string),
                provider: record.provider.clone(),
                instances: Vec::new(),
            });

            let inconsistent = |reason: String| StateError::InconsistentBlock {
                block: address.with_key(None).to_string(),
                reason,
            };
            if block.provider != record.provider {
                return Err(inconsistent(format!(
                    "{address} uses {} but the block uses {}",
                    record.provider, block.provider
                )));
            }
            if block.each.as_deref() != each {
                return Err(inconsistent(format!(
                    "{address} is keyed differently from the other instances"
                )));
            }

            block.instances.push(RawInstance {
                index_key: resource.key.as_ref().map(|k| match k {
                    InstanceKey::Index(i) => Value::from(*i),
                    InstanceKey::Name(n) => Value::String(n.clone()),
                }),
                schema_version: record.schema_version,
                attributes: record.attributes.clone(),
                dependencies: record.dependencies.clone(),
                extra: record.extra.clone(),
            });
        }

        Ok(Self {
            version: STATE_FORMAT_VERSION,
            terraform_version: snapshot.terraform_version.clone(),
            serial: snapshot.serial,
            lineage: snapshot.lineage.clone(),
            outputs: snapshot.outputs.clone(),
            resources: blocks.into_values().collect(),
            extra: snapshot.extra.clone(),
        })
    }
}

impl RawState {
    fn into_snapshot(self) -> Result<StateSnapshot, StateError> {
        let raw = self;
        if raw.version != STATE_FORMAT_VERSION {
            return Err(StateError::Corrupt(format!(
                "unsupported state format version {} (expected {STATE_FORMAT_VERSION})",
                raw.version
            )));
        }

        let mut resources = BTreeMap::new();
        for block in raw.resources {
            let module = match block.module.as_deref() {
                None | Some("") => Vec::new(),
                Some(path) => {
                    let parsed: ResourceAddress = path.parse().map_err(|e| {
                        StateError::Corrupt(format!("bad module path '{path}': {e}"))
                    })?;
                    if !parsed.is_module() {
                        return Err(StateError::Corrupt(format!(
                            "module path '{path}' names a resource"
                        )));
                    }
                    parsed.module_path().to_vec()
                }
            };
            let mode = match block.mode.as_str() {
                "managed" => ResourceMode::Managed,
                "data" => ResourceMode::Data,
                other => {
                    return Err(StateError::Corrupt(format!("unknown resource mode '{other}'")))
                }
            };

            for instance in block.instances {
                let key = instance.index_key.map(decode_index_key).transpose()?;
                let address = ResourceAddress::from_parts(
                    module.clone(),
                    ResourceRef {
                        mode,
                        type_name: block.type_name.clone(),
                        name: block.name.clone(),
                        key,
                    },
                );
                let record = ResourceRecord {
                    provider: block.provider.clone(),
                    schema_version: instance.schema_version,
                    attributes: instance.attributes,
                    dependencies: instance.dependencies,
                    extra: instance.extra,
                };
                if resources.insert(address.clone(), record).is_some() {
                    return Err(StateError::Corrupt(format!(
                        "instance {address} appears twice"
                    )));
                }
            }
        }

        Ok(StateSnapshot {
            terraform_version: raw.terraform_version,
            serial: raw.serial,
            lineage: raw.lineage,
            outputs: raw.outputs,
            resources,
            extra: raw.extra,
        })
    }
}

fn decode_index_key(value: Value) -> Result<InstanceKey, StateError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(InstanceKey::Index)
            .ok_or_else(|| StateError::Corrupt(format!("invalid index_key {n}"))),
        Value::String(s) => Ok(InstanceKey::Name(s)),
        other => Err(StateError::Corrupt(format!("invalid index_key {other}"))),
    }
}

impl Serialize for StateSnapshot {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        RawState::try_from(self)
            .map_err(<S::Error as serde::ser::Error>::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StateSnapshot {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawState::deserialize(deserializer)?;
        raw.into_snapshot().map_err(serde::de::Error::custom)
    }
}

/// Encode a snapshot as pretty-printed state JSON
///
/// # Errors
/// - [`StateError::InconsistentBlock`] if instances of one resource disagree
///   on provider or key type
/// - [`StateError::Encode`] if serialization fails
pub fn encode(snapshot: &StateSnapshot) -> Result<Vec<u8>, StateError> {
    let raw = RawState::try_from(snapshot)?;
    let mut bytes = serde_json::to_vec_pretty(&raw)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decode state JSON
///
/// # Errors
/// Returns [`StateError::Corrupt`] for malformed or unsupported input
pub fn decode(bytes: &[u8]) -> Result<StateSnapshot, StateError> {
    serde_json::from_slice(bytes).map_err(|e| StateError::Corrupt(e.to_string()))
}
