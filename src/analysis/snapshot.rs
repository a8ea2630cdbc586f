//! Object snapshots
//!
//! An analysis pass reads one [`MeshSnapshot`]: every object of every kind, listed up
//! front. Listing goes through [`ObjectSource`] so a cluster-backed source can stand in
//! for manifests; a source that fails to list any kind fails the whole pass. Single
//! objects that do not decode are set aside as [`RejectedObject`]s and reported.

use std::io::Read;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_yaml::Value;
use tracing::{debug, warn};

use crate::domain::{AuthenticationPolicy, DestinationRule, KubeService, MeshPolicy, Pod, VirtualService};
use super::{Finding, FindingKind, Severity};
use crate::errors::{MeshcheckError, Result};

/// API group of authentication policies; other `Policy` kinds are ignored.
const AUTHENTICATION_API_GROUP: &str = "authentication.istio.io/";

/// Lists the objects an analysis pass reads
pub trait ObjectSource {
    fn virtual_services(&self) -> Result<Vec<VirtualService>>;
    fn authentication_policies(&self) -> Result<Vec<AuthenticationPolicy>>;
    fn mesh_policies(&self) -> Result<Vec<MeshPolicy>>;
    fn destination_rules(&self) -> Result<Vec<DestinationRule>>;
    fn services(&self) -> Result<Vec<KubeService>>;
    fn pods(&self) -> Result<Vec<Pod>>;

    /// Objects of a supported kind the source could not decode
    fn rejected_objects(&self) -> Result<Vec<RejectedObject>> {
        Ok(Vec::new())
    }
}

/// An object left out of the snapshot because it does not decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedObject {
    pub kind: String,
    /// Qualified name, or the document position when the name is unreadable
    pub object: String,
    pub reason: String,
}

impl RejectedObject {
    pub fn finding(&self) -> Finding {
        Finding::new(FindingKind::InvalidObject, Severity::Warning)
            .with_attr("kind", &self.kind)
            .with_attr("object", &self.object)
            .with_attr("reason", &self.reason)
    }
}

/// Complete, immutable object set for one pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshSnapshot {
    pub virtual_services: Vec<VirtualService>,
    pub authentication_policies: Vec<AuthenticationPolicy>,
    pub mesh_policies: Vec<MeshPolicy>,
    pub destination_rules: Vec<DestinationRule>,
    pub services: Vec<KubeService>,
    pub pods: Vec<Pod>,
    pub rejected: Vec<RejectedObject>,
}

impl ObjectSource for MeshSnapshot {
    fn virtual_services(&self) -> Result<Vec<VirtualService>> {
        Ok(self.virtual_services.clone())
    }

    fn authentication_policies(&self) -> Result<Vec<AuthenticationPolicy>> {
        Ok(self.authentication_policies.clone())
    }

    fn mesh_policies(&self) -> Result<Vec<MeshPolicy>> {
        Ok(self.mesh_policies.clone())
    }

    fn destination_rules(&self) -> Result<Vec<DestinationRule>> {
        Ok(self.destination_rules.clone())
    }

    fn services(&self) -> Result<Vec<KubeService>> {
        Ok(self.services.clone())
    }

    fn pods(&self) -> Result<Vec<Pod>> {
        Ok(self.pods.clone())
    }

    fn rejected_objects(&self) -> Result<Vec<RejectedObject>> {
        Ok(self.rejected.clone())
    }
}

impl MeshSnapshot {
    /// List every kind from `source`.
    ///
    /// Listing failures surface as `Fetch` naming the resource.
    pub fn collect(source: &dyn ObjectSource) -> Result<Self> {
        Ok(Self {
            virtual_services: listed("virtualservices", source.virtual_services())?,
            authentication_policies: listed("policies", source.authentication_policies())?,
            mesh_policies: listed("meshpolicies", source.mesh_policies())?,
            destination_rules: listed("destinationrules", source.destination_rules())?,
            services: listed("services", source.services())?,
            pods: listed("pods", source.pods())?,
            rejected: source.rejected_objects()?,
        })
    }

    /// Parse multi-document Kubernetes YAML.
    ///
    /// Unsupported kinds are ignored. A document of a supported kind that fails to
    /// decode is skipped and kept as a [`RejectedObject`]; input that is not YAML at
    /// all is an error naming its document.
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        let mut snapshot = Self::default();
        for (index, document) in serde_yaml::Deserializer::from_str(input).enumerate() {
            let value = Value::deserialize(document).map_err(|e| {
                MeshcheckError::serialization(format!("document {} is not valid YAML", index), e)
            })?;
            snapshot.add_document(value, index)?;
        }
        Ok(snapshot)
    }

    /// Load and merge manifest files; `-` reads standard input.
    pub fn from_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut snapshot = Self::default();
        for path in paths {
            let path = path.as_ref();
            let contents = read_manifest(path)?;
            let loaded = Self::from_yaml_str(&contents).map_err(|mut e| {
                e.add_context(path.display().to_string());
                e
            })?;
            debug!(path = %path.display(), objects = loaded.object_count(), "Loaded manifests");
            snapshot.merge(loaded);
        }
        Ok(snapshot)
    }

    pub fn merge(&mut self, other: MeshSnapshot) {
        self.virtual_services.extend(other.virtual_services);
        self.authentication_policies.extend(other.authentication_policies);
        self.mesh_policies.extend(other.mesh_policies);
        self.destination_rules.extend(other.destination_rules);
        self.services.extend(other.services);
        self.pods.extend(other.pods);
        self.rejected.extend(other.rejected);
    }

    pub fn object_count(&self) -> usize {
        self.virtual_services.len()
            + self.authentication_policies.len()
            + self.mesh_policies.len()
            + self.destination_rules.len()
            + self.services.len()
            + self.pods.len()
    }

    pub fn with_virtual_service(mut self, vs: VirtualService) -> Self {
        self.virtual_services.push(vs);
        self
    }

    pub fn with_policy(mut self, policy: AuthenticationPolicy) -> Self {
        self.authentication_policies.push(policy);
        self
    }

    pub fn with_mesh_policy(mut self, policy: MeshPolicy) -> Self {
        self.mesh_policies.push(policy);
        self
    }

    pub fn with_destination_rule(mut self, rule: DestinationRule) -> Self {
        self.destination_rules.push(rule);
        self
    }

    pub fn with_service(mut self, service: KubeService) -> Self {
        self.services.push(service);
        self
    }

    pub fn with_pod(mut self, pod: Pod) -> Self {
        self.pods.push(pod);
        self
    }

    fn add_document(&mut self, value: Value, index: usize) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }

        let kind = value.get("kind").and_then(Value::as_str).unwrap_or_default().to_string();
        let api_version = value.get("apiVersion").and_then(Value::as_str).unwrap_or_default();

        match kind.as_str() {
            "List" => {
                if let Some(Value::Sequence(items)) = value.get("items") {
                    for item in items.clone() {
                        self.add_document(item, index)?;
                    }
                }
            }
            "VirtualService" => {
                if let Some(vs) = self.admit(value, index, &kind)? {
                    self.virtual_services.push(vs);
                }
            }
            "Policy" if api_version.is_empty() || api_version.starts_with(AUTHENTICATION_API_GROUP) => {
                if let Some(policy) = self.admit(value, index, &kind)? {
                    self.authentication_policies.push(policy);
                }
            }
            "MeshPolicy" => {
                if let Some(policy) = self.admit(value, index, &kind)? {
                    self.mesh_policies.push(policy);
                }
            }
            "DestinationRule" => {
                if let Some(rule) = self.admit(value, index, &kind)? {
                    self.destination_rules.push(rule);
                }
            }
            "Service" => {
                if let Some(service) = self.admit(value, index, &kind)? {
                    self.services.push(service);
                }
            }
            "Pod" => {
                if let Some(pod) = self.admit(value, index, &kind)? {
                    self.pods.push(pod);
                }
            }
            other => {
                debug!(kind = other, api_version, document = index, "Ignoring unsupported object");
            }
        }
        Ok(())
    }

    /// Decode one object, setting it aside when it is malformed
    fn admit<T: DeserializeOwned>(&mut self, value: Value, index: usize, kind: &str) -> Result<Option<T>> {
        let object = object_label(&value, index);
        match decode(value, kind, &object) {
            Ok(decoded) => Ok(Some(decoded)),
            Err(MeshcheckError::InvalidObject { kind, object, reason }) => {
                warn!(kind = %kind, object = %object, reason = %reason, "Skipping object that does not decode");
                self.rejected.push(RejectedObject { kind, object, reason });
                Ok(None)
            }
            Err(other) => Err(other),
        }
    }
}

fn decode<T: DeserializeOwned>(value: Value, kind: &str, object: &str) -> Result<T> {
    serde_yaml::from_value(value).map_err(|e| MeshcheckError::invalid_object(kind, object, e.to_string()))
}

/// `name.namespace` from the document's metadata, else its position
fn object_label(value: &Value, index: usize) -> String {
    let metadata = value.get("metadata");
    let name = metadata.and_then(|m| m.get("name")).and_then(Value::as_str);
    let namespace = metadata.and_then(|m| m.get("namespace")).and_then(Value::as_str);
    match (name, namespace) {
        (Some(name), Some(namespace)) => format!("{}.{}", name, namespace),
        (Some(name), None) => format!("{}.default", name),
        (None, _) => format!("document {}", index),
    }
}

fn listed<T>(resource: &str, listing: Result<Vec<T>>) -> Result<Vec<T>> {
    listing.map_err(|error| match error {
        fetch @ MeshcheckError::Fetch { .. } => fetch,
        other => MeshcheckError::fetch(resource, other.to_string()),
    })
}

fn read_manifest(path: &Path) -> Result<String> {
    let read = if path.as_os_str() == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer).map(|_| buffer)
    } else {
        std::fs::read_to_string(path)
    };
    read.map_err(|source| MeshcheckError::Io {
        source,
        context: format!("failed to read {}", path.display()),
    })
}
