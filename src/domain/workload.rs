//! Kubernetes workload types: Services, Pods, containers and health probes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::id::{ObjectMeta, Service};

/// Integer or named port, as Kubernetes `IntOrString`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntOrString {
    Int(u32),
    String(String),
}

impl fmt::Display for IntOrString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntOrString::Int(n) => write!(f, "{}", n),
            IntOrString::String(s) => write!(f, "{}", s),
        }
    }
}

/// Kubernetes Service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubeService {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ServiceSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selector: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ServicePort>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub port: u32,

    /// Container port the service port forwards to; defaults to `port`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<IntOrString>,
}

impl ServicePort {
    /// Whether this service port forwards to the given container port
    pub fn targets(&self, container_port: u32, container_port_name: Option<&str>) -> bool {
        match &self.target_port {
            None => self.port == container_port,
            Some(IntOrString::Int(n)) => *n == container_port,
            Some(IntOrString::String(name)) => container_port_name == Some(name.as_str()),
        }
    }
}

impl KubeService {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self { metadata: ObjectMeta::new(name, namespace), spec: ServiceSpec::default() }
    }

    pub fn with_selector(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec.selector.insert(key.into(), value.into());
        self
    }

    pub fn with_port(mut self, name: impl Into<String>, port: u32, target_port: Option<IntOrString>) -> Self {
        self.spec.ports.push(ServicePort { name: Some(name.into()), port, target_port });
        self
    }

    /// Value key of this service
    pub fn service(&self) -> Service {
        Service::new(self.metadata.name.clone(), self.metadata.namespace_or_default())
    }

    /// Whether the service's selector picks the pod.
    ///
    /// Services without a selector select nothing.
    pub fn selects(&self, pod: &Pod) -> bool {
        !self.spec.selector.is_empty()
            && self.metadata.namespace_or_default() == pod.namespace()
            && self
                .spec
                .selector
                .iter()
                .all(|(k, v)| pod.metadata.labels.get(k) == Some(v))
    }

    /// Service port forwarding to the given container port
    pub fn port_for_container(&self, container_port: u32, name: Option<&str>) -> Option<&ServicePort> {
        self.spec.ports.iter().find(|p| p.targets(container_port, name))
    }
}

/// Kubernetes Pod
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PodSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodSpec {
    #[serde(default)]
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ContainerPort>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness_probe: Option<Probe>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_probe: Option<Probe>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPort {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub container_port: u32,
}

/// Container health probe handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ProbeFields", into = "ProbeFields")]
pub enum Probe {
    Exec,
    HttpGet { port: IntOrString },
    TcpSocket { port: IntOrString },
    /// Native gRPC health check, sent by the kubelet over plaintext HTTP/2
    Grpc,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProbeFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exec: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    http_get: Option<ProbePort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tcp_socket: Option<ProbePort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    grpc: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProbePort {
    port: IntOrString,
}

impl TryFrom<ProbeFields> for Probe {
    type Error = String;

    fn try_from(fields: ProbeFields) -> Result<Self, Self::Error> {
        match (fields.exec, fields.http_get, fields.tcp_socket, fields.grpc) {
            (Some(_), None, None, None) => Ok(Probe::Exec),
            (None, Some(http), None, None) => Ok(Probe::HttpGet { port: http.port }),
            (None, None, Some(tcp), None) => Ok(Probe::TcpSocket { port: tcp.port }),
            (None, None, None, Some(_)) => Ok(Probe::Grpc),
            (None, None, None, None) => {
                Err("probe needs one of exec, httpGet, tcpSocket or grpc".to_string())
            }
            _ => Err("probe sets more than one handler".to_string()),
        }
    }
}

impl From<Probe> for ProbeFields {
    fn from(probe: Probe) -> Self {
        match probe {
            Probe::Exec => Self { exec: Some(serde_json::json!({})), ..Default::default() },
            Probe::HttpGet { port } => Self { http_get: Some(ProbePort { port }), ..Default::default() },
            Probe::TcpSocket { port } => Self { tcp_socket: Some(ProbePort { port }), ..Default::default() },
            Probe::Grpc => Self { grpc: Some(serde_json::json!({})), ..Default::default() },
        }
    }
}

impl Probe {
    /// Handler name as written in the manifest
    pub fn kind(&self) -> &'static str {
        match self {
            Probe::Exec => "exec",
            Probe::HttpGet { .. } => "httpGet",
            Probe::TcpSocket { .. } => "tcpSocket",
            Probe::Grpc => "grpc",
        }
    }

    /// Port the mTLS check looks at; exec and gRPC probes are not checked
    pub fn port(&self) -> Option<&IntOrString> {
        match self {
            Probe::Exec | Probe::Grpc => None,
            Probe::HttpGet { port } | Probe::TcpSocket { port } => Some(port),
        }
    }
}

impl Container {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn with_port(mut self, name: Option<&str>, container_port: u32) -> Self {
        self.ports.push(ContainerPort { name: name.map(str::to_string), container_port });
        self
    }

    pub fn with_liveness(mut self, probe: Probe) -> Self {
        self.liveness_probe = Some(probe);
        self
    }

    pub fn with_readiness(mut self, probe: Probe) -> Self {
        self.readiness_probe = Some(probe);
        self
    }

    /// Liveness then readiness probe, labelled
    pub fn probes(&self) -> impl Iterator<Item = (&'static str, &Probe)> {
        [("liveness", self.liveness_probe.as_ref()), ("readiness", self.readiness_probe.as_ref())]
            .into_iter()
            .filter_map(|(label, probe)| probe.map(|p| (label, p)))
    }

    /// Resolve a probe port to a number and the container port name, if any.
    ///
    /// Numbered ports need not be declared; named ports must be.
    pub fn resolve_port(&self, port: &IntOrString) -> Option<(u32, Option<&str>)> {
        match port {
            IntOrString::Int(n) => {
                let name = self
                    .ports
                    .iter()
                    .find(|p| p.container_port == *n)
                    .and_then(|p| p.name.as_deref());
                Some((*n, name))
            }
            IntOrString::String(wanted) => self
                .ports
                .iter()
                .find(|p| p.name.as_deref() == Some(wanted.as_str()))
                .map(|p| (p.container_port, p.name.as_deref())),
        }
    }
}

impl Pod {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self { metadata: ObjectMeta::new(name, namespace), spec: PodSpec::default() }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.annotations.insert(key.into(), value.into());
        self
    }

    pub fn with_container(mut self, container: Container) -> Self {
        self.spec.containers.push(container);
        self
    }

    pub fn namespace(&self) -> &str {
        self.metadata.namespace_or_default()
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn has_container(&self, name: &str) -> bool {
        self.spec.containers.iter().any(|c| c.name == name)
    }

    /// Whether an annotation is set to `"true"`
    pub fn annotation_enabled(&self, key: &str) -> bool {
        self.metadata
            .annotations
            .get(key)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }
}
