//! DestinationRule domain types
//!
//! Only client-side TLS settings are modelled: the top-level traffic policy mode and
//! per-port overrides.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::id::ObjectMeta;

/// Istio DestinationRule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationRule {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: DestinationRuleSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationRuleSpec {
    /// Destination host; required, but tolerated as missing so the rule can be skipped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_policy: Option<TrafficPolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<ClientTlsSettings>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub port_level_settings: Vec<PortTrafficPolicy>,
}

/// Traffic policy override for one destination port
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortTrafficPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<PortNumber>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<ClientTlsSettings>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortNumber {
    pub number: u32,
}

/// Client TLS settings; certificates and SNI are not modelled
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTlsSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<TlsMode>,
}

impl ClientTlsSettings {
    /// Mode in effect; an omitted mode is `DISABLE`
    pub fn mode(&self) -> TlsMode {
        self.mode.unwrap_or(TlsMode::Disable)
    }
}

/// Client TLS mode used towards the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TlsMode {
    /// Plaintext
    Disable,
    /// One-way TLS; no client certificate
    Simple,
    /// Mutual TLS with user-supplied certificates
    Mutual,
    /// Mutual TLS with mesh-issued certificates
    IstioMutual,
}

impl TlsMode {
    /// Whether the client presents a certificate
    pub fn is_mutual(&self) -> bool {
        matches!(self, TlsMode::Mutual | TlsMode::IstioMutual)
    }
}

impl fmt::Display for TlsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsMode::Disable => write!(f, "DISABLE"),
            TlsMode::Simple => write!(f, "SIMPLE"),
            TlsMode::Mutual => write!(f, "MUTUAL"),
            TlsMode::IstioMutual => write!(f, "ISTIO_MUTUAL"),
        }
    }
}

impl DestinationRule {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::new(name, namespace),
            spec: DestinationRuleSpec { host: Some(host.into()), traffic_policy: None },
        }
    }

    /// Set the top-level client TLS mode
    pub fn with_tls(mut self, mode: TlsMode) -> Self {
        self.traffic_policy_mut().tls = Some(ClientTlsSettings { mode: Some(mode) });
        self
    }

    /// Add a port-level client TLS override
    pub fn with_port_tls(mut self, port: u32, mode: TlsMode) -> Self {
        self.traffic_policy_mut().port_level_settings.push(PortTrafficPolicy {
            port: Some(PortNumber { number: port }),
            tls: Some(ClientTlsSettings { mode: Some(mode) }),
        });
        self
    }

    fn traffic_policy_mut(&mut self) -> &mut TrafficPolicy {
        self.spec.traffic_policy.get_or_insert_with(TrafficPolicy::default)
    }

    pub fn namespace(&self) -> &str {
        self.metadata.namespace_or_default()
    }

    pub fn qualified_name(&self) -> String {
        self.metadata.qualified_name()
    }

    /// Destination host, if set and non-empty
    pub fn host(&self) -> Option<&str> {
        self.spec.host.as_deref().filter(|h| !h.is_empty())
    }

    /// Top-level client TLS mode
    pub fn top_level_tls_mode(&self) -> Option<TlsMode> {
        self.spec.traffic_policy.as_ref()?.tls.as_ref().map(ClientTlsSettings::mode)
    }

    /// Client TLS mode set specifically for `port`
    pub fn port_tls_mode(&self, port: u32) -> Option<TlsMode> {
        self.spec
            .traffic_policy
            .as_ref()?
            .port_level_settings
            .iter()
            .filter(|setting| setting.port.map(|p| p.number) == Some(port))
            .find_map(|setting| setting.tls.as_ref().map(ClientTlsSettings::mode))
    }

    /// Ports carrying a port-level client TLS override
    pub fn tls_ports(&self) -> BTreeSet<u32> {
        self.spec
            .traffic_policy
            .iter()
            .flat_map(|policy| &policy.port_level_settings)
            .filter(|setting| setting.tls.is_some())
            .filter_map(|setting| setting.port.map(|p| p.number))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_top_level_and_port_settings() {
        let rule: DestinationRule = serde_yaml::from_str(
            r#"
metadata:
  name: reviews
  namespace: bookinfo
spec:
  host: reviews
  trafficPolicy:
    tls:
      mode: ISTIO_MUTUAL
    portLevelSettings:
    - port:
        number: 9080
      tls:
        mode: DISABLE
    - port:
        number: 9443
"#,
        )
        .unwrap();

        assert_eq!(rule.host(), Some("reviews"));
        assert_eq!(rule.top_level_tls_mode(), Some(TlsMode::IstioMutual));
        assert_eq!(rule.port_tls_mode(9080), Some(TlsMode::Disable));
        assert_eq!(rule.port_tls_mode(9443), None);
        assert_eq!(rule.port_tls_mode(1234), None);
        assert_eq!(rule.tls_ports().into_iter().collect::<Vec<_>>(), vec![9080]);
    }

    #[test]
    fn omitted_tls_mode_is_disable() {
        let rule: DestinationRule = serde_yaml::from_str(
            r#"
metadata:
  name: cart
  namespace: shop
spec:
  host: cart
  trafficPolicy:
    tls:
      sni: cart.example
    portLevelSettings:
    - port:
        number: 8443
      tls: {}
"#,
        )
        .unwrap();

        assert_eq!(rule.top_level_tls_mode(), Some(TlsMode::Disable));
        assert_eq!(rule.port_tls_mode(8443), Some(TlsMode::Disable));
    }

    #[test]
    fn missing_host_is_tolerated_on_decode() {
        let rule: DestinationRule =
            serde_yaml::from_str("metadata:\n  name: broken\n  namespace: ns\nspec: {}\n").unwrap();
        assert_eq!(rule.host(), None);
        assert_eq!(rule.top_level_tls_mode(), None);
    }

    #[test]
    fn builders_and_mutual_modes() {
        let rule = DestinationRule::new("dr", "ns", "svc")
            .with_tls(TlsMode::Simple)
            .with_port_tls(8443, TlsMode::Mutual);
        assert_eq!(rule.top_level_tls_mode(), Some(TlsMode::Simple));
        assert_eq!(rule.port_tls_mode(8443), Some(TlsMode::Mutual));
        assert!(TlsMode::IstioMutual.is_mutual());
        assert!(!TlsMode::Simple.is_mutual());
    }
}
