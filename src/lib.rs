//! # meshcheck
//!
//! Static analysis of Istio mesh configuration. meshcheck reads VirtualServices,
//! authentication policies, DestinationRules, Services and Pods and reports
//! configuration that is individually valid but conflicts as a whole:
//!
//! - VirtualService routes on one host and gateway that can match the same request
//! - authentication policies claiming the same namespace, service or port
//! - an invalid MeshPolicy, or DestinationRules tied at one precedence tier
//! - server-side mTLS that disagrees with the TLS clients originate
//! - HTTP and TCP health probes that fail once mTLS is enforced
//!
//! ## Architecture
//!
//! ```text
//! manifests / ObjectSource → MeshSnapshot → Analyzer (vetters) → Report → notes
//!                                               ↓
//!                                     PrecedenceResolver, HostNormalizer
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use meshcheck::{Analyzer, AnalyzerConfig, MeshSnapshot, Result};
//!
//! fn main() -> Result<()> {
//!     let snapshot = MeshSnapshot::from_paths(&["mesh.yaml"])?;
//!     let report = Analyzer::new(AnalyzerConfig::default()).analyze(&snapshot)?;
//!     for note in report.notes() {
//!         println!("{} {}", note.severity, note.message);
//!     }
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod observability;

// Re-export commonly used types and traits
pub use analysis::{Analyzer, Finding, FindingKind, MeshSnapshot, Note, ObjectSource, Report, Severity};
pub use config::AnalyzerConfig;
pub use errors::{MeshcheckError, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
