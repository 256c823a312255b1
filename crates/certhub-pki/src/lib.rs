//! certhub PKI: RSA key material, X.509 encoding and the get-or-create
//! issuance workflows.
//!
//! The crate is layered leaf-first:
//! - [`keys`] generates and loads RSA private keys (PKCS#8 PEM).
//! - [`codec`] builds CSRs, the self-signed root and CA-signed leaves.
//! - [`identity`] provisions default organisations and the CA principal.
//! - [`registry`] maps a principal and its alternate names to a server.
//! - [`service`] ties them together into the bootstrap and tenant paths.

pub mod codec;
pub mod config;
pub mod error;
pub mod identity;
pub mod keys;
pub mod registry;
pub mod service;

pub use codec::SubjectFields;
pub use config::PkiConfig;
pub use error::{PkiError, PkiResult};
pub use identity::IdentityRegistry;
pub use registry::ServerRegistry;
pub use service::{Bootstrap, IssuanceService, IssuedServer, ServerSummary};
