//! PKI error types.

use certhub_core::error::CertHubError;
use openssl::error::ErrorStack;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PkiError {
    #[error("malformed private key: {0}")]
    MalformedKey(String),

    #[error("unsupported key type {0}: only RSA keys are allowed")]
    UnsupportedKeyType(String),

    #[error("signing key mismatch: {0}")]
    KeyMismatch(String),

    #[error("cryptography error: {0}")]
    Crypto(String),

    #[error("malformed certificate: {0}")]
    MalformedCertificate(String),

    #[error("certificate request is missing the {0} extension")]
    ExtensionMissing(&'static str),

    #[error("root certificate has not been bootstrapped")]
    RootNotBootstrapped,

    #[error("a root certificate already exists")]
    DuplicateRoot,

    #[error("invalid PKI configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Store(#[from] CertHubError),
}

impl From<ErrorStack> for PkiError {
    fn from(err: ErrorStack) -> Self {
        PkiError::Crypto(err.to_string())
    }
}

pub type PkiResult<T> = Result<T, PkiError>;

/// Attempts a get-or-create makes before giving up on a contended row.
pub(crate) const MAX_ATTEMPTS: u32 = 3;

/// Every attempt lost its insert race yet the winner's row never became
/// visible.
pub(crate) fn unsettled(entity: &str) -> PkiError {
    PkiError::Store(CertHubError::Internal(format!(
        "{entity} get-or-create did not settle after {MAX_ATTEMPTS} attempts"
    )))
}

impl From<PkiError> for CertHubError {
    fn from(err: PkiError) -> Self {
        match err {
            PkiError::Store(inner) => inner,
            PkiError::InvalidConfig(message) => CertHubError::Validation { message },
            PkiError::MalformedKey(_)
            | PkiError::UnsupportedKeyType(_)
            | PkiError::KeyMismatch(_)
            | PkiError::Crypto(_) => CertHubError::Crypto(err.to_string()),
            PkiError::MalformedCertificate(_)
            | PkiError::ExtensionMissing(_)
            | PkiError::RootNotBootstrapped
            | PkiError::DuplicateRoot => CertHubError::Certificate(err.to_string()),
        }
    }
}
