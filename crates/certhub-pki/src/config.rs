//! PKI configuration.

use crate::error::{PkiError, PkiResult};

/// Settings for key generation, certificate subjects and validity.
///
/// Built once at process start and handed to the services; nothing in
/// this crate mutates it.
#[derive(Debug, Clone)]
pub struct PkiConfig {
    /// Common name of the root certificate and name of the CA organisation.
    pub ca_name: String,
    /// Name of the default tenant organisation.
    pub server_name: String,
    /// Email of the CA principal and the CA organisation.
    pub ca_email: String,
    /// Email of the default tenant organisation.
    pub server_email: String,
    /// Two-letter country code for default organisations.
    pub default_country: String,
    pub default_province: String,
    pub default_locality: String,
    /// RSA modulus size in bits (default: 4096).
    pub rsa_key_size: u32,
    /// RSA public exponent (default: 65537).
    pub rsa_public_exponent: u32,
    /// Root certificate lifetime in days (default: 7300 = 20 years).
    pub ca_validity_days: u32,
    /// Leaf certificate lifetime in days (default: 1825 = 5 years).
    pub server_validity_days: u32,
}

impl Default for PkiConfig {
    fn default() -> Self {
        Self {
            ca_name: "Night's Watch".into(),
            server_name: "Cyberdyne Systems".into(),
            ca_email: "john.snow@westeros.gov".into(),
            server_email: "serena.kogan@skynet.org".into(),
            default_country: "GB".into(),
            default_province: "England".into(),
            default_locality: "London".into(),
            rsa_key_size: 4096,
            rsa_public_exponent: 65537,
            ca_validity_days: 20 * 365,
            server_validity_days: 5 * 365,
        }
    }
}

impl PkiConfig {
    /// Reject settings that would only fail later, mid-issuance.
    pub fn validate(&self) -> PkiResult<()> {
        let invalid = |message: String| Err(PkiError::InvalidConfig(message));

        if self.ca_name.trim().is_empty() {
            return invalid("ca_name must not be empty".into());
        }
        if self.ca_email.trim().is_empty() || self.server_email.trim().is_empty() {
            return invalid("ca_email and server_email must not be empty".into());
        }
        if self.ca_email == self.server_email {
            return invalid("ca_email and server_email must differ".into());
        }
        if self.default_country.len() != 2
            || !self.default_country.chars().all(|c| c.is_ascii_alphabetic())
        {
            return invalid(format!(
                "default_country must be a two-letter code, got {:?}",
                self.default_country
            ));
        }
        if self.rsa_public_exponent < 3 || self.rsa_public_exponent % 2 == 0 {
            return invalid(format!(
                "rsa_public_exponent must be odd and at least 3, got {}",
                self.rsa_public_exponent
            ));
        }
        if self.rsa_key_size < 2048 {
            return invalid(format!(
                "rsa_key_size must be at least 2048 bits, got {}",
                self.rsa_key_size
            ));
        }
        if self.ca_validity_days == 0 || self.server_validity_days == 0 {
            return invalid("validity periods must be at least one day".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        PkiConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_even_exponent() {
        let config = PkiConfig {
            rsa_public_exponent: 65536,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_long_country_code() {
        let config = PkiConfig {
            default_country: "GBR".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_shared_email() {
        let config = PkiConfig {
            server_email: PkiConfig::default().ca_email,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
