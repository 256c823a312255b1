//! Server registry: maps a principal and a set of alternate names to one
//! stable [`Server`].

use std::collections::BTreeSet;

use certhub_core::error::CertHubError;
use certhub_core::models::server::{CreateServer, Server};
use certhub_core::models::user::User;
use certhub_core::repository::ServerRepository;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{MAX_ATTEMPTS, PkiError, PkiResult, unsettled};

/// Common name of a tenant server: lowercase hex SHA-256 over the email
/// followed by the sorted, deduplicated names, with no separators.
///
/// Because nothing delimits the parts, `["ab", "c"]` and `["a", "bc"]`
/// hash to the same value for a given email.
pub fn tenant_common_name(email: &str, names: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.as_bytes());
    for name in canonical_names(names) {
        hasher.update(name.as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn canonical_names(names: &[String]) -> Vec<String> {
    names
        .iter()
        .map(String::as_str)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_owned)
        .collect()
}

pub struct ServerRegistry<S> {
    servers: S,
    ca_name: String,
}

impl<S: ServerRepository> ServerRegistry<S> {
    pub fn new(servers: S, ca_name: impl Into<String>) -> Self {
        Self {
            servers,
            ca_name: ca_name.into(),
        }
    }

    /// The CA's server, created under the CA name on first use.
    pub async fn get_or_create_for_ca(&self, ca: &User) -> PkiResult<(Server, bool)> {
        if !ca.is_ca {
            return Err(CertHubError::Validation {
                message: format!("user {} is not the CA", ca.email),
            }
            .into());
        }

        for attempt in 1..=MAX_ATTEMPTS {
            match self.servers.get_by_user(ca.id).await {
                Ok(server) => return Ok((server, false)),
                Err(CertHubError::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }

            let input = CreateServer {
                user_id: ca.id,
                organisation_id: ca.organisation_id,
                common_name: self.ca_name.clone(),
                alternative_names: Vec::new(),
            };
            match self.servers.create(input).await {
                Ok(server) => {
                    info!(server_id = %server.id, common_name = %server.common_name, "CA server created");
                    return Ok((server, true));
                }
                Err(CertHubError::ConstraintViolation { .. }) => {
                    let holder = self.servers.get_by_common_name(&self.ca_name).await?;
                    if holder.user_id != ca.id {
                        return Err(PkiError::DuplicateRoot);
                    }
                    debug!(attempt, "CA server created concurrently, retrying lookup");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(unsettled("server"))
    }

    /// The server for `user` covering exactly `names`, in any order and
    /// with duplicates ignored. The CA is routed to its own server.
    pub async fn get_or_create_for_alternate_names(
        &self,
        user: &User,
        names: &[String],
    ) -> PkiResult<(Server, bool)> {
        if user.is_ca {
            return self.get_or_create_for_ca(user).await;
        }

        let names = canonical_names(names);
        let common_name = tenant_common_name(&user.email, &names);

        for attempt in 1..=MAX_ATTEMPTS {
            match self.servers.get_by_common_name(&common_name).await {
                Ok(server) => return Ok((server, false)),
                Err(CertHubError::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }

            let input = CreateServer {
                user_id: user.id,
                organisation_id: user.organisation_id,
                common_name: common_name.clone(),
                alternative_names: names.clone(),
            };
            match self.servers.create(input).await {
                Ok(server) => {
                    info!(
                        server_id = %server.id,
                        user_id = %user.id,
                        names = ?names,
                        "tenant server created"
                    );
                    return Ok((server, true));
                }
                Err(CertHubError::ConstraintViolation { .. }) => {
                    debug!(attempt, %common_name, "server created concurrently, retrying lookup");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(unsettled("server"))
    }

    pub async fn alternative_names(&self, server: &Server) -> PkiResult<Vec<String>> {
        Ok(self.servers.alternative_names(server.id).await?)
    }

    pub async fn list_for_user(&self, user: &User) -> PkiResult<Vec<Server>> {
        Ok(self.servers.list_by_user(user.id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn hashes_email_then_sorted_names() {
        assert_eq!(
            tenant_common_name("serena.kogan@skynet.org", &names(&["b.com", "a.com"])),
            "2d4dfcae53bf476609f843530f601d2a8f0250850a273ab346eb9d03ef2fe86f"
        );
    }

    #[test]
    fn empty_name_set_hashes_email_alone() {
        assert_eq!(
            tenant_common_name("serena.kogan@skynet.org", &[]),
            "98a94f563d39995071805bf86d87ff0d592e7f7c3448517d41eff8ffdaf66ce8"
        );
    }

    #[test]
    fn ignores_order_and_duplicates() {
        let a = tenant_common_name("t@x.org", &names(&["a.com", "b.com"]));
        let b = tenant_common_name("t@x.org", &names(&["b.com", "a.com", "b.com"]));
        assert_eq!(a, b);
    }

    #[test]
    fn differs_per_email() {
        let set = names(&["a.com"]);
        assert_ne!(
            tenant_common_name("one@x.org", &set),
            tenant_common_name("two@x.org", &set)
        );
    }

    #[test]
    fn unseparated_concatenation_collides() {
        assert_eq!(
            tenant_common_name("t@x.org", &names(&["ab", "c"])),
            tenant_common_name("t@x.org", &names(&["a", "bc"]))
        );
    }
}
