//! Default organisations and principals.
//!
//! The CA organisation and the default tenant organisation are both built
//! from [`PkiConfig`]. They are looked up by their `ca_rights` flag and
//! created lazily the first time they are needed.

use certhub_core::error::CertHubError;
use certhub_core::models::organisation::{CreateOrganisation, Organisation};
use certhub_core::models::user::{CreateUser, User};
use certhub_core::repository::{OrganisationRepository, UserRepository};
use tracing::{debug, info};

use crate::config::PkiConfig;
use crate::error::{MAX_ATTEMPTS, PkiResult, unsettled};

pub struct IdentityRegistry<O, U> {
    organisations: O,
    users: U,
    config: PkiConfig,
}

impl<O, U> IdentityRegistry<O, U>
where
    O: OrganisationRepository,
    U: UserRepository,
{
    pub fn new(organisations: O, users: U, config: PkiConfig) -> Self {
        Self {
            organisations,
            users,
            config,
        }
    }

    /// Return the oldest organisation with `ca_rights == for_ca`, creating
    /// the configured default when there is none. The flag reports whether
    /// this call created it.
    pub async fn get_or_create_default_organisation(
        &self,
        for_ca: bool,
    ) -> PkiResult<(Organisation, bool)> {
        for attempt in 1..=MAX_ATTEMPTS {
            match self.organisations.get_by_ca_rights(for_ca).await {
                Ok(organisation) => return Ok((organisation, false)),
                Err(CertHubError::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }

            match self.organisations.create(self.default_organisation(for_ca)).await {
                Ok(organisation) => {
                    info!(
                        organisation_id = %organisation.id,
                        name = %organisation.name,
                        ca_rights = for_ca,
                        "default organisation created"
                    );
                    return Ok((organisation, true));
                }
                Err(CertHubError::ConstraintViolation { .. }) => {
                    debug!(attempt, ca_rights = for_ca, "organisation created concurrently, retrying lookup");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(unsettled("organisation"))
    }

    /// The CA principal: the configured CA email in the CA organisation.
    pub async fn get_or_create_ca_user(&self) -> PkiResult<(User, bool)> {
        let (organisation, _) = self.get_or_create_default_organisation(true).await?;
        self.get_or_create_principal(&self.config.ca_email, true, &organisation)
            .await
    }

    /// A tenant principal in the default tenant organisation.
    ///
    /// An existing user is returned as-is, whatever organisation it belongs
    /// to.
    pub async fn get_or_create_user(&self, email: &str) -> PkiResult<(User, bool)> {
        match self.users.get_by_email(email).await {
            Ok(user) => return Ok((user, false)),
            Err(CertHubError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        let (organisation, _) = self.get_or_create_default_organisation(false).await?;
        self.get_or_create_principal(email, false, &organisation)
            .await
    }

    pub async fn organisation(&self, user: &User) -> PkiResult<Organisation> {
        Ok(self.organisations.get_by_id(user.organisation_id).await?)
    }

    async fn get_or_create_principal(
        &self,
        email: &str,
        is_ca: bool,
        organisation: &Organisation,
    ) -> PkiResult<(User, bool)> {
        for attempt in 1..=MAX_ATTEMPTS {
            match self.users.get_by_email(email).await {
                Ok(user) => return Ok((user, false)),
                Err(CertHubError::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }

            let input = CreateUser {
                email: email.to_string(),
                is_ca,
                organisation_id: organisation.id,
            };
            match self.users.create(input).await {
                Ok(user) => {
                    info!(user_id = %user.id, %email, is_ca, "user created");
                    return Ok((user, true));
                }
                Err(CertHubError::ConstraintViolation { .. }) => {
                    debug!(attempt, %email, "user created concurrently, retrying lookup");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(unsettled("user"))
    }

    fn default_organisation(&self, for_ca: bool) -> CreateOrganisation {
        let (name, email) = if for_ca {
            (&self.config.ca_name, &self.config.ca_email)
        } else {
            (&self.config.server_name, &self.config.server_email)
        };

        CreateOrganisation {
            country: self.config.default_country.clone(),
            province: self.config.default_province.clone(),
            locality: self.config.default_locality.clone(),
            name: name.clone(),
            email: email.clone(),
            ca_rights: for_ca,
        }
    }
}
