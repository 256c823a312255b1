//! Integration tests for the issuance workflows using in-memory SurrealDB.

use std::sync::Arc;

use certhub_core::models::user::User;
use certhub_core::repository::{CertificateRepository, KeyRepository, ServerRepository};
use certhub_db::repository::{
    SurrealCertificateRepository, SurrealKeyRepository, SurrealOrganisationRepository,
    SurrealServerRepository, SurrealUserRepository,
};
use certhub_pki::codec::{dns_names, parse_certificate};
use certhub_pki::keys::load_private_key;
use certhub_pki::{Bootstrap, IdentityRegistry, IssuanceService, PkiConfig, PkiError};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};

type Service = IssuanceService<
    SurrealOrganisationRepository<Db>,
    SurrealServerRepository<Db>,
    SurrealKeyRepository<Db>,
    SurrealCertificateRepository<Db>,
>;
type Identities = IdentityRegistry<SurrealOrganisationRepository<Db>, SurrealUserRepository<Db>>;

/// Smaller keys keep the suite fast; everything else is the default.
fn config() -> PkiConfig {
    PkiConfig {
        rsa_key_size: 2048,
        ..Default::default()
    }
}

async fn setup() -> (Surreal<Db>, Identities, Service) {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    certhub_db::run_migrations(&db).await.unwrap();

    let identities = IdentityRegistry::new(
        SurrealOrganisationRepository::new(db.clone()),
        SurrealUserRepository::new(db.clone()),
        config(),
    );
    let service = IssuanceService::new(
        config(),
        SurrealOrganisationRepository::new(db.clone()),
        SurrealServerRepository::new(db.clone()),
        SurrealKeyRepository::new(db.clone()),
        SurrealCertificateRepository::new(db.clone()),
    );
    (db, identities, service)
}

async fn ca(identities: &Identities) -> User {
    identities.get_or_create_ca_user().await.unwrap().0
}

async fn tenant(identities: &Identities) -> User {
    identities
        .get_or_create_user("sarah.connor@resistance.org")
        .await
        .unwrap()
        .0
}

fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

// -----------------------------------------------------------------------
// Identity
// -----------------------------------------------------------------------

#[tokio::test]
async fn ca_user_is_created_once() {
    let (_db, identities, _) = setup().await;

    let (first, created) = identities.get_or_create_ca_user().await.unwrap();
    assert!(created);
    assert!(first.is_ca);
    assert_eq!(first.email, config().ca_email);

    let (second, created) = identities.get_or_create_ca_user().await.unwrap();
    assert!(!created);
    assert_eq!(first.id, second.id);

    let organisation = identities.organisation(&first).await.unwrap();
    assert!(organisation.ca_rights);
    assert_eq!(organisation.name, config().ca_name);
}

#[tokio::test]
async fn default_organisations_are_distinct_and_stable() {
    let (_db, identities, _) = setup().await;

    let (ca_org, created) = identities
        .get_or_create_default_organisation(true)
        .await
        .unwrap();
    assert!(created);
    let (tenant_org, created) = identities
        .get_or_create_default_organisation(false)
        .await
        .unwrap();
    assert!(created);
    assert_ne!(ca_org.id, tenant_org.id);
    assert_eq!(tenant_org.name, config().server_name);
    assert_eq!(tenant_org.email, config().server_email);
    assert_eq!(tenant_org.country, "GB");

    let (again, created) = identities
        .get_or_create_default_organisation(false)
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(again.id, tenant_org.id);
}

#[tokio::test]
async fn tenant_user_joins_default_tenant_organisation() {
    let (_db, identities, _) = setup().await;

    let user = tenant(&identities).await;
    assert!(!user.is_ca);
    let organisation = identities.organisation(&user).await.unwrap();
    assert!(!organisation.ca_rights);

    let (again, created) = identities
        .get_or_create_user("sarah.connor@resistance.org")
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(again.id, user.id);
}

// -----------------------------------------------------------------------
// Server registry
// -----------------------------------------------------------------------

#[tokio::test]
async fn ca_server_get_or_create_is_idempotent() {
    let (_db, identities, service) = setup().await;
    let ca = ca(&identities).await;

    let (first, created) = service.registry().get_or_create_for_ca(&ca).await.unwrap();
    assert!(created);
    assert_eq!(first.common_name, config().ca_name);

    let (second, created) = service.registry().get_or_create_for_ca(&ca).await.unwrap();
    assert!(!created);
    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn ca_is_routed_to_its_own_server() {
    let (_db, identities, service) = setup().await;
    let ca = ca(&identities).await;

    let (server, _) = service
        .registry()
        .get_or_create_for_alternate_names(&ca, &names(&["ignored.com"]))
        .await
        .unwrap();
    assert_eq!(server.common_name, config().ca_name);
    assert!(service.registry().alternative_names(&server).await.unwrap().is_empty());
}

#[tokio::test]
async fn name_order_does_not_matter() {
    let (_db, identities, service) = setup().await;
    let user = tenant(&identities).await;

    let (first, created) = service
        .registry()
        .get_or_create_for_alternate_names(&user, &names(&["b.com", "a.com"]))
        .await
        .unwrap();
    assert!(created);

    let (second, created) = service
        .registry()
        .get_or_create_for_alternate_names(&user, &names(&["a.com", "b.com", "a.com"]))
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(first.id, second.id);
    assert_eq!(
        service.registry().alternative_names(&first).await.unwrap(),
        names(&["a.com", "b.com"])
    );
}

#[tokio::test]
async fn different_name_sets_give_different_servers() {
    let (_db, identities, service) = setup().await;
    let user = tenant(&identities).await;

    let (one, _) = service
        .registry()
        .get_or_create_for_alternate_names(&user, &names(&["a.com"]))
        .await
        .unwrap();
    let (two, _) = service
        .registry()
        .get_or_create_for_alternate_names(&user, &names(&["a.com", "b.com"]))
        .await
        .unwrap();
    assert_ne!(one.id, two.id);
    assert_ne!(one.common_name, two.common_name);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creation_yields_one_server() {
    let (db, identities, service) = setup().await;
    let user = tenant(&identities).await;
    let service = Arc::new(service);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            let user = user.clone();
            tokio::spawn(async move {
                service
                    .registry()
                    .get_or_create_for_alternate_names(&user, &names(&["race.com"]))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut ids = Vec::new();
    let mut creations = 0;
    for handle in handles {
        let (server, created) = handle.await.unwrap();
        ids.push(server.id);
        creations += usize::from(created);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(creations, 1);

    let servers = SurrealServerRepository::new(db)
        .list_by_user(user.id)
        .await
        .unwrap();
    assert_eq!(servers.len(), 1);
}

// -----------------------------------------------------------------------
// Bootstrap
// -----------------------------------------------------------------------

#[tokio::test]
async fn bootstrap_twice_yields_one_root() {
    let (db, identities, service) = setup().await;
    let ca = ca(&identities).await;

    let issued = match service.bootstrap_ca(&ca).await.unwrap() {
        Bootstrap::Created(issued) => issued,
        Bootstrap::AlreadyBootstrapped => panic!("first bootstrap must create the root"),
    };
    assert!(issued.certificate.self_signed);
    assert!(issued.certificate.csr.is_empty());

    assert!(matches!(
        service.bootstrap_ca(&ca).await.unwrap(),
        Bootstrap::AlreadyBootstrapped
    ));

    let roots = SurrealCertificateRepository::new(db)
        .list_self_signed()
        .await
        .unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].id, issued.certificate.id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bootstrap_creates_one_root() {
    let (db, identities, service) = setup().await;
    let ca = ca(&identities).await;
    let service = Arc::new(service);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            let ca = ca.clone();
            tokio::spawn(async move { service.bootstrap_ca(&ca).await.unwrap() })
        })
        .collect();

    let mut created = Vec::new();
    for handle in handles {
        if let Bootstrap::Created(issued) = handle.await.unwrap() {
            created.push(issued);
        }
    }
    assert_eq!(created.len(), 1);

    let roots = SurrealCertificateRepository::new(db.clone())
        .list_self_signed()
        .await
        .unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].id, created[0].certificate.id);

    let key = SurrealKeyRepository::new(db)
        .get_by_server(created[0].server.id)
        .await
        .unwrap();
    assert_eq!(key.id, created[0].key.id);
}

#[tokio::test]
async fn root_certificate_carries_ca_subject_and_validity() {
    let (_db, identities, service) = setup().await;
    let ca = ca(&identities).await;
    service.bootstrap_ca(&ca).await.unwrap();

    let root = parse_certificate(&service.root_certificate().await.unwrap()).unwrap();
    let text = String::from_utf8(root.to_text().unwrap()).unwrap();
    assert!(text.contains("CA:TRUE"));
    assert!(text.contains(&config().ca_name));
    assert!(text.contains(&config().ca_email));

    let diff = root.not_before().diff(root.not_after()).unwrap();
    let secs = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    assert!((secs - 7300 * 86_400).abs() <= 5);
}

#[tokio::test]
async fn self_signing_a_second_server_is_refused() {
    let (_db, identities, service) = setup().await;
    let ca = ca(&identities).await;
    service.bootstrap_ca(&ca).await.unwrap();

    let user = tenant(&identities).await;
    let (server, _) = service
        .registry()
        .get_or_create_for_alternate_names(&user, &names(&["rogue.com"]))
        .await
        .unwrap();
    service.get_or_create_server_key(&server).await.unwrap();

    let err = service
        .get_or_create_server_certificate(&server, true)
        .await
        .unwrap_err();
    assert!(matches!(err, PkiError::DuplicateRoot), "got {err:?}");
}

// -----------------------------------------------------------------------
// Tenant issuance
// -----------------------------------------------------------------------

#[tokio::test]
async fn tenant_issuance_requires_root() {
    let (_db, identities, service) = setup().await;
    let user = tenant(&identities).await;

    let err = service
        .issue_for_tenant(&user, &names(&["a.com"]))
        .await
        .unwrap_err();
    assert!(matches!(err, PkiError::RootNotBootstrapped), "got {err:?}");

    // Earlier stages stay committed and the chain resumes after bootstrap.
    let summaries = service.servers_for_user(&user).await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert!(summaries[0].key_id.is_some());
    assert!(summaries[0].certificate_id.is_none());

    let ca = ca(&identities).await;
    service.bootstrap_ca(&ca).await.unwrap();
    let issued = service
        .issue_for_tenant(&user, &names(&["a.com"]))
        .await
        .unwrap();
    assert_eq!(issued.server.id, summaries[0].server.id);
    assert_eq!(Some(issued.key.id), summaries[0].key_id);
}

#[tokio::test]
async fn tenant_certificate_is_signed_by_root() {
    let (_db, identities, service) = setup().await;
    let ca = ca(&identities).await;
    service.bootstrap_ca(&ca).await.unwrap();
    let user = tenant(&identities).await;

    let issued = service
        .issue_for_tenant(&user, &names(&["b.com", "a.com"]))
        .await
        .unwrap();
    assert!(issued.created);
    assert!(!issued.certificate.self_signed);
    assert!(issued.certificate.csr.starts_with("-----BEGIN CERTIFICATE REQUEST-----"));

    let root = parse_certificate(&service.root_certificate().await.unwrap()).unwrap();
    let leaf = parse_certificate(&issued.certificate.certificate).unwrap();

    assert_eq!(
        leaf.issuer_name().to_der().unwrap(),
        root.subject_name().to_der().unwrap()
    );
    assert!(leaf.verify(&root.public_key().unwrap()).unwrap());
    assert_eq!(dns_names(&leaf), names(&["a.com", "b.com"]));
    assert_ne!(
        leaf.serial_number().to_bn().unwrap(),
        root.serial_number().to_bn().unwrap()
    );

    let diff = leaf.not_before().diff(leaf.not_after()).unwrap();
    let secs = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    assert!((secs - 1825 * 86_400).abs() <= 5);

    let key = load_private_key(&issued.key.private_key).unwrap();
    assert_eq!(key.bits(), 2048);
    assert_eq!(key.public_exponent().unwrap(), 65537);
}

#[tokio::test]
async fn repeated_issuance_returns_existing_certificate() {
    let (_db, identities, service) = setup().await;
    let ca = ca(&identities).await;
    service.bootstrap_ca(&ca).await.unwrap();
    let user = tenant(&identities).await;

    let first = service
        .issue_for_tenant(&user, &names(&["a.com"]))
        .await
        .unwrap();
    let second = service
        .issue_for_tenant(&user, &names(&["a.com"]))
        .await
        .unwrap();
    assert!(!second.created);
    assert_eq!(first.certificate.id, second.certificate.id);
    assert_eq!(first.key.id, second.key.id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_tenant_issuance_shares_key_and_certificate() {
    let (db, identities, service) = setup().await;
    let ca = ca(&identities).await;
    service.bootstrap_ca(&ca).await.unwrap();
    let user = tenant(&identities).await;
    let service = Arc::new(service);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            let user = user.clone();
            tokio::spawn(async move {
                service
                    .issue_for_tenant(&user, &names(&["race.com"]))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    let first = &results[0];
    for issued in &results {
        assert_eq!(issued.server.id, first.server.id);
        assert_eq!(issued.key.id, first.key.id);
        assert_eq!(issued.certificate.id, first.certificate.id);
    }
    assert_eq!(results.iter().filter(|issued| issued.created).count(), 1);

    let summaries = service.servers_for_user(&user).await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].key_id, Some(first.key.id));
    assert_eq!(summaries[0].certificate_id, Some(first.certificate.id));

    let key = SurrealKeyRepository::new(db.clone())
        .get_by_server(first.server.id)
        .await
        .unwrap();
    assert_eq!(key.id, first.key.id);
    let certificate = SurrealCertificateRepository::new(db)
        .get_by_server(first.server.id)
        .await
        .unwrap();
    assert_eq!(certificate.id, first.certificate.id);
}

#[tokio::test]
async fn ca_cannot_request_a_leaf() {
    let (_db, identities, service) = setup().await;
    let ca = ca(&identities).await;

    let err = service
        .issue_for_tenant(&ca, &names(&["a.com"]))
        .await
        .unwrap_err();
    assert!(matches!(err, PkiError::Store(_)), "got {err:?}");
}

// -----------------------------------------------------------------------
// Downloads
// -----------------------------------------------------------------------

#[tokio::test]
async fn servers_for_user_lists_downloads() {
    let (_db, identities, service) = setup().await;
    let ca = ca(&identities).await;
    service.bootstrap_ca(&ca).await.unwrap();
    let user = tenant(&identities).await;

    let issued = service
        .issue_for_tenant(&user, &names(&["web.com", "api.com"]))
        .await
        .unwrap();
    service
        .issue_for_tenant(&user, &names(&["mail.com"]))
        .await
        .unwrap();

    let summaries = service.servers_for_user(&user).await.unwrap();
    assert_eq!(summaries.len(), 2);

    let summary = summaries
        .iter()
        .find(|s| s.server.id == issued.server.id)
        .unwrap();
    assert_eq!(summary.names, names(&["api.com", "web.com"]));
    assert_eq!(summary.display_name, "api.com, web.com");
    assert_eq!(summary.key_id, Some(issued.key.id));
    assert_eq!(summary.certificate_id, Some(issued.certificate.id));

    assert_eq!(
        service.certificate_pem(issued.certificate.id).await.unwrap(),
        issued.certificate.certificate
    );
    assert_eq!(
        service.key_pem(issued.key.id).await.unwrap(),
        issued.key.private_key
    );
}

#[tokio::test]
async fn deleting_a_server_allows_reissuance() {
    let (db, identities, service) = setup().await;
    let ca = ca(&identities).await;
    service.bootstrap_ca(&ca).await.unwrap();
    let user = tenant(&identities).await;

    let first = service
        .issue_for_tenant(&user, &names(&["a.com"]))
        .await
        .unwrap();
    SurrealServerRepository::new(db)
        .delete(first.server.id)
        .await
        .unwrap();

    let second = service
        .issue_for_tenant(&user, &names(&["a.com"]))
        .await
        .unwrap();
    assert!(second.created);
    assert_ne!(first.server.id, second.server.id);
    assert_eq!(first.server.common_name, second.server.common_name);
}
