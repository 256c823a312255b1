//! certhub: CA bootstrap and tenant certificate issuance.

use anyhow::{Context, Result};
use certhub_db::repository::{
    SurrealCertificateRepository, SurrealKeyRepository, SurrealOrganisationRepository,
    SurrealServerRepository, SurrealUserRepository,
};
use certhub_db::{DbConfig, DbManager};
use certhub_pki::{Bootstrap, IdentityRegistry, IssuanceService, PkiConfig};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "certhub")]
#[command(about = "Private certificate authority with per-tenant issuance", long_about = None)]
struct Cli {
    #[command(flatten)]
    db: DbArgs,

    #[command(flatten)]
    pki: PkiArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ensure the CA user and the root certificate exist.
    Bootstrap,
    /// Issue (or fetch) the certificate covering a tenant's names and print it.
    Issue {
        /// Tenant email; the user is created on first use.
        #[arg(long)]
        email: String,
        /// DNS name to include; repeat for several.
        #[arg(long = "name", required = true)]
        names: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct DbArgs {
    /// SurrealDB WebSocket address
    #[arg(long, env = "CERTHUB_DB_URL", default_value = "127.0.0.1:8000")]
    db_url: String,
    #[arg(long, env = "CERTHUB_DB_NAMESPACE", default_value = "certhub")]
    db_namespace: String,
    #[arg(long, env = "CERTHUB_DB_DATABASE", default_value = "main")]
    db_database: String,
    #[arg(long, env = "CERTHUB_DB_USERNAME", default_value = "root")]
    db_username: String,
    #[arg(long, env = "CERTHUB_DB_PASSWORD", default_value = "root", hide_env_values = true)]
    db_password: String,
}

impl From<DbArgs> for DbConfig {
    fn from(args: DbArgs) -> Self {
        Self {
            url: args.db_url,
            namespace: args.db_namespace,
            database: args.db_database,
            username: args.db_username,
            password: args.db_password,
        }
    }
}

/// Every field falls back to [`PkiConfig::default`] when neither the flag
/// nor its environment variable is set.
#[derive(Args, Debug)]
struct PkiArgs {
    #[arg(long, env = "CERTHUB_CA_NAME")]
    ca_name: Option<String>,
    #[arg(long, env = "CERTHUB_SERVER_NAME")]
    server_name: Option<String>,
    #[arg(long, env = "CERTHUB_CA_EMAIL")]
    ca_email: Option<String>,
    #[arg(long, env = "CERTHUB_SERVER_EMAIL")]
    server_email: Option<String>,
    #[arg(long, env = "CERTHUB_DEFAULT_COUNTRY")]
    default_country: Option<String>,
    #[arg(long, env = "CERTHUB_DEFAULT_PROVINCE")]
    default_province: Option<String>,
    #[arg(long, env = "CERTHUB_DEFAULT_LOCALITY")]
    default_locality: Option<String>,
    #[arg(long, env = "CERTHUB_RSA_KEY_SIZE")]
    rsa_key_size: Option<u32>,
    #[arg(long, env = "CERTHUB_RSA_PUBLIC_EXPONENT")]
    rsa_public_exponent: Option<u32>,
    #[arg(long, env = "CERTHUB_CA_VALIDITY_DAYS")]
    ca_validity_days: Option<u32>,
    #[arg(long, env = "CERTHUB_SERVER_VALIDITY_DAYS")]
    server_validity_days: Option<u32>,
}

impl From<PkiArgs> for PkiConfig {
    fn from(args: PkiArgs) -> Self {
        let defaults = PkiConfig::default();
        Self {
            ca_name: args.ca_name.unwrap_or(defaults.ca_name),
            server_name: args.server_name.unwrap_or(defaults.server_name),
            ca_email: args.ca_email.unwrap_or(defaults.ca_email),
            server_email: args.server_email.unwrap_or(defaults.server_email),
            default_country: args.default_country.unwrap_or(defaults.default_country),
            default_province: args.default_province.unwrap_or(defaults.default_province),
            default_locality: args.default_locality.unwrap_or(defaults.default_locality),
            rsa_key_size: args.rsa_key_size.unwrap_or(defaults.rsa_key_size),
            rsa_public_exponent: args
                .rsa_public_exponent
                .unwrap_or(defaults.rsa_public_exponent),
            ca_validity_days: args.ca_validity_days.unwrap_or(defaults.ca_validity_days),
            server_validity_days: args
                .server_validity_days
                .unwrap_or(defaults.server_validity_days),
        }
    }
}

fn init_tracing() -> Result<()> {
    let mut filter = EnvFilter::from_default_env();
    for directive in ["certhub=info", "certhub_pki=info", "certhub_db=info"] {
        filter = filter.add_directive(directive.parse()?);
    }

    // PEM output owns stdout.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .json()
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing()?;

    let pki_config = PkiConfig::from(cli.pki);
    pki_config.validate()?;
    let db_config = DbConfig::from(cli.db);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting certhub");

    let manager = DbManager::connect(&db_config)
        .await
        .context("Failed to connect to SurrealDB")?;
    manager.migrate().await.context("Failed to apply migrations")?;
    let db = manager.client().clone();

    let identities = IdentityRegistry::new(
        SurrealOrganisationRepository::new(db.clone()),
        SurrealUserRepository::new(db.clone()),
        pki_config.clone(),
    );
    let service = IssuanceService::new(
        pki_config,
        SurrealOrganisationRepository::new(db.clone()),
        SurrealServerRepository::new(db.clone()),
        SurrealKeyRepository::new(db.clone()),
        SurrealCertificateRepository::new(db),
    );

    match cli.command {
        Command::Bootstrap => {
            let (ca, _) = identities.get_or_create_ca_user().await?;
            match service.bootstrap_ca(&ca).await? {
                Bootstrap::Created(issued) => {
                    println!("Root certificate created for {}", issued.server.common_name);
                }
                Bootstrap::AlreadyBootstrapped => println!("Root certificate already exists"),
            }
        }
        Command::Issue { email, names } => {
            let (user, _) = identities.get_or_create_user(&email).await?;
            let issued = service.issue_for_tenant(&user, &names).await?;
            print!("{}", issued.certificate.certificate);
        }
    }

    Ok(())
}
