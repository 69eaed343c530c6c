mod config;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use cvault_crypto::{PasswordHasher, SessionSigner};
use cvault_files::{ContentHasher, Payload, UploadPolicy};
use cvault_gateway::{DeossGateway, LocalDirStore, ObjectStore, PinataGateway};
use cvault_pipeline::{publish_pet, submit_with_observer, PetProfile, Stage, VaultContext};
use cvault_registry::{AdoptionRegistry, GrantPolicy, LedgerRegistry};
use cvault_rpc::{start_server, AppState};
use cvault_storage::{MemberRole, NewUser, SledStorage, Storage};
use cvault_types::OwnerId;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::AppConfig;

const ADMIN_ROLE: &str = "admin";

fn cli() -> Command {
    Command::new("cvault-node")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Content-addressed file vault: HTTP API and local submission tools")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path (default: config/cvault.toml if present)")
                .global(true),
        )
        .arg(
            Arg::new("data-dir")
                .short('d')
                .long("data-dir")
                .value_name("DIR")
                .help("Data directory")
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .help("Override the log level")
                .global(true),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .value_parser(["pretty", "json"])
                .help("Select log output format")
                .global(true),
        )
        .arg(
            Arg::new("rpc-host")
                .long("rpc-host")
                .value_name("HOST")
                .help("Override HTTP bind host")
                .global(true),
        )
        .arg(
            Arg::new("rpc-port")
                .long("rpc-port")
                .value_name("PORT")
                .value_parser(value_parser!(u16))
                .help("Override HTTP port")
                .global(true),
        )
        .subcommand(Command::new("serve").about("Run the HTTP API (default)"))
        .subcommand(
            Command::new("submit")
                .about("Submit one file against the data directory; the server must not be running")
                .arg(
                    Arg::new("path")
                        .value_name("PATH")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("owner")
                        .long("owner")
                        .value_name("ID")
                        .required(true)
                        .help("Owner wallet address (0x...) or ledger account (acct:N)"),
                )
                .arg(
                    Arg::new("remote")
                        .long("remote")
                        .action(ArgAction::SetTrue)
                        .help("Store the bytes on the configured remote gateway instead of locally"),
                ),
        )
        .subcommand(
            Command::new("member")
                .about("Register an adoption member")
                .arg(Arg::new("owner").long("owner").value_name("ID").required(true))
                .arg(
                    Arg::new("role")
                        .long("role")
                        .value_parser(["donor", "adopter"])
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("adopt")
                .about("Request, approve or reject the adoption of a pet token")
                .arg(
                    Arg::new("action")
                        .value_parser(["request", "approve", "reject"])
                        .required(true),
                )
                .arg(Arg::new("owner").long("owner").value_name("ID").required(true))
                .arg(
                    Arg::new("token")
                        .long("token")
                        .value_name("TOKEN_ID")
                        .value_parser(value_parser!(u64))
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("publish-pet")
                .about("Pin pet metadata and mint an adoption token")
                .arg(Arg::new("owner").long("owner").value_name("ID").required(true))
                .arg(Arg::new("name").long("name").required(true))
                .arg(Arg::new("species").long("species").default_value("Cão"))
                .arg(Arg::new("description").long("description").default_value(""))
                .arg(Arg::new("breed").long("breed"))
                .arg(Arg::new("age").long("age"))
                .arg(Arg::new("size").long("size").default_value("Médio"))
                .arg(Arg::new("gender").long("gender").default_value("Não informado"))
                .arg(Arg::new("health").long("health").default_value("Saudável"))
                .arg(Arg::new("temperament").long("temperament").default_value("Dócil"))
                .arg(Arg::new("location").long("location"))
                .arg(
                    Arg::new("image")
                        .long("image")
                        .value_name("PATH")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(Arg::new("image-url").long("image-url").value_name("URL")),
        )
        .subcommand(
            Command::new("status")
                .about("Query the /health endpoint of a running node"),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let (name, sub_matches) = match matches.subcommand() {
        Some((name, sub)) => (name, sub),
        None => ("serve", &matches),
    };
    let config = load_config_with_overrides(sub_matches)?;

    if name == "status" {
        return check_status(&config).await;
    }

    init_logging(&config);
    fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("failed to create {}", config.data_dir.display()))?;

    match name {
        "submit" => run_submit(&config, sub_matches).await,
        "member" => run_member(&config, sub_matches),
        "adopt" => run_adopt(&config, sub_matches),
        "publish-pet" => run_publish_pet(&config, sub_matches).await,
        _ => run_server(config).await,
    }
}

fn load_config_with_overrides(matches: &ArgMatches) -> Result<AppConfig> {
    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let mut config = AppConfig::load(config_path)?;
    apply_overrides(matches, &mut config);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(matches: &ArgMatches, config: &mut AppConfig) {
    if let Some(data_dir) = matches.get_one::<String>("data-dir") {
        config.data_dir = PathBuf::from(data_dir);
    }
    if let Some(log_level) = matches.get_one::<String>("log-level") {
        config.log_level = log_level.clone();
    }
    if let Some(log_format) = matches.get_one::<String>("log-format") {
        config.log_format = log_format.clone();
    }
    if let Some(rpc_host) = matches.get_one::<String>("rpc-host") {
        config.rpc_host = rpc_host.clone();
    }
    if let Some(rpc_port) = matches.get_one::<u16>("rpc-port") {
        config.rpc_port = *rpc_port;
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}

fn open_storage(config: &AppConfig) -> Result<Arc<SledStorage>> {
    let path = config.db_path();
    let storage = SledStorage::new(&path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;
    info!("Storage initialized at {}", path.display());
    Ok(Arc::new(storage))
}

/// Remote gateway, DeOSS taking precedence over Pinata.
fn remote_store(config: &AppConfig) -> Result<Option<Arc<dyn ObjectStore>>> {
    if let Some(deoss) = &config.deoss {
        let gateway = DeossGateway::new(deoss.clone()).context("invalid DeOSS configuration")?;
        return Ok(Some(Arc::new(gateway)));
    }
    if let Some(pinata) = &config.pinata {
        let gateway = PinataGateway::new(pinata.clone()).context("invalid Pinata configuration")?;
        return Ok(Some(Arc::new(gateway)));
    }
    Ok(None)
}

fn upload_policy(config: &AppConfig) -> UploadPolicy {
    UploadPolicy::medical().with_max_size(config.max_upload_bytes)
}

async fn seed_admin(storage: &dyn Storage, config: &AppConfig) -> Result<()> {
    let (Some(email), Some(password)) = (&config.seed_admin_email, &config.seed_admin_password)
    else {
        return Ok(());
    };
    if storage.get_user_by_email(email)?.is_some() {
        return Ok(());
    }

    let password = password.clone();
    let password_hash =
        tokio::task::spawn_blocking(move || PasswordHasher::hash_password(password.as_bytes()))
            .await??;
    let created = storage.create_user(NewUser {
        email: email.clone(),
        password_hash,
        first_name: "Admin".into(),
        last_name: "cvault".into(),
        enrollment: ADMIN_ROLE.into(),
        course: "-".into(),
        role: ADMIN_ROLE.into(),
    })?;
    match created {
        Some(account) => info!(user_id = account.id, "seeded admin account {}", account.email),
        None => warn!("admin seed skipped: enrollment '{ADMIN_ROLE}' is already taken"),
    }
    Ok(())
}

async fn run_server(config: AppConfig) -> Result<()> {
    info!("Starting cvault node {}", env!("CARGO_PKG_VERSION"));
    info!("Config file: {}", config.config_source());
    info!("Data directory: {}", config.data_dir.display());
    if config.uses_dev_secret() {
        warn!("session_secret is not configured; using the development secret");
    }

    let sled = open_storage(&config)?;
    let storage: Arc<dyn Storage> = sled.clone();
    seed_admin(storage.as_ref(), &config).await?;

    let mut state = AppState::new(
        storage,
        LocalDirStore::new(config.uploads_dir()),
        SessionSigner::new(&config.session_secret, config.session_ttl_secs),
    );
    state.hasher = ContentHasher::new(config.hash_algorithm);
    state.upload_policy = upload_policy(&config);
    state.grant_policy = GrantPolicy::new(config.grant_margin_secs);
    state.max_body_bytes = config.max_body_bytes();
    match remote_store(&config)? {
        Some(mirror) => {
            info!("Mirroring uploads to {}", mirror.name());
            state = state.with_mirror(mirror);
        }
        None => info!("No remote gateway configured; uploads stay local"),
    }

    let result = start_server(state, &config.rpc_addr()).await;
    sled.flush().context("failed to flush database")?;
    result
}

fn parse_owner(matches: &ArgMatches) -> Result<OwnerId> {
    let raw = matches
        .get_one::<String>("owner")
        .context("--owner is required")?;
    raw.parse()
        .with_context(|| format!("invalid owner '{raw}'"))
}

async fn run_submit(config: &AppConfig, matches: &ArgMatches) -> Result<()> {
    let path = matches
        .get_one::<PathBuf>("path")
        .context("a file path is required")?;
    let owner = parse_owner(matches)?;

    let sled = open_storage(config)?;
    let store: Arc<dyn ObjectStore> = if matches.get_flag("remote") {
        remote_store(config)?.context("--remote needs a DeOSS or Pinata gateway configured")?
    } else {
        Arc::new(LocalDirStore::new(config.uploads_dir()))
    };
    let storage: Arc<dyn Storage> = sled.clone();
    let registry = Arc::new(LedgerRegistry::new(storage));
    let ctx = VaultContext::new(owner, registry, store)
        .with_hasher(ContentHasher::new(config.hash_algorithm))
        .with_policy(upload_policy(config));

    let payload = Payload::from_path(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let observer = |stage: Stage| eprintln!("[{:>3}%] {stage}", stage.progress());
    let outcome = submit_with_observer(&ctx, payload, Some(&observer)).await?;
    sled.flush()?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn run_member(config: &AppConfig, matches: &ArgMatches) -> Result<()> {
    let owner = parse_owner(matches)?;
    let role = match matches.get_one::<String>("role").map(String::as_str) {
        Some("donor") => MemberRole::Donor,
        Some("adopter") => MemberRole::Adopter,
        other => anyhow::bail!("unknown role {other:?}"),
    };

    let sled = open_storage(config)?;
    let adoption = AdoptionRegistry::new(sled.clone());
    let confirmation = adoption.register_member(&owner, role)?;
    sled.flush()?;
    println!("{}", serde_json::to_string_pretty(&confirmation)?);
    Ok(())
}

fn run_adopt(config: &AppConfig, matches: &ArgMatches) -> Result<()> {
    let caller = parse_owner(matches)?;
    let token_id = *matches
        .get_one::<u64>("token")
        .context("--token is required")?;

    let sled = open_storage(config)?;
    let adoption = AdoptionRegistry::new(sled.clone());
    let confirmation = match matches.get_one::<String>("action").map(String::as_str) {
        Some("request") => adoption.request_adoption(&caller, token_id)?,
        Some("approve") => adoption.approve_adoption(&caller, token_id)?,
        Some("reject") => adoption.reject_adoption(&caller, token_id)?,
        other => anyhow::bail!("unknown adoption action {other:?}"),
    };
    let pet = adoption.pet(token_id)?;
    sled.flush()?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "pet": pet,
            "confirmation": confirmation,
        }))?
    );
    Ok(())
}

async fn run_publish_pet(config: &AppConfig, matches: &ArgMatches) -> Result<()> {
    let owner = parse_owner(matches)?;
    let text = |key: &str| matches.get_one::<String>(key).cloned();

    let image = match matches.get_one::<PathBuf>("image") {
        Some(path) => Some(
            Payload::from_path(path)
                .with_context(|| format!("failed to read {}", path.display()))?,
        ),
        None => None,
    };
    let profile = PetProfile {
        name: text("name").unwrap_or_default(),
        description: text("description").unwrap_or_default(),
        species: text("species").unwrap_or_default(),
        breed: text("breed"),
        age: text("age"),
        size: text("size").unwrap_or_default(),
        gender: text("gender").unwrap_or_default(),
        health: text("health").unwrap_or_default(),
        temperament: text("temperament").unwrap_or_default(),
        location: text("location"),
        image,
        image_url: text("image-url"),
    };

    let store: Arc<dyn ObjectStore> = match config.pinata.clone() {
        Some(pinata) => Arc::new(PinataGateway::new(pinata)?),
        None => Arc::new(LocalDirStore::new(config.uploads_dir())),
    };

    let sled = open_storage(config)?;
    let adoption = AdoptionRegistry::new(sled.clone());
    let published = publish_pet(store.as_ref(), &adoption, &owner, &profile).await?;
    sled.flush()?;

    if !published.pinned {
        warn!("metadata could not be pinned; token URI embeds it inline");
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "token_id": published.token_id,
            "token_uri": published.token_uri,
            "pinned": published.pinned,
            "metadata": published.metadata,
            "confirmation": published.confirmation,
        }))?
    );
    Ok(())
}

async fn check_status(config: &AppConfig) -> Result<()> {
    let url = format!("http://{}/health", config.rpc_addr());
    let response = reqwest::Client::new().get(&url).send().await?;
    let status = response.status();
    let body = response.text().await?;
    println!("GET {url} -> {status}");
    println!("{body}");
    if status.is_success() {
        Ok(())
    } else {
        anyhow::bail!("Health check failed with status {status}")
    }
}
