//! Node configuration: optional TOML file layered under `CVAULT_*`
//! environment variables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, File as ConfigFile};
use cvault_crypto::{HashType, SessionSigner};
use cvault_gateway::{DeossConfig, PinataConfig};
use cvault_registry::DEFAULT_GRANT_MARGIN_SECS;

pub const DEFAULT_CONFIG_PATH: &str = "config/cvault.toml";
pub const DEV_SESSION_SECRET: &str = "cvault-dev-secret";
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;
/// Room for the multipart envelope on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub config_path: Option<PathBuf>,
    pub rpc_host: String,
    pub rpc_port: u16,
    pub data_dir: PathBuf,
    pub log_level: String,
    pub log_format: String,
    pub hash_algorithm: HashType,
    pub session_secret: String,
    pub session_ttl_secs: u64,
    pub grant_margin_secs: u64,
    pub max_upload_bytes: u64,
    pub seed_admin_email: Option<String>,
    pub seed_admin_password: Option<String>,
    pub gateway_timeout_secs: u64,
    pub deoss_gateway_url: Option<String>,
    pub deoss: Option<DeossConfig>,
    pub pinata: Option<PinataConfig>,
}

impl AppConfig {
    pub fn load(config_path_override: Option<&str>) -> Result<Self> {
        let resolved_path = match config_path_override {
            Some(path) => {
                let path = PathBuf::from(path);
                if !path.exists() {
                    anyhow::bail!(
                        "Configuration file {} not found (specified via --config)",
                        path.display()
                    );
                }
                Some(path)
            }
            None => Some(PathBuf::from(DEFAULT_CONFIG_PATH)).filter(|path| path.exists()),
        };

        let mut builder = Config::builder();
        if let Some(path) = &resolved_path {
            builder = builder.add_source(ConfigFile::from(path.as_path()));
        }
        builder = builder.add_source(config::Environment::with_prefix("CVAULT"));

        let config = builder.build().context("failed to read configuration")?;
        let mut app = Self::from_config(&config)?;
        app.config_path = resolved_path;
        Ok(app)
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let gateway_timeout_secs = get_u64_value(config, &["gateway_timeout_secs"], 30)?;

        let deoss_gateway_url = get_string_value(config, &["deoss_gateway_url", "deoss.gateway_url"]);
        let deoss = match &deoss_gateway_url {
            Some(url) => {
                let field = |key: &str| {
                    get_string_value(
                        config,
                        &[format!("deoss_{key}").as_str(), format!("deoss.{key}").as_str()],
                    )
                };
                match (field("territory"), field("account"), field("message"), field("signature")) {
                    (Some(territory), Some(account), Some(message), Some(signature)) => {
                        Some(DeossConfig {
                            territory,
                            account,
                            message,
                            signature,
                            timeout_secs: gateway_timeout_secs,
                            ..DeossConfig::new(url.clone())
                        })
                    }
                    _ => None,
                }
            }
            None => None,
        };

        let pinata = get_string_value(config, &["pinata_jwt", "pinata.jwt"]).map(|jwt| {
            let mut pinata = PinataConfig::new(jwt);
            if let Some(api_url) = get_string_value(config, &["pinata_api_url", "pinata.api_url"]) {
                pinata.api_url = api_url;
            }
            if let Some(gateway_url) =
                get_string_value(config, &["pinata_gateway_url", "pinata.gateway_url"])
            {
                pinata.gateway_url = gateway_url;
            }
            pinata.timeout_secs = gateway_timeout_secs;
            pinata
        });

        let hash_algorithm = match get_string_value(config, &["hash_algorithm"]) {
            Some(name) => name.parse()?,
            None => HashType::default(),
        };

        let rpc_port = get_u64_value(config, &["rpc_port", "rpc.port"], 3001)?;

        Ok(Self {
            config_path: None,
            rpc_host: get_string_value(config, &["rpc_host", "rpc.host"])
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            rpc_port: u16::try_from(rpc_port)
                .with_context(|| format!("rpc_port {rpc_port} is out of range"))?,
            data_dir: get_string_value(config, &["data_dir", "storage.data_dir"])
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            log_level: get_string_value(config, &["log_level"]).unwrap_or_else(|| "info".into()),
            log_format: get_string_value(config, &["log_format"])
                .unwrap_or_else(|| "pretty".into()),
            hash_algorithm,
            session_secret: get_string_value(config, &["session_secret"])
                .unwrap_or_else(|| DEV_SESSION_SECRET.to_string()),
            session_ttl_secs: get_u64_value(
                config,
                &["session_ttl_secs"],
                SessionSigner::DEFAULT_TTL_SECS,
            )?,
            grant_margin_secs: get_u64_value(
                config,
                &["grant_margin_secs"],
                DEFAULT_GRANT_MARGIN_SECS,
            )?,
            max_upload_bytes: get_u64_value(
                config,
                &["max_upload_bytes"],
                DEFAULT_MAX_UPLOAD_BYTES,
            )?,
            seed_admin_email: get_string_value(config, &["seed_admin_email"]),
            seed_admin_password: get_string_value(config, &["seed_admin_password"]),
            gateway_timeout_secs,
            deoss_gateway_url,
            deoss,
            pinata,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc_port == 0 {
            anyhow::bail!("rpc_port must be greater than zero");
        }
        if self.data_dir.as_os_str().is_empty() {
            anyhow::bail!("data_dir must not be empty");
        }
        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            anyhow::bail!("log_format must be 'pretty' or 'json', got '{}'", self.log_format);
        }
        if self.session_ttl_secs == 0 {
            anyhow::bail!("session_ttl_secs must be greater than zero");
        }
        if self.max_upload_bytes == 0 {
            anyhow::bail!("max_upload_bytes must be greater than zero");
        }
        if self.deoss_gateway_url.is_some() && self.deoss.is_none() {
            anyhow::bail!(
                "deoss_gateway_url is set but deoss_territory, deoss_account, deoss_message and deoss_signature are not all configured"
            );
        }
        if self.seed_admin_email.is_some() != self.seed_admin_password.is_some() {
            anyhow::bail!("seed_admin_email and seed_admin_password must be set together");
        }
        Ok(())
    }

    pub fn rpc_addr(&self) -> String {
        format!("{}:{}", self.rpc_host, self.rpc_port)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("db")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn max_body_bytes(&self) -> usize {
        usize::try_from(self.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES))
            .unwrap_or(usize::MAX)
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.session_secret == DEV_SESSION_SECRET
    }

    pub fn config_source(&self) -> String {
        self.config_path
            .as_deref()
            .map(Path::display)
            .map(|path| path.to_string())
            .unwrap_or_else(|| "(built-in defaults)".to_string())
    }
}

fn get_string_value(config: &Config, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        config
            .get_string(key)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

fn get_u64_value(config: &Config, keys: &[&str], default: u64) -> Result<u64> {
    match get_string_value(config, keys) {
        Some(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("{} must be a non-negative integer, got '{raw}'", keys[0])),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str) -> Result<AppConfig> {
        let config = Config::builder()
            .add_source(ConfigFile::from_str(toml, FileFormat::Toml))
            .build()?;
        AppConfig::from_config(&config)
    }

    #[test]
    fn defaults_apply_without_sources() {
        let config = from_toml("").unwrap();
        assert_eq!(config.rpc_addr(), "127.0.0.1:3001");
        assert_eq!(config.hash_algorithm, HashType::Sha256);
        assert_eq!(config.grant_margin_secs, 300);
        assert_eq!(config.session_ttl_secs, 8 * 3600);
        assert_eq!(config.max_body_bytes(), 101 * 1024 * 1024);
        assert!(config.uses_dev_secret());
        assert!(config.deoss.is_none() && config.pinata.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn file_values_are_read() {
        let config = from_toml(
            r#"
            rpc_port = 8080
            data_dir = "/var/lib/cvault"
            hash_algorithm = "blake3"
            log_format = "json"
            grant_margin_secs = 0
            pinata_jwt = "jwt"
            "#,
        )
        .unwrap();
        assert_eq!(config.rpc_port, 8080);
        assert_eq!(config.db_path(), PathBuf::from("/var/lib/cvault/db"));
        assert_eq!(config.hash_algorithm, HashType::Blake3);
        assert_eq!(config.grant_margin_secs, 0);
        assert_eq!(config.pinata.unwrap().jwt, "jwt");
        assert!(from_toml("rpc_port = 70000").is_err());
        assert!(from_toml("hash_algorithm = \"md5\"").is_err());
    }

    #[test]
    fn deoss_requires_every_credential() {
        let partial = from_toml(r#"deoss_gateway_url = "https://deoss.example""#).unwrap();
        assert!(partial.deoss.is_none());
        assert!(partial.validate().is_err());

        let full = from_toml(
            r#"
            deoss_gateway_url = "https://deoss.example"
            deoss_territory = "MedVault"
            deoss_account = "cX"
            deoss_message = "msg"
            deoss_signature = "0xsig"
            gateway_timeout_secs = 5
            "#,
        )
        .unwrap();
        let deoss = full.deoss.clone().unwrap();
        assert_eq!(deoss.territory, "MedVault");
        assert_eq!(deoss.timeout_secs, 5);
        full.validate().unwrap();
    }

    #[test]
    fn admin_seed_needs_both_fields() {
        let config = from_toml(r#"seed_admin_email = "admin@unb.br""#).unwrap();
        assert!(config.validate().is_err());
    }
}
