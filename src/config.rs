use serde::Deserialize;

pub const EDF_DOMAIN: &str = "https://ws-mobile-particuliers.edf.com";
pub const EDELIA_DOMAIN: &str = "https://api.edelia.fr";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub email: String,
    pub password: String,
    pub database_url: String,
    pub edf_base_url: String,
    pub edelia_base_url: String,
    pub bills_dir: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            email: std::env::var("EDF_EMAIL")
                .map_err(|_| anyhow::anyhow!("EDF_EMAIL environment variable required"))
                .and_then(|email| {
                    if email.trim().is_empty() {
                        anyhow::bail!("EDF_EMAIL cannot be empty");
                    }
                    Ok(email)
                })?,
            password: std::env::var("EDF_PASSWORD")
                .map_err(|_| anyhow::anyhow!("EDF_PASSWORD environment variable required"))
                .and_then(|password| {
                    if password.trim().is_empty() {
                        anyhow::bail!("EDF_PASSWORD cannot be empty");
                    }
                    Ok(password)
                })?,
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            edf_base_url: std::env::var("EDF_BASE_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| EDF_DOMAIN.to_string()),
            edelia_base_url: std::env::var("EDELIA_BASE_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| EDELIA_DOMAIN.to_string()),
            bills_dir: std::env::var("BILLS_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "./bills".to_string()),
        };

        for (name, value) in [
            ("EDF_BASE_URL", &config.edf_base_url),
            ("EDELIA_BASE_URL", &config.edelia_base_url),
        ] {
            let parsed = url::Url::parse(value)
                .map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", name, e))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                anyhow::bail!("{} must use http or https", name);
            }
        }

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("EDF Base URL: {}", config.edf_base_url);
        tracing::debug!("Edelia Base URL: {}", config.edelia_base_url);
        tracing::debug!("Bills directory: {}", config.bills_dir);

        Ok(config)
    }
}
