use dotenvy::dotenv;
use std::{env, net::SocketAddr};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable `{0}`")]
    Missing(&'static str),
    #[error("Invalid value `{value}` for `{var}`")]
    Invalid { var: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub admin: Option<AdminSeed>,
    pub andreani: AndreaniConfig,
    pub mercadopago: Option<MercadoPagoConfig>,
}

#[derive(Clone, Debug)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug)]
pub struct AndreaniConfig {
    pub api_key: String,
    pub api_url: String,
    pub contract: Option<String>,
    pub use_mock: bool,
    pub origin_postal_code: String,
}

impl AndreaniConfig {
    /// Without an api key there is nothing to talk to, so the mock wins.
    pub fn wants_mock(&self) -> bool {
        self.use_mock || self.api_key.trim().is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct MercadoPagoConfig {
    pub access_token: String,
    pub api_url: String,
    pub webhook_url: Option<String>,
    pub back_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url = required("DATABASE_URL")?;
        let bind_addr = parsed("BIND_ADDR", "0.0.0.0:3000")?;
        let jwt_secret = required("JWT_SECRET")?;
        let token_ttl_hours = parsed("TOKEN_TTL_HOURS", "24")?;

        let admin = match (optional("ADMIN_EMAIL"), optional("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminSeed { email, password }),
            _ => None,
        };

        let andreani = AndreaniConfig {
            api_key: optional("ANDREANI_API_KEY").unwrap_or_default(),
            api_url: optional("ANDREANI_API_URL")
                .unwrap_or_else(|| "https://api.andreani.com/v2".to_owned()),
            contract: optional("ANDREANI_CONTRACT"),
            use_mock: parsed("ANDREANI_USE_MOCK", "false")?,
            origin_postal_code: optional("ORIGIN_POSTAL_CODE").unwrap_or_else(|| "1043".to_owned()),
        };

        let mercadopago = optional("MP_ACCESS_TOKEN").map(|access_token| MercadoPagoConfig {
            access_token,
            api_url: optional("MP_API_URL")
                .unwrap_or_else(|| "https://api.mercadopago.com".to_owned()),
            webhook_url: optional("MP_WEBHOOK_URL"),
            back_url: optional("MP_BACK_URL"),
        });

        Ok(Config {
            database_url,
            bind_addr,
            jwt_secret,
            token_ttl_hours,
            admin,
            andreani,
            mercadopago,
        })
    }
}

fn optional(var: &'static str) -> Option<String> {
    env::var(var).ok().filter(|value| !value.trim().is_empty())
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    optional(var).ok_or(ConfigError::Missing(var))
}

fn parsed<T: std::str::FromStr>(var: &'static str, default: &str) -> Result<T, ConfigError> {
    let value = optional(var).unwrap_or_else(|| default.to_owned());
    value
        .parse::<T>()
        .map_err(|_| ConfigError::Invalid { var, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_is_forced_without_api_key() {
        let config = AndreaniConfig {
            api_key: "  ".to_owned(),
            api_url: "https://api.andreani.com/v2".to_owned(),
            contract: None,
            use_mock: false,
            origin_postal_code: "1043".to_owned(),
        };
        assert!(config.wants_mock());

        let live = AndreaniConfig {
            api_key: "key".to_owned(),
            ..config.clone()
        };
        assert!(!live.wants_mock());

        let forced = AndreaniConfig {
            use_mock: true,
            ..live
        };
        assert!(forced.wants_mock());
    }
}
