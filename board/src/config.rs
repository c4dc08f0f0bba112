use std::{net::SocketAddr, time::Duration};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Env {
    Dev,
    Staging,
    Production,
}

impl Env {
    pub fn from_env() -> Self {
        match var("ENVIRONMENT") {
            Ok(Some(env)) => match env.as_str() {
                "dev" => Env::Dev,
                "staging" => Env::Staging,
                "production" => Env::Production,
                _ => Env::Dev,
            },
            _ => Env::Dev,
        }
    }
}

/// Where comments, votes and posts are persisted.
#[derive(Clone, Debug)]
pub enum StoreBackend {
    /// Direct connection to the store's Postgres database
    Postgres { database_url: String },
    /// The store's REST endpoint, PostgREST conventions
    Rest { url: String, api_key: String },
    /// Process-local tables, only allowed in dev
    Memory,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub env: Env,
    pub listen_addr: SocketAddr,
    pub store: StoreBackend,
    pub store_timeout: Duration,
    pub poll_interval: Duration,
    pub view_idle: Duration,
    pub cors_allowed_origins: Vec<String>,
}

fn var(key: &str) -> Result<Option<String>, String> {
    match std::env::var(key) {
        Ok(env) => Ok(Some(env)),
        Err(e) => match e {
            std::env::VarError::NotPresent => {
                tracing::debug!("Missing environment variable `{key}`");
                Ok(None)
            }
            std::env::VarError::NotUnicode(_) => Err(format!(
                "Could not get the environment variable `{key}` due to unicode error"
            )),
        },
    }
}

fn required_var(key: &str) -> String {
    let val = var(key);
    match val {
        Ok(val) => match val {
            Some(val) => val,
            None => {
                tracing::error!("Environment variable `{key}` is required");
                std::process::exit(1)
            }
        },
        Err(e) => {
            tracing::error!(
                "Environment variable `{key}` is required, but could not retrieve: {e}"
            );
            std::process::exit(1)
        }
    }
}

/// Either all or none variables are set
fn all_or_none_vars(keys: &[&str]) -> Option<Vec<String>> {
    all_or_none(keys, |k| var(k).ok().flatten())
}

fn all_or_none(keys: &[&str], lookup: impl Fn(&str) -> Option<String>) -> Option<Vec<String>> {
    let values: Vec<Option<String>> = keys.iter().map(|k| lookup(k)).collect();
    if values.iter().all(Option::is_none) {
        return None;
    }

    let missing: Vec<&str> = keys
        .iter()
        .zip(&values)
        .filter(|(_, v)| v.is_none())
        .map(|(k, _)| *k)
        .collect();
    if !missing.is_empty() {
        tracing::error!(
            "Environment variables {missing:?} are required if variables {keys:?} are present"
        );
        return None;
    }

    values.into_iter().collect()
}

fn seconds_var(key: &str, default: u64) -> Duration {
    match var(key) {
        Ok(Some(val)) => match val.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                tracing::warn!("Environment variable `{key}` is not a positive integer, using {default}s");
                Duration::from_secs(default)
            }
        },
        _ => Duration::from_secs(default),
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(String::from)
        .collect()
}

impl ServerConfig {
    pub fn new_from_env() -> Self {
        let env = Env::from_env();

        let store = if let Ok(Some(database_url)) = var("DATABASE_URL") {
            StoreBackend::Postgres { database_url }
        } else if let Some([url, api_key]) =
            all_or_none_vars(&["STORE_URL", "STORE_API_KEY"]).as_deref()
        {
            StoreBackend::Rest {
                url: url.trim_end_matches('/').to_string(),
                api_key: api_key.clone(),
            }
        } else if env == Env::Dev {
            tracing::warn!("No store configured, keeping everything in memory");
            StoreBackend::Memory
        } else {
            // outside of dev a real store is mandatory
            StoreBackend::Rest {
                url: required_var("STORE_URL"),
                api_key: required_var("STORE_API_KEY"),
            }
        };

        let listen_addr = match var("LISTEN_ADDR") {
            Ok(Some(addr)) => addr.parse().unwrap_or_else(|e| {
                tracing::error!("Environment variable `LISTEN_ADDR` is not a socket address: {e}");
                std::process::exit(1)
            }),
            _ => SocketAddr::from(([0, 0, 0, 0], 3000)),
        };

        ServerConfig {
            env,
            listen_addr,
            store,
            store_timeout: seconds_var("STORE_TIMEOUT_SECS", 10),
            poll_interval: seconds_var("POLL_INTERVAL_SECS", 5),
            view_idle: seconds_var("VIEW_IDLE_SECS", 60),
            cors_allowed_origins: match var("CORS_ALLOWED_ORIGINS") {
                Ok(Some(raw)) => parse_origins(&raw),
                _ => vec![],
            },
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            env: Env::Dev,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            store: StoreBackend::Memory,
            store_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(5),
            view_idle: Duration::from_secs(60),
            cors_allowed_origins: vec![],
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_origins_skips_blanks() {
        assert_eq!(
            parse_origins(" https://a.example, ,https://b.example "),
            vec!["https://a.example", "https://b.example"]
        );
        assert!(parse_origins("").is_empty());
    }

    fn lookup(set: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let set: Vec<(String, String)> = set
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| {
            set.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        }
    }

    #[test]
    fn test_all_or_none_requires_every_key() {
        let keys = ["STORE_URL", "STORE_API_KEY"];

        assert_eq!(all_or_none(&keys, lookup(&[])), None);
        assert_eq!(
            all_or_none(&keys, lookup(&[("STORE_API_KEY", "k")])),
            None,
            "A missing first key must not shift the others"
        );
        assert_eq!(all_or_none(&keys, lookup(&[("STORE_URL", "u")])), None);
        assert_eq!(
            all_or_none(&keys, lookup(&[("STORE_API_KEY", "k"), ("STORE_URL", "u")])),
            Some(vec!["u".to_string(), "k".to_string()])
        );
    }
}
