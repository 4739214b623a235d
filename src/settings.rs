//! Process settings read from the environment (and a `.env` file when present).

use crate::error::ConfigError;
use std::net::SocketAddr;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdminSeed {
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// `None` runs against the in-memory backend.
    pub database_url: Option<String>,
    pub bind_addr: SocketAddr,
    pub db_max_connections: u32,
    /// User created at startup if missing; set only when both variables are present.
    pub admin: Option<AdminSeed>,
}

impl Settings {
    /// Load `.env` (if any) into the process environment, then read settings.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr: SocketAddr = match var("BIND_ADDR") {
            Some(v) => v.parse().map_err(|_| ConfigError::InvalidVar {
                name: "BIND_ADDR",
                value: v.clone(),
            })?,
            None => DEFAULT_BIND_ADDR.parse().map_err(|_| ConfigError::InvalidVar {
                name: "BIND_ADDR",
                value: DEFAULT_BIND_ADDR.to_string(),
            })?,
        };
        let db_max_connections = match var("DB_MAX_CONNECTIONS") {
            Some(v) => match v.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidVar {
                        name: "DB_MAX_CONNECTIONS",
                        value: v,
                    })
                }
            },
            None => DEFAULT_DB_MAX_CONNECTIONS,
        };
        let admin = match (var("ADMIN_USERNAME"), lookup("ADMIN_PASSWORD")) {
            (Some(username), Some(password)) if !password.is_empty() => Some(AdminSeed { username, password }),
            _ => None,
        };
        Ok(Settings {
            database_url: var("DATABASE_URL"),
            bind_addr,
            db_max_connections,
            admin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.database_url, None);
        assert_eq!(s.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(s.db_max_connections, DEFAULT_DB_MAX_CONNECTIONS);
        assert_eq!(s.admin, None);
    }

    #[test]
    fn values_are_read_and_blank_ones_ignored() {
        let s = settings(&[
            ("DATABASE_URL", "postgres://localhost/stores"),
            ("BIND_ADDR", "127.0.0.1:8080"),
            ("DB_MAX_CONNECTIONS", "12"),
            ("ADMIN_USERNAME", "admin"),
            ("ADMIN_PASSWORD", "secret"),
        ])
        .unwrap();
        assert_eq!(s.database_url.as_deref(), Some("postgres://localhost/stores"));
        assert_eq!(s.bind_addr.port(), 8080);
        assert_eq!(s.db_max_connections, 12);
        assert_eq!(s.admin.map(|a| a.username), Some("admin".to_string()));

        let s = settings(&[("DATABASE_URL", "  "), ("ADMIN_USERNAME", "admin")]).unwrap();
        assert_eq!(s.database_url, None);
        assert_eq!(s.admin, None);
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(matches!(
            settings(&[("BIND_ADDR", "not an address")]),
            Err(ConfigError::InvalidVar { name: "BIND_ADDR", .. })
        ));
        assert!(matches!(
            settings(&[("DB_MAX_CONNECTIONS", "0")]),
            Err(ConfigError::InvalidVar { name: "DB_MAX_CONNECTIONS", .. })
        ));
    }
}
