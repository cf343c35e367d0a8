use crate::tally::matrix::DuplicatePolicy;
use std::env;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:webvoter.db";
pub const DEFAULT_ANONYMOUS_IDENTITY: &str = "anonymous";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Runtime settings, read from the environment (and `.env` via dotenvy) at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database_url: String,
    pub anonymous_identity: String,
    pub duplicate_policy: DuplicatePolicy,
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid value {value:?} for {key}")]
pub struct SettingsError {
    pub key: &'static str,
    pub value: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            anonymous_identity: DEFAULT_ANONYMOUS_IDENTITY.to_string(),
            duplicate_policy: DuplicatePolicy::default(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        if let Some(url) = lookup("DATABASE_URL") {
            settings.database_url = url;
        }

        if let Some(identity) = lookup("ANONYMOUS_IDENTITY") {
            let identity = identity.trim();
            if identity.is_empty() {
                return Err(SettingsError {
                    key: "ANONYMOUS_IDENTITY",
                    value: identity.to_string(),
                });
            }
            settings.anonymous_identity = identity.to_string();
        }

        if let Some(policy) = lookup("DUPLICATE_BALLOT_POLICY") {
            settings.duplicate_policy =
                DuplicatePolicy::parse(&policy).ok_or_else(|| SettingsError {
                    key: "DUPLICATE_BALLOT_POLICY",
                    value: policy.clone(),
                })?;
        }

        if let Some(max) = lookup("DB_MAX_CONNECTIONS") {
            settings.max_connections = match max.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(SettingsError {
                        key: "DB_MAX_CONNECTIONS",
                        value: max,
                    })
                }
            };
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.duplicate_policy, DuplicatePolicy::Reject);
        assert_eq!(settings.anonymous_identity, "anonymous");
    }

    #[test]
    fn overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("ANONYMOUS_IDENTITY", "guest"),
            ("DUPLICATE_BALLOT_POLICY", "last-write-wins"),
            ("DB_MAX_CONNECTIONS", "2"),
        ]))
        .unwrap();
        assert_eq!(settings.database_url, "sqlite::memory:");
        assert_eq!(settings.anonymous_identity, "guest");
        assert_eq!(settings.duplicate_policy, DuplicatePolicy::LastWriteWins);
        assert_eq!(settings.max_connections, 2);
    }

    #[test]
    fn bad_values() {
        let err = Settings::from_lookup(lookup(&[("DUPLICATE_BALLOT_POLICY", "merge")])).unwrap_err();
        assert_eq!(err.key, "DUPLICATE_BALLOT_POLICY");
        assert!(Settings::from_lookup(lookup(&[("DB_MAX_CONNECTIONS", "0")])).is_err());
        assert!(Settings::from_lookup(lookup(&[("ANONYMOUS_IDENTITY", " ")])).is_err());
    }
}
