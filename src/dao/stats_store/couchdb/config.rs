use std::env;

use super::error::{CouchDaoError, CouchResult};

const DEFAULT_UPDATE_ATTEMPTS: usize = 3;

/// Connection settings for the CouchDB stats database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouchConfig {
    /// Server URL, e.g. `http://localhost:5984`.
    pub base_url: String,
    /// Database holding stats documents.
    pub database: String,
    /// Basic-auth user.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
    /// Attempts made when a totals document is updated concurrently.
    pub max_update_attempts: usize,
}

impl CouchConfig {
    /// Settings for `database` on the server at `base_url`, without credentials.
    pub fn new(base_url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            database: database.into(),
            username: None,
            password: None,
            max_update_attempts: DEFAULT_UPDATE_ATTEMPTS,
        }
    }

    /// Read `COUCH_BASE_URL` and `COUCH_DB`, plus the optional
    /// `COUCH_USERNAME`/`COUCH_PASSWORD` pair and `COUCH_UPDATE_ATTEMPTS`.
    pub fn from_env() -> CouchResult<Self> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> CouchResult<Self> {
        let required = |var: &'static str| lookup(var).ok_or_else(|| CouchDaoError::MissingEnvVar { var });

        let mut config = Self::new(required("COUCH_BASE_URL")?, required("COUCH_DB")?);
        if let (Some(username), Some(password)) =
            (lookup("COUCH_USERNAME"), lookup("COUCH_PASSWORD"))
        {
            config.username = Some(username);
            config.password = Some(password);
        }
        if let Some(attempts) = lookup("COUCH_UPDATE_ATTEMPTS").and_then(|v| v.parse().ok()) {
            config.max_update_attempts = attempts;
        }
        Ok(config)
    }
}
