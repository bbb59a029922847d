use std::fmt;

use crate::error::WbsError;

pub const ACCOUNT_ID_VAR: &str = "CF_ACCOUNT_ID";
pub const DATABASE_ID_VAR: &str = "CF_D1_DATABASE_ID";
pub const API_TOKEN_VAR: &str = "CF_API_TOKEN";
pub const API_BASE_VAR: &str = "CF_API_BASE_URL";

pub const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Connection settings for the hosted database, read once at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct D1Config {
    pub account_id: String,
    pub database_id: String,
    pub api_token: String,
    pub api_base: String,
}

impl D1Config {
    /// Loads `.env` (if present) and reads settings from the process environment.
    pub fn from_env() -> Result<Self, WbsError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, WbsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let account_id = read(ACCOUNT_ID_VAR);
        let database_id = read(DATABASE_ID_VAR);
        let api_token = read(API_TOKEN_VAR);

        let missing = [
            (ACCOUNT_ID_VAR, account_id.is_none()),
            (DATABASE_ID_VAR, database_id.is_none()),
            (API_TOKEN_VAR, api_token.is_none()),
        ]
        .into_iter()
        .filter(|(_, absent)| *absent)
        .map(|(name, _)| name.to_string())
        .collect::<Vec<_>>();

        match (account_id, database_id, api_token) {
            (Some(account_id), Some(database_id), Some(api_token)) => Ok(Self {
                account_id,
                database_id,
                api_token,
                api_base: read(API_BASE_VAR)
                    .map(|base| base.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            }),
            _ => Err(WbsError::Configuration { missing }),
        }
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/accounts/{}/d1/database/{}/query",
            self.api_base, self.account_id, self.database_id
        )
    }
}

impl fmt::Debug for D1Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("D1Config")
            .field("account_id", &self.account_id)
            .field("database_id", &self.database_id)
            .field("api_token", &"<redacted>")
            .field("api_base", &self.api_base)
            .finish()
    }
}
