use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{key} is invalid ({value:?}): {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaidEnvironment {
    Sandbox,
    Development,
    Production,
}

impl PlaidEnvironment {
    pub fn base_url(self) -> &'static str {
        match self {
            Self::Sandbox => "https://sandbox.plaid.com",
            Self::Development => "https://development.plaid.com",
            Self::Production => "https://production.plaid.com",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sandbox => "sandbox",
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for PlaidEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlaidEnvironment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(Self::Sandbox),
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            _ => Err(ConfigError::Invalid {
                key: "PLAID_ENV",
                value: s.to_string(),
                reason: "expected one of sandbox, development, production".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: Option<String>,
    pub plaid_env: Option<String>,
    pub plaid_client_id: Option<String>,
    pub plaid_secret: Option<String>,
    pub plaid_access_token: Option<String>,
    pub openai_api_key: Option<String>,
    pub sentry_dsn: Option<String>,
    pub run_date_utc_offset_hours: Option<String>,

    pub plaid_base_url: Option<String>,
    pub plaid_sync_count: Option<String>,
    pub plaid_include_pfc: Option<String>,
    pub plaid_timeout_secs: Option<String>,

    pub openrouter_base_url: Option<String>,
    pub openrouter_model: Option<String>,
    pub openrouter_referer: Option<String>,
    pub openrouter_max_tokens: Option<String>,
    pub openrouter_timeout_secs: Option<String>,
}

pub const DEFAULT_PLAID_SYNC_COUNT: u32 = 100;
pub const MAX_PLAID_SYNC_COUNT: u32 = 500;
pub const DEFAULT_OPENROUTER_MAX_TOKENS: u32 = 300;
const MAX_TIMEOUT_SECS: u64 = 3600;

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Ok(Self {
            database_url: get("DATABASE_URL"),
            plaid_env: get("PLAID_ENV"),
            plaid_client_id: get("PLAID_CLIENT_ID"),
            plaid_secret: get("PLAID_SECRET"),
            plaid_access_token: get("PLAID_ACCESS_TOKEN"),
            openai_api_key: get("OPENAI_API_KEY").or_else(|| get("OPENROUTER_API_KEY")),
            sentry_dsn: get("SENTRY_DSN"),
            run_date_utc_offset_hours: get("RUN_DATE_UTC_OFFSET_HOURS"),
            plaid_base_url: get("PLAID_BASE_URL"),
            plaid_sync_count: get("PLAID_SYNC_COUNT"),
            plaid_include_pfc: get("PLAID_INCLUDE_PFC"),
            plaid_timeout_secs: get("PLAID_TIMEOUT_SECS"),
            openrouter_base_url: get("OPENROUTER_BASE_URL"),
            openrouter_model: get("OPENROUTER_MODEL"),
            openrouter_referer: get("OPENROUTER_REFERER"),
            openrouter_max_tokens: get("OPENROUTER_MAX_TOKENS"),
            openrouter_timeout_secs: get("OPENROUTER_TIMEOUT_SECS"),
        })
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing("DATABASE_URL"))
    }

    pub fn require_plaid_env(&self) -> Result<PlaidEnvironment, ConfigError> {
        self.plaid_env
            .as_deref()
            .ok_or(ConfigError::Missing("PLAID_ENV"))?
            .parse()
    }

    pub fn require_plaid_client_id(&self) -> Result<&str, ConfigError> {
        self.plaid_client_id
            .as_deref()
            .ok_or(ConfigError::Missing("PLAID_CLIENT_ID"))
    }

    pub fn require_plaid_secret(&self) -> Result<&str, ConfigError> {
        self.plaid_secret
            .as_deref()
            .ok_or(ConfigError::Missing("PLAID_SECRET"))
    }

    pub fn require_plaid_access_token(&self) -> Result<&str, ConfigError> {
        self.plaid_access_token
            .as_deref()
            .ok_or(ConfigError::Missing("PLAID_ACCESS_TOKEN"))
    }

    pub fn require_openai_api_key(&self) -> Result<&str, ConfigError> {
        self.openai_api_key
            .as_deref()
            .ok_or(ConfigError::Missing("OPENAI_API_KEY"))
    }

    pub fn run_date_offset(&self) -> Result<Option<chrono::FixedOffset>, ConfigError> {
        let Some(raw) = self.run_date_utc_offset_hours.as_deref() else {
            return Ok(None);
        };

        let invalid = |reason: &str| ConfigError::Invalid {
            key: "RUN_DATE_UTC_OFFSET_HOURS",
            value: raw.to_string(),
            reason: reason.to_string(),
        };

        let hours = raw
            .trim()
            .parse::<i32>()
            .map_err(|_| invalid("expected an integer hour offset"))?;
        if !(-23..=23).contains(&hours) {
            return Err(invalid("must be within -23..=23"));
        }

        chrono::FixedOffset::east_opt(hours * 3600)
            .map(Some)
            .ok_or_else(|| invalid("offset out of range"))
    }

    pub fn plaid_sync_count(&self) -> Result<u32, ConfigError> {
        parse_number(
            "PLAID_SYNC_COUNT",
            self.plaid_sync_count.as_deref(),
            DEFAULT_PLAID_SYNC_COUNT,
            1..=MAX_PLAID_SYNC_COUNT,
        )
    }

    pub fn plaid_include_pfc(&self) -> Result<bool, ConfigError> {
        parse_flag("PLAID_INCLUDE_PFC", self.plaid_include_pfc.as_deref(), true)
    }

    /// `None` leaves requests unbounded (the `0` setting or unset).
    pub fn plaid_timeout(&self) -> Result<Option<Duration>, ConfigError> {
        parse_timeout("PLAID_TIMEOUT_SECS", self.plaid_timeout_secs.as_deref())
    }

    pub fn openrouter_max_tokens(&self) -> Result<u32, ConfigError> {
        parse_number(
            "OPENROUTER_MAX_TOKENS",
            self.openrouter_max_tokens.as_deref(),
            DEFAULT_OPENROUTER_MAX_TOKENS,
            1..=4096,
        )
    }

    pub fn openrouter_timeout(&self) -> Result<Option<Duration>, ConfigError> {
        parse_timeout(
            "OPENROUTER_TIMEOUT_SECS",
            self.openrouter_timeout_secs.as_deref(),
        )
    }

    /// Everything a scheduled run needs, checked before any network call.
    pub fn validate_for_worker(&self, dry_run: bool) -> Result<(), ConfigError> {
        self.require_plaid_env()?;
        self.require_plaid_client_id()?;
        self.require_plaid_secret()?;
        self.require_plaid_access_token()?;
        self.require_openai_api_key()?;
        self.run_date_offset()?;
        self.plaid_sync_count()?;
        self.plaid_include_pfc()?;
        self.plaid_timeout()?;
        self.openrouter_max_tokens()?;
        self.openrouter_timeout()?;
        if !dry_run {
            self.require_database_url()?;
        }
        Ok(())
    }
}

/// Parses an optional numeric tunable, rejecting values that do not parse or fall outside `range`.
fn parse_number<T>(
    key: &'static str,
    raw: Option<&str>,
    default: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + fmt::Display + Copy,
{
    let Some(raw) = raw else {
        return Ok(default);
    };

    let value = raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: "not a number".to_string(),
    })?;

    if !range.contains(&value) {
        return Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
            reason: format!("must be within {}..={}", range.start(), range.end()),
        });
    }
    Ok(value)
}

fn parse_flag(key: &'static str, raw: Option<&str>, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

fn parse_timeout(key: &'static str, raw: Option<&str>) -> Result<Option<Duration>, ConfigError> {
    let secs = parse_number(key, raw, 0u64, 0..=MAX_TIMEOUT_SECS)?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}
