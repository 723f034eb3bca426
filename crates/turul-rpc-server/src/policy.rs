//! Registry-wide policy
//!
//! Global knobs the dispatch engine consults on every call. A policy can be
//! assembled with the `with_*` setters, parsed from TOML, or read from
//! `TURUL_RPC_*` environment variables layered over the defaults.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

/// Message used for internal failures unless disclosure says otherwise
pub const GENERIC_ERROR_MESSAGE: &str = "An internal error occurred while processing the call";

pub const DEFAULT_SESSION_KEY: &str = "__principal";
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(20 * 60);
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// How much of an unhandled failure reaches the caller
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ErrorDisclosure {
    /// Fixed generic message
    #[default]
    Generic,
    /// Echo the error text
    Verbose,
    /// Operator-supplied fixed message
    Override(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryPolicy {
    /// Skip authorization entirely
    pub public_access: bool,
    /// Session slot holding the ambient principal
    pub session_key: String,
    /// Idle lifetime of a session, enforced by the cache backend
    pub session_ttl: Duration,
    /// Default timeout offered to lock helpers
    pub lock_timeout: Duration,
    pub error_disclosure: ErrorDisclosure,
}

impl Default for RegistryPolicy {
    fn default() -> Self {
        Self {
            public_access: false,
            session_key: DEFAULT_SESSION_KEY.to_string(),
            session_ttl: DEFAULT_SESSION_TTL,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            error_disclosure: ErrorDisclosure::Generic,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("Invalid policy value for '{key}': {value}")]
    InvalidValue { key: String, value: String },

    #[error("Failed to parse policy: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Serialized form of [`RegistryPolicy`]; durations are in seconds
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub public_access: Option<bool>,
    pub session_key: Option<String>,
    pub session_ttl_secs: Option<u64>,
    pub lock_timeout_secs: Option<u64>,
    /// `"generic"` or `"verbose"`
    pub error_disclosure: Option<String>,
    /// Fixed message replacing the generic one
    pub error_message: Option<String>,
}

impl RegistryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_public_access(mut self, public_access: bool) -> Self {
        self.public_access = public_access;
        self
    }

    pub fn with_session_key(mut self, key: impl Into<String>) -> Self {
        self.session_key = key.into();
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_error_disclosure(mut self, disclosure: ErrorDisclosure) -> Self {
        self.error_disclosure = disclosure;
        self
    }

    /// Message an unhandled failure surfaces as
    pub fn disclose(&self, error: &dyn fmt::Display) -> String {
        match &self.error_disclosure {
            ErrorDisclosure::Verbose => error.to_string(),
            ErrorDisclosure::Override(message) => message.clone(),
            ErrorDisclosure::Generic => GENERIC_ERROR_MESSAGE.to_string(),
        }
    }

    /// Apply a config on top of this policy; unset fields keep their value
    pub fn merge(mut self, config: PolicyConfig) -> Result<Self, PolicyError> {
        if let Some(public_access) = config.public_access {
            self.public_access = public_access;
        }
        if let Some(key) = config.session_key {
            if key.trim().is_empty() {
                return Err(PolicyError::InvalidValue {
                    key: "session_key".to_string(),
                    value: key,
                });
            }
            self.session_key = key;
        }
        if let Some(secs) = config.session_ttl_secs {
            self.session_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = config.lock_timeout_secs {
            self.lock_timeout = Duration::from_secs(secs);
        }

        let verbose = match config.error_disclosure.as_deref() {
            None => matches!(self.error_disclosure, ErrorDisclosure::Verbose),
            Some(mode) if mode.eq_ignore_ascii_case("verbose") => true,
            Some(mode) if mode.eq_ignore_ascii_case("generic") => false,
            Some(other) => {
                return Err(PolicyError::InvalidValue {
                    key: "error_disclosure".to_string(),
                    value: other.to_string(),
                });
            }
        };
        self.error_disclosure = match (verbose, config.error_message) {
            (true, _) => ErrorDisclosure::Verbose,
            (false, Some(message)) => ErrorDisclosure::Override(message),
            (false, None) if config.error_disclosure.is_some() => ErrorDisclosure::Generic,
            (false, None) => std::mem::take(&mut self.error_disclosure),
        };

        Ok(self)
    }

    pub fn from_config(config: PolicyConfig) -> Result<Self, PolicyError> {
        Self::default().merge(config)
    }

    /// Parse a TOML document such as:
    ///
    /// ```toml
    /// public_access = false
    /// session_key = "user"
    /// session_ttl_secs = 1800
    /// error_disclosure = "generic"
    /// error_message = "Something went wrong"
    /// ```
    pub fn from_toml_str(document: &str) -> Result<Self, PolicyError> {
        let config: PolicyConfig = toml::from_str(document)?;
        Self::from_config(config)
    }

    /// Defaults overridden by `TURUL_RPC_*` environment variables
    pub fn from_env() -> Result<Self, PolicyError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PolicyError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = PolicyConfig {
            public_access: lookup("TURUL_RPC_PUBLIC_ACCESS")
                .map(|v| parse_bool("TURUL_RPC_PUBLIC_ACCESS", &v))
                .transpose()?,
            session_key: lookup("TURUL_RPC_SESSION_KEY"),
            session_ttl_secs: lookup("TURUL_RPC_SESSION_TTL_SECS")
                .map(|v| parse_secs("TURUL_RPC_SESSION_TTL_SECS", &v))
                .transpose()?,
            lock_timeout_secs: lookup("TURUL_RPC_LOCK_TIMEOUT_SECS")
                .map(|v| parse_secs("TURUL_RPC_LOCK_TIMEOUT_SECS", &v))
                .transpose()?,
            error_disclosure: lookup("TURUL_RPC_ERROR_DISCLOSURE"),
            error_message: lookup("TURUL_RPC_ERROR_MESSAGE"),
        };
        Self::from_config(config)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, PolicyError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(PolicyError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64, PolicyError> {
    value.trim().parse().map_err(|_| PolicyError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
