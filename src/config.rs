//! Process configuration from `TOLLGATE_*` environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `TOLLGATE_ADDR` | `0.0.0.0:3000` |
//! | `TOLLGATE_TOKEN_PARAM` | `token` |
//! | `TOLLGATE_BLANK_TOKEN_IS_MISSING` | `false` |
//! | `TOLLGATE_MAX_EARLY_BODY` | `65536` |
//! | `TOLLGATE_MAX_REQUEST_BODY` | `2097152` |
//! | `TOLLGATE_DISABLED_FILTERS` | empty (comma-separated filter names) |
//!
//! `TOLLGATE_MAX_EARLY_BODY` must fit the token filter's `token is empty`
//! body (14 bytes); smaller values are rejected at load time.

use std::str::FromStr;

use crate::context::DEFAULT_MAX_EARLY_BODY;
use crate::error::Error;
use crate::filter::TokenFilter;
use crate::request::DEFAULT_MAX_REQUEST_BODY;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    pub addr: String,
    pub token_param: String,
    pub blank_token_is_missing: bool,
    pub max_early_body: usize,
    /// Cap on a request body read for a backend. Over it the client gets 413.
    pub max_request_body: usize,
    pub disabled_filters: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:3000".to_owned(),
            token_param: "token".to_owned(),
            blank_token_is_missing: false,
            max_early_body: DEFAULT_MAX_EARLY_BODY,
            max_request_body: DEFAULT_MAX_REQUEST_BODY,
            disabled_filters: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup. Unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut config = Self::default();

        if let Some(addr) = lookup("TOLLGATE_ADDR") {
            config.addr = addr;
        }
        if let Some(param) = lookup("TOLLGATE_TOKEN_PARAM") {
            if param.is_empty() {
                return Err(Error::Config("TOLLGATE_TOKEN_PARAM must not be empty".to_owned()));
            }
            config.token_param = param;
        }
        if let Some(v) = lookup("TOLLGATE_BLANK_TOKEN_IS_MISSING") {
            config.blank_token_is_missing = parse_bool("TOLLGATE_BLANK_TOKEN_IS_MISSING", &v)?;
        }
        if let Some(v) = lookup("TOLLGATE_MAX_EARLY_BODY") {
            let limit: usize = parse("TOLLGATE_MAX_EARLY_BODY", &v)?;
            if limit < TokenFilter::REJECTION_BODY.len() {
                return Err(Error::Config(format!(
                    "TOLLGATE_MAX_EARLY_BODY={limit} cannot hold the {}-byte 401 body",
                    TokenFilter::REJECTION_BODY.len()
                )));
            }
            config.max_early_body = limit;
        }
        if let Some(v) = lookup("TOLLGATE_MAX_REQUEST_BODY") {
            config.max_request_body = parse("TOLLGATE_MAX_REQUEST_BODY", &v)?;
        }
        if let Some(v) = lookup("TOLLGATE_DISABLED_FILTERS") {
            config.disabled_filters = v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect();
        }

        Ok(config)
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, Error>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| Error::Config(format!("{key}={value:?}: {e}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, Error> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("{key}={value:?}: expected a boolean"))),
    }
}
