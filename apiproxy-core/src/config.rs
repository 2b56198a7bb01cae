//! # Configuration Module
//!
//! Process settings read from the environment at startup: the servers
//! configuration file to watch, the listen port, the two proxy timeouts,
//! and the operating mode with its reservation id interval.
//!
//! Settings are resolved exactly once. A partially configured id interval,
//! intervals for both creditors and debtors at the same time, an unparsable
//! id, or an empty interval are all fatal startup errors; the process must
//! not come up with an ambiguous identity.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::mode::{IdInterval, Mode};
use crate::sharding::parse_i64;

pub const DEFAULT_CONFIG_FILE: &str = "apiproxy.conf";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_PROXY_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("{0} is not a valid port number: {1}")]
    BadPort(&'static str, String),
    #[error("{0} is not a valid timeout in milliseconds: {1}")]
    BadTimeout(&'static str, String),
    #[error("{0} is not a valid 64-bit id: {1}")]
    BadId(&'static str, String),
    #[error("{0} and {1} must be set together")]
    PartialInterval(&'static str, &'static str),
    #[error("creditor and debtor id intervals can not both be set")]
    AmbiguousMode,
    #[error("the reservation id interval is empty (min > max)")]
    EmptyInterval,
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Path of the servers configuration file to load and watch.
    pub config_file: PathBuf,
    /// Port the proxy listens on.
    pub port: u16,
    /// How long to wait for an upstream response.
    pub proxy_timeout: Duration,
    /// Overall socket idle timeout.
    pub timeout: Duration,
    /// The entity scope served by this process.
    pub mode: Mode,
}

impl Settings {
    /// Reads all settings from the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        let config_file = env::var("APIPROXY_CONFIG_FILE")
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string())
            .into();
        let port = match env::var("APIPROXY_PORT") {
            Ok(value) => value
                .parse()
                .map_err(|_| SettingsError::BadPort("APIPROXY_PORT", value))?,
            Err(_) => DEFAULT_PORT,
        };
        let proxy_timeout = timeout_var("APIPROXY_PROXY_TIMEOUT", DEFAULT_PROXY_TIMEOUT_MS)?;
        let timeout = timeout_var("APIPROXY_TIMEOUT", DEFAULT_TIMEOUT_MS)?;
        let mode = resolve_mode(
            env::var("MIN_CREDITOR_ID").ok(),
            env::var("MAX_CREDITOR_ID").ok(),
            env::var("MIN_DEBTOR_ID").ok(),
            env::var("MAX_DEBTOR_ID").ok(),
        )?;
        Ok(Settings {
            config_file,
            port,
            proxy_timeout,
            timeout,
            mode,
        })
    }
}

fn timeout_var(name: &'static str, default_ms: u64) -> Result<Duration, SettingsError> {
    let ms = match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| SettingsError::BadTimeout(name, value))?,
        Err(_) => default_ms,
    };
    Ok(Duration::from_millis(ms))
}

/// Chooses the operating mode from the four id-interval variables.
///
/// Both creditor variables set selects Creditors mode; both debtor
/// variables set selects Debtors mode; none of the four selects Accounts
/// mode. Every other combination is an error.
fn resolve_mode(
    creditor_min: Option<String>,
    creditor_max: Option<String>,
    debtor_min: Option<String>,
    debtor_max: Option<String>,
) -> Result<Mode, SettingsError> {
    let creditors = id_interval(
        ("MIN_CREDITOR_ID", creditor_min),
        ("MAX_CREDITOR_ID", creditor_max),
    )?;
    let debtors = id_interval(
        ("MIN_DEBTOR_ID", debtor_min),
        ("MAX_DEBTOR_ID", debtor_max),
    )?;
    match (creditors, debtors) {
        (Some(_), Some(_)) => Err(SettingsError::AmbiguousMode),
        (Some(interval), None) => Ok(Mode::Creditors(interval)),
        (None, Some(interval)) => Ok(Mode::Debtors(interval)),
        (None, None) => Ok(Mode::Accounts),
    }
}

fn id_interval(
    (min_name, min): (&'static str, Option<String>),
    (max_name, max): (&'static str, Option<String>),
) -> Result<Option<IdInterval>, SettingsError> {
    match (min, max) {
        (None, None) => Ok(None),
        (Some(min), Some(max)) => {
            let min = parse_i64(&min).ok_or(SettingsError::BadId(min_name, min))?;
            let max = parse_i64(&max).ok_or(SettingsError::BadId(max_name, max))?;
            if min > max {
                return Err(SettingsError::EmptyInterval);
            }
            Ok(Some(IdInterval { min, max }))
        }
        _ => Err(SettingsError::PartialInterval(min_name, max_name)),
    }
}
