use std::{env, time::Duration};

use anyhow::Result;
use flex_client::{FlexSettings, DEFAULT_BASE_URL, DEFAULT_VERSION};

pub const FLEX_TOKEN: &str = "FLEX_TOKEN";
pub const FLEX_QUERY_ID: &str = "FLEX_QUERY_ID";
pub const SUPABASE_URL: &str = "SUPABASE_URL";
pub const SUPABASE_SERVICE_ROLE_KEY: &str = "SUPABASE_SERVICE_ROLE_KEY";

const DEFAULT_POSITIONS_TABLE: &str = "positions_daily";
const DEFAULT_SNAPSHOTS_TABLE: &str = "portfolio_snapshots";

#[derive(Clone)]
pub struct FlexConfig {
    pub token: String,
    pub query_id: String,
    pub settings: FlexSettings,
}

#[derive(Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_role_key: String,
    pub positions_table: String,
    pub snapshots_table: String,
    pub request_timeout: Duration,
}

#[derive(Clone)]
pub struct AppConfig {
    pub flex: FlexConfig,
    pub supabase: SupabaseConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Required keys are checked in this order so the first missing one is reported.
        let flex = FlexConfig::from_lookup(&lookup)?;
        let supabase = SupabaseConfig::from_lookup(&lookup)?;
        Ok(Self { flex, supabase })
    }
}

impl FlexConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = FlexSettings::default();
        Ok(Self {
            token: required(&lookup, FLEX_TOKEN)?,
            query_id: required(&lookup, FLEX_QUERY_ID)?,
            settings: FlexSettings {
                base_url: lookup("FLEX_BASE_URL")
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                version: lookup("FLEX_VERSION")
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| DEFAULT_VERSION.to_string()),
                max_wait: parse_duration_seconds(&lookup, "FLEX_MAX_WAIT_SECS", defaults.max_wait),
                poll_interval: parse_duration_seconds(
                    &lookup,
                    "FLEX_POLL_INTERVAL_SECS",
                    defaults.poll_interval,
                ),
                request_timeout: parse_duration_seconds(
                    &lookup,
                    "HTTP_TIMEOUT_SECS",
                    defaults.request_timeout,
                ),
            },
        })
    }
}

impl SupabaseConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            url: required(&lookup, SUPABASE_URL)?,
            service_role_key: required(&lookup, SUPABASE_SERVICE_ROLE_KEY)?,
            positions_table: table_name(&lookup, "POSITIONS_TABLE", DEFAULT_POSITIONS_TABLE),
            snapshots_table: table_name(&lookup, "SNAPSHOTS_TABLE", DEFAULT_SNAPSHOTS_TABLE),
            request_timeout: parse_duration_seconds(
                &lookup,
                "HTTP_TIMEOUT_SECS",
                Duration::from_secs(60),
            ),
        })
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => anyhow::bail!("Missing env var: {key}"),
    }
}

fn table_name<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_duration_seconds<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
