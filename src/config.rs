use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context as _;

use crate::app::model::RetryPolicy;
use crate::guard::GuardSettings;
use crate::llm::openai::DEFAULT_BASE_URL;

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_assistant_id: Option<String>,
    pub full_generation_price: u64,
    pub guard: GuardSettings,
    pub max_concurrency: usize,
    pub worker_poll_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("workspace-data"),
            openai_api_key: None,
            openai_base_url: DEFAULT_BASE_URL.to_owned(),
            openai_assistant_id: None,
            full_generation_price: 100,
            guard: GuardSettings::default(),
            max_concurrency: 2,
            worker_poll_interval: Duration::from_millis(1000),
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let openai_base_url = match get("SCHOLARGEN_OPENAI_BASE_URL") {
            Some(raw) => validate_base_url(&raw)
                .with_context(|| format!("invalid SCHOLARGEN_OPENAI_BASE_URL={raw:?}"))?,
            None => defaults.openai_base_url,
        };

        let max_concurrency: usize =
            parse_or("SCHOLARGEN_MAX_CONCURRENCY", get("SCHOLARGEN_MAX_CONCURRENCY"), 2)?;
        if max_concurrency == 0 {
            anyhow::bail!("SCHOLARGEN_MAX_CONCURRENCY must be > 0");
        }

        let retry = RetryPolicy {
            timeout: Duration::from_secs(parse_or(
                "SCHOLARGEN_JOB_TIMEOUT_SECS",
                get("SCHOLARGEN_JOB_TIMEOUT_SECS"),
                defaults.retry.timeout.as_secs(),
            )?),
            ..defaults.retry
        };

        Ok(Self {
            data_dir: get("SCHOLARGEN_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            openai_api_key: get("OPENAI_API_KEY"),
            openai_base_url,
            openai_assistant_id: get("SCHOLARGEN_OPENAI_ASSISTANT_ID"),
            full_generation_price: parse_or(
                "SCHOLARGEN_FULL_GENERATION_PRICE",
                get("SCHOLARGEN_FULL_GENERATION_PRICE"),
                defaults.full_generation_price,
            )?,
            guard: GuardSettings {
                cache_ttl: Duration::from_secs(parse_or(
                    "SCHOLARGEN_GUARD_CACHE_TTL_SECS",
                    get("SCHOLARGEN_GUARD_CACHE_TTL_SECS"),
                    defaults.guard.cache_ttl.as_secs(),
                )?),
                failed_window: Duration::from_secs(parse_or(
                    "SCHOLARGEN_GUARD_FAILED_WINDOW_SECS",
                    get("SCHOLARGEN_GUARD_FAILED_WINDOW_SECS"),
                    defaults.guard.failed_window.as_secs(),
                )?),
            },
            max_concurrency,
            worker_poll_interval: Duration::from_millis(parse_or(
                "SCHOLARGEN_WORKER_POLL_MS",
                get("SCHOLARGEN_WORKER_POLL_MS"),
                1000,
            )?),
            retry,
        })
    }
}

fn parse_or<T>(name: &str, raw: Option<String>, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("invalid {name}={raw:?}: {err}")),
    }
}

fn validate_base_url(raw: &str) -> anyhow::Result<String> {
    let url = url::Url::parse(raw).context("parse url")?;
    if url.scheme() != "http" && url.scheme() != "https" {
        anyhow::bail!("base url must be http/https");
    }
    Ok(raw.trim_end_matches('/').to_owned())
}
