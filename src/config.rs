//! Configuration types.
//!
//! Everything is read from environment variables, each with a default.
//! `from_lookup` takes any key → value function so the parsing can be
//! exercised without touching the process environment.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};
use crate::session::webdriver::BrowserConfig;
use crate::triage::engine::ScoringPolicy;
use crate::triage::filter::KeywordSet;
use crate::triage::pacing::PacingConfig;
use crate::triage::queue::{ProcessMode, QueueConfig, default_site_origin};
use crate::triage::types::HARD_REJECT_SCORE;
use crate::triage::window::RunWindow;

/// Terms that hard-reject a candidate when found in the about text or a post.
pub const DEFAULT_BLOCKLIST: &[&str] = &[
    "antifa",
    "blood and soil",
    "globalist cabal",
    "white supremacist",
    "boogaloo",
];

/// Institutional affiliations worth +3 (and exempt from the thin-network check).
pub const DEFAULT_INSTITUTIONS: &[&str] = &[
    "MIT Professional Education",
    "MIT Professional",
    "MIT",
    "Harvard",
];

/// Course names worth +2.
pub const DEFAULT_COURSES: &[&str] = &[
    "Generative AI",
    "Architecting and Engineering Software Systems for Generative AI",
];

/// Topics the risk classifier is asked to weigh.
pub const DEFAULT_RISK_TAXONOMY: &str = "Abortion (pro-life vs pro-choice), Gun control, \
    Immigration policy, Climate change denial vs activism, Vaccination debates, \
    Critical Race Theory, LGBTQ+ rights, BLM vs All Lives Matter, Police reform, \
    Religious fundamentalism, Atheism vs religion debates, Free speech vs cancel culture, \
    Socialism vs capitalism, Healthcare models, Tax policy debates, Conspiracy theories, \
    Genocide denial, Extremist ideologies";

/// Threshold used by the selective acceptance rule.
pub const SELECTIVE_ACCEPTANCE_THRESHOLD: i32 = 3;

/// Threshold used by the permissive acceptance rule.
pub const PERMISSIVE_ACCEPTANCE_THRESHOLD: i32 = 0;

/// Longest pause the pacing range may ask for.
pub const MAX_PACE_SECS: f64 = 3600.0;

/// Minimum score a candidate needs to be accepted.
///
/// `Selective` only accepts candidates with at least one strong positive
/// indicator; `Permissive` accepts anyone who survived the hard-reject checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptancePolicy {
    #[default]
    Selective,
    Permissive,
    Threshold(i32),
}

impl AcceptancePolicy {
    pub fn threshold(&self) -> i32 {
        match self {
            Self::Selective => SELECTIVE_ACCEPTANCE_THRESHOLD,
            Self::Permissive => PERMISSIVE_ACCEPTANCE_THRESHOLD,
            Self::Threshold(n) => *n,
        }
    }
}

impl FromStr for AcceptancePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "selective" => Ok(Self::Selective),
            "permissive" => Ok(Self::Permissive),
            other => other
                .parse::<i32>()
                .map(Self::Threshold)
                .map_err(|_| format!("expected selective, permissive or an integer, got '{s}'")),
        }
    }
}

/// Full configuration for one triage run.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    pub scoring: ScoringPolicy,
    pub risk_taxonomy: String,
    pub queue: QueueConfig,
    pub pacing: PacingConfig,
    pub window: RunWindow,
    pub rejected_log_path: PathBuf,
    pub browser: BrowserConfig,
    pub llm: LlmConfig,
    pub log_dir: Option<PathBuf>,
}

impl TriageConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let acceptance: AcceptancePolicy =
            parse_var(&lookup, "TRIAGE_ACCEPTANCE_POLICY", AcceptancePolicy::default())?;
        if acceptance.threshold() <= HARD_REJECT_SCORE {
            return Err(ConfigError::invalid(
                "TRIAGE_ACCEPTANCE_POLICY",
                format!("threshold must be above the hard-reject score {HARD_REJECT_SCORE}"),
            ));
        }

        let risk_threshold: f64 = parse_var(&lookup, "TRIAGE_RISK_THRESHOLD", 0.7)?;
        if !(risk_threshold > 0.0 && risk_threshold <= 1.0) {
            return Err(ConfigError::invalid(
                "TRIAGE_RISK_THRESHOLD",
                "must be in (0.0, 1.0]",
            ));
        }

        let scoring = ScoringPolicy {
            blocklist: KeywordSet::new(parse_list(&lookup, "TRIAGE_BLOCKLIST", DEFAULT_BLOCKLIST)),
            institutions: KeywordSet::new(parse_list(
                &lookup,
                "TRIAGE_INSTITUTIONS",
                DEFAULT_INSTITUTIONS,
            )),
            courses: KeywordSet::new(parse_list(&lookup, "TRIAGE_COURSES", DEFAULT_COURSES)),
            min_connections: parse_var(&lookup, "TRIAGE_MIN_CONNECTIONS", 50)?,
            thin_network_reject: parse_var(&lookup, "TRIAGE_THIN_NETWORK_REJECT", true)?,
            risk_threshold,
            acceptance,
        };

        let mode: ProcessMode = parse_var(&lookup, "TRIAGE_MODE", ProcessMode::Apply)?;
        let queue = QueueConfig {
            max_invitations: parse_var(&lookup, "TRIAGE_MAX_INVITATIONS", 40)?,
            page_wait: Duration::from_secs(parse_var(&lookup, "TRIAGE_PAGE_WAIT_SECS", 5)?),
            site_origin: parse_var(&lookup, "TRIAGE_SITE_ORIGIN", default_site_origin())?,
            mode,
            ..QueueConfig::default()
        };
        if !matches!(queue.site_origin.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(
                "TRIAGE_SITE_ORIGIN",
                "must be an http or https URL",
            ));
        }

        let pacing = PacingConfig {
            min_secs: parse_var(&lookup, "TRIAGE_PACE_MIN_SECS", 3.0)?,
            max_secs: parse_var(&lookup, "TRIAGE_PACE_MAX_SECS", 7.0)?,
            ..PacingConfig::default()
        };
        for (key, secs) in [
            ("TRIAGE_PACE_MIN_SECS", pacing.min_secs),
            ("TRIAGE_PACE_MAX_SECS", pacing.max_secs),
        ] {
            if !secs.is_finite() || !(0.0..=MAX_PACE_SECS).contains(&secs) {
                return Err(ConfigError::invalid(
                    key,
                    format!("must be a number of seconds between 0 and {MAX_PACE_SECS}"),
                ));
            }
        }
        if pacing.min_secs > pacing.max_secs {
            return Err(ConfigError::invalid(
                "TRIAGE_PACE_MIN_SECS",
                "must not be above TRIAGE_PACE_MAX_SECS",
            ));
        }

        let window = RunWindow::new(
            parse_var(&lookup, "TRIAGE_ACTIVE_START_HOUR", 9)?,
            parse_var(&lookup, "TRIAGE_ACTIVE_END_HOUR", 23)?,
        )?;

        let browser = BrowserConfig {
            webdriver_url: lookup("WEBDRIVER_URL")
                .unwrap_or_else(|| "http://localhost:9515".to_string()),
            binary: lookup("BROWSER_BINARY").map(PathBuf::from),
            profile_dir: lookup("BROWSER_PROFILE_DIR").map(PathBuf::from),
            headless: parse_var(&lookup, "BROWSER_HEADLESS", false)?,
        };

        let backend: LlmBackend = parse_var(&lookup, "TRIAGE_LLM_BACKEND", LlmBackend::OpenAi)?;
        let key_var = backend.api_key_var();
        let api_key = lookup(key_var).ok_or_else(|| ConfigError::MissingEnvVar(key_var.into()))?;
        let llm = LlmConfig {
            backend,
            api_key: secrecy::SecretString::from(api_key),
            model: lookup("TRIAGE_LLM_MODEL").unwrap_or_else(|| backend.default_model().into()),
        };

        Ok(Self {
            scoring,
            risk_taxonomy: DEFAULT_RISK_TAXONOMY.to_string(),
            queue,
            pacing,
            window,
            rejected_log_path: lookup("TRIAGE_REJECTED_LOG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("rejected.txt")),
            browser,
            llm,
            log_dir: lookup("TRIAGE_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(key, e.to_string())),
        _ => Ok(default),
    }
}

fn parse_list<F>(lookup: &F, key: &str, default: &[&str]) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => default.iter().map(|s| s.to_string()).collect(),
    }
}
