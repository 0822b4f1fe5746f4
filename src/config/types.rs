use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::Program;

pub const DEFAULT_USER_AGENT: &str = concat!("cachesnake/", env!("CARGO_PKG_VERSION"));

/// Link extractor applied to crawled HTML when the config names none.
pub const DEFAULT_LINK_REGEX: &str = r#"(?:href|src)\s*=\s*["']([^"'#]+)["']"#;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CachesnakeConfig {
    /// Newline-separated hostnames to crawl.
    pub subdomain_file: Option<PathBuf>,
    pub user_agent: String,
    pub scope: Program,
    pub crawler: CrawlerConfig,
    pub attack: AttackConfig,
    pub triage: TriageConfig,
    pub catalogues: CatalogueConfig,
    pub notifications: NotificationConfig,
    pub output: OutputConfig,
}

impl Default for CachesnakeConfig {
    fn default() -> Self {
        Self {
            subdomain_file: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            scope: Program::default(),
            crawler: CrawlerConfig::default(),
            attack: AttackConfig::default(),
            triage: TriageConfig::default(),
            catalogues: CatalogueConfig::default(),
            notifications: NotificationConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CrawlerConfig {
    pub timeout: HumanDuration,
    pub backoff: HumanDuration,
    pub workers: usize,
    pub regexes: Vec<String>,
    pub targets_per_subdomain: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            timeout: HumanDuration::from_secs(10),
            backoff: HumanDuration::from_secs(1),
            workers: 10,
            regexes: vec![DEFAULT_LINK_REGEX.to_string()],
            targets_per_subdomain: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AttackConfig {
    pub timeout: HumanDuration,
    pub backoff: HumanDuration,
    pub workers: usize,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            timeout: HumanDuration::from_secs(10),
            backoff: HumanDuration::from_secs(1),
            workers: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TriageConfig {
    pub workers: usize,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self { workers: 5 }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CatalogueConfig {
    /// Directory of `*.txt` header lists. Built-in lists are used when unset.
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct NotificationConfig {
    /// Literal URL or `$ENV_VAR` reference.
    pub webhook_url: Option<String>,
    pub send_status: bool,
    pub status_interval: HumanDuration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            send_status: false,
            status_interval: HumanDuration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// JSON-lines file that confirmed results are appended to.
    pub results_file: Option<PathBuf>,
}

/// A duration written as `<n><unit>` with unit `ms`, `s`, `m` or `h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct HumanDuration(Duration);

impl HumanDuration {
    pub const fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    pub fn get(&self) -> Duration {
        self.0
    }
}

impl From<Duration> for HumanDuration {
    fn from(d: Duration) -> Self {
        Self(d)
    }
}

impl std::str::FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("duration '{s}' has no unit (use ms, s, m or h)"))?;
        let (digits, unit) = s.split_at(split);
        let n: u64 = digits
            .parse()
            .map_err(|_| format!("invalid duration '{s}'"))?;
        let d = match unit {
            "ms" => Duration::from_millis(n),
            "s" => Duration::from_secs(n),
            "m" => Duration::from_secs(n.checked_mul(60).ok_or_else(|| format!("duration '{s}' is too large"))?),
            "h" => Duration::from_secs(n.checked_mul(3600).ok_or_else(|| format!("duration '{s}' is too large"))?),
            other => return Err(format!("unknown duration unit '{other}' in '{s}'")),
        };
        Ok(Self(d))
    }
}

impl TryFrom<String> for HumanDuration {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<HumanDuration> for String {
    fn from(d: HumanDuration) -> Self {
        d.to_string()
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.0.as_millis();
        if ms == 0 {
            f.write_str("0s")
        } else if ms % 3_600_000 == 0 {
            write!(f, "{}h", ms / 3_600_000)
        } else if ms % 60_000 == 0 {
            write!(f, "{}m", ms / 60_000)
        } else if ms % 1000 == 0 {
            write!(f, "{}s", ms / 1000)
        } else {
            write!(f, "{ms}ms")
        }
    }
}
