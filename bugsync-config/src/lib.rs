use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{Context, Result};
use bugsync_domain::{DEFAULT_ANNOTATION_LENGTH, DEFAULT_DESCRIPTION_LENGTH};
use serde::Deserialize;
use serde_yaml::Value;
use thiserror::Error;
use tracing::debug;

const SECRET_KEY_SUFFIXES: [&str; 2] = [".password", ".api_key"];
const GENERAL_SECTION: &str = "general";

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("[{target}] has no '{key}'")]
    MissingKey { target: String, key: String },

    #[error("[{target}] has neither '{first}' nor '{second}'")]
    MissingCredential {
        target: String,
        first: String,
        second: String,
    },

    #[error("[{target}] '{key}' has invalid value '{value}': {reason}")]
    InvalidValue {
        target: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("target '{0}' is listed in [general] but has no section")]
    UnknownTarget(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneralConfig {
    pub targets: Vec<String>,
    pub description_length: usize,
    pub annotation_length: usize,
    pub annotation_comments: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            description_length: DEFAULT_DESCRIPTION_LENGTH,
            annotation_length: DEFAULT_ANNOTATION_LENGTH,
            annotation_comments: true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceSection {
    pub target: String,
    entries: BTreeMap<String, String>,
}

impl ServiceSection {
    pub fn new<I, K, V>(target: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries = entries
            .into_iter()
            .filter_map(|(key, value)| Some((key.into(), non_empty(value.into())?)))
            .collect();
        Self {
            target: target.into(),
            entries,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn service(&self) -> Option<&str> {
        self.get("service")
    }

    pub fn require(&self, key: &str) -> Result<&str, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::MissingKey {
            target: self.target.clone(),
            key: key.to_string(),
        })
    }

    pub fn require_either(&self, first: &str, second: &str) -> Result<(), ConfigError> {
        if self.contains(first) || self.contains(second) {
            return Ok(());
        }
        Err(ConfigError::MissingCredential {
            target: self.target.clone(),
            first: first.to_string(),
            second: second.to_string(),
        })
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        let Some(value) = self.get(key) else {
            return Ok(default);
        };
        parse_bool_flag(value).ok_or_else(|| ConfigError::InvalidValue {
            target: self.target.clone(),
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        })
    }

    pub fn get_usize(&self, key: &str, default: usize) -> Result<usize, ConfigError> {
        let Some(value) = self.get(key) else {
            return Ok(default);
        };
        value.parse().map_err(|_| ConfigError::InvalidValue {
            target: self.target.clone(),
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected a non-negative integer".to_string(),
        })
    }

    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|value| {
                value
                    .split(',')
                    .filter_map(non_empty_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BugsyncConfig {
    pub general: GeneralConfig,
    pub sections: BTreeMap<String, ServiceSection>,
}

#[derive(Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    general: BTreeMap<String, Value>,
    #[serde(flatten)]
    sections: BTreeMap<String, BTreeMap<String, Value>>,
}

impl BugsyncConfig {
    pub fn load_default() -> Result<Self> {
        Self::load_from_path(&default_config_path())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let payload = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        Self::from_yaml_str(&payload)
    }

    pub fn from_yaml_str(payload: &str) -> Result<Self> {
        let raw: RawConfig =
            serde_yaml::from_str(payload).with_context(|| "invalid YAML config format")?;
        Ok(Self::from_raw(raw, fetch_secret_from_manager)?)
    }

    pub fn section(&self, target: &str) -> Result<&ServiceSection, ConfigError> {
        self.sections
            .get(target)
            .ok_or_else(|| ConfigError::UnknownTarget(target.to_string()))
    }

    pub fn targets(&self) -> Result<Vec<&ServiceSection>, ConfigError> {
        self.general
            .targets
            .iter()
            .map(|target| self.section(target))
            .collect()
    }

    fn from_raw<F>(raw: RawConfig, fetch: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str, &str) -> Option<String>,
    {
        let general = parse_general(raw.general)?;

        let sections = raw
            .sections
            .into_iter()
            .map(|(target, entries)| {
                let entries = entries.into_iter().filter_map(|(key, value)| {
                    let value = scalar_string(value)?;
                    if is_secret_key(&key) {
                        let resolved = resolve_secret_with(value, &fetch);
                        if resolved.is_none() {
                            debug!(section = %target, key = %key, "secret reference unresolved");
                        }
                        return Some((key, resolved?));
                    }
                    Some((key, value))
                });
                let section = ServiceSection::new(target.clone(), entries);
                (target, section)
            })
            .collect();

        Ok(Self { general, sections })
    }
}

fn parse_general(raw: BTreeMap<String, Value>) -> Result<GeneralConfig, ConfigError> {
    let section = ServiceSection::new(
        GENERAL_SECTION,
        raw.into_iter()
            .filter_map(|(key, value)| Some((key, scalar_string(value)?))),
    );
    let defaults = GeneralConfig::default();

    Ok(GeneralConfig {
        targets: section.get_list("targets"),
        description_length: section
            .get_usize("description_length", defaults.description_length)?,
        annotation_length: section.get_usize("annotation_length", defaults.annotation_length)?,
        annotation_comments: section
            .get_bool("annotation_comments", defaults.annotation_comments)?,
    })
}

pub fn default_config_path() -> PathBuf {
    if let Some(override_path) = env::var_os("BUGSYNC_CONFIG_FILE") {
        return PathBuf::from(override_path);
    }

    let mut base = env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    base.push(".config");
    base.push("bugsync");
    base.push("config.yaml");
    base
}

pub fn normalize_base_uri(value: &str) -> Option<String> {
    let trimmed = non_empty_str(value)?;
    let (scheme, rest) = match trimmed.split_once("://") {
        Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
        None => ("https".to_string(), trimmed),
    };
    if scheme != "http" && scheme != "https" {
        return None;
    }

    let host = rest.trim_end_matches('/');
    if host.is_empty() || host.starts_with('/') {
        return None;
    }
    Some(format!("{scheme}://{host}"))
}

pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn scalar_string(value: Value) -> Option<String> {
    match value {
        Value::String(text) => non_empty(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Sequence(items) => {
            let joined = items
                .into_iter()
                .filter_map(scalar_string)
                .collect::<Vec<_>>()
                .join(",");
            non_empty(joined)
        }
        _ => None,
    }
}

fn is_secret_key(key: &str) -> bool {
    SECRET_KEY_SUFFIXES.iter().any(|suffix| key.ends_with(suffix))
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

fn non_empty_str(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed)
}

fn resolve_secret_with<F>(value: String, fetch: F) -> Option<String>
where
    F: Fn(&str, &str) -> Option<String>,
{
    let secret = non_empty(value)?;
    let Some((provider, key)) = parse_secret_reference(secret.as_str()) else {
        return Some(secret);
    };
    fetch(provider, key)
}

fn parse_secret_reference(value: &str) -> Option<(&str, &str)> {
    let (provider, key) = value.split_once("::")?;
    if key.trim().is_empty() {
        return None;
    }
    if provider == "pass" || provider == "passage" {
        Some((provider, key.trim()))
    } else {
        None
    }
}

fn fetch_secret_from_manager(provider: &str, key: &str) -> Option<String> {
    let output = Command::new(provider).arg("show").arg(key).output().ok()?;
    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    // pass prints the secret on the first line, metadata may follow
    stdout.lines().next().and_then(|line| non_empty(line.to_string()))
}
