use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_DOMAIN: &str = "https://upbound.io";
pub const DEFAULT_PROFILE: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub domain: String,
    pub session: Option<String>,
    pub account: Option<String>,
}

impl Profile {
    pub fn anonymous(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain: DEFAULT_DOMAIN.to_string(),
            session: None,
            account: None,
        }
    }

    pub fn api_endpoint(&self) -> String {
        let domain = self.domain.trim().trim_end_matches('/');
        let host = domain
            .strip_prefix("https://")
            .or_else(|| domain.strip_prefix("http://"))
            .unwrap_or(domain);
        format!("https://api.{host}")
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
struct UpConfigFile {
    #[serde(default)]
    upbound: UpboundSection,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct UpboundSection {
    #[serde(default)]
    default: String,
    #[serde(default)]
    profiles: BTreeMap<String, ProfileSpec>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct ProfileSpec {
    #[serde(default)]
    session: String,
    #[serde(default)]
    account: String,
    #[serde(default)]
    domain: String,
}

pub fn load_profile(requested: Option<&str>) -> Result<Profile> {
    let requested = requested
        .map(str::to_string)
        .or_else(|| std::env::var("UP_PROFILE").ok())
        .filter(|name| !name.trim().is_empty());

    let Some(path) = discover_config_path() else {
        return Ok(Profile::anonymous(
            requested.unwrap_or_else(|| DEFAULT_PROFILE.to_string()),
        ));
    };

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read up config {}", path.display()))?;
    let parsed: UpConfigFile = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse up config {}", path.display()))?;
    resolve_profile(parsed, requested.as_deref())
        .with_context(|| format!("invalid profile selection in {}", path.display()))
}

fn resolve_profile(file: UpConfigFile, requested: Option<&str>) -> Result<Profile> {
    let name = requested
        .map(str::to_string)
        .or_else(|| Some(file.upbound.default.clone()).filter(|name| !name.is_empty()));

    let Some(name) = name else {
        return Ok(Profile::anonymous(DEFAULT_PROFILE));
    };

    let Some(entry) = file.upbound.profiles.get(&name) else {
        if requested.is_some() {
            anyhow::bail!("profile '{name}' was not found");
        }
        return Ok(Profile::anonymous(name));
    };

    Ok(Profile {
        name: name.clone(),
        domain: Some(entry.domain.clone())
            .filter(|domain| !domain.is_empty())
            .unwrap_or_else(|| DEFAULT_DOMAIN.to_string()),
        session: Some(entry.session.clone()).filter(|session| !session.is_empty()),
        account: Some(entry.account.clone()).filter(|account| !account.is_empty()),
    })
}

fn discover_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("UP_CONFIG")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }

    if let Ok(home) = std::env::var("HOME") {
        let candidate = PathBuf::from(&home).join(".up/config.json");
        if candidate.exists() {
            return Some(candidate);
        }
    }

    None
}
