//! Configuration Management
//!
//! Handles persistent configuration storage for cloudinv.

use crate::provider::Region;
use crate::session::DEFAULT_CONCURRENCY;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Regions to query instead of asking the provider
    #[serde(default)]
    pub regions: Option<Vec<String>>,
    /// Endpoint override, e.g. a local emulator or signing proxy
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Concurrent region jobs
    #[serde(default)]
    pub concurrency: Option<usize>,
    /// Last queried resource kind
    #[serde(default)]
    pub last_kind: Option<String>,
}

impl Config {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cloudinv").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from an explicit path; a missing or unreadable file yields defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("ignoring malformed config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {:?}", parent))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("cannot write {:?}", path))?;

        Ok(())
    }

    /// Get effective regions (CLI > config > AWS_REGION); `None` means ask the provider
    pub fn effective_regions(&self, cli: Option<&[String]>) -> Option<Vec<Region>> {
        let env = std::env::var("AWS_REGION").ok();
        resolve_regions(cli, self.regions.as_deref(), env.as_deref())
    }

    /// Get effective endpoint (CLI > config)
    pub fn effective_endpoint(&self, cli: Option<&str>) -> Option<String> {
        cli.map(|s| s.to_string()).or_else(|| self.endpoint.clone())
    }

    /// Get effective concurrency (CLI > config > default)
    pub fn effective_concurrency(&self, cli: Option<usize>) -> usize {
        cli.or(self.concurrency)
            .unwrap_or(DEFAULT_CONCURRENCY)
            .max(1)
    }

    /// Set last kind and save
    pub fn set_last_kind(&mut self, kind: &str) -> Result<()> {
        self.last_kind = Some(kind.to_string());
        self.save()
    }
}

fn resolve_regions(
    cli: Option<&[String]>,
    config: Option<&[String]>,
    env: Option<&str>,
) -> Option<Vec<Region>> {
    let from_list = |list: &[String]| -> Option<Vec<Region>> {
        let regions: Vec<Region> = list
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .map(Region::from)
            .collect();
        (!regions.is_empty()).then_some(regions)
    };

    cli.and_then(from_list)
        .or_else(|| config.and_then(from_list))
        .or_else(|| {
            env.map(str::trim)
                .filter(|r| !r.is_empty())
                .map(|r| vec![Region::from(r)])
        })
}
