/*============================================================
  Synavera Project: Syn-Patch
  Module: synpatch_core::config
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Load operator configuration: log locations, the alternate
    root layout used by patch plans, tooling image overrides,
    and proxy settings forwarded into the tooling container.

  Security / Safety Notes:
    Proxy values are forwarded into the tooling container
    environment verbatim; no credentials are logged.

  Dependencies:
    serde + toml for parsing, dirs for XDG locations.

  Operational Scope:
    Read once by the CLI; the resulting layout and tooling
    settings are passed into the core explicitly.

  Revision History:
    2025-11-12 COD  Authored configuration loader.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Explicit defaults mirrored in documentation
    - Missing default file tolerated, missing explicit file fatal
============================================================*/

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{PatchError, Result};
use crate::plan::is_plain_file_name;

const APP_DIR: &str = "synpatch";

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SynpatchConfig {
    pub paths: PathsConfig,
    pub layout: LayoutConfig,
    pub tooling: ToolingConfig,
    pub proxy: ProxyConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub log_dir: Option<PathBuf>,
    pub plan_dir: Option<PathBuf>,
}

/// Where the target image is mounted inside the tooling container.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub chroot_dir: String,
    pub manifest_file: String,
    pub rpm_db_dir: String,
    pub rpm_db_file: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            chroot_dir: "/tmp/rootfs".into(),
            manifest_file: "/tmp/manifest".into(),
            rpm_db_dir: "var/lib/rpm".into(),
            rpm_db_file: "Packages.db".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolingConfig {
    /// Distribution used when the image reports an unknown OS type.
    pub default_distribution: String,
    /// Registry host overrides keyed by distribution identifier.
    pub registries: BTreeMap<String, String>,
}

impl Default for ToolingConfig {
    fn default() -> Self {
        Self {
            default_distribution: "opensuse-tumbleweed".into(),
            registries: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Forward proxy variables from the calling environment.
    pub inherit_env: bool,
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub no_proxy: Option<String>,
}

impl ProxyConfig {
    /// Proxy variables to bind into the tooling container.
    pub fn bindings(&self) -> BTreeMap<String, String> {
        let mut bindings = BTreeMap::new();
        let pairs = [
            ("HTTP_PROXY", &self.http_proxy),
            ("HTTPS_PROXY", &self.https_proxy),
            ("NO_PROXY", &self.no_proxy),
        ];
        for (key, explicit) in pairs {
            let value = explicit.clone().or_else(|| {
                if self.inherit_env {
                    std::env::var(key)
                        .or_else(|_| std::env::var(key.to_ascii_lowercase()))
                        .ok()
                } else {
                    None
                }
            });
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                bindings.insert(key.to_string(), value.clone());
                bindings.insert(key.to_ascii_lowercase(), value);
            }
        }
        bindings
    }
}

impl SynpatchConfig {
    /// Load from an explicit path, or from the default location when
    /// `path` is `None`. A missing default file yields defaults.
    pub fn load_from_optional_path(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(explicit) => Self::load(explicit),
            None => match default_config_path() {
                Some(default) if default.exists() => Self::load(&default),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            PatchError::Config(format!("Failed to read {}: {err}", path.display()))
        })?;
        let config: Self = toml::from_str(&raw).map_err(|err| {
            PatchError::Config(format!("Invalid configuration {}: {err}", path.display()))
        })?;
        config.check()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|err| PatchError::Config(format!("Invalid configuration: {err}")))?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if !self.layout.chroot_dir.starts_with('/') {
            return Err(PatchError::Config(format!(
                "layout.chroot_dir must be absolute, got `{}`",
                self.layout.chroot_dir
            )));
        }
        if !self.layout.manifest_file.starts_with('/') {
            return Err(PatchError::Config(format!(
                "layout.manifest_file must be absolute, got `{}`",
                self.layout.manifest_file
            )));
        }
        if !is_plain_file_name(&self.layout.rpm_db_file) {
            return Err(PatchError::Config(format!(
                "layout.rpm_db_file must be a bare file name, got `{}`",
                self.layout.rpm_db_file
            )));
        }
        if self.tooling.default_distribution.trim().is_empty() {
            return Err(PatchError::Config(
                "tooling.default_distribution must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn log_dir(&self) -> PathBuf {
        self.paths
            .log_dir
            .clone()
            .unwrap_or_else(|| state_dir().join("logs"))
    }

    pub fn plan_dir(&self) -> PathBuf {
        self.paths
            .plan_dir
            .clone()
            .unwrap_or_else(|| state_dir().join("plans"))
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}

fn state_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
}
