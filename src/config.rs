// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the deployment configuration file that siteops
//! reads before every command. The file describes the project being deployed,
//! the web server it is deployed to, and where the service configuration
//! templates live. Nothing in here is specific to one target environment,
//! because target specific names are all derived from the site identity.

use crate::site::Target;

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Deployment configuration layout.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct DeployConfig {
    /// Project being deployed.
    pub site: SiteSettings,

    /// Web server that hosts every target.
    pub server: ServerSettings,

    /// External programs used on the web server.
    #[serde(default)]
    pub tools: ToolSettings,

    /// Service configuration templates.
    #[serde(default)]
    pub templates: TemplateSettings,

    /// Extra variables exported by the environment activation hook.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
}

impl DeployConfig {
    /// Load deployment configuration from file.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file cannot be read.
    /// - Return [`ConfigError::Deserialize`] if file is not valid.
    /// - Return [`ConfigError::ShellExpansion`] if a path cannot be expanded.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        read_to_string(path.as_ref())
            .map_err(|err| ConfigError::Read {
                source: err,
                path: path.as_ref().to_path_buf(),
            })?
            .parse()
    }

    /// SSH host to connect to for target.
    ///
    /// Falls back to the site URL itself when no override is configured.
    pub fn host_for(&self, target: Target, site_url: &str) -> String {
        self.server
            .hosts
            .get(target.name())
            .cloned()
            .unwrap_or_else(|| site_url.to_string())
    }
}

impl FromStr for DeployConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: DeployConfig = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every local path.
        config.site.checkout = expand(&config.site.checkout)?;
        config.templates.dir = expand(&config.templates.dir)?;
        config.templates.build_dir = config
            .templates
            .build_dir
            .as_deref()
            .map(expand)
            .transpose()?;

        Ok(config)
    }
}

impl Display for DeployConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Project settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct SiteSettings {
    /// Base host name of the project, e.g., "example.com".
    pub name: String,

    /// Remote URL that the web server clones source code from.
    #[serde(default)]
    pub repository: String,

    /// Local working copy whose checked out commit gets deployed.
    #[serde(default = "default_checkout")]
    pub checkout: PathBuf,
}

/// Web server settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    /// SSH login user.
    pub user: String,

    /// SSH port.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Root folder of every site on the web server.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Linux group that owns site files.
    #[serde(default = "default_group")]
    pub group: String,

    /// SSH host overrides keyed by target name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hosts: BTreeMap<String, String>,
}

/// External program settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ToolSettings {
    /// Program that creates a virtual environment at a given path.
    #[serde(default = "default_venv_command")]
    pub venv_command: String,

    /// Database superuser.
    #[serde(default = "default_postgres_user")]
    pub postgres_user: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            venv_command: default_venv_command(),
            postgres_user: default_postgres_user(),
        }
    }
}

/// Service template settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct TemplateSettings {
    /// Folder with one sub folder per service holding its template.
    #[serde(default = "default_template_dir")]
    pub dir: PathBuf,

    /// Folder to render configuration files into before upload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_dir: Option<PathBuf>,
}

impl TemplateSettings {
    /// Local folder that rendered files are written under.
    pub fn build_root(&self) -> &Path {
        self.build_dir.as_deref().unwrap_or(&self.dir)
    }

    /// Local folder that rendered files of a service are written to.
    pub fn output_dir(&self, service: &str) -> PathBuf {
        self.build_root().join(service)
    }
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            dir: default_template_dir(),
            build_dir: None,
        }
    }
}

fn default_checkout() -> PathBuf {
    PathBuf::from(".")
}

fn default_root() -> PathBuf {
    PathBuf::from("/srv")
}

fn default_group() -> String {
    "www".into()
}

fn default_venv_command() -> String {
    "pyvenv".into()
}

fn default_postgres_user() -> String {
    "postgres".into()
}

fn default_template_dir() -> PathBuf {
    PathBuf::from("deployment_tools")
}

fn expand(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read configuration file at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
