// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Site identity and folder layout.
//!
//! A __site identity__ is the host-qualified name of one deployment target,
//! e.g., `staging.example.com`. Every other name that siteops needs for that
//! target is derived from it: the Linux user that runs the application, the
//! database and its owning role, the virtual environment, and the folder
//! layout on the web server. None of these derived names carry state of their
//! own, so two sessions built from the same identity always agree.

use clap::ValueEnum;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};

/// Environment selector.
///
/// Picks which flavour of the base host name to deploy to.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
pub enum Target {
    /// Local virtual machine.
    #[default]
    Vagrant,

    /// Developer workstation.
    Local,

    /// Shared development server.
    Dev,

    /// Staging server.
    Staging,

    /// Production server.
    Prod,
}

impl Target {
    /// Name of target as written on the command line and in configuration.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Vagrant => "vagrant",
            Self::Local => "local",
            Self::Dev => "dev",
            Self::Staging => "staging",
            Self::Prod => "prod",
        }
    }

    /// Host-qualified site URL of target for given base host name.
    ///
    /// Production is served from the base host name itself, everything else
    /// from a subdomain named after the target.
    pub fn site_url(&self, base: &str) -> String {
        match self {
            Self::Prod => base.to_string(),
            _ => format!("{}.{base}", self.name()),
        }
    }
}

impl Display for Target {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.name())
    }
}

/// Canonical host-qualified name of one deployment target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiteIdentity {
    url: String,
}

impl SiteIdentity {
    /// Construct new site identity.
    ///
    /// # Errors
    ///
    /// - Return [`SiteError::InvalidUrl`] if the name has no dot, has an empty
    ///   label, or contains anything but ASCII letters, digits, dots, and
    ///   hyphens.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        // INVARIANT: Derived names reach root shell commands unquoted.
        let valid = url.contains('.')
            && url.split('.').all(|label| {
                !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            });

        if !valid {
            return Err(SiteError::InvalidUrl(url));
        }

        Ok(Self { url })
    }

    /// Construct site identity of target for given base host name.
    ///
    /// # Errors
    ///
    /// - Return [`SiteError::InvalidUrl`] if resulting name is invalid.
    pub fn for_target(target: Target, base: &str) -> Result<Self> {
        Self::new(target.site_url(base))
    }

    /// Host-qualified name of the site.
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Linux user that owns and runs the site.
    pub fn user_name(&self) -> String {
        self.url.replace('.', "_")
    }

    /// Name of the site's database, also used for its owning role.
    pub fn db_name(&self) -> String {
        self.user_name()
    }

    /// Name of the site's virtual environment.
    pub fn venv_name(&self) -> &str {
        self.url.as_str()
    }

    /// Check if site is a development target.
    ///
    /// Development targets skip the unpushed changes confirmation during
    /// source sync.
    pub fn is_development(&self) -> bool {
        self.url
            .split('.')
            .any(|label| matches!(label, "vagrant" | "local"))
    }
}

impl Display for SiteIdentity {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.url())
    }
}

/// Logical role of a folder in a site's layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Folder {
    /// Project root folder.
    Site,

    /// Application source code checkout.
    Source,

    /// Shell scripts.
    Bin,

    /// Static files served by the reverse proxy.
    Static,

    /// User uploaded files.
    Media,

    /// Python virtual environment.
    Venv,

    /// Log files.
    Logs,

    /// Shared folder with symlinks to every virtual environment.
    Venvs,
}

impl Folder {
    /// Every role in layout order.
    pub const ALL: [Folder; 8] = [
        Folder::Site,
        Folder::Source,
        Folder::Bin,
        Folder::Static,
        Folder::Media,
        Folder::Venv,
        Folder::Logs,
        Folder::Venvs,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Absolute folder paths of one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderLayout {
    paths: [PathBuf; 8],
}

impl FolderLayout {
    /// Compute folder layout of site.
    ///
    /// Site folders live under `<webserver_root>/<url>`, except for the
    /// shared virtual environment registry that lives in the home directory
    /// of the remote login user.
    pub fn new(site: &SiteIdentity, webserver_root: impl AsRef<Path>, remote_user: &str) -> Self {
        let site_folder = webserver_root.as_ref().join(site.url());
        let paths = Folder::ALL.map(|folder| match folder {
            Folder::Site => site_folder.clone(),
            Folder::Source => site_folder.join("source"),
            Folder::Bin => site_folder.join("bin"),
            Folder::Static => site_folder.join("static"),
            Folder::Media => site_folder.join("static").join("media"),
            Folder::Venv => site_folder.join("venv").join(site.venv_name()),
            Folder::Logs => site_folder.join("logs"),
            Folder::Venvs => PathBuf::from("/home")
                .join(remote_user)
                .join(".virtualenvs"),
        });

        Self { paths }
    }

    /// Absolute path of folder role.
    pub fn get(&self, folder: Folder) -> &Path {
        self.paths[folder.index()].as_path()
    }

    /// Iterate through every folder in layout order.
    pub fn iter(&self) -> impl Iterator<Item = (Folder, &Path)> {
        Folder::ALL
            .into_iter()
            .map(move |folder| (folder, self.get(folder)))
    }
}

/// Site identity error types.
#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    /// Site URL cannot be used as a host-qualified name.
    #[error("invalid site url {0:?}")]
    InvalidUrl(String),
}

/// Friendly result alias :3
type Result<T, E = SiteError> = std::result::Result<T, E>;
