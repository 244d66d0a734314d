// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine where the deployment configuration file lives when the user does
//! not point at one explicitly.

use std::path::{Path, PathBuf};

/// Name of deployment configuration file.
pub const CONFIG_FILE_NAME: &str = "siteops.toml";

/// Determine default absolute path to deployment configuration file.
///
/// Prefers `siteops.toml` in the current working directory so that the
/// configuration can be committed next to the project it deploys. Falls back
/// to `$XDG_CONFIG_HOME/siteops/siteops.toml`. Does not check if the fallback
/// path actually exists.
///
/// # Errors
///
/// - Return [`NoConfigDir`] if user configuration directory cannot be
///   determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_config_file() -> Result<PathBuf> {
    let local = Path::new(CONFIG_FILE_NAME);
    if local.is_file() {
        return Ok(local.to_path_buf());
    }

    dirs::config_dir()
        .map(|path| path.join("siteops").join(CONFIG_FILE_NAME))
        .ok_or(NoConfigDir)
}

/// No way to determine user's configuration directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's configuration directory")]
pub struct NoConfigDir;

/// Friendly result alias :3
pub type Result<T, E = NoConfigDir> = std::result::Result<T, E>;
