// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Environment activation hook.
//!
//! The web application reads its secrets and paths from environment
//! variables. Siteops generates a `postactivate` shell script that exports
//! them, and arranges for the virtual environment's `activate` script to
//! source it. The same database credentials are handed back to the caller so
//! that the database role can be given a matching password.

use crate::{
    remote::quote,
    site::{Folder, FolderLayout, SiteIdentity},
};

use rand::RngCore;
use std::{
    collections::BTreeMap,
    fs::write,
    path::{Path, PathBuf},
};

/// Database credentials of a site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSettings {
    /// Database name.
    pub db_name: String,

    /// Role that owns the database.
    pub db_user: String,

    /// Password of owning role.
    pub db_password: String,
}

/// Generated environment activation hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Postactivate {
    /// Shell script exporting the site's settings.
    pub script: String,

    /// Database credentials exported by the script.
    pub settings: ProjectSettings,
}

impl Postactivate {
    /// Generate hook for site with fresh secrets.
    pub fn generate(
        site: &SiteIdentity,
        folders: &FolderLayout,
        extra: &BTreeMap<String, String>,
    ) -> Self {
        Self::with_secrets(site, folders, extra, random_hex(32), random_hex(50))
    }

    /// Generate hook for site with given database password and secret key.
    pub fn with_secrets(
        site: &SiteIdentity,
        folders: &FolderLayout,
        extra: &BTreeMap<String, String>,
        db_password: String,
        secret_key: String,
    ) -> Self {
        let settings = ProjectSettings {
            db_name: site.db_name(),
            db_user: site.db_name(),
            db_password,
        };

        let mut vars: Vec<(&str, String)> = vec![
            ("SITE_URL", site.url().to_string()),
            ("ALLOWED_HOSTS", site.url().to_string()),
            ("SECRET_KEY", secret_key),
            ("DB_NAME", settings.db_name.clone()),
            ("DB_USER", settings.db_user.clone()),
            ("DB_PASSWORD", settings.db_password.clone()),
            ("SOURCE_FOLDER", path_string(folders.get(Folder::Source))),
            ("STATIC_ROOT", path_string(folders.get(Folder::Static))),
            ("MEDIA_ROOT", path_string(folders.get(Folder::Media))),
        ];
        vars.extend(extra.iter().map(|(key, value)| (key.as_str(), value.clone())));

        let mut script = String::from("#!/bin/bash\n");
        script.push_str(format!("# environment of {}, sourced by bin/activate\n", site).as_str());
        for (key, value) in vars {
            script.push_str(format!("export {key}={}\n", quote(&value)).as_str());
        }

        Self { script, settings }
    }

    /// Write hook script to local file.
    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            mkdirp::mkdirp(parent)?;
        }
        write(path, self.script.as_bytes())
    }
}

/// Local path that hook of site is written to before upload.
pub fn local_path(build_dir: &Path, site: &SiteIdentity) -> PathBuf {
    build_dir.join("postactivate").join(site.url())
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
