// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Deployment session.
//!
//! A __session__ binds one site identity to one remote connection for the
//! duration of a single command. Every workflow receives the session
//! explicitly, so nothing about the current target lives in global state.

use crate::{
    config::DeployConfig,
    remote::{quote, Output, Remote, RemoteCommand, RemoteError, Result},
    site::{Folder, FolderLayout, SiteIdentity},
};

use std::path::Path;
use tracing::{debug, info, warn};

/// Per-invocation binding of site identity, configuration, and remote.
#[derive(Debug)]
pub struct Session<R>
where
    R: Remote,
{
    site: SiteIdentity,
    config: DeployConfig,
    folders: FolderLayout,
    remote: R,
}

impl<R> Session<R>
where
    R: Remote,
{
    /// Construct new session.
    ///
    /// Computes the folder layout of the site once, so every step of the
    /// session agrees on where things live.
    pub fn new(site: SiteIdentity, config: DeployConfig, remote: R) -> Self {
        let folders = FolderLayout::new(&site, &config.server.root, &config.server.user);
        Self {
            site,
            config,
            folders,
            remote,
        }
    }

    /// Site being deployed.
    pub fn site(&self) -> &SiteIdentity {
        &self.site
    }

    /// Deployment configuration in effect.
    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    /// Folder layout of site.
    pub fn folders(&self) -> &FolderLayout {
        &self.folders
    }

    /// Absolute path of folder role.
    pub fn folder(&self, folder: Folder) -> &Path {
        self.folders.get(folder)
    }

    /// Linux user that owns the site.
    pub fn user(&self) -> String {
        self.site.user_name()
    }

    /// Linux group that owns the site.
    pub fn group(&self) -> &str {
        self.config.server.group.as_str()
    }

    /// Give back the remote connection.
    pub fn into_remote(self) -> R {
        self.remote
    }

    /// Run command, failing on non-zero exit status.
    ///
    /// # Errors
    ///
    /// - Return [`RemoteError::CommandFailed`] if command fails.
    /// - Return [`RemoteError::Spawn`] if command cannot be transported.
    pub fn run(&mut self, command: RemoteCommand) -> Result<String> {
        info!("run: {command}");
        let output = self.remote.execute(&command)?;
        if !output.is_success() {
            return Err(failed(&command, &output));
        }

        let stdout = output.stdout.trim_end_matches(['\r', '\n']).to_string();
        if !stdout.is_empty() {
            debug!("{stdout}");
        }

        Ok(stdout)
    }

    /// Run command whose failure is acceptable.
    ///
    /// Used for commands whose target state may already hold, e.g., stopping
    /// a service that is not running.
    ///
    /// # Errors
    ///
    /// - Return [`RemoteError::Spawn`] if command cannot be transported.
    pub fn run_best_effort(&mut self, command: RemoteCommand) -> Result<()> {
        info!("run (best effort): {command}");
        let output = self.remote.execute(&command)?;
        if !output.is_success() {
            warn!("{}", failed(&command, &output));
        }

        Ok(())
    }

    /// Run command as a yes or no question through its exit status.
    ///
    /// # Errors
    ///
    /// - Return [`RemoteError::Spawn`] if command cannot be transported.
    pub fn probe(&mut self, command: RemoteCommand) -> Result<bool> {
        debug!("probe: {command}");
        Ok(self.remote.execute(&command)?.is_success())
    }

    /// Check if path exists on remote host.
    pub fn exists(&mut self, path: &Path) -> Result<bool> {
        self.probe(RemoteCommand::new(format!(
            "test -e {}",
            quote(path.to_string_lossy().as_ref())
        )))
    }

    /// Upload local file to remote path.
    pub fn put(&mut self, local: &Path, remote: &Path, use_sudo: bool) -> Result<()> {
        info!("upload {:?} to {:?}", local.display(), remote.display());
        self.remote.upload(local, remote, use_sudo)
    }

    /// Append line to remote file unless file already contains that exact line.
    ///
    /// Returns `true` if the line was appended.
    pub fn append_once(&mut self, file: &Path, line: &str) -> Result<bool> {
        let file = quote(file.to_string_lossy().as_ref());
        let line = quote(line);
        if self.probe(RemoteCommand::new(format!("grep -qsxF {line} {file}")))? {
            debug!("{file} already contains {line}");
            return Ok(false);
        }

        self.run(RemoteCommand::new(format!("echo {line} >> {file}")))?;
        Ok(true)
    }

    /// Command that runs as the database superuser.
    pub fn postgres(&self, line: impl Into<String>) -> RemoteCommand {
        RemoteCommand::new(line).sudo_as(self.config.tools.postgres_user.as_str())
    }

    /// Command that runs `django-admin` inside the site's virtual environment.
    pub fn django_admin(&self, args: impl IntoIterator<Item = impl AsRef<str>>) -> RemoteCommand {
        let args = args
            .into_iter()
            .map(|arg| arg.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(" ");
        RemoteCommand::new(format!(
            "source {}/bin/activate && django-admin {args}",
            self.folder(Folder::Venv).display()
        ))
    }
}

fn failed(command: &RemoteCommand, output: &Output) -> RemoteError {
    RemoteError::CommandFailed {
        command: command.to_string(),
        status: output.status,
        output: output.combined(),
    }
}
