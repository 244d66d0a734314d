// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Remote command execution.
//!
//! Everything siteops does to a web server boils down to two primitives:
//! running a shell command, and uploading a file. The [`Remote`] trait models
//! exactly these two primitives so that workflows can be driven against a
//! real server through [`ssh::SshRemote`], or against a recorder in tests.
//!
//! # Command Rendering
//!
//! A [`RemoteCommand`] is rendered into a single POSIX shell line. The working
//! directory and exported variables are applied by the outer shell, and
//! privileged commands are wrapped into `sudo bash -c '<line>'`. Every value
//! that ends up between single quotes is escaped, so a rendered line can
//! safely be nested inside another `bash -c` by the transport.

pub mod ssh;

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};

/// Execute commands and upload files on a remote host.
pub trait Remote {
    /// Execute command on remote host.
    ///
    /// Completes once the command has exited. A non-zero exit status is not
    /// an error at this level, it is reported through [`Output::status`].
    ///
    /// # Errors
    ///
    /// - Return [`RemoteError::Spawn`] if the command cannot be transported.
    fn execute(&mut self, command: &RemoteCommand) -> Result<Output>;

    /// Upload local file to path on remote host.
    ///
    /// # Errors
    ///
    /// - Return [`RemoteError::Upload`] if the upload fails.
    fn upload(&mut self, local: &Path, remote: &Path, use_sudo: bool) -> Result<()>;
}

impl<R: Remote + ?Sized> Remote for &mut R {
    fn execute(&mut self, command: &RemoteCommand) -> Result<Output> {
        (**self).execute(command)
    }

    fn upload(&mut self, local: &Path, remote: &Path, use_sudo: bool) -> Result<()> {
        (**self).upload(local, remote, use_sudo)
    }
}

/// Captured result of a remote command.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Output {
    /// Exit status, [`None`] if the command was killed by a signal.
    pub status: Option<i32>,

    /// Captured standard output.
    pub stdout: String,

    /// Captured standard error.
    pub stderr: String,
}

impl Output {
    /// Construct output of a successful command.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Construct output of a failed command.
    pub fn failure(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Check if command exited successfully.
    pub fn is_success(&self) -> bool {
        self.status == Some(0)
    }

    /// Both output streams joined together, trailing newlines chomped.
    pub fn combined(&self) -> String {
        let mut message = String::new();
        if !self.stdout.is_empty() {
            message.push_str(format!("stdout: {}", self.stdout).as_str());
        }

        if !self.stderr.is_empty() {
            if !message.is_empty() && !message.ends_with('\n') {
                message.push('\n');
            }
            message.push_str(format!("stderr: {}", self.stderr).as_str());
        }

        message.trim_end_matches(['\r', '\n']).to_string()
    }
}

/// Privilege that a remote command runs with.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
enum Privilege {
    /// Login user of the connection.
    #[default]
    User,

    /// Superuser through sudo.
    Root,

    /// Named user through sudo.
    As(String),
}

/// Shell command to run on a remote host.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    line: String,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
    privilege: Privilege,
    secrets: Vec<String>,
}

impl RemoteCommand {
    /// Construct new remote command from shell line.
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            ..Default::default()
        }
    }

    /// Run command from working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Export variable before running command.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Run command as superuser.
    pub fn sudo(mut self) -> Self {
        self.privilege = Privilege::Root;
        self
    }

    /// Run command as named user.
    pub fn sudo_as(mut self, user: impl Into<String>) -> Self {
        self.privilege = Privilege::As(user.into());
        self
    }

    /// Mark value as secret, masking it wherever command is displayed.
    ///
    /// Only [`to_shell`] carries the value. Logs and errors use [`Display`].
    ///
    /// [`to_shell`]: RemoteCommand::to_shell
    pub fn secret(mut self, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.secrets.push(value);
        }
        self
    }

    /// Render command into one shell line.
    pub fn to_shell(&self) -> String {
        let mut parts = Vec::new();
        if let Some(cwd) = &self.cwd {
            parts.push(format!("cd {}", quote(cwd.to_string_lossy().as_ref())));
        }

        for (key, value) in &self.env {
            parts.push(format!("export {key}={}", quote(value)));
        }

        parts.push(match &self.privilege {
            Privilege::User => self.line.clone(),
            Privilege::Root => format!("sudo bash -c {}", quote(&self.line)),
            Privilege::As(user) => {
                format!("sudo -H -u {user} bash -c {}", quote(&self.line))
            }
        });

        parts.join(" && ")
    }
}

impl Display for RemoteCommand {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let mut shown = self.to_shell();
        for secret in &self.secrets {
            shown = shown.replace(secret.as_str(), "********");
        }
        fmt.write_str(shown.as_str())
    }
}

/// Quote a value for safe use in a POSIX shell line.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Remote execution error types.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Transport program could not be started.
    #[error("failed to spawn {program:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        program: String,
    },

    /// Remote command exited with non-zero status.
    #[error("command {command:?} failed with status {status:?}:\n{output}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
        output: String,
    },

    /// File could not be uploaded.
    #[error("failed to upload {:?} to {:?}: {message}", local.display(), remote.display())]
    Upload {
        local: PathBuf,
        remote: PathBuf,
        message: String,
    },
}

/// Friendly result alias :3
pub type Result<T, E = RemoteError> = std::result::Result<T, E>;
