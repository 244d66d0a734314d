// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Remote execution through OpenSSH.
//!
//! Uses the system `ssh` and `scp` binaries so that the user's existing SSH
//! configuration, agent, and known hosts apply without any extra setup.

use crate::remote::{quote, Output, Remote, RemoteCommand, RemoteError, Result};

use indicatif::{ProgressBar, ProgressStyle};
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    time::Duration,
};
use tracing::{debug, instrument, warn};

/// Remote host reached through OpenSSH.
#[derive(Debug, Clone)]
pub struct SshRemote {
    destination: String,
    port: Option<u16>,
}

impl SshRemote {
    /// Construct new SSH remote for `user@host` destination.
    pub fn new(user: &str, host: &str, port: Option<u16>) -> Self {
        Self {
            destination: format!("{user}@{host}"),
            port,
        }
    }

    /// SSH destination of remote.
    pub fn destination(&self) -> &str {
        self.destination.as_str()
    }

    fn ssh_args(&self, line: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-o".into(), "BatchMode=yes".into()];
        if let Some(port) = self.port {
            args.push("-p".into());
            args.push(port.to_string().into());
        }
        args.push(self.destination.clone().into());
        args.push(format!("bash -c {}", quote(line)).into());

        args
    }

    fn scp_args(&self, local: &Path, remote: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-q".into(), "-o".into(), "BatchMode=yes".into()];
        if let Some(port) = self.port {
            args.push("-P".into());
            args.push(port.to_string().into());
        }
        args.push(local.as_os_str().to_owned());
        args.push(format!("{}:{}", self.destination, remote.display()).into());

        args
    }

    fn copy(&self, local: &Path, remote: &Path) -> Result<()> {
        let bar = spinner(format!("upload {}", remote.display()).as_str());
        let output = Command::new("scp")
            .args(self.scp_args(local, remote))
            .stdin(Stdio::null())
            .output();
        bar.finish_and_clear();

        let output = output.map_err(|err| RemoteError::Spawn {
            source: err,
            program: "scp".into(),
        })?;
        if !output.status.success() {
            return Err(RemoteError::Upload {
                local: local.to_path_buf(),
                remote: remote.to_path_buf(),
                message: String::from_utf8_lossy(output.stderr.as_slice()).into_owned(),
            });
        }

        Ok(())
    }
}

impl Remote for SshRemote {
    #[instrument(skip(self, command), level = "debug")]
    fn execute(&mut self, command: &RemoteCommand) -> Result<Output> {
        let line = command.to_shell();
        debug!("[{}] run: {command}", self.destination);

        let bar = spinner(command.to_string().as_str());
        let output = Command::new("ssh")
            .args(self.ssh_args(line.as_str()))
            .stdin(Stdio::null())
            .output();
        bar.finish_and_clear();

        let output = output.map_err(|err| RemoteError::Spawn {
            source: err,
            program: "ssh".into(),
        })?;
        let output = Output {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(output.stdout.as_slice()).into_owned(),
            stderr: String::from_utf8_lossy(output.stderr.as_slice()).into_owned(),
        };
        debug!("[{}] exit {:?}", self.destination, output.status);

        Ok(output)
    }

    #[instrument(skip(self), level = "debug")]
    fn upload(&mut self, local: &Path, remote: &Path, use_sudo: bool) -> Result<()> {
        if !use_sudo {
            return self.copy(local, remote);
        }

        // INVARIANT: Privileged targets are staged in a fresh temporary file, then moved by root.
        let output = self.execute(&RemoteCommand::new(STAGE))?;
        let staging = PathBuf::from(output.stdout.trim());
        if !output.is_success() || staging.as_os_str().is_empty() {
            return Err(RemoteError::Upload {
                local: local.to_path_buf(),
                remote: remote.to_path_buf(),
                message: format!("cannot create staging file: {}", output.combined()),
            });
        }

        if let Err(error) = self.copy(local, &staging) {
            let cleanup = RemoteCommand::new(format!(
                "rm -f {}",
                quote(staging.to_string_lossy().as_ref())
            ));
            if let Err(cleanup) = self.execute(&cleanup) {
                warn!("cannot remove staging file {:?}: {cleanup}", staging.display());
            }
            return Err(error);
        }

        let output = self.execute(&promote(&staging, remote))?;
        if !output.is_success() {
            return Err(RemoteError::Upload {
                local: local.to_path_buf(),
                remote: remote.to_path_buf(),
                message: output.combined(),
            });
        }

        Ok(())
    }
}

const STAGE: &str = "mktemp /tmp/siteops.XXXXXXXXXX";

/// Move staged file into place as root, readable by everyone.
fn promote(staging: &Path, remote: &Path) -> RemoteCommand {
    let staging = quote(staging.to_string_lossy().as_ref());
    let remote = quote(remote.to_string_lossy().as_ref());
    RemoteCommand::new(format!(
        "mv -f {staging} {remote} && chown root:root {remote} && chmod 644 {remote}"
    ))
    .sudo()
}

fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    let template = "{elapsed_precise:.green}  {spinner:.yellow}  {wide_msg}";
    if let Ok(style) = ProgressStyle::with_template(template) {
        bar.set_style(style);
    }
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));

    bar
}
