// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Server provisioning steps.
//!
//! Each step here is safe to re-run: it probes for the state it is about to
//! create and skips itself when that state already holds. The exceptions are
//! dependency installation, which always re-runs so that updates pick up new
//! packages, and [`drop_database`], which is destructive by nature.

use crate::{
    postactivate::ProjectSettings,
    remote::{quote, Remote, RemoteCommand, RemoteError},
    session::Session,
    site::Folder,
};

use std::path::Path;
use tracing::{info, instrument, warn};

/// Ensure every folder of site layout exists with correct group ownership.
///
/// Ownership fix is best effort.
///
/// # Errors
///
/// - Return [`RemoteError::CommandFailed`] if folders cannot be created.
#[instrument(skip(session), level = "debug")]
pub fn ensure_folders<R: Remote>(session: &mut Session<R>) -> Result<()> {
    let paths = session
        .folders()
        .iter()
        .map(|(_, path)| quote(path.to_string_lossy().as_ref()))
        .collect::<Vec<_>>()
        .join(" ");
    session.run(RemoteCommand::new(format!("mkdir -p {paths}")))?;

    fix_permissions(session)
}

/// Give site group recursive ownership of site folder.
///
/// # Errors
///
/// - Return [`RemoteError::Spawn`] if the remote cannot be reached.
pub fn fix_permissions<R: Remote>(session: &mut Session<R>) -> Result<()> {
    let command = RemoteCommand::new(format!(
        "chown -R :{} {}",
        session.group(),
        quote(session.folder(Folder::Site).to_string_lossy().as_ref())
    ))
    .sudo();
    session.run_best_effort(command)
}

/// Create Linux user that runs the site, unless it already exists.
///
/// # Errors
///
/// - Return [`RemoteError::CommandFailed`] if group or user cannot be created.
#[instrument(skip(session), level = "debug")]
pub fn create_linux_user<R: Remote>(session: &mut Session<R>) -> Result<()> {
    let user = session.user();
    if session.probe(RemoteCommand::new(format!("id {user}")))? {
        info!("linux user {user} already exists");
        return Ok(());
    }

    let group = session.group().to_string();
    session.run(RemoteCommand::new(format!("groupadd --force {group}")).sudo())?;
    session.run(
        RemoteCommand::new(format!(
            "useradd --shell /bin/bash -g {group} -M -c \"runs gunicorn for {}\" {user}",
            session.site()
        ))
        .sudo(),
    )?;

    Ok(())
}

/// Create database and its owning role, unless the database already exists.
///
/// The role password is always reset so it matches the activation hook.
///
/// # Errors
///
/// - Return [`RemoteError::CommandFailed`] if a database command fails.
#[instrument(skip(session, settings), level = "debug")]
pub fn create_database<R: Remote>(
    session: &mut Session<R>,
    settings: &ProjectSettings,
) -> Result<()> {
    let ProjectSettings {
        db_name,
        db_user,
        db_password,
        ..
    } = settings;

    let probe = session.postgres(format!(
        "psql -tAc \"SELECT 1 FROM pg_database WHERE datname = '{db_name}'\""
    ));
    let exists = session.run(probe)? == "1";

    if exists {
        info!("database {db_name} already exists");
    } else {
        for sql in [
            format!("DROP ROLE IF EXISTS {db_user};"),
            format!("CREATE ROLE {db_user} NOSUPERUSER CREATEDB NOCREATEROLE LOGIN;"),
            format!("CREATE DATABASE {db_name} WITH OWNER={db_user} ENCODING='utf-8';"),
        ] {
            let command = session.postgres(format!("psql -c \"{sql}\""));
            session.run(command)?;
        }
    }

    let command = session
        .postgres(format!(
            "psql -c \"ALTER ROLE {db_user} WITH PASSWORD '{db_password}';\""
        ))
        .secret(db_password.as_str());
    session.run(command)?;

    Ok(())
}

/// Dump database to a dated backup file, then drop database and its role.
///
/// # Errors
///
/// - Return [`RemoteError::CommandFailed`] if any step fails. Later steps are
///   not attempted, so a failed backup never drops anything.
#[instrument(skip(session), level = "debug")]
pub fn drop_database<R: Remote>(session: &mut Session<R>) -> Result<()> {
    let db_name = session.site().db_name();
    let backup = format!(
        "{}/{db_name}_$(date +\"%Y-%m-%d\").sql",
        session.folder(Folder::Site).display()
    );

    let commands = [
        session.postgres(format!("pg_dump -Fc {db_name} > {backup}")),
        session.postgres(format!("psql -c \"DROP DATABASE {db_name};\"")),
        session.postgres(format!("psql -c \"DROP ROLE {db_name};\"")),
    ];
    for command in commands {
        session.run(command)?;
    }
    warn!("dropped database {db_name}, backup at {backup}");

    Ok(())
}

/// Create virtual environment of site, unless its interpreter already exists.
///
/// # Errors
///
/// - Return [`RemoteError::CommandFailed`] if environment creation fails.
#[instrument(skip(session), level = "debug")]
pub fn create_virtualenv<R: Remote>(session: &mut Session<R>) -> Result<()> {
    let venv = session.folder(Folder::Venv).to_path_buf();
    if session.exists(&venv.join("bin").join("python"))? {
        info!("virtual environment {:?} already exists", venv.display());
        return Ok(());
    }

    let venvs = session.folder(Folder::Venvs).to_path_buf();
    let source = session.folder(Folder::Source).to_path_buf();
    let venv_command = session.config().tools.venv_command.clone();
    for line in [
        format!("{venv_command} {}", venv.display()),
        format!("ln -fs {} {}", venv.display(), venvs.display()),
        format!("echo {} > {}/.project", source.display(), venv.display()),
    ] {
        session.run(RemoteCommand::new(line))?;
    }

    Ok(())
}

/// Install Python requirements of site into its virtual environment.
///
/// # Errors
///
/// - Return [`RemoteError::CommandFailed`] if installation fails.
#[instrument(skip(session), level = "debug")]
pub fn update_virtualenv<R: Remote>(session: &mut Session<R>) -> Result<()> {
    let line = format!(
        "{}/bin/pip install -vr {}/requirements.txt",
        session.folder(Folder::Venv).display(),
        session.folder(Folder::Source).display()
    );
    session.run(RemoteCommand::new(line))?;

    Ok(())
}

/// Hook activation script into virtual environment, and upload it.
///
/// # Errors
///
/// - Return [`RemoteError`] if hook cannot be installed.
#[instrument(skip(session), level = "debug")]
pub fn upload_postactivate<R: Remote>(session: &mut Session<R>, local: &Path) -> Result<()> {
    let hook = session.folder(Folder::Bin).join("postactivate");
    let activate = session.folder(Folder::Venv).join("bin").join("activate");
    session.append_once(&activate, format!("source {}", hook.display()).as_str())?;
    session.put(local, &hook, false)
}

/// Install front end dependencies next to source folder.
///
/// # Errors
///
/// - Return [`RemoteError::CommandFailed`] if installation fails.
#[instrument(skip(session), level = "debug")]
pub fn update_frontend<R: Remote>(session: &mut Session<R>) -> Result<()> {
    let site = session.folder(Folder::Site).to_path_buf();
    // INVARIANT: Keep node_modules out of the source checkout.
    for line in [
        "ln -sf source/package.json .",
        "ln -sf source/bower.json .",
        "npm install",
        "node_modules/.bin/bower install",
    ] {
        session.run(RemoteCommand::new(line).current_dir(&site))?;
    }

    Ok(())
}

/// Build front end assets for production.
///
/// # Errors
///
/// - Return [`RemoteError::CommandFailed`] if build fails.
#[instrument(skip(session), level = "debug")]
pub fn build_assets<R: Remote>(session: &mut Session<R>) -> Result<()> {
    let line = format!(
        "source {}/bin/activate && gulp production",
        session.folder(Folder::Venv).display()
    );
    let source = session.folder(Folder::Source).to_path_buf();
    session.run(RemoteCommand::new(line).current_dir(source))?;

    Ok(())
}

/// Friendly result alias :3
type Result<T, E = RemoteError> = std::result::Result<T, E>;
