// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Service control.
//!
//! A site is served by three cooperating services: a shell wrapper that runs
//! the WSGI server, a supervisor program entry that keeps that wrapper alive,
//! and a reverse proxy virtual host that routes requests to it. Each service
//! is described by a [`ServiceDescriptor`] that says how to render, install,
//! start, and stop its configuration file.
//!
//! # Ordering
//!
//! Services are always visited in [`ServiceKind::ORDER`]. The process
//! supervisor has to know about the site before the reverse proxy starts
//! routing to it.

use crate::{
    remote::{Remote, RemoteCommand},
    session::Session,
    site::Folder,
    template::{render_if_stale, Placeholders, Rendered, TemplateError},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
};
use tracing::{info, instrument};

/// Kind of service backing a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ServiceKind {
    /// Shell wrapper that runs the WSGI server.
    Site,

    /// Process supervisor entry.
    Supervisor,

    /// Reverse proxy virtual host.
    Nginx,
}

impl ServiceKind {
    /// Dependency order of services.
    pub const ORDER: [ServiceKind; 3] = [
        ServiceKind::Site,
        ServiceKind::Supervisor,
        ServiceKind::Nginx,
    ];

    /// Name of service, also the name of its template folder.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Site => "site",
            Self::Supervisor => "supervisor",
            Self::Nginx => "nginx",
        }
    }
}

impl Display for ServiceKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.name())
    }
}

/// Description of how to manage one service's configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub kind: ServiceKind,

    /// Template to render configuration file from.
    pub template: PathBuf,

    /// Name of rendered configuration file.
    pub filename: String,

    /// Local folder that rendered file is written to.
    pub output_dir: PathBuf,

    /// Remote folder that rendered file is uploaded to.
    pub target_dir: PathBuf,

    /// Shell command that activates an uploaded file. `$FILENAME` holds its
    /// remote path.
    pub install: String,

    /// Shell command that starts serving the site.
    pub start: String,

    /// Shell command that stops serving the site.
    pub stop: String,
}

impl ServiceDescriptor {
    /// Describe service of session's site.
    pub fn new<R: Remote>(kind: ServiceKind, session: &Session<R>) -> Self {
        let url = session.site().url();
        let user = session.user();
        let templates = &session.config().templates;
        let template = templates.dir.join(kind.name()).join("template");
        let output_dir = templates.output_dir(kind.name());

        match kind {
            ServiceKind::Site => Self {
                kind,
                template,
                filename: format!("{user}.sh"),
                output_dir,
                target_dir: session.folder(Folder::Bin).to_path_buf(),
                install: format!("sudo chmod 774 $FILENAME && sudo chown {user} $FILENAME"),
                start: ":".into(),
                stop: ":".into(),
            },
            ServiceKind::Supervisor => Self {
                kind,
                template,
                filename: format!("{user}.conf"),
                output_dir,
                target_dir: PathBuf::from("/etc/supervisor/conf.d"),
                install: "sudo supervisorctl reread && sudo supervisorctl update".into(),
                start: format!("sudo supervisorctl start {url}:*"),
                stop: format!("sudo supervisorctl stop {url}:*"),
            },
            ServiceKind::Nginx => Self {
                kind,
                template,
                filename: url.to_string(),
                output_dir,
                target_dir: PathBuf::from("/etc/nginx/sites-available"),
                install: ":".into(),
                start: format!(
                    "sudo ln -sf /etc/nginx/sites-available/{url} /etc/nginx/sites-enabled/{url} \
                     && sudo nginx -s reload"
                ),
                stop: format!("sudo rm -f /etc/nginx/sites-enabled/{url} && sudo nginx -s reload"),
            },
        }
    }

    /// Describe every service of session's site in dependency order.
    pub fn all<R: Remote>(session: &Session<R>) -> Vec<Self> {
        ServiceKind::ORDER
            .into_iter()
            .map(|kind| Self::new(kind, session))
            .collect()
    }

    /// Local path of rendered configuration file.
    pub fn rendered(&self) -> PathBuf {
        self.output_dir.join(&self.filename)
    }

    /// Remote path of uploaded configuration file.
    pub fn destination(&self) -> PathBuf {
        self.target_dir.join(&self.filename)
    }
}

/// Start serving site through every service.
///
/// # Errors
///
/// - Return [`ServiceError::Remote`] if a start command fails.
#[instrument(skip(session), level = "debug")]
pub fn start_all<R: Remote>(session: &mut Session<R>) -> Result<()> {
    info!("start {}", session.site());
    for service in ServiceDescriptor::all(session) {
        session.run(RemoteCommand::new(service.start))?;
    }

    Ok(())
}

/// Stop serving site through every service.
///
/// Stop commands are best effort, since services may already be stopped.
///
/// # Errors
///
/// - Return [`ServiceError::Remote`] if the remote cannot be reached.
#[instrument(skip(session), level = "debug")]
pub fn stop_all<R: Remote>(session: &mut Session<R>) -> Result<()> {
    info!("stop {}", session.site());
    for service in ServiceDescriptor::all(session) {
        session.run_best_effort(RemoteCommand::new(service.stop))?;
    }

    Ok(())
}

/// Render configuration files of every service, optionally uploading and
/// installing them.
///
/// Every file is rendered before anything is uploaded, so that a missing
/// template aborts the whole operation before any service sees new
/// configuration.
///
/// # Errors
///
/// - Return [`ServiceError::Template`] if a template cannot be rendered.
/// - Return [`ServiceError::Remote`] if upload or install fails.
#[instrument(skip(session), level = "debug")]
pub fn deploy_configs<R: Remote>(session: &mut Session<R>, upload: bool) -> Result<()> {
    let values = Placeholders {
        site_url: session.site().url().to_string(),
        user: session.user(),
        group: session.group().to_string(),
    };

    let services = ServiceDescriptor::all(session);
    for service in &services {
        let outcome = render_if_stale(&service.template, &service.rendered(), &values)?;
        if outcome == Rendered::Kept {
            info!(
                "{} configuration {:?} is newer than its template, keeping it",
                service.kind,
                service.rendered().display()
            );
        }
    }

    if !upload {
        return Ok(());
    }

    for service in &services {
        let destination = service.destination();
        session.put(&service.rendered(), &destination, true)?;
        session.run(
            RemoteCommand::new(service.install.as_str())
                .env("FILENAME", destination.to_string_lossy()),
        )?;
    }

    Ok(())
}

/// Service control error types.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Configuration file cannot be rendered.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Remote command fails.
    #[error(transparent)]
    Remote(#[from] crate::remote::RemoteError),
}

/// Friendly result alias :3
type Result<T, E = ServiceError> = std::result::Result<T, E>;
