// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Deployment workflows.
//!
//! A __workflow__ is a fixed sequence of provisioning, source sync, and
//! service control steps run against one session. Workflows are strictly
//! sequential and not resumable: the first failing step aborts the rest, and
//! no compensating rollback is attempted. Re-running a workflow after fixing
//! the cause of a failure is safe, because every step that creates state
//! checks for that state first.
//!
//! # Update Ordering
//!
//! Code and assets are prepared while the old release keeps serving. Services
//! are stopped right before static files are collected and the database is
//! migrated, and started again only after migrations succeed. The site never
//! serves new code against an unmigrated schema.

use crate::{
    postactivate::{local_path, Postactivate},
    provision,
    remote::{Remote, RemoteCommand, RemoteError},
    service::{self, ServiceError},
    session::Session,
    site::Folder,
    source::{sync_source, Checkout, Confirmer, SourceError},
};

use tracing::{info, instrument};

/// Runs deployment workflows for one session.
#[derive(Debug)]
pub struct Orchestrator<R, C, W>
where
    R: Remote,
    C: Confirmer,
    W: Checkout,
{
    session: Session<R>,
    confirmer: C,
    checkout: W,
}

impl<R, C, W> Orchestrator<R, C, W>
where
    R: Remote,
    C: Confirmer,
    W: Checkout,
{
    /// Construct new orchestrator.
    pub fn new(session: Session<R>, confirmer: C, checkout: W) -> Self {
        Self {
            session,
            confirmer,
            checkout,
        }
    }

    /// Give back the session.
    pub fn into_session(self) -> Session<R> {
        self.session
    }

    /// Provision a site from scratch, then update it.
    ///
    /// Creates the database, Linux user, folders, and virtual environment
    /// where missing, installs the activation hook, and installs service
    /// configuration without starting anything. The final [`update`] brings
    /// the site up.
    ///
    /// [`update`]: Orchestrator::update
    ///
    /// # Errors
    ///
    /// - Return [`WorkflowError`] if any step fails.
    #[instrument(skip(self), fields(site = %self.session.site()))]
    pub fn deploy(&mut self) -> Result<()> {
        info!("deploy {}", self.session.site());
        let hook = Postactivate::generate(
            self.session.site(),
            self.session.folders(),
            &self.session.config().environment,
        );
        let build_root = self.session.config().templates.build_root();
        let hook_path = local_path(build_root, self.session.site());
        hook.write_to(&hook_path).map_err(|err| WorkflowError::WriteHook {
            source: err,
            path: hook_path.clone(),
        })?;

        provision::create_database(&mut self.session, &hook.settings)?;
        provision::create_linux_user(&mut self.session)?;
        provision::ensure_folders(&mut self.session)?;
        provision::create_virtualenv(&mut self.session)?;
        provision::upload_postactivate(&mut self.session, &hook_path)?;
        service::deploy_configs(&mut self.session, true)?;

        self.update()
    }

    /// Bring site to the local revision.
    ///
    /// # Errors
    ///
    /// - Return [`WorkflowError`] if any step fails.
    #[instrument(skip(self), fields(site = %self.session.site()))]
    pub fn update(&mut self) -> Result<()> {
        info!("update {}", self.session.site());
        let revision = self.checkout.inspect()?;
        sync_source(&mut self.session, &revision, &mut self.confirmer)?;
        provision::update_virtualenv(&mut self.session)?;
        provision::update_frontend(&mut self.session)?;
        provision::build_assets(&mut self.session)?;

        service::stop_all(&mut self.session)?;
        let collectstatic = self.session.django_admin(["collectstatic", "--noinput"]);
        self.session.run(collectstatic)?;
        let migrate = self.session.django_admin(["migrate", "--noinput"]);
        self.session.run(migrate)?;
        service::start_all(&mut self.session)?;

        Ok(())
    }

    /// Regenerate, upload, and install service configuration.
    ///
    /// # Errors
    ///
    /// - Return [`WorkflowError`] if any step fails.
    #[instrument(skip(self), fields(site = %self.session.site()))]
    pub fn update_config(&mut self) -> Result<()> {
        service::stop_all(&mut self.session)?;
        service::deploy_configs(&mut self.session, true)?;
        service::start_all(&mut self.session)?;

        Ok(())
    }

    /// Render service configuration locally without uploading it.
    ///
    /// # Errors
    ///
    /// - Return [`WorkflowError::Service`] if a template cannot be rendered.
    #[instrument(skip(self), fields(site = %self.session.site()))]
    pub fn make_configs(&mut self) -> Result<()> {
        service::deploy_configs(&mut self.session, false)?;

        Ok(())
    }

    /// Restart the reverse proxy and process supervisor daemons.
    ///
    /// # Errors
    ///
    /// - Return [`WorkflowError`] if any step fails.
    #[instrument(skip(self), fields(site = %self.session.site()))]
    pub fn reboot(&mut self) -> Result<()> {
        service::stop_all(&mut self.session)?;
        self.session
            .run(RemoteCommand::new("service nginx restart").sudo())?;
        self.session
            .run(RemoteCommand::new("service supervisor restart").sudo())?;
        service::start_all(&mut self.session)?;

        Ok(())
    }

    /// Start serving site.
    ///
    /// # Errors
    ///
    /// - Return [`WorkflowError::Service`] if a start command fails.
    pub fn start(&mut self) -> Result<()> {
        Ok(service::start_all(&mut self.session)?)
    }

    /// Stop serving site.
    ///
    /// # Errors
    ///
    /// - Return [`WorkflowError::Service`] if the remote cannot be reached.
    pub fn stop(&mut self) -> Result<()> {
        Ok(service::stop_all(&mut self.session)?)
    }

    /// Back up and drop site database and its role.
    ///
    /// # Errors
    ///
    /// - Return [`WorkflowError::Remote`] if any step fails.
    #[instrument(skip(self), fields(site = %self.session.site()))]
    pub fn dropdb(&mut self) -> Result<()> {
        Ok(provision::drop_database(&mut self.session)?)
    }

    /// Reset database and repopulate it with dummy data.
    ///
    /// # Errors
    ///
    /// - Return [`WorkflowError`] if any step fails.
    #[instrument(skip(self), fields(site = %self.session.site()))]
    pub fn resetdb(&mut self) -> Result<()> {
        service::stop_all(&mut self.session)?;
        let line = format!(
            "source {}/bin/activate && reset-database.sh",
            self.session.folder(Folder::Venv).display()
        );
        self.session.run(RemoteCommand::new(line))?;
        service::start_all(&mut self.session)?;

        Ok(())
    }

    /// Re-create folder layout and fix group ownership.
    ///
    /// # Errors
    ///
    /// - Return [`WorkflowError::Remote`] if folders cannot be created.
    pub fn fix_permissions(&mut self) -> Result<()> {
        Ok(provision::ensure_folders(&mut self.session)?)
    }

    /// Install front end dependencies only.
    ///
    /// # Errors
    ///
    /// - Return [`WorkflowError::Remote`] if installation fails.
    pub fn frontend(&mut self) -> Result<()> {
        Ok(provision::update_frontend(&mut self.session)?)
    }

    /// Run arbitrary `django-admin` command inside site's environment.
    ///
    /// # Errors
    ///
    /// - Return [`WorkflowError::Remote`] if command fails.
    pub fn admin(&mut self, args: impl IntoIterator<Item = impl AsRef<str>>) -> Result<String> {
        let command = self.session.django_admin(args);
        Ok(self.session.run(command)?)
    }
}

/// Workflow error types.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Activation hook cannot be written locally.
    #[error("failed to write activation hook to {:?}", path.display())]
    WriteHook {
        #[source]
        source: std::io::Error,
        path: std::path::PathBuf,
    },

    /// Source synchronization fails.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Service control fails.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Remote command fails.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Friendly result alias :3
type Result<T, E = WorkflowError> = std::result::Result<T, E>;
