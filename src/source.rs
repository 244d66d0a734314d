// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Source synchronization.
//!
//! Deployments are reproducible from a known local commit. The web server's
//! clone is always hard reset to whatever commit is checked out in the local
//! working copy, never to whatever happens to be on a remote branch. Because
//! of that, deploying with uncommitted or unpushed local changes is almost
//! always a mistake: the server cannot fetch a commit that only exists
//! locally, and uncommitted edits are not deployed at all. The user is asked
//! to confirm before any remote state is touched in that case.

use crate::{
    remote::{quote, Remote, RemoteCommand, RemoteError},
    session::Session,
    site::Folder,
};

use git2::{BranchType, Repository, StatusOptions};
use inquire::Confirm;
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

/// State of the local working copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRevision {
    /// Commit id currently checked out.
    pub commit: String,

    /// Working copy has uncommitted or untracked changes.
    pub dirty: bool,

    /// Number of commits ahead of the upstream branch.
    pub unpushed: usize,
}

impl LocalRevision {
    /// Check if local working copy has anything not yet on the remote.
    pub fn has_local_changes(&self) -> bool {
        self.dirty || self.unpushed > 0
    }
}

/// Source of the local revision to deploy.
pub trait Checkout {
    /// Inspect local working copy.
    ///
    /// # Errors
    ///
    /// - Return [`SourceError::Git2`] if the working copy cannot be read.
    fn inspect(&self) -> Result<LocalRevision>;
}

impl Checkout for LocalRevision {
    fn inspect(&self) -> Result<LocalRevision> {
        Ok(self.clone())
    }
}

/// Local Git working copy inspected through libgit2.
#[derive(Debug, Clone)]
pub struct WorkingCopy {
    path: PathBuf,
}

impl WorkingCopy {
    /// Construct new working copy handle.
    ///
    /// Repository is only discovered when inspected, so commands that never
    /// sync source do not require one.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Checkout for WorkingCopy {
    #[instrument(skip(self), level = "debug")]
    fn inspect(&self) -> Result<LocalRevision> {
        let repository = Repository::discover(&self.path)?;
        let head = repository.head()?;
        let commit = head.peel_to_commit()?.id();

        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .include_ignored(false)
            .exclude_submodules(true);
        let dirty = !repository.statuses(Some(&mut opts))?.is_empty();

        // INVARIANT: Only count unpushed commits against a configured upstream.
        let mut unpushed = 0;
        if head.is_branch() {
            if let Some(name) = head.shorthand() {
                let branch = repository.find_branch(name, BranchType::Local)?;
                match branch.upstream() {
                    Ok(upstream) => {
                        if let Some(upstream) = upstream.get().target() {
                            unpushed = repository.graph_ahead_behind(commit, upstream)?.0;
                        }
                    }
                    Err(_) => debug!("branch {name} has no upstream"),
                }
            }
        }

        let revision = LocalRevision {
            commit: commit.to_string(),
            dirty,
            unpushed,
        };
        debug!("local revision {revision:?}");

        Ok(revision)
    }
}

/// Ask the user a yes or no question.
pub trait Confirmer {
    /// Ask for confirmation, defaulting to no.
    ///
    /// # Errors
    ///
    /// - Return [`SourceError::Prompt`] if the question cannot be asked.
    fn confirm(&mut self, message: &str) -> Result<bool>;
}

impl<C: Confirmer + ?Sized> Confirmer for &mut C {
    fn confirm(&mut self, message: &str) -> Result<bool> {
        (**self).confirm(message)
    }
}

/// Confirmation through an interactive terminal prompt.
#[derive(Debug, Default, Clone, Copy)]
pub struct InquireConfirmer;

impl Confirmer for InquireConfirmer {
    fn confirm(&mut self, message: &str) -> Result<bool> {
        Ok(Confirm::new(message).with_default(false).prompt()?)
    }
}

/// Sync site's source folder to the local revision.
///
/// # Errors
///
/// - Return [`SourceError::Declined`] if user declines to deploy local
///   changes. No remote command has been issued at that point.
/// - Return [`SourceError::NoRepository`] if a clone is needed, but no
///   repository URL is configured.
/// - Return [`SourceError::Remote`] if a remote command fails.
#[instrument(skip(session, revision, confirmer), level = "debug")]
pub fn sync_source<R, C>(
    session: &mut Session<R>,
    revision: &LocalRevision,
    confirmer: &mut C,
) -> Result<()>
where
    R: Remote,
    C: Confirmer,
{
    if !session.site().is_development() && revision.has_local_changes() {
        warn!(
            "local working copy has {} and {} unpushed commit(s)",
            if revision.dirty { "uncommitted changes" } else { "no uncommitted changes" },
            revision.unpushed
        );
        let accepted = confirmer.confirm(
            "There are changes in the local repository that have not been pushed.\n\
             Do you want to continue deploying to the server?",
        )?;
        if !accepted {
            return Err(SourceError::Declined);
        }
    }

    let source = session.folder(Folder::Source).to_path_buf();
    if !session.exists(&source.join(".git"))? {
        let url = session.config().site.repository.clone();
        if url.trim().is_empty() {
            return Err(SourceError::NoRepository);
        }

        info!("clone {url} into {:?}", source.display());
        session.run(RemoteCommand::new(format!(
            "git clone {} {}",
            quote(&url),
            quote(source.to_string_lossy().as_ref())
        )))?;
    }

    info!("reset {:?} to {}", source.display(), revision.commit);
    session.run(
        RemoteCommand::new(format!("git fetch && git reset --hard {}", revision.commit))
            .current_dir(source),
    )?;

    Ok(())
}

/// Source synchronization error types.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// User declined to deploy with local changes.
    #[error("deployment aborted, please commit and push local changes")]
    Declined,

    /// Clone is needed, but no repository URL is configured.
    #[error("no repository url configured to clone source from")]
    NoRepository,

    /// Confirmation prompt failed.
    #[error(transparent)]
    Prompt(#[from] inquire::InquireError),

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// Remote command fails.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Friendly result alias :3
type Result<T, E = SourceError> = std::result::Result<T, E>;
