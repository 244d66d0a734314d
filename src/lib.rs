// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Provision, update, and tear down web application sites over SSH.
//!
//! Siteops drives a fixed set of deployment workflows against one target
//! site at a time. A target is picked by environment (`prod`, `staging`,
//! `dev`, `local`, `vagrant`), which yields a [`SiteIdentity`] from which
//! every user name, database name, and folder path is derived. Workflows run
//! their steps sequentially through a [`Session`], which talks to the web
//! server through a [`Remote`].
//!
//! # Workflows
//!
//! - __deploy__: provision database, user, folders, virtual environment, and
//!   service configuration, then update.
//! - __update__: sync source to the local commit, install dependencies, build
//!   assets, then restart services around static collection and migrations.
//! - __update-config__: re-render and install service configuration.
//! - __reboot__: restart the reverse proxy and process supervisor daemons.
//! - __dropdb__: back up, then drop, the site database and its role.

pub mod config;
pub mod path;
pub mod postactivate;
pub mod provision;
pub mod remote;
pub mod service;
pub mod session;
pub mod site;
pub mod source;
pub mod template;
pub mod workflow;

#[doc(inline)]
pub use crate::{
    config::DeployConfig,
    remote::{ssh::SshRemote, Output, Remote, RemoteCommand},
    session::Session,
    site::{Folder, FolderLayout, SiteIdentity, Target},
    source::{Checkout, Confirmer, InquireConfirmer, LocalRevision, WorkingCopy},
    workflow::{Orchestrator, WorkflowError},
};
