// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use siteops::{
    path::default_config_file, DeployConfig, InquireConfirmer, Orchestrator, Session,
    SiteIdentity, SshRemote, Target, WorkingCopy,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{path::PathBuf, process::exit};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "siteops [options] <target> <siteops-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to deployment configuration file.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Environment to deploy to.
    #[arg(value_enum, value_name = "target")]
    pub target: Target,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let config_path = match self.config {
            Some(path) => path,
            None => default_config_file()?,
        };
        let config = DeployConfig::load(&config_path)
            .with_context(|| format!("cannot load {:?}", config_path.display()))?;

        let site = SiteIdentity::for_target(self.target, &config.site.name)?;
        let host = config.host_for(self.target, site.url());
        let remote = SshRemote::new(&config.server.user, &host, config.server.port);
        info!("target {} through {}", site, remote.destination());

        let checkout = WorkingCopy::new(config.site.checkout.clone());
        let session = Session::new(site, config, remote);
        let mut orchestrator = Orchestrator::new(session, InquireConfirmer, checkout);

        match self.command {
            Command::Deploy => orchestrator.deploy()?,
            Command::Update => orchestrator.update()?,
            Command::Start => orchestrator.start()?,
            Command::Stop => orchestrator.stop()?,
            Command::Dropdb => orchestrator.dropdb()?,
            Command::Resetdb => orchestrator.resetdb()?,
            Command::Reboot => orchestrator.reboot()?,
            Command::MakeConfigs => orchestrator.make_configs()?,
            Command::UpdateConfig => orchestrator.update_config()?,
            Command::FixPermissions => orchestrator.fix_permissions()?,
            Command::Frontend => orchestrator.frontend()?,
            Command::Admin(opts) => {
                let output = orchestrator.admin(opts.args)?;
                if !output.is_empty() {
                    println!("{output}");
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Provision site from scratch, then update it.
    Deploy,

    /// Sync source, install dependencies, build assets, and migrate.
    Update,

    /// Start serving site.
    Start,

    /// Stop serving site.
    Stop,

    /// Back up, then drop, site database and its role.
    Dropdb,

    /// Reset database and repopulate it with dummy data.
    Resetdb,

    /// Restart reverse proxy and process supervisor daemons.
    Reboot,

    /// Render service configuration files without uploading them.
    MakeConfigs,

    /// Render, upload, and install service configuration, then restart.
    UpdateConfig,

    /// Re-create folder layout and fix group ownership.
    FixPermissions,

    /// Install front end dependencies.
    Frontend,

    /// Run django-admin inside site's virtual environment.
    #[command(override_usage = "siteops <target> admin <args>...")]
    Admin(AdminOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct AdminOptions {
    /// Arguments passed to django-admin.
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "args"
    )]
    pub args: Vec<String>,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}
