// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{Answer, Recorder};

use anyhow::Result;
use indoc::indoc;
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use siteops::{
    postactivate::ProjectSettings,
    provision,
    remote::{Output, RemoteError},
    service::ServiceError,
    source::SourceError,
    DeployConfig, LocalRevision, Orchestrator, Session, SiteIdentity, Target, WorkflowError,
};
use std::{
    fs::{create_dir_all, read_to_string, write},
    path::{Path, PathBuf},
};

const CONFIG: &str = indoc! {r#"
    [site]
    name = "example.com"
    repository = "https://example.com/site.git"

    [server]
    user = "deployer"
"#};

fn session(target: Target, remote: Recorder) -> Result<Session<Recorder>> {
    let config: DeployConfig = CONFIG.parse()?;
    let site = SiteIdentity::for_target(target, &config.site.name)?;
    Ok(Session::new(site, config, remote))
}

fn clean() -> LocalRevision {
    LocalRevision {
        commit: "abc123".into(),
        dirty: false,
        unpushed: 0,
    }
}

fn write_templates(services: &[&str]) -> Result<()> {
    for service in services {
        let body = match *service {
            "site" => {
                "#!/bin/bash\nexec gunicorn --name {{site_url}} --user {{user}} --group {{group}}\n"
            }
            "supervisor" => "[program:{{site_url}}]\nuser = {{user}}\n",
            "nginx" => "server {\n    server_name {{site_url}};\n}\n",
            _ => "",
        };
        let dir = Path::new("deployment_tools").join(service);
        create_dir_all(&dir)?;
        write(dir.join("template"), body)?;
    }

    Ok(())
}

fn fresh_server() -> Recorder {
    Recorder::new()
        .respond("test -e", Output::failure(1, ""))
        .respond("id dev_example_com", Output::failure(1, "no such user"))
        .respond("grep -qsxF", Output::failure(1, ""))
}

#[sealed_test]
fn deploy_fresh_site() -> Result<()> {
    write_templates(&["site", "supervisor", "nginx"])?;
    let session = session(Target::Dev, fresh_server())?;
    let mut answer = Answer::new(false);
    let mut orchestrator = Orchestrator::new(session, &mut answer, clean());
    orchestrator.deploy()?;
    let remote = orchestrator.into_session().into_remote();

    let order = [
        "CREATE ROLE dev_example_com",
        "CREATE DATABASE dev_example_com",
        "ALTER ROLE dev_example_com WITH PASSWORD",
        "useradd",
        "mkdir -p",
        "pyvenv /srv/dev.example.com/venv/dev.example.com",
        "echo 'source /srv/dev.example.com/bin/postactivate' >>",
        "supervisorctl reread",
        "git clone",
        "git reset --hard abc123",
        "pip install -vr",
        "gulp production",
        "collectstatic --noinput",
        "migrate --noinput",
    ];
    let positions = order
        .iter()
        .map(|needle| remote.position(needle))
        .collect::<Vec<_>>();
    assert!(positions.iter().all(Option::is_some), "{:#?}", remote.commands);
    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]), "{:#?}", remote.commands);

    let mkdir = &remote.commands[remote.position("mkdir -p").unwrap()];
    for folder in [
        "'/srv/dev.example.com'",
        "'/srv/dev.example.com/source'",
        "'/srv/dev.example.com/bin'",
        "'/srv/dev.example.com/static'",
        "'/srv/dev.example.com/static/media'",
        "'/srv/dev.example.com/venv/dev.example.com'",
        "'/srv/dev.example.com/logs'",
        "'/home/deployer/.virtualenvs'",
    ] {
        assert!(mkdir.contains(folder), "{mkdir} lacks {folder}");
    }

    let uploads = remote
        .uploads
        .iter()
        .map(|(_, remote, sudo)| (remote.clone(), *sudo))
        .collect::<Vec<_>>();
    let expect = vec![
        (PathBuf::from("/srv/dev.example.com/bin/postactivate"), false),
        (PathBuf::from("/srv/dev.example.com/bin/dev_example_com.sh"), true),
        (PathBuf::from("/etc/supervisor/conf.d/dev_example_com.conf"), true),
        (PathBuf::from("/etc/nginx/sites-available/dev.example.com"), true),
    ];
    assert_eq!(uploads, expect);

    let last = remote.commands.last().map(String::as_str).unwrap_or_default();
    assert!(last.contains("ln -sf /etc/nginx/sites-available/dev.example.com"));
    assert_eq!(answer.asked, 0);

    let vhost = read_to_string("deployment_tools/nginx/dev.example.com")?;
    assert_eq!(vhost, "server {\n    server_name dev.example.com;\n}\n");
    let hook = read_to_string("deployment_tools/postactivate/dev.example.com")?;
    assert!(hook.contains("export SITE_URL='dev.example.com'\n"));
    assert!(hook.contains("export DB_NAME='dev_example_com'\n"));

    Ok(())
}

#[sealed_test]
fn redeploy_skips_existing_state() -> Result<()> {
    write_templates(&["site", "supervisor", "nginx"])?;
    let recorder = Recorder::new().respond("pg_database", Output::success("1\n"));
    let session = session(Target::Dev, recorder)?;
    let mut orchestrator = Orchestrator::new(session, Answer::new(false), clean());
    orchestrator.deploy()?;
    let remote = orchestrator.into_session().into_remote();

    for needle in ["CREATE ROLE", "CREATE DATABASE", "useradd", "pyvenv", ">>", "git clone"] {
        assert_eq!(remote.position(needle), None, "unexpected {needle}");
    }
    assert!(remote.position("ALTER ROLE dev_example_com").is_some());
    assert!(remote.position("git reset --hard abc123").is_some());

    Ok(())
}

#[test]
fn update_stops_services_only_around_migration() -> Result<()> {
    let recorder =
        Recorder::new().respond("supervisorctl stop", Output::failure(7, "not running"));
    let session = session(Target::Staging, recorder)?;
    let mut orchestrator = Orchestrator::new(session, Answer::new(false), clean());
    orchestrator.update()?;
    let remote = orchestrator.into_session().into_remote();

    let reset = remote.position("git reset --hard abc123").unwrap();
    assert!(remote.commands[reset].starts_with("cd '/srv/staging.example.com/source' && "));

    let gulp = remote.position("gulp production").unwrap();
    let first_stop = remote.position("supervisorctl stop").unwrap();
    let last_stop = remote
        .last_position("rm -f /etc/nginx/sites-enabled/staging.example.com")
        .unwrap();
    let collectstatic = remote.position("collectstatic --noinput").unwrap();
    let migrate = remote.position("migrate --noinput").unwrap();
    let first_start = remote.position("supervisorctl start").unwrap();
    assert!(reset < gulp);
    assert!(gulp < first_stop);
    assert!(last_stop < collectstatic);
    assert!(collectstatic < migrate);
    assert!(migrate < first_start);

    let last = remote.commands.last().map(String::as_str).unwrap_or_default();
    assert!(last.contains("ln -sf /etc/nginx/sites-available/staging.example.com"));

    Ok(())
}

#[test]
fn update_leaves_site_down_when_migration_fails() -> Result<()> {
    let recorder =
        Recorder::new().respond("migrate --noinput", Output::failure(1, "bad migration"));
    let session = session(Target::Staging, recorder)?;
    let mut orchestrator = Orchestrator::new(session, Answer::new(false), clean());
    let result = orchestrator.update();
    let remote = orchestrator.into_session().into_remote();

    assert!(matches!(result, Err(WorkflowError::Remote(..))));
    assert_eq!(remote.position("supervisorctl start"), None);

    Ok(())
}

#[test]
fn declined_confirmation_touches_nothing() -> Result<()> {
    let revision = LocalRevision {
        dirty: true,
        ..clean()
    };
    let session = session(Target::Prod, Recorder::new())?;
    let mut answer = Answer::new(false);
    let mut orchestrator = Orchestrator::new(session, &mut answer, revision);
    let result = orchestrator.update();
    let remote = orchestrator.into_session().into_remote();

    assert!(matches!(result, Err(WorkflowError::Source(SourceError::Declined))));
    assert!(remote.commands.is_empty());
    assert!(remote.uploads.is_empty());
    assert_eq!(answer.asked, 1);

    Ok(())
}

#[test]
fn accepted_confirmation_deploys_local_commit() -> Result<()> {
    let revision = LocalRevision {
        unpushed: 2,
        ..clean()
    };
    let session = session(Target::Prod, Recorder::new())?;
    let mut answer = Answer::new(true);
    let mut orchestrator = Orchestrator::new(session, &mut answer, revision);
    orchestrator.update()?;
    let remote = orchestrator.into_session().into_remote();

    assert!(remote.position("git reset --hard abc123").is_some());
    assert_eq!(answer.asked, 1);

    Ok(())
}

#[test]
fn development_site_skips_confirmation() -> Result<()> {
    let revision = LocalRevision {
        dirty: true,
        unpushed: 3,
        ..clean()
    };
    let session = session(Target::Vagrant, Recorder::new())?;
    let mut answer = Answer::new(false);
    let mut orchestrator = Orchestrator::new(session, &mut answer, revision);
    orchestrator.update()?;

    assert_eq!(answer.asked, 0);

    Ok(())
}

#[test]
fn dropdb_backs_up_before_dropping() -> Result<()> {
    let session = session(Target::Staging, Recorder::new())?;
    let mut orchestrator = Orchestrator::new(session, Answer::new(false), clean());
    orchestrator.dropdb()?;
    let remote = orchestrator.into_session().into_remote();

    assert_eq!(remote.commands.len(), 3);
    assert!(remote.commands[0].starts_with("sudo -H -u postgres bash -c "));
    let backup = "pg_dump -Fc staging_example_com > /srv/staging.example.com/staging_example_com_";
    assert!(remote.commands[0].contains(backup));
    assert!(remote.commands[1].contains("DROP DATABASE staging_example_com;"));
    assert!(remote.commands[2].contains("DROP ROLE staging_example_com;"));

    Ok(())
}

#[test]
fn dropdb_keeps_database_when_backup_fails() -> Result<()> {
    let recorder = Recorder::new().respond("pg_dump", Output::failure(1, "disk full"));
    let session = session(Target::Staging, recorder)?;
    let mut orchestrator = Orchestrator::new(session, Answer::new(false), clean());
    let result = orchestrator.dropdb();
    let remote = orchestrator.into_session().into_remote();

    assert!(result.is_err());
    assert_eq!(remote.commands.len(), 1);

    Ok(())
}

#[test]
fn reboot_restarts_daemons() -> Result<()> {
    let session = session(Target::Prod, Recorder::new())?;
    let mut orchestrator = Orchestrator::new(session, Answer::new(false), clean());
    orchestrator.reboot()?;
    let remote = orchestrator.into_session().into_remote();

    let nginx = remote.position("sudo bash -c 'service nginx restart'").unwrap();
    let supervisor = remote.position("sudo bash -c 'service supervisor restart'").unwrap();
    assert!(nginx < supervisor);
    assert!(remote.last_position("supervisorctl stop").unwrap() < nginx);
    assert!(supervisor < remote.position("supervisorctl start example.com:*").unwrap());

    Ok(())
}

#[sealed_test]
fn update_config_installs_every_service() -> Result<()> {
    write_templates(&["site", "supervisor", "nginx"])?;
    let session = session(Target::Prod, Recorder::new())?;
    let mut orchestrator = Orchestrator::new(session, Answer::new(false), clean());
    orchestrator.update_config()?;
    let remote = orchestrator.into_session().into_remote();

    assert_eq!(remote.uploads.len(), 3);
    assert!(remote.uploads.iter().all(|(_, _, sudo)| *sudo));
    let install = remote.position("supervisorctl reread").unwrap();
    assert!(remote.commands[install]
        .starts_with("export FILENAME='/etc/supervisor/conf.d/example_com.conf' && "));

    Ok(())
}

#[sealed_test]
fn update_config_uploads_nothing_when_template_is_missing() -> Result<()> {
    write_templates(&["site", "supervisor"])?;
    let session = session(Target::Prod, Recorder::new())?;
    let mut orchestrator = Orchestrator::new(session, Answer::new(false), clean());
    let result = orchestrator.update_config();
    let remote = orchestrator.into_session().into_remote();

    assert!(matches!(result, Err(WorkflowError::Service(ServiceError::Template(..)))));
    assert!(remote.uploads.is_empty());

    Ok(())
}

#[sealed_test]
fn make_configs_renders_locally_only() -> Result<()> {
    write_templates(&["site", "supervisor", "nginx"])?;
    let session = session(Target::Local, Recorder::new())?;
    let mut orchestrator = Orchestrator::new(session, Answer::new(false), clean());
    orchestrator.make_configs()?;
    let remote = orchestrator.into_session().into_remote();

    assert!(remote.commands.is_empty());
    assert!(remote.uploads.is_empty());
    let wrapper = read_to_string("deployment_tools/site/local_example_com.sh")?;
    assert_eq!(
        wrapper,
        "#!/bin/bash\nexec gunicorn --name local.example.com --user local_example_com --group www\n"
    );

    Ok(())
}

#[test]
fn admin_returns_command_output() -> Result<()> {
    let recorder = Recorder::new().respond(
        "django-admin showmigrations",
        Output::success("[X] 0001_initial\n"),
    );
    let session = session(Target::Prod, recorder)?;
    let mut orchestrator = Orchestrator::new(session, Answer::new(false), clean());
    let result = orchestrator.admin(["showmigrations"])?;
    let remote = orchestrator.into_session().into_remote();

    assert_eq!(result, "[X] 0001_initial");
    let expect = vec![
        "source /srv/example.com/venv/example.com/bin/activate && django-admin showmigrations"
            .to_string(),
    ];
    assert_eq!(remote.commands, expect);

    Ok(())
}

#[test]
fn append_once_is_idempotent() -> Result<()> {
    let file = Path::new("/srv/example.com/venv/example.com/bin/activate");

    let recorder = Recorder::new().respond("grep", Output::failure(1, ""));
    let mut missing = session(Target::Prod, recorder)?;
    assert!(missing.append_once(file, "source hook")?);
    let remote = missing.into_remote();
    assert_eq!(
        remote.commands[1],
        "echo 'source hook' >> '/srv/example.com/venv/example.com/bin/activate'"
    );

    let mut present = session(Target::Prod, Recorder::new())?;
    assert!(!present.append_once(file, "source hook")?);
    assert_eq!(present.into_remote().commands.len(), 1);

    Ok(())
}

#[test]
fn failed_password_change_hides_password() -> Result<()> {
    let recorder = Recorder::new().respond("ALTER ROLE", Output::failure(1, "role is busy"));
    let mut session = session(Target::Staging, recorder)?;
    let settings = ProjectSettings {
        db_name: "staging_example_com".into(),
        db_user: "staging_example_com".into(),
        db_password: "TOPSECRETPW".into(),
    };

    let error = match provision::create_database(&mut session, &settings) {
        Ok(()) => anyhow::bail!("password change should fail"),
        Err(error) => error,
    };
    assert!(matches!(error, RemoteError::CommandFailed { .. }));
    let message = error.to_string();
    assert!(message.contains("ALTER ROLE staging_example_com WITH PASSWORD"));
    assert!(!message.contains("TOPSECRETPW"), "{message}");

    let remote = session.into_remote();
    assert!(remote.commands.iter().any(|line| line.contains("TOPSECRETPW")));

    Ok(())
}

#[test]
fn fix_permissions_tolerates_chown_failure() -> Result<()> {
    let recorder = Recorder::new().respond("chown -R", Output::failure(1, "not permitted"));
    let session = session(Target::Prod, recorder)?;
    let mut orchestrator = Orchestrator::new(session, Answer::new(false), clean());
    orchestrator.fix_permissions()?;
    let remote = orchestrator.into_session().into_remote();

    let mkdir = remote.position("mkdir -p").unwrap();
    let chown = remote.position("chown -R :www").unwrap();
    assert!(mkdir < chown);

    Ok(())
}

#[sealed_test]
fn deploy_tolerates_chown_failure() -> Result<()> {
    write_templates(&["site", "supervisor", "nginx"])?;
    let recorder = fresh_server().respond("chown -R", Output::failure(1, "not permitted"));
    let session = session(Target::Dev, recorder)?;
    let mut orchestrator = Orchestrator::new(session, Answer::new(false), clean());
    orchestrator.deploy()?;
    let remote = orchestrator.into_session().into_remote();

    assert!(remote.position("chown -R :www").unwrap() < remote.position("pyvenv").unwrap());

    Ok(())
}

#[sealed_test]
fn deploy_aborts_when_virtualenv_cannot_be_created() -> Result<()> {
    write_templates(&["site", "supervisor", "nginx"])?;
    let recorder = fresh_server().respond("pyvenv", Output::failure(1, "pyvenv: not found"));
    let session = session(Target::Dev, recorder)?;
    let mut orchestrator = Orchestrator::new(session, Answer::new(false), clean());
    let result = orchestrator.deploy();
    let remote = orchestrator.into_session().into_remote();

    assert!(matches!(result, Err(WorkflowError::Remote(..))));
    assert!(remote.uploads.is_empty());
    let last = remote.commands.last().map(String::as_str).unwrap_or_default();
    assert!(last.starts_with("pyvenv "), "{last}");

    Ok(())
}

#[test]
fn update_aborts_before_restart_when_requirements_fail() -> Result<()> {
    let recorder = Recorder::new().respond("pip install", Output::failure(1, "no distribution"));
    let session = session(Target::Staging, recorder)?;
    let mut orchestrator = Orchestrator::new(session, Answer::new(false), clean());
    let result = orchestrator.update();
    let remote = orchestrator.into_session().into_remote();

    assert!(matches!(result, Err(WorkflowError::Remote(..))));
    for needle in ["npm install", "gulp production", "supervisorctl stop", "supervisorctl start"] {
        assert_eq!(remote.position(needle), None, "unexpected {needle}");
    }

    Ok(())
}

#[test]
fn resetdb_restarts_around_reset() -> Result<()> {
    let session = session(Target::Staging, Recorder::new())?;
    let mut orchestrator = Orchestrator::new(session, Answer::new(false), clean());
    orchestrator.resetdb()?;
    let remote = orchestrator.into_session().into_remote();

    let last_stop = remote
        .last_position("rm -f /etc/nginx/sites-enabled/staging.example.com")
        .unwrap();
    let reset = remote.position("reset-database.sh").unwrap();
    let first_start = remote.position("supervisorctl start").unwrap();
    assert!(last_stop < reset);
    assert!(reset < first_start);
    assert!(remote.commands[reset]
        .starts_with("source /srv/staging.example.com/venv/staging.example.com/bin/activate && "));

    let last = remote.commands.last().map(String::as_str).unwrap_or_default();
    assert!(last.contains("ln -sf /etc/nginx/sites-available/staging.example.com"));

    Ok(())
}

#[test]
fn start_visits_services_in_dependency_order() -> Result<()> {
    let session = session(Target::Prod, Recorder::new())?;
    let mut orchestrator = Orchestrator::new(session, Answer::new(false), clean());
    orchestrator.start()?;
    let remote = orchestrator.into_session().into_remote();

    let expect = vec![
        ":".to_string(),
        "sudo supervisorctl start example.com:*".to_string(),
        "sudo ln -sf /etc/nginx/sites-available/example.com /etc/nginx/sites-enabled/example.com \
         && sudo nginx -s reload"
            .to_string(),
    ];
    assert_eq!(remote.commands, expect);

    Ok(())
}

#[test]
fn start_propagates_failure() -> Result<()> {
    let recorder = Recorder::new().respond("supervisorctl start", Output::failure(2, "ERROR"));
    let session = session(Target::Prod, recorder)?;
    let mut orchestrator = Orchestrator::new(session, Answer::new(false), clean());
    let result = orchestrator.start();
    let remote = orchestrator.into_session().into_remote();

    assert!(matches!(result, Err(WorkflowError::Service(ServiceError::Remote(..)))));
    assert_eq!(remote.position("sites-enabled"), None);

    Ok(())
}

#[test]
fn stop_ignores_failures() -> Result<()> {
    let recorder = Recorder::new()
        .respond("supervisorctl stop", Output::failure(7, "not running"))
        .respond("nginx -s reload", Output::failure(1, "nginx is down"));
    let session = session(Target::Prod, recorder)?;
    let mut orchestrator = Orchestrator::new(session, Answer::new(false), clean());
    orchestrator.stop()?;
    let remote = orchestrator.into_session().into_remote();

    let expect = vec![
        ":".to_string(),
        "sudo supervisorctl stop example.com:*".to_string(),
        "sudo rm -f /etc/nginx/sites-enabled/example.com && sudo nginx -s reload".to_string(),
    ];
    assert_eq!(remote.commands, expect);

    Ok(())
}

#[test]
fn frontend_installs_next_to_source() -> Result<()> {
    let session = session(Target::Prod, Recorder::new())?;
    let mut orchestrator = Orchestrator::new(session, Answer::new(false), clean());
    orchestrator.frontend()?;
    let remote = orchestrator.into_session().into_remote();

    let expect = [
        "ln -sf source/package.json .",
        "ln -sf source/bower.json .",
        "npm install",
        "node_modules/.bin/bower install",
    ]
    .map(|line| format!("cd '/srv/example.com' && {line}"))
    .to_vec();
    assert_eq!(remote.commands, expect);

    Ok(())
}
