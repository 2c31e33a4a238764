//! Deploy Integration Tests
//!
//! Drives pyenv actions end to end against recording hosts and checks the
//! exact command sequence each target receives.

use pyfleet::config::{ConfigSection, Registry, RunOptions};
use pyfleet::core::{ActionStatus, EntityKind, Orchestrator, RunContext};
use pyfleet::error::FleetError;
use pyfleet::testing::{RecordingConnector, ScriptedProber};
use tempfile::TempDir;

fn local_registry() -> Registry {
    Registry::new()
        .with_section(ConfigSection::new("pysrc", "app").with("path", "/src/app"))
        .with_section(
            ConfigSection::new("pyenv", "dev")
                .with("location", "localhost:/srv/dev")
                .with("packages", "app:branch:main"),
        )
}

fn remote_registry() -> Registry {
    Registry::new()
        .with_section(ConfigSection::new("server", "web1").with("host", "10.0.0.5"))
        .with_section(ConfigSection::new("pysrc", "app").with("path", "/src/app"))
        .with_section(
            ConfigSection::new("pyenv", "prod")
                .with("location", "deploy@web1:envs/prod")
                .with("packages", "app"),
        )
        .with_section(
            ConfigSection::new("ikaaro", "shop")
                .with("pyenv", "prod")
                .with("path", "shop"),
        )
}

#[tokio::test]
async fn test_local_deploy_skips_upload_and_installs_in_place() {
    let cache = TempDir::new().unwrap();
    let registry = local_registry();
    let connector = RecordingConnector::new().respond("--fullname", "app-1.0\n");
    let prober = ScriptedProber::default();
    let orchestrator = Orchestrator::new(RunContext::new(
        &registry,
        &connector,
        &prober,
        cache.path().to_path_buf(),
    ));

    let status = orchestrator
        .run(EntityKind::PyEnv, "dev", "deploy")
        .await
        .unwrap();
    assert_eq!(status, ActionStatus::Completed);

    let sdist = format!(
        "python3 setup.py --quiet sdist --formats=gztar --dist-dir {}",
        cache.path().display()
    );
    assert_eq!(
        connector.lines(),
        vec![
            "git checkout --quiet main",
            "git pull --quiet --ff-only origin main",
            sdist.as_str(),
            "python3 setup.py --fullname",
            "test -f requirements.txt",
            "/srv/dev/bin/pip install -r requirements.txt --upgrade --log=/srv/dev/log/pip.log",
            "/srv/dev/bin/python setup.py --quiet install --force",
        ]
    );
    assert!(!connector.lines().iter().any(|l| l.starts_with("put ")));
    assert!(connector.connections().is_empty());
    assert!(connector
        .journal()
        .iter()
        .all(|e| e.cwd.as_deref() == Some("/src/app")));
}

#[tokio::test]
async fn test_remote_deploy_uploads_installs_and_restarts() {
    let cache = TempDir::new().unwrap();
    let registry = remote_registry();
    let connector = RecordingConnector::new().respond("--fullname", "app-1.0");
    let prober = ScriptedProber::default();
    let orchestrator = Orchestrator::new(RunContext::new(
        &registry,
        &connector,
        &prober,
        cache.path().to_path_buf(),
    ));

    orchestrator
        .run(EntityKind::PyEnv, "prod", "deploy")
        .await
        .unwrap();

    let sdist = format!(
        "python3 setup.py --quiet sdist --formats=gztar --dist-dir {}",
        cache.path().display()
    );
    let put = format!("put {} /tmp", cache.path().join("app-1.0.tar.gz").display());
    assert_eq!(
        connector.lines(),
        vec![
            // build
            sdist.as_str(),
            "python3 setup.py --fullname",
            // upload
            "python3 setup.py --fullname",
            put.as_str(),
            // stop
            "~/envs/prod/bin/icms-stop.py shop",
            "~/envs/prod/bin/icms-stop.py --force shop",
            // install
            "python3 setup.py --fullname",
            "tar xzf app-1.0.tar.gz",
            "test -f requirements.txt",
            "~/envs/prod/bin/pip install -r requirements.txt --upgrade --log=~/envs/prod/log/pip.log",
            "~/envs/prod/bin/python setup.py --quiet install --force",
            "rm -rf /tmp/app-1.0",
            // restart
            "~/envs/prod/bin/icms-stop.py shop",
            "~/envs/prod/bin/icms-stop.py --force shop",
            "~/envs/prod/bin/icms-start.py -d shop",
        ]
    );

    let journal = connector.journal();
    let untar = journal.iter().find(|e| e.line.starts_with("tar ")).unwrap();
    assert_eq!(untar.host, "deploy@10.0.0.5");
    assert_eq!(untar.cwd.as_deref(), Some("/tmp"));

    let setup = journal
        .iter()
        .find(|e| e.line.ends_with("setup.py --quiet install --force"))
        .unwrap();
    assert_eq!(setup.cwd.as_deref(), Some("/tmp/app-1.0"));

    let start = journal.iter().find(|e| e.line.contains("icms-start.py")).unwrap();
    assert_eq!(start.cwd.as_deref(), Some("~/envs/prod"));
}

#[tokio::test]
async fn test_install_continues_without_manifest() {
    let cache = TempDir::new().unwrap();
    let registry = remote_registry();
    let connector = RecordingConnector::new()
        .respond("--fullname", "app-1.0")
        .fail("test -f requirements.txt", 1);
    let prober = ScriptedProber::default();
    let orchestrator = Orchestrator::new(RunContext::new(
        &registry,
        &connector,
        &prober,
        cache.path().to_path_buf(),
    ));

    orchestrator
        .run(EntityKind::PyEnv, "prod", "install")
        .await
        .unwrap();

    let lines = connector.lines();
    assert!(!lines.iter().any(|l| l.contains("pip install")));
    assert!(lines.iter().any(|l| l.ends_with("setup.py --quiet install --force")));
    assert_eq!(lines.last().map(String::as_str), Some("rm -rf /tmp/app-1.0"));
}

#[tokio::test]
async fn test_install_aborts_when_setup_fails() {
    let cache = TempDir::new().unwrap();
    let registry = remote_registry();
    let connector = RecordingConnector::new()
        .respond("--fullname", "app-1.0")
        .fail("setup.py --quiet install", 1);
    let prober = ScriptedProber::default();
    let orchestrator = Orchestrator::new(RunContext::new(
        &registry,
        &connector,
        &prober,
        cache.path().to_path_buf(),
    ));

    let err = orchestrator
        .run(EntityKind::PyEnv, "prod", "deploy")
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::CommandFailed { exit_code: 1, .. }));

    let lines = connector.lines();
    assert!(lines
        .last()
        .unwrap()
        .ends_with("setup.py --quiet install --force"));
    assert!(!lines.iter().any(|l| l.starts_with("rm -rf")));
    assert!(!lines.iter().any(|l| l.contains("icms-start.py")));
}

#[tokio::test]
async fn test_dependency_failure_is_not_a_missing_manifest() {
    let cache = TempDir::new().unwrap();
    let registry = remote_registry();
    let connector = RecordingConnector::new()
        .respond("--fullname", "app-1.0")
        .fail("pip install", 2);
    let prober = ScriptedProber::default();
    let orchestrator = Orchestrator::new(RunContext::new(
        &registry,
        &connector,
        &prober,
        cache.path().to_path_buf(),
    ));

    let err = orchestrator
        .run(EntityKind::PyEnv, "prod", "install")
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::CommandFailed { exit_code: 2, .. }));
    assert!(!connector
        .lines()
        .iter()
        .any(|l| l.ends_with("setup.py --quiet install --force")));
}

#[tokio::test]
async fn test_offline_refuses_remote_steps() {
    let cache = TempDir::new().unwrap();
    let registry = remote_registry();
    let connector = RecordingConnector::new().respond("--fullname", "app-1.0");
    let prober = ScriptedProber::default();
    let ctx = RunContext::new(&registry, &connector, &prober, cache.path().to_path_buf())
        .with_options(RunOptions { offline: true });
    let orchestrator = Orchestrator::new(ctx);

    let err = orchestrator
        .run(EntityKind::PyEnv, "prod", "deploy")
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::Offline));
    assert!(connector.connections().is_empty());
    assert!(connector.journal().iter().all(|e| e.host == "localhost"));
}

#[tokio::test]
async fn test_branch_package_checks_out_and_pulls() {
    let cache = TempDir::new().unwrap();
    let registry = local_registry().with_section(
        ConfigSection::new("pyenv", "dev")
            .with("location", "localhost:/srv/dev")
            .with("packages", "app:branch:stable"),
    );
    let connector = RecordingConnector::new().respond("--fullname", "app-1.1");
    let prober = ScriptedProber::default();
    let orchestrator = Orchestrator::new(RunContext::new(
        &registry,
        &connector,
        &prober,
        cache.path().to_path_buf(),
    ));

    orchestrator
        .run(EntityKind::PyEnv, "dev", "build")
        .await
        .unwrap();

    let lines = connector.lines();
    assert_eq!(lines[0], "git checkout --quiet stable");
    assert_eq!(lines[1], "git pull --quiet --ff-only origin stable");
}
