#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn kindeploy(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("kindeploy").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("KINDEPLOY_CONFIG")
        .env("RUST_LOG", "warn");
    cmd
}

fn app_folder(dir: &TempDir) -> PathBuf {
    let folder = dir.path().join("app");
    std::fs::create_dir_all(&folder).unwrap();
    folder
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

// ---------------------------------------------------------------------------
// kindeploy generate
// ---------------------------------------------------------------------------

#[test]
fn generate_writes_artifacts() {
    let dir = TempDir::new().unwrap();
    let folder = app_folder(&dir);

    kindeploy(&dir)
        .args(["generate", "--folder", "app", "--port", "9000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("app-image:latest"));

    let artifacts = [
        "Dockerfile",
        "deployment.yaml",
        "service.yaml",
        "main.go",
        "go.mod",
        ".dockerignore",
    ];
    for name in artifacts {
        assert!(folder.join(name).is_file(), "missing {name}");
    }
    let dockerfile = std::fs::read_to_string(folder.join("Dockerfile")).unwrap();
    assert!(dockerfile.contains("EXPOSE 9000"));
}

#[test]
fn generate_twice_is_identical() {
    let dir = TempDir::new().unwrap();
    let folder = app_folder(&dir);
    let read_all = || -> Vec<String> {
        ["Dockerfile", "deployment.yaml", "service.yaml", "main.go"]
            .iter()
            .map(|n| std::fs::read_to_string(folder.join(n)).unwrap())
            .collect()
    };

    kindeploy(&dir).args(["generate", "--folder", "app"]).assert().success();
    let first = read_all();
    kindeploy(&dir).args(["generate", "--folder", "app"]).assert().success();
    assert_eq!(first, read_all());
}

#[test]
fn generate_keeps_existing_entry_point() {
    let dir = TempDir::new().unwrap();
    let folder = app_folder(&dir);
    std::fs::write(folder.join("main.go"), "package main\n\nfunc main() {}\n").unwrap();

    let output = kindeploy(&dir)
        .args(["generate", "--folder", "app", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["name"], "app");
    let main_go = report["files"]
        .as_array()
        .unwrap()
        .iter()
        .find(|f| f["path"].as_str().unwrap().ends_with("main.go"))
        .unwrap();
    assert_eq!(main_go["status"], "kept");
    assert_eq!(
        std::fs::read_to_string(folder.join("main.go")).unwrap(),
        "package main\n\nfunc main() {}\n"
    );
}

#[test]
fn generate_rejects_non_numeric_port() {
    let dir = TempDir::new().unwrap();
    app_folder(&dir);
    kindeploy(&dir)
        .args(["generate", "--folder", "app", "--port", "http"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be a number"));
}

#[test]
fn generate_rejects_missing_folder() {
    let dir = TempDir::new().unwrap();
    kindeploy(&dir)
        .args(["generate", "--folder", "nowhere"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn invalid_config_file_fails() {
    let dir = TempDir::new().unwrap();
    app_folder(&dir);
    std::fs::write(dir.path().join("kindeploy.yaml"), "cluster_name: Not_Valid\n").unwrap();
    kindeploy(&dir)
        .args(["generate", "--folder", "app"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration"));
}

#[test]
fn explicit_config_must_exist() {
    let dir = TempDir::new().unwrap();
    app_folder(&dir);
    kindeploy(&dir)
        .args(["--config", "missing.yaml", "generate", "--folder", "app"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config file not found"));
}

// ---------------------------------------------------------------------------
// kindeploy deploy (against fake docker / kind / kubectl)
// ---------------------------------------------------------------------------

#[cfg(unix)]
mod deploy {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::{Duration, Instant};

    const DOCKER: &str = r#"case "$1" in
  info) exit 0 ;;
  images) exit 0 ;;
  build) echo "built $3" ;;
esac"#;

    /// Like `DOCKER`, but the app image is already present locally.
    const DOCKER_IMAGE_PRESENT: &str = r#"case "$1" in
  info) exit 0 ;;
  images) echo 3f2a1b9c8d7e ;;
  build) echo "built $3" ;;
esac"#;

    /// Readiness fails at once so an interactive run ends right after the
    /// image and apply steps.
    const KUBECTL_NOT_READY: &str = r#"case "$1" in
  get) exit 1 ;;
  wait) echo "error: timed out waiting for the condition" >&2; exit 1 ;;
esac"#;

    const KIND: &str = r#"case "$1" in
  get) echo go-cluster ;;
esac"#;

    const KUBECTL_READY: &str = r#"case "$1" in
  get) exit 1 ;;
  wait) echo "condition met" ;;
  port-forward) echo $$ > "$FIXTURE/forward.pid"; exec sleep 60 ;;
esac"#;

    /// Fake tools in `<tmp>/bin` plus a `kindeploy.yaml` pointing at them.
    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new(kubectl: &str) -> Self {
            Self::with_tools(DOCKER, KIND, kubectl)
        }

        fn with_tools(docker: &str, kind: &str, kubectl: &str) -> Self {
            let dir = TempDir::new().unwrap();
            let bin = dir.path().join("bin");
            std::fs::create_dir_all(&bin).unwrap();
            app_folder(&dir);

            let log = dir.path().join("calls.log");
            for (name, body) in [("docker", docker), ("kind", kind), ("kubectl", kubectl)] {
                let script = format!(
                    "#!/bin/sh\nFIXTURE='{root}'\necho \"{name} $*\" >> '{log}'\n{body}\nexit 0\n",
                    root = dir.path().display(),
                    log = log.display(),
                );
                let path = bin.join(name);
                std::fs::write(&path, script).unwrap();
                std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            }

            let config = format!(
                "auto_install: false\n\
                 open_browser: false\n\
                 tools:\n  docker: {bin}/docker\n  kind: {bin}/kind\n  kubectl: {bin}/kubectl\n\
                 timeouts:\n  ready_secs: 5\n  forward_grace_secs: 1\n  poll_interval_secs: 1\n  terminate_grace_secs: 2\n  kill_grace_secs: 1\n",
                bin = bin.display()
            );
            std::fs::write(dir.path().join("kindeploy.yaml"), config).unwrap();
            Self { dir }
        }

        fn path(&self) -> &Path {
            self.dir.path()
        }

        fn calls(&self) -> Vec<String> {
            std::fs::read_to_string(self.path().join("calls.log"))
                .unwrap_or_default()
                .lines()
                .map(str::to_string)
                .collect()
        }

        fn deploy(&self) -> Command {
            let mut cmd = kindeploy(&self.dir);
            cmd.args(["deploy", "--folder", "app", "--port"])
                .arg(free_port().to_string())
                .write_stdin("");
            cmd
        }
    }

    /// Run with no subcommand and no flags, answering the prompts on stdin.
    fn interactive(fx: &Fixture, rebuild_answer: &str) -> assert_cmd::assert::Assert {
        let answers = format!("nope\napp\nxyz\n{}\n{rebuild_answer}\n", free_port());
        kindeploy(&fx.dir).write_stdin(answers).assert()
    }

    #[test]
    fn interactive_run_reprompts_and_reuses_existing_image() {
        let fx = Fixture::with_tools(DOCKER_IMAGE_PRESENT, KIND, KUBECTL_NOT_READY);
        interactive(&fx, "n")
            .failure()
            .stdout(predicate::str::contains("Path to the Go application folder:"))
            .stdout(predicate::str::contains("not found"))
            .stdout(predicate::str::contains("must be a number"))
            .stdout(predicate::str::contains("Rebuild image anyway? (y/N)"))
            .stdout(predicate::str::contains("reusing existing image"))
            .stderr(predicate::str::contains("did not become ready"));

        let calls = fx.calls();
        assert!(calls.iter().any(|c| c.starts_with("docker images -q app-image:latest")));
        assert!(!calls.iter().any(|c| c.starts_with("docker build")));
        assert!(calls.iter().any(|c| c.contains("kind load docker-image app-image:latest")));
    }

    #[test]
    fn interactive_run_rebuilds_when_confirmed() {
        let fx = Fixture::with_tools(DOCKER_IMAGE_PRESENT, KIND, KUBECTL_NOT_READY);
        interactive(&fx, "y")
            .failure()
            .stdout(predicate::str::contains("image built"))
            .stdout(predicate::str::contains("reusing existing image").not());

        let calls = fx.calls();
        let build = calls
            .iter()
            .position(|c| c.starts_with("docker build -t app-image:latest ."))
            .expect("image rebuilt");
        let load = calls
            .iter()
            .position(|c| c.contains("kind load docker-image"))
            .unwrap();
        assert!(build < load);
    }

    #[test]
    fn missing_tool_fails_with_hint() {
        let fx = Fixture::new(KUBECTL_READY);
        let config = std::fs::read_to_string(fx.path().join("kindeploy.yaml")).unwrap();
        let fake_kind = format!("{}/kind", fx.path().join("bin").display());
        let config = config.replace(&fake_kind, "/nonexistent/kind");
        std::fs::write(fx.path().join("kindeploy.yaml"), config).unwrap();

        fx.deploy()
            .assert()
            .failure()
            .stderr(predicate::str::contains("'/nonexistent/kind' not found in PATH"))
            .stderr(predicate::str::contains("hint:"));
    }

    #[test]
    fn unreachable_daemon_is_fatal() {
        let docker = "[ \"$1\" = info ] && { echo 'Cannot connect to the Docker daemon' >&2; exit 1; }";
        let fx = Fixture::with_tools(docker, KIND, KUBECTL_READY);
        fx.deploy()
            .assert()
            .failure()
            .stderr(predicate::str::contains("docker daemon is not reachable"))
            .stderr(predicate::str::contains("Cannot connect to the Docker daemon"));
    }

    #[test]
    fn invalid_port_flag_is_fatal() {
        let fx = Fixture::new(KUBECTL_READY);
        kindeploy(&fx.dir)
            .args(["deploy", "--folder", "app", "--port", "70000"])
            .write_stdin("")
            .assert()
            .failure()
            .stderr(predicate::str::contains("out of range"));
    }

    #[test]
    fn readiness_timeout_prints_diagnostics() {
        let fx = Fixture::new(
            r#"case "$1" in
  get) exit 1 ;;
  wait) echo "error: timed out waiting for the condition" >&2; exit 1 ;;
esac"#,
        );
        fx.deploy()
            .assert()
            .failure()
            .stdout(predicate::str::contains("kubectl get pods -l app=app -n default"))
            .stdout(predicate::str::contains("kubectl delete deployment app-deployment"))
            .stderr(predicate::str::contains("did not become ready within 5s"));

        let calls = fx.calls();
        let position = |needle: &str| calls.iter().position(|c| c.contains(needle)).unwrap();
        let build = position("docker build -t app-image:latest .");
        assert!(build < position("kind load docker-image"));
        assert!(position("apply -f deployment.yaml") < position("apply -f service.yaml"));
        assert!(position("apply -f service.yaml") < position("kubectl wait"));
        assert!(!calls.iter().any(|c| c.contains("port-forward")));
    }

    #[test]
    fn hung_readiness_wait_is_bounded() {
        let fx = Fixture::new(
            r#"case "$1" in
  get) exit 1 ;;
  wait) exec sleep 60 ;;
esac"#,
        );
        let started = Instant::now();
        fx.deploy()
            .assert()
            .failure()
            .stderr(predicate::str::contains("did not become ready"));
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[test]
    fn env_file_becomes_secret() {
        let fx = Fixture::new(
            r#"case "$1" in
  get) exit 1 ;;
  wait) exit 1 ;;
esac"#,
        );
        std::fs::write(fx.path().join("app/.env"), "MY_SECRET_KEY=s3cret\nOTHER=1\n").unwrap();
        fx.deploy()
            .assert()
            .failure()
            .stdout(predicate::str::contains("MY_SECRET_KEY, OTHER"))
            .stdout(predicate::str::contains("s3cret").not());

        let calls = fx.calls();
        let called = |needle: &str| calls.iter().any(|c| c.contains(needle));
        assert!(called("delete secret app-secret --namespace=default --ignore-not-found=true"));
        assert!(called("create secret generic app-secret --from-env-file=.env"));
    }

    #[test]
    fn forwarder_failing_fast_is_reported() {
        let fx = Fixture::new(
            r#"case "$1" in
  get) exit 1 ;;
  port-forward) echo "unable to listen on any of the requested ports" >&2; exit 1 ;;
esac"#,
        );
        fx.deploy()
            .assert()
            .failure()
            .stderr(predicate::str::contains("port-forward for svc/app-service"))
            .stderr(predicate::str::contains("unable to listen"))
            .stderr(predicate::str::contains("hint:"));
    }

    #[test]
    fn sigterm_while_forwarding_cleans_up_and_exits_zero() {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        use std::process::Stdio;

        let fx = Fixture::new(KUBECTL_READY);
        let child = std::process::Command::new(assert_cmd::cargo::cargo_bin("kindeploy"))
            .current_dir(fx.path())
            .env_remove("KINDEPLOY_CONFIG")
            .env("RUST_LOG", "warn")
            .args(["deploy", "--folder", "app", "--port"])
            .arg(free_port().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();

        let pid_file = fx.path().join("forward.pid");
        let deadline = Instant::now() + Duration::from_secs(30);
        while !pid_file.exists() {
            assert!(Instant::now() < deadline, "port-forward never started");
            std::thread::sleep(Duration::from_millis(100));
        }
        // Past the 1s grace period, so the forwarder is live.
        std::thread::sleep(Duration::from_secs(2));
        let forward_pid: i32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();

        kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM).unwrap();
        let output = child.wait_with_output().unwrap();
        let stdout = String::from_utf8_lossy(&output.stdout);

        assert_eq!(output.status.code(), Some(0), "stdout: {stdout}");
        assert!(stdout.contains("Press Ctrl+C"));
        assert!(stdout.contains("port-forward stopped"));
        assert!(kill(Pid::from_raw(forward_pid), None).is_err(), "forwarder still running");
    }
}
