//! End-to-end runs of the `fce` binary against a mock Frappe site.

mod common;

use common::{spawn_site, MockState, API_KEY, API_SECRET};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn fce_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_fce"))
}

fn setup_workspace(site_url: &str, extra: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let code = root.join("code");
    fs::create_dir_all(code.join("notes")).unwrap();
    fs::write(
        code.join("notes/test.py"),
        "-- FCE-EDITOR doctype=Note docname=test docfield=content\nprint(\"hi\")\n",
    )
    .unwrap();
    fs::write(code.join("notes/plain.py"), "print('untracked')\n").unwrap();
    fs::write(code.join("README.md"), "-- FCE-EDITOR doctype=Note docname=test docfield=content\nnope\n").unwrap();

    let config_content = format!(
        r#"[site]
url = "{}"
api_key = "{}"
api_secret = "{}"
timeout_secs = 5

[code]
root = "{}"
{}"#,
        site_url,
        API_KEY,
        API_SECRET,
        code.display(),
        extra
    );

    let config_path = root.join("fce.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

async fn run_fce(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = fce_binary();
    let config_path = config_path.to_path_buf();
    let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();

    let output = tokio::task::spawn_blocking(move || {
        let workdir = config_path.parent().unwrap_or(Path::new("."));
        Command::new(&binary)
            .current_dir(workdir)
            .arg("--config")
            .arg(&config_path)
            .args(&args)
            .env_remove("FRAPPE_SITE_URL")
            .env_remove("FRAPPE_API_KEY")
            .env_remove("FRAPPE_API_SECRET")
            .env_remove("FRAPPE_CODE_PATH")
            .env_remove("RUST_LOG")
            .output()
            .unwrap_or_else(|e| panic!("Failed to run fce binary at {:?}: {}", binary, e))
    })
    .await
    .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[tokio::test]
async fn test_push_then_nothing_to_push() {
    let site = spawn_site(MockState::default().with_doc("Note", "test", json!({ "content": "old" })))
        .await;
    let (_tmp, config) = setup_workspace(&site.url, "");

    let (stdout, stderr, ok) = run_fce(&config, &[]).await;
    assert!(ok, "push failed: {}", stderr);
    assert!(stderr.contains("Note:test:content - Fetching"), "stderr: {}", stderr);
    assert!(stderr.contains("Note:test:content - Pushing changes"), "stderr: {}", stderr);
    assert!(stderr.contains("Note:test:content - Updated"), "stderr: {}", stderr);
    assert!(stdout.contains("pushed: 1"), "stdout: {}", stdout);
    assert_eq!(site.field("Note", "test", "content"), Some(json!("print(\"hi\")")));
    assert_eq!(site.update_count(), 1);

    let (_, stderr, ok) = run_fce(&config, &[]).await;
    assert!(ok);
    assert!(stderr.contains("Note:test:content - No changes detected"), "stderr: {}", stderr);
    assert_eq!(site.update_count(), 1);
}

#[tokio::test]
async fn test_pattern_argument_limits_files() {
    let site = spawn_site(MockState::default().with_doc("Note", "test", json!({ "content": "old" })))
        .await;
    let (_tmp, config) = setup_workspace(&site.url, "");

    let (_, stderr, ok) = run_fce(&config, &["**/*.md"]).await;
    assert!(ok, "push failed: {}", stderr);
    assert_eq!(site.field("Note", "test", "content"), Some(json!("nope")));
}

#[tokio::test]
async fn test_pattern_option_wins_over_positional() {
    let site = spawn_site(MockState::default().with_doc("Note", "test", json!({ "content": "old" })))
        .await;
    let (_tmp, config) = setup_workspace(&site.url, "");

    let (_, stderr, ok) = run_fce(&config, &["**/*.py", "--pattern", "*.md"]).await;
    assert!(ok, "push failed: {}", stderr);
    assert_eq!(site.field("Note", "test", "content"), Some(json!("nope")));
    assert_eq!(site.update_count(), 1);
}

struct KillOnDrop(Child);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

async fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(15);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_watch_pushes_once_per_burst() {
    let site = spawn_site(MockState::default().with_doc("Note", "test", json!({ "content": "old" })))
        .await;
    let (tmp, config) = setup_workspace(
        &site.url,
        "\n[watch]\ndebounce_ms = 400\npoll_interval_ms = 100\n",
    );

    let child = Command::new(fce_binary())
        .current_dir(tmp.path())
        .arg("--config")
        .arg(&config)
        .arg("--watch")
        .env_remove("FRAPPE_SITE_URL")
        .env_remove("FRAPPE_API_KEY")
        .env_remove("FRAPPE_API_SECRET")
        .env_remove("FRAPPE_CODE_PATH")
        .env_remove("RUST_LOG")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    let _child = KillOnDrop(child);

    wait_until("initial push", || site.update_count() == 1).await;
    // let the watcher take its first snapshot
    tokio::time::sleep(Duration::from_millis(800)).await;

    let file = tmp.path().join("code/notes/test.py");
    for n in 2..=6 {
        fs::write(
            &file,
            format!("-- FCE-EDITOR doctype=Note docname=test docfield=content\nv{}\n", n),
        )
        .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    wait_until("push after burst", || site.update_count() >= 2).await;
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(site.update_count(), 2);
    assert_eq!(site.field("Note", "test", "content"), Some(json!("v6")));
}

#[tokio::test]
async fn test_json_format() {
    let site = spawn_site(MockState::default().with_doc("Note", "test", json!({ "content": "print(\"hi\")" })))
        .await;
    let (_tmp, config) = setup_workspace(&site.url, "");

    let (stdout, stderr, ok) = run_fce(&config, &["--format", "json"]).await;
    assert!(ok, "push failed: {}", stderr);

    let events: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(events[0]["event"], "fetching");
    assert_eq!(events[1]["event"], "unchanged");
    assert_eq!(events[1]["docname"], "test");
    let summary = events.last().unwrap();
    assert_eq!(summary["event"], "summary");
    assert_eq!(summary["summary"]["unchanged"], 1);
}

#[tokio::test]
async fn test_fetch_failure_does_not_push() {
    let site = spawn_site(MockState::default()).await;
    let (_tmp, config) = setup_workspace(&site.url, "");

    let (_, stderr, ok) = run_fce(&config, &[]).await;
    assert!(ok);
    assert!(stderr.contains("Note:test:content - Failed to fetch"), "stderr: {}", stderr);
    assert!(!stderr.contains("Pushing changes"));
    assert_eq!(site.update_count(), 0);
}

#[tokio::test]
async fn test_pull_writes_files() {
    let site = spawn_site(
        MockState::default()
            .with_doc("Server Script", "Daily Report", json!({ "title": "Daily Report", "script": "print('daily')" }))
            .with_doc("Server Script", "SCR-0002", json!({ "title": "Send Mail", "script": "send()" })),
    )
    .await;
    let (tmp, config) = setup_workspace(
        &site.url,
        r#"
[[pull]]
doctype = "Server Script"
title_field = "title"
code_field = "script"
extension = "py"
path = "server_scripts"
"#,
    );

    let (stdout, stderr, ok) = run_fce(&config, &["pull"]).await;
    assert!(ok, "pull failed: {}", stderr);
    assert!(stdout.contains("created: 2"), "stdout: {}", stdout);

    let dir = tmp.path().join("code/server_scripts");
    assert_eq!(
        fs::read_to_string(dir.join("daily_report.script.py")).unwrap(),
        "print('daily')"
    );
    assert_eq!(
        fs::read_to_string(dir.join("send_mail.scr_0002.script.py")).unwrap(),
        "send()"
    );

    let state = site.state.lock().unwrap();
    assert_eq!(state.list_queries[0]["fields"], r#"["name","title","script","modified"]"#);
}

#[tokio::test]
async fn test_dotenv_supplies_site_settings() {
    let site = spawn_site(MockState::default().with_doc("Note", "test", json!({ "content": "old" })))
        .await;
    let (tmp, _) = setup_workspace(&site.url, "");
    let code = tmp.path().join("code");
    fs::write(
        tmp.path().join("fce.toml"),
        format!("[code]\nroot = \"{}\"\n", code.display()),
    )
    .unwrap();
    fs::write(
        tmp.path().join(".env"),
        format!(
            "FRAPPE_SITE_URL={}\nFRAPPE_API_KEY={}\nFRAPPE_API_SECRET={}\n",
            site.url, API_KEY, API_SECRET
        ),
    )
    .unwrap();

    let (_, stderr, ok) = run_fce(&tmp.path().join("fce.toml"), &[]).await;
    assert!(ok, "push failed: {}", stderr);
    assert_eq!(site.update_count(), 1);
}

#[tokio::test]
async fn test_missing_config_file_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, ok) = run_fce(&tmp.path().join("nope.toml"), &[]).await;
    assert!(!ok);
    assert!(stderr.contains("nope.toml"), "stderr: {}", stderr);
}
