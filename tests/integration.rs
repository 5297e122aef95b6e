//! End-to-end tests driving the compiled `tdx` binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn tdx_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("tdx");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_content = format!(
        r#"[storage]
backend = "local"
path = "{}/store"

[catalog]
page_size = 12

[server]
bind = "127.0.0.1:7419"
"#,
        root.display()
    );

    let config_path = root.join("tooldex.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_tdx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    run_tdx_env(config_path, args, &[])
}

fn run_tdx_env(
    config_path: &Path,
    args: &[&str],
    env: &[(&str, &str)],
) -> (String, String, bool) {
    let binary = tdx_binary();
    let mut command = Command::new(&binary);
    command
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args);
    for (key, value) in env {
        command.env(key, value);
    }
    let output = command
        .output()
        .unwrap_or_else(|e| panic!("Failed to run tdx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_store() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_tdx(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_tdx(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_tdx(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_browse_free_popular() {
    let (_tmp, config_path) = setup_test_env();
    run_tdx(&config_path, &["init"]);

    let (stdout, stderr, success) = run_tdx(
        &config_path,
        &["browse", "--pricing", "Free", "--sort", "popular"],
    );
    assert!(success, "browse failed: {stderr}");
    assert!(stdout.contains("tools, page 1/"));
    // "Free" excludes labels that also mention paid plans.
    assert!(stdout.contains("Stable Diffusion"));
    assert!(!stdout.contains("ChatGPT"));
}

#[test]
fn test_browse_share_prints_query() {
    let (_tmp, config_path) = setup_test_env();
    run_tdx(&config_path, &["init"]);

    let (stdout, _, success) = run_tdx(
        &config_path,
        &["browse", "--category", "Writing", "--share"],
    );
    assert!(success);
    assert!(stdout.contains("share: ?category=Writing"));
}

#[test]
fn test_browse_filters_persist_between_runs() {
    let (_tmp, config_path) = setup_test_env();
    run_tdx(&config_path, &["init"]);

    run_tdx(&config_path, &["browse", "--category", "Research"]);

    // No flags this time: the stored category still applies.
    let (stdout, _, success) = run_tdx(&config_path, &["browse", "--share"]);
    assert!(success);
    assert!(stdout.contains("share: ?category=Research"));

    // --clear resets to all-defaults.
    let (stdout, _, _) = run_tdx(&config_path, &["browse", "--clear", "--share"]);
    assert!(stdout.contains("share: (all defaults)"));
}

#[test]
fn test_unknown_backend_env_falls_back_to_local() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_tdx_env(
        &config_path,
        &["init"],
        &[("TOOLDEX_BACKEND", "mongo")],
    );
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_review_round_trip() {
    let (_tmp, config_path) = setup_test_env();
    run_tdx(&config_path, &["init"]);

    let (stdout, stderr, success) = run_tdx(
        &config_path,
        &[
            "review", "add", "4", "Runs fine on my own GPU", "--rating", "5", "--name", "Ada",
        ],
    );
    assert!(success, "review add failed: {stderr}");
    assert!(stdout.contains("review saved: "));
    let id = stdout.trim().rsplit(' ').next().unwrap().to_string();

    let (stdout, _, success) = run_tdx(&config_path, &["review", "list", "4"]);
    assert!(success);
    assert!(stdout.contains("Runs fine on my own GPU"));
    assert!(stdout.contains("average 5.0"));

    let (stdout, _, success) = run_tdx(&config_path, &["review", "helpful", &id]);
    assert!(success);
    assert!(stdout.contains("helpful: 1"));
}

#[test]
fn test_review_validation_rejects_bad_rating() {
    let (_tmp, config_path) = setup_test_env();
    run_tdx(&config_path, &["init"]);

    let (_, stderr, success) = run_tdx(
        &config_path,
        &["review", "add", "4", "meh", "--rating", "9", "--name", "Ada"],
    );
    assert!(!success);
    assert!(stderr.contains("between 1 and 5"));
}

#[test]
fn test_compare_cap_refuses_fifth_tool() {
    let (_tmp, config_path) = setup_test_env();
    run_tdx(&config_path, &["init"]);

    for id in ["1", "2", "3", "4"] {
        let (stdout, _, success) = run_tdx(&config_path, &["compare", "add", id]);
        assert!(success);
        assert!(stdout.contains("comparing"));
    }

    let (stdout, _, success) = run_tdx(&config_path, &["compare", "add", "5"]);
    assert!(success);
    assert!(stdout.contains("comparison set is full"));

    let (stdout, _, _) = run_tdx(&config_path, &["compare", "list"]);
    assert!(stdout.contains("ChatGPT"));
    assert!(!stdout.contains("GitHub Copilot"));
}

#[test]
fn test_favorites_toggle() {
    let (_tmp, config_path) = setup_test_env();
    run_tdx(&config_path, &["init"]);

    let (stdout, _, _) = run_tdx(&config_path, &["fav", "toggle", "2"]);
    assert!(stdout.contains("favorited 2"));

    let (stdout, _, _) = run_tdx(&config_path, &["fav", "list"]);
    assert!(stdout.contains("Claude"));

    let (stdout, _, _) = run_tdx(&config_path, &["fav", "toggle", "2"]);
    assert!(stdout.contains("unfavorited 2"));

    let (stdout, _, _) = run_tdx(&config_path, &["fav", "list"]);
    assert!(stdout.contains("No favorites."));
}

#[test]
fn test_auth_register_login_and_duplicate() {
    let (_tmp, config_path) = setup_test_env();
    run_tdx(&config_path, &["init"]);

    let (stdout, stderr, success) = run_tdx(
        &config_path,
        &[
            "auth", "register", "ada@example.com", "Ada", "--password", "secret1",
        ],
    );
    assert!(success, "register failed: {stderr}");
    // First account owns the back office.
    assert!(stdout.contains("signed up as ada@example.com (admin)"));

    let (_, stderr, success) = run_tdx(
        &config_path,
        &[
            "auth", "register", "ada@example.com", "Else", "--password", "other99",
        ],
    );
    assert!(!success);
    assert!(stderr.contains("Email already exists"));

    let (_, stderr, success) = run_tdx(
        &config_path,
        &["auth", "login", "ada@example.com", "--password", "wrong99"],
    );
    assert!(!success);
    assert!(stderr.contains("Invalid credentials"));

    let (stdout, _, success) = run_tdx(
        &config_path,
        &["auth", "login", "ada@example.com", "--password", "secret1"],
    );
    assert!(success);
    assert!(stdout.contains("signed in as ada@example.com"));

    let (stdout, _, _) = run_tdx(&config_path, &["auth", "whoami"]);
    assert!(stdout.contains("ada@example.com (admin)"));

    let (stdout, _, _) = run_tdx(&config_path, &["auth", "logout"]);
    assert!(stdout.contains("signed out"));

    let (stdout, _, _) = run_tdx(&config_path, &["auth", "whoami"]);
    assert!(stdout.contains("not signed in"));
}

#[test]
fn test_admin_moderates_submissions() {
    let (_tmp, config_path) = setup_test_env();
    run_tdx(&config_path, &["init"]);

    run_tdx(
        &config_path,
        &[
            "auth", "register", "admin@example.com", "Admin", "--password", "secret1",
        ],
    );

    let (stdout, stderr, success) = run_tdx(
        &config_path,
        &[
            "submit",
            "add",
            "PromptBase",
            "https://promptbase.example",
            "A marketplace for prompts",
            "--category",
            "Productivity",
        ],
    );
    assert!(success, "submit failed: {stderr}");
    assert!(stdout.contains("(pending)"));
    let id = stdout
        .trim()
        .split_whitespace()
        .nth(2)
        .unwrap()
        .to_string();

    let (stdout, stderr, success) = run_tdx(&config_path, &["admin", "approve", &id]);
    assert!(success, "approve failed: {stderr}");
    assert!(stdout.contains("approved"));

    let (stdout, _, _) = run_tdx(
        &config_path,
        &["submit", "list", "--status", "approved"],
    );
    assert!(stdout.contains("PromptBase"));

    let (stdout, _, _) = run_tdx(&config_path, &["submit", "list", "--status", "pending"]);
    assert!(stdout.contains("No submissions."));
}

#[test]
fn test_admin_requires_a_signed_in_admin() {
    let (_tmp, config_path) = setup_test_env();
    run_tdx(&config_path, &["init"]);

    let (_, stderr, success) = run_tdx(&config_path, &["admin", "users"]);
    assert!(!success);
    assert!(stderr.contains("not signed in"));
}

#[test]
fn test_tools_show_and_categories() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_tdx(&config_path, &["tools", "show", "4"]);
    assert!(success);
    assert!(stdout.contains("Stable Diffusion"));
    assert!(stdout.contains("pricing:"));

    let (stdout, _, success) = run_tdx(&config_path, &["tools", "categories"]);
    assert!(success);
    assert!(stdout.contains("Chatbots"));
    assert!(stdout.contains("Research"));

    let (_, stderr, success) = run_tdx(&config_path, &["tools", "show", "999"]);
    assert!(!success);
    assert!(stderr.contains("no tool with id 999"));
}
