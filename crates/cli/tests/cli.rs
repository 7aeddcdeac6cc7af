use assert_cmd::Command;

fn circulation(fallback: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("circulation").unwrap();
    cmd.env("CIRCULATION_CLIENT__FALLBACK_DIR", fallback)
        .env("CIRCULATION_CLIENT__TIMEOUT_MS", "500")
        .env_remove("CIRCULATION_TOKEN")
        .env_remove("CIRCULATION_BASE_URL")
        .env_remove("CIRCULATION_AS_USER");
    cmd
}

#[test]
fn help_lists_the_commands() {
    let dir = tempfile::tempdir().unwrap();
    let output = circulation(dir.path()).arg("--help").output().unwrap();
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    for command in ["login", "borrow", "approve", "return", "pay-fine", "watch"] {
        assert!(text.contains(command), "missing {command} in:\n{text}");
    }
}

#[test]
fn offline_books_on_an_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let output = circulation(dir.path())
        .args(["--offline", "books"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "no books\n");
}

#[test]
fn unreachable_server_falls_back_to_local_store() {
    let dir = tempfile::tempdir().unwrap();
    let output = circulation(dir.path())
        .args(["--base-url", "http://127.0.0.1:1", "--json", "books"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let books: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(books, serde_json::json!([]));
    assert!(String::from_utf8_lossy(&output.stderr).contains("offline"));
}

#[test]
fn fine_reason_requires_an_amount() {
    let dir = tempfile::tempdir().unwrap();
    let output = circulation(dir.path())
        .args(["--offline", "return", "b1", "u1", "--fine-reason", "late"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[test]
fn offline_whoami_fails_for_unknown_user() {
    let dir = tempfile::tempdir().unwrap();
    let output = circulation(dir.path())
        .args(["--offline", "--as-user", "ghost", "whoami"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("ghost"));
}

#[test]
fn offline_whoami_defaults_to_the_seeded_admin() {
    let dir = tempfile::tempdir().unwrap();
    let output = circulation(dir.path())
        .args(["--offline", "--json", "whoami"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let me: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(me["role"], "ADMIN");
    assert!(dir.path().join("library.json").exists());
}
