//! Integration tests for the sopsdec binary
//!
//! Each test encrypts a fixture with the binary itself, then runs the
//! decrypt-side commands against it with an inline age identity.

use age::secrecy::ExposeSecret;
use age::x25519::Identity;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

// ─── Helpers ───────────────────────────────────────────────────────────────

fn sopsdec(identity: &Identity) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_sopsdec"));
    command
        .env_remove("ENC_FILE_PATH")
        .env_remove("SOPS_AGE_KEY_FILE")
        .env_remove("SOPS_AGE_RECIPIENTS")
        .env("SOPS_AGE_KEY", identity.to_string().expose_secret());
    command
}

fn run(command: &mut Command) -> Output {
    command.output().expect("failed to run sopsdec")
}

/// Encrypt `content` into `<dir>/<name>` and return the path
fn encrypted_fixture(dir: &Path, identity: &Identity, name: &str, content: &str) -> PathBuf {
    let plain = dir.join(format!("plain-{}", name));
    std::fs::write(&plain, content).unwrap();
    let target = dir.join(name);

    let output = run(sopsdec(identity)
        .arg("encrypt")
        .arg(&plain)
        .args(["--age", &identity.to_public().to_string()])
        .arg("--output")
        .arg(&target));
    assert!(
        output.status.success(),
        "encrypt failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    target
}

// ─── Tests ─────────────────────────────────────────────────────────────────

#[test]
fn test_decrypt_prints_plaintext_only() {
    let dir = TempDir::new().unwrap();
    let identity = Identity::generate();
    let file = encrypted_fixture(dir.path(), &identity, "app.env", "FOO=bar\nBAZ=qux\n");

    let output = run(sopsdec(&identity).arg("decrypt").arg(&file));
    assert!(output.status.success());
    assert_eq!(output.stdout, b"FOO=bar\nBAZ=qux\n");
}

#[test]
fn test_decrypt_uses_enc_file_path() {
    let dir = TempDir::new().unwrap();
    let identity = Identity::generate();
    let file = encrypted_fixture(dir.path(), &identity, "app.env", "FOO=bar\n");

    let output = run(sopsdec(&identity).arg("decrypt").env("ENC_FILE_PATH", &file));
    assert!(output.status.success());
    assert_eq!(output.stdout, b"FOO=bar\n");
}

#[test]
fn test_decrypt_without_file_fails() {
    let identity = Identity::generate();
    let output = run(sopsdec(&identity).arg("decrypt"));
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("ENC_FILE_PATH"));
}

#[test]
fn test_tampered_file_produces_no_output() {
    let dir = TempDir::new().unwrap();
    let identity = Identity::generate();
    let file = encrypted_fixture(dir.path(), &identity, "app.env", "FOO=bar\nBAZ=qux\n");

    let content = std::fs::read_to_string(&file).unwrap();
    let tampered: String = content
        .lines()
        .map(|l| {
            if l.starts_with("sops_lastmodified=") {
                "sops_lastmodified=2001-01-01T00:00:00Z".to_string()
            } else {
                l.to_string()
            }
        })
        .map(|l| l + "\n")
        .collect();
    std::fs::write(&file, tampered).unwrap();

    let output = run(sopsdec(&identity).arg("decrypt").arg(&file));
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("integrity"));
}

#[test]
fn test_dump_writes_owner_only_file() {
    let dir = TempDir::new().unwrap();
    let identity = Identity::generate();
    let file = encrypted_fixture(dir.path(), &identity, "config.yaml", "db:\n  password: pw\n");
    let out = dir.path().join("config.plain.yaml");

    let output = run(sopsdec(&identity).arg("dump").arg(&file).arg("-o").arg(&out));
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "db:\n  password: pw\n");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&out).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

#[cfg(unix)]
#[test]
fn test_exec_env_passes_variables_to_child() {
    let dir = TempDir::new().unwrap();
    let identity = Identity::generate();
    let file = encrypted_fixture(dir.path(), &identity, "app.env", "GREETING=hello\n");

    let output = run(sopsdec(&identity)
        .arg("exec-env")
        .arg(&file)
        .args(["--", "sh", "-c", "printf %s \"$GREETING\""]));
    assert!(output.status.success());
    assert_eq!(output.stdout, b"hello");
}

#[cfg(unix)]
#[test]
fn test_exec_env_propagates_exit_code() {
    let dir = TempDir::new().unwrap();
    let identity = Identity::generate();
    let file = encrypted_fixture(dir.path(), &identity, "app.env", "A=1\n");

    let output = run(sopsdec(&identity)
        .arg("exec-env")
        .arg(&file)
        .args(["--", "sh", "-c", "exit 7"]));
    assert_eq!(output.status.code(), Some(7));
}

#[test]
fn test_exec_env_rejects_structured_documents() {
    let dir = TempDir::new().unwrap();
    let identity = Identity::generate();
    let file = encrypted_fixture(dir.path(), &identity, "app.json", r#"{"A": "1"}"#);

    let output = run(sopsdec(&identity)
        .arg("exec-env")
        .arg(&file)
        .args(["--", "true"]));
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("dotenv"));
}
