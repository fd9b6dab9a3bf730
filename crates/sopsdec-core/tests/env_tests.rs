//! Tests that read configuration from the process environment

mod common;

use age::secrecy::ExposeSecret;
use common::{encrypt, keypair};
use serial_test::serial;
use sopsdec_core::config::{ENC_FILE_PATH_VAR, SOPS_AGE_KEY_FILE_VAR, SOPS_AGE_KEY_VAR};
use sopsdec_core::{decrypt_from_env, Error, Format};
use std::env;
use tempfile::TempDir;

fn clear() {
    env::remove_var(ENC_FILE_PATH_VAR);
    env::remove_var(SOPS_AGE_KEY_VAR);
    env::remove_var(SOPS_AGE_KEY_FILE_VAR);
}

#[test]
#[serial]
fn test_decrypt_from_env_with_inline_key() {
    clear();
    let (identity, _) = keypair();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("secrets.env");
    std::fs::write(&path, encrypt("FOO=bar\n", Format::Dotenv, &identity)).unwrap();

    env::set_var(ENC_FILE_PATH_VAR, &path);
    env::set_var(SOPS_AGE_KEY_VAR, identity.to_string().expose_secret());

    let decryptor = decrypt_from_env().unwrap();
    assert_eq!(decryptor.plaintext(), b"FOO=bar\n");
    clear();
}

#[test]
#[serial]
fn test_decrypt_from_env_with_key_file() {
    clear();
    let (identity, _) = keypair();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, encrypt("token: abc\n", Format::Yaml, &identity)).unwrap();

    let key_file = dir.path().join("keys.txt");
    std::fs::write(
        &key_file,
        format!(
            "# created: 2024-01-01T00:00:00Z\n# public key: {}\n{}\n",
            identity.to_public(),
            identity.to_string().expose_secret()
        ),
    )
    .unwrap();

    env::set_var(ENC_FILE_PATH_VAR, &path);
    env::set_var(SOPS_AGE_KEY_FILE_VAR, &key_file);

    let decryptor = decrypt_from_env().unwrap();
    assert_eq!(decryptor.format(), Format::Yaml);
    assert_eq!(decryptor.plaintext(), b"token: abc\n");
    clear();
}

#[test]
#[serial]
fn test_missing_enc_file_path_is_usage_error() {
    clear();
    assert!(matches!(decrypt_from_env(), Err(Error::Usage { .. })));
}

#[test]
#[serial]
fn test_missing_key_file_is_io_error() {
    clear();
    let (identity, _) = keypair();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("secrets.env");
    std::fs::write(&path, encrypt("FOO=bar\n", Format::Dotenv, &identity)).unwrap();

    env::set_var(ENC_FILE_PATH_VAR, &path);
    env::set_var(SOPS_AGE_KEY_FILE_VAR, dir.path().join("absent.txt"));

    assert!(matches!(decrypt_from_env(), Err(Error::Io { .. })));
    clear();
}

#[test]
#[serial]
fn test_exported_env_applies_to_process() {
    clear();
    let (identity, resolver) = keypair();
    let document = encrypt(
        "SOPSDEC_IT_USER=admin\nSOPSDEC_IT_PASS=pw\n",
        Format::Dotenv,
        &identity,
    );
    let decryptor =
        sopsdec_core::Decryptor::from_bytes(document.as_bytes(), Format::Dotenv, &resolver).unwrap();

    assert!(env::var("SOPSDEC_IT_USER").is_err());
    decryptor.env_vars().unwrap().apply().unwrap();
    assert_eq!(env::var("SOPSDEC_IT_USER").unwrap(), "admin");
    assert_eq!(env::var("SOPSDEC_IT_PASS").unwrap(), "pw");

    env::remove_var("SOPSDEC_IT_USER");
    env::remove_var("SOPSDEC_IT_PASS");
}
