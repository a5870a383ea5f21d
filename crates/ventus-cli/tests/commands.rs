//! Subcommands run against a file-backed key store in a temp directory.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{ImageFormat, Rgb, RgbImage};
use p256::ecdsa::signature::hazmat::PrehashVerifier;
use p256::ecdsa::{Signature, VerifyingKey};
use ventus_attest::AttestConfig;
use ventus_cli::{Command, ConsoleGate, Session};
use ventus_core::{AttestError, ErrorKind, MockBiometricGate};
use ventus_crypto::SoftwareKeyStore;

fn session<G: ventus_core::BiometricGate>(key_dir: &Path, gate: G) -> Session<SoftwareKeyStore, G> {
    ventus_logging::init_testing();
    let store = Arc::new(SoftwareKeyStore::open(key_dir));
    Session::new(store, Arc::new(gate), &AttestConfig::default()).unwrap()
}

fn write_photo(dir: &Path) -> PathBuf {
    let img = RgbImage::from_fn(8, 8, |x, y| Rgb([x as u8 * 30, y as u8 * 30, 200]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    let path = dir.join("photo.png");
    std::fs::write(&path, out.into_inner()).unwrap();
    path
}

/// Value of `name: value` in command output
fn field<'a>(output: &'a str, name: &str) -> &'a str {
    output
        .lines()
        .find_map(|line| line.strip_prefix(name)?.strip_prefix(": "))
        .unwrap_or_else(|| panic!("no {name} in {output:?}"))
}

#[tokio::test]
async fn test_pubkey_is_stable_across_sessions() {
    let dir = tempfile::tempdir().unwrap();

    let first = session(dir.path(), MockBiometricGate::granting())
        .run(&Command::Pubkey)
        .await
        .unwrap();
    let second = session(dir.path(), MockBiometricGate::granting())
        .run(&Command::Pubkey)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(field(&first, "x").len(), 64);
    assert_eq!(field(&first, "y").len(), 64);
}

#[tokio::test]
async fn test_digest_matches_decoded_pixels_not_file_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let photo = write_photo(dir.path());
    let session = session(dir.path(), MockBiometricGate::denying());

    let digest = session.run(&Command::Digest { image: photo.clone() }).await.unwrap();
    assert_eq!(digest.len(), 64);

    // Same pixels stored as RGBA are different bytes with the same digest
    let rgba = image::open(&photo).unwrap().to_rgba8();
    let mut reencoded = Cursor::new(Vec::new());
    rgba.write_to(&mut reencoded, ImageFormat::Png).unwrap();
    let reencoded = reencoded.into_inner();
    assert_ne!(reencoded, std::fs::read(&photo).unwrap());
    assert_eq!(session.digest(&reencoded).unwrap(), digest);
}

#[tokio::test]
async fn test_sign_output_verifies() {
    let dir = tempfile::tempdir().unwrap();
    let photo = write_photo(dir.path());
    let session = session(dir.path(), ConsoleGate::new(&b"y\n"[..]));

    let output = session
        .run(&Command::Sign { image: photo, yes: false })
        .await
        .unwrap();

    let digest = hex::decode(field(&output, "digest")).unwrap();
    let der = hex::decode(field(&output, "signature")).unwrap();
    let public_key = base64_decode(field(&output, "public_key"));

    let key = VerifyingKey::from_sec1_bytes(&public_key).unwrap();
    let signature = Signature::from_der(&der).unwrap();
    key.verify_prehash(&digest, &signature).unwrap();
}

#[tokio::test]
async fn test_inputs_json_has_circuit_fields() {
    let dir = tempfile::tempdir().unwrap();
    let photo = write_photo(dir.path());
    let session = session(dir.path(), MockBiometricGate::granting());

    let output = session
        .run(&Command::Inputs { image: photo, yes: true })
        .await
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&output).unwrap();

    assert_eq!(value["pub_key_x"].as_array().unwrap().len(), 32);
    assert_eq!(value["pub_key_y"].as_array().unwrap().len(), 32);
    assert_eq!(value["signature"].as_array().unwrap().len(), 64);
    assert_eq!(value["data_hash"].as_array().unwrap().len(), 32);
}

#[tokio::test]
async fn test_declined_prompt_is_auth_denied() {
    let dir = tempfile::tempdir().unwrap();
    let photo = write_photo(dir.path());
    let session = session(dir.path(), ConsoleGate::new(&b"n\n"[..]));

    let err = session
        .run(&Command::Sign { image: photo, yes: false })
        .await
        .unwrap_err();
    let attest = err.downcast_ref::<AttestError>().unwrap();
    assert_eq!(attest.kind(), ErrorKind::AuthDenied);

    // Nothing was generated for a denied request
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn test_reset_key_rotates_identity() {
    let dir = tempfile::tempdir().unwrap();
    let session = session(dir.path(), MockBiometricGate::granting());

    assert!(session.run(&Command::ResetKey).await.unwrap().starts_with("no key"));

    let before = session.run(&Command::Pubkey).await.unwrap();
    assert!(session.run(&Command::ResetKey).await.unwrap().starts_with("deleted key"));
    let after = session.run(&Command::Pubkey).await.unwrap();
    assert_ne!(before, after);
}

#[tokio::test]
async fn test_missing_image_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let session = session(dir.path(), MockBiometricGate::granting());

    let err = session
        .run(&Command::Digest { image: dir.path().join("absent.png") })
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("absent.png"));
}

fn base64_decode(text: &str) -> Vec<u8> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(text).unwrap()
}
