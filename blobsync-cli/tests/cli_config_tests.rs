use blobsync_cli::{load_or_generate_client_id, CliConfig};
use blobsync_types::{ClientId, LockClientType};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

// ── Client id ───────────────────────────────────────────────────

#[test]
fn client_id_is_generated_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("client.id");

    let first = load_or_generate_client_id(&path).unwrap();
    assert!(path.exists());
    let second = load_or_generate_client_id(&path).unwrap();
    assert_eq!(first, second);
}

#[test]
fn invalid_client_id_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("client.id");
    std::fs::write(&path, "not_valid/id").unwrap();
    assert!(load_or_generate_client_id(&path).is_err());
}

// ── Config file ─────────────────────────────────────────────────

#[test]
fn missing_config_means_defaults() {
    assert_eq!(CliConfig::load(None).unwrap(), CliConfig::default());
}

#[test]
fn partial_config_is_accepted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{"file_api": {"base_dir": "shared"}, "download_concurrency": 2}"#,
    )
    .unwrap();

    let config = CliConfig::load(Some(&path)).unwrap();
    assert_eq!(config.file_api.base_dir, "shared");
    assert_eq!(config.download_concurrency, Some(2));
    assert_eq!(config.lock, Default::default());
}

#[test]
fn malformed_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();
    let err = CliConfig::load(Some(&path)).unwrap_err();
    assert!(err.to_string().starts_with("Failed to parse config file"));
}

#[test]
fn synchronizer_config_identifies_a_cli_client() {
    let id = ClientId::new();
    let config = CliConfig::default().into_synchronizer_config(id.clone());
    assert_eq!(config.client_type, LockClientType::Cli);
    assert_eq!(config.client_id, id);
    assert_eq!(config.download_concurrency, 5);
}
