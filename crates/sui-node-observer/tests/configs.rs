// Numan Thabit 2025
use std::io::Write;

use anyhow::Result;
use sui_node_observer::{config::ObserverConfig, Group};
use tempfile::NamedTempFile;

#[tokio::test]
async fn example_config_loads() -> Result<()> {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let path = std::path::Path::new(manifest_dir).join("../../ops/sui-node-observer.example.toml");
    let config = ObserverConfig::load(path).await?;
    assert_eq!(config.enabled_groups(), Group::ALL.to_vec());
    assert_eq!(config.public_rpc.len(), 1);
    assert!(
        config.ip_lookup.access_token.is_none(),
        "example config must not ship a lookup token"
    );
    Ok(())
}

#[tokio::test]
async fn invalid_config_reports_the_file() -> Result<()> {
    let mut file = NamedTempFile::new()?;
    file.write_all(b"refresh_interval = 0\n")?;
    file.flush()?;
    let err = ObserverConfig::load(file.path())
        .await
        .expect_err("zero refresh interval is rejected");
    let rendered = format!("{err:#}");
    assert!(rendered.contains("failed to load"));
    assert!(rendered.contains("refresh_interval"));
    Ok(())
}
