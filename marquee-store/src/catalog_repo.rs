use marquee_catalog::StaticCatalog;
use tracing::info;

use crate::StoreError;

/// Load the service catalog document named in `catalog.path`
pub async fn load_catalog(path: &str) -> Result<StaticCatalog, StoreError> {
    let raw = tokio::fs::read_to_string(path).await?;
    let catalog = StaticCatalog::from_json(&raw)?;
    info!("Service catalog loaded from {}", path);
    Ok(catalog)
}
