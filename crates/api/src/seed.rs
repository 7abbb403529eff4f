//! Start-up catalog loading.

use std::path::{Path, PathBuf};

use domain::{DomainError, Product};
use store::{CommerceStore, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("cannot read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("product {product_id} rejected: {source}")]
    Invalid {
        product_id: String,
        source: DomainError,
    },

    #[error("failed to store catalog: {0}")]
    Store(#[from] StoreError),
}

/// Parses a JSON array of products, validating each one.
pub fn parse_catalog(json: &str) -> Result<Vec<Product>, SeedError> {
    let products: Vec<Product> = serde_json::from_str(json)?;
    for product in &products {
        product.validate().map_err(|source| SeedError::Invalid {
            product_id: product.id.to_string(),
            source,
        })?;
    }
    Ok(products)
}

/// Reads and validates the catalog at `path` and inserts the products the
/// store does not have yet. Existing products keep their live stock and holds.
/// Returns the number of products inserted.
pub async fn seed_catalog<S: CommerceStore>(store: &S, path: &Path) -> Result<usize, SeedError> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SeedError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let products = parse_catalog(&json)?;
    let mut inserted = 0;
    for product in &products {
        if store.insert_product_if_absent(product).await? {
            inserted += 1;
        } else {
            tracing::debug!(product_id = %product.id, "catalog product already stored, skipping");
        }
    }
    tracing::info!(
        path = %path.display(),
        products = products.len(),
        inserted,
        "catalog seeded"
    );
    Ok(inserted)
}
