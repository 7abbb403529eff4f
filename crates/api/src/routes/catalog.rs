//! Legacy identifier resolution.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{ProductId, VariantId};
use serde::Serialize;
use store::CommerceStore;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedIds {
    pub product_id: ProductId,
    pub variant_id: VariantId,
}

/// GET /catalog/resolve/:product_fp/:variant_fp: map a fingerprint pair to canonical ids.
#[tracing::instrument(skip(state))]
pub async fn resolve<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((product_fp, variant_fp)): Path<(u64, u64)>,
) -> Result<Json<ResolvedIds>, ApiError> {
    let (product_id, variant_id) = state
        .checkout
        .pricing()
        .cache()
        .resolve(product_fp, variant_fp)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "No variant matches fingerprints {product_fp}/{variant_fp}"
            ))
        })?;

    Ok(Json(ResolvedIds {
        product_id,
        variant_id,
    }))
}
