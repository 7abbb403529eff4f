//! Fingerprint-to-identifier resolution for legacy clients.
//!
//! Older clients send a 32-bit rolling hash of each identifier instead of the
//! identifier itself. Fingerprints collide, so the index maps each one to every
//! candidate id and lookups re-verify candidates before accepting them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use common::{ProductId, VariantId};
use domain::Product;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use store::{CommerceStore, StoreError};

use crate::error::{EngineError, Result};

/// Default lifetime of a built index.
pub const DEFAULT_INDEX_TTL: Duration = Duration::from_secs(300);

/// Polynomial rolling hash over UTF-16 code units, wrapped to a signed 32-bit
/// integer, absolute value.
pub fn fingerprint(id: &str) -> u64 {
    let hash = id
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)));
    u64::from(hash.unsigned_abs())
}

/// Fingerprint buckets built from one catalog scan.
#[derive(Debug, Default)]
pub struct FingerprintIndex {
    products: HashMap<u64, Vec<ProductId>>,
    variants: HashMap<u64, Vec<(ProductId, VariantId)>>,
}

impl FingerprintIndex {
    /// Buckets every product and variant id by fingerprint.
    pub fn build(products: &[Product]) -> Self {
        let mut index = Self::default();
        for product in products {
            index
                .products
                .entry(fingerprint(product.id.as_str()))
                .or_default()
                .push(product.id.clone());
            for variant in &product.variants {
                index
                    .variants
                    .entry(fingerprint(variant.id.as_str()))
                    .or_default()
                    .push((product.id.clone(), variant.id.clone()));
            }
        }
        index.report_collisions();
        index
    }

    fn report_collisions(&self) {
        for (fp, ids) in self.products.iter().filter(|(_, ids)| ids.len() > 1) {
            metrics::counter!("id_fingerprint_collisions_total", "kind" => "product").increment(1);
            tracing::warn!(fingerprint = fp, candidates = ?ids, "product id fingerprint collision");
        }
        for (fp, ids) in self.variants.iter().filter(|(_, ids)| ids.len() > 1) {
            metrics::counter!("id_fingerprint_collisions_total", "kind" => "variant").increment(1);
            tracing::warn!(fingerprint = fp, candidates = ?ids, "variant id fingerprint collision");
        }
    }

    /// Number of buckets holding more than one id.
    pub fn collision_count(&self) -> usize {
        self.products.values().filter(|ids| ids.len() > 1).count()
            + self.variants.values().filter(|ids| ids.len() > 1).count()
    }

    /// Resolves a fingerprint pair to canonical ids.
    ///
    /// Each candidate's fingerprint is recomputed, and a variant candidate is
    /// accepted only if it belongs to a verified product candidate.
    pub fn resolve(
        &self,
        product_fingerprint: u64,
        variant_fingerprint: u64,
    ) -> Option<(ProductId, VariantId)> {
        let products: Vec<&ProductId> = self
            .products
            .get(&product_fingerprint)?
            .iter()
            .filter(|id| fingerprint(id.as_str()) == product_fingerprint)
            .collect();

        let mut matches = self
            .variants
            .get(&variant_fingerprint)?
            .iter()
            .filter(|(product_id, variant_id)| {
                fingerprint(variant_id.as_str()) == variant_fingerprint
                    && products.contains(&product_id)
            });

        let found = matches.next()?;
        if matches.next().is_some() {
            tracing::warn!(
                product_fingerprint,
                variant_fingerprint,
                "fingerprint pair is ambiguous, using first candidate"
            );
        }
        Some(found.clone())
    }
}

type BuildResult = std::result::Result<Arc<FingerprintIndex>, Arc<StoreError>>;
type BuildFuture = Shared<BoxFuture<'static, BuildResult>>;

#[derive(Default)]
struct CacheSlot {
    data: Option<Arc<FingerprintIndex>>,
    expires_at: Option<Instant>,
    build_in_flight: Option<BuildFuture>,
}

/// Lazily built, periodically rebuilt [`FingerprintIndex`].
///
/// Concurrent callers that find the index missing or stale all await the
/// same build instead of scanning the catalog once each. The slot lock is
/// never held across an await.
#[derive(Clone)]
pub struct IdResolutionCache<S> {
    store: S,
    ttl: Duration,
    slot: Arc<Mutex<CacheSlot>>,
}

impl<S> IdResolutionCache<S>
where
    S: CommerceStore + Clone + 'static,
{
    /// Creates a cache with the default five minute lifetime.
    pub fn new(store: S) -> Self {
        Self::with_ttl(store, DEFAULT_INDEX_TTL)
    }

    /// Creates a cache whose index is rebuilt after `ttl`.
    pub fn with_ttl(store: S, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            slot: Arc::default(),
        }
    }

    /// Resolves a fingerprint pair. `Ok(None)` means not found.
    #[tracing::instrument(skip(self))]
    pub async fn resolve(
        &self,
        product_fingerprint: u64,
        variant_fingerprint: u64,
    ) -> Result<Option<(ProductId, VariantId)>> {
        let index = self.index().await?;
        Ok(index.resolve(product_fingerprint, variant_fingerprint))
    }

    /// Drops the current index so the next lookup rebuilds it.
    pub fn invalidate(&self) {
        let mut slot = self.lock_slot();
        slot.data = None;
        slot.expires_at = None;
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, CacheSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn index(&self) -> Result<Arc<FingerprintIndex>> {
        let build = {
            let mut slot = self.lock_slot();
            if let (Some(data), Some(expires_at)) = (&slot.data, slot.expires_at)
                && Instant::now() < expires_at
            {
                return Ok(data.clone());
            }
            match &slot.build_in_flight {
                Some(build) => build.clone(),
                None => {
                    let build = Self::build(self.store.clone()).boxed().shared();
                    slot.build_in_flight = Some(build.clone());
                    build
                }
            }
        };

        let result = build.clone().await;

        let mut slot = self.lock_slot();
        if slot
            .build_in_flight
            .as_ref()
            .is_some_and(|current| current.ptr_eq(&build))
        {
            slot.build_in_flight = None;
            if let Ok(index) = &result {
                slot.data = Some(index.clone());
                slot.expires_at = Some(Instant::now() + self.ttl);
            }
        }
        result.map_err(EngineError::IndexBuild)
    }

    async fn build(store: S) -> std::result::Result<Arc<FingerprintIndex>, Arc<StoreError>> {
        let started = Instant::now();
        let products = store.list_products().await.map_err(|e| {
            tracing::error!(error = %e, "identifier index build failed");
            Arc::new(e)
        })?;
        let index = FingerprintIndex::build(&products);

        metrics::counter!("id_cache_rebuilds_total").increment(1);
        tracing::debug!(
            products = products.len(),
            collisions = index.collision_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "identifier index built"
        );
        Ok(Arc::new(index))
    }
}
