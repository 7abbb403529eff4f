//! Releases holds on orders whose payment never arrived.

use chrono::{DateTime, Utc};
use common::OrderId;
use domain::PaymentStatus;
use serde::Serialize;
use store::{CommerceStore, StoreTransaction};

use crate::error::{EngineError, Result};
use crate::reservation::ReservationManager;

/// Outcome of one reaper pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReaperReport {
    /// Expired candidates found by the scan.
    pub scanned: usize,
    /// Holds actually released.
    pub released: usize,
}

/// Cancels unpaid orders past their hold window and frees their stock.
pub struct ReservationReaper<S> {
    store: S,
    reservations: ReservationManager,
}

impl<S: CommerceStore> ReservationReaper<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            reservations: ReservationManager::new(),
        }
    }

    /// Releases up to `batch_limit` expired holds, oldest first.
    ///
    /// Each order is re-checked inside its own transaction, so an order that
    /// was paid after the scan keeps its hold. Orders that lose a concurrency
    /// race are skipped and picked up by the next pass.
    #[tracing::instrument(skip(self))]
    pub async fn release_expired(&self, batch_limit: usize) -> Result<ReaperReport> {
        let now = Utc::now();
        let candidates = self.store.find_expired_reservations(now, batch_limit).await?;

        let mut report = ReaperReport {
            scanned: candidates.len(),
            released: 0,
        };
        for order_id in &candidates {
            match self.release_one(order_id, now).await {
                Ok(true) => report.released += 1,
                Ok(false) => {}
                Err(EngineError::ConcurrencyConflict(reason)) => {
                    tracing::warn!(%order_id, %reason, "skipping order changed during release");
                }
                Err(e) => return Err(e),
            }
        }

        if report.scanned > 0 {
            tracing::info!(
                scanned = report.scanned,
                released = report.released,
                "expired reservations processed"
            );
        }
        Ok(report)
    }

    async fn release_one(&self, order_id: &OrderId, now: DateTime<Utc>) -> Result<bool> {
        let mut tx = self.store.begin().await?;
        let Some(mut order) = tx.get_order(order_id).await? else {
            return Ok(false);
        };

        // Payment wins over expiry.
        if order.payment.status != PaymentStatus::Pending || !order.is_reservation_expired(now) {
            return Ok(false);
        }

        let released = self.reservations.release(&mut tx, &mut order, now).await?;
        order.expire(now);
        tx.save_order(&order).await?;
        tx.commit().await?;
        Ok(released)
    }
}
