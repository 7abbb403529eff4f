//! Cart pricing.
//!
//! Turns client cart lines into a [`PricedCart`] against current catalog
//! state. Lines that cannot be priced are dropped and logged rather than
//! failing the cart; `Err` is reserved for infrastructure failures.

use std::collections::{BTreeMap, HashMap, HashSet};

use common::{ProductId, VariantId};
use domain::{Money, OrderItem, Product, Size, Variant};
use serde::{Deserialize, Serialize};
use store::CommerceStore;

use crate::cache::{IdResolutionCache, fingerprint};
use crate::error::Result;

/// Flat tax rate in basis points (7.5%).
pub const TAX_RATE_BPS: u32 = 750;

/// A product or variant reference as sent by a client.
///
/// New clients send canonical ids; legacy clients send numeric fingerprints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemRef {
    Fingerprint(u64),
    Id(String),
}

impl ItemRef {
    fn fingerprint(&self) -> u64 {
        match self {
            ItemRef::Fingerprint(fp) => *fp,
            ItemRef::Id(id) => fingerprint(id),
        }
    }
}

impl From<&ProductId> for ItemRef {
    fn from(id: &ProductId) -> Self {
        ItemRef::Id(id.to_string())
    }
}

impl From<&VariantId> for ItemRef {
    fn from(id: &VariantId) -> Self {
        ItemRef::Id(id.to_string())
    }
}

/// One cart selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: ItemRef,
    pub variant_id: ItemRef,
    pub quantity: u32,
}

impl CartLine {
    pub fn new(product_id: &ProductId, variant_id: &VariantId, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            variant_id: variant_id.into(),
            quantity,
        }
    }
}

/// Shipping fee per location, matched on the exact location string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShippingFeeTable(BTreeMap<String, Money>);

impl ShippingFeeTable {
    pub fn new(fees: impl IntoIterator<Item = (String, Money)>) -> Self {
        Self(fees.into_iter().collect())
    }

    pub fn fee_for(&self, location: &str) -> Option<Money> {
        self.0.get(location).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Shipping inputs for one pricing call.
#[derive(Debug, Clone, Default)]
pub struct PricingOptions {
    pub shipping_location: Option<String>,
    pub free_shipping_threshold: Option<Money>,
    pub fee_table: ShippingFeeTable,
}

/// A cart line resolved against the catalog at pricing time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedCartItem {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub product_name: String,
    pub product_slug: String,
    pub color: String,
    pub size: Size,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub unit_price: Money,
    pub discount_price: Money,
    pub effective_price: Money,
    pub quantity: u32,
    /// `quantity - reserved_quantity` when priced.
    pub available_quantity: u32,
    pub item_subtotal: Money,
    pub item_total: Money,
}

impl PricedCartItem {
    fn new(product: &Product, variant: &Variant, quantity: u32) -> Self {
        let effective_price = variant.effective_price();
        Self {
            product_id: product.id.clone(),
            variant_id: variant.id.clone(),
            product_name: product.name.clone(),
            product_slug: product.slug.clone(),
            color: variant.color.clone(),
            size: variant.size,
            image: variant.images.first().cloned(),
            unit_price: variant.price,
            discount_price: variant.discount_price,
            effective_price,
            quantity,
            available_quantity: variant.available(),
            item_subtotal: variant.price.multiply(quantity),
            item_total: effective_price.multiply(quantity),
        }
    }

    /// Immutable snapshot stored on the order.
    pub fn to_order_item(&self) -> OrderItem {
        OrderItem {
            product_id: self.product_id.clone(),
            variant_id: self.variant_id.clone(),
            product_name: self.product_name.clone(),
            product_slug: self.product_slug.clone(),
            color: self.color.clone(),
            size: self.size,
            image: self.image.clone(),
            unit_price: self.unit_price,
            discount_price: self.discount_price,
            effective_price: self.effective_price,
            quantity: self.quantity,
            item_subtotal: self.item_subtotal,
            item_total: self.item_total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedCart {
    pub items: Vec<PricedCartItem>,
    pub subtotal: Money,
    pub shipping: Money,
    pub tax: Money,
    pub total: Money,
}

impl PricedCart {
    /// A zero-valued cart with no items.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn order_items(&self) -> Vec<OrderItem> {
        self.items.iter().map(PricedCartItem::to_order_item).collect()
    }
}

/// Shipping for a subtotal: free above the threshold, else the location's
/// fee, else zero.
pub fn shipping_fee(subtotal: Money, options: &PricingOptions) -> Money {
    if options
        .free_shipping_threshold
        .is_some_and(|threshold| subtotal >= threshold)
    {
        return Money::zero();
    }
    match options.shipping_location.as_deref() {
        Some(location) => options.fee_table.fee_for(location).unwrap_or_else(|| {
            tracing::warn!(location, "no shipping fee configured for location, charging zero");
            Money::zero()
        }),
        None => {
            tracing::debug!("no shipping location selected, charging zero");
            Money::zero()
        }
    }
}

/// Reason a variant cannot be sold, if any.
fn unsellable(variant: &Variant) -> Option<&'static str> {
    if variant.images.iter().all(|url| url.trim().is_empty()) {
        Some("variant has no image")
    } else if variant.color.trim().is_empty() {
        Some("variant has no color")
    } else if !variant.price.is_positive() {
        Some("variant price is not positive")
    } else if variant.discount_price.is_negative() {
        Some("variant discount price is negative")
    } else {
        None
    }
}

fn dropped(reason: &'static str) {
    metrics::counter!("cart_lines_dropped_total", "reason" => reason).increment(1);
}

/// Prices carts against the catalog store.
#[derive(Clone)]
pub struct CartPricingEngine<S> {
    store: S,
    cache: IdResolutionCache<S>,
}

impl<S> CartPricingEngine<S>
where
    S: CommerceStore + Clone + 'static,
{
    pub fn new(store: S, cache: IdResolutionCache<S>) -> Self {
        Self { store, cache }
    }

    /// The fingerprint cache used for legacy references.
    pub fn cache(&self) -> &IdResolutionCache<S> {
        &self.cache
    }

    /// Prices `lines`.
    ///
    /// An empty input yields [`PricedCart::empty`]. Malformed ids, unknown
    /// products or variants, incomplete catalog data and zero quantities drop
    /// the line. Sold-out lines and lines asking for more than is available
    /// are kept with `available_quantity` set so the caller can report the
    /// shortfall; reservation rejects them.
    #[tracing::instrument(skip(self, lines, options), fields(lines = lines.len()))]
    pub async fn price(&self, lines: &[CartLine], options: &PricingOptions) -> Result<PricedCart> {
        metrics::counter!("cart_pricing_total").increment(1);
        if lines.is_empty() {
            return Ok(PricedCart::empty());
        }

        let mut resolved = Vec::with_capacity(lines.len());
        for line in lines {
            if line.quantity == 0 {
                tracing::debug!(?line, "dropping cart line with zero quantity");
                dropped("zero_quantity");
                continue;
            }
            match self.resolve_line(line).await? {
                Some((product_id, variant_id)) => {
                    resolved.push((product_id, variant_id, line.quantity))
                }
                None => {
                    tracing::debug!(?line, "dropping cart line with unresolvable ids");
                    dropped("unresolved_id");
                }
            }
        }

        let mut seen = HashSet::new();
        let ids: Vec<ProductId> = resolved
            .iter()
            .filter(|(product_id, _, _)| seen.insert(product_id.clone()))
            .map(|(product_id, _, _)| product_id.clone())
            .collect();
        let products: HashMap<ProductId, Product> = if ids.is_empty() {
            HashMap::new()
        } else {
            self.store
                .find_products_by_ids(&ids)
                .await?
                .into_iter()
                .map(|p| (p.id.clone(), p))
                .collect()
        };

        let mut items = Vec::with_capacity(resolved.len());
        for (product_id, variant_id, quantity) in resolved {
            let Some(product) = products.get(&product_id) else {
                tracing::debug!(%product_id, "dropping cart line for unknown product");
                dropped("product_not_found");
                continue;
            };
            let missing = product.missing_fields();
            if !missing.is_empty() {
                tracing::warn!(%product_id, ?missing, "dropping cart line for incomplete product");
                dropped("invalid_product");
                continue;
            }
            let Some(variant) = product.variant(&variant_id) else {
                tracing::debug!(%product_id, %variant_id, "dropping cart line for unknown variant");
                dropped("variant_not_found");
                continue;
            };
            if let Some(reason) = unsellable(variant) {
                tracing::debug!(%product_id, %variant_id, reason, "dropping unsellable cart line");
                dropped("unsellable_variant");
                continue;
            }
            items.push(PricedCartItem::new(product, variant, quantity));
        }

        let subtotal: Money = items.iter().map(|item| item.item_total).sum();
        let (shipping, tax) = if items.is_empty() {
            (Money::zero(), Money::zero())
        } else {
            (shipping_fee(subtotal, options), subtotal.percent_bps(TAX_RATE_BPS))
        };

        Ok(PricedCart {
            items,
            subtotal,
            shipping,
            tax,
            total: subtotal + shipping + tax,
        })
    }

    async fn resolve_line(&self, line: &CartLine) -> Result<Option<(ProductId, VariantId)>> {
        if let (ItemRef::Id(product_id), ItemRef::Id(variant_id)) =
            (&line.product_id, &line.variant_id)
        {
            return Ok(ProductId::parse(product_id)
                .ok()
                .zip(VariantId::parse(variant_id).ok()));
        }
        self.cache
            .resolve(line.product_id.fingerprint(), line.variant_id.fingerprint())
            .await
    }
}

#[cfg(test)]
mod tests {
    use store::InMemoryStore;

    use super::*;

    fn engine(products: Vec<Product>) -> CartPricingEngine<InMemoryStore> {
        let store = InMemoryStore::with_products(products);
        CartPricingEngine::new(store.clone(), IdResolutionCache::new(store))
    }

    fn dress(price: i64, discount: i64, quantity: u32) -> Product {
        Product::new(
            ProductId::new(),
            "Ankara Dress",
            "ankara-dress",
            "Wax print dress",
            "Womenswear",
        )
        .with_variant(
            Variant::new(
                VariantId::new(),
                "Emerald",
                Size::Medium,
                Money::from_units(price),
                quantity,
            )
            .with_discount_price(Money::from_units(discount))
            .with_image("dress-front.jpg")
            .with_image("dress-back.jpg"),
        )
    }

    fn line(product: &Product, quantity: u32) -> CartLine {
        CartLine::new(&product.id, &product.variants[0].id, quantity)
    }

    #[test]
    fn test_item_ref_accepts_numbers_and_strings() {
        let line: CartLine = serde_json::from_str(
            r#"{"productId": 586034808, "variantId": "507f1f77bcf86cd799439011", "quantity": 2}"#,
        )
        .unwrap();
        assert_eq!(line.product_id, ItemRef::Fingerprint(586034808));
        assert_eq!(line.variant_id, ItemRef::Id("507f1f77bcf86cd799439011".into()));
    }

    #[test]
    fn test_shipping_fee_rules() {
        let mut options = PricingOptions {
            shipping_location: Some("Lagos".into()),
            free_shipping_threshold: Some(Money::from_units(2000)),
            fee_table: ShippingFeeTable::new([("Lagos".to_string(), Money::from_units(15))]),
        };
        assert_eq!(shipping_fee(Money::from_units(2000), &options), Money::zero());
        assert_eq!(shipping_fee(Money::from_units(100), &options), Money::from_units(15));

        options.shipping_location = Some("Abuja".into());
        assert_eq!(shipping_fee(Money::from_units(100), &options), Money::zero());

        options.shipping_location = None;
        assert_eq!(shipping_fee(Money::from_units(100), &options), Money::zero());
    }

    #[tokio::test]
    async fn test_empty_cart_is_zero_not_error() {
        let cart = engine(vec![]).price(&[], &PricingOptions::default()).await.unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.total, Money::zero());
    }

    #[tokio::test]
    async fn test_discounted_line_totals() {
        let p = dress(1000, 800, 10);
        let options = PricingOptions {
            free_shipping_threshold: Some(Money::from_units(2000)),
            ..Default::default()
        };
        let cart = engine(vec![p.clone()]).price(&[line(&p, 3)], &options).await.unwrap();

        let item = &cart.items[0];
        assert_eq!(item.item_subtotal, Money::from_units(3000));
        assert_eq!(item.item_total, Money::from_units(2400));
        assert_eq!(item.image.as_deref(), Some("dress-front.jpg"));
        assert_eq!(cart.subtotal, Money::from_units(2400));
        assert_eq!(cart.shipping, Money::zero());
        assert_eq!(cart.tax, Money::from_units(180));
        assert_eq!(cart.total, Money::from_units(2580));
    }

    #[tokio::test]
    async fn test_discount_not_below_price_is_ignored() {
        let p = dress(1000, 1200, 10);
        let cart = engine(vec![p.clone()])
            .price(&[line(&p, 1)], &PricingOptions::default())
            .await
            .unwrap();
        assert_eq!(cart.items[0].effective_price, Money::from_units(1000));
    }

    #[tokio::test]
    async fn test_tax_rounds_half_away_from_zero() {
        // 0.10 * 7.5% = 0.0075, rounds to 0.01
        let p = Product::new(ProductId::new(), "Bead", "bead", "Glass bead", "Accessories")
            .with_variant(
                Variant::new(VariantId::new(), "Red", Size::Small, Money::from_cents(10), 5)
                    .with_image("bead.jpg"),
            );
        let cart = engine(vec![p.clone()])
            .price(&[line(&p, 1)], &PricingOptions::default())
            .await
            .unwrap();
        assert_eq!(cart.tax, Money::from_cents(1));
        assert_eq!(cart.total, Money::from_cents(11));
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_lines_are_dropped() {
        let p = dress(100, 0, 5);
        let bad = CartLine {
            product_id: ItemRef::Id("not-an-id".into()),
            variant_id: ItemRef::Id(p.variants[0].id.to_string()),
            quantity: 1,
        };
        let unknown = CartLine::new(&ProductId::new(), &VariantId::new(), 1);
        let wrong_variant = CartLine::new(&p.id, &VariantId::new(), 1);
        let zero = line(&p, 0);

        let cart = engine(vec![p.clone()])
            .price(&[bad, unknown, wrong_variant, zero, line(&p, 2)], &PricingOptions::default())
            .await
            .unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.subtotal, Money::from_units(200));
    }

    #[tokio::test]
    async fn test_incomplete_lines_are_dropped() {
        let mut nameless = dress(100, 0, 5);
        nameless.description = String::new();
        let imageless = Product::new(ProductId::new(), "Cap", "cap", "Kufi cap", "Menswear")
            .with_variant(Variant::new(
                VariantId::new(),
                "Black",
                Size::Medium,
                Money::from_units(10),
                4,
            ));

        let cart = engine(vec![nameless.clone(), imageless.clone()])
            .price(
                &[line(&nameless, 1), line(&imageless, 1)],
                &PricingOptions::default(),
            )
            .await
            .unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.total, Money::zero());
    }

    #[tokio::test]
    async fn test_overdrawn_line_is_kept_with_availability() {
        let p = dress(100, 0, 2);
        let cart = engine(vec![p.clone()])
            .price(&[line(&p, 5)], &PricingOptions::default())
            .await
            .unwrap();
        assert_eq!(cart.items[0].quantity, 5);
        assert_eq!(cart.items[0].available_quantity, 2);
    }

    #[tokio::test]
    async fn test_sold_out_line_is_kept_with_zero_availability() {
        let sold_out = dress(100, 0, 0);
        let cart = engine(vec![sold_out.clone()])
            .price(&[line(&sold_out, 1)], &PricingOptions::default())
            .await
            .unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].available_quantity, 0);
        assert_eq!(cart.subtotal, Money::from_units(100));
    }

    #[tokio::test]
    async fn test_fingerprint_lines_resolve_through_cache() {
        let p = dress(100, 0, 5);
        let legacy = CartLine {
            product_id: ItemRef::Fingerprint(fingerprint(p.id.as_str())),
            variant_id: ItemRef::Fingerprint(fingerprint(p.variants[0].id.as_str())),
            quantity: 1,
        };
        let cart = engine(vec![p.clone()])
            .price(&[legacy], &PricingOptions::default())
            .await
            .unwrap();
        assert_eq!(cart.items[0].product_id, p.id);
        assert_eq!(cart.items[0].variant_id, p.variants[0].id);
    }

    #[tokio::test]
    async fn test_order_item_snapshot_copies_pricing() {
        let p = dress(1000, 800, 10);
        let cart = engine(vec![p.clone()])
            .price(&[line(&p, 2)], &PricingOptions::default())
            .await
            .unwrap();
        let items = cart.order_items();
        assert_eq!(items[0].product_name, "Ankara Dress");
        assert_eq!(items[0].effective_price, Money::from_units(800));
        assert_eq!(items[0].item_total, Money::from_units(1600));
    }
}
