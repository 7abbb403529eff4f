//! Catalog products and their sellable variants.
//!
//! Variant stock is the only catalog state the engine mutates. `in_stock` is
//! derived from `quantity - reserved_quantity` on every mutation and on load;
//! it is never accepted from a caller.

use common::{ProductId, VariantId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::Money;

/// Garment size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Size {
    #[serde(rename = "XS")]
    ExtraSmall,
    #[serde(rename = "S")]
    Small,
    #[serde(rename = "M")]
    Medium,
    #[serde(rename = "L")]
    Large,
    #[serde(rename = "XL")]
    ExtraLarge,
    #[serde(rename = "XXL")]
    ExtraExtraLarge,
    #[serde(rename = "XXXL")]
    TripleExtraLarge,
}

impl Size {
    pub fn as_str(&self) -> &'static str {
        match self {
            Size::ExtraSmall => "XS",
            Size::Small => "S",
            Size::Medium => "M",
            Size::Large => "L",
            Size::ExtraLarge => "XL",
            Size::ExtraExtraLarge => "XXL",
            Size::TripleExtraLarge => "XXXL",
        }
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimum number of populated measurement fields per variant.
pub const MIN_MEASUREMENTS: usize = 5;

/// Garment measurements in centimetres.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bust: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waist: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hip: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleeve: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shoulder: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inseam: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thigh: Option<f64>,
}

impl Measurements {
    fn fields(&self) -> [(&'static str, Option<f64>); 8] {
        [
            ("bust", self.bust),
            ("waist", self.waist),
            ("hip", self.hip),
            ("length", self.length),
            ("sleeve", self.sleeve),
            ("shoulder", self.shoulder),
            ("inseam", self.inseam),
            ("thigh", self.thigh),
        ]
    }

    /// Number of populated fields.
    pub fn populated(&self) -> usize {
        self.fields().iter().filter(|(_, v)| v.is_some()).count()
    }

    /// Checks that at least [`MIN_MEASUREMENTS`] fields are set and all set
    /// fields are positive.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in self.fields() {
            if let Some(v) = value
                && !(v.is_finite() && v > 0.0)
            {
                return Err(format!("measurement {name} must be positive, got {v}"));
            }
        }
        let populated = self.populated();
        if populated < MIN_MEASUREMENTS {
            return Err(format!(
                "at least {MIN_MEASUREMENTS} measurements required, got {populated}"
            ));
        }
        Ok(())
    }
}

/// Stored shape of a variant. `in_stock` is ignored on load and re-derived.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariantDocument {
    id: VariantId,
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    color: String,
    size: Size,
    price: Money,
    #[serde(default)]
    discount_price: Money,
    quantity: u32,
    #[serde(default)]
    reserved_quantity: u32,
    #[serde(default)]
    measurements: Option<Measurements>,
}

impl TryFrom<VariantDocument> for Variant {
    type Error = DomainError;

    fn try_from(doc: VariantDocument) -> Result<Self, Self::Error> {
        if doc.reserved_quantity > doc.quantity {
            return Err(DomainError::InvalidVariant {
                variant_id: doc.id.to_string(),
                reason: format!(
                    "reserved quantity {} exceeds quantity {}",
                    doc.reserved_quantity, doc.quantity
                ),
            });
        }
        let mut variant = Variant {
            id: doc.id,
            images: doc.images,
            color: doc.color,
            size: doc.size,
            price: doc.price,
            discount_price: doc.discount_price,
            quantity: doc.quantity,
            reserved_quantity: doc.reserved_quantity,
            in_stock: false,
            measurements: doc.measurements,
        };
        variant.refresh_in_stock();
        Ok(variant)
    }
}

/// A sellable color/size/price combination of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "VariantDocument")]
pub struct Variant {
    pub id: VariantId,
    /// Ordered image URLs, first is the primary image.
    pub images: Vec<String>,
    pub color: String,
    pub size: Size,
    pub price: Money,
    /// Effective only when `0 < discount_price < price`.
    pub discount_price: Money,
    quantity: u32,
    reserved_quantity: u32,
    in_stock: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurements: Option<Measurements>,
}

impl Variant {
    /// Creates a variant with no reserved units.
    pub fn new(
        id: VariantId,
        color: impl Into<String>,
        size: Size,
        price: Money,
        quantity: u32,
    ) -> Self {
        let mut variant = Self {
            id,
            images: Vec::new(),
            color: color.into(),
            size,
            price,
            discount_price: Money::zero(),
            quantity,
            reserved_quantity: 0,
            in_stock: false,
            measurements: None,
        };
        variant.refresh_in_stock();
        variant
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.images.push(url.into());
        self
    }

    pub fn with_discount_price(mut self, discount_price: Money) -> Self {
        self.discount_price = discount_price;
        self
    }

    pub fn with_measurements(mut self, measurements: Measurements) -> Self {
        self.measurements = Some(measurements);
        self
    }

    /// On-hand units.
    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Units held by unpaid orders.
    pub fn reserved_quantity(&self) -> u32 {
        self.reserved_quantity
    }

    /// Units that can still be reserved.
    pub fn available(&self) -> u32 {
        self.quantity.saturating_sub(self.reserved_quantity)
    }

    pub fn in_stock(&self) -> bool {
        self.in_stock
    }

    /// Discount price when `0 < discount_price < price`, else the regular price.
    pub fn effective_price(&self) -> Money {
        if self.discount_price.is_positive() && self.discount_price < self.price {
            self.discount_price
        } else {
            self.price
        }
    }

    /// Places a hold on `quantity` units.
    pub fn hold(&mut self, quantity: u32) -> Result<(), DomainError> {
        let available = self.available();
        if quantity > available {
            return Err(DomainError::HoldExceedsAvailable {
                variant_id: self.id.to_string(),
                requested: quantity,
                available,
            });
        }
        self.reserved_quantity += quantity;
        self.refresh_in_stock();
        Ok(())
    }

    /// Returns up to `quantity` held units to the available pool.
    pub fn release_hold(&mut self, quantity: u32) {
        self.reserved_quantity = self.reserved_quantity.saturating_sub(quantity);
        self.refresh_in_stock();
    }

    /// Permanently removes `quantity` on-hand units.
    ///
    /// Holds never exceed on-hand stock; any excess left by the removal is
    /// clamped away.
    pub fn deduct(&mut self, quantity: u32) {
        self.quantity = self.quantity.saturating_sub(quantity);
        self.reserved_quantity = self.reserved_quantity.min(self.quantity);
        self.refresh_in_stock();
    }

    fn refresh_in_stock(&mut self) {
        self.in_stock = self.available() > 0;
    }

    /// Input validation for catalog writes.
    pub fn validate(&self) -> Result<(), DomainError> {
        let invalid = |reason: String| DomainError::InvalidVariant {
            variant_id: self.id.to_string(),
            reason,
        };
        if self.images.iter().all(|url| url.trim().is_empty()) {
            return Err(invalid("at least one image is required".to_string()));
        }
        if self.color.trim().is_empty() {
            return Err(invalid("color is required".to_string()));
        }
        if !self.price.is_positive() {
            return Err(invalid(format!("price must be positive, got {}", self.price)));
        }
        if self.discount_price.is_negative() {
            return Err(invalid(format!(
                "discount price must not be negative, got {}",
                self.discount_price
            )));
        }
        if let Some(measurements) = &self.measurements {
            measurements.validate().map_err(invalid)?;
        }
        Ok(())
    }
}

/// A catalog product with its ordered list of variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub variants: Vec<Variant>,
}

impl Product {
    /// Creates a product with no variants.
    pub fn new(
        id: ProductId,
        name: impl Into<String>,
        slug: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            slug: slug.into(),
            description: description.into(),
            category: category.into(),
            material: None,
            owner: None,
            is_featured: false,
            variants: Vec::new(),
        }
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variants.push(variant);
        self
    }

    pub fn variant(&self, variant_id: &VariantId) -> Option<&Variant> {
        self.variants.iter().find(|v| &v.id == variant_id)
    }

    pub fn variant_mut(&mut self, variant_id: &VariantId) -> Option<&mut Variant> {
        self.variants.iter_mut().find(|v| &v.id == variant_id)
    }

    /// Names the required descriptive fields that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("name", &self.name),
            ("slug", &self.slug),
            ("description", &self.description),
            ("category", &self.category),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    /// Input validation for catalog writes and seed loading.
    pub fn validate(&self) -> Result<(), DomainError> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(DomainError::InvalidProduct(format!(
                "{}: missing {}",
                self.id,
                missing.join(", ")
            )));
        }
        if self.variants.is_empty() {
            return Err(DomainError::InvalidProduct(format!(
                "{}: at least one variant is required",
                self.id
            )));
        }
        for variant in &self.variants {
            variant.validate()?;
        }
        Ok(())
    }
}
