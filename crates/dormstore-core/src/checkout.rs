//! Checkout arithmetic and pre-persistence validation.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::cart::CartItemRef;
use crate::CoreError;

/// Sales tax applied to the subtotal (13%).
pub const TAX_RATE: Decimal = Decimal::from_parts(13, 0, 0, false, 2);

/// Fixed-rate shipping options offered at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingMethod {
    Standard,
    Express,
    CampusPickup,
}

impl ShippingMethod {
    #[must_use]
    pub fn cost(self) -> Decimal {
        match self {
            ShippingMethod::Standard => Decimal::new(1050, 2),
            ShippingMethod::Express => Decimal::new(2499, 2),
            ShippingMethod::CampusPickup => Decimal::new(0, 2),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ShippingMethod::Standard => "standard",
            ShippingMethod::Express => "express",
            ShippingMethod::CampusPickup => "campus_pickup",
        }
    }
}

impl FromStr for ShippingMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(ShippingMethod::Standard),
            "express" => Ok(ShippingMethod::Express),
            "campus_pickup" => Ok(ShippingMethod::CampusPickup),
            other => Err(CoreError::UnknownShippingMethod(other.to_string())),
        }
    }
}

/// Contact and delivery details captured on the order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingInfo {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
}

impl ShippingInfo {
    /// Requires every mandatory field to be non-blank and the email to
    /// contain an `@`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingField`] naming the first blank field.
    pub fn validate(&self) -> Result<(), CoreError> {
        let required = [
            ("firstName", &self.first_name),
            ("lastName", &self.last_name),
            ("email", &self.email),
            ("address", &self.address),
            ("city", &self.city),
            ("province", &self.province),
            ("postalCode", &self.postal_code),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(CoreError::MissingField { field });
            }
        }
        if !self.email.contains('@') {
            return Err(CoreError::MissingField { field: "email" });
        }
        Ok(())
    }
}

/// Monetary breakdown of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

/// Rounds to cents, halves away from zero.
#[must_use]
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Computes `subtotal`, `tax = round(subtotal * 13%)`, and
/// `total = subtotal + shipping + tax` from `(unit_price, quantity)` pairs.
pub fn compute_totals<I>(lines: I, shipping: ShippingMethod) -> Totals
where
    I: IntoIterator<Item = (Decimal, i32)>,
{
    let subtotal = round_money(
        lines
            .into_iter()
            .map(|(price, quantity)| price * Decimal::from(quantity))
            .sum(),
    );
    let tax = round_money(subtotal * TAX_RATE);
    let shipping = shipping.cost();

    Totals {
        subtotal,
        tax,
        shipping,
        total: subtotal + shipping + tax,
    }
}

/// One cart line that cannot be filled from current stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockShortfall {
    pub item: CartItemRef,
    /// `None` when the item no longer exists in the catalog.
    pub name: Option<String>,
    pub requested: i32,
    pub available: i32,
}

/// Compares requested quantities against available stock.
///
/// `requested` should already be summed per item. `lookup` returns the
/// entry's name and sellable stock, or `None` when the item is missing or
/// inactive, which counts as zero available.
pub fn find_shortfalls<F>(requested: &[(CartItemRef, i32)], lookup: F) -> Vec<StockShortfall>
where
    F: Fn(&CartItemRef) -> Option<(String, i32)>,
{
    requested
        .iter()
        .filter_map(|(item, quantity)| {
            let (name, available) = match lookup(item) {
                Some((name, stock)) => (Some(name), stock.max(0)),
                None => (None, 0),
            };
            (*quantity > available).then(|| StockShortfall {
                item: *item,
                name,
                requested: *quantity,
                available,
            })
        })
        .collect()
}
