//! Package composition resolver.
//!
//! A package with no composition rows is standalone and sells from its own
//! stored stock. A package with rows is composite: its stock is the number of
//! whole packages the scarcest constituent can supply.

use serde::Serialize;

/// One composition row joined with its product's current availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ComponentStock {
    pub product_id: i64,
    /// Units of the product consumed per package (at least 1).
    pub quantity: i32,
    /// Product stock, or `None` when the product is missing, inactive, or
    /// soft-deleted.
    pub product_stock: Option<i32>,
}

impl ComponentStock {
    /// Whole packages this component alone could supply.
    #[must_use]
    pub fn supports(&self) -> i32 {
        let available = self.product_stock.unwrap_or(0).max(0);
        available / self.quantity.max(1)
    }
}

/// Returns the effective stock of a package.
///
/// Standalone packages (no components) return `stored`. Composite packages
/// return `min(floor(product_stock / quantity))` across components.
#[must_use]
pub fn resolve_package_stock(stored: i32, components: &[ComponentStock]) -> i32 {
    components
        .iter()
        .map(ComponentStock::supports)
        .min()
        .unwrap_or(stored)
}

/// The component that limits a composite package, if any.
///
/// Ties resolve to the first component in slice order.
#[must_use]
pub fn binding_component(components: &[ComponentStock]) -> Option<&ComponentStock> {
    components.iter().min_by_key(|c| c.supports())
}
