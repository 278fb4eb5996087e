//! Cart line model and the merge rules shared by guest and server carts.
//!
//! A line references exactly one catalog item through [`CartItemRef`]; the
//! product-or-package choice is carried by the enum variant, so a line can
//! never name both or neither.

use serde::{Deserialize, Serialize};

use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Product,
    Package,
}

impl ItemKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Product => "product",
            ItemKind::Package => "package",
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The catalog item a cart or order line points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum CartItemRef {
    Product { product_id: i64 },
    Package { package_id: i64 },
}

impl CartItemRef {
    /// Builds a reference from the loose `product_id`/`package_id` pair used
    /// on the wire. Exactly one of the two must be present.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidItemKind`] when both or neither id is set.
    pub fn from_ids(product_id: Option<i64>, package_id: Option<i64>) -> Result<Self, CoreError> {
        match (product_id, package_id) {
            (Some(product_id), None) => Ok(CartItemRef::Product { product_id }),
            (None, Some(package_id)) => Ok(CartItemRef::Package { package_id }),
            (Some(_), Some(_)) => Err(CoreError::InvalidItemKind(
                "line names both a product and a package".to_string(),
            )),
            (None, None) => Err(CoreError::InvalidItemKind(
                "line names neither a product nor a package".to_string(),
            )),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ItemKind {
        match self {
            CartItemRef::Product { .. } => ItemKind::Product,
            CartItemRef::Package { .. } => ItemKind::Package,
        }
    }

    #[must_use]
    pub fn id(&self) -> i64 {
        match *self {
            CartItemRef::Product { product_id } => product_id,
            CartItemRef::Package { package_id } => package_id,
        }
    }

    #[must_use]
    pub fn product_id(&self) -> Option<i64> {
        match *self {
            CartItemRef::Product { product_id } => Some(product_id),
            CartItemRef::Package { .. } => None,
        }
    }

    #[must_use]
    pub fn package_id(&self) -> Option<i64> {
        match *self {
            CartItemRef::Package { package_id } => Some(package_id),
            CartItemRef::Product { .. } => None,
        }
    }
}

impl std::fmt::Display for CartItemRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

/// Optional size/color choice for a line. Blank values normalize to `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selection {
    pub size: Option<String>,
    pub color: Option<String>,
}

impl Selection {
    #[must_use]
    pub fn new(size: Option<String>, color: Option<String>) -> Self {
        Self {
            size: normalize(size),
            color: normalize(color),
        }
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Identity used to merge lines: same item plus same selection.
///
/// Guest carts also use it as the line id, since they have no row id.
#[must_use]
pub fn merge_key(item: &CartItemRef, selection: &Selection) -> String {
    format!(
        "{}:{}:{}:{}",
        item.kind(),
        item.id(),
        selection.size.as_deref().unwrap_or(""),
        selection.color.as_deref().unwrap_or("")
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    /// Row id for server carts, merge key for guest carts.
    pub id: String,
    pub item: CartItemRef,
    pub quantity: i32,
    #[serde(flatten)]
    pub selection: Selection,
}

impl CartLine {
    #[must_use]
    pub fn merge_key(&self) -> String {
        merge_key(&self.item, &self.selection)
    }
}

/// Rejects quantities below one.
///
/// # Errors
///
/// Returns [`CoreError::InvalidQuantity`].
pub fn ensure_positive(quantity: i32) -> Result<i32, CoreError> {
    if quantity >= 1 {
        Ok(quantity)
    } else {
        Err(CoreError::InvalidQuantity(quantity))
    }
}

/// Merges `quantity` of `item` into a client-held line list.
///
/// An existing line with the same merge key absorbs the quantity; otherwise a
/// new line keyed by the merge key is appended. Returns the resulting line.
pub fn merge_line(
    lines: &mut Vec<CartLine>,
    item: CartItemRef,
    selection: Selection,
    quantity: i32,
) -> CartLine {
    let key = merge_key(&item, &selection);
    if let Some(line) = lines.iter_mut().find(|l| l.merge_key() == key) {
        line.quantity = line.quantity.saturating_add(quantity);
        return line.clone();
    }

    let line = CartLine {
        id: key,
        item,
        quantity,
        selection,
    };
    lines.push(line.clone());
    line
}

/// Sums quantities per catalog item across lines, regardless of selection.
///
/// Two lines for the same product in different sizes draw on the same stock
/// column, so availability checks must look at their total.
#[must_use]
pub fn quantities_by_item<'a, I>(lines: I) -> Vec<(CartItemRef, i32)>
where
    I: IntoIterator<Item = (&'a CartItemRef, i32)>,
{
    let mut totals: Vec<(CartItemRef, i32)> = Vec::new();
    for (item, quantity) in lines {
        match totals.iter_mut().find(|(i, _)| i == item) {
            Some((_, total)) => *total = total.saturating_add(quantity),
            None => totals.push((*item, quantity)),
        }
    }
    totals
}
