//! Live catalog view shared by the cart and checkout paths.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::cart::{CartItemRef, Selection};

/// Current catalog data for one product or package, as joined into cart
/// lines and re-read at checkout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub item: CartItemRef,
    pub name: String,
    pub price: Decimal,
    pub image_url: Option<String>,
    /// Resolved stock. For composite packages this is the derived value kept
    /// current by the inventory triggers.
    pub stock: i32,
    /// `false` when the entry is deactivated or soft-deleted.
    pub is_active: bool,
    /// Selectable sizes; empty when the item has no size options.
    pub sizes: Vec<String>,
    /// Selectable colors; empty when the item has no color options.
    pub colors: Vec<String>,
}

impl CatalogEntry {
    /// Checks a size/color selection against the entry's option lists.
    ///
    /// A missing selection is always accepted. A present selection must
    /// match one of the options (case-insensitive) when options exist.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason naming the rejected value.
    pub fn check_selection(&self, selection: &Selection) -> Result<(), String> {
        check_option("size", selection.size.as_deref(), &self.sizes)?;
        check_option("color", selection.color.as_deref(), &self.colors)
    }
}

fn check_option(field: &str, chosen: Option<&str>, options: &[String]) -> Result<(), String> {
    match chosen {
        Some(value) if !options.is_empty() => {
            if options.iter().any(|o| o.eq_ignore_ascii_case(value)) {
                Ok(())
            } else {
                Err(format!(
                    "{field} '{value}' is not available; choose one of: {}",
                    options.join(", ")
                ))
            }
        }
        _ => Ok(()),
    }
}

/// Splits a comma-separated option column (`"S, M, L"`) into trimmed values.
///
/// A single value without commas yields a one-element list; `None` or a
/// blank string yields an empty list.
#[must_use]
pub fn option_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(ToOwned::to_owned)
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tee() -> CatalogEntry {
        CatalogEntry {
            item: CartItemRef::Product { product_id: 1 },
            name: "Campus Tee".to_string(),
            price: Decimal::new(2000, 2),
            image_url: None,
            stock: 4,
            is_active: true,
            sizes: option_list(Some("S, M, L")),
            colors: option_list(Some("Navy")),
        }
    }

    #[test]
    fn option_list_splits_and_trims() {
        assert_eq!(option_list(Some(" S,M , L ,")), vec!["S", "M", "L"]);
        assert_eq!(option_list(Some("One Size")), vec!["One Size"]);
        assert!(option_list(Some("  ")).is_empty());
        assert!(option_list(None).is_empty());
    }

    #[test]
    fn selection_must_match_options() {
        let entry = tee();
        let ok = Selection::new(Some("m".to_string()), Some("NAVY".to_string()));
        assert!(entry.check_selection(&ok).is_ok());

        let bad = Selection::new(Some("XL".to_string()), None);
        let err = entry.check_selection(&bad).unwrap_err();
        assert!(err.contains("size 'XL'"), "unexpected message: {err}");
    }

    #[test]
    fn missing_selection_is_accepted() {
        assert!(tee().check_selection(&Selection::default()).is_ok());
    }

    #[test]
    fn selection_on_item_without_options_is_accepted() {
        let mut entry = tee();
        entry.sizes.clear();
        let sel = Selection::new(Some("anything".to_string()), None);
        assert!(entry.check_selection(&sel).is_ok());
    }
}
