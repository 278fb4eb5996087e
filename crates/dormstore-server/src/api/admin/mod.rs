//! Back-office handlers, mounted behind admin bearer auth.
//!
//! - `/api/admin/products`: catalog products, including inactive
//! - `/api/admin/packages`: packages and their composition
//! - `/api/admin/orders`: order list, detail, status and payment
//! - `/api/admin/users/{user_id}/balance`: balance top-ups

pub(super) mod orders;
pub(super) mod packages;
pub(super) mod products;
pub(super) mod users;

use super::ApiError;

const MAX_NAME_LEN: usize = 200;

/// Trims a display name and enforces 1-200 characters.
fn validate_name(request_id: &str, name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::new(
            request_id,
            "validation_error",
            format!("name must be 1-{MAX_NAME_LEN} characters"),
        ));
    }
    Ok(name.to_owned())
}
