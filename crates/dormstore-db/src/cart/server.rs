use dormstore_core::{merge_key, CartItemRef, CartLine, Selection};
use sqlx::{PgConnection, PgPool};

use super::CartStore;
use crate::DbError;

/// Cart lines persisted in `cart_items` for one user.
#[derive(Debug, Clone)]
pub struct ServerCart {
    pool: PgPool,
    user_id: i64,
}

impl ServerCart {
    #[must_use]
    pub fn new(pool: PgPool, user_id: i64) -> Self {
        Self { pool, user_id }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CartItemRow {
    id: i64,
    product_id: Option<i64>,
    package_id: Option<i64>,
    quantity: i32,
    size: Option<String>,
    color: Option<String>,
}

impl TryFrom<CartItemRow> for CartLine {
    type Error = DbError;

    fn try_from(row: CartItemRow) -> Result<Self, Self::Error> {
        let item = CartItemRef::from_ids(row.product_id, row.package_id)
            .map_err(|e| DbError::Invalid(format!("cart_items row {}: {e}", row.id)))?;
        Ok(CartLine {
            id: row.id.to_string(),
            item,
            quantity: row.quantity,
            selection: Selection::new(row.size, row.color),
        })
    }
}

const CART_COLUMNS: &str = "id, product_id, package_id, quantity, size, color";

/// Loads a user's lines, optionally row-locking them for the caller's
/// transaction.
pub(crate) async fn load_lines(
    conn: &mut PgConnection,
    user_id: i64,
    for_update: bool,
) -> Result<Vec<CartLine>, DbError> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let rows = sqlx::query_as::<_, CartItemRow>(&format!(
        "SELECT {CART_COLUMNS} FROM cart_items WHERE user_id = $1 ORDER BY id{lock}"
    ))
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(CartLine::try_from).collect()
}

pub(crate) async fn delete_lines(conn: &mut PgConnection, user_id: i64) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Server line ids are row ids; anything that does not parse matches nothing.
fn parse_ids(line_ids: &[String]) -> Vec<i64> {
    line_ids
        .iter()
        .filter_map(|id| id.parse::<i64>().ok())
        .collect()
}

impl CartStore for ServerCart {
    async fn lines(&mut self) -> Result<Vec<CartLine>, DbError> {
        let mut conn = self.pool.acquire().await?;
        load_lines(&mut conn, self.user_id, false).await
    }

    async fn merge(
        &mut self,
        item: CartItemRef,
        selection: &Selection,
        quantity: i32,
    ) -> Result<CartLine, DbError> {
        let row = sqlx::query_as::<_, CartItemRow>(&format!(
            "INSERT INTO cart_items \
                 (user_id, item_type, product_id, package_id, quantity, size, color, item_key) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (user_id, item_key) DO UPDATE \
                 SET quantity = cart_items.quantity + EXCLUDED.quantity, updated_at = NOW() \
             RETURNING {CART_COLUMNS}"
        ))
        .bind(self.user_id)
        .bind(item.kind().as_str())
        .bind(item.product_id())
        .bind(item.package_id())
        .bind(quantity)
        .bind(&selection.size)
        .bind(&selection.color)
        .bind(merge_key(&item, selection))
        .fetch_one(&self.pool)
        .await?;

        CartLine::try_from(row)
    }

    async fn set_quantity(
        &mut self,
        line_id: &str,
        quantity: i32,
    ) -> Result<Option<CartLine>, DbError> {
        let Ok(id) = line_id.parse::<i64>() else {
            return Ok(None);
        };

        let row = sqlx::query_as::<_, CartItemRow>(&format!(
            "UPDATE cart_items SET quantity = $3, updated_at = NOW() \
             WHERE id = $1 AND user_id = $2 \
             RETURNING {CART_COLUMNS}"
        ))
        .bind(id)
        .bind(self.user_id)
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CartLine::try_from).transpose()
    }

    async fn remove(&mut self, line_ids: &[String]) -> Result<(), DbError> {
        let ids = parse_ids(line_ids);
        if ids.is_empty() {
            return Ok(());
        }

        sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND id = ANY($2)")
            .bind(self.user_id)
            .bind(&ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear(&mut self) -> Result<(), DbError> {
        let mut conn = self.pool.acquire().await?;
        delete_lines(&mut conn, self.user_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ids_skips_guest_style_ids() {
        let ids = vec!["12".to_string(), "product:5::".to_string(), "7".to_string()];
        assert_eq!(parse_ids(&ids), vec![12, 7]);
    }

    #[test]
    fn row_converts_to_package_line() {
        let row = CartItemRow {
            id: 4,
            product_id: None,
            package_id: Some(39),
            quantity: 2,
            size: None,
            color: Some(" ".to_string()),
        };
        let line = CartLine::try_from(row).unwrap();
        assert_eq!(line.id, "4");
        assert_eq!(line.item, CartItemRef::Package { package_id: 39 });
        assert_eq!(line.selection, Selection::default());
    }
}
