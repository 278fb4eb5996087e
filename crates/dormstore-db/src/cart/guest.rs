use dormstore_core::{merge_line, CartItemRef, CartLine, Selection};

use super::CartStore;
use crate::DbError;

/// A guest's cart, held by the client and sent with each request.
///
/// Line ids are merge keys. Incoming lines are normalized on construction:
/// duplicates merge, non-positive quantities are dropped.
#[derive(Debug, Clone, Default)]
pub struct GuestCart {
    lines: Vec<CartLine>,
}

impl GuestCart {
    #[must_use]
    pub fn new(lines: Vec<CartLine>) -> Self {
        let mut normalized = Vec::with_capacity(lines.len());
        for line in lines.into_iter().filter(|l| l.quantity > 0) {
            merge_line(&mut normalized, line.item, line.selection, line.quantity);
        }
        Self { lines: normalized }
    }

    #[must_use]
    pub fn into_lines(self) -> Vec<CartLine> {
        self.lines
    }
}

impl CartStore for GuestCart {
    async fn lines(&mut self) -> Result<Vec<CartLine>, DbError> {
        Ok(self.lines.clone())
    }

    async fn merge(
        &mut self,
        item: CartItemRef,
        selection: &Selection,
        quantity: i32,
    ) -> Result<CartLine, DbError> {
        Ok(merge_line(&mut self.lines, item, selection.clone(), quantity))
    }

    async fn set_quantity(
        &mut self,
        line_id: &str,
        quantity: i32,
    ) -> Result<Option<CartLine>, DbError> {
        Ok(self
            .lines
            .iter_mut()
            .find(|l| l.id == line_id)
            .map(|line| {
                line.quantity = quantity;
                line.clone()
            }))
    }

    async fn remove(&mut self, line_ids: &[String]) -> Result<(), DbError> {
        self.lines.retain(|l| !line_ids.contains(&l.id));
        Ok(())
    }

    async fn clear(&mut self) -> Result<(), DbError> {
        self.lines.clear();
        Ok(())
    }
}
