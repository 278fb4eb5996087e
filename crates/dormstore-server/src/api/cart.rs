//! Cart routes.
//!
//! Signed-in users get a server-side cart. Guests send their cart array as
//! `guestCart` in each request body and get the updated array back, already
//! validated against live stock.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use dormstore_core::{CartItemRef, CartLine, Selection};
use dormstore_db::{CartError, CartStore, CartView, DbError, GuestCart, ServerCart};
use serde::{Deserialize, Serialize};

use crate::middleware::{Identity, RequestId};

use super::{map_db_error, ApiError, ApiResponse, AppState};

/// A guest cart line as clients send it.
///
/// Accepts either the tagged `item` we return or the loose
/// `productId`/`packageId` pair. Any client-side `price` is ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GuestLineInput {
    #[serde(default)]
    pub item: Option<CartItemRef>,
    #[serde(default, alias = "product_id")]
    pub product_id: Option<i64>,
    #[serde(default, alias = "package_id")]
    pub package_id: Option<i64>,
    pub quantity: i32,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl GuestLineInput {
    pub(super) fn item_ref(&self) -> Result<CartItemRef, String> {
        match self.item {
            Some(item) => Ok(item),
            None => CartItemRef::from_ids(self.product_id, self.package_id).map_err(|e| e.to_string()),
        }
    }

    pub(super) fn into_line(self) -> Result<CartLine, String> {
        let item = self.item_ref()?;
        let selection = Selection::new(self.size, self.color);
        Ok(CartLine {
            id: dormstore_core::merge_key(&item, &selection),
            item,
            quantity: self.quantity,
            selection,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GuestCartBody {
    #[serde(default)]
    guest_cart: Vec<GuestLineInput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct AddToCartBody {
    #[serde(default, alias = "product_id")]
    product_id: Option<i64>,
    #[serde(default, alias = "package_id")]
    package_id: Option<i64>,
    #[serde(default = "default_quantity")]
    quantity: i32,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    guest_cart: Vec<GuestLineInput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct UpdateLineBody {
    quantity: i32,
    #[serde(default)]
    guest_cart: Vec<GuestLineInput>,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CartResponse {
    cart: CartView,
    /// The guest's normalized cart array; absent for signed-in users.
    #[serde(skip_serializing_if = "Option::is_none")]
    guest_cart: Option<Vec<CartLine>>,
}

/// Either cart store, chosen per request from the caller's identity.
enum RequestCart {
    Server(ServerCart),
    Guest(GuestCart),
}

impl RequestCart {
    fn for_identity(
        state: &AppState,
        identity: &Identity,
        guest_lines: Vec<GuestLineInput>,
    ) -> Result<Self, String> {
        match identity {
            Identity::User(user) => Ok(Self::Server(ServerCart::new(state.pool.clone(), user.id))),
            Identity::Guest => {
                let lines = guest_lines
                    .into_iter()
                    .map(GuestLineInput::into_line)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Guest(GuestCart::new(lines)))
            }
        }
    }

    fn into_guest_lines(self) -> Option<Vec<CartLine>> {
        match self {
            Self::Server(_) => None,
            Self::Guest(cart) => Some(cart.into_lines()),
        }
    }
}

impl CartStore for RequestCart {
    async fn lines(&mut self) -> Result<Vec<CartLine>, DbError> {
        match self {
            Self::Server(cart) => cart.lines().await,
            Self::Guest(cart) => cart.lines().await,
        }
    }

    async fn merge(
        &mut self,
        item: CartItemRef,
        selection: &Selection,
        quantity: i32,
    ) -> Result<CartLine, DbError> {
        match self {
            Self::Server(cart) => cart.merge(item, selection, quantity).await,
            Self::Guest(cart) => cart.merge(item, selection, quantity).await,
        }
    }

    async fn set_quantity(
        &mut self,
        line_id: &str,
        quantity: i32,
    ) -> Result<Option<CartLine>, DbError> {
        match self {
            Self::Server(cart) => cart.set_quantity(line_id, quantity).await,
            Self::Guest(cart) => cart.set_quantity(line_id, quantity).await,
        }
    }

    async fn remove(&mut self, line_ids: &[String]) -> Result<(), DbError> {
        match self {
            Self::Server(cart) => cart.remove(line_ids).await,
            Self::Guest(cart) => cart.remove(line_ids).await,
        }
    }

    async fn clear(&mut self) -> Result<(), DbError> {
        match self {
            Self::Server(cart) => cart.clear().await,
            Self::Guest(cart) => cart.clear().await,
        }
    }
}

fn map_cart_error(request_id: &str, error: &CartError) -> ApiError {
    match error {
        CartError::OutOfStock {
            item,
            name,
            requested,
            available,
        } => ApiError::new(request_id, "out_of_stock", error.to_string()).with_details(
            serde_json::json!({
                "item": item,
                "name": name,
                "requested": requested,
                "available": available,
            }),
        ),
        CartError::ItemNotFound { .. } | CartError::LineNotFound { .. } => {
            ApiError::new(request_id, "not_found", error.to_string())
        }
        CartError::InvalidSelection(_) | CartError::InvalidQuantity(_) => {
            ApiError::new(request_id, "validation_error", error.to_string())
        }
        CartError::Db(e) => map_db_error(request_id.to_string(), e),
    }
}

/// Parses an optional JSON body; DELETE requests commonly carry none.
fn parse_optional_body(request_id: &str, body: &Bytes) -> Result<GuestCartBody, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(GuestCartBody::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::new(request_id, "bad_request", format!("invalid JSON body: {e}")))
}

async fn respond(
    state: &AppState,
    request_id: String,
    mut cart: RequestCart,
) -> Result<Json<ApiResponse<CartResponse>>, ApiError> {
    let view = dormstore_db::get_cart(&state.pool, &mut cart)
        .await
        .map_err(|e| map_cart_error(&request_id, &e))?;

    Ok(Json(ApiResponse::new(
        CartResponse {
            cart: view,
            guest_cart: cart.into_guest_lines(),
        },
        request_id,
    )))
}

fn open_cart(
    state: &AppState,
    request_id: &str,
    identity: &Identity,
    guest_lines: Vec<GuestLineInput>,
) -> Result<RequestCart, ApiError> {
    RequestCart::for_identity(state, identity, guest_lines)
        .map_err(|message| ApiError::new(request_id, "validation_error", message))
}

/// GET /cart - a guest has no server state, so this reads as empty for them.
pub(super) async fn get_cart(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ApiResponse<CartResponse>>, ApiError> {
    let cart = open_cart(&state, &req_id.0, &identity, Vec::new())?;
    respond(&state, req_id.0, cart).await
}

/// POST /cart/resolve - validates a guest cart array against live stock.
pub(super) async fn resolve_cart(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<GuestCartBody>,
) -> Result<Json<ApiResponse<CartResponse>>, ApiError> {
    let cart = open_cart(&state, &req_id.0, &identity, body.guest_cart)?;
    respond(&state, req_id.0, cart).await
}

pub(super) async fn add_to_cart(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<AddToCartBody>,
) -> Result<(StatusCode, Json<ApiResponse<CartResponse>>), ApiError> {
    let rid = req_id.0;
    let item = CartItemRef::from_ids(body.product_id, body.package_id)
        .map_err(|e| ApiError::new(&rid, "validation_error", e.to_string()))?;
    let mut cart = open_cart(&state, &rid, &identity, body.guest_cart)?;

    dormstore_db::add_item(
        &state.pool,
        &mut cart,
        item,
        Selection::new(body.size, body.color),
        body.quantity,
    )
    .await
    .map_err(|e| map_cart_error(&rid, &e))?;

    let response = respond(&state, rid, cart).await?;
    Ok((StatusCode::CREATED, response))
}

/// PUT /cart/{line_id} - quantity 0 removes the line.
pub(super) async fn update_cart_line(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path(line_id): Path<String>,
    Json(body): Json<UpdateLineBody>,
) -> Result<Json<ApiResponse<CartResponse>>, ApiError> {
    let rid = req_id.0;
    let mut cart = open_cart(&state, &rid, &identity, body.guest_cart)?;

    dormstore_db::update_quantity(&state.pool, &mut cart, &line_id, body.quantity)
        .await
        .map_err(|e| map_cart_error(&rid, &e))?;

    respond(&state, rid, cart).await
}

pub(super) async fn remove_cart_line(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path(line_id): Path<String>,
    body: Bytes,
) -> Result<Json<ApiResponse<CartResponse>>, ApiError> {
    let rid = req_id.0;
    let body = parse_optional_body(&rid, &body)?;
    let mut cart = open_cart(&state, &rid, &identity, body.guest_cart)?;

    dormstore_db::remove_item(&mut cart, &line_id)
        .await
        .map_err(|e| map_cart_error(&rid, &e))?;

    respond(&state, rid, cart).await
}

pub(super) async fn clear_cart(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> Result<Json<ApiResponse<CartResponse>>, ApiError> {
    let rid = req_id.0;
    let body = parse_optional_body(&rid, &body)?;
    let mut cart = open_cart(&state, &rid, &identity, body.guest_cart)?;

    dormstore_db::clear_cart(&mut cart)
        .await
        .map_err(|e| map_cart_error(&rid, &e))?;

    respond(&state, rid, cart).await
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use super::super::test_support::{authed_get, get, json_request, seed_product, seed_user, send};
    use super::*;

    #[test]
    fn guest_line_accepts_loose_ids_and_ignores_price() {
        let input: GuestLineInput = serde_json::from_value(json!({
            "product_id": 5,
            "quantity": 2,
            "size": "M",
            "price": "0.01"
        }))
        .unwrap();
        let line = input.into_line().unwrap();
        assert_eq!(line.item, CartItemRef::Product { product_id: 5 });
        assert_eq!(line.id, "product:5:M:");
    }

    #[test]
    fn guest_line_accepts_tagged_item() {
        let input: GuestLineInput = serde_json::from_value(json!({
            "item": { "kind": "package", "packageId": 39 },
            "quantity": 1
        }))
        .unwrap();
        assert_eq!(
            input.item_ref().unwrap(),
            CartItemRef::Package { package_id: 39 }
        );
    }

    #[test]
    fn guest_line_naming_both_items_is_rejected() {
        let input: GuestLineInput = serde_json::from_value(json!({
            "productId": 5,
            "packageId": 39,
            "quantity": 1
        }))
        .unwrap();
        assert!(input.into_line().is_err());
    }

    #[test]
    fn empty_delete_body_parses_as_empty_cart() {
        let body = parse_optional_body("r", &Bytes::from_static(b"  ")).unwrap();
        assert!(body.guest_cart.is_empty());
        assert!(parse_optional_body("r", &Bytes::from_static(b"{oops")).is_err());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn guest_add_returns_merged_guest_cart(pool: sqlx::PgPool) {
        let lamp = seed_product(&pool, "Desk Lamp", 2500, 5).await;

        let body = json!({
            "productId": lamp,
            "quantity": 2,
            "guestCart": [{ "productId": lamp, "quantity": 1 }]
        });
        let response = send(pool, json_request(Method::POST, "/cart", None, &body)).await;
        assert_eq!(response.status, StatusCode::CREATED);

        let data = &response.json["data"];
        assert_eq!(data["guestCart"].as_array().map(Vec::len), Some(1));
        assert_eq!(data["guestCart"][0]["quantity"], 3);
        assert_eq!(data["cart"]["subtotal"], "75.00");
        assert_eq!(data["cart"]["itemCount"], 3);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn adding_beyond_stock_is_out_of_stock(pool: sqlx::PgPool) {
        let lamp = seed_product(&pool, "Desk Lamp", 2500, 2).await;
        let (_, token) = seed_user(&pool, "sam@example.edu").await;

        let body = json!({ "productId": lamp, "quantity": 3 });
        let response = send(pool, json_request(Method::POST, "/cart", Some(&token), &body)).await;
        assert_eq!(response.status, StatusCode::CONFLICT);
        assert_eq!(response.json["error"]["code"], "out_of_stock");
        assert_eq!(response.json["error"]["details"]["available"], 2);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn user_cart_persists_between_requests(pool: sqlx::PgPool) {
        let lamp = seed_product(&pool, "Desk Lamp", 2500, 5).await;
        let (_, token) = seed_user(&pool, "sam@example.edu").await;

        let body = json!({ "productId": lamp, "quantity": 2 });
        let added = send(
            pool.clone(),
            json_request(Method::POST, "/cart", Some(&token), &body),
        )
        .await;
        assert_eq!(added.status, StatusCode::CREATED);
        assert!(added.json["data"].get("guestCart").is_none());

        let response = send(pool, authed_get("/cart", &token)).await;
        assert_eq!(response.status, StatusCode::OK);
        let lines = response.json["data"]["cart"]["lines"].as_array().expect("lines");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["quantity"], 2);
        assert_eq!(lines[0]["lineTotal"], "50.00");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn resolve_drops_deleted_items(pool: sqlx::PgPool) {
        let lamp = seed_product(&pool, "Desk Lamp", 2500, 5).await;
        let mug = seed_product(&pool, "Old Mug", 900, 5).await;
        dormstore_db::delete_product(&pool, mug).await.unwrap();

        let body = json!({
            "guestCart": [
                { "productId": lamp, "quantity": 1 },
                { "productId": mug, "quantity": 1 }
            ]
        });
        let response = send(pool, json_request(Method::POST, "/cart/resolve", None, &body)).await;
        assert_eq!(response.status, StatusCode::OK);
        let data = &response.json["data"];
        assert_eq!(data["guestCart"].as_array().map(Vec::len), Some(1));
        assert_eq!(data["cart"]["removedItems"][0]["reason"], "no longer available");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn guest_get_cart_is_empty(pool: sqlx::PgPool) {
        let response = send(pool, get("/cart")).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.json["data"]["cart"]["itemCount"], 0);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn invalid_token_is_rejected_not_downgraded(pool: sqlx::PgPool) {
        let response = send(pool, authed_get("/cart", "ds_not-a-token")).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }
}
