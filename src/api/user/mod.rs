pub mod cart;
pub mod orders;
pub mod profile;
pub mod shipping;

use axum::{middleware::from_fn_with_state, Router};

use crate::api::AppContext;
use crate::entities::user::Role;
use crate::middleware::auth::{auth_middleware, AuthState};
use cart::cart_router;
use orders::order_router;
use profile::profile_router;
use shipping::shipping_router;

pub fn user_api_router(ctx: &AppContext) -> Router {
    Router::new()
        .merge(cart_router())
        .merge(order_router())
        .merge(profile_router())
        .merge(shipping_router())
        .layer(from_fn_with_state(
            AuthState {
                db: ctx.db.clone(),
                tokens: ctx.tokens.clone(),
                role: Role::Customer,
            },
            auth_middleware,
        ))
}
