pub mod category;
pub mod orders;
pub mod product;
pub mod users;

use axum::{middleware::from_fn_with_state, Router};

use crate::api::AppContext;
use crate::entities::user::Role;
use crate::middleware::auth::{auth_middleware, AuthState};
use category::admin_category_router;
use orders::admin_order_router;
use product::admin_product_router;
use users::admin_user_router;

pub fn admin_api_router(ctx: &AppContext) -> Router {
    Router::new()
        .merge(admin_category_router())
        .merge(admin_product_router())
        .merge(admin_order_router())
        .merge(admin_user_router())
        .layer(from_fn_with_state(
            AuthState {
                db: ctx.db.clone(),
                tokens: ctx.tokens.clone(),
                role: Role::Admin,
            },
            auth_middleware,
        ))
}
