//! Order placement: turns a user's cart into an order inside one transaction.
//!
//! Every step runs on the same `DatabaseTransaction`. Any error drops out
//! through `rollback`, so stock, cart and order tables are either all changed
//! or all left as they were.

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction,
    DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::entities::{cart, order, order_item, product};
use crate::services::orders::{load_order_details, OrderDetails};

#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error("Cart is empty")]
    EmptyCart,
    #[error("Insufficient stock for product: {product}")]
    InsufficientStock { product: String },
    #[error("Failed to persist order: {0}")]
    Persistence(#[from] DbErr),
}

/// A cart line after its product row has been locked and checked.
#[derive(Debug)]
struct Reservation {
    product_id: i32,
    product_name: String,
    quantity: i32,
    unit_price: f64,
}

pub async fn place_order(
    db: &DatabaseConnection,
    user_id: i32,
    shipping_address: &str,
) -> Result<OrderDetails, CheckoutError> {
    let txn = db.begin().await?;

    match record_order(&txn, user_id, shipping_address).await {
        Ok(details) => {
            txn.commit().await?;
            info!(
                order_id = details.id,
                user_id,
                total = details.total,
                lines = details.items.len(),
                "Order placed"
            );
            Ok(details)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                warn!(user_id, error = %rollback_err, "Rollback after failed checkout did not complete");
            }
            Err(err)
        }
    }
}

async fn record_order(
    txn: &DatabaseTransaction,
    user_id: i32,
    shipping_address: &str,
) -> Result<OrderDetails, CheckoutError> {
    // Product id order keeps row locks in the same sequence for every checkout.
    let lines = cart::Entity::find()
        .filter(cart::Column::UserId.eq(user_id))
        .order_by_asc(cart::Column::ProductId)
        .order_by_asc(cart::Column::Id)
        .find_also_related(product::Entity)
        .all(txn)
        .await?;

    if lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let mut reservations = Vec::with_capacity(lines.len());
    let mut total = 0.0_f64;

    for (line, joined) in &lines {
        let current = product::Entity::find_by_id(line.product_id)
            .lock_exclusive()
            .one(txn)
            .await?;

        let Some(current) = current else {
            let product = joined
                .as_ref()
                .map(|product| product.name.clone())
                .unwrap_or_else(|| format!("#{}", line.product_id));
            return Err(CheckoutError::InsufficientStock { product });
        };

        // zero (or corrupt negative) lines reserve nothing
        let quantity = line.quantity.max(0);
        if current.stock < quantity {
            return Err(CheckoutError::InsufficientStock {
                product: current.name,
            });
        }

        total += f64::from(quantity) * current.price;
        reservations.push(Reservation {
            product_id: current.id,
            product_name: current.name,
            quantity,
            unit_price: current.price,
        });
    }

    // zero lines add nothing to the order; a cart made only of them is empty
    reservations.retain(|reservation| reservation.quantity > 0);
    if reservations.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    for reservation in &reservations {
        decrement_stock(txn, reservation).await?;
    }

    let now = Utc::now();
    let order = order::ActiveModel {
        user_id: Set(user_id),
        total: Set(total),
        status: Set(order::Status::Pending),
        shipping_address: Set(shipping_address.to_owned()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(txn)
    .await?;

    let items = reservations.iter().map(|reservation| order_item::ActiveModel {
        order_id: Set(order.id),
        product_id: Set(reservation.product_id),
        quantity: Set(reservation.quantity),
        price: Set(reservation.unit_price),
        ..Default::default()
    });
    order_item::Entity::insert_many(items).exec(txn).await?;

    cart::Entity::delete_many()
        .filter(cart::Column::UserId.eq(user_id))
        .exec(txn)
        .await?;

    load_order_details(txn, vec![order])
        .await?
        .pop()
        .ok_or_else(|| DbErr::RecordNotFound("Placed order vanished before commit".to_owned()).into())
}

/// Guarded decrement: the row only changes while enough stock remains, which
/// also covers backends without `FOR UPDATE`.
async fn decrement_stock(
    txn: &DatabaseTransaction,
    reservation: &Reservation,
) -> Result<(), CheckoutError> {
    let result = product::Entity::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).sub(reservation.quantity),
        )
        .filter(product::Column::Id.eq(reservation.product_id))
        .filter(product::Column::Stock.gte(reservation.quantity))
        .exec(txn)
        .await?;

    if result.rows_affected != 1 {
        return Err(CheckoutError::InsufficientStock {
            product: reservation.product_name.clone(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::testing::{
        insert_cart_line, insert_category, insert_product, insert_user, memory_db,
    };
    use sea_orm::{ConnectionTrait, PaginatorTrait};

    struct Shop {
        db: DatabaseConnection,
        user: i32,
        product_a: product::Model,
        product_b: product::Model,
    }

    async fn shop() -> Shop {
        let db = memory_db().await;
        let user = insert_user(&db, "buyer@shop.test").await;
        let category = insert_category(&db, "Shoes").await;
        let product_a = insert_product(&db, category.id, "Runner", 10.0, 5).await;
        let product_b = insert_product(&db, category.id, "Sandal", 5.0, 3).await;
        Shop {
            db,
            user: user.id,
            product_a,
            product_b,
        }
    }

    async fn stock_of(db: &DatabaseConnection, id: i32) -> i32 {
        product::Entity::find_by_id(id)
            .one(db)
            .await
            .expect("load product")
            .expect("product exists")
            .stock
    }

    async fn cart_size(db: &DatabaseConnection, user_id: i32) -> u64 {
        cart::Entity::find()
            .filter(cart::Column::UserId.eq(user_id))
            .count(db)
            .await
            .expect("count cart")
    }

    async fn order_rows(db: &DatabaseConnection) -> (u64, u64) {
        let orders = order::Entity::find().count(db).await.expect("count orders");
        let items = order_item::Entity::find().count(db).await.expect("count items");
        (orders, items)
    }

    async fn assert_untouched(shop: &Shop, cart_lines: u64) {
        assert_eq!(stock_of(&shop.db, shop.product_a.id).await, 5);
        assert_eq!(stock_of(&shop.db, shop.product_b.id).await, 3);
        assert_eq!(cart_size(&shop.db, shop.user).await, cart_lines);
        assert_eq!(order_rows(&shop.db).await, (0, 0));
    }

    #[tokio::test]
    async fn happy_path_places_order_and_clears_cart() {
        let shop = shop().await;
        insert_cart_line(&shop.db, shop.user, shop.product_a.id, 2).await;
        insert_cart_line(&shop.db, shop.user, shop.product_b.id, 1).await;

        let order = place_order(&shop.db, shop.user, "Av. Corrientes 1234")
            .await
            .expect("order placed");

        assert_eq!(order.total, 25.0);
        assert_eq!(order.status, order::Status::Pending);
        assert_eq!(order.shipping_address, "Av. Corrientes 1234");
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.lines_total(), order.total);

        let runner = order
            .items
            .iter()
            .find(|line| line.product_id == shop.product_a.id)
            .expect("runner line");
        assert_eq!(runner.quantity, 2);
        assert_eq!(runner.price, 10.0);
        let summary = runner.product.as_ref().expect("product summary");
        assert_eq!(summary.name, "Runner");
        assert_eq!(summary.image.as_deref(), Some("/img/Runner.png"));

        assert_eq!(stock_of(&shop.db, shop.product_a.id).await, 3);
        assert_eq!(stock_of(&shop.db, shop.product_b.id).await, 2);
        assert_eq!(cart_size(&shop.db, shop.user).await, 0);
        assert_eq!(order_rows(&shop.db).await, (1, 2));
    }

    #[tokio::test]
    async fn empty_cart_is_rejected_without_changes() {
        let shop = shop().await;

        let result = place_order(&shop.db, shop.user, "Somewhere 1").await;

        assert!(matches!(result, Err(CheckoutError::EmptyCart)));
        assert_untouched(&shop, 0).await;
    }

    #[tokio::test]
    async fn insufficient_stock_names_the_product_and_changes_nothing() {
        let shop = shop().await;
        insert_cart_line(&shop.db, shop.user, shop.product_a.id, 1).await;
        insert_cart_line(&shop.db, shop.user, shop.product_b.id, 5).await;

        let result = place_order(&shop.db, shop.user, "Somewhere 1").await;

        match result {
            Err(err @ CheckoutError::InsufficientStock { .. }) => {
                assert_eq!(err.to_string(), "Insufficient stock for product: Sandal");
            }
            other => panic!("expected insufficient stock, got {other:?}"),
        }
        assert_untouched(&shop, 2).await;
    }

    #[tokio::test]
    async fn failure_while_writing_order_lines_rolls_back_stock() {
        let shop = shop().await;
        insert_cart_line(&shop.db, shop.user, shop.product_a.id, 2).await;
        insert_cart_line(&shop.db, shop.user, shop.product_b.id, 1).await;
        shop.db
            .execute_unprepared(
                "CREATE TRIGGER reject_order_items BEFORE INSERT ON order_items \
                 BEGIN SELECT RAISE(ABORT, 'simulated order line failure'); END;",
            )
            .await
            .expect("create trigger");

        let result = place_order(&shop.db, shop.user, "Somewhere 1").await;

        assert!(matches!(result, Err(CheckoutError::Persistence(_))));
        assert_untouched(&shop, 2).await;
    }

    #[tokio::test]
    async fn failure_while_clearing_cart_rolls_back_everything() {
        let shop = shop().await;
        insert_cart_line(&shop.db, shop.user, shop.product_a.id, 2).await;
        insert_cart_line(&shop.db, shop.user, shop.product_b.id, 1).await;
        shop.db
            .execute_unprepared(
                "CREATE TRIGGER keep_cart BEFORE DELETE ON cart \
                 BEGIN SELECT RAISE(ABORT, 'simulated cart failure'); END;",
            )
            .await
            .expect("create trigger");

        let result = place_order(&shop.db, shop.user, "Somewhere 1").await;

        assert!(matches!(result, Err(CheckoutError::Persistence(_))));
        assert_untouched(&shop, 2).await;
    }

    #[tokio::test]
    async fn failure_while_decrementing_stock_rolls_back() {
        let shop = shop().await;
        insert_cart_line(&shop.db, shop.user, shop.product_a.id, 2).await;
        insert_cart_line(&shop.db, shop.user, shop.product_b.id, 1).await;
        shop.db
            .execute_unprepared(
                "CREATE TRIGGER freeze_sandal BEFORE UPDATE ON products WHEN OLD.name = 'Sandal' \
                 BEGIN SELECT RAISE(ABORT, 'simulated stock failure'); END;",
            )
            .await
            .expect("create trigger");

        let result = place_order(&shop.db, shop.user, "Somewhere 1").await;

        assert!(matches!(result, Err(CheckoutError::Persistence(_))));
        assert_untouched(&shop, 2).await;
    }

    #[tokio::test]
    async fn deleted_product_aborts_the_whole_order() {
        let shop = shop().await;
        insert_cart_line(&shop.db, shop.user, shop.product_a.id, 1).await;
        let ghost = insert_product(&shop.db, shop.product_a.category_id, "Ghost", 1.0, 10).await;
        insert_cart_line(&shop.db, shop.user, ghost.id, 1).await;

        shop.db
            .execute_unprepared("PRAGMA foreign_keys = OFF")
            .await
            .expect("disable foreign keys");
        product::Entity::delete_by_id(ghost.id)
            .exec(&shop.db)
            .await
            .expect("delete product");

        let result = place_order(&shop.db, shop.user, "Somewhere 1").await;

        match result {
            Err(CheckoutError::InsufficientStock { product }) => {
                assert_eq!(product, format!("#{}", ghost.id));
            }
            other => panic!("expected insufficient stock, got {other:?}"),
        }
        assert_untouched(&shop, 2).await;
    }

    #[tokio::test]
    async fn zero_quantity_lines_reserve_nothing() {
        let shop = shop().await;
        insert_cart_line(&shop.db, shop.user, shop.product_a.id, 0).await;
        insert_cart_line(&shop.db, shop.user, shop.product_b.id, 2).await;

        let order = place_order(&shop.db, shop.user, "Somewhere 1")
            .await
            .expect("order placed");

        assert_eq!(order.total, 10.0);
        assert_eq!(order.lines_total(), order.total);
        assert_eq!(order.items.len(), 1);
        assert!(order.items.iter().all(|item| item.quantity > 0));
        assert_eq!(stock_of(&shop.db, shop.product_a.id).await, 5);
        assert_eq!(stock_of(&shop.db, shop.product_b.id).await, 1);
        assert_eq!(cart_size(&shop.db, shop.user).await, 0);
    }

    #[tokio::test]
    async fn cart_of_only_zero_lines_counts_as_empty() {
        let shop = shop().await;
        insert_cart_line(&shop.db, shop.user, shop.product_a.id, 0).await;

        let err = place_order(&shop.db, shop.user, "Somewhere 1")
            .await
            .expect_err("nothing to order");

        assert!(matches!(err, CheckoutError::EmptyCart));
        assert_eq!(stock_of(&shop.db, shop.product_a.id).await, 5);
        assert_eq!(cart_size(&shop.db, shop.user).await, 1);
    }

    #[tokio::test]
    async fn price_is_locked_at_order_time() {
        let shop = shop().await;
        insert_cart_line(&shop.db, shop.user, shop.product_a.id, 1).await;

        let placed = place_order(&shop.db, shop.user, "Somewhere 1")
            .await
            .expect("order placed");

        let mut runner: product::ActiveModel = shop.product_a.clone().into();
        runner.price = Set(99.0);
        runner.update(&shop.db).await.expect("reprice");

        let reloaded = crate::services::orders::find_order_details(&shop.db, placed.id, None)
            .await
            .expect("reload")
            .expect("order exists");
        assert_eq!(reloaded.total, 10.0);
        assert_eq!(reloaded.items[0].price, 10.0);
    }

    #[tokio::test]
    async fn last_unit_is_sold_exactly_once() {
        let db = memory_db().await;
        let first = insert_user(&db, "first@shop.test").await;
        let second = insert_user(&db, "second@shop.test").await;
        let category = insert_category(&db, "Limited").await;
        let last = insert_product(&db, category.id, "Last one", 50.0, 1).await;
        insert_cart_line(&db, first.id, last.id, 1).await;
        insert_cart_line(&db, second.id, last.id, 1).await;

        let (a, b) = tokio::join!(
            place_order(&db, first.id, "First street 1"),
            place_order(&db, second.id, "Second street 2"),
        );

        let outcomes = [a, b];
        let placed = outcomes.iter().filter(|result| result.is_ok()).count();
        let refused = outcomes
            .iter()
            .filter(|result| matches!(result, Err(CheckoutError::InsufficientStock { .. })))
            .count();

        assert_eq!(placed, 1);
        assert_eq!(refused, 1);
        assert_eq!(stock_of(&db, last.id).await, 0);
        assert_eq!(order_rows(&db).await, (1, 1));
    }
}
