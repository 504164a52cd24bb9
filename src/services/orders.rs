use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use std::collections::HashMap;

use crate::entities::{
    order::{self, Status},
    order_item, product,
};

#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    pub id: i32,
    pub user_id: i32,
    pub total: f64,
    pub status: Status,
    pub shipping_address: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub items: Vec<OrderLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderLine {
    pub id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub price: f64,
    pub product: Option<ProductSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductSummary {
    pub id: i32,
    pub name: String,
    pub image: Option<String>,
}

impl OrderDetails {
    /// Σ quantity × price over the price-locked lines.
    pub fn lines_total(&self) -> f64 {
        self.items
            .iter()
            .map(|line| f64::from(line.quantity) * line.price)
            .sum()
    }
}

/// Attaches lines and product summaries to each order, keeping the input order.
pub async fn load_order_details<C: ConnectionTrait>(
    conn: &C,
    orders: Vec<order::Model>,
) -> Result<Vec<OrderDetails>, DbErr> {
    if orders.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<i32> = orders.iter().map(|order| order.id).collect();

    let rows = order_item::Entity::find()
        .filter(order_item::Column::OrderId.is_in(ids))
        .order_by_asc(order_item::Column::Id)
        .find_also_related(product::Entity)
        .all(conn)
        .await?;

    let mut lines: HashMap<i32, Vec<OrderLine>> = HashMap::new();
    for (item, product) in rows {
        lines.entry(item.order_id).or_default().push(OrderLine {
            id: item.id,
            product_id: item.product_id,
            quantity: item.quantity,
            price: item.price,
            product: product.map(|product| ProductSummary {
                id: product.id,
                name: product.name,
                image: product.image,
            }),
        });
    }

    Ok(orders
        .into_iter()
        .map(|order| OrderDetails {
            items: lines.remove(&order.id).unwrap_or_default(),
            id: order.id,
            user_id: order.user_id,
            total: order.total,
            status: order.status,
            shipping_address: order.shipping_address,
            created_at: order.created_at,
            updated_at: order.updated_at,
        })
        .collect())
}

pub async fn find_order_details<C: ConnectionTrait>(
    conn: &C,
    order_id: i32,
    owner: Option<i32>,
) -> Result<Option<OrderDetails>, DbErr> {
    let mut query = order::Entity::find_by_id(order_id);
    if let Some(user_id) = owner {
        query = query.filter(order::Column::UserId.eq(user_id));
    }

    let Some(order) = query.one(conn).await? else {
        return Ok(None);
    };

    Ok(load_order_details(conn, vec![order]).await?.pop())
}

/// Removes an order together with its lines. Stock is not given back.
pub async fn delete_order<C: ConnectionTrait>(conn: &C, order_id: i32) -> Result<bool, DbErr> {
    order_item::Entity::delete_many()
        .filter(order_item::Column::OrderId.eq(order_id))
        .exec(conn)
        .await?;

    let result = order::Entity::delete_by_id(order_id).exec(conn).await?;
    Ok(result.rows_affected > 0)
}
