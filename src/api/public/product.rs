use axum::{
    extract::{Extension, Path, Query},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::api::page_offset;
use crate::entities::{
    category::{self, Entity as CategoryEntity},
    product::{self, Entity as ProductEntity},
};
use crate::middleware::logging::ApiError;

const DEFAULT_PAGE_SIZE: u64 = 12;
const MAX_PAGE_SIZE: u64 = 100;

pub fn product_router() -> Router {
    Router::new()
        .route("/products", get(get_products))
        .route("/products/:id", get(get_product))
}

async fn get_products(
    Query(params): Query<GetProductsQuery>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Result<Response, ApiError> {
    let mut condition = Condition::all();

    //Filter zone
    if let Some(category_id) = params.category {
        condition = condition.add(product::Column::CategoryId.eq(category_id));
    }
    if let Some(search) = params.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        condition = condition.add(
            Condition::any()
                .add(product::Column::Name.contains(search))
                .add(product::Column::Description.contains(search)),
        );
    }
    if let Some(featured) = params.featured {
        condition = condition.add(product::Column::Featured.eq(featured));
    }
    if let Some(min_price) = params.min_price {
        condition = condition.add(product::Column::Price.gte(min_price));
    }
    if let Some(max_price) = params.max_price {
        condition = condition.add(product::Column::Price.lte(max_price));
    }

    //Pagination zone
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = page_offset(page, limit)?;

    let total = ProductEntity::find()
        .filter(condition.clone())
        .count(db.as_ref())
        .await?;

    let rows = ProductEntity::find()
        .filter(condition)
        .find_also_related(CategoryEntity)
        .order_by_desc(product::Column::CreatedAt)
        .order_by_desc(product::Column::Id)
        .limit(limit)
        .offset(offset)
        .all(db.as_ref())
        .await?;

    let products: Vec<ProductResponse> = rows
        .into_iter()
        .map(|(product, category)| ProductResponse::new(product, category))
        .collect();

    Ok(Json(json!({
        "products": products,
        "total_pages": total.div_ceil(limit),
        "current_page": page,
        "total_products": total,
    }))
    .into_response())
}

async fn get_product(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Result<Response, ApiError> {
    let found = ProductEntity::find_by_id(id)
        .find_also_related(CategoryEntity)
        .one(db.as_ref())
        .await?;

    match found {
        Some((product, category)) => {
            Ok(Json(json!({ "product": ProductResponse::new(product, category) })).into_response())
        }
        None => Err(ApiError::NotFound("Product not found".to_owned())),
    }
}

#[derive(Deserialize)]
struct GetProductsQuery {
    page: Option<u64>,
    limit: Option<u64>,
    category: Option<i32>,
    search: Option<String>,
    featured: Option<bool>,
    min_price: Option<f64>,
    max_price: Option<f64>,
}

#[derive(Serialize, Debug)]
pub struct ProductResponse {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub stock: i32,
    pub image: Option<String>,
    pub category_id: i32,
    pub featured: bool,
    pub created_at: DateTime<Utc>,
    pub category: Option<CategoryRef>,
}

#[derive(Serialize, Debug)]
pub struct CategoryRef {
    pub id: i32,
    pub name: String,
}

impl ProductResponse {
    pub fn new(value: product::Model, category: Option<category::Model>) -> ProductResponse {
        ProductResponse {
            id: value.id,
            name: value.name,
            description: value.description,
            price: value.price,
            stock: value.stock,
            image: value.image,
            category_id: value.category_id,
            featured: value.featured,
            created_at: value.created_at,
            category: category.map(|c| CategoryRef { id: c.id, name: c.name }),
        }
    }
}
