#![allow(dead_code)]

use reqwest::{header, Client, StatusCode};
use sea_orm::{Database, DatabaseConnection};
use serde_json::{json, Value};
use std::{sync::Arc, time::Instant};

use storefront_api::api::{AppContext, ShippingDefaults};
use storefront_api::config::AdminSeed;
use storefront_api::create_app;
use storefront_api::entities::{seed_admin, setup_schema};
use storefront_api::middleware::auth::TokenSettings;
use storefront_api::services::payments::PaymentGateway;
use storefront_api::services::shipping::mock::MockProvider;

pub const ADMIN_EMAIL: &str = "admin@tienda.test";
pub const ADMIN_PASSWORD: &str = "admin-secret";

pub struct TestApp {
    pub address: String,
    pub client: Client,
    pub db: Arc<DatabaseConnection>,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with_payments(None).await
}

/// Serves the whole API on an ephemeral port over a fresh in-memory database.
pub async fn spawn_app_with_payments(payments: Option<Arc<dyn PaymentGateway>>) -> TestApp {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");
    setup_schema(&db).await.expect("Failed to create schema");
    seed_admin(
        &db,
        &AdminSeed {
            email: ADMIN_EMAIL.to_owned(),
            password: ADMIN_PASSWORD.to_owned(),
        },
    )
    .await
    .expect("Failed to seed admin");

    let db = Arc::new(db);
    let ctx = AppContext {
        db: db.clone(),
        tokens: Arc::new(TokenSettings {
            secret: "integration-secret".to_owned(),
            ttl_hours: 1,
        }),
        shipping: Arc::new(MockProvider::new()),
        shipping_defaults: ShippingDefaults {
            origin_postal_code: "1043".to_owned(),
            contract: None,
        },
        payments,
        started_at: Instant::now(),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let address = format!("http://{}", listener.local_addr().expect("No local addr"));

    tokio::spawn(async move {
        axum::serve(listener, create_app(ctx))
            .await
            .expect("Test server failed");
    });

    TestApp {
        address,
        client: Client::new(),
        db,
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.address, path)
    }

    /// Registers a customer and returns its token.
    pub async fn register(&self, email: &str) -> String {
        let response = self
            .client
            .post(self.url("/auth/register"))
            .json(&json!({
                "first_name": "Juana",
                "last_name": "Pérez",
                "email": email,
                "password": "Muzion15",
            }))
            .send()
            .await
            .expect("Failed to send register request");
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = response.json::<Value>().await.expect("Failed to parse register JSON");
        body["token"].as_str().expect("Token not found").to_owned()
    }

    pub async fn admin_token(&self) -> String {
        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(&json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD }))
            .send()
            .await
            .expect("Failed to send login request");
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.json::<Value>().await.expect("Failed to parse login JSON");
        body["token"].as_str().expect("Token not found").to_owned()
    }

    /// Creates a category and a product through the admin API, returning the product id.
    pub async fn create_product(&self, admin: &str, name: &str, price: f64, stock: i32) -> i64 {
        let category = self
            .client
            .post(self.url("/admin/categories"))
            .headers(bearer(admin))
            .json(&json!({ "name": format!("{name} category") }))
            .send()
            .await
            .expect("Failed to create category");
        assert_eq!(category.status(), StatusCode::CREATED);
        let category = category.json::<Value>().await.expect("Failed to parse category");

        let product = self
            .client
            .post(self.url("/admin/products"))
            .headers(bearer(admin))
            .json(&json!({
                "name": name,
                "description": format!("{name} description"),
                "price": price,
                "stock": stock,
                "category_id": category["category"]["id"],
            }))
            .send()
            .await
            .expect("Failed to create product");
        assert_eq!(product.status(), StatusCode::CREATED);
        let product = product.json::<Value>().await.expect("Failed to parse product");

        product["product"]["id"].as_i64().expect("Product id missing")
    }

    pub async fn add_to_cart(&self, token: &str, product_id: i64, quantity: i32) -> StatusCode {
        self.client
            .post(self.url("/cart"))
            .headers(bearer(token))
            .json(&json!({ "product_id": product_id, "quantity": quantity }))
            .send()
            .await
            .expect("Failed to add to cart")
            .status()
    }

    pub async fn get_json(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut request = self.client.get(self.url(path));
        if let Some(token) = token {
            request = request.headers(bearer(token));
        }
        let response = request.send().await.expect("Failed to send request");
        let status = response.status();
        let body = response.json::<Value>().await.expect("Failed to parse JSON");
        (status, body)
    }
}

pub fn bearer(token: &str) -> header::HeaderMap {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {token}"))
            .expect("Failed to create Authorization header"),
    );
    headers
}
