//! MercadoPago checkout preferences and payment notifications.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use sea_orm::{sea_query::Expr, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::config::MercadoPagoConfig;
use crate::entities::{
    order::{self, Status},
    user,
};
use crate::services::orders::OrderDetails;

const CURRENCY: &str = "ARS";

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Payment provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Payment provider answered {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error(transparent)]
    Db(#[from] DbErr),
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct PreferenceItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub quantity: i32,
    pub unit_price: f64,
    pub currency_id: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Payer {
    pub name: String,
    pub email: String,
}

/// What we ask the gateway to charge, before provider-specific urls are added.
#[derive(Clone, Debug)]
pub struct PreferenceRequest {
    pub items: Vec<PreferenceItem>,
    pub payer: Payer,
    pub external_reference: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Preference {
    pub id: String,
    pub init_point: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub status: String,
    pub external_reference: Option<String>,
    pub payment_method_id: Option<String>,
    pub payment_type_id: Option<String>,
    pub transaction_amount: Option<f64>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_preference(&self, request: &PreferenceRequest) -> Result<Preference, PaymentError>;

    async fn get_payment(&self, payment_id: &str) -> Result<Payment, PaymentError>;
}

/// One preference item per order line, charged at the price locked in the order.
pub fn build_preference(order: &OrderDetails, customer: &user::Model) -> PreferenceRequest {
    let items = order
        .items
        .iter()
        .map(|line| {
            let title = line
                .product
                .as_ref()
                .map(|product| product.name.clone())
                .unwrap_or_else(|| format!("Product #{}", line.product_id));
            PreferenceItem {
                id: line.product_id.to_string(),
                description: title.clone(),
                title,
                quantity: line.quantity,
                unit_price: line.price,
                currency_id: CURRENCY.to_owned(),
            }
        })
        .collect();

    PreferenceRequest {
        items,
        payer: Payer {
            name: format!("{} {}", customer.first_name, customer.last_name),
            email: customer.email.clone(),
        },
        external_reference: order.id.to_string(),
    }
}

pub struct MercadoPagoGateway {
    http: Client,
    api_url: String,
    access_token: String,
    webhook_url: Option<String>,
    back_url: Option<String>,
}

impl MercadoPagoGateway {
    pub fn new(config: &MercadoPagoConfig) -> Result<Self, PaymentError> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(MercadoPagoGateway {
            http,
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            access_token: config.access_token.clone(),
            webhook_url: config.webhook_url.clone(),
            back_url: config.back_url.clone(),
        })
    }
}

#[derive(Serialize)]
struct PreferenceBody<'a> {
    items: &'a [PreferenceItem],
    payer: &'a Payer,
    external_reference: &'a str,
    binary_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    back_urls: Option<BackUrls<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    auto_return: Option<&'static str>,
}

#[derive(Serialize)]
struct BackUrls<'a> {
    success: &'a str,
    failure: &'a str,
    pending: &'a str,
}

#[async_trait]
impl PaymentGateway for MercadoPagoGateway {
    async fn create_preference(&self, request: &PreferenceRequest) -> Result<Preference, PaymentError> {
        let back_urls = self.back_url.as_deref().map(|url| BackUrls {
            success: url,
            failure: url,
            pending: url,
        });
        // MercadoPago refuses auto_return without a success url.
        let auto_return = back_urls.as_ref().map(|_| "approved");

        let body = PreferenceBody {
            items: &request.items,
            payer: &request.payer,
            external_reference: &request.external_reference,
            binary_mode: true,
            notification_url: self.webhook_url.as_deref(),
            back_urls,
            auto_return,
        };

        let response = self
            .http
            .post(format!("{}/checkout/preferences", self.api_url))
            .bearer_auth(&self.access_token)
            .header("X-Idempotency-Key", Uuid::new_v4().to_string())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::Rejected { status, body });
        }

        Ok(response.json::<Preference>().await?)
    }

    async fn get_payment(&self, payment_id: &str) -> Result<Payment, PaymentError> {
        let response = self
            .http
            .get(format!("{}/v1/payments/{payment_id}", self.api_url))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::Rejected { status, body });
        }

        Ok(response.json::<Payment>().await?)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub data: Option<NotificationData>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NotificationData {
    /// MercadoPago sends this as a string or a number depending on the API version.
    pub id: serde_json::Value,
}

impl Notification {
    fn payment_id(&self) -> Option<String> {
        if self.kind.as_deref() != Some("payment") {
            return None;
        }
        match &self.data.as_ref()?.id {
            serde_json::Value::String(id) if !id.is_empty() => Some(id.clone()),
            serde_json::Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    Ignored,
    NotApproved,
    NoPendingOrder,
    OrderPaid(i32),
}

pub async fn handle_notification<C: ConnectionTrait>(
    conn: &C,
    gateway: &dyn PaymentGateway,
    notification: &Notification,
) -> Result<WebhookOutcome, PaymentError> {
    let Some(payment_id) = notification.payment_id() else {
        return Ok(WebhookOutcome::Ignored);
    };

    let payment = gateway.get_payment(&payment_id).await?;
    if payment.status != "approved" {
        info!(payment_id, status = %payment.status, "Payment notification without approval");
        return Ok(WebhookOutcome::NotApproved);
    }

    let Some(order_id) = payment
        .external_reference
        .as_deref()
        .and_then(|reference| reference.parse::<i32>().ok())
    else {
        return Ok(WebhookOutcome::NoPendingOrder);
    };

    // Only a pending order moves; redelivered notifications change nothing.
    let result = order::Entity::update_many()
        .col_expr(order::Column::Status, Expr::value(Status::Processing))
        .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(order::Column::Id.eq(order_id))
        .filter(order::Column::Status.eq(Status::Pending))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Ok(WebhookOutcome::NoPendingOrder);
    }

    info!(
        order_id,
        payment_id = payment.id,
        method = payment.payment_method_id.as_deref().unwrap_or("unknown"),
        amount = payment.transaction_amount.unwrap_or_default(),
        "Payment approved, order moved to processing"
    );
    Ok(WebhookOutcome::OrderPaid(order_id))
}
