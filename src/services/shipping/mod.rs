//! Shipping quotes, shipments and tracking behind a provider chosen at startup.

pub mod live;
pub mod mock;
pub mod rates;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use validator::Validate;

use crate::config::AndreaniConfig;
use live::LiveProvider;
use mock::MockProvider;

#[derive(Error, Debug)]
pub enum ShippingError {
    #[error("Shipping provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Shipping provider answered {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("Invalid shipping provider setup: {0}")]
    Setup(String),
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Package {
    #[validate(range(min = 0.0))]
    pub kilos: f64,
    #[validate(range(min = 0.0))]
    pub volume: f64,
    #[validate(range(min = 0.0))]
    pub declared_value: f64,
    pub dimensions: Option<Dimensions>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Dimensions {
    pub height: f64,
    pub width: f64,
    pub length: f64,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct QuoteRequest {
    #[validate(length(min = 1))]
    pub origin_postal_code: String,
    #[validate(length(min = 1))]
    pub destination_postal_code: String,
    #[validate(length(min = 1), nested)]
    pub packages: Vec<Package>,
    pub contract: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteSource {
    Live,
    Mock,
    Estimate,
}

#[derive(Clone, Debug, Serialize)]
pub struct Quote {
    pub rate: f64,
    pub rate_with_vat: f64,
    pub delivery_days: u32,
    pub services: Vec<String>,
    pub source: QuoteSource,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct BranchFilter {
    pub postal_code: Option<String>,
    pub locality: Option<String>,
    pub province: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Branch {
    pub id: String,
    pub name: String,
    pub address: String,
    pub locality: String,
    pub province: String,
    pub postal_code: String,
    pub phone: Option<String>,
    pub hours: Option<String>,
    pub coordinates: Option<Coordinates>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct PostalAddress {
    #[validate(length(min = 1))]
    pub street: String,
    #[validate(length(min = 1))]
    pub number: String,
    #[validate(length(min = 1))]
    pub locality: String,
    #[validate(length(min = 1))]
    pub province: String,
    #[validate(length(min = 1))]
    pub postal_code: String,
    pub floor: Option<String>,
    pub apartment: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Person {
    #[validate(length(min = 1))]
    pub full_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub document_type: String,
    #[validate(length(min = 1))]
    pub document_number: String,
    pub phone: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct ShipmentPackage {
    #[validate(range(min = 0.0))]
    pub kilos: f64,
    #[validate(range(min = 0.0))]
    pub volume: f64,
    #[validate(range(min = 0.0))]
    pub declared_value: f64,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct ShipmentRequest {
    #[validate(nested)]
    pub origin: PostalAddress,
    #[validate(nested)]
    pub destination: PostalAddress,
    #[validate(nested)]
    pub sender: Person,
    #[validate(nested)]
    pub recipient: Person,
    #[validate(length(min = 1), nested)]
    pub packages: Vec<ShipmentPackage>,
    pub contract: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Shipment {
    pub shipment_number: String,
    pub order_number: String,
    pub parcels: Vec<Parcel>,
    pub source: QuoteSource,
}

#[derive(Clone, Debug, Serialize)]
pub struct Parcel {
    pub index: usize,
    pub shipment_number: Option<String>,
    pub kilos: f64,
    pub status: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Tracking {
    pub shipment_number: String,
    pub events: Vec<TrackingEvent>,
    pub source: QuoteSource,
}

#[derive(Clone, Debug, Serialize)]
pub struct TrackingEvent {
    pub date: String,
    pub status: String,
    pub description: String,
    pub branch: Option<String>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct PostalCodeCheck {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub province: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PostalCodeCheck {
    pub fn invalid(message: &str) -> Self {
        PostalCodeCheck {
            valid: false,
            locality: None,
            province: None,
            postal_code: None,
            message: Some(message.to_owned()),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Cancellation {
    pub cancelled: bool,
    pub message: String,
}

#[async_trait]
pub trait ShippingProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, ShippingError>;

    async fn branches(&self, filter: &BranchFilter) -> Result<Vec<Branch>, ShippingError>;

    async fn create_shipment(&self, request: &ShipmentRequest) -> Result<Shipment, ShippingError>;

    async fn tracking(&self, shipment_number: &str) -> Result<Tracking, ShippingError>;

    /// Printable label, as PDF bytes.
    async fn label(&self, shipment_number: &str) -> Result<Vec<u8>, ShippingError>;

    async fn validate_postal_code(&self, postal_code: &str) -> Result<PostalCodeCheck, ShippingError>;

    async fn cancel_shipment(&self, shipment_number: &str) -> Result<Cancellation, ShippingError>;
}

pub fn provider_from_config(
    config: &AndreaniConfig,
) -> Result<Arc<dyn ShippingProvider>, ShippingError> {
    if config.wants_mock() {
        info!("Shipping provider: mock data");
        Ok(Arc::new(MockProvider::new()))
    } else {
        info!(api_url = %config.api_url, "Shipping provider: live Andreani API");
        Ok(Arc::new(LiveProvider::new(config)?))
    }
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct CartEstimateRequest {
    #[validate(length(min = 1), nested)]
    pub items: Vec<CartMeasure>,
    #[validate(length(min = 1))]
    pub destination_postal_code: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct CartMeasure {
    /// Kilograms per unit.
    pub weight: Option<f64>,
    /// Centimetres, written `HxWxL`.
    pub dimensions: Option<String>,
    #[validate(range(min = 0.0))]
    pub price: f64,
    #[validate(range(min = 1))]
    pub quantity: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct CartEstimate {
    pub cost: f64,
    pub delivery_days: u32,
    pub services: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

const DEFAULT_VOLUME_CM3: f64 = 1000.0;

/// Folds the cart into a single package: weights and volumes per unit times
/// quantity, declared value = cart value.
pub fn cart_package(items: &[CartMeasure]) -> Package {
    let mut kilos = 0.0;
    let mut volume = 0.0;
    let mut declared_value = 0.0;

    for item in items {
        let quantity = f64::from(item.quantity);
        kilos += item.weight.unwrap_or(0.0) * quantity;
        if let Some(unit_volume) = item.dimensions.as_deref().and_then(parse_volume) {
            volume += unit_volume * quantity;
        }
        declared_value += item.price * quantity;
    }

    Package {
        kilos,
        volume: if volume > 0.0 { volume } else { DEFAULT_VOLUME_CM3 },
        declared_value,
        dimensions: None,
    }
}

fn parse_volume(dimensions: &str) -> Option<f64> {
    let sides: Vec<f64> = dimensions
        .split(['x', 'X'])
        .map(|side| side.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;

    match sides.as_slice() {
        [height, width, length] => Some(height * width * length),
        _ => None,
    }
}

pub async fn estimate_cart(
    provider: &dyn ShippingProvider,
    origin_postal_code: &str,
    contract: Option<String>,
    request: &CartEstimateRequest,
) -> CartEstimate {
    let quote_request = QuoteRequest {
        origin_postal_code: origin_postal_code.to_owned(),
        destination_postal_code: request.destination_postal_code.clone(),
        packages: vec![cart_package(&request.items)],
        contract,
    };

    match provider.quote(&quote_request).await {
        Ok(quote) => CartEstimate {
            cost: quote.rate_with_vat,
            delivery_days: quote.delivery_days,
            services: quote.services,
            warning: None,
        },
        Err(err) => {
            warn!(provider = provider.name(), error = %err, "Falling back to flat shipping cost");
            CartEstimate {
                cost: rates::FALLBACK_COST,
                delivery_days: rates::ESTIMATE_DELIVERY_DAYS,
                services: Vec::new(),
                warning: Some("Estimated cost, the shipping provider could not be reached".to_owned()),
            }
        }
    }
}
