use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client, RequestBuilder,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use super::{
    mock::MockProvider, rates, Branch, BranchFilter, Cancellation, Coordinates, Parcel,
    PostalAddress, PostalCodeCheck, Quote, QuoteRequest, QuoteSource, Shipment, ShipmentRequest,
    ShippingError, ShippingProvider, Tracking, TrackingEvent,
};
use crate::config::AndreaniConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the Andreani REST API.
///
/// Read-only lookups degrade to estimates or demo data when the API fails;
/// creating and cancelling shipments report the failure instead.
#[derive(Debug, Clone)]
pub struct LiveProvider {
    http: Client,
    api_url: String,
    contract: Option<String>,
}

impl LiveProvider {
    pub fn new(config: &AndreaniConfig) -> Result<Self, ShippingError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let token = HeaderValue::from_str(&config.api_key)
            .map_err(|_| ShippingError::Setup("api key is not a valid header value".to_owned()))?;
        headers.insert("x-authorization-token", token);

        let http = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(LiveProvider {
            http,
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            contract: config.contract.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn contract(&self, requested: &Option<String>) -> Option<String> {
        requested.clone().or_else(|| self.contract.clone())
    }

    async fn fetch_quote(&self, request: &QuoteRequest) -> Result<Quote, ShippingError> {
        let body = TariffRequest {
            destination: &request.destination_postal_code,
            origin: &request.origin_postal_code,
            packages: request
                .packages
                .iter()
                .map(|package| TariffPackage {
                    weight: package.kilos,
                    volume: package.volume,
                    declared_value: package.declared_value,
                    dimensions: package.dimensions.as_ref().map(|d| WireDimensions {
                        height: d.height,
                        width: d.width,
                        length: d.length,
                    }),
                })
                .collect(),
            contract: self.contract(&request.contract),
        };

        let tariff: TariffResponse = send_json(self.http.post(self.url("/tarifas")).json(&body)).await?;

        Ok(Quote {
            rate: tariff.rate,
            rate_with_vat: tariff.rate_with_vat,
            delivery_days: tariff.delivery_days,
            services: tariff.services.unwrap_or_default(),
            source: QuoteSource::Live,
        })
    }

    async fn fetch_branches(&self, filter: &BranchFilter) -> Result<Vec<Branch>, ShippingError> {
        let mut query = Vec::new();
        if let Some(postal_code) = &filter.postal_code {
            query.push(("codigoPostal", postal_code.as_str()));
        }
        if let Some(locality) = &filter.locality {
            query.push(("localidad", locality.as_str()));
        }
        if let Some(province) = &filter.province {
            query.push(("provincia", province.as_str()));
        }

        let branches: Vec<WireBranch> =
            send_json(self.http.get(self.url("/sucursales")).query(&query)).await?;

        Ok(branches.into_iter().map(Branch::from).collect())
    }

    async fn fetch_tracking(&self, shipment_number: &str) -> Result<Tracking, ShippingError> {
        let events: Vec<WireTrackingEvent> = send_json(
            self.http
                .get(self.url(&format!("/envios/{shipment_number}/trazas"))),
        )
        .await?;

        Ok(Tracking {
            shipment_number: shipment_number.to_owned(),
            events: events
                .into_iter()
                .map(|event| TrackingEvent {
                    date: event.date,
                    status: event.status,
                    description: event.description,
                    branch: event.branch,
                })
                .collect(),
            source: QuoteSource::Live,
        })
    }

    async fn fetch_label(&self, shipment_number: &str) -> Result<Vec<u8>, ShippingError> {
        let response = checked(
            self.http
                .get(self.url(&format!("/envios/{shipment_number}/etiquetas"))),
        )
        .await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn fetch_postal_code(&self, postal_code: &str) -> Result<PostalCodeCheck, ShippingError> {
        let found: WirePostalCode =
            send_json(self.http.get(self.url(&format!("/codigospostales/{postal_code}")))).await?;

        Ok(PostalCodeCheck {
            valid: true,
            locality: found.locality,
            province: found.province,
            postal_code: found.postal_code.or_else(|| Some(postal_code.to_owned())),
            message: None,
        })
    }
}

#[async_trait]
impl ShippingProvider for LiveProvider {
    fn name(&self) -> &'static str {
        "andreani"
    }

    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, ShippingError> {
        match self.fetch_quote(request).await {
            Ok(quote) => Ok(quote),
            Err(err) => {
                warn!(error = %err, "Andreani tariff lookup failed, using estimate");
                Ok(rates::estimate(&request.packages))
            }
        }
    }

    async fn branches(&self, filter: &BranchFilter) -> Result<Vec<Branch>, ShippingError> {
        match self.fetch_branches(filter).await {
            Ok(branches) => Ok(branches),
            Err(err) => {
                warn!(error = %err, "Andreani branch lookup failed, using demo branches");
                Ok(MockProvider::sample_branches(filter))
            }
        }
    }

    async fn create_shipment(&self, request: &ShipmentRequest) -> Result<Shipment, ShippingError> {
        let body = WireShipment {
            contract: self.contract(&request.contract),
            origin: WireLocation::from(&request.origin),
            destination: WireLocation::from(&request.destination),
            sender: WirePerson::from(&request.sender),
            recipients: vec![WirePerson::from(&request.recipient)],
            packages: request
                .packages
                .iter()
                .enumerate()
                .map(|(index, package)| WireShipmentPackage {
                    kilos: package.kilos,
                    volume: package.volume,
                    declared_value: package.declared_value,
                    shipment_number: None,
                    reference: package
                        .description
                        .clone()
                        .unwrap_or_else(|| format!("Bulto {}", index + 1)),
                })
                .collect(),
        };

        let created: WireShipmentCreated =
            send_json(self.http.post(self.url("/envios")).json(&body)).await?;

        let shipment_number = created
            .packages
            .first()
            .and_then(|parcel| parcel.shipment_number.clone())
            .ok_or_else(|| ShippingError::Rejected {
                status: 200,
                body: "response carried no shipment number".to_owned(),
            })?;

        let parcels = created
            .packages
            .into_iter()
            .enumerate()
            .map(|(index, parcel)| Parcel {
                index: index + 1,
                shipment_number: parcel.shipment_number,
                kilos: parcel.kilos.unwrap_or_default(),
                status: parcel.status.unwrap_or_else(|| "pending".to_owned()),
            })
            .collect();

        Ok(Shipment {
            shipment_number,
            order_number: created.order_number,
            parcels,
            source: QuoteSource::Live,
        })
    }

    async fn tracking(&self, shipment_number: &str) -> Result<Tracking, ShippingError> {
        match self.fetch_tracking(shipment_number).await {
            Ok(tracking) => Ok(tracking),
            Err(err) => {
                warn!(shipment_number, error = %err, "Andreani tracking failed, using demo events");
                Ok(MockProvider::sample_tracking(shipment_number))
            }
        }
    }

    async fn label(&self, shipment_number: &str) -> Result<Vec<u8>, ShippingError> {
        match self.fetch_label(shipment_number).await {
            Ok(label) => Ok(label),
            Err(err) => {
                warn!(shipment_number, error = %err, "Andreani label download failed, using demo label");
                Ok(MockProvider::sample_label(shipment_number))
            }
        }
    }

    async fn validate_postal_code(&self, postal_code: &str) -> Result<PostalCodeCheck, ShippingError> {
        match self.fetch_postal_code(postal_code).await {
            Ok(check) => Ok(check),
            Err(_) => Ok(PostalCodeCheck::invalid("Invalid postal code")),
        }
    }

    async fn cancel_shipment(&self, shipment_number: &str) -> Result<Cancellation, ShippingError> {
        checked(self.http.delete(self.url(&format!("/envios/{shipment_number}")))).await?;
        Ok(Cancellation {
            cancelled: true,
            message: "Shipment cancelled".to_owned(),
        })
    }
}

async fn checked(request: RequestBuilder) -> Result<reqwest::Response, ShippingError> {
    let response = request.send().await?;
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(ShippingError::Rejected { status, body });
    }
    Ok(response)
}

async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ShippingError> {
    Ok(checked(request).await?.json::<T>().await?)
}

#[derive(Serialize)]
struct TariffRequest<'a> {
    #[serde(rename = "cpDestino")]
    destination: &'a str,
    #[serde(rename = "cpOrigen")]
    origin: &'a str,
    #[serde(rename = "bultos")]
    packages: Vec<TariffPackage>,
    #[serde(rename = "contrato", skip_serializing_if = "Option::is_none")]
    contract: Option<String>,
}

#[derive(Serialize)]
struct TariffPackage {
    #[serde(rename = "peso")]
    weight: f64,
    #[serde(rename = "volumen")]
    volume: f64,
    #[serde(rename = "valorDeclarado")]
    declared_value: f64,
    #[serde(rename = "dimensiones", skip_serializing_if = "Option::is_none")]
    dimensions: Option<WireDimensions>,
}

#[derive(Serialize)]
struct WireDimensions {
    #[serde(rename = "alto")]
    height: f64,
    #[serde(rename = "ancho")]
    width: f64,
    #[serde(rename = "largo")]
    length: f64,
}

#[derive(Deserialize)]
struct TariffResponse {
    #[serde(rename = "tarifaSinIva")]
    rate: f64,
    #[serde(rename = "tarifaConIva")]
    rate_with_vat: f64,
    #[serde(rename = "plazoEntrega")]
    delivery_days: u32,
    #[serde(rename = "servicios")]
    services: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct WireBranch {
    id: serde_json::Value,
    #[serde(rename = "nombre")]
    name: String,
    #[serde(rename = "direccion")]
    address: String,
    #[serde(rename = "localidad")]
    locality: String,
    #[serde(rename = "provincia")]
    province: String,
    #[serde(rename = "codigoPostal")]
    postal_code: String,
    #[serde(rename = "telefono")]
    phone: Option<String>,
    #[serde(rename = "horarios")]
    hours: Option<String>,
    #[serde(rename = "latitud")]
    lat: Option<f64>,
    #[serde(rename = "longitud")]
    lng: Option<f64>,
}

impl From<WireBranch> for Branch {
    fn from(wire: WireBranch) -> Self {
        let id = match wire.id {
            serde_json::Value::String(id) => id,
            other => other.to_string(),
        };
        Branch {
            id,
            name: wire.name,
            address: wire.address,
            locality: wire.locality,
            province: wire.province,
            postal_code: wire.postal_code,
            phone: wire.phone,
            hours: wire.hours,
            coordinates: wire.lat.zip(wire.lng).map(|(lat, lng)| Coordinates { lat, lng }),
        }
    }
}

#[derive(Serialize)]
struct WireShipment {
    #[serde(rename = "contrato", skip_serializing_if = "Option::is_none")]
    contract: Option<String>,
    #[serde(rename = "origen")]
    origin: WireLocation,
    #[serde(rename = "destino")]
    destination: WireLocation,
    #[serde(rename = "remitente")]
    sender: WirePerson,
    #[serde(rename = "destinatario")]
    recipients: Vec<WirePerson>,
    #[serde(rename = "bultos")]
    packages: Vec<WireShipmentPackage>,
}

#[derive(Serialize)]
struct WireLocation {
    postal: WirePostal,
}

#[derive(Serialize)]
struct WirePostal {
    #[serde(rename = "codigoPostal")]
    postal_code: String,
    #[serde(rename = "calle")]
    street: String,
    #[serde(rename = "numero")]
    number: String,
    #[serde(rename = "localidad")]
    locality: String,
    region: String,
    #[serde(rename = "piso", skip_serializing_if = "Option::is_none")]
    floor: Option<String>,
    #[serde(rename = "departamento", skip_serializing_if = "Option::is_none")]
    apartment: Option<String>,
}

impl From<&PostalAddress> for WireLocation {
    fn from(address: &PostalAddress) -> Self {
        WireLocation {
            postal: WirePostal {
                postal_code: address.postal_code.clone(),
                street: address.street.clone(),
                number: address.number.clone(),
                locality: address.locality.clone(),
                region: address.province.clone(),
                floor: address.floor.clone(),
                apartment: address.apartment.clone(),
            },
        }
    }
}

#[derive(Serialize)]
struct WirePerson {
    #[serde(rename = "nombreCompleto")]
    full_name: String,
    email: String,
    #[serde(rename = "documentoTipo")]
    document_type: String,
    #[serde(rename = "documentoNumero")]
    document_number: String,
    #[serde(rename = "telefono", skip_serializing_if = "Option::is_none")]
    phone: Option<String>,
}

impl From<&super::Person> for WirePerson {
    fn from(person: &super::Person) -> Self {
        WirePerson {
            full_name: person.full_name.clone(),
            email: person.email.clone(),
            document_type: person.document_type.clone(),
            document_number: person.document_number.clone(),
            phone: person.phone.clone(),
        }
    }
}

#[derive(Serialize)]
struct WireShipmentPackage {
    kilos: f64,
    #[serde(rename = "volumenCm3")]
    volume: f64,
    #[serde(rename = "valorDeclaradoConImpuestos")]
    declared_value: f64,
    #[serde(rename = "numeroDeEnvio")]
    shipment_number: Option<String>,
    #[serde(rename = "referencia")]
    reference: String,
}

#[derive(Deserialize)]
struct WireShipmentCreated {
    #[serde(rename = "numeroAndreani")]
    order_number: String,
    #[serde(rename = "bultos", default)]
    packages: Vec<WireCreatedParcel>,
}

#[derive(Deserialize)]
struct WireCreatedParcel {
    #[serde(rename = "numeroDeEnvio")]
    shipment_number: Option<String>,
    kilos: Option<f64>,
    #[serde(rename = "estado")]
    status: Option<String>,
}

#[derive(Deserialize)]
struct WireTrackingEvent {
    #[serde(rename = "fecha")]
    date: String,
    #[serde(rename = "estado")]
    status: String,
    #[serde(rename = "descripcion")]
    description: String,
    #[serde(rename = "sucursal")]
    branch: Option<String>,
}

#[derive(Deserialize)]
struct WirePostalCode {
    #[serde(rename = "localidad")]
    locality: Option<String>,
    #[serde(rename = "provincia")]
    province: Option<String>,
    #[serde(rename = "codigoPostal")]
    postal_code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::shipping::{Package, Person, ShipmentPackage};
    use axum::{
        http::{HeaderMap as AxumHeaders, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::{json, Value};
    use tokio::net::TcpListener;

    /// Fake Andreani API: tariffs and postal codes answer, shipments fail.
    async fn fake_andreani() -> String {
        async fn tariffs(headers: AxumHeaders, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
            if headers.get("x-authorization-token").and_then(|v| v.to_str().ok()) != Some("key") {
                return (StatusCode::UNAUTHORIZED, Json(json!({})));
            }
            assert_eq!(body["cpDestino"], "8300");
            assert_eq!(body["bultos"][0]["peso"], 2.0);
            assert_eq!(body["contrato"], "CT-1");
            (
                StatusCode::OK,
                Json(json!({
                    "tarifaSinIva": 1000.0,
                    "tarifaConIva": 1210.0,
                    "plazoEntrega": 4,
                    "servicios": ["Estándar"]
                })),
            )
        }

        let app = Router::new()
            .route("/tarifas", post(tariffs))
            .route(
                "/codigospostales/:code",
                get(|| async {
                    Json(json!({
                        "localidad": "Neuquén",
                        "provincia": "Neuquén",
                        "codigoPostal": "8300"
                    }))
                }),
            )
            .route(
                "/envios",
                post(|| async { (StatusCode::BAD_GATEWAY, "contract suspended") }),
            );

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        format!("http://{addr}")
    }

    fn provider(api_url: String) -> LiveProvider {
        LiveProvider::new(&AndreaniConfig {
            api_key: "key".to_owned(),
            api_url,
            contract: Some("CT-1".to_owned()),
            use_mock: false,
            origin_postal_code: "1043".to_owned(),
        })
        .expect("provider")
    }

    fn quote_request() -> QuoteRequest {
        QuoteRequest {
            origin_postal_code: "1043".to_owned(),
            destination_postal_code: "8300".to_owned(),
            packages: vec![Package {
                kilos: 2.0,
                volume: 1000.0,
                declared_value: 0.0,
                dimensions: None,
            }],
            contract: None,
        }
    }

    #[tokio::test]
    async fn quote_is_read_from_the_api() {
        let provider = provider(fake_andreani().await);

        let quote = provider.quote(&quote_request()).await.expect("quote");

        assert_eq!(quote.rate_with_vat, 1210.0);
        assert_eq!(quote.delivery_days, 4);
        assert_eq!(quote.source, QuoteSource::Live);
    }

    #[tokio::test]
    async fn read_only_lookups_degrade_when_the_api_fails() {
        let provider = provider(fake_andreani().await);

        // no /sucursales, /trazas or /etiquetas routes on the fake
        let branches = provider.branches(&BranchFilter::default()).await.expect("branches");
        assert_eq!(branches.len(), 3);

        let tracking = provider.tracking("X1").await.expect("tracking");
        assert_eq!(tracking.source, QuoteSource::Mock);

        let label = provider.label("X1").await.expect("label");
        assert!(!label.is_empty());
    }

    #[tokio::test]
    async fn unreachable_api_falls_back_to_estimate() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let quote = provider(format!("http://{addr}"))
            .quote(&quote_request())
            .await
            .expect("quote");

        assert_eq!(quote.source, QuoteSource::Estimate);
        assert_eq!(quote.rate_with_vat, 1800.0);
        assert_eq!(quote.delivery_days, 3);
    }

    #[tokio::test]
    async fn postal_codes_are_checked_against_the_api() {
        let provider = provider(fake_andreani().await);

        let check = provider.validate_postal_code("8300").await.expect("check");
        assert!(check.valid);
        assert_eq!(check.locality.as_deref(), Some("Neuquén"));
    }

    #[tokio::test]
    async fn shipment_failures_are_reported() {
        let provider = provider(fake_andreani().await);
        let address = PostalAddress {
            street: "Av. Argentina".to_owned(),
            number: "100".to_owned(),
            locality: "Neuquén".to_owned(),
            province: "Neuquén".to_owned(),
            postal_code: "8300".to_owned(),
            floor: None,
            apartment: None,
        };
        let person = Person {
            full_name: "Ana Pérez".to_owned(),
            email: "ana@shop.test".to_owned(),
            document_type: "DNI".to_owned(),
            document_number: "30111222".to_owned(),
            phone: None,
        };
        let request = ShipmentRequest {
            origin: address.clone(),
            destination: address,
            sender: person.clone(),
            recipient: person,
            packages: vec![ShipmentPackage {
                kilos: 1.0,
                volume: 1000.0,
                declared_value: 100.0,
                description: None,
            }],
            contract: None,
        };

        let result = provider.create_shipment(&request).await;
        assert!(matches!(
            result,
            Err(ShippingError::Rejected { status: 502, .. })
        ));

        assert!(provider.cancel_shipment("X1").await.is_err());
    }
}
