use async_trait::async_trait;
use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

use super::{
    rates, Branch, BranchFilter, Cancellation, Coordinates, Parcel, PostalCodeCheck, Quote,
    QuoteRequest, QuoteSource, Shipment, ShipmentRequest, ShippingError, ShippingProvider,
    Tracking, TrackingEvent,
};

static POSTAL_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}$").expect("valid regex"));

/// Demo provider: deterministic tariffs, canned branches and tracking.
#[derive(Clone, Debug, Default)]
pub struct MockProvider;

impl MockProvider {
    pub fn new() -> Self {
        MockProvider
    }

    pub fn sample_branches(filter: &BranchFilter) -> Vec<Branch> {
        let locality = filter.locality.clone().unwrap_or_else(|| "Buenos Aires".to_owned());
        let province = filter.province.clone().unwrap_or_else(|| "Buenos Aires".to_owned());

        [
            ("SUC001", "Andreani Centro", "Av. Corrientes 5000", "1414", "011-4000-1234",
             "Mon-Fri 9:00-18:00, Sat 9:00-13:00", -34.6037, -58.3816),
            ("SUC002", "Andreani Caballito", "Av. Rivadavia 5200", "1424", "011-4000-5678",
             "Mon-Fri 8:00-19:00, Sat 9:00-14:00", -34.6158, -58.4370),
            ("SUC003", "Andreani Belgrano", "Av. Cabildo 2300", "1428", "011-4000-9012",
             "Mon-Fri 9:00-18:00", -34.5625, -58.4542),
        ]
        .into_iter()
        .map(|(id, name, address, postal_code, phone, hours, lat, lng)| Branch {
            id: id.to_owned(),
            name: name.to_owned(),
            address: address.to_owned(),
            locality: locality.clone(),
            province: province.clone(),
            postal_code: filter.postal_code.clone().unwrap_or_else(|| postal_code.to_owned()),
            phone: Some(phone.to_owned()),
            hours: Some(hours.to_owned()),
            coordinates: Some(Coordinates { lat, lng }),
        })
        .collect()
    }

    pub fn sample_tracking(shipment_number: &str) -> Tracking {
        let now = Utc::now();
        let events = [
            (48, "Ingresado", "Shipment registered", "Centro de Distribución CABA"),
            (24, "En tránsito", "Parcel on its way to destination", "Hub Buenos Aires"),
            (6, "En distribución", "Parcel out for delivery", "Destination branch"),
        ]
        .into_iter()
        .map(|(hours_ago, status, description, branch)| TrackingEvent {
            date: (now - Duration::hours(hours_ago)).to_rfc3339(),
            status: status.to_owned(),
            description: description.to_owned(),
            branch: Some(branch.to_owned()),
        })
        .collect();

        Tracking {
            shipment_number: shipment_number.to_owned(),
            events,
            source: QuoteSource::Mock,
        }
    }

    pub fn sample_label(shipment_number: &str) -> Vec<u8> {
        format!(
            "DEMO shipping label\nNumber: {shipment_number}\n\nThis label was generated for demonstration purposes."
        )
        .into_bytes()
    }
}

#[async_trait]
impl ShippingProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, ShippingError> {
        let total = rates::zone_rate(&request.packages, &request.destination_postal_code);
        Ok(rates::quote_from_total(
            total,
            rates::mock_delivery_days(&request.destination_postal_code),
            &["Estándar", "Sucursal", "Express"],
            QuoteSource::Mock,
        ))
    }

    async fn branches(&self, filter: &BranchFilter) -> Result<Vec<Branch>, ShippingError> {
        Ok(Self::sample_branches(filter))
    }

    async fn create_shipment(&self, request: &ShipmentRequest) -> Result<Shipment, ShippingError> {
        let stamp = Utc::now().timestamp_millis();
        let suffix: u16 = rand::thread_rng().gen_range(0..10_000);
        let shipment_number = format!("DEMO{stamp}{suffix:04}");

        let parcels = request
            .packages
            .iter()
            .enumerate()
            .map(|(index, package)| Parcel {
                index: index + 1,
                shipment_number: Some(shipment_number.clone()),
                kilos: package.kilos,
                status: "pending".to_owned(),
            })
            .collect();

        Ok(Shipment {
            order_number: format!("AND-{stamp}"),
            shipment_number,
            parcels,
            source: QuoteSource::Mock,
        })
    }

    async fn tracking(&self, shipment_number: &str) -> Result<Tracking, ShippingError> {
        Ok(Self::sample_tracking(shipment_number))
    }

    async fn label(&self, shipment_number: &str) -> Result<Vec<u8>, ShippingError> {
        Ok(Self::sample_label(shipment_number))
    }

    async fn validate_postal_code(&self, postal_code: &str) -> Result<PostalCodeCheck, ShippingError> {
        if POSTAL_CODE.is_match(postal_code) {
            Ok(PostalCodeCheck {
                valid: true,
                locality: Some("Buenos Aires".to_owned()),
                province: Some("Buenos Aires".to_owned()),
                postal_code: Some(postal_code.to_owned()),
                message: None,
            })
        } else {
            Ok(PostalCodeCheck::invalid("Invalid postal code (expected 4 digits)"))
        }
    }

    async fn cancel_shipment(&self, _shipment_number: &str) -> Result<Cancellation, ShippingError> {
        Ok(Cancellation {
            cancelled: true,
            message: "Shipment cancelled (demo)".to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::shipping::{Package, Person, PostalAddress, ShipmentPackage};

    fn quote_request(destination: &str) -> QuoteRequest {
        QuoteRequest {
            origin_postal_code: "1043".to_owned(),
            destination_postal_code: destination.to_owned(),
            packages: vec![Package {
                kilos: 2.0,
                volume: 5000.0,
                declared_value: 1000.0,
                dimensions: None,
            }],
            contract: None,
        }
    }

    #[tokio::test]
    async fn quotes_city_and_interior_destinations() {
        let provider = MockProvider::new();

        let city = provider.quote(&quote_request("1414")).await.expect("quote");
        assert_eq!(city.rate_with_vat, 1800.0);
        assert_eq!(city.rate, (1800.0_f64 / 1.21).round());
        assert_eq!(city.delivery_days, 2);
        assert_eq!(city.services.len(), 3);
        assert_eq!(city.source, QuoteSource::Mock);

        let interior = provider.quote(&quote_request("8300")).await.expect("quote");
        assert_eq!(interior.rate_with_vat, 2600.0);
        assert_eq!(interior.delivery_days, 5);
    }

    #[tokio::test]
    async fn postal_codes_must_have_four_digits() {
        let provider = MockProvider::new();

        let ok = provider.validate_postal_code("1414").await.expect("check");
        assert!(ok.valid);
        assert_eq!(ok.postal_code.as_deref(), Some("1414"));

        for bad in ["141", "14145", "B1414", ""] {
            let check = provider.validate_postal_code(bad).await.expect("check");
            assert!(!check.valid, "{bad} should be rejected");
        }
    }

    #[tokio::test]
    async fn branches_echo_the_filter() {
        let filter = BranchFilter {
            postal_code: Some("5000".to_owned()),
            locality: Some("Córdoba".to_owned()),
            province: None,
        };

        let branches = MockProvider::new().branches(&filter).await.expect("branches");

        assert_eq!(branches.len(), 3);
        assert!(branches.iter().all(|b| b.locality == "Córdoba"));
        assert!(branches.iter().all(|b| b.postal_code == "5000"));
        assert!(branches.iter().all(|b| b.province == "Buenos Aires"));
    }

    #[tokio::test]
    async fn shipments_get_demo_numbers_per_parcel() {
        let address = PostalAddress {
            street: "Av. Corrientes".to_owned(),
            number: "1234".to_owned(),
            locality: "CABA".to_owned(),
            province: "Buenos Aires".to_owned(),
            postal_code: "1043".to_owned(),
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
        let parcel = ShipmentPackage {
            kilos: 1.5,
            volume: 2000.0,
            declared_value: 3000.0,
            description: None,
        };
        let request = ShipmentRequest {
            origin: address.clone(),
            destination: address,
            sender: person.clone(),
            recipient: person,
            packages: vec![parcel.clone(), parcel],
            contract: None,
        };

        let shipment = MockProvider::new().create_shipment(&request).await.expect("shipment");

        assert!(shipment.shipment_number.starts_with("DEMO"));
        assert!(shipment.order_number.starts_with("AND-"));
        assert_eq!(shipment.parcels.len(), 2);
        assert_eq!(shipment.parcels[1].index, 2);
        assert!(shipment
            .parcels
            .iter()
            .all(|p| p.shipment_number.as_deref() == Some(shipment.shipment_number.as_str())));
    }

    #[tokio::test]
    async fn tracking_lists_events_oldest_first() {
        let tracking = MockProvider::new().tracking("DEMO1").await.expect("tracking");
        assert_eq!(tracking.events.len(), 3);
        assert_eq!(tracking.events[0].status, "Ingresado");
        assert!(tracking.events[0].date < tracking.events[2].date);
    }
}
