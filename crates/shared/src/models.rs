//! Shared data models for the gruzreis cargo and account payloads.

use chrono::Utc;
use serde::{Deserialize, Serialize};

// --- Account ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UserRatings {
    pub orders: f64,
    pub rate: f64,
    pub payd: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UserNotifications {
    pub email: bool,
    pub sms: bool,
    pub orders: bool,
    pub market: bool,
}

/// Session returned by a successful `authorization` handshake.
///
/// Field names follow the backend payload verbatim (`guid`, `user_type`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthSession {
    pub guid: String,
    pub token: String,
    pub phone: String,
    pub name: String,
    pub email: String,
    pub image: String,
    pub user_type: i64,
    pub ratings: UserRatings,
    pub description: String,
    pub notifications: UserNotifications,
}

// --- Cargo ---

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CargoStatus {
    #[default]
    #[serde(rename = "Новый")]
    New,
    #[serde(rename = "В ожидании")]
    Waiting,
    #[serde(rename = "Есть заказы")]
    HasOrders,
    #[serde(rename = "Торг")]
    Negotiation,
    #[serde(rename = "В работе")]
    InWork,
    #[serde(rename = "Доставлено")]
    Delivered,
    #[serde(rename = "Выполнено")]
    Completed,
}

impl CargoStatus {
    pub const ALL: [CargoStatus; 7] = [
        CargoStatus::New,
        CargoStatus::Waiting,
        CargoStatus::HasOrders,
        CargoStatus::Negotiation,
        CargoStatus::InWork,
        CargoStatus::Delivered,
        CargoStatus::Completed,
    ];

    /// Wire label, as the backend sends it.
    pub fn label(&self) -> &'static str {
        match self {
            CargoStatus::New => "Новый",
            CargoStatus::Waiting => "В ожидании",
            CargoStatus::HasOrders => "Есть заказы",
            CargoStatus::Negotiation => "Торг",
            CargoStatus::InWork => "В работе",
            CargoStatus::Delivered => "Доставлено",
            CargoStatus::Completed => "Выполнено",
        }
    }

    pub fn can_edit(&self) -> bool {
        matches!(
            self,
            CargoStatus::New | CargoStatus::Waiting | CargoStatus::HasOrders
        )
    }

    pub fn can_delete(&self) -> bool {
        matches!(self, CargoStatus::New | CargoStatus::Waiting)
    }

    pub fn can_publish(&self) -> bool {
        matches!(self, CargoStatus::New)
    }

    /// Completed cargos live in the archive, everything else in the active list.
    pub fn is_archived(&self) -> bool {
        matches!(self, CargoStatus::Completed)
    }
}

impl std::fmt::Display for CargoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CargoCity {
    pub city: String,
    pub fias: String,
}

/// Pickup or delivery point.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CargoAddress {
    pub city: CargoCity,
    pub address: String,
    pub fias: String,
    pub lat: f64,
    pub long: f64,
}

/// A driver's offer on a cargo.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CargoInvoice {
    pub id: String,
    pub cargo: String,
    pub driver_id: String,
    pub driver_name: String,
    pub driver_phone: String,
    pub transport: String,
    pub price: f64,
    pub weight: f64,
    pub volume: f64,
    pub status: String,
    pub created_at: String,
    pub rating: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Cargo {
    pub guid: String,
    pub name: String,
    pub description: String,
    pub client: String,

    pub address: CargoAddress,
    pub destiny: CargoAddress,

    pub pickup_date: String,
    pub delivery_date: String,

    pub weight: f64,
    pub volume: f64,
    pub price: f64,
    pub cost: f64,
    pub advance: f64,

    pub phone: String,
    pub face: String,

    pub status: CargoStatus,
    pub invoices: Vec<CargoInvoice>,

    #[serde(rename = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(rename = "updatedAt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Cargo {
    /// A fresh cargo with a generated guid and `New` status.
    pub fn draft() -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            guid: uuid::Uuid::new_v4().to_string(),
            status: CargoStatus::New,
            created_at: Some(now.clone()),
            updated_at: Some(now),
            ..Default::default()
        }
    }

    /// Case-insensitive match on name, description and both cities.
    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        [
            &self.name,
            &self.description,
            &self.address.city.city,
            &self.destiny.city.city,
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(&query))
    }

    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now().to_rfc3339());
    }
}

/// Payload of the `new_offer` push event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewOffer {
    pub cargo_id: String,
    pub offer: CargoInvoice,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cargo_status_uses_backend_labels() {
        let status: CargoStatus = serde_json::from_value(json!("Есть заказы")).unwrap();
        assert_eq!(status, CargoStatus::HasOrders);
        assert_eq!(serde_json::to_value(CargoStatus::Completed).unwrap(), json!("Выполнено"));
    }

    #[test]
    fn partial_cargo_payload_fills_defaults() {
        let cargo: Cargo = serde_json::from_value(json!({
            "guid": "c-1",
            "name": "Пиломатериалы",
            "status": "В работе",
            "address": { "city": { "city": "Казань" } }
        }))
        .unwrap();

        assert_eq!(cargo.status, CargoStatus::InWork);
        assert_eq!(cargo.address.city.city, "Казань");
        assert!(cargo.invoices.is_empty());
        assert_eq!(cargo.created_at, None);
    }

    #[test]
    fn status_rules() {
        assert!(CargoStatus::New.can_publish());
        assert!(!CargoStatus::Waiting.can_publish());
        assert!(CargoStatus::HasOrders.can_edit());
        assert!(!CargoStatus::HasOrders.can_delete());
        assert!(CargoStatus::Completed.is_archived());
    }

    #[test]
    fn query_matches_cities_case_insensitively() {
        let mut cargo = Cargo::draft();
        cargo.name = "Трубы".into();
        cargo.destiny.city.city = "Самара".into();

        assert!(cargo.matches_query("самар"));
        assert!(cargo.matches_query("  "));
        assert!(!cargo.matches_query("омск"));
    }

    #[test]
    fn new_offer_is_camel_case() {
        let offer: NewOffer = serde_json::from_value(json!({
            "cargoId": "c-9",
            "offer": { "id": "o-1", "driverName": "Иван", "price": 42000.0 }
        }))
        .unwrap();
        assert_eq!(offer.cargo_id, "c-9");
        assert_eq!(offer.offer.driver_name, "Иван");
    }
}
