use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::domain::order::OrderError;

// ============================================================================
// Order Record Model
// ============================================================================
//
// The Order aggregate as it travels over the wire (Kafka payloads, HTTP
// bodies, cache snapshots) and as it is persisted across the normalized
// orders / deliveries / payments / items tables.
//
// Decoding is lenient: absent fields take their zero value, so a payload
// without `order_uid` decodes fine and is rejected by `validate` instead.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Order {
    pub order_uid: String,
    pub track_number: String,
    pub entry: String,
    pub delivery: Delivery,
    pub payment: Payment,
    pub items: Vec<Item>,
    pub locale: String,
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    #[serde(rename = "shardkey")]
    pub shard_key: String,
    pub sm_id: i64,
    pub date_created: DateTime<Utc>,
    pub oof_shard: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Payment {
    pub transaction: String,
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    pub amount: i64,
    /// Unix seconds.
    pub payment_dt: i64,
    pub bank: String,
    pub delivery_cost: i64,
    pub goods_total: i64,
    pub custom_fee: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Item {
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i64,
    pub rid: String,
    pub name: String,
    /// Sale percentage.
    pub sale: i64,
    pub size: String,
    /// Supplied by the producer, never recomputed here.
    pub total_price: i64,
    pub nm_id: i64,
    pub brand: String,
    pub status: i64,
}

impl Order {
    /// Decode an order from a JSON payload
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Validate the invariants every stored order must satisfy
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.order_uid.is_empty() {
            return Err(OrderError::EmptyUid);
        }
        if self.items.is_empty() {
            return Err(OrderError::NoItems);
        }
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
