use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Represents a customer order as delivered on the broker.
///
/// The order owns exactly one [`Delivery`] and one [`Payment`] and a
/// non-empty list of [`Item`]s. `order_uid` is the only external handle and
/// is never reassigned once the order has been persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_uid: String,
    pub track_number: String,
    pub entry: String,
    pub delivery: Delivery,
    pub payment: Payment,
    pub items: Vec<Item>,
    pub locale: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub shardkey: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sm_id: i64,
    pub date_created: DateTime<Utc>,
    pub oof_shard: String,
}

/// Recipient contact data. Embedded by value in [`Order`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

/// Transaction record for an order. Embedded by value in [`Order`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub transaction: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    pub amount: i64,
    /// Epoch seconds.
    pub payment_dt: i64,
    pub bank: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub delivery_cost: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub goods_total: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub custom_fee: i64,
}

/// A single line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i64,
    pub rid: String,
    pub name: String,
    /// Discount percentage, 0..=100.
    #[serde(default, deserialize_with = "null_as_default")]
    pub sale: i64,
    pub size: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_price: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub nm_id: i64,
    pub brand: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: i64,
}

// Optional fields accept `null` and absence alike; both mean the zero value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Order {
    /// Decodes an order from a raw broker payload.
    pub fn from_json(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Encodes the order as the JSON document carried on the broker.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Returns `true` when the order carries no usable identifier and must
    /// never be cached.
    pub fn has_key(&self) -> bool {
        !self.order_uid.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "order_uid": "b563feb7b2b84b6test",
        "track_number": "WBILMTESTTRACK",
        "entry": "WBIL",
        "delivery": {
            "name": "Test Testov",
            "phone": "+9720000000",
            "zip": "2639809",
            "city": "Kiryat Mozkin",
            "address": "Ploshad Mira 15",
            "region": "Kraiot",
            "email": "test@gmail.com"
        },
        "payment": {
            "transaction": "b563feb7b2b84b6test",
            "request_id": "",
            "currency": "USD",
            "provider": "wbpay",
            "amount": 1817,
            "payment_dt": 1637907727,
            "bank": "alpha",
            "delivery_cost": 1500,
            "goods_total": 317,
            "custom_fee": 0
        },
        "items": [
            {
                "chrt_id": 9934930,
                "track_number": "WBILMTESTTRACK",
                "price": 453,
                "rid": "ab4219087a764ae0btest",
                "name": "Mascaras",
                "sale": 30,
                "size": "0",
                "total_price": 317,
                "nm_id": 2389212,
                "brand": "Vivienne Sabo",
                "status": 202
            }
        ],
        "locale": "en",
        "internal_signature": "",
        "customer_id": "test",
        "delivery_service": "meest",
        "shardkey": "9",
        "sm_id": 99,
        "date_created": "2021-11-26T06:22:19Z",
        "oof_shard": "1"
    }"#;

    #[test]
    fn test_decodes_broker_payload() {
        let order = Order::from_json(SAMPLE.as_bytes()).unwrap();
        assert_eq!(order.order_uid, "b563feb7b2b84b6test");
        assert_eq!(order.delivery.email, "test@gmail.com");
        assert_eq!(order.payment.amount, 1817);
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].sale, 30);
        assert_eq!(order.date_created.timestamp(), 1_637_907_739);
    }

    #[test]
    fn test_missing_nested_object_is_a_decode_error() {
        let broken = r#"{"order_uid": "x", "track_number": "t"}"#;
        assert!(Order::from_json(broken.as_bytes()).is_err());
    }

    #[test]
    fn test_null_optional_strings_decode_as_empty() {
        let payload = SAMPLE
            .replace(r#""request_id": """#, r#""request_id": null"#)
            .replace(r#""internal_signature": """#, r#""internal_signature": null"#)
            .replace(r#""shardkey": "9""#, r#""shardkey": null"#);

        let order = Order::from_json(payload.as_bytes()).unwrap();
        assert_eq!(order.payment.request_id, "");
        assert_eq!(order.internal_signature, "");
        assert_eq!(order.shardkey, "");
    }

    #[test]
    fn test_missing_or_null_optional_numbers_decode_as_zero() {
        let payload = SAMPLE
            .replace(r#""delivery_cost": 1500,"#, "")
            .replace(r#""custom_fee": 0"#, r#""custom_fee": null"#)
            .replace(r#""sale": 30,"#, "")
            .replace(r#""status": 202"#, r#""status": null"#)
            .replace(r#""sm_id": 99,"#, "");

        let order = Order::from_json(payload.as_bytes()).unwrap();
        assert_eq!(order.payment.delivery_cost, 0);
        assert_eq!(order.payment.custom_fee, 0);
        assert_eq!(order.items[0].sale, 0);
        assert_eq!(order.items[0].status, 0);
        assert_eq!(order.sm_id, 0);
    }

    #[test]
    fn test_has_key() {
        let mut order = Order::from_json(SAMPLE.as_bytes()).unwrap();
        assert!(order.has_key());
        order.order_uid.clear();
        assert!(!order.has_key());
    }
}
