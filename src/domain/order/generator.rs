use chrono::{SubsecRound, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

use crate::models::{Delivery, Item, Order, Payment};

// ============================================================================
// Random Order Generator
// ============================================================================
//
// Test-data helper behind GET /order/generate and the test suites.
// Totals are computed here, on the producer side; the pipeline stores
// whatever it is given.
//
// ============================================================================

const DELIVERY_COST: i64 = 1500;

fn random_suffix(prefix: &str, len: usize) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{prefix}{suffix}")
}

/// Build a complete, well-formed order with a fresh uuid v4 order_uid
pub fn generate_random_order() -> Order {
    let mut rng = rand::thread_rng();

    let order_uid = Uuid::new_v4().to_string();
    let track_number = random_suffix("WBIL", 10);
    let price: i64 = rng.gen_range(100..1100);
    let sale: i64 = rng.gen_range(0..50);
    let total_price = price * (100 - sale) / 100;
    // Postgres keeps microseconds; truncate so the value survives a round trip
    let now = Utc::now().trunc_subsecs(6);

    Order {
        order_uid: order_uid.clone(),
        track_number: track_number.clone(),
        entry: "WBIL".to_string(),
        delivery: Delivery {
            name: random_suffix("User", 6),
            phone: format!("+972{:07}", rng.gen_range(0..10_000_000)),
            zip: format!("{:06}", rng.gen_range(0..1_000_000)),
            city: random_suffix("City", 5),
            address: random_suffix("Street", 8),
            region: random_suffix("Region", 4),
            email: format!("{}@example.com", random_suffix("user", 6)),
        },
        payment: Payment {
            transaction: order_uid,
            request_id: String::new(),
            currency: "USD".to_string(),
            provider: "wbpay".to_string(),
            amount: price + DELIVERY_COST,
            payment_dt: now.timestamp(),
            bank: "alpha".to_string(),
            delivery_cost: DELIVERY_COST,
            goods_total: total_price,
            custom_fee: 0,
        },
        items: vec![Item {
            chrt_id: rng.gen_range(0..10_000_000),
            track_number,
            price,
            rid: random_suffix("rid", 12),
            name: random_suffix("Product", 6),
            sale,
            size: "0".to_string(),
            total_price,
            nm_id: rng.gen_range(0..10_000_000),
            brand: random_suffix("Brand", 5),
            status: 202,
        }],
        locale: "en".to_string(),
        internal_signature: String::new(),
        customer_id: "test".to_string(),
        delivery_service: "meest".to_string(),
        shard_key: "9".to_string(),
        sm_id: 99,
        date_created: now,
        oof_shard: "1".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_order_is_well_formed() {
        let order = generate_random_order();

        assert!(order.validate().is_ok());
        assert!(Uuid::parse_str(&order.order_uid).is_ok());
        assert!(order.track_number.starts_with("WBIL"));
        assert_eq!(order.track_number.len(), 14);
        assert_eq!(order.items[0].track_number, order.track_number);
    }

    #[test]
    fn test_generated_totals_are_consistent() {
        let order = generate_random_order();
        let item = &order.items[0];

        assert_eq!(item.total_price, item.price * (100 - item.sale) / 100);
        assert_eq!(order.payment.goods_total, item.total_price);
        assert_eq!(order.payment.amount, item.price + DELIVERY_COST);
    }

    #[test]
    fn test_generated_uids_are_unique() {
        let a = generate_random_order();
        let b = generate_random_order();
        assert_ne!(a.order_uid, b.order_uid);
    }

    #[test]
    fn test_date_created_has_microsecond_precision() {
        let order = generate_random_order();
        assert_eq!(order.date_created.timestamp_subsec_nanos() % 1_000, 0);
    }
}
