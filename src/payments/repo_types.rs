use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Payment record written once per successful checkout.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub email: String,
    pub price: Decimal,
    pub transaction_id: String,
    pub cart_ids: Vec<Uuid>,
    pub class_ids: Vec<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Result of a committed checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub payment_id: Uuid,
    pub price: Decimal,
    pub removed_cart_items: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdminStats {
    #[serde(rename = "userCount")]
    pub users: i64,
    #[serde(rename = "classCount")]
    pub classes: i64,
    #[serde(rename = "paymentCount")]
    pub payments: i64,
    pub revenue: Decimal,
}
