use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateIntentRequest {
    pub cart_ids: Vec<Uuid>,
    /// Client-side total; only compared against the server total for logging.
    #[serde(default)]
    pub price: Option<Decimal>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateIntentResponse {
    #[serde(rename = "clientSecret")]
    pub client_secret: String,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct RecordPaymentRequest {
    pub cart_ids: Vec<Uuid>,
    pub transaction_id: String,
}

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub email: Option<String>,
}
