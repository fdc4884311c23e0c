//! Payment-intent provider.

use axum::async_trait;
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::StripeConfig;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment provider is not configured")]
    NotConfigured,

    #[error("amount cannot be represented in minor units: {0}")]
    InvalidAmount(Decimal),

    #[error("payment provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("payment provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(&self, amount: Decimal) -> Result<PaymentIntent, GatewayError>;
}

/// Converts a decimal amount to integer cents, rounding half away from zero.
pub fn to_minor_units(amount: Decimal) -> Result<i64, GatewayError> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or(GatewayError::InvalidAmount(amount))
}

/// Stripe `POST /v1/payment_intents` client.
#[derive(Clone)]
pub struct StripeGateway {
    http: reqwest::Client,
    config: StripeConfig,
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_intent(&self, amount: Decimal) -> Result<PaymentIntent, GatewayError> {
        let key = self
            .config
            .secret_key
            .as_deref()
            .ok_or(GatewayError::NotConfigured)?;
        let cents = to_minor_units(amount)?;

        let url = format!("{}/v1/payment_intents", self.config.api_base.trim_end_matches('/'));
        let form = [
            ("amount", cents.to_string()),
            ("currency", self.config.currency.clone()),
            ("payment_method_types[]", "card".to_string()),
        ];
        let res = self
            .http
            .post(&url)
            .bearer_auth(key)
            .form(&form)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let message = res
                .json::<ErrorEnvelope>()
                .await
                .ok()
                .and_then(|e| e.error.message)
                .unwrap_or_else(|| "unknown error".into());
            warn!(status = status.as_u16(), %message, "payment intent rejected");
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let intent: IntentResponse = res.json().await?;
        debug!(intent_id = %intent.id, cents, "payment intent created");
        Ok(PaymentIntent {
            id: intent.id,
            client_secret: intent.client_secret,
        })
    }
}
