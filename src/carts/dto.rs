use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CartQuery {
    pub email: Option<String>,
}

/// `email` is optional; when present it must be the caller's own.
#[derive(Debug, Deserialize)]
pub struct AddCartItemRequest {
    pub class_id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}
