//! Repository interfaces and their backends.
//!
//! Handlers only see the traits below through [`Store`]; the PostgreSQL
//! backend is used in production and the in-memory one for local runs
//! without a database and for tests.

pub mod memory;
pub mod postgres;

use axum::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::carts::repo_types::CartItem;
use crate::classes::repo_types::{ClassOffering, ClassStatus, NewClass};
use crate::payments::repo_types::{AdminStats, Payment, Receipt};
use crate::users::repo_types::{NewUser, Role, User};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Fails with `Conflict` when the email is already registered.
    async fn create_user(&self, new: NewUser) -> StoreResult<User>;

    /// Unconditional overwrite of the role.
    async fn set_user_role(&self, id: Uuid, role: Role) -> StoreResult<User>;

    async fn list_users(&self) -> StoreResult<Vec<User>>;

    async fn list_users_by_role(&self, role: Role) -> StoreResult<Vec<User>>;
}

#[async_trait]
pub trait ClassRepo: Send + Sync {
    async fn create_class(&self, new: NewClass) -> StoreResult<ClassOffering>;

    async fn find_class(&self, id: Uuid) -> StoreResult<Option<ClassOffering>>;

    async fn list_classes(&self) -> StoreResult<Vec<ClassOffering>>;

    async fn list_classes_by_status(&self, status: ClassStatus)
        -> StoreResult<Vec<ClassOffering>>;

    async fn list_classes_by_instructor(&self, email: &str) -> StoreResult<Vec<ClassOffering>>;

    /// Applies [`ClassStatus::transition`]; an illegal move leaves the row
    /// untouched and fails with `InvalidArgument`.
    async fn set_class_status(&self, id: Uuid, status: ClassStatus)
        -> StoreResult<ClassOffering>;

    async fn set_class_feedback(&self, id: Uuid, feedback: &str) -> StoreResult<ClassOffering>;
}

#[async_trait]
pub trait CartRepo: Send + Sync {
    async fn list_cart(&self, email: &str) -> StoreResult<Vec<CartItem>>;

    /// The class must exist and be approved; one entry per class and user.
    async fn add_cart_item(&self, class_id: Uuid, email: &str) -> StoreResult<CartItem>;

    /// Fails with `NotFound` when the item is missing or owned by someone else.
    async fn remove_cart_item(&self, id: Uuid, email: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait PaymentRepo: Send + Sync {
    /// Sum of class prices for the caller's cart items.
    async fn quote_cart(&self, email: &str, cart_ids: &[Uuid]) -> StoreResult<rust_decimal::Decimal>;

    /// Records the payment and removes the cart items as one unit of work.
    async fn checkout(
        &self,
        email: &str,
        cart_ids: &[Uuid],
        transaction_id: &str,
    ) -> StoreResult<Receipt>;

    async fn list_payments(&self, email: &str) -> StoreResult<Vec<Payment>>;

    async fn enrolled_classes(&self, email: &str) -> StoreResult<Vec<ClassOffering>>;

    async fn admin_stats(&self) -> StoreResult<AdminStats>;
}

/// Everything the HTTP layer needs from persistence.
pub trait Store: UserRepo + ClassRepo + CartRepo + PaymentRepo {}

impl<T> Store for T where T: UserRepo + ClassRepo + CartRepo + PaymentRepo {}

/// Deduplicates cart ids while keeping the caller's order.
pub(crate) fn distinct_ids(ids: &[Uuid]) -> Vec<Uuid> {
    let mut out: Vec<Uuid> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(id) {
            out.push(*id);
        }
    }
    out
}
