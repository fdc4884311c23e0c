use std::collections::HashMap;

use anyhow::Context;
use axum::async_trait;
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::{
    distinct_ids, CartRepo, ClassRepo, PaymentRepo, StoreError, StoreResult, UserRepo,
};
use crate::carts::repo_types::CartItem;
use crate::classes::repo_types::{ClassOffering, ClassStatus, NewClass};
use crate::payments::repo_types::{AdminStats, Payment, Receipt};
use crate::users::repo_types::{NewUser, Role, User};

const USER_COLUMNS: &str = "id, email, name, photo_url, role, created_at";
const CLASS_COLUMNS: &str = "id, name, image_url, instructor_name, instructor_email, \
                             available_seats, enrolled, price, status, feedback, created_at";
const PAYMENT_COLUMNS: &str = "id, email, price, transaction_id, cart_ids, class_ids, created_at";

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION))
}

fn map_unique(e: sqlx::Error, message: &str) -> StoreError {
    if is_unique_violation(&e) {
        StoreError::Conflict(message.to_string())
    } else {
        StoreError::Database(e)
    }
}

#[async_trait]
impl UserRepo for PgStore {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, name, photo_url)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.email)
        .bind(&new.name)
        .bind(&new.photo_url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique(e, "user already exists"))
    }

    async fn set_user_role(&self, id: Uuid, role: Role) -> StoreResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET role = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(role)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound("user not found".into()))
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let rows = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_users_by_role(&self, role: Role) -> StoreResult<Vec<User>> {
        let rows = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE role = $1 ORDER BY created_at ASC"
        ))
        .bind(role)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl ClassRepo for PgStore {
    async fn create_class(&self, new: NewClass) -> StoreResult<ClassOffering> {
        let class = sqlx::query_as::<_, ClassOffering>(&format!(
            r#"
            INSERT INTO classes
                (name, image_url, instructor_name, instructor_email, available_seats, price)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {CLASS_COLUMNS}
            "#
        ))
        .bind(&new.name)
        .bind(&new.image_url)
        .bind(&new.instructor_name)
        .bind(&new.instructor_email)
        .bind(new.available_seats)
        .bind(new.price)
        .fetch_one(&self.pool)
        .await?;
        Ok(class)
    }

    async fn find_class(&self, id: Uuid) -> StoreResult<Option<ClassOffering>> {
        let class = sqlx::query_as::<_, ClassOffering>(&format!(
            "SELECT {CLASS_COLUMNS} FROM classes WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(class)
    }

    async fn list_classes(&self) -> StoreResult<Vec<ClassOffering>> {
        let rows = sqlx::query_as::<_, ClassOffering>(&format!(
            "SELECT {CLASS_COLUMNS} FROM classes ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_classes_by_status(
        &self,
        status: ClassStatus,
    ) -> StoreResult<Vec<ClassOffering>> {
        let rows = sqlx::query_as::<_, ClassOffering>(&format!(
            "SELECT {CLASS_COLUMNS} FROM classes WHERE status = $1 ORDER BY created_at DESC"
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_classes_by_instructor(&self, email: &str) -> StoreResult<Vec<ClassOffering>> {
        let rows = sqlx::query_as::<_, ClassOffering>(&format!(
            "SELECT {CLASS_COLUMNS} FROM classes WHERE instructor_email = $1 \
             ORDER BY created_at DESC"
        ))
        .bind(email)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn set_class_status(
        &self,
        id: Uuid,
        status: ClassStatus,
    ) -> StoreResult<ClassOffering> {
        let mut tx = self.pool.begin().await?;

        let current: Option<ClassStatus> =
            sqlx::query_scalar("SELECT status FROM classes WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let current = current.ok_or_else(|| StoreError::NotFound("class not found".into()))?;
        let next = current
            .transition(status)
            .map_err(StoreError::InvalidArgument)?;

        let class = sqlx::query_as::<_, ClassOffering>(&format!(
            "UPDATE classes SET status = $2 WHERE id = $1 RETURNING {CLASS_COLUMNS}"
        ))
        .bind(id)
        .bind(next)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(class)
    }

    async fn set_class_feedback(&self, id: Uuid, feedback: &str) -> StoreResult<ClassOffering> {
        sqlx::query_as::<_, ClassOffering>(&format!(
            "UPDATE classes SET feedback = $2 WHERE id = $1 RETURNING {CLASS_COLUMNS}"
        ))
        .bind(id)
        .bind(feedback)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound("class not found".into()))
    }
}

#[async_trait]
impl CartRepo for PgStore {
    async fn list_cart(&self, email: &str) -> StoreResult<Vec<CartItem>> {
        let rows = sqlx::query_as::<_, CartItem>(
            r#"
            SELECT id, class_id, email, created_at
            FROM carts
            WHERE email = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn add_cart_item(&self, class_id: Uuid, email: &str) -> StoreResult<CartItem> {
        let status: Option<ClassStatus> =
            sqlx::query_scalar("SELECT status FROM classes WHERE id = $1")
                .bind(class_id)
                .fetch_optional(&self.pool)
                .await?;
        match status {
            None => return Err(StoreError::NotFound("class not found".into())),
            Some(ClassStatus::Approved) => {}
            Some(_) => {
                return Err(StoreError::InvalidArgument(
                    "class is not open for booking".into(),
                ))
            }
        }

        sqlx::query_as::<_, CartItem>(
            r#"
            INSERT INTO carts (class_id, email)
            VALUES ($1, $2)
            RETURNING id, class_id, email, created_at
            "#,
        )
        .bind(class_id)
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique(e, "class is already in the cart"))
    }

    async fn remove_cart_item(&self, id: Uuid, email: &str) -> StoreResult<()> {
        let res = sqlx::query("DELETE FROM carts WHERE id = $1 AND email = $2")
            .bind(id)
            .bind(email)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound("cart item not found".into()));
        }
        Ok(())
    }
}

/// Loads the caller's cart rows with their class prices, locking them for
/// the rest of the transaction.
async fn lock_cart_lines(
    tx: &mut Transaction<'_, Postgres>,
    email: &str,
    ids: &[Uuid],
) -> StoreResult<HashMap<Uuid, (Uuid, Decimal)>> {
    let rows: Vec<(Uuid, Uuid, Decimal)> = sqlx::query_as(
        r#"
        SELECT c.id, c.class_id, cl.price
          FROM carts c
          JOIN classes cl ON cl.id = c.class_id
         WHERE c.id = ANY($1) AND c.email = $2
         FOR UPDATE OF c
        "#,
    )
    .bind(ids)
    .bind(email)
    .fetch_all(&mut **tx)
    .await?;

    if rows.len() != ids.len() {
        return Err(StoreError::NotFound("cart items not found".into()));
    }
    Ok(rows
        .into_iter()
        .map(|(id, class_id, price)| (id, (class_id, price)))
        .collect())
}

#[async_trait]
impl PaymentRepo for PgStore {
    async fn quote_cart(&self, email: &str, cart_ids: &[Uuid]) -> StoreResult<Decimal> {
        let ids = distinct_ids(cart_ids);
        if ids.is_empty() {
            return Err(StoreError::InvalidArgument("cart_ids must not be empty".into()));
        }
        let prices: Vec<Decimal> = sqlx::query_scalar(
            r#"
            SELECT cl.price
              FROM carts c
              JOIN classes cl ON cl.id = c.class_id
             WHERE c.id = ANY($1) AND c.email = $2
            "#,
        )
        .bind(&ids)
        .bind(email)
        .fetch_all(&self.pool)
        .await?;

        if prices.len() != ids.len() {
            return Err(StoreError::NotFound("cart items not found".into()));
        }
        Ok(prices.into_iter().sum())
    }

    async fn checkout(
        &self,
        email: &str,
        cart_ids: &[Uuid],
        transaction_id: &str,
    ) -> StoreResult<Receipt> {
        let ids = distinct_ids(cart_ids);
        if ids.is_empty() {
            return Err(StoreError::InvalidArgument("cart_ids must not be empty".into()));
        }

        // Dropping `tx` on any early return rolls everything back.
        let mut tx = self.pool.begin().await?;

        let lines = lock_cart_lines(&mut tx, email, &ids).await?;
        let mut class_ids = Vec::with_capacity(ids.len());
        let mut total = Decimal::ZERO;
        for id in &ids {
            let (class_id, price) = *lines
                .get(id)
                .ok_or_else(|| StoreError::NotFound("cart items not found".into()))?;
            class_ids.push(class_id);
            total += price;
        }
        if total <= Decimal::ZERO {
            return Err(StoreError::InvalidArgument("payment total must be positive".into()));
        }

        let payment_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO payments (email, price, transaction_id, cart_ids, class_ids)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(email)
        .bind(total)
        .bind(transaction_id)
        .bind(&ids)
        .bind(&class_ids)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique(e, "transaction already recorded"))?;

        let removed = sqlx::query("DELETE FROM carts WHERE id = ANY($1) AND email = $2")
            .bind(&ids)
            .bind(email)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        for class_id in &class_ids {
            let res = sqlx::query(
                r#"
                UPDATE classes
                   SET available_seats = available_seats - 1,
                       enrolled = enrolled + 1
                 WHERE id = $1 AND available_seats > 0
                "#,
            )
            .bind(class_id)
            .execute(&mut *tx)
            .await?;
            if res.rows_affected() == 0 {
                return Err(StoreError::Conflict(format!("class {class_id} is full")));
            }
        }

        tx.commit().await?;
        debug!(%payment_id, removed, "checkout committed");

        Ok(Receipt {
            payment_id,
            price: total,
            removed_cart_items: removed as usize,
        })
    }

    async fn list_payments(&self, email: &str) -> StoreResult<Vec<Payment>> {
        let rows = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE email = $1 ORDER BY created_at DESC"
        ))
        .bind(email)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn enrolled_classes(&self, email: &str) -> StoreResult<Vec<ClassOffering>> {
        let rows = sqlx::query_as::<_, ClassOffering>(&format!(
            r#"
            SELECT {CLASS_COLUMNS}
              FROM classes
             WHERE id IN (SELECT unnest(class_ids) FROM payments WHERE email = $1)
             ORDER BY name ASC
            "#
        ))
        .bind(email)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn admin_stats(&self) -> StoreResult<AdminStats> {
        let (users, classes, payments, revenue): (i64, i64, i64, Decimal) = sqlx::query_as(
            r#"
            SELECT (SELECT COUNT(*) FROM users),
                   (SELECT COUNT(*) FROM classes),
                   (SELECT COUNT(*) FROM payments),
                   (SELECT COALESCE(SUM(price), 0) FROM payments)
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(AdminStats {
            users,
            classes,
            payments,
            revenue,
        })
    }
}
