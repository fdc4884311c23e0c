//! In-memory backend. All tables sit behind one lock, so every operation
//! (checkout included) is applied atomically.

use axum::async_trait;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    distinct_ids, CartRepo, ClassRepo, PaymentRepo, StoreError, StoreResult, UserRepo,
};
use crate::carts::repo_types::CartItem;
use crate::classes::repo_types::{ClassOffering, ClassStatus, NewClass};
use crate::payments::repo_types::{AdminStats, Payment, Receipt};
use crate::users::repo_types::{NewUser, Role, User};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    classes: Vec<ClassOffering>,
    carts: Vec<CartItem>,
    payments: Vec<Payment>,
}

impl Tables {
    fn class_mut(&mut self, id: Uuid) -> StoreResult<&mut ClassOffering> {
        self.classes
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| StoreError::NotFound("class not found".into()))
    }

    /// Class id and price per requested cart id, in request order.
    fn cart_lines(&self, email: &str, ids: &[Uuid]) -> StoreResult<Vec<(Uuid, Decimal)>> {
        ids.iter()
            .map(|id| {
                let item = self
                    .carts
                    .iter()
                    .find(|c| c.id == *id && c.email == email)
                    .ok_or_else(|| StoreError::NotFound("cart items not found".into()))?;
                let class = self
                    .classes
                    .iter()
                    .find(|c| c.id == item.class_id)
                    .ok_or_else(|| StoreError::NotFound("cart items not found".into()))?;
                Ok((class.id, class.price))
            })
            .collect()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut rows: Vec<ClassOffering>) -> Vec<ClassOffering> {
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    rows
}

#[async_trait]
impl UserRepo for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let t = self.tables.lock().await;
        Ok(t.users.iter().find(|u| u.email == email).cloned())
    }

    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        let mut t = self.tables.lock().await;
        if t.users.iter().any(|u| u.email == new.email) {
            return Err(StoreError::Conflict("user already exists".into()));
        }
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            name: new.name,
            photo_url: new.photo_url,
            role: Role::None,
            created_at: OffsetDateTime::now_utc(),
        };
        t.users.push(user.clone());
        Ok(user)
    }

    async fn set_user_role(&self, id: Uuid, role: Role) -> StoreResult<User> {
        let mut t = self.tables.lock().await;
        let user = t
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| StoreError::NotFound("user not found".into()))?;
        user.role = role;
        Ok(user.clone())
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        Ok(self.tables.lock().await.users.clone())
    }

    async fn list_users_by_role(&self, role: Role) -> StoreResult<Vec<User>> {
        let t = self.tables.lock().await;
        Ok(t.users.iter().filter(|u| u.role == role).cloned().collect())
    }
}

#[async_trait]
impl ClassRepo for MemoryStore {
    async fn create_class(&self, new: NewClass) -> StoreResult<ClassOffering> {
        let mut t = self.tables.lock().await;
        let class = ClassOffering {
            id: Uuid::new_v4(),
            name: new.name,
            image_url: new.image_url,
            instructor_name: new.instructor_name,
            instructor_email: new.instructor_email,
            available_seats: new.available_seats,
            enrolled: 0,
            price: new.price,
            status: ClassStatus::Pending,
            feedback: None,
            created_at: OffsetDateTime::now_utc(),
        };
        t.classes.push(class.clone());
        Ok(class)
    }

    async fn find_class(&self, id: Uuid) -> StoreResult<Option<ClassOffering>> {
        let t = self.tables.lock().await;
        Ok(t.classes.iter().find(|c| c.id == id).cloned())
    }

    async fn list_classes(&self) -> StoreResult<Vec<ClassOffering>> {
        let t = self.tables.lock().await;
        Ok(newest_first(t.classes.clone()))
    }

    async fn list_classes_by_status(
        &self,
        status: ClassStatus,
    ) -> StoreResult<Vec<ClassOffering>> {
        let t = self.tables.lock().await;
        Ok(newest_first(
            t.classes.iter().filter(|c| c.status == status).cloned().collect(),
        ))
    }

    async fn list_classes_by_instructor(&self, email: &str) -> StoreResult<Vec<ClassOffering>> {
        let t = self.tables.lock().await;
        Ok(newest_first(
            t.classes
                .iter()
                .filter(|c| c.instructor_email == email)
                .cloned()
                .collect(),
        ))
    }

    async fn set_class_status(
        &self,
        id: Uuid,
        status: ClassStatus,
    ) -> StoreResult<ClassOffering> {
        let mut t = self.tables.lock().await;
        let class = t.class_mut(id)?;
        class.status = class
            .status
            .transition(status)
            .map_err(StoreError::InvalidArgument)?;
        Ok(class.clone())
    }

    async fn set_class_feedback(&self, id: Uuid, feedback: &str) -> StoreResult<ClassOffering> {
        let mut t = self.tables.lock().await;
        let class = t.class_mut(id)?;
        class.feedback = Some(feedback.to_string());
        Ok(class.clone())
    }
}

#[async_trait]
impl CartRepo for MemoryStore {
    async fn list_cart(&self, email: &str) -> StoreResult<Vec<CartItem>> {
        let t = self.tables.lock().await;
        Ok(t.carts.iter().filter(|c| c.email == email).cloned().collect())
    }

    async fn add_cart_item(&self, class_id: Uuid, email: &str) -> StoreResult<CartItem> {
        let mut t = self.tables.lock().await;
        let class = t
            .classes
            .iter()
            .find(|c| c.id == class_id)
            .ok_or_else(|| StoreError::NotFound("class not found".into()))?;
        if class.status != ClassStatus::Approved {
            return Err(StoreError::InvalidArgument("class is not open for booking".into()));
        }
        if t.carts.iter().any(|c| c.class_id == class_id && c.email == email) {
            return Err(StoreError::Conflict("class is already in the cart".into()));
        }
        let item = CartItem {
            id: Uuid::new_v4(),
            class_id,
            email: email.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        t.carts.push(item.clone());
        Ok(item)
    }

    async fn remove_cart_item(&self, id: Uuid, email: &str) -> StoreResult<()> {
        let mut t = self.tables.lock().await;
        let before = t.carts.len();
        t.carts.retain(|c| !(c.id == id && c.email == email));
        if t.carts.len() == before {
            return Err(StoreError::NotFound("cart item not found".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentRepo for MemoryStore {
    async fn quote_cart(&self, email: &str, cart_ids: &[Uuid]) -> StoreResult<Decimal> {
        let ids = distinct_ids(cart_ids);
        if ids.is_empty() {
            return Err(StoreError::InvalidArgument("cart_ids must not be empty".into()));
        }
        let t = self.tables.lock().await;
        Ok(t.cart_lines(email, &ids)?.into_iter().map(|(_, p)| p).sum())
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
        let mut t = self.tables.lock().await;

        // Validate everything before the first write.
        let lines = t.cart_lines(email, &ids)?;
        let total: Decimal = lines.iter().map(|(_, p)| *p).sum();
        if total <= Decimal::ZERO {
            return Err(StoreError::InvalidArgument("payment total must be positive".into()));
        }
        if t.payments.iter().any(|p| p.transaction_id == transaction_id) {
            return Err(StoreError::Conflict("transaction already recorded".into()));
        }
        let class_ids: Vec<Uuid> = lines.iter().map(|(id, _)| *id).collect();
        for class_id in &class_ids {
            let needed = class_ids.iter().filter(|c| *c == class_id).count();
            let seats = t
                .classes
                .iter()
                .find(|c| c.id == *class_id)
                .map(|c| c.available_seats)
                .unwrap_or(0);
            if (seats as usize) < needed {
                return Err(StoreError::Conflict(format!("class {class_id} is full")));
            }
        }

        let payment = Payment {
            id: Uuid::new_v4(),
            email: email.to_string(),
            price: total,
            transaction_id: transaction_id.to_string(),
            cart_ids: ids.clone(),
            class_ids: class_ids.clone(),
            created_at: OffsetDateTime::now_utc(),
        };
        let payment_id = payment.id;
        t.payments.push(payment);

        let before = t.carts.len();
        t.carts.retain(|c| !(c.email == email && ids.contains(&c.id)));
        let removed = before - t.carts.len();

        for class_id in &class_ids {
            let class = t.class_mut(*class_id)?;
            class.available_seats -= 1;
            class.enrolled += 1;
        }

        Ok(Receipt {
            payment_id,
            price: total,
            removed_cart_items: removed,
        })
    }

    async fn list_payments(&self, email: &str) -> StoreResult<Vec<Payment>> {
        let t = self.tables.lock().await;
        let mut rows: Vec<Payment> = t.payments.iter().filter(|p| p.email == email).cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn enrolled_classes(&self, email: &str) -> StoreResult<Vec<ClassOffering>> {
        let t = self.tables.lock().await;
        let paid: Vec<Uuid> = t
            .payments
            .iter()
            .filter(|p| p.email == email)
            .flat_map(|p| p.class_ids.iter().copied())
            .collect();
        let mut rows: Vec<ClassOffering> = t
            .classes
            .iter()
            .filter(|c| paid.contains(&c.id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn admin_stats(&self) -> StoreResult<AdminStats> {
        let t = self.tables.lock().await;
        Ok(AdminStats {
            users: t.users.len() as i64,
            classes: t.classes.len() as i64,
            payments: t.payments.len() as i64,
            revenue: t.payments.iter().map(|p| p.price).sum(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            name: None,
            photo_url: None,
        }
    }

    async fn approved_class(store: &MemoryStore, price: i64, seats: i32) -> ClassOffering {
        let class = store
            .create_class(NewClass {
                name: format!("class-{price}"),
                image_url: None,
                instructor_name: Some("Ina".into()),
                instructor_email: "ina@x.com".into(),
                available_seats: seats,
                price: Decimal::from(price),
            })
            .await
            .expect("create class");
        store
            .set_class_status(class.id, ClassStatus::Approved)
            .await
            .expect("approve")
    }

    #[tokio::test]
    async fn duplicate_signup_conflicts_and_keeps_one_user() {
        let store = MemoryStore::new();
        let first = store.create_user(new_user("a@x.com")).await.expect("first");
        assert_eq!(first.role, Role::None);

        let err = store.create_user(new_user("a@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn set_role_is_idempotent_and_reports_missing_user() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("a@x.com")).await.unwrap();
        store.set_user_role(user.id, Role::Instructor).await.unwrap();
        let again = store.set_user_role(user.id, Role::Instructor).await.unwrap();
        assert_eq!(again.role, Role::Instructor);
        assert_eq!(store.list_users_by_role(Role::Instructor).await.unwrap().len(), 1);

        let err = store.set_user_role(Uuid::new_v4(), Role::Admin).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn bogus_status_change_leaves_class_untouched() {
        let store = MemoryStore::new();
        let class = approved_class(&store, 10, 5).await;
        let err = store
            .set_class_status(class.id, ClassStatus::Denied)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
        let stored = store.find_class(class.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ClassStatus::Approved);
    }

    #[tokio::test]
    async fn cart_rejects_pending_and_duplicate_classes() {
        let store = MemoryStore::new();
        let pending = store
            .create_class(NewClass {
                name: "pending".into(),
                image_url: None,
                instructor_name: None,
                instructor_email: "ina@x.com".into(),
                available_seats: 1,
                price: Decimal::from(5),
            })
            .await
            .unwrap();
        let err = store.add_cart_item(pending.id, "a@x.com").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));

        let class = approved_class(&store, 10, 5).await;
        store.add_cart_item(class.id, "a@x.com").await.unwrap();
        let err = store.add_cart_item(class.id, "a@x.com").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn remove_only_touches_own_items() {
        let store = MemoryStore::new();
        let class = approved_class(&store, 10, 5).await;
        let item = store.add_cart_item(class.id, "a@x.com").await.unwrap();

        let err = store.remove_cart_item(item.id, "b@x.com").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(store.list_cart("a@x.com").await.unwrap().len(), 1);

        store.remove_cart_item(item.id, "a@x.com").await.unwrap();
        assert!(store.list_cart("a@x.com").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn checkout_records_payment_and_clears_cart() {
        let store = MemoryStore::new();
        let c1 = approved_class(&store, 12, 3).await;
        let c2 = approved_class(&store, 8, 3).await;
        let i1 = store.add_cart_item(c1.id, "a@x.com").await.unwrap();
        let i2 = store.add_cart_item(c2.id, "a@x.com").await.unwrap();

        let quote = store.quote_cart("a@x.com", &[i1.id, i2.id]).await.unwrap();
        assert_eq!(quote, Decimal::from(20));

        let receipt = store
            .checkout("a@x.com", &[i1.id, i2.id], "pi_1")
            .await
            .expect("checkout");
        assert_eq!(receipt.price, Decimal::from(20));
        assert_eq!(receipt.removed_cart_items, 2);

        let payments = store.list_payments("a@x.com").await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].price, Decimal::from(20));
        assert_eq!(payments[0].cart_ids, vec![i1.id, i2.id]);
        assert!(store.list_cart("a@x.com").await.unwrap().is_empty());

        let c1_after = store.find_class(c1.id).await.unwrap().unwrap();
        assert_eq!(c1_after.available_seats, 2);
        assert_eq!(c1_after.enrolled, 1);
        assert_eq!(store.enrolled_classes("a@x.com").await.unwrap().len(), 2);

        let err = store.checkout("a@x.com", &[i1.id], "pi_2").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(store.list_payments("a@x.com").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn checkout_with_foreign_item_changes_nothing() {
        let store = MemoryStore::new();
        let class = approved_class(&store, 10, 3).await;
        let mine = store.add_cart_item(class.id, "a@x.com").await.unwrap();
        let theirs = store.add_cart_item(class.id, "b@x.com").await.unwrap();

        let err = store
            .checkout("a@x.com", &[mine.id, theirs.id], "pi_1")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(store.list_cart("a@x.com").await.unwrap().len(), 1);
        assert_eq!(store.list_cart("b@x.com").await.unwrap().len(), 1);
        assert_eq!(store.admin_stats().await.unwrap().payments, 0);
    }

    #[tokio::test]
    async fn checkout_of_full_class_rolls_back() {
        let store = MemoryStore::new();
        let class = approved_class(&store, 10, 0).await;
        let item = store.add_cart_item(class.id, "a@x.com").await.unwrap();
        let err = store.checkout("a@x.com", &[item.id], "pi_1").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.list_cart("a@x.com").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_checkouts_on_same_item_commit_once() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let class = approved_class(&store, 10, 5).await;
        let item = store.add_cart_item(class.id, "a@x.com").await.unwrap();

        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.checkout("a@x.com", &[item.id], "pi_a").await })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { store.checkout("a@x.com", &[item.id], "pi_b").await })
        };
        let results = [a.await.unwrap(), b.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(StoreError::NotFound(_)))));
        assert_eq!(store.admin_stats().await.unwrap().payments, 1);
    }

    #[tokio::test]
    async fn stats_sum_revenue() {
        let store = MemoryStore::new();
        store.create_user(new_user("a@x.com")).await.unwrap();
        let empty = store.admin_stats().await.unwrap();
        assert_eq!(empty.revenue, Decimal::ZERO);

        let class = approved_class(&store, 15, 5).await;
        let item = store.add_cart_item(class.id, "a@x.com").await.unwrap();
        store.checkout("a@x.com", &[item.id], "pi_1").await.unwrap();

        let stats = store.admin_stats().await.unwrap();
        assert_eq!(
            stats,
            AdminStats {
                users: 1,
                classes: 1,
                payments: 1,
                revenue: Decimal::from(15),
            }
        );
    }
}
