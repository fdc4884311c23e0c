//! Shared helpers for the HTTP tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderValue};
use axum_test::{TestRequest, TestServer};
use rust_decimal::Decimal;
use summercamp::{
    app::build_app,
    auth::jwt::JwtKeys,
    classes::repo_types::{ClassOffering, ClassStatus, NewClass},
    config::AppConfig,
    notify::{Email, MailError, Mailer},
    payments::gateway::{GatewayError, PaymentGateway, PaymentIntent},
    state::AppState,
    store::{ClassRepo, MemoryStore, UserRepo},
    users::repo_types::{NewUser, Role},
};

/// Gateway that hands out predictable client secrets and remembers amounts.
#[derive(Default, Clone)]
pub struct FakeGateway {
    pub amounts: Arc<Mutex<Vec<Decimal>>>,
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_intent(&self, amount: Decimal) -> Result<PaymentIntent, GatewayError> {
        let mut amounts = self.amounts.lock().unwrap();
        amounts.push(amount);
        Ok(PaymentIntent {
            id: format!("pi_{}", amounts.len()),
            client_secret: format!("pi_{}_secret", amounts.len()),
        })
    }
}

/// Mailer that captures outgoing messages.
#[derive(Default, Clone)]
pub struct RecordingMailer {
    pub sent: Arc<Mutex<Vec<Email>>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

impl RecordingMailer {
    /// Waits for the detached send task to deliver.
    pub async fn wait_for(&self, count: usize) -> Vec<Email> {
        for _ in 0..100 {
            {
                let sent = self.sent.lock().unwrap();
                if sent.len() >= count {
                    return sent.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.sent.lock().unwrap().clone()
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub store: Arc<MemoryStore>,
    pub gateway: FakeGateway,
    pub mailer: RecordingMailer,
    pub keys: JwtKeys,
}

pub fn create_test_app() -> TestApp {
    let config = Arc::new(AppConfig::for_tests());
    let store = Arc::new(MemoryStore::new());
    let gateway = FakeGateway::default();
    let mailer = RecordingMailer::default();
    let keys = JwtKeys::from_config(&config.jwt);

    let state = AppState::from_parts(
        store.clone(),
        config,
        Arc::new(gateway.clone()),
        Arc::new(mailer.clone()),
    );
    let server = TestServer::new(build_app(state)).expect("Failed to create test server");

    TestApp {
        server,
        store,
        gateway,
        mailer,
        keys,
    }
}

/// Server over a fresh memory store with the given config and gateway.
pub fn create_server_with(
    config: AppConfig,
    gateway: Arc<dyn PaymentGateway>,
) -> (TestServer, Arc<MemoryStore>, JwtKeys) {
    let config = Arc::new(config);
    let store = Arc::new(MemoryStore::new());
    let keys = JwtKeys::from_config(&config.jwt);
    let state = AppState::from_parts(
        store.clone(),
        config,
        gateway,
        Arc::new(RecordingMailer::default()),
    );
    let server = TestServer::new(build_app(state)).expect("Failed to create test server");
    (server, store, keys)
}

impl TestApp {
    pub fn token(&self, email: &str) -> String {
        self.keys.sign(email).expect("sign token")
    }

    /// Creates a user directly in the store with the given role.
    pub async fn user_with_role(&self, email: &str, role: Role) -> String {
        let user = self
            .store
            .create_user(NewUser {
                email: email.into(),
                name: Some(email.split('@').next().unwrap_or_default().into()),
                photo_url: None,
            })
            .await
            .expect("create user");
        if role != Role::None {
            self.store
                .set_user_role(user.id, role)
                .await
                .expect("set role");
        }
        self.token(email)
    }

    pub async fn approved_class(&self, name: &str, price: i64) -> ClassOffering {
        let class = self
            .store
            .create_class(NewClass {
                name: name.into(),
                image_url: None,
                instructor_name: Some("Ina".into()),
                instructor_email: "ina@x.com".into(),
                available_seats: 10,
                price: Decimal::from(price),
            })
            .await
            .expect("create class");
        self.store
            .set_class_status(class.id, ClassStatus::Approved)
            .await
            .expect("approve class")
    }
}

pub fn bearer(req: TestRequest, token: &str) -> TestRequest {
    let value = HeaderValue::from_str(&format!("Bearer {token}")).expect("header value");
    req.add_header(AUTHORIZATION, value)
}
