//! Shared harness for integration tests.
//!
//! Every test spawns the full router on its own port against the test
//! database. The schema is synchronized on spawn and all tables are emptied,
//! so tests must run serially.

#![allow(dead_code)]

use once_cell::sync::Lazy;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU16, Ordering};
use tokio::net::TcpListener;
use uuid::Uuid;

use approvals::{
    create_router,
    registry::{catalog, SyncOptions},
    store::{Store, StoreError},
    AppState, Config,
};
use diesel::RunQueryDsl;

static PORT_COUNTER: AtomicU16 = AtomicU16::new(9400);

/// Set TEST_DATABASE_URL to point the suite at another database.
pub static TEST_DATABASE_URL: Lazy<String> = Lazy::new(|| {
    std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| Config::default_for_testing().database.url)
});

pub struct TestApp {
    pub client: Client,
    pub base_url: String,
    pub store: Store,
}

pub fn test_config() -> Config {
    let mut config = Config::default_for_testing();
    config.database.url = TEST_DATABASE_URL.clone();
    config
}

pub fn test_store() -> Store {
    let registry = catalog::build().expect("schema declaration is valid");
    Store::connect(&test_config().database, registry).expect("Failed to create test pool")
}

/// Synchronizes the schema and empties every table.
pub async fn reset_database(store: &Store) {
    store
        .run("test.reset", |store| {
            store.synchronize(SyncOptions::default())?;
            store.with_conn(|conn| {
                diesel::sql_query(
                    "TRUNCATE accounts, refresh_tokens, departments, employees, \
                     requests, request_items, workflows CASCADE",
                )
                .execute(conn)?;
                Ok::<_, StoreError>(())
            })
        })
        .await
        .expect("Failed to reset test database");
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(test_config()).await
    }

    pub async fn spawn_with(config: Config) -> Self {
        let store = test_store();
        reset_database(&store).await;
        Self::spawn_with_store(config, store).await
    }

    /// Serves `store` as is, without synchronizing or emptying it.
    pub async fn spawn_with_store(config: Config, store: Store) -> Self {
        let state = AppState::new(store.clone(), &config);
        let app = create_router(state, &config);

        let port = PORT_COUNTER.fetch_add(1, Ordering::SeqCst);
        let listener = TcpListener::bind(format!("127.0.0.1:{}", port))
            .await
            .expect("Failed to bind test server");
        let actual_port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
            )
            .await
            .unwrap();
        });

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        Self {
            client: Client::new(),
            base_url: format!("http://127.0.0.1:{}", actual_port),
            store,
        }
    }

    pub fn unique_email() -> String {
        format!("test_{}@example.com", Uuid::new_v4())
    }

    pub fn unique_code() -> String {
        format!("EMP-{}", &Uuid::new_v4().simple().to_string()[..8])
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("Failed to send GET request")
    }

    pub async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await
            .expect("Failed to send POST request")
    }

    pub async fn put(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .put(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await
            .expect("Failed to send PUT request")
    }

    pub async fn delete(&self, path: &str) -> reqwest::Response {
        self.client
            .delete(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("Failed to send DELETE request")
    }

    /// GET that must succeed; returns the JSON body.
    pub async fn get_json(&self, path: &str) -> Value {
        let response = self.get(path).await;
        assert!(
            response.status().is_success(),
            "GET {} returned {}",
            path,
            response.status()
        );
        response.json().await.expect("Failed to parse response")
    }

    pub async fn create_account(&self) -> Value {
        let response = self
            .post(
                "/accounts",
                json!({
                    "email": Self::unique_email(),
                    "password": "password123",
                    "first_name": "Test",
                    "last_name": "User"
                }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201, "account creation failed");
        response.json().await.expect("Failed to parse account")
    }

    pub async fn create_department(&self, name: &str) -> Value {
        let response = self.post("/departments", json!({ "name": name })).await;
        assert_eq!(response.status().as_u16(), 201, "department creation failed");
        response.json().await.expect("Failed to parse department")
    }

    pub async fn create_employee(&self, account_id: &str, department_id: Option<&str>) -> Value {
        let response = self
            .post(
                "/employees",
                json!({
                    "employee_code": Self::unique_code(),
                    "account_id": account_id,
                    "department_id": department_id,
                    "position": "Engineer"
                }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201, "employee creation failed");
        response.json().await.expect("Failed to parse employee")
    }

    /// Creates an account and an employee bound to it.
    pub async fn create_staff(&self, department_id: Option<&str>) -> (Value, Value) {
        let account = self.create_account().await;
        let employee = self
            .create_employee(account["id"].as_str().unwrap(), department_id)
            .await;
        (account, employee)
    }

    pub async fn create_request(
        &self,
        employee_id: &str,
        approver_id: Option<&str>,
        items: &[(&str, i32)],
    ) -> Value {
        let items: Vec<Value> = items
            .iter()
            .map(|(name, quantity)| json!({ "name": name, "quantity": quantity }))
            .collect();
        let response = self
            .post(
                "/requests",
                json!({
                    "employee_id": employee_id,
                    "approver_id": approver_id,
                    "request_type": "Equipment",
                    "items": items
                }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201, "request creation failed");
        response.json().await.expect("Failed to parse request")
    }
}

pub fn id_of(value: &Value) -> String {
    value["id"].as_str().expect("id").to_string()
}

#[macro_export]
macro_rules! assert_status {
    ($response:expr, $expected:expr) => {
        assert_eq!(
            $response.status().as_u16(),
            $expected,
            "Expected status {}, got {}",
            $expected,
            $response.status()
        );
    };
}
