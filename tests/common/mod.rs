//! SQLite-backed test harness.
//!
//! Each test gets its own temp-file database with the real migrations
//! applied, plus fully wired services. The business offset is UTC so test
//! assertions about "today" are easy to reason about.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait, Set};
use tempfile::NamedTempFile;
use tokio::sync::mpsc;
use uuid::Uuid;

use pedidos_api::auth::{AuthConfig, AuthService};
use pedidos_api::config::AppConfig;
use pedidos_api::entities::{customer, order, product, user};
use pedidos_api::events::EventSender;
use pedidos_api::migrator::Migrator;
use pedidos_api::services::AppServices;
use pedidos_api::{app_router, AppState};
use sea_orm_migration::MigratorTrait;

pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub services: Arc<AppServices>,
    pub auth: Arc<AuthService>,
    pub config: AppConfig,
    // Holds the sqlite file until the test ends.
    _db_file: NamedTempFile,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let db_file = NamedTempFile::new().expect("temp db file");
        let url = format!("sqlite://{}?mode=rwc", db_file.path().display());

        let mut options = ConnectOptions::new(url);
        options.max_connections(5).sqlx_logging(false);
        let db = Arc::new(Database::connect(options).await.expect("connect sqlite"));
        Migrator::up(db.as_ref(), None).await.expect("migrations");

        let config = AppConfig::new(
            "unused".into(),
            "x".repeat(64),
            3600,
            "127.0.0.1".into(),
            0,
            "test".into(),
        );

        let (tx, mut rx) = mpsc::channel(64);
        // Drain events so senders never block.
        tokio::spawn(async move { while rx.recv().await.is_some() {} });
        let services = Arc::new(AppServices::new(db.clone(), EventSender::new(tx), &config));

        let auth = Arc::new(AuthService::new(
            AuthConfig {
                jwt_secret: config.jwt_secret.clone(),
                jwt_issuer: config.auth_issuer.clone(),
                jwt_audience: config.auth_audience.clone(),
                access_token_expiration_secs: config.jwt_expiration as i64,
            },
            db.clone(),
        ));

        Self {
            db,
            services,
            auth,
            config,
            _db_file: db_file,
        }
    }

    /// Full application router, as `main` would assemble it.
    pub fn router(&self) -> axum::Router {
        app_router(AppState {
            db: self.db.clone(),
            services: self.services.clone(),
            auth: self.auth.clone(),
            config: Arc::new(self.config.clone()),
        })
    }

    /// Bearer token for a seeded user.
    pub fn token_for(&self, account: &user::Model) -> String {
        self.auth
            .generate_token(account)
            .expect("generate token")
            .access_token
    }

    pub async fn seed_customer(&self, name: &str) -> customer::Model {
        customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            tax_id: Set(None),
            email: Set(None),
            phone: Set(None),
            active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(self.db.as_ref())
        .await
        .expect("seed customer")
    }

    pub async fn seed_product(&self, name: &str, sku: &str) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            sku: Set(sku.to_string()),
            brand: Set(None),
            format: Set(None),
            category: Set(Some("general".into())),
            unit_of_measure: Set("caja".into()),
            unit_price: Set("1500".parse().expect("decimal")),
            stock: Set(100),
            min_stock: Set(5),
            active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(self.db.as_ref())
        .await
        .expect("seed product")
    }

    pub async fn seed_user(&self, role: &str) -> user::Model {
        let id = Uuid::new_v4();
        user::ActiveModel {
            id: Set(id),
            name: Set("Operador".into()),
            email: Set(format!("{id}@example.com")),
            password_hash: Set("unused".into()),
            role: Set(role.to_string()),
            active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(self.db.as_ref())
        .await
        .expect("seed user")
    }

    /// Rewrites an order's creation timestamp, for aging-dependent rules.
    pub async fn backdate_order(&self, order_id: Uuid, days: i64) {
        let current = order::Entity::find_by_id(order_id)
            .one(self.db.as_ref())
            .await
            .expect("query order")
            .expect("order exists");
        let mut am: order::ActiveModel = current.into();
        am.created_at = Set(Utc::now() - Duration::days(days));
        am.update(self.db.as_ref()).await.expect("backdate order");
    }

    pub async fn order_count(&self) -> u64 {
        use sea_orm::PaginatorTrait;
        order::Entity::find()
            .count(self.db.as_ref())
            .await
            .expect("count orders")
    }
}
