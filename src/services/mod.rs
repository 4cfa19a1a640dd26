pub mod customers;
pub mod dashboard;
pub mod duplicates;
pub mod lifecycle;
pub mod notifications;
pub mod orders;
pub mod products;
pub mod users;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::services::notifications::{LogDispatcher, NotificationDispatcher};

/// Everything the handlers need, constructed once at startup.
pub struct AppServices {
    pub orders: Arc<orders::OrderService>,
    pub customers: Arc<customers::CustomerService>,
    pub products: Arc<products::ProductService>,
    pub users: Arc<users::UserService>,
    pub dashboard: Arc<dashboard::DashboardService>,
    pub notifications: Arc<notifications::NotificationService>,
}

impl AppServices {
    pub fn new(db: Arc<DatabaseConnection>, events: EventSender, config: &AppConfig) -> Self {
        Self::with_dispatcher(db, events, config, Arc::new(LogDispatcher))
    }

    pub fn with_dispatcher(
        db: Arc<DatabaseConnection>,
        events: EventSender,
        config: &AppConfig,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        let notifications = Arc::new(notifications::NotificationService::new(
            db.clone(),
            dispatcher,
        ));
        let orders = Arc::new(orders::OrderService::new(
            db.clone(),
            events.clone(),
            notifications.clone(),
            config.business_offset(),
            config.nullification_cooldown_days,
        ));
        Self {
            orders,
            customers: Arc::new(customers::CustomerService::new(db.clone(), events.clone())),
            products: Arc::new(products::ProductService::new(db.clone(), events.clone())),
            users: Arc::new(users::UserService::new(db.clone(), events.clone())),
            dashboard: Arc::new(dashboard::DashboardService::new(
                db,
                config.business_offset(),
            )),
            notifications,
        }
    }
}
