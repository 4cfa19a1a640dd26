//! Order notification configuration and dispatch.
//!
//! Delivery is behind [`NotificationDispatcher`] so the transport can be
//! swapped without touching the services that emit notifications. The bundled
//! implementation only logs. Dispatch is always fire-and-forget from the
//! caller's point of view: a failed notification never fails the request
//! that triggered it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::{notification_settings, user};
use crate::errors::ServiceError;

/// The configuration lives in a single row keyed by the nil UUID.
const SETTINGS_ROW: Uuid = Uuid::nil();

#[derive(Debug, Clone)]
pub struct NotificationMessage {
    pub subject: String,
    pub body: String,
    pub recipients: Vec<String>,
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, message: NotificationMessage) -> Result<(), ServiceError>;
}

/// Logs the message instead of sending it.
#[derive(Debug, Default)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn dispatch(&self, message: NotificationMessage) -> Result<(), ServiceError> {
        info!(
            subject = %message.subject,
            recipients = message.recipients.len(),
            "notification dispatched (log transport)"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExtraRecipient {
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub notify_on_create: bool,
    pub extra_recipients: Vec<ExtraRecipient>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            notify_on_create: true,
            extra_recipients: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateConfigRequest {
    pub enabled: Option<bool>,
    pub notify_on_create: Option<bool>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddRecipientRequest {
    #[validate(email(message = "invalid email"))]
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TestSendRequest {
    #[validate(email(message = "invalid email"))]
    pub email: String,
}

pub struct NotificationService {
    db: Arc<DatabaseConnection>,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl NotificationService {
    pub fn new(db: Arc<DatabaseConnection>, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self { db, dispatcher }
    }

    fn parse_recipients(raw: &serde_json::Value) -> Vec<ExtraRecipient> {
        serde_json::from_value(raw.clone()).unwrap_or_default()
    }

    async fn load_row(&self) -> Result<Option<notification_settings::Model>, ServiceError> {
        Ok(notification_settings::Entity::find_by_id(SETTINGS_ROW)
            .one(self.db.as_ref())
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn get_config(&self) -> Result<NotificationConfig, ServiceError> {
        Ok(match self.load_row().await? {
            Some(row) => NotificationConfig {
                enabled: row.enabled,
                notify_on_create: row.notify_on_create,
                extra_recipients: Self::parse_recipients(&row.extra_recipients),
            },
            None => NotificationConfig::default(),
        })
    }

    async fn save_config(&self, config: &NotificationConfig) -> Result<(), ServiceError> {
        let recipients = serde_json::to_value(&config.extra_recipients)
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        let exists = self.load_row().await?.is_some();

        let model = notification_settings::ActiveModel {
            id: Set(SETTINGS_ROW),
            enabled: Set(config.enabled),
            notify_on_create: Set(config.notify_on_create),
            extra_recipients: Set(recipients),
            updated_at: Set(Utc::now()),
        };
        if exists {
            model.update(self.db.as_ref()).await?;
        } else {
            model.insert(self.db.as_ref()).await?;
        }
        Ok(())
    }

    #[instrument(skip(self, req))]
    pub async fn update_config(
        &self,
        req: UpdateConfigRequest,
    ) -> Result<NotificationConfig, ServiceError> {
        let mut config = self.get_config().await?;
        if let Some(enabled) = req.enabled {
            config.enabled = enabled;
        }
        if let Some(notify) = req.notify_on_create {
            config.notify_on_create = notify;
        }
        self.save_config(&config).await?;
        Ok(config)
    }

    #[instrument(skip(self, req))]
    pub async fn add_extra_email(
        &self,
        req: AddRecipientRequest,
    ) -> Result<NotificationConfig, ServiceError> {
        req.validate()?;
        let mut config = self.get_config().await?;
        let email = req.email.trim().to_lowercase();
        if config
            .extra_recipients
            .iter()
            .any(|r| r.email.eq_ignore_ascii_case(&email))
        {
            return Err(ServiceError::ValidationError(format!(
                "{email} is already a recipient"
            )));
        }
        config.extra_recipients.push(ExtraRecipient {
            email,
            name: req.name,
        });
        self.save_config(&config).await?;
        Ok(config)
    }

    #[instrument(skip(self))]
    pub async fn remove_extra_email(&self, email: &str) -> Result<NotificationConfig, ServiceError> {
        let mut config = self.get_config().await?;
        let before = config.extra_recipients.len();
        config
            .extra_recipients
            .retain(|r| !r.email.eq_ignore_ascii_case(email));
        if config.extra_recipients.len() == before {
            return Err(ServiceError::NotFound(format!(
                "recipient {email} not configured"
            )));
        }
        self.save_config(&config).await?;
        Ok(config)
    }

    /// Folds every active user's email into the recipient set. Idempotent:
    /// emails already configured are left alone, deactivated users are
    /// skipped but not removed.
    #[instrument(skip(self))]
    pub async fn sync_users(&self) -> Result<NotificationConfig, ServiceError> {
        let accounts = user::Entity::find()
            .filter(user::Column::Active.eq(true))
            .all(self.db.as_ref())
            .await?;

        let mut config = self.get_config().await?;
        let mut added = 0usize;
        for account in accounts {
            let email = account.email.trim().to_lowercase();
            if config
                .extra_recipients
                .iter()
                .any(|r| r.email.eq_ignore_ascii_case(&email))
            {
                continue;
            }
            config.extra_recipients.push(ExtraRecipient {
                email,
                name: Some(account.name),
            });
            added += 1;
        }
        if added > 0 {
            self.save_config(&config).await?;
        }
        info!(added, "synced user emails into notification recipients");
        Ok(config)
    }

    #[instrument(skip(self, req))]
    pub async fn send_test(&self, req: TestSendRequest) -> Result<(), ServiceError> {
        req.validate()?;
        self.dispatcher
            .dispatch(NotificationMessage {
                subject: "Prueba de notificaciones".into(),
                body: "Mensaje de prueba del sistema de pedidos.".into(),
                recipients: vec![req.email],
            })
            .await
    }

    /// Post-commit hook for order creation. Swallows every failure: by the
    /// time this runs the order is already committed.
    pub async fn notify_order_created(&self, order_number: String, customer_name: String) {
        let config = match self.get_config().await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "could not load notification config");
                return;
            }
        };
        if !config.enabled || !config.notify_on_create {
            return;
        }
        let recipients: Vec<String> = config
            .extra_recipients
            .into_iter()
            .map(|r| r.email)
            .collect();
        if recipients.is_empty() {
            return;
        }
        let message = NotificationMessage {
            subject: format!("Nuevo pedido {order_number}"),
            body: format!("Se registró el pedido {order_number} para {customer_name}."),
            recipients,
        };
        if let Err(e) = self.dispatcher.dispatch(message).await {
            warn!(order_number, error = %e, "order notification failed");
        }
    }
}
