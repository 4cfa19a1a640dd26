//! User administration and self-service profile operations.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::permissions::Role;
use crate::auth::{hash_password, verify_password};
use crate::entities::user;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

const GENERATED_PASSWORD_LEN: usize = 12;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 200, message = "name must be between 1 and 200 characters"))]
    pub name: String,
    #[validate(email(message = "invalid email"))]
    pub email: String,
    /// Generated when omitted; the plaintext is returned exactly once.
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: Option<String>,
    pub role: Role,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 200, message = "name must be between 1 and 200 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "invalid email"))]
    pub email: Option<String>,
    pub role: Option<Role>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResetPasswordRequest {
    /// Generated when omitted.
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 200, message = "name must be between 1 and 200 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "invalid email"))]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub new_password: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UserListParams {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub search: Option<String>,
    pub role: Option<Role>,
    pub active: Option<bool>,
}

/// Create and reset hand the plaintext back exactly once when the password
/// was generated server-side.
#[derive(Debug, Serialize)]
pub struct UserWithPassword {
    #[serde(flatten)]
    pub user: user::Model,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_password: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserStats {
    pub total: u64,
    pub active: u64,
    pub by_role: HashMap<String, u64>,
}

pub fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

pub struct UserService {
    db: Arc<DatabaseConnection>,
    events: EventSender,
}

impl UserService {
    pub fn new(db: Arc<DatabaseConnection>, events: EventSender) -> Self {
        Self { db, events }
    }

    #[instrument(skip(self, params))]
    pub async fn list(
        &self,
        params: UserListParams,
    ) -> Result<(Vec<user::Model>, u64, u64), ServiceError> {
        let page = params.page.unwrap_or(1).max(1);
        let per_page = params.per_page.unwrap_or(20).clamp(1, 100);

        let mut query = user::Entity::find().order_by_asc(user::Column::Name);
        if let Some(search) = params.search.as_deref().filter(|s| !s.trim().is_empty()) {
            let term = search.trim();
            query = query.filter(
                Condition::any()
                    .add(user::Column::Name.contains(term))
                    .add(user::Column::Email.contains(term)),
            );
        }
        if let Some(role) = params.role {
            query = query.filter(user::Column::Role.eq(role.to_string()));
        }
        if let Some(active) = params.active {
            query = query.filter(user::Column::Active.eq(active));
        }

        let paginator = query.paginate(self.db.as_ref(), per_page);
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page - 1).await?;
        Ok((rows, total, total.div_ceil(per_page)))
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("user {id}")))
    }

    async fn email_taken(&self, email: &str, exclude: Option<Uuid>) -> Result<bool, ServiceError> {
        let mut query = user::Entity::find().filter(user::Column::Email.eq(email));
        if let Some(id) = exclude {
            query = query.filter(user::Column::Id.ne(id));
        }
        Ok(query.count(self.db.as_ref()).await? > 0)
    }

    #[instrument(skip(self, req), fields(email = %req.email))]
    pub async fn create(&self, req: CreateUserRequest) -> Result<UserWithPassword, ServiceError> {
        req.validate()?;
        let email = req.email.trim().to_lowercase();
        if self.email_taken(&email, None).await? {
            return Err(ServiceError::ValidationError(format!(
                "{email} is already registered"
            )));
        }

        let (password, generated) = match req.password {
            Some(p) => (p, None),
            None => {
                let p = generate_password();
                (p.clone(), Some(p))
            }
        };
        let password_hash =
            hash_password(&password).map_err(|e| ServiceError::InternalError(e.to_string()))?;

        let model = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(req.name.trim().to_string()),
            email: Set(email),
            password_hash: Set(password_hash),
            role: Set(req.role.to_string()),
            active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(self.db.as_ref())
        .await?;

        info!(user_id = %model.id, role = %model.role, "user created");
        self.events.send(Event::UserCreated(model.id)).await;
        Ok(UserWithPassword {
            user: model,
            generated_password: generated,
        })
    }

    #[instrument(skip(self, req))]
    pub async fn update(
        &self,
        id: Uuid,
        req: UpdateUserRequest,
    ) -> Result<user::Model, ServiceError> {
        req.validate()?;
        let current = self.get(id).await?;

        if let Some(ref email) = req.email {
            let email = email.trim().to_lowercase();
            if self.email_taken(&email, Some(id)).await? {
                return Err(ServiceError::ValidationError(format!(
                    "{email} is already registered"
                )));
            }
        }

        let mut am: user::ActiveModel = current.into();
        if let Some(name) = req.name {
            am.name = Set(name.trim().to_string());
        }
        if let Some(email) = req.email {
            am.email = Set(email.trim().to_lowercase());
        }
        if let Some(role) = req.role {
            am.role = Set(role.to_string());
        }
        if let Some(active) = req.active {
            am.active = Set(active);
        }
        am.updated_at = Set(Some(Utc::now()));

        let model = am.update(self.db.as_ref()).await?;
        self.events.send(Event::UserUpdated(id)).await;
        Ok(model)
    }

    /// Admin-side password reset. Self-service goes through
    /// [`UserService::change_password`].
    #[instrument(skip(self, req))]
    pub async fn reset_password(
        &self,
        id: Uuid,
        req: ResetPasswordRequest,
    ) -> Result<UserWithPassword, ServiceError> {
        req.validate()?;
        let current = self.get(id).await?;

        let (password, generated) = match req.password {
            Some(p) => (p, None),
            None => {
                let p = generate_password();
                (p.clone(), Some(p))
            }
        };
        let password_hash =
            hash_password(&password).map_err(|e| ServiceError::InternalError(e.to_string()))?;

        let mut am: user::ActiveModel = current.into();
        am.password_hash = Set(password_hash);
        am.updated_at = Set(Some(Utc::now()));
        let model = am.update(self.db.as_ref()).await?;

        info!(user_id = %id, "password reset");
        Ok(UserWithPassword {
            user: model,
            generated_password: generated,
        })
    }

    #[instrument(skip(self, req))]
    pub async fn update_profile(
        &self,
        id: Uuid,
        req: UpdateProfileRequest,
    ) -> Result<user::Model, ServiceError> {
        self.update(
            id,
            UpdateUserRequest {
                name: req.name,
                email: req.email,
                role: None,
                active: None,
            },
        )
        .await
    }

    #[instrument(skip(self, req))]
    pub async fn change_password(
        &self,
        id: Uuid,
        req: ChangePasswordRequest,
    ) -> Result<(), ServiceError> {
        req.validate()?;
        let current = self.get(id).await?;
        if !verify_password(&req.current_password, &current.password_hash) {
            return Err(ServiceError::Unauthorized(
                "current password is incorrect".into(),
            ));
        }

        let password_hash = hash_password(&req.new_password)
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        let mut am: user::ActiveModel = current.into();
        am.password_hash = Set(password_hash);
        am.updated_at = Set(Some(Utc::now()));
        am.update(self.db.as_ref()).await?;

        info!(user_id = %id, "password changed");
        Ok(())
    }

    /// Deactivates instead of deleting; logins check the active flag.
    /// Admins cannot remove themselves.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid, actor_id: Uuid) -> Result<(), ServiceError> {
        if id == actor_id {
            return Err(ServiceError::ValidationError(
                "you cannot delete your own account".into(),
            ));
        }
        let current = self.get(id).await?;

        let mut am: user::ActiveModel = current.into();
        am.active = Set(false);
        am.updated_at = Set(Some(Utc::now()));
        am.update(self.db.as_ref()).await?;

        info!(user_id = %id, "user deactivated");
        self.events.send(Event::UserDeleted(id)).await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<UserStats, ServiceError> {
        let rows = user::Entity::find().all(self.db.as_ref()).await?;
        let total = rows.len() as u64;
        let active = rows.iter().filter(|u| u.active).count() as u64;
        let mut by_role: HashMap<String, u64> = HashMap::new();
        for row in rows {
            *by_role.entry(row.role).or_insert(0) += 1;
        }
        Ok(UserStats {
            total,
            active,
            by_role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_passwords_are_long_enough_and_distinct() {
        let a = generate_password();
        let b = generate_password();
        assert_eq!(a.len(), GENERATED_PASSWORD_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
