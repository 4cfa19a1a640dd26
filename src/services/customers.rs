use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::{customer, order};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCustomerRequest {
    #[validate(length(min = 1, max = 200, message = "name must be between 1 and 200 characters"))]
    pub name: String,
    pub tax_id: Option<String>,
    #[validate(email(message = "invalid email"))]
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateCustomerRequest {
    #[validate(length(min = 1, max = 200, message = "name must be between 1 and 200 characters"))]
    pub name: Option<String>,
    pub tax_id: Option<String>,
    #[validate(email(message = "invalid email"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CustomerListParams {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    /// Substring match on name or tax id.
    pub search: Option<String>,
    pub active: Option<bool>,
}

/// Per-row outcome of a bulk insert. Rows fail independently.
#[derive(Debug, Serialize, ToSchema)]
pub struct BulkOutcome {
    pub created: usize,
    pub errors: Vec<String>,
}

pub struct CustomerService {
    db: Arc<DatabaseConnection>,
    events: EventSender,
}

impl CustomerService {
    pub fn new(db: Arc<DatabaseConnection>, events: EventSender) -> Self {
        Self { db, events }
    }

    #[instrument(skip(self, params))]
    pub async fn list(
        &self,
        params: CustomerListParams,
    ) -> Result<(Vec<customer::Model>, u64, u64), ServiceError> {
        let page = params.page.unwrap_or(1).max(1);
        let per_page = params.per_page.unwrap_or(20).clamp(1, 100);

        let mut query = customer::Entity::find().order_by_asc(customer::Column::Name);
        if let Some(search) = params.search.as_deref().filter(|s| !s.trim().is_empty()) {
            let term = search.trim();
            query = query.filter(
                Condition::any()
                    .add(customer::Column::Name.contains(term))
                    .add(customer::Column::TaxId.contains(term)),
            );
        }
        if let Some(active) = params.active {
            query = query.filter(customer::Column::Active.eq(active));
        }

        let paginator = query.paginate(self.db.as_ref(), per_page);
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page - 1).await?;
        Ok((rows, total, total.div_ceil(per_page)))
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<customer::Model, ServiceError> {
        customer::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("customer {id}")))
    }

    #[instrument(skip(self, req), fields(name = %req.name))]
    pub async fn create(&self, req: CreateCustomerRequest) -> Result<customer::Model, ServiceError> {
        req.validate()?;

        let model = customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(req.name.trim().to_string()),
            tax_id: Set(req.tax_id.map(|t| t.trim().to_string())),
            email: Set(req.email),
            phone: Set(req.phone),
            active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(self.db.as_ref())
        .await?;

        info!(customer_id = %model.id, "customer created");
        self.events.send(Event::CustomerCreated(model.id)).await;
        Ok(model)
    }

    /// Inserts rows independently; a bad row is reported, not fatal.
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    pub async fn bulk_create(
        &self,
        rows: Vec<CreateCustomerRequest>,
    ) -> Result<BulkOutcome, ServiceError> {
        let mut outcome = BulkOutcome {
            created: 0,
            errors: Vec::new(),
        };
        for (idx, row) in rows.into_iter().enumerate() {
            let name = row.name.clone();
            match self.create(row).await {
                Ok(_) => outcome.created += 1,
                Err(ServiceError::DatabaseError(e)) => return Err(ServiceError::DatabaseError(e)),
                Err(e) => outcome.errors.push(format!("row {idx} ({name}): {e}")),
            }
        }
        Ok(outcome)
    }

    #[instrument(skip(self, req))]
    pub async fn update(
        &self,
        id: Uuid,
        req: UpdateCustomerRequest,
    ) -> Result<customer::Model, ServiceError> {
        req.validate()?;
        let current = self.get(id).await?;

        let mut am: customer::ActiveModel = current.into();
        if let Some(name) = req.name {
            am.name = Set(name.trim().to_string());
        }
        if let Some(tax_id) = req.tax_id {
            am.tax_id = Set(Some(tax_id.trim().to_string()));
        }
        if let Some(email) = req.email {
            am.email = Set(Some(email));
        }
        if let Some(phone) = req.phone {
            am.phone = Set(Some(phone));
        }
        if let Some(active) = req.active {
            am.active = Set(active);
        }
        am.updated_at = Set(Some(Utc::now()));

        let model = am.update(self.db.as_ref()).await?;
        self.events.send(Event::CustomerUpdated(id)).await;
        Ok(model)
    }

    /// Customers with order history are deactivated instead of removed so the
    /// history keeps its foreign keys.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let current = self.get(id).await?;

        let has_orders = order::Entity::find()
            .filter(order::Column::CustomerId.eq(id))
            .count(self.db.as_ref())
            .await?
            > 0;

        if has_orders {
            let mut am: customer::ActiveModel = current.into();
            am.active = Set(false);
            am.updated_at = Set(Some(Utc::now()));
            am.update(self.db.as_ref()).await?;
            info!(customer_id = %id, "customer with order history deactivated");
        } else {
            customer::Entity::delete_by_id(id)
                .exec(self.db.as_ref())
                .await?;
            info!(customer_id = %id, "customer deleted");
        }

        self.events.send(Event::CustomerDeleted(id)).await;
        Ok(())
    }
}
