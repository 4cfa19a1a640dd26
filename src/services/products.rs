use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Deserialize;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::{order_item, product};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::customers::BulkOutcome;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200, message = "name must be between 1 and 200 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 64, message = "SKU must be between 1 and 64 characters"))]
    pub sku: String,
    pub brand: Option<String>,
    pub format: Option<String>,
    pub category: Option<String>,
    pub unit_of_measure: String,
    pub unit_price: Decimal,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub min_stock: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 200, message = "name must be between 1 and 200 characters"))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 64, message = "SKU must be between 1 and 64 characters"))]
    pub sku: Option<String>,
    pub brand: Option<String>,
    pub format: Option<String>,
    pub category: Option<String>,
    pub unit_of_measure: Option<String>,
    pub unit_price: Option<Decimal>,
    pub min_stock: Option<i32>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStockRequest {
    /// Absolute stock level after the adjustment.
    pub stock: i32,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ProductListParams {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    /// Substring match on name or SKU.
    pub search: Option<String>,
    pub category: Option<String>,
    pub active: Option<bool>,
    /// Only products at or below their minimum stock.
    pub low_stock: Option<bool>,
}

pub struct ProductService {
    db: Arc<DatabaseConnection>,
    events: EventSender,
}

impl ProductService {
    pub fn new(db: Arc<DatabaseConnection>, events: EventSender) -> Self {
        Self { db, events }
    }

    #[instrument(skip(self, params))]
    pub async fn list(
        &self,
        params: ProductListParams,
    ) -> Result<(Vec<product::Model>, u64, u64), ServiceError> {
        let page = params.page.unwrap_or(1).max(1);
        let per_page = params.per_page.unwrap_or(20).clamp(1, 100);

        let mut query = product::Entity::find().order_by_asc(product::Column::Name);
        if let Some(search) = params.search.as_deref().filter(|s| !s.trim().is_empty()) {
            let term = search.trim();
            query = query.filter(
                Condition::any()
                    .add(product::Column::Name.contains(term))
                    .add(product::Column::Sku.contains(term)),
            );
        }
        if let Some(category) = params.category.as_deref().filter(|c| !c.is_empty()) {
            query = query.filter(product::Column::Category.eq(category));
        }
        if let Some(active) = params.active {
            query = query.filter(product::Column::Active.eq(active));
        }
        if params.low_stock.unwrap_or(false) {
            query = query
                .filter(sea_orm::sea_query::Expr::col(product::Column::Stock).lte(
                    sea_orm::sea_query::Expr::col(product::Column::MinStock),
                ));
        }

        let paginator = query.paginate(self.db.as_ref(), per_page);
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page - 1).await?;
        Ok((rows, total, total.div_ceil(per_page)))
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("product {id}")))
    }

    async fn sku_taken(&self, sku: &str, exclude: Option<Uuid>) -> Result<bool, ServiceError> {
        let mut query = product::Entity::find().filter(product::Column::Sku.eq(sku));
        if let Some(id) = exclude {
            query = query.filter(product::Column::Id.ne(id));
        }
        Ok(query.count(self.db.as_ref()).await? > 0)
    }

    #[instrument(skip(self, req), fields(sku = %req.sku))]
    pub async fn create(&self, req: CreateProductRequest) -> Result<product::Model, ServiceError> {
        req.validate()?;
        if req.unit_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "unit price cannot be negative".into(),
            ));
        }
        if req.stock < 0 || req.min_stock < 0 {
            return Err(ServiceError::ValidationError(
                "stock levels cannot be negative".into(),
            ));
        }
        let sku = req.sku.trim().to_uppercase();
        if self.sku_taken(&sku, None).await? {
            return Err(ServiceError::ValidationError(format!(
                "SKU {sku} is already in use"
            )));
        }

        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(req.name.trim().to_string()),
            sku: Set(sku),
            brand: Set(req.brand),
            format: Set(req.format),
            category: Set(req.category),
            unit_of_measure: Set(req.unit_of_measure),
            unit_price: Set(req.unit_price),
            stock: Set(req.stock),
            min_stock: Set(req.min_stock),
            active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(self.db.as_ref())
        .await?;

        info!(product_id = %model.id, sku = %model.sku, "product created");
        self.events.send(Event::ProductCreated(model.id)).await;
        Ok(model)
    }

    /// Inserts rows independently; a bad row is reported, not fatal.
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    pub async fn bulk_create(
        &self,
        rows: Vec<CreateProductRequest>,
    ) -> Result<BulkOutcome, ServiceError> {
        let mut outcome = BulkOutcome {
            created: 0,
            errors: Vec::new(),
        };
        for (idx, row) in rows.into_iter().enumerate() {
            let sku = row.sku.clone();
            match self.create(row).await {
                Ok(_) => outcome.created += 1,
                Err(ServiceError::DatabaseError(e)) => return Err(ServiceError::DatabaseError(e)),
                Err(e) => outcome.errors.push(format!("row {idx} ({sku}): {e}")),
            }
        }
        Ok(outcome)
    }

    #[instrument(skip(self, req))]
    pub async fn update(
        &self,
        id: Uuid,
        req: UpdateProductRequest,
    ) -> Result<product::Model, ServiceError> {
        req.validate()?;
        let current = self.get(id).await?;

        if let Some(ref sku) = req.sku {
            let sku = sku.trim().to_uppercase();
            if self.sku_taken(&sku, Some(id)).await? {
                return Err(ServiceError::ValidationError(format!(
                    "SKU {sku} is already in use"
                )));
            }
        }
        if let Some(price) = req.unit_price {
            if price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "unit price cannot be negative".into(),
                ));
            }
        }

        let mut am: product::ActiveModel = current.into();
        if let Some(name) = req.name {
            am.name = Set(name.trim().to_string());
        }
        if let Some(sku) = req.sku {
            am.sku = Set(sku.trim().to_uppercase());
        }
        if let Some(brand) = req.brand {
            am.brand = Set(Some(brand));
        }
        if let Some(format) = req.format {
            am.format = Set(Some(format));
        }
        if let Some(category) = req.category {
            am.category = Set(Some(category));
        }
        if let Some(unit) = req.unit_of_measure {
            am.unit_of_measure = Set(unit);
        }
        if let Some(price) = req.unit_price {
            am.unit_price = Set(price);
        }
        if let Some(min_stock) = req.min_stock {
            if min_stock < 0 {
                return Err(ServiceError::ValidationError(
                    "stock levels cannot be negative".into(),
                ));
            }
            am.min_stock = Set(min_stock);
        }
        if let Some(active) = req.active {
            am.active = Set(active);
        }
        am.updated_at = Set(Some(Utc::now()));

        let model = am.update(self.db.as_ref()).await?;
        self.events.send(Event::ProductUpdated(id)).await;
        Ok(model)
    }

    #[instrument(skip(self))]
    pub async fn update_stock(
        &self,
        id: Uuid,
        req: UpdateStockRequest,
    ) -> Result<product::Model, ServiceError> {
        if req.stock < 0 {
            return Err(ServiceError::ValidationError(
                "stock cannot be negative".into(),
            ));
        }
        let current = self.get(id).await?;
        let old_stock = current.stock;

        let mut am: product::ActiveModel = current.into();
        am.stock = Set(req.stock);
        am.updated_at = Set(Some(Utc::now()));
        let model = am.update(self.db.as_ref()).await?;

        self.events
            .send(Event::ProductStockChanged {
                product_id: id,
                old_stock,
                new_stock: req.stock,
            })
            .await;
        Ok(model)
    }

    /// Distinct non-empty categories, for the catalog filter dropdown.
    #[instrument(skip(self))]
    pub async fn categories(&self) -> Result<Vec<String>, ServiceError> {
        let rows: Vec<Option<String>> = product::Entity::find()
            .select_only()
            .column(product::Column::Category)
            .distinct()
            .order_by_asc(product::Column::Category)
            .into_tuple()
            .all(self.db.as_ref())
            .await?;
        Ok(rows
            .into_iter()
            .flatten()
            .filter(|c| !c.trim().is_empty())
            .collect())
    }

    /// Products referenced by order lines are deactivated instead of removed.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let current = self.get(id).await?;

        let referenced = order_item::Entity::find()
            .filter(order_item::Column::ProductId.eq(id))
            .count(self.db.as_ref())
            .await?
            > 0;

        if referenced {
            let mut am: product::ActiveModel = current.into();
            am.active = Set(false);
            am.updated_at = Set(Some(Utc::now()));
            am.update(self.db.as_ref()).await?;
            info!(product_id = %id, "product with order history deactivated");
        } else {
            product::Entity::delete_by_id(id)
                .exec(self.db.as_ref())
                .await?;
            info!(product_id = %id, "product deleted");
        }

        self.events.send(Event::ProductDeleted(id)).await;
        Ok(())
    }
}
