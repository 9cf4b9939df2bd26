use crate::{
    entities::commerce::{
        product, product_variant, variant_size, Product, ProductModel, ProductStatus,
        ProductVariant, ProductVariantModel, VariantSize, VariantSizeModel,
    },
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

const DEFAULT_PER_PAGE: u64 = 20;
const MAX_PER_PAGE: u64 = 100;

/// Products, their color variants and per-size stock.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Create a new product. Products start inactive until a variant is added.
    #[instrument(skip(self))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        input.validate()?;
        let name = input.name.trim().to_string();
        self.ensure_unique_name(&name, None).await?;

        let now = Utc::now();
        let product = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            description: Set(input.description),
            price: Set(input.price),
            status: Set(ProductStatus::Inactive),
            category_id: Set(input.category_id),
            subcategory_id: Set(input.subcategory_id),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let product = product.insert(&*self.db).await?;
        info!(product_id = %product.id, "Created product");
        Ok(product)
    }

    /// Get a product with its variants and sizes
    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductDetail, ServiceError> {
        let product = self.find_visible_product(product_id).await?;
        let variants = ProductVariant::find()
            .filter(product_variant::Column::ProductId.eq(product_id))
            .order_by_asc(product_variant::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let variant_ids: Vec<Uuid> = variants.iter().map(|v| v.id).collect();
        let sizes = if variant_ids.is_empty() {
            Vec::new()
        } else {
            VariantSize::find()
                .filter(variant_size::Column::VariantId.is_in(variant_ids))
                .order_by_asc(variant_size::Column::Size)
                .all(&*self.db)
                .await?
        };

        let variants = variants
            .into_iter()
            .map(|variant| {
                let variant_sizes = sizes
                    .iter()
                    .filter(|s| s.variant_id == variant.id)
                    .map(SizeStock::from)
                    .collect();
                VariantDetail::new(variant, variant_sizes)
            })
            .collect();

        Ok(ProductDetail { product, variants })
    }

    /// List products, newest first. Deleted products are never listed.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        query: ProductListQuery,
    ) -> Result<(Vec<ProductModel>, u64), ServiceError> {
        let per_page = query
            .per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE);
        let page = query.page.unwrap_or(1).max(1);

        let mut select = Product::find().filter(product::Column::Status.ne(ProductStatus::Deleted));
        if let Some(status) = query.status {
            select = select.filter(product::Column::Status.eq(status));
        }
        if let Some(category_id) = query.category_id {
            select = select.filter(product::Column::CategoryId.eq(category_id));
        }

        let paginator = select
            .order_by_desc(product::Column::CreatedAt)
            .paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page - 1).await?;
        Ok((products, total))
    }

    #[instrument(skip(self))]
    pub async fn update_product(
        &self,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        input.validate()?;
        let product = self.find_visible_product(product_id).await?;
        let mut active: product::ActiveModel = product.into();

        if let Some(name) = input.name {
            let name = name.trim().to_string();
            self.ensure_unique_name(&name, Some(product_id)).await?;
            active.name = Set(name);
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        if let Some(price) = input.price {
            active.price = Set(price);
        }
        if let Some(category_id) = input.category_id {
            active.category_id = Set(Some(category_id));
        }
        if let Some(subcategory_id) = input.subcategory_id {
            active.subcategory_id = Set(Some(subcategory_id));
        }
        active.updated_at = Set(Utc::now());

        let product = active.update(&*self.db).await?;
        info!(product_id = %product_id, "Updated product");
        Ok(product)
    }

    /// Soft delete: the row stays for order history, but is hidden everywhere.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, product_id: Uuid) -> Result<(), ServiceError> {
        let product = self.find_visible_product(product_id).await?;
        let mut active: product::ActiveModel = product.into();
        active.status = Set(ProductStatus::Deleted);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;
        info!(product_id = %product_id, "Deleted product");
        Ok(())
    }

    /// Add a color variant with its sizes; the product becomes active.
    #[instrument(skip(self))]
    pub async fn add_variant(
        &self,
        product_id: Uuid,
        input: CreateVariantInput,
    ) -> Result<VariantDetail, ServiceError> {
        input.validate()?;
        let mut seen = HashSet::new();
        for size in &input.sizes {
            size.validate()?;
            if !seen.insert(size.size.trim().to_string()) {
                return Err(ServiceError::ValidationError(format!(
                    "Size {} is listed more than once",
                    size.size
                )));
            }
        }

        let product = self.find_visible_product(product_id).await?;
        let now = Utc::now();
        let variant_id = Uuid::new_v4();

        let txn = self.db.begin().await?;

        let variant = product_variant::ActiveModel {
            id: Set(variant_id),
            product_id: Set(product_id),
            color: Set(input.color),
            color_code: Set(input.color_code),
            images: Set(serde_json::to_value(&input.images)?),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut sizes = Vec::with_capacity(input.sizes.len());
        for size in input.sizes {
            let row = variant_size::ActiveModel {
                id: Set(Uuid::new_v4()),
                variant_id: Set(variant_id),
                size: Set(size.size.trim().to_string()),
                stock: Set(size.stock),
            }
            .insert(&txn)
            .await?;
            sizes.push(SizeStock::from(&row));
        }

        if product.status != ProductStatus::Active {
            let mut active: product::ActiveModel = product.into();
            active.status = Set(ProductStatus::Active);
            active.updated_at = Set(now);
            active.update(&txn).await?;
        }

        txn.commit().await?;

        info!(product_id = %product_id, variant_id = %variant_id, "Added variant");
        Ok(VariantDetail::new(variant, sizes))
    }

    #[instrument(skip(self))]
    pub async fn update_variant(
        &self,
        variant_id: Uuid,
        input: UpdateVariantInput,
    ) -> Result<ProductVariantModel, ServiceError> {
        input.validate()?;
        let variant = self.find_variant(variant_id).await?;
        let mut active: product_variant::ActiveModel = variant.into();

        if let Some(color) = input.color {
            active.color = Set(color);
        }
        if let Some(color_code) = input.color_code {
            active.color_code = Set(color_code);
        }
        if let Some(images) = input.images {
            active.images = Set(serde_json::to_value(&images)?);
        }
        active.updated_at = Set(Utc::now());

        Ok(active.update(&*self.db).await?)
    }

    /// Remove a variant and its sizes. A product left without variants goes inactive.
    #[instrument(skip(self))]
    pub async fn remove_variant(&self, variant_id: Uuid) -> Result<(), ServiceError> {
        let variant = self.find_variant(variant_id).await?;
        let txn = self.db.begin().await?;

        VariantSize::delete_many()
            .filter(variant_size::Column::VariantId.eq(variant_id))
            .exec(&txn)
            .await?;
        ProductVariant::delete_by_id(variant_id).exec(&txn).await?;

        let remaining = ProductVariant::find()
            .filter(product_variant::Column::ProductId.eq(variant.product_id))
            .count(&txn)
            .await?;
        if remaining == 0 {
            Product::update_many()
                .col_expr(product::Column::Status, Expr::value(ProductStatus::Inactive))
                .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(product::Column::Id.eq(variant.product_id))
                .filter(product::Column::Status.eq(ProductStatus::Active))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;
        info!(variant_id = %variant_id, "Removed variant");
        Ok(())
    }

    /// Administrative stock correction; creates the size when it does not exist yet.
    #[instrument(skip(self))]
    pub async fn set_stock(
        &self,
        variant_id: Uuid,
        size: &str,
        stock: i32,
    ) -> Result<SizeStock, ServiceError> {
        if stock < 0 {
            return Err(ServiceError::ValidationError(
                "stock cannot be negative".to_string(),
            ));
        }
        self.find_variant(variant_id).await?;

        let existing = VariantSize::find()
            .filter(variant_size::Column::VariantId.eq(variant_id))
            .filter(variant_size::Column::Size.eq(size))
            .one(&*self.db)
            .await?;

        let row = match existing {
            Some(row) => {
                let mut active: variant_size::ActiveModel = row.into();
                active.stock = Set(stock);
                active.update(&*self.db).await?
            }
            None => {
                variant_size::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    variant_id: Set(variant_id),
                    size: Set(size.to_string()),
                    stock: Set(stock),
                }
                .insert(&*self.db)
                .await?
            }
        };

        info!(variant_id = %variant_id, size = %size, stock, "Stock set");
        Ok(SizeStock::from(&row))
    }

    /// Advisory stock check used while assembling an order.
    ///
    /// # Returns
    /// The product and variant the line refers to.
    pub async fn ensure_available(
        &self,
        product_id: Uuid,
        variant_id: Uuid,
        size: &str,
        quantity: i32,
    ) -> Result<(ProductModel, ProductVariantModel), ServiceError> {
        let product = Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .filter(|p| p.status == ProductStatus::Active)
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let variant = ProductVariant::find_by_id(variant_id)
            .one(&*self.db)
            .await?
            .filter(|v| v.product_id == product_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Variant {} not found", variant_id)))?;

        let size_stock = VariantSize::find()
            .filter(variant_size::Column::VariantId.eq(variant_id))
            .filter(variant_size::Column::Size.eq(size))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Size {} not found for {}", size, product.name))
            })?;

        if size_stock.stock < quantity {
            return Err(ServiceError::NotFound(format!(
                "insufficient stock for {} size {}",
                product.name, size
            )));
        }

        Ok((product, variant))
    }

    /// Conditional decrement: `stock = stock - qty WHERE stock >= qty`.
    /// An oversell is reported as `InsufficientStock` and nothing is written.
    pub async fn decrement_stock<C: ConnectionTrait>(
        conn: &C,
        variant_id: Uuid,
        size: &str,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let result = VariantSize::update_many()
            .col_expr(
                variant_size::Column::Stock,
                Expr::col(variant_size::Column::Stock).sub(quantity),
            )
            .filter(variant_size::Column::VariantId.eq(variant_id))
            .filter(variant_size::Column::Size.eq(size))
            .filter(variant_size::Column::Stock.gte(quantity))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            warn!(variant_id = %variant_id, size = %size, quantity, "Stock decrement refused");
            return Err(ServiceError::InsufficientStock(format!(
                "insufficient stock for variant {} size {}",
                variant_id, size
            )));
        }
        Ok(())
    }

    pub async fn increment_stock<C: ConnectionTrait>(
        conn: &C,
        variant_id: Uuid,
        size: &str,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let result = VariantSize::update_many()
            .col_expr(
                variant_size::Column::Stock,
                Expr::col(variant_size::Column::Stock).add(quantity),
            )
            .filter(variant_size::Column::VariantId.eq(variant_id))
            .filter(variant_size::Column::Size.eq(size))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Size {} not found for variant {}",
                size, variant_id
            )));
        }
        Ok(())
    }

    /// Current stock for one size, if it exists
    pub async fn stock_of(&self, variant_id: Uuid, size: &str) -> Result<Option<i32>, ServiceError> {
        Ok(VariantSize::find()
            .filter(variant_size::Column::VariantId.eq(variant_id))
            .filter(variant_size::Column::Size.eq(size))
            .one(&*self.db)
            .await?
            .map(|s| s.stock))
    }

    async fn find_visible_product(&self, product_id: Uuid) -> Result<ProductModel, ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .filter(|p| p.status != ProductStatus::Deleted)
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    async fn find_variant(&self, variant_id: Uuid) -> Result<ProductVariantModel, ServiceError> {
        ProductVariant::find_by_id(variant_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Variant {} not found", variant_id)))
    }

    async fn ensure_unique_name(
        &self,
        name: &str,
        exclude_id: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let mut query = Product::find()
            .filter(product::Column::Name.eq(name))
            .filter(product::Column::Status.ne(ProductStatus::Deleted));
        if let Some(id) = exclude_id {
            query = query.filter(product::Column::Id.ne(id));
        }

        if query.one(&*self.db).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Product {} already exists",
                name
            )));
        }
        Ok(())
    }
}

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if *price <= Decimal::ZERO {
        let mut err = ValidationError::new("price");
        err.message = Some("price must be greater than zero".into());
        return Err(err);
    }
    Ok(())
}

/// Input for creating a product
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Decimal,
    pub category_id: Option<Uuid>,
    pub subcategory_id: Option<Uuid>,
}

/// Input for updating a product
#[derive(Debug, Default, Deserialize, Serialize, Validate)]
pub struct UpdateProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Option<Decimal>,
    pub category_id: Option<Uuid>,
    pub subcategory_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct SizeStockInput {
    #[validate(length(min = 1, max = 20))]
    pub size: String,
    #[validate(range(min = 0))]
    pub stock: i32,
}

/// Input for creating a variant
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CreateVariantInput {
    #[validate(length(min = 1))]
    pub color: String,
    #[validate(length(min = 1))]
    pub color_code: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[validate(length(min = 1, message = "at least one size is required"))]
    pub sizes: Vec<SizeStockInput>,
}

#[derive(Debug, Default, Deserialize, Serialize, Validate)]
pub struct UpdateVariantInput {
    #[validate(length(min = 1))]
    pub color: Option<String>,
    #[validate(length(min = 1))]
    pub color_code: Option<String>,
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductListQuery {
    pub status: Option<ProductStatus>,
    pub category_id: Option<Uuid>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeStock {
    pub size: String,
    pub stock: i32,
}

impl From<&VariantSizeModel> for SizeStock {
    fn from(model: &VariantSizeModel) -> Self {
        Self {
            size: model.size.clone(),
            stock: model.stock,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VariantDetail {
    pub id: Uuid,
    pub product_id: Uuid,
    pub color: String,
    pub color_code: String,
    pub images: Vec<String>,
    pub sizes: Vec<SizeStock>,
}

impl VariantDetail {
    fn new(variant: ProductVariantModel, sizes: Vec<SizeStock>) -> Self {
        Self {
            images: variant.image_list(),
            id: variant.id,
            product_id: variant.product_id,
            color: variant.color,
            color_code: variant.color_code,
            sizes,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: ProductModel,
    pub variants: Vec<VariantDetail>,
}
