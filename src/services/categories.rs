use crate::{
    entities::commerce::{
        category, category_subcategory, subcategory, ActivityStatus, Category, CategoryModel,
        CategorySubcategory, Subcategory, SubcategoryModel,
    },
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

#[derive(Clone)]
pub struct CategoryService {
    db: Arc<DatabaseConnection>,
}

impl CategoryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn create_category(
        &self,
        input: CreateCategoryInput,
    ) -> Result<CategoryModel, ServiceError> {
        input.validate()?;
        let name = input.name.trim().to_string();
        self.ensure_unique_name(&name, None).await?;

        let now = Utc::now();
        let category = category::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            description: Set(input.description),
            icon: Set(input.icon),
            status: Set(ActivityStatus::Active),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(category_id = %category.id, "Created category");
        Ok(category)
    }

    pub async fn list_categories(&self) -> Result<Vec<CategoryModel>, ServiceError> {
        Ok(Category::find()
            .order_by_asc(category::Column::Name)
            .all(&*self.db)
            .await?)
    }

    /// Category together with the subcategories linked to it
    pub async fn get_category(&self, id: Uuid) -> Result<CategoryDetail, ServiceError> {
        let category = self.find_category(id).await?;
        let subcategories = category
            .find_related(Subcategory)
            .order_by_asc(subcategory::Column::Name)
            .all(&*self.db)
            .await?;
        Ok(CategoryDetail {
            category,
            subcategories,
        })
    }

    #[instrument(skip(self))]
    pub async fn update_category(
        &self,
        id: Uuid,
        input: UpdateCategoryInput,
    ) -> Result<CategoryModel, ServiceError> {
        input.validate()?;
        let category = self.find_category(id).await?;
        let mut active: category::ActiveModel = category.into();

        if let Some(name) = input.name {
            let name = name.trim().to_string();
            self.ensure_unique_name(&name, Some(id)).await?;
            active.name = Set(name);
        }
        if let Some(description) = input.description {
            active.description = Set(description);
        }
        if let Some(icon) = input.icon {
            active.icon = Set(Some(icon));
        }
        if let Some(status) = input.status {
            active.status = Set(status);
        }
        active.updated_at = Set(Utc::now());

        Ok(active.update(&*self.db).await?)
    }

    /// Removes a category and its links; linked subcategories survive.
    #[instrument(skip(self))]
    pub async fn delete_category(&self, id: Uuid) -> Result<(), ServiceError> {
        self.find_category(id).await?;
        let txn = self.db.begin().await?;
        CategorySubcategory::delete_many()
            .filter(category_subcategory::Column::CategoryId.eq(id))
            .exec(&txn)
            .await?;
        Category::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;
        info!(category_id = %id, "Deleted category");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn create_subcategory(
        &self,
        input: CreateSubcategoryInput,
    ) -> Result<SubcategoryModel, ServiceError> {
        input.validate()?;
        let now = Utc::now();
        let subcategory = subcategory::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            description: Set(input.description),
            status: Set(ActivityStatus::Active),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        if let Some(category_id) = input.category_id {
            self.attach_subcategory(category_id, subcategory.id).await?;
        }

        info!(subcategory_id = %subcategory.id, "Created subcategory");
        Ok(subcategory)
    }

    pub async fn list_subcategories(&self) -> Result<Vec<SubcategoryModel>, ServiceError> {
        Ok(Subcategory::find()
            .order_by_asc(subcategory::Column::Name)
            .all(&*self.db)
            .await?)
    }

    /// Link a subcategory under a category. Linking twice is a no-op.
    #[instrument(skip(self))]
    pub async fn attach_subcategory(
        &self,
        category_id: Uuid,
        subcategory_id: Uuid,
    ) -> Result<(), ServiceError> {
        self.find_category(category_id).await?;
        self.find_subcategory(subcategory_id).await?;

        let existing = CategorySubcategory::find()
            .filter(category_subcategory::Column::CategoryId.eq(category_id))
            .filter(category_subcategory::Column::SubcategoryId.eq(subcategory_id))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Ok(());
        }

        category_subcategory::ActiveModel {
            id: Set(Uuid::new_v4()),
            category_id: Set(category_id),
            subcategory_id: Set(subcategory_id),
        }
        .insert(&*self.db)
        .await?;
        Ok(())
    }

    /// Deletes a subcategory and every category link pointing at it, atomically.
    #[instrument(skip(self))]
    pub async fn delete_subcategory(&self, id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let subcategory = Subcategory::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Subcategory not found".to_string()))?;

        let unlinked = CategorySubcategory::delete_many()
            .filter(category_subcategory::Column::SubcategoryId.eq(id))
            .exec(&txn)
            .await?
            .rows_affected;
        subcategory.delete(&txn).await?;

        txn.commit().await?;
        info!(subcategory_id = %id, unlinked, "Deleted subcategory");
        Ok(())
    }

    async fn find_category(&self, id: Uuid) -> Result<CategoryModel, ServiceError> {
        Category::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Category not found".to_string()))
    }

    async fn find_subcategory(&self, id: Uuid) -> Result<SubcategoryModel, ServiceError> {
        Subcategory::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Subcategory not found".to_string()))
    }

    async fn ensure_unique_name(
        &self,
        name: &str,
        exclude_id: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let mut query = Category::find()
            .filter(category::Column::Name.eq(name))
            .filter(category::Column::Status.eq(ActivityStatus::Active));
        if let Some(id) = exclude_id {
            query = query.filter(category::Column::Id.ne(id));
        }
        if query.one(&*self.db).await?.is_some() {
            return Err(ServiceError::Conflict(
                "Category name already exists".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CreateCategoryInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub icon: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize, Validate)]
pub struct UpdateCategoryInput {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub status: Option<ActivityStatus>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CreateSubcategoryInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Optional category to link the new subcategory under
    pub category_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryDetail {
    #[serde(flatten)]
    pub category: CategoryModel,
    pub subcategories: Vec<SubcategoryModel>,
}
