//! # Category Repository
//!
//! Component categories. A category cannot be deleted while components
//! still point at it.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use labstock_core::validation::validate_name;
use labstock_core::{Category, CoreError};

const CATEGORY_COLUMNS: &str = "id, name, created_at";

/// Repository for category database operations.
#[derive(Debug, Clone)]
pub struct CategoryRepository {
    pool: SqlitePool,
}

impl CategoryRepository {
    /// Creates a new CategoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CategoryRepository { pool }
    }

    /// Creates a category. Names are unique.
    pub async fn create(&self, name: &str) -> DbResult<Category> {
        validate_name("name", name)?;
        let name = name.trim();
        let now = Utc::now();

        debug!(name = %name, "Creating category");

        let result = sqlx::query("INSERT INTO categories (name, created_at) VALUES (?1, ?2)")
            .bind(name)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| match DbError::from(e) {
                DbError::UniqueViolation { .. } => DbError::duplicate("category name", name),
                other => other,
            })?;

        Ok(Category {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            created_at: now,
        })
    }

    /// Lists categories by name.
    pub async fn list(&self) -> DbResult<Vec<Category>> {
        let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY name");
        let categories = sqlx::query_as::<_, Category>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(categories)
    }

    /// Gets a category by ID.
    pub async fn get(&self, id: i64) -> DbResult<Category> {
        let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ?1");
        sqlx::query_as::<_, Category>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Category", id))
    }

    pub async fn rename(&self, id: i64, name: &str) -> DbResult<Category> {
        validate_name("name", name)?;
        let name = name.trim();

        debug!(id, name = %name, "Renaming category");

        let result = sqlx::query("UPDATE categories SET name = ?2 WHERE id = ?1")
            .bind(id)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| match DbError::from(e) {
                DbError::UniqueViolation { .. } => DbError::duplicate("category name", name),
                other => other,
            })?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Category", id));
        }

        self.get(id).await
    }

    /// Deletes a category with no components.
    pub async fn delete(&self, id: i64) -> DbResult<Category> {
        debug!(id, "Deleting category");

        let category = self.get(id).await?;

        let in_use: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM components WHERE category_id = ?1")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        if in_use > 0 {
            return Err(CoreError::conflict(format!(
                "Category '{}' is used by {in_use} component(s)",
                category.name
            ))
            .into());
        }

        let result = sqlx::query("DELETE FROM categories WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| match DbError::from(e) {
                // A component was added between the check and the delete.
                DbError::ForeignKeyViolation { .. } => CoreError::conflict(format!(
                    "Category '{}' is in use",
                    category.name
                ))
                .into(),
                other => other,
            })?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Category", id));
        }

        Ok(category)
    }
}
