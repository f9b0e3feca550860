//! Entity (tenant hierarchy node) persistence.

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::Instrument;
use uuid::Uuid;

use super::{is_unique_violation, query_span};
use crate::models::{Entity, EntityStatus, EntityType};

pub struct EntityStore;

impl EntityStore {
    /// Inserts a new entity. Returns `None` when (type, slug) is taken.
    ///
    /// # Errors
    /// Returns an error if database insertion fails.
    pub async fn create(
        pool: &PgPool,
        name: &str,
        slug: &str,
        kind: EntityType,
        parent_id: Option<Uuid>,
    ) -> Result<Option<Entity>> {
        let query = r"
            INSERT INTO entities (name, slug, type, parent_id)
            VALUES ($1, $2, $3, $4)
            RETURNING *
        ";
        let row = sqlx::query_as::<_, Entity>(query)
            .bind(name)
            .bind(slug)
            .bind(kind.as_str())
            .bind(parent_id)
            .fetch_one(pool)
            .instrument(query_span!("INSERT", query))
            .await;
        match row {
            Ok(entity) => Ok(Some(entity)),
            Err(err) if is_unique_violation(&err) => Ok(None),
            Err(err) => Err(err).context("failed to insert entity"),
        }
    }

    /// # Errors
    /// Returns an error if database query fails.
    pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Entity>> {
        let query = "SELECT * FROM entities WHERE id = $1";
        sqlx::query_as::<_, Entity>(query)
            .bind(id)
            .fetch_optional(pool)
            .instrument(query_span!("SELECT", query))
            .await
            .context("failed to fetch entity by id")
    }

    /// Slug lookup scoped to one entity type; slugs are only unique per type.
    ///
    /// # Errors
    /// Returns an error if database query fails.
    pub async fn get_by_slug(
        pool: &PgPool,
        kind: EntityType,
        slug: &str,
    ) -> Result<Option<Entity>> {
        let query = "SELECT * FROM entities WHERE type = $1 AND slug = $2";
        sqlx::query_as::<_, Entity>(query)
            .bind(kind.as_str())
            .bind(slug)
            .fetch_optional(pool)
            .instrument(query_span!("SELECT", query))
            .await
            .context("failed to fetch entity by slug")
    }

    /// Slug lookup without a type qualifier; slugs are only unique per type,
    /// so the oldest match wins.
    ///
    /// # Errors
    /// Returns an error if database query fails.
    pub async fn get_by_slug_any(pool: &PgPool, slug: &str) -> Result<Option<Entity>> {
        let query = "SELECT * FROM entities WHERE slug = $1 ORDER BY created_at LIMIT 1";
        sqlx::query_as::<_, Entity>(query)
            .bind(slug)
            .fetch_optional(pool)
            .instrument(query_span!("SELECT", query))
            .await
            .context("failed to fetch entity by slug")
    }

    /// Direct children only; the membership closure walks deeper.
    ///
    /// # Errors
    /// Returns an error if database query fails.
    pub async fn list_children(pool: &PgPool, parent_id: Uuid) -> Result<Vec<Entity>> {
        let query = "SELECT * FROM entities WHERE parent_id = $1 ORDER BY created_at";
        sqlx::query_as::<_, Entity>(query)
            .bind(parent_id)
            .fetch_all(pool)
            .instrument(query_span!("SELECT", query))
            .await
            .context("failed to list child entities")
    }

    /// # Errors
    /// Returns an error if database update fails.
    pub async fn update_status(
        pool: &PgPool,
        id: Uuid,
        status: EntityStatus,
    ) -> Result<Option<Entity>> {
        let query = r"
            UPDATE entities
            SET status = $2, updated_at = now()
            WHERE id = $1
            RETURNING *
        ";
        sqlx::query_as::<_, Entity>(query)
            .bind(id)
            .bind(status.as_str())
            .fetch_optional(pool)
            .instrument(query_span!("UPDATE", query))
            .await
            .context("failed to update entity status")
    }
}
