//! Membership persistence and the inheritance closure.

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::Instrument;
use uuid::Uuid;

use super::{is_unique_violation, query_span};
use crate::models::{Membership, Role};

pub struct MembershipStore;

impl MembershipStore {
    /// Grants a direct membership. Returns `None` when the user already has
    /// one on this entity.
    ///
    /// # Errors
    /// Returns an error if database insertion fails.
    pub async fn create(
        pool: &PgPool,
        user_id: Uuid,
        entity_id: Uuid,
        role: Role,
    ) -> Result<Option<Membership>> {
        let query = r"
            INSERT INTO memberships (user_id, entity_id, role)
            VALUES ($1, $2, $3)
            RETURNING *
        ";
        let row = sqlx::query_as::<_, Membership>(query)
            .bind(user_id)
            .bind(entity_id)
            .bind(role.as_str())
            .fetch_one(pool)
            .instrument(query_span!("INSERT", query))
            .await;
        match row {
            Ok(membership) => Ok(Some(membership)),
            Err(err) if is_unique_violation(&err) => Ok(None),
            Err(err) => Err(err).context("failed to insert membership"),
        }
    }

    /// Direct memberships only, no inheritance.
    ///
    /// # Errors
    /// Returns an error if database query fails.
    pub async fn list_direct(pool: &PgPool, user_id: Uuid) -> Result<Vec<Membership>> {
        let query = "SELECT * FROM memberships WHERE user_id = $1 ORDER BY created_at";
        sqlx::query_as::<_, Membership>(query)
            .bind(user_id)
            .fetch_all(pool)
            .instrument(query_span!("SELECT", query))
            .await
            .context("failed to list memberships")
    }

    /// Effective memberships: direct rows plus one synthesized row for every
    /// descendant reachable through `parent_id` edges. Each reachable entity
    /// takes the role of the nearest direct-membership ancestor, so a direct
    /// grant on a child always beats one inherited from further up.
    ///
    /// Inherited rows keep the id of the direct membership they derive from,
    /// with `entity_id` rewritten to the descendant.
    ///
    /// # Errors
    /// Returns an error if database query fails.
    pub async fn list_effective(pool: &PgPool, user_id: Uuid) -> Result<Vec<Membership>> {
        let query = r"
            WITH RECURSIVE grants AS (
                SELECT m.id, m.user_id, m.entity_id, m.role,
                       m.created_at, m.updated_at, 0 AS level
                FROM memberships m
                WHERE m.user_id = $1
                UNION ALL
                SELECT g.id, g.user_id, e.id, g.role,
                       g.created_at, g.updated_at, g.level + 1
                FROM grants g
                JOIN entities e ON e.parent_id = g.entity_id
            )
            SELECT DISTINCT ON (entity_id)
                   id, user_id, entity_id, role, created_at, updated_at
            FROM grants
            ORDER BY entity_id, level
        ";
        sqlx::query_as::<_, Membership>(query)
            .bind(user_id)
            .fetch_all(pool)
            .instrument(query_span!("SELECT", query))
            .await
            .context("failed to resolve effective memberships")
    }

    /// # Errors
    /// Returns an error if database update fails.
    pub async fn update_role(
        pool: &PgPool,
        user_id: Uuid,
        entity_id: Uuid,
        role: Role,
    ) -> Result<Option<Membership>> {
        let query = r"
            UPDATE memberships
            SET role = $3, updated_at = now()
            WHERE user_id = $1 AND entity_id = $2
            RETURNING *
        ";
        sqlx::query_as::<_, Membership>(query)
            .bind(user_id)
            .bind(entity_id)
            .bind(role.as_str())
            .fetch_optional(pool)
            .instrument(query_span!("UPDATE", query))
            .await
            .context("failed to update membership role")
    }

    /// # Errors
    /// Returns an error if database deletion fails.
    pub async fn delete(pool: &PgPool, user_id: Uuid, entity_id: Uuid) -> Result<u64> {
        let query = "DELETE FROM memberships WHERE user_id = $1 AND entity_id = $2";
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(entity_id)
            .execute(pool)
            .instrument(query_span!("DELETE", query))
            .await
            .context("failed to delete membership")?;
        Ok(result.rows_affected())
    }
}
