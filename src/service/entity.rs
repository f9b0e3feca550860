//! Entity hierarchy and membership management.

use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::{
    authz::{self, Action, Resource},
    error::{Error, ErrorCode, Result},
    models::{Entity, EntityStatus, EntityType, Membership, Role, Session},
    store::{EntityStore, MembershipStore},
};

#[derive(Clone)]
pub struct EntityService {
    pool: PgPool,
}

impl EntityService {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lookup that accepts either a UUID or a slug. Slugs are only unique
    /// per entity type, so callers who know the type pass it to disambiguate;
    /// without one, a cross-type collision resolves to the oldest entity.
    ///
    /// # Errors
    /// `entity_not_found`.
    pub async fn get(&self, id_or_slug: &str, kind: Option<EntityType>) -> Result<Entity> {
        let entity = match (Uuid::parse_str(id_or_slug), kind) {
            (Ok(id), _) => EntityStore::get_by_id(&self.pool, id).await?,
            (Err(_), Some(kind)) => EntityStore::get_by_slug(&self.pool, kind, id_or_slug).await?,
            (Err(_), None) => EntityStore::get_by_slug_any(&self.pool, id_or_slug).await?,
        };
        entity.ok_or(Error::Code(ErrorCode::EntityNotFound))
    }

    /// # Errors
    /// `entity_not_found`.
    pub async fn get_by_id(&self, id: Uuid) -> Result<Entity> {
        EntityStore::get_by_id(&self.pool, id)
            .await?
            .ok_or(Error::Code(ErrorCode::EntityNotFound))
    }

    /// Direct children of an entity, oldest first. Requires read rights on
    /// the parent.
    ///
    /// # Errors
    /// `insufficient_permissions`, `entity_not_found`.
    pub async fn children(&self, caller: &Session, id: Uuid) -> Result<Vec<Entity>> {
        self.get_by_id(id).await?;
        let memberships = self.memberships_effective(caller.user_id).await?;
        authz::authorize(&memberships, id, Resource::Entity, Action::Read)?;
        Ok(EntityStore::list_children(&self.pool, id).await?)
    }

    /// Moves an entity through its lifecycle (pending, active, inactive,
    /// suspended). Requires update rights on the entity itself.
    ///
    /// # Errors
    /// `insufficient_permissions`, `entity_not_found`.
    pub async fn set_status(
        &self,
        caller: &Session,
        id: Uuid,
        status: EntityStatus,
    ) -> Result<Entity> {
        let memberships = self.memberships_effective(caller.user_id).await?;
        authz::authorize(&memberships, id, Resource::Entity, Action::Update)?;

        let entity = EntityStore::update_status(&self.pool, id, status)
            .await?
            .ok_or(Error::Code(ErrorCode::EntityNotFound))?;
        info!(entity_id = %entity.id, status = entity.status.as_str(), "entity status changed");
        Ok(entity)
    }

    /// Creates an entity. Root entities may be created by any signed-in user,
    /// who becomes their owner; children require create rights on the parent.
    ///
    /// # Errors
    /// `insufficient_permissions`, `entity_not_found`, `invalid_value` when
    /// the (type, slug) pair is taken.
    pub async fn create(
        &self,
        caller: &Session,
        name: &str,
        slug: &str,
        kind: EntityType,
        parent_id: Option<Uuid>,
    ) -> Result<Entity> {
        if let Some(parent_id) = parent_id {
            self.get_by_id(parent_id).await?;
            let memberships = self.memberships_effective(caller.user_id).await?;
            authz::authorize(&memberships, parent_id, Resource::Entity, Action::Create)?;
        }

        let Some(entity) = EntityStore::create(&self.pool, name, slug, kind, parent_id).await?
        else {
            return Err(Error::Code(ErrorCode::InvalidValue));
        };

        // Root creators get an owner grant; children inherit from the parent.
        if parent_id.is_none() {
            MembershipStore::create(&self.pool, caller.user_id, entity.id, Role::Owner).await?;
        }
        info!(entity_id = %entity.id, slug = %entity.slug, "entity created");
        Ok(entity)
    }

    /// Grants a direct membership on an entity.
    ///
    /// # Errors
    /// `insufficient_permissions`, `invalid_value` when the user already has
    /// a direct membership there.
    pub async fn add_member(
        &self,
        caller: &Session,
        entity_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<Membership> {
        self.get_by_id(entity_id).await?;
        let memberships = self.memberships_effective(caller.user_id).await?;
        authz::authorize(&memberships, entity_id, Resource::Membership, Action::Create)?;

        MembershipStore::create(&self.pool, user_id, entity_id, role)
            .await?
            .ok_or(Error::Code(ErrorCode::InvalidValue))
    }

    /// # Errors
    /// `insufficient_permissions`, `user_not_found` when the target has no
    /// direct membership on the entity.
    pub async fn change_member_role(
        &self,
        caller: &Session,
        entity_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<Membership> {
        let memberships = self.memberships_effective(caller.user_id).await?;
        authz::authorize(&memberships, entity_id, Resource::Membership, Action::Update)?;

        MembershipStore::update_role(&self.pool, user_id, entity_id, role)
            .await?
            .ok_or(Error::Code(ErrorCode::UserNotFound))
    }

    /// # Errors
    /// `insufficient_permissions`, `user_not_found` when the target has no
    /// direct membership on the entity.
    pub async fn remove_member(
        &self,
        caller: &Session,
        entity_id: Uuid,
        user_id: Uuid,
    ) -> Result<()> {
        let memberships = self.memberships_effective(caller.user_id).await?;
        authz::authorize(&memberships, entity_id, Resource::Membership, Action::Delete)?;

        let deleted = MembershipStore::delete(&self.pool, user_id, entity_id).await?;
        if deleted == 0 {
            return Err(Error::Code(ErrorCode::UserNotFound));
        }
        Ok(())
    }

    /// Effective memberships: one role per reachable entity, nearest direct
    /// ancestor winning.
    pub async fn memberships_effective(&self, user_id: Uuid) -> Result<Vec<Membership>> {
        Ok(MembershipStore::list_effective(&self.pool, user_id).await?)
    }
}
