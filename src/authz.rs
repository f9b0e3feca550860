//! Role-based authorization over the entity hierarchy.
//!
//! Permissions are a static table keyed by role. Effective memberships
//! (including inherited ones) are resolved by the membership store; this
//! module only answers "may this role do that".

use uuid::Uuid;

use crate::{
    error::{Error, ErrorCode, Result},
    models::{Membership, Role},
};

/// Resources the identity core guards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resource {
    Entity,
    Membership,
    Session,
    AuditLog,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

/// Static permission table.
#[must_use]
pub fn allowed(role: Role, resource: Resource, action: Action) -> bool {
    match role {
        Role::Owner => true,
        Role::Admin => !matches!((resource, action), (Resource::Entity, Action::Delete)),
        Role::Member => matches!(
            (resource, action),
            (Resource::Entity, Action::Read) | (Resource::Membership, Action::Read)
        ),
        Role::Viewer => matches!(action, Action::Read)
            && matches!(resource, Resource::Entity | Resource::Membership),
        Role::None => false,
    }
}

/// Check a membership set against the permission table for one entity.
///
/// The set is expected to already include inherited memberships; a missing
/// entry or a role without the permission both map to
/// `insufficient_permissions`.
pub fn authorize(
    memberships: &[Membership],
    entity_id: Uuid,
    resource: Resource,
    action: Action,
) -> Result<Role> {
    let role = memberships
        .iter()
        .find(|membership| membership.entity_id == entity_id)
        .map(|membership| membership.role)
        .ok_or(Error::Code(ErrorCode::InsufficientPermissions))?;
    if allowed(role, resource, action) {
        Ok(role)
    } else {
        Err(Error::Code(ErrorCode::InsufficientPermissions))
    }
}

#[cfg(test)]
mod tests {
    use super::{allowed, authorize, Action, Resource};
    use crate::{
        error::{Error, ErrorCode},
        models::{Membership, Role},
    };
    use chrono::Utc;
    use uuid::Uuid;

    fn membership(entity_id: Uuid, role: Role) -> Membership {
        Membership {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            entity_id,
            role,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn owner_can_do_everything() {
        for resource in [
            Resource::Entity,
            Resource::Membership,
            Resource::Session,
            Resource::AuditLog,
        ] {
            for action in [Action::Create, Action::Read, Action::Update, Action::Delete] {
                assert!(allowed(Role::Owner, resource, action));
            }
        }
    }

    #[test]
    fn admin_cannot_delete_the_entity() {
        assert!(!allowed(Role::Admin, Resource::Entity, Action::Delete));
        assert!(allowed(Role::Admin, Resource::Entity, Action::Update));
        assert!(allowed(Role::Admin, Resource::Membership, Action::Delete));
    }

    #[test]
    fn viewer_is_read_only() {
        assert!(allowed(Role::Viewer, Resource::Entity, Action::Read));
        assert!(!allowed(Role::Viewer, Resource::Entity, Action::Update));
        assert!(!allowed(Role::Viewer, Resource::Session, Action::Read));
        assert!(!allowed(Role::None, Resource::Entity, Action::Read));
    }

    #[test]
    fn authorize_requires_a_matching_membership() {
        let entity_id = Uuid::new_v4();
        let memberships = vec![membership(entity_id, Role::Member)];

        let role = authorize(&memberships, entity_id, Resource::Entity, Action::Read)
            .expect("member may read");
        assert_eq!(role, Role::Member);

        let err = authorize(&memberships, Uuid::new_v4(), Resource::Entity, Action::Read)
            .expect_err("no membership on that entity");
        assert!(matches!(
            err,
            Error::Code(ErrorCode::InsufficientPermissions)
        ));

        let err = authorize(&memberships, entity_id, Resource::Membership, Action::Delete)
            .expect_err("member may not manage memberships");
        assert!(matches!(
            err,
            Error::Code(ErrorCode::InsufficientPermissions)
        ));
    }
}
