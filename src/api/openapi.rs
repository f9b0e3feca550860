//! OpenAPI document for the identity surface.

use utoipa::OpenApi;

use super::handlers::{entity, health, password, session, two_factor, types, user, verification};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "tessera",
        description = "Identity and Access core for multi-tenant SaaS backends",
        license(name = "BSD-3-Clause")
    ),
    paths(
        health::health,
        user::sign_up,
        user::me,
        user::update_me,
        session::sign_in,
        session::sign_out,
        session::refresh,
        session::list_sessions,
        session::revoke_session,
        session::revoke_other_sessions,
        verification::verify_email,
        password::forgot_password,
        password::reset_password,
        password::update_password,
        two_factor::setup,
        two_factor::enable,
        two_factor::disable,
        two_factor::verify,
        entity::create_entity,
        entity::get_entity,
        entity::get_children,
        entity::update_entity,
        entity::add_member,
        entity::change_member_role,
        entity::remove_member,
    ),
    components(schemas(
        crate::models::Entity,
        crate::models::Membership,
        types::SignUpRequest,
        types::SignInRequest,
        types::SignInResponse,
        types::UpdateProfileRequest,
        types::MeResponse,
        types::VerifyEmailRequest,
        types::ForgotPasswordRequest,
        types::ResetPasswordRequest,
        types::UpdatePasswordRequest,
        types::TwoFactorCodeRequest,
        types::TwoFactorSetupResponse,
        types::SessionSummary,
        types::CreateEntityRequest,
        types::UpdateEntityRequest,
        types::AddMemberRequest,
        types::ChangeRoleRequest,
    )),
    tags(
        (name = "identity", description = "Credential, session, and verification flows"),
        (name = "two-factor", description = "TOTP enrollment and challenges"),
        (name = "entities", description = "Tenant hierarchy and memberships"),
        (name = "health", description = "Liveness")
    )
)]
pub struct ApiDoc;

/// Serialized OpenAPI document, used by tooling and tests.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[cfg(test)]
mod tests {
    use super::openapi;

    #[test]
    fn document_lists_the_identity_routes() {
        let doc = openapi();
        let paths = &doc.paths.paths;
        for path in [
            "/health",
            "/identity/sign-in",
            "/identity/sign-out",
            "/identity/refresh-session",
            "/identity/me",
            "/identity/verify-email",
            "/identity/two-factor/verify",
            "/entities/{id_or_slug}",
            "/entities/{id}/children",
            "/entities/{id}/members/{user_id}",
        ] {
            assert!(paths.contains_key(path), "missing path {path}");
        }
    }
}
