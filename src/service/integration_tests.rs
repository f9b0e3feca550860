use anyhow::{Context, Result};
use axum::http::{header::COOKIE, HeaderMap, HeaderValue};
use secrecy::SecretString;
use sqlx::{postgres::PgPoolOptions, Connection, PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    api::handlers::{require_session, AppState},
    config::IdentityConfig,
    context::RequestContext,
    error::ErrorCode,
    mail::MailQueue,
    models::{EntityType, Role, Session, User},
    service::{two_factor::build_totp, LoginOutcome, Services},
    test_support::{postgres::PostgresContainer, runtime},
};

const IDENTITY_SCHEMA_SQL: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/migrations/0001_identity.sql"
));

const TEST_PASSWORD: &str = "orchard-gate-42";

struct TestContext {
    _postgres: PostgresContainer,
    pool: PgPool,
    services: Services,
    config: IdentityConfig,
}

impl TestContext {
    async fn new() -> Result<Self> {
        if let Err(err) = runtime::ensure_container_runtime() {
            eprintln!("Skipping integration test: {err}");
            return Err(err);
        }

        let postgres = PostgresContainer::start().await?;
        postgres.wait_until_ready().await?;
        apply_schema(&postgres).await?;

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&postgres.admin_dsn())
            .await
            .context("failed to connect test pool")?;

        let config = IdentityConfig::new();
        let services = Services::new(pool.clone(), config.clone(), MailQueue::new(pool.clone()));

        Ok(Self {
            _postgres: postgres,
            pool,
            services,
            config,
        })
    }

    /// Registers a user and marks the address verified so sign-in works.
    async fn seed_verified_user(&self, email: &str) -> Result<User> {
        let user = self
            .services
            .user
            .create(
                &RequestContext::default(),
                email,
                "Test User",
                &password(),
            )
            .await?;
        sqlx::query("UPDATE users SET email_verified_at = now() WHERE id = $1")
            .bind(user.id)
            .execute(&self.pool)
            .await
            .context("mark email verified")?;
        Ok(user)
    }

    /// Runs the full enrollment: setup, then confirm with a live code.
    /// Returns the backup codes and the shared secret.
    async fn enroll_two_factor(&self, user_id: Uuid) -> Result<(Vec<String>, String)> {
        let ctx = RequestContext::default();
        let setup = self.services.two_factor.setup(&ctx, user_id).await?;
        let secret = setup.two_factor.secret.clone();
        let code = current_totp_code(&secret, self.config.app_name())?;
        self.services.two_factor.enable(&ctx, user_id, &code).await?;
        Ok((setup.backup_codes, secret))
    }

    async fn sign_in(&self, email: &str) -> Result<LoginOutcome> {
        Ok(self
            .services
            .session
            .sign_in(&RequestContext::default(), email, &password())
            .await?)
    }

    async fn active_session(&self, email: &str) -> Result<Session> {
        match self.sign_in(email).await? {
            LoginOutcome::Active(session) => Ok(session),
            LoginOutcome::TwoFactorPending(_) => {
                anyhow::bail!("expected an active session for {email}")
            }
        }
    }
}

async fn apply_schema(postgres: &PostgresContainer) -> Result<()> {
    let mut connection = PgConnection::connect(&postgres.admin_dsn())
        .await
        .context("failed to connect for schema setup")?;

    for (index, statement) in split_sql_statements(IDENTITY_SCHEMA_SQL).iter().enumerate() {
        sqlx::query(statement)
            .execute(&mut connection)
            .await
            .with_context(|| format!("failed to execute schema statement {}", index + 1))?;
    }

    Ok(())
}

fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        current.push_str(line);
        current.push('\n');

        if line.trim_end().ends_with(';') {
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let leftover = current.trim();
    if !leftover.is_empty() {
        statements.push(leftover.to_string());
    }

    statements
}

fn password() -> SecretString {
    SecretString::from(TEST_PASSWORD.to_string())
}

fn current_totp_code(secret: &str, app_name: &str) -> Result<String> {
    let totp = build_totp(secret, app_name)?;
    totp.generate_current().context("generate current code")
}

#[tokio::test]
async fn sixth_login_is_locked_out_even_with_the_right_password() -> Result<()> {
    let Ok(ctx) = TestContext::new().await else {
        return Ok(());
    };
    ctx.seed_verified_user("locked@example.com").await?;
    let request = RequestContext::default();
    let wrong = SecretString::from("not-the-password".to_string());

    for _ in 0..5 {
        let err = ctx
            .services
            .session
            .sign_in(&request, "locked@example.com", &wrong)
            .await
            .expect_err("wrong password must fail");
        assert_eq!(err.code(), ErrorCode::InvalidCredentials);
    }

    let err = ctx
        .services
        .session
        .sign_in(&request, "locked@example.com", &password())
        .await
        .expect_err("lockout must precede the password check");
    assert_eq!(err.code(), ErrorCode::AccountLocked);
    Ok(())
}

#[tokio::test]
async fn refresh_token_works_at_most_once() -> Result<()> {
    let Ok(ctx) = TestContext::new().await else {
        return Ok(());
    };
    ctx.seed_verified_user("refresh@example.com").await?;
    let request = RequestContext::default();
    let old = ctx.active_session("refresh@example.com").await?;

    let rotated = ctx
        .services
        .session
        .refresh(&request, &old.refresh_token)
        .await?;
    assert_ne!(rotated.token, old.token);
    assert_ne!(rotated.refresh_token, old.refresh_token);

    let err = ctx
        .services
        .session
        .refresh(&request, &old.refresh_token)
        .await
        .expect_err("replayed refresh token must fail");
    assert_eq!(err.code(), ErrorCode::InvalidRefreshToken);

    let err = ctx
        .services
        .session
        .get_by_token(&request, &old.token)
        .await
        .expect_err("rotated-away access token must fail");
    assert_eq!(err.code(), ErrorCode::Unauthenticated);
    Ok(())
}

#[tokio::test]
async fn backup_code_is_consumed_on_first_use() -> Result<()> {
    let Ok(ctx) = TestContext::new().await else {
        return Ok(());
    };
    let user = ctx.seed_verified_user("backup@example.com").await?;
    let (backup_codes, _) = ctx.enroll_two_factor(user.id).await?;
    let request = RequestContext::default();
    let code = backup_codes.first().context("no backup codes issued")?;

    ctx.services
        .two_factor
        .verify(&request, user.id, code)
        .await?;

    let err = ctx
        .services
        .two_factor
        .verify(&request, user.id, code)
        .await
        .expect_err("a spent backup code must be rejected");
    assert_eq!(err.code(), ErrorCode::InvalidTwoFactorCode);
    Ok(())
}

#[tokio::test]
async fn completing_the_challenge_replaces_the_pending_session() -> Result<()> {
    let Ok(ctx) = TestContext::new().await else {
        return Ok(());
    };
    let user = ctx.seed_verified_user("challenge@example.com").await?;
    let (_, secret) = ctx.enroll_two_factor(user.id).await?;
    let request = RequestContext::default();

    let outcome = ctx.sign_in("challenge@example.com").await?;
    assert!(outcome.is_pending());
    let pending_token = outcome.session().token.clone();

    let code = current_totp_code(&secret, ctx.config.app_name())?;
    ctx.services
        .two_factor
        .verify(&request, user.id, &code)
        .await?;
    let activated = ctx
        .services
        .session
        .activate_pending(&request, &pending_token)
        .await?;

    assert!(!activated.is_two_factor_pending);
    assert_ne!(activated.token, pending_token);

    let err = ctx
        .services
        .session
        .get_by_token(&request, &pending_token)
        .await
        .expect_err("the pending session must be gone after activation");
    assert_eq!(err.code(), ErrorCode::Unauthenticated);
    Ok(())
}

#[tokio::test]
async fn pending_session_cookie_reads_as_unauthenticated() -> Result<()> {
    let Ok(ctx) = TestContext::new().await else {
        return Ok(());
    };
    let user = ctx.seed_verified_user("pending@example.com").await?;
    ctx.enroll_two_factor(user.id).await?;

    let outcome = ctx.sign_in("pending@example.com").await?;
    assert!(outcome.is_pending());

    let state = AppState {
        services: ctx.services.clone(),
        config: ctx.config.clone(),
    };
    let mut headers = HeaderMap::new();
    headers.insert(
        COOKIE,
        HeaderValue::from_str(&format!("session={}", outcome.session().token))
            .context("cookie header")?,
    );

    let err = require_session(&state, &headers, &RequestContext::default())
        .await
        .expect_err("a pending cookie must not authenticate");
    assert_eq!(err.code(), ErrorCode::Unauthenticated);
    Ok(())
}

#[tokio::test]
async fn membership_role_comes_from_the_nearest_ancestor() -> Result<()> {
    let Ok(ctx) = TestContext::new().await else {
        return Ok(());
    };
    ctx.seed_verified_user("owner@example.com").await?;
    let member = ctx.seed_verified_user("member@example.com").await?;
    let owner = ctx.active_session("owner@example.com").await?;

    let root = ctx
        .services
        .entity
        .create(&owner, "Acme", "acme", EntityType::Organization, None)
        .await?;
    let child = ctx
        .services
        .entity
        .create(&owner, "Billing", "billing", EntityType::Account, Some(root.id))
        .await?;

    ctx.services
        .entity
        .add_member(&owner, root.id, member.id, Role::Viewer)
        .await?;

    let effective = ctx.services.entity.memberships_effective(member.id).await?;
    let on_child = effective
        .iter()
        .find(|membership| membership.entity_id == child.id)
        .context("grant on the root must reach the child")?;
    assert_eq!(on_child.role, Role::Viewer);

    // A direct grant on the child shadows the inherited one.
    ctx.services
        .entity
        .add_member(&owner, child.id, member.id, Role::Admin)
        .await?;
    let effective = ctx.services.entity.memberships_effective(member.id).await?;
    let on_child = effective
        .iter()
        .find(|membership| membership.entity_id == child.id)
        .context("direct grant on the child missing")?;
    assert_eq!(on_child.role, Role::Admin);
    let on_root = effective
        .iter()
        .find(|membership| membership.entity_id == root.id)
        .context("grant on the root missing")?;
    assert_eq!(on_root.role, Role::Viewer);
    Ok(())
}

#[tokio::test]
async fn slug_lookup_honors_the_entity_type() -> Result<()> {
    let Ok(ctx) = TestContext::new().await else {
        return Ok(());
    };
    ctx.seed_verified_user("slugs@example.com").await?;
    let caller = ctx.active_session("slugs@example.com").await?;

    let organization = ctx
        .services
        .entity
        .create(&caller, "Shared", "shared", EntityType::Organization, None)
        .await?;
    let account = ctx
        .services
        .entity
        .create(&caller, "Shared", "shared", EntityType::Account, None)
        .await?;

    let found = ctx
        .services
        .entity
        .get("shared", Some(EntityType::Account))
        .await?;
    assert_eq!(found.id, account.id);

    let found = ctx
        .services
        .entity
        .get("shared", Some(EntityType::Organization))
        .await?;
    assert_eq!(found.id, organization.id);

    // Untyped lookups fall back to the oldest entity with that slug.
    let found = ctx.services.entity.get("shared", None).await?;
    assert_eq!(found.id, organization.id);
    Ok(())
}
