//! HTTP server wiring.

use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{delete, get, patch, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::mpsc};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;

pub mod handlers;
mod openapi;

pub use openapi::openapi;

use crate::{
    config::IdentityConfig,
    context::ENTITY_HEADER,
    jobs,
    mail::{spawn_outbox_worker, LogEmailSender, MailQueue, OutboxWorkerConfig},
    service::Services,
};
use handlers::AppState;

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn serve(
    port: u16,
    dsn: String,
    config: IdentityConfig,
    mut shutdown: mpsc::UnboundedReceiver<()>,
) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    // Background worker polls email_outbox (DB-backed queue) for pending rows,
    // delivers/logs them, and retries failures with exponential backoff.
    spawn_outbox_worker(
        pool.clone(),
        Arc::new(LogEmailSender),
        OutboxWorkerConfig::new(),
    );
    jobs::spawn_session_cleanup(pool.clone());

    let mail = MailQueue::new(pool.clone());
    let services = Services::new(pool.clone(), config.clone(), mail);
    let state = Arc::new(AppState {
        services,
        config: config.clone(),
    });

    let dashboard_origin = dashboard_origin(config.dashboard_url())?;
    let cors = CorsLayer::new()
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static(ENTITY_HEADER),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_origin(AllowOrigin::exact(dashboard_origin))
        .allow_credentials(true);

    let app = router()
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(state))
                .layer(Extension(pool)),
        );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown.recv().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

/// All documented routes.
#[must_use]
pub fn router() -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/identity/sign-up", post(handlers::user::sign_up))
        .route("/identity/sign-in", post(handlers::session::sign_in))
        .route("/identity/sign-out", post(handlers::session::sign_out))
        .route(
            "/identity/refresh-session",
            post(handlers::session::refresh),
        )
        .route(
            "/identity/me",
            get(handlers::user::me).patch(handlers::user::update_me),
        )
        .route(
            "/identity/verify-email",
            post(handlers::verification::verify_email),
        )
        .route(
            "/identity/forgot-password",
            post(handlers::password::forgot_password),
        )
        .route(
            "/identity/reset-password",
            post(handlers::password::reset_password),
        )
        .route(
            "/identity/password",
            post(handlers::password::update_password),
        )
        .route(
            "/identity/sessions",
            get(handlers::session::list_sessions)
                .delete(handlers::session::revoke_other_sessions),
        )
        .route(
            "/identity/sessions/:id",
            delete(handlers::session::revoke_session),
        )
        .route(
            "/identity/two-factor/setup",
            post(handlers::two_factor::setup),
        )
        .route(
            "/identity/two-factor/enable",
            post(handlers::two_factor::enable),
        )
        .route(
            "/identity/two-factor/disable",
            post(handlers::two_factor::disable),
        )
        .route(
            "/identity/two-factor/verify",
            post(handlers::two_factor::verify),
        )
        .route("/entities", post(handlers::entity::create_entity))
        // Single :id segment doubles as a slug for GET; extraction is positional.
        .route(
            "/entities/:id",
            get(handlers::entity::get_entity).patch(handlers::entity::update_entity),
        )
        .route(
            "/entities/:id/children",
            get(handlers::entity::get_children),
        )
        .route("/entities/:id/members", post(handlers::entity::add_member))
        .route(
            "/entities/:id/members/:user_id",
            patch(handlers::entity::change_member_role)
                .delete(handlers::entity::remove_member),
        )
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn dashboard_origin(dashboard_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(dashboard_url)
        .with_context(|| format!("Invalid dashboard URL: {dashboard_url}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Dashboard URL must include a valid host: {dashboard_url}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build dashboard origin header")
}
