//! Session cookie plumbing.

use anyhow::Context;
use axum::http::{
    header::{AUTHORIZATION, COOKIE, SET_COOKIE},
    HeaderMap, HeaderValue,
};
use chrono::Utc;

use crate::{config::IdentityConfig, error::Result, models::Session};

pub(crate) const SESSION_COOKIE_NAME: &str = "session";
pub(crate) const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Build a secure `HttpOnly` cookie; `Max-Age` mirrors the remaining TTL.
fn build_cookie(
    config: &IdentityConfig,
    name: &str,
    value: &str,
    max_age_seconds: i64,
) -> Result<HeaderValue> {
    let mut cookie =
        format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_seconds}");
    // Only mark cookies secure when the dashboard is served over HTTPS.
    if config.secure_cookies() {
        cookie.push_str("; Secure");
    }
    Ok(HeaderValue::from_str(&cookie).context("failed to build session cookie")?)
}

fn clear_cookie(config: &IdentityConfig, name: &str) -> Result<HeaderValue> {
    build_cookie(config, name, "", 0)
}

/// Set both cookies for a session; pending sessions naturally get the short
/// Max-Age because it mirrors `expires_at`.
pub(crate) fn set_session_cookies(
    headers: &mut HeaderMap,
    config: &IdentityConfig,
    session: &Session,
) -> Result<()> {
    let now = Utc::now();
    let session_age = (session.expires_at - now).num_seconds().max(0);
    let refresh_age = (session.refresh_expires_at - now).num_seconds().max(0);
    headers.append(
        SET_COOKIE,
        build_cookie(config, SESSION_COOKIE_NAME, &session.token, session_age)?,
    );
    headers.append(
        SET_COOKIE,
        build_cookie(
            config,
            REFRESH_COOKIE_NAME,
            &session.refresh_token,
            refresh_age,
        )?,
    );
    Ok(())
}

/// Expire both cookies (sign-out and failed two-factor verification).
pub(crate) fn clear_session_cookies(
    headers: &mut HeaderMap,
    config: &IdentityConfig,
) -> Result<()> {
    headers.append(SET_COOKIE, clear_cookie(config, SESSION_COOKIE_NAME)?);
    headers.append(SET_COOKIE, clear_cookie(config, REFRESH_COOKIE_NAME)?);
    Ok(())
}

/// Access token from the `session` cookie, or a bearer header for API
/// clients.
pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    cookie_value(headers, SESSION_COOKIE_NAME)
}

pub(crate) fn extract_refresh_token(headers: &HeaderMap) -> Option<String> {
    cookie_value(headers, REFRESH_COOKIE_NAME)
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let mut parts = pair.trim().splitn(2, '=');
        let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
            continue;
        };
        if key.trim() == name && !val.trim().is_empty() {
            return Some(val.trim().to_string());
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        clear_session_cookies, extract_refresh_token, extract_session_token, set_session_cookies,
    };
    use crate::{config::IdentityConfig, models::Session};
    use axum::http::{header::SET_COOKIE, HeaderMap, HeaderValue};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn session(pending: bool) -> Session {
        let now = Utc::now();
        let (expires, refresh) = if pending {
            (now + Duration::minutes(5), now + Duration::minutes(5))
        } else {
            (now + Duration::hours(24), now + Duration::days(30))
        };
        Session {
            id: Uuid::new_v4(),
            token: "access-token".to_string(),
            refresh_token: "refresh-token-value".to_string(),
            user_id: Uuid::new_v4(),
            expires_at: expires,
            refresh_expires_at: refresh,
            is_two_factor_pending: pending,
            ip_address: None,
            country: None,
            user_agent: None,
            created_at: now,
            updated_at: now,
            memberships: Vec::new(),
        }
    }

    #[test]
    fn cookies_carry_flags_and_ttl() {
        let config = IdentityConfig::new().with_dashboard_url("https://app.dev".to_string());
        let mut headers = HeaderMap::new();
        set_session_cookies(&mut headers, &config, &session(false)).unwrap();
        let cookies: Vec<_> = headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|value| value.to_str().unwrap().to_string())
            .collect();
        assert_eq!(cookies.len(), 2);
        assert!(cookies[0].starts_with("session=access-token;"));
        assert!(cookies[0].contains("HttpOnly"));
        assert!(cookies[0].contains("SameSite=Lax"));
        assert!(cookies[0].contains("Secure"));
        assert!(cookies[1].starts_with("refresh_token=refresh-token-value;"));
    }

    #[test]
    fn insecure_dashboard_drops_the_secure_flag() {
        let config = IdentityConfig::new().with_dashboard_url("http://localhost:3000".to_string());
        let mut headers = HeaderMap::new();
        set_session_cookies(&mut headers, &config, &session(false)).unwrap();
        for value in headers.get_all(SET_COOKIE) {
            assert!(!value.to_str().unwrap().contains("Secure"));
        }
    }

    #[test]
    fn pending_sessions_get_short_max_age() {
        let config = IdentityConfig::new();
        let mut headers = HeaderMap::new();
        set_session_cookies(&mut headers, &config, &session(true)).unwrap();
        let first = headers.get(SET_COOKIE).unwrap().to_str().unwrap();
        let max_age: i64 = first
            .split("Max-Age=")
            .nth(1)
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .parse()
            .unwrap();
        assert!(max_age <= 300);
    }

    #[test]
    fn clearing_sets_empty_values_and_zero_age() {
        let config = IdentityConfig::new();
        let mut headers = HeaderMap::new();
        clear_session_cookies(&mut headers, &config).unwrap();
        for value in headers.get_all(SET_COOKIE) {
            let cookie = value.to_str().unwrap();
            assert!(cookie.contains("=; "));
            assert!(cookie.contains("Max-Age=0"));
        }
    }

    #[test]
    fn token_extraction_prefers_bearer_then_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("session=from-cookie; refresh_token=refresh-value"),
        );
        assert_eq!(
            extract_session_token(&headers).as_deref(),
            Some("from-cookie")
        );
        assert_eq!(
            extract_refresh_token(&headers).as_deref(),
            Some("refresh-value")
        );

        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );
        assert_eq!(
            extract_session_token(&headers).as_deref(),
            Some("from-header")
        );
    }

    #[test]
    fn malformed_cookie_pairs_are_skipped() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("flag; session=; other; session=real-token"),
        );
        assert_eq!(
            extract_session_token(&headers).as_deref(),
            Some("real-token")
        );
        assert_eq!(extract_refresh_token(&headers), None);
    }
}
