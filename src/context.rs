//! Per-request metadata carried into the service layer.

use axum::http::HeaderMap;
use uuid::Uuid;

/// Header set by the frontend to select which entity a request acts on.
pub const ENTITY_HEADER: &str = "x-entity-id";

/// Client metadata extracted from request headers, recorded on sessions and
/// audit entries.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub ip_address: Option<String>,
    pub country: Option<String>,
    pub user_agent: Option<String>,
    pub locale: Option<String>,
    pub active_entity_id: Option<Uuid>,
}

impl RequestContext {
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            ip_address: extract_client_ip(headers),
            country: header_string(headers, "cf-ipcountry"),
            user_agent: header_string(headers, "user-agent"),
            locale: header_string(headers, "accept-language")
                .and_then(|value| value.split(',').next().map(str::to_string)),
            active_entity_id: header_string(headers, ENTITY_HEADER)
                .and_then(|value| Uuid::parse_str(&value).ok()),
        }
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Prefer the first hop of `x-forwarded-for`, then `x-real-ip`. Behind the
/// edge proxy one of these is always present.
fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = header_string(headers, "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
    }
    header_string(headers, "x-real-ip")
}

#[cfg(test)]
mod tests {
    use super::{RequestContext, ENTITY_HEADER};
    use axum::http::{HeaderMap, HeaderValue};
    use uuid::Uuid;

    #[test]
    fn forwarded_for_takes_the_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.1"));
        let ctx = RequestContext::from_headers(&headers);
        assert_eq!(ctx.ip_address.as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn real_ip_is_the_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        let ctx = RequestContext::from_headers(&headers);
        assert_eq!(ctx.ip_address.as_deref(), Some("198.51.100.4"));
    }

    #[test]
    fn entity_header_must_be_a_uuid() {
        let entity_id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            ENTITY_HEADER,
            HeaderValue::from_str(&entity_id.to_string()).unwrap(),
        );
        headers.insert("accept-language", HeaderValue::from_static("fr-CA,fr;q=0.9"));
        let ctx = RequestContext::from_headers(&headers);
        assert_eq!(ctx.active_entity_id, Some(entity_id));
        assert_eq!(ctx.locale.as_deref(), Some("fr-CA"));

        headers.insert(ENTITY_HEADER, HeaderValue::from_static("not-a-uuid"));
        let ctx = RequestContext::from_headers(&headers);
        assert_eq!(ctx.active_entity_id, None);
    }

    #[test]
    fn missing_headers_yield_defaults() {
        let ctx = RequestContext::from_headers(&HeaderMap::new());
        assert!(ctx.ip_address.is_none());
        assert!(ctx.user_agent.is_none());
        assert!(ctx.active_entity_id.is_none());
    }
}
