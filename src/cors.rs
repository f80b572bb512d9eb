//! Cross-origin resource sharing.
//!
//! Preflights are answered by the dispatcher before any middleware runs;
//! every other response leaving the dispatcher is decorated with the
//! allow-origin headers when the request carried an `Origin`.
//!
//! Credentials are allowed, which rules out `Access-Control-Allow-Origin: *`,
//! so the request origin is echoed back and `Vary: Origin` keeps caches
//! honest.

use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_REQUEST_HEADERS,
    ACCESS_CONTROL_REQUEST_METHOD, ACCEPT, AUTHORIZATION, CONTENT_TYPE, LINK, ORIGIN, VARY,
};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};

use crate::middleware::REQUEST_ID_HEADER;
use crate::response::Response;

/// CORS policy applied to every response.
#[derive(Debug, Clone)]
pub struct Cors {
    methods: Vec<Method>,
    headers: Vec<HeaderName>,
    exposed: Vec<HeaderName>,
    credentials: bool,
}

impl Default for Cors {
    fn default() -> Self {
        Self {
            methods: vec![
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ],
            headers: vec![ACCEPT, AUTHORIZATION, CONTENT_TYPE, REQUEST_ID_HEADER],
            exposed: vec![LINK, HeaderName::from_static("x-total-count"), REQUEST_ID_HEADER],
            credentials: true,
        }
    }
}

impl Cors {
    /// Answers a preflight, or returns `None` if `req` is not one.
    ///
    /// A preflight is an `OPTIONS` request with both `Origin` and
    /// `Access-Control-Request-Method`. It is always answered with
    /// `204 No Content`; the allow headers are only present when the
    /// requested method and headers pass the policy.
    pub fn preflight<B>(&self, req: &http::Request<B>) -> Option<Response> {
        if req.method() != Method::OPTIONS {
            return None;
        }
        let origin = req.headers().get(ORIGIN)?;
        let requested = req.headers().get(ACCESS_CONTROL_REQUEST_METHOD)?;

        let mut res = Response::status(StatusCode::NO_CONTENT);
        let headers = res.headers_mut();
        for vary in [ORIGIN, ACCESS_CONTROL_REQUEST_METHOD, ACCESS_CONTROL_REQUEST_HEADERS] {
            headers.append(VARY, HeaderValue::from_name(vary));
        }

        let method_ok = Method::from_bytes(requested.as_bytes())
            .is_ok_and(|m| m == Method::OPTIONS || self.methods.contains(&m));
        let requested_headers = req.headers().get(ACCESS_CONTROL_REQUEST_HEADERS);
        let headers_ok = requested_headers.is_none_or(|v| self.headers_allowed(v));
        if !method_ok || !headers_ok {
            return Some(res);
        }

        let headers = res.headers_mut();
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, requested.clone());
        if let Some(v) = requested_headers {
            headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, v.clone());
        }
        if self.credentials {
            headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
        Some(res)
    }

    /// Adds the actual-request CORS headers to an outgoing response.
    pub fn decorate(&self, origin: Option<&HeaderValue>, headers: &mut HeaderMap) {
        headers.append(VARY, HeaderValue::from_name(ORIGIN));
        let Some(origin) = origin else { return };

        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
        if self.credentials {
            headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
        let exposed = self.exposed.iter().map(HeaderName::as_str).collect::<Vec<_>>().join(", ");
        if let Ok(v) = HeaderValue::from_str(&exposed) {
            headers.insert(ACCESS_CONTROL_EXPOSE_HEADERS, v);
        }
    }

    fn headers_allowed(&self, requested: &HeaderValue) -> bool {
        let Ok(list) = requested.to_str() else { return false };
        list.split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .all(|h| {
                h.eq_ignore_ascii_case(ORIGIN.as_str())
                    || self.headers.iter().any(|allowed| h.eq_ignore_ascii_case(allowed.as_str()))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preflight(method: &str, headers: Option<&str>) -> http::Request<()> {
        let mut req = http::Request::builder()
            .method(Method::OPTIONS)
            .uri("/messages")
            .header(ORIGIN, "https://ops.example.org")
            .header(ACCESS_CONTROL_REQUEST_METHOD, method);
        if let Some(h) = headers {
            req = req.header(ACCESS_CONTROL_REQUEST_HEADERS, h);
        }
        req.body(()).unwrap()
    }

    #[test]
    fn allowed_preflight_echoes_origin() {
        let res = Cors::default().preflight(&preflight("DELETE", Some("authorization, x-request-id"))).unwrap();

        assert_eq!(res.status_code(), StatusCode::NO_CONTENT);
        let h = res.headers();
        assert_eq!(h[ACCESS_CONTROL_ALLOW_ORIGIN], "https://ops.example.org");
        assert_eq!(h[ACCESS_CONTROL_ALLOW_METHODS], "DELETE");
        assert_eq!(h[ACCESS_CONTROL_ALLOW_HEADERS], "authorization, x-request-id");
        assert_eq!(h[ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }

    #[test]
    fn disallowed_preflight_has_no_allow_headers() {
        let cors = Cors::default();

        let res = cors.preflight(&preflight("TRACE", None)).unwrap();
        assert!(res.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());

        let res = cors.preflight(&preflight("GET", Some("x-secret"))).unwrap();
        assert!(res.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
        assert_eq!(res.status_code(), StatusCode::NO_CONTENT);
    }

    #[test]
    fn plain_options_is_not_a_preflight() {
        let req = http::Request::builder().method(Method::OPTIONS).uri("/").body(()).unwrap();
        assert!(Cors::default().preflight(&req).is_none());
    }

    #[test]
    fn decorate_exposes_headers_only_with_origin() {
        let cors = Cors::default();

        let mut headers = HeaderMap::new();
        cors.decorate(None, &mut headers);
        assert!(headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
        assert_eq!(headers[VARY], "origin");

        let mut headers = HeaderMap::new();
        cors.decorate(Some(&HeaderValue::from_static("https://a.example")), &mut headers);
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "https://a.example");
        assert_eq!(headers[ACCESS_CONTROL_EXPOSE_HEADERS], "link, x-total-count, x-request-id");
    }
}
