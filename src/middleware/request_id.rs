use http::{HeaderMap, HeaderName, HeaderValue};
use uuid::Uuid;

use crate::{BoxFuture, HttpError, Request, RequestContext};

/// Correlation header, read from requests and stamped on every response.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Assigns the request its correlation id.
///
/// A non-empty incoming `X-Request-ID` is kept verbatim so ids survive a
/// proxy hop; anything else gets a fresh UUID v4.
pub fn with_request_id<'a, S>(
    _: &'a S,
    req: &'a Request,
    ctx: &'a mut RequestContext,
) -> BoxFuture<'a, Result<(), HttpError>> {
    Box::pin(async move {
        let id = match req.headers().get(REQUEST_ID_HEADER).and_then(incoming) {
            Some(id) => id.to_owned(),
            None => Uuid::new_v4().to_string(),
        };
        ctx.set_request_id(id);
        Ok(())
    })
}

/// Makes sure `headers` carries a usable `X-Request-ID` and returns it.
///
/// The server calls this before handing the request to its task, so the id
/// outlives a task that dies. [`with_request_id`] then finds it already in
/// place.
pub(crate) fn assign_request_id(headers: &mut HeaderMap) -> String {
    if let Some(id) = headers.get(REQUEST_ID_HEADER).and_then(incoming) {
        return id.to_owned();
    }
    let id = Uuid::new_v4().to_string();
    if let Ok(value) = HeaderValue::from_str(&id) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
    id
}

// Header values may carry any byte but the context id is a string.
fn incoming(value: &HeaderValue) -> Option<&str> {
    let id = std::str::from_utf8(value.as_bytes()).ok()?;
    (!id.is_empty()).then_some(id)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    async fn run(header: Option<&str>) -> RequestContext {
        let mut builder = http::Request::builder().uri("/");
        if let Some(h) = header {
            builder = builder.header(REQUEST_ID_HEADER, h);
        }
        let req: Request = builder.body(Bytes::new()).unwrap().into();
        let mut ctx = RequestContext::new();
        with_request_id(&(), &req, &mut ctx).await.unwrap();
        ctx
    }

    #[tokio::test]
    async fn incoming_id_is_kept() {
        let ctx = run(Some("abc-123")).await;
        assert_eq!(ctx.request_id(), Some("abc-123"));
    }

    #[tokio::test]
    async fn incoming_id_is_kept_whatever_its_length() {
        let long = "x".repeat(250);
        let ctx = run(Some(&long)).await;
        assert_eq!(ctx.request_id(), Some(long.as_str()));

        let ctx = run(Some("trace id/ü")).await;
        assert_eq!(ctx.request_id(), Some("trace id/ü"));
    }

    #[tokio::test]
    async fn missing_or_empty_id_is_generated() {
        for header in [None, Some("")] {
            let ctx = run(header).await;
            let id = ctx.request_id().unwrap();
            assert!(Uuid::parse_str(id).is_ok(), "not a uuid: {id}");
        }
    }

    #[test]
    fn assign_keeps_an_incoming_id() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("abc-123"));
        assert_eq!(assign_request_id(&mut headers), "abc-123");
        assert_eq!(headers[REQUEST_ID_HEADER], "abc-123");
    }

    #[test]
    fn assign_writes_a_fresh_id_back() {
        let mut headers = HeaderMap::new();
        let id = assign_request_id(&mut headers);
        assert!(Uuid::parse_str(&id).is_ok());
        assert_eq!(headers[REQUEST_ID_HEADER], id.as_str());

        // a later pass sees the same id
        assert_eq!(assign_request_id(&mut headers), id);
    }
}
