use chrono::Utc;
use http::header::HOST;
use tracing::field::Empty;
use tracing::info_span;

use crate::{BoxFuture, HttpError, Request, RequestContext};

/// Binds the request logger.
///
/// Creates an `INFO` span named `request` carrying `ts` (RFC 1123, UTC),
/// `req_id` and the full request `uri`. Handlers log through it with
/// `parent: ctx.logger()`.
pub fn with_logger<'a, S>(
    _: &'a S,
    req: &'a Request,
    ctx: &'a mut RequestContext,
) -> BoxFuture<'a, Result<(), HttpError>> {
    Box::pin(async move {
        let ts = Utc::now().format("%a, %d %b %Y %H:%M:%S UTC");
        let span = info_span!("request", ts = %ts, req_id = Empty, uri = %full_uri(req));
        if let Some(id) = ctx.request_id() {
            span.record("req_id", id);
        }
        ctx.set_logger(span);
        Ok(())
    })
}

fn full_uri(req: &Request) -> String {
    let uri = req.uri();
    let scheme = req
        .header("x-forwarded-proto")
        .or(uri.scheme_str())
        .unwrap_or("http");
    let host = req
        .header(HOST.as_str())
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or_default();
    let path = uri.path_and_query().map_or("/", |pq| pq.as_str());
    format!("{scheme}://{host}{path}")
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn request(uri: &str, headers: &[(&str, &str)]) -> Request {
        let mut builder = http::Request::builder().uri(uri);
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(Bytes::new()).unwrap().into()
    }

    #[test]
    fn uri_uses_host_header_and_query() {
        let req = request("/messages?limit=5", &[("host", "moc.local:8080")]);
        assert_eq!(full_uri(&req), "http://moc.local:8080/messages?limit=5");
    }

    #[test]
    fn forwarded_proto_wins() {
        let req = request("/messages", &[("host", "moc.example"), ("x-forwarded-proto", "https")]);
        assert_eq!(full_uri(&req), "https://moc.example/messages");
    }

    #[test]
    fn absolute_form_uri_is_used_as_is() {
        let req = request("https://moc.example/healthz", &[]);
        assert_eq!(full_uri(&req), "https://moc.example/healthz");
    }

    #[tokio::test]
    async fn binds_logger_once() {
        let req = request("/", &[]);
        let mut ctx = RequestContext::new();
        ctx.set_request_id("abc-123");

        with_logger(&(), &req, &mut ctx).await.unwrap();
        assert!(ctx.try_logger().is_some());
    }
}
