//! Kubernetes health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! Liveness has no dependencies. Readiness pings the store, so a pod whose
//! database went away stops receiving traffic without being restarted.

use tracing::warn;

use crate::api::Api;
use crate::{BoxFuture, HttpError, Request, RequestContext, Response};

/// Always `200 OK` with body `"ok"`.
pub fn liveness<'a, S>(
    _: &'a S,
    _: &'a Request,
    _: &'a RequestContext,
) -> BoxFuture<'a, Result<Response, HttpError>> {
    Box::pin(async { Ok(Response::text("ok")) })
}

/// `200 OK` with body `"ready"` while the store answers a ping, otherwise
/// `503 storage unavailable`.
pub fn readiness<'a>(
    api: &'a Api,
    _: &'a Request,
    ctx: &'a RequestContext,
) -> BoxFuture<'a, Result<Response, HttpError>> {
    Box::pin(async move {
        match api.store().ping().await {
            Ok(()) => Ok(Response::text("ready")),
            Err(e) => {
                if let Some(span) = ctx.try_logger() {
                    warn!(parent: span, error = %e, "readiness ping failed");
                }
                Err(HttpError::unavailable_service("storage unavailable").with_internal_error(e))
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::StatusCode;

    use super::*;

    #[tokio::test]
    async fn liveness_is_unconditional() {
        let req: Request = http::Request::new(Bytes::new()).into();
        let res = liveness(&(), &req, &RequestContext::new()).await.unwrap();
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), b"ok");
    }

    #[tokio::test]
    async fn readiness_follows_the_store() {
        let api = Api::new(std::sync::Arc::new(crate::store::MemoryStore::new()), "");
        let req: Request = http::Request::new(Bytes::new()).into();
        let res = readiness(&api, &req, &RequestContext::new()).await.unwrap();
        assert_eq!(res.body(), b"ready");

        // an unmigrated database still answers the ping
        let unmigrated = Api::new(std::sync::Arc::new(crate::store::SqliteStore::open_in_memory().unwrap()), "");
        assert!(readiness(&unmigrated, &req, &RequestContext::new()).await.is_ok());
    }
}
