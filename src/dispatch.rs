//! Request dispatch: one `http::Request` in, exactly one `http::Response` out.
//!
//! ```text
//! preflight? ──yes──▶ 204
//!     │no
//!     ▼
//! RequestContext::new ─▶ guard( root chain ─▶ lookup ─▶ route chain ─▶ terminal )
//!                              │ Err(HttpError)          │ panic
//!                              ▼                         ▼
//!                         handle_error               recover
//!     ▼
//! X-Request-ID + CORS headers ─▶ hyper
//! ```
//!
//! The dispatcher is transport-agnostic: the server feeds it hyper requests
//! and tests feed it `http::Request<Full<Bytes>>` directly.

use std::sync::Arc;

use bytes::Bytes;
use http::header::{ALLOW, ORIGIN};
use http::HeaderValue;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;

use crate::context::RequestContext;
use crate::cors::Cors;
use crate::http_error::{BoxError, HttpError, handle_error};
use crate::middleware::REQUEST_ID_HEADER;
use crate::recovery;
use crate::request::Request;
use crate::response::Response;
use crate::router::{Lookup, RouteTree};

/// The frozen route tree plus the state handed to every handler.
pub struct Dispatcher<S> {
    tree: RouteTree<S>,
    state: Arc<S>,
    cors: Option<Cors>,
}

impl<S: Send + Sync + 'static> Dispatcher<S> {
    pub fn new(tree: RouteTree<S>, state: Arc<S>) -> Self {
        Self { tree, state, cors: None }
    }

    pub fn with_cors(mut self, cors: Cors) -> Self {
        self.cors = Some(cors);
        self
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    /// Produces the response for `req`. Never fails and never panics out.
    pub async fn dispatch<B>(&self, req: http::Request<B>) -> http::Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        if let Some(preflight) = self.cors.as_ref().and_then(|c| c.preflight(&req)) {
            return preflight.into_inner();
        }

        let origin = req.headers().get(ORIGIN).cloned();
        let (parts, body) = req.into_parts();
        let body: Result<Bytes, BoxError> = body.collect().await.map(|c| c.to_bytes()).map_err(Into::into);
        let req = Request::new(parts, body.as_ref().map(Bytes::clone).unwrap_or_default());

        let mut ctx = RequestContext::new();
        let outcome = recovery::guard(self.run(req, body.err(), &mut ctx)).await;
        let mut res = match outcome {
            Ok(Ok(res)) => res,
            Ok(Err(err)) => handle_error(err, &ctx),
            Err(panic) => recovery::recover(panic, &ctx),
        };

        if let Some(id) = ctx.request_id().and_then(|id| HeaderValue::from_str(id).ok()) {
            res.headers_mut().insert(REQUEST_ID_HEADER, id);
        }
        if let Some(cors) = &self.cors {
            cors.decorate(origin.as_ref(), res.headers_mut());
        }
        res.into_inner()
    }

    async fn run(
        &self,
        mut req: Request,
        body_error: Option<BoxError>,
        ctx: &mut RequestContext,
    ) -> Result<Response, HttpError> {
        let state = &*self.state;

        for m in &self.tree.global {
            m.call(state, &req, ctx).await?;
        }
        if let Some(e) = body_error {
            return Err(HttpError::bad_request("bad payload").with_internal_error(e));
        }

        match self.tree.lookup(req.method(), req.path()) {
            Lookup::Found(route, params) => {
                req.set_params(params);
                for m in &route.chain {
                    m.call(state, &req, ctx).await?;
                }
                route.terminal.call(state, &req, ctx).await
            }
            Lookup::MethodNotAllowed(allowed) => {
                let allowed = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
                let err = HttpError::method_not_allowed("method not allowed");
                Err(match HeaderValue::from_str(&allowed) {
                    Ok(v) => err.with_header(ALLOW, v),
                    Err(_) => err,
                })
            }
            Lookup::NotFound => Err(HttpError::not_found("not found")),
        }
    }
}
