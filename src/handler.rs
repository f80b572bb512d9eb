//! Handler kinds and type erasure.
//!
//! # Two kinds of handler
//!
//! A route is a chain of **middleware** followed by one **terminal**:
//!
//! ```text
//! fn(&S, &Request, &mut RequestContext) -> BoxFuture<Result<(), HttpError>>       middleware
//! fn(&S, &Request, &RequestContext)     -> BoxFuture<Result<Response, HttpError>> terminal
//! ```
//!
//! Middleware may enrich the context or abort with an error. A terminal only
//! reads the context and returns either a complete response or an error; it
//! cannot do both, so there is no "wrote half a response, then failed" case
//! to handle downstream.
//!
//! # How they are stored
//!
//! The route tree holds handlers of many concrete types, so each one is
//! boxed behind a trait object once, at registration:
//!
//! ```text
//! fn create<'a>(api: &'a Api, …) -> BoxFuture<'a, …>    ← user writes this
//!        ↓ router.post("/", create)
//! create.into_boxed()                                   ← blanket impl
//!        ↓
//! Arc::new(FnTerminal(create))                          ← stored as BoxedTerminal<S>
//!        ↓
//! terminal.call(state, &req, &ctx)  at request time     ← one vtable dispatch
//! ```
//!
//! Handlers borrow the state, the request and the context for the duration
//! of the returned future, which is why the signature spells out `'a`
//! instead of returning a `'static` future.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::http_error::HttpError;
use crate::request::Request;
use crate::response::Response;

/// A heap-allocated, type-erased future borrowing from its caller for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ── Erased interfaces ─────────────────────────────────────────────────────────

#[doc(hidden)]
pub trait ErasedMiddleware<S>: Send + Sync {
    fn call<'a>(
        &'a self,
        state: &'a S,
        req: &'a Request,
        ctx: &'a mut RequestContext,
    ) -> BoxFuture<'a, Result<(), HttpError>>;
}

#[doc(hidden)]
pub trait ErasedTerminal<S>: Send + Sync {
    fn call<'a>(
        &'a self,
        state: &'a S,
        req: &'a Request,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Response, HttpError>>;
}

#[doc(hidden)]
pub type BoxedMiddleware<S> = Arc<dyn ErasedMiddleware<S> + Send + Sync + 'static>;

#[doc(hidden)]
pub type BoxedTerminal<S> = Arc<dyn ErasedTerminal<S> + Send + Sync + 'static>;

// ── Public traits ─────────────────────────────────────────────────────────────

/// Implemented for every function usable as middleware over state `S`.
///
/// Sealed: only the blanket impl below satisfies it.
///
/// ```rust
/// use moc::{BoxFuture, HttpError, Request, RequestContext};
///
/// fn require_json<'a, S>(
///     _: &'a S,
///     req: &'a Request,
///     _: &'a mut RequestContext,
/// ) -> BoxFuture<'a, Result<(), HttpError>> {
///     Box::pin(async move {
///         match req.header("content-type") {
///             Some("application/json") => Ok(()),
///             _ => Err(HttpError::bad_request("expected a JSON body")),
///         }
///     })
/// }
/// ```
pub trait Middleware<S>: private::SealedMiddleware<S> + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed(self) -> BoxedMiddleware<S>;
}

/// Implemented for every function usable as a terminal handler over state `S`.
///
/// Sealed: only the blanket impl below satisfies it.
pub trait Terminal<S>: private::SealedTerminal<S> + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed(self) -> BoxedTerminal<S>;
}

mod private {
    pub trait SealedMiddleware<S> {}
    pub trait SealedTerminal<S> {}
}

// ── Blanket implementations ───────────────────────────────────────────────────

impl<S, F> private::SealedMiddleware<S> for F where
    F: for<'a> Fn(&'a S, &'a Request, &'a mut RequestContext) -> BoxFuture<'a, Result<(), HttpError>>
        + Send
        + Sync
        + 'static
{
}

impl<S, F> Middleware<S> for F
where
    S: 'static,
    F: for<'a> Fn(&'a S, &'a Request, &'a mut RequestContext) -> BoxFuture<'a, Result<(), HttpError>>
        + Send
        + Sync
        + 'static,
{
    fn into_boxed(self) -> BoxedMiddleware<S> {
        Arc::new(FnMiddleware(self))
    }
}

impl<S, F> private::SealedTerminal<S> for F where
    F: for<'a> Fn(&'a S, &'a Request, &'a RequestContext) -> BoxFuture<'a, Result<Response, HttpError>>
        + Send
        + Sync
        + 'static
{
}

impl<S, F> Terminal<S> for F
where
    S: 'static,
    F: for<'a> Fn(&'a S, &'a Request, &'a RequestContext) -> BoxFuture<'a, Result<Response, HttpError>>
        + Send
        + Sync
        + 'static,
{
    fn into_boxed(self) -> BoxedTerminal<S> {
        Arc::new(FnTerminal(self))
    }
}

// ── Concrete wrappers ─────────────────────────────────────────────────────────

struct FnMiddleware<F>(F);

impl<S, F> ErasedMiddleware<S> for FnMiddleware<F>
where
    F: for<'a> Fn(&'a S, &'a Request, &'a mut RequestContext) -> BoxFuture<'a, Result<(), HttpError>>
        + Send
        + Sync,
{
    fn call<'a>(
        &'a self,
        state: &'a S,
        req: &'a Request,
        ctx: &'a mut RequestContext,
    ) -> BoxFuture<'a, Result<(), HttpError>> {
        (self.0)(state, req, ctx)
    }
}

struct FnTerminal<F>(F);

impl<S, F> ErasedTerminal<S> for FnTerminal<F>
where
    F: for<'a> Fn(&'a S, &'a Request, &'a RequestContext) -> BoxFuture<'a, Result<Response, HttpError>>
        + Send
        + Sync,
{
    fn call<'a>(
        &'a self,
        state: &'a S,
        req: &'a Request,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Response, HttpError>> {
        (self.0)(state, req, ctx)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    struct Counter(std::sync::atomic::AtomicUsize);

    fn bump<'a>(
        state: &'a Counter,
        _: &'a Request,
        ctx: &'a mut RequestContext,
    ) -> BoxFuture<'a, Result<(), HttpError>> {
        Box::pin(async move {
            state.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            ctx.set_request_id("from-middleware");
            Ok(())
        })
    }

    fn echo_id<'a>(
        _: &'a Counter,
        _: &'a Request,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Response, HttpError>> {
        Box::pin(async move { Ok(Response::text(ctx.request_id().unwrap_or_default().to_owned())) })
    }

    #[tokio::test]
    async fn boxed_functions_share_state_and_context() {
        let state = Counter(Default::default());
        let req: Request = http::Request::new(Bytes::new()).into();
        let mut ctx = RequestContext::new();

        let middleware: BoxedMiddleware<Counter> = Middleware::into_boxed(bump);
        let terminal: BoxedTerminal<Counter> = Terminal::into_boxed(echo_id);

        middleware.call(&state, &req, &mut ctx).await.unwrap();
        let res = terminal.call(&state, &req, &ctx).await.unwrap();

        assert_eq!(state.0.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(res.body(), b"from-middleware");
    }
}
