//! Built-in middleware.
//!
//! Every function here has the middleware shape and is generic over the
//! application state, so it can sit in any [`Router`](crate::Router)
//! scope:
//!
//! | Middleware | Effect on the context |
//! |---|---|
//! | [`with_request_id`] | sets the correlation id (incoming `X-Request-ID` or a fresh UUID) |
//! | [`with_logger`] | binds the request span `request{ts, req_id, uri}` |
//! | [`with_token`] | marks the caller as operator on a matching bearer token |
//! | [`auth_required`] | rejects non-operators with 401 |
//!
//! Order matters: the logger reads the request id, so `with_request_id` goes
//! first.

mod auth;
mod logger;
mod request_id;

pub use auth::{OperatorToken, auth_required, with_token};
pub use logger::with_logger;
pub use request_id::{REQUEST_ID_HEADER, with_request_id};
pub(crate) use request_id::assign_request_id;
