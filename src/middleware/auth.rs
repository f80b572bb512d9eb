use http::header::AUTHORIZATION;
use subtle::ConstantTimeEq;

use crate::{BoxFuture, HttpError, Request, RequestContext};

/// State that knows the operator token.
pub trait OperatorToken {
    /// The configured token; empty disables operator access.
    fn operator_token(&self) -> &str;
}

/// Marks the request as coming from the operator when it carries
/// `Authorization: Bearer <operator token>`.
///
/// Never rejects: a missing, malformed or wrong token just leaves the
/// marker unset, and [`auth_required`] decides later.
pub fn with_token<'a, S: OperatorToken + Sync>(
    state: &'a S,
    req: &'a Request,
    ctx: &'a mut RequestContext,
) -> BoxFuture<'a, Result<(), HttpError>> {
    Box::pin(async move {
        let expected = state.operator_token();
        if expected.is_empty() {
            return Ok(());
        }
        let Some(token) = req.header(AUTHORIZATION.as_str()).and_then(bearer) else {
            return Ok(());
        };
        if bool::from(token.as_bytes().ct_eq(expected.as_bytes())) {
            ctx.set_operator();
        }
        Ok(())
    })
}

/// Rejects the request with `401 Authorization error` unless
/// [`with_token`] marked it as operator.
pub fn auth_required<'a, S>(
    _: &'a S,
    _: &'a Request,
    ctx: &'a mut RequestContext,
) -> BoxFuture<'a, Result<(), HttpError>> {
    Box::pin(async move {
        if ctx.is_operator() {
            Ok(())
        } else {
            Err(HttpError::unauthorized("Authorization error"))
        }
    })
}

/// Extracts the token from `Bearer <token>` or `bearer <token>`.
fn bearer(header: &str) -> Option<&str> {
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))?;
    (!token.is_empty() && !token.contains(char::is_whitespace)).then_some(token)
}
