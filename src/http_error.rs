//! The error envelope every failing request is answered with.
//!
//! Errors are translated into an [`HttpError`] once, where they are first
//! observed (a middleware or a terminal handler), and then travel unchanged
//! to [`handle_error`], the only place that turns them into a response.
//!
//! Wire shape:
//!
//! ```json
//! {"object":"error","code":500,"msg":"internal server error","json":null,"error_id":"<request id>"}
//! ```
//!
//! `error_id` is present only for server errors. The internal cause and the
//! internal message are for the log and never reach the body.

use std::error::Error as StdError;
use std::fmt;

use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use rusqlite::ffi::{SQLITE_CONSTRAINT_PRIMARYKEY, SQLITE_CONSTRAINT_UNIQUE};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{Span, error, info};

use crate::context::RequestContext;
use crate::response::Response;
use crate::store::StoreError;

/// Boxed error used as an internal cause.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// An error with an HTTP status, a client-facing message and optional
/// internal diagnostics.
#[derive(Debug, Serialize)]
pub struct HttpError {
    object: &'static str,
    code: u16,
    #[serde(rename = "msg")]
    message: String,
    json: Option<Value>,
    #[serde(skip)]
    internal_error: Option<BoxError>,
    #[serde(skip)]
    internal_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_id: Option<String>,
    #[serde(skip)]
    headers: HeaderMap,
}

impl HttpError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            object: "error",
            code: status.as_u16(),
            message: message.into(),
            json: None,
            internal_error: None,
            internal_message: None,
            error_id: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn unavailable_service(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    /// Attaches structured detail, serialized under `json`.
    pub fn with_json(mut self, detail: impl Into<Value>) -> Self {
        self.json = Some(detail.into());
        self
    }

    /// Attaches the underlying cause. Logged, never sent.
    pub fn with_internal_error(mut self, err: impl Into<BoxError>) -> Self {
        self.internal_error = Some(err.into());
        self
    }

    /// Attaches a diagnostic message. Logged, never sent.
    pub fn with_internal_message(mut self, message: impl Into<String>) -> Self {
        self.internal_message = Some(message.into());
        self
    }

    /// Adds a response header, e.g. `Allow` on a 405.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Maps a storage failure onto the taxonomy.
    ///
    /// Unique-key violations from any engine become `400 duplicate slug`;
    /// everything else becomes a generic 500. The storage error is kept as
    /// the internal cause in both cases.
    pub fn from_storage(err: StoreError) -> Self {
        if is_duplicate_key(&err) {
            return Self::bad_request("duplicate slug").with_internal_error(err);
        }
        Self::internal_server_error("internal server error").with_internal_error(err)
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn is_server_error(&self) -> bool {
        self.code >= 500
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn detail(&self) -> Option<&Value> {
        self.json.as_ref()
    }

    pub fn error_id(&self) -> Option<&str> {
        self.error_id.as_deref()
    }

    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.internal_message {
            Some(message) => f.write_str(message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

impl StdError for HttpError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.internal_error.as_deref().map(|e| e as &(dyn StdError + 'static))
    }
}

fn is_duplicate_key(err: &StoreError) -> bool {
    match err {
        StoreError::DuplicateKey(_) => true,
        StoreError::Sqlite(rusqlite::Error::SqliteFailure(failure, _)) => matches!(
            failure.extended_code,
            SQLITE_CONSTRAINT_UNIQUE | SQLITE_CONSTRAINT_PRIMARYKEY
        ),
        _ => false,
    }
}

// ── Response writing ──────────────────────────────────────────────────────────

/// Writes `err` as the request's response.
///
/// Server errors are stamped with the request id and logged at `ERROR`
/// together with their cause; client errors are logged at `INFO`. The log
/// event is parented to the request logger when one is bound.
pub fn handle_error(mut err: HttpError, ctx: &RequestContext) -> Response {
    if err.is_server_error() {
        err.error_id = ctx.request_id().map(str::to_owned);
    }

    let unbound = Span::none();
    let span = ctx.try_logger().unwrap_or(&unbound);
    let cause = err.internal_error.as_ref().map(ToString::to_string);

    if err.is_server_error() {
        error!(parent: span, code = err.code, req_id = ?ctx.request_id(), cause = ?cause, "{err}");
    } else {
        info!(parent: span, code = err.code, cause = ?cause, "{err}");
    }

    let mut response = match serde_json::to_vec(&err) {
        Ok(body) => Response::builder().status(err.status()).json(body),
        Err(encode_err) => {
            error!(parent: span, error = %encode_err, "error encoding error envelope");
            generic_response(ctx.request_id())
        }
    };
    response.headers_mut().extend(err.headers);
    response
}

/// The last-resort 500 envelope, used when the real one cannot be produced.
pub(crate) fn generic_response(request_id: Option<&str>) -> Response {
    let mut body = json!({
        "object": "error",
        "code": 500,
        "msg": "Internal server error",
        "json": null,
    });
    if let Some(id) = request_id {
        body["error_id"] = Value::from(id);
    }
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .json(body.to_string())
}
