//! The message service's HTTP surface.
//!
//! | Verb | Path | Middleware (after root) |
//! |---|---|---|
//! | GET | `/messages` | |
//! | POST | `/messages` | |
//! | GET | `/messages/{messageID}` | `with_message` |
//! | DELETE | `/messages/{messageID}` | `with_message` |
//! | GET | `/healthz`, `/readyz` | |
//!
//! Root middleware, in order: `with_request_id`, `with_logger`,
//! `with_token`. It runs for unmatched requests too, so 404 and 405
//! responses are correlated and logged like any other.

mod messages;

use std::sync::Arc;

use crate::cors::Cors;
use crate::dispatch::Dispatcher;
use crate::health;
use crate::middleware::{OperatorToken, with_logger, with_request_id, with_token};
use crate::router::{RouteError, Router};
use crate::store::Store;

/// Application state shared by every request.
pub struct Api {
    store: Arc<dyn Store>,
    operator_token: String,
}

impl Api {
    pub fn new(store: Arc<dyn Store>, operator_token: impl Into<String>) -> Self {
        Self { store, operator_token: operator_token.into() }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// The route table.
    pub fn routes() -> Router<Api> {
        Router::new()
            .middleware(with_request_id::<Api>)
            .middleware(with_logger::<Api>)
            .middleware(with_token::<Api>)
            .route("/messages", |r| {
                r.get("/", messages::list)
                    .post("/", messages::create)
                    .route("/{messageID}", |r| {
                        r.middleware(messages::with_message).get("/", messages::get).delete("/", messages::delete)
                    })
            })
            .get("/healthz", health::liveness::<Api>)
            .get("/readyz", health::readiness)
    }

    /// Freezes the routes into a CORS-enabled dispatcher over this state.
    pub fn into_dispatcher(self) -> Result<Dispatcher<Api>, RouteError> {
        let tree = Self::routes().build()?;
        Ok(Dispatcher::new(tree, Arc::new(self)).with_cors(Cors::default()))
    }
}

impl OperatorToken for Api {
    fn operator_token(&self) -> &str {
        &self.operator_token
    }
}
