//! # moc
//!
//! Message operation center: a small JSON service for short operator
//! messages, built on a hand-sized dispatch core over hyper.
//!
//! ## The contract
//!
//! Every request gets exactly one response. Success or failure, panic or
//! not, the client receives either the handler's response or a JSON error
//! envelope with the right status code, and every routed response carries the
//! request's `X-Request-ID`.
//!
//! What the core owns:
//!
//! - Radix-tree routing: one [`matchit`] tree per method, nested scopes with
//!   inherited middleware, frozen into a [`RouteTree`] before serving
//! - Middleware chains: strictly sequential, first error aborts
//! - A typed [`RequestContext`]: no string-keyed lookups
//! - One error envelope: [`HttpError`], written once by [`handle_error`]
//! - Panic recovery: a per-request guard that still answers with a 500
//!
//! What it leaves to collaborators: storage ([`store`]), payload validation
//! ([`models`]) and process bootstrap (`main.rs`, [`config`]).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use moc::api::Api;
//! use moc::store::MemoryStore;
//! use moc::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), moc::Error> {
//!     let api = Api::new(Arc::new(MemoryStore::new()), "operator-secret");
//!     let dispatcher = api.into_dispatcher()?;
//!
//!     Server::bind("0.0.0.0:3000".parse().unwrap()).serve(dispatcher).await
//! }
//! ```

mod context;
mod cors;
mod dispatch;
mod error;
mod handler;
mod http_error;
mod request;
mod response;
mod router;
mod server;

pub mod api;
pub mod config;
pub mod health;
pub mod middleware;
pub mod models;
pub mod recovery;
pub mod store;

pub use context::RequestContext;
pub use cors::Cors;
pub use dispatch::Dispatcher;
pub use error::Error;
pub use handler::{BoxFuture, Middleware, Terminal};
pub use http_error::{BoxError, HttpError, handle_error};
pub use request::Request;
pub use response::{Response, ResponseBuilder, send_json};
pub use router::{RouteError, RouteTree, Router};
pub use server::Server;
