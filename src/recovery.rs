//! Panic recovery.
//!
//! A panic inside a middleware or a handler must still produce exactly one
//! well-formed response. [`guard`] polls the request future under
//! `catch_unwind`; [`recover`] turns a caught panic into the generic 500
//! envelope and logs it with the panic site.
//!
//! The payload `catch_unwind` hands back has lost the location and the stack.
//! [`install_panic_hook`] recovers them: while a guarded future is being
//! polled on this thread the hook records the location and a backtrace in a
//! thread-local instead of printing, and [`guard`] collects them. Panics
//! anywhere else still go to the previous hook.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::{Future, poll_fn};
use std::panic::{self, AssertUnwindSafe};
use std::pin::pin;
use std::sync::Once;

use futures_util::FutureExt;
use tracing::error;

use crate::context::RequestContext;
use crate::http_error::{HttpError, handle_error};
use crate::response::Response;

thread_local! {
    static GUARDED: Cell<bool> = const { Cell::new(false) };
    static LAST_PANIC: RefCell<Option<Report>> = const { RefCell::new(None) };
}

struct Report {
    location: String,
    backtrace: Backtrace,
}

/// A panic caught by [`guard`].
#[derive(Debug)]
pub struct Panic {
    pub message: String,
    pub location: Option<String>,
    pub backtrace: Option<String>,
}

/// Installs the process panic hook that feeds [`guard`]. Idempotent.
pub fn install_panic_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if GUARDED.with(Cell::get) {
                let report = Report {
                    location: info
                        .location()
                        .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
                        .unwrap_or_else(|| "<unknown>".to_owned()),
                    backtrace: Backtrace::force_capture(),
                };
                LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(report));
            } else {
                previous(info);
            }
        }));
    });
}

/// Marks the current thread as running guarded code until dropped.
struct Scope {
    was: bool,
}

impl Scope {
    fn enter() -> Self {
        Self { was: GUARDED.with(|g| g.replace(true)) }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        GUARDED.with(|g| g.set(self.was));
    }
}

/// Drives `fut` to completion, converting a panic into [`Panic`].
///
/// The guarded flag is raised for each poll rather than for the lifetime of
/// the future, since a task may be polled on a different worker thread each
/// time.
pub async fn guard<F: Future>(fut: F) -> Result<F::Output, Panic> {
    let mut fut = pin!(fut);
    let scoped = poll_fn(move |cx| {
        let _scope = Scope::enter();
        fut.as_mut().poll(cx)
    });

    AssertUnwindSafe(scoped).catch_unwind().await.map_err(|payload| {
        let report = LAST_PANIC.with(|slot| slot.borrow_mut().take());
        Panic {
            message: payload_message(payload.as_ref()),
            location: report.as_ref().map(|r| r.location.clone()),
            backtrace: report.map(|r| r.backtrace.to_string()),
        }
    })
}

fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_owned()
    }
}

/// Logs a caught panic and produces the request's 500 response.
///
/// The log event goes under the request logger when the chain got far
/// enough to bind one; otherwise it is emitted at the top level with the
/// request id, if that much is known.
pub fn recover(panic: Panic, ctx: &RequestContext) -> Response {
    let location = panic.location.as_deref().unwrap_or("<unknown>");
    let trace = panic.backtrace.as_deref().unwrap_or("");

    match ctx.try_logger() {
        Some(span) => error!(parent: span, location, trace, "panic: {}", panic.message),
        None => error!(req_id = ?ctx.request_id(), location, trace, "panic: {}", panic.message),
    }

    let err = HttpError::internal_server_error("Internal Server Error")
        .with_internal_message(format!("panic: {}", panic.message));
    handle_error(err, ctx)
}
