//! Request-scoped state.
//!
//! The dispatcher creates one [`RequestContext`] per inbound request and drops
//! it once the response exists. Middleware fills it in, in chain order; the
//! terminal handler, the error writer and the recovery guard read it. It is
//! never shared between requests, so nothing here needs a lock.

use tracing::Span;

use crate::models::Message;

/// Typed per-request state threaded through the middleware chain.
///
/// Updates are additive. The request id and the logger keep the first value
/// they are given; later writes are ignored so no stage can re-label a
/// request halfway through.
#[derive(Debug, Default)]
pub struct RequestContext {
    request_id: Option<String>,
    logger: Option<Span>,
    operator: bool,
    message: Option<Message>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// The correlation id, once the request-id middleware has run.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn set_request_id(&mut self, id: impl Into<String>) {
        if self.request_id.is_none() {
            self.request_id = Some(id.into());
        }
    }

    /// The request logger.
    ///
    /// # Panics
    ///
    /// Panics if the logger middleware has not run yet. Every route installs
    /// it at the root of the chain, so reaching this panic means the chain was
    /// assembled wrongly, not that the request was bad.
    pub fn logger(&self) -> &Span {
        self.logger
            .as_ref()
            .expect("request logger read before the logger middleware ran")
    }

    /// The request logger, if one is bound.
    pub fn try_logger(&self) -> Option<&Span> {
        self.logger.as_ref()
    }

    pub fn set_logger(&mut self, span: Span) {
        if self.logger.is_none() {
            self.logger = Some(span);
        }
    }

    /// Whether the caller presented the operator token.
    pub fn is_operator(&self) -> bool {
        self.operator
    }

    pub fn set_operator(&mut self) {
        self.operator = true;
    }

    /// The message resolved from the path, if a loader ran.
    pub fn message(&self) -> Option<&Message> {
        self.message.as_ref()
    }

    pub fn set_message(&mut self, message: Message) {
        self.message = Some(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_is_empty() {
        let ctx = RequestContext::new();
        assert_eq!(ctx.request_id(), None);
        assert!(ctx.try_logger().is_none());
        assert!(!ctx.is_operator());
        assert!(ctx.message().is_none());
    }

    #[test]
    fn request_id_is_set_once() {
        let mut ctx = RequestContext::new();
        ctx.set_request_id("first");
        ctx.set_request_id("second");
        assert_eq!(ctx.request_id(), Some("first"));
    }

    #[test]
    fn message_can_be_replaced() {
        let mut ctx = RequestContext::new();
        ctx.set_message(Message::new("one"));
        ctx.set_message(Message::new("two"));
        assert_eq!(ctx.message().map(|m| m.text.as_str()), Some("two"));
    }

    #[test]
    #[should_panic(expected = "logger middleware")]
    fn logger_before_binding_panics() {
        let ctx = RequestContext::new();
        let _ = ctx.logger();
    }

    #[test]
    fn logger_after_binding_is_available() {
        let mut ctx = RequestContext::new();
        ctx.set_logger(Span::none());
        assert!(ctx.try_logger().is_some());
        let _ = ctx.logger();
    }
}
