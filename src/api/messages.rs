use http::StatusCode;
use tracing::info;
use uuid::Uuid;

use super::Api;
use crate::models::{Message, MessageRequest};
use crate::{BoxFuture, HttpError, Request, RequestContext, Response, send_json};

/// Resolves `{messageID}` into the context.
pub(super) fn with_message<'a>(
    api: &'a Api,
    req: &'a Request,
    ctx: &'a mut RequestContext,
) -> BoxFuture<'a, Result<(), HttpError>> {
    Box::pin(async move {
        let id = req.param("messageID").unwrap_or_default();
        if let Err(e) = Uuid::parse_str(id) {
            return Err(HttpError::bad_request("bad messageID").with_internal_error(e));
        }

        match api.store().find(id).await.map_err(HttpError::from_storage)? {
            Some(message) => {
                ctx.set_message(message);
                Ok(())
            }
            None => Err(HttpError::not_found("message not found")),
        }
    })
}

pub(super) fn list<'a>(
    api: &'a Api,
    _: &'a Request,
    ctx: &'a RequestContext,
) -> BoxFuture<'a, Result<Response, HttpError>> {
    Box::pin(async move {
        info!(parent: ctx.logger(), "request getMessages");
        let messages = api.store().list().await.map_err(HttpError::from_storage)?;
        send_json(StatusCode::OK, &messages)
    })
}

pub(super) fn create<'a>(
    api: &'a Api,
    req: &'a Request,
    ctx: &'a RequestContext,
) -> BoxFuture<'a, Result<Response, HttpError>> {
    Box::pin(async move {
        info!(parent: ctx.logger(), "request createMessage");

        let payload: MessageRequest = req
            .json()
            .map_err(|e| HttpError::bad_request("bad payload").with_internal_error(e))?;
        let text = payload
            .validate()
            .map_err(|errors| HttpError::bad_request("bad payload").with_json(errors))?;

        let message = Message::new(text);
        api.store().create(&message).await.map_err(HttpError::from_storage)?;
        send_json(StatusCode::OK, &message)
    })
}

pub(super) fn get<'a>(
    _: &'a Api,
    _: &'a Request,
    ctx: &'a RequestContext,
) -> BoxFuture<'a, Result<Response, HttpError>> {
    Box::pin(async move {
        info!(parent: ctx.logger(), "request getMessage");
        send_json(StatusCode::OK, loaded(ctx)?)
    })
}

pub(super) fn delete<'a>(
    api: &'a Api,
    _: &'a Request,
    ctx: &'a RequestContext,
) -> BoxFuture<'a, Result<Response, HttpError>> {
    Box::pin(async move {
        info!(parent: ctx.logger(), "request deleteMessage");
        let message = loaded(ctx)?;
        match api.store().delete(&message.id).await.map_err(HttpError::from_storage)? {
            Some(deleted) => send_json(StatusCode::OK, &deleted),
            None => Err(HttpError::not_found("message not found")),
        }
    })
}

fn loaded(ctx: &RequestContext) -> Result<&Message, HttpError> {
    ctx.message().ok_or_else(|| {
        HttpError::internal_server_error("internal server error")
            .with_internal_message("message handler reached without the message loader")
    })
}
