use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use washline_auth::{CommandAuthorization, Permission};
use washline_core::AggregateId;
use washline_infra::command_dispatcher::DispatchError;
use washline_infra::event_store::StoredEvent;

use crate::app::errors;
use crate::authz;
use crate::context::{PrincipalContext, ShopContext};

/// Handlers answer with a response either way; `Err` carries the error body.
pub type ApiResult = Result<Response, Response>;

/// Small helper wrapper to associate required permissions with a command.
pub struct CmdAuth<C> {
    pub inner: C,
    pub required: Vec<Permission>,
}

impl<C> CmdAuth<C> {
    pub fn new(inner: C, required: Vec<Permission>) -> Self {
        Self { inner, required }
    }

    /// Check the principal's grants and hand back the command.
    pub fn authorize(self, shop: &ShopContext, principal: &PrincipalContext) -> Result<C, Response> {
        authz::authorize_command(shop, principal, &self).map_err(errors::authz_error_to_response)?;
        Ok(self.inner)
    }
}

impl<C> CommandAuthorization for CmdAuth<C> {
    fn required_permissions(&self) -> &[Permission] {
        &self.required
    }
}

pub fn require(
    shop: &ShopContext,
    principal: &PrincipalContext,
    permission: &Permission,
) -> Result<(), Response> {
    authz::authorize_read(shop, principal, permission).map_err(errors::authz_error_to_response)
}

pub fn parse_id(raw: &str, what: &str) -> Result<AggregateId, Response> {
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")))
}

pub fn dispatched(result: Result<Vec<StoredEvent>, DispatchError>) -> Result<Vec<StoredEvent>, Response> {
    result.map_err(errors::dispatch_error_to_response)
}

/// `{"id": .., "events_committed": n}` with the given status.
pub fn committed(status: StatusCode, id: AggregateId, events: &[StoredEvent]) -> Response {
    (
        status,
        Json(serde_json::json!({
            "id": id.to_string(),
            "events_committed": events.len(),
        })),
    )
        .into_response()
}

pub fn ok_json<T: Serialize>(value: T) -> Response {
    (StatusCode::OK, Json(value)).into_response()
}

pub fn items<T: Serialize>(items: Vec<T>) -> Response {
    ok_json(serde_json::json!({ "items": items }))
}
