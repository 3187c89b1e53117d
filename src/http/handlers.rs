//! Axum HTTP handlers for the proxy
//!
//! Every request that reaches the endpoint gets HTTP 200 with a JSON-RPC
//! envelope, unless the handler task itself dies.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, info};

use crate::errors::AppError;
use crate::rpc::codec::{decode, encode_failure, encode_success, InternalCall, WireResponse};
use crate::AppState;

pub async fn rpc_endpoint(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let response = match decode(&body) {
        Ok(call) => dispatch(&state, call).await?,
        Err(rejection) => {
            info!(error = %rejection.error, "rpc request rejected");
            encode_failure(rejection.id, &rejection.error)
        }
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

async fn dispatch(state: &AppState, call: InternalCall) -> Result<WireResponse, AppError> {
    let id = call.id.clone();
    let wire_method = call.wire_method.clone();
    let dispatch_key = call.key.to_string();

    // Handlers run in their own task so a panic is observable as a JoinError
    // instead of tearing down the connection.
    let registry = state.registry.clone();
    let outcome = tokio::spawn(async move { registry.invoke(call).await }).await;

    let response = match outcome {
        Ok(Ok(result)) => encode_success(id, result),
        Ok(Err(err)) => encode_failure(id, &err),
        Err(join_error) => {
            if join_error.is_panic() {
                error!(method = %wire_method, "handler panicked");
                state.report_fault(wire_method.clone());
            }
            return Err(AppError::internal(format!(
                "handler for {wire_method} did not complete: {join_error}"
            )));
        }
    };

    info!(
        method = %wire_method,
        dispatch_key = %dispatch_key,
        outcome = if response.is_error() { "failure" } else { "success" },
        "rpc call dispatched"
    );

    Ok(response)
}
