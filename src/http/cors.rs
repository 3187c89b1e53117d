use axum::{
    extract::Request,
    http::{
        header::{ACCESS_CONTROL_REQUEST_METHOD, ALLOW},
        Method, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::cors::{AllowHeaders, Any, CorsLayer};

const ALLOWED_METHOD: &str = "POST";

/// CORS policy for the JSON-RPC endpoint: any origin, `POST` only, requested
/// headers mirrored back on pre-flight.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST])
        .allow_headers(AllowHeaders::mirror_request())
}

/// Rejects pre-flights that [`cors_layer`] would otherwise answer with 200.
/// The requested method is compared as a raw header value, so unparseable
/// values are refused like any other non-POST method.
pub async fn guard_preflight(request: Request, next: Next) -> Response {
    if request.method() != Method::OPTIONS {
        return next.run(request).await;
    }

    match request.headers().get(ACCESS_CONTROL_REQUEST_METHOD) {
        None => StatusCode::BAD_REQUEST.into_response(),
        Some(requested) if requested == ALLOWED_METHOD => next.run(request).await,
        Some(_) => (StatusCode::METHOD_NOT_ALLOWED, [(ALLOW, ALLOWED_METHOD)]).into_response(),
    }
}
