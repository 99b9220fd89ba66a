use axum::body::Body;
use axum::http::{HeaderValue, Request};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{warn, Span};

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod admin;
pub mod health;
pub mod listings;
pub mod notifications;
pub mod realtime;
pub mod reports;
pub mod restorations;

const RESTORATIONS_PATH: &str = "/api/restorations/";

/// Request path as recorded in trace spans. Restoration tokens are
/// bearer secrets and the query string may carry an access token, so
/// neither is logged.
fn logged_path(path: &str) -> String {
    match path.strip_prefix(RESTORATIONS_PATH) {
        Some(token) if !token.is_empty() => format!("{RESTORATIONS_PATH}[redacted]"),
        _ => path.to_string(),
    }
}

fn request_span(request: &Request<Body>) -> Span {
    tracing::debug_span!(
        "request",
        method = %request.method(),
        path = %logged_path(request.uri().path()),
        version = ?request.version(),
    )
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .filter_map(|value| match value.parse::<HeaderValue>() {
                Ok(header) => Some(header),
                Err(_) => {
                    warn!(origin = value, "ignoring invalid CORS allowed origin");
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(headers))
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let listings_routes = Router::new()
        .route(
            "/:id",
            delete(listings::delete_listing).patch(listings::update_listing),
        )
        .route(
            "/:id/subscription",
            post(listings::subscribe).delete(listings::unsubscribe),
        );

    let reports_routes = Router::new()
        .route("/messages", post(reports::report_message))
        .route("/chats", post(reports::report_chat))
        .route("/listings", post(reports::report_listing))
        .route("/reviews", post(reports::report_review));

    let notifications_routes = Router::new()
        .route("/", get(notifications::list_notifications))
        .route("/read-all", post(notifications::mark_all_read))
        .route("/:id", delete(notifications::delete_notification))
        .route("/:id/read", post(notifications::mark_read));

    let admin_routes = Router::new()
        .route("/reports", get(admin::list_reports))
        .route("/announcements", post(admin::announce))
        .route(
            "/notifications/read-all",
            post(admin::mark_all_admin_notifications_read),
        );

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/listings", listings_routes)
        .nest("/api/reports", reports_routes)
        .nest("/api/notifications", notifications_routes)
        .nest("/api/admin", admin_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    // Token holders need not be signed in.
    let restoration_routes = Router::new().route(
        "/api/restorations/:token",
        get(restorations::verify_token).post(restorations::restore_listing),
    );

    // Browsers cannot set headers on a WebSocket handshake, so this route
    // also accepts the access token as a query parameter.
    let realtime_routes = Router::new().route("/api/realtime", get(realtime::connect));

    Router::new()
        .merge(protected_routes)
        .merge(restoration_routes)
        .merge(realtime_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restoration_tokens_are_kept_out_of_spans() {
        assert_eq!(
            logged_path("/api/restorations/9f86d081884c7d65"),
            "/api/restorations/[redacted]"
        );
        assert_eq!(logged_path("/api/restorations/"), "/api/restorations/");
        assert_eq!(logged_path("/api/listings/42"), "/api/listings/42");
    }

    #[test]
    fn spans_record_the_path_without_the_query() {
        let request = Request::builder()
            .uri("/api/realtime?access_token=secret")
            .body(Body::empty())
            .unwrap();
        assert_eq!(logged_path(request.uri().path()), "/api/realtime");
    }
}
