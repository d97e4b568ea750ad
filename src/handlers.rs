use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tera::Context;
use tracing::error;

use crate::models::{RepeaterStatus, StatusReport};
use crate::state::AppState;

type ApiError = (StatusCode, Json<Value>);

/// Dashboard row: the public repeater fields plus a shortened key for display.
#[derive(Debug, Serialize)]
struct RepeaterRow<'a> {
    #[serde(flatten)]
    repeater: &'a RepeaterStatus,
    short_id: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/status", get(api_status))
        .route("/api/repeaters/online", get(api_online_repeaters))
        .route("/api/repeaters/{id}", get(api_repeater))
        .route("/api/refresh", post(api_refresh))
        .with_state(state)
}

fn render_template(
    tera: &tera::Tera,
    template: &str,
    context: &Context,
) -> Result<Html<String>, (StatusCode, &'static str)> {
    tera.render(template, context).map(Html).map_err(|e| {
        error!("Template render error for '{}': {}", template, e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Render error")
    })
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count > max_chars {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{}...", truncated)
    } else {
        s.to_string()
    }
}

/// Word for a network health percentage. Display only.
pub fn health_label(network_health: u8) -> &'static str {
    match network_health {
        90.. => "excellent",
        75..=89 => "good",
        50..=74 => "fair",
        _ => "poor",
    }
}

fn api_error(status: StatusCode, message: &str) -> ApiError {
    (status, Json(json!({ "error": message })))
}

fn unavailable() -> ApiError {
    api_error(
        StatusCode::SERVICE_UNAVAILABLE,
        "repeater data temporarily unavailable",
    )
}

/// GET / - Dashboard with repeater summary and table.
pub async fn index(
    State(state): State<Arc<AppState>>,
) -> Result<Html<String>, (StatusCode, &'static str)> {
    let report = state.service.get_data().await;
    let last_fetch = state
        .service
        .last_fetch()
        .await
        .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string());

    let mut context = Context::new();
    context.insert("region", &state.service.config().region);
    context.insert("last_fetch", &last_fetch);
    match report.as_deref() {
        Some(report) => {
            let rows: Vec<RepeaterRow> = report
                .repeaters
                .iter()
                .map(|repeater| RepeaterRow {
                    repeater,
                    short_id: truncate_chars(&repeater.id, 12),
                })
                .collect();
            context.insert("report", report);
            context.insert("repeaters", &rows);
            context.insert("health_label", health_label(report.summary.network_health));
        }
        None => context.insert("report", &Option::<StatusReport>::None),
    }

    render_template(&state.tera, "dashboard.html", &context)
}

/// GET /api/status - Full status report.
pub async fn api_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusReport>, ApiError> {
    match state.service.get_data().await {
        Some(report) => Ok(Json(StatusReport::clone(&report))),
        None => Err(unavailable()),
    }
}

/// GET /api/repeaters/online - Online repeaters, empty when no data.
pub async fn api_online_repeaters(
    State(state): State<Arc<AppState>>,
) -> Json<Vec<RepeaterStatus>> {
    Json(state.service.get_online_repeaters().await)
}

/// GET /api/repeaters/{id} - One repeater by public key.
pub async fn api_repeater(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RepeaterStatus>, ApiError> {
    let report = state.service.get_data().await.ok_or_else(unavailable)?;
    report
        .find(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "repeater not found"))
}

/// POST /api/refresh - Re-fetch the feed now.
pub async fn api_refresh(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusReport>, ApiError> {
    match state.service.fetch_and_transform().await {
        Ok(report) => Ok(Json(StatusReport::clone(&report))),
        Err(_) => Err(api_error(
            StatusCode::BAD_GATEWAY,
            "failed to refresh repeater data",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod truncate_chars_tests {
        use super::*;

        #[test]
        fn test_short_string_unchanged() {
            assert_eq!(truncate_chars("CC5402", 12), "CC5402");
        }

        #[test]
        fn test_exact_length_unchanged() {
            assert_eq!(truncate_chars("CC540240BAF2", 12), "CC540240BAF2");
        }

        #[test]
        fn test_long_key_truncated() {
            assert_eq!(
                truncate_chars("CC540240BAF29FF141A5F70D", 12),
                "CC540240BAF2..."
            );
        }

        #[test]
        fn test_emoji_characters() {
            assert_eq!(
                truncate_chars("Bexley\u{2600}\u{fe0f}\u{267b}\u{fe0f}Mesh", 8),
                "Bexley\u{2600}\u{fe0f}..."
            );
        }
    }

    mod health_label_tests {
        use super::*;

        #[test]
        fn test_bands() {
            assert_eq!(health_label(100), "excellent");
            assert_eq!(health_label(90), "excellent");
            assert_eq!(health_label(89), "good");
            assert_eq!(health_label(75), "good");
            assert_eq!(health_label(50), "fair");
            assert_eq!(health_label(49), "poor");
            assert_eq!(health_label(0), "poor");
        }
    }

    mod route_tests {
        use super::*;
        use crate::service::tests::{sample_feed, service_with, FakeSource};
        use axum::body::{to_bytes, Body};
        use axum::http::{Method, Request};
        use tera::Tera;
        use tower::ServiceExt;

        fn app(source: Arc<FakeSource>) -> Router {
            let mut tera = Tera::default();
            tera.add_raw_template(
                "dashboard.html",
                include_str!("../templates/dashboard.html"),
            )
            .unwrap();
            router(Arc::new(AppState::new(tera, service_with(source))))
        }

        async fn call(app: Router, method: Method, uri: &str) -> (StatusCode, String) {
            let response = app
                .oneshot(
                    Request::builder()
                        .method(method)
                        .uri(uri)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            let status = response.status();
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, String::from_utf8(body.to_vec()).unwrap())
        }

        #[tokio::test]
        async fn test_status_json() {
            let (status, body) = call(
                app(FakeSource::new(Some(sample_feed()))),
                Method::GET,
                "/api/status",
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            let report: StatusReport = serde_json::from_str(&body).unwrap();
            assert_eq!(report.summary.total_repeaters, 3);
            assert_eq!(report.summary.offline_repeaters, 1);
        }

        #[tokio::test]
        async fn test_status_unavailable() {
            let (status, body) =
                call(app(FakeSource::new(None)), Method::GET, "/api/status").await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
            assert!(body.contains("temporarily unavailable"));
        }

        #[tokio::test]
        async fn test_repeater_found_and_missing() {
            let source = FakeSource::new(Some(sample_feed()));
            let (status, body) = call(app(source.clone()), Method::GET, "/api/repeaters/B").await;
            assert_eq!(status, StatusCode::OK);
            let repeater: RepeaterStatus = serde_json::from_str(&body).unwrap();
            assert_eq!(repeater.name, "Node B");

            let (status, _) = call(app(source), Method::GET, "/api/repeaters/nope").await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }

        #[tokio::test]
        async fn test_online_route_not_captured_by_id() {
            let (status, body) = call(
                app(FakeSource::new(Some(sample_feed()))),
                Method::GET,
                "/api/repeaters/online",
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            let online: Vec<RepeaterStatus> = serde_json::from_str(&body).unwrap();
            assert_eq!(online.len(), 2);
        }

        #[tokio::test]
        async fn test_refresh_failure_is_bad_gateway() {
            let (status, body) =
                call(app(FakeSource::new(None)), Method::POST, "/api/refresh").await;
            assert_eq!(status, StatusCode::BAD_GATEWAY);
            assert!(body.contains("failed to refresh repeater data"));
            assert!(!body.contains("Invalid API response"));
        }

        #[tokio::test]
        async fn test_dashboard_renders_rows() {
            let (status, body) = call(
                app(FakeSource::new(Some(sample_feed()))),
                Method::GET,
                "/",
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert!(body.contains("Node A"));
            assert!(body.contains("Node C"));
            assert!(body.contains("fair"));
        }

        #[tokio::test]
        async fn test_dashboard_without_data() {
            let (status, body) = call(app(FakeSource::new(None)), Method::GET, "/").await;
            assert_eq!(status, StatusCode::OK);
            assert!(body.contains("temporarily unavailable"));
        }
    }
}
