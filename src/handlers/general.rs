use crate::state::AppState;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
};
use serde_json::json;

const ROUTES: &[(&str, &str, &str)] = &[
    ("GET", "/api/v1/settlements?period=YYYY-MM&role=", "Select a period and get the board"),
    ("GET", "/api/v1/settlements/status", "State of the latest recomputation pass"),
    ("POST", "/api/v1/settlements/recompute", "Recompute the current selection"),
    ("GET", "/api/v1/settlements/{period}/{worker_id}", "Get or create a worker's settlement"),
    ("PATCH", "/api/v1/settlements/{period}/{worker_id}/manual", "Edit manual bonus, penalty or advance"),
    ("PUT", "/api/v1/settlements/{period}/{worker_id}/manual/{field}", "Edit one manual field"),
    ("POST", "/api/v1/settlements/{period}/{worker_id}/flush", "Persist staged edits now"),
    ("POST", "/api/v1/settlements/{period}/{worker_id}/freeze", "Freeze with final manual values"),
    ("POST", "/api/v1/settlements/{period}/{worker_id}/pay", "Mark a frozen settlement as paid"),
    ("GET", "/api/v1/settlements/{period}/{worker_id}/breakdown", "Itemised tasks, content and bonuses"),
    ("GET", "/api/v1/stats/{period}/{worker_id}", "Compute earnings from current data"),
];

/// Landing page listing the API routes
pub async fn root_handler() -> impl IntoResponse {
    let rows: String = ROUTES
        .iter()
        .map(|(method, path, desc)| {
            format!(
                "<tr><td><code>{method}</code></td><td><code>{}</code></td><td>{desc}</td></tr>",
                path.replace('&', "&amp;")
            )
        })
        .collect();

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <title>Settlement Engine API</title>
  <style>
    body {{ font-family: system-ui, sans-serif; max-width: 900px; margin: 40px auto; padding: 0 16px; color: #1f2937; }}
    table {{ border-collapse: collapse; width: 100%; }}
    td {{ padding: 6px 10px; border-bottom: 1px solid #e5e7eb; font-size: 0.9rem; }}
  </style>
</head>
<body>
  <h1>Settlement Engine API</h1>
  <p>Monthly worker settlements: computed earnings, manual adjustments, freeze and pay.</p>
  <p><a href="/docs">Swagger UI</a> · <a href="/health">Health</a></p>
  <table>{rows}</table>
</body>
</html>"#
    ))
}

/// Health check endpoint
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").fetch_one(&state.db).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected",
                "service": "settlement-engine",
                "version": "1.0.0",
                "pass": state.engine.status(),
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}
