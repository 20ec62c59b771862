use std::time::Instant;

use actix_web::{get, post, web, HttpRequest, HttpResponse};
use iap::security::{bearer_token, constant_time_eq};
use iap::Acknowledgement;

use crate::metrics;
use crate::state::AppState;

/// Receive one webhook notification for `provider`.
///
/// The body is passed to the provider's dispatcher untouched. The response
/// carries no body: 200 tells the platform the notification was handled, 500
/// asks it to redeliver.
#[post("/notify/{provider}")]
pub async fn notify(
    path: web::Path<String>,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> HttpResponse {
    let provider = path.into_inner();
    let Some(dispatcher) = state.dispatchers.get(&provider).cloned() else {
        return HttpResponse::NotFound().json(serde_json::json!({
            "error": "unknown provider"
        }));
    };

    let start = Instant::now();
    // Handlers are synchronous user code; keep them off the async workers.
    let ack = web::block(move || dispatcher.dispatch(&body))
        .await
        .unwrap_or_else(|e| {
            tracing::error!(provider = %provider, error = %e, "dispatch task failed");
            Acknowledgement::Retry
        });

    let result = if ack.is_accepted() { "accepted" } else { "retry" };
    metrics::NOTIFICATIONS
        .with_label_values(&[provider.as_str(), result])
        .inc();
    metrics::NOTIFICATION_LATENCY
        .with_label_values(&[provider.as_str()])
        .observe(start.elapsed().as_secs_f64());

    match ack {
        Acknowledgement::Accepted => HttpResponse::Ok().finish(),
        Acknowledgement::Retry => HttpResponse::InternalServerError().finish(),
    }
}

#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "iap-notify-server",
        "providers": state.providers(),
    }))
}

#[get("/metrics")]
pub async fn metrics_endpoint(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    match &state.metrics_token {
        Some(token) => {
            let authorized = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(bearer_token)
                .map(|t| constant_time_eq(t.as_bytes(), token))
                .unwrap_or(false);

            if !authorized {
                return HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "unauthorized",
                    "message": "Valid Bearer token required for /metrics"
                }));
            }
        }
        None => {
            if !state.public_metrics {
                return HttpResponse::Forbidden().json(serde_json::json!({
                    "error": "forbidden",
                    "message": "Set METRICS_TOKEN or IAP_PUBLIC_METRICS=true to access /metrics"
                }));
            }
        }
    }
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::metrics_output())
}
