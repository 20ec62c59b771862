use actix_web::{web, App, HttpServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iap::MerchantConfig;
use iap_server::bootstrap::{build_state, BootstrapConfig};
use iap_server::routes;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let state = match BootstrapConfig::from_env()
        .and_then(|config| build_state(&config, MerchantConfig::from_env))
    {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    if state.metrics_token.is_none() && !state.public_metrics {
        tracing::warn!("METRICS_TOKEN not set, /metrics will answer 403");
    }

    let port: u16 = std::env::var("IAP_SERVER_PORT")
        .or_else(|_| std::env::var("PORT"))
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    tracing::info!("IAP notification server listening on port {port}");
    for provider in state.providers() {
        tracing::info!("  POST http://localhost:{port}/notify/{provider}");
    }

    let state = web::Data::new(state);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .service(routes::health)
            .service(routes::metrics_endpoint)
            .service(routes::notify)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
