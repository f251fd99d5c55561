use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use notification_hub::{
    auth::TokenVerifier,
    handlers, logging,
    metrics::{self, MetricsMiddleware},
    relay::{MessageBus, RedisBus},
    AppState, Config, NotificationHub, NotificationPublisher, NotificationRelay,
};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    let config = Config::from_env().context("failed to load configuration")?;
    tracing::info!(env = %config.app.env, "Starting notification hub");

    let hub = NotificationHub::new(config.websocket.send_timeout());

    let bus: Arc<dyn MessageBus> = Arc::new(
        RedisBus::connect(&config.redis.url)
            .await
            .context("failed to connect to Redis")?,
    );
    tracing::info!("Connected to Redis");

    let relay = if config.relay.enabled {
        Some(
            NotificationRelay::new(hub.clone(), bus.clone(), config.redis.channel.clone())
                .with_reconnect_delay(config.relay.reconnect_delay())
                .spawn(),
        )
    } else {
        tracing::info!("Notification relay disabled");
        None
    };

    let state = AppState::new(
        hub.clone(),
        NotificationPublisher::new(bus),
        TokenVerifier::from_config(&config.auth),
        config.websocket.clone(),
    );

    let addr = config.bind_addr();
    tracing::info!("Starting HTTP server on {}", addr);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(middleware::Logger::default())
            .wrap(MetricsMiddleware)
            .route("/health", web::get().to(|| async { "OK" }))
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .configure(handlers::configure)
    })
    .bind(&addr)
    .with_context(|| format!("failed to bind {}", addr))?
    .disable_signals()
    .run();

    let server_handle = server.handle();
    let shutdown_hub = hub.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received");

        if let Some(relay) = relay {
            relay.stop().await;
        }
        shutdown_hub.shutdown().await;
        server_handle.stop(true).await;
    });

    server.await.context("HTTP server failed")?;

    // The server can also exit without a signal; closing twice is harmless.
    hub.shutdown().await;
    tracing::info!("Notification hub shutting down");

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    }
}
