use anyhow::Result;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vehicle_rental::config::EnvironmentConfig;
use vehicle_rental::database::DatabaseConnection;
use vehicle_rental::repositories::PgBookingRepository;
use vehicle_rental::services::BookingContext;
use vehicle_rental::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Cargar variables de entorno
    dotenv().ok();

    // Configurar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("vehicle_rental=debug,tower_http=info")),
        )
        .init();

    info!("🚐 Vehicle Rental - Booking API");
    info!("================================");

    let config = EnvironmentConfig::from_env()?;
    info!(
        "⚙️ Entorno: {} | moneda {} | máx. {} días | TTL pago {} min",
        config.environment,
        config.booking.currency,
        config.booking.max_rental_days,
        config.booking.payment_intent_ttl_minutes
    );

    // Inicializar base de datos
    let db_connection = match DatabaseConnection::new_default().await {
        Ok(conn) => conn,
        Err(e) => {
            error!("❌ Error conectando a la base de datos: {}", e);
            return Err(anyhow::anyhow!("Error de base de datos: {}", e));
        }
    };
    db_connection.run_migrations().await?;

    let repo = Arc::new(PgBookingRepository::new(db_connection.pool().clone()));
    let booking = BookingContext::new(repo, config.booking.clone());
    let addr: SocketAddr = config.server_url().parse()?;
    let app = create_router(AppState::new(config, booking));

    info!("🌐 Servidor iniciando en http://{}", addr);
    info!("🔍 Endpoints disponibles:");
    info!("   GET  /health");
    info!("🚗 Catálogo: /api/vehicles, /api/vehicles/available, /api/locations");
    info!("🛒 Carrito: /api/cart, /api/cart/items, /api/cart/checkout");
    info!("📋 Reservas: /api/reservations, /api/reservations/items/:id");
    info!("💳 Pagos: /api/payments/:secret");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("❌ Error del servidor: {}", e);
        return Err(e.into());
    }

    info!("👋 Servidor terminado");
    Ok(())
}

/// Señal de apagado graceful
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("❌ No se pudo instalar el handler de Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("❌ No se pudo instalar el handler de SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("🛑 Señal Ctrl+C recibida, apagando servidor...");
        },
        _ = terminate => {
            info!("🛑 Señal de terminación recibida, apagando servidor...");
        },
    }
}
