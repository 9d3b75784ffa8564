use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod db;
mod devices;
mod error;
mod model;
mod rpc;
mod token;
mod users;

use config::Config;
use db::DbLayer;
use devices::DevicesService;
use token::{AuthClient, TokenSigner};
use users::UsersService;

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UsersService>,
    pub devices: Arc<DevicesService>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    // -----------------------------
    // Shared state / Dependencies
    // -----------------------------
    let db = Arc::new(DbLayer::new(&config.db_path)?);
    let signer: Arc<dyn TokenSigner> =
        Arc::new(AuthClient::new(&config.auth_service_url, config.token_sign_timeout)?);

    let state = AppState {
        users: Arc::new(UsersService::new(db.clone(), signer)),
        devices: Arc::new(DevicesService::new(db)),
    };

    // -----------------------------
    // Routers
    // -----------------------------
    let app = Router::new()
        // Command dispatch
        .merge(rpc::router())
        // MQTT broker auth hook
        .merge(users::router())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state);

    tracing::info!("registry listening on http://{}", config.bind_addr);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
