use duky_gateway::{app, Configuration};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Setup tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .init();

    // Read in configuration from OS env.
    let c: Configuration =
        envy::from_env::<Configuration>().expect("Failed to read configuration from env");

    // Init the service
    let service = match app(&c) {
        Ok(service) => service,
        Err(e) => {
            tracing::error!("服务初始化失败：{e}");
            std::process::exit(1);
        }
    };

    let addr = c.bind_address.unwrap_or_else(|| "0.0.0.0:8080".to_string());
    tracing::info!("Listening on {addr}..");

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, service).await.unwrap();
}
