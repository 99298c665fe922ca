use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let username = std::env::var("MOCK_USER").unwrap_or_else(|_| "Openbravo".to_string());
    let password = std::env::var("MOCK_PASSWORD").unwrap_or_else(|_| "openbravo".to_string());

    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    mock_server::run_with_credentials(listener, &username, &password).await
}
