//! The waypost relay binary.
//!
//! Configuration is environment-provided: `PORT` selects the listening
//! port (default 8080), `RUST_LOG` the log filter.

use waypost::{WaypostError, WaypostServerBuilder};

#[tokio::main]
async fn main() -> Result<(), WaypostError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8080);

    let server = WaypostServerBuilder::new()
        .bind(&format!("0.0.0.0:{port}"))
        .build()
        .await?;

    tracing::info!(port, "signaling on");
    server.run().await
}
