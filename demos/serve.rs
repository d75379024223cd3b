//! Serves `GET /activate-key` from a file-backed pool, seeding it on first start.
//!
//! Reads an optional JSON configuration from `KEYGATE_CONFIG` and the port from `PORT`
//! (default 8080). Every other path answers 404, standing in for the host's own routes.

// std
use std::{env, net::SocketAddr, time::Duration};
// crates.io
use axum::{Router, http::StatusCode};
use color_eyre::Result;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
// self
use keygate::{DispenserConfig, KeyDispenser, http};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
		)
		.init();

	let config = match env::var("KEYGATE_CONFIG") {
		Ok(path) => DispenserConfig::from_path(path)?,
		Err(_) => DispenserConfig::default(),
	};
	let port = env::var("PORT").ok().and_then(|p| p.parse::<u16>().ok()).unwrap_or(8080);
	let dispenser = KeyDispenser::open(&config).await?;
	let sweeper = dispenser.clone();

	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(Duration::from_secs(15 * 60));

		loop {
			ticker.tick().await;

			let dropped = sweeper.sweep();

			tracing::debug!(dropped, "swept idle rate-limit entries");
		}
	});

	let app = Router::new()
		.merge(http::router(dispenser, config.exhausted_status))
		.fallback(|| async { StatusCode::NOT_FOUND });
	let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;

	tracing::info!(addr = %listener.local_addr()?, "listening");

	axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

	Ok(())
}
