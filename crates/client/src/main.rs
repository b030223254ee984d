//! Gruzreis client - headless entry point.
//!
//! Connects with the environment's configuration, signs in when
//! `GRUZREIS_LOGIN`/`GRUZREIS_PASSWORD` are set, loads the cargo list and
//! logs what happens until Ctrl-C.

use anyhow::Context;
use gruzreis_client::stores::CargoState;
use gruzreis_client::ws::StatusChange;
use gruzreis_client::{health, log_info, log_warn, AppContext, ConnectionConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gruzreis_client=debug")),
        )
        .init();

    let config = ConnectionConfig::from_env();
    health::check_server(&config.endpoint)
        .await
        .with_context(|| format!("server at {} is unreachable", config.endpoint))?;

    let app = AppContext::native();
    app.manager.watch_status(|change: &StatusChange| match &change.error {
        Some(error) => log_warn!("Connection {}: {}", change.status, error),
        None => log_info!("Connection {} (attempt {})", change.status, change.attempt),
    });
    app.cargo_state.subscribe(
        |s: &CargoState| s.cargos.clone(),
        |cargos| log_info!("Cargo list updated: {} cargos", cargos.len()),
    );

    let login = std::env::var("GRUZREIS_LOGIN").ok();
    let password = std::env::var("GRUZREIS_PASSWORD").ok();
    match (login, password) {
        (Some(login), Some(password)) => {
            let session = app
                .auth
                .login(config, &login, &password)
                .await
                .context("sign-in failed")?;
            log_info!("Signed in as {}", session.name);
            app.cargos.load_cargos();
        }
        _ => {
            app.manager.connect(config).await.context("connect failed")?;
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    app.auth.logout();
    app.shutdown();
    Ok(())
}
