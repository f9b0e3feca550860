use crate::{api, cli::actions::Action};
use anyhow::Result;
use tokio::{signal, sync::mpsc};
use tracing::error;

/// Handle the server action
/// # Errors
/// Return error if the server fails to start
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server { port, dsn, config } => {
            let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();

            tokio::spawn(async move {
                if let Err(err) = signal::ctrl_c().await {
                    error!("Failed to listen for shutdown signal: {err}");
                }
                let _ = shutdown_tx.send(());
            });

            api::serve(port, dsn, config, shutdown_rx).await?;
        }
    }

    Ok(())
}
