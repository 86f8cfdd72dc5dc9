use chatvault::{init_tracing, load_config, run_workers, AppContext};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = load_config()?;
    tracing::info!("loaded configuration");

    let context = AppContext::connect(&config).await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(());
    });

    run_workers(&config, &context, shutdown_rx).await;

    Ok(())
}
