use anyhow::Result;
use traffic_recorder::capture::Recorder;
use traffic_recorder::config::Config;
use traffic_recorder::router::RouterClient;
use traffic_recorder::store::registry::StoreRegistry;

fn init_tracing() -> Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,traffic_recorder=info".into());
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing()?;

    if config.router_accept_invalid_certs {
        tracing::warn!("router certificate verification is DISABLED");
    }

    let registry = StoreRegistry::new(config.data_dir.clone());
    let handle = registry.resolve(&config.router_addr).await?;
    let client = RouterClient::new(&config)?;
    let recorder = Recorder::new(handle, config.max_samples_per_day);

    tracing::info!(
        router = %config.router_addr,
        interval_seconds = config.capture_interval_seconds,
        max_samples_per_day = config.max_samples_per_day,
        "traffic recorder started"
    );

    let capture_interval = config.capture_interval();
    let capture_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(capture_interval);
        loop {
            ticker.tick().await;
            match recorder.capture_once(&client).await {
                Ok(outcome) => {
                    tracing::info!(
                        inserted = outcome.inserted,
                        trimmed = outcome.trimmed,
                        "capture complete"
                    );
                }
                Err(err) => tracing::warn!(error = %err, "capture failed"),
            }
        }
    });

    tokio::select! {
        res = capture_handle => {
            if let Err(err) = res {
                tracing::error!(error = %err, "capture task exited");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    Ok(())
}
