use std::sync::Arc;

use log::{info, warn};
use machine_learning::runtime;
use tokio::{net::TcpListener, signal};

use worker::{Resources, WorkerConfig, WorkerErr};

#[tokio::main]
async fn main() -> Result<(), WorkerErr> {
    env_logger::init();

    let config = WorkerConfig::from_env()?;
    runtime::init(config.ml_threads);

    let addr = config.addr();
    let resources = Arc::new(Resources::new(config));

    let preload = Arc::clone(&resources);
    tokio::spawn(async move {
        if let Err(e) = preload.extractor().await {
            warn!("feature extractor preload failed: {e}");
        }
    });

    let listener = TcpListener::bind(&addr).await?;
    info!("listening at {addr}");

    tokio::select! {
        ret = accept(listener, resources) => ret?,
        _ = signal::ctrl_c() => {
            info!("received SIGTERM, shutting down");
        }
    }

    Ok(())
}

async fn accept(listener: TcpListener, resources: Arc<Resources>) -> Result<(), WorkerErr> {
    loop {
        let (stream, peer) = listener.accept().await?;
        info!("client connected from {peer}");

        let (rx, tx) = stream.into_split();
        let (rx, tx) = comms::channel(rx, tx);
        let resources = Arc::clone(&resources);

        tokio::spawn(async move {
            if let Err(e) = worker::serve(rx, tx, resources).await {
                warn!("connection with {peer} closed with error: {e}");
            }
            info!("client {peer} disconnected");
        });
    }
}
