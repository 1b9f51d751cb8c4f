//! vistad: Vista picture transfer daemon.
//!
//! `vistad serve` answers picture requests from the local picture store.
//! `vistad fetch <peer> <picture-id>...` pulls pictures from a serving peer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};

use vista_core::config::VistaConfig;
use vista_core::PictureId;
use vista_services::requester::expiry_loop;
use vista_services::{
    ImageDecoder, PacketHandler, PictureCache, PictureRequester, PictureResponder, PictureSource,
    PictureStore, PictureView,
};

use vistad::status;
use vistad::{Connection, PacketDispatcher};

const USAGE: &str = "usage: vistad serve | vistad fetch <peer> <picture-id>...";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = VistaConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = VistaConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        VistaConfig::default()
    });

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        None | Some("serve") => serve(config, shutdown_tx).await,
        Some("fetch") => {
            let peer = args.next().context(USAGE)?;
            let pictures = args
                .map(|a| {
                    a.parse::<PictureId>()
                        .with_context(|| format!("invalid picture id {a:?}"))
                })
                .collect::<Result<Vec<_>>>()?;
            if pictures.is_empty() {
                bail!(USAGE);
            }
            fetch(config, peer, pictures, shutdown_tx).await
        }
        Some(other) => bail!("unknown command {other:?}\n{USAGE}"),
    }
}

fn spawn_status_server(config: &VistaConfig, state: status::StatusState) {
    let port = config.network.status_port;
    if port == 0 {
        return;
    }
    tokio::spawn(async move {
        if let Err(e) = status::serve(state, port).await {
            tracing::error!(error = %e, "status server failed");
        }
    });
}

/// Accept connections and answer picture requests on each of them.
async fn serve(config: VistaConfig, shutdown_tx: broadcast::Sender<()>) -> Result<()> {
    let store = PictureStore::new(&config.store.picture_dir)?;
    tracing::info!(
        path = %config.store.picture_dir.display(),
        pictures = store.count(),
        "picture store ready"
    );
    let source = Arc::new(store.clone()) as Arc<dyn PictureSource>;

    let listener = TcpListener::bind(&config.network.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.network.listen_addr))?;
    tracing::info!(addr = %config.network.listen_addr, "vistad serving");

    let connections = Arc::new(AtomicUsize::new(0));
    spawn_status_server(
        &config,
        status::StatusState {
            role: "serve",
            connections: connections.clone(),
            store: Some(store),
            requester: None,
        },
    );

    let mut shutdown_rx = shutdown_tx.subscribe();
    loop {
        let (stream, addr) = tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::info!("shutting down");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok(a) => a,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            },
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let responder = PictureResponder::new(source.clone(), &config.transfer, outbound_tx);
        let mut dispatcher = PacketDispatcher::new();
        dispatcher.register(Arc::new(responder) as Arc<dyn PacketHandler>);

        let connection = Connection::new(
            stream,
            addr.to_string(),
            Arc::new(dispatcher),
            outbound_rx,
            shutdown_tx.subscribe(),
        );
        let connections = connections.clone();
        connections.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(async move {
            let _ = connection.run().await;
            connections.fetch_sub(1, Ordering::Relaxed);
        });
    }
}

/// Connect to `peer`, request every picture and wait for each to settle.
async fn fetch(
    config: VistaConfig,
    peer: String,
    pictures: Vec<PictureId>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<()> {
    let stream = TcpStream::connect(&peer)
        .await
        .with_context(|| format!("failed to connect to {peer}"))?;

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let requester = PictureRequester::new(
        PictureCache::new(),
        &config.transfer,
        Arc::new(ImageDecoder),
        outbound_tx,
    );
    let mut dispatcher = PacketDispatcher::new();
    dispatcher.register(Arc::new(requester.clone()) as Arc<dyn PacketHandler>);

    let connections = Arc::new(AtomicUsize::new(1));
    spawn_status_server(
        &config,
        status::StatusState {
            role: "fetch",
            connections: connections.clone(),
            store: None,
            requester: Some(requester.clone()),
        },
    );

    let expiry_task = tokio::spawn(expiry_loop(requester.clone()));
    let connection_task = {
        let connection = Connection::new(
            stream,
            peer.clone(),
            Arc::new(dispatcher),
            outbound_rx,
            shutdown_tx.subscribe(),
        );
        tokio::spawn(async move {
            let result = connection.run().await;
            connections.store(0, Ordering::Relaxed);
            result
        })
    };

    for picture_id in &pictures {
        requester.request(*picture_id);
    }

    let mut shutdown_rx = shutdown_tx.subscribe();
    let mut ready = 0;
    for picture_id in &pictures {
        let view = tokio::select! {
            _ = shutdown_rx.recv() => break,
            view = wait_settled(&requester, picture_id) => view,
        };
        match view {
            Some(PictureView::Ready(picture)) => {
                ready += 1;
                tracing::info!(
                    picture = %picture_id,
                    width = picture.width,
                    height = picture.height,
                    texture = picture.texture.0,
                    "fetched"
                );
            }
            Some(_) => tracing::warn!(picture = %picture_id, "fetch failed"),
            None => tracing::warn!(picture = %picture_id, "connection lost before picture settled"),
        }
    }

    tracing::info!(requested = pictures.len(), ready, "fetch finished");
    expiry_task.abort();
    connection_task.abort();
    Ok(())
}

/// Wait until the picture leaves Fetching. Stalled transfers are failed by
/// the expiry loop and a disconnect empties the cache, so this ends.
async fn wait_settled(requester: &PictureRequester, picture_id: &PictureId) -> Option<PictureView> {
    loop {
        match requester
            .cache()
            .settled(picture_id, Duration::from_secs(1))
            .await
        {
            Some(PictureView::Fetching) => continue,
            other => return other,
        }
    }
}
