//! Vista integration test harness.
//!
//! Runs a requester and a responder in one process, each behind the
//! daemon's own connection driver and joined by loopback TCP. Each test builds its
//! own link and picture store; nothing is shared between tests.
//!
//!   cargo test --test integration

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use vista_core::config::TransferSettings;
use vista_core::wire::PacketKind;
use vista_core::{Packet, PictureId, RequestPacket};
use vista_services::{
    ImageDecoder, PacketHandler, PictureCache, PictureRequester, PictureResponder, PictureSource,
    PictureStore, PictureView,
};
use vistad::{Connection, PacketDispatcher};

mod failures;
mod recovery;
mod transfer;

// ── Harness ───────────────────────────────────────────────────────────────────

/// How long a test waits for a picture to settle.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Encode a solid-colour PNG.
pub fn png(width: u32, height: u32) -> Bytes {
    let mut out = std::io::Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        width,
        height,
        Rgba([200, 40, 90, 255]),
    ))
    .write_to(&mut out, ImageFormat::Png)
    .expect("png encode");
    Bytes::from(out.into_inner())
}

/// Fresh, empty picture store under the system temp dir.
pub fn temp_store(tag: &str) -> (PictureStore, PathBuf) {
    let dir = std::env::temp_dir().join(format!(
        "vista-it-{tag}-{}-{}",
        std::process::id(),
        Uuid::new_v4()
    ));
    (PictureStore::new(&dir).expect("create store"), dir)
}

pub fn new_picture_id() -> PictureId {
    PictureId(Uuid::new_v4())
}

/// Passes packets through to `inner`, keeping a copy of each.
struct Tap {
    inner: Arc<dyn PacketHandler>,
    seen: Arc<Mutex<Vec<Packet>>>,
}

impl PacketHandler for Tap {
    fn name(&self) -> &'static str {
        "tap"
    }

    fn kinds(&self) -> &'static [PacketKind] {
        self.inner.kinds()
    }

    fn handle_packet(&self, packet: Packet) -> Result<()> {
        self.seen.lock().unwrap().push(packet.clone());
        self.inner.handle_packet(packet)
    }

    fn on_disconnect(&self) {
        self.inner.on_disconnect()
    }
}

/// One end of the link: a daemon connection with its own shutdown signal.
struct Side {
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<Result<()>>,
}

impl Side {
    fn spawn<S>(
        stream: S,
        peer: &str,
        handler: Arc<dyn PacketHandler>,
        outbound_rx: mpsc::UnboundedReceiver<Packet>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let mut dispatcher = PacketDispatcher::new();
        dispatcher.register(handler);
        let connection = Connection::new(stream, peer, Arc::new(dispatcher), outbound_rx, shutdown_rx);
        Self {
            shutdown,
            task: tokio::spawn(connection.run()),
        }
    }

    fn close(&self) {
        let _ = self.shutdown.send(());
    }
}

/// A requester and a responder joined by loopback TCP.
pub struct Link {
    pub requester: PictureRequester,
    requester_side: Side,
    responder_side: Side,
    /// Every packet the responding side received, in arrival order.
    responder_inbox: Arc<Mutex<Vec<Packet>>>,
}

impl Link {
    pub async fn open(source: Arc<dyn PictureSource>, settings: TransferSettings) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let client = client.context("connect")?;
        let (server, _) = accepted.context("accept")?;

        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let requester = PictureRequester::new(
            PictureCache::new(),
            &settings,
            Arc::new(ImageDecoder),
            req_tx,
        );
        let requester_side = Side::spawn(client, "responder", Arc::new(requester.clone()), req_rx);

        let (resp_tx, resp_rx) = mpsc::unbounded_channel();
        let responder = PictureResponder::new(source, &settings, resp_tx);
        let responder_inbox = Arc::new(Mutex::new(Vec::new()));
        let tap = Tap {
            inner: Arc::new(responder),
            seen: responder_inbox.clone(),
        };
        let responder_side = Side::spawn(server, "requester", Arc::new(tap), resp_rx);

        Ok(Self {
            requester,
            requester_side,
            responder_side,
            responder_inbox,
        })
    }

    /// Request a picture and wait for it to leave Fetching.
    pub async fn fetch(&self, picture_id: PictureId) -> Option<PictureView> {
        self.requester.request(picture_id);
        self.requester
            .cache()
            .settled(&picture_id, SETTLE_TIMEOUT)
            .await
    }

    /// Requests the responding side has received so far.
    pub fn requests_received(&self) -> Vec<RequestPacket> {
        self.responder_inbox
            .lock()
            .unwrap()
            .iter()
            .filter_map(|packet| match packet {
                Packet::Request(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    /// Close the responding side; the requester sees its socket close.
    pub fn drop_responder(&self) {
        self.responder_side.close();
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.responder_side.close();
        self.requester_side.close();
        self.responder_side.task.abort();
        self.requester_side.task.abort();
    }
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
