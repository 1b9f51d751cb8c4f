use crate::*;

use vista_core::ChunkPacket;

/// Source that takes longer to answer than any test waits.
struct Silent;

impl PictureSource for Silent {
    fn raw_bytes(&self, _: &PictureId) -> Result<Option<Bytes>> {
        std::thread::sleep(Duration::from_secs(3));
        Ok(None)
    }
}

/// Losing the connection clears every cache entry.
#[tokio::test]
async fn test_disconnect_clears_cache() {
    let (store, dir) = temp_store("disconnect");
    let fetched = new_picture_id();
    store.put(&fetched, &png(4, 4)).unwrap();

    let link = Link::open(Arc::new(store), TransferSettings::default())
        .await
        .unwrap();
    link.fetch(fetched).await.unwrap();
    assert_eq!(link.requester.cache().len(), 1);

    link.drop_responder();
    let cache = link.requester.cache().clone();
    assert!(wait_until(SETTLE_TIMEOUT, || cache.is_empty()).await);
    assert!(cache.get(&fetched).is_none());

    let _ = std::fs::remove_dir_all(&dir);
}

/// Chunks for a transfer that was in flight when the link dropped have no
/// effect once the disconnect has been handled.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_late_chunk_after_disconnect_is_ignored() {
    let link = Link::open(Arc::new(Silent), TransferSettings::default())
        .await
        .unwrap();
    let picture_id = new_picture_id();
    link.requester.request(picture_id);

    assert!(wait_until(SETTLE_TIMEOUT, || link.requests_received().len() == 1).await);
    let request = link.requests_received().remove(0);
    assert_eq!(request.picture_id, picture_id);
    assert_eq!(link.requester.outstanding(), 1);

    link.drop_responder();
    let cache = link.requester.cache().clone();
    assert!(wait_until(SETTLE_TIMEOUT, || cache.is_empty()).await);
    assert_eq!(link.requester.outstanding(), 0);

    // A complete picture under the old transfer id would have settled Ready.
    let late = Packet::Chunk(ChunkPacket {
        transfer_id: request.transfer_id,
        payload: png(2, 2),
        bytes_remaining: 0,
    });
    link.requester.handle_packet(late).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(cache.get(&picture_id).is_none());
    assert_eq!(link.requester.registry().in_flight(), 0);
    assert_eq!(link.requester.outstanding(), 0);
}

/// A peer that accepts the request and then goes quiet is given up on.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stalled_transfer_times_out() {
    let settings = TransferSettings {
        fetch_timeout_secs: 1,
        ..TransferSettings::default()
    };
    let link = Link::open(Arc::new(Silent), settings).await.unwrap();
    let sweeper = tokio::spawn(vista_services::requester::expiry_loop(
        link.requester.clone(),
    ));

    let picture_id = new_picture_id();
    let view = link.fetch(picture_id).await.unwrap();
    assert_eq!(view.status(), vista_services::PictureStatus::Error);
    assert_eq!(link.requester.outstanding(), 0);

    sweeper.abort();
}
