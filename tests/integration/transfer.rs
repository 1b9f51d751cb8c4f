use crate::*;

use image::GenericImageView;
use vista_services::{PictureStatus, RequestOutcome};

/// A picture larger than one chunk arrives intact and decodes.
#[tokio::test]
async fn test_multi_chunk_picture_becomes_ready() {
    let (store, dir) = temp_store("multi");
    let picture_id = new_picture_id();
    let bytes = png(160, 90);
    store.put(&picture_id, &bytes).unwrap();

    let settings = TransferSettings {
        chunk_size: 256,
        ..TransferSettings::default()
    };
    assert!(bytes.len() > 256, "picture must span several chunks");

    let link = Link::open(Arc::new(store), settings).await.unwrap();
    match link.fetch(picture_id).await {
        Some(PictureView::Ready(ready)) => {
            assert_eq!((ready.width, ready.height), (160, 90));
            assert_eq!(ready.image.dimensions(), (160, 90));
        }
        other => panic!("expected ready, got {other:?}"),
    }
    assert_eq!(link.requester.registry().in_flight(), 0);
    assert_eq!(link.requester.outstanding(), 0);

    let _ = std::fs::remove_dir_all(&dir);
}

/// One wire chunk per picture when it fits.
#[tokio::test]
async fn test_single_chunk_picture_becomes_ready() {
    let (store, dir) = temp_store("single");
    let picture_id = new_picture_id();
    store.put(&picture_id, &png(3, 2)).unwrap();

    let link = Link::open(Arc::new(store), TransferSettings::default())
        .await
        .unwrap();
    let view = link.fetch(picture_id).await.unwrap();
    assert_eq!(view.status(), PictureStatus::Ready);

    let _ = std::fs::remove_dir_all(&dir);
}

/// Several pictures over one connection, requested back to back.
#[tokio::test]
async fn test_concurrent_pictures_over_one_link() {
    let (store, dir) = temp_store("concurrent");
    let pictures: Vec<(PictureId, u32)> = (1..=6).map(|n| (new_picture_id(), n * 10)).collect();
    for (id, side) in &pictures {
        store.put(id, &png(*side, *side)).unwrap();
    }

    let settings = TransferSettings {
        chunk_size: 100,
        ..TransferSettings::default()
    };
    let link = Link::open(Arc::new(store), settings).await.unwrap();

    for (id, _) in &pictures {
        assert_eq!(link.requester.request(*id), RequestOutcome::Issued);
    }
    for (id, side) in &pictures {
        match link.requester.cache().settled(id, SETTLE_TIMEOUT).await {
            Some(PictureView::Ready(ready)) => assert_eq!(ready.width, *side),
            other => panic!("picture {id}: expected ready, got {other:?}"),
        }
    }
    assert_eq!(link.requester.cache().counts().ready, pictures.len());

    let _ = std::fs::remove_dir_all(&dir);
}

/// A second request for a settled picture is answered from the cache.
#[tokio::test]
async fn test_repeat_request_served_from_cache() {
    let (store, dir) = temp_store("repeat");
    let picture_id = new_picture_id();
    store.put(&picture_id, &png(8, 8)).unwrap();

    let link = Link::open(Arc::new(store), TransferSettings::default())
        .await
        .unwrap();
    link.fetch(picture_id).await.unwrap();

    assert_eq!(
        link.requester.request(picture_id),
        RequestOutcome::Existing(PictureStatus::Ready)
    );
    assert_eq!(link.requester.outstanding(), 0);

    let _ = std::fs::remove_dir_all(&dir);
}
