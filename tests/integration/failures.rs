use crate::*;

use vista_services::PictureStatus;

/// The responder does not hold the picture: one Error packet, entry Error.
#[tokio::test]
async fn test_missing_picture_ends_in_error() {
    let (store, dir) = temp_store("missing");
    let link = Link::open(Arc::new(store), TransferSettings::default())
        .await
        .unwrap();

    let picture_id = new_picture_id();
    let view = link.fetch(picture_id).await.unwrap();
    assert_eq!(view.status(), PictureStatus::Error);
    assert_eq!(link.requester.registry().in_flight(), 0);

    let _ = std::fs::remove_dir_all(&dir);
}

/// Bytes arrive fine but are not a picture.
#[tokio::test]
async fn test_undecodable_picture_ends_in_error() {
    let (store, dir) = temp_store("garbage");
    let picture_id = new_picture_id();
    store.put(&picture_id, &[0x42u8; 5000]).unwrap();

    let settings = TransferSettings {
        chunk_size: 1000,
        ..TransferSettings::default()
    };
    let link = Link::open(Arc::new(store), settings).await.unwrap();
    assert_eq!(
        link.fetch(picture_id).await.unwrap().status(),
        PictureStatus::Error
    );

    let _ = std::fs::remove_dir_all(&dir);
}

/// The responder refuses pictures above the size ceiling.
#[tokio::test]
async fn test_oversized_picture_is_refused() {
    let (store, dir) = temp_store("oversized");
    let picture_id = new_picture_id();
    let bytes = png(64, 64);
    store.put(&picture_id, &bytes).unwrap();

    let settings = TransferSettings {
        max_picture_bytes: (bytes.len() - 1) as u64,
        ..TransferSettings::default()
    };
    let link = Link::open(Arc::new(store), settings).await.unwrap();
    assert_eq!(
        link.fetch(picture_id).await.unwrap().status(),
        PictureStatus::Error
    );

    let _ = std::fs::remove_dir_all(&dir);
}

/// One failed picture does not disturb the others on the same link.
#[tokio::test]
async fn test_failure_is_isolated_per_picture() {
    let (store, dir) = temp_store("isolated");
    let good = new_picture_id();
    store.put(&good, &png(5, 5)).unwrap();
    let missing = new_picture_id();

    let link = Link::open(Arc::new(store), TransferSettings::default())
        .await
        .unwrap();
    link.requester.request(missing);
    let good_view = link.fetch(good).await.unwrap();
    let missing_view = link
        .requester
        .cache()
        .settled(&missing, SETTLE_TIMEOUT)
        .await
        .unwrap();

    assert_eq!(good_view.status(), PictureStatus::Ready);
    assert_eq!(missing_view.status(), PictureStatus::Error);

    let _ = std::fs::remove_dir_all(&dir);
}
