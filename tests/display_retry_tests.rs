use loteqc::store::drive::{alternate_content_url, content_url};
use loteqc::store::memory::MemoryPhotoStore;
use loteqc::{DisplayAdvice, DisplayRetry, PhotoStore, RetryPolicy};
use std::time::Duration;

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(1),
        max_jitter: Duration::ZERO,
    }
}

#[tokio::test]
async fn full_recovery_flow_reasserts_permission() {
    let photos = MemoryPhotoStore::new();
    let stored = photos
        .upload_multipart("p.jpg", "image/jpeg", vec![1], "folder-0")
        .await
        .unwrap();
    let url = content_url(&stored.id);
    let retry = DisplayRetry::new(fast_policy());

    // first failure: alternate URL form
    let advice = retry.advise("campo", &url, true);
    let next = retry.apply(advice, &photos).await.unwrap();
    assert_eq!(next, alternate_content_url(&stored.id));
    assert_eq!(photos.permission_calls(), 0);

    // second failure: re-assert the public permission, retry the original
    let advice = retry.advise("campo", &url, true);
    let next = retry.apply(advice, &photos).await.unwrap();
    assert_eq!(next, url);
    assert_eq!(photos.permission_calls(), 1);
    assert!(photos.files()[0].public);

    // third failure: give up with the escape hatch
    let advice = retry.advise("campo", &url, true);
    match &advice {
        DisplayAdvice::GiveUp { viewer_url } => {
            assert!(viewer_url.as_deref().unwrap().contains(&stored.id));
        }
        other => panic!("expected give-up, got {other:?}"),
    }
    assert!(retry.apply(advice, &photos).await.is_none());
}

#[tokio::test]
async fn terminal_advice_yields_no_url() {
    let photos = MemoryPhotoStore::new();
    let retry = DisplayRetry::new(fast_policy());
    assert!(retry.apply(DisplayAdvice::Expired, &photos).await.is_none());
    assert!(
        retry
            .apply(DisplayAdvice::GiveUp { viewer_url: None }, &photos)
            .await
            .is_none()
    );
}
