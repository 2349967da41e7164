//! Cache integration tests.
//!
//! These tests verify that:
//! - Repeat requests are served from the output cache with identical bytes
//! - Variants of one source share a single origin fetch
//! - The key depends only on URL, transforms and output format
//! - Failed and non-image responses are never cached
//! - Tag purge and TTL expiry force a refetch
//! - Credentials never reach the origin and cookies are never replayed
//! - Concurrent misses are not coalesced; cancelled requests store nothing

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, Method, StatusCode};

use axum::body::Body;
use axum::http::Request;
use pixel_proxy::cache::{derive_cache_key, MemoryCacheStore, ResponseCache};
use pixel_proxy::origin::OriginResponse;
use pixel_proxy::{TransformEntry, TransformationSpec};
use url::Url;

use super::test_utils::{
    create_test_jpeg, get, send, send_request, test_router, test_service, MockOrigin,
};

fn cat_origin() -> MockOrigin {
    MockOrigin::new().with_image("/cat.jpg", create_test_jpeg(1280, 960), "image/jpeg")
}

// =============================================================================
// Output Cache
// =============================================================================

#[tokio::test]
async fn test_miss_then_hit_with_identical_bytes() {
    let origin = cat_origin();
    let router = test_router(test_service(&origin));

    let first = send(&router, Method::GET, "/resize,crop/cat.jpg", Some("image/jpeg")).await;
    let second = send(&router, Method::GET, "/resize,crop/cat.jpg", Some("image/jpeg")).await;

    assert_eq!(first.cache_status(), Some("MISS"));
    assert_eq!(second.cache_status(), Some("HIT"));
    assert_eq!(first.body, second.body);
    assert_eq!(second.header("content-type"), Some("image/jpeg"));
    assert_eq!(origin.fetch_count(), 1);
}

#[tokio::test]
async fn test_unrelated_headers_do_not_affect_key() {
    let origin = cat_origin();
    let router = test_router(test_service(&origin));

    get(&router, "/resize/cat.jpg").await;

    let request = axum::http::Request::builder()
        .uri("/resize/cat.jpg")
        .header(header::USER_AGENT, "another-client")
        .header(header::COOKIE, "session=abc")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(router, request).await.unwrap();

    assert_eq!(response.headers()[pixel_proxy::CACHE_STATUS_HEADER], "HIT");
    assert_eq!(origin.fetch_count(), 1);
}

#[tokio::test]
async fn test_webp_and_original_cached_separately() {
    let origin = cat_origin();
    let router = test_router(test_service(&origin).with_auto_webp(true));

    let jpeg = send(&router, Method::GET, "/resize/cat.jpg", Some("image/jpeg")).await;
    let webp = send(&router, Method::GET, "/resize/cat.jpg", Some("image/webp")).await;
    let webp_again = send(&router, Method::GET, "/resize/cat.jpg", Some("image/webp")).await;

    assert_eq!(jpeg.cache_status(), Some("MISS"));
    assert_eq!(jpeg.header("content-type"), Some("image/jpeg"));
    assert_eq!(webp.cache_status(), Some("MISS"));
    assert_eq!(webp.header("content-type"), Some("image/webp"));
    assert_eq!(webp_again.cache_status(), Some("HIT"));
    assert_eq!(webp_again.header("content-type"), Some("image/webp"));

    // Both variants came from one origin fetch
    assert_eq!(origin.fetch_count(), 1);
}

// =============================================================================
// Origin Cache
// =============================================================================

#[tokio::test]
async fn test_variants_share_origin_fetch() {
    let origin = cat_origin();
    let router = test_router(test_service(&origin));

    let resized = get(&router, "/resize/cat.jpg").await;
    let cropped = get(&router, "/crop/cat.jpg").await;
    let both = get(&router, "/resize,crop/cat.jpg").await;

    for response in [&resized, &cropped, &both] {
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.cache_status(), Some("MISS"));
    }
    assert_eq!(origin.fetch_count(), 1);
}

#[tokio::test]
async fn test_failed_responses_not_cached() {
    let origin = MockOrigin::new().with_response(
        "/flaky.jpg",
        OriginResponse::new(StatusCode::SERVICE_UNAVAILABLE, "try later")
            .with_header(header::CONTENT_TYPE, "text/plain"),
    );
    let router = test_router(test_service(&origin));

    for _ in 0..3 {
        let response = get(&router, "/resize/flaky.jpg").await;
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.cache_status(), Some("MISS"));
    }
    assert_eq!(origin.fetch_count(), 3);
}

#[tokio::test]
async fn test_transport_errors_not_cached() {
    let origin = MockOrigin::failing();
    let router = test_router(test_service(&origin));

    for _ in 0..2 {
        let response = get(&router, "/cat.jpg").await;
        assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    }
    assert_eq!(origin.fetch_count(), 2);
}

// =============================================================================
// Shared Cache Privacy
// =============================================================================

#[tokio::test]
async fn test_credentials_and_cookies_not_shared() {
    let origin = MockOrigin::new().with_response(
        "/avatar.jpg",
        OriginResponse::new(StatusCode::OK, create_test_jpeg(64, 48))
            .with_header(header::CONTENT_TYPE, "image/jpeg")
            .with_header(header::SET_COOKIE, "session=alice"),
    );
    let router = test_router(test_service(&origin));

    for uri in ["/avatar.jpg", "/resize/avatar.jpg"] {
        let request = Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, "Bearer alice")
            .header(header::COOKIE, "session=alice")
            .body(Body::empty())
            .unwrap();
        let first = send_request(&router, request).await;
        assert_eq!(first.status, StatusCode::OK);
        assert!(first.header("set-cookie").is_none());

        let anonymous = get(&router, uri).await;
        assert_eq!(anonymous.cache_status(), Some("HIT"));
        assert!(anonymous.header("set-cookie").is_none());
    }

    let fetches = origin.fetches().await;
    assert_eq!(fetches.len(), 1);
    assert!(!fetches[0].headers.contains_key(header::AUTHORIZATION));
    assert!(!fetches[0].headers.contains_key(header::COOKIE));
}

#[tokio::test]
async fn test_pass_through_drops_set_cookie() {
    let origin = MockOrigin::new().with_response(
        "/login.txt",
        OriginResponse::new(StatusCode::OK, "hello")
            .with_header(header::CONTENT_TYPE, "text/plain")
            .with_header(header::SET_COOKIE, "session=alice"),
    );
    let router = test_router(test_service(&origin));

    let response = get(&router, "/login.txt").await;

    assert_eq!(&response.body[..], b"hello");
    assert!(response.header("set-cookie").is_none());
}

// =============================================================================
// Concurrency and Cancellation
// =============================================================================

#[tokio::test]
async fn test_concurrent_misses_each_fetch() {
    let origin = MockOrigin::new()
        .with_image("/cat.jpg", create_test_jpeg(320, 240), "image/jpeg")
        .with_delay(Duration::from_millis(50));
    let router = test_router(test_service(&origin));

    let (first, second) = tokio::join!(
        get(&router, "/resize/cat.jpg"),
        get(&router, "/resize/cat.jpg")
    );

    assert_eq!(first.cache_status(), Some("MISS"));
    assert_eq!(second.cache_status(), Some("MISS"));
    assert_eq!(first.body, second.body);
    assert_eq!(origin.fetch_count(), 2);
}

#[tokio::test]
async fn test_cancelled_request_stores_no_output() {
    let origin = cat_origin();
    let service = test_service(&origin);
    let url = Url::parse("http://localhost/resize,crop/cat.jpg").unwrap();
    let headers = axum::http::HeaderMap::new();

    // Drop the request once the origin has answered, while the pipeline runs
    tokio::select! {
        _ = service.handle(&Method::GET, &url, &headers) => {
            panic!("request finished before it could be cancelled");
        }
        _ = origin.wait_for_fetch() => {}
    }

    // Let the abandoned blocking task finish
    tokio::time::sleep(Duration::from_millis(300)).await;

    let ctx = service.context(&Method::GET, &url, &headers);
    let key = derive_cache_key(&ctx.forward_url, &ctx.transforms, ctx.webp);
    let (entry, _) = service.cache().get_output(&key).await;
    assert!(entry.is_none());

    let router = test_router(service);
    let retry = get(&router, "/resize,crop/cat.jpg").await;
    assert_eq!(retry.cache_status(), Some("MISS"));
    assert_eq!(origin.fetch_count(), 1);
}

// =============================================================================
// Invalidation
// =============================================================================

#[tokio::test]
async fn test_purge_drops_all_variants() {
    let origin = cat_origin();
    let service = test_service(&origin);
    let router = test_router(service.clone());

    get(&router, "/resize/cat.jpg").await;
    get(&router, "/crop/cat.jpg").await;
    assert_eq!(origin.fetch_count(), 1);

    let purged = service
        .purge(&Url::parse("http://localhost/cat.jpg").unwrap())
        .await;
    assert_eq!(purged, 3);

    let resized = get(&router, "/resize/cat.jpg").await;
    assert_eq!(resized.cache_status(), Some("MISS"));
    assert_eq!(origin.fetch_count(), 2);
}

#[tokio::test]
async fn test_entries_expire_after_ttl() {
    let origin = cat_origin();
    let cache = ResponseCache::new(Arc::new(MemoryCacheStore::new()))
        .with_origin_ttl(Duration::from_millis(50))
        .with_output_ttl(Duration::from_millis(50));
    let router = test_router(test_service(&origin).with_cache(cache));

    let first = get(&router, "/resize/cat.jpg").await;
    assert_eq!(first.cache_status(), Some("MISS"));

    tokio::time::sleep(Duration::from_millis(120)).await;

    let second = get(&router, "/resize/cat.jpg").await;
    assert_eq!(second.cache_status(), Some("MISS"));
    assert_eq!(origin.fetch_count(), 2);
}

// =============================================================================
// Key Derivation
// =============================================================================

#[test]
fn test_key_ignores_grouping() {
    let url = Url::parse("http://localhost/cat.jpg").unwrap();
    let resize = TransformationSpec::resize(640);
    let crop = TransformationSpec::smart_crop(100, None);

    let grouped = vec![TransformEntry::Group(vec![resize.clone(), crop.clone()])];
    let flat = vec![TransformEntry::Single(resize), TransformEntry::Single(crop)];

    assert_eq!(
        derive_cache_key(&url, &grouped, false),
        derive_cache_key(&url, &flat, false)
    );
    assert_ne!(
        derive_cache_key(&url, &flat, false),
        derive_cache_key(&url, &flat, true)
    );
}
