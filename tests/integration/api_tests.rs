//! API integration tests for image requests and error handling.
//!
//! Tests verify:
//! - Method filtering
//! - Directive parsing and transform order
//! - WebP negotiation
//! - Pass-through of upstream responses
//! - HTTP response codes and headers

use std::sync::Arc;

use axum::http::{header, Method, StatusCode};

use pixel_proxy::origin::OriginResponse;
use pixel_proxy::{ImageService, PathDirectiveParser};

use super::test_utils::{
    create_test_jpeg, create_test_png, get, image_dimensions, is_valid_jpeg, is_webp, send,
    test_registry, test_router, test_service, webp_service, MockOrigin,
};

fn cat_origin() -> MockOrigin {
    MockOrigin::new().with_image("/cat.jpg", create_test_jpeg(1280, 960), "image/jpeg")
}

// =============================================================================
// Method Filtering
// =============================================================================

#[tokio::test]
async fn test_post_is_rejected_without_origin_call() {
    let origin = cat_origin();
    let router = test_router(test_service(&origin));

    let response = send(&router, Method::POST, "/image.jpg", None).await;

    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(&response.body[..], b"Only GET/HEAD allowed");
    assert_eq!(response.header("allow"), Some("GET, HEAD"));
    assert_eq!(origin.fetch_count(), 0);
}

#[tokio::test]
async fn test_other_write_methods_rejected() {
    let origin = cat_origin();
    let router = test_router(test_service(&origin));

    for method in [Method::PUT, Method::DELETE, Method::PATCH] {
        let response = send(&router, method.clone(), "/resize/cat.jpg", None).await;
        assert_eq!(
            response.status,
            StatusCode::METHOD_NOT_ALLOWED,
            "{method} should be rejected"
        );
    }
    assert_eq!(origin.fetch_count(), 0);
}

// =============================================================================
// Transform Requests
// =============================================================================

#[tokio::test]
async fn test_resize_then_crop() {
    let origin = cat_origin();
    let router = test_router(test_service(&origin));

    let response = send(&router, Method::GET, "/resize,crop/cat.jpg", Some("image/jpeg")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("image/jpeg"));
    assert_eq!(response.cache_status(), Some("MISS"));
    assert!(is_valid_jpeg(&response.body));
    assert_eq!(image_dimensions(&response.body), (100, 100));
    assert_eq!(
        response.header("content-length"),
        Some(response.body.len().to_string().as_str())
    );
    assert_eq!(origin.fetched_targets().await, vec!["/cat.jpg"]);
}

#[tokio::test]
async fn test_directive_order_is_respected() {
    let origin = cat_origin();
    let router = test_router(test_service(&origin));

    // Crop to 100x100 first, then resize the square to width 640
    let response = get(&router, "/crop,resize/cat.jpg").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(image_dimensions(&response.body), (640, 640));
}

#[tokio::test]
async fn test_fit_resize_preserves_aspect_ratio() {
    let origin = cat_origin();
    let router = test_router(test_service(&origin));

    let response = get(&router, "/resize/cat.jpg").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(image_dimensions(&response.body), (640, 480));
}

#[tokio::test]
async fn test_unknown_directive_is_forwarded_verbatim() {
    let origin = cat_origin();
    let router = test_router(test_service(&origin));

    let response = get(&router, "/unknown-directive/cat.jpg").await;

    // The mock origin has nothing at that path; its 404 is relayed
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(
        origin.fetched_targets().await,
        vec!["/unknown-directive/cat.jpg"]
    );
}

#[tokio::test]
async fn test_unknown_names_dropped_from_mixed_list() {
    let origin = cat_origin();
    let router = test_router(test_service(&origin));

    let response = get(&router, "/bogus,resize/cat.jpg").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(image_dimensions(&response.body), (640, 480));
    assert_eq!(origin.fetched_targets().await, vec!["/cat.jpg"]);
}

#[tokio::test]
async fn test_query_string_is_forwarded() {
    let origin = cat_origin();
    let router = test_router(test_service(&origin));

    let response = get(&router, "/resize/cat.jpg?v=2").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(origin.fetched_targets().await, vec!["/cat.jpg?v=2"]);
}

#[tokio::test]
async fn test_root_prefix_is_stripped() {
    let origin = cat_origin();
    let service =
        test_service(&origin).with_parser(Arc::new(PathDirectiveParser::with_root("/images")));
    let router = test_router(service);

    let response = get(&router, "/images/resize/cat.jpg").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(image_dimensions(&response.body), (640, 480));
    assert_eq!(origin.fetched_targets().await, vec!["/cat.jpg"]);
}

#[tokio::test]
async fn test_untransformed_request_returns_origin_bytes() {
    let original = create_test_jpeg(64, 48);
    let origin = MockOrigin::new().with_image("/small.jpg", original.clone(), "image/jpeg");
    let router = test_router(test_service(&origin));

    let response = get(&router, "/small.jpg").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(&response.body[..], &original[..]);
    assert_eq!(response.cache_status(), Some("MISS"));
}

// =============================================================================
// Format Negotiation
// =============================================================================

#[tokio::test]
async fn test_webp_conversion_overrides_named_format() {
    let origin = cat_origin();
    let router = test_router(webp_service(&origin));

    let response = send(
        &router,
        Method::GET,
        "/cat.jpg",
        Some("image/avif,image/webp,*/*;q=0.8"),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("image/webp"));
    assert!(response.varies_on("accept"));
    assert!(is_webp(&response.body));
}

#[tokio::test]
async fn test_named_format_without_webp_support() {
    let origin = cat_origin();
    let router = test_router(webp_service(&origin));

    let response = send(&router, Method::GET, "/resize/cat.jpg", Some("image/jpeg")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("image/png"));
    assert_eq!(image_dimensions(&response.body), (640, 480));
}

#[tokio::test]
async fn test_webp_not_applied_when_disabled() {
    let origin = cat_origin();
    let router = test_router(test_service(&origin));

    let response = send(&router, Method::GET, "/resize/cat.jpg", Some("image/webp")).await;

    assert_eq!(response.header("content-type"), Some("image/jpeg"));
    assert!(!response.varies_on("accept"));
}

#[tokio::test]
async fn test_every_variant_varies_on_accept() {
    let origin = cat_origin();
    let router = test_router(test_service(&origin).with_auto_webp(true));

    // Served as-is, and transformed without conversion
    let original = send(&router, Method::GET, "/cat.jpg", Some("image/jpeg")).await;
    let resized = send(&router, Method::GET, "/resize/cat.jpg", Some("image/jpeg")).await;
    let webp = send(&router, Method::GET, "/cat.jpg", Some("image/webp")).await;

    for response in [&original, &resized, &webp] {
        assert_eq!(response.status, StatusCode::OK);
        assert!(response.varies_on("accept"));
    }
    assert_eq!(original.header("content-type"), Some("image/jpeg"));
    assert_eq!(webp.header("content-type"), Some("image/webp"));

    // Still present when the original is replayed from cache
    let replay = send(&router, Method::GET, "/cat.jpg", Some("image/jpeg")).await;
    assert_eq!(replay.cache_status(), Some("HIT"));
    assert!(replay.varies_on("accept"));
}

#[tokio::test]
async fn test_content_disposition_dropped_on_conversion() {
    let origin = MockOrigin::new().with_response(
        "/cat.jpg",
        OriginResponse::new(StatusCode::OK, create_test_jpeg(64, 48))
            .with_header(header::CONTENT_TYPE, "image/jpeg")
            .with_header(header::CONTENT_DISPOSITION, "inline; filename=cat.jpg"),
    );
    let router = test_router(test_service(&origin).with_auto_webp(true));

    let resized = send(&router, Method::GET, "/resize/cat.jpg", Some("image/jpeg")).await;
    let webp = send(&router, Method::GET, "/cat.jpg", Some("image/webp")).await;

    assert_eq!(
        resized.header("content-disposition"),
        Some("inline; filename=cat.jpg")
    );
    assert_eq!(webp.header("content-type"), Some("image/webp"));
    assert!(webp.header("content-disposition").is_none());
}

#[tokio::test]
async fn test_png_converted_to_webp() {
    let origin = MockOrigin::new().with_image("/logo.png", create_test_png(80, 40), "image/png");
    let service = test_service(&origin).with_auto_webp(true);
    let router = test_router(service);

    let response = send(&router, Method::GET, "/logo.png", Some("image/webp")).await;

    assert_eq!(response.header("content-type"), Some("image/webp"));
    assert_eq!(image_dimensions(&response.body), (80, 40));
}

// =============================================================================
// HEAD Requests
// =============================================================================

#[tokio::test]
async fn test_head_has_headers_but_no_body() {
    let origin = cat_origin();
    let router = test_router(test_service(&origin));

    let full = get(&router, "/resize/cat.jpg").await;
    let head = send(&router, Method::HEAD, "/resize/cat.jpg", None).await;

    assert_eq!(head.status, StatusCode::OK);
    assert!(head.body.is_empty());
    assert_eq!(head.header("content-type"), Some("image/jpeg"));
    assert_eq!(
        head.header("content-length"),
        Some(full.body.len().to_string().as_str())
    );
    assert_eq!(head.cache_status(), Some("HIT"));
}

// =============================================================================
// Upstream Pass-Through and Errors
// =============================================================================

#[tokio::test]
async fn test_non_image_origin_passes_through() {
    let origin = MockOrigin::new().with_response(
        "/notes.txt",
        OriginResponse::new(StatusCode::OK, "plain text")
            .with_header(header::CONTENT_TYPE, "text/plain"),
    );
    let router = test_router(test_service(&origin));

    let response = get(&router, "/resize/notes.txt").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(&response.body[..], b"plain text");
    assert_eq!(response.header("content-type"), Some("text/plain"));
    assert_eq!(response.cache_status(), Some("MISS"));
}

#[tokio::test]
async fn test_excluded_image_type_passes_through() {
    let origin = MockOrigin::new().with_response(
        "/icon.svg",
        OriginResponse::new(StatusCode::OK, "<svg/>")
            .with_header(header::CONTENT_TYPE, "image/svg+xml"),
    );
    let router = test_router(test_service(&origin));

    let response = get(&router, "/resize/icon.svg").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(&response.body[..], b"<svg/>");
}

#[tokio::test]
async fn test_upstream_error_status_is_relayed() {
    let origin = MockOrigin::new().with_response(
        "/private.jpg",
        OriginResponse::new(StatusCode::FORBIDDEN, "denied")
            .with_header(header::CONTENT_TYPE, "text/plain"),
    );
    let router = test_router(test_service(&origin));

    let response = get(&router, "/resize/private.jpg").await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(&response.body[..], b"denied");
}

#[tokio::test]
async fn test_corrupt_image_returns_codec_error() {
    let mut truncated = create_test_jpeg(64, 64);
    truncated.truncate(64);
    let origin = MockOrigin::new().with_image("/broken.jpg", truncated, "image/jpeg");
    let router = test_router(test_service(&origin));

    let response = get(&router, "/resize/broken.jpg").await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    let json: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(json["error"], "codec_error");
    assert_eq!(json["status"], 500);
}

#[tokio::test]
async fn test_unreachable_origin_is_bad_gateway() {
    let origin = MockOrigin::failing();
    let router = test_router(test_service(&origin));

    let response = get(&router, "/cat.jpg").await;

    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    let json: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(json["error"], "origin_error");
}

#[tokio::test]
async fn test_request_headers_are_filtered() {
    let origin = cat_origin();
    let router = test_router(test_service(&origin));

    let request = axum::http::Request::builder()
        .uri("/resize/cat.jpg")
        .header(header::USER_AGENT, "integration-test")
        .header(header::RANGE, "bytes=0-99")
        .header(header::ACCEPT_ENCODING, "gzip")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(router, request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let fetches = origin.fetches().await;
    assert_eq!(fetches.len(), 1);
    assert_eq!(fetches[0].method, Method::GET);
    assert!(fetches[0].headers.contains_key(header::USER_AGENT));
    assert!(!fetches[0].headers.contains_key(header::RANGE));
    assert!(!fetches[0].headers.contains_key(header::ACCEPT_ENCODING));
}

#[tokio::test]
async fn test_service_built_from_registry() {
    let origin = cat_origin();
    let service = ImageService::new(Arc::new(origin.clone()), test_registry());
    assert_eq!(service.registry().names(), vec!["crop", "resize"]);
}
