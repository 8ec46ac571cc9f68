// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! EmbeddingPipeline tests with the stub model source
//!
//! A counting HTTP server stands in for remote images so tests can assert
//! that rejected requests perform zero acquisitions.

use axum::{http::header, routing::get, Router};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imbeddings::config::{DeviceConfig, ResourceLimits};
use imbeddings::embeddings::{EmbeddingError, EmbeddingPipeline, ImageInput};
use imbeddings::models::{ModelCache, ModelLoadError, ModelRegistry, StubModelSource};
use imbeddings::vision::{ImageAcquirer, ImageError, ImageSource};
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const HIDDEN: usize = 8;

fn png_base64(width: u32, height: u32, color: [u8; 3]) -> String {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)));
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    STANDARD.encode(buf)
}

struct Harness {
    pipeline: EmbeddingPipeline,
    source: Arc<StubModelSource>,
}

fn harness_with(limits: ResourceLimits, source: StubModelSource) -> Harness {
    let limits = Arc::new(limits);
    let registry = Arc::new(ModelRegistry::parse("m\nm2\n").unwrap());
    let source = Arc::new(source);
    let cache = ModelCache::new(
        registry,
        source.clone(),
        DeviceConfig::cpu(),
        limits.max_loaded_models,
    )
    .unwrap();
    let acquirer = ImageAcquirer::new(limits).unwrap();

    Harness {
        pipeline: EmbeddingPipeline::new(acquirer, cache),
        source,
    }
}

fn harness() -> Harness {
    harness_with(ResourceLimits::default(), StubModelSource::new(HIDDEN, 5))
}

/// Serves a PNG at `/img.png` and counts requests
async fn counting_server() -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let png = STANDARD.decode(png_base64(2, 2, [1, 2, 3])).unwrap();
    let counter = hits.clone();
    let app = Router::new().route(
        "/img.png",
        get(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let png = png.clone();
            async move { ([(header::CONTENT_TYPE, "image/png")], png) }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, hits)
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

#[tokio::test]
async fn test_single_pixel_png() {
    let h = harness();
    let inputs = vec![ImageSource::InlinePayload(png_base64(1, 1, [200, 100, 50]))];

    let batch = h.pipeline.create_embeddings("m", &inputs).await.unwrap();

    assert_eq!(batch.model.as_str(), "m");
    assert_eq!(batch.embeddings.len(), 1);
    assert_eq!(batch.embedding_dim, HIDDEN);
    let pair = &batch.embeddings[0];
    assert_eq!(pair.cls.len(), HIDDEN);
    assert_eq!(pair.mean.len(), HIDDEN);
    assert!((norm(&pair.cls) - 1.0).abs() < 1e-5);
    assert!((norm(&pair.mean) - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn test_output_preserves_input_order() {
    let h = harness();
    let red = ImageSource::InlinePayload(png_base64(3, 3, [255, 0, 0]));
    let blue = ImageSource::InlinePayload(png_base64(3, 3, [0, 0, 255]));
    let green = ImageSource::InlinePayload(png_base64(3, 3, [0, 255, 0]));

    let forward = h
        .pipeline
        .create_embeddings("m", &[red.clone(), blue.clone(), green.clone()])
        .await
        .unwrap();
    let reversed = h
        .pipeline
        .create_embeddings("m", &[green, blue, red])
        .await
        .unwrap();

    assert_eq!(forward.embeddings.len(), 3);
    assert_ne!(forward.embeddings[0], forward.embeddings[1]);
    assert_eq!(forward.embeddings[0], reversed.embeddings[2]);
    assert_eq!(forward.embeddings[1], reversed.embeddings[1]);
    assert_eq!(forward.embeddings[2], reversed.embeddings[0]);
    // One load served both requests
    assert_eq!(h.source.load_count(), 1);
}

#[tokio::test]
async fn test_mixed_remote_and_inline_inputs() {
    let h = harness();
    let (addr, hits) = counting_server().await;
    let inputs = vec![
        ImageInput::url(format!("http://{}/img.png", addr)),
        ImageInput::base64(format!("data:image/png;base64,{}", png_base64(2, 2, [9, 9, 9]))),
    ];

    let batch = h
        .pipeline
        .create_embeddings_from_fields("m", &inputs)
        .await
        .unwrap();

    assert_eq!(batch.embeddings.len(), 2);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    for pair in &batch.embeddings {
        assert_eq!(pair.cls.len(), pair.mean.len());
    }
}

#[tokio::test]
async fn test_batch_too_large_performs_no_acquisition() {
    let h = harness();
    let (addr, hits) = counting_server().await;
    let url = format!("http://{}/img.png", addr);
    let inputs: Vec<ImageSource> = (0..5).map(|_| ImageSource::RemoteUrl(url.clone())).collect();

    let err = h.pipeline.create_embeddings("m", &inputs).await.unwrap_err();

    assert!(matches!(err, EmbeddingError::InvalidRequest(_)));
    assert!(err.is_client_error());
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(h.source.load_count(), 0);
}

#[tokio::test]
async fn test_unsupported_model_performs_no_acquisition() {
    let h = harness();
    let (addr, hits) = counting_server().await;
    let inputs = vec![ImageSource::RemoteUrl(format!("http://{}/img.png", addr))];

    let err = h
        .pipeline
        .create_embeddings("unknown/model", &inputs)
        .await
        .unwrap_err();

    assert!(matches!(err, EmbeddingError::UnsupportedModel(_)));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(h.source.load_count(), 0);
}

#[tokio::test]
async fn test_empty_model_and_empty_input() {
    let h = harness();
    let one = vec![ImageSource::InlinePayload(png_base64(1, 1, [0, 0, 0]))];

    assert!(matches!(
        h.pipeline.create_embeddings("", &one).await,
        Err(EmbeddingError::InvalidRequest(_))
    ));
    assert!(matches!(
        h.pipeline.create_embeddings("m", &[]).await,
        Err(EmbeddingError::InvalidRequest(_))
    ));
    // Empty model is reported before empty input
    match h.pipeline.create_embeddings("", &[]).await {
        Err(EmbeddingError::InvalidRequest(msg)) => assert!(msg.contains("model")),
        other => panic!("unexpected: {:?}", other),
    }
}

#[tokio::test]
async fn test_first_bad_item_aborts_with_its_index() {
    let h = harness();
    let (addr, hits) = counting_server().await;
    let inputs = vec![
        ImageSource::InlinePayload(png_base64(1, 1, [1, 1, 1])),
        ImageSource::InlinePayload("%%%not-base64%%%".to_string()),
        ImageSource::RemoteUrl(format!("http://{}/img.png", addr)),
    ];

    let err = h.pipeline.create_embeddings("m", &inputs).await.unwrap_err();

    assert!(matches!(err, EmbeddingError::InvalidImage { index: 1, .. }));
    assert_eq!(err.index(), Some(1));
    // Later items are never fetched and no model is loaded
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(h.source.load_count(), 0);
}

#[tokio::test]
async fn test_ambiguous_item_rejected_before_io() {
    let h = harness();
    let (addr, hits) = counting_server().await;
    let url = format!("http://{}/img.png", addr);
    let inputs = vec![
        ImageInput::url(url.clone()),
        ImageInput {
            image_url: Some(url),
            image_base64: Some(png_base64(1, 1, [0, 0, 0])),
        },
    ];

    let err = h
        .pipeline
        .create_embeddings_from_fields("m", &inputs)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        EmbeddingError::InvalidImage {
            index: 1,
            source: ImageError::AmbiguousSource
        }
    );
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let neither = vec![ImageInput::default()];
    assert!(matches!(
        h.pipeline.create_embeddings_from_fields("m", &neither).await,
        Err(EmbeddingError::InvalidImage { index: 0, .. })
    ));
}

#[tokio::test]
async fn test_oversized_image_reports_index() {
    let h = harness();
    let inputs = vec![
        ImageSource::InlinePayload(png_base64(1, 1, [1, 1, 1])),
        ImageSource::InlinePayload(png_base64(257, 4, [1, 1, 1])),
    ];

    let err = h.pipeline.create_embeddings("m", &inputs).await.unwrap_err();
    assert!(matches!(err, EmbeddingError::ImageTooLarge { index: 1, .. }));
}

#[tokio::test]
async fn test_byte_limit_reports_too_large() {
    let limits = ResourceLimits {
        max_image_bytes: 64,
        ..Default::default()
    };
    let h = harness_with(limits, StubModelSource::new(HIDDEN, 5));
    let inputs = vec![ImageSource::InlinePayload(STANDARD.encode([7u8; 65]))];

    let err = h.pipeline.create_embeddings("m", &inputs).await.unwrap_err();
    assert!(matches!(
        err,
        EmbeddingError::ImageTooLarge {
            index: 0,
            source: ImageError::TooLarge { size: 65, limit: 64 }
        }
    ));
}

#[tokio::test]
async fn test_model_unavailable_is_server_error() {
    let source = StubModelSource::new(HIDDEN, 5);
    source.set_failure(Some(ModelLoadError::MissingCredentials));
    let h = harness_with(ResourceLimits::default(), source);
    let inputs = vec![ImageSource::InlinePayload(png_base64(1, 1, [0, 0, 0]))];

    let err = h.pipeline.create_embeddings("m", &inputs).await.unwrap_err();

    assert_eq!(
        err,
        EmbeddingError::ModelUnavailable(ModelLoadError::MissingCredentials)
    );
    assert!(!err.is_client_error());
    assert!(h.pipeline.cache().resident_models().await.is_empty());
}

#[tokio::test]
async fn test_single_token_output_is_inference_error() {
    let h = harness_with(ResourceLimits::default(), StubModelSource::new(HIDDEN, 1));
    let inputs = vec![ImageSource::InlinePayload(png_base64(1, 1, [0, 0, 0]))];

    let err = h.pipeline.create_embeddings("m", &inputs).await.unwrap_err();
    assert!(matches!(err, EmbeddingError::Inference(_)));
}

#[tokio::test]
async fn test_full_batch_is_accepted() {
    let h = harness();
    let inputs: Vec<ImageSource> = (0..4)
        .map(|i| ImageSource::InlinePayload(png_base64(2, 2, [i * 60, 10, 10])))
        .collect();

    let batch = h.pipeline.create_embeddings("m", &inputs).await.unwrap();

    assert_eq!(batch.embeddings.len(), 4);
    for pair in &batch.embeddings {
        assert_eq!(pair.cls.len(), batch.embedding_dim);
        assert_eq!(pair.mean.len(), batch.embedding_dim);
        assert!((norm(&pair.cls) - 1.0).abs() < 1e-5);
        assert!((norm(&pair.mean) - 1.0).abs() < 1e-5);
    }
}

#[tokio::test]
async fn test_pipeline_shares_acquirer_limits() {
    let limits = Arc::new(ResourceLimits::default());
    let registry = Arc::new(ModelRegistry::parse("m\n").unwrap());
    let cache = ModelCache::new(
        registry,
        Arc::new(StubModelSource::new(HIDDEN, 5)),
        DeviceConfig::cpu(),
        limits.max_loaded_models,
    )
    .unwrap();
    let acquirer = ImageAcquirer::new(Arc::clone(&limits)).unwrap();
    let pipeline = EmbeddingPipeline::new(acquirer, cache);

    assert!(Arc::ptr_eq(pipeline.limits(), &limits));
}
