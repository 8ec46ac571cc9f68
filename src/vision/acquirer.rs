// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image acquisition from inline payloads and remote URLs

use reqwest::{header::CONTENT_LENGTH, redirect::Policy, Client};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use super::image_utils::{
    check_byte_limit, decode_base64_payload, decode_image_bytes, DecodedImage, ImageError,
};
use crate::config::ResourceLimits;

/// Maximum redirects followed for a remote image
const MAX_REDIRECTS: usize = 10;

/// Where an input image comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    RemoteUrl(String),
    InlinePayload(String),
}

impl ImageSource {
    /// Builds a source from the two optional request fields.
    ///
    /// Exactly one must be set; an empty string counts as unset.
    pub fn from_fields(
        image_url: Option<&str>,
        image_base64: Option<&str>,
    ) -> Result<Self, ImageError> {
        let image_url = image_url.filter(|s| !s.is_empty());
        let image_base64 = image_base64.filter(|s| !s.is_empty());

        match (image_url, image_base64) {
            (Some(url), None) => Ok(ImageSource::RemoteUrl(url.to_string())),
            (None, Some(payload)) => Ok(ImageSource::InlinePayload(payload.to_string())),
            _ => Err(ImageError::AmbiguousSource),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, ImageSource::RemoteUrl(_))
    }
}

/// Resolves [`ImageSource`]s into size-checked RGB bitmaps
#[derive(Debug, Clone)]
pub struct ImageAcquirer {
    client: Client,
    limits: Arc<ResourceLimits>,
}

impl ImageAcquirer {
    pub fn new(limits: Arc<ResourceLimits>) -> Result<Self, ImageError> {
        let client = Client::builder()
            .timeout(limits.remote_fetch_timeout())
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| ImageError::RemoteTransport(e.to_string()))?;

        Ok(Self { client, limits })
    }

    pub fn limits(&self) -> &Arc<ResourceLimits> {
        &self.limits
    }

    pub async fn acquire(&self, source: &ImageSource) -> Result<DecodedImage, ImageError> {
        let bytes = match source {
            ImageSource::InlinePayload(payload) => decode_base64_payload(payload)?,
            ImageSource::RemoteUrl(url) => self.fetch_url_bytes(url).await?,
        };

        // Decode re-checks the byte limit before touching the payload
        decode_image_bytes(&bytes, &self.limits)
    }

    async fn fetch_url_bytes(&self, raw_url: &str) -> Result<Vec<u8>, ImageError> {
        let url = parse_image_url(raw_url)?;
        let max_bytes = self.limits.max_image_bytes;

        let mut response = self.client.get(url).send().await.map_err(map_transport)?;

        let status = response.status();
        if !status.is_success() {
            warn!("Remote image request returned {}", status);
            return Err(ImageError::RemoteStatus(status.as_u16()));
        }

        if let Some(value) = response.headers().get(CONTENT_LENGTH) {
            let length = value
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse::<usize>().ok())
                .ok_or_else(|| ImageError::InvalidContentLength(format!("{:?}", value)))?;

            // Reject before the body is read
            if let Err(e) = check_byte_limit(length, &self.limits) {
                warn!("Remote image rejected by Content-Length: {} bytes", length);
                return Err(e);
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(map_transport)? {
            if body.len() + chunk.len() > max_bytes {
                warn!("Remote image body exceeded {} bytes while streaming", max_bytes);
                return Err(ImageError::TooLarge {
                    size: body.len() + chunk.len(),
                    limit: max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        debug!("Fetched remote image: {} bytes", body.len());
        Ok(body)
    }
}

fn parse_image_url(raw: &str) -> Result<Url, ImageError> {
    let url = Url::parse(raw.trim()).map_err(|e| ImageError::InvalidUrl(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ImageError::InvalidUrl(format!(
            "unsupported scheme '{}', expected http or https",
            other
        ))),
    }
}

fn map_transport(e: reqwest::Error) -> ImageError {
    if e.is_timeout() {
        ImageError::RemoteTimeout
    } else {
        // Strip the URL so query-string secrets never reach the client
        ImageError::RemoteTransport(e.without_url().to_string())
    }
}
