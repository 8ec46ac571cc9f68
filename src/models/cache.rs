// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Bounded LRU cache of loaded inference bundles
//!
//! All resident/in-flight bookkeeping lives behind one mutex. A miss starts
//! the load in its own task and publishes a shared future, so concurrent
//! callers for the same model await one load and a caller that goes away
//! does not cancel it. The load task inserts the bundle (evicting the least
//! recently used entry at capacity) before any waiter sees the result.

use futures::future::{BoxFuture, FutureExt, Shared};
use lru::LruCache;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use super::registry::{ModelId, ModelRegistry, UnsupportedModel};
use super::source::{InferenceBundle, ModelLoadError, ModelSource};
use crate::config::{ConfigError, Device, DeviceConfig};

type LoadResult = Result<Arc<InferenceBundle>, ModelLoadError>;
type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CacheError {
    #[error(transparent)]
    Unavailable(#[from] ModelLoadError),

    #[error(transparent)]
    Configuration(#[from] ConfigError),
}

/// Counters exposed through `/info`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub failed_loads: u64,
    pub evictions: u64,
    pub resident: usize,
    pub capacity: usize,
}

struct CacheState {
    resident: LruCache<ModelId, Arc<InferenceBundle>>,
    loading: HashMap<ModelId, SharedLoad>,
    stats: CacheStats,
}

struct CacheInner {
    state: Mutex<CacheState>,
    registry: Arc<ModelRegistry>,
    source: Arc<dyn ModelSource>,
    device: DeviceConfig,
    load_permits: Arc<Semaphore>,
}

#[derive(Clone)]
pub struct ModelCache {
    inner: Arc<CacheInner>,
}

impl ModelCache {
    pub fn new(
        registry: Arc<ModelRegistry>,
        source: Arc<dyn ModelSource>,
        device: DeviceConfig,
        max_loaded_models: usize,
    ) -> Result<Self, ConfigError> {
        let capacity = NonZeroUsize::new(max_loaded_models).ok_or(ConfigError::NonPositive {
            name: "max_loaded_models",
            value: max_loaded_models.to_string(),
        })?;

        let stats = CacheStats {
            capacity: capacity.get(),
            ..Default::default()
        };

        Ok(Self {
            inner: Arc::new(CacheInner {
                state: Mutex::new(CacheState {
                    resident: LruCache::new(capacity),
                    loading: HashMap::new(),
                    stats,
                }),
                registry,
                source,
                device,
                load_permits: Arc::new(Semaphore::new(capacity.get())),
            }),
        })
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.inner.registry
    }

    pub fn device_config(&self) -> &DeviceConfig {
        &self.inner.device
    }

    /// Validates a requested identifier. No load is attempted.
    pub fn resolve(&self, identifier: &str) -> Result<ModelId, UnsupportedModel> {
        self.inner.registry.resolve(identifier)
    }

    /// Returns the resident bundle or loads it, sharing any in-flight load.
    pub async fn get_or_load(&self, model_id: &ModelId) -> Result<Arc<InferenceBundle>, CacheError> {
        let pending = {
            let mut state = self.inner.state.lock().await;

            if let Some(bundle) = state.resident.get(model_id).cloned() {
                state.stats.hits += 1;
                debug!("Model cache hit: {}", model_id);
                return Ok(bundle);
            }
            state.stats.misses += 1;

            match state.loading.get(model_id) {
                Some(load) => {
                    debug!("Joining in-flight load for {}", model_id);
                    load.clone()
                }
                None => {
                    let device = self.inner.device.resolve()?;
                    let load = self.spawn_load(model_id.clone(), device);
                    state.loading.insert(model_id.clone(), load.clone());
                    load
                }
            }
        };

        Ok(pending.await?)
    }

    /// Runs the load on its own task. The task holds the state lock only
    /// after the source returns, so the caller can register the shared
    /// future first.
    fn spawn_load(&self, model_id: ModelId, device: Device) -> SharedLoad {
        let inner = Arc::clone(&self.inner);

        let task = tokio::spawn(async move {
            let result = match Arc::clone(&inner.load_permits).acquire_owned().await {
                Ok(_permit) => {
                    info!("Loading model {} on {}", model_id, device);
                    let started = Instant::now();
                    // A panicking loader must still reach the bookkeeping below.
                    let loaded = AssertUnwindSafe(inner.source.load(&model_id, device))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| {
                            Err(ModelLoadError::Other(format!(
                                "model loader panicked: {}",
                                panic_message(panic.as_ref())
                            )))
                        });
                    if loaded.is_ok() {
                        info!(
                            "Loaded model {} in {:.2}s",
                            model_id,
                            started.elapsed().as_secs_f64()
                        );
                    }
                    loaded.map(Arc::new)
                }
                Err(_) => Err(ModelLoadError::Other("load permits closed".to_string())),
            };

            let mut state = inner.state.lock().await;
            state.loading.remove(&model_id);

            match &result {
                Ok(bundle) => {
                    state.stats.loads += 1;
                    if let Some((evicted, _)) =
                        state.resident.push(model_id.clone(), Arc::clone(bundle))
                    {
                        if evicted != model_id {
                            state.stats.evictions += 1;
                            info!("Evicted model {} (least recently used)", evicted);
                        }
                    }
                    state.stats.resident = state.resident.len();
                }
                Err(e) => {
                    state.stats.failed_loads += 1;
                    warn!("Failed to load model {}: {}", model_id, e);
                }
            }

            result
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(ModelLoadError::Other(format!("load task aborted: {}", e))),
            }
        }
        .boxed()
        .shared()
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.inner.state.lock().await;
        let mut stats = state.stats.clone();
        stats.resident = state.resident.len();
        stats
    }

    /// Resident identifiers, most recently used first
    pub async fn resident_models(&self) -> Vec<ModelId> {
        let state = self.inner.state.lock().await;
        state.resident.iter().map(|(id, _)| id.clone()).collect()
    }

    pub async fn is_resident(&self, model_id: &ModelId) -> bool {
        self.inner.state.lock().await.resident.contains(model_id)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
