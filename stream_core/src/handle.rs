//! Owned, lazily initialised model handles.
//!
//! A loaded model lives in a [`ModelHandle`] owned by whoever needs it (the
//! server state, a test) instead of in process-wide statics. Loading happens
//! at most once per handle; `unload` releases it.

use std::{
    future::Future,
    sync::{Arc, RwLock},
};

use anyhow::Context;
use tokio::sync::Mutex;
use tracing::info;

pub struct ModelHandle<M: ?Sized> {
    name: String,
    slot: RwLock<Option<Arc<M>>>,
    // serializes concurrent `load` calls
    init: Mutex<()>,
}

impl<M: ?Sized + Send + Sync> ModelHandle<M> {
    /// An empty handle; call [`ModelHandle::load`] before use.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slot: RwLock::new(None),
            init: Mutex::new(()),
        }
    }

    /// A handle that already holds `model`.
    pub fn loaded(name: impl Into<String>, model: Arc<M>) -> Self {
        Self {
            name: name.into(),
            slot: RwLock::new(Some(model)),
            init: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The model, if loaded.
    pub fn get(&self) -> Option<Arc<M>> {
        self.slot.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_ready(&self) -> bool {
        self.get().is_some()
    }

    /// The model, or an error telling the caller to load it first.
    pub fn require(&self) -> anyhow::Result<Arc<M>> {
        self.get()
            .ok_or_else(|| anyhow::anyhow!("{} not loaded. Call load() first.", self.name))
    }

    /// Load the model with `init` unless it is already loaded.
    ///
    /// Concurrent callers wait for the first one; `init` runs at most once
    /// while it keeps succeeding. A failed load leaves the handle empty.
    pub async fn load<F, Fut>(&self, init: F) -> anyhow::Result<Arc<M>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Arc<M>>>,
    {
        if let Some(model) = self.get() {
            return Ok(model);
        }
        let _guard = self.init.lock().await;
        if let Some(model) = self.get() {
            return Ok(model);
        }

        info!(model = %self.name, "loading model");
        let model = init()
            .await
            .with_context(|| format!("Failed to load {}", self.name))?;
        *self.slot.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&model));
        info!(model = %self.name, "model ready");
        Ok(model)
    }

    /// Drop the handle's reference. Returns whether anything was loaded.
    pub fn unload(&self) -> bool {
        let was = self.slot.write().unwrap_or_else(|e| e.into_inner()).take().is_some();
        if was {
            info!(model = %self.name, "model unloaded");
        }
        was
    }
}

impl<M: ?Sized> std::fmt::Debug for ModelHandle<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ready = self
            .slot
            .read()
            .map(|s| s.is_some())
            .unwrap_or(false);
        f.debug_struct("ModelHandle")
            .field("name", &self.name)
            .field("ready", &ready)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn loads_once_and_reuses() {
        let handle: ModelHandle<String> = ModelHandle::new("LLM model");
        assert!(!handle.is_ready());
        assert!(handle.require().unwrap_err().to_string().contains("Call load() first"));

        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let model = handle
                .load(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new("weights".to_string()))
                })
                .await
                .unwrap();
            assert_eq!(model.as_str(), "weights");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(handle.is_ready());
    }

    #[tokio::test]
    async fn failed_load_leaves_handle_empty() {
        let handle: ModelHandle<String> = ModelHandle::new("TTS model");
        let err = handle
            .load(|| async { Err(anyhow::anyhow!("no such file")) })
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("no such file"));
        assert!(!handle.is_ready());
    }

    #[tokio::test]
    async fn unload_releases_model() {
        let handle = ModelHandle::loaded("m", Arc::new(1u32));
        assert!(handle.is_ready());
        assert!(handle.unload());
        assert!(!handle.unload());
        assert!(handle.get().is_none());
    }
}
