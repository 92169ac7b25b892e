//! Operation metrics for store backends.

use std::{future::Future, sync::Arc, time::Instant};

use async_trait::async_trait;
use opentelemetry::{
    metrics::{Counter, Histogram, Meter},
    KeyValue,
};
use serde_json::Value;

use crate::{BackendIdentity, SetOptions, StoreBackend, StoreKey, StoreResult};

/// Wraps a backend and records the latency and failures of every medium
/// operation it performs.
///
/// Durations go to `store_backend_operation_duration_seconds`, failures to
/// `store_backend_errors_total`, both labelled with `operation` and
/// `backend`.
pub struct InstrumentedStoreBackend<B: ?Sized> {
    inner: Arc<B>,
    durations: Histogram<f64>,
    errors: Counter<u64>,
}

impl<B: StoreBackend + ?Sized> InstrumentedStoreBackend<B> {
    pub fn new(inner: Arc<B>, meter: &Meter) -> Self {
        let durations = meter
            .f64_histogram("store_backend_operation_duration_seconds")
            .with_description("Latency of store backend operations")
            .build();
        let errors = meter
            .u64_counter("store_backend_errors_total")
            .with_description("Store backend operations that returned an error")
            .build();
        Self {
            inner,
            durations,
            errors,
        }
    }

    pub fn inner(&self) -> &Arc<B> {
        &self.inner
    }

    async fn measured<T, F>(&self, operation: &'static str, call: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>> + Send,
    {
        let labels = [
            KeyValue::new("operation", operation),
            KeyValue::new("backend", self.inner.class_name()),
        ];
        let started = Instant::now();
        let result = call.await;
        self.durations.record(started.elapsed().as_secs_f64(), &labels);
        if result.is_err() {
            self.errors.add(1, &labels);
        }
        result
    }
}

#[async_trait]
impl<B: StoreBackend + ?Sized> StoreBackend for InstrumentedStoreBackend<B> {
    fn class_name(&self) -> &'static str {
        self.inner.class_name()
    }

    fn config(&self) -> Value {
        self.inner.config()
    }

    fn identity(&self) -> &BackendIdentity {
        self.inner.identity()
    }

    fn check_key(&self, key: &StoreKey) -> StoreResult<()> {
        self.inner.check_key(key)
    }

    fn check_value(&self, value: &Value) -> StoreResult<()> {
        self.inner.check_value(value)
    }

    async fn fetch(&self, key: &StoreKey) -> StoreResult<Value> {
        self.measured("get", self.inner.fetch(key)).await
    }

    async fn store(&self, key: &StoreKey, value: &Value, options: &SetOptions) -> StoreResult<String> {
        self.measured("set", self.inner.store(key, value, options)).await
    }

    async fn contains(&self, key: &StoreKey) -> StoreResult<bool> {
        self.measured("has_key", self.inner.contains(key)).await
    }

    async fn list(&self, prefix: &StoreKey) -> StoreResult<Vec<StoreKey>> {
        self.measured("list_keys", self.inner.list(prefix)).await
    }

    async fn delete(&self, key: &StoreKey) -> StoreResult<bool> {
        self.measured("remove_key", self.inner.delete(key)).await
    }

    async fn rename(&self, source: &StoreKey, dest: &StoreKey) -> StoreResult<()> {
        self.measured("move", self.inner.rename(source, dest)).await
    }

    async fn move_key(&self, source: &StoreKey, dest: &StoreKey) -> StoreResult<()> {
        self.measured("move", self.inner.move_key(source, dest)).await
    }

    async fn get_url_for_key(&self, key: &StoreKey, protocol: Option<&str>) -> StoreResult<String> {
        self.inner.get_url_for_key(key, protocol).await
    }

    async fn public_url_for_key(&self, key: &StoreKey) -> StoreResult<Option<String>> {
        self.inner.public_url_for_key(key).await
    }

    async fn store_backend_id(&self) -> String {
        self.inner.store_backend_id().await
    }
}
