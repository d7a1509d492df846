use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pipeline stages that get timed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Detection,
    Recognition,
    Translation,
    Rendering,
}

/// Latest samples kept for percentiles
const SAMPLE_WINDOW: usize = 1024;

/// Running total for averages plus a bounded window of recent samples
#[derive(Debug, Default)]
struct Timings {
    total_ms: u64,
    count: u64,
    recent: VecDeque<u64>,
}

impl Timings {
    fn record(&mut self, duration: Duration) {
        let ms = duration.as_millis() as u64;
        self.total_ms = self.total_ms.saturating_add(ms);
        self.count += 1;
        if self.recent.len() == SAMPLE_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(ms);
    }

    fn avg(&self) -> u64 {
        if self.count == 0 {
            return 0;
        }
        self.total_ms / self.count
    }

    fn percentile(&self, p: f64) -> u64 {
        let (front, back) = self.recent.as_slices();
        percentile(&[front, back].concat(), p)
    }
}

/// Metrics collector for a pipeline run.
///
/// Tracks page outcomes, memory performance, remote translation calls and
/// stage durations. Cheap to clone; all clones share the same counters.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    // Page Metrics
    pages_translated: AtomicUsize,
    pages_copied: AtomicUsize,
    pages_failed: AtomicUsize,
    bubbles_detected: AtomicUsize,

    // Remote Translation Metrics
    remote_calls_success: AtomicUsize,
    remote_calls_failed: AtomicUsize,
    remote_latency: RwLock<Timings>,

    // Memory Metrics
    memory_hits: AtomicUsize,
    memory_misses: AtomicUsize,
    memory_size: AtomicUsize,

    // Stage Metrics
    detection: RwLock<Timings>,
    recognition: RwLock<Timings>,
    translation: RwLock<Timings>,
    rendering: RwLock<Timings>,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                pages_translated: AtomicUsize::new(0),
                pages_copied: AtomicUsize::new(0),
                pages_failed: AtomicUsize::new(0),
                bubbles_detected: AtomicUsize::new(0),
                remote_calls_success: AtomicUsize::new(0),
                remote_calls_failed: AtomicUsize::new(0),
                remote_latency: RwLock::default(),
                memory_hits: AtomicUsize::new(0),
                memory_misses: AtomicUsize::new(0),
                memory_size: AtomicUsize::new(0),
                detection: RwLock::default(),
                recognition: RwLock::default(),
                translation: RwLock::default(),
                rendering: RwLock::default(),
                start_time: Instant::now(),
            }),
        }
    }

    // Page Metrics
    pub fn record_page_translated(&self, bubbles: usize) {
        self.inner.pages_translated.fetch_add(1, Ordering::Relaxed);
        self.inner.bubbles_detected.fetch_add(bubbles, Ordering::Relaxed);
    }

    pub fn record_page_copied(&self) {
        self.inner.pages_copied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_page_failed(&self) {
        self.inner.pages_failed.fetch_add(1, Ordering::Relaxed);
    }

    // Remote Translation Metrics
    pub fn record_remote_call(&self, success: bool, duration: Duration) {
        if success {
            self.inner.remote_calls_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.remote_calls_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.remote_latency.write().record(duration);
    }

    // Memory Metrics
    pub fn record_memory_hit(&self) {
        self.inner.memory_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_memory_miss(&self) {
        self.inner.memory_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_memory_size(&self, size: usize) {
        self.inner.memory_size.store(size, Ordering::Relaxed);
    }

    // Stage Metrics
    pub fn record_stage(&self, stage: Stage, duration: Duration) {
        let bucket = match stage {
            Stage::Detection => &self.inner.detection,
            Stage::Recognition => &self.inner.recognition,
            Stage::Translation => &self.inner.translation,
            Stage::Rendering => &self.inner.rendering,
        };
        bucket.write().record(duration);
    }

    // Get snapshot for reporting
    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency = self.inner.remote_latency.read();
        let remote_latency_avg_ms = latency.avg();
        let remote_latency_p50_ms = latency.percentile(0.5);
        let remote_latency_p95_ms = latency.percentile(0.95);
        drop(latency);

        let memory_hits = self.inner.memory_hits.load(Ordering::Relaxed);
        let memory_misses = self.inner.memory_misses.load(Ordering::Relaxed);
        let lookups = memory_hits + memory_misses;
        let memory_hit_rate = if lookups > 0 {
            memory_hits as f64 / lookups as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            pages_translated: self.inner.pages_translated.load(Ordering::Relaxed),
            pages_copied: self.inner.pages_copied.load(Ordering::Relaxed),
            pages_failed: self.inner.pages_failed.load(Ordering::Relaxed),
            bubbles_detected: self.inner.bubbles_detected.load(Ordering::Relaxed),
            remote_calls_success: self.inner.remote_calls_success.load(Ordering::Relaxed),
            remote_calls_failed: self.inner.remote_calls_failed.load(Ordering::Relaxed),
            remote_latency_avg_ms,
            remote_latency_p50_ms,
            remote_latency_p95_ms,
            memory_hits,
            memory_misses,
            memory_hit_rate,
            memory_size: self.inner.memory_size.load(Ordering::Relaxed),
            detection_avg_ms: self.inner.detection.read().avg(),
            recognition_avg_ms: self.inner.recognition.read().avg(),
            translation_avg_ms: self.inner.translation.read().avg(),
            rendering_avg_ms: self.inner.rendering.read().avg(),
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub pages_translated: usize,
    pub pages_copied: usize,
    pub pages_failed: usize,
    pub bubbles_detected: usize,
    pub remote_calls_success: usize,
    pub remote_calls_failed: usize,
    pub remote_latency_avg_ms: u64,
    pub remote_latency_p50_ms: u64,
    pub remote_latency_p95_ms: u64,
    pub memory_hits: usize,
    pub memory_misses: usize,
    pub memory_hit_rate: f64,
    pub memory_size: usize,
    pub detection_avg_ms: u64,
    pub recognition_avg_ms: u64,
    pub translation_avg_ms: u64,
    pub rendering_avg_ms: u64,
    pub uptime_seconds: u64,
}

fn percentile(values: &[u64], p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let idx = ((values.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}
