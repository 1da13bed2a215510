//! Analytics records and derived performance metrics

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{LoadingState, OperationId, Priority};
use crate::network::NetworkQuality;

/// Immutable record of one settled loading attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadingAnalyticsRecord {
    #[serde(rename = "operation-id")]
    pub operation_id: OperationId,

    /// Caller-supplied label, e.g. `page` or `image`
    pub kind: String,

    #[serde(rename = "started-at")]
    pub started_at: DateTime<Utc>,

    #[serde(rename = "ended-at")]
    pub ended_at: DateTime<Utc>,

    #[serde(rename = "duration-ms")]
    pub duration_ms: u64,

    pub success: bool,

    /// Terminal state the attempt reached
    pub state: LoadingState,

    #[serde(rename = "error-message", default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(rename = "network-quality")]
    pub network_quality: NetworkQuality,

    #[serde(rename = "cache-hit", default, skip_serializing_if = "Option::is_none")]
    pub cache_hit: Option<bool>,

    #[serde(rename = "retry-count")]
    pub retry_count: u32,
}

/// Ring buffer of the most recent analytics records; oldest evicted first
#[derive(Debug, Clone)]
pub struct AnalyticsBuffer {
    records: VecDeque<LoadingAnalyticsRecord>,
    capacity: usize,
    total_recorded: u64,
}

impl AnalyticsBuffer {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "AnalyticsBuffer::new: called");
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            total_recorded: 0,
        }
    }

    /// Append a record, evicting the oldest when full
    pub fn push(&mut self, record: LoadingAnalyticsRecord) {
        self.total_recorded += 1;
        if self.capacity == 0 {
            return;
        }
        while self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Records oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &LoadingAnalyticsRecord> {
        self.records.iter()
    }

    pub fn to_vec(&self) -> Vec<LoadingAnalyticsRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records ever pushed, including evicted ones
    pub fn total_recorded(&self) -> u64 {
        self.total_recorded
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

/// Per-kind aggregate over the retained history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KindMetrics {
    pub total: u64,
    pub successful: u64,
    #[serde(rename = "average-duration-ms")]
    pub average_duration_ms: f64,
}

/// Derived view over the analytics history and live registry state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PerformanceMetrics {
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    pub success_rate: f64,
    pub average_duration_ms: f64,
    pub slowest_duration_ms: u64,
    pub cache_hit_rate: f64,
    pub network_quality_changes: u64,
    pub active_loaders: usize,
    pub priority: Priority,
    pub network_quality: NetworkQuality,
    pub by_kind: BTreeMap<String, KindMetrics>,
}

impl PerformanceMetrics {
    /// Aggregate the retained records
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a LoadingAnalyticsRecord>) -> Self {
        let mut metrics = Self::default();
        let mut total_duration: u64 = 0;
        let mut cache_lookups: u64 = 0;
        let mut cache_hits: u64 = 0;
        let mut kind_durations: BTreeMap<String, u64> = BTreeMap::new();

        for record in records {
            metrics.total_operations += 1;
            if record.success {
                metrics.successful_operations += 1;
            } else {
                metrics.failed_operations += 1;
            }
            total_duration += record.duration_ms;
            metrics.slowest_duration_ms = metrics.slowest_duration_ms.max(record.duration_ms);

            if let Some(hit) = record.cache_hit {
                cache_lookups += 1;
                if hit {
                    cache_hits += 1;
                }
            }

            let kind = metrics.by_kind.entry(record.kind.clone()).or_default();
            kind.total += 1;
            if record.success {
                kind.successful += 1;
            }
            *kind_durations.entry(record.kind.clone()).or_default() += record.duration_ms;
        }

        if metrics.total_operations > 0 {
            metrics.success_rate = metrics.successful_operations as f64 / metrics.total_operations as f64;
            metrics.average_duration_ms = total_duration as f64 / metrics.total_operations as f64;
        }
        if cache_lookups > 0 {
            metrics.cache_hit_rate = cache_hits as f64 / cache_lookups as f64;
        }
        for (kind, summary) in metrics.by_kind.iter_mut() {
            let duration = kind_durations.get(kind).copied().unwrap_or(0);
            summary.average_duration_ms = duration as f64 / summary.total as f64;
        }

        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: &str, duration_ms: u64, success: bool, cache_hit: Option<bool>) -> LoadingAnalyticsRecord {
        let started_at = Utc::now();
        LoadingAnalyticsRecord {
            operation_id: OperationId::generate(kind),
            kind: kind.to_string(),
            started_at,
            ended_at: started_at + chrono::Duration::milliseconds(duration_ms as i64),
            duration_ms,
            success,
            state: if success { LoadingState::Success } else { LoadingState::Error },
            error_message: (!success).then(|| "boom".to_string()),
            network_quality: NetworkQuality::Good,
            cache_hit,
            retry_count: 0,
        }
    }

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let mut buffer = AnalyticsBuffer::new(100);
        for i in 0..150 {
            buffer.push(record(&format!("k{}", i), i, true, None));
        }
        assert_eq!(buffer.len(), 100);
        assert_eq!(buffer.total_recorded(), 150);
        assert_eq!(buffer.iter().next().map(|r| r.kind.as_str()), Some("k50"));
        assert_eq!(buffer.iter().last().map(|r| r.kind.as_str()), Some("k149"));
    }

    #[test]
    fn test_metrics_from_records() {
        let records = [
            record("page", 100, true, Some(false)),
            record("page", 300, false, None),
            record("image", 200, true, Some(true)),
        ];
        let metrics = PerformanceMetrics::from_records(records.iter());

        assert_eq!(metrics.total_operations, 3);
        assert_eq!(metrics.successful_operations, 2);
        assert_eq!(metrics.failed_operations, 1);
        assert!((metrics.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(metrics.average_duration_ms, 200.0);
        assert_eq!(metrics.slowest_duration_ms, 300);
        assert_eq!(metrics.cache_hit_rate, 0.5);
        assert_eq!(metrics.by_kind["page"].total, 2);
        assert_eq!(metrics.by_kind["page"].average_duration_ms, 200.0);
        assert_eq!(metrics.by_kind["image"].successful, 1);
    }

    #[test]
    fn test_empty_metrics() {
        let metrics = PerformanceMetrics::from_records(std::iter::empty());
        assert_eq!(metrics.total_operations, 0);
        assert_eq!(metrics.success_rate, 0.0);
    }

    #[test]
    fn test_record_serialization() {
        let json = serde_json::to_string(&record("page", 10, false, None)).unwrap();
        assert!(json.contains("operation-id"));
        assert!(json.contains("error-message"));
        assert!(!json.contains("cache-hit"));
    }
}
