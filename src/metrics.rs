//! Resolver telemetry through the `metrics` facade plus per-provider atomic counters.

// std
#[cfg(feature = "prometheus")] use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use metrics::Label;
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use smallvec::SmallVec;
// self
use crate::_prelude::*;

type LabelSet = SmallVec<[Label; 3]>;

const METRIC_RESOLVE_TOTAL: &str = "bearer_identity_resolve_total";
const METRIC_FAILURES_TOTAL: &str = "bearer_identity_failures_total";
const METRIC_CACHE_ERRORS_TOTAL: &str = "bearer_identity_cache_errors_total";
const METRIC_RESOLVE_DURATION: &str = "bearer_identity_resolve_duration_seconds";

/// Handle for rendering the scrape body, set by [`install_default_exporter`].
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Where a resolved outcome came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolveSource {
	/// Served from a cached positive outcome.
	CacheHit,
	/// Served from a cached negative outcome.
	NegativeHit,
	/// Existing user record found in the store.
	Store,
	/// User record created from the provider profile.
	Provisioned,
	/// Token freshly rejected by the provider for a stable reason.
	Rejected,
}
impl ResolveSource {
	/// Label value used on exported series.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::CacheHit => "cache",
			Self::NegativeHit => "negative_cache",
			Self::Store => "store",
			Self::Provisioned => "provisioned",
			Self::Rejected => "rejected",
		}
	}
}

/// Cache operation that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheOp {
	/// Lookup.
	Get,
	/// Write.
	Set,
	/// Stored value could not be decoded.
	Decode,
}
impl CacheOp {
	/// Label value used on exported series.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Get => "get",
			Self::Set => "set",
			Self::Decode => "decode",
		}
	}
}

/// Thread-safe metrics accumulator for one resolver.
#[derive(Debug, Default)]
pub struct ProviderMetrics {
	resolutions: AtomicU64,
	cache_hits: AtomicU64,
	negative_hits: AtomicU64,
	provisioned: AtomicU64,
	unauthenticated: AtomicU64,
	system_failures: AtomicU64,
	cache_errors: AtomicU64,
	last_resolve_micros: AtomicU64,
}
impl ProviderMetrics {
	/// Zeroed counters, shared.
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Record a completed resolution and its latency.
	pub fn record_resolved(&self, source: ResolveSource, duration: Duration) {
		self.resolutions.fetch_add(1, Ordering::Relaxed);

		match source {
			ResolveSource::CacheHit => {
				self.cache_hits.fetch_add(1, Ordering::Relaxed);
			},
			ResolveSource::NegativeHit => {
				self.negative_hits.fetch_add(1, Ordering::Relaxed);
			},
			ResolveSource::Provisioned => {
				self.provisioned.fetch_add(1, Ordering::Relaxed);
			},
			ResolveSource::Store | ResolveSource::Rejected => {},
		}

		self.last_resolve_micros.store(duration.as_micros() as u64, Ordering::Relaxed);
	}

	/// Record a failure reported to the caller.
	pub fn record_failure(&self, system: bool) {
		if system {
			self.system_failures.fetch_add(1, Ordering::Relaxed);
		} else {
			self.unauthenticated.fetch_add(1, Ordering::Relaxed);
		}
	}

	/// Record a swallowed cache error.
	pub fn record_cache_error(&self) {
		self.cache_errors.fetch_add(1, Ordering::Relaxed);
	}

	/// Read all counters at once.
	pub fn snapshot(&self) -> ProviderMetricsSnapshot {
		ProviderMetricsSnapshot {
			resolutions: self.resolutions.load(Ordering::Relaxed),
			cache_hits: self.cache_hits.load(Ordering::Relaxed),
			negative_hits: self.negative_hits.load(Ordering::Relaxed),
			provisioned: self.provisioned.load(Ordering::Relaxed),
			unauthenticated: self.unauthenticated.load(Ordering::Relaxed),
			system_failures: self.system_failures.load(Ordering::Relaxed),
			cache_errors: self.cache_errors.load(Ordering::Relaxed),
			last_resolve_micros: match self.last_resolve_micros.load(Ordering::Relaxed) {
				0 => None,
				value => Some(value),
			},
		}
	}
}

/// Read-only snapshot of resolver counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderMetricsSnapshot {
	/// Resolutions that ended in an identity or a stable rejection, fresh or cached.
	pub resolutions: u64,
	/// Outcomes served from cached identities.
	pub cache_hits: u64,
	/// Outcomes served from cached stable failures.
	pub negative_hits: u64,
	/// Users created on first sight.
	pub provisioned: u64,
	/// Callers rejected as unauthenticated.
	pub unauthenticated: u64,
	/// Requests that ended in a system failure.
	pub system_failures: u64,
	/// Cache errors that degraded to a miss or skipped write.
	pub cache_errors: u64,
	/// Microsecond latency of the most recent resolution.
	pub last_resolve_micros: Option<u64>,
}
impl ProviderMetricsSnapshot {
	/// Share of resolutions answered from the cache, positive or negative.
	pub fn hit_rate(&self) -> f64 {
		if self.resolutions == 0 {
			0.0
		} else {
			(self.cache_hits + self.negative_hits) as f64 / self.resolutions as f64
		}
	}
}

/// Install a process-wide Prometheus recorder for the resolver series.
///
/// Idempotent: once a recorder is installed, further calls return `Ok(())` untouched.
#[cfg(feature = "prometheus")]
pub fn install_default_exporter() -> Result<()> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	let handle = PrometheusBuilder::new()
		.install_recorder()
		.map_err(|err| Error::Metrics(err.to_string()))?;
	let _ = PROMETHEUS_HANDLE.set(handle);

	Ok(())
}

/// Handle for rendering `/metrics`, if the exporter has been installed.
#[cfg(feature = "prometheus")]
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}

/// Record a resolution outcome and its latency.
pub fn record_resolved(provider: &str, source: ResolveSource, duration: Duration) {
	let mut labels = provider_labels(provider);

	metrics::histogram!(METRIC_RESOLVE_DURATION, labels.iter()).record(duration.as_secs_f64());

	labels.push(Label::new("source", source.as_str()));

	metrics::counter!(METRIC_RESOLVE_TOTAL, labels.iter()).increment(1);
}

/// Record a failure by class (`invalid_token`, `unknown_subject`, or `system`).
pub fn record_failure(provider: &str, class: &'static str) {
	let mut labels = provider_labels(provider);

	labels.push(Label::new("class", class));

	metrics::counter!(METRIC_FAILURES_TOTAL, labels.iter()).increment(1);
}

/// Record a cache error that the resolver degraded past.
pub fn record_cache_error(provider: &str, op: CacheOp) {
	let mut labels = provider_labels(provider);

	labels.push(Label::new("op", op.as_str()));

	metrics::counter!(METRIC_CACHE_ERRORS_TOTAL, labels.iter()).increment(1);
}

fn provider_labels(provider: &str) -> LabelSet {
	let mut labels = LabelSet::new();

	labels.push(Label::new("provider", provider.to_owned()));

	labels
}

#[cfg(test)]
mod tests {
	// std
	use std::borrow::Borrow;
	// crates.io
	use metrics_util::{
		CompositeKey, MetricKind,
		debugging::{DebugValue, DebuggingRecorder},
	};
	// self
	use super::*;

	fn capture_metrics<F>(f: F) -> Vec<(CompositeKey, DebugValue)>
	where
		F: FnOnce(),
	{
		let recorder = DebuggingRecorder::new();
		let snapshotter = recorder.snapshotter();

		metrics::with_local_recorder(&recorder, f);

		snapshotter
			.snapshot()
			.into_vec()
			.into_iter()
			.map(|(key, _, _, value)| (key, value))
			.collect()
	}

	fn counter_value(
		snapshot: &[(CompositeKey, DebugValue)],
		name: &str,
		labels: &[(&str, &str)],
	) -> u64 {
		snapshot
			.iter()
			.find_map(|(key, value)| {
				(key.kind() == MetricKind::Counter
					&& Borrow::<str>::borrow(key.key().name()) == name
					&& labels_match(key, labels))
				.then(|| match value {
					DebugValue::Counter(value) => *value,
					_ => 0,
				})
			})
			.unwrap_or(0)
	}

	fn labels_match(key: &CompositeKey, expected: &[(&str, &str)]) -> bool {
		let mut labels: Vec<_> =
			key.key().labels().map(|label| (label.key(), label.value())).collect();
		let mut expected = expected.to_vec();

		labels.sort_unstable();
		expected.sort_unstable();

		labels == expected
	}

	#[test]
	fn resolutions_are_counted_per_source() {
		let snapshot = capture_metrics(|| {
			record_resolved("firebase", ResolveSource::CacheHit, Duration::from_millis(1));
			record_resolved("firebase", ResolveSource::CacheHit, Duration::from_millis(1));
			record_resolved("firebase", ResolveSource::Provisioned, Duration::from_millis(30));
			record_resolved("firebase", ResolveSource::Rejected, Duration::from_millis(12));
		});

		assert_eq!(
			counter_value(
				&snapshot,
				"bearer_identity_resolve_total",
				&[("provider", "firebase"), ("source", "cache")]
			),
			2
		);
		assert_eq!(
			counter_value(
				&snapshot,
				"bearer_identity_resolve_total",
				&[("provider", "firebase"), ("source", "provisioned")]
			),
			1
		);
		assert_eq!(
			counter_value(
				&snapshot,
				"bearer_identity_resolve_total",
				&[("provider", "firebase"), ("source", "rejected")]
			),
			1
		);
		assert!(snapshot.iter().any(|(key, value)| {
			key.kind() == MetricKind::Histogram
				&& Borrow::<str>::borrow(key.key().name())
					== "bearer_identity_resolve_duration_seconds"
				&& matches!(value, DebugValue::Histogram(values) if values.len() == 4)
		}));
	}

	#[test]
	fn failures_and_cache_errors_carry_their_labels() {
		let snapshot = capture_metrics(|| {
			record_failure("firebase", "invalid_token");
			record_failure("firebase", "system");
			record_cache_error("firebase", CacheOp::Set);
		});

		assert_eq!(
			counter_value(
				&snapshot,
				"bearer_identity_failures_total",
				&[("provider", "firebase"), ("class", "invalid_token")]
			),
			1
		);
		assert_eq!(
			counter_value(
				&snapshot,
				"bearer_identity_failures_total",
				&[("provider", "firebase"), ("class", "system")]
			),
			1
		);
		assert_eq!(
			counter_value(
				&snapshot,
				"bearer_identity_cache_errors_total",
				&[("provider", "firebase"), ("op", "set")]
			),
			1
		);
	}

	#[test]
	fn snapshot_reports_hit_rate() {
		let metrics = ProviderMetrics::new();

		metrics.record_resolved(ResolveSource::CacheHit, Duration::from_micros(10));
		metrics.record_resolved(ResolveSource::NegativeHit, Duration::from_micros(10));
		metrics.record_resolved(ResolveSource::Store, Duration::from_micros(10));
		metrics.record_resolved(ResolveSource::Provisioned, Duration::from_micros(10));
		metrics.record_failure(true);
		metrics.record_cache_error();

		let snapshot = metrics.snapshot();

		assert_eq!(snapshot.resolutions, 4);
		assert_eq!(snapshot.provisioned, 1);
		assert_eq!(snapshot.system_failures, 1);
		assert_eq!(snapshot.cache_errors, 1);
		assert_eq!(snapshot.last_resolve_micros, Some(10));
		assert!((snapshot.hit_rate() - 0.5).abs() < f64::EPSILON);
	}
}
