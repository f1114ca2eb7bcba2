//! Retry budgeting for identity provider calls.
//!
//! The resolver never retries; transient provider failures are retried here, inside the
//! client, bounded by a per-attempt timeout and an overall deadline.

// crates.io
use serde::{Deserialize, Serialize};
use tokio::time;
// self
use crate::{_prelude::*, jitter};

const MAX_BACKOFF: Duration = Duration::from_secs(5 * 60);
const MAX_DEADLINE: Duration = Duration::from_secs(10 * 60);

/// Randomisation applied to computed backoff delays.
#[derive(Clone, Debug, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
	/// Deterministic exponential schedule.
	None,
	/// Delay drawn between 80% and 100% of the exponential value.
	#[default]
	Full,
}

/// Retry configuration for provider HTTP calls.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
	/// Retries performed after the initial attempt.
	pub max_retries: u32,
	/// Timeout applied to each individual attempt.
	#[serde(with = "humantime_serde")]
	pub attempt_timeout: Duration,
	/// Delay before the first retry.
	#[serde(with = "humantime_serde")]
	pub initial_backoff: Duration,
	/// Ceiling for exponential backoff growth.
	#[serde(with = "humantime_serde")]
	pub max_backoff: Duration,
	/// Wall-clock bound on the whole attempt sequence.
	#[serde(with = "humantime_serde")]
	pub deadline: Duration,
	/// Backoff randomisation.
	pub jitter: JitterStrategy,
}
impl RetryPolicy {
	/// A policy that performs exactly one attempt.
	pub fn no_retry(attempt_timeout: Duration) -> Self {
		Self { max_retries: 0, attempt_timeout, deadline: attempt_timeout, ..Default::default() }
	}

	/// Validate invariants for retry configuration.
	pub fn validate(&self) -> Result<()> {
		if self.attempt_timeout < Duration::from_millis(50) {
			return Err(Error::Validation {
				field: "retry.attempt_timeout",
				reason: "Must be at least 50 ms.".into(),
			});
		}
		if self.initial_backoff.is_zero() {
			return Err(Error::Validation {
				field: "retry.initial_backoff",
				reason: "Must be greater than zero.".into(),
			});
		}
		if self.max_backoff < self.initial_backoff {
			return Err(Error::Validation {
				field: "retry.max_backoff",
				reason: "Must be greater than or equal to initial_backoff.".into(),
			});
		}
		if self.max_backoff > MAX_BACKOFF {
			return Err(Error::Validation {
				field: "retry.max_backoff",
				reason: "Must not exceed five minutes.".into(),
			});
		}
		if self.deadline > MAX_DEADLINE {
			return Err(Error::Validation {
				field: "retry.deadline",
				reason: "Must not exceed ten minutes.".into(),
			});
		}
		if self.deadline < self.attempt_timeout {
			return Err(Error::Validation {
				field: "retry.deadline",
				reason: "Must be greater than or equal to attempt_timeout.".into(),
			});
		}

		Ok(())
	}

	/// Backoff before retry number `attempt` (zero-based).
	pub fn backoff(&self, attempt: u32) -> Duration {
		let factor = 1_u32 << attempt.min(16);
		let bounded = self
			.initial_backoff
			.checked_mul(factor)
			.unwrap_or(self.max_backoff)
			.min(self.max_backoff)
			.max(self.initial_backoff);

		match self.jitter {
			JitterStrategy::None => bounded,
			JitterStrategy::Full =>
				jitter::random_within(bounded.mul_f64(0.8).max(self.initial_backoff), bounded),
		}
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: 2,
			attempt_timeout: Duration::from_secs(2),
			initial_backoff: Duration::from_millis(100),
			max_backoff: Duration::from_secs(1),
			deadline: Duration::from_secs(5),
			jitter: JitterStrategy::Full,
		}
	}
}

/// Result of budgeting the next attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptBudget {
	/// Another attempt may run within the given timeout.
	Granted {
		/// Timeout allotted to the attempt.
		timeout: Duration,
	},
	/// Deadline reached; no further attempts.
	Exhausted,
}

/// Tracks retries consumed and the remaining deadline for one logical call.
#[derive(Debug)]
pub struct RetryExecutor<'a> {
	policy: &'a RetryPolicy,
	deadline: Instant,
	retries_used: u32,
}
impl<'a> RetryExecutor<'a> {
	/// Start a retry sequence governed by `policy`.
	pub fn new(policy: &'a RetryPolicy) -> Self {
		Self { policy, deadline: Instant::now() + policy.deadline.min(MAX_DEADLINE), retries_used: 0 }
	}

	/// Budget the next attempt.
	pub fn attempt_budget(&self) -> AttemptBudget {
		let timeout = self.remaining().min(self.policy.attempt_timeout);

		if timeout.is_zero() { AttemptBudget::Exhausted } else { AttemptBudget::Granted { timeout } }
	}

	/// Remaining wall-clock budget.
	pub fn remaining(&self) -> Duration {
		self.deadline.saturating_duration_since(Instant::now())
	}

	/// Consume a retry and sleep for its backoff; returns false once retries are spent.
	pub async fn backoff(&mut self) -> bool {
		if self.retries_used >= self.policy.max_retries {
			return false;
		}

		let delay = self.policy.backoff(self.retries_used).min(self.remaining());

		self.retries_used += 1;

		tracing::debug!(retry = self.retries_used, ?delay, "backing off before provider retry");

		if !delay.is_zero() {
			time::sleep(delay).await;
		}

		true
	}
}
