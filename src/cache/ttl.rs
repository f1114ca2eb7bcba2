//! Jittered time-to-live policy for cache writes.

// crates.io
use serde::{Deserialize, Serialize};
// self
use crate::{_prelude::*, jitter};

const MAX_EXPIRE: Duration = Duration::from_secs(30 * 24 * 60 * 60);
const MAX_RANDOM_OFFSET: Duration = Duration::from_secs(24 * 60 * 60);

/// Base expiry plus a uniformly random offset in `[0, max_random_offset)`.
///
/// Spreading expiries keeps entries written in the same burst from expiring together.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlPolicy {
	/// Base expiry.
	#[serde(with = "humantime_serde")]
	pub expire: Duration,
	/// Exclusive upper bound of the random offset.
	#[serde(with = "humantime_serde")]
	pub max_random_offset: Duration,
}
impl TtlPolicy {
	/// Policy with explicit bounds.
	pub const fn new(expire: Duration, max_random_offset: Duration) -> Self {
		Self { expire, max_random_offset }
	}

	/// One hour plus up to five minutes; used for resolved identities.
	pub const fn positive() -> Self {
		Self::new(Duration::from_secs(60 * 60), Duration::from_secs(5 * 60))
	}

	/// Five minutes plus up to thirty seconds; used for stable failures.
	pub const fn negative() -> Self {
		Self::new(Duration::from_secs(5 * 60), Duration::from_secs(30))
	}

	/// Zero TTL: nothing gets written.
	pub const fn disabled() -> Self {
		Self::new(Duration::ZERO, Duration::ZERO)
	}

	/// Draw a TTL.
	pub fn generate(&self) -> Duration {
		self.expire.saturating_add(jitter::random_below(self.max_random_offset))
	}

	/// Validate bounds; `field` names the policy in error reports.
	pub fn validate(&self, field: &'static str) -> Result<()> {
		if self.expire > MAX_EXPIRE {
			return Err(Error::Validation {
				field,
				reason: "expire must not exceed thirty days.".into(),
			});
		}
		if self.max_random_offset > MAX_RANDOM_OFFSET {
			return Err(Error::Validation {
				field,
				reason: "max_random_offset must not exceed one day.".into(),
			});
		}

		Ok(())
	}
}
