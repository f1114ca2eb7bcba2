// std
use std::cell::RefCell;
// crates.io
use rand::{Rng, SeedableRng, rngs::SmallRng};
// self
use crate::_prelude::*;

thread_local! {
	static SMALL_RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_rng(&mut rand::rng()));
}

/// Uniform duration in `[min, max]`.
pub(crate) fn random_within(min: Duration, max: Duration) -> Duration {
	if max <= min {
		return max;
	}

	SMALL_RNG.with(|cell| {
		let span = (max - min).as_nanos().min(u64::MAX as u128) as u64;
		let offset = cell.borrow_mut().random_range(0..=span);

		min + Duration::from_nanos(offset)
	})
}

/// Uniform duration in `[0, bound)`; zero when `bound` is zero.
pub(crate) fn random_below(bound: Duration) -> Duration {
	let span = bound.as_nanos().min(u64::MAX as u128) as u64;

	if span == 0 {
		return Duration::ZERO;
	}

	SMALL_RNG.with(|cell| Duration::from_nanos(cell.borrow_mut().random_range(0..span)))
}
