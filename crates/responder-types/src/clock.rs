//! Clock abstraction.
//!
//! The engine never reads wall-clock time directly; it takes a [`Clock`]
//! so deadline and escalation behaviour can be driven deterministically
//! in tests.

use chrono::Utc;
use std::sync::Mutex;

use crate::Timestamp;

/// Source of the current time.
pub trait Clock: Send + Sync {
	fn now(&self) -> Timestamp;
}

/// Production clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> Timestamp {
		Utc::now()
	}
}

/// Manually advanced clock for tests.
#[derive(Debug)]
pub struct ManualClock {
	now: Mutex<Timestamp>,
}

impl ManualClock {
	pub fn new(start: Timestamp) -> Self {
		Self {
			now: Mutex::new(start),
		}
	}

	pub fn advance(&self, by: chrono::Duration) {
		let mut now = self.lock();
		*now += by;
	}

	pub fn set(&self, to: Timestamp) {
		*self.lock() = to;
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, Timestamp> {
		self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}

impl Clock for ManualClock {
	fn now(&self) -> Timestamp {
		*self.lock()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration;

	#[test]
	fn manual_clock_advances() {
		let start = Utc::now();
		let clock = ManualClock::new(start);
		assert_eq!(clock.now(), start);

		clock.advance(Duration::minutes(5));
		assert_eq!(clock.now(), start + Duration::minutes(5));
	}
}
