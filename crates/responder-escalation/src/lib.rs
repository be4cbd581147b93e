//! Deadline tracking and escalation for outstanding offers.
//!
//! The scheduler keeps a time-ordered set of `(assignment,
//! response_deadline)` pairs plus a coarser per-emergency watchdog for
//! emergencies that have gone without a single accepted assignment for
//! too long. A poll loop drains everything past deadline on each tick
//! and hands the results to the orchestrator as events; it never acts on
//! assignments itself. Removal is idempotent everywhere: untracking an
//! absent entry is a no-op, not an error.

use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use responder_types::{AssignmentId, Clock, EmergencyId, Timestamp};

/// Deadline expiries reported to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
	/// An offer sat past its response deadline with no volunteer response.
	OfferExpired {
		assignment_id: AssignmentId,
		emergency_id: EmergencyId,
	},
	/// An emergency has had zero accepted assignments for longer than the
	/// escalation timeout.
	EscalationDue { emergency_id: EmergencyId },
}

/// Locks a queue, recovering from a poisoned mutex.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Time-ordered offer set. Earliest deadline pops first.
#[derive(Default)]
struct OfferQueue {
	deadlines: PriorityQueue<AssignmentId, Reverse<Timestamp>>,
	emergencies: HashMap<AssignmentId, EmergencyId>,
	by_emergency: HashMap<EmergencyId, HashSet<AssignmentId>>,
}

impl OfferQueue {
	fn track(&mut self, assignment_id: AssignmentId, emergency_id: EmergencyId, deadline: Timestamp) {
		self.deadlines.push(assignment_id, Reverse(deadline));
		self.emergencies.insert(assignment_id, emergency_id);
		self.by_emergency
			.entry(emergency_id)
			.or_default()
			.insert(assignment_id);
	}

	fn untrack(&mut self, assignment_id: &AssignmentId) -> bool {
		let removed = self.deadlines.remove(assignment_id).is_some();
		if let Some(emergency_id) = self.emergencies.remove(assignment_id) {
			if let Some(set) = self.by_emergency.get_mut(&emergency_id) {
				set.remove(assignment_id);
				if set.is_empty() {
					self.by_emergency.remove(&emergency_id);
				}
			}
		}
		removed
	}

	fn untrack_emergency(&mut self, emergency_id: &EmergencyId) -> usize {
		let Some(assignments) = self.by_emergency.remove(emergency_id) else {
			return 0;
		};
		for assignment_id in &assignments {
			self.deadlines.remove(assignment_id);
			self.emergencies.remove(assignment_id);
		}
		assignments.len()
	}

	fn pop_expired(&mut self, now: Timestamp) -> Option<(AssignmentId, EmergencyId)> {
		let (_, Reverse(deadline)) = self.deadlines.peek()?;
		if *deadline > now {
			return None;
		}
		let (assignment_id, _) = self.deadlines.pop()?;
		let emergency_id = self.emergencies.remove(&assignment_id)?;
		if let Some(set) = self.by_emergency.get_mut(&emergency_id) {
			set.remove(&assignment_id);
			if set.is_empty() {
				self.by_emergency.remove(&emergency_id);
			}
		}
		Some((assignment_id, emergency_id))
	}
}

/// Tracks outstanding deadlines and emits [`SchedulerEvent`]s when they
/// pass. Shared between the orchestrator (which tracks and untracks) and
/// its own poll loop.
pub struct EscalationScheduler {
	offers: Mutex<OfferQueue>,
	watchdog: Mutex<PriorityQueue<EmergencyId, Reverse<Timestamp>>>,
	events: mpsc::UnboundedSender<SchedulerEvent>,
	poll_interval: Duration,
	clock: Arc<dyn Clock>,
}

impl EscalationScheduler {
	pub fn new(
		clock: Arc<dyn Clock>,
		poll_interval: Duration,
		events: mpsc::UnboundedSender<SchedulerEvent>,
	) -> Self {
		Self {
			offers: Mutex::new(OfferQueue::default()),
			watchdog: Mutex::new(PriorityQueue::new()),
			events,
			poll_interval,
			clock,
		}
	}

	/// Starts watching an offer's response deadline. Re-tracking an
	/// assignment updates its deadline.
	pub fn track_offer(
		&self,
		assignment_id: AssignmentId,
		emergency_id: EmergencyId,
		deadline: Timestamp,
	) {
		lock(&self.offers).track(assignment_id, emergency_id, deadline);
	}

	/// Stops watching an offer (response arrived or the assignment went
	/// terminal). Idempotent.
	pub fn untrack_offer(&self, assignment_id: &AssignmentId) -> bool {
		lock(&self.offers).untrack(assignment_id)
	}

	/// Drops every tracked offer and the watchdog entry for an emergency,
	/// e.g. on cancellation. Returns how many offers were removed.
	pub fn untrack_emergency(&self, emergency_id: &EmergencyId) -> usize {
		lock(&self.watchdog).remove(emergency_id);
		let removed = lock(&self.offers).untrack_emergency(emergency_id);
		if removed > 0 {
			debug!(%emergency_id, removed, "untracked offers for emergency");
		}
		removed
	}

	/// Arms (or re-arms) the zero-accepts watchdog for an emergency.
	pub fn arm_watchdog(&self, emergency_id: EmergencyId, due: Timestamp) {
		lock(&self.watchdog).push(emergency_id, Reverse(due));
	}

	/// Disarms the watchdog, e.g. after the first accept. Idempotent.
	pub fn disarm_watchdog(&self, emergency_id: &EmergencyId) {
		lock(&self.watchdog).remove(emergency_id);
	}

	/// Extracts every entry whose deadline has passed. Exposed separately
	/// from [`run`](Self::run) so tests can drive ticks manually.
	pub fn drain_due(&self, now: Timestamp) -> Vec<SchedulerEvent> {
		let mut due = Vec::new();

		{
			let mut offers = lock(&self.offers);
			while let Some((assignment_id, emergency_id)) = offers.pop_expired(now) {
				due.push(SchedulerEvent::OfferExpired {
					assignment_id,
					emergency_id,
				});
			}
		}

		{
			let mut watchdog = lock(&self.watchdog);
			while let Some((_, Reverse(deadline))) = watchdog.peek() {
				if *deadline > now {
					break;
				}
				if let Some((emergency_id, _)) = watchdog.pop() {
					due.push(SchedulerEvent::EscalationDue { emergency_id });
				}
			}
		}

		due
	}

	/// Poll loop. Fires within one interval of each deadline and exits on
	/// shutdown after finishing the tick in progress, so no expiry is
	/// half-delivered.
	pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
		let mut ticker = tokio::time::interval(self.poll_interval);
		info!(poll_interval = ?self.poll_interval, "escalation scheduler started");

		loop {
			tokio::select! {
				_ = ticker.tick() => {
					for event in self.drain_due(self.clock.now()) {
						if self.events.send(event).is_err() {
							warn!("scheduler event channel closed, stopping");
							return;
						}
					}
				}
				_ = shutdown.recv() => {
					info!("escalation scheduler shutting down");
					return;
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{Duration as ChronoDuration, Utc};
	use responder_types::ManualClock;
	use uuid::Uuid;

	fn scheduler() -> (
		EscalationScheduler,
		Arc<ManualClock>,
		mpsc::UnboundedReceiver<SchedulerEvent>,
	) {
		let clock = Arc::new(ManualClock::new(Utc::now()));
		let (tx, rx) = mpsc::unbounded_channel();
		let scheduler = EscalationScheduler::new(clock.clone(), Duration::from_secs(1), tx);
		(scheduler, clock, rx)
	}

	#[test]
	fn drains_only_past_deadline_in_order() {
		let (scheduler, clock, _rx) = scheduler();
		let now = clock.now();
		let emergency_id = Uuid::new_v4();

		let early = Uuid::new_v4();
		let late = Uuid::new_v4();
		scheduler.track_offer(late, emergency_id, now + ChronoDuration::minutes(30));
		scheduler.track_offer(early, emergency_id, now + ChronoDuration::minutes(10));

		assert!(scheduler.drain_due(now).is_empty());

		let due = scheduler.drain_due(now + ChronoDuration::minutes(15));
		assert_eq!(
			due,
			vec![SchedulerEvent::OfferExpired {
				assignment_id: early,
				emergency_id,
			}]
		);

		// Already drained entries do not fire twice.
		assert!(scheduler
			.drain_due(now + ChronoDuration::minutes(15))
			.is_empty());

		let due = scheduler.drain_due(now + ChronoDuration::minutes(31));
		assert_eq!(
			due,
			vec![SchedulerEvent::OfferExpired {
				assignment_id: late,
				emergency_id,
			}]
		);
	}

	#[test]
	fn untrack_is_idempotent() {
		let (scheduler, clock, _rx) = scheduler();
		let now = clock.now();
		let assignment_id = Uuid::new_v4();

		scheduler.track_offer(assignment_id, Uuid::new_v4(), now + ChronoDuration::minutes(5));
		assert!(scheduler.untrack_offer(&assignment_id));
		assert!(!scheduler.untrack_offer(&assignment_id));
		assert!(!scheduler.untrack_offer(&Uuid::new_v4()));

		assert!(scheduler.drain_due(now + ChronoDuration::hours(1)).is_empty());
	}

	#[test]
	fn untrack_emergency_clears_offers_and_watchdog() {
		let (scheduler, clock, _rx) = scheduler();
		let now = clock.now();
		let emergency_id = Uuid::new_v4();
		let other = Uuid::new_v4();

		scheduler.track_offer(Uuid::new_v4(), emergency_id, now + ChronoDuration::minutes(5));
		scheduler.track_offer(Uuid::new_v4(), emergency_id, now + ChronoDuration::minutes(6));
		scheduler.track_offer(Uuid::new_v4(), other, now + ChronoDuration::minutes(5));
		scheduler.arm_watchdog(emergency_id, now + ChronoDuration::minutes(30));

		assert_eq!(scheduler.untrack_emergency(&emergency_id), 2);

		let due = scheduler.drain_due(now + ChronoDuration::hours(1));
		assert_eq!(due.len(), 1);
		assert!(matches!(
			due[0],
			SchedulerEvent::OfferExpired { emergency_id: e, .. } if e == other
		));
	}

	#[test]
	fn watchdog_fires_once_until_rearmed() {
		let (scheduler, clock, _rx) = scheduler();
		let now = clock.now();
		let emergency_id = Uuid::new_v4();

		scheduler.arm_watchdog(emergency_id, now + ChronoDuration::minutes(30));
		assert!(scheduler.drain_due(now + ChronoDuration::minutes(29)).is_empty());

		let due = scheduler.drain_due(now + ChronoDuration::minutes(30));
		assert_eq!(due, vec![SchedulerEvent::EscalationDue { emergency_id }]);
		assert!(scheduler.drain_due(now + ChronoDuration::hours(2)).is_empty());

		// Re-arm, then disarm before it fires.
		scheduler.arm_watchdog(emergency_id, now + ChronoDuration::hours(3));
		scheduler.disarm_watchdog(&emergency_id);
		assert!(scheduler.drain_due(now + ChronoDuration::hours(4)).is_empty());
	}

	#[tokio::test]
	async fn run_delivers_events_and_stops_on_shutdown() {
		let clock = Arc::new(ManualClock::new(Utc::now()));
		let (tx, mut rx) = mpsc::unbounded_channel();
		let scheduler = Arc::new(EscalationScheduler::new(
			clock.clone(),
			Duration::from_millis(10),
			tx,
		));

		let assignment_id = Uuid::new_v4();
		let emergency_id = Uuid::new_v4();
		scheduler.track_offer(
			assignment_id,
			emergency_id,
			clock.now() + ChronoDuration::minutes(1),
		);

		let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
		let runner = {
			let scheduler = scheduler.clone();
			tokio::spawn(async move { scheduler.run(shutdown_rx).await })
		};

		clock.advance(ChronoDuration::minutes(2));
		let event = rx.recv().await.expect("expiry delivered");
		assert_eq!(
			event,
			SchedulerEvent::OfferExpired {
				assignment_id,
				emergency_id,
			}
		);

		shutdown_tx.send(()).unwrap();
		runner.await.unwrap();
	}
}
