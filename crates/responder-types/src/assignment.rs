//! Assignment types.
//!
//! An assignment links exactly one volunteer to exactly one emergency.
//! It is created by the orchestrator in the `Requested` state and owned
//! by the state machine thereafter. Expired offers are superseded rather
//! than deleted so the audit trail survives re-matching.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{AssignmentId, EmergencyId, Timestamp, VolunteerId};

/// Lifecycle status of an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
	Requested,
	Accepted,
	Declined,
	Completed,
	Cancelled,
}

impl AssignmentStatus {
	/// Terminal states are immutable once reached.
	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Declined | Self::Completed | Self::Cancelled)
	}
}

impl fmt::Display for AssignmentStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Requested => "requested",
			Self::Accepted => "accepted",
			Self::Declined => "declined",
			Self::Completed => "completed",
			Self::Cancelled => "cancelled",
		};
		write!(f, "{}", name)
	}
}

/// Operations that drive the assignment state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentAction {
	Accept,
	Decline,
	Complete,
	Cancel,
}

impl fmt::Display for AssignmentAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Accept => "accept",
			Self::Decline => "decline",
			Self::Complete => "complete",
			Self::Cancel => "cancel",
		};
		write!(f, "{}", name)
	}
}

/// An offer of work to one volunteer for one emergency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
	pub id: AssignmentId,
	pub emergency_id: EmergencyId,
	pub volunteer_id: VolunteerId,
	pub status: AssignmentStatus,
	/// True once the offer sat past its response deadline and the
	/// orchestrator re-matched over it. A superseded offer stays
	/// `Requested` for audit purposes but no longer counts toward the
	/// emergency's outstanding need and can only be cancelled.
	pub superseded: bool,
	pub offered_at: Timestamp,
	pub response_deadline: Timestamp,
	pub responded_at: Option<Timestamp>,
	pub completed_at: Option<Timestamp>,
	pub notes: Option<String>,
}

impl Assignment {
	/// Creates a fresh offer in the `Requested` state.
	pub fn offer(
		emergency_id: EmergencyId,
		volunteer_id: VolunteerId,
		offered_at: Timestamp,
		response_deadline: Timestamp,
	) -> Self {
		Self {
			id: AssignmentId::new_v4(),
			emergency_id,
			volunteer_id,
			status: AssignmentStatus::Requested,
			superseded: false,
			offered_at,
			response_deadline,
			responded_at: None,
			completed_at: None,
			notes: None,
		}
	}

	pub fn is_terminal(&self) -> bool {
		self.status.is_terminal()
	}

	/// A live offer still awaiting a volunteer response.
	pub fn is_open_offer(&self) -> bool {
		self.status == AssignmentStatus::Requested && !self.superseded
	}

	/// Whether this assignment occupies one of the emergency's slots:
	/// accepted work, or an open offer that may still become accepted.
	pub fn counts_toward_need(&self) -> bool {
		self.status == AssignmentStatus::Accepted || self.is_open_offer()
	}

	/// Minutes between offer and response, when a response exists.
	pub fn response_time_minutes(&self) -> Option<i64> {
		self.responded_at
			.map(|at| (at - self.offered_at).num_minutes())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{Duration, Utc};

	#[test]
	fn fresh_offer_counts_toward_need() {
		let now = Utc::now();
		let offer = Assignment::offer(
			EmergencyId::new_v4(),
			VolunteerId::new_v4(),
			now,
			now + Duration::minutes(30),
		);

		assert_eq!(offer.status, AssignmentStatus::Requested);
		assert!(offer.is_open_offer());
		assert!(offer.counts_toward_need());
	}

	#[test]
	fn superseded_offer_releases_slot() {
		let now = Utc::now();
		let mut offer = Assignment::offer(
			EmergencyId::new_v4(),
			VolunteerId::new_v4(),
			now,
			now + Duration::minutes(30),
		);
		offer.superseded = true;

		assert!(!offer.is_open_offer());
		assert!(!offer.counts_toward_need());
		assert!(!offer.is_terminal());
	}

	#[test]
	fn terminal_states() {
		assert!(AssignmentStatus::Declined.is_terminal());
		assert!(AssignmentStatus::Completed.is_terminal());
		assert!(AssignmentStatus::Cancelled.is_terminal());
		assert!(!AssignmentStatus::Requested.is_terminal());
		assert!(!AssignmentStatus::Accepted.is_terminal());
	}
}
