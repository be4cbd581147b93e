//! Emergency request types.
//!
//! An emergency enters the engine from the requesting-authority
//! collaborator. Its status transitions are driven exclusively by the
//! orchestrator; the search radius starts at the configured default and
//! only widens through escalation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{AuthorityId, EmergencyId, Location, Skill, Timestamp};

/// Priority of an emergency, totally ordered from `Low` to `Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
	Low,
	Medium,
	High,
	Critical,
}

impl Priority {
	/// The next priority up; `Critical` stays `Critical`.
	pub fn bumped(self) -> Self {
		match self {
			Self::Low => Self::Medium,
			Self::Medium => Self::High,
			Self::High | Self::Critical => Self::Critical,
		}
	}
}

/// Lifecycle status of an emergency request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyStatus {
	Open,
	Assigned,
	Closed,
	Cancelled,
}

impl EmergencyStatus {
	/// Whether the emergency can still receive offers.
	pub fn is_active(&self) -> bool {
		matches!(self, Self::Open | Self::Assigned)
	}
}

/// An emergency request tracked by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyRequest {
	pub id: EmergencyId,
	pub authority_id: AuthorityId,
	pub title: String,
	pub description: String,
	pub location: Location,
	pub priority: Priority,
	pub required_skills: BTreeSet<Skill>,
	pub volunteers_needed: u32,
	pub status: EmergencyStatus,
	/// Current search radius. Widened only by escalation, never by a
	/// first-pass match attempt.
	pub search_radius_km: f64,
	/// Set when a matching pass exhausted the candidate pool with need
	/// left unmet; cleared by the next escalation.
	pub needs_broadening: bool,
	pub escalation_count: u32,
	pub created_at: Timestamp,
	pub escalated_at: Option<Timestamp>,
}

impl EmergencyRequest {
	pub fn is_active(&self) -> bool {
		self.status.is_active()
	}
}

/// Input for creating an emergency request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEmergency {
	pub authority_id: AuthorityId,
	pub title: String,
	pub description: String,
	pub location: Location,
	pub priority: Priority,
	pub required_skills: BTreeSet<Skill>,
	pub volunteers_needed: u32,
	/// Initial search radius; the configured default applies when absent.
	pub search_radius_km: Option<f64>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn priority_total_order() {
		assert!(Priority::Low < Priority::Medium);
		assert!(Priority::Medium < Priority::High);
		assert!(Priority::High < Priority::Critical);
	}

	#[test]
	fn priority_bump_saturates() {
		assert_eq!(Priority::Low.bumped(), Priority::Medium);
		assert_eq!(Priority::High.bumped(), Priority::Critical);
		assert_eq!(Priority::Critical.bumped(), Priority::Critical);
	}

	#[test]
	fn active_statuses() {
		assert!(EmergencyStatus::Open.is_active());
		assert!(EmergencyStatus::Assigned.is_active());
		assert!(!EmergencyStatus::Closed.is_active());
		assert!(!EmergencyStatus::Cancelled.is_active());
	}
}
