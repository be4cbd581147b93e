//! Events published by the engine.
//!
//! Observers (the surrounding application, notification dispatch, audit
//! logging) subscribe to these through the event bus. Notification events
//! carry only the *decision* to notify; delivery mechanics live outside
//! the engine.

use serde::{Deserialize, Serialize};

use crate::{
	Assignment, AssignmentId, EmergencyId, Priority, Timestamp, VolunteerId,
};

/// Top-level event emitted on the engine's broadcast bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
	Assignment(AssignmentEvent),
	Emergency(EmergencyEvent),
	Notification(NotificationEvent),
}

/// Lifecycle events for individual assignments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AssignmentEvent {
	OfferCreated {
		assignment: Assignment,
	},
	Accepted {
		assignment_id: AssignmentId,
		emergency_id: EmergencyId,
	},
	Declined {
		assignment_id: AssignmentId,
		emergency_id: EmergencyId,
	},
	/// An offer sat past its response deadline and was superseded.
	OfferExpired {
		assignment_id: AssignmentId,
		emergency_id: EmergencyId,
	},
	Completed {
		assignment_id: AssignmentId,
		emergency_id: EmergencyId,
	},
	Cancelled {
		assignment_id: AssignmentId,
		emergency_id: EmergencyId,
	},
}

/// Lifecycle and escalation events for emergencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EmergencyEvent {
	Created {
		emergency_id: EmergencyId,
	},
	Assigned {
		emergency_id: EmergencyId,
	},
	Closed {
		emergency_id: EmergencyId,
	},
	Cancelled {
		emergency_id: EmergencyId,
	},
	Escalated {
		emergency_id: EmergencyId,
		priority: Priority,
		search_radius_km: f64,
		escalation_count: u32,
	},
	/// A matching pass exhausted the eligible pool with need left unmet;
	/// the emergency is flagged for the next radius-broadening pass.
	UnmetNeed {
		emergency_id: EmergencyId,
		outstanding: u32,
	},
}

/// Decisions to notify someone. Delivery is a collaborator concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NotificationEvent {
	/// Tell a volunteer they have a new offer awaiting response.
	VolunteerOffer {
		assignment_id: AssignmentId,
		volunteer_id: VolunteerId,
		emergency_id: EmergencyId,
		respond_by: Timestamp,
	},
	/// Tell the authority a volunteer responded to an offer.
	AssignmentResponse {
		assignment_id: AssignmentId,
		emergency_id: EmergencyId,
		accepted: bool,
	},
	/// Tell the authority an assignment was completed.
	AssignmentCompleted {
		assignment_id: AssignmentId,
		emergency_id: EmergencyId,
	},
	/// Tell the authority their emergency escalated with unmet need.
	EscalationAlert {
		emergency_id: EmergencyId,
	},
}
