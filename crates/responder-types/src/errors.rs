//! Error types shared across the engine.

use thiserror::Error;

use crate::{AssignmentAction, AssignmentStatus, EmergencyId, VolunteerId};

pub type Result<T> = std::result::Result<T, EngineError>;

/// Domain errors returned to callers as typed results. None of these are
/// allowed to abort a matching pass for the rest of the candidate pool.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("invalid coordinate: latitude {latitude}, longitude {longitude}")]
	InvalidCoordinate { latitude: f64, longitude: f64 },

	#[error("illegal transition: cannot {action} an assignment that is {status}")]
	IllegalTransition {
		action: AssignmentAction,
		status: AssignmentStatus,
		/// True when the attempt failed because the offer was superseded
		/// or its response deadline had passed.
		expired: bool,
	},

	#[error("volunteer {volunteer_id} already holds an active assignment for emergency {emergency_id}")]
	DuplicateAssignment {
		emergency_id: EmergencyId,
		volunteer_id: VolunteerId,
	},

	#[error("{kind} {id} not found")]
	NotFound { kind: &'static str, id: uuid::Uuid },

	#[error("validation failed: {0}")]
	Validation(String),
}

impl EngineError {
	pub fn not_found(kind: &'static str, id: uuid::Uuid) -> Self {
		Self::NotFound { kind, id }
	}
}
