//! Assignment state machine.
//!
//! Owns every legal transition of an assignment after the orchestrator
//! creates it:
//!
//! ```text
//! requested -> accepted | declined | cancelled
//! accepted  -> completed | cancelled
//! declined, completed, cancelled: terminal
//! ```
//!
//! Accept and decline are additionally guarded by the response deadline.
//! A timeout is *not* a transition: the scheduler reports it and the
//! orchestrator marks the offer superseded via [`supersede`], leaving the
//! record in `requested` to preserve audit history. Callers must apply
//! transitions under a per-assignment lock so the first of two racing
//! callers wins and the loser sees `IllegalTransition`.

use tracing::debug;

use responder_types::{
	Assignment, AssignmentAction, AssignmentStatus, EngineError, Result, Timestamp,
};

/// Whether `action` is legal from `status`, ignoring temporal guards.
fn is_legal(status: AssignmentStatus, action: AssignmentAction) -> bool {
	use AssignmentAction::*;
	use AssignmentStatus::*;

	matches!(
		(status, action),
		(Requested, Accept) | (Requested, Decline) | (Requested, Cancel)
			| (Accepted, Complete)
			| (Accepted, Cancel)
	)
}

/// Applies `action` to `assignment` at time `now`, stamping response and
/// completion timestamps and attaching `notes` when provided.
///
/// Fails with [`EngineError::IllegalTransition`] when the action is not
/// legal from the current state, when the assignment is terminal, or when
/// an accept/decline arrives after the response deadline or on a
/// superseded offer. The assignment is left untouched on failure.
pub fn transition(
	assignment: &mut Assignment,
	action: AssignmentAction,
	now: Timestamp,
	notes: Option<String>,
) -> Result<()> {
	let illegal = |expired: bool| EngineError::IllegalTransition {
		action,
		status: assignment.status,
		expired,
	};

	if !is_legal(assignment.status, action) {
		return Err(illegal(false));
	}

	// Deadline guard: responses to an offer are only valid while it is
	// live. Cancel stays allowed so stale offers can be cleaned up.
	if matches!(action, AssignmentAction::Accept | AssignmentAction::Decline)
		&& (assignment.superseded || now >= assignment.response_deadline)
	{
		return Err(illegal(true));
	}

	let next = match action {
		AssignmentAction::Accept => {
			assignment.responded_at = Some(now);
			AssignmentStatus::Accepted
		}
		AssignmentAction::Decline => {
			assignment.responded_at = Some(now);
			AssignmentStatus::Declined
		}
		AssignmentAction::Complete => {
			assignment.completed_at = Some(now);
			AssignmentStatus::Completed
		}
		AssignmentAction::Cancel => AssignmentStatus::Cancelled,
	};

	debug!(
		assignment_id = %assignment.id,
		from = %assignment.status,
		to = %next,
		"assignment transition"
	);

	assignment.status = next;
	if notes.is_some() {
		assignment.notes = notes;
	}

	Ok(())
}

/// Marks an expired offer superseded so re-matching can run over it.
/// Only meaningful on a live `requested` offer; calling it on anything
/// else is a no-op. Returns whether the flag changed.
pub fn supersede(assignment: &mut Assignment) -> bool {
	if assignment.is_open_offer() {
		assignment.superseded = true;
		true
	} else {
		false
	}
}
