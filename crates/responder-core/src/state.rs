//! In-memory engine state.
//!
//! The authoritative copy of every emergency and assignment, plus the
//! per-emergency mutexes the orchestrator serializes mutations with.
//! Reads are lock-free through the concurrent maps; every write to an
//! emergency or to any of its assignments happens while holding that
//! emergency's mutex, which is what makes racing responses to the same
//! offer resolve first-wins.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use responder_types::{
	Assignment, AssignmentId, EmergencyId, EmergencyRequest, VolunteerId,
};

#[derive(Default)]
pub struct EngineState {
	emergencies: DashMap<EmergencyId, EmergencyRequest>,
	assignments: DashMap<AssignmentId, Assignment>,
	by_emergency: DashMap<EmergencyId, Vec<AssignmentId>>,
	emergency_locks: DashMap<EmergencyId, Arc<Mutex<()>>>,
}

impl EngineState {
	pub fn new() -> Self {
		Self::default()
	}

	/// The mutation mutex for an emergency, created on first use.
	pub fn emergency_lock(&self, id: EmergencyId) -> Arc<Mutex<()>> {
		self.emergency_locks
			.entry(id)
			.or_insert_with(|| Arc::new(Mutex::new(())))
			.clone()
	}

	pub fn insert_emergency(&self, emergency: EmergencyRequest) {
		self.emergencies.insert(emergency.id, emergency);
	}

	pub fn emergency(&self, id: &EmergencyId) -> Option<EmergencyRequest> {
		self.emergencies.get(id).map(|entry| entry.value().clone())
	}

	/// Applies `mutate` to an emergency in place. Returns the updated
	/// record, or `None` when the id is unknown.
	pub fn update_emergency<F>(&self, id: &EmergencyId, mutate: F) -> Option<EmergencyRequest>
	where
		F: FnOnce(&mut EmergencyRequest),
	{
		let mut entry = self.emergencies.get_mut(id)?;
		mutate(entry.value_mut());
		Some(entry.value().clone())
	}

	pub fn insert_assignment(&self, assignment: Assignment) {
		self.by_emergency
			.entry(assignment.emergency_id)
			.or_default()
			.push(assignment.id);
		self.assignments.insert(assignment.id, assignment);
	}

	pub fn assignment(&self, id: &AssignmentId) -> Option<Assignment> {
		self.assignments.get(id).map(|entry| entry.value().clone())
	}

	/// Applies `mutate` to an assignment in place. Returns the updated
	/// record, or `None` when the id is unknown. `mutate` may fail, in
	/// which case the map keeps whatever state it left behind; the state
	/// machine guarantees failed transitions leave the record untouched.
	pub fn update_assignment<F, E>(
		&self,
		id: &AssignmentId,
		mutate: F,
	) -> Option<Result<Assignment, E>>
	where
		F: FnOnce(&mut Assignment) -> Result<(), E>,
	{
		let mut entry = self.assignments.get_mut(id)?;
		Some(match mutate(entry.value_mut()) {
			Ok(()) => Ok(entry.value().clone()),
			Err(e) => Err(e),
		})
	}

	/// All assignments for an emergency, in creation order.
	pub fn assignments_for(&self, emergency_id: &EmergencyId) -> Vec<Assignment> {
		let Some(ids) = self.by_emergency.get(emergency_id) else {
			return Vec::new();
		};
		ids.iter()
			.filter_map(|id| self.assignments.get(id).map(|entry| entry.value().clone()))
			.collect()
	}

	/// Whether this volunteer already has any assignment, in any state,
	/// for this emergency.
	pub fn has_assignment(&self, emergency_id: &EmergencyId, volunteer_id: &VolunteerId) -> bool {
		self.assignments_for(emergency_id)
			.iter()
			.any(|a| a.volunteer_id == *volunteer_id)
	}

	/// Emergencies matching a predicate, oldest first.
	pub fn emergencies_where<F>(&self, predicate: F) -> Vec<EmergencyRequest>
	where
		F: Fn(&EmergencyRequest) -> bool,
	{
		let mut matched: Vec<EmergencyRequest> = self
			.emergencies
			.iter()
			.filter(|entry| predicate(entry.value()))
			.map(|entry| entry.value().clone())
			.collect();
		matched.sort_by_key(|e| e.created_at);
		matched
	}

	/// Assignments matching a predicate, oldest offer first.
	pub fn assignments_where<F>(&self, predicate: F) -> Vec<Assignment>
	where
		F: Fn(&Assignment) -> bool,
	{
		let mut matched: Vec<Assignment> = self
			.assignments
			.iter()
			.filter(|entry| predicate(entry.value()))
			.map(|entry| entry.value().clone())
			.collect();
		matched.sort_by_key(|a| a.offered_at);
		matched
	}

	pub fn emergency_count(&self) -> usize {
		self.emergencies.len()
	}

	pub fn assignment_count(&self) -> usize {
		self.assignments.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{Duration, Utc};
	use responder_types::{EmergencyStatus, Location, Priority};
	use uuid::Uuid;

	fn emergency() -> EmergencyRequest {
		EmergencyRequest {
			id: Uuid::new_v4(),
			authority_id: Uuid::new_v4(),
			title: "test".into(),
			description: String::new(),
			location: Location::new(52.52, 13.405),
			priority: Priority::Medium,
			required_skills: Default::default(),
			volunteers_needed: 1,
			status: EmergencyStatus::Open,
			search_radius_km: 10.0,
			needs_broadening: false,
			escalation_count: 0,
			created_at: Utc::now(),
			escalated_at: None,
		}
	}

	#[test]
	fn assignments_index_by_emergency() {
		let state = EngineState::new();
		let emergency = emergency();
		let emergency_id = emergency.id;
		state.insert_emergency(emergency);

		let now = Utc::now();
		let volunteer_id = Uuid::new_v4();
		let a = Assignment::offer(emergency_id, volunteer_id, now, now + Duration::minutes(30));
		let b = Assignment::offer(emergency_id, Uuid::new_v4(), now, now + Duration::minutes(30));
		state.insert_assignment(a.clone());
		state.insert_assignment(b);

		assert_eq!(state.assignments_for(&emergency_id).len(), 2);
		assert!(state.has_assignment(&emergency_id, &volunteer_id));
		assert!(!state.has_assignment(&emergency_id, &Uuid::new_v4()));
		assert!(state.assignments_for(&Uuid::new_v4()).is_empty());
		assert_eq!(state.assignment(&a.id).unwrap().volunteer_id, volunteer_id);
	}

	#[test]
	fn update_emergency_returns_updated_copy() {
		let state = EngineState::new();
		let record = emergency();
		let id = record.id;
		state.insert_emergency(record);

		let updated = state
			.update_emergency(&id, |e| e.status = EmergencyStatus::Assigned)
			.unwrap();
		assert_eq!(updated.status, EmergencyStatus::Assigned);
		assert_eq!(state.emergency(&id).unwrap().status, EmergencyStatus::Assigned);
		assert!(state.update_emergency(&Uuid::new_v4(), |_| {}).is_none());
	}

	#[test]
	fn emergency_lock_is_shared_per_id() {
		let state = EngineState::new();
		let id = Uuid::new_v4();

		let first = state.emergency_lock(id);
		let second = state.emergency_lock(id);
		assert!(Arc::ptr_eq(&first, &second));
	}
}
