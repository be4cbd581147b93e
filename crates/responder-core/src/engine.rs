//! The matching orchestrator.
//!
//! Every mutating operation on an emergency, including responses to its
//! offers and scheduler-driven expiries, runs under that emergency's
//! mutex from [`EngineState`]. That single rule serializes racing
//! volunteer responses (first caller wins, the loser gets
//! `IllegalTransition`), keeps matching passes from double-offering a
//! slot, and lets escalation read a consistent assignment set.
//!
//! The engine mutates in-memory state first and mirrors each changed
//! record to storage, so a restart with the file backend can rebuild the
//! tracked deadlines through [`MatchingEngine::recover`].

use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use responder_config::EngineConfig;
use responder_escalation::{EscalationScheduler, SchedulerEvent};
use responder_matching::{ExpansionSuggestion, MatchingStatistics};
use responder_storage::StorageService;
use responder_types::{
	Assignment, AssignmentAction, AssignmentEvent, AssignmentId, AssignmentStatus, AuthorityId,
	Availability, Clock, EmergencyEvent, EmergencyId, EmergencyRequest, EmergencyStatus,
	EngineError, EngineEvent, NewEmergency, NotificationEvent, VolunteerId,
};

use crate::directory::VolunteerDirectory;
use crate::error::CoreError;
use crate::event_bus::EventBus;
use crate::state::EngineState;

const NS_EMERGENCY: &str = "emergency";
const NS_ASSIGNMENT: &str = "assignment";

pub struct MatchingEngine {
	config: EngineConfig,
	state: EngineState,
	directory: Arc<dyn VolunteerDirectory>,
	storage: Arc<StorageService>,
	scheduler: Arc<EscalationScheduler>,
	event_bus: EventBus,
	clock: Arc<dyn Clock>,
}

impl MatchingEngine {
	pub fn new(
		config: EngineConfig,
		directory: Arc<dyn VolunteerDirectory>,
		storage: Arc<StorageService>,
		scheduler: Arc<EscalationScheduler>,
		event_bus: EventBus,
		clock: Arc<dyn Clock>,
	) -> Self {
		Self {
			config,
			state: EngineState::new(),
			directory,
			storage,
			scheduler,
			event_bus,
			clock,
		}
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	fn offer_deadline(&self) -> ChronoDuration {
		ChronoDuration::minutes(self.config.scheduler.offer_response_minutes)
	}

	fn escalation_timeout(&self) -> ChronoDuration {
		ChronoDuration::minutes(self.config.scheduler.escalation_timeout_minutes)
	}

	// ---- read operations -------------------------------------------------

	pub fn emergency(&self, id: &EmergencyId) -> Result<EmergencyRequest, CoreError> {
		self.state.emergency(id).ok_or_else(|| {
			CoreError::Engine(EngineError::NotFound {
				kind: "emergency",
				id: *id,
			})
		})
	}

	pub fn assignment(&self, id: &AssignmentId) -> Result<Assignment, CoreError> {
		self.state.assignment(id).ok_or_else(|| {
			CoreError::Engine(EngineError::NotFound {
				kind: "assignment",
				id: *id,
			})
		})
	}

	/// All assignments of an emergency, in creation order.
	pub fn assignments_for(&self, emergency_id: &EmergencyId) -> Result<Vec<Assignment>, CoreError> {
		self.emergency(emergency_id)?;
		Ok(self.state.assignments_for(emergency_id))
	}

	/// A volunteer's assignments across all emergencies, optionally
	/// narrowed to one status, oldest offer first.
	pub fn assignments_by_volunteer(
		&self,
		volunteer_id: &VolunteerId,
		status: Option<AssignmentStatus>,
	) -> Vec<Assignment> {
		self.state.assignments_where(|a| {
			a.volunteer_id == *volunteer_id && status.map_or(true, |s| a.status == s)
		})
	}

	/// All emergencies registered by an authority, oldest first.
	pub fn emergencies_by_authority(&self, authority_id: &AuthorityId) -> Vec<EmergencyRequest> {
		self.state
			.emergencies_where(|e| e.authority_id == *authority_id)
	}

	/// All emergencies in a given status, oldest first.
	pub fn emergencies_by_status(&self, status: EmergencyStatus) -> Vec<EmergencyRequest> {
		self.state.emergencies_where(|e| e.status == status)
	}

	pub async fn matching_statistics(
		&self,
		emergency_id: &EmergencyId,
	) -> Result<MatchingStatistics, CoreError> {
		let emergency = self.emergency(emergency_id)?;
		let pool = self.directory.pool().await;
		let assignments = self.state.assignments_for(emergency_id);
		Ok(responder_matching::matching_statistics(
			&emergency,
			&pool,
			&assignments,
		))
	}

	pub async fn suggest_expansion(
		&self,
		emergency_id: &EmergencyId,
	) -> Result<ExpansionSuggestion, CoreError> {
		let emergency = self.emergency(emergency_id)?;
		let pool = self.directory.pool().await;
		Ok(responder_matching::suggest_expansion(
			&emergency,
			&pool,
			self.config.matching.max_radius_km,
		))
	}

	// ---- emergency lifecycle ---------------------------------------------

	/// Registers a new emergency and immediately runs a matching pass
	/// over the current pool.
	pub async fn create_emergency(&self, new: NewEmergency) -> Result<EmergencyRequest, CoreError> {
		responder_geo::validate(&new.location).map_err(CoreError::Engine)?;
		if new.volunteers_needed == 0 {
			return Err(CoreError::Engine(EngineError::Validation(
				"volunteers_needed must be at least 1".to_string(),
			)));
		}

		let radius = new
			.search_radius_km
			.unwrap_or(self.config.matching.default_radius_km);
		if radius <= 0.0 || radius > self.config.matching.max_radius_km {
			return Err(CoreError::Engine(EngineError::Validation(format!(
				"search radius {} km outside (0, {}]",
				radius, self.config.matching.max_radius_km
			))));
		}

		let now = self.clock.now();
		let emergency = EmergencyRequest {
			id: EmergencyId::new_v4(),
			authority_id: new.authority_id,
			title: new.title,
			description: new.description,
			location: new.location,
			priority: new.priority,
			required_skills: new.required_skills,
			volunteers_needed: new.volunteers_needed,
			status: EmergencyStatus::Open,
			search_radius_km: radius,
			needs_broadening: false,
			escalation_count: 0,
			created_at: now,
			escalated_at: None,
		};
		let emergency_id = emergency.id;

		let lock = self.state.emergency_lock(emergency_id);
		let _guard = lock.lock().await;

		self.state.insert_emergency(emergency.clone());
		self.persist_emergency(&emergency).await;
		info!(%emergency_id, priority = ?emergency.priority, "emergency created");
		self.publish(EngineEvent::Emergency(EmergencyEvent::Created {
			emergency_id,
		}));

		self.scheduler
			.arm_watchdog(emergency_id, now + self.escalation_timeout());
		self.matching_pass_locked(&emergency_id).await?;

		self.emergency(&emergency_id)
	}

	/// Widens the search, bumps priority and re-matches. Past the
	/// escalation cap the emergency is only flagged for manual
	/// broadening; radius and priority stay put.
	pub async fn escalate_emergency(
		&self,
		emergency_id: &EmergencyId,
	) -> Result<EmergencyRequest, CoreError> {
		let lock = self.state.emergency_lock(*emergency_id);
		let _guard = lock.lock().await;
		self.escalate_locked(emergency_id).await
	}

	/// Caller must hold the emergency lock.
	async fn escalate_locked(
		&self,
		emergency_id: &EmergencyId,
	) -> Result<EmergencyRequest, CoreError> {
		let emergency = self.emergency(emergency_id)?;

		if !emergency.is_active() {
			return Err(CoreError::Engine(EngineError::Validation(format!(
				"cannot escalate an emergency that is {:?}",
				emergency.status
			))));
		}

		if emergency.escalation_count >= self.config.matching.max_escalations {
			warn!(%emergency_id, count = emergency.escalation_count, "escalation cap reached");
			let updated = self.update_and_persist(emergency_id, |e| {
				e.needs_broadening = true;
			})
			.await?;
			self.publish(EngineEvent::Notification(NotificationEvent::EscalationAlert {
				emergency_id: *emergency_id,
			}));
			return Ok(updated);
		}

		let now = self.clock.now();
		let max_radius = self.config.matching.max_radius_km;
		let updated = self.update_and_persist(emergency_id, |e| {
			e.priority = e.priority.bumped();
			e.search_radius_km = responder_geo::expand_radius(e.search_radius_km, max_radius);
			e.escalation_count += 1;
			e.escalated_at = Some(now);
			e.needs_broadening = false;
		})
		.await?;

		info!(
			%emergency_id,
			radius_km = updated.search_radius_km,
			count = updated.escalation_count,
			"emergency escalated"
		);
		self.publish(EngineEvent::Emergency(EmergencyEvent::Escalated {
			emergency_id: *emergency_id,
			priority: updated.priority,
			search_radius_km: updated.search_radius_km,
			escalation_count: updated.escalation_count,
		}));
		self.publish(EngineEvent::Notification(NotificationEvent::EscalationAlert {
			emergency_id: *emergency_id,
		}));

		self.matching_pass_locked(emergency_id).await?;
		self.scheduler
			.arm_watchdog(*emergency_id, now + self.escalation_timeout());

		self.emergency(emergency_id)
	}

	/// Authority close: the work is done. Accepted assignments are
	/// completed with the given notes, open offers are cancelled.
	pub async fn close_emergency(
		&self,
		emergency_id: &EmergencyId,
		notes: Option<String>,
	) -> Result<EmergencyRequest, CoreError> {
		self.finish_emergency(emergency_id, EmergencyStatus::Closed, notes)
			.await
	}

	/// Authority cancel: the request was withdrawn. Every non-terminal
	/// assignment, accepted ones included, is cancelled.
	pub async fn cancel_emergency(
		&self,
		emergency_id: &EmergencyId,
	) -> Result<EmergencyRequest, CoreError> {
		self.finish_emergency(emergency_id, EmergencyStatus::Cancelled, None)
			.await
	}

	async fn finish_emergency(
		&self,
		emergency_id: &EmergencyId,
		status: EmergencyStatus,
		notes: Option<String>,
	) -> Result<EmergencyRequest, CoreError> {
		let lock = self.state.emergency_lock(*emergency_id);
		let _guard = lock.lock().await;
		let emergency = self.emergency(emergency_id)?;

		if !emergency.is_active() {
			return Err(CoreError::Engine(EngineError::Validation(format!(
				"emergency is already {:?}",
				emergency.status
			))));
		}

		let closing = status == EmergencyStatus::Closed;
		let now = self.clock.now();
		for assignment in self.state.assignments_for(emergency_id) {
			match assignment.status {
				AssignmentStatus::Requested => {
					self.apply_transition(&assignment.id, AssignmentAction::Cancel, now, None)
						.await?;
				}
				AssignmentStatus::Accepted if closing => {
					self.apply_transition(
						&assignment.id,
						AssignmentAction::Complete,
						now,
						notes.clone(),
					)
					.await?;
					self.publish(EngineEvent::Assignment(AssignmentEvent::Completed {
						assignment_id: assignment.id,
						emergency_id: *emergency_id,
					}));
				}
				AssignmentStatus::Accepted => {
					self.apply_transition(&assignment.id, AssignmentAction::Cancel, now, None)
						.await?;
				}
				_ => {}
			}
		}

		self.scheduler.untrack_emergency(emergency_id);
		let updated = self.update_and_persist(emergency_id, |e| e.status = status).await?;

		info!(%emergency_id, ?status, "emergency finished");
		let event = match status {
			EmergencyStatus::Closed => EmergencyEvent::Closed {
				emergency_id: *emergency_id,
			},
			_ => EmergencyEvent::Cancelled {
				emergency_id: *emergency_id,
			},
		};
		self.publish(EngineEvent::Emergency(event));

		Ok(updated)
	}

	// ---- assignment operations -------------------------------------------

	/// Volunteer decision on an open offer. Only `Accept` and `Decline`
	/// are responses; other actions go through their own operations.
	pub async fn respond_to_assignment(
		&self,
		assignment_id: &AssignmentId,
		action: AssignmentAction,
		notes: Option<String>,
	) -> Result<Assignment, CoreError> {
		if !matches!(action, AssignmentAction::Accept | AssignmentAction::Decline) {
			return Err(CoreError::Engine(EngineError::Validation(format!(
				"{action} is not a volunteer response"
			))));
		}
		self.respond(assignment_id, action, notes).await
	}

	/// Volunteer accepts an open offer.
	pub async fn accept_offer(
		&self,
		assignment_id: &AssignmentId,
		notes: Option<String>,
	) -> Result<Assignment, CoreError> {
		self.respond(assignment_id, AssignmentAction::Accept, notes).await
	}

	/// Volunteer declines an open offer. Declining frees the slot, so a
	/// backfill matching pass runs immediately.
	pub async fn decline_offer(
		&self,
		assignment_id: &AssignmentId,
		notes: Option<String>,
	) -> Result<Assignment, CoreError> {
		self.respond(assignment_id, AssignmentAction::Decline, notes).await
	}

	async fn respond(
		&self,
		assignment_id: &AssignmentId,
		action: AssignmentAction,
		notes: Option<String>,
	) -> Result<Assignment, CoreError> {
		let emergency_id = self.assignment(assignment_id)?.emergency_id;
		let lock = self.state.emergency_lock(emergency_id);
		let _guard = lock.lock().await;

		let now = self.clock.now();
		let assignment = self
			.apply_transition(assignment_id, action, now, notes)
			.await?;
		self.scheduler.untrack_offer(assignment_id);

		let accepted = action == AssignmentAction::Accept;
		self.publish(EngineEvent::Assignment(if accepted {
			AssignmentEvent::Accepted {
				assignment_id: *assignment_id,
				emergency_id,
			}
		} else {
			AssignmentEvent::Declined {
				assignment_id: *assignment_id,
				emergency_id,
			}
		}));
		self.publish(EngineEvent::Notification(NotificationEvent::AssignmentResponse {
			assignment_id: *assignment_id,
			emergency_id,
			accepted,
		}));

		if accepted {
			// First accept moves the emergency out of Open and stops the
			// zero-accepts watchdog.
			self.scheduler.disarm_watchdog(&emergency_id);
			let emergency = self.emergency(&emergency_id)?;
			if emergency.status == EmergencyStatus::Open {
				self.update_and_persist(&emergency_id, |e| {
					e.status = EmergencyStatus::Assigned;
				})
				.await?;
				self.publish(EngineEvent::Emergency(EmergencyEvent::Assigned {
					emergency_id,
				}));
			}
		} else {
			self.matching_pass_locked(&emergency_id).await?;
		}

		Ok(assignment)
	}

	/// Marks accepted work done. When completions cover the requested
	/// headcount the emergency closes and remaining open offers are
	/// cancelled.
	pub async fn complete_assignment(
		&self,
		assignment_id: &AssignmentId,
		notes: Option<String>,
	) -> Result<Assignment, CoreError> {
		let emergency_id = self.assignment(assignment_id)?.emergency_id;
		let lock = self.state.emergency_lock(emergency_id);
		let _guard = lock.lock().await;

		let now = self.clock.now();
		let assignment = self
			.apply_transition(assignment_id, AssignmentAction::Complete, now, notes)
			.await?;

		self.publish(EngineEvent::Assignment(AssignmentEvent::Completed {
			assignment_id: *assignment_id,
			emergency_id,
		}));
		self.publish(EngineEvent::Notification(NotificationEvent::AssignmentCompleted {
			assignment_id: *assignment_id,
			emergency_id,
		}));

		let emergency = self.emergency(&emergency_id)?;
		let completed = self
			.state
			.assignments_for(&emergency_id)
			.iter()
			.filter(|a| a.status == AssignmentStatus::Completed)
			.count() as u32;

		if emergency.is_active() && completed >= emergency.volunteers_needed {
			for open in self.state.assignments_for(&emergency_id) {
				if open.status == AssignmentStatus::Requested {
					self.apply_transition(&open.id, AssignmentAction::Cancel, now, None)
						.await?;
				}
			}
			self.scheduler.untrack_emergency(&emergency_id);
			self.update_and_persist(&emergency_id, |e| e.status = EmergencyStatus::Closed)
				.await?;
			info!(%emergency_id, completed, "emergency fully served");
			self.publish(EngineEvent::Emergency(EmergencyEvent::Closed {
				emergency_id,
			}));
		}

		Ok(assignment)
	}

	/// Cancels a single assignment. Cancelling the only accepted one of
	/// an assigned emergency reopens it and re-arms the watchdog; any
	/// freed slot triggers a backfill pass.
	pub async fn cancel_assignment(
		&self,
		assignment_id: &AssignmentId,
		notes: Option<String>,
	) -> Result<Assignment, CoreError> {
		let emergency_id = self.assignment(assignment_id)?.emergency_id;
		let lock = self.state.emergency_lock(emergency_id);
		let _guard = lock.lock().await;

		let now = self.clock.now();
		let assignment = self
			.apply_transition(assignment_id, AssignmentAction::Cancel, now, notes)
			.await?;

		let emergency = self.emergency(&emergency_id)?;
		if emergency.is_active() {
			let any_accepted = self
				.state
				.assignments_for(&emergency_id)
				.iter()
				.any(|a| a.status == AssignmentStatus::Accepted);
			if emergency.status == EmergencyStatus::Assigned && !any_accepted {
				self.update_and_persist(&emergency_id, |e| e.status = EmergencyStatus::Open)
					.await?;
				self.scheduler
					.arm_watchdog(emergency_id, now + self.escalation_timeout());
			}
			self.matching_pass_locked(&emergency_id).await?;
		}

		Ok(assignment)
	}

	/// Manual assignment by the authority, bypassing skill and radius
	/// checks. The volunteer must exist, be currently available and not
	/// already hold an assignment for this emergency.
	pub async fn assign_volunteer(
		&self,
		emergency_id: &EmergencyId,
		volunteer_id: &VolunteerId,
	) -> Result<Assignment, CoreError> {
		let lock = self.state.emergency_lock(*emergency_id);
		let _guard = lock.lock().await;

		let emergency = self.emergency(emergency_id)?;
		if !emergency.is_active() {
			return Err(CoreError::Engine(EngineError::Validation(format!(
				"cannot assign to an emergency that is {:?}",
				emergency.status
			))));
		}
		let volunteer = self
			.directory
			.volunteer(volunteer_id)
			.await
			.ok_or(EngineError::NotFound {
				kind: "volunteer",
				id: *volunteer_id,
			})
			.map_err(CoreError::Engine)?;
		if volunteer.availability != Availability::Available {
			return Err(CoreError::Engine(EngineError::Validation(format!(
				"volunteer {} is not currently available",
				volunteer_id
			))));
		}
		if self.state.has_assignment(emergency_id, volunteer_id) {
			return Err(CoreError::Engine(EngineError::DuplicateAssignment {
				emergency_id: *emergency_id,
				volunteer_id: *volunteer_id,
			}));
		}

		self.create_offer(*emergency_id, *volunteer_id).await
	}

	/// Runs the matching pass on demand, e.g. after the host application
	/// learned of new volunteers. Idempotent: with no outstanding need it
	/// creates nothing.
	pub async fn match_request(&self, emergency_id: &EmergencyId) -> Result<usize, CoreError> {
		let lock = self.state.emergency_lock(*emergency_id);
		let _guard = lock.lock().await;
		self.emergency(emergency_id)?;
		self.matching_pass_locked(emergency_id).await
	}

	// ---- matching pass ---------------------------------------------------

	/// Fills the emergency's outstanding need from the eligible pool.
	/// Caller must hold the emergency lock. Returns how many offers were
	/// created.
	async fn matching_pass_locked(&self, emergency_id: &EmergencyId) -> Result<usize, CoreError> {
		let emergency = self.emergency(emergency_id)?;
		if !emergency.is_active() {
			return Ok(0);
		}

		let assignments = self.state.assignments_for(emergency_id);
		let occupied = assignments.iter().filter(|a| a.counts_toward_need()).count() as u32;
		let outstanding = emergency.volunteers_needed.saturating_sub(occupied);
		if outstanding == 0 {
			return Ok(0);
		}

		let pool = self.directory.pool().await;
		let mut candidates =
			responder_matching::eligible(&emergency, &pool, emergency.search_radius_km);
		// One assignment per volunteer per emergency, ever; declined and
		// superseded volunteers are not re-offered the same emergency.
		candidates.retain(|c| !self.state.has_assignment(emergency_id, &c.volunteer.id));
		let candidates = responder_matching::rank(&emergency, candidates);

		let mut created = 0;
		for candidate in candidates.iter().take(outstanding as usize) {
			debug!(
				%emergency_id,
				volunteer_id = %candidate.volunteer.id,
				distance_km = candidate.distance_km,
				score = responder_matching::match_score(&emergency, candidate),
				"candidate selected"
			);
			self.create_offer(*emergency_id, candidate.volunteer.id).await?;
			created += 1;
		}

		debug!(%emergency_id, outstanding, created, "matching pass");

		if created < outstanding as usize {
			let unmet = outstanding - created as u32;
			self.update_and_persist(emergency_id, |e| e.needs_broadening = true)
				.await?;
			self.publish(EngineEvent::Emergency(EmergencyEvent::UnmetNeed {
				emergency_id: *emergency_id,
				outstanding: unmet,
			}));
		}

		Ok(created)
	}

	async fn create_offer(
		&self,
		emergency_id: EmergencyId,
		volunteer_id: VolunteerId,
	) -> Result<Assignment, CoreError> {
		let now = self.clock.now();
		let assignment =
			Assignment::offer(emergency_id, volunteer_id, now, now + self.offer_deadline());

		self.state.insert_assignment(assignment.clone());
		self.persist_assignment(&assignment).await;
		self.scheduler
			.track_offer(assignment.id, emergency_id, assignment.response_deadline);

		debug!(assignment_id = %assignment.id, %emergency_id, %volunteer_id, "offer created");
		self.publish(EngineEvent::Assignment(AssignmentEvent::OfferCreated {
			assignment: assignment.clone(),
		}));
		self.publish(EngineEvent::Notification(NotificationEvent::VolunteerOffer {
			assignment_id: assignment.id,
			volunteer_id,
			emergency_id,
			respond_by: assignment.response_deadline,
		}));

		Ok(assignment)
	}

	// ---- scheduler events ------------------------------------------------

	/// Event loop: applies scheduler deadlines until shutdown.
	pub async fn run(
		&self,
		mut scheduler_rx: mpsc::UnboundedReceiver<SchedulerEvent>,
		mut shutdown: broadcast::Receiver<()>,
	) -> Result<(), CoreError> {
		info!("matching engine started");
		loop {
			tokio::select! {
				event = scheduler_rx.recv() => {
					let Some(event) = event else {
						return Err(CoreError::Channel(
							"scheduler event channel closed".to_string(),
						));
					};
					if let Err(e) = self.handle_scheduler_event(event).await {
						error!(error = %e, "failed to handle scheduler event");
					}
				}
				_ = shutdown.recv() => {
					info!("matching engine shutting down");
					return Ok(());
				}
			}
		}
	}

	pub async fn handle_scheduler_event(&self, event: SchedulerEvent) -> Result<(), CoreError> {
		match event {
			SchedulerEvent::OfferExpired {
				assignment_id,
				emergency_id,
			} => self.handle_offer_expired(&assignment_id, &emergency_id).await,
			SchedulerEvent::EscalationDue { emergency_id } => {
				self.handle_escalation_due(&emergency_id).await
			}
		}
	}

	/// Supersedes an expired offer and backfills. A response that won the
	/// race against the poll tick makes this a no-op.
	async fn handle_offer_expired(
		&self,
		assignment_id: &AssignmentId,
		emergency_id: &EmergencyId,
	) -> Result<(), CoreError> {
		let lock = self.state.emergency_lock(*emergency_id);
		let _guard = lock.lock().await;

		let Some(assignment) = self.state.assignment(assignment_id) else {
			warn!(%assignment_id, "expiry for unknown assignment dropped");
			return Ok(());
		};
		if !assignment.is_open_offer() {
			debug!(%assignment_id, status = %assignment.status, "expiry raced a response, ignoring");
			return Ok(());
		}

		let superseded = self
			.state
			.update_assignment(assignment_id, |a| {
				responder_assignment::supersede(a);
				Ok::<_, EngineError>(())
			})
			.ok_or(EngineError::NotFound {
				kind: "assignment",
				id: *assignment_id,
			})
			.map_err(CoreError::Engine)?
			.map_err(CoreError::Engine)?;
		self.persist_assignment(&superseded).await;

		info!(%assignment_id, %emergency_id, "offer expired");
		self.publish(EngineEvent::Assignment(AssignmentEvent::OfferExpired {
			assignment_id: *assignment_id,
			emergency_id: *emergency_id,
		}));

		if self.emergency(emergency_id)?.is_active() {
			self.matching_pass_locked(emergency_id).await?;
		}
		Ok(())
	}

	/// Escalates an emergency the watchdog flagged, unless an accept
	/// landed in the meantime. The zero-accepts check runs under the
	/// emergency lock so it cannot race a concurrent accept.
	async fn handle_escalation_due(&self, emergency_id: &EmergencyId) -> Result<(), CoreError> {
		let lock = self.state.emergency_lock(*emergency_id);
		let _guard = lock.lock().await;

		let Some(emergency) = self.state.emergency(emergency_id) else {
			error!(%emergency_id, "escalation due for unknown emergency dropped");
			return Ok(());
		};
		if !emergency.is_active() {
			return Ok(());
		}
		let any_accepted = self
			.state
			.assignments_for(emergency_id)
			.iter()
			.any(|a| a.status == AssignmentStatus::Accepted);
		if any_accepted {
			debug!(%emergency_id, "watchdog fired after an accept, ignoring");
			return Ok(());
		}

		self.escalate_locked(emergency_id).await.map(|_| ())
	}

	// ---- recovery --------------------------------------------------------

	/// Reloads persisted emergencies and assignments after a restart and
	/// re-arms scheduler tracking for everything still live. Returns the
	/// number of emergencies and assignments restored.
	pub async fn recover(&self) -> Result<(usize, usize), CoreError> {
		let emergencies: Vec<EmergencyRequest> = self.storage.retrieve_all(NS_EMERGENCY).await?;
		let assignments: Vec<Assignment> = self.storage.retrieve_all(NS_ASSIGNMENT).await?;
		let now = self.clock.now();

		let emergency_count = emergencies.len();
		for emergency in emergencies {
			if emergency.is_active() && emergency.status == EmergencyStatus::Open {
				self.scheduler
					.arm_watchdog(emergency.id, now + self.escalation_timeout());
			}
			self.state.insert_emergency(emergency);
		}

		let assignment_count = assignments.len();
		for assignment in assignments {
			if assignment.is_open_offer() {
				self.scheduler.track_offer(
					assignment.id,
					assignment.emergency_id,
					assignment.response_deadline,
				);
			}
			self.state.insert_assignment(assignment);
		}

		info!(emergency_count, assignment_count, "state recovered from storage");
		Ok((emergency_count, assignment_count))
	}

	// ---- internals -------------------------------------------------------

	async fn apply_transition(
		&self,
		assignment_id: &AssignmentId,
		action: AssignmentAction,
		now: responder_types::Timestamp,
		notes: Option<String>,
	) -> Result<Assignment, CoreError> {
		let result = self
			.state
			.update_assignment(assignment_id, |a| {
				responder_assignment::transition(a, action, now, notes)
			})
			.ok_or(EngineError::NotFound {
				kind: "assignment",
				id: *assignment_id,
			})
			.map_err(CoreError::Engine)?;
		let assignment = result.map_err(CoreError::Engine)?;

		if assignment.is_terminal() {
			self.scheduler.untrack_offer(assignment_id);
		}
		if action == AssignmentAction::Cancel {
			self.publish(EngineEvent::Assignment(AssignmentEvent::Cancelled {
				assignment_id: *assignment_id,
				emergency_id: assignment.emergency_id,
			}));
		}
		self.persist_assignment(&assignment).await;
		Ok(assignment)
	}

	async fn update_and_persist<F>(
		&self,
		emergency_id: &EmergencyId,
		mutate: F,
	) -> Result<EmergencyRequest, CoreError>
	where
		F: FnOnce(&mut EmergencyRequest),
	{
		let updated = self
			.state
			.update_emergency(emergency_id, mutate)
			.ok_or(EngineError::NotFound {
				kind: "emergency",
				id: *emergency_id,
			})
			.map_err(CoreError::Engine)?;
		self.persist_emergency(&updated).await;
		Ok(updated)
	}

	// Persistence mirrors the in-memory state and must never gate
	// matching: failures are logged, not propagated.
	async fn persist_emergency(&self, emergency: &EmergencyRequest) {
		if let Err(e) = self
			.storage
			.store(NS_EMERGENCY, &emergency.id.to_string(), emergency)
			.await
		{
			error!(emergency_id = %emergency.id, error = %e, "failed to persist emergency");
		}
	}

	async fn persist_assignment(&self, assignment: &Assignment) {
		if let Err(e) = self
			.storage
			.store(NS_ASSIGNMENT, &assignment.id.to_string(), assignment)
			.await
		{
			error!(assignment_id = %assignment.id, error = %e, "failed to persist assignment");
		}
	}

	fn publish(&self, event: EngineEvent) {
		self.event_bus.publish(event).ok();
	}
}
