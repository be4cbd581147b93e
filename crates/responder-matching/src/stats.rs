//! Matching diagnostics for the authority surface.
//!
//! Read-only summaries: who is in radius and in what availability state,
//! how much need is still outstanding, and whether widening the radius
//! would actually add candidates.

use serde::{Deserialize, Serialize};

use responder_types::{Assignment, Availability, EmergencyRequest, Volunteer};

use crate::eligibility;

/// Snapshot of the matching situation around one emergency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingStatistics {
	pub total_in_radius: usize,
	pub available: usize,
	pub busy: usize,
	pub offline: usize,
	pub existing_assignments: usize,
	pub accepted: usize,
	pub volunteers_needed: u32,
	pub outstanding_need: u32,
	pub search_radius_km: f64,
	pub required_skills: usize,
}

/// Computes statistics over the current pool and the emergency's
/// assignments. Counts every availability state, not just `available`,
/// so dashboards can show why a pool is thin.
pub fn matching_statistics(
	emergency: &EmergencyRequest,
	pool: &[Volunteer],
	assignments: &[Assignment],
) -> MatchingStatistics {
	let located: Vec<(&Volunteer, responder_types::Location)> = pool
		.iter()
		.filter_map(|v| {
			let location = v.location.filter(|l| l.is_valid())?;
			Some((v, location))
		})
		.collect();

	let in_radius = responder_geo::within_radius(
		&emergency.location,
		emergency.search_radius_km,
		located,
		|(_, location)| *location,
	);

	let mut available = 0;
	let mut busy = 0;
	let mut offline = 0;
	for ((volunteer, _), _) in &in_radius {
		match volunteer.availability {
			Availability::Available => available += 1,
			Availability::Busy => busy += 1,
			Availability::Offline => offline += 1,
		}
	}

	let accepted = assignments
		.iter()
		.filter(|a| a.status == responder_types::AssignmentStatus::Accepted)
		.count();
	let occupied = assignments.iter().filter(|a| a.counts_toward_need()).count() as u32;

	MatchingStatistics {
		total_in_radius: in_radius.len(),
		available,
		busy,
		offline,
		existing_assignments: assignments.len(),
		accepted,
		volunteers_needed: emergency.volunteers_needed,
		outstanding_need: emergency.volunteers_needed.saturating_sub(occupied),
		search_radius_km: emergency.search_radius_km,
		required_skills: emergency.required_skills.len(),
	}
}

/// Whether widening the search radius is worthwhile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpansionSuggestion {
	pub needs_expansion: bool,
	pub current_radius_km: f64,
	pub suggested_radius_km: f64,
	/// Eligible candidates gained by the wider radius.
	pub additional_candidates: usize,
}

/// Suggests a doubled (max-clamped) radius when the current one cannot
/// cover the emergency's need, and reports how many extra eligible
/// candidates that wider pass would see.
pub fn suggest_expansion(
	emergency: &EmergencyRequest,
	pool: &[Volunteer],
	max_radius_km: f64,
) -> ExpansionSuggestion {
	let current = eligibility::eligible(emergency, pool, emergency.search_radius_km);

	if current.len() as u32 >= emergency.volunteers_needed {
		return ExpansionSuggestion {
			needs_expansion: false,
			current_radius_km: emergency.search_radius_km,
			suggested_radius_km: emergency.search_radius_km,
			additional_candidates: 0,
		};
	}

	let suggested = responder_geo::expand_radius(emergency.search_radius_km, max_radius_km);
	let widened = eligibility::eligible(emergency, pool, suggested);

	ExpansionSuggestion {
		needs_expansion: true,
		current_radius_km: emergency.search_radius_km,
		suggested_radius_km: suggested,
		additional_candidates: widened.len().saturating_sub(current.len()),
	}
}
