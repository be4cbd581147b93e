//! Eligibility filtering.
//!
//! A volunteer is eligible for an emergency iff they are available, hold
//! at least one verified skill from the emergency's required set (partial
//! coverage is enough; several volunteers jointly cover the need), and
//! sit within the emergency's current search radius. Volunteers with
//! missing or malformed coordinates are skipped with a warning, never an
//! error; an empty result is a valid outcome.

use serde::{Deserialize, Serialize};
use tracing::warn;

use responder_types::{EmergencyRequest, Volunteer};

/// A volunteer that passed eligibility, with the facts ranking needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
	pub volunteer: Volunteer,
	pub distance_km: f64,
	/// Number of required skills the volunteer holds verified.
	pub skill_overlap: usize,
}

/// Narrows `pool` to the volunteers eligible for `emergency` at
/// `radius_km`. The radius is passed explicitly because the orchestrator
/// may be running a broadened escalation pass.
pub fn eligible(emergency: &EmergencyRequest, pool: &[Volunteer], radius_km: f64) -> Vec<Candidate> {
	let located: Vec<(&Volunteer, responder_types::Location)> = pool
		.iter()
		.filter(|volunteer| volunteer.is_available())
		.filter_map(|volunteer| {
			let Some(location) = volunteer.location else {
				return None;
			};
			if let Err(error) = responder_geo::validate(&location) {
				warn!(
					volunteer_id = %volunteer.id,
					%error,
					"skipping volunteer with malformed coordinates"
				);
				return None;
			}
			Some((volunteer, location))
		})
		.collect();

	responder_geo::within_radius(&emergency.location, radius_km, located, |(_, loc)| *loc)
		.into_iter()
		.filter_map(|((volunteer, _), distance_km)| {
			let skill_overlap = volunteer.verified_overlap(&emergency.required_skills);
			if !emergency.required_skills.is_empty() && skill_overlap == 0 {
				return None;
			}
			Some(Candidate {
				volunteer: volunteer.clone(),
				distance_km,
				skill_overlap,
			})
		})
		.collect()
}
