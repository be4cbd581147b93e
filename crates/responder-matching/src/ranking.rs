//! Deterministic candidate ranking.
//!
//! The order is a pure function of the candidate facts; identical inputs
//! always yield the identical sequence, which the scenario tests rely on.
//! Keys, in order: verified required-skill overlap (more first), distance
//! (closer first), availability freshness (more recent first), volunteer
//! id (total order tie-break so the sort is stable across runs).

use std::cmp::Ordering;

use responder_types::{EmergencyRequest, Priority};

use crate::Candidate;

/// Orders `candidates` best-first. No randomness.
pub fn rank(_emergency: &EmergencyRequest, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
	candidates.sort_by(compare);
	candidates
}

fn compare(a: &Candidate, b: &Candidate) -> Ordering {
	b.skill_overlap
		.cmp(&a.skill_overlap)
		.then_with(|| a.distance_km.total_cmp(&b.distance_km))
		.then_with(|| b.volunteer.last_active.cmp(&a.volunteer.last_active))
		.then_with(|| a.volunteer.id.cmp(&b.volunteer.id))
}

/// Diagnostic 0-100 score for a candidate. Used for statistics and
/// logging only; ranking never consults it.
///
/// Components: distance closeness (0-40), skill coverage (0-40), and a
/// priority bonus (0-20) so critical emergencies surface hotter matches
/// in dashboards.
pub fn match_score(emergency: &EmergencyRequest, candidate: &Candidate) -> f64 {
	let mut score = 0.0;

	if emergency.search_radius_km > 0.0 {
		let closeness = 1.0 - candidate.distance_km / emergency.search_radius_km;
		score += (40.0 * closeness).max(0.0);
	}

	if !emergency.required_skills.is_empty() {
		let coverage = candidate.skill_overlap as f64 / emergency.required_skills.len() as f64;
		score += 40.0 * coverage;
	} else {
		score += 20.0;
	}

	score += match emergency.priority {
		Priority::Critical => 20.0,
		Priority::High => 10.0,
		Priority::Medium => 5.0,
		Priority::Low => 0.0,
	};

	score.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{Duration, Utc};
	use responder_types::{
		Availability, EmergencyStatus, Location, Timestamp, Volunteer, VolunteerId,
		VolunteerSkill,
	};
	use uuid::Uuid;

	fn emergency(required: &[&str]) -> EmergencyRequest {
		EmergencyRequest {
			id: Uuid::new_v4(),
			authority_id: Uuid::new_v4(),
			title: "test".into(),
			description: String::new(),
			location: Location::new(0.0, 0.0),
			priority: Priority::High,
			required_skills: required.iter().map(|s| s.to_string()).collect(),
			volunteers_needed: 1,
			status: EmergencyStatus::Open,
			search_radius_km: 10.0,
			needs_broadening: false,
			escalation_count: 0,
			created_at: Utc::now(),
			escalated_at: None,
		}
	}

	fn candidate(
		id: VolunteerId,
		distance_km: f64,
		skill_overlap: usize,
		last_active: Timestamp,
	) -> Candidate {
		Candidate {
			volunteer: Volunteer {
				id,
				location: Some(Location::new(0.0, 0.0)),
				availability: Availability::Available,
				skills: vec![VolunteerSkill::verified("paramedic")],
				last_active,
			},
			distance_km,
			skill_overlap,
		}
	}

	#[test]
	fn overlap_beats_distance() {
		let now = Utc::now();
		let specialist = candidate(Uuid::new_v4(), 8.0, 2, now);
		let generalist = candidate(Uuid::new_v4(), 1.0, 1, now);

		let ranked = rank(
			&emergency(&["paramedic", "search_and_rescue"]),
			vec![generalist.clone(), specialist.clone()],
		);
		assert_eq!(ranked[0].volunteer.id, specialist.volunteer.id);
	}

	#[test]
	fn distance_breaks_overlap_ties() {
		let now = Utc::now();
		let near = candidate(Uuid::new_v4(), 1.0, 1, now);
		let far = candidate(Uuid::new_v4(), 3.0, 1, now);

		let ranked = rank(&emergency(&["paramedic"]), vec![far.clone(), near.clone()]);
		assert_eq!(ranked[0].volunteer.id, near.volunteer.id);
		assert_eq!(ranked[1].volunteer.id, far.volunteer.id);
	}

	#[test]
	fn freshness_breaks_distance_ties() {
		let now = Utc::now();
		let stale = candidate(Uuid::new_v4(), 2.0, 1, now - Duration::hours(6));
		let fresh = candidate(Uuid::new_v4(), 2.0, 1, now);

		let ranked = rank(&emergency(&["paramedic"]), vec![stale.clone(), fresh.clone()]);
		assert_eq!(ranked[0].volunteer.id, fresh.volunteer.id);
	}

	#[test]
	fn identity_gives_total_order() {
		let now = Utc::now();
		let low = candidate(Uuid::from_u128(1), 2.0, 1, now);
		let high = candidate(Uuid::from_u128(2), 2.0, 1, now);

		let ranked = rank(&emergency(&["paramedic"]), vec![high.clone(), low.clone()]);
		assert_eq!(ranked[0].volunteer.id, low.volunteer.id);
	}

	#[test]
	fn ranking_is_deterministic_across_input_orders() {
		let now = Utc::now();
		let candidates: Vec<Candidate> = (0..6)
			.map(|i| {
				candidate(
					Uuid::from_u128(i),
					(i % 3) as f64,
					(i % 2) as usize + 1,
					now - Duration::minutes(i as i64),
				)
			})
			.collect();

		let mut reversed = candidates.clone();
		reversed.reverse();

		let e = emergency(&["paramedic", "search_and_rescue"]);
		let forward: Vec<VolunteerId> = rank(&e, candidates)
			.into_iter()
			.map(|c| c.volunteer.id)
			.collect();
		let backward: Vec<VolunteerId> = rank(&e, reversed)
			.into_iter()
			.map(|c| c.volunteer.id)
			.collect();

		assert_eq!(forward, backward);
	}

	#[test]
	fn score_stays_in_bounds() {
		let now = Utc::now();
		let e = emergency(&["paramedic"]);

		let perfect = candidate(Uuid::new_v4(), 0.0, 1, now);
		let poor = candidate(Uuid::new_v4(), 10.0, 0, now);

		assert!(match_score(&e, &perfect) <= 100.0);
		assert!(match_score(&e, &poor) >= 0.0);
		assert!(match_score(&e, &perfect) > match_score(&e, &poor));
	}
}
