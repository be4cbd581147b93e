//! Volunteer profile types.
//!
//! Volunteers are owned by the surrounding application's profile
//! collaborator; the engine only reads them. A skill counts for matching
//! only once its verification status is `Verified`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{Location, Skill, Timestamp, VolunteerId};

/// Current availability of a volunteer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
	Available,
	Busy,
	Offline,
}

/// Verification state of a declared skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillVerification {
	Pending,
	Verified,
	Rejected,
}

/// A skill declared by a volunteer together with its verification state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolunteerSkill {
	pub skill: Skill,
	pub verification: SkillVerification,
}

impl VolunteerSkill {
	pub fn verified(skill: impl Into<Skill>) -> Self {
		Self {
			skill: skill.into(),
			verification: SkillVerification::Verified,
		}
	}

	pub fn pending(skill: impl Into<Skill>) -> Self {
		Self {
			skill: skill.into(),
			verification: SkillVerification::Pending,
		}
	}
}

/// A volunteer profile as supplied by the directory collaborator.
///
/// The location is optional: profiles without coordinates exist in the
/// source system and are simply never eligible for matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volunteer {
	pub id: VolunteerId,
	pub location: Option<Location>,
	pub availability: Availability,
	pub skills: Vec<VolunteerSkill>,
	/// When the availability status was last updated. Fresher profiles are
	/// considered more trustworthy by the ranker.
	pub last_active: Timestamp,
}

impl Volunteer {
	pub fn is_available(&self) -> bool {
		self.availability == Availability::Available
	}

	/// Names of all skills that have passed verification.
	pub fn verified_skills(&self) -> BTreeSet<&str> {
		self.skills
			.iter()
			.filter(|s| s.verification == SkillVerification::Verified)
			.map(|s| s.skill.as_str())
			.collect()
	}

	pub fn has_verified_skill(&self, skill: &str) -> bool {
		self.skills
			.iter()
			.any(|s| s.skill == skill && s.verification == SkillVerification::Verified)
	}

	/// How many of the given required skills this volunteer holds verified.
	pub fn verified_overlap(&self, required: &BTreeSet<Skill>) -> usize {
		required
			.iter()
			.filter(|skill| self.has_verified_skill(skill))
			.count()
	}
}
