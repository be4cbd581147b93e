//! Common identifiers and geographic primitives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for an emergency request.
pub type EmergencyId = uuid::Uuid;

/// Unique identifier for a volunteer profile.
pub type VolunteerId = uuid::Uuid;

/// Unique identifier for an assignment.
pub type AssignmentId = uuid::Uuid;

/// Identifier of the requesting authority that owns an emergency.
pub type AuthorityId = uuid::Uuid;

/// Timestamp used throughout the engine.
pub type Timestamp = DateTime<Utc>;

/// A named capability a volunteer can hold or an emergency can require.
pub type Skill = String;

/// A point on the Earth's surface in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
	pub latitude: f64,
	pub longitude: f64,
}

impl Location {
	pub fn new(latitude: f64, longitude: f64) -> Self {
		Self {
			latitude,
			longitude,
		}
	}

	/// Whether both coordinates fall inside their valid ranges.
	pub fn is_valid(&self) -> bool {
		(-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn location_validity_bounds() {
		assert!(Location::new(90.0, 180.0).is_valid());
		assert!(Location::new(-90.0, -180.0).is_valid());
		assert!(!Location::new(90.01, 0.0).is_valid());
		assert!(!Location::new(0.0, -180.5).is_valid());
	}
}
