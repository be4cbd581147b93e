//! Volunteer directory integration.
//!
//! Volunteer profiles are owned by the surrounding application; the
//! engine only reads them through this trait. Availability, skills and
//! verification state all change outside the engine.

use async_trait::async_trait;
use dashmap::DashMap;

use responder_types::{Volunteer, VolunteerId};

/// Read access to volunteer profiles.
#[async_trait]
pub trait VolunteerDirectory: Send + Sync {
	/// Looks up a single profile.
	async fn volunteer(&self, id: &VolunteerId) -> Option<Volunteer>;

	/// The full pool considered by matching passes. Filtering down to
	/// eligible candidates is the engine's job, not the directory's.
	async fn pool(&self) -> Vec<Volunteer>;
}

/// Directory backed by an in-process map. The host application keeps it
/// current via [`upsert`](Self::upsert); also the backend used in tests.
#[derive(Default)]
pub struct InMemoryDirectory {
	volunteers: DashMap<VolunteerId, Volunteer>,
}

impl InMemoryDirectory {
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts or replaces a profile.
	pub fn upsert(&self, volunteer: Volunteer) {
		self.volunteers.insert(volunteer.id, volunteer);
	}

	/// Removes a profile. Absent ids are a no-op.
	pub fn remove(&self, id: &VolunteerId) {
		self.volunteers.remove(id);
	}

	pub fn len(&self) -> usize {
		self.volunteers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.volunteers.is_empty()
	}
}

#[async_trait]
impl VolunteerDirectory for InMemoryDirectory {
	async fn volunteer(&self, id: &VolunteerId) -> Option<Volunteer> {
		self.volunteers.get(id).map(|entry| entry.value().clone())
	}

	async fn pool(&self) -> Vec<Volunteer> {
		self.volunteers
			.iter()
			.map(|entry| entry.value().clone())
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use responder_types::Availability;
	use uuid::Uuid;

	#[tokio::test]
	async fn upsert_replaces_existing_profile() {
		let directory = InMemoryDirectory::new();
		let id = Uuid::new_v4();

		let mut volunteer = Volunteer {
			id,
			location: None,
			availability: Availability::Available,
			skills: vec![],
			last_active: Utc::now(),
		};
		directory.upsert(volunteer.clone());

		volunteer.availability = Availability::Busy;
		directory.upsert(volunteer);

		assert_eq!(directory.len(), 1);
		let loaded = directory.volunteer(&id).await.unwrap();
		assert_eq!(loaded.availability, Availability::Busy);
	}
}
