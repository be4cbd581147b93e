//! Geographic primitives for the responder matching engine.
//!
//! Great-circle distance via the haversine formula, coordinate
//! validation, radius queries with a cheap bounding-box pre-pass, and the
//! radius-doubling rule used by escalation. Everything here is a pure
//! function over coordinates; there is no I/O and no shared state.

use responder_types::{EngineError, Location, Result};

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometers per degree of latitude (and of longitude at the equator).
const KM_PER_DEGREE: f64 = 111.0;

/// Rejects coordinates outside the valid latitude/longitude ranges.
pub fn validate(location: &Location) -> Result<()> {
	if location.is_valid() {
		Ok(())
	} else {
		Err(EngineError::InvalidCoordinate {
			latitude: location.latitude,
			longitude: location.longitude,
		})
	}
}

/// Great-circle distance between two points in kilometers, rounded to
/// two decimals.
pub fn distance_km(a: &Location, b: &Location) -> f64 {
	let lat1 = a.latitude.to_radians();
	let lat2 = b.latitude.to_radians();
	let dlat = (b.latitude - a.latitude).to_radians();
	let dlon = (b.longitude - a.longitude).to_radians();

	let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
	let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

	round2(EARTH_RADIUS_KM * c)
}

fn round2(value: f64) -> f64 {
	(value * 100.0).round() / 100.0
}

/// Rectangular area used to pre-filter candidates before the exact
/// distance check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
	pub min_latitude: f64,
	pub max_latitude: f64,
	pub min_longitude: f64,
	pub max_longitude: f64,
}

impl BoundingBox {
	pub fn contains(&self, point: &Location) -> bool {
		point.latitude >= self.min_latitude
			&& point.latitude <= self.max_latitude
			&& point.longitude >= self.min_longitude
			&& point.longitude <= self.max_longitude
	}
}

/// Bounding box around `center` that covers `radius_km` in every
/// direction, clamped to valid coordinate ranges. One degree of
/// longitude shrinks with the cosine of the latitude.
pub fn bounding_box(center: &Location, radius_km: f64) -> BoundingBox {
	let lat_delta = radius_km / KM_PER_DEGREE;
	let lon_delta = radius_km / (KM_PER_DEGREE * center.latitude.to_radians().cos());

	BoundingBox {
		min_latitude: (center.latitude - lat_delta).max(-90.0),
		max_latitude: (center.latitude + lat_delta).min(90.0),
		min_longitude: (center.longitude - lon_delta).max(-180.0),
		max_longitude: (center.longitude + lon_delta).min(180.0),
	}
}

/// Filters `items` down to those within `radius_km` of `center`, paired
/// with their exact distance and sorted nearest first. Items are located
/// through the `position` accessor; items inside the bounding box but
/// outside the circle are discarded by the exact check.
pub fn within_radius<T>(
	center: &Location,
	radius_km: f64,
	items: impl IntoIterator<Item = T>,
	position: impl Fn(&T) -> Location,
) -> Vec<(T, f64)> {
	let prefilter = bounding_box(center, radius_km);

	let mut hits: Vec<(T, f64)> = items
		.into_iter()
		.filter_map(|item| {
			let point = position(&item);
			if !prefilter.contains(&point) {
				return None;
			}
			let distance = distance_km(center, &point);
			(distance <= radius_km).then_some((item, distance))
		})
		.collect();

	hits.sort_by(|a, b| a.1.total_cmp(&b.1));
	hits
}

/// Doubles a search radius, clamped to `max_km`. Used when an emergency
/// escalates with unmet need.
pub fn expand_radius(current_km: f64, max_km: f64) -> f64 {
	(current_km * 2.0).min(max_km)
}

#[cfg(test)]
mod tests {
	use super::*;

	// Central Berlin and Potsdam, roughly 27 km apart.
	const BERLIN: Location = Location {
		latitude: 52.5200,
		longitude: 13.4050,
	};
	const POTSDAM: Location = Location {
		latitude: 52.3906,
		longitude: 13.0645,
	};

	#[test]
	fn distance_is_symmetric_and_plausible() {
		let there = distance_km(&BERLIN, &POTSDAM);
		let back = distance_km(&POTSDAM, &BERLIN);

		assert_eq!(there, back);
		assert!((26.0..29.0).contains(&there), "got {}", there);
	}

	#[test]
	fn distance_to_self_is_zero() {
		assert_eq!(distance_km(&BERLIN, &BERLIN), 0.0);
	}

	#[test]
	fn validate_rejects_out_of_range() {
		assert!(validate(&BERLIN).is_ok());

		let err = validate(&Location::new(91.0, 0.0)).unwrap_err();
		assert!(matches!(err, EngineError::InvalidCoordinate { .. }));
	}

	#[test]
	fn bounding_box_contains_radius() {
		let bbox = bounding_box(&BERLIN, 30.0);
		assert!(bbox.contains(&POTSDAM));
		assert!(!bbox.contains(&Location::new(48.1371, 11.5754))); // Munich
	}

	#[test]
	fn within_radius_filters_and_sorts() {
		let points = vec![
			("potsdam", POTSDAM),
			("berlin", BERLIN),
			("munich", Location::new(48.1371, 11.5754)),
		];

		let hits = within_radius(&BERLIN, 50.0, points, |(_, p)| *p);
		let names: Vec<&str> = hits.iter().map(|((name, _), _)| *name).collect();

		assert_eq!(names, vec!["berlin", "potsdam"]);
		assert!(hits[0].1 < hits[1].1);
	}

	#[test]
	fn expand_radius_doubles_and_clamps() {
		assert_eq!(expand_radius(10.0, 100.0), 20.0);
		assert_eq!(expand_radius(80.0, 100.0), 100.0);
		assert_eq!(expand_radius(100.0, 100.0), 100.0);
	}
}
