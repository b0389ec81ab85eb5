//! Feature engineering
//!
//! Turns trip records into a duration label and the feature dictionary
//! `{PU_DO, trip_distance}`. Trips outside the accepted duration window are
//! dropped before any feature is built, so labels and features stay aligned.

use serde::{Deserialize, Serialize};
use taxi_duration_core::{FeatureDict, FeatureValue};

use crate::dataset::{TripRecord, TripTable};
use crate::errors::{Result, TrainerError};

/// Shortest kept trip, in minutes (inclusive)
pub const MIN_DURATION_MINUTES: f64 = 1.0;
/// Longest kept trip, in minutes (inclusive)
pub const MAX_DURATION_MINUTES: f64 = 60.0;

/// Categorical pickup/dropoff zone pair feature
pub const PU_DO: &str = "PU_DO";
/// Numeric trip distance feature
pub const TRIP_DISTANCE: &str = "trip_distance";

/// Trip duration in minutes with microsecond precision
pub fn trip_duration_minutes(trip: &TripRecord) -> f64 {
    let elapsed = trip.dropoff - trip.pickup;
    match elapsed.num_microseconds() {
        Some(micros) => micros as f64 / 60_000_000.0,
        None => elapsed.num_seconds() as f64 / 60.0,
    }
}

/// Whether a trip of `minutes` is kept for training
pub fn is_kept_duration(minutes: f64) -> bool {
    (MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&minutes)
}

/// A ride as submitted for prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ride {
    #[serde(rename = "PULocationID")]
    pub pu_location_id: i64,
    #[serde(rename = "DOLocationID")]
    pub do_location_id: i64,
    pub trip_distance: f64,
}

/// Engineered features of one trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    #[serde(rename = "PU_DO")]
    pub pu_do: String,
    pub trip_distance: f64,
}

impl FeatureRecord {
    fn new(pu_location_id: i64, do_location_id: i64, trip_distance: f64) -> Self {
        Self {
            pu_do: format!("{pu_location_id}_{do_location_id}"),
            trip_distance,
        }
    }

    pub fn from_trip(trip: &TripRecord) -> Self {
        Self::new(trip.pu_location_id, trip.do_location_id, trip.trip_distance)
    }

    /// Features for a prediction request; the distance must be finite and non-negative
    pub fn from_ride(ride: &Ride) -> Result<Self> {
        if !ride.trip_distance.is_finite() || ride.trip_distance < 0.0 {
            return Err(TrainerError::InvalidRide(format!(
                "trip_distance must be a non-negative number, got {}",
                ride.trip_distance
            )));
        }
        Ok(Self::new(
            ride.pu_location_id,
            ride.do_location_id,
            ride.trip_distance,
        ))
    }

    pub fn to_dict(&self) -> FeatureDict {
        let mut dict = FeatureDict::new();
        dict.insert(PU_DO.to_string(), FeatureValue::from(self.pu_do.as_str()));
        dict.insert(
            TRIP_DISTANCE.to_string(),
            FeatureValue::from(self.trip_distance),
        );
        dict
    }
}

/// Labels and feature dictionaries of one split, row-aligned
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedSplit {
    pub features: Vec<FeatureDict>,
    pub labels: Vec<f64>,
    /// Trips removed by the duration filter
    pub dropped: usize,
}

impl PreparedSplit {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Filter trips to the accepted duration window and build their features
pub fn prepare_features(table: &TripTable) -> PreparedSplit {
    let mut split = PreparedSplit::default();

    for trip in &table.records {
        let minutes = trip_duration_minutes(trip);
        if !is_kept_duration(minutes) {
            split.dropped += 1;
            continue;
        }
        split.labels.push(minutes);
        split.features.push(FeatureRecord::from_trip(trip).to_dict());
    }

    tracing::debug!(
        kept = split.len(),
        dropped = split.dropped,
        "Prepared features"
    );
    split
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use proptest::prelude::*;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn trip(pu: i64, dox: i64, distance: f64, micros: i64) -> TripRecord {
        TripRecord {
            pickup: start(),
            dropoff: start() + Duration::microseconds(micros),
            pu_location_id: pu,
            do_location_id: dox,
            trip_distance: distance,
        }
    }

    fn minutes(m: f64) -> i64 {
        (m * 60_000_000.0).round() as i64
    }

    #[test]
    fn test_duration_minutes() {
        assert_eq!(trip_duration_minutes(&trip(1, 2, 1.0, minutes(12.0))), 12.0);
        assert_eq!(trip_duration_minutes(&trip(1, 2, 1.0, 90_000_000)), 1.5);
    }

    #[test]
    fn test_duration_window_boundaries() {
        let table = TripTable::from_records(vec![
            trip(1, 1, 1.0, minutes(1.0)),
            trip(2, 2, 1.0, minutes(60.0)),
            trip(3, 3, 1.0, 59_940_000),
            trip(4, 4, 1.0, 3_600_060_000),
            trip(5, 5, 1.0, -minutes(5.0)),
        ]);
        let split = prepare_features(&table);

        assert_eq!(split.labels, vec![1.0, 60.0]);
        assert_eq!(split.dropped, 3);
        assert_eq!(split.features[0][PU_DO], FeatureValue::from("1_1"));
        assert_eq!(split.features[1][PU_DO], FeatureValue::from("2_2"));
    }

    #[test]
    fn test_feature_record() {
        let record = FeatureRecord::from_trip(&trip(10, 50, 5.0, minutes(12.0)));
        assert_eq!(record.pu_do, "10_50");

        let dict = record.to_dict();
        assert_eq!(dict.len(), 2);
        assert_eq!(dict[TRIP_DISTANCE], FeatureValue::Numeric(5.0));
    }

    #[test]
    fn test_from_ride() {
        let ride: Ride =
            serde_json::from_str(r#"{"PULocationID": 10, "DOLocationID": 50, "trip_distance": 40}"#)
                .unwrap();
        let record = FeatureRecord::from_ride(&ride).unwrap();
        assert_eq!(record.pu_do, "10_50");
        assert_eq!(record.trip_distance, 40.0);

        let negative = Ride {
            trip_distance: -5.0,
            ..ride
        };
        assert!(FeatureRecord::from_ride(&negative).is_err());
    }

    #[test]
    fn test_ride_requires_all_fields() {
        let result = serde_json::from_str::<Ride>(r#"{"PULocationID": 10}"#);
        assert!(result.is_err());
    }

    proptest! {
        #[test]
        fn prop_labels_align_with_features(
            trips in prop::collection::vec(
                (0i64..300, 0i64..300, 0.0f64..50.0, -600_000_000i64..5_000_000_000),
                0..64,
            )
        ) {
            let table = TripTable::from_records(
                trips.iter().map(|&(pu, dox, d, us)| trip(pu, dox, d, us)).collect(),
            );
            let split = prepare_features(&table);

            prop_assert_eq!(split.labels.len(), split.features.len());
            prop_assert_eq!(split.labels.len() + split.dropped, table.len());
            prop_assert!(split.labels.iter().all(|&m| (1.0..=60.0).contains(&m)));
        }
    }
}
