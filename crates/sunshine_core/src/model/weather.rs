//! Per-day weather forecast records.
//!
//! # Invariants
//! - `date` is the identity used for replace-on-conflict writes.
//! - `min <= max` and every measurement is finite.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Row identifier assigned by the local store.
pub type WeatherId = i64;

/// One set of entries produced by a single remote fetch.
pub type ForecastBatch = Vec<WeatherEntry>;

/// Full forecast for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherEntry {
    /// `None` until the store assigns one on insert.
    #[serde(default)]
    pub id: Option<WeatherId>,
    /// Provider condition code used to pick an icon and description.
    pub weather_icon_id: i32,
    pub date: NaiveDate,
    /// Minimum temperature in degrees Celsius.
    pub min: f64,
    /// Maximum temperature in degrees Celsius.
    pub max: f64,
    #[serde(default)]
    pub humidity: f64,
    #[serde(default)]
    pub pressure: f64,
    /// Wind speed in km/h.
    #[serde(default)]
    pub wind: f64,
    /// Wind direction in meteorological degrees.
    #[serde(default)]
    pub degrees: f64,
}

/// Validation errors for [`WeatherEntry`] values.
#[derive(Debug, Clone, PartialEq)]
pub enum WeatherValidationError {
    NonFiniteValue {
        date: NaiveDate,
        field: &'static str,
    },
    MinAboveMax {
        date: NaiveDate,
        min: f64,
        max: f64,
    },
}

impl Display for WeatherValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonFiniteValue { date, field } => {
                write!(f, "weather entry for {date} has non-finite `{field}`")
            }
            Self::MinAboveMax { date, min, max } => write!(
                f,
                "weather entry for {date} has min {min} above max {max}"
            ),
        }
    }
}

impl Error for WeatherValidationError {}

impl WeatherEntry {
    /// Creates an entry with only the list-projection fields set.
    pub fn new(date: NaiveDate, weather_icon_id: i32, min: f64, max: f64) -> Self {
        Self {
            id: None,
            weather_icon_id,
            date,
            min,
            max,
            humidity: 0.0,
            pressure: 0.0,
            wind: 0.0,
            degrees: 0.0,
        }
    }

    /// Checks measurement sanity before the entry reaches storage.
    pub fn validate(&self) -> Result<(), WeatherValidationError> {
        let fields = [
            ("min", self.min),
            ("max", self.max),
            ("humidity", self.humidity),
            ("pressure", self.pressure),
            ("wind", self.wind),
            ("degrees", self.degrees),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(WeatherValidationError::NonFiniteValue {
                    date: self.date,
                    field,
                });
            }
        }

        if self.min > self.max {
            return Err(WeatherValidationError::MinAboveMax {
                date: self.date,
                min: self.min,
                max: self.max,
            });
        }

        Ok(())
    }

    /// Projects this entry to its list-view shape.
    pub fn to_list_entry(&self) -> ListWeatherEntry {
        ListWeatherEntry {
            id: self.id,
            weather_icon_id: self.weather_icon_id,
            date: self.date,
            min: self.min,
            max: self.max,
        }
    }
}

/// Narrow projection used by the forecast list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListWeatherEntry {
    pub id: Option<WeatherId>,
    pub weather_icon_id: i32,
    pub date: NaiveDate,
    pub min: f64,
    pub max: f64,
}

#[cfg(test)]
mod tests {
    use super::{WeatherEntry, WeatherValidationError};
    use chrono::NaiveDate;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date")
    }

    #[test]
    fn validate_accepts_equal_min_and_max() {
        let entry = WeatherEntry::new(day(), 800, 12.0, 12.0);
        assert!(entry.validate().is_ok());
    }

    #[test]
    fn validate_rejects_min_above_max() {
        let entry = WeatherEntry::new(day(), 800, 20.0, 10.0);
        assert!(matches!(
            entry.validate(),
            Err(WeatherValidationError::MinAboveMax { .. })
        ));
    }

    #[test]
    fn validate_rejects_nan_wind() {
        let mut entry = WeatherEntry::new(day(), 500, 1.0, 2.0);
        entry.wind = f64::NAN;
        assert_eq!(
            entry.validate(),
            Err(WeatherValidationError::NonFiniteValue {
                date: day(),
                field: "wind",
            })
        );
    }

    #[test]
    fn deserializes_with_optional_measurements_missing() {
        let entry: WeatherEntry = serde_json::from_str(
            r#"{"weather_icon_id":801,"date":"2024-03-01","min":3.5,"max":9.0}"#,
        )
        .expect("entry json should parse");
        assert_eq!(entry.id, None);
        assert_eq!(entry.date, day());
        assert_eq!(entry.humidity, 0.0);
    }
}
