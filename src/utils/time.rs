use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::Serializer;

pub fn to_iso(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}

/// `serialize_with` adapter emitting [`to_iso`] strings.
pub fn serialize_iso<S: Serializer>(dt: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&to_iso(*dt))
}

pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Lower bound for the "changed in the last week" listings.
pub fn last_week_cutoff(now: NaiveDateTime) -> NaiveDateTime {
    now - Duration::days(7)
}
