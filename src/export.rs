//! Dataset exporter: accumulated samples → a portable CSV payload.
//!
//! Pure function, no I/O. Writing the bytes to disk (or handing them to a
//! browser download) is the presentation layer's job; the core has no
//! filename or storage policy.

use chrono::SecondsFormat;

use crate::types::Sample;

/// Serialize samples as `Timestamp,Value` rows.
///
/// Timestamps render as RFC 3339 / ISO-8601 UTC instants with enough
/// sub-second digits to round-trip exactly; values keep their natural
/// numeric representation. Any unit scaling is a display concern, never the
/// exporter's. Row order is sample arrival order and is never re-sorted.
pub fn export_csv(samples: &[Sample]) -> Vec<u8> {
    let mut out = String::with_capacity(16 + samples.len() * 40);
    out.push_str("Timestamp,Value\n");
    for sample in samples {
        out.push_str(&sample.captured_at.to_rfc3339_opts(SecondsFormat::AutoSi, true));
        out.push(',');
        out.push_str(&format_value(sample.value));
        out.push('\n');
    }
    out.into_bytes()
}

/// Shortest representation that parses back to the same `f64`.
fn format_value(value: f64) -> String {
    format!("{value}")
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use super::*;
    use crate::types::{Role, Sample};

    fn sample_at(ts: DateTime<Utc>, value: f64) -> Sample {
        Sample {
            captured_at: ts,
            role: Role::Signal,
            value,
        }
    }

    #[test]
    fn empty_export_is_header_only() {
        assert_eq!(export_csv(&[]), b"Timestamp,Value\n");
    }

    #[test]
    fn rows_follow_arrival_order() {
        let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let samples = vec![
            sample_at(t0, 13.0),
            sample_at(t0 + chrono::Duration::seconds(1), 14.0),
        ];
        let text = String::from_utf8(export_csv(&samples)).unwrap();
        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows[0], "Timestamp,Value");
        assert_eq!(rows[1], "2025-06-01T12:00:00Z,13");
        assert_eq!(rows[2], "2025-06-01T12:00:01Z,14");
    }

    #[test]
    fn round_trips_timestamp_value_pairs() {
        let base = Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 0).unwrap();
        let samples: Vec<Sample> = [
            (0i64, 500.25),
            (997, 1023.0),
            (2004, 0.0078125),
            (3001, 65535.0),
        ]
        .iter()
        .map(|&(ms, v)| sample_at(base + chrono::Duration::milliseconds(ms), v))
        .collect();

        let text = String::from_utf8(export_csv(&samples)).unwrap();
        let parsed: Vec<(DateTime<Utc>, f64)> = text
            .lines()
            .skip(1)
            .map(|row| {
                let (ts, value) = row.split_once(',').unwrap();
                (
                    DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc),
                    value.parse().unwrap(),
                )
            })
            .collect();

        assert_eq!(parsed.len(), samples.len());
        for (sample, (ts, value)) in samples.iter().zip(parsed) {
            assert_eq!(ts, sample.captured_at);
            assert_eq!(value, sample.value);
        }
    }
}
