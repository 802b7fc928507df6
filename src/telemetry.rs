//! Extraction of progress fields from free-form engine log lines.
//!
//! A status line from the engine looks like
//! `frame=  120 fps= 25.0 q=28.0 size=    1024kB time=00:00:05.00 bitrate=1000.0kbits/s speed=1.5x`.
//! Each field is matched independently, so partial lines and unrelated text are fine.

use std::{sync::LazyLock, time::Duration};

use regex::Regex;

/// A single field that may appear in a telemetry line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryField {
    Frame,
    Fps,
    Q,
    Size,
    Time,
    Bitrate,
    Speed,
}

impl TelemetryField {
    pub const ALL: [TelemetryField; 7] = [
        TelemetryField::Frame,
        TelemetryField::Fps,
        TelemetryField::Q,
        TelemetryField::Size,
        TelemetryField::Time,
        TelemetryField::Bitrate,
        TelemetryField::Speed,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TelemetryField::Frame => "frame",
            TelemetryField::Fps => "fps",
            TelemetryField::Q => "q",
            TelemetryField::Size => "size",
            TelemetryField::Time => "time",
            TelemetryField::Bitrate => "bitrate",
            TelemetryField::Speed => "speed",
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    fn pattern(self) -> &'static Regex {
        &PATTERNS[self.index()]
    }
}

static PATTERNS: LazyLock<[Regex; 7]> = LazyLock::new(|| {
    // `time=` is the only key whose value is never padded by the engine.
    [
        r"frame=\s*(\d+)",
        r"fps=\s*([0-9.]+)",
        r"q=\s*([0-9.]+)",
        r"size=\s*([0-9]+kB)",
        r"time=([0-9:.]+)",
        r"bitrate=\s*([0-9.]+kbits/s)",
        r"speed=\s*([0-9.]+x)",
    ]
    .map(|p| Regex::new(p).expect("telemetry pattern is valid"))
});

/// Raw field text matched in one log line. Absent fields are `None`, never empty or zero.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TelemetryFields {
    raw: [Option<String>; 7],
}

impl TelemetryFields {
    pub fn get(&self, field: TelemetryField) -> Option<&str> {
        self.raw[field.index()].as_deref()
    }

    pub fn contains(&self, field: TelemetryField) -> bool {
        self.raw[field.index()].is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.iter().all(Option::is_none)
    }

    pub fn len(&self) -> usize {
        self.raw.iter().filter(|v| v.is_some()).count()
    }

    /// Matched fields in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (TelemetryField, &str)> + '_ {
        TelemetryField::ALL
            .into_iter()
            .filter_map(|f| self.get(f).map(|v| (f, v)))
    }

    pub fn frame(&self) -> Option<u64> {
        self.get(TelemetryField::Frame)?.parse().ok()
    }

    pub fn fps(&self) -> Option<f64> {
        parse_finite(self.get(TelemetryField::Fps)?)
    }

    pub fn quality(&self) -> Option<f64> {
        parse_finite(self.get(TelemetryField::Q)?)
    }

    pub fn size_kb(&self) -> Option<u64> {
        self.get(TelemetryField::Size)?
            .strip_suffix("kB")?
            .parse()
            .ok()
    }

    pub fn time(&self) -> Option<Duration> {
        parse_timestamp(self.get(TelemetryField::Time)?)
    }

    pub fn bitrate_kbps(&self) -> Option<f64> {
        parse_finite(self.get(TelemetryField::Bitrate)?.strip_suffix("kbits/s")?)
    }

    pub fn speed(&self) -> Option<f64> {
        parse_finite(self.get(TelemetryField::Speed)?.strip_suffix('x')?)
    }
}

impl serde::Serialize for TelemetryFields {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap as _;

        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (field, value) in self.iter() {
            map.serialize_entry(field.name(), value)?;
        }
        map.end()
    }
}

/// Extract every recognised field from `line`.
pub fn parse_line(line: &str) -> TelemetryFields {
    let mut out = TelemetryFields::default();
    for field in TelemetryField::ALL {
        if let Some(m) = field.pattern().captures(line).and_then(|c| c.get(1)) {
            out.raw[field.index()] = Some(m.as_str().to_owned());
        }
    }
    out
}

/// Parse `HH:MM:SS.frac` (hours may exceed two digits).
pub fn parse_timestamp(s: &str) -> Option<Duration> {
    let mut parts = s.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return None;
    }
    let whole = hours.checked_mul(3600)?.checked_add(minutes * 60)?;
    Duration::from_secs(whole).checked_add(Duration::from_secs_f64(seconds))
}

fn parse_finite(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = "frame=120 fps=25.0 q=28.0 size=1024kB time=00:00:05.00 bitrate=1000.0kbits/s speed=1.5x";

    #[test]
    fn full_status_line_yields_all_raw_fields() {
        let f = parse_line(FULL);
        assert_eq!(f.len(), 7);
        assert_eq!(f.get(TelemetryField::Frame), Some("120"));
        assert_eq!(f.get(TelemetryField::Fps), Some("25.0"));
        assert_eq!(f.get(TelemetryField::Q), Some("28.0"));
        assert_eq!(f.get(TelemetryField::Size), Some("1024kB"));
        assert_eq!(f.get(TelemetryField::Time), Some("00:00:05.00"));
        assert_eq!(f.get(TelemetryField::Bitrate), Some("1000.0kbits/s"));
        assert_eq!(f.get(TelemetryField::Speed), Some("1.5x"));
    }

    #[test]
    fn unrelated_text_is_empty() {
        let f = parse_line("random unrelated text");
        assert!(f.is_empty());
        assert_eq!(f.iter().count(), 0);
        assert_eq!(f.fps(), None);
    }

    #[test]
    fn padded_values_match_like_real_engine_output() {
        let f = parse_line("frame=   42 fps= 12.5 q=-1.0 size=     256kB time=00:01:02.50 bitrate= 800.1kbits/s speed=0.98x");
        assert_eq!(f.frame(), Some(42));
        assert_eq!(f.fps(), Some(12.5));
        // Negative quality is not matched; the field stays absent.
        assert_eq!(f.get(TelemetryField::Q), None);
        assert_eq!(f.size_kb(), Some(256));
        assert_eq!(f.time(), Some(Duration::from_millis(62_500)));
        assert_eq!(f.bitrate_kbps(), Some(800.1));
        assert_eq!(f.speed(), Some(0.98));
    }

    #[test]
    fn partial_and_malformed_lines_never_coerce_to_zero() {
        let f = parse_line("fps=1.2.3 time=N/A bitrate=N/A speed=N/A");
        assert_eq!(f.get(TelemetryField::Fps), Some("1.2.3"));
        assert_eq!(f.fps(), None);
        assert!(!f.contains(TelemetryField::Time));
        assert!(!f.contains(TelemetryField::Bitrate));
        assert!(!f.contains(TelemetryField::Speed));
        assert!(!f.contains(TelemetryField::Frame));

        assert!(parse_line("").is_empty());
        assert!(parse_line("frame=").is_empty());
    }

    #[test]
    fn fields_are_order_independent() {
        let f = parse_line("speed=2x fps=30");
        let got: Vec<_> = f.iter().collect();
        assert_eq!(
            got,
            vec![(TelemetryField::Fps, "30"), (TelemetryField::Speed, "2x")]
        );
    }

    #[test]
    fn timestamp_parsing() {
        assert_eq!(parse_timestamp("00:00:05.00"), Some(Duration::from_secs(5)));
        assert_eq!(
            parse_timestamp("01:02:03.5"),
            Some(Duration::from_millis(3_723_500))
        );
        assert_eq!(parse_timestamp("5.0"), None);
        assert_eq!(parse_timestamp("00:61:00.00"), None);
        assert_eq!(parse_timestamp("00:00:00:00"), None);
    }

    #[test]
    fn oversized_hours_are_rejected() {
        assert_eq!(parse_timestamp("5124095576030431:00:59.9"), None);
        assert_eq!(parse_timestamp("18446744073709551615:00:00.0"), None);
        assert_eq!(parse_line("time=5124095576030431:00:59.9").time(), None);
        assert_eq!(
            parse_line("time=5124095576030431:00:59.9").get(TelemetryField::Time),
            Some("5124095576030431:00:59.9")
        );
    }

    #[test]
    fn serializes_as_field_map() {
        let json = serde_json::to_value(parse_line("frame=1 fps=2.5")).unwrap();
        assert_eq!(json, serde_json::json!({"frame": "1", "fps": "2.5"}));
    }
}
