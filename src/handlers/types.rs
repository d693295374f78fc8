// src/handlers/types.rs

use serde::Deserialize;
use std::time::Duration;

use crate::loader::Personalization;

/// Query parameters of `/v1/play`. Values that do not parse are ignored and
/// the default is used instead.
#[derive(Deserialize, Debug, Default)]
pub struct PlayParams {
    /// Latency in milliseconds
    pub latency: Option<String>,
    pub positionmin: Option<String>,
    pub positionmax: Option<String>,
    pub speedmin: Option<String>,
    pub speedmax: Option<String>,
}

impl PlayParams {
    pub fn personalization(&self) -> Personalization {
        fn parse(value: &Option<String>) -> Option<i32> {
            value.as_deref().and_then(|v| v.trim().parse().ok())
        }

        let mut pers = Personalization::default();
        if let Some(latency) = parse(&self.latency) {
            pers.latency = Duration::from_millis(latency.max(0) as u64);
        }
        if let Some(min) = parse(&self.positionmin) {
            pers.position_min = min;
        }
        if let Some(max) = parse(&self.positionmax) {
            pers.position_max = max;
        }
        if let Some(min) = parse(&self.speedmin) {
            pers.speed_min = min;
        }
        if let Some(max) = parse(&self.speedmax) {
            pers.speed_max = max;
        }
        pers
    }
}

/// Query parameters of `/v1/skip`.
#[derive(Deserialize, Debug)]
pub struct SkipParams {
    /// Timecode to jump to, see [`parse_timecode`].
    pub p: String,
}

/// Parses a timecode like `150ms`, `1.5s`, `2m` or `1h`. A bare number is
/// taken as milliseconds.
pub fn parse_timecode(input: &str) -> Option<Duration> {
    let input = input.trim();
    let (number, seconds_per_unit) = if let Some(n) = input.strip_suffix("ms") {
        (n, 0.001)
    } else if let Some(n) = input.strip_suffix('s') {
        (n, 1.0)
    } else if let Some(n) = input.strip_suffix('m') {
        (n, 60.0)
    } else if let Some(n) = input.strip_suffix('h') {
        (n, 3600.0)
    } else {
        (input, 0.001)
    };

    let value: f64 = number.trim().parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(value * seconds_per_unit).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timecodes() {
        assert_eq!(parse_timecode("150ms"), Some(Duration::from_millis(150)));
        assert_eq!(parse_timecode("1.5s"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_timecode("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_timecode("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_timecode("2500"), Some(Duration::from_millis(2500)));
        assert_eq!(parse_timecode(" 0s "), Some(Duration::ZERO));
    }

    #[test]
    fn bad_timecodes() {
        assert_eq!(parse_timecode(""), None);
        assert_eq!(parse_timecode("soon"), None);
        assert_eq!(parse_timecode("-1s"), None);
        assert_eq!(parse_timecode("1.5x"), None);
        assert_eq!(parse_timecode("NaNs"), None);
    }

    #[test]
    fn play_params_override_defaults() {
        let params = PlayParams {
            latency: Some("120".to_string()),
            positionmin: Some("10".to_string()),
            speedmax: Some("fast".to_string()),
            ..Default::default()
        };
        let pers = params.personalization();
        assert_eq!(pers.latency, Duration::from_millis(120));
        assert_eq!(pers.position_min, 10);
        assert_eq!(pers.position_max, 95);
        assert_eq!(pers.speed_min, 20);
        assert_eq!(pers.speed_max, 80);
    }
}
