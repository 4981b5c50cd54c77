//! Timeout durations and their compact text form ("42", "42s", "42 ms", "42MS")

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::FixSuggestion;

/// Amount followed by an optional unit suffix, separated by optional whitespace
static DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]+)\s*([^\s0-9]*)$").expect("valid regex"));

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DurationParseError {
    #[error("[CAD-010] Malformed duration '{input}'")]
    Malformed { input: String },

    #[error("[CAD-011] Duration '{input}' has a leading zero")]
    LeadingZero { input: String },

    #[error("[CAD-012] Duration amount in '{input}' is not a valid integer")]
    InvalidAmount { input: String },

    #[error("[CAD-013] Unknown time unit '{unit}' in duration '{input}'")]
    UnknownUnit { input: String, unit: String },

    #[error("[CAD-014] Duration must be positive, got '{input}'")]
    NotPositive { input: String },
}

impl DurationParseError {
    pub fn code(&self) -> &'static str {
        match self {
            DurationParseError::Malformed { .. } => "CAD-010",
            DurationParseError::LeadingZero { .. } => "CAD-011",
            DurationParseError::InvalidAmount { .. } => "CAD-012",
            DurationParseError::UnknownUnit { .. } => "CAD-013",
            DurationParseError::NotPositive { .. } => "CAD-014",
        }
    }
}

impl FixSuggestion for DurationParseError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            DurationParseError::Malformed { .. } => {
                Some("Write a positive integer followed by an optional unit, e.g. '42 ms'")
            }
            DurationParseError::LeadingZero { .. } => Some("Remove the leading zero"),
            DurationParseError::InvalidAmount { .. } => Some("Use a smaller amount or a larger unit"),
            DurationParseError::UnknownUnit { .. } => {
                Some("Use one of: ns, μs, ms, s, m, h, d (or their long forms)")
            }
            DurationParseError::NotPositive { .. } => Some("Use an amount of at least 1"),
        }
    }
}

/// Time units, ordered from finest to coarsest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub const ALL: [TimeUnit; 7] = [
        TimeUnit::Nanoseconds,
        TimeUnit::Microseconds,
        TimeUnit::Milliseconds,
        TimeUnit::Seconds,
        TimeUnit::Minutes,
        TimeUnit::Hours,
        TimeUnit::Days,
    ];

    /// Match a unit token, ignoring case. Micro accepts both the Greek small
    /// mu (U+03BC) and the micro sign (U+00B5).
    pub fn from_token(token: &str) -> Option<Self> {
        let unit = match token.to_lowercase().as_str() {
            "ns" | "nanosecond" | "nanoseconds" => TimeUnit::Nanoseconds,
            "μs" | "µs" | "us" | "microsecond" | "microseconds" => TimeUnit::Microseconds,
            "ms" | "millisecond" | "milliseconds" => TimeUnit::Milliseconds,
            "s" | "second" | "seconds" => TimeUnit::Seconds,
            "m" | "minute" | "minutes" => TimeUnit::Minutes,
            "h" | "hour" | "hours" => TimeUnit::Hours,
            "d" | "day" | "days" => TimeUnit::Days,
            _ => return None,
        };
        Some(unit)
    }

    pub fn singular(self) -> &'static str {
        match self {
            TimeUnit::Nanoseconds => "nanosecond",
            TimeUnit::Microseconds => "microsecond",
            TimeUnit::Milliseconds => "millisecond",
            TimeUnit::Seconds => "second",
            TimeUnit::Minutes => "minute",
            TimeUnit::Hours => "hour",
            TimeUnit::Days => "day",
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            TimeUnit::Nanoseconds => "nanoseconds",
            TimeUnit::Microseconds => "microseconds",
            TimeUnit::Milliseconds => "milliseconds",
            TimeUnit::Seconds => "seconds",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
        }
    }

    fn nanos(self) -> u128 {
        match self {
            TimeUnit::Nanoseconds => 1,
            TimeUnit::Microseconds => 1_000,
            TimeUnit::Milliseconds => 1_000_000,
            TimeUnit::Seconds => 1_000_000_000,
            TimeUnit::Minutes => 60 * 1_000_000_000,
            TimeUnit::Hours => 3_600 * 1_000_000_000,
            TimeUnit::Days => 86_400 * 1_000_000_000,
        }
    }
}

/// Positive amount of a time unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeoutDuration {
    amount: u64,
    unit: TimeUnit,
}

impl TimeoutDuration {
    pub fn new(amount: u64, unit: TimeUnit) -> Result<Self, DurationParseError> {
        if amount == 0 {
            return Err(DurationParseError::NotPositive {
                input: format!("{amount} {}", unit.plural()),
            });
        }
        Ok(Self { amount, unit })
    }

    /// Parse the compact text form. A missing unit means seconds.
    pub fn parse(text: &str) -> Result<Self, DurationParseError> {
        let input = text.trim();
        let caps = DURATION_RE
            .captures(input)
            .ok_or_else(|| DurationParseError::Malformed {
                input: text.to_string(),
            })?;

        let digits = &caps[1];
        if digits.len() > 1 && digits.starts_with('0') {
            return Err(DurationParseError::LeadingZero {
                input: text.to_string(),
            });
        }
        let amount: u64 = digits
            .parse()
            .map_err(|_| DurationParseError::InvalidAmount {
                input: text.to_string(),
            })?;

        let suffix = &caps[2];
        let unit = if suffix.is_empty() {
            TimeUnit::Seconds
        } else {
            TimeUnit::from_token(suffix).ok_or_else(|| DurationParseError::UnknownUnit {
                input: text.to_string(),
                unit: suffix.to_string(),
            })?
        };

        if amount == 0 {
            return Err(DurationParseError::NotPositive {
                input: text.to_string(),
            });
        }
        Ok(Self { amount, unit })
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Saturates at `Duration::MAX`
    pub fn to_std(&self) -> Duration {
        let nanos = u128::from(self.amount).saturating_mul(self.unit.nanos());
        let secs = nanos / 1_000_000_000;
        match u64::try_from(secs) {
            Ok(secs) => Duration::new(secs, (nanos % 1_000_000_000) as u32),
            Err(_) => Duration::MAX,
        }
    }
}

impl fmt::Display for TimeoutDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = if self.amount == 1 {
            self.unit.singular()
        } else {
            self.unit.plural()
        };
        write!(f, "{} {}", self.amount, unit)
    }
}

impl FromStr for TimeoutDuration {
    type Err = DurationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TimeoutDuration {
    type Error = DurationParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TimeoutDuration> for String {
    fn from(value: TimeoutDuration) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(amount: u64, unit: TimeUnit) -> TimeoutDuration {
        TimeoutDuration::new(amount, unit).unwrap()
    }

    #[test]
    fn parses_compact_forms() {
        assert_eq!(TimeoutDuration::parse("42").unwrap(), d(42, TimeUnit::Seconds));
        assert_eq!(TimeoutDuration::parse("42s").unwrap(), d(42, TimeUnit::Seconds));
        assert_eq!(TimeoutDuration::parse("42 ms").unwrap(), d(42, TimeUnit::Milliseconds));
        assert_eq!(TimeoutDuration::parse("42MS").unwrap(), d(42, TimeUnit::Milliseconds));
        assert_eq!(TimeoutDuration::parse("  7 Days ").unwrap(), d(7, TimeUnit::Days));
        assert_eq!(TimeoutDuration::parse("1 minute").unwrap(), d(1, TimeUnit::Minutes));
        assert_eq!(TimeoutDuration::parse("3ns").unwrap(), d(3, TimeUnit::Nanoseconds));
    }

    #[test]
    fn accepts_micro_sign_variants() {
        let expected = d(5, TimeUnit::Microseconds);
        assert_eq!(TimeoutDuration::parse("5μs").unwrap(), expected);
        assert_eq!(TimeoutDuration::parse("5µs").unwrap(), expected);
        assert_eq!(TimeoutDuration::parse("5 US").unwrap(), expected);
        assert_eq!(TimeoutDuration::parse("5 ΜS").unwrap(), expected);
    }

    #[test]
    fn rejects_leading_zero() {
        for input in ["01", "00", "007 ms", "0042s"] {
            let err = TimeoutDuration::parse(input).unwrap_err();
            assert!(
                matches!(err, DurationParseError::LeadingZero { .. }),
                "{input}: {err}"
            );
        }
    }

    #[test]
    fn rejects_non_positive_and_malformed() {
        assert!(matches!(
            TimeoutDuration::parse("0").unwrap_err(),
            DurationParseError::NotPositive { .. }
        ));
        for input in ["", "-5", "1.5s", "ms", "5 5", "5 m s"] {
            assert!(
                matches!(
                    TimeoutDuration::parse(input).unwrap_err(),
                    DurationParseError::Malformed { .. }
                ),
                "{input}"
            );
        }
        assert!(matches!(
            TimeoutDuration::parse("99999999999999999999999").unwrap_err(),
            DurationParseError::InvalidAmount { .. }
        ));
        assert_eq!(TimeoutDuration::parse("5 fortnights").unwrap_err().code(), "CAD-013");
        assert!(TimeoutDuration::new(0, TimeUnit::Hours).is_err());
    }

    #[test]
    fn renders_singular_and_plural() {
        assert_eq!(d(1, TimeUnit::Seconds).to_string(), "1 second");
        assert_eq!(d(42, TimeUnit::Milliseconds).to_string(), "42 milliseconds");
        assert_eq!(d(2, TimeUnit::Days).to_string(), "2 days");
    }

    #[test]
    fn converts_to_std_duration() {
        assert_eq!(d(1500, TimeUnit::Milliseconds).to_std(), Duration::from_millis(1500));
        assert_eq!(d(2, TimeUnit::Hours).to_std(), Duration::from_secs(7200));
        assert_eq!(d(u64::MAX, TimeUnit::Days).to_std(), Duration::MAX);
    }

    #[test]
    fn serde_uses_text_form() {
        let json = serde_json::to_string(&d(3, TimeUnit::Minutes)).unwrap();
        assert_eq!(json, "\"3 minutes\"");
        let back: TimeoutDuration = serde_json::from_str("\"250ms\"").unwrap();
        assert_eq!(back, d(250, TimeUnit::Milliseconds));
        assert!(serde_json::from_str::<TimeoutDuration>("\"01s\"").is_err());
    }

    proptest! {
        #[test]
        fn parse_inverts_render(amount in 1u64..=u64::MAX, index in 0usize..7) {
            let duration = d(amount, TimeUnit::ALL[index]);
            prop_assert_eq!(TimeoutDuration::parse(&duration.to_string()).unwrap(), duration);
        }

        #[test]
        fn leading_zero_always_rejected(rest in "[0-9]{1,6}", unit in "(|s|ms|h)") {
            let input = format!("0{rest}{unit}");
            prop_assert!(
                matches!(
                    TimeoutDuration::parse(&input),
                    Err(DurationParseError::LeadingZero { .. })
                ),
                "input was {}",
                input
            );
        }
    }
}
