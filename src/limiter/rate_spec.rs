//! Rate specifications (`"10/1s"`) keyed by root.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::filter::WILDCARD;

/// Default politeness for roots without an explicit spec: 10 requests per second.
pub const DEFAULT_RATE: &str = "10/1s";

/// Errors parsing a rate specification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateSpecError {
    /// The spec is not of the form `<rate>/<n><unit>`.
    #[error("invalid rate spec {spec:?}: expected <rate>/<n><s|m|h>, e.g. 10/1s")]
    Malformed {
        /// The rejected input.
        spec: String,
    },

    /// Rate or interval is zero.
    #[error("invalid rate spec {spec:?}: rate and interval must be positive")]
    NotPositive {
        /// The rejected input.
        spec: String,
    },
}

/// `rate` tokens replenished every `interval` for requests to `root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateSpec {
    root: String,
    rate: u32,
    interval: Duration,
}

impl RateSpec {
    /// Creates a spec for a root.
    ///
    /// # Errors
    ///
    /// Returns [`RateSpecError::NotPositive`] when `rate` or `interval` is zero.
    pub fn new(root: impl Into<String>, rate: u32, interval: Duration) -> Result<Self, RateSpecError> {
        let root = root.into();
        if rate == 0 || interval.is_zero() {
            return Err(RateSpecError::NotPositive {
                spec: format!("{rate}/{}ms", interval.as_millis()),
            });
        }
        Ok(Self {
            root,
            rate,
            interval,
        })
    }

    /// Parses `"<rate>/<n><unit>"` (unit `s`, `m` or `h`) for a root.
    ///
    /// # Errors
    ///
    /// Returns [`RateSpecError`] when the string is malformed or not positive.
    pub fn parse(root: impl Into<String>, spec: &str) -> Result<Self, RateSpecError> {
        let (rate, interval) = parse_rate(spec)?;
        Self::new(root, rate, interval).map_err(|_| RateSpecError::NotPositive {
            spec: spec.to_string(),
        })
    }

    /// The default wildcard spec (`*` at [`DEFAULT_RATE`]).
    #[must_use]
    pub fn default_wildcard() -> Self {
        Self {
            root: WILDCARD.to_string(),
            rate: 10,
            interval: Duration::from_secs(1),
        }
    }

    /// Root this spec applies to.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Tokens per interval (also the burst size).
    #[must_use]
    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Replenishment interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time to earn one token.
    #[must_use]
    pub fn token_period(&self) -> Duration {
        self.interval / self.rate
    }
}

impl fmt::Display for RateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}/{}ms", self.root, self.rate, self.interval.as_millis())
    }
}

/// Parses `ROOT=SPEC` as accepted on the command line.
impl FromStr for RateSpec {
    type Err = RateSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((root, spec)) = s.split_once('=') else {
            return Err(RateSpecError::Malformed { spec: s.to_string() });
        };
        let root = root.trim();
        if root.is_empty() {
            return Err(RateSpecError::Malformed { spec: s.to_string() });
        }
        Self::parse(root, spec.trim())
    }
}

fn parse_rate(spec: &str) -> Result<(u32, Duration), RateSpecError> {
    let malformed = || RateSpecError::Malformed {
        spec: spec.to_string(),
    };

    let (rate, interval) = spec.trim().split_once('/').ok_or_else(malformed)?;
    let rate: u32 = rate.trim().parse().map_err(|_| malformed())?;

    let interval = interval.trim();
    let unit = interval.chars().last().ok_or_else(malformed)?;
    let value: u64 = interval[..interval.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| malformed())?;

    let interval = match unit.to_ascii_lowercase() {
        's' => Duration::from_secs(value),
        'm' => Duration::from_secs(value.saturating_mul(60)),
        'h' => Duration::from_secs(value.saturating_mul(3600)),
        _ => return Err(malformed()),
    };

    Ok((rate, interval))
}
