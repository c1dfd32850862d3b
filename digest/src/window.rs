//! Digest window
//!
//! A half-open interval `[start, end)`: a yield created exactly at `end`
//! belongs to the next digest.

use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Time window a digest covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestWindow {
    /// Inclusive start
    pub start: DateTime<Utc>,
    /// Exclusive end
    pub end: DateTime<Utc>,
}

impl DigestWindow {
    /// Create a window, rejecting empty or inverted bounds
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start >= end {
            return Err(Error::Window(format!(
                "start {} is not before end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Window of `days` days ending at `end`
    pub fn ending(end: DateTime<Utc>, days: i64) -> Result<Self> {
        let start = Duration::try_days(days)
            .and_then(|period| end.checked_sub_signed(period))
            .ok_or_else(|| Error::Window(format!("{} days before {} is out of range", days, end)))?;
        Self::new(start, end)
    }

    /// Whether a timestamp falls inside the window
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_open() {
        let end = Utc::now();
        let window = DigestWindow::ending(end, 7).unwrap();
        assert!(window.contains(window.start));
        assert!(window.contains(end - Duration::seconds(1)));
        assert!(!window.contains(end));
        assert!(!window.contains(window.start - Duration::seconds(1)));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let now = Utc::now();
        assert!(matches!(DigestWindow::new(now, now), Err(Error::Window(_))));
        assert!(DigestWindow::ending(now, -1).is_err());
    }

    #[test]
    fn test_oversized_period_rejected() {
        let now = Utc::now();
        assert!(matches!(
            DigestWindow::ending(now, i64::MAX),
            Err(Error::Window(_))
        ));
        assert!(matches!(
            DigestWindow::ending(now, 200_000_000),
            Err(Error::Window(_))
        ));
    }
}
