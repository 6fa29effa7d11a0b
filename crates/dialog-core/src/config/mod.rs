//! Protocol timer configuration
//!
//! RFC 3261 §17 base values shared by the dialog and session layers. Durations
//! serialize as integer milliseconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Standard SIP timer values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerSettings {
    /// RTT estimate; base of every retransmission interval
    #[serde(rename = "t1_ms", with = "duration_ms")]
    pub t1: Duration,

    /// Maximum retransmission interval
    #[serde(rename = "t2_ms", with = "duration_ms")]
    pub t2: Duration,

    /// Maximum time a message stays in the network
    #[serde(rename = "t4_ms", with = "duration_ms")]
    pub t4: Duration,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            t1: Duration::from_millis(500),
            t2: Duration::from_secs(4),
            t4: Duration::from_secs(5),
        }
    }
}

impl TimerSettings {
    pub fn with_t1(mut self, t1: Duration) -> Self {
        self.t1 = t1;
        self
    }

    pub fn with_t2(mut self, t2: Duration) -> Self {
        self.t2 = t2;
        self
    }

    pub fn with_t4(mut self, t4: Duration) -> Self {
        self.t4 = t4;
        self
    }

    /// Timer H: how long a UAS waits for the ACK of its final response
    pub fn timer_h(&self) -> Duration {
        self.t1.saturating_mul(64)
    }

    /// Intervals at which a 2xx is retransmitted while the ACK is outstanding.
    ///
    /// Starts at T1 and doubles; the schedule ends once the next interval
    /// would exceed T2 or no longer fit in a [`Duration`]. A zero T1 yields
    /// no retransmissions.
    pub fn retransmission_intervals(&self) -> impl Iterator<Item = Duration> {
        let t2 = self.t2;
        let first = Some(self.t1).filter(|t1| !t1.is_zero());
        std::iter::successors(first, |prev| prev.checked_mul(2))
            .take_while(move |interval| *interval <= t2)
    }
}

/// Serde adapter storing a [`Duration`] as whole milliseconds
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc3261_defaults() {
        let settings = TimerSettings::default();
        assert_eq!(settings.t1, Duration::from_millis(500));
        assert_eq!(settings.timer_h(), Duration::from_secs(32));
    }

    #[test]
    fn test_retransmission_schedule_stops_at_t2() {
        let intervals: Vec<_> = TimerSettings::default().retransmission_intervals().collect();
        assert_eq!(
            intervals,
            vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ]
        );
    }

    #[test]
    fn test_unbounded_t2_ends_the_schedule_on_overflow() {
        let settings = TimerSettings::default().with_t2(Duration::MAX);
        let intervals: Vec<_> = settings.retransmission_intervals().collect();
        assert_eq!(intervals.first(), Some(&Duration::from_millis(500)));
        assert!(intervals.windows(2).all(|pair| pair[1] == pair[0] * 2));
        assert!(intervals.last().unwrap().checked_mul(2).is_none());

        let settings = TimerSettings::default().with_t1(Duration::MAX).with_t2(Duration::MAX);
        assert_eq!(settings.retransmission_intervals().count(), 1);
        assert_eq!(settings.timer_h(), Duration::MAX);
    }

    #[test]
    fn test_zero_t1_has_no_schedule() {
        let settings = TimerSettings::default().with_t1(Duration::ZERO);
        assert_eq!(settings.retransmission_intervals().count(), 0);
    }
}
