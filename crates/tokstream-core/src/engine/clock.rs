//! Playback time bookkeeping shared by the sequencer and the dispatcher.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// A consistent view of the playback clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClockSnapshot {
    /// When the first frame of the session reached the caller
    pub first_frame_at: Option<Instant>,
    /// Total play time of all frames delivered so far
    pub generated: Duration,
}

impl ClockSnapshot {
    /// Audio delivered but not yet played at `now`, assuming playback began
    /// with the first frame and runs in real time.
    ///
    /// `None` before the first frame. An underrun reads as zero.
    pub fn unplayed(&self, now: Instant) -> Option<Duration> {
        let first = self.first_frame_at?;
        let played = now.saturating_duration_since(first);
        Some(self.generated.saturating_sub(played))
    }
}

/// Tracks generated audio against wall time.
///
/// Written only by the sequencer; the dispatcher reads snapshots, which keep
/// the timestamp and duration in step with each other.
#[derive(Debug, Default)]
pub struct PlaybackClock {
    state: Mutex<ClockSnapshot>,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for a delivered frame of play time `duration`.
    pub fn record_frame(&self, duration: Duration, now: Instant) {
        let mut state = self.state.lock();
        if state.first_frame_at.is_none() {
            state.first_frame_at = Some(now);
        }
        state.generated += duration;
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        *self.state.lock()
    }

    pub fn has_started(&self) -> bool {
        self.state.lock().first_frame_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unplayed_before_first_frame_is_unknown() {
        let clock = PlaybackClock::new();
        assert!(!clock.has_started());
        assert_eq!(clock.snapshot().unplayed(Instant::now()), None);
    }

    #[test]
    fn unplayed_drains_with_wall_time() {
        let clock = PlaybackClock::new();
        let start = Instant::now();
        clock.record_frame(Duration::from_secs(2), start);
        clock.record_frame(Duration::from_millis(500), start + Duration::from_millis(100));

        let snapshot = clock.snapshot();
        assert_eq!(snapshot.first_frame_at, Some(start));
        assert_eq!(snapshot.generated, Duration::from_millis(2500));
        assert_eq!(
            snapshot.unplayed(start + Duration::from_secs(1)),
            Some(Duration::from_millis(1500))
        );
        // Underrun saturates at zero.
        assert_eq!(
            snapshot.unplayed(start + Duration::from_secs(10)),
            Some(Duration::ZERO)
        );
    }
}
