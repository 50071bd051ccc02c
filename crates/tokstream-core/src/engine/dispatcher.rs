//! Batch scheduler deciding when the pending token buffer becomes a batch.
//!
//! The dispatcher owns the pending tokens and the overlap tail exclusively.
//! It reads the playback clock to estimate how much audio is still queued
//! for playback and cuts a batch when one of the flush rules holds:
//!
//! 1. cold start: nothing has been heard yet and enough tokens are pending,
//! 2. low buffer: playback is about to run dry,
//! 3. forced: too long has passed since the last cut.
//!
//! No rule fires while the number of in-flight batches is at the pipeline
//! depth. The decision is a pure function of its inputs so it can be driven
//! with simulated time.

use std::fmt;
use std::mem;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

use super::batch::TokenBatch;
use super::clock::PlaybackClock;
use crate::config::BatchPolicy;
use crate::lexer::Token;

/// Which rule caused a batch to be cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    ColdStart,
    LowBuffer,
    Forced,
    EndOfStream,
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FlushReason::ColdStart => "cold_start",
            FlushReason::LowBuffer => "low_buffer",
            FlushReason::Forced => "forced",
            FlushReason::EndOfStream => "end_of_stream",
        })
    }
}

pub struct Dispatcher {
    policy: BatchPolicy,
    clock: Arc<PlaybackClock>,
    pending: Vec<Token>,
    tail: Vec<Token>,
    last_flush: Instant,
    next_seq: u64,
}

impl Dispatcher {
    /// `now` starts the forced-flush timer.
    pub fn new(policy: BatchPolicy, clock: Arc<PlaybackClock>, now: Instant) -> Self {
        Self {
            policy,
            clock,
            pending: Vec::new(),
            tail: Vec::new(),
            last_flush: now,
            next_seq: 0,
        }
    }

    /// Append lexed tokens to the pending buffer.
    pub fn push(&mut self, tokens: impl IntoIterator<Item = Token>) -> usize {
        let before = self.pending.len();
        self.pending.extend(tokens);
        self.pending.len() - before
    }

    pub fn pending(&self) -> &[Token] {
        &self.pending
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn tail(&self) -> &[Token] {
        &self.tail
    }

    pub fn batches_cut(&self) -> u64 {
        self.next_seq
    }

    /// Evaluate the flush rules without changing any state.
    pub fn evaluate(&self, in_flight: usize, now: Instant) -> Option<FlushReason> {
        if self.pending.is_empty() || in_flight >= self.policy.pipeline_depth {
            return None;
        }

        match self.clock.snapshot().unplayed(now) {
            None if self.pending.len() >= self.policy.cold_start_token_threshold => {
                return Some(FlushReason::ColdStart);
            }
            Some(unplayed) if unplayed <= self.policy.low_buffer => {
                return Some(FlushReason::LowBuffer);
            }
            _ => {}
        }

        if now.saturating_duration_since(self.last_flush) > self.policy.forced_flush_interval {
            return Some(FlushReason::Forced);
        }

        None
    }

    /// Cut a batch if the flush rules allow it.
    pub fn poll(&mut self, in_flight: usize, now: Instant) -> Option<(TokenBatch, FlushReason)> {
        let reason = self.evaluate(in_flight, now)?;
        Some((self.cut(now, reason), reason))
    }

    /// Flush whatever is pending at end of input, regardless of the rules.
    pub fn finish(&mut self, now: Instant) -> Option<TokenBatch> {
        if self.pending.is_empty() {
            return None;
        }
        Some(self.cut(now, FlushReason::EndOfStream))
    }

    fn cut(&mut self, now: Instant, reason: FlushReason) -> TokenBatch {
        let overlap = self.tail.len();
        let mut tokens = mem::take(&mut self.tail);
        tokens.append(&mut self.pending);

        let keep = self.policy.prefix_overlap_tokens;
        if tokens.len() > keep {
            self.tail = tokens[tokens.len() - keep..].to_vec();
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.last_flush = now;

        debug!(
            batch = seq,
            tokens = tokens.len(),
            overlap,
            reason = %reason,
            "Cut batch"
        );
        TokenBatch::new(seq, tokens, overlap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn policy() -> BatchPolicy {
        BatchPolicy::default()
    }

    fn dispatcher(policy: BatchPolicy) -> (Dispatcher, Arc<PlaybackClock>, Instant) {
        let clock = Arc::new(PlaybackClock::new());
        let start = Instant::now();
        (Dispatcher::new(policy, clock.clone(), start), clock, start)
    }

    #[test]
    fn cold_start_waits_for_threshold() {
        let (mut d, _, start) = dispatcher(policy());

        for i in 1..50 {
            d.push([i]);
            assert!(d.poll(0, start).is_none(), "cut early at {i} tokens");
        }
        d.push([50]);
        let (batch, reason) = d.poll(0, start).unwrap();
        assert_eq!(reason, FlushReason::ColdStart);
        assert_eq!(batch.len(), 50);
        assert_eq!(batch.overlap(), 0);
        assert!(!d.has_pending());
    }

    #[test]
    fn in_flight_batches_gate_every_rule() {
        let (mut d, _, start) = dispatcher(policy());
        d.push(1..=60);

        assert!(d.poll(1, start).is_none());
        assert!(d.poll(1, start + Duration::from_secs(60)).is_none());
        assert_eq!(d.pending().len(), 60);
        assert!(d.poll(0, start).is_some());
    }

    #[test]
    fn pipeline_depth_allows_more_in_flight() {
        let mut p = policy();
        p.pipeline_depth = 3;
        let (mut d, _, start) = dispatcher(p);
        d.push(1..=50);
        assert!(d.poll(2, start).is_some());
        d.push(1..=50);
        assert!(d.poll(3, start).is_none());
    }

    #[test]
    fn tail_is_carried_as_overlap() {
        let (mut d, _, start) = dispatcher(policy());
        d.push(1..=50);
        let (first, _) = d.poll(0, start).unwrap();
        assert_eq!(d.tail(), &[46, 47, 48, 49, 50]);

        d.push([51, 52]);
        let second = d.finish(start).unwrap();
        assert_eq!(second.seq(), first.seq() + 1);
        assert_eq!(second.overlap(), 5);
        assert_eq!(second.tokens(), &[46, 47, 48, 49, 50, 51, 52]);
        assert_eq!(second.new_tokens(), &[51, 52]);
        assert_eq!(d.tail(), &[48, 49, 50, 51, 52]);
    }

    #[test]
    fn short_batches_leave_no_tail() {
        let mut p = policy();
        p.cold_start_token_threshold = 3;
        let (mut d, _, start) = dispatcher(p);
        d.push([1, 2, 3]);
        d.poll(0, start).unwrap();
        assert!(d.tail().is_empty());

        // Exactly the overlap size still leaves no tail.
        d.push([4, 5, 6, 7, 8]);
        let batch = d.finish(start).unwrap();
        assert_eq!(batch.overlap(), 0);
        assert!(d.tail().is_empty());
    }

    #[test]
    fn low_buffer_retriggers_once_playback_catches_up() {
        let (mut d, clock, start) = dispatcher(policy());
        d.push(1..=50);
        d.poll(0, start).unwrap();

        // Two seconds of audio reach the caller one second in.
        let first_frame = start + Duration::from_secs(1);
        clock.record_frame(Duration::from_secs(2), first_frame);
        d.push([99]);

        // 1.0s unplayed, then 0.6s: still above the 0.5s threshold.
        assert!(d.poll(0, first_frame + Duration::from_secs(1)).is_none());
        assert!(d.poll(0, first_frame + Duration::from_millis(1400)).is_none());

        let (batch, reason) = d.poll(0, first_frame + Duration::from_millis(1500)).unwrap();
        assert_eq!(reason, FlushReason::LowBuffer);
        assert_eq!(batch.new_tokens(), &[99]);
    }

    #[test]
    fn forced_flush_after_interval() {
        let (mut d, _, start) = dispatcher(policy());
        d.push([1, 2, 3]);

        assert!(d.poll(0, start + Duration::from_secs(5)).is_none());
        let (batch, reason) = d.poll(0, start + Duration::from_millis(5001)).unwrap();
        assert_eq!(reason, FlushReason::Forced);
        assert_eq!(batch.tokens(), &[1, 2, 3]);

        // The timer restarts at the cut.
        d.push([4]);
        let cut_at = start + Duration::from_millis(5001);
        assert!(d.poll(0, cut_at + Duration::from_secs(5)).is_none());
        assert!(d.poll(0, cut_at + Duration::from_secs(6)).is_some());
    }

    #[test]
    fn nothing_pending_never_cuts() {
        let (mut d, clock, start) = dispatcher(policy());
        clock.record_frame(Duration::ZERO, start);
        assert!(d.poll(0, start + Duration::from_secs(100)).is_none());
        assert!(d.finish(start).is_none());
        assert_eq!(d.batches_cut(), 0);
    }
}
