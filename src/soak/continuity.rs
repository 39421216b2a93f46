//! Counter continuity checking on the host side
//!
//! Every delivered sample should be exactly one frame after the previous
//! one. A forward jump means samples were lost (dropped chunk), a backward
//! jump means samples were replayed (the reader snapped back to restore the
//! write-ahead distance), and a long run of zeros is silence (underrun or
//! startup prefill).

use super::counter::decode_counter;
use serde::{Deserialize, Serialize};

/// Zero run length treated as silence rather than a counter wrap
pub const DEFAULT_SILENCE_THRESHOLD: usize = 4;

/// Half the 16-bit counter range; larger forward jumps are read as replays
const HALF_RANGE: u32 = 32768;

/// What the analyzer has seen so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuityReport {
    pub samples_checked: u64,
    /// Breaks in the counter sequence of any kind
    pub discontinuities: u64,
    /// Frames skipped by forward jumps
    pub lost_samples: u64,
    /// Frames played twice by backward jumps
    pub repeated_samples: u64,
    pub silent_samples: u64,
    /// Separate stretches of silence (startup prefill included)
    pub silent_runs: u64,
}

impl ContinuityReport {
    /// True when the stream never broke outside of silence
    pub fn is_clean(&self) -> bool {
        self.discontinuities == 0
    }
}

/// Streaming counter continuity analyzer
#[derive(Debug)]
pub struct ContinuityAnalyzer {
    expected: Option<u32>,
    zero_run: usize,
    silence_threshold: usize,
    report: ContinuityReport,
}

impl Default for ContinuityAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_SILENCE_THRESHOLD)
    }
}

impl ContinuityAnalyzer {
    pub fn new(silence_threshold: usize) -> Self {
        Self {
            expected: None,
            zero_run: 0,
            silence_threshold: silence_threshold.max(2),
            report: ContinuityReport::default(),
        }
    }

    /// Check a block of counter samples
    pub fn feed(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.report.samples_checked += 1;
            let counter = decode_counter(sample);

            // Zeros are judged once the run ends: a lone zero is the wrap
            if counter == 0 {
                self.zero_run += 1;
                continue;
            }
            self.flush_zero_run();
            self.check(counter);
        }
    }

    /// Judge any trailing zero run and return the final report
    pub fn finish(&mut self) -> ContinuityReport {
        self.flush_zero_run();
        self.report
    }

    pub fn report(&self) -> ContinuityReport {
        self.report
    }

    fn flush_zero_run(&mut self) {
        let run = std::mem::take(&mut self.zero_run);
        if run == 0 {
            return;
        }

        if run >= self.silence_threshold {
            self.report.silent_samples += run as u64;
            self.report.silent_runs += 1;
            // Resync on the first sample after silence
            self.expected = None;
        } else {
            for _ in 0..run {
                self.check(0);
            }
        }
    }

    fn check(&mut self, counter: u32) {
        if let Some(expected) = self.expected {
            let diff = counter.wrapping_sub(expected) & 0xFFFF;
            if diff != 0 {
                self.report.discontinuities += 1;
                if diff < HALF_RANGE {
                    self.report.lost_samples += u64::from(diff);
                } else {
                    self.report.repeated_samples += u64::from(0x10000 - diff);
                }
                tracing::trace!(counter, expected, "Counter discontinuity");
            }
        }
        self.expected = Some((counter + 1) & 0xFFFF);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soak::counter::encode_counter;

    fn frames(range: impl Iterator<Item = u64>) -> Vec<f32> {
        range.map(encode_counter).collect()
    }

    #[test]
    fn test_continuous_stream_is_clean() {
        let mut analyzer = ContinuityAnalyzer::default();
        analyzer.feed(&frames(1..1000));
        analyzer.feed(&frames(1000..2000));
        let report = analyzer.finish();

        assert_eq!(report.samples_checked, 1999);
        assert!(report.is_clean());
        assert_eq!(report.silent_runs, 0);
    }

    #[test]
    fn test_counter_wrap_is_not_a_break() {
        let mut analyzer = ContinuityAnalyzer::default();
        analyzer.feed(&frames(65000..67000));
        assert!(analyzer.finish().is_clean());
    }

    #[test]
    fn test_forward_jump_counts_lost_samples() {
        let mut analyzer = ContinuityAnalyzer::default();
        analyzer.feed(&frames(1..100));
        analyzer.feed(&frames(150..200));
        let report = analyzer.finish();

        assert_eq!(report.discontinuities, 1);
        assert_eq!(report.lost_samples, 50);
        assert_eq!(report.repeated_samples, 0);
    }

    #[test]
    fn test_backward_jump_counts_repeats() {
        let mut analyzer = ContinuityAnalyzer::default();
        analyzer.feed(&frames(1..200));
        analyzer.feed(&frames(150..300));
        let report = analyzer.finish();

        assert_eq!(report.discontinuities, 1);
        assert_eq!(report.repeated_samples, 50);
        assert_eq!(report.lost_samples, 0);
    }

    #[test]
    fn test_silence_resyncs() {
        let mut analyzer = ContinuityAnalyzer::default();
        analyzer.feed(&[0.0; 100]);
        analyzer.feed(&frames(500..600));
        analyzer.feed(&[0.0; 10]);
        analyzer.feed(&frames(900..1000));
        let report = analyzer.finish();

        assert!(report.is_clean());
        assert_eq!(report.silent_runs, 2);
        assert_eq!(report.silent_samples, 110);
    }

    #[test]
    fn test_trailing_silence_counted_on_finish() {
        let mut analyzer = ContinuityAnalyzer::default();
        analyzer.feed(&frames(1..10));
        analyzer.feed(&[0.0; 20]);
        assert_eq!(analyzer.report().silent_runs, 0);

        let report = analyzer.finish();
        assert_eq!(report.silent_runs, 1);
        assert_eq!(report.silent_samples, 20);
    }

    #[test]
    fn test_short_zero_run_is_a_break() {
        let mut analyzer = ContinuityAnalyzer::default();
        analyzer.feed(&frames(1..10));
        analyzer.feed(&[0.0; 2]);
        analyzer.feed(&frames(10..20));
        let report = analyzer.finish();
        assert!(!report.is_clean());
    }
}
