//! Clock-aligned streaming of queued chunks
//!
//! The streamer drains the timed sample queue into an output buffer in one
//! of two modes. In direct mode the queue's inherent ordering is trusted
//! and one sample is copied per output slot. In syncing mode the next
//! timestamp is compared against the corrected clock: the streamer pads
//! silence until the scheduled instant or discards samples that are already
//! in the past. Every drain flips the mode, so a confirmed alignment is
//! followed by direct playback until the next under- or overrun.

use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::playback::chunk::QueuedChunk;
use crate::playback::queue::TimedSampleQueue;
use crate::playback::StereoSample;
use crate::timing::TimeSource;

/// Playback duration of `n` samples, in nanoseconds
pub fn samples_duration(sample_rate: u32, n: usize) -> i64 {
    n as i64 * 1_000_000_000 / i64::from(sample_rate)
}

/// Number of whole samples playing within `duration` nanoseconds
pub fn samples_count(sample_rate: u32, duration: i64) -> usize {
    (duration * i64::from(sample_rate) / 1_000_000_000) as usize
}

/// State machine draining the timed sample queue into output buffers,
/// either passing samples straight through or actively aligning them to
/// the corrected clock.
pub struct TimedStreamer {
    queue: Arc<TimedSampleQueue>,
    clock: Arc<dyn TimeSource>,
    sample_rate: u32,
    syncing: bool,
}

impl TimedStreamer {
    /// A new streamer starts in syncing mode: nothing has been aligned to
    /// the clock yet.
    pub fn new(queue: Arc<TimedSampleQueue>, clock: Arc<dyn TimeSource>, sample_rate: u32) -> Self {
        Self {
            queue,
            clock,
            sample_rate,
            syncing: true,
        }
    }

    /// Whether the streamer is currently aligning to the clock rather than
    /// trusting queue order
    pub fn is_syncing(&self) -> bool {
        self.syncing
    }

    /// Fill `samples` completely, switching between direct and syncing mode
    /// whenever a fill reports drained
    pub fn stream(&mut self, samples: &mut [StereoSample]) {
        let mut now = self.clock.synced_time();
        let mut filled = 0;
        while filled < samples.len() {
            let (n, drained) = if self.syncing {
                self.stream_sync(&mut samples[filled..], now)
            } else {
                self.stream_direct(&mut samples[filled..])
            };
            now += samples_duration(self.sample_rate, n);
            filled += n;
            if drained {
                self.syncing = !self.syncing;
                let (_, t) = self.queue.peek();
                tracing::debug!(
                    error_ns = t - now,
                    syncing = self.syncing,
                    "playback drift observed"
                );
            }
        }
    }

    /// Trust queue order: one sample per slot. A gap sample means the queue
    /// ran out of real audio; report drained without inspecting timestamps.
    fn stream_direct(&self, out: &mut [StereoSample]) -> (usize, bool) {
        for (i, slot) in out.iter_mut().enumerate() {
            let (sample, _) = self.queue.remove();
            if sample.is_gap() {
                return (i, true);
            }
            *slot = sample;
        }
        (out.len(), false)
    }

    /// Align to the corrected clock. With `t` the next real timestamp:
    /// more than one buffer early fills everything with silence; within one
    /// buffer pads silence exactly up to `t` and reports drained so direct
    /// mode resumes on schedule; at or past `t` discards stale samples and
    /// reports drained.
    fn stream_sync(&self, out: &mut [StereoSample], now: i64) -> (usize, bool) {
        let t = self.next_audio_time();
        if now < t {
            let wait = t - now;
            if wait <= samples_duration(self.sample_rate, out.len()) {
                let n = samples_count(self.sample_rate, wait);
                fill_silence(&mut out[..n]);
                (n, true)
            } else {
                fill_silence(out);
                (out.len(), false)
            }
        } else {
            let mut dropped = 0usize;
            loop {
                let (sample, t) = self.queue.peek();
                if sample.is_gap() || t < now {
                    self.queue.remove();
                    if !sample.is_gap() {
                        dropped += 1;
                    }
                } else {
                    break;
                }
            }
            if dropped > 0 {
                tracing::debug!(dropped, "discarded stale samples while resynchronizing");
            }
            (0, true)
        }
    }

    /// Timestamp of the next real sample, discarding gap samples without
    /// affecting timing. Blocks while the queue is empty.
    fn next_audio_time(&self) -> i64 {
        loop {
            let (sample, t) = self.queue.peek();
            if !sample.is_gap() {
                return t;
            }
            self.queue.remove();
        }
    }
}

fn fill_silence(out: &mut [StereoSample]) {
    for slot in out.iter_mut() {
        *slot = StereoSample::silence();
    }
}

/// Background thread migrating pending chunks into the timed sample queue.
///
/// Chunks are processed strictly in arrival order; every sample is tagged
/// with `start_time + i * sample_period` before insertion. The thread wakes
/// on chunk arrival and re-checks cancellation at least once per
/// millisecond.
pub struct ChunkReader {
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl ChunkReader {
    pub fn start(
        queue: Arc<TimedSampleQueue>,
        chunks: Receiver<QueuedChunk>,
        sample_rate: u32,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let running_for_loop = running.clone();

        let handle = thread::Builder::new()
            .name("chunk-reader".to_string())
            .spawn(move || {
                while running_for_loop.load(Ordering::Relaxed) {
                    match chunks.recv_timeout(Duration::from_millis(1)) {
                        Ok(chunk) => {
                            let start = chunk.start_time();
                            for (i, sample) in chunk.samples().iter().enumerate() {
                                queue.add(*sample, start + samples_duration(sample_rate, i));
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .expect("failed to spawn chunk-reader thread");

        Self {
            running,
            thread_handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for ChunkReader {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::ManualClock;
    use crossbeam_channel::unbounded;

    fn audio(v: f64) -> StereoSample {
        StereoSample { left: v, right: v }
    }

    #[test]
    fn duration_and_count_are_inverse() {
        for i in [1usize, 10, 100, 1_000, 10_000, 100_000] {
            assert_eq!(samples_duration(1000, i), i as i64 * 1_000_000);
            assert_eq!(samples_count(1000, i as i64 * 1_000_000), i);
        }
    }

    #[test]
    fn reader_expands_chunks_in_arrival_order() {
        let queue = Arc::new(TimedSampleQueue::new(64));
        let (tx, rx) = unbounded();
        let _reader = ChunkReader::start(queue.clone(), rx, 1);

        for chunk_num in 0..16i64 {
            let samples: Vec<StereoSample> = (0..128)
                .map(|j| {
                    let v = (chunk_num * 128 + j) as f64;
                    StereoSample { left: -v, right: v }
                })
                .collect();
            tx.send(QueuedChunk::new(chunk_num * 128 * 1_000_000_000, samples))
                .unwrap();
        }

        for i in 0..2048i64 {
            let (sample, time) = queue.remove();
            assert_eq!(sample.left, -(i as f64));
            assert_eq!(sample.right, i as f64);
            assert_eq!(time, i * 1_000_000_000);
        }
    }

    #[test]
    fn reader_stops_cooperatively() {
        let queue = Arc::new(TimedSampleQueue::new(4));
        let (tx, rx) = unbounded::<QueuedChunk>();
        let mut reader = ChunkReader::start(queue, rx, 44100);
        assert!(reader.is_running());
        reader.stop();
        assert!(!reader.is_running());
        drop(tx);
    }

    #[test]
    fn direct_mode_copies_until_gap_then_drains() {
        let queue = Arc::new(TimedSampleQueue::new(16));
        for i in 0..4 {
            queue.add(audio(i as f64 + 1.0), i);
        }
        queue.add(StereoSample::gap(), 4);
        queue.add(audio(9.0), 5);

        let clock = Arc::new(ManualClock::new(0));
        let streamer = TimedStreamer::new(queue.clone(), clock, 1000);

        let mut out = vec![StereoSample::silence(); 8];
        let (n, drained) = streamer.stream_direct(&mut out);
        assert_eq!(n, 4);
        assert!(drained);
        for i in 0..4 {
            assert_eq!(out[i].left, i as f64 + 1.0);
        }
        // the gap sample was consumed, the following sample was not
        let (next, _) = queue.peek();
        assert_eq!(next.left, 9.0);
    }

    #[test]
    fn sync_mode_fills_silence_when_far_ahead() {
        let queue = Arc::new(TimedSampleQueue::new(16));
        queue.add(audio(1.0), 50_000_000);

        let clock = Arc::new(ManualClock::new(0));
        let mut streamer = TimedStreamer::new(queue.clone(), clock, 1000);

        // 8 samples at 1 kHz are 8 ms, the next sample is 50 ms away
        let mut out = vec![audio(7.0); 8];
        streamer.stream(&mut out);
        assert!(streamer.is_syncing());
        assert!(out.iter().all(|s| s.left == 0.0 && s.right == 0.0));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn sync_mode_pads_silence_up_to_schedule_then_goes_direct() {
        let queue = Arc::new(TimedSampleQueue::new(16));
        // 5 real samples scheduled 5 ms from now
        for i in 0..5i64 {
            queue.add(audio(i as f64 + 1.0), 5_000_000 + i * 1_000_000);
        }

        let clock = Arc::new(ManualClock::new(0));
        let mut streamer = TimedStreamer::new(queue.clone(), clock, 1000);

        let mut out = vec![audio(7.0); 10];
        streamer.stream(&mut out);
        assert!(!streamer.is_syncing());
        for slot in &out[..5] {
            assert_eq!(slot.left, 0.0);
        }
        for (i, slot) in out[5..].iter().enumerate() {
            assert_eq!(slot.left, i as f64 + 1.0);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn sync_mode_discards_stale_samples() {
        let queue = Arc::new(TimedSampleQueue::new(32));
        // 10 samples already in the past
        for i in 0..10i64 {
            queue.add(audio(-1.0), i * 1_000_000);
        }
        // 4 samples still in the future
        for i in 0..4i64 {
            queue.add(audio(i as f64 + 1.0), 12_000_000 + i * 1_000_000);
        }

        let clock = Arc::new(ManualClock::new(10_000_000));
        let mut streamer = TimedStreamer::new(queue.clone(), clock, 1000);

        let mut out = vec![audio(7.0); 4];
        streamer.stream(&mut out);
        assert!(!streamer.is_syncing());
        for (i, slot) in out.iter().enumerate() {
            assert_eq!(slot.left, i as f64 + 1.0);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn sync_mode_skips_gap_samples_without_affecting_timing() {
        let queue = Arc::new(TimedSampleQueue::new(16));
        queue.add(StereoSample::gap(), 0);
        queue.add(StereoSample::gap(), 1);
        queue.add(audio(5.0), 100_000_000);

        let clock = Arc::new(ManualClock::new(0));
        let mut streamer = TimedStreamer::new(queue.clone(), clock, 1000);

        let mut out = vec![audio(7.0); 4];
        streamer.stream(&mut out);
        assert!(streamer.is_syncing());
        // both gaps consumed, the real sample untouched
        assert_eq!(queue.len(), 1);
        assert!(out.iter().all(|s| s.left == 0.0));
    }

    /// Coordinator schedules one 44100-sample chunk at t = 5 s. The player,
    /// synced with offset 0, pads silence until 5.0 s, plays the chunk
    /// exactly on schedule through 6.0 s, and reports drained at the song
    /// gap with the mode flipping back to syncing.
    #[test]
    fn end_to_end_scheduled_chunk_plays_on_time() {
        const RATE: u32 = 44100;
        const BUF: usize = 4410; // 100 ms output buffer

        let queue = Arc::new(TimedSampleQueue::new(2 * RATE as usize));
        let start = 5_000_000_000i64;
        for i in 0..RATE as usize {
            queue.add(audio(0.5), start + samples_duration(RATE, i));
        }
        queue.add(StereoSample::gap(), start + samples_duration(RATE, RATE as usize));
        // the following chunk, one second after the first ends
        for i in 0..BUF {
            queue.add(audio(0.25), 7_000_000_000 + samples_duration(RATE, i));
        }

        let clock = Arc::new(ManualClock::new(0));
        let mut streamer = TimedStreamer::new(queue.clone(), clock.clone(), RATE);

        let mut real_started_at = None;
        let mut buf = vec![audio(7.0); BUF];
        for step in 0..16 {
            let now = 4_500_000_000i64 + step * 100_000_000;
            clock.set(now);
            streamer.stream(&mut buf);

            let all_real = buf.iter().all(|s| s.left == 0.5);
            let all_silence = buf.iter().all(|s| s.left == 0.0);
            if now < 5_000_000_000 {
                assert!(all_silence, "expected silence before 5.0s, now={now}");
            } else if now < 6_000_000_000 {
                assert!(all_real, "expected real audio in [5.0s, 6.0s), now={now}");
                real_started_at.get_or_insert(now);
            } else {
                assert!(all_silence, "expected silence after the chunk, now={now}");
            }
        }

        assert_eq!(real_started_at, Some(5_000_000_000));
        // the drain at 6.0 s flipped the streamer back to syncing mode
        assert!(streamer.is_syncing());
        // the whole chunk and its trailing gap were consumed
        assert_eq!(queue.len(), BUF);
    }
}
