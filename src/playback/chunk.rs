//! Broadcast chunks queued for playback

use crate::playback::StereoSample;

/// One fixed-size block of stereo samples sharing a single nominal start
/// time. Immutable once constructed; the read cursor tracks partial
/// consumption, so "drained" is well-defined.
#[derive(Debug, Clone)]
pub struct QueuedChunk {
    start_time: i64,
    samples: Vec<StereoSample>,
    pos: usize,
}

impl QueuedChunk {
    pub fn new(start_time: i64, samples: Vec<StereoSample>) -> Self {
        Self {
            start_time,
            samples,
            pos: 0,
        }
    }

    /// Absolute playback time of the first sample, in nanoseconds
    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    /// Total number of samples in the chunk
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples in arrival order, independent of the read cursor
    pub fn samples(&self) -> &[StereoSample] {
        &self.samples
    }

    /// Copy the next samples into `target`, advancing the read cursor.
    /// Returns the number of samples copied; 0 once drained.
    pub fn copy_samples(&mut self, target: &mut [StereoSample]) -> usize {
        if self.drained() {
            return 0;
        }
        let remaining = &self.samples[self.pos..];
        let n = remaining.len().min(target.len());
        target[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        n
    }

    /// True once every sample has been copied out
    pub fn drained(&self) -> bool {
        self.pos >= self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_slice(offset: usize, len: usize) -> Vec<StereoSample> {
        (0..len)
            .map(|i| StereoSample {
                left: -((offset + i) as f64),
                right: (offset + i) as f64,
            })
            .collect()
    }

    #[test]
    fn drain_in_equal_parts() {
        for i in 0..16 {
            let samples = sample_slice(1024 * i, 1024);
            let mut chunk = QueuedChunk::new(i as i64, samples.clone());
            assert_eq!(chunk.len(), 1024);
            assert!(!chunk.drained());

            for j in 0..7 {
                let mut out = vec![StereoSample::silence(); 128];
                let n = chunk.copy_samples(&mut out);
                assert_eq!(n, 128);
                assert_eq!(chunk.pos, 128 * (j + 1));
                assert_eq!(&out[..], &samples[128 * j..128 * (j + 1)]);
                assert!(!chunk.drained());
            }

            // under-filled final copy
            let mut out = vec![StereoSample::silence(); 256];
            let n = chunk.copy_samples(&mut out);
            assert_eq!(n, 128);
            assert_eq!(chunk.pos, 1024);
            assert_eq!(&out[..128], &samples[896..]);
            assert!(chunk.drained());

            // a copy after drained returns zero samples
            let n = chunk.copy_samples(&mut out);
            assert_eq!(n, 0);
            assert_eq!(chunk.pos, 1024);
            assert!(chunk.drained());
        }
    }

    #[test]
    fn empty_chunk_is_drained_immediately() {
        let mut chunk = QueuedChunk::new(0, Vec::new());
        assert!(chunk.drained());
        let mut out = vec![StereoSample::silence(); 8];
        assert_eq!(chunk.copy_samples(&mut out), 0);
    }
}
