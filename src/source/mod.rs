//! Opaque audio decode capability
//!
//! Decoding compressed files is outside the synchronized core. The playlist
//! pipeline consumes any "song identifier to sample stream" capability
//! through these traits; real decoders plug in at this boundary.

use crate::error::PlaybackError;
use crate::playback::StereoSample;

/// A decoded stream of stereo samples
pub trait SampleSource: Send {
    /// Total length of the stream in samples
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decode up to `buf.len()` samples into `buf`. Returns the number of
    /// samples written and whether the source can produce more; exhaustion
    /// is signalled by a short write or `false`.
    fn stream(&mut self, buf: &mut [StereoSample]) -> (usize, bool);
}

/// Opens song identifiers as sample streams
pub trait SourceProvider: Send + Sync {
    fn open(&self, name: &str) -> Result<Box<dyn SampleSource>, PlaybackError>;
}

/// In-memory sample stream
pub struct VecSource {
    samples: Vec<StereoSample>,
    pos: usize,
}

impl VecSource {
    pub fn new(samples: Vec<StereoSample>) -> Self {
        Self { samples, pos: 0 }
    }
}

impl SampleSource for VecSource {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn stream(&mut self, buf: &mut [StereoSample]) -> (usize, bool) {
        if self.pos >= self.samples.len() {
            return (0, false);
        }
        let remaining = &self.samples[self.pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        (n, true)
    }
}

/// Provider backed by a fixed set of in-memory songs, used in tests and
/// small demos
#[derive(Default)]
pub struct MemoryProvider {
    songs: Vec<(String, Vec<StereoSample>)>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_song(mut self, name: impl Into<String>, samples: Vec<StereoSample>) -> Self {
        self.songs.push((name.into(), samples));
        self
    }
}

impl SourceProvider for MemoryProvider {
    fn open(&self, name: &str) -> Result<Box<dyn SampleSource>, PlaybackError> {
        self.songs
            .iter()
            .find(|(song, _)| song == name)
            .map(|(_, samples)| Box::new(VecSource::new(samples.clone())) as Box<dyn SampleSource>)
            .ok_or_else(|| PlaybackError::SourceOpen {
                name: name.to_string(),
                reason: "no such song".to_string(),
            })
    }
}

/// Test-tone provider: opens identifiers of the form `sine:<freq-hz>` as a
/// fixed-length sine sweep, so the full pipeline can run without a decoder
pub struct SineProvider {
    sample_rate: u32,
    seconds: u32,
}

impl SineProvider {
    pub fn new(sample_rate: u32, seconds: u32) -> Self {
        Self {
            sample_rate,
            seconds,
        }
    }
}

impl SourceProvider for SineProvider {
    fn open(&self, name: &str) -> Result<Box<dyn SampleSource>, PlaybackError> {
        let freq = name
            .strip_prefix("sine:")
            .and_then(|f| f.parse::<f64>().ok())
            .filter(|f| *f > 0.0)
            .ok_or_else(|| PlaybackError::SourceOpen {
                name: name.to_string(),
                reason: "expected an identifier of the form sine:<freq-hz>".to_string(),
            })?;
        Ok(Box::new(SineSource {
            freq,
            sample_rate: self.sample_rate,
            len: (self.sample_rate * self.seconds) as usize,
            pos: 0,
        }))
    }
}

struct SineSource {
    freq: f64,
    sample_rate: u32,
    len: usize,
    pos: usize,
}

impl SampleSource for SineSource {
    fn len(&self) -> usize {
        self.len
    }

    fn stream(&mut self, buf: &mut [StereoSample]) -> (usize, bool) {
        if self.pos >= self.len {
            return (0, false);
        }
        let n = (self.len - self.pos).min(buf.len());
        for (i, slot) in buf[..n].iter_mut().enumerate() {
            let t = (self.pos + i) as f64 / f64::from(self.sample_rate);
            let amplitude = 0.5 * (2.0 * std::f64::consts::PI * self.freq * t).sin();
            *slot = StereoSample::new(amplitude, amplitude);
        }
        self.pos += n;
        (n, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_source_streams_in_parts() {
        let samples: Vec<StereoSample> = (0..10).map(|i| StereoSample::new(i as f64, 0.0)).collect();
        let mut source = VecSource::new(samples.clone());
        assert_eq!(source.len(), 10);

        let mut buf = vec![StereoSample::silence(); 4];
        assert_eq!(source.stream(&mut buf), (4, true));
        assert_eq!(&buf[..], &samples[..4]);
        assert_eq!(source.stream(&mut buf), (4, true));
        assert_eq!(source.stream(&mut buf), (2, true));
        assert_eq!(source.stream(&mut buf), (0, false));
    }

    #[test]
    fn memory_provider_rejects_unknown_songs() {
        let provider = MemoryProvider::new().with_song("a", vec![StereoSample::silence()]);
        assert!(provider.open("a").is_ok());
        assert!(provider.open("b").is_err());
    }

    #[test]
    fn sine_provider_parses_identifiers() {
        let provider = SineProvider::new(1000, 2);
        let source = provider.open("sine:440").unwrap();
        assert_eq!(source.len(), 2000);
        assert!(provider.open("sine:not-a-number").is_err());
        assert!(provider.open("tone").is_err());
    }

    #[test]
    fn sine_source_starts_at_zero_crossing() {
        let provider = SineProvider::new(1000, 1);
        let mut source = provider.open("sine:100").unwrap();
        let mut buf = vec![StereoSample::silence(); 16];
        let (n, more) = source.stream(&mut buf);
        assert_eq!(n, 16);
        assert!(more);
        assert_eq!(buf[0].left, 0.0);
        assert!(buf[1].left > 0.0);
    }
}
