use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write wav {path}: {source}")]
    Wav {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
    #[error("sink already finished")]
    Finished,
}

/// Destination for processed stereo audio.
pub trait Sink {
    fn write(&mut self, left: &[f32], right: &[f32]) -> Result<(), SinkError>;

    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// 32-bit float stereo WAV file.
pub struct WavSink {
    path: PathBuf,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    frames: u64,
}

impl WavSink {
    pub fn create(path: &Path, sample_rate: u32) -> Result<Self, SinkError> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let writer = hound::WavWriter::create(path, spec).map_err(|source| SinkError::Wav {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Writing processed audio to {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(writer),
            frames: 0,
        })
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn wav_error(&self, source: hound::Error) -> SinkError {
        SinkError::Wav {
            path: self.path.clone(),
            source,
        }
    }
}

impl Sink for WavSink {
    fn write(&mut self, left: &[f32], right: &[f32]) -> Result<(), SinkError> {
        let writer = self.writer.as_mut().ok_or(SinkError::Finished)?;
        let mut result = Ok(());
        for (l, r) in left.iter().zip(right) {
            result = writer.write_sample(*l).and_then(|_| writer.write_sample(*r));
            if result.is_err() {
                break;
            }
        }
        result.map_err(|e| self.wav_error(e))?;
        self.frames += left.len().min(right.len()) as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().map_err(|e| self.wav_error(e))?;
            log::info!(
                "Wrote {} frames to {}",
                self.frames,
                self.path.display()
            );
        }
        Ok(())
    }
}

/// Collects everything written.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySink {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

#[cfg(test)]
impl MemorySink {
    pub fn frames(&self) -> usize {
        self.left.len()
    }
}

#[cfg(test)]
impl Sink for MemorySink {
    fn write(&mut self, left: &[f32], right: &[f32]) -> Result<(), SinkError> {
        self.left.extend_from_slice(left);
        self.right.extend_from_slice(right);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NullSink;

impl Sink for NullSink {
    fn write(&mut self, _left: &[f32], _right: &[f32]) -> Result<(), SinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_sink_round_trips_through_hound() {
        let path = std::env::temp_dir().join(format!("auralis-sink-{}.wav", std::process::id()));
        let mut sink = WavSink::create(&path, 48_000).unwrap();
        sink.write(&[0.5, -0.25], &[0.125, 1.0]).unwrap();
        sink.finish().unwrap();
        assert!(matches!(sink.write(&[0.0], &[0.0]), Err(SinkError::Finished)));

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 48_000);
        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0.5, 0.125, -0.25, 1.0]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn memory_sink_collects() {
        let mut sink = MemorySink::default();
        sink.write(&[1.0, 2.0], &[3.0, 4.0]).unwrap();
        sink.write(&[5.0], &[6.0]).unwrap();
        assert_eq!(sink.frames(), 3);
        assert_eq!(sink.right, vec![3.0, 4.0, 6.0]);
    }
}
