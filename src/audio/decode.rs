use anyhow::{Context, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Planar stereo PCM.
#[derive(Debug, Clone, Default)]
pub struct AudioData {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioData {
    pub fn frames(&self) -> usize {
        self.left.len()
    }

    pub fn duration(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f32 / self.sample_rate as f32
    }
}

pub fn decode_audio(path: &Path) -> Result<AudioData> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let detected = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("Failed to detect audio format")?;

    let mut format = detected.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .context("No audio tracks found")?;

    let track_id = track.id;
    let channels = track.codec_params.channels.map_or(1, |c| c.count()).max(1);
    let sample_rate = track.codec_params.sample_rate.context("Unknown sample rate")?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    let mut audio = AudioData {
        sample_rate,
        ..AudioData::default()
    };

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(e)) => {
                log::debug!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        push_interleaved(&mut audio, sample_buf.samples(), spec.channels.count().max(1));
    }

    if channels > 2 {
        log::warn!("Input has {} channels, keeping the first two", channels);
    }

    log::info!(
        "Decoded audio: {} frames, {}Hz, {:.1}s",
        audio.frames(),
        sample_rate,
        audio.duration()
    );

    Ok(audio)
}

/// Appends interleaved frames, duplicating mono and dropping channels past the second.
fn push_interleaved(audio: &mut AudioData, samples: &[f32], channels: usize) {
    for frame in samples.chunks_exact(channels) {
        let left = frame[0];
        let right = if channels > 1 { frame[1] } else { left };
        audio.left.push(left);
        audio.right.push(right);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_is_duplicated() {
        let mut audio = AudioData::default();
        push_interleaved(&mut audio, &[0.1, 0.2, 0.3], 1);
        assert_eq!(audio.left, vec![0.1, 0.2, 0.3]);
        assert_eq!(audio.right, audio.left);
    }

    #[test]
    fn surround_keeps_front_pair() {
        let mut audio = AudioData::default();
        push_interleaved(&mut audio, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3);
        assert_eq!(audio.left, vec![1.0, 4.0]);
        assert_eq!(audio.right, vec![2.0, 5.0]);
    }

    #[test]
    fn decodes_written_wav() {
        let dir = std::env::temp_dir().join(format!("auralis-decode-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tone.wav");

        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..2205 {
            writer.write_sample((i % 100) as i16 * 100).unwrap();
            writer.write_sample(-((i % 100) as i16) * 100).unwrap();
        }
        writer.finalize().unwrap();

        let audio = decode_audio(&path).unwrap();
        assert_eq!(audio.sample_rate, 22_050);
        assert_eq!(audio.frames(), 2205);
        assert!(audio.left[5] > 0.0);
        assert!(audio.right[5] < 0.0);
        std::fs::remove_dir_all(&dir).ok();
    }
}
