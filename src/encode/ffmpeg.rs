use anyhow::{Context, Result};
use std::ffi::OsString;
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};

#[derive(Debug, Clone)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: String,
    pub pix_fmt: String,
    pub crf: u32,
    pub bitrate: Option<String>,
}

fn video_args(settings: &VideoSettings, output_path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-f".into(), "rawvideo".into(),
        "-pixel_format".into(), "rgba".into(),
        "-video_size".into(), format!("{}x{}", settings.width, settings.height).into(),
        "-framerate".into(), settings.fps.to_string().into(),
        "-i".into(), "pipe:0".into(),
        "-an".into(),
        "-c:v".into(), settings.codec.clone().into(),
        "-pix_fmt".into(), settings.pix_fmt.clone().into(),
    ];

    if let Some(br) = &settings.bitrate {
        args.extend(["-b:v".into(), br.into()]);
    } else {
        args.extend(["-crf".into(), settings.crf.to_string().into()]);
        args.extend(["-preset".into(), "medium".into()]);
    }

    args.push(output_path.into());
    args
}

fn mux_args(video: &Path, audio: &Path, output_path: &Path) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-i".into(), video.into(),
        "-i".into(), audio.into(),
        "-map".into(), "0:v:0".into(),
        "-map".into(), "1:a:0".into(),
        "-c:v".into(), "copy".into(),
        "-c:a".into(), "aac".into(),
        "-b:a".into(), "192k".into(),
        output_path.into(),
    ]
}

/// Video-only encoder fed raw RGBA frames over stdin.
pub struct FfmpegEncoder {
    child: Child,
    frames: u64,
}

impl FfmpegEncoder {
    pub fn new(output_path: &Path, settings: &VideoSettings) -> Result<Self> {
        let child = Command::new("ffmpeg")
            .args(video_args(settings, output_path))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;

        log::info!(
            "FFmpeg encoder started: {}x{} @ {}fps, codec={}",
            settings.width,
            settings.height,
            settings.fps,
            settings.codec
        );

        Ok(Self { child, frames: 0 })
    }

    pub fn write_frame(&mut self, rgba_pixels: &[u8]) -> Result<()> {
        let stdin = self.child.stdin.as_mut().context("FFmpeg stdin not available")?;
        stdin.write_all(rgba_pixels).context("Failed to write frame to ffmpeg")?;
        self.frames += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<u64> {
        // Close stdin to signal EOF
        drop(self.child.stdin.take());

        let output = self.child.wait_with_output().context("Failed to wait for ffmpeg")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("FFmpeg exited with error:\n{}", stderr);
        }

        log::info!("FFmpeg encoding complete ({} frames)", self.frames);
        Ok(self.frames)
    }
}

/// Combines the rendered video with the processed audio. The video keeps its
/// full length, so the animation tail after the audio ends survives.
pub fn mux(video: &Path, audio: &Path, output_path: &Path) -> Result<()> {
    let output = Command::new("ffmpeg")
        .args(mux_args(video, audio, output_path))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .context("Failed to spawn ffmpeg for muxing")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("FFmpeg mux failed:\n{}", stderr);
    }

    log::info!("Muxed {}", output_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> VideoSettings {
        VideoSettings {
            width: 640,
            height: 360,
            fps: 60,
            codec: "libx264".into(),
            pix_fmt: "yuv420p".into(),
            crf: 18,
            bitrate: None,
        }
    }

    #[test]
    fn video_args_are_silent_and_use_crf() {
        let args = video_args(&settings(), Path::new("out.mp4"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert!(args.contains(&"-an".to_string()));
        assert!(args.windows(2).any(|w| w == ["-video_size", "640x360"]));
        assert!(args.windows(2).any(|w| w == ["-crf", "18"]));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }

    #[test]
    fn bitrate_replaces_crf() {
        let mut settings = settings();
        settings.bitrate = Some("8M".into());
        let args = video_args(&settings, Path::new("out.mp4"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert!(args.windows(2).any(|w| w == ["-b:v", "8M"]));
        assert!(!args.contains(&"-crf".to_string()));
    }

    #[test]
    fn mux_keeps_full_video_length() {
        let args = mux_args(Path::new("v.mp4"), Path::new("a.wav"), Path::new("o.mp4"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert!(!args.contains(&"-shortest".to_string()));
        assert!(args.windows(2).any(|w| w == ["-c:v", "copy"]));
    }
}
