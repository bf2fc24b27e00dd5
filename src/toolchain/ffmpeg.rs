use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::composition::{frame_count, SubtitleMode};
use crate::config::{Config, ToolchainConfig};
use crate::error::ToolchainError;
use crate::toolchain::{MediaToolchain, MusicMix, SegmentRequest};

/// Lines of stderr kept in error messages
const STDERR_TAIL_LINES: usize = 20;

/// Codec settings applied to every encode
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeSettings {
    pub video_codec: String,
    pub audio_codec: String,
    pub crf: u8,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            crf: 23,
        }
    }
}

/// [`MediaToolchain`] backed by the ffmpeg command-line tools
///
/// Every invocation runs with captured output and a timeout, and the child
/// process is killed if the call is abandoned.
pub struct FfmpegToolchain {
    config: ToolchainConfig,
    encode: EncodeSettings,
}

impl FfmpegToolchain {
    pub fn new(config: ToolchainConfig, encode: EncodeSettings) -> Self {
        Self { config, encode }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.toolchain.clone(),
            EncodeSettings {
                video_codec: config.render.video_codec.clone(),
                audio_codec: config.render.audio_codec.clone(),
                crf: config.render.crf(),
            },
        )
    }

    /// Check that both binaries can be executed
    pub async fn check_available(&self) -> Result<(), ToolchainError> {
        for program in [&self.config.ffmpeg, &self.config.ffprobe] {
            self.run(program, &["-version".to_string()], self.config.probe_timeout())
                .await?;
            debug!("{} is available", program);
        }
        Ok(())
    }

    async fn run(&self, program: &str, args: &[String], limit: Duration) -> Result<Output, ToolchainError> {
        debug!("Running {} {}", program, args.join(" "));

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match timeout(limit, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ToolchainError::NotAvailable {
                    program: program.to_string(),
                });
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(ToolchainError::Timeout {
                    program: program.to_string(),
                    seconds: limit.as_secs(),
                });
            }
        };

        if !output.status.success() {
            return Err(ToolchainError::ProcessFailed {
                program: program.to_string(),
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }

        Ok(output)
    }

    async fn ffmpeg(&self, args: Vec<String>) -> Result<(), ToolchainError> {
        self.run(&self.config.ffmpeg, &args, self.config.timeout()).await?;
        Ok(())
    }
}

#[async_trait]
impl MediaToolchain for FfmpegToolchain {
    async fn probe_duration(&self, path: &Path) -> Result<f64, ToolchainError> {
        let output = self
            .run(&self.config.ffprobe, &probe_args(path), self.config.probe_timeout())
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let value = stdout.trim();
        value.parse::<f64>().map_err(|_| ToolchainError::ProbeFailed {
            path: path.to_path_buf(),
            reason: format!("unexpected duration '{}'", value),
        })
    }

    async fn render_segment(&self, request: &SegmentRequest) -> Result<PathBuf, ToolchainError> {
        info!("🎞️  Rendering segment for part {} ({:.2}s)", request.part_index, request.duration);
        self.ffmpeg(segment_args(request, &self.encode)).await?;
        Ok(request.output.clone())
    }

    async fn concat(&self, segments: &[PathBuf], output: &Path, scratch: &Path) -> Result<PathBuf, ToolchainError> {
        let list_path = scratch.join("concat.txt");
        tokio::fs::write(&list_path, concat_list(segments)).await?;

        info!("🔗 Concatenating {} segments", segments.len());
        self.ffmpeg(concat_args(&list_path, output)).await?;
        Ok(output.to_path_buf())
    }

    async fn attach_subtitles(
        &self,
        video: &Path,
        srt: &Path,
        mode: SubtitleMode,
        output: &Path,
    ) -> Result<PathBuf, ToolchainError> {
        match subtitle_args(video, srt, mode, output, &self.encode) {
            Some(args) => {
                info!("💬 Attaching subtitles ({:?})", mode);
                self.ffmpeg(args).await?;
                Ok(output.to_path_buf())
            }
            // Sidecar subtitles leave the video untouched
            None => Ok(video.to_path_buf()),
        }
    }

    async fn mix_music(&self, video: &Path, music: &MusicMix, output: &Path) -> Result<PathBuf, ToolchainError> {
        info!("🎵 Mixing background music from {:?}", music.path);
        self.ffmpeg(music_args(video, music, output, &self.encode)).await?;
        Ok(output.to_path_buf())
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn probe_args(path: &Path) -> Vec<String> {
    vec![
        "-v".into(),
        "error".into(),
        "-show_entries".into(),
        "format=duration".into(),
        "-of".into(),
        "default=noprint_wrappers=1:nokey=1".into(),
        path_arg(path),
    ]
}

fn segment_args(request: &SegmentRequest, encode: &EncodeSettings) -> Vec<String> {
    let frames = frame_count(request.duration, request.fps);
    let filter = format!(
        "[0:v]{}[v];[1:a]apad[a]",
        request.motion.filter(request.canvas, frames, request.fps)
    );

    vec![
        "-y".into(),
        "-i".into(),
        path_arg(&request.image),
        "-i".into(),
        path_arg(&request.audio),
        "-filter_complex".into(),
        filter,
        "-map".into(),
        "[v]".into(),
        "-map".into(),
        "[a]".into(),
        "-t".into(),
        format!("{:.3}", request.duration),
        "-r".into(),
        request.fps.to_string(),
        "-c:v".into(),
        encode.video_codec.clone(),
        "-crf".into(),
        encode.crf.to_string(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-c:a".into(),
        encode.audio_codec.clone(),
        "-ar".into(),
        "44100".into(),
        "-ac".into(),
        "2".into(),
        path_arg(&request.output),
    ]
}

/// Concat demuxer input listing one segment per line
fn concat_list(segments: &[PathBuf]) -> String {
    segments
        .iter()
        .map(|segment| {
            let absolute = segment.canonicalize().unwrap_or_else(|_| segment.clone());
            format!("file '{}'\n", path_arg(&absolute).replace('\'', "'\\''"))
        })
        .collect()
}

fn concat_args(list: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        path_arg(list),
        "-c".into(),
        "copy".into(),
        path_arg(output),
    ]
}

fn subtitle_args(
    video: &Path,
    srt: &Path,
    mode: SubtitleMode,
    output: &Path,
    encode: &EncodeSettings,
) -> Option<Vec<String>> {
    let args = match mode {
        SubtitleMode::Embed => vec![
            "-y".into(),
            "-i".into(),
            path_arg(video),
            "-i".into(),
            path_arg(srt),
            "-map".into(),
            "0".into(),
            "-map".into(),
            "1".into(),
            "-c".into(),
            "copy".into(),
            "-c:s".into(),
            "mov_text".into(),
            path_arg(output),
        ],
        SubtitleMode::Burn => vec![
            "-y".into(),
            "-i".into(),
            path_arg(video),
            "-vf".into(),
            format!("subtitles=filename='{}'", escape_filter_path(srt)),
            "-c:v".into(),
            encode.video_codec.clone(),
            "-crf".into(),
            encode.crf.to_string(),
            "-c:a".into(),
            "copy".into(),
            path_arg(output),
        ],
        SubtitleMode::Sidecar => return None,
    };
    Some(args)
}

fn music_args(video: &Path, music: &MusicMix, output: &Path, encode: &EncodeSettings) -> Vec<String> {
    let trim = match music.end {
        Some(end) => format!("atrim=start={:.3}:end={:.3}", music.start, end),
        None => format!("atrim=start={:.3}", music.start),
    };
    let filter = format!(
        "[1:a]{},asetpts=PTS-STARTPTS,volume={:.3}[bg];[0:a][bg]amix=inputs=2:duration=first:dropout_transition=0:normalize=0[a]",
        trim, music.gain
    );

    vec![
        "-y".into(),
        "-i".into(),
        path_arg(video),
        "-i".into(),
        path_arg(&music.path),
        "-filter_complex".into(),
        filter,
        "-map".into(),
        "0:v".into(),
        "-map".into(),
        "[a]".into(),
        "-map".into(),
        "0:s?".into(),
        "-c:v".into(),
        "copy".into(),
        "-c:s".into(),
        "copy".into(),
        "-c:a".into(),
        encode.audio_codec.clone(),
        path_arg(output),
    ]
}

/// Escape a path for use inside a single-quoted filter argument
fn escape_filter_path(path: &Path) -> String {
    path_arg(path)
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::ZoomMotion;

    fn request() -> SegmentRequest {
        SegmentRequest {
            part_index: 1,
            image: PathBuf::from("/m/part_01.png"),
            audio: PathBuf::from("/m/part_01.mp3"),
            output: PathBuf::from("/w/segment_001.mp4"),
            duration: 4.0,
            canvas: (1920, 1080),
            fps: 30,
            motion: ZoomMotion::for_part(1, 1.2),
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> &'a str {
        let position = args.iter().position(|a| a == flag).unwrap();
        &args[position + 1]
    }

    #[test]
    fn test_segment_args() {
        let args = segment_args(&request(), &EncodeSettings::default());

        assert_eq!(value_after(&args, "-t"), "4.000");
        assert_eq!(value_after(&args, "-c:v"), "libx264");
        assert_eq!(args.last().unwrap(), "/w/segment_001.mp4");

        let filter = value_after(&args, "-filter_complex");
        assert!(filter.contains("s=1920x1080"));
        assert!(filter.contains("d=120"));
        assert!(filter.contains("max(1.2000-"), "odd parts zoom out: {filter}");
        assert!(filter.ends_with("[1:a]apad[a]"));
    }

    #[test]
    fn test_concat_list_quotes_paths() {
        let list = concat_list(&[PathBuf::from("/w/a.mp4"), PathBuf::from("/w/it's.mp4")]);
        assert_eq!(list, "file '/w/a.mp4'\nfile '/w/it'\\''s.mp4'\n");
    }

    #[test]
    fn test_subtitle_modes() {
        let encode = EncodeSettings::default();
        let video = Path::new("/w/joined.mp4");
        let srt = Path::new("/w/subs.srt");
        let out = Path::new("/w/out.mp4");

        let embed = subtitle_args(video, srt, SubtitleMode::Embed, out, &encode).unwrap();
        assert_eq!(value_after(&embed, "-c:s"), "mov_text");

        let burn = subtitle_args(video, srt, SubtitleMode::Burn, out, &encode).unwrap();
        assert_eq!(value_after(&burn, "-vf"), "subtitles=filename='/w/subs.srt'");

        assert!(subtitle_args(video, srt, SubtitleMode::Sidecar, out, &encode).is_none());
    }

    #[test]
    fn test_music_args_follow_composition_length() {
        let music = MusicMix {
            path: PathBuf::from("/music/bed.mp3"),
            start: 10.0,
            end: Some(70.5),
            gain: 0.15,
        };
        let args = music_args(Path::new("/w/in.mp4"), &music, Path::new("/w/out.mp4"), &EncodeSettings::default());
        let filter = value_after(&args, "-filter_complex");

        assert!(filter.starts_with("[1:a]atrim=start=10.000:end=70.500,asetpts=PTS-STARTPTS,volume=0.150[bg]"));
        assert!(filter.contains("amix=inputs=2:duration=first"));
        assert_eq!(value_after(&args, "-c:v"), "copy");
    }

    #[test]
    fn test_filter_path_escaping() {
        assert_eq!(escape_filter_path(Path::new("C:\\subs\\a.srt")), "C\\:/subs/a.srt");
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr: String = (0..30).map(|i| format!("line {i}\n")).collect();
        let tail = stderr_tail(stderr.as_bytes());
        assert!(tail.starts_with("line 10"));
        assert!(tail.ends_with("line 29"));
    }

    #[tokio::test]
    async fn test_missing_binary_reported_as_unavailable() {
        let toolchain = FfmpegToolchain::new(
            ToolchainConfig {
                ffmpeg: "definitely-not-ffmpeg-xyz".to_string(),
                ffprobe: "definitely-not-ffprobe-xyz".to_string(),
                ..ToolchainConfig::default()
            },
            EncodeSettings::default(),
        );

        let err = toolchain.check_available().await.unwrap_err();
        assert!(matches!(err, ToolchainError::NotAvailable { .. }));
    }
}
