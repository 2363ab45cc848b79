//! FFmpeg/FFprobe command helpers for the local media backends.
//!
//! Used by the local frame bridge (probe + single-frame extraction) and the
//! local video merger (concat demuxer, or a re-encoding concat filter when
//! the inputs' stream layouts differ).

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Error type for FFmpeg/FFprobe operations.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("ffprobe/ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffprobe/ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("video file not found: {0}")]
    VideoNotFound(String),
}

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// Top-level ffprobe JSON output (`-print_format json -show_format -show_streams`).
#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    #[serde(default)]
    pub streams: Vec<FfprobeStream>,
    pub format: FfprobeFormat,
}

/// A single stream from ffprobe output.
#[derive(Debug, Default, Deserialize)]
pub struct FfprobeStream {
    pub index: i32,
    pub codec_type: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    /// e.g. "24/1" or "24000/1001"
    pub r_frame_rate: Option<String>,
    pub duration: Option<String>,
}

/// Format-level metadata from ffprobe.
#[derive(Debug, Default, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
    pub format_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Run `ffprobe` on a video file and return the parsed JSON output.
pub async fn probe_video(path: &Path) -> Result<FfprobeOutput, FfmpegError> {
    ensure_exists(path)?;

    let output = tokio::process::Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .await
        .map_err(FfmpegError::NotFound)?;

    check_status(&output)?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str::<FfprobeOutput>(&stdout)
        .map_err(|e| FfmpegError::ParseError(format!("{e}: {stdout}")))
}

/// Extract the single frame at `timestamp_secs` as a full-resolution PNG.
pub async fn extract_frame_at(
    video_path: &Path,
    output_path: &Path,
    timestamp_secs: f64,
) -> Result<(), FfmpegError> {
    ensure_exists(video_path)?;

    let output = tokio::process::Command::new("ffmpeg")
        .args(["-y", "-ss", &format!("{timestamp_secs:.3}"), "-i"])
        .arg(video_path)
        .args(["-frames:v", "1", "-f", "image2"])
        .arg(output_path)
        .output()
        .await
        .map_err(FfmpegError::NotFound)?;

    check_status(&output)
}

/// Concatenate the files named in an ffmpeg concat list without re-encoding.
///
/// `list_path` must contain the output of [`concat_list`].
pub async fn concat_videos(list_path: &Path, output_path: &Path) -> Result<(), FfmpegError> {
    ensure_exists(list_path)?;

    let output = tokio::process::Command::new("ffmpeg")
        .args(["-y", "-f", "concat", "-safe", "0", "-i"])
        .arg(list_path)
        .args(["-c", "copy"])
        .arg(output_path)
        .output()
        .await
        .map_err(FfmpegError::NotFound)?;

    check_status(&output)
}

/// One input to [`concat_reencode`], with what its probe reported.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcatInput {
    pub path: PathBuf,
    pub has_audio: bool,
    /// Seconds; sizes the silent track for inputs without audio.
    pub duration: f64,
}

impl ConcatInput {
    pub fn from_probe(path: PathBuf, probe: &FfprobeOutput) -> Self {
        Self {
            path,
            has_audio: has_audio_stream(probe),
            duration: parse_duration(probe),
        }
    }
}

/// Whether the concat demuxer can join `inputs` with `-c copy`: either every
/// input carries audio or none does.
pub fn layouts_match(inputs: &[ConcatInput]) -> bool {
    match inputs.first() {
        Some(first) => inputs.iter().all(|i| i.has_audio == first.has_audio),
        None => true,
    }
}

/// Filter graph for [`concat_reencode`]. Inputs without audio get a silent
/// stereo track of their own duration; output pads are `[v]` and `[a]`.
pub fn concat_filter(inputs: &[ConcatInput]) -> String {
    let mut graph = String::new();
    let mut pads = String::new();
    for (i, input) in inputs.iter().enumerate() {
        graph.push_str(&format!("[{i}:v:0]setpts=PTS-STARTPTS[v{i}];"));
        if input.has_audio {
            graph.push_str(&format!(
                "[{i}:a:0]aresample=44100,aformat=channel_layouts=stereo,asetpts=PTS-STARTPTS[a{i}];"
            ));
        } else {
            graph.push_str(&format!(
                "anullsrc=r=44100:cl=stereo,atrim=duration={:.3}[a{i}];",
                input.duration
            ));
        }
        pads.push_str(&format!("[v{i}][a{i}]"));
    }
    graph.push_str(&format!("{pads}concat=n={}:v=1:a=1[v][a]", inputs.len()));
    graph
}

/// Concatenate `inputs` in order, re-encoding to H.264/AAC so clips with and
/// without audio join into one continuous track.
pub async fn concat_reencode(inputs: &[ConcatInput], output_path: &Path) -> Result<(), FfmpegError> {
    let mut command = tokio::process::Command::new("ffmpeg");
    command.arg("-y");
    for input in inputs {
        ensure_exists(&input.path)?;
        command.arg("-i").arg(&input.path);
    }
    let output = command
        .args(["-filter_complex", &concat_filter(inputs)])
        .args(["-map", "[v]", "-map", "[a]"])
        .args(["-c:v", "libx264", "-pix_fmt", "yuv420p", "-c:a", "aac"])
        .arg(output_path)
        .output()
        .await
        .map_err(FfmpegError::NotFound)?;

    check_status(&output)
}

/// Render the body of an ffmpeg concat-demuxer list, one `file '...'` line
/// per input in order. Single quotes inside paths are escaped.
pub fn concat_list<P: AsRef<Path>>(inputs: &[P]) -> String {
    inputs
        .iter()
        .map(|p| {
            let path = p.as_ref().to_string_lossy().replace('\'', "'\\''");
            format!("file '{path}'\n")
        })
        .collect()
}

fn ensure_exists(path: &Path) -> Result<(), FfmpegError> {
    if path.exists() {
        Ok(())
    } else {
        Err(FfmpegError::VideoNotFound(path.to_string_lossy().to_string()))
    }
}

fn check_status(output: &std::process::Output) -> Result<(), FfmpegError> {
    if output.status.success() {
        return Ok(());
    }
    Err(FfmpegError::ExecutionFailed {
        exit_code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Find the first video stream in the ffprobe output.
fn first_video_stream(probe: &FfprobeOutput) -> Option<&FfprobeStream> {
    probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
}

/// Whether the probe found any video stream at all.
pub fn has_video_stream(probe: &FfprobeOutput) -> bool {
    first_video_stream(probe).is_some()
}

/// Whether the probe found an audio stream.
pub fn has_audio_stream(probe: &FfprobeOutput) -> bool {
    probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"))
}

/// Parse the video duration in seconds from ffprobe output.
pub fn parse_duration(probe: &FfprobeOutput) -> f64 {
    // Format-level duration first, then the video stream.
    let from_format = probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok());
    let from_stream = || {
        first_video_stream(probe)
            .and_then(|s| s.duration.as_deref())
            .and_then(|d| d.parse::<f64>().ok())
    };
    from_format.or_else(from_stream).unwrap_or(0.0)
}

/// Parse the video framerate from ffprobe output.
pub fn parse_framerate(probe: &FfprobeOutput) -> f64 {
    first_video_stream(probe)
        .and_then(|s| s.r_frame_rate.as_deref())
        .map(parse_fraction)
        .unwrap_or(0.0)
}

/// Find the first video stream's resolution.
pub fn parse_resolution(probe: &FfprobeOutput) -> (i32, i32) {
    first_video_stream(probe)
        .map(|s| (s.width.unwrap_or(0), s.height.unwrap_or(0)))
        .unwrap_or((0, 0))
}

/// Timestamp of the temporal midpoint, snapped to a frame boundary when the
/// framerate is known. `None` for an empty video.
pub fn midpoint_timestamp(probe: &FfprobeOutput) -> Option<f64> {
    let duration = parse_duration(probe);
    if duration <= 0.0 {
        return None;
    }
    let mid = duration / 2.0;
    let fps = parse_framerate(probe);
    if fps > 0.0 {
        Some((mid * fps).floor() / fps)
    } else {
        Some(mid)
    }
}

/// Parse a fraction string like `"30/1"` into a float.
fn parse_fraction(s: &str) -> f64 {
    match s.split_once('/') {
        Some((num, den)) => {
            let num = num.parse::<f64>().unwrap_or(0.0);
            let den = den.parse::<f64>().unwrap_or(1.0);
            if den > 0.0 {
                num / den
            } else {
                0.0
            }
        }
        None => s.parse::<f64>().unwrap_or(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_stream(fps: &str, duration: Option<&str>) -> FfprobeStream {
        FfprobeStream {
            index: 0,
            codec_type: Some("video".into()),
            width: Some(854),
            height: Some(480),
            r_frame_rate: Some(fps.into()),
            duration: duration.map(Into::into),
        }
    }

    fn probe(streams: Vec<FfprobeStream>, duration: Option<&str>) -> FfprobeOutput {
        FfprobeOutput {
            streams,
            format: FfprobeFormat {
                duration: duration.map(Into::into),
                format_name: Some("mov,mp4,m4a,3gp,3g2,mj2".into()),
            },
        }
    }

    #[test]
    fn test_parse_fraction_standard() {
        assert!((parse_fraction("24/1") - 24.0).abs() < 0.001);
    }

    #[test]
    fn test_parse_fraction_ntsc() {
        let fps = parse_fraction("24000/1001");
        assert!((fps - 23.976).abs() < 0.01);
    }

    #[test]
    fn test_parse_fraction_plain_number() {
        assert!((parse_fraction("25") - 25.0).abs() < 0.001);
    }

    #[test]
    fn test_parse_fraction_zero_denominator() {
        assert!((parse_fraction("30/0") - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_parse_duration_prefers_format() {
        let p = probe(vec![video_stream("24/1", Some("4.9"))], Some("5.0"));
        assert!((parse_duration(&p) - 5.0).abs() < 0.001);
    }

    #[test]
    fn test_parse_duration_falls_back_to_stream() {
        let p = probe(vec![video_stream("24/1", Some("4.9"))], None);
        assert!((parse_duration(&p) - 4.9).abs() < 0.001);
    }

    #[test]
    fn test_parse_resolution() {
        let p = probe(vec![video_stream("24/1", None)], None);
        assert_eq!(parse_resolution(&p), (854, 480));
    }

    #[test]
    fn test_audio_only_has_no_video_stream() {
        let audio = FfprobeStream {
            index: 0,
            codec_type: Some("audio".into()),
            ..Default::default()
        };
        let p = probe(vec![audio], Some("3.0"));
        assert!(!has_video_stream(&p));
        assert_eq!(parse_framerate(&p), 0.0);
    }

    #[test]
    fn test_midpoint_snaps_to_frame() {
        // 5 s at 24 fps: midpoint 2.5 s is frame 60.
        let p = probe(vec![video_stream("24/1", None)], Some("5.0"));
        let ts = midpoint_timestamp(&p).unwrap();
        assert!((ts - 2.5).abs() < 0.001);

        let p = probe(vec![video_stream("24/1", None)], Some("5.01"));
        let ts = midpoint_timestamp(&p).unwrap();
        assert!((ts * 24.0 - (ts * 24.0).round()).abs() < 1e-9);
    }

    #[test]
    fn test_midpoint_of_empty_video() {
        let p = probe(vec![video_stream("24/1", None)], Some("0"));
        assert!(midpoint_timestamp(&p).is_none());
    }

    #[test]
    fn test_concat_list_preserves_order_and_escapes() {
        let list = concat_list(&["/tmp/a.mp4", "/tmp/it's.mp4"]);
        assert_eq!(list, "file '/tmp/a.mp4'\nfile '/tmp/it'\\''s.mp4'\n");
    }

    fn concat_input(name: &str, has_audio: bool) -> ConcatInput {
        ConcatInput {
            path: PathBuf::from(name),
            has_audio,
            duration: 5.0,
        }
    }

    #[test]
    fn test_audio_stream_detected() {
        let audio = FfprobeStream {
            index: 1,
            codec_type: Some("audio".into()),
            ..Default::default()
        };
        assert!(has_audio_stream(&probe(
            vec![video_stream("24/1", None), audio],
            Some("5.0")
        )));
        assert!(!has_audio_stream(&probe(vec![video_stream("24/1", None)], Some("5.0"))));
    }

    #[test]
    fn test_layouts_match_only_when_audio_agrees() {
        assert!(layouts_match(&[]));
        assert!(layouts_match(&[concat_input("a", true), concat_input("b", true)]));
        assert!(layouts_match(&[concat_input("a", false), concat_input("b", false)]));
        assert!(!layouts_match(&[
            concat_input("a", true),
            concat_input("b", false),
            concat_input("c", true),
        ]));
    }

    #[test]
    fn test_concat_filter_fills_missing_audio() {
        let graph = concat_filter(&[concat_input("a", true), concat_input("b", false)]);
        assert!(graph.contains("[0:a:0]aresample=44100"));
        assert!(!graph.contains("[1:a:0]"));
        assert!(graph.contains("anullsrc=r=44100:cl=stereo,atrim=duration=5.000[a1];"));
        assert!(graph.ends_with("[v0][a0][v1][a1]concat=n=2:v=1:a=1[v][a]"));
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let err = probe_video(Path::new("/definitely/not/here.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, FfmpegError::VideoNotFound(_)));
    }
}
