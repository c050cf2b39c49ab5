//! ffmpeg/ffprobe-backed [`FrameDecoder`].
//!
//! Each call stages the channel blob in a scoped temporary file, asks
//! `ffprobe` for the stream geometry and pixel format, then streams raw
//! grayscale frames out of `ffmpeg` over a pipe. No frame files touch disk.

use crate::{Error, Result};
use h5j_core::{BitDepth, ByteOrder, DecodedFrames, FrameDecoder, PixelFormat, RawFrame};
use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use tempfile::NamedTempFile;

/// Environment variable overriding the `ffmpeg` binary.
pub const FFMPEG_ENV: &str = "H5J_FFMPEG";
/// Environment variable overriding the `ffprobe` binary.
pub const FFPROBE_ENV: &str = "H5J_FFPROBE";

/// Locations of the external binaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegConfig {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl FfmpegConfig {
    /// Binaries from `PATH`, overridden by [`FFMPEG_ENV`] / [`FFPROBE_ENV`].
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(path) = std::env::var_os(FFMPEG_ENV) {
            config.ffmpeg = PathBuf::from(path);
        }
        if let Some(path) = std::env::var_os(FFPROBE_ENV) {
            config.ffprobe = PathBuf::from(path);
        }
        config
    }

    #[must_use]
    pub fn with_ffmpeg(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg = path.into();
        self
    }

    #[must_use]
    pub fn with_ffprobe(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffprobe = path.into();
        self
    }
}

/// Properties of the first video stream, as reported by `ffprobe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub width: usize,
    pub height: usize,
    pub pixel_format: PixelFormat,
}

impl StreamInfo {
    /// Parses `key=value` lines (`-of default=noprint_wrappers=1`).
    fn parse(output: &str) -> std::result::Result<Self, String> {
        let mut width = None;
        let mut height = None;
        let mut pixel_format = None;
        for line in output.lines() {
            let Some((key, value)) = line.trim().split_once('=') else {
                continue;
            };
            match key {
                "width" => width = value.parse::<usize>().ok(),
                "height" => height = value.parse::<usize>().ok(),
                "pix_fmt" => pixel_format = Some(PixelFormat::new(value)),
                _ => {}
            }
        }

        match (width, height, pixel_format) {
            (Some(width), Some(height), Some(pixel_format)) if width > 0 && height > 0 => {
                Ok(Self {
                    width,
                    height,
                    pixel_format,
                })
            }
            (Some(0), _, _) | (_, Some(0), _) => Err("stream reports an empty frame size".into()),
            _ => Err(format!("no video stream in ffprobe output: {:?}", output.trim())),
        }
    }
}

/// Decodes channel streams by running the system `ffmpeg`.
#[derive(Debug, Clone, Default)]
pub struct FfmpegDecoder {
    config: FfmpegConfig,
}

impl FfmpegDecoder {
    #[must_use]
    pub fn new(config: FfmpegConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &FfmpegConfig {
        &self.config
    }

    /// Verifies both binaries can be started.
    ///
    /// # Errors
    /// Returns [`Error::Decoder`] naming the binary that failed.
    pub fn check_available(&self) -> Result<()> {
        for program in [&self.config.ffmpeg, &self.config.ffprobe] {
            let status = Command::new(program)
                .arg("-version")
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map_err(|e| Error::Decoder(format!("cannot run {}: {e}", program.display())))?;
            if !status.success() {
                return Err(Error::Decoder(format!(
                    "{} -version exited with {status}",
                    program.display()
                )));
            }
        }
        Ok(())
    }

    fn probe_stream(&self, channel: &str, path: &Path) -> h5j_core::Result<StreamInfo> {
        let output = Command::new(&self.config.ffprobe)
            .args(["-v", "error", "-select_streams", "v:0"])
            .args(["-show_entries", "stream=width,height,pix_fmt"])
            .args(["-of", "default=noprint_wrappers=1"])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                h5j_core::Error::decode(
                    channel,
                    format!("cannot run {}: {e}", self.config.ffprobe.display()),
                )
            })?;
        if !output.status.success() {
            return Err(h5j_core::Error::decode(
                channel,
                format!(
                    "ffprobe exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }
        StreamInfo::parse(&String::from_utf8_lossy(&output.stdout))
            .map_err(|reason| h5j_core::Error::decode(channel, reason))
    }
}

impl FrameDecoder for FfmpegDecoder {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn probe(&self, channel: &str, stream: &[u8]) -> h5j_core::Result<PixelFormat> {
        let staged = stage(channel, stream)?;
        Ok(self.probe_stream(channel, staged.path())?.pixel_format)
    }

    fn decode(
        &self,
        channel: &str,
        stream: &[u8],
        depth: BitDepth,
    ) -> h5j_core::Result<DecodedFrames> {
        let staged = stage(channel, stream)?;
        let info = self.probe_stream(channel, staged.path())?;
        let pix_fmt = match depth {
            BitDepth::Eight => "gray",
            BitDepth::Sixteen => "gray16le",
        };

        let mut child = Command::new(&self.config.ffmpeg)
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(staged.path())
            .args(["-f", "rawvideo", "-pix_fmt", pix_fmt, "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                h5j_core::Error::decode(
                    channel,
                    format!("cannot run {}: {e}", self.config.ffmpeg.display()),
                )
            })?;
        let stdout = child.stdout.take();
        let child = ChildGuard(child);
        let stdout =
            stdout.ok_or_else(|| h5j_core::Error::decode(channel, "ffmpeg stdout not captured"))?;
        log::debug!(
            "{channel}: decoding {}x{} {} as {pix_fmt}",
            info.width,
            info.height,
            info.pixel_format
        );

        let frames = RawFrameStream {
            channel: channel.to_string(),
            stdout: BufReader::new(stdout),
            child,
            _staged: staged,
            width: info.width,
            height: info.height,
            depth,
            finished: false,
        };
        Ok(DecodedFrames::new(info.pixel_format, frames))
    }
}

fn stage(channel: &str, stream: &[u8]) -> h5j_core::Result<NamedTempFile> {
    let staging_error =
        |e: std::io::Error| h5j_core::Error::decode(channel, format!("cannot stage stream: {e}"));
    let mut file = tempfile::Builder::new()
        .prefix("h5j-")
        .suffix(".mp4")
        .tempfile()
        .map_err(staging_error)?;
    file.write_all(stream).map_err(staging_error)?;
    file.flush().map_err(staging_error)?;
    Ok(file)
}

/// Kills and reaps the child if it is still running when dropped.
struct ChildGuard(Child);

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if matches!(self.0.try_wait(), Ok(None)) {
            let _ = self.0.kill();
        }
        let _ = self.0.wait();
    }
}

/// Raw frames read off `ffmpeg`'s stdout. Field order matters: the pipe
/// closes before the child is reaped, and the staged file outlives both.
struct RawFrameStream {
    channel: String,
    stdout: BufReader<ChildStdout>,
    child: ChildGuard,
    _staged: NamedTempFile,
    width: usize,
    height: usize,
    depth: BitDepth,
    finished: bool,
}

impl RawFrameStream {
    fn frame_len(&self) -> usize {
        self.width * self.height * self.depth.bytes_per_sample()
    }

    fn finish(&mut self) -> h5j_core::Result<()> {
        let status = self.child.0.wait().map_err(|e| {
            h5j_core::Error::decode(&self.channel, format!("cannot wait for ffmpeg: {e}"))
        })?;
        if status.success() {
            Ok(())
        } else {
            Err(h5j_core::Error::decode(
                &self.channel,
                format!("ffmpeg exited with {status}"),
            ))
        }
    }
}

impl Iterator for RawFrameStream {
    type Item = h5j_core::Result<RawFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let frame_len = self.frame_len();
        let mut data = vec![0u8; frame_len];
        match read_full(&mut self.stdout, &mut data) {
            Ok(n) if n == frame_len => Some(Ok(RawFrame {
                width: self.width,
                height: self.height,
                depth: self.depth,
                byte_order: ByteOrder::Little,
                data,
            })),
            Ok(0) => {
                self.finished = true;
                self.finish().err().map(Err)
            }
            Ok(n) => {
                self.finished = true;
                Some(Err(h5j_core::Error::decode(
                    &self.channel,
                    format!("stream ended mid-frame ({n} of {frame_len} bytes)"),
                )))
            }
            Err(e) => {
                self.finished = true;
                Some(Err(h5j_core::Error::decode(
                    &self.channel,
                    format!("cannot read ffmpeg output: {e}"),
                )))
            }
        }
    }
}

/// Fills `buf` unless the reader hits end of stream first; returns bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_stream_info() {
        let info = StreamInfo::parse("width=1024\nheight=512\npix_fmt=yuv444p12le\n").unwrap();
        assert_eq!(info.width, 1024);
        assert_eq!(info.height, 512);
        assert!(info.pixel_format.is_packed_12bit());

        let info = StreamInfo::parse("pix_fmt=gray\r\nheight=8\r\nwidth=16\r\n").unwrap();
        assert_eq!((info.width, info.height), (16, 8));
        assert_eq!(info.pixel_format.as_str(), "gray");
    }

    #[test]
    fn test_parse_stream_info_rejects_missing_fields() {
        assert!(StreamInfo::parse("").is_err());
        assert!(StreamInfo::parse("width=4\nheight=4\n").is_err());
        assert!(StreamInfo::parse("width=0\nheight=4\npix_fmt=gray\n").is_err());
    }

    #[test]
    fn test_read_full_reports_short_reads() {
        let mut reader = Cursor::new(vec![1u8, 2, 3, 4, 5]);
        let mut buf = [0u8; 4];
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 4);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 1);
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_config_builders() {
        let config = FfmpegConfig::default()
            .with_ffmpeg("/opt/ffmpeg/bin/ffmpeg")
            .with_ffprobe("/opt/ffmpeg/bin/ffprobe");
        assert_eq!(config.ffmpeg, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(config.ffprobe, PathBuf::from("/opt/ffmpeg/bin/ffprobe"));
    }

    #[test]
    fn test_missing_binaries() {
        let decoder = FfmpegDecoder::new(
            FfmpegConfig::default()
                .with_ffmpeg("/nonexistent/h5j-ffmpeg")
                .with_ffprobe("/nonexistent/h5j-ffprobe"),
        );
        assert!(matches!(decoder.check_available(), Err(Error::Decoder(_))));

        let err = decoder.probe("Channel_0", b"not a video").unwrap_err();
        assert!(
            matches!(err, h5j_core::Error::Decode { ref channel, .. } if channel == "Channel_0")
        );

        let err = decoder
            .decode("Channel_1", b"not a video", BitDepth::Eight)
            .unwrap_err();
        assert!(matches!(err, h5j_core::Error::Decode { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_child_guard_kills_running_child() {
        let child = Command::new("sleep")
            .arg("30")
            .stdout(Stdio::null())
            .spawn()
            .unwrap();
        let started = std::time::Instant::now();
        drop(ChildGuard(child));
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }
}
