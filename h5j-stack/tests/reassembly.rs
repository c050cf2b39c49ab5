#![allow(clippy::cast_possible_truncation, clippy::uninlined_format_args)]
use approx::assert_relative_eq;
use h5j_core::attributes::{PAD_BOTTOM_ATTR, PAD_RIGHT_ATTR, UNIT_ATTR, VOXEL_SIZE_ATTR};
use h5j_core::attributes::{HEIGHT_ATTR, SPC_X_ATTR, WIDTH_ATTR};
use h5j_core::{
    AttrValue, BitDepth, ByteOrder, DecodedFrames, DisplayMode, Error, FrameDecoder,
    MemoryStore, PixelFormat, Pixels, RawFrame, CHANNELS_PATH, CHANNEL_PREFIX, ROOT_PATH,
};
use h5j_stack::{AssemblyConfig, AssemblyWarning, CancelToken, MismatchPolicy, StackReassembler};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One scripted channel: samples per frame, served at whatever depth is requested.
#[derive(Clone)]
struct Script {
    format: &'static str,
    width: usize,
    height: usize,
    byte_order: ByteOrder,
    frames: Vec<Vec<u16>>,
}

/// Decoder that maps a blob (the channel id bytes) to a scripted frame list.
#[derive(Default)]
struct ScriptedDecoder {
    scripts: HashMap<Vec<u8>, Script>,
    decode_calls: AtomicUsize,
    /// Cancels the token once the named channel has yielded that many frames.
    cancel_at: Option<(String, usize, CancelToken)>,
}

impl ScriptedDecoder {
    fn with(mut self, id: &str, script: Script) -> Self {
        self.scripts.insert(id.as_bytes().to_vec(), script);
        self
    }

    fn cancel_after(mut self, id: &str, frames: usize, token: &CancelToken) -> Self {
        self.cancel_at = Some((id.to_string(), frames, token.clone()));
        self
    }

    fn script(&self, channel: &str, stream: &[u8]) -> h5j_core::Result<&Script> {
        self.scripts
            .get(stream)
            .ok_or_else(|| Error::decode(channel, "unknown stream"))
    }
}

impl FrameDecoder for ScriptedDecoder {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn probe(&self, channel: &str, stream: &[u8]) -> h5j_core::Result<PixelFormat> {
        Ok(PixelFormat::new(self.script(channel, stream)?.format))
    }

    fn decode(
        &self,
        channel: &str,
        stream: &[u8],
        depth: BitDepth,
    ) -> h5j_core::Result<DecodedFrames> {
        self.decode_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script(channel, stream)?.clone();
        let (w, h, order) = (script.width, script.height, script.byte_order);
        let trigger = self
            .cancel_at
            .clone()
            .filter(|(id, ..)| id == channel)
            .map(|(_, after, token)| (after, token));
        let frames = script.frames.into_iter().enumerate().map(move |(z, samples)| {
            if let Some((after, token)) = &trigger {
                if z + 1 == *after {
                    token.cancel();
                }
            }
            Ok(match depth {
                BitDepth::Eight => {
                    RawFrame::gray8(w, h, samples.iter().map(|&s| s as u8).collect())
                }
                BitDepth::Sixteen => RawFrame::gray16(w, h, &samples, order),
            })
        });
        Ok(DecodedFrames::new(PixelFormat::new(script.format), frames))
    }
}

/// Sample value encoding channel, slice and position.
fn tag(c: usize, z: usize, x: usize, y: usize) -> u16 {
    ((c * 50 + z * 7 + x + y * 3) % 250) as u16
}

fn script(c: usize, depth: usize, width: usize, height: usize) -> Script {
    Script {
        format: "yuv420p",
        width,
        height,
        byte_order: ByteOrder::Little,
        frames: (0..depth)
            .map(|z| {
                (0..width * height)
                    .map(|i| tag(c, z, i % width, i / width))
                    .collect()
            })
            .collect(),
    }
}

fn channel_id(c: usize) -> String {
    format!("{CHANNEL_PREFIX}{c}")
}

/// Container with one blob per channel and a decoder that serves `scripts`.
fn fixture(scripts: Vec<Script>) -> (MemoryStore, ScriptedDecoder) {
    let mut store = MemoryStore::new();
    let mut decoder = ScriptedDecoder::default();
    for (c, s) in scripts.into_iter().enumerate() {
        let id = channel_id(c);
        store.set_opaque(&format!("{CHANNELS_PATH}/{id}"), id.as_bytes().to_vec());
        decoder = decoder.with(&id, s);
    }
    (store, decoder)
}

#[test]
fn test_uniform_depth_view_indexing() {
    let (store, decoder) = fixture((0..3).map(|c| script(c, 5, 4, 3)).collect());
    let result = StackReassembler::new(&store, &decoder).assemble().unwrap();
    let stack = &result.stack;

    assert_eq!(stack.channels(), 3);
    assert_eq!(stack.depth(), 5);
    assert_eq!(stack.len(), 15);
    for z in 0..5 {
        for c in 0..3 {
            let frame = stack.frame(z, c).unwrap();
            assert_eq!(frame.sample(2, 1), Some(tag(c, z, 2, 1)), "view[{z}][{c}]");
        }
    }
    let order: Vec<(usize, usize)> = stack.iter_view().map(|(z, c, _)| (z, c)).collect();
    assert_eq!(order[..4], [(0, 0), (0, 1), (0, 2), (1, 0)]);
    assert!(result.warnings.is_empty());
    assert_eq!(result.channels.len(), 3);
    assert_eq!(result.display.mode, DisplayMode::Composite);
}

#[test]
fn test_repeated_runs_are_identical() {
    let (store, decoder) = fixture((0..6).map(|c| script(c, 4, 8, 2)).collect());
    let reassembler = StackReassembler::new(&store, &decoder)
        .with_config(AssemblyConfig::default().with_threads(3));
    let first = reassembler.assemble().unwrap();
    let second = reassembler.assemble().unwrap();
    assert_eq!(first.stack, second.stack);

    let sequential = StackReassembler::new(&store, &decoder)
        .with_config(AssemblyConfig::default().with_parallel(false))
        .assemble()
        .unwrap();
    assert_eq!(first.stack, sequential.stack);
}

#[test]
fn test_padding_is_stripped() {
    let (mut store, decoder) = fixture(vec![script(0, 2, 104, 208), script(1, 2, 104, 208)]);
    store
        .set_attr(CHANNELS_PATH, PAD_RIGHT_ATTR, AttrValue::Int(4))
        .set_attr(CHANNELS_PATH, PAD_BOTTOM_ATTR, AttrValue::Int(8))
        .set_attr(CHANNELS_PATH, WIDTH_ATTR, AttrValue::Int(100))
        .set_attr(CHANNELS_PATH, HEIGHT_ATTR, AttrValue::Int(200));

    let result = StackReassembler::new(&store, &decoder).assemble().unwrap();
    assert_eq!((result.stack.width(), result.stack.height()), (100, 200));
    for (z, c, frame) in result.stack.iter_view() {
        assert_eq!((frame.width, frame.height), (100, 200));
        for (x, y) in [(0, 0), (99, 0), (0, 199), (99, 199), (37, 121)] {
            assert_eq!(frame.sample(x, y), Some(tag(c, z, x, y)));
        }
    }
    assert_eq!(result.calibration.pad_right, 4);
    assert_eq!(result.calibration.pad_bottom, 8);
}

#[test]
fn test_padding_without_declared_size_uses_decoded_size() {
    let (mut store, decoder) = fixture(vec![script(0, 1, 10, 6)]);
    store
        .set_attr(CHANNELS_PATH, PAD_RIGHT_ATTR, AttrValue::Int(2))
        .set_attr(CHANNELS_PATH, PAD_BOTTOM_ATTR, AttrValue::Int(1));

    let result = StackReassembler::new(&store, &decoder).assemble().unwrap();
    assert_eq!((result.stack.width(), result.stack.height()), (8, 5));
}

#[test]
fn test_undersized_frame_is_geometry_error() {
    let (mut store, decoder) = fixture(vec![script(0, 2, 100, 200), script(1, 2, 90, 200)]);
    store
        .set_attr(CHANNELS_PATH, PAD_RIGHT_ATTR, AttrValue::Int(0))
        .set_attr(CHANNELS_PATH, PAD_BOTTOM_ATTR, AttrValue::Int(8))
        .set_attr(CHANNELS_PATH, WIDTH_ATTR, AttrValue::Int(100))
        .set_attr(CHANNELS_PATH, HEIGHT_ATTR, AttrValue::Int(192));

    let err = StackReassembler::new(&store, &decoder).assemble().unwrap_err();
    assert!(matches!(err, Error::Geometry { ref channel, .. } if channel == "Channel_1"));
}

#[test]
fn test_channel0_12bit_marker_fixes_16bit_stack() {
    let mut first = script(0, 2, 2, 2);
    first.format = "yuv420p12le";
    first.frames = vec![vec![4095, 16, 15, 0]; 2];
    let mut second = script(1, 2, 2, 2);
    second.format = "yuv420p";
    second.byte_order = ByteOrder::Big;
    second.frames = vec![vec![320, 321, 335, 336]; 2];

    let (store, decoder) = fixture(vec![first, second]);
    let result = StackReassembler::new(&store, &decoder).assemble().unwrap();

    assert_eq!(result.calibration.bit_depth, BitDepth::Sixteen);
    assert_eq!(result.stack.bit_depth(), BitDepth::Sixteen);
    assert_eq!(
        result.stack.frame(1, 0).unwrap().pixels,
        Pixels::Gray16(vec![255, 1, 0, 0])
    );
    assert_eq!(
        result.stack.frame(0, 1).unwrap().pixels,
        Pixels::Gray16(vec![20, 20, 20, 21])
    );
    assert_relative_eq!(result.display.range.0, 0.0);
    assert_relative_eq!(result.display.range.1, 4095.0);
    assert_eq!(result.display.mode, DisplayMode::Single);
}

#[test]
fn test_16bit_rescale_floors() {
    for value in [0u16, 15, 16, 17, 4095, 65535] {
        let mut s = script(0, 3, 3, 3);
        s.format = "gray12le";
        s.frames = vec![vec![value; 9]; 3];
        let (store, decoder) = fixture(vec![s]);
        let result = StackReassembler::new(&store, &decoder).assemble().unwrap();
        for (_, _, frame) in result.stack.iter_view() {
            assert_eq!(frame.pixels, Pixels::Gray16(vec![value / 16; 9]));
        }
    }
}

#[test]
fn test_8bit_stack_is_not_rescaled() {
    let (store, decoder) = fixture(vec![script(0, 1, 4, 1)]);
    let result = StackReassembler::new(&store, &decoder).assemble().unwrap();
    assert_eq!(result.stack.bit_depth(), BitDepth::Eight);
    assert_eq!(
        result.stack.frame(0, 0).unwrap().pixels,
        Pixels::Gray8((0..4).map(|x| tag(0, 0, x, 0) as u8).collect())
    );
    assert_relative_eq!(result.display.range.1, 255.0);
}

#[test]
fn test_depth_mismatch_truncates_with_warning() {
    let (store, decoder) = fixture(vec![script(0, 10, 2, 2), script(1, 7, 2, 2)]);
    let result = StackReassembler::new(&store, &decoder).assemble().unwrap();

    assert_eq!(result.stack.depth(), 7);
    assert_eq!(result.stack.channels(), 2);
    assert_eq!(
        result.warnings,
        vec![AssemblyWarning::ChannelDepthMismatch {
            channel: "Channel_1".to_string(),
            expected: 10,
            found: 7,
            kept_depth: 7,
            dropped_channels: 0,
        }]
    );
    assert!(result.has_warnings());
    assert_eq!(
        result.stack.frame(6, 1).unwrap().sample(0, 0),
        Some(tag(1, 6, 0, 0))
    );
}

#[test]
fn test_depth_mismatch_stops_at_offending_channel() {
    let (store, decoder) = fixture(vec![
        script(0, 4, 2, 2),
        script(1, 4, 2, 2),
        script(2, 6, 2, 2),
        script(3, 4, 2, 2),
    ]);
    let result = StackReassembler::new(&store, &decoder)
        .with_config(AssemblyConfig::default().with_parallel(false))
        .assemble()
        .unwrap();

    assert_eq!(result.stack.depth(), 4);
    assert_eq!(result.stack.channels(), 3);
    assert_eq!(result.channels.last().unwrap().id, "Channel_2");
    assert!(matches!(
        result.warnings[0],
        AssemblyWarning::ChannelDepthMismatch {
            dropped_channels: 1,
            ..
        }
    ));
    // channel 3 is never decoded on the sequential path
    assert_eq!(decoder.decode_calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_parallel_depth_mismatch_drops_later_channels() {
    let (store, decoder) = fixture(vec![
        script(0, 4, 2, 2),
        script(1, 4, 2, 2),
        script(2, 6, 2, 2),
        script(3, 4, 2, 2),
    ]);
    let result = StackReassembler::new(&store, &decoder)
        .with_config(AssemblyConfig::default().with_threads(2))
        .assemble()
        .unwrap();

    assert_eq!(result.stack.depth(), 4);
    assert_eq!(result.stack.channels(), 3);
    assert_eq!(
        result.warnings,
        vec![AssemblyWarning::ChannelDepthMismatch {
            channel: "Channel_2".to_string(),
            expected: 4,
            found: 6,
            kept_depth: 4,
            dropped_channels: 1,
        }]
    );
    assert_eq!(
        result.stack.frame(3, 2).unwrap().sample(1, 1),
        Some(tag(2, 3, 1, 1))
    );
    // the fan-out decodes every channel before the fold
    assert_eq!(decoder.decode_calls.load(Ordering::SeqCst), 4);
}

#[test]
fn test_depth_mismatch_fail_policy() {
    let (store, decoder) = fixture(vec![script(0, 10, 2, 2), script(1, 7, 2, 2)]);
    let err = StackReassembler::new(&store, &decoder)
        .with_config(AssemblyConfig::default().with_mismatch_policy(MismatchPolicy::Fail))
        .assemble()
        .unwrap_err();
    assert!(matches!(
        err,
        Error::ChannelDepthMismatch {
            expected: 10,
            found: 7,
            ..
        }
    ));
}

#[test]
fn test_missing_calibration_defaults() {
    let (store, decoder) = fixture(vec![script(0, 1, 2, 2)]);
    let result = StackReassembler::new(&store, &decoder).assemble().unwrap();
    for spacing in result.calibration.voxel_spacing {
        assert_relative_eq!(spacing, 1.0);
    }
    assert_eq!(result.calibration.unit, None);
}

#[test]
fn test_calibration_is_attached() {
    let (mut store, decoder) = fixture(vec![script(0, 1, 2, 2)]);
    store
        .set_array_attr(ROOT_PATH, VOXEL_SIZE_ATTR, &[0.5, 0.5, 2.0])
        .set_attr(ROOT_PATH, UNIT_ATTR, AttrValue::Text("um".into()))
        .set_attr(CHANNELS_PATH, SPC_X_ATTR, AttrValue::Float(9.0));

    let result = StackReassembler::new(&store, &decoder).assemble().unwrap();
    assert_relative_eq!(result.calibration.voxel_spacing[0], 0.5);
    assert_relative_eq!(result.calibration.voxel_spacing[1], 0.5);
    assert_relative_eq!(result.calibration.voxel_spacing[2], 2.0);
    assert_eq!(result.calibration.unit.as_deref(), Some("um"));
}

#[test]
fn test_channel_without_frames_is_decode_error() {
    let mut empty = script(1, 0, 2, 2);
    empty.frames.clear();
    let (store, decoder) = fixture(vec![script(0, 2, 2, 2), empty]);
    let err = StackReassembler::new(&store, &decoder).assemble().unwrap_err();
    assert!(matches!(err, Error::Decode { ref channel, .. } if channel == "Channel_1"));
}

#[test]
fn test_unknown_stream_is_decode_error() {
    let (mut store, decoder) = fixture(vec![script(0, 2, 2, 2)]);
    store.set_opaque("/Channels/Channel_1", b"garbage".to_vec());
    let err = StackReassembler::new(&store, &decoder).assemble().unwrap_err();
    assert!(matches!(err, Error::Decode { .. }));
}

#[test]
fn test_missing_channel_group_is_container_error() {
    let store = MemoryStore::new();
    let decoder = ScriptedDecoder::default();
    let err = StackReassembler::new(&store, &decoder).assemble().unwrap_err();
    assert!(matches!(err, Error::Container { .. }));

    let mut store = MemoryStore::new();
    store.add_group(CHANNELS_PATH);
    let err = StackReassembler::new(&store, &decoder).assemble().unwrap_err();
    assert!(matches!(err, Error::Container { .. }));
}

#[test]
fn test_cancelled_before_start() {
    let (store, decoder) = fixture(vec![script(0, 2, 2, 2)]);
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = StackReassembler::new(&store, &decoder)
        .with_cancel(cancel)
        .assemble()
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(decoder.decode_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_cancelled_while_decoding_channel0() {
    let cancel = CancelToken::new();
    let (store, decoder) = fixture(vec![script(0, 6, 2, 2), script(1, 6, 2, 2)]);
    let decoder = decoder.cancel_after("Channel_0", 2, &cancel);
    let err = StackReassembler::new(&store, &decoder)
        .with_cancel(cancel)
        .assemble()
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(decoder.decode_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_cancelled_during_sequential_channels() {
    let cancel = CancelToken::new();
    let (store, decoder) = fixture((0..4).map(|c| script(c, 3, 2, 2)).collect());
    let decoder = decoder.cancel_after("Channel_1", 1, &cancel);
    let err = StackReassembler::new(&store, &decoder)
        .with_config(AssemblyConfig::default().with_parallel(false))
        .with_cancel(cancel)
        .assemble()
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    // channels 2 and 3 are never started
    assert_eq!(decoder.decode_calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_cancelled_during_parallel_fan_out() {
    let cancel = CancelToken::new();
    let (store, decoder) = fixture((0..5).map(|c| script(c, 3, 2, 2)).collect());
    let decoder = decoder.cancel_after("Channel_3", 2, &cancel);
    let err = StackReassembler::new(&store, &decoder)
        .with_config(AssemblyConfig::default().with_threads(2))
        .with_cancel(cancel.clone())
        .assemble()
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(cancel.is_cancelled());
}

#[test]
fn test_larger_later_channel_is_shape_error() {
    let (store, decoder) = fixture(vec![script(0, 2, 4, 3), script(1, 2, 6, 4)]);
    let err = StackReassembler::new(&store, &decoder).assemble().unwrap_err();
    assert!(matches!(
        err,
        Error::FrameShape {
            ref channel,
            expected: (4, 3),
            found: (6, 4),
            ..
        } if channel == "Channel_1"
    ));
    assert!(!err.to_string().contains("smaller"));
}

#[test]
fn test_extract_single_channel() {
    let mut second = script(1, 3, 2, 2);
    second.format = "gray12le";
    second.frames = vec![vec![160; 4]; 3];
    let (store, decoder) = fixture(vec![script(0, 5, 2, 2), second]);

    let result = StackReassembler::new(&store, &decoder)
        .extract_channel("Channel_1")
        .unwrap();
    assert_eq!(result.stack.channels(), 1);
    assert_eq!(result.stack.depth(), 3);
    assert_eq!(result.calibration.bit_depth, BitDepth::Sixteen);
    assert_eq!(
        result.stack.frame(2, 0).unwrap().pixels,
        Pixels::Gray16(vec![10; 4])
    );

    let err = StackReassembler::new(&store, &decoder)
        .extract_channel("Channel_9")
        .unwrap_err();
    assert!(matches!(err, Error::Container { .. }));
}
