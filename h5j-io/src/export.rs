//! Reassembled stack export to plain HDF5.
//!
//! Layout: `/stack/data` holds the channel-fastest view as a 4-D dataset
//! `(z, c, y, x)` of `u8` or `u16` samples. The `stack` group carries
//! `axes`, `spacing` (x, y, z), `unit`, `bit_depth`, `pixel_format` and
//! `channels` attributes.

use crate::{Error, Result};
use h5j_core::{BitDepth, CalibrationMetadata, Frame, Pixels, Stack};
use h5j_stack::AssembledStack;
use hdf5::types::{H5Type, VarLenUnicode};
use hdf5::{Dataset, File, Group};
use ndarray::{ArrayView, ArrayView1};
use std::path::Path;
use std::str::FromStr;

const EXPORT_FORMAT_VERSION: &str = "0.1";
const STACK_GROUP: &str = "stack";
const STACK_DATASET: &str = "data";
const STACK_AXES: [&str; 4] = ["z", "c", "y", "x"];

/// Stack export configuration.
#[derive(Clone, Debug)]
pub struct StackWriteOptions {
    /// Deflate level. Any filter switches the dataset to one chunk per frame.
    pub compression: Option<u8>,
    pub shuffle: bool,
}

impl Default for StackWriteOptions {
    fn default() -> Self {
        Self {
            compression: Some(1),
            shuffle: true,
        }
    }
}

/// A stack read back from an export file.
#[derive(Clone, Debug)]
pub struct StoredStack {
    pub stack: Stack,
    /// Spacing, unit and bit depth. Padding is always zero after export.
    pub calibration: CalibrationMetadata,
    pub pixel_format: Option<String>,
    /// Channel ids in stack order.
    pub channels: Vec<String>,
}

/// Writes an assembled stack to a new HDF5 file.
///
/// # Errors
/// Returns an error if the stack is empty or HDF5 I/O fails.
pub fn write_stack_hdf5<P: AsRef<Path>>(
    path: P,
    assembled: &AssembledStack,
    options: &StackWriteOptions,
) -> Result<()> {
    let stack = &assembled.stack;
    if stack.is_empty() {
        return Err(Error::InvalidFormat("cannot export an empty stack".to_string()));
    }

    let file = File::create(path)?;
    set_attr_str_file(&file, "h5j_export_version", EXPORT_FORMAT_VERSION)?;

    let group = file.create_group(STACK_GROUP)?;
    set_str_array_attr(&group, "axes", &STACK_AXES)?;
    group
        .new_attr::<f64>()
        .shape((3,))
        .create("spacing")?
        .write(ArrayView1::from(&assembled.calibration.voxel_spacing[..]))?;
    if let Some(unit) = &assembled.calibration.unit {
        set_attr_str_group(&group, "unit", unit)?;
    }
    group
        .new_attr::<u32>()
        .create("bit_depth")?
        .write_scalar(&stack.bit_depth().bits())?;
    set_attr_str_group(&group, "pixel_format", assembled.pixel_format.as_str())?;
    let channel_ids: Vec<&str> = assembled.channels.iter().map(|c| c.id.as_str()).collect();
    set_str_array_attr(&group, "channels", &channel_ids)?;

    let shape = (stack.depth(), stack.channels(), stack.height(), stack.width());
    let chunk = (options.compression.is_some() || options.shuffle)
        .then_some([1, 1, stack.height(), stack.width()]);
    let samples = stack.to_view_samples();
    match stack.bit_depth() {
        BitDepth::Eight => {
            let narrow: Vec<u8> = samples
                .into_iter()
                .map(|s| u8::try_from(s).unwrap_or(u8::MAX))
                .collect();
            write_samples(&group, shape, chunk, options, &narrow)?;
        }
        BitDepth::Sixteen => write_samples(&group, shape, chunk, options, &samples)?,
    }

    log::info!(
        "exported {} channel(s) x {} slices of {}x{}",
        stack.channels(),
        stack.depth(),
        stack.width(),
        stack.height()
    );
    Ok(())
}

/// Reads a stack written by [`write_stack_hdf5`].
///
/// # Errors
/// Returns an error if HDF5 I/O fails or the layout is not a stack export.
pub fn read_stack_hdf5<P: AsRef<Path>>(path: P) -> Result<StoredStack> {
    let file = File::open(path)?;
    let group = file.group(STACK_GROUP)?;
    let dataset = group.dataset(STACK_DATASET)?;

    let [depth, channels, height, width] = <[usize; 4]>::try_from(dataset.shape())
        .map_err(|_| {
            Error::InvalidFormat("stack dataset must be 4-D (z, c, y, x)".to_string())
        })?;
    let bit_depth = match read_attr_opt::<u32>(&group, "bit_depth")? {
        Some(8) => BitDepth::Eight,
        Some(16) => BitDepth::Sixteen,
        other => {
            return Err(Error::InvalidFormat(format!(
                "unsupported bit_depth attribute: {other:?}"
            )))
        }
    };

    let samples: Vec<u16> = match bit_depth {
        BitDepth::Eight => dataset
            .read_raw::<u8>()?
            .into_iter()
            .map(u16::from)
            .collect(),
        BitDepth::Sixteen => dataset.read_raw::<u16>()?,
    };
    let plane = width * height;
    if samples.len() != depth * channels * plane {
        return Err(Error::InvalidFormat(
            "stack dataset size does not match shape".to_string(),
        ));
    }

    let names = read_attr_opt_strings(&group, "channels")?.unwrap_or_default();
    let per_channel = (0..channels)
        .map(|c| {
            let id = names.get(c).cloned().unwrap_or_else(|| c.to_string());
            let frames = (0..depth)
                .map(|z| {
                    let start = (z * channels + c) * plane;
                    frame_from_samples(width, height, bit_depth, &samples[start..start + plane])
                })
                .collect();
            (id, frames)
        })
        .collect();
    let stack = Stack::from_channels(per_channel, bit_depth)?;

    let mut voxel_spacing = [1.0; 3];
    if let Some(values) = read_attr_array_opt::<f64>(&group, "spacing")? {
        for (slot, value) in voxel_spacing.iter_mut().zip(values) {
            *slot = value;
        }
    }

    Ok(StoredStack {
        stack,
        calibration: CalibrationMetadata {
            voxel_spacing,
            unit: read_attr_opt_string(&group, "unit")?,
            bit_depth,
            ..CalibrationMetadata::default()
        },
        pixel_format: read_attr_opt_string(&group, "pixel_format")?,
        channels: names,
    })
}

fn frame_from_samples(width: usize, height: usize, depth: BitDepth, samples: &[u16]) -> Frame {
    let pixels = match depth {
        BitDepth::Eight => Pixels::Gray8(
            samples
                .iter()
                .map(|&s| u8::try_from(s).unwrap_or(u8::MAX))
                .collect(),
        ),
        BitDepth::Sixteen => Pixels::Gray16(samples.to_vec()),
    };
    Frame {
        width,
        height,
        pixels,
    }
}

fn write_samples<T: H5Type>(
    group: &Group,
    shape: (usize, usize, usize, usize),
    chunk: Option<[usize; 4]>,
    options: &StackWriteOptions,
    samples: &[T],
) -> Result<()> {
    let dataset = create_fixed_dataset::<T, _>(
        group,
        STACK_DATASET,
        shape,
        chunk,
        options.compression,
        options.shuffle,
    )?;
    let view = ArrayView::from_shape(shape, samples)
        .map_err(|e| Error::InvalidFormat(format!("stack shape mismatch: {e}")))?;
    dataset.write(view)?;
    Ok(())
}

fn create_fixed_dataset<T: H5Type, S>(
    group: &Group,
    name: &str,
    shape: S,
    chunk: Option<[usize; 4]>,
    compression: Option<u8>,
    shuffle: bool,
) -> Result<Dataset>
where
    S: Into<hdf5::Extents>,
{
    let mut builder = group.new_dataset::<T>().shape(shape);

    if let Some(chunk_shape) = chunk {
        builder = builder.chunk(chunk_shape);
    }

    if let Some(level) = compression {
        builder = builder.deflate(level);
    }

    if shuffle {
        builder = builder.shuffle();
    }

    Ok(builder.create(name)?)
}

fn set_str_array_attr(group: &Group, name: &str, values: &[&str]) -> Result<()> {
    let values: Vec<VarLenUnicode> = values
        .iter()
        .map(|value| to_var_len_unicode(value))
        .collect::<Result<Vec<_>>>()?;
    let attr = group
        .new_attr::<VarLenUnicode>()
        .shape((values.len(),))
        .create(name)?;
    attr.write(ArrayView1::from(values.as_slice()))?;
    Ok(())
}

fn set_attr_str_file(file: &File, name: &str, value: &str) -> Result<()> {
    let value = to_var_len_unicode(value)?;
    file.new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn set_attr_str_group(group: &Group, name: &str, value: &str) -> Result<()> {
    let value = to_var_len_unicode(value)?;
    group
        .new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn read_attr_opt<T: H5Type + Clone>(group: &Group, name: &str) -> Result<Option<T>> {
    match group.attr(name) {
        Ok(attr) => Ok(Some(attr.read_scalar::<T>()?)),
        Err(_) => Ok(None),
    }
}

fn read_attr_array_opt<T: H5Type>(group: &Group, name: &str) -> Result<Option<Vec<T>>> {
    match group.attr(name) {
        Ok(attr) => Ok(Some(attr.read_raw::<T>()?)),
        Err(_) => Ok(None),
    }
}

fn read_attr_opt_string(group: &Group, name: &str) -> Result<Option<String>> {
    match group.attr(name) {
        Ok(attr) => {
            let value: VarLenUnicode = attr.read_scalar()?;
            Ok(Some(value.to_string()))
        }
        Err(_) => Ok(None),
    }
}

fn read_attr_opt_strings(group: &Group, name: &str) -> Result<Option<Vec<String>>> {
    Ok(read_attr_array_opt::<VarLenUnicode>(group, name)?
        .map(|values| values.iter().map(ToString::to_string).collect()))
}

fn to_var_len_unicode(value: &str) -> Result<VarLenUnicode> {
    VarLenUnicode::from_str(value)
        .map_err(|e| Error::InvalidFormat(format!("invalid utf-8 attribute: {e}")))
}
