//! HDF5-backed [`ContainerStore`].

use crate::Result;
use h5j_core::{AttrValue, ContainerStore, ROOT_PATH};
use hdf5::types::{FixedAscii, FixedUnicode, TypeDescriptor, VarLenAscii, VarLenUnicode};
use hdf5::sys::h5d::H5Dread;
use hdf5::sys::h5p::H5P_DEFAULT;
use hdf5::sys::h5s::H5S_ALL;
use hdf5::{Attribute, Dataset, File, Group};
use memmap2::Mmap;
use std::path::{Path, PathBuf};

/// Longest fixed-length string attribute read without truncation.
const FIXED_STRING_CAPACITY: usize = 1024;

/// [`ContainerStore`] over an HDF5 file on disk.
///
/// One HDF5 handle stays open for the store's lifetime; groups and
/// attributes are resolved through it. Contiguous channel payloads are
/// sliced straight out of a read-only mapping of the file; other layouts are
/// read through HDF5 in the dataset's own element type.
pub struct Hdf5Store {
    path: PathBuf,
    file: File,
    mmap: Mmap,
}

impl Hdf5Store {
    /// Opens an HDF5 file for reading.
    ///
    /// # Errors
    /// Returns an error if the file is not readable HDF5 or cannot be mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let raw = std::fs::File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&raw)? };
        Ok(Self { path, file, mmap })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `f` on attribute `name` of the group at `path`, if both exist.
    fn with_attribute<T>(
        &self,
        path: &str,
        name: &str,
        f: impl FnOnce(&Attribute) -> h5j_core::Result<T>,
    ) -> h5j_core::Result<Option<T>> {
        let Some(group) = open_group(&self.file, path)? else {
            return Ok(None);
        };
        let names = group.attr_names().map_err(|e| container_error(path, &e))?;
        if !names.iter().any(|n| n == name) {
            return Ok(None);
        }
        let attr = group.attr(name).map_err(|e| container_error(path, &e))?;
        f(&attr).map(Some)
    }
}

impl std::fmt::Debug for Hdf5Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hdf5Store")
            .field("path", &self.path)
            .field("len", &self.mmap.len())
            .finish()
    }
}

impl ContainerStore for Hdf5Store {
    fn has_attribute(&self, path: &str, name: &str) -> h5j_core::Result<bool> {
        Ok(self.with_attribute(path, name, |_| Ok(()))?.is_some())
    }

    fn read_scalar(&self, path: &str, name: &str) -> h5j_core::Result<Option<AttrValue>> {
        self.with_attribute(path, name, |attr| scalar_value(path, name, attr))
    }

    fn read_array(&self, path: &str, name: &str) -> h5j_core::Result<Option<Vec<f64>>> {
        self.with_attribute(path, name, |attr| match descriptor(path, name, attr)? {
            TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) | TypeDescriptor::Float(_) => {
                attr.read_raw::<f64>()
                    .map_err(|e| attribute_error(path, name, &e))
            }
            other => Err(h5j_core::Error::container(
                path,
                format!("attribute {name} is not numeric ({other:?})"),
            )),
        })
    }

    fn list_group_members(&self, path: &str) -> h5j_core::Result<Vec<String>> {
        let group = open_group(&self.file, path)?
            .ok_or_else(|| h5j_core::Error::container(path, "no such group"))?;
        group.member_names().map_err(|e| container_error(path, &e))
    }

    fn read_opaque(&self, path: &str) -> h5j_core::Result<Vec<u8>> {
        let dataset = self.file.dataset(path).map_err(|e| container_error(path, &e))?;

        if let Some(offset) = dataset.offset() {
            let start = usize::try_from(offset).map_err(|_| {
                h5j_core::Error::container(path, "payload offset exceeds address space")
            })?;
            let len = usize::try_from(dataset.storage_size())
                .map_err(|_| h5j_core::Error::container(path, "payload exceeds address space"))?;
            let end = start
                .checked_add(len)
                .filter(|&end| end <= self.mmap.len())
                .ok_or_else(|| {
                    h5j_core::Error::container(path, "payload extends past end of file")
                })?;
            return Ok(self.mmap[start..end].to_vec());
        }

        log::debug!("{path}: payload is not contiguous, reading through HDF5");
        read_bytes(&dataset).map_err(|e| container_error(path, &e))
    }
}

/// Reads every element of `dataset` as raw bytes of its file type.
///
/// Channel streams are stored as opaque elements, which have no conversion
/// to any numeric type, so the dataset's own type is used as memory type.
#[allow(unsafe_code)]
fn read_bytes(dataset: &Dataset) -> hdf5::Result<Vec<u8>> {
    let dtype = dataset.dtype()?;
    let mut buf = vec![0u8; dataset.size() * dtype.size()];
    if buf.is_empty() {
        return Ok(buf);
    }
    // SAFETY: `buf` holds exactly `size * element size` bytes, which is what
    // H5Dread writes for the full selection in the file type.
    hdf5::h5call!(H5Dread(
        dataset.id(),
        dtype.id(),
        H5S_ALL,
        H5S_ALL,
        H5P_DEFAULT,
        buf.as_mut_ptr().cast()
    ))?;
    Ok(buf)
}

/// Group at `path`, or `None` if nothing is linked there.
fn open_group(file: &File, path: &str) -> h5j_core::Result<Option<Group>> {
    if path != ROOT_PATH && !file.link_exists(path) {
        return Ok(None);
    }
    file.group(path)
        .map(Some)
        .map_err(|e| container_error(path, &e))
}

fn descriptor(path: &str, name: &str, attr: &Attribute) -> h5j_core::Result<TypeDescriptor> {
    attr.dtype()
        .and_then(|dtype| dtype.to_descriptor())
        .map_err(|e| attribute_error(path, name, &e))
}

fn scalar_value(path: &str, name: &str, attr: &Attribute) -> h5j_core::Result<AttrValue> {
    if attr.size() != 1 {
        return Err(h5j_core::Error::container(
            path,
            format!("attribute {name} has {} elements, not a scalar", attr.size()),
        ));
    }
    let err = |e: hdf5::Error| attribute_error(path, name, &e);

    let value = match descriptor(path, name, attr)? {
        TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) => {
            AttrValue::Int(single(path, name, attr.read_raw::<i64>().map_err(err)?)?)
        }
        TypeDescriptor::Float(_) => {
            AttrValue::Float(single(path, name, attr.read_raw::<f64>().map_err(err)?)?)
        }
        TypeDescriptor::VarLenUnicode => {
            let value = single(path, name, attr.read_raw::<VarLenUnicode>().map_err(err)?)?;
            AttrValue::Text(value.as_str().to_string())
        }
        TypeDescriptor::VarLenAscii => {
            let value = single(path, name, attr.read_raw::<VarLenAscii>().map_err(err)?)?;
            AttrValue::Text(value.as_str().to_string())
        }
        TypeDescriptor::FixedAscii(_) => {
            let value = single(
                path,
                name,
                attr.read_raw::<FixedAscii<FIXED_STRING_CAPACITY>>()
                    .map_err(err)?,
            )?;
            AttrValue::Text(value.as_str().trim_end_matches('\0').to_string())
        }
        TypeDescriptor::FixedUnicode(_) => {
            let value = single(
                path,
                name,
                attr.read_raw::<FixedUnicode<FIXED_STRING_CAPACITY>>()
                    .map_err(err)?,
            )?;
            AttrValue::Text(value.as_str().trim_end_matches('\0').to_string())
        }
        other => {
            return Err(h5j_core::Error::container(
                path,
                format!("attribute {name} has unsupported type {other:?}"),
            ))
        }
    };
    Ok(value)
}

fn single<T>(path: &str, name: &str, values: Vec<T>) -> h5j_core::Result<T> {
    values
        .into_iter()
        .next()
        .ok_or_else(|| h5j_core::Error::container(path, format!("attribute {name} is empty")))
}

fn container_error(path: &str, err: &hdf5::Error) -> h5j_core::Error {
    h5j_core::Error::container(path, err.to_string())
}

fn attribute_error(path: &str, name: &str, err: &hdf5::Error) -> h5j_core::Error {
    h5j_core::Error::container(path, format!("attribute {name}: {err}"))
}
