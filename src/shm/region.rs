//! POSIX named shared memory: create, resolve, unlink.

use std::fs::File;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use memmap2::MmapOptions;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{shm_open, shm_unlink};
use nix::sys::stat::Mode;
use nix::unistd::ftruncate;
use tracing::trace;

use super::descriptor::byte_len;
use super::{tracker, Element, ElementType, SharedArray, SharedBufferDescriptor};
use crate::error::ShmError;

const NAME_PREFIX: &str = "/mc";
const CREATE_ATTEMPTS: usize = 8;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Short enough for platforms that cap names at 31 bytes.
fn unique_name() -> String {
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default()
        & 0xffff;
    format!("{}_{:x}_{:x}_{:04x}", NAME_PREFIX, std::process::id(), seq, nonce)
}

fn not_found(name: &str) -> impl FnOnce(Errno) -> ShmError + '_ {
    move |errno| match errno {
        Errno::ENOENT => ShmError::RegionNotFound {
            name: name.to_owned(),
        },
        other => ShmError::Os(other),
    }
}

/// Create a fresh named region, copy `data` into it and return its descriptor.
///
/// The region stays live after this returns. Whoever next resolves the
/// descriptor owns it and must eventually [`release`] it.
pub fn allocate_and_publish(
    data: &[u8],
    shape: &[usize],
    element_type: ElementType,
) -> Result<SharedBufferDescriptor, ShmError> {
    let size = byte_len(shape, element_type)?;
    if data.len() != size {
        return Err(ShmError::SizeMismatch {
            name: String::from("<unallocated>"),
            expected: size,
            actual: data.len(),
        });
    }

    let mut last_name = String::new();
    for _ in 0..CREATE_ATTEMPTS {
        let name = unique_name();
        let fd = match shm_open(
            name.as_str(),
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            Mode::S_IRUSR | Mode::S_IWUSR,
        ) {
            Ok(fd) => fd,
            Err(Errno::EEXIST) => {
                last_name = name;
                continue;
            }
            Err(errno) => return Err(errno.into()),
        };

        let file = File::from(fd);
        if let Err(err) = write_region(&file, data) {
            let _ = shm_unlink(name.as_str());
            return Err(err);
        }

        tracker::register(&name);
        trace!(region = %name, bytes = size, "published region");
        return Ok(SharedBufferDescriptor::new(
            name,
            element_type,
            shape.to_vec(),
        ));
    }

    Err(ShmError::RegionExists { name: last_name })
}

/// Typed front end for [`allocate_and_publish`].
pub fn publish<T: Element>(data: &[T], shape: &[usize]) -> Result<SharedBufferDescriptor, ShmError> {
    allocate_and_publish(bytemuck::cast_slice(data), shape, T::TYPE)
}

fn write_region(file: &File, data: &[u8]) -> Result<(), ShmError> {
    let len = libc::off_t::try_from(data.len()).map_err(|_| ShmError::InvalidShape {
        shape: vec![data.len()],
    })?;
    ftruncate(file, len)?;

    // SAFETY: the region was created exclusively by this call and nothing
    // else maps it until the descriptor is handed out.
    let mut map = unsafe { MmapOptions::new().len(data.len()).map_mut(file)? };
    map.copy_from_slice(data);
    Ok(())
}

/// Open the region behind `descriptor` and copy its contents into local memory.
///
/// The mapping and file handle are closed before returning; the region itself
/// is left alone.
pub fn resolve_and_copy(descriptor: &SharedBufferDescriptor) -> Result<SharedArray, ShmError> {
    let name = descriptor.name();
    let expected = descriptor.size_bytes()?;

    let fd = shm_open(name, OFlag::O_RDONLY, Mode::empty()).map_err(not_found(name))?;
    let file = File::from(fd);

    // Some platforms round the object up to a page, so only a short region is an error.
    let actual = usize::try_from(file.metadata()?.len()).unwrap_or(usize::MAX);
    if actual < expected {
        return Err(ShmError::SizeMismatch {
            name: name.to_owned(),
            expected,
            actual,
        });
    }

    // SAFETY: the producer finished writing before the descriptor was shared,
    // and nothing writes to a region after publication.
    let map = unsafe { MmapOptions::new().len(expected).map(&file)? };
    let bytes = map.to_vec();

    Ok(SharedArray::new(
        descriptor.element_type(),
        descriptor.shape().to_vec(),
        bytes,
    ))
}

/// Unlink the region, destroying it. Consumes the descriptor.
///
/// Exactly one process releases a given region, after every resolve of it
/// has completed.
pub fn release(descriptor: SharedBufferDescriptor) -> Result<(), ShmError> {
    unlink_name(descriptor.name())?;
    metrics::counter!("multicam_regions_released").increment(1);
    Ok(())
}

pub(crate) fn unlink_name(name: &str) -> Result<(), ShmError> {
    tracker::forget(name);
    shm_unlink(name).map_err(not_found(name))?;
    trace!(region = %name, "unlinked region");
    Ok(())
}

/// Whether a region with this name currently exists.
pub fn region_exists(name: &str) -> bool {
    shm_open(name, OFlag::O_RDONLY, Mode::empty()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique_and_short() {
        let a = unique_name();
        let b = unique_name();
        assert_ne!(a, b);
        assert!(a.starts_with("/mc_"));
        assert!(a.len() <= 31, "{a} too long");
    }

    #[test]
    fn publish_resolve_release() {
        let data: Vec<u16> = (0..12).collect();
        let desc = publish(&data, &[3, 4]).unwrap();
        let name = desc.name().to_owned();
        assert!(region_exists(&name));
        assert!(tracker::is_tracked(&name));

        let array = resolve_and_copy(&desc).unwrap();
        assert_eq!(array.to_vec::<u16>().unwrap(), data);
        // Resolving does not unlink.
        assert!(region_exists(&name));

        release(desc).unwrap();
        assert!(!region_exists(&name));
        assert!(!tracker::is_tracked(&name));
    }

    #[test]
    fn payload_must_match_shape() {
        let err = allocate_and_publish(&[0u8; 10], &[2, 2, 3], ElementType::U8).unwrap_err();
        assert!(matches!(
            err,
            ShmError::SizeMismatch {
                expected: 12,
                actual: 10,
                ..
            }
        ));
    }

    #[test]
    fn unlinking_twice_reports_not_found() {
        let desc = publish(&[1u8, 2, 3], &[3]).unwrap();
        let name = desc.name().to_owned();
        release(desc).unwrap();
        assert!(unlink_name(&name).unwrap_err().is_region_not_found());
    }
}
