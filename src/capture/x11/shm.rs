//! SysV shared-memory guards for MIT-SHM transfers
//!
//! The segment id and the local mapping are separate resources with separate
//! lifetimes: the id is marked for removal as soon as the mapping exists (the
//! kernel frees the memory once the last attachment goes), while the mapping
//! lives inside the returned [`CaptureImage`](crate::capture::CaptureImage)
//! until the caller drops it.

use std::{io, ptr::NonNull, slice};

use crate::capture::image_buffer::MappedPixels;

/// A private SysV segment, removed (`IPC_RMID`) on drop
#[derive(Debug)]
pub struct ShmSegment {
    id:   libc::c_int,
    size: usize,
}

impl ShmSegment {
    /// Allocates a private segment of `size` bytes
    pub fn create(size: usize) -> io::Result<Self> {
        // SAFETY: shmget has no memory-safety preconditions.
        let id = unsafe { libc::shmget(libc::IPC_PRIVATE, size, libc::IPC_CREAT | 0o600) };
        if id < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { id, size })
    }

    /// Kernel id, as sent in `shm_attach`
    pub fn id(&self) -> u32 {
        self.id as u32
    }

    /// Size requested at creation
    pub fn size(&self) -> usize {
        self.size
    }

    /// Maps the segment into this process and marks it for removal.
    ///
    /// The returned mapping keeps the memory alive; the segment id is gone
    /// once this returns, whether or not mapping succeeded.
    pub fn map(self) -> io::Result<ShmMapping> {
        // SAFETY: the id is a live segment owned by this guard.
        let addr = unsafe { libc::shmat(self.id, std::ptr::null(), 0) };
        if addr as isize == -1 {
            return Err(io::Error::last_os_error());
        }
        let ptr = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| io::Error::other("shmat returned null"))?;

        // Dropping self marks the segment for removal.
        Ok(ShmMapping {
            ptr,
            len: self.size,
        })
    }
}

impl Drop for ShmSegment {
    fn drop(&mut self) {
        // SAFETY: the id was returned by shmget and is removed exactly once.
        let rc = unsafe { libc::shmctl(self.id, libc::IPC_RMID, std::ptr::null_mut()) };
        if rc != 0 {
            tracing::warn!(
                "Failed to remove shm segment {}: {}",
                self.id,
                io::Error::last_os_error()
            );
        }
    }
}

/// A segment attached to this process, detached (`shmdt`) on drop
#[derive(Debug)]
pub struct ShmMapping {
    ptr: NonNull<u8>,
    len: usize,
}

impl MappedPixels for ShmMapping {
    fn bytes(&self) -> &[u8] {
        // SAFETY: ptr maps len bytes for the lifetime of self.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above, and &mut self guarantees exclusive access.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for ShmMapping {
    fn drop(&mut self) {
        // SAFETY: ptr came from shmat and is detached exactly once.
        unsafe {
            libc::shmdt(self.ptr.as_ptr().cast::<libc::c_void>());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_round_trip() {
        // Sandboxes without SysV IPC cannot run this
        let Ok(segment) = ShmSegment::create(16) else {
            eprintln!("Skipping: SysV shared memory unavailable");
            return;
        };
        assert_eq!(segment.size(), 16);

        let mut mapping = segment.map().expect("map fresh segment");
        assert_eq!(mapping.bytes().len(), 16);
        assert!(mapping.bytes().iter().all(|b| *b == 0));

        mapping.bytes_mut()[3] = 0xAB;
        assert_eq!(mapping.bytes()[3], 0xAB);
    }
}
