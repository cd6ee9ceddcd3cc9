//! Named POSIX shared memory regions and exclusive claim tokens.
//!
//! - [`SharedRegion::create`] makes a new named region (fails if the name
//!   exists) and unlinks the name on drop.
//! - [`SharedRegion::open`] maps an existing region and only unmaps on drop.
//! - [`ClaimToken::try_acquire`] takes an exclusive `flock` on an empty
//!   named object. The kernel drops the lock when the holder closes it or
//!   exits, so a crashed holder never keeps the claim.
//!
//! Names are the derived channel names; the leading `/` POSIX requires is
//! added here.

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::ptr::NonNull;

const MODE: libc::mode_t = 0o600;

fn posix_name(name: &str) -> io::Result<CString> {
    if name.contains('/') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("shared memory name {:?} contains '/'", name),
        ));
    }
    CString::new(format!("/{}", name))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

fn shm_open(name: &CString, flags: libc::c_int) -> io::Result<OwnedFd> {
    // SAFETY: name is a valid NUL-terminated string.
    let fd = unsafe { libc::shm_open(name.as_ptr(), flags, MODE) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: fd was just returned by shm_open and is owned by nobody else.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn shm_unlink(name: &CString) {
    // SAFETY: name is a valid NUL-terminated string.
    unsafe {
        libc::shm_unlink(name.as_ptr());
    }
}

fn map(fd: &OwnedFd, len: usize) -> io::Result<NonNull<u8>> {
    // SAFETY: mapping a shared object we hold an fd for; the kernel picks the
    // address.
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd.as_raw_fd(),
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    NonNull::new(ptr.cast::<u8>()).ok_or_else(|| io::Error::other("mmap returned null"))
}

/// A mapped, named shared memory region.
pub(crate) struct SharedRegion {
    ptr: NonNull<u8>,
    len: usize,
    name: CString,
    owns_name: bool,
}

impl SharedRegion {
    /// Creates a new zero-filled region. Fails with `AlreadyExists` if the
    /// name is taken.
    pub(crate) fn create(name: &str, len: usize) -> io::Result<Self> {
        if len == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "size must be > 0"));
        }
        let cname = posix_name(name)?;
        let fd = shm_open(&cname, libc::O_CREAT | libc::O_EXCL | libc::O_RDWR)?;

        let mapped = (|| {
            // SAFETY: fd is a valid shared memory object descriptor.
            if unsafe { libc::ftruncate(fd.as_raw_fd(), len as libc::off_t) } != 0 {
                return Err(io::Error::last_os_error());
            }
            map(&fd, len)
        })();

        match mapped {
            Ok(ptr) => Ok(Self {
                ptr,
                len,
                name: cname,
                owns_name: true,
            }),
            Err(e) => {
                shm_unlink(&cname);
                Err(e)
            }
        }
    }

    /// Maps an existing region. Fails with `NotFound` if nobody created it,
    /// or `InvalidData` if its size is not exactly `len` (the two ends
    /// disagree on capacity).
    pub(crate) fn open(name: &str, len: usize) -> io::Result<Self> {
        let cname = posix_name(name)?;
        let fd = shm_open(&cname, libc::O_RDWR)?;

        // SAFETY: zeroed stat is a valid out-parameter for fstat.
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        // SAFETY: fd is valid; st is a properly sized buffer.
        if unsafe { libc::fstat(fd.as_raw_fd(), &mut st) } != 0 {
            return Err(io::Error::last_os_error());
        }
        if st.st_size as u64 != len as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "region {} is {} bytes, expected {}",
                    name, st.st_size, len
                ),
            ));
        }

        Ok(Self {
            ptr: map(&fd, len)?,
            len,
            name: cname,
            owns_name: false,
        })
    }

    /// Base address of the mapping.
    #[inline]
    pub(crate) fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Size of the mapping in bytes.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        // SAFETY: ptr/len describe a mapping created by map() and not yet
        // unmapped.
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), self.len);
        }
        if self.owns_name {
            shm_unlink(&self.name);
        }
    }
}

// SAFETY: the mapping stays valid for the lifetime of SharedRegion and the
// memory is designed to be shared; access discipline lives in the users.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

/// Exclusive cross-process claim on a name, released on drop or when the
/// holding process exits.
///
/// The name itself outlives the claim; [`ClaimToken::remove`] deletes it.
#[derive(Debug)]
pub(crate) struct ClaimToken {
    _fd: OwnedFd,
}

impl ClaimToken {
    /// Tries to lock `name`, creating it if needed.
    ///
    /// Returns `Ok(None)` if another holder already owns it.
    pub(crate) fn try_acquire(name: &str) -> io::Result<Option<Self>> {
        let cname = posix_name(name)?;
        let fd = shm_open(&cname, libc::O_CREAT | libc::O_RDWR)?;
        // SAFETY: fd is a valid descriptor owned by this function.
        if unsafe { libc::flock(fd.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } != 0 {
            let e = io::Error::last_os_error();
            return match e.kind() {
                io::ErrorKind::WouldBlock => Ok(None),
                _ => Err(e),
            };
        }
        Ok(Some(Self { _fd: fd }))
    }

    /// Deletes the name. Holders of the old object keep their lock, but new
    /// claims on `name` no longer see it.
    pub(crate) fn remove(name: &str) {
        if let Ok(cname) = posix_name(name) {
            shm_unlink(&cname);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChannelId;

    #[test]
    fn test_create_and_open_share_memory() {
        let name = ChannelId::random().region_name();
        let created = SharedRegion::create(&name, 4096).unwrap();
        assert_eq!(created.len(), 4096);

        let opened = SharedRegion::open(&name, 4096).unwrap();
        unsafe {
            created.as_ptr().as_ptr().write(0x42);
            assert_eq!(opened.as_ptr().as_ptr().read(), 0x42);
        }
    }

    #[test]
    fn test_create_is_exclusive() {
        let name = ChannelId::random().region_name();
        let _first = SharedRegion::create(&name, 64).unwrap();
        let second = SharedRegion::create(&name, 64);
        assert_eq!(second.err().map(|e| e.kind()), Some(io::ErrorKind::AlreadyExists));
    }

    #[test]
    fn test_open_missing_fails() {
        let name = ChannelId::random().region_name();
        let opened = SharedRegion::open(&name, 64);
        assert_eq!(opened.err().map(|e| e.kind()), Some(io::ErrorKind::NotFound));
    }

    #[test]
    fn test_open_size_mismatch_fails() {
        let name = ChannelId::random().region_name();
        let _created = SharedRegion::create(&name, 64).unwrap();
        for len in [32, 128] {
            let opened = SharedRegion::open(&name, len);
            assert_eq!(opened.err().map(|e| e.kind()), Some(io::ErrorKind::InvalidData));
        }
    }

    #[test]
    fn test_creator_unlinks_on_drop() {
        let name = ChannelId::random().region_name();
        {
            let _created = SharedRegion::create(&name, 64).unwrap();
        }
        assert!(SharedRegion::open(&name, 64).is_err());
        // Name is free again
        let _again = SharedRegion::create(&name, 64).unwrap();
    }

    #[test]
    fn test_opener_does_not_unlink() {
        let name = ChannelId::random().region_name();
        let _created = SharedRegion::create(&name, 64).unwrap();
        {
            let _opened = SharedRegion::open(&name, 64).unwrap();
        }
        assert!(SharedRegion::open(&name, 64).is_ok());
    }

    #[test]
    fn test_claim_token_exclusive_until_dropped() {
        let name = ChannelId::random().claim_token_name(0);
        let first = ClaimToken::try_acquire(&name).unwrap();
        assert!(first.is_some());
        assert!(ClaimToken::try_acquire(&name).unwrap().is_none());

        drop(first);
        assert!(ClaimToken::try_acquire(&name).unwrap().is_some());
        ClaimToken::remove(&name);
    }

    #[test]
    fn test_claim_token_remove_starts_fresh_generation() {
        let name = ChannelId::random().claim_token_name(0);
        let stale = ClaimToken::try_acquire(&name).unwrap().unwrap();
        // A holder that never releases, as if it hung.
        std::mem::forget(stale);
        assert!(ClaimToken::try_acquire(&name).unwrap().is_none());

        ClaimToken::remove(&name);
        let fresh = ClaimToken::try_acquire(&name).unwrap();
        assert!(fresh.is_some());
        ClaimToken::remove(&name);
    }

    #[test]
    fn test_name_with_slash_rejected() {
        assert_eq!(
            SharedRegion::create("a/b", 64).err().map(|e| e.kind()),
            Some(io::ErrorKind::InvalidInput)
        );
    }
}
