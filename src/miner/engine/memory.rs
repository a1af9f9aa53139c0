// src/miner/engine/memory.rs
//! Scratchpad memory for hash contexts
//!
//! On Linux the scratchpad can be an anonymous `MAP_HUGETLB` mapping,
//! optionally `mlock`ed. Everywhere else, and under the slow-memory policy,
//! it is a plain heap allocation.
#![allow(unsafe_code)]

/// Size of a CryptoNight scratchpad
pub const SCRATCHPAD_SIZE: usize = 2 * 1024 * 1024;

enum Backing {
    Heap(Box<[u8]>),
    #[cfg(target_os = "linux")]
    Mapped {
        ptr: *mut libc::c_void,
        len: usize,
        locked: bool,
    },
}

/// Memory reserved for one hash context
pub struct Scratchpad {
    backing: Backing,
}

// The mapping is owned exclusively by the scratchpad.
unsafe impl Send for Scratchpad {}

impl Scratchpad {
    /// Pageable heap memory
    pub fn heap() -> Self {
        Scratchpad {
            backing: Backing::Heap(vec![0u8; SCRATCHPAD_SIZE].into_boxed_slice()),
        }
    }

    /// Large-page memory, locked into RAM when `lock` is set
    ///
    /// Returns the scratchpad and a warning if locking failed.
    #[cfg(target_os = "linux")]
    pub fn large_pages(lock: bool) -> Result<(Self, Option<String>), String> {
        let len = SCRATCHPAD_SIZE;
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_HUGETLB | libc::MAP_POPULATE,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(format!(
                "mmap failed: {}",
                std::io::Error::last_os_error()
            ));
        }

        let mut warning = None;
        let mut locked = false;
        if lock {
            if unsafe { libc::mlock(ptr, len) } == 0 {
                locked = true;
            } else {
                warning = Some(format!(
                    "mlock failed: {}",
                    std::io::Error::last_os_error()
                ));
            }
        }

        Ok((
            Scratchpad {
                backing: Backing::Mapped { ptr, len, locked },
            },
            warning,
        ))
    }

    /// Large pages are only mapped on Linux
    #[cfg(not(target_os = "linux"))]
    pub fn large_pages(_lock: bool) -> Result<(Self, Option<String>), String> {
        Err("large pages are not supported on this platform".into())
    }

    /// Whether the scratchpad lives in large pages
    pub fn is_large_pages(&self) -> bool {
        match self.backing {
            Backing::Heap(_) => false,
            #[cfg(target_os = "linux")]
            Backing::Mapped { .. } => true,
        }
    }

    /// Whether the scratchpad is locked into RAM
    pub fn is_locked(&self) -> bool {
        match self.backing {
            Backing::Heap(_) => false,
            #[cfg(target_os = "linux")]
            Backing::Mapped { locked, .. } => locked,
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        match &self.backing {
            Backing::Heap(buf) => buf.len(),
            #[cfg(target_os = "linux")]
            Backing::Mapped { len, .. } => *len,
        }
    }
}

impl Drop for Scratchpad {
    fn drop(&mut self) {
        #[cfg(target_os = "linux")]
        if let Backing::Mapped { ptr, len, locked } = self.backing {
            unsafe {
                if locked {
                    libc::munlock(ptr, len);
                }
                libc::munmap(ptr, len);
            }
        }
    }
}
