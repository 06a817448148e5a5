//! Disk space querying and write admission.
//!
//! The [`SpaceGuard`] is the sole authority on whether a write may
//! proceed. Required bytes are padded with a safety reserve before
//! comparison, and failures always carry the concrete available/required
//! byte counts.

use std::path::Path;

use retrace_common::{RetraceError, RetraceResult};

/// Minimum free space kept in reserve on the storage volume.
pub const DISK_RESERVE_BYTES: u64 = 100 * 1024 * 1024;

/// Free-space snapshot for a storage volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceInfo {
    /// Total volume size in bytes.
    pub total_bytes: u64,

    /// Bytes available to unprivileged writes.
    pub available_bytes: u64,
}

/// Authority on whether a write of a given size may proceed.
///
/// Callers that skip [`SpaceGuard::check`] before a write are defects;
/// the store routes every mutation through it.
pub trait SpaceGuard: Send + Sync {
    /// Query free space for the volume containing `path`. Pure query, no
    /// side effects.
    fn space_info(&self, path: &Path) -> RetraceResult<SpaceInfo>;

    /// Safety reserve padded onto every requirement.
    fn reserve_bytes(&self) -> u64 {
        DISK_RESERVE_BYTES
    }

    /// Check whether `required_bytes` (plus the reserve) fit on the
    /// volume containing `path`.
    ///
    /// Saturating arithmetic keeps very large or erroneous inputs from
    /// overflowing into a false pass.
    fn check(&self, path: &Path, required_bytes: u64) -> RetraceResult<()> {
        let info = self.space_info(path)?;
        let padded = required_bytes.saturating_add(self.reserve_bytes());
        if info.available_bytes < padded {
            return Err(RetraceError::InsufficientSpace {
                available_bytes: info.available_bytes,
                required_bytes: padded,
            });
        }
        Ok(())
    }
}

/// Platform-backed guard using the native free-space syscall.
#[derive(Debug, Clone, Copy)]
pub struct PlatformSpaceGuard {
    reserve_bytes: u64,
}

impl PlatformSpaceGuard {
    pub fn new() -> Self {
        Self {
            reserve_bytes: DISK_RESERVE_BYTES,
        }
    }

    /// Override the safety reserve (e.g. from configuration).
    pub fn with_reserve(reserve_bytes: u64) -> Self {
        Self { reserve_bytes }
    }
}

impl Default for PlatformSpaceGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl SpaceGuard for PlatformSpaceGuard {
    #[cfg(unix)]
    fn space_info(&self, path: &Path) -> RetraceResult<SpaceInfo> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| RetraceError::validation(format!("path contains NUL: {path:?}")))?;

        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if rc != 0 {
            return Err(RetraceError::filesystem(
                path,
                std::io::Error::last_os_error(),
            ));
        }

        let frag_size = stat.f_frsize as u64;
        Ok(SpaceInfo {
            total_bytes: (stat.f_blocks as u64).saturating_mul(frag_size),
            available_bytes: (stat.f_bavail as u64).saturating_mul(frag_size),
        })
    }

    #[cfg(not(unix))]
    fn space_info(&self, _path: &Path) -> RetraceResult<SpaceInfo> {
        Err(RetraceError::unsupported(
            "free-space query is only implemented for unix targets",
        ))
    }

    fn reserve_bytes(&self) -> u64 {
        self.reserve_bytes
    }
}

/// Guard reporting fixed values. Used in tests and dry-run tooling to
/// simulate volumes of arbitrary fullness.
#[derive(Debug, Clone, Copy)]
pub struct FixedSpaceGuard {
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub reserve_bytes: u64,
}

impl FixedSpaceGuard {
    pub fn new(total_bytes: u64, available_bytes: u64) -> Self {
        Self {
            total_bytes,
            available_bytes,
            reserve_bytes: DISK_RESERVE_BYTES,
        }
    }

    pub fn with_reserve(mut self, reserve_bytes: u64) -> Self {
        self.reserve_bytes = reserve_bytes;
        self
    }
}

impl SpaceGuard for FixedSpaceGuard {
    fn space_info(&self, _path: &Path) -> RetraceResult<SpaceInfo> {
        Ok(SpaceInfo {
            total_bytes: self.total_bytes,
            available_bytes: self.available_bytes,
        })
    }

    fn reserve_bytes(&self) -> u64 {
        self.reserve_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn check_with_available(available: u64, required: u64) -> RetraceResult<()> {
        let guard = FixedSpaceGuard::new(u64::MAX, available);
        guard.check(&PathBuf::from("/tmp"), required)
    }

    #[test]
    fn test_threshold_boundaries() {
        let required = 1_000u64;
        let padded = required + DISK_RESERVE_BYTES;

        // one byte short fails
        assert!(matches!(
            check_with_available(padded - 1, required),
            Err(RetraceError::InsufficientSpace { .. })
        ));
        // exactly at the padded requirement succeeds
        assert!(check_with_available(padded, required).is_ok());
        // one byte over succeeds
        assert!(check_with_available(padded + 1, required).is_ok());
    }

    #[test]
    fn test_insufficient_space_reports_padded_requirement() {
        let err = check_with_available(10, 100).unwrap_err();
        match err {
            RetraceError::InsufficientSpace {
                available_bytes,
                required_bytes,
            } => {
                assert_eq!(available_bytes, 10);
                assert_eq!(required_bytes, 100 + DISK_RESERVE_BYTES);
            }
            other => panic!("expected InsufficientSpace, got {other:?}"),
        }
    }

    #[test]
    fn test_padding_saturates_near_u64_max() {
        // u64::MAX required must not wrap around into a false pass
        let err = check_with_available(u64::MAX - 1, u64::MAX).unwrap_err();
        assert!(matches!(err, RetraceError::InsufficientSpace { .. }));
    }

    #[test]
    fn test_custom_reserve_is_honored() {
        let guard = FixedSpaceGuard::new(u64::MAX, 150).with_reserve(100);
        assert!(guard.check(&PathBuf::from("/tmp"), 50).is_ok());
        assert!(guard.check(&PathBuf::from("/tmp"), 51).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_platform_guard_queries_real_volume() {
        let guard = PlatformSpaceGuard::new();
        let info = guard
            .space_info(&std::env::temp_dir())
            .expect("temp dir volume should be queryable");
        assert!(info.total_bytes > 0);
        assert!(info.available_bytes <= info.total_bytes);
    }
}
