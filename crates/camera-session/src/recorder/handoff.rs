//! Moving a finished recording from the temp file to its destination

use std::fs::{self, File};
use std::io;
use std::path::Path;

use tracing::{debug, info};

use crate::error::RecordingError;

/// Advisory exclusive lock held for the lifetime of the guard
struct ExclusiveLock<'a> {
    #[cfg_attr(not(unix), allow(dead_code))]
    file: &'a File,
}

impl<'a> ExclusiveLock<'a> {
    #[cfg(unix)]
    fn acquire(file: &'a File) -> io::Result<Self> {
        use std::os::unix::io::AsRawFd;

        // SAFETY: the descriptor belongs to `file`, which outlives the guard
        let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { file })
    }

    #[cfg(not(unix))]
    fn acquire(file: &'a File) -> io::Result<Self> {
        Ok(Self { file })
    }
}

impl Drop for ExclusiveLock<'_> {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            // SAFETY: see `acquire`
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
    }
}

/// Copy the recording at `temp` over `dest`, then remove `temp`.
///
/// A missing or empty temp file is an error and leaves `dest` untouched.
pub fn hand_off(temp: &Path, dest: &Path) -> Result<(), RecordingError> {
    let metadata =
        fs::metadata(temp).map_err(|_| RecordingError::MissingTempFile(temp.to_path_buf()))?;
    if metadata.len() == 0 {
        return Err(RecordingError::EmptyTempFile(temp.to_path_buf()));
    }

    if dest.exists() {
        debug!("Replacing existing recording at {:?}", dest);
        fs::remove_file(dest)?;
    }

    let source = File::open(temp)?;
    let copied = {
        let _lock = ExclusiveLock::acquire(&source)?;
        let mut target = File::create(dest)?;
        let copied = io::copy(&mut &source, &mut target)?;
        target.sync_all()?;
        copied
    };

    if !dest.exists() {
        return Err(RecordingError::DestinationMissing(dest.to_path_buf()));
    }
    fs::remove_file(temp)?;
    info!("Recording saved to {:?} ({} bytes)", dest, copied);
    Ok(())
}
