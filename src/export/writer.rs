//! Output file writing with restrictive permissions.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::error::{ConvertError, Result};

/// Permission bits for every file we produce; message content may be sensitive.
pub const OUTPUT_FILE_MODE: u32 = 0o640;

/// Write `bytes` to `path`, creating parent directories as needed.
///
/// The file is truncated if it exists, restricted to [`OUTPUT_FILE_MODE`] on
/// Unix, and synced to disk before returning.
pub fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ConvertError::io(parent, e))?;
    }

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(OUTPUT_FILE_MODE);
    }

    let mut file = options.open(path).map_err(|e| ConvertError::io(path, e))?;

    // `mode` only applies on creation; tighten files that already existed.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(OUTPUT_FILE_MODE))
            .map_err(|e| ConvertError::io(path, e))?;
    }

    file.write_all(bytes).map_err(|e| ConvertError::io(path, e))?;
    file.sync_all().map_err(|e| ConvertError::io(path, e))?;
    Ok(())
}
