use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::Instant;

use snafu::ensure;
use snafu::ResultExt;

use crate::errors::BacklightDirSnafu;
use crate::errors::DimmerError;
use crate::errors::FileNotFoundSnafu;
use crate::errors::MultipleBacklightsSnafu;
use crate::errors::NoBacklightSnafu;

/// Where the kernel lists backlight devices.
pub(crate) const BACKLIGHT_CLASS: &str = "/sys/class/backlight";

/// Wait for a file to show up
pub(crate) fn wait_for_file(path: &Path, timeout: Duration) -> Result<(), DimmerError> {
    let last_time = Instant::now() + timeout;
    while Instant::now() < last_time {
        if path.exists() {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(250));
    }
    FileNotFoundSnafu { path }.fail()
}

/// Find the one backlight device under `class_dir`.
pub(crate) fn find_backlight(class_dir: &Path) -> Result<PathBuf, DimmerError> {
    let mut found = None;
    let entries = class_dir
        .read_dir()
        .context(BacklightDirSnafu { path: class_dir })?;
    for entry in entries {
        let entry = entry.context(BacklightDirSnafu { path: class_dir })?;
        ensure!(found.is_none(), MultipleBacklightsSnafu { path: class_dir });
        found = Some(entry.path());
    }
    found.ok_or_else(|| NoBacklightSnafu { path: class_dir }.build())
}
