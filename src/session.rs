//! Run directory session.
//!
//! A `Session` exists for exactly one event: it is opened when the readiness
//! barrier succeeds and dropped when the drain barrier completes. Opening it
//! creates the day directory and the next numbered event directory, then
//! points the images link (which the nodes write through) at it.
//!
//! ## Layout
//!
//! ```text
//! <data_root>/
//!   dump/              nodes write here outside of an event
//!   Images -> ...      symlink followed by the nodes
//!   20240501/
//!     0/  1/  2/       one directory per event that day
//! ```

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::StorageConfig;

/// Where one event's output goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Day stamp, `YYYYMMDD`
    pub date: String,
    /// Event number within the day, starting at 0
    pub index: usize,
    /// `<data_root>/<date>/<index>`
    pub directory: PathBuf,
}

impl Session {
    /// Create the next event directory for `now` and point the images link at it.
    pub fn open(storage: &StorageConfig, now: DateTime<Local>) -> io::Result<Self> {
        let date = now.format("%Y%m%d").to_string();
        let day_dir = storage.data_root.join(&date);
        fs::create_dir_all(&day_dir)?;

        let mut index = count_subdirs(&day_dir)?;
        let directory = loop {
            let candidate = day_dir.join(index.to_string());
            match fs::create_dir(&candidate) {
                Ok(()) => break candidate,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => index += 1,
                Err(e) => return Err(e),
            }
        };

        repoint_link(&storage.data_root.join(&storage.images_link), &directory)?;
        info!(directory = %directory.display(), "made event directory");
        Ok(Self {
            date,
            index,
            directory,
        })
    }
}

/// Point the images link back at the dump directory, creating it if needed.
pub fn point_images_at_dump(storage: &StorageConfig) -> io::Result<PathBuf> {
    let dump = storage.data_root.join(&storage.dump_dir);
    fs::create_dir_all(&dump)?;
    repoint_link(&storage.data_root.join(&storage.images_link), &dump)?;
    debug!(target_dir = %dump.display(), "images link points at dump");
    Ok(dump)
}

fn count_subdirs(dir: &Path) -> io::Result<usize> {
    let mut count = 0;
    for entry in fs::read_dir(dir)? {
        if entry?.file_type()?.is_dir() {
            count += 1;
        }
    }
    Ok(count)
}

/// Replace `link` with a symlink to `target` in one rename.
fn repoint_link(link: &Path, target: &Path) -> io::Result<()> {
    let tmp = link.with_file_name(format!(
        ".{}.tmp",
        link.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("images")
    ));
    match fs::remove_file(&tmp) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    symlink_dir(target, &tmp)?;
    fs::rename(&tmp, link)
}

#[cfg(unix)]
fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}
