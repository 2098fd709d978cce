use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::trace;
use nix::unistd::Pid;
use proc_maps::get_process_maps;
use thiserror::Error;

use crate::arch::Word;

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not read memory mappings of `{0}`: {1}")]
    Read(Pid, #[source] io::Error),
    #[error("`{}` is not mapped into `{1}`", _0.display())]
    ImageNotMapped(PathBuf, Pid),
}

/// Returns the start of the first region of `pid` backed by `image`.
///
/// Both sides are canonicalised before comparison, so relative or symlinked
/// paths match; entries whose path cannot be canonicalised are skipped.
pub fn base_address<P: AsRef<Path>>(pid: Pid, image: P) -> Result<Word, Error> {
    let image = image.as_ref();
    let wanted = fs::canonicalize(image)
        .map_err(|_| Error::ImageNotMapped(image.to_owned(), pid))?;

    let maps = get_process_maps(pid.as_raw()).map_err(|e| Error::Read(pid, e))?;

    maps.iter()
        .find(|map| {
            map.filename()
                .and_then(|path| fs::canonicalize(path).ok())
                .map_or(false, |path| path == wanted)
        })
        .map(|map| {
            trace!("`{}` mapped at {:#x} in `{}`", wanted.display(), map.start(), pid);
            map.start() as Word
        })
        .ok_or_else(|| Error::ImageNotMapped(image.to_owned(), pid))
}
