//! Symbol lookup in the on-disk image of the traced executable.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use memmap2::Mmap;
use object::read::elf::ElfFile64;
use object::{Endianness, FileKind, Object, ObjectSegment, ObjectSymbol};
use thiserror::Error;

use crate::arch::Word;

const PAGE_SIZE: Word = 0x1000;

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not open `{}`: {1}", _0.display())]
    Open(PathBuf, #[source] io::Error),
    #[error("could not map `{}`: {1}", _0.display())]
    Map(PathBuf, #[source] io::Error),
    #[error("`{}` is not an ELF file", _0.display())]
    NotAnExecutable(PathBuf),
    #[error("`{}` is not a 64-bit ELF file", _0.display())]
    UnsupportedClass(PathBuf),
    #[error("`{}` is malformed: {1}", _0.display())]
    Malformed(PathBuf, #[source] object::Error),
    #[error("`{}` has no symbol table (stripped?)", _0.display())]
    MissingSymbolTable(PathBuf),
    #[error("symbol `{1}` not found in `{}`", _0.display())]
    SymbolNotFound(PathBuf, String),
}

/// A symbol table entry: link-time value and size in bytes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
    pub offset: Word,
    pub size: Word,
}

/// A memory-mapped 64-bit ELF executable.
pub struct Image {
    path: PathBuf,
    map: Mmap,
}

impl Image {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_owned();

        let file = File::open(&path).map_err(|e| Error::Open(path.clone(), e))?;
        let map = unsafe { Mmap::map(&file) }.map_err(|e| Error::Map(path.clone(), e))?;

        match FileKind::parse(&*map) {
            Ok(FileKind::Elf64) => Ok(Self { path, map }),
            Ok(FileKind::Elf32) => Err(Error::UnsupportedClass(path)),
            _ => Err(Error::NotAnExecutable(path)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse(&self) -> Result<ElfFile64<'_, Endianness, &[u8]>, Error> {
        ElfFile64::<Endianness, &[u8]>::parse(&*self.map)
            .map_err(|e| Error::Malformed(self.path.clone(), e))
    }

    /// Looks up a defined symbol by exact match against the linker-visible
    /// names in `.symtab`; mangled names are not demangled.
    pub fn symbol(&self, name: &str) -> Result<Symbol, Error> {
        let elf = self.parse()?;

        if elf.section_by_name(".symtab").is_none() {
            return Err(Error::MissingSymbolTable(self.path.clone()));
        }

        let symbol = elf
            .symbols()
            .filter(|sym| sym.is_definition())
            .find(|sym| sym.name_bytes().map_or(false, |n| n == name.as_bytes()))
            .map(|sym| Symbol {
                offset: sym.address(),
                size: sym.size(),
            })
            .ok_or_else(|| Error::SymbolNotFound(self.path.clone(), name.to_owned()))?;

        debug!(
            "resolved `{}` in `{}` to offset {:#x}, {} bytes",
            name,
            self.path.display(),
            symbol.offset,
            symbol.size
        );

        Ok(symbol)
    }

    /// Page-aligned link-time address of the lowest loadable segment; the
    /// image's first mapping at runtime corresponds to it.
    pub fn load_address(&self) -> Result<Word, Error> {
        Ok(self
            .parse()?
            .segments()
            .map(|segment| segment.address() & !(PAGE_SIZE - 1))
            .min()
            .unwrap_or(0))
    }
}

/// Resolves `name` in the image at `path`.
pub fn resolve<P: AsRef<Path>>(path: P, name: &str) -> Result<Symbol, Error> {
    Image::open(path)?.symbol(name)
}
