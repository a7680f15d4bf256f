use thiserror::Error;

/// Every failure mode the engine can report across block I/O, the allocator,
/// the address-tree engine, the directory walker, and the facade.
#[derive(Debug, Error)]
pub enum Ext2Error {
    #[error("no space left on device")]
    NoSpace,

    #[error("path not found: {0}")]
    NotFound(String),

    #[error("path already exists: {0}")]
    AlreadyExists(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("not a regular file: {0}")]
    NotARegularFile(String),

    #[error("superblock magic mismatch: found {found:#06x}, expected 0xef53")]
    BadMagic { found: u16 },

    #[error("filesystem corruption: {0}")]
    Corrupt(String),

    #[error("device I/O error")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, Ext2Error>;
