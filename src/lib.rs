//! A standalone ext2-compatible filesystem engine: on-disk layout,
//! free-space allocation, the address-tree file mapping, directory
//! lookup/insertion/removal and byte-level file I/O, all driven through
//! a storage-agnostic `BlockDevice`.
//!
//! This is a library, not a kernel: unlike the driver it is grounded on,
//! it runs on the standard library and its allocator rather than `no_std`.

mod address_tree;
mod alloc;
mod bitmap;
mod byte_io;
mod config;
mod device;
mod dirent;
mod directory;
mod error;
mod fs;
mod group;
mod inode;
mod superblock;
mod handle;

pub use config::{FormatOptions, MountOptions};
pub use device::{BlockDevice, MemBlockDevice, SECTOR_SIZE};
pub use dirent::DirEntry;
pub use error::{Ext2Error, Result};
pub use fs::Ext2Fs;
pub use handle::FileHandle;
pub use inode::{FileKind, Inode};
