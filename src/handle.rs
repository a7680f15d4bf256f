//! Open file handle (§4.7): a device reference, the originating directory
//! entry, an inode snapshot, and a byte position behind a per-handle
//! mutex. Grounded in the teacher's `OpenFile` (position tracking,
//! lock-per-handle discipline) and, for write/truncate semantics, the
//! original `inode_write_at`/`file_truncate`/`file_seek`.

use std::sync::Arc;

use log::trace;

use crate::address_tree;
use crate::byte_io;
use crate::dirent::DirEntry;
use crate::error::Result;
use crate::fs::Ext2Fs;
use crate::inode::Inode;

struct HandleState {
    inode: Inode,
    pos: u32,
}

pub struct FileHandle {
    fs: Arc<Ext2Fs>,
    entry: DirEntry,
    inner: spin::Mutex<HandleState>,
}

impl FileHandle {
    pub(crate) fn new(fs: Arc<Ext2Fs>, entry: DirEntry, inode: Inode) -> Self {
        FileHandle {
            fs,
            entry,
            inner: spin::Mutex::new(HandleState { inode, pos: 0 }),
        }
    }

    /// Reads from the current position, advancing it by the number of
    /// bytes actually read.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.inner.lock();
        let n = byte_io::read_at(&self.fs, &state.inode, buf, state.pos)?;
        state.pos += n as u32;
        Ok(n)
    }

    /// Equivalent to `seek(offset)` followed by `read(buf)` (§8).
    pub fn read_at(&self, buf: &mut [u8], offset: u32) -> Result<usize> {
        let mut state = self.inner.lock();
        state.pos = offset;
        let n = byte_io::read_at(&self.fs, &state.inode, buf, state.pos)?;
        state.pos += n as u32;
        Ok(n)
    }

    /// Writes at the current position, resizing the file as needed, then
    /// persists the inode record. Lock order: `file.lock` is already held
    /// here, and is held across the `resize` call into the allocator.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut state = self.inner.lock();
        let n = byte_io::write_at(&self.fs, &mut state.inode, buf, state.pos)?;
        self.fs.write_inode(self.entry.inode, &state.inode)?;
        state.pos += n as u32;
        Ok(n)
    }

    /// Equivalent to `seek(offset)` followed by `write(buf)` (§8).
    pub fn write_at(&self, buf: &[u8], offset: u32) -> Result<usize> {
        let mut state = self.inner.lock();
        state.pos = offset;
        let n = byte_io::write_at(&self.fs, &mut state.inode, buf, state.pos)?;
        self.fs.write_inode(self.entry.inode, &state.inode)?;
        state.pos += n as u32;
        Ok(n)
    }

    pub fn seek(&self, pos: u32) {
        self.inner.lock().pos = pos;
    }

    pub fn tell(&self) -> u32 {
        self.inner.lock().pos
    }

    pub fn length(&self) -> u32 {
        self.inner.lock().inode.i_size
    }

    /// Sectors currently charged to this file, direct and indirect blocks
    /// alike (the on-disk `i_blocks` field).
    pub fn blocks_allocated(&self) -> u32 {
        self.inner.lock().inode.i_blocks
    }

    /// Resizes the file, then clamps the position down to the new size if
    /// it now lies beyond it (§9 resolved: clamps to `size`, not `size-1`).
    pub fn truncate(&self, new_size: u32) -> Result<()> {
        let mut state = self.inner.lock();
        address_tree::resize(&self.fs, &mut state.inode, new_size)?;
        if state.pos >= new_size {
            state.pos = new_size;
        }
        self.fs.write_inode(self.entry.inode, &state.inode)
    }

    /// Produces an independent handle onto the same file, sharing no
    /// state but the underlying device.
    pub fn reopen(&self) -> Result<FileHandle> {
        let inode = self.fs.read_inode(self.entry.inode)?;
        Ok(FileHandle::new(Arc::clone(&self.fs), self.entry.clone(), inode))
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        trace!("closed handle on inode {}", self.entry.inode);
    }
}
