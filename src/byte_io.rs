//! Byte-level inode I/O (§4.5): read/write at an arbitrary byte offset,
//! bridging the address-tree engine's block-granular view to a byte
//! stream. Bounce-buffer partial-block handling mirrors `inode_read_at`/
//! `inode_write_at` in the original `inode.c`.

use crate::address_tree;
use crate::error::{Ext2Error, Result};
use crate::fs::Ext2Fs;
use crate::inode::Inode;

/// Reads up to `buf.len()` bytes starting at byte `offset`, stopping at
/// `inode.i_size`. A hole (unallocated leaf block) reads as zeros, matching
/// the lazily-allocated, possibly-sparse nature of a resized file.
pub fn read_at(fs: &Ext2Fs, inode: &Inode, buf: &mut [u8], offset: u32) -> Result<usize> {
    let block_size = fs.block_size() as u32;
    let mut total = 0usize;
    let mut pos = offset;

    while total < buf.len() && pos < inode.i_size {
        let block_idx = pos / block_size;
        let block_ofs = (pos % block_size) as usize;
        let remaining_in_file = (inode.i_size - pos) as usize;
        let remaining_in_block = block_size as usize - block_ofs;
        let chunk = (buf.len() - total).min(remaining_in_file).min(remaining_in_block);
        if chunk == 0 {
            break;
        }

        let phys = address_tree::get_data_block(fs, inode, block_idx)?;
        if phys == 0 {
            buf[total..total + chunk].fill(0);
        } else {
            let block = fs.read_block(phys)?;
            buf[total..total + chunk].copy_from_slice(&block[block_ofs..block_ofs + chunk]);
        }

        total += chunk;
        pos += chunk as u32;
    }
    Ok(total)
}

/// Resizes the inode to cover `offset + buf.len()` then writes `buf`,
/// read-modify-writing partial blocks and overwriting full ones directly.
/// Returns `Ok(0)` (not an error) if the preceding resize could not
/// allocate enough blocks — the caller already observes that nothing was
/// written, matching the original's "return 0 on resize failure" contract.
pub fn write_at(fs: &Ext2Fs, inode: &mut Inode, buf: &[u8], offset: u32) -> Result<usize> {
    let target_size = offset
        .checked_add(buf.len() as u32)
        .ok_or(Ext2Error::Corrupt("write offset/length overflow".into()))?;
    if address_tree::resize(fs, inode, target_size).is_err() {
        return Ok(0);
    }

    let block_size = fs.block_size() as u32;
    let mut total = 0usize;
    let mut pos = offset;

    while total < buf.len() {
        let block_idx = pos / block_size;
        let block_ofs = (pos % block_size) as usize;
        let remaining_in_block = block_size as usize - block_ofs;
        let chunk = (buf.len() - total).min(remaining_in_block);
        if chunk == 0 {
            break;
        }

        let phys = address_tree::get_data_block(fs, inode, block_idx)?;
        if phys == 0 {
            return Err(Ext2Error::Corrupt(
                "write target block unallocated immediately after resize".into(),
            ));
        }

        if block_ofs == 0 && chunk == block_size as usize {
            fs.write_block(phys, &buf[total..total + chunk])?;
        } else {
            let mut block = fs.read_block(phys)?;
            block[block_ofs..block_ofs + chunk].copy_from_slice(&buf[total..total + chunk]);
            fs.write_block(phys, &block)?;
        }

        total += chunk;
        pos += chunk as u32;
    }
    Ok(total)
}
