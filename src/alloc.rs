//! Free-space allocator (§4.3): a single mutex (`Ext2Fs::state`, doubling as
//! the allocator_lock of §5) serialises every bitmap/counter/superblock
//! mutation. Grounded in the teacher's `BlockAllocator` (group-scan loop)
//! and, for the exact group-skip and assertion semantics, the original
//! `free-map.c`.

use log::{trace, warn};

use crate::bitmap::Bitmap;
use crate::device;
use crate::error::{Ext2Error, Result};
use crate::fs::Ext2Fs;

impl Ext2Fs {
    /// Allocates `n` contiguous data blocks from the first group with
    /// enough free blocks, skipping group 0 unless it is the volume's only
    /// group (§4.3 resolved open question). Returns the absolute block id
    /// of the first allocated block.
    pub fn alloc_blocks(&self, n: u32, zero: bool) -> Result<u32> {
        let mut state = self.state.lock();
        let block_size = state.superblock.block_size();
        let group_count = state.groups.len();
        let skip_group0 = group_count > 1;
        let start_group = if skip_group0 { 1 } else { 0 };

        for g in start_group..group_count {
            if (state.groups[g].bg_free_blocks_count as u32) < n {
                continue;
            }
            let bitmap_block = state.groups[g].bg_block_bitmap;
            let raw = device::read_block(&*self.device, bitmap_block, block_size)?;
            let mut bitmap = Bitmap::from_bytes(raw, state.superblock.s_blocks_per_group as usize);
            let local_idx = bitmap.scan_and_flip(0, n as usize, false);
            if local_idx == crate::bitmap::BITMAP_ERR {
                continue;
            }

            let absolute = local_idx + (g as u32) * state.superblock.s_blocks_per_group
                + state.superblock.s_first_data_block;

            device::write_block(&*self.device, bitmap_block, block_size, bitmap.get_bits())?;

            state.groups[g].bg_free_blocks_count -= n as u16;
            state.superblock.s_free_blocks_count -= n;
            self.persist_superblock_and_bgdt(&state)?;

            if zero {
                let zeros = vec![0u8; block_size];
                for i in 0..n {
                    device::write_block(&*self.device, absolute + i, block_size, &zeros)?;
                }
            }

            trace!("allocated {n} block(s) starting at {absolute} in group {g}");
            return Ok(absolute);
        }

        warn!("block allocation failed: no group has {n} contiguous free block(s)");
        Err(Ext2Error::NoSpace)
    }

    /// Releases `n` contiguous data blocks starting at `block_id`. Panics
    /// (matching the source's fatal `ASSERT`) if any bit in the range is
    /// already clear — that indicates on-disk corruption, not ordinary use.
    pub fn free_blocks(&self, block_id: u32, n: u32) -> Result<()> {
        let mut state = self.state.lock();
        let block_size = state.superblock.block_size();
        let local = block_id - state.superblock.s_first_data_block;
        let g = (local / state.superblock.s_blocks_per_group) as usize;
        let local_idx = local % state.superblock.s_blocks_per_group;

        let bitmap_block = state.groups[g].bg_block_bitmap;
        let raw = device::read_block(&*self.device, bitmap_block, block_size)?;
        let mut bitmap = Bitmap::from_bytes(raw, state.superblock.s_blocks_per_group as usize);

        assert!(
            bitmap.all_in_range(local_idx as usize, n as usize, true),
            "freeing block(s) starting at {block_id} that are already free: filesystem corruption"
        );
        bitmap.set_range(local_idx as usize, n as usize, false);
        device::write_block(&*self.device, bitmap_block, block_size, bitmap.get_bits())?;

        state.groups[g].bg_free_blocks_count += n as u16;
        state.superblock.s_free_blocks_count += n;
        self.persist_superblock_and_bgdt(&state)?;
        trace!("freed {n} block(s) starting at {block_id} in group {g}");
        Ok(())
    }

    pub fn alloc_inode(&self) -> Result<u32> {
        let mut state = self.state.lock();
        let block_size = state.superblock.block_size();
        let group_count = state.groups.len();
        let skip_group0 = group_count > 1;
        let start_group = if skip_group0 { 1 } else { 0 };

        for g in start_group..group_count {
            if state.groups[g].bg_free_inodes_count == 0 {
                continue;
            }
            let bitmap_block = state.groups[g].bg_inode_bitmap;
            let raw = device::read_block(&*self.device, bitmap_block, block_size)?;
            let mut bitmap = Bitmap::from_bytes(raw, state.superblock.s_inodes_per_group as usize);
            let local_idx = bitmap.scan_and_flip(0, 1, false);
            if local_idx == crate::bitmap::BITMAP_ERR {
                continue;
            }
            device::write_block(&*self.device, bitmap_block, block_size, bitmap.get_bits())?;

            let ino = local_idx + (g as u32) * state.superblock.s_inodes_per_group + 1;
            state.groups[g].bg_free_inodes_count -= 1;
            state.superblock.s_free_inodes_count -= 1;
            self.persist_superblock_and_bgdt(&state)?;
            trace!("allocated inode {ino} in group {g}");
            return Ok(ino);
        }

        warn!("inode allocation failed: no group has a free inode");
        Err(Ext2Error::NoSpace)
    }

    pub fn free_inode(&self, ino: u32) -> Result<()> {
        let mut state = self.state.lock();
        let idx0 = ino - 1;
        let g = (idx0 / state.superblock.s_inodes_per_group) as usize;
        let local_idx = idx0 % state.superblock.s_inodes_per_group;
        let block_size = state.superblock.block_size();

        let bitmap_block = state.groups[g].bg_inode_bitmap;
        let raw = device::read_block(&*self.device, bitmap_block, block_size)?;
        let mut bitmap = Bitmap::from_bytes(raw, state.superblock.s_inodes_per_group as usize);

        assert!(
            bitmap.test(local_idx as usize),
            "freeing inode {ino} that is already free: filesystem corruption"
        );
        bitmap.set(local_idx as usize, false);
        device::write_block(&*self.device, bitmap_block, block_size, bitmap.get_bits())?;

        state.groups[g].bg_free_inodes_count += 1;
        state.superblock.s_free_inodes_count += 1;
        self.persist_superblock_and_bgdt(&state)?;
        trace!("freed inode {ino} in group {g}");
        Ok(())
    }
}
