//! Address-tree engine (§4.4): linear file-block index → physical block id
//! through the direct/indirect trees, and the expand/shrink walk that keeps
//! that tree in sync with a new `i_size`. Ground truth for the range
//! arithmetic and the indirect-overhead formula is the original
//! `inode_resize`/`inode_expand_range`/`inode_shrink_range`/
//! `inode_get_indirect_blocks` (`filesys/ext2/inode.c`); the teacher's own
//! `block_iterator.rs` grounds the lazy-allocate-on-write, zero-fill-on-read
//! style this port keeps.

use crate::error::Result;
use crate::fs::Ext2Fs;
use crate::inode::{Inode, DIRECT_BLOCKS};

fn read_u32_le(block: &[u8], entry: u32) -> u32 {
    let off = entry as usize * 4;
    u32::from_le_bytes(block[off..off + 4].try_into().unwrap())
}

fn write_u32_le(block: &mut [u8], entry: u32, value: u32) {
    let off = entry as usize * 4;
    block[off..off + 4].copy_from_slice(&value.to_le_bytes());
}

fn div_ceil_i64(a: i64, b: i64) -> i64 {
    (a + b - 1) / b
}

/// Entries per indirect block: `W = block_size / 4`.
fn entries_per_block(fs: &Ext2Fs) -> u32 {
    (fs.block_size() / 4) as u32
}

/// Follows the direct/indirect tree for logical block `i`. Zero means the
/// sub-range is a hole (unallocated) — callers treat it as an all-zero
/// virtual block rather than an error; only an index past the addressable
/// triple-indirect range is a real error.
pub fn get_data_block(fs: &Ext2Fs, inode: &Inode, i: u32) -> Result<u32> {
    let w = entries_per_block(fs);
    if i < DIRECT_BLOCKS as u32 {
        return Ok(inode.i_block[i as usize]);
    }
    let i = i - DIRECT_BLOCKS as u32;
    if i < w {
        return lookup_leaf(fs, inode.i_block[12], i);
    }
    let i = i - w;
    if i < w * w {
        return lookup_level(fs, inode.i_block[13], i, w, 1);
    }
    let i = i - w * w;
    if i < w * w * w {
        return lookup_level(fs, inode.i_block[14], i, w, 2);
    }
    Err(crate::error::Ext2Error::Corrupt(
        "file block index exceeds the triple-indirect addressable range".into(),
    ))
}

fn lookup_leaf(fs: &Ext2Fs, block_id: u32, idx: u32) -> Result<u32> {
    if block_id == 0 {
        return Ok(0);
    }
    let block = fs.read_block(block_id)?;
    Ok(read_u32_le(&block, idx))
}

/// `depth` levels of indirection remain below `block_id` (1 for
/// double-indirect's top block, 2 for triple-indirect's top block).
fn lookup_level(fs: &Ext2Fs, block_id: u32, idx: u32, w: u32, depth: u32) -> Result<u32> {
    if block_id == 0 {
        return Ok(0);
    }
    let block = fs.read_block(block_id)?;
    let span = w.pow(depth);
    let entry = idx / span;
    let rest = idx % span;
    let child = read_u32_le(&block, entry);
    if depth == 1 {
        lookup_leaf(fs, child, rest)
    } else {
        lookup_level(fs, child, rest, w, depth - 1)
    }
}

/// Count of index blocks needed to address `fs_blocks` leaf blocks (§4.4).
pub fn indirect_overhead(fs_blocks: u32, w: u32) -> u32 {
    let w = w as i64;
    let mut r = fs_blocks as i64 - DIRECT_BLOCKS as i64;
    if r <= 0 {
        return 0;
    }
    let mut overhead: i64 = 1;
    r -= w;
    if r <= 0 {
        return overhead as u32;
    }
    overhead = 2;
    let w2 = w * w;
    if r <= w2 {
        overhead += div_ceil_i64(r, w);
        return overhead as u32;
    }
    overhead += w;
    r -= w2;
    overhead += 1 + div_ceil_i64(r, w2) + div_ceil_i64(r, w);
    overhead as u32
}

/// Grows or shrinks `inode`'s address tree to cover `new_size` bytes,
/// updating `i_size`/`i_blocks`. Allocation failures partway through an
/// expansion are not rolled back (§4.4 resolved open question): the caller
/// observes `Err(NoSpace)` with whatever blocks were already claimed left
/// allocated and reachable from the inode as far as the walk got.
pub fn resize(fs: &Ext2Fs, inode: &mut Inode, new_size: u32) -> Result<()> {
    let b = fs.block_size() as u32;
    let w = entries_per_block(fs);
    let new_fs_blocks = new_size.div_ceil(b);
    let old_fs_blocks = inode.i_size.div_ceil(b);

    if new_fs_blocks > old_fs_blocks {
        expand(fs, inode, old_fs_blocks, new_fs_blocks, w)?;
    } else if new_fs_blocks < old_fs_blocks {
        shrink(fs, inode, new_fs_blocks, old_fs_blocks, w)?;
    }

    inode.i_size = new_size;
    let overhead = indirect_overhead(new_fs_blocks, w);
    inode.i_blocks = (new_fs_blocks + overhead) * fs.sectors_per_block();
    Ok(())
}

fn expand(fs: &Ext2Fs, inode: &mut Inode, old: u32, new: u32, w: u32) -> Result<()> {
    let direct_end = (DIRECT_BLOCKS as u32).min(new);
    for idx in old.min(DIRECT_BLOCKS as u32)..direct_end {
        if inode.i_block[idx as usize] == 0 {
            inode.i_block[idx as usize] = fs.alloc_blocks(1, fs.zero_new_blocks())?;
        }
    }

    let levels: [(usize, u32, u32); 3] = [
        (12, DIRECT_BLOCKS as u32, 1),
        (13, DIRECT_BLOCKS as u32 + w, w),
        (14, DIRECT_BLOCKS as u32 + w + w * w, w * w),
    ];
    for (slot, level_start, entry_span) in levels {
        let level_end = level_start + w * entry_span;
        if new <= level_start {
            break;
        }
        if old >= level_end {
            continue;
        }
        let mut block_id = inode.i_block[slot];
        expand_index_block(fs, &mut block_id, level_start, entry_span, w, old, new)?;
        inode.i_block[slot] = block_id;
    }
    Ok(())
}

fn expand_index_block(
    fs: &Ext2Fs,
    block_id: &mut u32,
    base: u32,
    entry_span: u32,
    w: u32,
    target_start: u32,
    target_end: u32,
) -> Result<()> {
    if *block_id == 0 {
        *block_id = fs.alloc_blocks(1, true)?;
    }
    let mut block = fs.read_block(*block_id)?;
    let mut changed = false;
    for e in 0..w {
        let item_start = base + e * entry_span;
        let item_end = item_start + entry_span;
        if item_end <= target_start {
            continue;
        }
        if target_end <= item_start {
            break;
        }
        let mut entry_val = read_u32_le(&block, e);
        if entry_span == 1 {
            if entry_val == 0 {
                entry_val = fs.alloc_blocks(1, fs.zero_new_blocks())?;
                write_u32_le(&mut block, e, entry_val);
                changed = true;
            }
        } else {
            if entry_val == 0 {
                entry_val = fs.alloc_blocks(1, true)?;
                write_u32_le(&mut block, e, entry_val);
                changed = true;
            }
            let mut child = entry_val;
            expand_index_block(fs, &mut child, item_start, entry_span / w, w, target_start, target_end)?;
            if child != entry_val {
                write_u32_le(&mut block, e, child);
                changed = true;
            }
        }
    }
    if changed {
        fs.write_block(*block_id, &block)?;
    }
    Ok(())
}

fn shrink(fs: &Ext2Fs, inode: &mut Inode, new: u32, old: u32, w: u32) -> Result<()> {
    let direct_end = (DIRECT_BLOCKS as u32).min(old);
    for idx in new.min(DIRECT_BLOCKS as u32)..direct_end {
        let entry = &mut inode.i_block[idx as usize];
        if *entry != 0 {
            fs.free_blocks(*entry, 1)?;
            *entry = 0;
        }
    }

    let levels: [(usize, u32, u32); 3] = [
        (12, DIRECT_BLOCKS as u32, 1),
        (13, DIRECT_BLOCKS as u32 + w, w),
        (14, DIRECT_BLOCKS as u32 + w + w * w, w * w),
    ];
    for (slot, level_start, entry_span) in levels {
        let level_end = level_start + w * entry_span;
        if new >= level_end {
            continue;
        }
        if old <= level_start {
            break;
        }
        let mut block_id = inode.i_block[slot];
        if block_id != 0 {
            shrink_index_block(fs, &mut block_id, level_start, entry_span, w, new, old)?;
            if new <= level_start {
                fs.free_blocks(block_id, 1)?;
                block_id = 0;
            }
        }
        inode.i_block[slot] = block_id;
    }
    Ok(())
}

fn shrink_index_block(
    fs: &Ext2Fs,
    block_id: &mut u32,
    base: u32,
    entry_span: u32,
    w: u32,
    target_start: u32,
    target_end: u32,
) -> Result<()> {
    let mut block = fs.read_block(*block_id)?;
    let mut changed = false;
    for e in 0..w {
        let item_start = base + e * entry_span;
        let item_end = item_start + entry_span;
        if item_end <= target_start {
            continue;
        }
        if target_end <= item_start {
            break;
        }
        let entry_val = read_u32_le(&block, e);
        if entry_val == 0 {
            continue;
        }
        if entry_span == 1 {
            fs.free_blocks(entry_val, 1)?;
            write_u32_le(&mut block, e, 0);
            changed = true;
        } else {
            let mut child = entry_val;
            shrink_index_block(fs, &mut child, item_start, entry_span / w, w, target_start, target_end)?;
            if target_start <= item_start {
                fs.free_blocks(child, 1)?;
                child = 0;
            }
            if child != entry_val {
                write_u32_le(&mut block, e, child);
                changed = true;
            }
        }
    }
    if changed {
        fs.write_block(*block_id, &block)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indirect_overhead_zero_when_fully_direct() {
        assert_eq!(indirect_overhead(5, 256), 0);
        assert_eq!(indirect_overhead(12, 256), 0);
    }

    #[test]
    fn indirect_overhead_single_level() {
        // 12 direct + 1 in the single-indirect range.
        assert_eq!(indirect_overhead(13, 256), 1);
    }

    #[test]
    fn indirect_overhead_double_level() {
        let w = 256u32;
        let fs_blocks = 12 + w + 1;
        assert_eq!(indirect_overhead(fs_blocks, w), 2 + 1);
    }
}
