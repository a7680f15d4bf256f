//! Filesystem facade (§4.8) and the superblock/BGDT registry (§4.3) it is
//! built on. Grounded in the teacher's `Ext2Fs`/`Ext2BlockGroup` (mount-time
//! geometry, group LBA math) and `init_ext2` (mkfs layout), translated from
//! async device access to the synchronous model §5 requires.

use std::sync::Arc;

use dvida_serialize::{DvDeserialize, DvSerialize, Endianness};
use log::{debug, info, warn};

use crate::config::{FormatOptions, MountOptions};
use crate::device::{self, BlockDevice};
use crate::dirent::DirEntry;
use crate::error::{Ext2Error, Result};
use crate::group::{GroupDescriptor, GROUP_DESC_SIZE};
use crate::handle::FileHandle;
use crate::inode::{FileKind, Inode, INODE_SIZE, ROOT_INODE};
use crate::superblock::{SuperBlock, SUPERBLOCK_OFFSET, SUPERBLOCK_SIZE};

/// Mutable mount state: the in-memory superblock and block-group
/// descriptor table. Every mutation site holds `Ext2Fs::state`
/// (the allocator_lock of §5) for its duration.
pub(crate) struct Ext2State {
    pub(crate) superblock: SuperBlock,
    pub(crate) groups: Vec<GroupDescriptor>,
}

/// A mounted filesystem instance: the device handle plus shared,
/// lock-protected superblock/BGDT state (§5's "global process state",
/// encapsulated rather than living in statics).
pub struct Ext2Fs {
    pub(crate) device: Arc<dyn BlockDevice>,
    pub(crate) state: spin::Mutex<Ext2State>,
    pub(crate) mount_opts: MountOptions,
}

impl Ext2Fs {
    /// Locates the filesystem device, probes for magic `0xEF53` (or formats
    /// it when `format` is set), and loads the superblock + BGDT.
    pub fn init(
        device: Arc<dyn BlockDevice>,
        format: bool,
        opts: FormatOptions,
        mount_opts: MountOptions,
    ) -> Result<Arc<Self>> {
        if format {
            info!("formatting volume with block size {}", opts.block_size);
            mkfs(&*device, &opts)?;
        }

        let mut sb_buf = [0u8; SUPERBLOCK_SIZE];
        device.read_sector(SUPERBLOCK_OFFSET / device::SECTOR_SIZE as u64, &mut sb_buf[..device::SECTOR_SIZE])?;
        device.read_sector(
            SUPERBLOCK_OFFSET / device::SECTOR_SIZE as u64 + 1,
            &mut sb_buf[device::SECTOR_SIZE..],
        )?;
        let (superblock, _) = SuperBlock::deserialize(Endianness::Little, &sb_buf)
            .map_err(|_| Ext2Error::Corrupt("superblock deserialization failed".into()))?;

        if !superblock.is_valid() {
            warn!("bad superblock magic {:#06x}", superblock.s_magic);
            return Err(Ext2Error::BadMagic {
                found: superblock.s_magic,
            });
        }

        let groups = read_bgdt(&*device, &superblock)?;
        debug!(
            "mounted volume: {} groups, {} free blocks, {} free inodes",
            groups.len(),
            superblock.s_free_blocks_count,
            superblock.s_free_inodes_count
        );

        Ok(Arc::new(Ext2Fs {
            device,
            state: spin::Mutex::new(Ext2State { superblock, groups }),
            mount_opts,
        }))
    }

    /// Whether newly allocated data (leaf) blocks should be zero-filled
    /// before use (§2 item 13). Index blocks always zero regardless of
    /// this flag — their entries are read back as "unallocated" otherwise.
    pub(crate) fn zero_new_blocks(&self) -> bool {
        self.mount_opts.zero_new_blocks
    }

    pub fn block_size(&self) -> usize {
        self.state.lock().superblock.block_size()
    }

    pub fn sectors_per_block(&self) -> u32 {
        self.state.lock().superblock.sectors_per_block()
    }

    pub fn read_block(&self, block_idx: u32) -> Result<Vec<u8>> {
        device::read_block(&*self.device, block_idx, self.block_size())
    }

    pub fn write_block(&self, block_idx: u32, buf: &[u8]) -> Result<()> {
        device::write_block(&*self.device, block_idx, self.block_size(), buf)
    }

    pub(crate) fn persist_superblock_and_bgdt(&self, state: &Ext2State) -> Result<()> {
        let mut sb_buf = [0u8; SUPERBLOCK_SIZE];
        state
            .superblock
            .serialize(Endianness::Little, &mut sb_buf)
            .map_err(|_| Ext2Error::Corrupt("superblock serialization failed".into()))?;
        let ss = device::SECTOR_SIZE;
        self.device
            .write_sector(SUPERBLOCK_OFFSET / ss as u64, &sb_buf[..ss])?;
        self.device
            .write_sector(SUPERBLOCK_OFFSET / ss as u64 + 1, &sb_buf[ss..])?;
        write_bgdt(&*self.device, &state.superblock, &state.groups)
    }

    /// Reads the inode table record for 1-based inode number `ino`.
    pub(crate) fn read_inode(&self, ino: u32) -> Result<Inode> {
        let (block_idx, offset, _) = {
            let state = self.state.lock();
            inode_location(&state.superblock, &state.groups, ino)?
        };
        let block = self.read_block(block_idx)?;
        let (inode, _) = Inode::deserialize(Endianness::Little, &block[offset..offset + INODE_SIZE])
            .map_err(|_| Ext2Error::Corrupt(format!("inode {ino} deserialization failed")))?;
        Ok(inode)
    }

    /// Writes the inode table record for 1-based inode number `ino`.
    pub(crate) fn write_inode(&self, ino: u32, inode: &Inode) -> Result<()> {
        let (block_idx, offset, _) = {
            let state = self.state.lock();
            inode_location(&state.superblock, &state.groups, ino)?
        };
        let mut block = self.read_block(block_idx)?;
        inode
            .serialize(Endianness::Little, &mut block[offset..offset + INODE_SIZE])
            .map_err(|_| Ext2Error::Corrupt(format!("inode {ino} serialization failed")))?;
        self.write_block(block_idx, &block)
    }

    pub fn create(
        self: &Arc<Self>,
        path: &str,
        initial_size: u32,
        kind: FileKind,
        perm: u16,
    ) -> Result<()> {
        crate::directory::create(self, path, initial_size, kind, perm)
    }

    pub fn open(self: &Arc<Self>, path: &str) -> Result<FileHandle> {
        let (_, entry) = crate::directory::walk_path(self, path)?;
        let entry = entry.ok_or_else(|| Ext2Error::NotFound(path.to_string()))?;
        let inode = self.read_inode(entry.inode)?;
        Ok(FileHandle::new(Arc::clone(self), entry, inode))
    }

    pub fn remove(self: &Arc<Self>, path: &str) -> Result<()> {
        crate::directory::remove(self, path)
    }

    /// Lists the live entries of the directory at `path`.
    pub fn list_dir(self: &Arc<Self>, path: &str) -> Result<Vec<DirEntry>> {
        crate::directory::list(self, path)
    }

    pub fn free_blocks_count(&self) -> u32 {
        self.state.lock().superblock.s_free_blocks_count
    }

    pub fn free_inodes_count(&self) -> u32 {
        self.state.lock().superblock.s_free_inodes_count
    }
}

/// Maps a 1-based inode number to its `(block_idx, offset_in_block)`
/// location in the owning group's inode table (§6 layout table).
fn inode_location(
    sb: &SuperBlock,
    groups: &[GroupDescriptor],
    ino: u32,
) -> Result<(u32, usize, usize)> {
    if ino == 0 {
        return Err(Ext2Error::Corrupt("inode 0 is not addressable".into()));
    }
    let idx0 = ino - 1;
    let group_idx = idx0 / sb.s_inodes_per_group;
    let index_in_group = idx0 % sb.s_inodes_per_group;
    let group = groups
        .get(group_idx as usize)
        .ok_or_else(|| Ext2Error::Corrupt(format!("inode {ino} addresses an out-of-range group")))?;
    let block_size = sb.block_size();
    let inodes_per_block = block_size / INODE_SIZE;
    let block_within_table = index_in_group / inodes_per_block as u32;
    let offset = (index_in_group % inodes_per_block as u32) as usize * INODE_SIZE;
    Ok((group.bg_inode_table + block_within_table, offset, block_size))
}

fn bgdt_block_count(sb: &SuperBlock) -> u32 {
    let groups = sb.block_groups_count();
    ((groups as usize * GROUP_DESC_SIZE).div_ceil(sb.block_size())) as u32
}

fn read_bgdt(device: &dyn BlockDevice, sb: &SuperBlock) -> Result<Vec<GroupDescriptor>> {
    let start = sb.bgdt_start_block();
    let count = bgdt_block_count(sb);
    let mut groups = Vec::with_capacity(sb.block_groups_count() as usize);
    let mut remaining = sb.block_groups_count();
    for i in 0..count {
        let block = device::read_block(device, start + i, sb.block_size())?;
        let mut off = 0;
        while remaining > 0 && off + GROUP_DESC_SIZE <= block.len() {
            let (gd, n) = GroupDescriptor::deserialize(Endianness::Little, &block[off..])
                .map_err(|_| Ext2Error::Corrupt("group descriptor deserialization failed".into()))?;
            groups.push(gd);
            off += n;
            remaining -= 1;
        }
    }
    Ok(groups)
}

fn write_bgdt(device: &dyn BlockDevice, sb: &SuperBlock, groups: &[GroupDescriptor]) -> Result<()> {
    let start = sb.bgdt_start_block();
    let count = bgdt_block_count(sb);
    let mut iter = groups.iter();
    for i in 0..count {
        let mut block = vec![0u8; sb.block_size()];
        let mut off = 0;
        while off + GROUP_DESC_SIZE <= block.len() {
            let Some(gd) = iter.next() else { break };
            gd.serialize(Endianness::Little, &mut block[off..])
                .map_err(|_| Ext2Error::Corrupt("group descriptor serialization failed".into()))?;
            off += GROUP_DESC_SIZE;
        }
        device::write_block(device, start + i, sb.block_size(), &block)?;
    }
    Ok(())
}

/// Builds a fresh volume: superblock, BGDT, zeroed bitmaps with metadata
/// and reserved inodes marked used, an empty inode table, and a root
/// directory inode holding `.`/`..` (§4.9).
fn mkfs(device: &dyn BlockDevice, opts: &FormatOptions) -> Result<()> {
    let block_size = opts.block_size;
    let total_blocks = (device.sector_count() as usize * device::SECTOR_SIZE / block_size) as u32;
    if total_blocks < 64 {
        return Err(Ext2Error::NoSpace);
    }

    let blocks_per_group = (block_size * 8) as u32;
    let first_data_block = if block_size > 1024 { 0 } else { 1 };
    let data_blocks = total_blocks - first_data_block;
    let group_count = data_blocks.div_ceil(blocks_per_group).max(1);

    let inodes_per_group = (total_blocks / group_count / 4).max(16);
    let inodes_count = inodes_per_group * group_count;

    let mut sb = SuperBlock::default();
    sb.s_inodes_count = inodes_count;
    sb.s_blocks_count = total_blocks;
    sb.s_first_data_block = first_data_block;
    sb.s_log_block_size = (block_size / 1024).trailing_zeros();
    sb.s_log_frag_size = sb.s_log_block_size;
    sb.s_blocks_per_group = blocks_per_group;
    sb.s_frags_per_group = blocks_per_group;
    sb.s_inodes_per_group = inodes_per_group;
    sb.s_rev_level = 0;

    let bgdt_blocks = ((group_count as usize * GROUP_DESC_SIZE).div_ceil(block_size)) as u32;
    let inode_table_blocks = (inodes_per_group as usize * INODE_SIZE).div_ceil(block_size) as u32;

    let mut groups = Vec::with_capacity(group_count as usize);
    let mut next_free_block = sb.bgdt_start_block() + bgdt_blocks;
    for _ in 0..group_count {
        let block_bitmap = next_free_block;
        let inode_bitmap = block_bitmap + 1;
        let inode_table = inode_bitmap + 1;
        next_free_block = inode_table + inode_table_blocks;
        groups.push(GroupDescriptor {
            bg_block_bitmap: block_bitmap,
            bg_inode_bitmap: inode_bitmap,
            bg_inode_table: inode_table,
            bg_free_blocks_count: 0,
            bg_free_inodes_count: inodes_per_group as u16,
            bg_used_dirs_count: 0,
            ..Default::default()
        });
    }

    // Root directory data block lives right after the metadata of group 0.
    let root_data_block = next_free_block;
    let metadata_blocks_used = root_data_block - first_data_block + 1;

    for (g, gd) in groups.iter_mut().enumerate() {
        let group_blocks = if g as u32 == group_count - 1 {
            total_blocks - first_data_block - blocks_per_group * g as u32
        } else {
            blocks_per_group
        };
        let used_in_group = if g == 0 { metadata_blocks_used } else { 0 };
        gd.bg_free_blocks_count = (group_blocks - used_in_group) as u16;
    }
    groups[0].bg_used_dirs_count = 1;
    groups[0].bg_free_inodes_count -= 1; // root inode reserved.

    sb.s_free_blocks_count = groups.iter().map(|g| g.bg_free_blocks_count as u32).sum();
    sb.s_free_inodes_count = groups.iter().map(|g| g.bg_free_inodes_count as u32).sum();

    // Write superblock + BGDT.
    let mut sb_buf = [0u8; SUPERBLOCK_SIZE];
    sb.serialize(Endianness::Little, &mut sb_buf)
        .map_err(|_| Ext2Error::Corrupt("superblock serialization failed".into()))?;
    let ss = device::SECTOR_SIZE;
    device.write_sector(SUPERBLOCK_OFFSET / ss as u64, &sb_buf[..ss])?;
    device.write_sector(SUPERBLOCK_OFFSET / ss as u64 + 1, &sb_buf[ss..])?;
    write_bgdt(device, &sb, &groups)?;

    // Block + inode bitmaps, per group.
    for (g, gd) in groups.iter().enumerate() {
        let mut block_bits = crate::bitmap::Bitmap::zeroed(blocks_per_group as usize);
        if g == 0 {
            block_bits.set_range(0, metadata_blocks_used as usize, true);
        }
        let mut bb_block = vec![0u8; block_size];
        bb_block[..block_bits.get_bits().len()].copy_from_slice(block_bits.get_bits());
        device::write_block(device, gd.bg_block_bitmap, block_size, &bb_block)?;

        let mut inode_bits = crate::bitmap::Bitmap::zeroed(inodes_per_group as usize);
        if g == 0 {
            // Reserved inodes 1..=10 (1-based), including the root (2).
            inode_bits.set_range(0, 10, true);
        }
        let mut ib_block = vec![0u8; block_size];
        ib_block[..inode_bits.get_bits().len()].copy_from_slice(inode_bits.get_bits());
        device::write_block(device, gd.bg_inode_bitmap, block_size, &ib_block)?;

        let empty_table = vec![0u8; inode_table_blocks as usize * block_size];
        for i in 0..inode_table_blocks {
            device::write_block(
                device,
                gd.bg_inode_table + i,
                block_size,
                &empty_table[(i as usize * block_size)..((i + 1) as usize * block_size)],
            )?;
        }
    }

    // Root directory inode + data block.
    let mut root = Inode::new(FileKind::Directory, 0o755);
    root.i_links_count = 2;
    root.i_block[0] = root_data_block;
    root.i_size = block_size as u32;
    root.i_blocks = sb.sectors_per_block();

    let dot = DirEntry {
        inode: ROOT_INODE,
        rec_len: 0,
        file_type: crate::inode::EXT2_FT_DIR,
        name: ".".to_string(),
    };
    let dotdot = DirEntry {
        inode: ROOT_INODE,
        rec_len: 0,
        file_type: crate::inode::EXT2_FT_DIR,
        name: "..".to_string(),
    };
    let mut block = vec![0u8; block_size];
    let mut off = 0;
    let dot_len = dot.min_rec_len();
    let mut dot = dot;
    dot.rec_len = dot_len;
    off += dot.serialize(Endianness::Little, &mut block[off..]).unwrap();
    let mut dotdot = dotdot;
    dotdot.rec_len = (block_size - dot_len as usize) as u16;
    dotdot
        .serialize(Endianness::Little, &mut block[off..])
        .unwrap();
    device::write_block(device, root_data_block, block_size, &block)?;

    // Root inode goes to group 0, index 1 (0-based), i.e. inode number 2.
    let inode_table_start = groups[0].bg_inode_table;
    let inodes_per_block = block_size / INODE_SIZE;
    let block_within = (ROOT_INODE as usize - 1) / inodes_per_block;
    let offset_in_block = ((ROOT_INODE as usize - 1) % inodes_per_block) * INODE_SIZE;
    let mut itable_block = device::read_block(device, inode_table_start + block_within as u32, block_size)?;
    root.serialize(
        Endianness::Little,
        &mut itable_block[offset_in_block..offset_in_block + INODE_SIZE],
    )
    .map_err(|_| Ext2Error::Corrupt("root inode serialization failed".into()))?;
    device::write_block(device, inode_table_start + block_within as u32, block_size, &itable_block)?;

    Ok(())
}
