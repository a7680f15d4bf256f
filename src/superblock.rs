//! On-disk superblock record (§3). Field layout follows the standard ext2
//! superblock through `s_algo_bitmap`; trailing bytes up to the fixed
//! 1024-byte record size are preserved opaquely so a volume produced by a
//! different ext2 implementation round-trips verbatim, mirroring the
//! teacher's `SuperBlock` struct (which instead names every field through
//! `s_first_meta_bg` — this port trims the named tail to the fields the
//! engine actually reasons about, see DESIGN.md).

use dvida_serialize::{DvDeErr, DvDeserialize, DvSerErr, DvSerialize, Endianness};

pub const SUPERBLOCK_SIZE: usize = 1024;
pub const SUPERBLOCK_OFFSET: u64 = 1024;
pub const EXT2_SUPER_MAGIC: u16 = 0xEF53;

const NAMED_FIELDS_SIZE: usize = 204;
const RESERVED_TAIL_SIZE: usize = SUPERBLOCK_SIZE - NAMED_FIELDS_SIZE;

#[derive(Debug, Clone)]
pub struct SuperBlock {
    pub s_inodes_count: u32,
    pub s_blocks_count: u32,
    pub s_r_blocks_count: u32,
    pub s_free_blocks_count: u32,
    pub s_free_inodes_count: u32,
    pub s_first_data_block: u32,
    pub s_log_block_size: u32,
    pub s_log_frag_size: u32,
    pub s_blocks_per_group: u32,
    pub s_frags_per_group: u32,
    pub s_inodes_per_group: u32,
    pub s_mtime: u32,
    pub s_wtime: u32,
    pub s_mnt_count: u16,
    pub s_max_mnt_count: u16,
    pub s_magic: u16,
    pub s_state: u16,
    pub s_errors: u16,
    pub s_minor_rev_level: u16,
    pub s_lastcheck: u32,
    pub s_checkinterval: u32,
    pub s_creator_os: u32,
    pub s_rev_level: u32,
    pub s_def_resuid: u16,
    pub s_def_resgid: u16,
    pub s_first_ino: u32,
    pub s_inode_size: u16,
    pub s_block_group_nr: u16,
    pub s_feature_compat: u32,
    pub s_feature_incompat: u32,
    pub s_feature_ro_compat: u32,
    pub s_uuid: [u8; 16],
    pub s_volume_name: [u8; 16],
    pub s_last_mounted: [u8; 64],
    pub s_algo_bitmap: u32,
    /// Opaque trailing bytes (preallocation hints, journal/hash fields,
    /// reserved padding) round-tripped verbatim.
    pub reserved: Vec<u8>,
}

impl Default for SuperBlock {
    fn default() -> Self {
        SuperBlock {
            s_inodes_count: 0,
            s_blocks_count: 0,
            s_r_blocks_count: 0,
            s_free_blocks_count: 0,
            s_free_inodes_count: 0,
            s_first_data_block: 0,
            s_log_block_size: 0,
            s_log_frag_size: 0,
            s_blocks_per_group: 0,
            s_frags_per_group: 0,
            s_inodes_per_group: 0,
            s_mtime: 0,
            s_wtime: 0,
            s_mnt_count: 0,
            s_max_mnt_count: 0,
            s_magic: EXT2_SUPER_MAGIC,
            s_state: 1,
            s_errors: 1,
            s_minor_rev_level: 0,
            s_lastcheck: 0,
            s_checkinterval: 0,
            s_creator_os: 0,
            s_rev_level: 1,
            s_def_resuid: 0,
            s_def_resgid: 0,
            s_first_ino: 11,
            s_inode_size: 128,
            s_block_group_nr: 0,
            s_feature_compat: 0,
            s_feature_incompat: 0,
            s_feature_ro_compat: 0,
            s_uuid: [0u8; 16],
            s_volume_name: [0u8; 16],
            s_last_mounted: [0u8; 64],
            s_algo_bitmap: 0,
            reserved: vec![0u8; RESERVED_TAIL_SIZE],
        }
    }
}

impl SuperBlock {
    pub fn block_size(&self) -> usize {
        1024usize << self.s_log_block_size
    }

    pub fn is_valid(&self) -> bool {
        self.s_magic == EXT2_SUPER_MAGIC
    }

    pub fn block_groups_count(&self) -> u32 {
        self.s_blocks_count.div_ceil(self.s_blocks_per_group)
    }

    /// `2 << s_log_block_size`: sectors per filesystem block, the unit
    /// `i_blocks` is expressed in (§3, §4.4).
    pub fn sectors_per_block(&self) -> u32 {
        2u32 << self.s_log_block_size
    }

    /// Block holding the block-group descriptor table: 1 when the block
    /// size exceeds 1024 bytes (the superblock alone fills block 0),
    /// else 2 (superblock occupies block 1 at 1024-byte blocks).
    pub fn bgdt_start_block(&self) -> u32 {
        if self.block_size() > 1024 { 1 } else { 2 }
    }
}

impl DvSerialize for SuperBlock {
    fn serialize(&self, e: Endianness, target: &mut [u8]) -> Result<usize, DvSerErr> {
        if target.len() < SUPERBLOCK_SIZE {
            return Err(DvSerErr::BufferTooSmall);
        }
        let mut off = 0;
        macro_rules! put {
            ($field:expr) => {{
                off += $field.serialize(e, &mut target[off..])?;
            }};
        }
        put!(self.s_inodes_count);
        put!(self.s_blocks_count);
        put!(self.s_r_blocks_count);
        put!(self.s_free_blocks_count);
        put!(self.s_free_inodes_count);
        put!(self.s_first_data_block);
        put!(self.s_log_block_size);
        put!(self.s_log_frag_size);
        put!(self.s_blocks_per_group);
        put!(self.s_frags_per_group);
        put!(self.s_inodes_per_group);
        put!(self.s_mtime);
        put!(self.s_wtime);
        put!(self.s_mnt_count);
        put!(self.s_max_mnt_count);
        put!(self.s_magic);
        put!(self.s_state);
        put!(self.s_errors);
        put!(self.s_minor_rev_level);
        put!(self.s_lastcheck);
        put!(self.s_checkinterval);
        put!(self.s_creator_os);
        put!(self.s_rev_level);
        put!(self.s_def_resuid);
        put!(self.s_def_resgid);
        put!(self.s_first_ino);
        put!(self.s_inode_size);
        put!(self.s_block_group_nr);
        put!(self.s_feature_compat);
        put!(self.s_feature_incompat);
        put!(self.s_feature_ro_compat);
        put!(self.s_uuid);
        put!(self.s_volume_name);
        put!(self.s_last_mounted);
        put!(self.s_algo_bitmap);
        target[off..off + self.reserved.len()].copy_from_slice(&self.reserved);
        off += self.reserved.len();
        Ok(off)
    }
}

impl DvDeserialize for SuperBlock {
    fn deserialize(e: Endianness, input: &[u8]) -> Result<(Self, usize), DvDeErr> {
        if input.len() < SUPERBLOCK_SIZE {
            return Err(DvDeErr::WrongBufferSize);
        }
        let mut off = 0;
        macro_rules! get {
            ($t:ty) => {{
                let (v, n) = <$t>::deserialize(e, &input[off..])?;
                off += n;
                v
            }};
        }
        let sb = SuperBlock {
            s_inodes_count: get!(u32),
            s_blocks_count: get!(u32),
            s_r_blocks_count: get!(u32),
            s_free_blocks_count: get!(u32),
            s_free_inodes_count: get!(u32),
            s_first_data_block: get!(u32),
            s_log_block_size: get!(u32),
            s_log_frag_size: get!(u32),
            s_blocks_per_group: get!(u32),
            s_frags_per_group: get!(u32),
            s_inodes_per_group: get!(u32),
            s_mtime: get!(u32),
            s_wtime: get!(u32),
            s_mnt_count: get!(u16),
            s_max_mnt_count: get!(u16),
            s_magic: get!(u16),
            s_state: get!(u16),
            s_errors: get!(u16),
            s_minor_rev_level: get!(u16),
            s_lastcheck: get!(u32),
            s_checkinterval: get!(u32),
            s_creator_os: get!(u32),
            s_rev_level: get!(u32),
            s_def_resuid: get!(u16),
            s_def_resgid: get!(u16),
            s_first_ino: get!(u32),
            s_inode_size: get!(u16),
            s_block_group_nr: get!(u16),
            s_feature_compat: get!(u32),
            s_feature_incompat: get!(u32),
            s_feature_ro_compat: get!(u32),
            s_uuid: get!([u8; 16]),
            s_volume_name: get!([u8; 16]),
            s_last_mounted: get!([u8; 64]),
            s_algo_bitmap: get!(u32),
            reserved: input[off..SUPERBLOCK_SIZE].to_vec(),
        };
        off = SUPERBLOCK_SIZE;
        Ok((sb, off))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let mut sb = SuperBlock::default();
        sb.s_blocks_count = 4096;
        sb.s_inodes_count = 512;
        sb.s_blocks_per_group = 8192;
        sb.s_inodes_per_group = 512;
        let mut buf = [0u8; SUPERBLOCK_SIZE];
        sb.serialize(Endianness::Little, &mut buf).unwrap();
        let (back, n) = SuperBlock::deserialize(Endianness::Little, &buf).unwrap();
        assert_eq!(n, SUPERBLOCK_SIZE);
        assert_eq!(back.s_blocks_count, 4096);
        assert_eq!(back.s_magic, EXT2_SUPER_MAGIC);
        assert!(back.is_valid());
    }

    #[test]
    fn block_size_from_log() {
        let mut sb = SuperBlock::default();
        sb.s_log_block_size = 0;
        assert_eq!(sb.block_size(), 1024);
        sb.s_log_block_size = 2;
        assert_eq!(sb.block_size(), 4096);
    }
}
