//! Block-group descriptor (§3): 32 bytes, packed, one per group in the BGDT.

use dvida_serialize::{DvDeErr, DvDeserialize, DvSerErr, DvSerialize, Endianness};

pub const GROUP_DESC_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, Default)]
pub struct GroupDescriptor {
    pub bg_block_bitmap: u32,
    pub bg_inode_bitmap: u32,
    pub bg_inode_table: u32,
    pub bg_free_blocks_count: u16,
    pub bg_free_inodes_count: u16,
    pub bg_used_dirs_count: u16,
    pub bg_pad: u16,
    pub bg_reserved: [u8; 12],
}

impl DvSerialize for GroupDescriptor {
    fn serialize(&self, e: Endianness, target: &mut [u8]) -> Result<usize, DvSerErr> {
        if target.len() < GROUP_DESC_SIZE {
            return Err(DvSerErr::BufferTooSmall);
        }
        let mut off = 0;
        macro_rules! put {
            ($field:expr) => {{
                off += $field.serialize(e, &mut target[off..])?;
            }};
        }
        put!(self.bg_block_bitmap);
        put!(self.bg_inode_bitmap);
        put!(self.bg_inode_table);
        put!(self.bg_free_blocks_count);
        put!(self.bg_free_inodes_count);
        put!(self.bg_used_dirs_count);
        put!(self.bg_pad);
        put!(self.bg_reserved);
        Ok(off)
    }
}

impl DvDeserialize for GroupDescriptor {
    fn deserialize(e: Endianness, input: &[u8]) -> Result<(Self, usize), DvDeErr> {
        if input.len() < GROUP_DESC_SIZE {
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
        let gd = GroupDescriptor {
            bg_block_bitmap: get!(u32),
            bg_inode_bitmap: get!(u32),
            bg_inode_table: get!(u32),
            bg_free_blocks_count: get!(u16),
            bg_free_inodes_count: get!(u16),
            bg_used_dirs_count: get!(u16),
            bg_pad: get!(u16),
            bg_reserved: get!([u8; 12]),
        };
        Ok((gd, off))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let gd = GroupDescriptor {
            bg_block_bitmap: 3,
            bg_inode_bitmap: 4,
            bg_inode_table: 5,
            bg_free_blocks_count: 100,
            bg_free_inodes_count: 50,
            bg_used_dirs_count: 1,
            ..Default::default()
        };
        let mut buf = [0u8; GROUP_DESC_SIZE];
        gd.serialize(Endianness::Little, &mut buf).unwrap();
        let (back, n) = GroupDescriptor::deserialize(Endianness::Little, &buf).unwrap();
        assert_eq!(n, GROUP_DESC_SIZE);
        assert_eq!(back.bg_inode_table, 5);
        assert_eq!(back.bg_free_blocks_count, 100);
    }
}
