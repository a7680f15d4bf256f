//! On-disk inode record (§3): 128 bytes, packed. Field layout and the
//! derived type/permission accessors mirror the teacher's `Inode` struct
//! in `ext2/mod.rs`.

use dvida_serialize::{DvDeErr, DvDeserialize, DvSerErr, DvSerialize, Endianness};

pub const INODE_SIZE: usize = 128;
pub const ROOT_INODE: u32 = 2;
pub const DIRECT_BLOCKS: usize = 12;

pub const EXT2_S_IFMT: u16 = 0xF000;
pub const EXT2_S_IFREG: u16 = 0x8000;
pub const EXT2_S_IFDIR: u16 = 0x4000;

pub const EXT2_FT_UNKNOWN: u8 = 0;
pub const EXT2_FT_REG_FILE: u8 = 1;
pub const EXT2_FT_DIR: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Regular,
    Directory,
}

impl FileKind {
    pub fn mode_bits(self) -> u16 {
        match self {
            FileKind::Regular => EXT2_S_IFREG,
            FileKind::Directory => EXT2_S_IFDIR,
        }
    }

    pub fn dirent_type(self) -> u8 {
        match self {
            FileKind::Regular => EXT2_FT_REG_FILE,
            FileKind::Directory => EXT2_FT_DIR,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Inode {
    pub i_mode: u16,
    pub i_uid: u16,
    pub i_size: u32,
    pub i_atime: u32,
    pub i_ctime: u32,
    pub i_mtime: u32,
    pub i_dtime: u32,
    pub i_gid: u16,
    pub i_links_count: u16,
    pub i_blocks: u32,
    pub i_flags: u32,
    pub i_osd1: u32,
    pub i_block: [u32; 15],
    pub i_generation: u32,
    pub i_file_acl: u32,
    pub i_dir_acl: u32,
    pub i_faddr: u32,
    pub i_osd2: [u8; 12],
}

impl Default for Inode {
    fn default() -> Self {
        Inode {
            i_mode: 0,
            i_uid: 0,
            i_size: 0,
            i_atime: 0,
            i_ctime: 0,
            i_mtime: 0,
            i_dtime: 0,
            i_gid: 0,
            i_links_count: 0,
            i_blocks: 0,
            i_flags: 0,
            i_osd1: 0,
            i_block: [0u32; 15],
            i_generation: 0,
            i_file_acl: 0,
            i_dir_acl: 0,
            i_faddr: 0,
            i_osd2: [0u8; 12],
        }
    }
}

impl Inode {
    pub fn file_type(&self) -> u16 {
        self.i_mode & EXT2_S_IFMT
    }

    pub fn permissions(&self) -> u16 {
        self.i_mode & 0x0FFF
    }

    pub fn is_directory(&self) -> bool {
        self.file_type() == EXT2_S_IFDIR
    }

    pub fn is_regular_file(&self) -> bool {
        self.file_type() == EXT2_S_IFREG
    }

    pub fn new(kind: FileKind, perm: u16) -> Self {
        let mut inode = Inode::default();
        inode.i_mode = kind.mode_bits() | (perm & 0x0FFF);
        inode.i_links_count = 1;
        inode
    }
}

impl DvSerialize for Inode {
    fn serialize(&self, e: Endianness, target: &mut [u8]) -> Result<usize, DvSerErr> {
        if target.len() < INODE_SIZE {
            return Err(DvSerErr::BufferTooSmall);
        }
        let mut off = 0;
        macro_rules! put {
            ($field:expr) => {{
                off += $field.serialize(e, &mut target[off..])?;
            }};
        }
        put!(self.i_mode);
        put!(self.i_uid);
        put!(self.i_size);
        put!(self.i_atime);
        put!(self.i_ctime);
        put!(self.i_mtime);
        put!(self.i_dtime);
        put!(self.i_gid);
        put!(self.i_links_count);
        put!(self.i_blocks);
        put!(self.i_flags);
        put!(self.i_osd1);
        put!(self.i_block);
        put!(self.i_generation);
        put!(self.i_file_acl);
        put!(self.i_dir_acl);
        put!(self.i_faddr);
        put!(self.i_osd2);
        Ok(off)
    }
}

impl DvDeserialize for Inode {
    fn deserialize(e: Endianness, input: &[u8]) -> Result<(Self, usize), DvDeErr> {
        if input.len() < INODE_SIZE {
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
        let inode = Inode {
            i_mode: get!(u16),
            i_uid: get!(u16),
            i_size: get!(u32),
            i_atime: get!(u32),
            i_ctime: get!(u32),
            i_mtime: get!(u32),
            i_dtime: get!(u32),
            i_gid: get!(u16),
            i_links_count: get!(u16),
            i_blocks: get!(u32),
            i_flags: get!(u32),
            i_osd1: get!(u32),
            i_block: get!([u32; 15]),
            i_generation: get!(u32),
            i_file_acl: get!(u32),
            i_dir_acl: get!(u32),
            i_faddr: get!(u32),
            i_osd2: get!([u8; 12]),
        };
        Ok((inode, off))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let mut inode = Inode::new(FileKind::Regular, 0o644);
        inode.i_size = 42;
        inode.i_block[0] = 7;
        let mut buf = [0u8; INODE_SIZE];
        inode.serialize(Endianness::Little, &mut buf).unwrap();
        let (back, n) = Inode::deserialize(Endianness::Little, &buf).unwrap();
        assert_eq!(n, INODE_SIZE);
        assert_eq!(back.i_size, 42);
        assert_eq!(back.i_block[0], 7);
        assert!(back.is_regular_file());
        assert_eq!(back.permissions(), 0o644);
    }
}
