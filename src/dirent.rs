//! Directory entry record (§3): inode number, record length, name length,
//! file type, name bytes — variable length, laid out contiguously within a
//! directory's data blocks. Manual (de)serialization follows the teacher's
//! own hand-written `DvSerialize`/`DvDeserialize` impl for `DirEntry` in
//! `ext2/mod.rs` (this record's length depends on `name_len`, so it cannot
//! use the fixed-width derive path the other on-disk records use).

use dvida_serialize::{DvDeErr, DvDeserialize, DvSerErr, DvSerialize, Endianness};

use crate::inode::EXT2_FT_UNKNOWN;

/// Bytes preceding the name: inode(4) + rec_len(2) + name_len(1) + file_type(1).
pub const DIRENT_HEADER_SIZE: usize = 8;

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub inode: u32,
    pub rec_len: u16,
    pub file_type: u8,
    pub name: String,
}

impl DirEntry {
    pub fn tombstone(rec_len: u16) -> Self {
        DirEntry {
            inode: 0,
            rec_len,
            file_type: EXT2_FT_UNKNOWN,
            name: String::new(),
        }
    }

    pub fn is_live(&self) -> bool {
        self.inode != 0
    }

    pub fn name_len(&self) -> u8 {
        self.name.len() as u8
    }

    /// Minimum 4-byte-aligned record length for this entry's current name.
    pub fn min_rec_len(&self) -> u16 {
        let raw = DIRENT_HEADER_SIZE + self.name.len();
        raw.next_multiple_of(4) as u16
    }

    pub fn matches_name(&self, query: &str) -> bool {
        self.is_live() && self.name.len() == query.len() && self.name == query
    }
}

impl DvSerialize for DirEntry {
    fn serialize(&self, e: Endianness, target: &mut [u8]) -> Result<usize, DvSerErr> {
        let name_bytes = self.name.as_bytes();
        let needed = DIRENT_HEADER_SIZE + name_bytes.len();
        if target.len() < needed {
            return Err(DvSerErr::BufferTooSmall);
        }
        let mut off = 0;
        off += self.inode.serialize(e, &mut target[off..])?;
        off += self.rec_len.serialize(e, &mut target[off..])?;
        off += self.name_len().serialize(e, &mut target[off..])?;
        off += self.file_type.serialize(e, &mut target[off..])?;
        target[off..off + name_bytes.len()].copy_from_slice(name_bytes);
        off += name_bytes.len();
        Ok(off)
    }
}

impl DvDeserialize for DirEntry {
    fn deserialize(e: Endianness, input: &[u8]) -> Result<(Self, usize), DvDeErr> {
        if input.len() < DIRENT_HEADER_SIZE {
            return Err(DvDeErr::WrongBufferSize);
        }
        let mut off = 0;
        let (inode, n) = u32::deserialize(e, &input[off..])?;
        off += n;
        let (rec_len, n) = u16::deserialize(e, &input[off..])?;
        off += n;
        let (name_len, n) = u8::deserialize(e, &input[off..])?;
        off += n;
        let (file_type, n) = u8::deserialize(e, &input[off..])?;
        off += n;
        let name_len = name_len as usize;
        if input.len() < off + name_len {
            return Err(DvDeErr::WrongBufferSize);
        }
        let name = String::from_utf8_lossy(&input[off..off + name_len]).into_owned();
        off += name_len;
        Ok((
            DirEntry {
                inode,
                rec_len,
                file_type,
                name,
            },
            off,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let de = DirEntry {
            inode: 12,
            rec_len: 1000,
            file_type: crate::inode::EXT2_FT_REG_FILE,
            name: "hello.txt".to_string(),
        };
        let mut buf = [0u8; 64];
        let written = de.serialize(Endianness::Little, &mut buf).unwrap();
        let (back, read) = DirEntry::deserialize(Endianness::Little, &buf[..written]).unwrap();
        assert_eq!(read, written);
        assert_eq!(back.name, "hello.txt");
        assert_eq!(back.inode, 12);
    }

    #[test]
    fn matches_name_requires_equal_length() {
        let de = DirEntry {
            inode: 1,
            rec_len: 16,
            file_type: 1,
            name: "foobar".to_string(),
        };
        assert!(!de.matches_name("foo"));
        assert!(de.matches_name("foobar"));
    }

    #[test]
    fn min_rec_len_is_4_byte_aligned() {
        let de = DirEntry {
            inode: 1,
            rec_len: 0,
            file_type: 1,
            name: "a".to_string(),
        };
        assert_eq!(de.min_rec_len() % 4, 0);
        assert_eq!(de.min_rec_len(), 12);
    }
}
