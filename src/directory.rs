//! Directory walker and the facade's create/remove entry manipulation
//! (§4.6, §4.8). Path resolution follows `dir_lookup`/`dir_lookup_current`
//! in the original `directory.c`; entry insertion/removal follows
//! `filesys_create`/`filesys_remove` in `filesys.c`, with the name-length
//! comparison bug and the NULL-predecessor crash both fixed per §9.

use std::sync::Arc;

use dvida_serialize::{DvDeserialize, DvSerialize, Endianness};
use log::debug;

use crate::address_tree;
use crate::byte_io;
use crate::dirent::DirEntry;
use crate::error::{Ext2Error, Result};
use crate::fs::Ext2Fs;
use crate::inode::{FileKind, Inode, EXT2_FT_DIR, EXT2_FT_REG_FILE, ROOT_INODE};

fn split_components(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn read_whole_directory(fs: &Ext2Fs, dir: &Inode) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; dir.i_size as usize];
    byte_io::read_at(fs, dir, &mut buf, 0)?;
    Ok(buf)
}

fn write_whole_directory(fs: &Ext2Fs, ino: u32, inode: &mut Inode, data: &[u8]) -> Result<()> {
    byte_io::write_at(fs, inode, data, 0)?;
    fs.write_inode(ino, inode)
}

/// Scans one directory's data for a live entry with exactly `name`
/// (§9: requires equal length, not merely an equal-length prefix).
fn lookup_in_dir(fs: &Ext2Fs, dir: &Inode, name: &str) -> Result<Option<DirEntry>> {
    let data = read_whole_directory(fs, dir)?;
    let mut off = 0usize;
    while off < data.len() {
        let (entry, _) = DirEntry::deserialize(Endianness::Little, &data[off..])
            .map_err(|_| Ext2Error::Corrupt("directory entry deserialization failed".into()))?;
        if entry.matches_name(name) {
            return Ok(Some(entry));
        }
        if entry.rec_len == 0 {
            break;
        }
        off += entry.rec_len as usize;
    }
    Ok(None)
}

/// Resolves a sequence of path components (each expected to be a
/// directory) down from the root, returning the final directory's inode
/// number and snapshot. An empty slice resolves to the root itself.
fn get_directory_inode(fs: &Ext2Fs, comps: &[&str]) -> Result<(u32, Inode)> {
    let mut current_ino = ROOT_INODE;
    let mut current = fs.read_inode(ROOT_INODE)?;
    for comp in comps {
        if !current.is_directory() {
            return Err(Ext2Error::NotADirectory((*comp).to_string()));
        }
        let entry = lookup_in_dir(fs, &current, comp)?
            .ok_or_else(|| Ext2Error::NotFound((*comp).to_string()))?;
        if entry.file_type != EXT2_FT_DIR {
            return Err(Ext2Error::NotADirectory((*comp).to_string()));
        }
        current_ino = entry.inode;
        current = fs.read_inode(current_ino)?;
    }
    Ok((current_ino, current))
}

/// Resolves `path` to its parent directory and, if present, the leaf
/// entry (§4.6). An empty path resolves to the root with no leaf entry.
pub fn walk_path(fs: &Arc<Ext2Fs>, path: &str) -> Result<(Inode, Option<DirEntry>)> {
    let comps = split_components(path);
    let Some((&leaf, parent_comps)) = comps.split_last() else {
        let root = fs.read_inode(ROOT_INODE)?;
        return Ok((root, None));
    };
    let (_, parent) = get_directory_inode(fs, parent_comps)?;
    let entry = lookup_in_dir(fs, &parent, leaf)?;
    Ok((parent, entry))
}

/// Lists the live entries of the directory at `path`, in on-disk order.
/// Grounded in the original `print_directory`'s walk, returning records
/// instead of writing them to a terminal.
pub fn list(fs: &Arc<Ext2Fs>, path: &str) -> Result<Vec<DirEntry>> {
    let (parent, entry) = walk_path(fs, path)?;
    let dir = match entry {
        None => parent,
        Some(e) => {
            if e.file_type != EXT2_FT_DIR {
                return Err(Ext2Error::NotADirectory(path.to_string()));
            }
            fs.read_inode(e.inode)?
        }
    };

    let data = read_whole_directory(fs, &dir)?;
    let mut out = Vec::new();
    let mut off = 0usize;
    while off < data.len() {
        let (e, _) = DirEntry::deserialize(Endianness::Little, &data[off..])
            .map_err(|_| Ext2Error::Corrupt("directory entry deserialization failed".into()))?;
        if e.rec_len == 0 {
            break;
        }
        if e.is_live() {
            out.push(e.clone());
        }
        off += e.rec_len as usize;
    }
    Ok(out)
}

pub fn create(
    fs: &Arc<Ext2Fs>,
    path: &str,
    initial_size: u32,
    kind: FileKind,
    perm: u16,
) -> Result<()> {
    let comps = split_components(path);
    let Some((&leaf_name, parent_comps)) = comps.split_last() else {
        return Err(Ext2Error::NotADirectory("/".to_string()));
    };

    let (parent_ino, mut parent_dir) = get_directory_inode(fs, parent_comps)?;
    if lookup_in_dir(fs, &parent_dir, leaf_name)?.is_some() {
        return Err(Ext2Error::AlreadyExists(path.to_string()));
    }

    let mut dir_data = read_whole_directory(fs, &parent_dir)?;
    let block_size = fs.block_size();

    // Walk to the last entry in the directory's final block. Each block's
    // own last entry has rec_len running to that block's end, so this
    // walk (mirroring dir_get_next's plain "< file_size" bound) steps
    // straight across block boundaries without having to track them.
    let mut off = 0usize;
    loop {
        let (entry, _) = DirEntry::deserialize(Endianness::Little, &dir_data[off..])
            .map_err(|_| Ext2Error::Corrupt("directory entry deserialization failed".into()))?;
        let next = off + entry.rec_len as usize;
        if entry.rec_len == 0 || next >= dir_data.len() {
            break;
        }
        off = next;
    }
    let last_off = off;
    let (mut last_entry, _) = DirEntry::deserialize(Endianness::Little, &dir_data[last_off..])
        .map_err(|_| Ext2Error::Corrupt("directory entry deserialization failed".into()))?;

    let block_end = (last_off / block_size + 1) * block_size;
    let new_off = if last_entry.is_live() {
        let shrunk = last_entry.min_rec_len();
        last_entry.rec_len = shrunk;
        last_entry
            .serialize(Endianness::Little, &mut dir_data[last_off..])
            .map_err(|_| Ext2Error::Corrupt("directory entry serialization failed".into()))?;
        last_off + shrunk as usize
    } else {
        last_off
    };

    if new_off >= block_end {
        return Err(Ext2Error::Corrupt(
            "no room left in directory's final block for a new entry".into(),
        ));
    }

    let inode_num = fs.alloc_inode()?;
    let new_entry = DirEntry {
        inode: inode_num,
        rec_len: (block_end - new_off) as u16,
        file_type: kind.dirent_type(),
        name: leaf_name.to_string(),
    };
    new_entry
        .serialize(Endianness::Little, &mut dir_data[new_off..])
        .map_err(|_| Ext2Error::Corrupt("directory entry serialization failed".into()))?;

    let mut inode = Inode::new(kind, perm);
    address_tree::resize(fs, &mut inode, initial_size)?;
    fs.write_inode(inode_num, &inode)?;

    write_whole_directory(fs, parent_ino, &mut parent_dir, &dir_data)?;
    debug!("created {path} as inode {inode_num}");
    Ok(())
}

pub fn remove(fs: &Arc<Ext2Fs>, path: &str) -> Result<()> {
    let (_, entry) = walk_path(fs, path)?;
    let entry = entry.ok_or_else(|| Ext2Error::NotFound(path.to_string()))?;
    if entry.file_type != EXT2_FT_REG_FILE {
        return Err(Ext2Error::NotARegularFile(path.to_string()));
    }

    let comps = split_components(path);
    let (_, parent_comps) = comps.split_last().expect("walk_path already validated path has a leaf");
    let (parent_ino, mut parent_dir) = get_directory_inode(fs, parent_comps)?;
    let mut dir_data = read_whole_directory(fs, &parent_dir)?;

    let mut prev_off = None;
    let mut off = 0usize;
    let found_off = loop {
        let (e, _) = DirEntry::deserialize(Endianness::Little, &dir_data[off..])
            .map_err(|_| Ext2Error::Corrupt("directory entry deserialization failed".into()))?;
        if e.matches_name(&entry.name) {
            break off;
        }
        if e.rec_len == 0 || off + e.rec_len as usize >= dir_data.len() {
            return Err(Ext2Error::Corrupt(format!(
                "entry for {path} vanished from its parent directory mid-removal"
            )));
        }
        prev_off = Some(off);
        off += e.rec_len as usize;
    };
    let (file_entry, _) = DirEntry::deserialize(Endianness::Little, &dir_data[found_off..])
        .map_err(|_| Ext2Error::Corrupt("directory entry deserialization failed".into()))?;

    let mut file_inode = fs.read_inode(file_entry.inode)?;
    address_tree::resize(fs, &mut file_inode, 0)?;
    fs.write_inode(file_entry.inode, &Inode::default())?;
    fs.free_inode(file_entry.inode)?;

    match prev_off {
        Some(p_off) => {
            let (mut prev_entry, _) = DirEntry::deserialize(Endianness::Little, &dir_data[p_off..])
                .map_err(|_| Ext2Error::Corrupt("directory entry deserialization failed".into()))?;
            if prev_entry.is_live() {
                prev_entry.rec_len += file_entry.rec_len;
                prev_entry
                    .serialize(Endianness::Little, &mut dir_data[p_off..])
                    .map_err(|_| Ext2Error::Corrupt("directory entry serialization failed".into()))?;
            }
        }
        None => {
            // The removed entry was the directory's first record. The
            // original C has no predecessor to fold the slot into here
            // and dereferences a null pointer; this port tombstones the
            // slot in place instead.
            let tomb = DirEntry::tombstone(file_entry.rec_len);
            tomb.serialize(Endianness::Little, &mut dir_data[found_off..])
                .map_err(|_| Ext2Error::Corrupt("directory entry serialization failed".into()))?;
        }
    }

    write_whole_directory(fs, parent_ino, &mut parent_dir, &dir_data)?;
    debug!("removed {path}");
    Ok(())
}
