//! Shared fixtures for the integration tests: flat DD/HD image builders and
//! an Amiga root-block fixture for the duplicate-volume and bootable-install
//! scenarios. Not a test module itself (no `#[test]`s live here).

#![allow(dead_code)]

use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Once;
use trackfile::filesystem_identity::{BLOCK_SIZE, BOOTSECTS};

static LOGGER: Once = Once::new();

pub fn init_logger() {
    LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

pub const DD_SIZE: usize = 901_120;
pub const HD_SIZE: usize = 1_802_240;

/// A flat, unformatted DD image filled with `fill`.
pub fn dd_image(dir: &Path, name: &str, fill: u8) -> PathBuf {
    flat_image(dir, name, DD_SIZE, fill)
}

/// A flat, unformatted HD image filled with `fill`.
pub fn hd_image(dir: &Path, name: &str, fill: u8) -> PathBuf {
    flat_image(dir, name, HD_SIZE, fill)
}

fn flat_image(dir: &Path, name: &str, size: usize, fill: u8) -> PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(&vec![fill; size]).unwrap();
    path
}

// -- Amiga root block fixture, for duplicate-volume and bootable-install tests --

const T_HEADER: u32 = 2;
const ST_ROOT: u32 = 1;
const HASH_TABLE_SIZE: u32 = 72;

/// Build a well-formed (but unchecksummed) root block directly from byte
/// offsets, matching `RawRootBlock`'s layout in filesystem_identity.rs.
fn build_root_block(name: &str, creation: (u32, u32, u32)) -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    block[0..4].copy_from_slice(&T_HEADER.to_be_bytes());
    block[12..16].copy_from_slice(&HASH_TABLE_SIZE.to_be_bytes());
    block[312..316].copy_from_slice(&u32::MAX.to_be_bytes());
    let name_offset = 432;
    block[name_offset] = name.len() as u8;
    block[name_offset + 1..name_offset + 1 + name.len()].copy_from_slice(name.as_bytes());
    let creation_offset = 484;
    block[creation_offset..creation_offset + 4].copy_from_slice(&creation.0.to_be_bytes());
    block[creation_offset + 4..creation_offset + 8].copy_from_slice(&creation.1.to_be_bytes());
    block[creation_offset + 8..creation_offset + 12].copy_from_slice(&creation.2.to_be_bytes());
    block[508..512].copy_from_slice(&ST_ROOT.to_be_bytes());
    block
}

/// Fill in the checksum field so the block's plain wraparound additive sum
/// nets to zero, as `parse_root_block` requires.
fn with_valid_checksum(mut block: [u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
    block[20..24].copy_from_slice(&0u32.to_be_bytes());
    let words: Vec<u32> = block
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    let sum_without_checksum = words.iter().fold(0u32, |sum, &word| sum.wrapping_add(word));
    let checksum = sum_without_checksum.wrapping_neg();
    block[20..24].copy_from_slice(&checksum.to_be_bytes());
    block
}

/// Build a DD image bearing the `DOS\0` magic and a valid OFS root block
/// naming `volume_name`, so admission's volume-identity extraction has a real
/// root block to parse.
pub fn dd_image_with_volume(dir: &Path, name: &str, volume_name: &str, creation: (u32, u32, u32)) -> PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(&vec![0u8; DD_SIZE]).unwrap();

    f.seek(SeekFrom::Start(0)).unwrap();
    f.write_all(b"DOS\x00").unwrap();

    let total_blocks = DD_SIZE / BLOCK_SIZE;
    let root_offset = trackfile::filesystem_identity::root_block_offset(total_blocks, BOOTSECTS);
    let block = with_valid_checksum(build_root_block(volume_name, creation));
    f.seek(SeekFrom::Start(root_offset as u64)).unwrap();
    f.write_all(&block).unwrap();
    path
}
