/*
    trackfile

    --------------------------------------------------------------------------

    src/filesystem_identity.rs

    Reading the reserved blocks' DOS-type magic and boot checksum, and --
    when the image looks like an Amiga default filesystem -- validating and
    extracting the root block's volume identity. Parsed with `binrw`: read
    the fixed-layout block into a typed struct, then validate it.
*/

use crate::checksum::boot_block_sum;
use binrw::BinRead;
use std::io::Cursor;

pub const BOOTSECTS: usize = 2;
pub const BLOCK_SIZE: usize = 512;
const HASH_TABLE_SIZE: usize = 72;
const BM_PAGES_COUNT: usize = 25;

/// The DOS-type magic word occupying the first four bytes of the image,
/// identifying the filesystem flavor of the reserved blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DosType(pub [u8; 4]);

impl DosType {
    /// True when the top three bytes spell `"DOS"`, i.e. this is some Amiga
    /// default filesystem flavor (OFS/FFS, with or without international/
    /// dircache/long-name bits in the low flavor byte).
    pub fn is_amiga_dos(&self) -> bool {
        &self.0[0..3] == b"DOS"
    }
}

/// What admission records about a unit's reserved blocks and (if present)
/// root block: a filesystem-identity snapshot.
#[derive(Debug, Clone)]
pub struct FilesystemIdentity {
    pub dos_type: DosType,
    pub boot_checksum: u32,
    pub volume: Option<VolumeIdentity>,
}

/// The Amiga root block's volume name and three-word creation timestamp,
/// the two pieces of data volume-collision detection compares.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct VolumeIdentity {
    pub name: String,
    /// (days since 1978-01-01, minutes past midnight, ticks past the minute).
    pub creation: (u32, u32, u32),
}

/// Read the reserved blocks (`BOOTSECTS * 512` bytes starting at offset 0)
/// and return the DOS-type magic plus the boot-block additive checksum.
pub fn read_boot_identity(reserved: &[u8]) -> (DosType, u32) {
    debug_assert!(reserved.len() >= BOOTSECTS * BLOCK_SIZE);
    let dos_type = DosType([reserved[0], reserved[1], reserved[2], reserved[3]]);

    let word_count = (BOOTSECTS * BLOCK_SIZE) / 4;
    let mut words = Vec::with_capacity(word_count);
    for chunk in reserved[..word_count * 4].chunks_exact(4) {
        words.push(u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    (dos_type, boot_block_sum(&words))
}

#[derive(BinRead)]
#[br(big)]
struct RawRootBlock {
    primary_type: i32,
    header_key: i32,
    high_seq: i32,
    ht_size: i32,
    first_data: i32,
    checksum: u32,
    #[br(count = HASH_TABLE_SIZE)]
    hash_table: Vec<i32>,
    bm_flag: i32,
    #[br(count = BM_PAGES_COUNT)]
    bm_pages: Vec<i32>,
    bm_ext: i32,
    r_days: i32,
    r_mins: i32,
    r_ticks: i32,
    name_len: u8,
    name_bytes: [u8; 30],
    name_pad: u8,
    #[br(pad_before = 8)]
    v_days: i32,
    v_mins: i32,
    v_ticks: i32,
    c_days: i32,
    c_mins: i32,
    c_ticks: i32,
    next_hash: i32,
    parent_dir: i32,
    extension: i32,
    secondary_type: i32,
}

const T_HEADER: i32 = 2;
const ST_ROOT: i32 = 1;

/// Plain wraparound additive sum of 32-bit words, used for the root block's
/// checksum field. Unlike `boot_block_sum`'s end-around-carry convention,
/// a correctly checksummed root block sums to exactly zero, not all-ones.
fn root_block_sum(words: &[u32]) -> u32 {
    words.iter().fold(0u32, |sum, &word| sum.wrapping_add(word))
}

/// Validate and extract an Amiga root block: additive block checksum must
/// be zero, primary/secondary type must be short/root, name length must be
/// in (0, 32), the name must contain no `:` `/` or control chars, own-key/
/// block-count/parent must be 0, and hash-table-size must be >= 72. Returns
/// `None` on any validation failure; this is not an error path, just "not a
/// valid root".
pub fn parse_root_block(block: &[u8; BLOCK_SIZE]) -> Option<VolumeIdentity> {
    let words: Vec<u32> = block
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    if root_block_sum(&words) != 0 {
        return None;
    }

    let mut cursor = Cursor::new(&block[..]);
    let raw = RawRootBlock::read(&mut cursor).ok()?;

    if raw.primary_type != T_HEADER || raw.secondary_type != ST_ROOT {
        return None;
    }
    if raw.ht_size < HASH_TABLE_SIZE as i32 {
        return None;
    }
    if raw.header_key != 0 || raw.high_seq != 0 || raw.parent_dir != 0 {
        return None;
    }
    if raw.name_len == 0 || raw.name_len >= 32 {
        return None;
    }

    let name_len = raw.name_len as usize;
    let name_bytes = &raw.name_bytes[..name_len];
    if name_bytes
        .iter()
        .any(|&b| b == b':' || b == b'/' || b.is_ascii_control())
    {
        return None;
    }
    let name = String::from_utf8_lossy(name_bytes).into_owned();

    Some(VolumeIdentity {
        name,
        creation: (raw.c_days as u32, raw.c_mins as u32, raw.c_ticks as u32),
    })
}

/// Offset of the root block for a disk with `total_blocks` 512-byte blocks
/// and `reserved` reserved (boot) blocks: `(blocks_per_disc - 1
/// + reserved_blocks) / 2`.
pub fn root_block_offset(total_blocks: usize, reserved: usize) -> usize {
    ((total_blocks - 1 + reserved) / 2) * BLOCK_SIZE
}
