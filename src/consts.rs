//! Общие константы форматов (sorted tables, manifest, object names).

// -------- Object names --------
pub const TABLE_EXT: &str = "sst";
pub const MANIFEST_PREFIX: &str = "MANIFEST-";
pub const LOCK_FILE: &str = "LOCK";
pub const TMP_SUFFIX: &str = ".tmp";

// -------- Sorted table --------
pub const TABLE_MAGIC: &[u8; 8] = b"QLSMTB01";
// [index_off u64][index_len u64][rdel_off u64][rdel_len u64]
// [bloom_off u64][bloom_len u64][props_off u64][props_len u64][magic 8]
pub const TABLE_FOOTER_LEN: usize = 72;
// [codec u8][raw_len u32] ... payload ... [crc32c u32]
pub const BLOCK_HDR_LEN: usize = 5;
pub const BLOCK_TRAILER_LEN: usize = 4;

pub const CODEC_NONE: u8 = 0;
pub const CODEC_ZSTD: u8 = 1;

// Data entry: [klen u32][vlen u32][trailer u64]
pub const ENTRY_HDR_LEN: usize = 16;
// Range tombstone: [slen u32][elen u32][seq u64]
pub const RDEL_HDR_LEN: usize = 16;
// Index entry: [off u64][len u64][first_klen u32][last_klen u32]
pub const INDEX_HDR_LEN: usize = 24;
// Properties: [smallest_seq u64][largest_seq u64][num_entries u64][num_range_dels u64]
pub const PROPS_LEN: usize = 32;

// -------- Manifest --------
pub const MANIFEST_VERSION: u32 = 1;
