//! On-disk encoding of sorted tables.
//!
//! Layout:
//!   [data block]* [range-del block] [bloom block] [props block] [index block] [footer]
//!
//! Every block: [codec u8][raw_len u32][payload][crc32c u32] where the CRC
//! covers codec, raw_len and payload. Payload is zstd-compressed when codec=1.
//! Footer (72 B): offsets/lengths of index, range-del, bloom and props blocks
//! followed by TABLE_MAGIC.

use anyhow::{Context, Result};
use byteorder::{ByteOrder, LittleEndian};

use crate::config::Codec;
use crate::consts::{
    BLOCK_HDR_LEN, BLOCK_TRAILER_LEN, CODEC_NONE, CODEC_ZSTD, ENTRY_HDR_LEN, INDEX_HDR_LEN,
    PROPS_LEN, RDEL_HDR_LEN, TABLE_FOOTER_LEN, TABLE_MAGIC,
};
use crate::error::LsmError;
use crate::keys::{decode_trailer, InternalKey, SeqNum};
use crate::rangedel::RangeTombstone;

fn corruption(msg: String) -> anyhow::Error {
    LsmError::Corruption(msg).into()
}

// ---------------- blocks ----------------

/// Frame a raw payload as a stored block (optionally compressed).
pub(crate) fn encode_block(raw: &[u8], codec: Codec, zstd_level: i32) -> Result<Vec<u8>> {
    let (code, payload) = match codec {
        Codec::Zstd => {
            let z = zstd::bulk::compress(raw, zstd_level).context("zstd compress block")?;
            if z.len() < raw.len() {
                (CODEC_ZSTD, z)
            } else {
                (CODEC_NONE, raw.to_vec())
            }
        }
        Codec::None => (CODEC_NONE, raw.to_vec()),
    };

    let mut out = Vec::with_capacity(BLOCK_HDR_LEN + payload.len() + BLOCK_TRAILER_LEN);
    out.push(code);
    let mut len = [0u8; 4];
    LittleEndian::write_u32(&mut len, raw.len() as u32);
    out.extend_from_slice(&len);
    out.extend_from_slice(&payload);
    let crc = crc32c::crc32c(&out);
    let mut c = [0u8; 4];
    LittleEndian::write_u32(&mut c, crc);
    out.extend_from_slice(&c);
    Ok(out)
}

/// Verify and unframe a stored block.
pub(crate) fn decode_block(buf: &[u8]) -> Result<Vec<u8>> {
    if buf.len() < BLOCK_HDR_LEN + BLOCK_TRAILER_LEN {
        return Err(corruption(format!("block too short ({} B)", buf.len())));
    }
    let body_end = buf.len() - BLOCK_TRAILER_LEN;
    let stored = LittleEndian::read_u32(&buf[body_end..]);
    let actual = crc32c::crc32c(&buf[..body_end]);
    if stored != actual {
        return Err(corruption(format!(
            "block checksum mismatch: stored={:#010x} actual={:#010x}",
            stored, actual
        )));
    }
    let raw_len = LittleEndian::read_u32(&buf[1..5]) as usize;
    let payload = &buf[BLOCK_HDR_LEN..body_end];
    match buf[0] {
        CODEC_NONE => {
            if payload.len() != raw_len {
                return Err(corruption(format!(
                    "block length mismatch: {} vs {}",
                    payload.len(),
                    raw_len
                )));
            }
            Ok(payload.to_vec())
        }
        CODEC_ZSTD => {
            let raw = zstd::bulk::decompress(payload, raw_len).context("zstd decompress block")?;
            if raw.len() != raw_len {
                return Err(corruption(format!(
                    "decompressed length mismatch: {} vs {}",
                    raw.len(),
                    raw_len
                )));
            }
            Ok(raw)
        }
        other => Err(corruption(format!("unknown block codec {}", other))),
    }
}

// ---------------- data entries ----------------

pub(crate) fn put_entry(out: &mut Vec<u8>, key: &InternalKey, value: &[u8]) {
    let mut hdr = [0u8; ENTRY_HDR_LEN];
    LittleEndian::write_u32(&mut hdr[0..4], key.user_key.len() as u32);
    LittleEndian::write_u32(&mut hdr[4..8], value.len() as u32);
    LittleEndian::write_u64(&mut hdr[8..16], key.trailer());
    out.extend_from_slice(&hdr);
    out.extend_from_slice(&key.user_key);
    out.extend_from_slice(value);
}

pub(crate) fn decode_entries(raw: &[u8]) -> Result<Vec<(InternalKey, Vec<u8>)>> {
    let mut out = Vec::new();
    let mut off = 0usize;
    while off < raw.len() {
        if off + ENTRY_HDR_LEN > raw.len() {
            return Err(corruption(format!("truncated entry header at {}", off)));
        }
        let klen = LittleEndian::read_u32(&raw[off..off + 4]) as usize;
        let vlen = LittleEndian::read_u32(&raw[off + 4..off + 8]) as usize;
        let (seq, kind) = decode_trailer(LittleEndian::read_u64(&raw[off + 8..off + 16]))?;
        let base = off + ENTRY_HDR_LEN;
        let end = base.saturating_add(klen).saturating_add(vlen);
        if end > raw.len() {
            return Err(corruption(format!("truncated entry body at {}", off)));
        }
        out.push((
            InternalKey::new(&raw[base..base + klen], seq, kind),
            raw[base + klen..end].to_vec(),
        ));
        off = end;
    }
    Ok(out)
}

// ---------------- range tombstones ----------------

pub(crate) fn put_tombstone(out: &mut Vec<u8>, t: &RangeTombstone) {
    let mut hdr = [0u8; RDEL_HDR_LEN];
    LittleEndian::write_u32(&mut hdr[0..4], t.start.len() as u32);
    LittleEndian::write_u32(&mut hdr[4..8], t.end.len() as u32);
    LittleEndian::write_u64(&mut hdr[8..16], t.seq);
    out.extend_from_slice(&hdr);
    out.extend_from_slice(&t.start);
    out.extend_from_slice(&t.end);
}

pub(crate) fn decode_tombstones(raw: &[u8]) -> Result<Vec<RangeTombstone>> {
    let mut out = Vec::new();
    let mut off = 0usize;
    while off < raw.len() {
        if off + RDEL_HDR_LEN > raw.len() {
            return Err(corruption(format!("truncated tombstone header at {}", off)));
        }
        let slen = LittleEndian::read_u32(&raw[off..off + 4]) as usize;
        let elen = LittleEndian::read_u32(&raw[off + 4..off + 8]) as usize;
        let seq = LittleEndian::read_u64(&raw[off + 8..off + 16]);
        let base = off + RDEL_HDR_LEN;
        let end = base.saturating_add(slen).saturating_add(elen);
        if end > raw.len() {
            return Err(corruption(format!("truncated tombstone body at {}", off)));
        }
        out.push(RangeTombstone::new(&raw[base..base + slen], &raw[base + slen..end], seq));
        off = end;
    }
    Ok(out)
}

// ---------------- index ----------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IndexEntry {
    pub off: u64,
    pub len: u64,
    /// First and last user key stored in the block.
    pub first: Vec<u8>,
    pub last: Vec<u8>,
}

pub(crate) fn put_index_entry(out: &mut Vec<u8>, e: &IndexEntry) {
    let mut hdr = [0u8; INDEX_HDR_LEN];
    LittleEndian::write_u64(&mut hdr[0..8], e.off);
    LittleEndian::write_u64(&mut hdr[8..16], e.len);
    LittleEndian::write_u32(&mut hdr[16..20], e.first.len() as u32);
    LittleEndian::write_u32(&mut hdr[20..24], e.last.len() as u32);
    out.extend_from_slice(&hdr);
    out.extend_from_slice(&e.first);
    out.extend_from_slice(&e.last);
}

pub(crate) fn decode_index(raw: &[u8]) -> Result<Vec<IndexEntry>> {
    let mut out = Vec::new();
    let mut off = 0usize;
    while off < raw.len() {
        if off + INDEX_HDR_LEN > raw.len() {
            return Err(corruption(format!("truncated index entry at {}", off)));
        }
        let boff = LittleEndian::read_u64(&raw[off..off + 8]);
        let blen = LittleEndian::read_u64(&raw[off + 8..off + 16]);
        let flen = LittleEndian::read_u32(&raw[off + 16..off + 20]) as usize;
        let llen = LittleEndian::read_u32(&raw[off + 20..off + 24]) as usize;
        let base = off + INDEX_HDR_LEN;
        let end = base.saturating_add(flen).saturating_add(llen);
        if end > raw.len() {
            return Err(corruption(format!("truncated index keys at {}", off)));
        }
        out.push(IndexEntry {
            off: boff,
            len: blen,
            first: raw[base..base + flen].to_vec(),
            last: raw[base + flen..end].to_vec(),
        });
        off = end;
    }
    Ok(out)
}

// ---------------- props ----------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Props {
    pub smallest_seq: SeqNum,
    pub largest_seq: SeqNum,
    pub num_entries: u64,
    pub num_range_dels: u64,
}

impl Props {
    pub(crate) fn encode(&self) -> [u8; PROPS_LEN] {
        let mut b = [0u8; PROPS_LEN];
        LittleEndian::write_u64(&mut b[0..8], self.smallest_seq);
        LittleEndian::write_u64(&mut b[8..16], self.largest_seq);
        LittleEndian::write_u64(&mut b[16..24], self.num_entries);
        LittleEndian::write_u64(&mut b[24..32], self.num_range_dels);
        b
    }

    pub(crate) fn decode(raw: &[u8]) -> Result<Self> {
        if raw.len() != PROPS_LEN {
            return Err(corruption(format!("props block has {} B", raw.len())));
        }
        Ok(Self {
            smallest_seq: LittleEndian::read_u64(&raw[0..8]),
            largest_seq: LittleEndian::read_u64(&raw[8..16]),
            num_entries: LittleEndian::read_u64(&raw[16..24]),
            num_range_dels: LittleEndian::read_u64(&raw[24..32]),
        })
    }
}

// ---------------- footer ----------------

/// (offset, length) of a stored block.
pub(crate) type Handle = (u64, u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Footer {
    pub index: Handle,
    pub range_del: Handle,
    pub bloom: Handle,
    pub props: Handle,
}

impl Footer {
    pub(crate) fn encode(&self) -> [u8; TABLE_FOOTER_LEN] {
        let mut b = [0u8; TABLE_FOOTER_LEN];
        let hs = [self.index, self.range_del, self.bloom, self.props];
        for (i, (off, len)) in hs.iter().enumerate() {
            LittleEndian::write_u64(&mut b[i * 16..i * 16 + 8], *off);
            LittleEndian::write_u64(&mut b[i * 16 + 8..i * 16 + 16], *len);
        }
        b[64..72].copy_from_slice(TABLE_MAGIC);
        b
    }

    pub(crate) fn decode(raw: &[u8]) -> Result<Self> {
        if raw.len() != TABLE_FOOTER_LEN {
            return Err(corruption(format!("footer has {} B", raw.len())));
        }
        if &raw[64..72] != TABLE_MAGIC {
            return Err(corruption("bad table magic".to_string()));
        }
        let h = |i: usize| {
            (
                LittleEndian::read_u64(&raw[i * 16..i * 16 + 8]),
                LittleEndian::read_u64(&raw[i * 16 + 8..i * 16 + 16]),
            )
        };
        Ok(Self {
            index: h(0),
            range_del: h(1),
            bloom: h(2),
            props: h(3),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::kind_of;
    use crate::keys::Kind;

    #[test]
    fn block_detects_bit_flip() {
        let mut raw = Vec::new();
        put_entry(&mut raw, &InternalKey::new(b"k", 9, Kind::Set), b"value");
        let mut blk = encode_block(&raw, Codec::None, 0).unwrap();
        assert_eq!(decode_block(&blk).unwrap(), raw);

        blk[BLOCK_HDR_LEN] ^= 0x40;
        let err = decode_block(&blk).unwrap_err();
        assert!(matches!(kind_of(&err), Some(LsmError::Corruption(_))));
    }

    #[test]
    fn zstd_block_is_smaller_and_decodes() {
        let mut raw = Vec::new();
        for i in 0..200u64 {
            let k = format!("key-{:05}", i);
            put_entry(&mut raw, &InternalKey::new(k.as_bytes(), i + 1, Kind::Set), &[7u8; 64]);
        }
        let blk = encode_block(&raw, Codec::Zstd, 3).unwrap();
        assert_eq!(blk[0], CODEC_ZSTD);
        assert!(blk.len() < raw.len());
        let back = decode_entries(&decode_block(&blk).unwrap()).unwrap();
        assert_eq!(back.len(), 200);
        assert_eq!(back[199].0.seq, 200);
    }

    #[test]
    fn footer_rejects_bad_magic() {
        let f = Footer {
            index: (1, 2),
            range_del: (3, 4),
            bloom: (5, 6),
            props: (7, 8),
        };
        let mut b = f.encode();
        assert_eq!(Footer::decode(&b).unwrap(), f);
        b[70] = b'X';
        assert!(Footer::decode(&b).is_err());
    }
}
