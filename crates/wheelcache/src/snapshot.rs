//! Binary snapshot codec: length-prefixed, type-tagged records over a
//! DEFLATE stream.

use std::io::{self, Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::{CacheError, CodecError, Result};
use crate::store::ShardedStore;
use crate::value::Value;
use crate::wheel::now_nanos;

/// Maximum `keySize` field value (a `u16`).
const MAX_KEY_SIZE: usize = 65_535;
/// Maximum value payload size.
const MAX_VALUE_SIZE: usize = 524_288_000;
/// Bytes of fixed record header preceding the key: `keySize(2) + typeId(1)`.
const RECORD_PREFIX: usize = 3;

/// Writes every unexpired, persistable-type entry across all shards to
/// `writer`, DEFLATE-compressed at the fastest level.
///
/// Entries whose value has no persistable representation (`Value::Opaque`)
/// are silently skipped.
pub(crate) fn save_base_type<W: Write>(store: &ShardedStore, writer: W) -> Result<()> {
    let buffered = io::BufWriter::new(writer);
    let mut encoder = DeflateEncoder::new(buffered, Compression::fast());
    let now = now_nanos();

    let mut first_err: Option<CacheError> = None;
    for shard in store.shards() {
        if first_err.is_some() {
            break;
        }
        shard.scan(now, |key, value, exp_at| {
            if first_err.is_some() {
                return;
            }
            let Some(type_id) = value.type_id() else {
                return;
            };
            if let Err(e) = write_record(&mut encoder, key, value, type_id, exp_at) {
                first_err = Some(e.into());
            }
        });
    }
    if let Some(err) = first_err {
        return Err(err);
    }

    // Finish the compressor (flushes and releases it) before flushing and
    // dropping the underlying buffered writer — see the Open Question
    // writer teardown order.
    let mut buffered = encoder.finish()?;
    buffered.flush()?;
    Ok(())
}

fn write_record<W: Write>(
    w: &mut W,
    key: &[u8],
    value: &Value,
    type_id: u8,
    exp_at: i64,
) -> io::Result<()> {
    if key.len() > MAX_KEY_SIZE {
        // Cannot be represented in the u16 keySize field; skip, same as an
        // unsupported value type.
        return Ok(());
    }

    let mut value_bytes = Vec::new();
    value.encode_into(&mut value_bytes);
    if value_bytes.len() > MAX_VALUE_SIZE {
        return Ok(());
    }

    let key_size = key.len() as u16;
    let total_size = (RECORD_PREFIX + key.len() + value_bytes.len()) as u32;

    w.write_all(&(exp_at as u64).to_be_bytes())?;
    w.write_all(&total_size.to_be_bytes())?;
    w.write_all(&key_size.to_be_bytes())?;
    w.write_all(key)?;
    w.write_all(&[type_id])?;
    w.write_all(&value_bytes)?;
    Ok(())
}

/// Reads records from `reader` (a matching DEFLATE stream) and inserts each
/// unexpired one into `store`. Stops cleanly at EOF; a record whose `exp_at`
/// is already in the past has its bytes consumed and discarded without being
/// decoded or inserted.
pub(crate) fn load_base_type<R: Read>(store: &ShardedStore, reader: R) -> Result<()> {
    let mut decoder = DeflateDecoder::new(reader);
    let now = now_nanos();

    loop {
        let mut header = [0u8; 12];
        if !read_exact_or_clean_eof(&mut decoder, &mut header)? {
            break;
        }
        let exp_at = u64::from_be_bytes(header[0..8].try_into().unwrap()) as i64;
        let total_size = u32::from_be_bytes(header[8..12].try_into().unwrap()) as usize;

        if total_size < RECORD_PREFIX {
            return Err(CodecError::ShortRead { expected: RECORD_PREFIX }.into());
        }

        if exp_at >= 0 && exp_at < now {
            discard(&mut decoder, total_size)?;
            continue;
        }

        let mut key_size_buf = [0u8; 2];
        decoder.read_exact(&mut key_size_buf)?;
        let key_size = u16::from_be_bytes(key_size_buf) as usize;
        if key_size > total_size - RECORD_PREFIX {
            return Err(CodecError::KeyTooLarge(key_size).into());
        }

        let mut key = vec![0u8; key_size];
        decoder.read_exact(&mut key)?;

        let mut type_id_buf = [0u8; 1];
        decoder.read_exact(&mut type_id_buf)?;

        let value_len = total_size - RECORD_PREFIX - key_size;
        if value_len > MAX_VALUE_SIZE {
            return Err(CodecError::ValueTooLarge(value_len).into());
        }
        let mut value_bytes = vec![0u8; value_len];
        decoder.read_exact(&mut value_bytes)?;

        let value = Value::decode(type_id_buf[0], &value_bytes)?;
        store.shard_for(&key).set(key, value, exp_at);
    }
    Ok(())
}

/// Reads exactly `buf.len()` bytes, returning `Ok(false)` only if the very
/// first read hit a clean EOF (no bytes available at all — a well-formed end
/// of stream). Any other short read is a malformed record.
fn read_exact_or_clean_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(CodecError::ShortRead {
                expected: buf.len() - filled,
            }
            .into());
        }
        filled += n;
    }
    Ok(true)
}

fn discard<R: Read>(reader: &mut R, mut remaining: usize) -> Result<()> {
    let mut buf = [0u8; 4096];
    while remaining > 0 {
        let want = remaining.min(buf.len());
        let n = reader.read(&mut buf[..want])?;
        if n == 0 {
            return Err(CodecError::ShortRead { expected: remaining }.into());
        }
        remaining -= n;
    }
    Ok(())
}
