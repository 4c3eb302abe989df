//! Length-delimited entry framing
//!
//! The same framing is used on disk (snapshot files) and on the wire (gossip
//! payloads): a base-128 little-endian varint length prefix followed by the
//! postcard encoding of a [`MeshEntry`]. No header, no checksum; the
//! transport and the filesystem are trusted for integrity.

use crate::error::{Error, Result};
use crate::types::MeshEntry;
use std::io::{ErrorKind, Read, Write};

/// Hard cap on a single framed entry (16 MiB)
pub const MAX_ENTRY_BYTES: u64 = 16 * 1024 * 1024;

/// Longest canonical encoding of a u64 varint
const MAX_VARINT_BYTES: usize = 10;

/// Write a u64 as a base-128 little-endian varint. Returns bytes written.
pub fn write_uvarint(w: &mut impl Write, mut v: u64) -> Result<usize> {
    let mut buf = [0u8; MAX_VARINT_BYTES];
    let mut i = 0;
    while v >= 0x80 {
        buf[i] = (v as u8) | 0x80;
        v >>= 7;
        i += 1;
    }
    buf[i] = v as u8;
    i += 1;
    w.write_all(&buf[..i])?;
    Ok(i)
}

/// Read a varint-encoded u64.
///
/// Returns `Ok(None)` on a clean end of stream before the first byte.
/// A stream ending mid-varint is reported as truncation, not end-of-stream.
pub fn read_uvarint(r: &mut impl Read) -> Result<Option<u64>> {
    let mut v: u64 = 0;
    let mut shift = 0;
    for i in 0..MAX_VARINT_BYTES {
        let b = match read_byte(r)? {
            Some(b) => b,
            None if i == 0 => return Ok(None),
            None => return Err(Error::Truncated("length prefix")),
        };
        if i == MAX_VARINT_BYTES - 1 && b > 1 {
            return Err(Error::VarintOverflow);
        }
        v |= u64::from(b & 0x7f) << shift;
        if b & 0x80 == 0 {
            return Ok(Some(v));
        }
        shift += 7;
    }
    Err(Error::VarintOverflow)
}

/// Read a single byte, retrying on interruption. `None` at end of stream.
fn read_byte(r: &mut impl Read) -> Result<Option<u8>> {
    let mut byte = [0u8; 1];
    loop {
        match r.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Write one length-delimited entry. Returns total bytes written.
pub fn write_entry(w: &mut impl Write, e: &MeshEntry) -> Result<usize> {
    let payload = postcard::to_allocvec(e)?;
    if payload.len() as u64 > MAX_ENTRY_BYTES {
        return Err(Error::Oversized(payload.len() as u64));
    }
    let mut n = write_uvarint(w, payload.len() as u64)?;
    w.write_all(&payload)?;
    n += payload.len();
    Ok(n)
}

/// Read one length-delimited entry.
///
/// Returns `Ok(None)` at a clean end of stream. Truncated prefixes or
/// payloads, oversized frames, and undecodable payloads are errors.
pub fn read_entry(r: &mut impl Read) -> Result<Option<MeshEntry>> {
    let len = match read_uvarint(r)? {
        Some(len) => len,
        None => return Ok(None),
    };
    if len > MAX_ENTRY_BYTES {
        return Err(Error::Oversized(len));
    }
    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            Error::Truncated("entry payload")
        } else {
            Error::Io(e)
        }
    })?;
    let entry: MeshEntry = postcard::from_bytes(&payload)?;
    entry.entry.timestamp.validate()?;
    entry.expires_at.validate()?;
    Ok(Some(entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Entry, LogInstant, Receiver};

    fn sample_entry() -> MeshEntry {
        MeshEntry {
            entry: Entry {
                receiver: Receiver::new("team", "email", "A"),
                group_key: b"alertgroup-1".to_vec(),
                group_hash: b"h1".to_vec(),
                resolved: false,
                timestamp: LogInstant::from_unix_secs(1000),
            },
            expires_at: LogInstant::from_unix_secs(4600),
        }
    }

    #[test]
    fn test_uvarint_roundtrip() {
        for v in [0u64, 1, 127, 128, 300, 16_383, 16_384, u64::MAX] {
            let mut buf = Vec::new();
            let n = write_uvarint(&mut buf, v).unwrap();
            assert_eq!(n, buf.len());
            let got = read_uvarint(&mut buf.as_slice()).unwrap();
            assert_eq!(got, Some(v));
        }
    }

    #[test]
    fn test_uvarint_eof_vs_truncation() {
        // Clean EOF before the first byte
        let empty: &[u8] = &[];
        assert!(matches!(read_uvarint(&mut &*empty), Ok(None)));

        // Continuation bit set but stream ends
        let cut: &[u8] = &[0x80];
        assert!(matches!(
            read_uvarint(&mut &*cut),
            Err(Error::Truncated(_))
        ));
    }

    #[test]
    fn test_uvarint_overflow() {
        // 11 continuation bytes can never be a canonical u64
        let bad = [0xffu8; 11];
        assert!(matches!(
            read_uvarint(&mut bad.as_slice()),
            Err(Error::VarintOverflow)
        ));
    }

    #[test]
    fn test_entry_roundtrip() {
        let e = sample_entry();
        let mut buf = Vec::new();
        let n = write_entry(&mut buf, &e).unwrap();
        assert_eq!(n, buf.len());

        let mut rd = buf.as_slice();
        let got = read_entry(&mut rd).unwrap().unwrap();
        assert_eq!(got, e);
        // Stream is exhausted afterwards
        assert!(matches!(read_entry(&mut rd), Ok(None)));
    }

    #[test]
    fn test_entry_truncated_payload() {
        let e = sample_entry();
        let mut buf = Vec::new();
        write_entry(&mut buf, &e).unwrap();
        buf.truncate(buf.len() - 1);

        let mut rd = buf.as_slice();
        assert!(matches!(read_entry(&mut rd), Err(Error::Truncated(_))));
    }

    #[test]
    fn test_entry_oversized_prefix() {
        let mut buf = Vec::new();
        write_uvarint(&mut buf, MAX_ENTRY_BYTES + 1).unwrap();
        let mut rd = buf.as_slice();
        assert!(matches!(read_entry(&mut rd), Err(Error::Oversized(_))));
    }

    #[test]
    fn test_entry_rejects_bad_nanos() {
        let mut e = sample_entry();
        e.entry.timestamp.nanos = 2_000_000_000;
        let payload = postcard::to_allocvec(&e).unwrap();
        let mut buf = Vec::new();
        write_uvarint(&mut buf, payload.len() as u64).unwrap();
        buf.extend_from_slice(&payload);

        let mut rd = buf.as_slice();
        assert!(matches!(
            read_entry(&mut rd),
            Err(Error::TimestampOutOfRange)
        ));
    }
}
