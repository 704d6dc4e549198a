//! Encoding of pages in the store.
//!
//! All integers are little-endian. A page starts with a 24 bytes
//! header:
//!
//! ```text
//! #[repr(C)]
//! pub struct PageHeader {
//!     /// 1 for leaves, 2 for internal pages.
//!     pub kind: u8,
//!     pub flags: u8,
//!     pub key_size: u16,
//!     /// CRC of the page, minus these four bytes (0 if unused).
//!     pub crc: u32,
//!     pub base: u32,
//!     pub size: u32,
//!     pub epoch: u64,
//! }
//! ```
//!
//! followed by the `size * key_size` bytes of keys, and then either
//! `size` values (a `u32` length followed by the bytes), or `size`
//! child addresses (a tag, 1 for novelty and 2 for stored, an epoch
//! and an offset, 17 bytes in total).
use crate::{Error, Page};
use onair_btree_core::btree::page::{BottomPage, InternalPage};
use onair_btree_core::{Address, ChildRef, Prototype};
use std::io::Read;
use std::sync::Arc;

pub(crate) const HEADER_SIZE: usize = 24;
const LEAF: u8 = 1;
const INTERNAL: u8 = 2;
const NOVELTY: u8 = 1;
const STORED: u8 = 2;

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct PageHeader {
    pub kind: u8,
    pub flags: u8,
    pub key_size: u16,
    pub crc: u32,
    pub base: u32,
    pub size: u32,
    pub epoch: u64,
}

impl PageHeader {
    fn to_le_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut b = [0; HEADER_SIZE];
        b[0] = self.kind;
        b[1] = self.flags;
        b[2..4].copy_from_slice(&self.key_size.to_le_bytes());
        b[4..8].copy_from_slice(&self.crc.to_le_bytes());
        b[8..12].copy_from_slice(&self.base.to_le_bytes());
        b[12..16].copy_from_slice(&self.size.to_le_bytes());
        b[16..24].copy_from_slice(&self.epoch.to_le_bytes());
        b
    }

    fn read<R: Read>(r: &mut R) -> Result<Self, Error> {
        let mut b = [0; HEADER_SIZE];
        r.read_exact(&mut b)?;
        Ok(PageHeader {
            kind: b[0],
            flags: b[1],
            key_size: u16::from_le_bytes([b[2], b[3]]),
            crc: u32::from_le_bytes([b[4], b[5], b[6], b[7]]),
            base: u32::from_le_bytes([b[8], b[9], b[10], b[11]]),
            size: u32::from_le_bytes([b[12], b[13], b[14], b[15]]),
            epoch: u64::from_le_bytes([b[16], b[17], b[18], b[19], b[20], b[21], b[22], b[23]]),
        })
    }
}

pub(crate) fn encode(page: &Page) -> Result<Vec<u8>, Error> {
    let proto = page.prototype();
    let header = PageHeader {
        kind: if page.is_leaf() { LEAF } else { INTERNAL },
        flags: 0,
        key_size: proto.key_size() as u16,
        crc: 0,
        base: proto.base() as u32,
        size: page.size() as u32,
        epoch: page.epoch(),
    };
    let mut buf = Vec::with_capacity(HEADER_SIZE + page.base().keys().len());
    buf.extend_from_slice(&header.to_le_bytes());
    buf.extend_from_slice(page.base().keys());
    match page {
        Page::Bottom(p) => {
            for v in p.values() {
                let len = u32::try_from(v.len()).map_err(|_| Error::Corrupt("value too large"))?;
                buf.extend_from_slice(&len.to_le_bytes());
                buf.extend_from_slice(v);
            }
        }
        Page::Internal(p) => {
            for c in p.children() {
                let (tag, epoch, offset) = match c.address() {
                    Some(Address::Novelty { epoch, offset }) => (NOVELTY, epoch, offset),
                    Some(Address::Stored(offset)) => (STORED, 0, offset),
                    None => return Err(Error::Corrupt("encoding a page with an unflushed child")),
                };
                buf.push(tag);
                buf.extend_from_slice(&epoch.to_le_bytes());
                buf.extend_from_slice(&offset.to_le_bytes());
            }
        }
    }
    set_crc(&mut buf);
    Ok(buf)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<Page, Error> {
    check_crc(bytes)?;
    let mut r = bytes;
    let header = PageHeader::read(&mut r)?;
    let proto = Prototype::new(header.key_size as usize, header.base as usize)?;
    let size = header.size as usize;
    if size > proto.base() {
        return Err(Error::Corrupt("page size larger than its base"));
    }
    let mut keys = vec![0; size * proto.key_size()];
    r.read_exact(&mut keys)?;
    let page = match header.kind {
        LEAF => {
            let mut values = Vec::with_capacity(size);
            for _ in 0..size {
                let len = read_u32(&mut r)? as usize;
                if len > r.len() {
                    return Err(Error::Corrupt("value past the end of the page"));
                }
                let mut v = vec![0; len];
                r.read_exact(&mut v)?;
                values.push(Arc::from(v));
            }
            Page::Bottom(BottomPage::from_parts(proto, header.epoch, &keys, values)?)
        }
        INTERNAL => {
            let mut children = Vec::with_capacity(size);
            for _ in 0..size {
                let mut tag = [0];
                r.read_exact(&mut tag)?;
                let epoch = read_u64(&mut r)?;
                let offset = read_u64(&mut r)?;
                let address = match tag[0] {
                    NOVELTY => Address::Novelty { epoch, offset },
                    STORED => Address::Stored(offset),
                    _ => return Err(Error::Corrupt("unknown address tag")),
                };
                children.push(ChildRef::Unresolved(address));
            }
            Page::Internal(InternalPage::from_parts(proto, header.epoch, &keys, children)?)
        }
        _ => return Err(Error::Corrupt("unknown page kind")),
    };
    if !r.is_empty() {
        return Err(Error::Corrupt("trailing bytes after the page"));
    }
    Ok(page)
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32, Error> {
    let mut b = [0; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

fn read_u64<R: Read>(r: &mut R) -> Result<u64, Error> {
    let mut b = [0; 8];
    r.read_exact(&mut b)?;
    Ok(u64::from_le_bytes(b))
}

#[cfg(feature = "crc32")]
fn crc(bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    // Hash the beginning and the end of the page (i.e. remove the
    // CRC).
    hasher.update(&bytes[..4]);
    hasher.update(&bytes[8..]);
    hasher.finalize()
}

#[cfg(feature = "crc32")]
fn set_crc(buf: &mut [u8]) {
    let crc = crc(buf);
    buf[4..8].copy_from_slice(&crc.to_le_bytes());
}

#[cfg(not(feature = "crc32"))]
fn set_crc(_: &mut [u8]) {}

/// If the CRC feature is disabled, we're not checking CRCs.
#[cfg(not(feature = "crc32"))]
fn check_crc(_: &[u8]) -> Result<(), Error> {
    Ok(())
}

#[cfg(feature = "crc32")]
fn check_crc(bytes: &[u8]) -> Result<(), Error> {
    if bytes.len() < HEADER_SIZE {
        return Err(Error::Corrupt("page shorter than its header"));
    }
    let expected = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if crc(bytes) != expected {
        return Err(crate::CRCError {}.into());
    }
    Ok(())
}
