//! Binary persistence format for the [`VectorIndex`].
//!
//! All integers and floats are little-endian.
//!
//! ```text
//! magic "RQVX" | version u16 | idf_document_count u32
//! term_count u32
//!   term_count × { len u16 | utf8 bytes | document_frequency u32 | idf f32 }
//! record_count u32
//!   record_count × { item_id i64 | norm f32 | pair_count u32
//!                    | pair_count × { term_index u32 | weight f32 } }
//! ```
//!
//! Decoding is strict: anything unexpected, including trailing bytes, is
//! reported as [`Error::IndexCorruption`] instead of being skipped.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::index::{DocumentVector, VectorIndex};
use crate::tokenize::MAX_TERM_BYTES;
use crate::vocabulary::{TermEntry, TermIndex, Vocabulary};

// Term lengths are written as u16.
const _: () = assert!(MAX_TERM_BYTES <= u16::MAX as usize);

/// File signature.
pub const MAGIC: &[u8; 4] = b"RQVX";
/// Current format version.
pub const VERSION: u16 = 1;

/// Encode the full index.
pub fn encode(index: &VectorIndex) -> Vec<u8> {
    let vocab = index.vocabulary();
    let mut out = Vec::with_capacity(64 + vocab.len() * 16 + index.len() * 32);

    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&vocab.idf_document_count().to_le_bytes());

    out.extend_from_slice(&(vocab.len() as u32).to_le_bytes());
    for entry in vocab.entries() {
        let bytes = entry.text.as_bytes();
        out.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
        out.extend_from_slice(bytes);
        out.extend_from_slice(&entry.document_frequency.to_le_bytes());
        out.extend_from_slice(&entry.idf.to_le_bytes());
    }

    out.extend_from_slice(&(index.len() as u32).to_le_bytes());
    for vector in index.vectors() {
        encode_record(vector, &mut out);
    }
    out
}

/// Append one vector record.
pub fn encode_record(vector: &DocumentVector, out: &mut Vec<u8>) {
    out.extend_from_slice(&vector.item_id().to_le_bytes());
    out.extend_from_slice(&vector.norm().to_le_bytes());
    out.extend_from_slice(&(vector.weights().len() as u32).to_le_bytes());
    for &(term, weight) in vector.weights() {
        out.extend_from_slice(&term.to_le_bytes());
        out.extend_from_slice(&weight.to_le_bytes());
    }
}

/// Decode a full index.
pub fn decode(bytes: &[u8]) -> Result<VectorIndex> {
    let mut r = Reader::new(bytes);

    let magic = r.take(4, "magic")?;
    if magic != MAGIC {
        return Err(Error::corruption("bad magic"));
    }
    let version = r.u16("version")?;
    if version != VERSION {
        return Err(Error::corruption(format!("unsupported version {version}")));
    }
    let idf_document_count = r.u32("idf document count")?;

    let term_count = r.u32("term count")? as usize;
    let mut entries = Vec::with_capacity(term_count.min(r.remaining() / 10));
    for _ in 0..term_count {
        let len = r.u16("term length")? as usize;
        if len > MAX_TERM_BYTES {
            return Err(Error::corruption(format!("term length {len} exceeds {MAX_TERM_BYTES}")));
        }
        let raw = r.take(len, "term text")?;
        let text = std::str::from_utf8(raw)
            .map_err(|_| Error::corruption("term is not valid UTF-8"))?
            .to_string();
        if text.is_empty() {
            return Err(Error::corruption("empty term"));
        }
        let document_frequency = r.u32("document frequency")?;
        let idf = r.f32("idf")?;
        if !idf.is_finite() || idf < 0.0 {
            return Err(Error::corruption(format!("invalid idf {idf} for '{text}'")));
        }
        entries.push(TermEntry {
            text,
            document_frequency,
            idf,
        });
    }
    let vocabulary = Vocabulary::from_entries(entries, idf_document_count)?;

    let record_count = r.u32("record count")? as usize;
    let mut vectors = Vec::with_capacity(record_count.min(r.remaining() / 16));
    let mut seen = HashSet::with_capacity(vectors.capacity());
    for _ in 0..record_count {
        let vector = decode_record(&mut r, &vocabulary)?;
        if !seen.insert(vector.item_id()) {
            return Err(Error::corruption(format!(
                "duplicate record for item {}",
                vector.item_id()
            )));
        }
        vectors.push(vector);
    }

    if r.remaining() != 0 {
        return Err(Error::corruption(format!(
            "{} trailing bytes after last record",
            r.remaining()
        )));
    }

    Ok(VectorIndex::from_parts(vocabulary, vectors))
}

fn decode_record(r: &mut Reader<'_>, vocab: &Vocabulary) -> Result<DocumentVector> {
    let item_id = r.i64("item id")?;
    let norm = r.f32("norm")?;
    if !norm.is_finite() || norm < 0.0 {
        return Err(Error::corruption(format!("invalid norm for item {item_id}")));
    }
    let pair_count = r.u32("pair count")? as usize;
    if pair_count > 0 && norm == 0.0 {
        return Err(Error::corruption(format!("zero norm with terms for item {item_id}")));
    }

    let mut weights: Vec<(TermIndex, f32)> = Vec::with_capacity(pair_count.min(r.remaining() / 8));
    for _ in 0..pair_count {
        let term = r.u32("term index")?;
        let weight = r.f32("weight")?;
        if term as usize >= vocab.len() {
            return Err(Error::corruption(format!(
                "term index {term} out of range for item {item_id}"
            )));
        }
        if !weight.is_finite() || weight < 0.0 {
            return Err(Error::corruption(format!("invalid weight for item {item_id}")));
        }
        if weights.last().is_some_and(|&(prev, _)| prev >= term) {
            return Err(Error::corruption(format!("unsorted terms for item {item_id}")));
        }
        weights.push((term, weight));
    }

    Ok(DocumentVector::from_weights(item_id, norm, weights, vocab))
}

/// Bounds-checked little-endian cursor.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::corruption(format!(
                "truncated while reading {what} at byte {}",
                self.pos
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, what: &str) -> Result<[u8; N]> {
        let mut arr = [0u8; N];
        arr.copy_from_slice(self.take(N, what)?);
        Ok(arr)
    }

    fn u16(&mut self, what: &str) -> Result<u16> {
        self.array(what).map(u16::from_le_bytes)
    }

    fn u32(&mut self, what: &str) -> Result<u32> {
        self.array(what).map(u32::from_le_bytes)
    }

    fn i64(&mut self, what: &str) -> Result<i64> {
        self.array(what).map(i64::from_le_bytes)
    }

    fn f32(&mut self, what: &str) -> Result<f32> {
        self.array(what).map(f32::from_le_bytes)
    }
}
