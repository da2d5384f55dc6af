//! String and bytes backing.
//!
//! Values carry their text and octet payloads behind [`StrBuffer`] and
//! [`BytesBuffer`], which are either one contiguous shared allocation or a
//! chunk list built by concatenation under
//! [`StringBacking::ChunkedRope`](crate::options::StringBacking). The two
//! representations are indistinguishable to CEL code: equality, ordering,
//! hashing, and sizing are defined over the logical sequence.

use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::options::StringBacking;

/// Immutable UTF-8 sequence, contiguous or chunked.
#[derive(Clone)]
pub enum StrBuffer {
    Flat(Arc<str>),
    Chunked(Arc<StrRope>),
}

/// Chunk list with cached lengths.
pub struct StrRope {
    chunks: Vec<Arc<str>>,
    byte_len: usize,
    char_len: usize,
}

impl StrBuffer {
    /// Concatenate two buffers under the given backing discipline.
    pub fn concat(left: &StrBuffer, right: &StrBuffer, backing: StringBacking) -> StrBuffer {
        match backing {
            StringBacking::Contiguous => {
                let mut out = String::with_capacity(left.byte_len() + right.byte_len());
                for chunk in left.chunks() {
                    out.push_str(chunk);
                }
                for chunk in right.chunks() {
                    out.push_str(chunk);
                }
                StrBuffer::Flat(Arc::from(out))
            }
            StringBacking::ChunkedRope => {
                let mut chunks =
                    Vec::with_capacity(left.chunk_count() + right.chunk_count());
                let mut char_len = 0usize;
                for side in [left, right] {
                    match side {
                        StrBuffer::Flat(s) => {
                            if !s.is_empty() {
                                char_len += s.chars().count();
                                chunks.push(s.clone());
                            }
                        }
                        StrBuffer::Chunked(rope) => {
                            char_len += rope.char_len;
                            chunks.extend(rope.chunks.iter().cloned());
                        }
                    }
                }
                let byte_len = chunks.iter().map(|c| c.len()).sum();
                StrBuffer::Chunked(Arc::new(StrRope {
                    chunks,
                    byte_len,
                    char_len,
                }))
            }
        }
    }

    /// Length in bytes.
    pub fn byte_len(&self) -> usize {
        match self {
            StrBuffer::Flat(s) => s.len(),
            StrBuffer::Chunked(rope) => rope.byte_len,
        }
    }

    /// Length in Unicode code points. O(1) for chunked buffers.
    pub fn char_len(&self) -> usize {
        match self {
            StrBuffer::Flat(s) => s.chars().count(),
            StrBuffer::Chunked(rope) => rope.char_len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.byte_len() == 0
    }

    fn chunk_count(&self) -> usize {
        match self {
            StrBuffer::Flat(_) => 1,
            StrBuffer::Chunked(rope) => rope.chunks.len(),
        }
    }

    /// The chunks in order. A flat buffer yields itself once.
    pub fn chunks(&self) -> impl Iterator<Item = &str> {
        let slice: &[Arc<str>] = match self {
            StrBuffer::Flat(s) => std::slice::from_ref(s),
            StrBuffer::Chunked(rope) => &rope.chunks,
        };
        slice.iter().map(|c| c.as_ref())
    }

    /// Code points in order across chunks.
    pub fn chars(&self) -> impl Iterator<Item = char> + '_ {
        self.chunks().flat_map(|c| c.chars())
    }

    /// Bytes in order across chunks.
    pub fn bytes(&self) -> impl Iterator<Item = u8> + '_ {
        self.chunks().flat_map(|c| c.bytes())
    }

    /// The text as one `str`, borrowing when already contiguous.
    pub fn as_cow(&self) -> Cow<'_, str> {
        match self {
            StrBuffer::Flat(s) => Cow::Borrowed(s),
            StrBuffer::Chunked(rope) => {
                let mut out = String::with_capacity(rope.byte_len);
                for chunk in &rope.chunks {
                    out.push_str(chunk);
                }
                Cow::Owned(out)
            }
        }
    }

    /// A contiguous shared copy of the text.
    pub fn flatten(&self) -> Arc<str> {
        match self {
            StrBuffer::Flat(s) => s.clone(),
            StrBuffer::Chunked(_) => Arc::from(self.as_cow().as_ref()),
        }
    }

    /// Substring by code-point range. `None` when the range is out of
    /// bounds or inverted. Whole chunks covered by the range are reused
    /// without copying.
    pub fn substring(&self, start: usize, end: usize) -> Option<StrBuffer> {
        if start > end || end > self.char_len() {
            return None;
        }
        if start == end {
            return Some(StrBuffer::Flat(Arc::from("")));
        }
        match self {
            StrBuffer::Flat(s) => {
                let begin = byte_offset(s, start)?;
                let finish = byte_offset(s, end)?;
                Some(StrBuffer::Flat(Arc::from(&s[begin..finish])))
            }
            StrBuffer::Chunked(rope) => {
                let mut pieces: Vec<Arc<str>> = Vec::new();
                let mut pos = 0usize;
                for chunk in &rope.chunks {
                    let len = chunk.chars().count();
                    let chunk_start = pos;
                    let chunk_end = pos + len;
                    pos = chunk_end;
                    if chunk_end <= start || chunk_start >= end {
                        continue;
                    }
                    if start <= chunk_start && end >= chunk_end {
                        pieces.push(chunk.clone());
                        continue;
                    }
                    let local_start = start.saturating_sub(chunk_start);
                    let local_end = (end - chunk_start).min(len);
                    let begin = byte_offset(chunk, local_start)?;
                    let finish = byte_offset(chunk, local_end)?;
                    pieces.push(Arc::from(&chunk[begin..finish]));
                }
                let byte_len = pieces.iter().map(|c| c.len()).sum();
                Some(StrBuffer::Chunked(Arc::new(StrRope {
                    chunks: pieces,
                    byte_len,
                    char_len: end - start,
                })))
            }
        }
    }
}

/// Byte offset of the `index`th code point, or the end of the string.
fn byte_offset(s: &str, index: usize) -> Option<usize> {
    if index == 0 {
        return Some(0);
    }
    s.char_indices()
        .nth(index)
        .map(|(offset, _)| offset)
        .or_else(|| (index == s.chars().count()).then_some(s.len()))
}

impl PartialEq for StrBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.byte_len() == other.byte_len() && self.bytes().eq(other.bytes())
    }
}

impl Eq for StrBuffer {}

impl PartialOrd for StrBuffer {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StrBuffer {
    // UTF-8 byte order coincides with code-point order.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.bytes().cmp(other.bytes())
    }
}

impl Hash for StrBuffer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Byte-at-a-time keeps flat and chunked copies of the same text on
        // the same hash, regardless of chunk boundaries.
        for b in self.bytes() {
            state.write_u8(b);
        }
        state.write_usize(self.byte_len());
    }
}

impl fmt::Display for StrBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for chunk in self.chunks() {
            f.write_str(chunk)?;
        }
        Ok(())
    }
}

impl fmt::Debug for StrBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_cow())
    }
}

impl From<&str> for StrBuffer {
    fn from(s: &str) -> Self {
        StrBuffer::Flat(Arc::from(s))
    }
}

impl From<String> for StrBuffer {
    fn from(s: String) -> Self {
        StrBuffer::Flat(Arc::from(s))
    }
}

impl From<Arc<str>> for StrBuffer {
    fn from(s: Arc<str>) -> Self {
        StrBuffer::Flat(s)
    }
}

impl Default for StrBuffer {
    fn default() -> Self {
        StrBuffer::Flat(Arc::from(""))
    }
}

/// Immutable octet sequence, contiguous or chunked.
#[derive(Clone)]
pub enum BytesBuffer {
    Flat(Arc<[u8]>),
    Chunked(Arc<BytesRope>),
}

/// Byte chunk list with cached length.
pub struct BytesRope {
    chunks: Vec<Arc<[u8]>>,
    len: usize,
}

impl BytesBuffer {
    pub fn concat(left: &BytesBuffer, right: &BytesBuffer, backing: StringBacking) -> BytesBuffer {
        match backing {
            StringBacking::Contiguous => {
                let mut out = Vec::with_capacity(left.len() + right.len());
                for chunk in left.chunks() {
                    out.extend_from_slice(chunk);
                }
                for chunk in right.chunks() {
                    out.extend_from_slice(chunk);
                }
                BytesBuffer::Flat(Arc::from(out))
            }
            StringBacking::ChunkedRope => {
                let mut chunks = Vec::new();
                for side in [left, right] {
                    match side {
                        BytesBuffer::Flat(b) => {
                            if !b.is_empty() {
                                chunks.push(b.clone());
                            }
                        }
                        BytesBuffer::Chunked(rope) => chunks.extend(rope.chunks.iter().cloned()),
                    }
                }
                let len = chunks.iter().map(|c| c.len()).sum();
                BytesBuffer::Chunked(Arc::new(BytesRope { chunks, len }))
            }
        }
    }

    /// Length in octets.
    pub fn len(&self) -> usize {
        match self {
            BytesBuffer::Flat(b) => b.len(),
            BytesBuffer::Chunked(rope) => rope.len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn chunks(&self) -> impl Iterator<Item = &[u8]> {
        let slice: &[Arc<[u8]>] = match self {
            BytesBuffer::Flat(b) => std::slice::from_ref(b),
            BytesBuffer::Chunked(rope) => &rope.chunks,
        };
        slice.iter().map(|c| c.as_ref())
    }

    pub fn bytes(&self) -> impl Iterator<Item = u8> + '_ {
        self.chunks().flat_map(|c| c.iter().copied())
    }

    /// Octet at `index`, counting across chunks.
    pub fn get(&self, index: usize) -> Option<u8> {
        match self {
            BytesBuffer::Flat(b) => b.get(index).copied(),
            BytesBuffer::Chunked(rope) => {
                let mut remaining = index;
                for chunk in &rope.chunks {
                    if remaining < chunk.len() {
                        return Some(chunk[remaining]);
                    }
                    remaining -= chunk.len();
                }
                None
            }
        }
    }

    pub fn as_cow(&self) -> Cow<'_, [u8]> {
        match self {
            BytesBuffer::Flat(b) => Cow::Borrowed(b),
            BytesBuffer::Chunked(rope) => {
                let mut out = Vec::with_capacity(rope.len);
                for chunk in &rope.chunks {
                    out.extend_from_slice(chunk);
                }
                Cow::Owned(out)
            }
        }
    }

    pub fn flatten(&self) -> Arc<[u8]> {
        match self {
            BytesBuffer::Flat(b) => b.clone(),
            BytesBuffer::Chunked(_) => Arc::from(self.as_cow().as_ref()),
        }
    }
}

impl PartialEq for BytesBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.bytes().eq(other.bytes())
    }
}

impl Eq for BytesBuffer {}

impl PartialOrd for BytesBuffer {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BytesBuffer {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.bytes().cmp(other.bytes())
    }
}

impl Hash for BytesBuffer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.bytes() {
            state.write_u8(b);
        }
        state.write_usize(self.len());
    }
}

impl fmt::Debug for BytesBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b\"")?;
        for b in self.bytes() {
            write!(f, "{}", std::ascii::escape_default(b))?;
        }
        write!(f, "\"")
    }
}

impl From<&[u8]> for BytesBuffer {
    fn from(b: &[u8]) -> Self {
        BytesBuffer::Flat(Arc::from(b))
    }
}

impl From<Vec<u8>> for BytesBuffer {
    fn from(b: Vec<u8>) -> Self {
        BytesBuffer::Flat(Arc::from(b))
    }
}

impl From<Arc<[u8]>> for BytesBuffer {
    fn from(b: Arc<[u8]>) -> Self {
        BytesBuffer::Flat(b)
    }
}

impl Default for BytesBuffer {
    fn default() -> Self {
        BytesBuffer::Flat(Arc::from(Vec::<u8>::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunked(parts: &[&str]) -> StrBuffer {
        let mut out = StrBuffer::from("");
        for part in parts {
            out = StrBuffer::concat(&out, &StrBuffer::from(*part), StringBacking::ChunkedRope);
        }
        out
    }

    #[test]
    fn flat_and_chunked_compare_equal() {
        let flat = StrBuffer::from("hello world");
        let rope = chunked(&["hello", " ", "world"]);
        assert_eq!(flat, rope);
        assert_eq!(flat.cmp(&rope), std::cmp::Ordering::Equal);
        assert_eq!(flat.char_len(), rope.char_len());
        assert_eq!(rope.to_string(), "hello world");
    }

    #[test]
    fn hash_ignores_chunk_boundaries() {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let hash = |b: &StrBuffer| {
            let mut h = DefaultHasher::new();
            b.hash(&mut h);
            h.finish()
        };
        assert_eq!(hash(&StrBuffer::from("abcdef")), hash(&chunked(&["abc", "def"])));
        assert_eq!(hash(&StrBuffer::from("abcdef")), hash(&chunked(&["a", "bcde", "f"])));
    }

    #[test]
    fn char_len_counts_code_points() {
        let rope = chunked(&["héllo", "wörld"]);
        assert_eq!(rope.char_len(), 10);
        assert!(rope.byte_len() > 10);
        assert_eq!(StrBuffer::from("héllo").char_len(), 5);
    }

    #[test]
    fn substring_by_code_points() {
        let flat = StrBuffer::from("héllo world");
        let sub = flat.substring(1, 5).unwrap();
        assert_eq!(sub.as_cow(), "éllo");

        let rope = chunked(&["héllo", " ", "world"]);
        let sub = rope.substring(6, 11).unwrap();
        assert_eq!(sub.as_cow(), "world");
        // Whole-chunk reuse keeps the result chunked.
        assert!(matches!(sub, StrBuffer::Chunked(_)));

        assert!(rope.substring(5, 100).is_none());
        assert!(rope.substring(7, 6).is_none());
        assert_eq!(rope.substring(3, 3).unwrap().as_cow(), "");
    }

    #[test]
    fn ordering_is_code_point_order() {
        assert!(StrBuffer::from("a") < StrBuffer::from("b"));
        assert!(StrBuffer::from("a") < StrBuffer::from("ab"));
        // U+00E9 sorts after ASCII in both byte and code-point order.
        assert!(StrBuffer::from("z") < StrBuffer::from("é"));
        assert!(chunked(&["a", "b"]) < StrBuffer::from("ac"));
    }

    #[test]
    fn bytes_buffer_roundtrip() {
        let flat = BytesBuffer::from(vec![1u8, 2, 3, 4]);
        let rope = BytesBuffer::concat(
            &BytesBuffer::from(vec![1u8, 2]),
            &BytesBuffer::from(vec![3u8, 4]),
            StringBacking::ChunkedRope,
        );
        assert_eq!(flat, rope);
        assert_eq!(rope.len(), 4);
        assert_eq!(rope.get(2), Some(3));
        assert_eq!(rope.get(4), None);
        assert_eq!(&*rope.flatten(), &[1, 2, 3, 4]);
    }

    #[test]
    fn contiguous_concat_stays_flat() {
        let out = StrBuffer::concat(
            &StrBuffer::from("foo"),
            &StrBuffer::from("bar"),
            StringBacking::Contiguous,
        );
        assert!(matches!(out, StrBuffer::Flat(_)));
        assert_eq!(out.as_cow(), "foobar");
    }
}
