// Caller-memory copy seams; short copies are normal outcomes, not errors.

/// Caller-owned bytes a write pulls from.
pub trait Source {
    /// Bytes the caller claims to offer.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies a prefix of the source into `dst` and returns how many bytes
    /// were actually transferred (`<= dst.len()`).
    fn copy_into(&self, dst: &mut [u8]) -> usize;
}

/// Caller-owned memory a read pushes into.
pub trait Sink {
    /// Appends a prefix of `src` and returns how many bytes were accepted.
    fn accept(&mut self, src: &[u8]) -> usize;
}

impl Source for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn copy_into(&self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(<[u8]>::len(self));
        dst[..n].copy_from_slice(&self[..n]);
        n
    }
}

impl Source for str {
    fn len(&self) -> usize {
        str::len(self)
    }

    fn copy_into(&self, dst: &mut [u8]) -> usize {
        self.as_bytes().copy_into(dst)
    }
}

impl<T: Source + ?Sized> Source for &T {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn copy_into(&self, dst: &mut [u8]) -> usize {
        (**self).copy_into(dst)
    }
}

impl Sink for Vec<u8> {
    fn accept(&mut self, src: &[u8]) -> usize {
        self.extend_from_slice(src);
        src.len()
    }
}

/// A source whose bytes past `accessible` fault, like a user buffer that
/// straddles an unmapped page.
#[derive(Clone, Debug)]
pub struct PartialSource<'a> {
    bytes: &'a [u8],
    accessible: usize,
}

impl<'a> PartialSource<'a> {
    pub fn new(bytes: &'a [u8], accessible: usize) -> Self {
        Self { bytes, accessible }
    }
}

impl Source for PartialSource<'_> {
    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn copy_into(&self, dst: &mut [u8]) -> usize {
        let readable = &self.bytes[..self.accessible.min(self.bytes.len())];
        readable.copy_into(dst)
    }
}

/// A sink with room for at most `capacity` bytes in total.
#[derive(Clone, Debug, Default)]
pub struct PartialSink {
    bytes: Vec<u8>,
    capacity: usize,
}

impl PartialSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: Vec::new(),
            capacity,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl Sink for PartialSink {
    fn accept(&mut self, src: &[u8]) -> usize {
        let room = self.capacity.saturating_sub(self.bytes.len());
        let n = room.min(src.len());
        self.bytes.extend_from_slice(&src[..n]);
        n
    }
}
