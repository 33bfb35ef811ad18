use std::io::{self, ErrorKind, Read, Write};

/// A source of bytes. `None` marks the end of the stream.
pub trait ByteRead {
    fn get(&mut self) -> io::Result<Option<u8>>;
    /// Number of bytes handed out so far
    fn offset(&self) -> u64;
}

/// A sink of bytes.
pub trait ByteWrite {
    fn put(&mut self, byte: u8) -> io::Result<()>;

    fn put_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        bytes.iter().try_for_each(|&byte| self.put(byte))
    }
}

impl<T: ByteRead + ?Sized> ByteRead for &mut T {
    fn get(&mut self) -> io::Result<Option<u8>> { (**self).get() }
    fn offset(&self) -> u64 { (**self).offset() }
}

impl<T: ByteWrite + ?Sized> ByteWrite for &mut T {
    fn put(&mut self, byte: u8) -> io::Result<()> { (**self).put(byte) }
}

impl ByteWrite for Vec<u8> {
    fn put(&mut self, byte: u8) -> io::Result<()> {
        self.push(byte);
        Ok(())
    }

    fn put_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// Reads from an in-memory buffer
pub struct SliceReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self { Self { buf, pos: 0 } }
    pub fn remaining(&self) -> &'a [u8] { &self.buf[self.pos..] }
}

impl ByteRead for SliceReader<'_> {
    fn get(&mut self) -> io::Result<Option<u8>> {
        let byte = self.buf.get(self.pos).copied();
        self.pos += usize::from(byte.is_some());
        Ok(byte)
    }

    fn offset(&self) -> u64 { self.pos as u64 }
}

/// Adapts an `io::Read`. Wrap files in a `BufReader` first.
pub struct IoReader<R> {
    inner: R,
    read: u64,
}

impl<R: Read> IoReader<R> {
    pub fn new(inner: R) -> Self { Self { inner, read: 0 } }
    pub fn into_inner(self) -> R { self.inner }
}

impl<R: Read> ByteRead for IoReader<R> {
    fn get(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0];
        match self.inner.read_exact(&mut byte) {
            Ok(()) => {
                self.read += 1;
                Ok(Some(byte[0]))
            }
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn offset(&self) -> u64 { self.read }
}

/// Adapts an `io::Write`. Wrap files in a `BufWriter` first.
pub struct IoWriter<W> {
    inner: W,
}

impl<W: Write> IoWriter<W> {
    pub fn new(inner: W) -> Self { Self { inner } }

    pub fn into_inner(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> ByteWrite for IoWriter<W> {
    fn put(&mut self, byte: u8) -> io::Result<()> { self.inner.write_all(&[byte]) }
    fn put_all(&mut self, bytes: &[u8]) -> io::Result<()> { self.inner.write_all(bytes) }
}

/// Discards everything, counting the bytes
#[derive(Default)]
pub struct Counter {
    pub count: u64,
}

impl ByteWrite for Counter {
    fn put(&mut self, _byte: u8) -> io::Result<()> {
        self.count += 1;
        Ok(())
    }
}
