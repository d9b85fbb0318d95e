//! Sequential big-endian reader over the input byte source.

use super::mutf8;
use crate::error::{Error, Result};
use bytes::{Bytes, BytesMut};
use std::io::{ErrorKind, Read};

/// Forward-only reader with optional capture of consumed bytes.
///
/// While recording, every byte handed out by any read is also appended to a
/// side buffer. The decoder uses this to keep the raw bytes leading up to an
/// in-stream exception.
#[derive(Debug)]
pub struct ByteCursor<R> {
    inner: R,
    offset: u64,
    recording: Option<BytesMut>,
}

impl<R: Read> ByteCursor<R> {
    /// Creates a cursor positioned at the start of `inner`
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            offset: 0,
            recording: None,
        }
    }

    /// Number of bytes consumed so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Starts a fresh recording, discarding any previous one
    pub fn start_recording(&mut self) {
        self.recording = Some(BytesMut::new());
    }

    /// Stops recording and returns what was captured
    pub fn take_recording(&mut self) -> Bytes {
        self.recording
            .take()
            .map(BytesMut::freeze)
            .unwrap_or_default()
    }

    fn consumed(&mut self, buf: &[u8]) {
        self.offset += buf.len() as u64;
        if let Some(recording) = &mut self.recording {
            recording.extend_from_slice(buf);
        }
    }

    /// Fills `buf` completely or fails with [`Error::EndOfStream`]
    pub fn read_exact_into(&mut self, buf: &mut [u8]) -> Result<()> {
        match self.inner.read_exact(buf) {
            Ok(()) => {
                self.consumed(buf);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(Error::EndOfStream {
                offset: self.offset,
            }),
            Err(source) => Err(Error::Io {
                offset: self.offset,
                source,
            }),
        }
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_exact_into(&mut buf)?;
        Ok(buf)
    }

    /// Reads exactly `len` bytes.
    ///
    /// The buffer grows with the data actually delivered, so a bogus length
    /// fails with end-of-stream instead of a huge up-front allocation.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(len.min(64 * 1024));
        let got = (&mut self.inner)
            .take(len as u64)
            .read_to_end(&mut buf)
            .map_err(|source| Error::Io {
                offset: self.offset,
                source,
            })?;
        self.consumed(&buf);
        if got < len {
            return Err(Error::EndOfStream {
                offset: self.offset,
            });
        }
        Ok(buf)
    }

    /// Reads one unsigned byte
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Reads one signed byte
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(i8::from_be_bytes(self.read_array()?))
    }

    /// Reads a boolean byte (any nonzero value is true)
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads an unsigned 16-bit integer
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    /// Reads a signed 16-bit integer
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_be_bytes(self.read_array()?))
    }

    /// Reads a signed 32-bit integer
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    /// Reads a signed 64-bit integer
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.read_array()?))
    }

    /// Reads an IEEE 754 single
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(u32::from_be_bytes(self.read_array()?)))
    }

    /// Reads an IEEE 754 double
    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(u64::from_be_bytes(self.read_array()?)))
    }

    /// Reads a 2-byte length-prefixed modified UTF-8 string
    pub fn read_utf(&mut self) -> Result<String> {
        let len = self.read_u16()?;
        let data = self.read_bytes(usize::from(len))?;
        mutf8::decode_string(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_reads() {
        let data = [
            0x01, 0x02, 0xFF, 0xFE, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x2A,
        ];
        let mut cursor = ByteCursor::new(&data[..]);
        assert_eq!(cursor.read_u16().unwrap(), 0x0102);
        assert_eq!(cursor.read_i16().unwrap(), -2);
        assert_eq!(cursor.read_i32().unwrap(), 256);
        assert_eq!(cursor.read_i64().unwrap(), 42);
        assert_eq!(cursor.offset(), 16);
    }

    #[test]
    fn test_floats() {
        let mut data = Vec::new();
        data.extend_from_slice(&1.5f32.to_bits().to_be_bytes());
        data.extend_from_slice(&(-0.25f64).to_bits().to_be_bytes());
        let mut cursor = ByteCursor::new(data.as_slice());
        assert_eq!(cursor.read_f32().unwrap(), 1.5);
        assert_eq!(cursor.read_f64().unwrap(), -0.25);
    }

    #[test]
    fn test_end_of_stream() {
        let mut cursor = ByteCursor::new(&[0x01][..]);
        let err = cursor.read_i32().unwrap_err();
        assert!(err.is_end_of_stream());

        let mut cursor = ByteCursor::new(&[0x01, 0x02][..]);
        let err = cursor.read_bytes(5).unwrap_err();
        assert!(matches!(err, Error::EndOfStream { offset: 2 }));
    }

    #[test]
    fn test_read_utf() {
        let data = [0x00, 0x03, b'a', b'b', b'c', 0xFF];
        let mut cursor = ByteCursor::new(&data[..]);
        assert_eq!(cursor.read_utf().unwrap(), "abc");
        assert_eq!(cursor.read_u8().unwrap(), 0xFF);
    }

    #[test]
    fn test_recording_captures_consumed_bytes() {
        let data = [0x10, 0x20, 0x30, 0x40, 0x50];
        let mut cursor = ByteCursor::new(&data[..]);
        cursor.read_u8().unwrap();
        cursor.start_recording();
        cursor.read_u16().unwrap();
        cursor.read_bytes(1).unwrap();
        assert_eq!(&cursor.take_recording()[..], &[0x20, 0x30, 0x40]);

        // recording is off again
        cursor.read_u8().unwrap();
        assert!(cursor.take_recording().is_empty());
    }
}
