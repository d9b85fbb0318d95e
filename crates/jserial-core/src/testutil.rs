//! Hand-assembled streams for tests.

use crate::stream::{mutf8, Opcode, STREAM_MAGIC, STREAM_VERSION};

/// Byte-level builder for object serialization streams
#[derive(Debug, Default)]
pub(crate) struct StreamBuilder {
    buf: Vec<u8>,
}

impl StreamBuilder {
    /// Starts a stream with the standard header
    pub(crate) fn new() -> Self {
        let mut builder = Self::default();
        builder.u16(STREAM_MAGIC).u16(STREAM_VERSION);
        builder
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        self.buf.clone()
    }

    pub(crate) fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub(crate) fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub(crate) fn i16(&mut self, v: i16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub(crate) fn i32(&mut self, v: i32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub(crate) fn i64(&mut self, v: i64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub(crate) fn f32(&mut self, v: f32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_bits().to_be_bytes());
        self
    }

    pub(crate) fn f64(&mut self, v: f64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_bits().to_be_bytes());
        self
    }

    pub(crate) fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(data);
        self
    }

    /// Two-byte length-prefixed modified UTF-8
    pub(crate) fn utf(&mut self, s: &str) -> &mut Self {
        let data = mutf8::encode_str(s);
        self.u16(data.len() as u16).bytes(&data)
    }

    pub(crate) fn op(&mut self, op: Opcode) -> &mut Self {
        self.u8(u8::from(op))
    }

    pub(crate) fn string(&mut self, s: &str) -> &mut Self {
        self.op(Opcode::String).utf(s)
    }

    pub(crate) fn long_string(&mut self, s: &str) -> &mut Self {
        let data = mutf8::encode_str(s);
        self.op(Opcode::LongString)
            .i64(data.len() as i64)
            .bytes(&data)
    }

    pub(crate) fn null(&mut self) -> &mut Self {
        self.op(Opcode::Null)
    }

    pub(crate) fn reference(&mut self, handle: i32) -> &mut Self {
        self.op(Opcode::Reference).i32(handle)
    }

    pub(crate) fn reset(&mut self) -> &mut Self {
        self.op(Opcode::Reset)
    }

    pub(crate) fn end_block(&mut self) -> &mut Self {
        self.op(Opcode::EndBlockData)
    }

    pub(crate) fn object(&mut self) -> &mut Self {
        self.op(Opcode::Object)
    }

    pub(crate) fn block_data(&mut self, data: &[u8]) -> &mut Self {
        self.op(Opcode::BlockData).u8(data.len() as u8).bytes(data)
    }

    pub(crate) fn block_data_long(&mut self, data: &[u8]) -> &mut Self {
        self.op(Opcode::BlockDataLong)
            .i32(data.len() as i32)
            .bytes(data)
    }

    /// A new class description up to (not including) its annotations.
    ///
    /// Fields are `(type code, name, type descriptor)`; descriptors are
    /// written as new strings.
    pub(crate) fn class_desc(
        &mut self,
        name: &str,
        suid: i64,
        flags: u8,
        fields: &[(char, &str, Option<&str>)],
    ) -> &mut Self {
        self.op(Opcode::ClassDesc)
            .utf(name)
            .i64(suid)
            .u8(flags)
            .i16(fields.len() as i16);
        for &(code, field, descriptor) in fields {
            self.u8(code as u8).utf(field);
            if let Some(descriptor) = descriptor {
                self.string(descriptor);
            }
        }
        self
    }

    /// A complete class description without annotations or superclass
    pub(crate) fn class(
        &mut self,
        name: &str,
        flags: u8,
        fields: &[(char, &str, Option<&str>)],
    ) -> &mut Self {
        self.class_desc(name, 0, flags, fields).end_block().null()
    }
}
