//! Wire constants of the object serialization stream protocol.
//!
//! ## Stream Layout
//!
//! A stream is the magic `0xACED`, the version `0x0005`, then a sequence of
//! content items. Each item starts with one of the `TC_*` opcode bytes below;
//! class descriptions carry a flags byte built from the `SC_*` bits.

use crate::error::{Error, Result};

/// Magic number opening every stream
pub const STREAM_MAGIC: u16 = 0xACED;

/// The only stream version this decoder accepts
pub const STREAM_VERSION: u16 = 5;

/// The four header bytes: magic then version, big-endian
pub const STREAM_HEADER: [u8; 4] = [0xAC, 0xED, 0x00, 0x05];

/// First handle value of every handle-table generation
pub const BASE_WIRE_HANDLE: i32 = 0x7E_0000;

/// Class defines a custom `writeObject` method
pub const SC_WRITE_METHOD: u8 = 0x01;
/// Class is serializable
pub const SC_SERIALIZABLE: u8 = 0x02;
/// Class is externalizable
pub const SC_EXTERNALIZABLE: u8 = 0x04;
/// Externalized data is written in block-data mode
pub const SC_BLOCK_DATA: u8 = 0x08;
/// Class is an enum type
pub const SC_ENUM: u8 = 0x10;

/// Stream opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Null reference
    Null = 0x70,
    /// Back-reference to a handle
    Reference = 0x71,
    /// New class description
    ClassDesc = 0x72,
    /// New object
    Object = 0x73,
    /// New string, 2-byte length
    String = 0x74,
    /// New array
    Array = 0x75,
    /// Reference to a class
    Class = 0x76,
    /// Block data, 1-byte length
    BlockData = 0x77,
    /// End of an annotation list
    EndBlockData = 0x78,
    /// Handle table reset
    Reset = 0x79,
    /// Block data, 4-byte length
    BlockDataLong = 0x7A,
    /// Exception thrown during writing
    Exception = 0x7B,
    /// New string, 8-byte length
    LongString = 0x7C,
    /// New proxy class description
    ProxyClassDesc = 0x7D,
    /// New enum constant
    Enum = 0x7E,
}

impl Opcode {
    /// Decodes an opcode byte; `offset` is only used for the error
    pub fn from_byte(value: u8, offset: u64) -> Result<Self> {
        let op = match value {
            0x70 => Opcode::Null,
            0x71 => Opcode::Reference,
            0x72 => Opcode::ClassDesc,
            0x73 => Opcode::Object,
            0x74 => Opcode::String,
            0x75 => Opcode::Array,
            0x76 => Opcode::Class,
            0x77 => Opcode::BlockData,
            0x78 => Opcode::EndBlockData,
            0x79 => Opcode::Reset,
            0x7A => Opcode::BlockDataLong,
            0x7B => Opcode::Exception,
            0x7C => Opcode::LongString,
            0x7D => Opcode::ProxyClassDesc,
            0x7E => Opcode::Enum,
            _ => {
                return Err(Error::UnknownOpcode {
                    offset,
                    opcode: value,
                })
            }
        };
        Ok(op)
    }

    /// Protocol name of the opcode, as used in diagnostics
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Null => "TC_NULL",
            Opcode::Reference => "TC_REFERENCE",
            Opcode::ClassDesc => "TC_CLASSDESC",
            Opcode::Object => "TC_OBJECT",
            Opcode::String => "TC_STRING",
            Opcode::Array => "TC_ARRAY",
            Opcode::Class => "TC_CLASS",
            Opcode::BlockData => "TC_BLOCKDATA",
            Opcode::EndBlockData => "TC_ENDBLOCKDATA",
            Opcode::Reset => "TC_RESET",
            Opcode::BlockDataLong => "TC_BLOCKDATALONG",
            Opcode::Exception => "TC_EXCEPTION",
            Opcode::LongString => "TC_LONGSTRING",
            Opcode::ProxyClassDesc => "TC_PROXYCLASSDESC",
            Opcode::Enum => "TC_ENUM",
        }
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        op as u8
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_conversion() {
        for byte in 0x70..=0x7E {
            let op = Opcode::from_byte(byte, 0).unwrap();
            assert_eq!(u8::from(op), byte);
        }
    }

    #[test]
    fn test_unknown_opcode() {
        let err = Opcode::from_byte(0x6F, 12).unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownOpcode {
                offset: 12,
                opcode: 0x6F
            }
        ));
        assert!(Opcode::from_byte(0x7F, 0).is_err());
    }

    #[test]
    fn test_opcode_names() {
        assert_eq!(Opcode::Exception.to_string(), "TC_EXCEPTION");
        assert_eq!(Opcode::ProxyClassDesc.name(), "TC_PROXYCLASSDESC");
    }

    #[test]
    fn test_header_bytes() {
        let magic = STREAM_MAGIC.to_be_bytes();
        let version = STREAM_VERSION.to_be_bytes();
        assert_eq!(STREAM_HEADER, [magic[0], magic[1], version[0], version[1]]);
    }
}
