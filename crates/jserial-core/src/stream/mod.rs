//! Stream decoding.
//!
//! This module turns the bytes of an object serialization stream into the
//! [`crate::model`] representation without loading or running any of the
//! classes it describes.
//!
//! ## Algorithm Overview
//!
//! 1. Check the magic and version header
//! 2. Read top-level content items until the byte source is exhausted;
//!    each item is dispatched on its leading opcode and may recurse into
//!    class descriptions, field values, array elements and annotations
//! 3. Wrap every exception the writer threw mid-stream, together with the
//!    raw bytes of the interrupted item, into an [`ExceptionState`]
//! 4. Validate every entity, connect member classes, validate again
//!
//! ## Exceptions inside the stream
//!
//! A TC_EXCEPTION record may appear at any nesting depth. Every recursive
//! read returns a [`Flow`]; `Flow::Thrown` carries the exception object up
//! to the top-level loop, and each read site must pass it on instead of
//! using it as the value it expected.

mod classdata;
mod cursor;
pub mod mutf8;
mod opcode;

use crate::connect;
use crate::error::{Error, Result};
use crate::model::{
    ArrayObj, BlockData, ClassDesc, ClassDescKind, ClassFlags, ClassObj, Content, ContentId,
    Contents, EnumObj, ExceptionState, Field, FieldType, Generation, Handle, HandleTable,
    Instance, StringObj, Value, PROXY_CLASS_NAME,
};
use bytes::Bytes;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, trace, warn};

pub use cursor::ByteCursor;
pub use opcode::{
    Opcode, BASE_WIRE_HANDLE, SC_BLOCK_DATA, SC_ENUM, SC_EXTERNALIZABLE, SC_SERIALIZABLE,
    SC_WRITE_METHOD, STREAM_HEADER, STREAM_MAGIC, STREAM_VERSION,
};

/// Strings shorter than this fit a TC_STRING prefix
const SHORT_STRING_LIMIT: i64 = 0x1_0000;

/// Configuration for the decoder
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Run the member-class reconnector after decoding
    pub connect_member_classes: bool,
    /// Reject TC_LONGSTRING records whose length would fit TC_STRING
    pub strict_long_strings: bool,
    /// Maximum nesting of recursive content reads
    pub max_depth: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            connect_member_classes: true,
            strict_long_strings: false,
            max_depth: 1024,
        }
    }
}

impl DecoderConfig {
    /// Creates a new decoder config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether member classes are connected after decoding
    pub fn connect_member_classes(mut self, connect: bool) -> Self {
        self.connect_member_classes = connect;
        self
    }

    /// Sets whether short TC_LONGSTRING records are an error
    pub fn strict_long_strings(mut self, strict: bool) -> Self {
        self.strict_long_strings = strict;
        self
    }

    /// Sets the maximum nesting depth
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

/// Result of a recursive read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow<T> {
    /// Decoded normally
    Value(T),
    /// The writer threw this exception object; unwind to the top level
    Thrown(ContentId),
}

/// Unwraps a [`Flow`], returning early with `Flow::Thrown` if an exception surfaced
macro_rules! value {
    ($flow:expr) => {
        match $flow {
            Flow::Value(v) => v,
            Flow::Thrown(id) => return Ok(Flow::Thrown(id)),
        }
    };
}
pub(crate) use value;

/// A single decode session over one byte source
#[derive(Debug)]
pub struct Deserializer<R> {
    cursor: ByteCursor<R>,
    contents: Contents,
    handles: HandleTable,
    config: DecoderConfig,
    depth: usize,
}

impl<R: Read> Deserializer<R> {
    /// Creates a session with default configuration
    pub fn new(reader: R) -> Self {
        Self::with_config(reader, DecoderConfig::default())
    }

    /// Creates a session with custom configuration
    pub fn with_config(reader: R, config: DecoderConfig) -> Self {
        Self {
            cursor: ByteCursor::new(reader),
            contents: Contents::new(),
            handles: HandleTable::new(),
            config,
            depth: 0,
        }
    }

    /// Decodes the whole stream
    pub fn run(mut self) -> Result<ObjectStream> {
        self.read_header()?;

        let mut items = Vec::new();
        while let Some(item) = self.next_item()? {
            items.push(item);
        }
        debug!(
            "stream complete: {} items, {} entities, {} bytes",
            items.len(),
            self.contents.len(),
            self.cursor.offset()
        );

        let mut stream = ObjectStream {
            contents: self.contents,
            items,
            generations: self.handles.into_generations(),
        };
        stream.validate()?;
        if self.config.connect_member_classes {
            stream.connect_member_classes()?;
            stream.validate()?;
        }
        Ok(stream)
    }

    fn read_header(&mut self) -> Result<()> {
        let magic = self.cursor.read_u16()?;
        if magic != STREAM_MAGIC {
            return Err(Error::BadMagic { found: magic });
        }
        let version = self.cursor.read_u16()?;
        if version != STREAM_VERSION {
            return Err(Error::BadVersion { found: version });
        }
        Ok(())
    }

    /// Reads the next top-level item; `None` once the source is exhausted
    fn next_item(&mut self) -> Result<Option<Option<ContentId>>> {
        loop {
            self.cursor.start_recording();
            let offset = self.cursor.offset();
            let tc = match self.cursor.read_u8() {
                Ok(tc) => tc,
                Err(e) if e.is_end_of_stream() => {
                    self.cursor.take_recording();
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };
            if tc == u8::from(Opcode::Reset) {
                self.handles.reset();
                continue;
            }

            let flow = self.read_content(tc, offset, true)?;
            let recorded = self.cursor.take_recording();
            return match flow {
                Flow::Value(item) => Ok(Some(item)),
                Flow::Thrown(exception) => {
                    debug!(
                        "exception object captured after {} bytes of item at offset {}",
                        recorded.len(),
                        offset
                    );
                    let state = self.contents.push(Content::ExceptionState(ExceptionState {
                        exception,
                        stream_data: recorded,
                    }));
                    Ok(Some(Some(state)))
                }
            };
        }
    }

    fn enter(&mut self, offset: u64) -> Result<()> {
        if self.depth >= self.config.max_depth {
            return Err(Error::malformed_stream(
                offset,
                format!("nesting deeper than {}", self.config.max_depth),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    /// Reads one content item whose opcode byte `tc` was already consumed at `offset`
    pub(crate) fn read_content(
        &mut self,
        tc: u8,
        offset: u64,
        block_data: bool,
    ) -> Result<Flow<Option<ContentId>>> {
        self.enter(offset)?;
        let result = self.dispatch(tc, offset, block_data);
        self.depth -= 1;
        result
    }

    fn dispatch(
        &mut self,
        tc: u8,
        offset: u64,
        block_data: bool,
    ) -> Result<Flow<Option<ContentId>>> {
        let op = Opcode::from_byte(tc, offset)?;
        trace!("{} at offset {}", op, offset);
        match op {
            Opcode::Object => self.read_new_object(),
            Opcode::Class => self.read_new_class(),
            Opcode::Array => self.read_new_array(),
            Opcode::String | Opcode::LongString => {
                Ok(Flow::Value(Some(self.read_new_string(op)?)))
            }
            Opcode::Enum => self.read_new_enum(),
            Opcode::ClassDesc | Opcode::ProxyClassDesc => self.handle_class_desc(op, offset, true),
            Opcode::Reference => Ok(Flow::Value(Some(self.read_prev_object()?))),
            Opcode::Null => Ok(Flow::Value(None)),
            Opcode::Exception => self.read_exception(),
            Opcode::BlockData | Opcode::BlockDataLong => {
                if !block_data {
                    return Err(Error::protocol_violation(
                        offset,
                        format!("{} not allowed here", op),
                    ));
                }
                Ok(Flow::Value(Some(self.read_block_data(op)?)))
            }
            Opcode::EndBlockData | Opcode::Reset => Err(Error::protocol_violation(
                offset,
                format!("{} where content was expected", op),
            )),
        }
    }

    /// Reads an annotation list up to TC_ENDBLOCKDATA
    pub(crate) fn read_annotations(&mut self) -> Result<Flow<Vec<Option<ContentId>>>> {
        let mut list = Vec::new();
        loop {
            let offset = self.cursor.offset();
            let tc = self.cursor.read_u8()?;
            if tc == u8::from(Opcode::EndBlockData) {
                return Ok(Flow::Value(list));
            }
            if tc == u8::from(Opcode::Reset) {
                self.handles.reset();
                continue;
            }
            let item = value!(self.read_content(tc, offset, true)?);
            list.push(item);
        }
    }

    /// Reads a class description position: new description, reference or null
    fn read_class_desc(&mut self, must_be_new: bool) -> Result<Flow<Option<ContentId>>> {
        let offset = self.cursor.offset();
        let tc = self.cursor.read_u8()?;
        let op = Opcode::from_byte(tc, offset).map_err(|_| {
            Error::malformed_stream(
                offset,
                format!("expected a class description, got {:#04x}", tc),
            )
        })?;
        self.enter(offset)?;
        let result = self.handle_class_desc(op, offset, must_be_new);
        self.depth -= 1;
        result
    }

    /// Reads a class description that must be present (not TC_NULL)
    fn read_required_class_desc(&mut self, what: &str) -> Result<Flow<ContentId>> {
        let offset = self.cursor.offset();
        match value!(self.read_class_desc(false)?) {
            Some(id) => Ok(Flow::Value(id)),
            None => Err(Error::malformed_stream(
                offset,
                format!("{} with null class description", what),
            )),
        }
    }

    fn handle_class_desc(
        &mut self,
        op: Opcode,
        offset: u64,
        must_be_new: bool,
    ) -> Result<Flow<Option<ContentId>>> {
        match op {
            Opcode::ClassDesc => self.read_new_class_desc(),
            Opcode::ProxyClassDesc => self.read_new_proxy_class_desc(),
            Opcode::Null if !must_be_new => Ok(Flow::Value(None)),
            Opcode::Reference if !must_be_new => {
                let id = self.read_prev_object()?;
                match self.contents.get(id) {
                    Some(Content::ClassDesc(_)) => Ok(Flow::Value(Some(id))),
                    Some(other) => Err(Error::type_mismatch(format!(
                        "reference at offset {} is a {}, expected a class description",
                        offset,
                        other.kind_name()
                    ))),
                    None => Err(Error::malformed_stream(offset, "dangling reference")),
                }
            }
            _ => Err(Error::malformed_stream(
                offset,
                format!("expected a new class description, got {}", op),
            )),
        }
    }

    fn read_new_class_desc(&mut self) -> Result<Flow<Option<ContentId>>> {
        let name = self.cursor.read_utf()?;
        let serial_version_uid = self.cursor.read_i64()?;
        let handle = self.handles.allocate();
        let flags = self.cursor.read_u8()?;
        let count = self.cursor.read_i16()?;
        if count < 0 {
            return Err(Error::InvalidFieldCount {
                offset: self.cursor.offset(),
                count,
            });
        }

        let mut fields = Vec::with_capacity(count as usize);
        for _ in 0..count {
            fields.push(self.read_field_decl()?);
        }

        let mut cd = ClassDesc::new(handle, ClassDescKind::Normal, name);
        cd.serial_version_uid = serial_version_uid;
        cd.flags = ClassFlags(flags);
        cd.fields = fields;
        debug!("new class description {}: {} ({} fields)", handle, cd.name, count);

        let id = self.contents.push(Content::ClassDesc(cd));
        self.handles.register(handle, id)?;
        self.finish_class_desc(id)
    }

    fn read_field_decl(&mut self) -> Result<Field> {
        let offset = self.cursor.offset();
        let code = self.cursor.read_u8()?;
        let ty = FieldType::try_from(code).map_err(|_| {
            Error::malformed_stream(offset, format!("invalid field type code {:#04x}", code))
        })?;
        let name = self.cursor.read_utf()?;
        let class_name = if ty.is_reference() {
            let offset = self.cursor.offset();
            let tc = self.cursor.read_u8()?;
            Some(self.read_string(tc, offset)?)
        } else {
            None
        };
        Ok(Field {
            ty,
            name,
            class_name,
            is_inner_class_reference: false,
        })
    }

    fn read_new_proxy_class_desc(&mut self) -> Result<Flow<Option<ContentId>>> {
        let handle = self.handles.allocate();
        let count = self.cursor.read_i32()?;
        if count < 0 {
            return Err(Error::InvalidLength {
                offset: self.cursor.offset(),
                length: i64::from(count),
            });
        }
        let mut interfaces = Vec::new();
        for _ in 0..count {
            interfaces.push(self.cursor.read_utf()?);
        }
        debug!("new proxy class description {}: {:?}", handle, interfaces);

        let mut cd = ClassDesc::new(handle, ClassDescKind::Proxy, PROXY_CLASS_NAME.to_string());
        cd.interfaces = interfaces;
        let id = self.contents.push(Content::ClassDesc(cd));
        self.handles.register(handle, id)?;
        self.finish_class_desc(id)
    }

    /// Reads the annotations and superclass chain of a registered description
    fn finish_class_desc(&mut self, id: ContentId) -> Result<Flow<Option<ContentId>>> {
        let annotations = value!(self.read_annotations()?);
        let superclass = value!(self.read_class_desc(false)?);
        if let Some(cd) = self.contents.class_desc_mut(id) {
            cd.annotations = annotations;
            cd.superclass = superclass;
        }
        Ok(Flow::Value(Some(id)))
    }

    fn read_new_object(&mut self) -> Result<Flow<Option<ContentId>>> {
        let class_desc = value!(self.read_required_class_desc("object")?);
        let handle = self.handles.allocate();
        debug!(
            "new object {} of {}",
            handle,
            self.contents.class_name(class_desc)
        );
        let id = self.contents.push(Content::Instance(Instance {
            handle,
            class_desc,
            class_data: Vec::new(),
            is_exception: false,
        }));
        self.handles.register(handle, id)?;

        let class_data = value!(self.read_class_data(class_desc)?);
        if let Some(Content::Instance(instance)) = self.contents.get_mut(id) {
            instance.class_data = class_data;
        }
        Ok(Flow::Value(Some(id)))
    }

    fn read_new_class(&mut self) -> Result<Flow<Option<ContentId>>> {
        let class_desc = value!(self.read_required_class_desc("class")?);
        let handle = self.handles.allocate();
        debug!("new class {} of {}", handle, self.contents.class_name(class_desc));
        let id = self
            .contents
            .push(Content::Class(ClassObj { handle, class_desc }));
        self.handles.register(handle, id)?;
        Ok(Flow::Value(Some(id)))
    }

    fn read_new_array(&mut self) -> Result<Flow<Option<ContentId>>> {
        let offset = self.cursor.offset();
        let class_desc = value!(self.read_required_class_desc("array")?);
        let handle = self.handles.allocate();
        let name = self.contents.class_name(class_desc);
        let element_type = name
            .as_bytes()
            .get(1)
            .and_then(|&code| FieldType::try_from(code).ok())
            .ok_or_else(|| {
                Error::malformed_stream(offset, format!("invalid array class name '{}'", name))
            })?;
        debug!("new array {} of {}", handle, name);

        let id = self.contents.push(Content::Array(ArrayObj {
            handle,
            class_desc,
            element_type,
            elements: Vec::new(),
        }));
        self.handles.register(handle, id)?;

        let size = self.cursor.read_i32()?;
        if size < 0 {
            return Err(Error::InvalidLength {
                offset: self.cursor.offset(),
                length: i64::from(size),
            });
        }
        let mut elements = Vec::with_capacity((size as usize).min(4096));
        for _ in 0..size {
            elements.push(value!(self.read_field_value(element_type)?));
        }
        if let Some(Content::Array(array)) = self.contents.get_mut(id) {
            array.elements = elements;
        }
        Ok(Flow::Value(Some(id)))
    }

    /// Reads a string position: a new string or a reference to one
    fn read_string(&mut self, tc: u8, offset: u64) -> Result<ContentId> {
        let op = Opcode::from_byte(tc, offset)?;
        match op {
            Opcode::String | Opcode::LongString => self.read_new_string(op),
            Opcode::Reference => {
                let id = self.read_prev_object()?;
                match self.contents.get(id) {
                    Some(Content::String(_)) => Ok(id),
                    other => Err(Error::type_mismatch(format!(
                        "reference at offset {} is a {}, expected a string",
                        offset,
                        other.map_or("nothing", Content::kind_name)
                    ))),
                }
            }
            _ => Err(Error::malformed_stream(
                offset,
                format!("expected a string, got {}", op),
            )),
        }
    }

    fn read_new_string(&mut self, op: Opcode) -> Result<ContentId> {
        let len = if op == Opcode::LongString {
            let len = self.cursor.read_i64()?;
            if len < 0 || len > i64::from(i32::MAX) {
                return Err(Error::InvalidLength {
                    offset: self.cursor.offset(),
                    length: len,
                });
            }
            if len < SHORT_STRING_LIMIT {
                if self.config.strict_long_strings {
                    return Err(Error::InvalidLength {
                        offset: self.cursor.offset(),
                        length: len,
                    });
                }
                warn!("small string length encoded as TC_LONGSTRING: {}", len);
            }
            len as usize
        } else {
            usize::from(self.cursor.read_u16()?)
        };
        let handle = self.handles.allocate();
        let data = self.cursor.read_bytes(len)?;
        let value = mutf8::decode_string(&data)?;
        debug!("new string {}: {} bytes", handle, len);

        let id = self.contents.push(Content::String(StringObj { handle, value }));
        self.handles.register(handle, id)?;
        Ok(id)
    }

    fn read_new_enum(&mut self) -> Result<Flow<Option<ContentId>>> {
        let class_desc = value!(self.read_required_class_desc("enum")?);
        let handle = self.handles.allocate();
        let offset = self.cursor.offset();
        let tc = self.cursor.read_u8()?;
        let constant = self.read_string(tc, offset)?;

        let name = self
            .contents
            .string(constant)
            .map(|s| s.value.clone())
            .unwrap_or_default();
        debug!("new enum {}: {}", handle, name);
        if let Some(cd) = self.contents.class_desc_mut(class_desc) {
            cd.add_enum_constant(&name);
        }

        // The enum's handle is bound to its constant's string.
        self.handles.register(handle, constant)?;
        let id = self.contents.push(Content::Enum(EnumObj {
            handle,
            class_desc,
            constant,
        }));
        Ok(Flow::Value(Some(id)))
    }

    fn read_prev_object(&mut self) -> Result<ContentId> {
        let handle = Handle(self.cursor.read_i32()?);
        self.handles
            .resolve(handle)
            .map_err(|_| Error::UnresolvedReference {
                offset: self.cursor.offset(),
                handle,
            })
    }

    fn read_block_data(&mut self, op: Opcode) -> Result<ContentId> {
        let len = if op == Opcode::BlockDataLong {
            self.cursor.read_i32()?
        } else {
            i32::from(self.cursor.read_u8()?)
        };
        if len < 0 {
            return Err(Error::InvalidLength {
                offset: self.cursor.offset(),
                length: i64::from(len),
            });
        }
        let data = self.cursor.read_bytes(len as usize)?;
        debug!("block data: {} bytes", len);
        Ok(self.contents.push(Content::BlockData(BlockData {
            data: Bytes::from(data),
        })))
    }

    fn read_exception(&mut self) -> Result<Flow<Option<ContentId>>> {
        self.handles.reset();
        let offset = self.cursor.offset();
        let tc = self.cursor.read_u8()?;
        if tc == u8::from(Opcode::Reset) {
            return Err(Error::UnexpectedReset { offset });
        }

        let id = match self.read_content(tc, offset, false)? {
            Flow::Thrown(nested) => return Ok(Flow::Thrown(nested)),
            Flow::Value(None) => {
                return Err(Error::malformed_exception(offset, "exception object is null"))
            }
            Flow::Value(Some(id)) => id,
        };
        match self.contents.get_mut(id) {
            Some(Content::Instance(instance)) => instance.is_exception = true,
            other => {
                return Err(Error::malformed_exception(
                    offset,
                    format!(
                        "exception is a {}, not an object",
                        other.map_or("nothing", |c| c.kind_name())
                    ),
                ))
            }
        }
        debug!("exception object read at offset {}", offset);
        self.handles.reset();
        Ok(Flow::Thrown(id))
    }

    /// Reads one field or array element of type `ty`
    pub(crate) fn read_field_value(&mut self, ty: FieldType) -> Result<Flow<Value>> {
        let value = match ty {
            FieldType::Byte => Value::Byte(self.cursor.read_i8()?),
            FieldType::Char => Value::Char(self.cursor.read_u16()?),
            FieldType::Double => Value::Double(self.cursor.read_f64()?),
            FieldType::Float => Value::Float(self.cursor.read_f32()?),
            FieldType::Int => Value::Int(self.cursor.read_i32()?),
            FieldType::Long => Value::Long(self.cursor.read_i64()?),
            FieldType::Short => Value::Short(self.cursor.read_i16()?),
            FieldType::Boolean => Value::Boolean(self.cursor.read_bool()?),
            FieldType::Object | FieldType::Array => {
                let offset = self.cursor.offset();
                let tc = self.cursor.read_u8()?;
                if ty == FieldType::Array {
                    self.check_array_opcode(tc, offset)?;
                }
                let content = value!(self.read_content(tc, offset, false)?);
                Value::from_content(content)
            }
        };
        Ok(Flow::Value(value))
    }

    /// Array-typed fields must start a new array
    fn check_array_opcode(&self, tc: u8, offset: u64) -> Result<()> {
        if tc == u8::from(Opcode::Array) {
            Ok(())
        } else {
            Err(Error::type_mismatch(format!(
                "array field at offset {} starts with {:#04x}, not TC_ARRAY",
                offset, tc
            )))
        }
    }
}

/// Everything decoded from one stream
#[derive(Debug, Clone)]
pub struct ObjectStream {
    contents: Contents,
    items: Vec<Option<ContentId>>,
    generations: Vec<Generation>,
}

impl ObjectStream {
    /// Decodes a stream from any reader with default configuration
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Deserializer::new(reader).run()
    }

    /// Decodes an in-memory stream with default configuration
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Deserializer::new(data).run()
    }

    /// Decodes a stream file
    pub fn from_file(path: impl AsRef<Path>, config: DecoderConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| Error::file_read(path, e))?;
        Deserializer::with_config(BufReader::new(file), config).run()
    }

    /// Top-level items in stream order; `None` is a written null
    pub fn items(&self) -> &[Option<ContentId>] {
        &self.items
    }

    /// The entity arena
    pub fn contents(&self) -> &Contents {
        &self.contents
    }

    /// Looks up one entity
    pub fn get(&self, id: ContentId) -> Option<&Content> {
        self.contents.get(id)
    }

    /// Handle-table generations, oldest first
    pub fn generations(&self) -> &[Generation] {
        &self.generations
    }

    /// All class descriptions, in decode order
    pub fn class_descs(&self) -> impl Iterator<Item = (ContentId, &ClassDesc)> {
        self.contents.class_descs()
    }

    /// All instances, in decode order
    pub fn instances(&self) -> impl Iterator<Item = (ContentId, &Instance)> {
        self.contents.iter().filter_map(|(id, c)| match c {
            Content::Instance(i) => Some((id, i)),
            _ => None,
        })
    }

    /// Top-level block data payloads, in stream order
    pub fn block_data(&self) -> impl Iterator<Item = &BlockData> {
        self.items
            .iter()
            .flatten()
            .filter_map(|&id| match self.contents.get(id) {
                Some(Content::BlockData(b)) => Some(b),
                _ => None,
            })
    }

    /// Checks the invariants of every entity
    pub fn validate(&self) -> Result<()> {
        self.contents.validate_all()
    }

    /// Infers member-class relationships and renames member classes
    pub fn connect_member_classes(&mut self) -> Result<()> {
        connect::connect_member_classes(&mut self.contents)
    }
}
