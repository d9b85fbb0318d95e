//! In-memory model of everything a stream can contain.
//!
//! ## Architecture
//!
//! All decoded entities live in one flat arena, [`Contents`], owned by the
//! decode session and addressed by [`ContentId`]. Links between entities
//! (superclass chains, field values, array elements) are ids, never owned
//! pointers, so back-references that form cycles need no special handling.
//!
//! Handles are a separate concern: a [`Handle`] is the stream-local number a
//! writer used for an entity, unique only within one generation of the
//! [`HandleTable`].

mod handles;
mod types;

use crate::error::{Error, Result};
use crate::stream::{SC_BLOCK_DATA, SC_ENUM, SC_EXTERNALIZABLE, SC_SERIALIZABLE, SC_WRITE_METHOD};
use bytes::Bytes;
use std::fmt;

pub use handles::{Generation, HandleTable};
pub use types::{decode_class_name, resolve_type_name, FieldType};

/// Stream-local identity of a multiply-referenceable entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(pub i32);

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Index of an entity in the session arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId(pub usize);

/// Description flags byte of a class description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClassFlags(pub u8);

impl ClassFlags {
    /// Raw flags byte
    pub fn bits(self) -> u8 {
        self.0
    }

    /// `SC_WRITE_METHOD`
    pub fn has_write_method(self) -> bool {
        self.0 & SC_WRITE_METHOD != 0
    }

    /// `SC_SERIALIZABLE`
    pub fn is_serializable(self) -> bool {
        self.0 & SC_SERIALIZABLE != 0
    }

    /// `SC_EXTERNALIZABLE`
    pub fn is_externalizable(self) -> bool {
        self.0 & SC_EXTERNALIZABLE != 0
    }

    /// `SC_BLOCK_DATA`
    pub fn has_block_data(self) -> bool {
        self.0 & SC_BLOCK_DATA != 0
    }

    /// `SC_ENUM`
    pub fn is_enum(self) -> bool {
        self.0 & SC_ENUM != 0
    }
}

/// Normal or dynamic-proxy class description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassDescKind {
    /// Named class
    Normal,
    /// Proxy class; described by its interfaces only
    Proxy,
}

/// Name given to proxy class descriptions
pub const PROXY_CLASS_NAME: &str = "(proxy class; no name)";

/// One field slot of a class description
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Declared type code
    pub ty: FieldType,
    /// Field name
    pub name: String,
    /// For reference fields, the [`StringObj`] holding the type descriptor
    pub class_name: Option<ContentId>,
    /// Set by the member-class reconnector for `this$N` fields
    pub is_inner_class_reference: bool,
}

/// A class's serialized shape
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDesc {
    /// Handle assigned when first read
    pub handle: Handle,
    /// Normal or proxy
    pub kind: ClassDescKind,
    /// Class name; [`PROXY_CLASS_NAME`] for proxies
    pub name: String,
    /// Serial version UID
    pub serial_version_uid: i64,
    /// Description flags
    pub flags: ClassFlags,
    /// Fields in stream order
    pub fields: Vec<Field>,
    /// Proxy interface names
    pub interfaces: Vec<String>,
    /// Class annotation list (`None` entries are nulls)
    pub annotations: Vec<Option<ContentId>>,
    /// Superclass description
    pub superclass: Option<ContentId>,
    /// Member classes connected by the reconnector
    pub inner_classes: Vec<ContentId>,
    /// Enum constant names, in order of first appearance
    pub enum_constants: Vec<String>,
    /// Inner (non-static member) class
    pub is_inner_class: bool,
    /// Local inner class
    pub is_local_inner_class: bool,
    /// Static member class
    pub is_static_member_class: bool,
}

impl ClassDesc {
    pub(crate) fn new(handle: Handle, kind: ClassDescKind, name: String) -> Self {
        Self {
            handle,
            kind,
            name,
            serial_version_uid: 0,
            flags: ClassFlags::default(),
            fields: Vec::new(),
            interfaces: Vec::new(),
            annotations: Vec::new(),
            superclass: None,
            inner_classes: Vec::new(),
            enum_constants: Vec::new(),
            is_inner_class: false,
            is_local_inner_class: false,
            is_static_member_class: false,
        }
    }

    /// True for proxy class descriptions
    pub fn is_proxy(&self) -> bool {
        self.kind == ClassDescKind::Proxy
    }

    /// True if this describes an array class (`[I`, `[Lfoo;`, ...)
    pub fn is_array_class(&self) -> bool {
        self.name.len() > 1 && self.name.starts_with('[')
    }

    /// Records an enum constant name once
    pub fn add_enum_constant(&mut self, name: &str) {
        if !self.enum_constants.iter().any(|c| c == name) {
            self.enum_constants.push(name.to_string());
        }
    }
}

impl fmt::Display for ClassDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[cd {}: name {} uid {}]",
            self.handle, self.name, self.serial_version_uid
        )
    }
}

/// A decoded field or array element value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// `byte`
    Byte(i8),
    /// `char`, as a UTF-16 code unit
    Char(u16),
    /// `double`
    Double(f64),
    /// `float`
    Float(f32),
    /// `int`
    Int(i32),
    /// `long`
    Long(i64),
    /// `short`
    Short(i16),
    /// `boolean`
    Boolean(bool),
    /// Null reference
    Null,
    /// Reference to decoded content
    Ref(ContentId),
}

impl Value {
    /// The referenced content, if any
    pub fn as_ref_id(&self) -> Option<ContentId> {
        match self {
            Value::Ref(id) => Some(*id),
            _ => None,
        }
    }

    /// Wraps an optional content id (null when absent)
    pub fn from_content(id: Option<ContentId>) -> Self {
        id.map_or(Value::Null, Value::Ref)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Byte(v) => write!(f, "{}", v),
            Value::Char(v) => match char::from_u32(u32::from(*v)) {
                Some(c) if !c.is_control() => write!(f, "{}", c),
                _ => write!(f, "\\u{:04x}", v),
            },
            Value::Double(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Short(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Null => f.write_str("null"),
            Value::Ref(id) => write!(f, "#{}", id.0),
        }
    }
}

/// Field data and annotations contributed by one class of an instance's hierarchy
#[derive(Debug, Clone, PartialEq)]
pub struct ClassData {
    /// Declaring class description
    pub class_desc: ContentId,
    /// Field values in declaration order
    pub values: Vec<(String, Value)>,
    /// Custom-write or externalized annotation list
    pub annotations: Vec<Option<ContentId>>,
}

impl ClassData {
    /// Looks up a field value by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// An object instance
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    /// Handle assigned when first read
    pub handle: Handle,
    /// Class description of the object
    pub class_desc: ContentId,
    /// Per-class data, root class first
    pub class_data: Vec<ClassData>,
    /// Set when the object was thrown by the writer mid-stream
    pub is_exception: bool,
}

impl Instance {
    /// Data declared by a particular class of the hierarchy
    pub fn data_for(&self, class_desc: ContentId) -> Option<&ClassData> {
        self.class_data.iter().find(|d| d.class_desc == class_desc)
    }
}

/// A reference to a class itself
#[derive(Debug, Clone, PartialEq)]
pub struct ClassObj {
    /// Handle assigned when first read
    pub handle: Handle,
    /// The referenced class description
    pub class_desc: ContentId,
}

/// An array instance
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayObj {
    /// Handle assigned when first read
    pub handle: Handle,
    /// Array class description
    pub class_desc: ContentId,
    /// Element type derived from the class name
    pub element_type: FieldType,
    /// Elements in order
    pub elements: Vec<Value>,
}

/// A string instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringObj {
    /// Handle assigned when first read
    pub handle: Handle,
    /// Decoded text
    pub value: String,
}

/// An enum constant
#[derive(Debug, Clone, PartialEq)]
pub struct EnumObj {
    /// Handle assigned when first read
    pub handle: Handle,
    /// Enum class description
    pub class_desc: ContentId,
    /// [`StringObj`] naming the constant
    pub constant: ContentId,
}

/// Opaque block-data payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockData {
    /// Raw bytes
    pub data: Bytes,
}

/// A failed write captured in the stream
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionState {
    /// The thrown object ([`Instance`] with `is_exception` set)
    pub exception: ContentId,
    /// Bytes consumed from the start of the top-level item through the marker
    pub stream_data: Bytes,
}

/// Every kind of decoded entity
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// Class description
    ClassDesc(ClassDesc),
    /// Object instance
    Instance(Instance),
    /// Class reference
    Class(ClassObj),
    /// Array instance
    Array(ArrayObj),
    /// String instance
    String(StringObj),
    /// Enum constant
    Enum(EnumObj),
    /// Block data
    BlockData(BlockData),
    /// Captured exception
    ExceptionState(ExceptionState),
}

impl Content {
    /// Short kind name for diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Content::ClassDesc(_) => "class description",
            Content::Instance(_) => "instance",
            Content::Class(_) => "class",
            Content::Array(_) => "array",
            Content::String(_) => "string",
            Content::Enum(_) => "enum",
            Content::BlockData(_) => "block data",
            Content::ExceptionState(_) => "exception state",
        }
    }

    /// Handle of the entity; block data has none
    pub fn handle(&self) -> Option<Handle> {
        match self {
            Content::ClassDesc(c) => Some(c.handle),
            Content::Instance(i) => Some(i.handle),
            Content::Class(c) => Some(c.handle),
            Content::Array(a) => Some(a.handle),
            Content::String(s) => Some(s.handle),
            Content::Enum(e) => Some(e.handle),
            Content::BlockData(_) | Content::ExceptionState(_) => None,
        }
    }

    /// True for an instance thrown by the writer
    pub fn is_exception_object(&self) -> bool {
        matches!(self, Content::Instance(i) if i.is_exception)
    }
}

/// Session-owned arena of decoded entities
#[derive(Debug, Clone, Default)]
pub struct Contents {
    items: Vec<Content>,
}

impl Contents {
    /// Creates an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entity and returns its id
    pub fn push(&mut self, content: Content) -> ContentId {
        self.items.push(content);
        ContentId(self.items.len() - 1)
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if nothing was decoded
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Looks up an entity
    pub fn get(&self, id: ContentId) -> Option<&Content> {
        self.items.get(id.0)
    }

    /// Looks up an entity mutably
    pub fn get_mut(&mut self, id: ContentId) -> Option<&mut Content> {
        self.items.get_mut(id.0)
    }

    /// All entities with their ids, in decode order
    pub fn iter(&self) -> impl Iterator<Item = (ContentId, &Content)> {
        self.items.iter().enumerate().map(|(i, c)| (ContentId(i), c))
    }

    /// All class descriptions, in decode order
    pub fn class_descs(&self) -> impl Iterator<Item = (ContentId, &ClassDesc)> {
        self.iter().filter_map(|(id, c)| match c {
            Content::ClassDesc(cd) => Some((id, cd)),
            _ => None,
        })
    }

    /// A class description by id
    pub fn class_desc(&self, id: ContentId) -> Option<&ClassDesc> {
        match self.get(id) {
            Some(Content::ClassDesc(cd)) => Some(cd),
            _ => None,
        }
    }

    /// A mutable class description by id
    pub fn class_desc_mut(&mut self, id: ContentId) -> Option<&mut ClassDesc> {
        match self.get_mut(id) {
            Some(Content::ClassDesc(cd)) => Some(cd),
            _ => None,
        }
    }

    /// An instance by id
    pub fn instance(&self, id: ContentId) -> Option<&Instance> {
        match self.get(id) {
            Some(Content::Instance(i)) => Some(i),
            _ => None,
        }
    }

    /// A string by id
    pub fn string(&self, id: ContentId) -> Option<&StringObj> {
        match self.get(id) {
            Some(Content::String(s)) => Some(s),
            _ => None,
        }
    }

    /// A mutable string by id
    pub fn string_mut(&mut self, id: ContentId) -> Option<&mut StringObj> {
        match self.get_mut(id) {
            Some(Content::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Name of a class description, for diagnostics
    pub fn class_name(&self, id: ContentId) -> &str {
        self.class_desc(id).map_or("<unknown>", |cd| cd.name.as_str())
    }

    /// Type-descriptor text of a reference field
    pub fn field_descriptor(&self, field: &Field) -> Option<&str> {
        field
            .class_name
            .and_then(|id| self.string(id))
            .map(|s| s.value.as_str())
    }

    /// Source-like type of a field (`int`, `java.lang.String`, `byte[]`)
    pub fn field_type_name(&self, field: &Field) -> Result<String> {
        resolve_type_name(field.ty, self.field_descriptor(field), true)
    }

    /// Superclass chain of `class_desc`, root first, ending with `class_desc`.
    ///
    /// The walk stops at a proxy superclass; neither the proxy nor its
    /// ancestors are part of the chain. A chain that revisits a class is cut
    /// at the repeat.
    pub fn hierarchy(&self, class_desc: ContentId) -> Vec<ContentId> {
        let mut chain = vec![class_desc];
        let mut current = self.class_desc(class_desc).and_then(|cd| cd.superclass);
        while let Some(id) = current {
            if chain.contains(&id) {
                tracing::warn!("cyclic superclass chain at {}", self.class_name(id));
                break;
            }
            let Some(cd) = self.class_desc(id) else { break };
            if cd.is_proxy() {
                tracing::warn!("proxy class {} in superclass hierarchy", cd.handle);
                break;
            }
            chain.push(id);
            current = cd.superclass;
        }
        chain.reverse();
        chain
    }

    /// Checks the model invariants of one entity
    pub fn validate(&self, id: ContentId) -> Result<()> {
        match self.get(id) {
            Some(Content::ClassDesc(cd)) => self.validate_class_desc(cd),
            Some(Content::ExceptionState(state)) => match self.get(state.exception) {
                Some(c) if c.is_exception_object() => Ok(()),
                _ => Err(Error::validity(
                    "exception state does not wrap an exception object",
                )),
            },
            Some(_) => Ok(()),
            None => Err(Error::validity(format!("no content with id {}", id.0))),
        }
    }

    /// Checks the model invariants of every entity
    pub fn validate_all(&self) -> Result<()> {
        (0..self.items.len()).try_for_each(|i| self.validate(ContentId(i)))
    }

    fn validate_class_desc(&self, cd: &ClassDesc) -> Result<()> {
        let flags = cd.flags;
        if !flags.is_serializable() && !flags.is_externalizable() && !cd.fields.is_empty() {
            return Err(Error::validity(format!(
                "non-serializable, non-externalizable class {} has fields",
                cd.name
            )));
        }
        if flags.is_serializable() && flags.is_externalizable() {
            return Err(Error::ConflictingFlags {
                class: cd.name.clone(),
                flags: flags.bits(),
            });
        }
        if flags.is_enum() {
            if !cd.fields.is_empty() || !cd.interfaces.is_empty() {
                return Err(Error::validity(format!(
                    "enum class {} has fields or interfaces",
                    cd.name
                )));
            }
        } else if !cd.enum_constants.is_empty() {
            return Err(Error::validity(format!(
                "non-enum class {} has enum constants",
                cd.name
            )));
        }
        for field in &cd.fields {
            self.validate_field(cd, field)?;
        }
        Ok(())
    }

    fn validate_field(&self, cd: &ClassDesc, field: &Field) -> Result<()> {
        if !field.ty.is_reference() {
            return Ok(());
        }
        let descriptor = self.field_descriptor(field).ok_or_else(|| {
            Error::validity(format!(
                "reference field {}.{} has no class name",
                cd.name, field.name
            ))
        })?;
        let well_formed = match field.ty {
            FieldType::Object => {
                descriptor.len() > 2
                    && descriptor.starts_with('L')
                    && descriptor.find(';') == Some(descriptor.len() - 1)
            }
            _ => descriptor.len() > 1 && descriptor.starts_with('['),
        };
        if !well_formed {
            return Err(Error::validity(format!(
                "invalid type descriptor '{}' for field {}.{}",
                descriptor, cd.name, field.name
            )));
        }
        Ok(())
    }
}
