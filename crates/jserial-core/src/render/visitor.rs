//! Walking decoded content.
//!
//! This module provides the [`ContentVisitor`] trait for code that wants to
//! see every decoded entity without matching on [`Content`] itself.

use crate::model::{
    ArrayObj, BlockData, ClassDesc, ClassObj, Content, ContentId, EnumObj, ExceptionState,
    Instance, StringObj,
};
use crate::stream::ObjectStream;
use std::fmt;

/// Callbacks for each kind of decoded entity.
///
/// Every method has a no-op default, so implementors only override what
/// they care about.
///
/// # Example
///
/// ```
/// use jserial_core::{ContentId, ContentVisitor, Instance, ObjectStream};
///
/// struct ClassNames(Vec<ContentId>);
///
/// impl ContentVisitor for ClassNames {
///     fn visit_instance(&mut self, _id: ContentId, instance: &Instance) {
///         self.0.push(instance.class_desc);
///     }
/// }
///
/// let stream = ObjectStream::from_bytes(&[0xAC, 0xED, 0x00, 0x05])?;
/// let mut names = ClassNames(Vec::new());
/// stream.visit(&mut names);
/// assert!(names.0.is_empty());
/// # Ok::<(), jserial_core::Error>(())
/// ```
pub trait ContentVisitor {
    /// A class description
    fn visit_class_desc(&mut self, id: ContentId, class_desc: &ClassDesc) {
        let _ = (id, class_desc);
    }

    /// An object instance
    fn visit_instance(&mut self, id: ContentId, instance: &Instance) {
        let _ = (id, instance);
    }

    /// A class object
    fn visit_class(&mut self, id: ContentId, class: &ClassObj) {
        let _ = (id, class);
    }

    /// An array
    fn visit_array(&mut self, id: ContentId, array: &ArrayObj) {
        let _ = (id, array);
    }

    /// A string
    fn visit_string(&mut self, id: ContentId, string: &StringObj) {
        let _ = (id, string);
    }

    /// An enum constant
    fn visit_enum(&mut self, id: ContentId, constant: &EnumObj) {
        let _ = (id, constant);
    }

    /// A block-data payload
    fn visit_block_data(&mut self, id: ContentId, block: &BlockData) {
        let _ = (id, block);
    }

    /// A captured writer exception
    fn visit_exception_state(&mut self, id: ContentId, state: &ExceptionState) {
        let _ = (id, state);
    }
}

impl ObjectStream {
    /// Feeds every decoded entity to `visitor`, in decode order
    pub fn visit<V: ContentVisitor + ?Sized>(&self, visitor: &mut V) {
        for (id, content) in self.contents().iter() {
            match content {
                Content::ClassDesc(cd) => visitor.visit_class_desc(id, cd),
                Content::Instance(i) => visitor.visit_instance(id, i),
                Content::Class(c) => visitor.visit_class(id, c),
                Content::Array(a) => visitor.visit_array(id, a),
                Content::String(s) => visitor.visit_string(id, s),
                Content::Enum(e) => visitor.visit_enum(id, e),
                Content::BlockData(b) => visitor.visit_block_data(id, b),
                Content::ExceptionState(x) => visitor.visit_exception_state(id, x),
            }
        }
    }
}

/// A visitor that collects statistics about a stream
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StreamStats {
    /// Number of class descriptions (proxies included)
    pub class_count: usize,
    /// Number of proxy class descriptions
    pub proxy_count: usize,
    /// Number of object instances
    pub instance_count: usize,
    /// Number of class objects
    pub class_object_count: usize,
    /// Number of arrays
    pub array_count: usize,
    /// Number of strings
    pub string_count: usize,
    /// Number of enum constants
    pub enum_count: usize,
    /// Number of block-data payloads
    pub block_data_count: usize,
    /// Total block-data bytes
    pub block_data_bytes: usize,
    /// Number of captured writer exceptions
    pub exception_count: usize,
}

impl StreamStats {
    /// Collects statistics for `stream`
    pub fn collect(stream: &ObjectStream) -> Self {
        let mut stats = Self::default();
        stream.visit(&mut stats);
        stats
    }
}

impl ContentVisitor for StreamStats {
    fn visit_class_desc(&mut self, _id: ContentId, class_desc: &ClassDesc) {
        self.class_count += 1;
        if class_desc.is_proxy() {
            self.proxy_count += 1;
        }
    }

    fn visit_instance(&mut self, _id: ContentId, _instance: &Instance) {
        self.instance_count += 1;
    }

    fn visit_class(&mut self, _id: ContentId, _class: &ClassObj) {
        self.class_object_count += 1;
    }

    fn visit_array(&mut self, _id: ContentId, _array: &ArrayObj) {
        self.array_count += 1;
    }

    fn visit_string(&mut self, _id: ContentId, _string: &StringObj) {
        self.string_count += 1;
    }

    fn visit_enum(&mut self, _id: ContentId, _constant: &EnumObj) {
        self.enum_count += 1;
    }

    fn visit_block_data(&mut self, _id: ContentId, block: &BlockData) {
        self.block_data_count += 1;
        self.block_data_bytes += block.data.len();
    }

    fn visit_exception_state(&mut self, _id: ContentId, _state: &ExceptionState) {
        self.exception_count += 1;
    }
}

impl fmt::Display for StreamStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} classes ({} proxy), {} instances, {} arrays, {} strings, {} enums, \
             {} block data ({} bytes), {} exceptions",
            self.class_count,
            self.proxy_count,
            self.instance_count,
            self.array_count,
            self.string_count,
            self.enum_count,
            self.block_data_count,
            self.block_data_bytes,
            self.exception_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{Opcode, SC_SERIALIZABLE};
    use crate::testutil::StreamBuilder;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_visitor_ignores_everything() {
        struct Nothing;
        impl ContentVisitor for Nothing {}

        let data = StreamBuilder::new().string("x").build();
        let stream = ObjectStream::from_bytes(&data).unwrap();
        stream.visit(&mut Nothing);
    }

    #[test]
    fn test_stream_stats() {
        let data = StreamBuilder::new()
            .object()
            .class("A", SC_SERIALIZABLE, &[('L', "s", Some("Ljava/lang/String;"))])
            .string("hello")
            .block_data(&[1, 2, 3])
            .op(Opcode::Exception)
            .object()
            .class("E", SC_SERIALIZABLE, &[])
            .build();
        let stream = ObjectStream::from_bytes(&data).unwrap();
        let stats = StreamStats::collect(&stream);
        assert_eq!(
            stats,
            StreamStats {
                class_count: 2,
                proxy_count: 0,
                instance_count: 2,
                class_object_count: 0,
                array_count: 0,
                string_count: 2,
                enum_count: 0,
                block_data_count: 1,
                block_data_bytes: 3,
                exception_count: 1,
            }
        );
        assert!(stats.to_string().starts_with("2 classes (0 proxy), 2 instances"));
    }
}
