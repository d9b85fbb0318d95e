//! Human-readable output for decoded streams.
//!
//! Three views are produced by [`Renderer`]:
//!
//! - a content listing with one bracketed line per top-level item
//! - source-like class declarations, member classes nested in their outer class
//! - an instance dump with per-class field data
//!
//! All output goes through [`std::fmt::Write`], so the caller decides whether
//! it lands in a `String`, a file or stdout.

mod visitor;

use crate::model::{resolve_type_name, ClassDesc, Content, ContentId, FieldType, Value};
use crate::stream::ObjectStream;
use regex::Regex;
use std::collections::HashSet;
use std::fmt::{self, Write as FmtWrite};

pub use visitor::{ContentVisitor, StreamStats};

/// Reserved words that cannot be used as identifiers
const KEYWORDS: &[&str] = &[
    "abstract", "continue", "for", "new", "switch", "assert", "default", "if", "package",
    "synchronized", "boolean", "do", "goto", "private", "this", "break", "double", "implements",
    "protected", "throw", "byte", "else", "import", "public", "throws", "case", "enum",
    "instanceof", "return", "transient", "catch", "extends", "int", "short", "try", "char",
    "final", "interface", "static", "void", "class", "finally", "long", "strictfp", "volatile",
    "const", "float", "native", "super", "while",
];

/// Configuration for rendering
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Indentation string (default: 4 spaces)
    pub indent_str: String,
    /// Include array classes in class declarations
    pub show_arrays: bool,
    /// Rewrite class names into legal identifiers
    pub fix_names: bool,
    /// Classes whose name matches are left out of class declarations
    pub exclude: Option<Regex>,
    /// Line width for wrapping enum constants
    pub code_width: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            indent_str: "    ".to_string(),
            show_arrays: false,
            fix_names: false,
            exclude: None,
            code_width: 90,
        }
    }
}

impl RenderConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the indentation string
    pub fn indent_str(mut self, s: impl Into<String>) -> Self {
        self.indent_str = s.into();
        self
    }

    /// Sets whether array classes are declared
    pub fn show_arrays(mut self, show: bool) -> Self {
        self.show_arrays = show;
        self
    }

    /// Sets whether class names are fixed up
    pub fn fix_names(mut self, fix: bool) -> Self {
        self.fix_names = fix;
        self
    }

    /// Sets the class exclusion pattern
    pub fn exclude(mut self, pattern: Option<Regex>) -> Self {
        self.exclude = pattern;
        self
    }

    /// Sets the wrap width for enum constants
    pub fn code_width(mut self, width: usize) -> Self {
        self.code_width = width;
        self
    }
}

/// Renders the views of one decoded stream
#[derive(Debug)]
pub struct Renderer<'a> {
    stream: &'a ObjectStream,
    config: &'a RenderConfig,
}

impl<'a> Renderer<'a> {
    /// Creates a renderer over `stream`
    pub fn new(stream: &'a ObjectStream, config: &'a RenderConfig) -> Self {
        Self { stream, config }
    }

    /// Title line for the class declaration view
    pub fn class_declarations_title(&self) -> String {
        let mut title = String::from("class declarations");
        if !self.config.show_arrays {
            title.push_str(" (excluding array classes)");
        }
        if let Some(re) = &self.config.exclude {
            title.push_str(&format!(" (exclusion filter {})", re.as_str()));
        }
        title
    }

    /// One-line description of an entity
    pub fn describe(&self, id: ContentId) -> String {
        let contents = self.stream.contents();
        match contents.get(id) {
            None => format!("[missing #{}]", id.0),
            Some(Content::ClassDesc(cd)) => cd.to_string(),
            Some(Content::String(s)) => {
                format!("[String {}: \"{}\"]", s.handle, escape_string(&s.value))
            }
            Some(Content::Instance(i)) => format!(
                "[instance {}: {}/{}]",
                i.handle,
                self.class_handle(i.class_desc),
                contents.class_name(i.class_desc)
            ),
            Some(Content::Class(c)) => {
                format!("[class {}: {}]", c.handle, self.describe(c.class_desc))
            }
            Some(Content::Array(a)) => {
                let elements: Vec<String> = a.elements.iter().map(|v| self.value(v)).collect();
                format!(
                    "[array {} classdesc {}: [{}]]",
                    a.handle,
                    self.describe(a.class_desc),
                    elements.join(", ")
                )
            }
            Some(Content::Enum(e)) => {
                let constant = contents.string(e.constant).map_or("?", |s| s.value.as_str());
                format!("[enum {}: {}]", e.handle, constant)
            }
            Some(Content::BlockData(b)) => format!("[blockdata: {} bytes]", b.data.len()),
            Some(Content::ExceptionState(state)) => {
                let mut out = format!(
                    "[exceptionstate object {}  buflen {}",
                    self.describe(state.exception),
                    state.stream_data.len()
                );
                if !state.stream_data.is_empty() {
                    for (i, byte) in state.stream_data.iter().enumerate() {
                        if i % 16 == 0 {
                            let _ = write!(out, "\n{:7x}: ", i);
                        }
                        let _ = write!(out, " {:02x}", byte);
                    }
                    out.push('\n');
                }
                out.push(']');
                out
            }
        }
    }

    fn class_handle(&self, class_desc: ContentId) -> String {
        self.stream
            .contents()
            .class_desc(class_desc)
            .map_or_else(|| "?".to_string(), |cd| cd.handle.to_string())
    }

    /// Short form of a value: primitives as-is, references by handle
    fn value(&self, value: &Value) -> String {
        match value {
            Value::Ref(id) => match self.stream.get(*id).and_then(Content::handle) {
                Some(handle) => format!("r{}", handle),
                None => format!("#{}", id.0),
            },
            other => other.to_string(),
        }
    }

    /// Writes the content listing: one line per top-level item
    pub fn write_content_listing(&self, w: &mut impl FmtWrite) -> fmt::Result {
        for item in self.stream.items() {
            match item {
                Some(id) => writeln!(w, "{}", self.describe(*id))?,
                None => writeln!(w, "null")?,
            }
        }
        Ok(())
    }

    /// Writes declarations for every top-level class
    pub fn write_class_declarations(&self, w: &mut impl FmtWrite) -> fmt::Result {
        let mut seen = HashSet::new();
        for (id, cd) in self.stream.class_descs() {
            // member classes are written inside their outer class
            if cd.is_inner_class || cd.is_static_member_class {
                continue;
            }
            if !self.config.show_arrays && cd.is_array_class() {
                continue;
            }
            if self
                .config
                .exclude
                .as_ref()
                .is_some_and(|re| re.is_match(&cd.name))
            {
                continue;
            }
            if !cd.is_proxy() && !seen.insert(cd.name.as_str()) {
                continue;
            }
            let mut writer = DeclWriter::new(w, self);
            writer.write_class(id)?;
            writeln!(w)?;
        }
        Ok(())
    }

    /// Writes every instance with its per-class field data
    pub fn write_instance_dump(&self, w: &mut impl FmtWrite) -> fmt::Result {
        let contents = self.stream.contents();
        for (id, instance) in self.stream.instances() {
            write!(
                w,
                "[instance {}: {}/{}",
                instance.handle,
                self.class_handle(instance.class_desc),
                contents.class_name(instance.class_desc)
            )?;
            if !instance.class_data.is_empty() {
                writeln!(w)?;
                writeln!(w, "  field data:")?;
                for data in &instance.class_data {
                    writeln!(
                        w,
                        "    {}/{}:",
                        self.class_handle(data.class_desc),
                        contents.class_name(data.class_desc)
                    )?;
                    for (name, value) in &data.values {
                        write!(w, "        {}: ", name)?;
                        match value {
                            Value::Ref(target) if *target == id => {
                                writeln!(w, "this: {}", self.describe(*target))?
                            }
                            Value::Ref(target) => {
                                writeln!(w, "{}: {}", self.value(value), self.describe(*target))?
                            }
                            other => writeln!(w, "{}", other)?,
                        }
                    }
                }
            }
            writeln!(w, "]")?;
        }
        Ok(())
    }

    /// Content listing as a `String`
    pub fn content_listing(&self) -> String {
        let mut out = String::new();
        let _ = self.write_content_listing(&mut out);
        out
    }

    /// Class declarations as a `String`
    pub fn class_declarations(&self) -> String {
        let mut out = String::new();
        let _ = self.write_class_declarations(&mut out);
        out
    }

    /// Instance dump as a `String`
    pub fn instance_dump(&self) -> String {
        let mut out = String::new();
        let _ = self.write_instance_dump(&mut out);
        out
    }

    fn display_name(&self, cd: &ClassDesc) -> String {
        let name = if cd.is_array_class() {
            resolve_type_name(FieldType::Array, Some(&cd.name), false)
                .unwrap_or_else(|_| cd.name.clone())
        } else {
            cd.name.clone()
        };
        if self.config.fix_names {
            fix_class_name(&name)
        } else {
            name
        }
    }
}

/// Internal writer that tracks indentation
struct DeclWriter<'a, 'r, W: FmtWrite> {
    writer: &'a mut W,
    renderer: &'a Renderer<'r>,
    indent_level: usize,
}

impl<'a, 'r, W: FmtWrite> DeclWriter<'a, 'r, W> {
    fn new(writer: &'a mut W, renderer: &'a Renderer<'r>) -> Self {
        Self {
            writer,
            renderer,
            indent_level: 0,
        }
    }

    fn indent(&mut self) {
        self.indent_level += 1;
    }

    fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    fn write_indent(&mut self) -> fmt::Result {
        for _ in 0..self.indent_level {
            write!(self.writer, "{}", self.renderer.config.indent_str)?;
        }
        Ok(())
    }

    fn writeln(&mut self, s: &str) -> fmt::Result {
        self.write_indent()?;
        writeln!(self.writer, "{}", s)
    }

    fn write_class(&mut self, id: ContentId) -> fmt::Result {
        let renderer = self.renderer;
        let contents = renderer.stream.contents();
        let Some(cd) = contents.class_desc(id) else {
            return Ok(());
        };

        if !cd.annotations.is_empty() {
            self.writeln("// annotations: ")?;
            for annotation in &cd.annotations {
                let line = match annotation {
                    Some(a) => self.renderer.describe(*a),
                    None => "null".to_string(),
                };
                let line = format!("// {}{}", self.renderer.config.indent_str, line);
                self.writeln(&line)?;
            }
        }

        if cd.is_proxy() {
            return self.write_proxy(cd);
        }
        if cd.flags.is_enum() {
            return self.write_enum(cd);
        }

        let mut header = String::new();
        if cd.is_static_member_class {
            header.push_str("static ");
        }
        header.push_str("class ");
        header.push_str(&renderer.display_name(cd));
        if let Some(superclass) = cd.superclass.and_then(|s| contents.class_desc(s)) {
            header.push_str(" extends ");
            header.push_str(&renderer.display_name(superclass));
        }
        header.push_str(" implements ");
        header.push_str(serial_interface(cd));
        header.push_str(" {");
        self.writeln(&header)?;

        self.indent();
        for field in cd.fields.iter().filter(|f| !f.is_inner_class_reference) {
            let ty = contents
                .field_type_name(field)
                .unwrap_or_else(|_| field.ty.code().to_string());
            self.writeln(&format!("{} {};", ty, field.name))?;
        }
        for &inner in &cd.inner_classes {
            self.write_class(inner)?;
        }
        self.dedent();
        self.writeln("}")
    }

    fn write_enum(&mut self, cd: &ClassDesc) -> fmt::Result {
        self.writeln(&format!("enum {} {{", self.renderer.display_name(cd)))?;
        self.indent();

        let indent_width = self.renderer.config.indent_str.len() * self.indent_level;
        let mut line = String::new();
        for constant in &cd.enum_constants {
            if !line.is_empty()
                && indent_width + line.len() + constant.len() >= self.renderer.config.code_width
            {
                self.writeln(line.trim_end())?;
                line.clear();
            }
            line.push_str(constant);
            line.push_str(", ");
        }
        if !line.is_empty() {
            self.writeln(line.trim_end())?;
        }

        self.dedent();
        self.writeln("}")
    }

    fn write_proxy(&mut self, cd: &ClassDesc) -> fmt::Result {
        let contents = self.renderer.stream.contents();
        let mut header = format!("// proxy class {}", cd.handle);
        if let Some(superclass) = cd.superclass.and_then(|s| contents.class_desc(s)) {
            header.push_str(" extends ");
            header.push_str(&superclass.name);
        }
        header.push_str(" implements ");
        self.writeln(&header)?;
        for interface in &cd.interfaces {
            self.writeln(&format!("//    {},", interface))?;
        }
        self.writeln(&format!("//    {}", serial_interface(cd)))
    }
}

fn serial_interface(cd: &ClassDesc) -> &'static str {
    if cd.flags.is_externalizable() {
        "java.io.Externalizable"
    } else {
        "java.io.Serializable"
    }
}

/// Escapes a string for a double-quoted listing
pub fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            ' '..='~' => out.push(c),
            _ => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{:04x}", unit));
                }
            }
        }
    }
    out
}

/// Turns a (possibly qualified) class name into legal identifiers.
///
/// Each `.`-separated segment that is a reserved word or contains illegal
/// characters is rewritten, illegal characters become `x` and the segment
/// gets a `$__` prefix.
pub fn fix_class_name(name: &str) -> String {
    if name.is_empty() {
        return "$__zerolen".to_string();
    }
    name.split('.')
        .map(fix_identifier)
        .collect::<Vec<_>>()
        .join(".")
}

fn fix_identifier(segment: &str) -> String {
    if segment.is_empty() {
        return "$__zerolen".to_string();
    }
    if KEYWORDS.contains(&segment) {
        return format!("$__{}", segment);
    }

    let mut modified = false;
    let mut fixed = String::with_capacity(segment.len());
    for (i, c) in segment.chars().enumerate() {
        let legal = if i == 0 {
            is_identifier_start(c)
        } else {
            is_identifier_part(c)
        };
        if legal {
            fixed.push(c);
        } else {
            modified = true;
            // a digit may stay, it just cannot start the name
            if i == 0 && is_identifier_part(c) {
                fixed.push(c);
            } else {
                fixed.push('x');
            }
        }
    }
    if modified {
        format!("$__{}", fixed)
    } else {
        fixed
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '$' || c == '_'
}

fn is_identifier_part(c: char) -> bool {
    c.is_alphanumeric() || c == '$' || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{
        DecoderConfig, Deserializer, Opcode, BASE_WIRE_HANDLE, SC_ENUM, SC_SERIALIZABLE,
    };
    use crate::testutil::StreamBuilder;
    use pretty_assertions::assert_eq;

    fn decode(data: &[u8]) -> ObjectStream {
        ObjectStream::from_bytes(data).unwrap()
    }

    #[test]
    fn test_escape_string() {
        assert_eq!(escape_string("plain"), "plain");
        assert_eq!(escape_string("say \"hi\""), "say \\\"hi\\\"");
        assert_eq!(escape_string("tab\there"), "tab\\u0009here");
        assert_eq!(escape_string("é"), "\\u00e9");
        assert_eq!(escape_string("\u{1F600}"), "\\ud83d\\ude00");
    }

    #[test]
    fn test_fix_class_name() {
        assert_eq!(fix_class_name("java.lang.String"), "java.lang.String");
        assert_eq!(fix_class_name("class"), "$__class");
        assert_eq!(fix_class_name("my-type"), "$__myxtype");
        assert_eq!(fix_class_name("1st"), "$__1st");
        assert_eq!(fix_class_name(""), "$__zerolen");
        assert_eq!(fix_class_name("a.int.B"), "a.$__int.B");
    }

    #[test]
    fn test_content_listing() {
        let data = StreamBuilder::new()
            .string("say \"hi\"")
            .null()
            .object()
            .class("Foo", SC_SERIALIZABLE, &[])
            .block_data(&[1, 2])
            .build();
        let stream = decode(&data);
        let config = RenderConfig::default();
        let listing = Renderer::new(&stream, &config).content_listing();
        assert_eq!(
            listing,
            "[String 0x7e0000: \"say \\\"hi\\\"\"]\n\
             null\n\
             [instance 0x7e0002: 0x7e0001/Foo]\n\
             [blockdata: 2 bytes]\n"
        );
    }

    #[test]
    fn test_exception_state_listing() {
        let data = StreamBuilder::new()
            .op(Opcode::Exception)
            .object()
            .class("E", SC_SERIALIZABLE, &[])
            .build();
        let stream = decode(&data);
        let config = RenderConfig::default();
        let listing = Renderer::new(&stream, &config).content_listing();
        assert!(listing.starts_with(
            "[exceptionstate object [instance 0x7e0001: 0x7e0000/E]  buflen 19\n      0:  7b 73 72"
        ));
        assert!(listing.ends_with("\n]\n"));
    }

    #[test]
    fn test_class_declarations() {
        let data = StreamBuilder::new()
            .object()
            .class_desc(
                "com.example.Point",
                1,
                SC_SERIALIZABLE,
                &[('I', "x", None), ('L', "label", Some("Ljava/lang/String;"))],
            )
            .end_block()
            .class("com.example.Base", SC_SERIALIZABLE, &[])
            .i32(3)
            .null()
            .build();
        let stream = decode(&data);
        let config = RenderConfig::default();
        let decls = Renderer::new(&stream, &config).class_declarations();
        assert_eq!(
            decls,
            "class com.example.Point extends com.example.Base implements java.io.Serializable {\n    \
             int x;\n    \
             java.lang.String label;\n\
             }\n\
             \n\
             class com.example.Base implements java.io.Serializable {\n\
             }\n\
             \n"
        );
    }

    #[test]
    fn test_member_classes_nested() {
        let data = StreamBuilder::new()
            .class("Outer", SC_SERIALIZABLE, &[])
            .class(
                "Outer$Inner",
                SC_SERIALIZABLE,
                &[('L', "this$0", Some("LOuter;")), ('J', "id", None)],
            )
            .class("Outer$Nested", SC_SERIALIZABLE, &[])
            .build();
        let stream = decode(&data);
        let config = RenderConfig::default();
        let decls = Renderer::new(&stream, &config).class_declarations();
        assert_eq!(
            decls,
            "class Outer implements java.io.Serializable {\n    \
             class Inner implements java.io.Serializable {\n        \
             long id;\n    \
             }\n    \
             static class Nested implements java.io.Serializable {\n    \
             }\n\
             }\n\
             \n"
        );
    }

    #[test]
    fn test_enum_and_array_declarations() {
        let mut builder = StreamBuilder::new();
        builder
            .op(Opcode::Enum)
            .class("Color", SC_SERIALIZABLE | SC_ENUM, &[])
            .string("RED")
            .op(Opcode::Enum)
            .reference(BASE_WIRE_HANDLE)
            .string("GREEN")
            .op(Opcode::Array)
            .class("[I", SC_SERIALIZABLE, &[])
            .i32(0);
        let stream = decode(&builder.build());

        let config = RenderConfig::default();
        let decls = Renderer::new(&stream, &config).class_declarations();
        assert_eq!(decls, "enum Color {\n    RED, GREEN,\n}\n\n");

        let config = RenderConfig::default().show_arrays(true);
        let decls = Renderer::new(&stream, &config).class_declarations();
        assert!(decls.contains("class int[] implements java.io.Serializable {\n}\n"));
    }

    #[test]
    fn test_enum_wrapping() {
        let mut builder = StreamBuilder::new();
        builder
            .op(Opcode::Enum)
            .class("E", SC_SERIALIZABLE | SC_ENUM, &[])
            .string("AAAAAAAA");
        for name in ["BBBBBBBB", "CCCCCCCC"] {
            builder.op(Opcode::Enum).reference(BASE_WIRE_HANDLE).string(name);
        }
        let stream = decode(&builder.build());
        let config = RenderConfig::default().code_width(30);
        let decls = Renderer::new(&stream, &config).class_declarations();
        assert_eq!(
            decls,
            "enum E {\n    AAAAAAAA, BBBBBBBB,\n    CCCCCCCC,\n}\n\n"
        );
    }

    #[test]
    fn test_exclusion_filter() {
        let data = StreamBuilder::new()
            .class("java.util.Date", SC_SERIALIZABLE, &[])
            .class("app.Model", SC_SERIALIZABLE, &[])
            .build();
        let stream = decode(&data);
        let config = RenderConfig::default().exclude(Some(Regex::new("^java\\.").unwrap()));
        let renderer = Renderer::new(&stream, &config);
        assert_eq!(
            renderer.class_declarations(),
            "class app.Model implements java.io.Serializable {\n}\n\n"
        );
        assert_eq!(
            renderer.class_declarations_title(),
            "class declarations (excluding array classes) (exclusion filter ^java\\.)"
        );
    }

    #[test]
    fn test_fix_names_in_declarations() {
        let data = StreamBuilder::new().class("bad-name", SC_SERIALIZABLE, &[]).build();
        let stream = decode(&data);
        let config = RenderConfig::default().fix_names(true);
        assert_eq!(
            Renderer::new(&stream, &config).class_declarations(),
            "class $__badxname implements java.io.Serializable {\n}\n\n"
        );
    }

    #[test]
    fn test_instance_dump() {
        // cd 0, descriptors 1 and 2, instance 3, string 4
        let data = StreamBuilder::new()
            .object()
            .class(
                "Node",
                SC_SERIALIZABLE,
                &[
                    ('I', "v", None),
                    ('L', "self", Some("LNode;")),
                    ('L', "name", Some("Ljava/lang/String;")),
                ],
            )
            .i32(7)
            .reference(BASE_WIRE_HANDLE + 3)
            .string("n")
            .build();
        let stream = decode(&data);
        let config = RenderConfig::default();
        assert_eq!(
            Renderer::new(&stream, &config).instance_dump(),
            "[instance 0x7e0003: 0x7e0000/Node\n  \
             field data:\n    \
             0x7e0000/Node:\n        \
             v: 7\n        \
             self: this: [instance 0x7e0003: 0x7e0000/Node]\n        \
             name: r0x7e0004: [String 0x7e0004: \"n\"]\n\
             ]\n"
        );
    }

    #[test]
    fn test_proxy_declaration() {
        let data = StreamBuilder::new()
            .op(Opcode::ProxyClassDesc)
            .i32(1)
            .utf("java.lang.Runnable")
            .end_block()
            .null()
            .build();
        let config = DecoderConfig::new();
        let stream = Deserializer::with_config(data.as_slice(), config).run().unwrap();
        let render = RenderConfig::default();
        assert_eq!(
            Renderer::new(&stream, &render).class_declarations(),
            "// proxy class 0x7e0000 implements \n\
             //    java.lang.Runnable,\n\
             //    java.io.Serializable\n\
             \n"
        );
    }
}
