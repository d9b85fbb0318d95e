//! Member-class reconnection.
//!
//! The wire format has no "nested in" marker, so nesting is inferred after
//! decoding:
//!
//! - a class with an object field named `this$N` is an inner class of the
//!   class named by everything before its last `$`
//! - any other `Outer$Simple` class whose outer class was also decoded is a
//!   static member class
//!
//! Connected classes are renamed to their simple name, and every object
//! field typed with the old name is rewritten to match.

use crate::error::{Error, Result};
use crate::model::{ContentId, Contents, FieldType};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Splits `Outer$...$Simple` into the outer name and the simple name
pub fn split_member_name(name: &str) -> Option<(&str, &str)> {
    let (outer, simple) = name.rsplit_once('$')?;
    if simple.is_empty() || outer.split('$').any(str::is_empty) {
        return None;
    }
    Some((outer, simple))
}

/// True for synthetic enclosing-instance fields (`this$0`, `this$12`)
pub fn is_outer_instance_field(name: &str) -> bool {
    name.strip_prefix("this$")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Connects member classes to their outer classes and renames them.
///
/// Running this again on an already connected model changes nothing.
pub fn connect_member_classes(contents: &mut Contents) -> Result<()> {
    let classes: Vec<ContentId> = contents
        .class_descs()
        .filter(|(_, cd)| !cd.is_proxy())
        .map(|(id, _)| id)
        .collect();

    let mut by_name: HashMap<String, Vec<ContentId>> = HashMap::new();
    for &id in &classes {
        by_name
            .entry(contents.class_name(id).to_string())
            .or_default()
            .push(id);
    }

    let mut renames: BTreeMap<ContentId, String> = BTreeMap::new();
    connect_inner_classes(contents, &classes, &by_name, &mut renames)?;
    connect_static_member_classes(contents, &classes, &by_name, &mut renames);

    let mut names: HashSet<String> = by_name.into_keys().collect();
    for (id, target) in renames {
        rename_class(contents, &classes, &mut names, id, &target)?;
    }
    Ok(())
}

fn connect_inner_classes(
    contents: &mut Contents,
    classes: &[ContentId],
    by_name: &HashMap<String, Vec<ContentId>>,
    renames: &mut BTreeMap<ContentId, String>,
) -> Result<()> {
    for &id in classes {
        let Some(cd) = contents.class_desc(id) else {
            continue;
        };
        if cd.is_inner_class {
            continue;
        }
        let name = cd.name.clone();
        let candidates: Vec<usize> = cd
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.ty == FieldType::Object && is_outer_instance_field(&f.name))
            .map(|(i, _)| i)
            .collect();

        for index in candidates {
            let Some(field) = contents.class_desc(id).map(|cd| cd.fields[index].clone()) else {
                continue;
            };

            let (outer, simple) =
                split_member_name(&name).ok_or_else(|| Error::MalformedNaming {
                    class: name.clone(),
                    field: field.name.clone(),
                })?;
            let outers = by_name
                .get(outer)
                .ok_or_else(|| Error::UnresolvedOuterClass {
                    class: name.clone(),
                    outer: outer.to_string(),
                })?;
            let field_type = contents.field_type_name(&field)?;
            if field_type != outer {
                return Err(Error::type_mismatch(format!(
                    "field {}.{} has type {}, expected outer class {}",
                    name, field.name, field_type, outer
                )));
            }

            debug!("{} is an inner class of {}", name, outer);
            for &outer_id in outers {
                attach(contents, outer_id, id);
            }
            if let Some(cd) = contents.class_desc_mut(id) {
                cd.is_inner_class = true;
                cd.is_local_inner_class = false;
                cd.fields[index].is_inner_class_reference = true;
            }
            renames.insert(id, simple.to_string());
        }
    }
    Ok(())
}

fn connect_static_member_classes(
    contents: &mut Contents,
    classes: &[ContentId],
    by_name: &HashMap<String, Vec<ContentId>>,
    renames: &mut BTreeMap<ContentId, String>,
) {
    for &id in classes {
        let Some(cd) = contents.class_desc(id) else {
            continue;
        };
        if cd.is_inner_class || cd.is_static_member_class {
            continue;
        }
        let name = cd.name.clone();
        let Some((outer, simple)) = split_member_name(&name) else {
            continue;
        };
        let Some(outers) = by_name.get(outer) else {
            continue;
        };

        debug!("{} is a static member class of {}", name, outer);
        for &outer_id in outers {
            attach(contents, outer_id, id);
        }
        if let Some(cd) = contents.class_desc_mut(id) {
            cd.is_static_member_class = true;
        }
        renames.insert(id, simple.to_string());
    }
}

/// Records `inner` as a member of `outer`, once per class name
fn attach(contents: &mut Contents, outer: ContentId, inner: ContentId) {
    let inner_name = contents.class_name(inner).to_string();
    let already = contents.class_desc(outer).is_some_and(|cd| {
        cd.inner_classes
            .iter()
            .any(|&i| contents.class_name(i) == inner_name)
    });
    if already {
        return;
    }
    if let Some(cd) = contents.class_desc_mut(outer) {
        cd.inner_classes.push(inner);
    }
}

fn rename_class(
    contents: &mut Contents,
    classes: &[ContentId],
    names: &mut HashSet<String>,
    id: ContentId,
    target: &str,
) -> Result<()> {
    let old = contents.class_name(id).to_string();
    if old == target {
        // renamed together with a same-named class from another generation
        return Ok(());
    }
    if names.contains(target) {
        return Err(Error::NameCollision {
            from: old,
            to: target.to_string(),
        });
    }

    let mut descriptors = Vec::new();
    for &cid in classes {
        let Some(cd) = contents.class_desc(cid) else {
            continue;
        };
        for field in cd.fields.iter().filter(|f| f.ty == FieldType::Object) {
            let Some(sid) = field.class_name else { continue };
            if descriptors.contains(&sid) {
                continue;
            }
            if contents.field_type_name(field).is_ok_and(|t| t == old) {
                descriptors.push(sid);
            }
        }
    }
    let descriptor = format!("L{};", target.replace('.', "/"));
    for sid in descriptors {
        if let Some(s) = contents.string_mut(sid) {
            s.value = descriptor.clone();
        }
    }

    for &cid in classes {
        if let Some(cd) = contents.class_desc_mut(cid) {
            if cd.name == old {
                cd.name = target.to_string();
            }
        }
    }
    debug!("renamed class {} to {}", old, target);

    names.remove(&old);
    names.insert(target.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Content;
    use crate::stream::{DecoderConfig, Deserializer, ObjectStream, SC_SERIALIZABLE};
    use crate::testutil::StreamBuilder;

    fn decode_unconnected(data: &[u8]) -> ObjectStream {
        let config = DecoderConfig::new().connect_member_classes(false);
        Deserializer::with_config(data, config).run().unwrap()
    }

    fn class_named<'a>(stream: &'a ObjectStream, name: &str) -> &'a crate::model::ClassDesc {
        stream
            .class_descs()
            .map(|(_, cd)| cd)
            .find(|cd| cd.name == name)
            .unwrap()
    }

    fn inner_class_stream() -> Vec<u8> {
        StreamBuilder::new()
            .class("Outer", SC_SERIALIZABLE, &[])
            .class(
                "Outer$Inner",
                SC_SERIALIZABLE,
                &[('L', "this$0", Some("LOuter;")), ('I', "x", None)],
            )
            .class(
                "User",
                SC_SERIALIZABLE,
                &[('L', "inner", Some("LOuter$Inner;"))],
            )
            .build()
    }

    #[test]
    fn test_split_member_name() {
        assert_eq!(split_member_name("a.b.Outer$Inner"), Some(("a.b.Outer", "Inner")));
        assert_eq!(split_member_name("A$B$C"), Some(("A$B", "C")));
        assert_eq!(split_member_name("Plain"), None);
        assert_eq!(split_member_name("Trailing$"), None);
        assert_eq!(split_member_name("$Leading"), None);
        assert_eq!(split_member_name("A$$B"), None);
    }

    #[test]
    fn test_outer_instance_field() {
        assert!(is_outer_instance_field("this$0"));
        assert!(is_outer_instance_field("this$12"));
        assert!(!is_outer_instance_field("this$"));
        assert!(!is_outer_instance_field("this$x"));
        assert!(!is_outer_instance_field("that$0"));
    }

    #[test]
    fn test_inner_class_connected_and_renamed() {
        let mut stream = decode_unconnected(&inner_class_stream());
        stream.connect_member_classes().unwrap();
        stream.validate().unwrap();

        let inner = class_named(&stream, "Inner");
        assert!(inner.is_inner_class);
        assert!(!inner.is_static_member_class);
        assert!(inner.fields[0].is_inner_class_reference);
        assert!(!inner.fields[1].is_inner_class_reference);

        let outer = class_named(&stream, "Outer");
        assert_eq!(outer.inner_classes.len(), 1);
        assert_eq!(stream.contents().class_name(outer.inner_classes[0]), "Inner");

        let user = class_named(&stream, "User");
        assert_eq!(
            stream.contents().field_type_name(&user.fields[0]).unwrap(),
            "Inner"
        );
    }

    #[test]
    fn test_connect_is_idempotent() {
        let mut stream = decode_unconnected(&inner_class_stream());
        stream.connect_member_classes().unwrap();
        let first: Vec<_> = stream.class_descs().map(|(_, cd)| cd.clone()).collect();
        stream.connect_member_classes().unwrap();
        let second: Vec<_> = stream.class_descs().map(|(_, cd)| cd.clone()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_connected_by_default() {
        let stream = ObjectStream::from_bytes(&inner_class_stream()).unwrap();
        assert!(class_named(&stream, "Inner").is_inner_class);
    }

    #[test]
    fn test_static_member_class() {
        let data = StreamBuilder::new()
            .class("pkg.Outer", SC_SERIALIZABLE, &[])
            .class("pkg.Outer$Nested", SC_SERIALIZABLE, &[])
            .class("pkg.Lonely$Nested2", SC_SERIALIZABLE, &[])
            .build();
        let mut stream = decode_unconnected(&data);
        stream.connect_member_classes().unwrap();

        let nested = class_named(&stream, "Nested");
        assert!(nested.is_static_member_class);
        assert!(!nested.is_inner_class);
        assert_eq!(class_named(&stream, "pkg.Outer").inner_classes.len(), 1);

        // no outer class in the stream: left alone
        let lonely = class_named(&stream, "pkg.Lonely$Nested2");
        assert!(!lonely.is_static_member_class);
    }

    #[test]
    fn test_missing_outer_class() {
        let data = StreamBuilder::new()
            .class("Gone$Inner", SC_SERIALIZABLE, &[('L', "this$0", Some("LGone;"))])
            .build();
        let mut stream = decode_unconnected(&data);
        let err = stream.connect_member_classes().unwrap_err();
        assert!(matches!(err, Error::UnresolvedOuterClass { ref outer, .. } if outer == "Gone"));
    }

    #[test]
    fn test_malformed_naming() {
        let data = StreamBuilder::new()
            .class("Plain", SC_SERIALIZABLE, &[('L', "this$0", Some("LPlain;"))])
            .build();
        let mut stream = decode_unconnected(&data);
        assert!(matches!(
            stream.connect_member_classes().unwrap_err(),
            Error::MalformedNaming { .. }
        ));
    }

    #[test]
    fn test_outer_field_type_mismatch() {
        let data = StreamBuilder::new()
            .class("Outer", SC_SERIALIZABLE, &[])
            .class(
                "Outer$Inner",
                SC_SERIALIZABLE,
                &[('L', "this$0", Some("Ljava/lang/Object;"))],
            )
            .build();
        let mut stream = decode_unconnected(&data);
        assert!(matches!(
            stream.connect_member_classes().unwrap_err(),
            Error::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_name_collision() {
        let data = StreamBuilder::new()
            .class("Outer", SC_SERIALIZABLE, &[])
            .class("Outer$Thing", SC_SERIALIZABLE, &[])
            .class("Thing", SC_SERIALIZABLE, &[])
            .build();
        let mut stream = decode_unconnected(&data);
        assert!(matches!(
            stream.connect_member_classes().unwrap_err(),
            Error::NameCollision { ref to, .. } if to == "Thing"
        ));
    }

    #[test]
    fn test_nested_inner_classes() {
        let data = StreamBuilder::new()
            .class("A", SC_SERIALIZABLE, &[])
            .class("A$B", SC_SERIALIZABLE, &[('L', "this$0", Some("LA;"))])
            .class("A$B$C", SC_SERIALIZABLE, &[('L', "this$1", Some("LA$B;"))])
            .build();
        let mut stream = decode_unconnected(&data);
        stream.connect_member_classes().unwrap();

        let c = class_named(&stream, "C");
        assert!(c.is_inner_class);
        assert_eq!(stream.contents().field_type_name(&c.fields[0]).unwrap(), "B");
        assert!(class_named(&stream, "B").is_inner_class);
    }

    #[test]
    fn test_same_class_across_generations() {
        let data = StreamBuilder::new()
            .class("Outer", SC_SERIALIZABLE, &[])
            .class("Outer$Nested", SC_SERIALIZABLE, &[])
            .reset()
            .class("Outer$Nested", SC_SERIALIZABLE, &[])
            .build();
        let mut stream = decode_unconnected(&data);
        stream.connect_member_classes().unwrap();

        let renamed = stream
            .class_descs()
            .filter(|(_, cd)| cd.name == "Nested")
            .count();
        assert_eq!(renamed, 2);
        assert_eq!(class_named(&stream, "Outer").inner_classes.len(), 1);
        assert!(stream
            .contents()
            .iter()
            .all(|(_, c)| !matches!(c, Content::ClassDesc(cd) if cd.name.contains('$'))));
    }
}
