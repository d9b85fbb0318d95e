//! Per-class field data of a new object.

use super::{value, Deserializer, Flow};
use crate::error::{Error, Result};
use crate::model::{ClassData, ContentId, FieldType};
use std::io::Read;
use tracing::trace;

impl<R: Read> Deserializer<R> {
    /// Reads the data of every class in the hierarchy of `class_desc`,
    /// topmost superclass first.
    pub(crate) fn read_class_data(
        &mut self,
        class_desc: ContentId,
    ) -> Result<Flow<Vec<ClassData>>> {
        let chain = self.contents.hierarchy(class_desc);
        let mut all = Vec::with_capacity(chain.len());

        for id in chain {
            let Some(cd) = self.contents.class_desc(id) else {
                continue;
            };
            let flags = cd.flags;
            let name = cd.name.clone();
            let fields: Vec<(String, FieldType)> =
                cd.fields.iter().map(|f| (f.name.clone(), f.ty)).collect();

            if flags.is_serializable() && flags.is_externalizable() {
                return Err(Error::ConflictingFlags {
                    class: name,
                    flags: flags.bits(),
                });
            }

            if flags.is_serializable() {
                trace!("reading {} field values of {}", fields.len(), name);
                let mut values = Vec::with_capacity(fields.len());
                for (field, ty) in fields {
                    let v = value!(self.read_field_value(ty)?);
                    values.push((field, v));
                }
                let annotations = if flags.has_write_method() {
                    if flags.is_enum() {
                        return Err(Error::ConflictingFlags {
                            class: name,
                            flags: flags.bits(),
                        });
                    }
                    value!(self.read_annotations()?)
                } else {
                    Vec::new()
                };
                all.push(ClassData {
                    class_desc: id,
                    values,
                    annotations,
                });
            } else if flags.is_externalizable() {
                if flags.has_block_data() {
                    return Err(Error::UnsupportedExternalization { class: name });
                }
                trace!("reading externalized contents of {}", name);
                let annotations = value!(self.read_annotations()?);
                all.push(ClassData {
                    class_desc: id,
                    values: Vec::new(),
                    annotations,
                });
            }
        }
        Ok(Flow::Value(all))
    }
}
