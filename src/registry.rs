//! Class metadata supplied by the caller.
//!
//! A [`ClassSpec`] plays the role reflection plays in a JVM: it tells the
//! codec a type's Java class name, serialVersionUID, serializable fields,
//! super class, and optional custom read/write methods. The decoder looks
//! specs up in a [`Registry`] keyed by class name.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::descriptor::FieldType;
use crate::error::Result;
use crate::traits::{DataInput, DataOutput};
use crate::value::Object;
use crate::{SC_SERIALIZABLE, SC_WRITE_METHOD};

/// A custom write method, invoked inside block-data framing in place of the
/// default field-by-field encoding.
pub type WriteObjectFn = Rc<dyn Fn(&Object, &mut dyn DataOutput) -> Result<()>>;

/// A custom read method, the decode dual of [`WriteObjectFn`].
pub type ReadObjectFn = Rc<dyn Fn(&mut Object, &mut dyn DataInput) -> Result<()>>;

/// Serialization metadata for one level of a class hierarchy.
pub struct ClassSpec {
    class_name: String,
    serial_version_uid: i64,
    fields: Vec<FieldSpec>,
    super_spec: Option<Rc<ClassSpec>>,
    write_object: Option<WriteObjectFn>,
    read_object: Option<ReadObjectFn>,
}

impl ClassSpec {
    /// A spec with the given dotted Java class name and serialVersionUID,
    /// no fields and no super class.
    pub fn new(class_name: impl Into<String>, serial_version_uid: i64) -> ClassSpec {
        ClassSpec {
            class_name: class_name.into(),
            serial_version_uid,
            fields: Vec::new(),
            super_spec: None,
            write_object: None,
            read_object: None,
        }
    }

    /// Declare a field. Its wire name is the host name with the first
    /// character lowercased.
    pub fn field(self, name: impl Into<String>, ty: FieldType) -> ClassSpec {
        let mut spec = self;
        spec.fields.push(FieldSpec {
            name: name.into(),
            ty,
            tag: None,
        });
        spec
    }

    /// Declare a field with an explicit tag. The tag overrides wire-name
    /// derivation; a tag of `"-"` excludes the field from the wire entirely.
    pub fn field_as(self, name: impl Into<String>, ty: FieldType, tag: impl Into<String>) -> ClassSpec {
        let mut spec = self;
        spec.fields.push(FieldSpec {
            name: name.into(),
            ty,
            tag: Some(tag.into()),
        });
        spec
    }

    /// Declare the super class.
    pub fn extends(self, super_spec: Rc<ClassSpec>) -> ClassSpec {
        let mut spec = self;
        spec.super_spec = Some(super_spec);
        spec
    }

    /// Attach a custom write method. Its presence sets `SC_WRITE_METHOD` in
    /// the class-descriptor flags.
    pub fn with_write_object(
        self,
        f: impl Fn(&Object, &mut dyn DataOutput) -> Result<()> + 'static,
    ) -> ClassSpec {
        let mut spec = self;
        spec.write_object = Some(Rc::new(f));
        spec
    }

    /// Attach a custom read method, invoked when decoding instances of this
    /// class.
    pub fn with_read_object(
        self,
        f: impl Fn(&mut Object, &mut dyn DataInput) -> Result<()> + 'static,
    ) -> ClassSpec {
        let mut spec = self;
        spec.read_object = Some(Rc::new(f));
        spec
    }

    /// The dotted Java class name.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// The serialVersionUID.
    pub fn serial_version_uid(&self) -> i64 {
        self.serial_version_uid
    }

    /// The declared fields, in declaration order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// The super-class spec, if any.
    pub fn super_spec(&self) -> Option<&Rc<ClassSpec>> {
        self.super_spec.as_ref()
    }

    pub(crate) fn write_object_fn(&self) -> Option<&WriteObjectFn> {
        self.write_object.as_ref()
    }

    pub(crate) fn read_object_fn(&self) -> Option<&ReadObjectFn> {
        self.read_object.as_ref()
    }

    pub(crate) fn flags(&self) -> u8 {
        let mut flags = SC_SERIALIZABLE;
        if self.write_object.is_some() {
            flags |= SC_WRITE_METHOD;
        }
        flags
    }

    /// The fields that go on the wire, paired with their wire names, in
    /// serialization order: primitive fields first, then reference fields,
    /// each group ascending by wire name.
    pub(crate) fn wire_fields(&self) -> Vec<(&FieldSpec, String)> {
        let mut fields: Vec<(&FieldSpec, String)> = self
            .fields
            .iter()
            .filter_map(|field| field.wire_name().map(|name| (field, name)))
            .collect();
        fields.sort_by(|(a, a_name), (b, b_name)| {
            a.ty
                .is_reference()
                .cmp(&b.ty.is_reference())
                .then_with(|| a_name.cmp(b_name))
        });
        fields
    }

    /// The declared field whose wire name matches, if any.
    pub(crate) fn wire_field_named(&self, wire_name: &[u8]) -> Option<&FieldSpec> {
        self.fields
            .iter()
            .find(|field| field.wire_name().is_some_and(|name| name.as_bytes() == wire_name))
    }
}

impl fmt::Debug for ClassSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassSpec")
            .field("class_name", &self.class_name)
            .field("serial_version_uid", &self.serial_version_uid)
            .field("fields", &self.fields)
            .field("super_spec", &self.super_spec)
            .field("write_object", &self.write_object.is_some())
            .field("read_object", &self.read_object.is_some())
            .finish()
    }
}

/// One declared field of a [`ClassSpec`].
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub(crate) name: String,
    pub(crate) ty: FieldType,
    pub(crate) tag: Option<String>,
}

impl FieldSpec {
    /// The host field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The host field type.
    pub fn ty(&self) -> &FieldType {
        &self.ty
    }

    /// The Java field name this field travels under, or `None` if the field
    /// is excluded from the wire.
    pub(crate) fn wire_name(&self) -> Option<String> {
        match self.tag.as_deref() {
            Some("-") => None,
            Some(tag) => Some(tag.to_string()),
            None => Some(lower_first(&self.name)),
        }
    }
}

/// Lowercase the first character of a host field name.
fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lookup table from Java class names to class specs.
///
/// Keyed by raw name bytes, so lookups work for any class name a stream can
/// carry.
#[derive(Debug, Default)]
pub struct Registry {
    types: HashMap<Vec<u8>, Rc<ClassSpec>>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Register a spec under a class name.
    pub fn register(&mut self, class_name: &str, spec: Rc<ClassSpec>) {
        self.types.insert(class_name.as_bytes().to_vec(), spec);
    }

    pub(crate) fn lookup(&self, class_name: &[u8]) -> Option<&Rc<ClassSpec>> {
        self.types.get(class_name)
    }
}
