//! Stream encoder.

use std::cell::RefCell;
use std::io;
use std::io::Write;
use std::rc::Rc;

use byteorder::{BigEndian, WriteBytesExt};

use crate::block::BlockWriter;
use crate::error::{Error, Result};
use crate::handles::EncodeHandles;
use crate::registry::ClassSpec;
use crate::traits::DataOutput;
use crate::value::{JavaArray, JavaString, Object, Value};
use crate::{TypeCode, SC_SERIALIZABLE, STREAM_MAGIC, STREAM_VERSION};

/// Stream encoder.
///
/// Writes the stream magic and version eagerly on construction, then encodes
/// one value graph per [`write_object`](Encoder::write_object) call. A failed
/// call leaves the sink in an undefined state; discard the encoder.
pub struct Encoder<W> {
    w: BlockWriter<W>,
    handles: EncodeHandles,
}

impl<W: io::Write> Encoder<W> {
    /// Create an encoder over a writer and emit the stream header.
    pub fn new(writer: W) -> Result<Self> {
        let mut encoder = Encoder {
            w: BlockWriter::new(writer),
            handles: EncodeHandles::new(),
        };
        encoder.w.write_u16::<BigEndian>(STREAM_MAGIC)?;
        encoder.w.write_i16::<BigEndian>(STREAM_VERSION)?;
        Ok(encoder)
    }

    /// Encode a value as the next record of the stream.
    pub fn write_object(&mut self, value: &Value) -> Result<()> {
        self.write_value(value)
    }

    fn write_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => Ok(self.w.write_u8(TypeCode::Null as u8)?),
            Value::Boolean(v) => Ok(self.w.write_u8(*v as u8)?),
            Value::Byte(v) => Ok(self.w.write_u8(*v)?),
            Value::Short(v) => Ok(self.w.write_i16::<BigEndian>(*v)?),
            Value::Int(v) => Ok(self.w.write_i32::<BigEndian>(*v)?),
            Value::Long(v) => Ok(self.w.write_i64::<BigEndian>(*v)?),
            Value::Float(v) => Ok(self.w.write_f32::<BigEndian>(*v)?),
            Value::Double(v) => Ok(self.w.write_f64::<BigEndian>(*v)?),
            Value::String(_) | Value::Object(_) | Value::Array(_) => {
                // Structured records are never block-framed; suspend the
                // framing for the duration and restore it after, so nested
                // writes from inside a custom write method line up.
                let was_on = self.w.mode();
                self.w.finish_block()?;
                let result = match value {
                    Value::String(s) => self.write_string(s),
                    Value::Object(o) => self.write_object_or_reference(o),
                    Value::Array(a) => self.write_array_or_reference(a),
                    _ => unreachable!(),
                };
                if was_on && !self.w.mode() {
                    self.w.set_mode_on()?;
                }
                result
            }
        }
    }

    fn write_reference(&mut self, handle: i32) -> Result<()> {
        self.w.write_u8(TypeCode::Reference as u8)?;
        Ok(self.w.write_i32::<BigEndian>(handle)?)
    }

    fn write_utf(&mut self, bytes: &[u8]) -> Result<()> {
        self.w.write_u16::<BigEndian>(u16::try_from(bytes.len())?)?;
        Ok(self.w.write_all(bytes)?)
    }

    fn write_long_utf(&mut self, bytes: &[u8]) -> Result<()> {
        self.w.write_u64::<BigEndian>(bytes.len() as u64)?;
        Ok(self.w.write_all(bytes)?)
    }

    /// Write a string record, or a back-reference if this exact string has
    /// been written before.
    fn write_string(&mut self, s: &Rc<JavaString>) -> Result<()> {
        if let Some(handle) = self.handles.find(&Value::String(Rc::clone(s))) {
            return self.write_reference(handle);
        }
        if s.len() <= 0xFFFF {
            self.w.write_u8(TypeCode::String as u8)?;
            self.handles.assign(Value::String(Rc::clone(s)));
            self.write_utf(s.as_bytes())
        } else {
            self.w.write_u8(TypeCode::LongString as u8)?;
            self.handles.assign(Value::String(Rc::clone(s)));
            self.write_long_utf(s.as_bytes())
        }
    }

    fn write_object_or_reference(&mut self, cell: &Rc<RefCell<Object>>) -> Result<()> {
        if let Some(handle) = self.handles.find(&Value::Object(Rc::clone(cell))) {
            return self.write_reference(handle);
        }
        self.w.write_u8(TypeCode::Object as u8)?;
        let object = cell.borrow();
        self.write_class_desc(Some(object.class()))?;
        self.handles.assign(Value::Object(Rc::clone(cell)));
        self.write_class_data(&object)
    }

    /// Write a class descriptor, a back-reference to an already-written one,
    /// or `TC_NULL` at the top of a super chain.
    fn write_class_desc(&mut self, spec: Option<&Rc<ClassSpec>>) -> Result<()> {
        let Some(spec) = spec else {
            return Ok(self.w.write_u8(TypeCode::Null as u8)?);
        };
        if let Some(handle) = self.handles.find_class(spec.class_name()) {
            return self.write_reference(handle);
        }
        self.w.write_u8(TypeCode::ClassDesc as u8)?;
        self.write_utf(spec.class_name().as_bytes())?;
        self.w.write_i64::<BigEndian>(spec.serial_version_uid())?;
        self.handles.assign_class(spec.class_name());
        self.write_class_desc_info(spec)
    }

    fn write_class_desc_info(&mut self, spec: &ClassSpec) -> Result<()> {
        self.w.write_u8(spec.flags())?;

        let fields = spec.wire_fields();
        self.w.write_i16::<BigEndian>(i16::try_from(fields.len())?)?;
        for (field, wire_name) in fields {
            self.w.write_u8(field.ty().type_code())?;
            self.write_utf(wire_name.as_bytes())?;
            if field.ty().is_reference() {
                let descriptor = self.handles.intern(field.ty().descriptor());
                self.write_string(&descriptor)?;
            }
        }

        // Class annotation: nothing is emitted beyond the end marker.
        self.w.write_u8(TypeCode::EndBlockData as u8)?;
        self.write_class_desc(spec.super_spec())
    }

    /// Write the field data of an object, super classes first. A level with a
    /// custom write method has its output block-framed and terminated with
    /// `TC_ENDBLOCKDATA`; any other level emits its fields in the order the
    /// class descriptor advertised them.
    fn write_class_data(&mut self, object: &Object) -> Result<()> {
        if let Some(parent) = object.super_object() {
            self.write_class_data(&parent.borrow())?;
        }
        if let Some(write_object) = object.class().write_object_fn().cloned() {
            self.w.set_mode_on()?;
            write_object(object, self)?;
            self.w.finish_block()?;
            return Ok(self.w.write_u8(TypeCode::EndBlockData as u8)?);
        }
        for (field, wire_name) in object.class().wire_fields() {
            let value = object
                .get(field.name())
                .ok_or_else(|| Error::TypeMismatch {
                    field: wire_name.clone(),
                })?;
            if !field.ty().matches(value) {
                return Err(Error::TypeMismatch { field: wire_name });
            }
            self.write_value(value)?;
        }
        Ok(())
    }

    fn write_array_or_reference(&mut self, cell: &Rc<RefCell<JavaArray>>) -> Result<()> {
        if let Some(handle) = self.handles.find(&Value::Array(Rc::clone(cell))) {
            return self.write_reference(handle);
        }
        self.w.write_u8(TypeCode::Array as u8)?;
        let array = cell.borrow();
        self.write_array_class_desc(&array)?;
        self.handles.assign(Value::Array(Rc::clone(cell)));
        self.w.write_i32::<BigEndian>(i32::try_from(array.len())?)?;
        for element in array.elements() {
            if !array.element_type().matches(element) {
                return Err(Error::TypeMismatch {
                    field: array.class_name(),
                });
            }
            self.write_value(element)?;
        }
        Ok(())
    }

    /// Write the synthetic class descriptor of an array class: its descriptor
    /// name, derived serialVersionUID, no fields and no super class.
    fn write_array_class_desc(&mut self, array: &JavaArray) -> Result<()> {
        let class_name = array.class_name();
        if let Some(handle) = self.handles.find_class(&class_name) {
            return self.write_reference(handle);
        }
        self.w.write_u8(TypeCode::ClassDesc as u8)?;
        self.write_utf(class_name.as_bytes())?;
        self.w.write_i64::<BigEndian>(array.serial_version_uid())?;
        self.handles.assign_class(&class_name);
        self.w.write_u8(SC_SERIALIZABLE)?;
        self.w.write_i16::<BigEndian>(0)?;
        self.w.write_u8(TypeCode::EndBlockData as u8)?;
        Ok(self.w.write_u8(TypeCode::Null as u8)?)
    }
}

impl<W: io::Write> DataOutput for Encoder<W> {
    fn write_boolean(&mut self, v: bool) -> Result<()> {
        Ok(self.w.write_u8(v as u8)?)
    }

    fn write_byte(&mut self, v: u8) -> Result<()> {
        Ok(self.w.write_u8(v)?)
    }

    fn write_short(&mut self, v: i16) -> Result<()> {
        Ok(self.w.write_i16::<BigEndian>(v)?)
    }

    fn write_int(&mut self, v: i32) -> Result<()> {
        Ok(self.w.write_i32::<BigEndian>(v)?)
    }

    fn write_long(&mut self, v: i64) -> Result<()> {
        Ok(self.w.write_i64::<BigEndian>(v)?)
    }

    fn write_float(&mut self, v: f32) -> Result<()> {
        Ok(self.w.write_f32::<BigEndian>(v)?)
    }

    fn write_double(&mut self, v: f64) -> Result<()> {
        Ok(self.w.write_f64::<BigEndian>(v)?)
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        Ok(self.w.write_all(buf)?)
    }

    fn write_utf(&mut self, s: &str) -> Result<()> {
        Encoder::write_utf(self, s.as_bytes())
    }

    fn write_object(&mut self, value: &Value) -> Result<()> {
        self.write_value(value)
    }
}
