//! Stream decoder.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use num_traits::FromPrimitive;

use crate::block::BlockReader;
use crate::descriptor::{ClassDesc, FieldDesc, FieldType};
use crate::error::{Error, Result};
use crate::handles::{DecodeHandles, HandleEntry};
use crate::registry::Registry;
use crate::traits::DataInput;
use crate::value::{JavaArray, JavaString, Object, Value};
use crate::{ClassSpec, TypeCode, SC_ENUM, SC_EXTERNALIZABLE, SC_WRITE_METHOD, STREAM_MAGIC, STREAM_VERSION};

/// Stream decoder.
///
/// Reads and verifies the stream header on construction, then decodes one
/// value graph per [`read_object`](Decoder::read_object) call. Class names
/// found on the wire are resolved through the registry; an unregistered
/// class fails the read. A failed call leaves the stream position undefined;
/// discard the decoder.
#[derive(Debug)]
pub struct Decoder<R> {
    r: BlockReader<R>,
    handles: DecodeHandles,
    registry: Registry,
}

impl<R: io::Read> Decoder<R> {
    /// Create a decoder over a reader and verify the stream header.
    pub fn new(reader: R) -> Result<Self> {
        Self::with_registry(reader, Registry::new())
    }

    /// Create a decoder with a pre-populated type registry.
    pub fn with_registry(reader: R, registry: Registry) -> Result<Self> {
        let mut decoder = Decoder {
            r: BlockReader::new(reader),
            handles: DecodeHandles::new(),
            registry,
        };
        decoder.read_header()?;
        decoder.r.set_mode(true);
        Ok(decoder)
    }

    /// Register a class spec under a Java class name.
    pub fn register_type(&mut self, class_name: &str, spec: Rc<ClassSpec>) {
        self.registry.register(class_name, spec);
    }

    fn read_header(&mut self) -> Result<()> {
        let magic = self.read_u16()?;
        let version = self.read_i16()?;
        if magic != STREAM_MAGIC || version != STREAM_VERSION {
            return Err(Error::BadHeader { magic, version });
        }
        Ok(())
    }

    /// Decode the next record of the stream.
    pub fn read_object(&mut self) -> Result<Value> {
        let saved = self.r.mode();
        self.r.set_mode(false);
        let value = self.read_value();
        self.r.set_mode(saved);
        value
    }

    fn read_value(&mut self) -> Result<Value> {
        let code = self.read_type_code()?;
        match code {
            TypeCode::Null => Ok(Value::Null),
            TypeCode::Reference => {
                let (wire_handle, entry) = self.read_handle()?;
                match entry {
                    HandleEntry::Str(s) => Ok(Value::String(s)),
                    HandleEntry::Object(o) => Ok(Value::Object(o)),
                    HandleEntry::Array(a) => Ok(Value::Array(a)),
                    HandleEntry::ClassDesc(_) => Err(Error::InvalidHandle(wire_handle)),
                }
            }
            TypeCode::String | TypeCode::LongString => Ok(Value::String(self.read_string_body(code)?)),
            TypeCode::Array => self.read_array(),
            TypeCode::Object => self.read_ordinary_object(),
            TypeCode::ProxyClassDesc => Err(Error::UnsupportedFeature("proxy class descriptor")),
            TypeCode::Enum => Err(Error::UnsupportedFeature("enum constant")),
            TypeCode::Exception => Err(Error::UnsupportedFeature("stream exception")),
            TypeCode::Reset => Err(Error::UnsupportedFeature("stream reset")),
            other => Err(Error::InvalidTypeCode(other as u8)),
        }
    }

    // Primitive reads honor block-data mode; structured records always run
    // with the mode off, so these read straight from the stream there.

    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.r.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.r.read_exact(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    fn read_i16(&mut self) -> Result<i16> {
        let mut buf = [0u8; 2];
        self.r.read_exact(&mut buf)?;
        Ok(i16::from_be_bytes(buf))
    }

    fn read_i32(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.r.read_exact(&mut buf)?;
        Ok(i32::from_be_bytes(buf))
    }

    fn read_i64(&mut self) -> Result<i64> {
        let mut buf = [0u8; 8];
        self.r.read_exact(&mut buf)?;
        Ok(i64::from_be_bytes(buf))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.r.read_exact(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    fn read_f32(&mut self) -> Result<f32> {
        let mut buf = [0u8; 4];
        self.r.read_exact(&mut buf)?;
        Ok(f32::from_be_bytes(buf))
    }

    fn read_f64(&mut self) -> Result<f64> {
        let mut buf = [0u8; 8];
        self.r.read_exact(&mut buf)?;
        Ok(f64::from_be_bytes(buf))
    }

    fn read_type_code(&mut self) -> Result<TypeCode> {
        let byte = self.read_u8()?;
        TypeCode::from_u8(byte).ok_or(Error::InvalidTypeCode(byte))
    }

    fn read_utf(&mut self) -> Result<JavaString> {
        let len = self.read_u16()? as usize;
        self.read_payload(len)
    }

    fn read_long_utf(&mut self) -> Result<JavaString> {
        let len = usize::try_from(self.read_u64()?)?;
        self.read_payload(len)
    }

    fn read_payload(&mut self, len: usize) -> Result<JavaString> {
        let mut buf = vec![0u8; len];
        self.r.read_exact(&mut buf)?;
        Ok(JavaString::from_bytes(buf))
    }

    fn read_handle(&mut self) -> Result<(i32, HandleEntry)> {
        let wire_handle = self.read_i32()?;
        let entry = self.handles.resolve(wire_handle)?.clone();
        Ok((wire_handle, entry))
    }

    /// Read the payload of a string record whose type code has already been
    /// consumed, and assign its handle.
    fn read_string_body(&mut self, code: TypeCode) -> Result<Rc<JavaString>> {
        let payload = if code == TypeCode::String {
            self.read_utf()?
        } else {
            self.read_long_utf()?
        };
        let payload = Rc::new(payload);
        self.handles.assign(HandleEntry::Str(Rc::clone(&payload)));
        Ok(payload)
    }

    /// Read a string record or a back-reference to one.
    fn read_string(&mut self) -> Result<Rc<JavaString>> {
        let code = self.read_type_code()?;
        match code {
            TypeCode::Reference => {
                let (wire_handle, entry) = self.read_handle()?;
                match entry {
                    HandleEntry::Str(s) => Ok(s),
                    _ => Err(Error::InvalidHandle(wire_handle)),
                }
            }
            TypeCode::String | TypeCode::LongString => self.read_string_body(code),
            other => Err(Error::InvalidTypeCode(other as u8)),
        }
    }

    /// Read a class descriptor, a back-reference to one, or `TC_NULL` at the
    /// top of a super chain.
    fn read_class_desc(&mut self) -> Result<Option<Rc<RefCell<ClassDesc>>>> {
        let code = self.read_type_code()?;
        match code {
            TypeCode::Null => Ok(None),
            TypeCode::Reference => {
                let (wire_handle, entry) = self.read_handle()?;
                match entry {
                    HandleEntry::ClassDesc(desc) => Ok(Some(desc)),
                    _ => Err(Error::InvalidHandle(wire_handle)),
                }
            }
            TypeCode::ProxyClassDesc => Err(Error::UnsupportedFeature("proxy class descriptor")),
            TypeCode::ClassDesc => self.read_new_class_desc().map(Some),
            other => Err(Error::InvalidTypeCode(other as u8)),
        }
    }

    fn read_new_class_desc(&mut self) -> Result<Rc<RefCell<ClassDesc>>> {
        // The handle is assigned before the body is parsed, so a reference
        // from within the super chain resolves to this descriptor.
        let desc = Rc::new(RefCell::new(ClassDesc::default()));
        self.handles.assign(HandleEntry::ClassDesc(Rc::clone(&desc)));

        let name = self.read_utf()?;
        let serial_version_uid = self.read_i64()?;
        let flags = self.read_u8()?;
        if flags & SC_ENUM != 0 {
            return Err(Error::UnsupportedFeature("enum class descriptor"));
        }

        let count = self.read_i16()?;
        let mut fields = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            let type_code = self.read_u8()?;
            let field_name = self.read_utf()?;
            let descriptor = if type_code == b'L' || type_code == b'[' {
                Some((*self.read_string()?).clone())
            } else {
                None
            };
            fields.push(FieldDesc {
                type_code,
                name: field_name,
                descriptor,
            });
        }

        let code = self.read_u8()?;
        if code != TypeCode::EndBlockData as u8 {
            return Err(Error::InvalidTypeCode(code));
        }
        let super_desc = self.read_class_desc()?;

        {
            let mut d = desc.borrow_mut();
            d.name = name;
            d.serial_version_uid = serial_version_uid;
            d.flags = flags;
            d.fields = fields;
            d.super_desc = super_desc;
        }
        Ok(desc)
    }

    /// Read an array record whose `TC_ARRAY` has already been consumed.
    fn read_array(&mut self) -> Result<Value> {
        let desc = self
            .read_class_desc()?
            .ok_or(Error::InvalidTypeCode(TypeCode::Null as u8))?;
        let class_name = desc.borrow().name.clone();
        let name_bytes = class_name.as_bytes();
        if name_bytes.first() != Some(&b'[') {
            return Err(Error::InvalidTypeCode(*name_bytes.first().unwrap_or(&0)));
        }
        let element_type = FieldType::from_descriptor(&name_bytes[1..])?;

        let cell = Rc::new(RefCell::new(JavaArray::new(element_type.clone())));
        self.handles.assign(HandleEntry::Array(Rc::clone(&cell)));

        let len = self.read_i32()?;
        let len = usize::try_from(len).map_err(|_| Error::UnexpectedEnd)?;
        for _ in 0..len {
            let element = match &element_type {
                FieldType::Object(_) | FieldType::Array(_) => self.read_value()?,
                primitive => self.read_primitive(primitive)?,
            };
            cell.borrow_mut().elements.push(element);
        }
        Ok(Value::Array(cell))
    }

    fn read_primitive(&mut self, ty: &FieldType) -> Result<Value> {
        match ty {
            FieldType::Byte => Ok(Value::Byte(self.read_u8()?)),
            FieldType::Double => Ok(Value::Double(self.read_f64()?)),
            FieldType::Float => Ok(Value::Float(self.read_f32()?)),
            FieldType::Int => Ok(Value::Int(self.read_i32()?)),
            FieldType::Long => Ok(Value::Long(self.read_i64()?)),
            FieldType::Short => Ok(Value::Short(self.read_i16()?)),
            FieldType::Boolean => Ok(Value::Boolean(self.read_u8()? != 0)),
            FieldType::Object(_) | FieldType::Array(_) => self.read_value(),
        }
    }

    fn read_ordinary_object(&mut self) -> Result<Value> {
        let desc = self
            .read_class_desc()?
            .ok_or(Error::InvalidTypeCode(TypeCode::Null as u8))?;
        let class = {
            let d = desc.borrow();
            self.registry
                .lookup(d.name.as_bytes())
                .cloned()
                .ok_or_else(|| Error::ClassNotRegistered(d.name.to_string()))?
        };

        // The handle is assigned before any field data is read, so a cycle
        // pointing back at this object resolves.
        let cell = Rc::new(RefCell::new(Object::new(&class)));
        self.handles.assign(HandleEntry::Object(Rc::clone(&cell)));

        if desc.borrow().flags & SC_EXTERNALIZABLE != 0 {
            return Err(Error::UnsupportedFeature("externalizable class data"));
        }
        self.read_serial_data(&cell, &desc)?;
        Ok(Value::Object(cell))
    }

    /// Read the field data for one level of a class hierarchy, super classes
    /// first.
    fn read_serial_data(&mut self, cell: &Rc<RefCell<Object>>, desc: &Rc<RefCell<ClassDesc>>) -> Result<()> {
        let (super_desc, flags) = {
            let d = desc.borrow();
            (d.super_desc.clone(), d.flags)
        };
        if let Some(super_desc) = super_desc {
            let parent = cell.borrow().super_object().cloned().ok_or_else(|| {
                Error::ClassNotRegistered(super_desc.borrow().name.to_string())
            })?;
            self.read_serial_data(&parent, &super_desc)?;
        }

        let read_object_fn = cell.borrow().class().read_object_fn().cloned();
        if let Some(read_object) = read_object_fn {
            self.r.set_mode(true);
            let result = {
                let mut object = cell.borrow_mut();
                read_object(&mut object, self)
            };
            self.r.set_mode(false);
            result?;
        } else {
            self.read_fields(cell, desc)?;
        }

        if flags & SC_WRITE_METHOD != 0 {
            let code = self.read_u8()?;
            if code != TypeCode::EndBlockData as u8 {
                return Err(Error::InvalidTypeCode(code));
            }
        }
        Ok(())
    }

    fn read_fields(&mut self, cell: &Rc<RefCell<Object>>, desc: &Rc<RefCell<ClassDesc>>) -> Result<()> {
        let fields = desc.borrow().fields.clone();
        let mut data: Vec<(JavaString, Value)> = Vec::with_capacity(fields.len());
        for field in &fields {
            let value = match field.type_code {
                b'[' => {
                    let code = self.read_u8()?;
                    if code != TypeCode::Array as u8 {
                        return Err(Error::InvalidTypeCode(code));
                    }
                    self.read_array()?
                }
                b'L' => self.read_value()?,
                code => {
                    let ty = FieldType::from_type_code(code).ok_or(Error::InvalidTypeCode(code))?;
                    self.read_primitive(&ty)?
                }
            };
            data.push((field.name.clone(), value));
        }

        let mut object = cell.borrow_mut();
        let class = Rc::clone(object.class());
        for (wire_name, value) in data {
            let Some(field) = class.wire_field_named(wire_name.as_bytes()) else {
                tracing::debug!(field = %wire_name, class = %class.class_name(), "skipping unknown serial field");
                continue;
            };
            if !field.ty().matches(&value) {
                return Err(Error::TypeMismatch {
                    field: wire_name.to_string(),
                });
            }
            object.set(field.name(), value);
        }
        Ok(())
    }
}

impl<R: io::Read> DataInput for Decoder<R> {
    fn read_boolean(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    fn read_byte(&mut self) -> Result<u8> {
        self.read_u8()
    }

    fn read_short(&mut self) -> Result<i16> {
        self.read_i16()
    }

    fn read_int(&mut self) -> Result<i32> {
        self.read_i32()
    }

    fn read_long(&mut self) -> Result<i64> {
        self.read_i64()
    }

    fn read_float(&mut self) -> Result<f32> {
        self.read_f32()
    }

    fn read_double(&mut self) -> Result<f64> {
        self.read_f64()
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.r.read_exact(buf)
    }

    fn read_utf(&mut self) -> Result<JavaString> {
        Decoder::read_utf(self)
    }

    fn read_object(&mut self) -> Result<Value> {
        Decoder::read_object(self)
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use std::rc::Rc;

    use super::Decoder;
    use crate::descriptor::FieldType;
    use crate::encoder::Encoder;
    use crate::error::Error;
    use crate::registry::ClassSpec;
    use crate::value::{JavaArray, Object, Value};
    use crate::TypeCode;

    fn encode(values: &[Value]) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut encoder = Encoder::new(&mut buf).unwrap();
        for value in values {
            encoder.write_object(value).unwrap();
        }
        buf
    }

    #[test]
    fn header_is_verified() {
        assert!(Decoder::new([0xAC, 0xED, 0x00, 0x05].as_slice()).is_ok());

        let err = Decoder::new([0x00, 0x00, 0x00, 0x05].as_slice()).unwrap_err();
        assert!(matches!(err, Error::BadHeader { magic: 0, version: 5 }));

        let err = Decoder::new([0xAC, 0xED, 0x00, 0x00].as_slice()).unwrap_err();
        assert!(matches!(err, Error::BadHeader { magic: 0xACED, version: 0 }));

        let err = Decoder::new([0xAC].as_slice()).unwrap_err();
        assert!(matches!(err, Error::UnexpectedEnd));
    }

    #[test]
    fn null_and_strings() {
        let bytes = encode(&[Value::Null, Value::string("hello")]);
        let mut decoder = Decoder::new(bytes.as_slice()).unwrap();

        assert_eq!(decoder.read_object().unwrap(), Value::Null);
        assert_eq!(decoder.read_object().unwrap(), Value::string("hello"));
    }

    #[test]
    fn string_reference_resolves_to_the_same_allocation() {
        let shared = Value::string("shared");
        let bytes = encode(&[shared.clone(), shared]);

        let mut decoder = Decoder::new(bytes.as_slice()).unwrap();
        let first = decoder.read_object().unwrap();
        let second = decoder.read_object().unwrap();

        let (Value::String(first), Value::String(second)) = (first, second) else {
            panic!("expected strings");
        };
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(*first, "shared");
    }

    #[test]
    fn long_string_round_trip() {
        let payload = "b".repeat(0x10001);
        let bytes = encode(&[Value::string(payload.as_str())]);

        let mut decoder = Decoder::new(bytes.as_slice()).unwrap();
        let Value::String(decoded) = decoder.read_object().unwrap() else {
            panic!("expected a string");
        };
        assert_eq!(decoded.len(), 0x10001);
        assert_eq!(decoded.as_str(), Some(payload.as_str()));
    }

    #[test]
    fn simple_object_round_trip() {
        let point = Rc::new(
            ClassSpec::new("com.example.Point", 42)
                .field("x", FieldType::Int)
                .field("y", FieldType::Int),
        );
        let mut object = Object::new(&point);
        object.set("x", 1);
        object.set("y", 2);
        let bytes = encode(&[object.into()]);

        let mut decoder = Decoder::new(bytes.as_slice()).unwrap();
        decoder.register_type("com.example.Point", Rc::clone(&point));

        let Value::Object(decoded) = decoder.read_object().unwrap() else {
            panic!("expected an object");
        };
        assert_eq!(decoded.borrow().class_name(), "com.example.Point");
        assert_eq!(decoded.borrow().get("x"), Some(&Value::Int(1)));
        assert_eq!(decoded.borrow().get("y"), Some(&Value::Int(2)));
    }

    #[test]
    fn mixed_field_types_round_trip() {
        let spec = Rc::new(
            ClassSpec::new("com.example.Mixed", 5)
                .field("flag", FieldType::Boolean)
                .field("b", FieldType::Byte)
                .field("s", FieldType::Short)
                .field("count", FieldType::Int)
                .field("big", FieldType::Long)
                .field("ratio", FieldType::Float)
                .field("exact", FieldType::Double)
                .field("name", FieldType::string())
                .field("none", FieldType::string()),
        );
        let mut object = Object::new(&spec);
        object.set("flag", true);
        object.set("b", 0xFFu8);
        object.set("s", -3i16);
        object.set("count", 12);
        object.set("big", -9_000_000_000i64);
        object.set("ratio", 0.5f32);
        object.set("exact", 2.25f64);
        object.set("name", "jane");
        let bytes = encode(&[object.into()]);

        let mut decoder = Decoder::new(bytes.as_slice()).unwrap();
        decoder.register_type("com.example.Mixed", Rc::clone(&spec));

        let Value::Object(decoded) = decoder.read_object().unwrap() else {
            panic!("expected an object");
        };
        let decoded = decoded.borrow();
        assert_eq!(decoded.get("flag"), Some(&Value::Boolean(true)));
        assert_eq!(decoded.get("b"), Some(&Value::Byte(0xFF)));
        assert_eq!(decoded.get("s"), Some(&Value::Short(-3)));
        assert_eq!(decoded.get("count"), Some(&Value::Int(12)));
        assert_eq!(decoded.get("big"), Some(&Value::Long(-9_000_000_000)));
        assert_eq!(decoded.get("ratio"), Some(&Value::Float(0.5)));
        assert_eq!(decoded.get("exact"), Some(&Value::Double(2.25)));
        assert_eq!(decoded.get("name"), Some(&Value::string("jane")));
        assert_eq!(decoded.get("none"), Some(&Value::Null));
    }

    #[test]
    fn super_chain_round_trip() {
        let base = Rc::new(ClassSpec::new("com.example.Base", 1).field("id", FieldType::Long));
        let derived = Rc::new(
            ClassSpec::new("com.example.Derived", 2)
                .extends(Rc::clone(&base))
                .field("x", FieldType::Int),
        );

        let mut object = Object::new(&derived);
        object.set("x", 5);
        object
            .super_object()
            .unwrap()
            .borrow_mut()
            .set("id", 77i64);
        let bytes = encode(&[object.into()]);

        let mut decoder = Decoder::new(bytes.as_slice()).unwrap();
        decoder.register_type("com.example.Derived", Rc::clone(&derived));

        let Value::Object(decoded) = decoder.read_object().unwrap() else {
            panic!("expected an object");
        };
        let decoded = decoded.borrow();
        assert_eq!(decoded.get("x"), Some(&Value::Int(5)));
        let parent = decoded.super_object().expect("super object");
        assert_eq!(parent.borrow().get("id"), Some(&Value::Long(77)));
    }

    #[test]
    fn nested_object_round_trip() {
        let point = Rc::new(ClassSpec::new("com.example.Point", 42).field("x", FieldType::Int));
        let outer = Rc::new(
            ClassSpec::new("com.example.Outer", 9)
                .field("inner", FieldType::Object("com.example.Point".to_string())),
        );

        let mut inner = Object::new(&point);
        inner.set("x", 3);
        let mut object = Object::new(&outer);
        object.set("inner", Value::from(inner));
        let bytes = encode(&[object.into()]);

        let mut decoder = Decoder::new(bytes.as_slice()).unwrap();
        decoder.register_type("com.example.Point", Rc::clone(&point));
        decoder.register_type("com.example.Outer", Rc::clone(&outer));

        let Value::Object(decoded) = decoder.read_object().unwrap() else {
            panic!("expected an object");
        };
        let decoded = decoded.borrow();
        let Some(Value::Object(inner)) = decoded.get("inner") else {
            panic!("expected an inner object");
        };
        assert_eq!(inner.borrow().get("x"), Some(&Value::Int(3)));
    }

    #[test]
    fn int_array_round_trip() {
        let array = JavaArray::with_elements(
            FieldType::Int,
            vec![Value::Int(1), Value::Int(2), Value::Int(3)],
        );
        let bytes = encode(&[array.into()]);

        let mut decoder = Decoder::new(bytes.as_slice()).unwrap();
        let Value::Array(decoded) = decoder.read_object().unwrap() else {
            panic!("expected an array");
        };
        let decoded = decoded.borrow();
        assert_eq!(decoded.element_type(), &FieldType::Int);
        assert_eq!(decoded.elements(), [Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn nested_array_round_trip() {
        let inner = JavaArray::with_elements(FieldType::Int, vec![Value::Int(7)]);
        let array = JavaArray::with_elements(
            FieldType::array(FieldType::Int),
            vec![Value::from(inner), Value::Null],
        );
        let bytes = encode(&[array.into()]);

        let mut decoder = Decoder::new(bytes.as_slice()).unwrap();
        let Value::Array(decoded) = decoder.read_object().unwrap() else {
            panic!("expected an array");
        };
        let decoded = decoded.borrow();
        assert_eq!(decoded.class_name(), "[[I");
        let Value::Array(first) = &decoded.elements()[0] else {
            panic!("expected an inner array");
        };
        assert_eq!(first.borrow().elements(), [Value::Int(7)]);
        assert_eq!(decoded.elements()[1], Value::Null);
    }

    #[test]
    fn string_array_shares_identical_elements() {
        let shared = Value::string("twice");
        let array = JavaArray::with_elements(
            FieldType::string(),
            vec![shared.clone(), shared, Value::string("once")],
        );
        let bytes = encode(&[array.into()]);

        let mut decoder = Decoder::new(bytes.as_slice()).unwrap();
        let Value::Array(decoded) = decoder.read_object().unwrap() else {
            panic!("expected an array");
        };
        let decoded = decoded.borrow();
        let (Value::String(a), Value::String(b)) = (&decoded.elements()[0], &decoded.elements()[1]) else {
            panic!("expected strings");
        };
        assert!(Rc::ptr_eq(a, b));
        assert_eq!(decoded.elements()[2], Value::string("once"));
    }

    #[test]
    fn array_field_round_trip() {
        let spec = Rc::new(
            ClassSpec::new("com.example.Holder", 6)
                .field("data", FieldType::array(FieldType::Byte)),
        );
        let mut object = Object::new(&spec);
        object.set(
            "data",
            Value::from(JavaArray::with_elements(
                FieldType::Byte,
                vec![Value::Byte(1), Value::Byte(2)],
            )),
        );
        let bytes = encode(&[object.into()]);

        let mut decoder = Decoder::new(bytes.as_slice()).unwrap();
        decoder.register_type("com.example.Holder", Rc::clone(&spec));

        let Value::Object(decoded) = decoder.read_object().unwrap() else {
            panic!("expected an object");
        };
        let decoded = decoded.borrow();
        let Some(Value::Array(data)) = decoded.get("data") else {
            panic!("expected an array field");
        };
        assert_eq!(data.borrow().elements(), [Value::Byte(1), Value::Byte(2)]);
    }

    #[test]
    fn cyclic_object_round_trip() {
        let spec = Rc::new(
            ClassSpec::new("com.example.Node", 11)
                .field("next", FieldType::Object("com.example.Node".to_string())),
        );
        let node = Rc::new(std::cell::RefCell::new(Object::new(&spec)));
        node.borrow_mut().set("next", Value::Object(Rc::clone(&node)));
        let bytes = encode(&[Value::Object(node)]);

        let mut decoder = Decoder::new(bytes.as_slice()).unwrap();
        decoder.register_type("com.example.Node", Rc::clone(&spec));

        let Value::Object(decoded) = decoder.read_object().unwrap() else {
            panic!("expected an object");
        };
        let Some(Value::Object(next)) = decoded.borrow().get("next").cloned() else {
            panic!("expected a next reference");
        };
        assert!(Rc::ptr_eq(&decoded, &next));
    }

    #[test]
    fn custom_read_and_write_methods_round_trip() {
        let spec = Rc::new(
            ClassSpec::new("com.example.Counter", 9)
                .field_as("count", FieldType::Int, "-")
                .field_as("label", FieldType::string(), "-")
                .with_write_object(|object, out| {
                    let Some(&Value::Int(count)) = object.get("count") else {
                        return Err(Error::TypeMismatch { field: "count".to_string() });
                    };
                    out.write_int(count)?;
                    out.write_utf("checked")?;
                    out.write_object(&Value::string("nested"))
                })
                .with_read_object(|object, input| {
                    let count = input.read_int()?;
                    let label = input.read_utf()?;
                    assert_eq!(label, "checked");
                    let nested = input.read_object()?;
                    object.set("count", Value::Int(count));
                    object.set("label", nested);
                    Ok(())
                }),
        );

        let mut object = Object::new(&spec);
        object.set("count", 41);
        let bytes = encode(&[object.into()]);

        // The custom payload is block-framed and closed with TC_ENDBLOCKDATA.
        assert!(bytes.contains(&(TypeCode::BlockData as u8)));
        assert_eq!(bytes.last(), Some(&(TypeCode::EndBlockData as u8)));

        let mut decoder = Decoder::new(bytes.as_slice()).unwrap();
        decoder.register_type("com.example.Counter", Rc::clone(&spec));

        let Value::Object(decoded) = decoder.read_object().unwrap() else {
            panic!("expected an object");
        };
        assert_eq!(decoded.borrow().get("count"), Some(&Value::Int(41)));
        assert_eq!(decoded.borrow().get("label"), Some(&Value::string("nested")));
    }

    #[test]
    fn empty_custom_write_method_round_trip() {
        let spec = Rc::new(
            ClassSpec::new("com.example.Quiet", 2)
                .with_write_object(|_, _| Ok(()))
                .with_read_object(|_, _| Ok(())),
        );
        let bytes = encode(&[Object::new(&spec).into()]);

        let mut decoder = Decoder::new(bytes.as_slice()).unwrap();
        decoder.register_type("com.example.Quiet", Rc::clone(&spec));
        assert!(matches!(decoder.read_object().unwrap(), Value::Object(_)));
    }

    #[test]
    fn unknown_wire_fields_are_skipped() {
        let wide = Rc::new(
            ClassSpec::new("com.example.Thing", 4)
                .field("x", FieldType::Int)
                .field("extra", FieldType::Double),
        );
        let mut object = Object::new(&wide);
        object.set("x", 6);
        object.set("extra", 3.5f64);
        let bytes = encode(&[object.into()]);

        let narrow = Rc::new(ClassSpec::new("com.example.Thing", 4).field("x", FieldType::Int));
        let mut decoder = Decoder::new(bytes.as_slice()).unwrap();
        decoder.register_type("com.example.Thing", Rc::clone(&narrow));

        let Value::Object(decoded) = decoder.read_object().unwrap() else {
            panic!("expected an object");
        };
        assert_eq!(decoded.borrow().get("x"), Some(&Value::Int(6)));
        assert_eq!(decoded.borrow().get("extra"), None);
    }

    #[test]
    fn mismatched_field_type_is_rejected() {
        let wide = Rc::new(ClassSpec::new("com.example.Thing", 4).field("x", FieldType::Int));
        let mut object = Object::new(&wide);
        object.set("x", 6);
        let bytes = encode(&[object.into()]);

        let other = Rc::new(ClassSpec::new("com.example.Thing", 4).field("x", FieldType::Boolean));
        let mut decoder = Decoder::new(bytes.as_slice()).unwrap();
        decoder.register_type("com.example.Thing", Rc::clone(&other));

        let err = decoder.read_object().unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn unregistered_class_is_rejected() {
        let spec = Rc::new(ClassSpec::new("com.example.Point", 42).field("x", FieldType::Int));
        let bytes = encode(&[Object::new(&spec).into()]);

        let mut decoder = Decoder::new(bytes.as_slice()).unwrap();
        let err = decoder.read_object().unwrap_err();
        let Error::ClassNotRegistered(name) = err else {
            panic!("expected ClassNotRegistered, got {err:?}");
        };
        assert_eq!(name, "com.example.Point");
    }

    #[test]
    fn invalid_type_code_is_rejected() {
        let bytes = [0xAC, 0xED, 0x00, 0x05, 0x20];
        let mut decoder = Decoder::new(bytes.as_slice()).unwrap();
        assert!(matches!(decoder.read_object(), Err(Error::InvalidTypeCode(0x20))));
    }

    #[test]
    fn out_of_range_handle_is_rejected() {
        #[rustfmt::skip]
        let bytes = [
            0xAC, 0xED, 0x00, 0x05,
            TypeCode::Reference as u8,
            0x00, 0x7E, 0x00, 0x00,
        ];
        let mut decoder = Decoder::new(bytes.as_slice()).unwrap();
        assert!(matches!(decoder.read_object(), Err(Error::InvalidHandle(0x7E0000))));
    }

    #[test]
    fn unsupported_features_are_refused() {
        for code in [TypeCode::ProxyClassDesc, TypeCode::Enum, TypeCode::Exception, TypeCode::Reset] {
            let bytes = [0xAC, 0xED, 0x00, 0x05, code as u8];
            let mut decoder = Decoder::new(bytes.as_slice()).unwrap();
            assert!(
                matches!(decoder.read_object(), Err(Error::UnsupportedFeature(_))),
                "{code:?} should be refused"
            );
        }
    }

    #[test]
    fn enum_class_descriptor_is_refused() {
        #[rustfmt::skip]
        let mut bytes = vec![
            0xAC, 0xED, 0x00, 0x05,
            TypeCode::Object as u8,
            TypeCode::ClassDesc as u8,
            0, 1, b'A',
        ];
        bytes.extend_from_slice(&0i64.to_be_bytes());
        bytes.push(0x12); // SC_SERIALIZABLE | SC_ENUM

        let mut decoder = Decoder::new(bytes.as_slice()).unwrap();
        assert!(matches!(
            decoder.read_object(),
            Err(Error::UnsupportedFeature("enum class descriptor"))
        ));
    }

    #[test]
    fn externalizable_class_data_is_refused() {
        #[rustfmt::skip]
        let mut bytes = vec![
            0xAC, 0xED, 0x00, 0x05,
            TypeCode::Object as u8,
            TypeCode::ClassDesc as u8,
            0, 1, b'A',
        ];
        bytes.extend_from_slice(&0i64.to_be_bytes());
        #[rustfmt::skip]
        bytes.extend_from_slice(&[
            0x06, // SC_SERIALIZABLE | SC_EXTERNALIZABLE
            0, 0,
            TypeCode::EndBlockData as u8,
            TypeCode::Null as u8,
        ]);

        let mut decoder = Decoder::new(bytes.as_slice()).unwrap();
        decoder.register_type("A", Rc::new(ClassSpec::new("A", 0)));
        assert!(matches!(
            decoder.read_object(),
            Err(Error::UnsupportedFeature("externalizable class data"))
        ));
    }

    #[test]
    fn truncated_stream_is_an_unexpected_end() {
        let spec = Rc::new(ClassSpec::new("com.example.Point", 42).field("x", FieldType::Int));
        let bytes = encode(&[Object::new(&spec).into()]);

        let mut decoder = Decoder::new(&bytes[..bytes.len() - 2]).unwrap();
        decoder.register_type("com.example.Point", spec);
        assert!(matches!(decoder.read_object(), Err(Error::UnexpectedEnd)));
    }

    #[test]
    fn reencoding_a_decoded_stream_is_byte_identical() {
        let spec = Rc::new(
            ClassSpec::new("com.example.Point", 42)
                .field("x", FieldType::Int)
                .field("name", FieldType::string()),
        );
        let mut object = Object::new(&spec);
        object.set("x", 8);
        object.set("name", "p");
        let bytes = encode(&[object.into(), Value::string("trailer")]);

        let mut registry = crate::Registry::new();
        registry.register("com.example.Point", Rc::clone(&spec));
        let mut decoder = Decoder::with_registry(bytes.as_slice(), registry).unwrap();
        let first = decoder.read_object().unwrap();
        let second = decoder.read_object().unwrap();

        let reencoded = encode(&[first, second]);
        assert_eq!(reencoded, bytes);
    }

    #[test]
    fn second_object_reuses_the_class_descriptor() {
        let spec = Rc::new(ClassSpec::new("com.example.Point", 42).field("x", FieldType::Int));
        let mut first = Object::new(&spec);
        first.set("x", 1);
        let mut second = Object::new(&spec);
        second.set("x", 2);
        let bytes = encode(&[first.into(), second.into()]);

        let mut decoder = Decoder::new(bytes.as_slice()).unwrap();
        decoder.register_type("com.example.Point", Rc::clone(&spec));

        let Value::Object(first) = decoder.read_object().unwrap() else {
            panic!("expected an object");
        };
        let Value::Object(second) = decoder.read_object().unwrap() else {
            panic!("expected an object");
        };
        assert_eq!(first.borrow().get("x"), Some(&Value::Int(1)));
        assert_eq!(second.borrow().get("x"), Some(&Value::Int(2)));
        assert!(!Rc::ptr_eq(&first, &second));
    }
}
