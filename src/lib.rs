//! A pure-rust implementation of the Java Object Serialization Stream protocol.
//!
//! This crate encodes a graph of in-memory [`Value`]s into a byte stream that is
//! byte-compatible with `java.io.ObjectOutputStream`, and decodes such a stream
//! back. Java class metadata (class name, serialVersionUID, fields, super class,
//! custom read/write methods) is supplied by the caller as a [`ClassSpec`] and
//! registered with the decoder.
//!
//! # Limitations
//!
//! - Does not support proxy class descriptors, enum constants, externalizable
//!   class data, or stream resets. These are refused with
//!   [`Error::UnsupportedFeature`].
//! - String payloads are copied as raw bytes; modified UTF-8 is never validated
//!   or transcoded.
//!
//! # Examples
//!
//! ```rust
//! # fn test() -> Result<(), javaio::Error> {
//! use std::rc::Rc;
//!
//! use javaio::{ClassSpec, Decoder, Encoder, FieldType, Object, Value};
//!
//! let point = Rc::new(
//!     ClassSpec::new("com.example.Point", 1)
//!         .field("x", FieldType::Int)
//!         .field("y", FieldType::Int),
//! );
//!
//! let mut object = Object::new(&point);
//! object.set("x", Value::Int(4));
//! object.set("y", Value::Int(2));
//!
//! let mut buf = Vec::new();
//! let mut encoder = Encoder::new(&mut buf)?;
//! encoder.write_object(&object.into())?;
//!
//! let mut decoder = Decoder::new(buf.as_slice())?;
//! decoder.register_type("com.example.Point", Rc::clone(&point));
//!
//! let value = decoder.read_object()?;
//! let Value::Object(decoded) = value else { panic!("expected an object") };
//! assert_eq!(decoded.borrow().get("x"), Some(&Value::Int(4)));
//! # Ok(())
//! # }
//! # test().expect("test failed");
//! ```
#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(unsafe_code)]
#![deny(unreachable_pub)]

pub mod decoder;
pub mod descriptor;
pub mod encoder;
pub mod error;
pub mod registry;
pub mod traits;
pub mod value;

mod block;
mod handles;

pub use decoder::Decoder;
pub use descriptor::FieldType;
pub use encoder::Encoder;
pub use error::{Error, Result};
pub use registry::{ClassSpec, FieldSpec, ReadObjectFn, Registry, WriteObjectFn};
pub use traits::{DataInput, DataOutput};
pub use value::{JavaArray, JavaString, Object, Value};

/// First two bytes of every stream.
pub const STREAM_MAGIC: u16 = 0xACED;
/// Protocol version written right after the magic.
pub const STREAM_VERSION: i16 = 5;
/// Wire handle of the first back-referenceable entity in a stream.
pub const BASE_WIRE_HANDLE: i32 = 0x7E0000;

/// Type codes tagging every structured record in a stream.
///
/// Defined by:
/// - Java Object Serialization Specification, 6.4.2 (Terminal Symbols and
///   Constants, `java.io.ObjectStreamConstants`)
#[derive(Debug, PartialEq, Eq, Clone, Copy, num_derive::FromPrimitive)]
#[repr(u8)]
pub enum TypeCode {
    /// TC_NULL
    Null = 0x70,
    /// TC_REFERENCE
    Reference = 0x71,
    /// TC_CLASSDESC
    ClassDesc = 0x72,
    /// TC_OBJECT
    Object = 0x73,
    /// TC_STRING
    String = 0x74,
    /// TC_ARRAY
    Array = 0x75,
    /// TC_CLASS
    Class = 0x76,
    /// TC_BLOCKDATA
    BlockData = 0x77,
    /// TC_ENDBLOCKDATA
    EndBlockData = 0x78,
    /// TC_RESET
    Reset = 0x79,
    /// TC_BLOCKDATALONG
    BlockDataLong = 0x7A,
    /// TC_EXCEPTION
    Exception = 0x7B,
    /// TC_LONGSTRING
    LongString = 0x7C,
    /// TC_PROXYCLASSDESC
    ProxyClassDesc = 0x7D,
    /// TC_ENUM
    Enum = 0x7E,
}

/// SC_WRITE_METHOD, set if the class has a custom write method (with SC_SERIALIZABLE).
pub const SC_WRITE_METHOD: u8 = 0x01;
/// SC_SERIALIZABLE
pub const SC_SERIALIZABLE: u8 = 0x02;
/// SC_EXTERNALIZABLE
pub const SC_EXTERNALIZABLE: u8 = 0x04;
/// SC_BLOCK_DATA, set if externalizable data is written in blocks (with SC_EXTERNALIZABLE).
pub const SC_BLOCK_DATA: u8 = 0x08;
/// SC_ENUM
pub const SC_ENUM: u8 = 0x10;
