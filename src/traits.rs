//! The I/O surface custom read/write methods program against.

use crate::error::Result;
use crate::value::{JavaString, Value};

/// Primitive and object writes available to a custom write method.
///
/// Primitive writes land inside block-data framing; nested object writes
/// suspend the framing for the duration of the structured record.
pub trait DataOutput {
    /// Write a boolean as one byte.
    fn write_boolean(&mut self, v: bool) -> Result<()>;
    /// Write one byte.
    fn write_byte(&mut self, v: u8) -> Result<()>;
    /// Write a big-endian 16-bit integer.
    fn write_short(&mut self, v: i16) -> Result<()>;
    /// Write a big-endian 32-bit integer.
    fn write_int(&mut self, v: i32) -> Result<()>;
    /// Write a big-endian 64-bit integer.
    fn write_long(&mut self, v: i64) -> Result<()>;
    /// Write a big-endian 32-bit float.
    fn write_float(&mut self, v: f32) -> Result<()>;
    /// Write a big-endian 64-bit float.
    fn write_double(&mut self, v: f64) -> Result<()>;
    /// Write a raw run of bytes.
    fn write_bytes(&mut self, buf: &[u8]) -> Result<()>;
    /// Write a string as a 16-bit length followed by its bytes.
    fn write_utf(&mut self, s: &str) -> Result<()>;
    /// Write a value as a structured record.
    fn write_object(&mut self, value: &Value) -> Result<()>;
}

/// Primitive and object reads available to a custom read method.
pub trait DataInput {
    /// Read a boolean from one byte.
    fn read_boolean(&mut self) -> Result<bool>;
    /// Read one byte.
    fn read_byte(&mut self) -> Result<u8>;
    /// Read a big-endian 16-bit integer.
    fn read_short(&mut self) -> Result<i16>;
    /// Read a big-endian 32-bit integer.
    fn read_int(&mut self) -> Result<i32>;
    /// Read a big-endian 64-bit integer.
    fn read_long(&mut self) -> Result<i64>;
    /// Read a big-endian 32-bit float.
    fn read_float(&mut self) -> Result<f32>;
    /// Read a big-endian 64-bit float.
    fn read_double(&mut self) -> Result<f64>;
    /// Fill `buf` with a raw run of bytes.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()>;
    /// Read a string framed as a 16-bit length followed by its bytes.
    fn read_utf(&mut self) -> Result<JavaString>;
    /// Read a value as a structured record.
    fn read_object(&mut self) -> Result<Value>;
}
