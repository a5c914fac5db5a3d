//! Back-reference handle tables.
//!
//! Every first mention of a back-referenceable entity (string, class
//! descriptor, ordinary object, array) occupies the next handle slot;
//! `TC_REFERENCE` records carry `BASE_WIRE_HANDLE + slot`. Handles are never
//! reused, rewritten or reordered within a session.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::descriptor::ClassDesc;
use crate::error::{Error, Result};
use crate::value::{JavaArray, JavaString, Object, Value};
use crate::BASE_WIRE_HANDLE;

/// Encode-side handle table.
///
/// Values are keyed on `Rc` pointer identity; a clone of each assigned value
/// is pinned for the lifetime of the session so no address is ever reused.
/// Class descriptors are keyed on class name, and generated field-descriptor
/// strings are interned by content so equal descriptors share one handle.
pub(crate) struct EncodeHandles {
    count: i32,
    by_identity: HashMap<usize, i32>,
    by_class_name: HashMap<String, i32>,
    interned: HashMap<Vec<u8>, Rc<JavaString>>,
    pinned: Vec<Value>,
}

impl EncodeHandles {
    pub(crate) fn new() -> Self {
        EncodeHandles {
            count: 0,
            by_identity: HashMap::new(),
            by_class_name: HashMap::new(),
            interned: HashMap::new(),
            pinned: Vec::new(),
        }
    }

    fn next_handle(&mut self) -> i32 {
        let handle = BASE_WIRE_HANDLE + self.count;
        self.count += 1;
        handle
    }

    /// The wire handle already assigned to this value, if any.
    pub(crate) fn find(&self, value: &Value) -> Option<i32> {
        identity(value).and_then(|ptr| self.by_identity.get(&ptr).copied())
    }

    /// Assign the next handle to a value.
    pub(crate) fn assign(&mut self, value: Value) -> i32 {
        let handle = self.next_handle();
        if let Some(ptr) = identity(&value) {
            self.by_identity.insert(ptr, handle);
            self.pinned.push(value);
        }
        handle
    }

    /// The wire handle already assigned to a class name, if any.
    pub(crate) fn find_class(&self, class_name: &str) -> Option<i32> {
        self.by_class_name.get(class_name).copied()
    }

    /// Assign the next handle to a class name.
    pub(crate) fn assign_class(&mut self, class_name: &str) -> i32 {
        let handle = self.next_handle();
        self.by_class_name.insert(class_name.to_string(), handle);
        handle
    }

    /// The session-interned string for a generated descriptor, allocating it
    /// on first use.
    pub(crate) fn intern(&mut self, descriptor: String) -> Rc<JavaString> {
        Rc::clone(
            self.interned
                .entry(descriptor.clone().into_bytes())
                .or_insert_with(|| Rc::new(JavaString::from(descriptor))),
        )
    }
}

fn identity(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(Rc::as_ptr(s) as usize),
        Value::Object(o) => Some(Rc::as_ptr(o) as *const u8 as usize),
        Value::Array(a) => Some(Rc::as_ptr(a) as *const u8 as usize),
        _ => None,
    }
}

/// One slot of the decode-side handle table.
#[derive(Debug, Clone)]
pub(crate) enum HandleEntry {
    ClassDesc(Rc<RefCell<ClassDesc>>),
    Str(Rc<JavaString>),
    Object(Rc<RefCell<Object>>),
    Array(Rc<RefCell<JavaArray>>),
}

/// Decode-side handle table: an append-only list indexed from
/// `BASE_WIRE_HANDLE`.
#[derive(Debug)]
pub(crate) struct DecodeHandles {
    entries: Vec<HandleEntry>,
}

impl DecodeHandles {
    pub(crate) fn new() -> Self {
        DecodeHandles { entries: Vec::new() }
    }

    /// Append an entry, returning its wire handle.
    pub(crate) fn assign(&mut self, entry: HandleEntry) -> i32 {
        self.entries.push(entry);
        BASE_WIRE_HANDLE + (self.entries.len() - 1) as i32
    }

    /// Resolve a wire handle, verifying it lies in the allocated range.
    pub(crate) fn resolve(&self, wire_handle: i32) -> Result<&HandleEntry> {
        let index = i64::from(wire_handle) - i64::from(BASE_WIRE_HANDLE);
        if index < 0 || index >= self.entries.len() as i64 {
            return Err(Error::InvalidHandle(wire_handle));
        }
        Ok(&self.entries[index as usize])
    }
}
