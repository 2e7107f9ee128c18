//! Values handed back to callers
//!
//! A read yields either the raw bytes or a text decoding of them, chosen
//! per call (`as_buffer`, `key_as_buffer`, `value_as_buffer`).

use std::fmt;

use bytes::Bytes;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Buffer(Bytes),
    /// Lossy UTF-8 decoding of the stored bytes
    Text(String),
}

impl Value {
    /// Materialize stored bytes in the requested mode
    pub fn materialize(bytes: Vec<u8>, as_buffer: bool) -> Self {
        if as_buffer {
            Value::Buffer(Bytes::from(bytes))
        } else {
            match String::from_utf8(bytes) {
                Ok(text) => Value::Text(text),
                Err(e) => Value::Text(String::from_utf8_lossy(e.as_bytes()).into_owned()),
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Value::Buffer(b) => b,
            Value::Text(s) => s.as_bytes(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Buffer(b) => std::str::from_utf8(b).ok(),
            Value::Text(s) => Some(s),
        }
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            Value::Buffer(b) => b,
            Value::Text(s) => Bytes::from(s),
        }
    }

    pub fn is_buffer(&self) -> bool {
        matches!(self, Value::Buffer(_))
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Buffer(Bytes::new())
    }
}

impl AsRef<[u8]> for Value {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Buffer(b) => f.write_str(&String::from_utf8_lossy(b)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Buffer(Bytes::from(b))
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Buffer(Bytes::copy_from_slice(b))
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Buffer(b)
    }
}
