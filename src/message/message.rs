//! Structured messages exchanged with a peer.
//!
//! A [`Message`] is an ordered mapping of string keys to heterogeneous
//! [`Value`]s, the unit a peer sends and receives. Messages are transient:
//! built by the caller or by the codec on decode, consumed by the delegate
//! or by the codec on encode, never persisted.

/// A single field value inside a [`Message`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean flag.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl Value {
    /// Get the boolean value, if this is a [`Value::Bool`].
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get the integer value, if this is a [`Value::Int`].
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Get the float value, if this is a [`Value::Float`].
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Get the text value, if this is a [`Value::Text`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the raw bytes, if this is a [`Value::Bytes`].
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
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
        Value::Bytes(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

/// An ordered mapping of string keys to [`Value`]s.
///
/// Insertion order is preserved; inserting an existing key replaces the
/// value in place, keeping the key's original position.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message {
    fields: Vec<(String, Value)>,
}

impl Message {
    /// Create an empty message.
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Add a field, consuming and returning the message for chaining.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set a field. An existing key keeps its position; a new key is
    /// appended.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((key, value)),
        }
    }

    /// Append a field without checking for an existing key.
    ///
    /// Used by the codec so decoded fields land exactly as they appear on
    /// the wire.
    pub(crate) fn push_field(&mut self, key: String, value: Value) {
        self.fields.push((key, value));
    }

    /// Look up a field by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Look up a text field by key.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Look up an integer field by key.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_int)
    }

    /// Look up a boolean field by key.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// Check whether a key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == key)
    }

    /// Remove a field, returning its value if the key was present.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let idx = self.fields.iter().position(|(k, _)| k == key)?;
        Some(self.fields.remove(idx).1)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check whether the message has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_preserves_order() {
        let mut msg = Message::new();
        msg.insert("a", 1);
        msg.insert("b", 2);
        msg.insert("c", 3);

        let keys: Vec<&str> = msg.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["a", "b", "c"]);
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut msg = Message::new();
        msg.insert("a", 1);
        msg.insert("b", 2);
        msg.insert("a", 99);

        assert_eq!(msg.len(), 2);
        assert_eq!(msg.get_int("a"), Some(99));
        // Replaced key keeps its original position
        let keys: Vec<&str> = msg.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["a", "b"]);
    }

    #[test]
    fn test_with_chaining() {
        let msg = Message::new()
            .with("op", "ping")
            .with("seq", 7)
            .with("urgent", true);

        assert_eq!(msg.get_str("op"), Some("ping"));
        assert_eq!(msg.get_int("seq"), Some(7));
        assert_eq!(msg.get_bool("urgent"), Some(true));
    }

    #[test]
    fn test_typed_accessors_reject_wrong_type() {
        let msg = Message::new().with("op", "ping");
        assert_eq!(msg.get_int("op"), None);
        assert_eq!(msg.get_bool("op"), None);
        assert_eq!(msg.get_str("missing"), None);
    }

    #[test]
    fn test_remove() {
        let mut msg = Message::new().with("a", 1).with("b", 2);

        assert_eq!(msg.remove("a"), Some(Value::Int(1)));
        assert_eq!(msg.remove("a"), None);
        assert_eq!(msg.len(), 1);
        assert!(msg.contains_key("b"));
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from("text"), Value::Text("text".to_owned()));
        assert_eq!(Value::from(42), Value::Int(42));
        assert_eq!(Value::from(1.5), Value::Float(1.5));
        assert_eq!(Value::from(vec![1u8, 2]), Value::Bytes(vec![1, 2]));
        assert_eq!(Value::from(true).as_bool(), Some(true));
    }

    #[test]
    fn test_empty_message() {
        let msg = Message::new();
        assert!(msg.is_empty());
        assert_eq!(msg.len(), 0);
        assert_eq!(msg.get("anything"), None);
    }
}
