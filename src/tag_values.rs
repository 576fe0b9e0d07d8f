use std::collections::HashMap;

/// One dimension of a grid: the values seen for a single tag key, in insertion order.
///
/// The position of a value is its coordinate along this dimension. Positions are never
/// reassigned and the dimension never grows past `capacity`.
#[derive(Debug, Clone)]
pub struct TagValues {
    capacity: u64,
    values: Vec<String>,
    value_to_index: HashMap<String, usize>,
}

impl TagValues {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            values: Vec::new(),
            value_to_index: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.values.len() as u64 >= self.capacity
    }

    /// Registers `value`.
    ///
    /// Returns true if the value already has a coordinate or was appended, false if the
    /// dimension is full (nothing changes in that case).
    pub fn set_value(&mut self, value: &str) -> bool {
        if self.value_to_index.contains_key(value) {
            return true;
        }
        if self.is_full() {
            return false;
        }
        self.value_to_index
            .insert(value.to_string(), self.values.len());
        self.values.push(value.to_string());
        true
    }

    pub fn value_index(&self, value: &str) -> Option<usize> {
        self.value_to_index.get(value).copied()
    }

    pub fn contains(&self, value: &str) -> bool {
        self.value_to_index.contains_key(value)
    }

    /// Values in coordinate order.
    pub fn values(&self) -> &[String] {
        &self.values
    }
}
