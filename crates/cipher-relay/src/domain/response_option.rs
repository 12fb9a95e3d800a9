//! Operator-controlled reply string echoed in every submission response.

use crate::domain::types::DEFAULT_RESPONSE_OPTION;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseOption {
    value: String,
}

impl ResponseOption {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn get(&self) -> &str {
        &self.value
    }

    /// Replace the value unconditionally, returning the previous one.
    pub fn set(&mut self, value: impl Into<String>) -> String {
        std::mem::replace(&mut self.value, value.into())
    }
}

impl Default for ResponseOption {
    fn default() -> Self {
        Self::new(DEFAULT_RESPONSE_OPTION)
    }
}
