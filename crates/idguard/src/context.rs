//! Per-call context passed to every validator

use std::collections::HashMap;

use uuid::Uuid;

/// Context for one validation call
///
/// Carries a correlation id that shows up in every log line emitted while
/// validating, and free-form properties for custom validators.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Correlation id
    pub activity_id: Uuid,
    /// Caller-defined properties
    pub properties: HashMap<String, String>,
}

impl CallContext {
    /// Context with a fresh correlation id
    pub fn new() -> Self {
        Self::with_activity_id(Uuid::new_v4())
    }

    /// Context with a caller-supplied correlation id
    pub fn with_activity_id(activity_id: Uuid) -> Self {
        Self {
            activity_id,
            properties: HashMap::new(),
        }
    }

    /// Attach a property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}
