//! Per-transition data handed to `handle_entered`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keyed data passed along with a transition.
///
/// Values are stored as JSON so that any serializable payload can travel
/// with a transition without the machine knowing its shape.
///
/// # Example
///
/// ```rust
/// use stagehand::core::EnterArgs;
///
/// let args = EnterArgs::new().with("door", "north").with("gold", 12);
///
/// assert_eq!(args.get::<String>("door").unwrap().as_deref(), Some("north"));
/// assert_eq!(args.get::<u32>("gold").unwrap(), Some(12));
/// assert_eq!(args.get::<u32>("missing").unwrap(), None);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnterArgs {
    values: Map<String, Value>,
}

impl EnterArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value, returning the updated args.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Insert any serializable value.
    pub fn insert<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        self.values.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    /// Read a value back as `T`.
    ///
    /// Returns `Ok(None)` when the key is absent and an error when the
    /// stored value does not deserialize as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, serde_json::Error> {
        self.values
            .get(key)
            .map(|value| T::deserialize(value))
            .transpose()
    }

    /// Raw JSON value for a key.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

impl From<Map<String, Value>> for EnterArgs {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Spawn {
        x: i32,
        y: i32,
    }

    #[test]
    fn new_args_are_empty() {
        let args = EnterArgs::new();
        assert!(args.is_empty());
        assert_eq!(args.len(), 0);
        assert!(args.value("anything").is_none());
    }

    #[test]
    fn with_stores_primitive_values() {
        let args = EnterArgs::new().with("room", "cellar").with("lit", false);

        assert_eq!(args.len(), 2);
        assert!(args.contains_key("room"));
        assert_eq!(args.get::<String>("room").unwrap(), Some("cellar".to_string()));
        assert_eq!(args.get::<bool>("lit").unwrap(), Some(false));
    }

    #[test]
    fn insert_accepts_structured_values() {
        let mut args = EnterArgs::new();
        args.insert("spawn", &Spawn { x: 3, y: -1 }).unwrap();

        assert_eq!(args.get::<Spawn>("spawn").unwrap(), Some(Spawn { x: 3, y: -1 }));
    }

    #[test]
    fn get_reports_type_mismatch() {
        let args = EnterArgs::new().with("room", "cellar");
        assert!(args.get::<u32>("room").is_err());
    }

    #[test]
    fn args_serialize_as_plain_object() {
        let args = EnterArgs::new().with("gold", 5);
        let json = serde_json::to_string(&args).unwrap();
        assert_eq!(json, r#"{"gold":5}"#);

        let back: EnterArgs = serde_json::from_str(&json).unwrap();
        assert_eq!(back, args);
    }
}
