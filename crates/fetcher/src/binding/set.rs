use serde_json::Value;

use super::KeyBinding;
use crate::error::FetchResult;
use crate::model::ModelType;
use crate::record::RecordCollection;
use crate::value::unique_non_empty;

/// Ordered set of bindings sharing one fetch.
///
/// Bindings are keyed by their source field; adding a binding for a field
/// that is already present replaces the earlier one in place.
#[derive(Debug, Clone, Default)]
pub struct KeyBindingSet {
    bindings: Vec<KeyBinding>,
}

impl KeyBindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(binding: KeyBinding) -> Self {
        let mut set = Self::new();
        set.insert(binding);
        set
    }

    pub fn with(mut self, binding: KeyBinding) -> Self {
        self.insert(binding);
        self
    }

    pub fn insert(&mut self, binding: KeyBinding) {
        let key = binding.source().key().to_string();
        match self.bindings.iter_mut().find(|existing| existing.source().key() == key) {
            Some(existing) => *existing = binding,
            None => self.bindings.push(binding),
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, KeyBinding> {
        self.bindings.iter()
    }

    pub fn get(&self, source_key: &str) -> Option<&KeyBinding> {
        self.bindings.iter().find(|binding| binding.source().key() == source_key)
    }

    /// Union of every binding's keys
    pub fn extract_values(&self, collection: &RecordCollection) -> Vec<Value> {
        unique_non_empty(
            self.bindings
                .iter()
                .flat_map(|binding| binding.extract_values(collection)),
        )
    }

    /// Run every binding against the same linked rows
    pub fn attach(
        &self,
        collection: &mut RecordCollection,
        linked: &[Value],
        linked_key: &str,
    ) -> FetchResult<()> {
        for binding in &self.bindings {
            binding.attach(collection, linked, linked_key)?;
        }
        Ok(())
    }

    /// Cast the linked rows into `model` once, then attach them through
    /// copies of the bindings that do not cast again
    pub fn attach_as_typed(
        &self,
        collection: &mut RecordCollection,
        linked: &[Value],
        linked_key: &str,
        model: &ModelType,
    ) -> FetchResult<()> {
        let typed = model.cast_all(linked.to_vec())?;
        for binding in &self.bindings {
            binding.without_cast().attach(collection, &typed, linked_key)?;
        }
        Ok(())
    }
}

impl FromIterator<KeyBinding> for KeyBindingSet {
    fn from_iter<T: IntoIterator<Item = KeyBinding>>(iter: T) -> Self {
        let mut set = Self::new();
        for binding in iter {
            set.insert(binding);
        }
        set
    }
}

impl<'a> IntoIterator for &'a KeyBindingSet {
    type Item = &'a KeyBinding;
    type IntoIter = std::slice::Iter<'a, KeyBinding>;

    fn into_iter(self) -> Self::IntoIter {
        self.bindings.iter()
    }
}
