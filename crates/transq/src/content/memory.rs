//! In-memory content repository.
//!
//! Useful for embedding the queue in tools that hold content in memory,
//! and as the content backend of the test suite.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::{ContentAdapter, ContentError, FieldRef, ObjectId, ObjectRef};

#[derive(Default)]
struct Inner {
    objects: HashSet<ObjectRef>,
    fields: HashMap<(ObjectRef, FieldRef), String>,
    /// translation object -> (source object, language)
    translation_of: HashMap<ObjectRef, (ObjectRef, String)>,
    next_id: ObjectId,
}

/// A [`ContentAdapter`] backed by hash maps.
pub struct MemoryContent {
    inner: RwLock<Inner>,
}

impl MemoryContent {
    /// Ids handed out by `create_translation` start here so they never
    /// collide with hand-picked source ids in tests.
    const FIRST_GENERATED_ID: ObjectId = 100_000;

    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                next_id: Self::FIRST_GENERATED_ID,
                ..Default::default()
            }),
        }
    }

    /// Sets a field, creating the object if needed.
    pub fn set_field(&self, object: ObjectRef, field: FieldRef, text: impl Into<String>) {
        let mut inner = self.write();
        inner.objects.insert(object);
        inner.fields.insert((object, field), text.into());
    }

    /// Returns a field's current value, if the object and field exist.
    pub fn field(&self, object: ObjectRef, field: &FieldRef) -> Option<String> {
        self.read().fields.get(&(object, field.clone())).cloned()
    }

    /// Removes an object and all its fields.
    pub fn remove_object(&self, object: ObjectRef) {
        let mut inner = self.write();
        inner.objects.remove(&object);
        inner.fields.retain(|(o, _), _| *o != object);
        inner.translation_of.remove(&object);
    }

    /// Returns the `(source, language)` back-reference of a translation object.
    pub fn source_of(&self, translation: ObjectRef) -> Option<(ObjectRef, String)> {
        self.read().translation_of.get(&translation).cloned()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        // A panic while holding the lock leaves plain data behind; keep serving it.
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryContent {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentAdapter for MemoryContent {
    fn read_field(&self, object: ObjectRef, field: &FieldRef) -> Result<String, ContentError> {
        let inner = self.read();
        if !inner.objects.contains(&object) {
            return Err(ContentError::NotFound(object));
        }
        Ok(inner
            .fields
            .get(&(object, field.clone()))
            .cloned()
            .unwrap_or_default())
    }

    fn write_field(
        &self,
        object: ObjectRef,
        field: &FieldRef,
        text: &str,
    ) -> Result<(), ContentError> {
        let mut inner = self.write();
        if !inner.objects.contains(&object) {
            return Err(ContentError::NotFound(object));
        }
        inner.fields.insert((object, field.clone()), text.to_string());
        Ok(())
    }

    fn create_translation(
        &self,
        source: ObjectRef,
        language: &str,
    ) -> Result<ObjectId, ContentError> {
        let mut inner = self.write();
        if !inner.objects.contains(&source) {
            return Err(ContentError::NotFound(source));
        }
        let id = inner.next_id;
        inner.next_id += 1;
        let translation = ObjectRef::new(source.object_type, id);
        inner.objects.insert(translation);
        inner
            .translation_of
            .insert(translation, (source, language.to_string()));
        Ok(id)
    }

    fn discard_translation(&self, translation: ObjectRef) -> Result<(), ContentError> {
        if !self.read().translation_of.contains_key(&translation) {
            return Err(ContentError::NotFound(translation));
        }
        self.remove_object(translation);
        Ok(())
    }

    fn exists(&self, object: ObjectRef) -> Result<bool, ContentError> {
        Ok(self.read().objects.contains(&object))
    }
}
