//! Content addressing and the host repository capability.
//!
//! The queue never touches articles, terms or menu entries directly. It
//! addresses them with [`ObjectRef`] + [`FieldRef`] and goes through a
//! [`ContentAdapter`] supplied by the host.

pub mod memory;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemoryContent;

/// Identifier of a content object in the host repository.
pub type ObjectId = i64;

/// Kind of content owning a translatable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Post,
    Term,
    MenuItem,
}

impl ObjectType {
    pub const ALL: [ObjectType; 3] = [ObjectType::Post, ObjectType::Term, ObjectType::MenuItem];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Post => "post",
            ObjectType::Term => "term",
            ObjectType::MenuItem => "menu_item",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(ObjectType::Post),
            "term" => Ok(ObjectType::Term),
            "menu_item" | "menu-item" => Ok(ObjectType::MenuItem),
            other => Err(format!("unknown object type '{}'", other)),
        }
    }
}

/// A content object: its kind plus its id in the host repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    pub object_type: ObjectType,
    pub id: ObjectId,
}

impl ObjectRef {
    pub fn new(object_type: ObjectType, id: ObjectId) -> Self {
        Self { object_type, id }
    }

    pub fn post(id: ObjectId) -> Self {
        Self::new(ObjectType::Post, id)
    }

    pub fn term(id: ObjectId) -> Self {
        Self::new(ObjectType::Term, id)
    }

    pub fn menu_item(id: ObjectId) -> Self {
        Self::new(ObjectType::MenuItem, id)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.object_type, self.id)
    }
}

/// Address of a translatable field on a content object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldRef {
    /// A plain attribute such as a title, body or excerpt.
    Attribute { name: String },
    /// A metadata entry addressed by key.
    Meta { key: String },
    /// An attribute of a taxonomy term, qualified by taxonomy name.
    TaxonomyAttr { taxonomy: String, name: String },
}

impl FieldRef {
    pub fn attribute(name: impl Into<String>) -> Self {
        FieldRef::Attribute { name: name.into() }
    }

    pub fn meta(key: impl Into<String>) -> Self {
        FieldRef::Meta { key: key.into() }
    }

    pub fn taxonomy_attr(taxonomy: impl Into<String>, name: impl Into<String>) -> Self {
        FieldRef::TaxonomyAttr {
            taxonomy: taxonomy.into(),
            name: name.into(),
        }
    }

    /// Splits the field into its stored `(kind, name, taxonomy)` columns.
    ///
    /// The taxonomy column is the empty string for non-taxonomy fields so
    /// that the uniqueness index over the job tuple treats them as equal.
    pub fn to_columns(&self) -> (&'static str, &str, &str) {
        match self {
            FieldRef::Attribute { name } => ("attribute", name, ""),
            FieldRef::Meta { key } => ("meta", key, ""),
            FieldRef::TaxonomyAttr { taxonomy, name } => ("taxonomy_attr", name, taxonomy),
        }
    }

    /// Rebuilds a field from its stored columns.
    pub fn from_columns(kind: &str, name: String, taxonomy: String) -> Result<Self, String> {
        match kind {
            "attribute" => Ok(FieldRef::Attribute { name }),
            "meta" => Ok(FieldRef::Meta { key: name }),
            "taxonomy_attr" => Ok(FieldRef::TaxonomyAttr { taxonomy, name }),
            other => Err(format!("unknown field kind '{}'", other)),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRef::Attribute { name } => f.write_str(name),
            FieldRef::Meta { key } => write!(f, "meta:{}", key),
            FieldRef::TaxonomyAttr { taxonomy, name } => write!(f, "{}:{}", taxonomy, name),
        }
    }
}

/// Errors reported by a [`ContentAdapter`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContentError {
    #[error("Content object not found: {0}")]
    NotFound(ObjectRef),

    #[error("Field '{field}' is not available on {object}")]
    UnknownField { object: ObjectRef, field: String },

    #[error("Content backend error: {0}")]
    Backend(String),
}

/// Read/write access to the host content repository.
///
/// Implementations must be safe to share across the scheduler's
/// invocations.
pub trait ContentAdapter: Send + Sync {
    /// Returns the current source text of a field. A field that exists but
    /// holds nothing is returned as an empty string, not an error.
    fn read_field(&self, object: ObjectRef, field: &FieldRef) -> Result<String, ContentError>;

    /// Stores translated text into a field of the given object.
    fn write_field(
        &self,
        object: ObjectRef,
        field: &FieldRef,
        text: &str,
    ) -> Result<(), ContentError>;

    /// Creates the translation counterpart of `source` for `language` and
    /// returns its id. The new object carries its own back-reference.
    fn create_translation(
        &self,
        source: ObjectRef,
        language: &str,
    ) -> Result<ObjectId, ContentError>;

    /// Deletes a translation object that was created but never linked.
    fn discard_translation(&self, translation: ObjectRef) -> Result<(), ContentError>;

    /// Whether the object still exists in the repository.
    fn exists(&self, object: ObjectRef) -> Result<bool, ContentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_type_round_trip() {
        for object_type in ObjectType::ALL {
            assert_eq!(object_type.as_str().parse::<ObjectType>(), Ok(object_type));
        }
        assert_eq!("menu-item".parse::<ObjectType>(), Ok(ObjectType::MenuItem));
        assert!("page".parse::<ObjectType>().is_err());
    }

    #[test]
    fn test_field_columns() {
        let field = FieldRef::taxonomy_attr("category", "description");
        let (kind, name, taxonomy) = field.to_columns();
        assert_eq!((kind, name, taxonomy), ("taxonomy_attr", "description", "category"));

        let rebuilt =
            FieldRef::from_columns(kind, name.to_string(), taxonomy.to_string()).unwrap();
        assert_eq!(rebuilt, field);

        assert_eq!(FieldRef::meta("_seo_title").to_columns().2, "");
        assert!(FieldRef::from_columns("prefix", "x".into(), String::new()).is_err());
    }

    #[test]
    fn test_field_display() {
        assert_eq!(FieldRef::attribute("title").to_string(), "title");
        assert_eq!(FieldRef::meta("subtitle").to_string(), "meta:subtitle");
        assert_eq!(
            FieldRef::taxonomy_attr("product_cat", "name").to_string(),
            "product_cat:name"
        );
        assert_eq!(ObjectRef::menu_item(7).to_string(), "menu_item#7");
    }

    #[test]
    fn test_field_serde_is_tagged() {
        let json = serde_json::to_value(FieldRef::meta("subtitle")).unwrap();
        assert_eq!(json["kind"], "meta");
        assert_eq!(json["key"], "subtitle");
    }
}
