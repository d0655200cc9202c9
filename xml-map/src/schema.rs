// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Static description of how a type's fields correspond to XML tags.

use std::collections::{hash_map::Entry, HashMap};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use log::debug;

use crate::value::Mapped;

/// The kinds of scalar text values a field may hold.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum ScalarKind {
    /// Stored as [`String`].
    String,

    /// Stored as [`i64`].
    Int,

    /// Stored as [`f32`].
    Float,

    /// Stored as [`f64`].
    Double,

    /// Stored as [`bool`].
    Bool,
}

impl ScalarKind {
    /// Returns the kind spelled `name` in a type annotation, if any.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(ScalarKind::String),
            "int" => Some(ScalarKind::Int),
            "float" => Some(ScalarKind::Float),
            "double" => Some(ScalarKind::Double),
            "bool" => Some(ScalarKind::Bool),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::String => "string",
            ScalarKind::Int => "int",
            ScalarKind::Float => "float",
            ScalarKind::Double => "double",
            ScalarKind::Bool => "bool",
        }
    }
}

/// The shape of a field's value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TypeDescriptor {
    Scalar(ScalarKind),

    /// A local timestamp written as `YYYY-MM-DDThh:mm:ss`.
    DateTime,

    /// A nested type, named by its key in the [`Registry`].
    Object(String),

    /// A sequence of values, each wrapped individually in `item_tag`.
    ///
    /// There is no element for the list itself: items sit at the level the
    /// field would otherwise occupy.
    List {
        element: Box<TypeDescriptor>,
        item_tag: String,
    },
}

impl TypeDescriptor {
    /// Short description for error messages.
    pub fn describe(&self) -> &str {
        match self {
            TypeDescriptor::Scalar(k) => k.name(),
            TypeDescriptor::DateTime => "DateTime",
            TypeDescriptor::Object(name) => name,
            TypeDescriptor::List { .. } => "list",
        }
    }
}

/// One mapped field of a type.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldSchema {
    /// The field's key within a [`crate::value::Object`].
    pub name: String,
    pub xml_tag: String,
    pub descriptor: TypeDescriptor,

    /// Write text as a CDATA section rather than escaped character data.
    pub cdata: bool,
}

impl FieldSchema {
    pub fn new(
        name: impl Into<String>,
        xml_tag: impl Into<String>,
        descriptor: TypeDescriptor,
    ) -> Self {
        FieldSchema {
            name: name.into(),
            xml_tag: xml_tag.into(),
            descriptor,
            cdata: false,
        }
    }

    #[inline]
    pub fn with_cdata(self, cdata: bool) -> Self {
        FieldSchema { cdata, ..self }
    }

    /// Returns the element name this field reads and writes.
    ///
    /// This is `xml_tag`, except for lists, where each item carries `item_tag`.
    pub fn element_tag(&self) -> &str {
        match &self.descriptor {
            TypeDescriptor::List { item_tag, .. } => item_tag,
            _ => &self.xml_tag,
        }
    }
}

/// Ordered field mappings for one type.
///
/// Declaration order is output order.
#[derive(Clone, Debug)]
pub struct TypeSchema {
    type_name: String,
    fields: Vec<FieldSchema>,

    /// Element tag to index within `fields`; the first declaration wins.
    by_tag: HashMap<String, usize>,
}

impl TypeSchema {
    pub fn new(
        type_name: impl Into<String>,
        fields: Vec<FieldSchema>,
    ) -> Result<Self, SchemaError> {
        let type_name = type_name.into();
        let mut by_tag = HashMap::with_capacity(fields.len());
        for (i, f) in fields.iter().enumerate() {
            if f.xml_tag.is_empty() || f.element_tag().is_empty() {
                return Err(SchemaError::EmptyTag {
                    type_name,
                    field: f.name.clone(),
                });
            }
            if let TypeDescriptor::List { element, .. } = &f.descriptor {
                if matches!(**element, TypeDescriptor::List { .. }) {
                    return Err(SchemaError::NestedList {
                        type_name,
                        field: f.name.clone(),
                    });
                }
            }
            by_tag.entry(f.element_tag().to_owned()).or_insert(i);
        }
        Ok(TypeSchema {
            type_name,
            fields,
            by_tag,
        })
    }

    /// Starts a schema built field by field.
    pub fn builder(type_name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    #[inline]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[inline]
    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    /// Finds the field read from elements named `tag`. Case-sensitive.
    pub fn field(&self, tag: &str) -> Option<&FieldSchema> {
        self.by_tag.get(tag).map(|&i| &self.fields[i])
    }
}

/// Incremental construction of a [`TypeSchema`]; see [`TypeSchema::builder`].
pub struct SchemaBuilder {
    type_name: String,
    fields: Vec<FieldSchema>,
}

impl SchemaBuilder {
    pub fn field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds a field whose type is given as an annotation token such as
    /// `"int"`, `"Address|null"` or `"string[]"`; see [`resolve`].
    pub fn annotated(
        mut self,
        name: &str,
        xml_tag: &str,
        annotation: &str,
        item_tag: Option<&str>,
        cdata: bool,
    ) -> Result<Self, SchemaError> {
        let descriptor = resolve(annotation, item_tag)?;
        self.fields
            .push(FieldSchema::new(name, xml_tag, descriptor).with_cdata(cdata));
        Ok(self)
    }

    pub fn build(self) -> Result<TypeSchema, SchemaError> {
        TypeSchema::new(self.type_name, self.fields)
    }
}

/// Translates a type annotation token into a [`TypeDescriptor`].
///
/// A union such as `Foo|null` collapses to its first alternative, so optional
/// and required fields map the same way. A `[]` suffix makes a list whose
/// items are wrapped in `item_tag`.
///
/// ```rust
/// # use xml_map::schema::{resolve, ScalarKind, TypeDescriptor};
/// assert_eq!(resolve("int|null", None).unwrap(), TypeDescriptor::Scalar(ScalarKind::Int));
/// assert_eq!(
///     resolve("Foo[]", Some("foo")).unwrap(),
///     TypeDescriptor::List {
///         element: Box::new(TypeDescriptor::Object("Foo".to_owned())),
///         item_tag: "foo".to_owned(),
///     },
/// );
/// resolve("Foo[][]", Some("foo")).unwrap_err();
/// ```
pub fn resolve(annotation: &str, item_tag: Option<&str>) -> Result<TypeDescriptor, SchemaError> {
    let ty = annotation.split('|').next().unwrap_or_default().trim();
    if let Some(element) = ty.strip_suffix("[]") {
        if element.ends_with("[]") {
            return Err(SchemaError::Unresolved(annotation.to_owned()));
        }
        let item_tag = match item_tag {
            Some(t) if !t.is_empty() => t,
            _ => return Err(SchemaError::MissingItemTag(annotation.to_owned())),
        };
        let element = resolve_single(element)
            .ok_or_else(|| SchemaError::Unresolved(annotation.to_owned()))?;
        return Ok(TypeDescriptor::List {
            element: Box::new(element),
            item_tag: item_tag.to_owned(),
        });
    }
    resolve_single(ty).ok_or_else(|| SchemaError::Unresolved(annotation.to_owned()))
}

fn resolve_single(name: &str) -> Option<TypeDescriptor> {
    if let Some(kind) = ScalarKind::from_name(name) {
        return Some(TypeDescriptor::Scalar(kind));
    }
    let name = name.trim_start_matches('\\');
    if name == "DateTime" {
        return Some(TypeDescriptor::DateTime);
    }
    let valid = name
        .chars()
        .next()
        .map_or(false, |c| c.is_alphabetic() || c == '_')
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '\\' | ':'));
    if valid {
        Some(TypeDescriptor::Object(name.to_owned()))
    } else {
        None
    }
}

/// Process-wide store of [`TypeSchema`]s keyed by type name.
///
/// Schemas are immutable once registered. Lookups take a read lock, so the
/// registry may be shared freely between concurrent (de)serialization calls;
/// registration is expected to happen up front.
#[derive(Debug, Default)]
pub struct Registry {
    schemas: RwLock<HashMap<String, Arc<TypeSchema>>>,

    /// True for the private registry that collects one `register_type` call's
    /// schemas before they are published together.
    staging: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the registry used by [`crate::from_str`] and [`crate::to_string`].
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::new)
    }

    /// Publishes `schema`, returning false if its type was already registered.
    ///
    /// The existing schema is kept in that case.
    pub fn register(&self, schema: TypeSchema) -> bool {
        let mut l = self
            .schemas
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if l.contains_key(schema.type_name()) {
            return false;
        }
        if !self.staging {
            debug!(
                "registering {} with {} fields",
                schema.type_name(),
                schema.fields().len()
            );
        }
        l.insert(schema.type_name().to_owned(), Arc::new(schema));
        true
    }

    /// Registers `T` and the types of its fields, unless `T` is already present.
    ///
    /// The schemas become visible together: once another thread sees `T`, it
    /// also sees every type `T` refers to.
    pub fn register_type<T: Mapped>(&self) -> Result<(), SchemaError> {
        if self.contains(T::type_name()) {
            return Ok(());
        }
        if self.staging {
            // Add `T` before visiting its fields so recursive types terminate.
            if self.register(T::schema()?) {
                T::register_fields(self)?;
            }
            return Ok(());
        }
        let staged = Registry {
            schemas: RwLock::default(),
            staging: true,
        };
        staged.register_type::<T>()?;
        let staged = staged
            .schemas
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let mut l = self
            .schemas
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for (type_name, schema) in staged {
            if let Entry::Vacant(e) = l.entry(type_name) {
                debug!(
                    "registering {} with {} fields",
                    e.key(),
                    schema.fields().len()
                );
                e.insert(schema);
            }
        }
        Ok(())
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(type_name)
    }

    pub fn lookup(&self, type_name: &str) -> Result<Arc<TypeSchema>, SchemaError> {
        self.schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_name)
            .cloned()
            .ok_or_else(|| SchemaError::NotFound(type_name.to_owned()))
    }
}

/// A problem building or finding a [`TypeSchema`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SchemaError {
    /// No schema is registered for this type name.
    NotFound(String),

    /// A list field whose items are themselves lists.
    NestedList { type_name: String, field: String },

    EmptyTag { type_name: String, field: String },

    /// A `[]` annotation without an item tag.
    MissingItemTag(String),

    /// An annotation that names no scalar, date or object type.
    Unresolved(String),
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaError::NotFound(t) => write!(f, "no schema registered for type {}", t),
            SchemaError::NestedList { type_name, field } => {
                write!(f, "{}.{}: lists of lists are not supported", type_name, field)
            }
            SchemaError::EmptyTag { type_name, field } => {
                write!(f, "{}.{} has an empty XML tag", type_name, field)
            }
            SchemaError::MissingItemTag(a) => write!(f, "list type {:?} needs an item tag", a),
            SchemaError::Unresolved(a) => write!(f, "can't resolve type {:?}", a),
        }
    }
}

impl std::error::Error for SchemaError {}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn string() -> TypeDescriptor {
        TypeDescriptor::Scalar(ScalarKind::String)
    }

    #[test]
    fn resolve_tokens() {
        assert_eq!(resolve("string", None).unwrap(), string());
        assert_eq!(resolve("bool|null", None).unwrap(), TypeDescriptor::Scalar(ScalarKind::Bool));
        assert_eq!(resolve("\\DateTime|null", None).unwrap(), TypeDescriptor::DateTime);
        assert_eq!(
            resolve("Address|null", None).unwrap(),
            TypeDescriptor::Object("Address".to_owned())
        );
        assert_eq!(
            resolve("string[]|null", Some("tag")).unwrap(),
            TypeDescriptor::List {
                element: Box::new(string()),
                item_tag: "tag".to_owned()
            }
        );
        assert_matches!(resolve("Foo[]", None), Err(SchemaError::MissingItemTag(_)));
        assert_matches!(resolve("Foo[][]", Some("x")), Err(SchemaError::Unresolved(_)));
        assert_matches!(resolve("", None), Err(SchemaError::Unresolved(_)));
        assert_matches!(resolve("a b", None), Err(SchemaError::Unresolved(_)));
    }

    #[test]
    fn first_tag_wins() {
        let schema = TypeSchema::new(
            "T",
            vec![
                FieldSchema::new("a", "x", string()),
                FieldSchema::new("b", "x", string()),
            ],
        )
        .unwrap();
        assert_eq!(schema.field("x").unwrap().name, "a");
        assert!(schema.field("X").is_none());
    }

    #[test]
    fn list_fields_match_item_tag() {
        let schema = TypeSchema::builder("Person")
            .annotated("tags", "tags", "string[]", Some("tag"), false)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(schema.field("tag").unwrap().name, "tags");
        assert!(schema.field("tags").is_none());
    }

    #[test]
    fn rejects_nested_lists() {
        let inner = TypeDescriptor::List {
            element: Box::new(string()),
            item_tag: "i".to_owned(),
        };
        let e = TypeSchema::new(
            "T",
            vec![FieldSchema::new(
                "l",
                "l",
                TypeDescriptor::List {
                    element: Box::new(inner),
                    item_tag: "o".to_owned(),
                },
            )],
        )
        .unwrap_err();
        assert_matches!(e, SchemaError::NestedList { ref field, .. } if field == "l");
    }

    #[test]
    fn registry_keeps_first() {
        let r = Registry::new();
        assert_matches!(r.lookup("T"), Err(SchemaError::NotFound(ref t)) if t == "T");
        assert!(r.register(TypeSchema::new("T", vec![FieldSchema::new("a", "a", string())]).unwrap()));
        assert!(!r.register(TypeSchema::new("T", Vec::new()).unwrap()));
        assert_eq!(r.lookup("T").unwrap().fields().len(), 1);
    }
}
