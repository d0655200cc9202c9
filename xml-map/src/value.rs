// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dynamic values produced and consumed by the mapping engines, and the
//! traits bridging them to Rust types.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::schema::{Registry, ScalarKind, SchemaError, TypeDescriptor, TypeSchema};

/// A deserialized value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f32),
    Double(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
    Object(Object),
    List(Vec<Value>),
}

impl Value {
    /// Short description of the variant, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Bool(_) => "bool",
            Value::DateTime(_) => "DateTime",
            Value::Object(_) => "object",
            Value::List(_) => "list",
        }
    }
}

/// An instance of a schema-mapped type.
///
/// Fields are keyed by [`crate::schema::FieldSchema::name`]. A field with no
/// entry is absent: it was not present in the document, or should not be
/// written.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Object {
    type_name: String,
    fields: BTreeMap<String, Value>,
}

impl Object {
    /// Returns an instance with every field absent.
    pub fn new(type_name: impl Into<String>) -> Self {
        Object {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style [`Object::set`].
    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.set(field, value);
        self
    }

    #[inline]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Sets `field`, returning the previous value.
    pub fn set(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(field.into(), value)
    }

    /// Removes and returns `field`.
    pub fn take(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// Appends an item to the list in `field`, creating it if absent.
    pub fn push_item(&mut self, field: &str, item: Value) {
        match self.fields.get_mut(field) {
            Some(Value::List(items)) => items.push(item),
            _ => {
                self.fields.insert(field.to_owned(), Value::List(vec![item]));
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A failure converting between a [`Value`] and a Rust type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValueError(String);

impl ValueError {
    pub fn missing_field(type_name: &str, field: &str) -> Self {
        ValueError(format!("{} is missing required field {}", type_name, field))
    }

    pub fn mismatch(expected: &str, found: &Value) -> Self {
        ValueError(format!("expected {}, found {}", expected, found.kind_name()))
    }

    pub fn out_of_range(value: i64, ty: &str) -> Self {
        ValueError(format!("{} is out of range for {}", value, ty))
    }

    fn in_field(self, type_name: &str, field: &str) -> Self {
        ValueError(format!("{}.{}: {}", type_name, field, self.0))
    }
}

impl std::fmt::Display for ValueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for ValueError {}

/// A Rust type usable as a field of a [`Mapped`] type.
///
/// `Option<T>` maps to an optional field, `Vec<T>` to a list. Typically used
/// only via `xml-map-derive`.
pub trait MappedField: Sized {
    /// Describes this type. `item_tag` is used only by lists.
    fn descriptor(item_tag: &str) -> TypeDescriptor;

    /// Registers the schemas of any nested types.
    #[allow(unused_variables)]
    fn register(registry: &Registry) -> Result<(), SchemaError> {
        Ok(())
    }

    fn from_value(value: Value) -> Result<Self, ValueError>;

    /// Returns the value to write, or `None` if the field is absent.
    fn to_value(&self) -> Option<Value>;

    /// Returns the value used when the element is missing from the document,
    /// or `None` if the field is required.
    fn absent() -> Option<Self> {
        None
    }
}

/// A type described by a [`TypeSchema`].
///
/// Implemented via `xml-map-derive`'s `#[derive(Mapped)]`.
pub trait Mapped: MappedField {
    /// The registry key of this type.
    fn type_name() -> &'static str;

    fn schema() -> Result<TypeSchema, SchemaError>;

    /// Registers the types of this type's fields; see [`Registry::register_type`].
    fn register_fields(registry: &Registry) -> Result<(), SchemaError>;

    fn from_object(object: Object) -> Result<Self, ValueError>;

    fn to_object(&self) -> Object;
}

/// Removes `field` from `object` and converts it, for derived `from_object` impls.
#[doc(hidden)]
pub fn take_field<F: MappedField>(object: &mut Object, field: &str) -> Result<F, ValueError> {
    match object.take(field) {
        Some(v) => F::from_value(v).map_err(|e| e.in_field(object.type_name(), field)),
        None => F::absent().ok_or_else(|| ValueError::missing_field(object.type_name(), field)),
    }
}

/// As [`take_field`], but a missing field yields `F::default()`.
#[doc(hidden)]
pub fn take_field_or_default<F: MappedField + Default>(
    object: &mut Object,
    field: &str,
) -> Result<F, ValueError> {
    match object.take(field) {
        Some(v) => F::from_value(v).map_err(|e| e.in_field(object.type_name(), field)),
        None => Ok(F::default()),
    }
}

macro_rules! scalar_field {
    ( $t:ty, $kind:ident, $variant:ident ) => {
        impl MappedField for $t {
            fn descriptor(_item_tag: &str) -> TypeDescriptor {
                TypeDescriptor::Scalar(ScalarKind::$kind)
            }

            fn from_value(value: Value) -> Result<Self, ValueError> {
                match value {
                    Value::$variant(v) => Ok(v),
                    other => Err(ValueError::mismatch(ScalarKind::$kind.name(), &other)),
                }
            }

            fn to_value(&self) -> Option<Value> {
                Some(Value::$variant(Clone::clone(self)))
            }
        }
    };
}

scalar_field!(String, String, String);
scalar_field!(i64, Int, Int);
scalar_field!(f32, Float, Float);
scalar_field!(f64, Double, Double);
scalar_field!(bool, Bool, Bool);

impl MappedField for i32 {
    fn descriptor(_item_tag: &str) -> TypeDescriptor {
        TypeDescriptor::Scalar(ScalarKind::Int)
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Int(v) => i32::try_from(v).map_err(|_| ValueError::out_of_range(v, "i32")),
            other => Err(ValueError::mismatch("int", &other)),
        }
    }

    fn to_value(&self) -> Option<Value> {
        Some(Value::Int(i64::from(*self)))
    }
}

impl MappedField for NaiveDateTime {
    fn descriptor(_item_tag: &str) -> TypeDescriptor {
        TypeDescriptor::DateTime
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::DateTime(v) => Ok(v),
            other => Err(ValueError::mismatch("DateTime", &other)),
        }
    }

    fn to_value(&self) -> Option<Value> {
        Some(Value::DateTime(*self))
    }
}

impl<T: MappedField> MappedField for Option<T> {
    fn descriptor(item_tag: &str) -> TypeDescriptor {
        T::descriptor(item_tag)
    }

    fn register(registry: &Registry) -> Result<(), SchemaError> {
        T::register(registry)
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        T::from_value(value).map(Some)
    }

    fn to_value(&self) -> Option<Value> {
        self.as_ref().and_then(T::to_value)
    }

    fn absent() -> Option<Self> {
        Some(None)
    }
}

impl<T: MappedField> MappedField for Vec<T> {
    fn descriptor(item_tag: &str) -> TypeDescriptor {
        TypeDescriptor::List {
            element: Box::new(T::descriptor(item_tag)),
            item_tag: item_tag.to_owned(),
        }
    }

    fn register(registry: &Registry) -> Result<(), SchemaError> {
        T::register(registry)
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(ValueError::mismatch("list", &other)),
        }
    }

    /// An empty `Vec` is written as zero items, not omitted as absent.
    fn to_value(&self) -> Option<Value> {
        Some(Value::List(self.iter().filter_map(T::to_value).collect()))
    }

    fn absent() -> Option<Self> {
        Some(Vec::new())
    }
}

impl<T: MappedField> MappedField for Box<T> {
    fn descriptor(item_tag: &str) -> TypeDescriptor {
        T::descriptor(item_tag)
    }

    fn register(registry: &Registry) -> Result<(), SchemaError> {
        T::register(registry)
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        T::from_value(value).map(Box::new)
    }

    fn to_value(&self) -> Option<Value> {
        (**self).to_value()
    }

    fn absent() -> Option<Self> {
        T::absent().map(Box::new)
    }
}
