// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Schema-driven mapping between XML documents and structured values.
//!
//! A [`schema::TypeSchema`] describes, for one type, which XML tag each field
//! occupies and what shape its value has. The [`de`] module streams a token
//! sequence against such a schema to build a [`value::Value`]; the [`ser`]
//! module walks a value and emits the matching tokens.
//!
//! ```rust
//! use xml_map::schema::{FieldSchema, Registry, ScalarKind, TypeDescriptor, TypeSchema};
//! use xml_map::value::Value;
//!
//! let registry = Registry::new();
//! registry.register(
//!     TypeSchema::new(
//!         "Person",
//!         vec![FieldSchema::new("name", "name", TypeDescriptor::Scalar(ScalarKind::String))],
//!     )
//!     .unwrap(),
//! );
//!
//! let root = TypeDescriptor::Object("Person".to_owned());
//! let value = xml_map::de::read_value(
//!     &b"<person><name>Ada</name><unknown><name>x</name></unknown></person>"[..],
//!     &registry,
//!     &root,
//! )
//! .unwrap();
//! let person = match value {
//!     Value::Object(o) => o,
//!     _ => unreachable!(),
//! };
//! assert_eq!(person.get("name"), Some(&Value::String("Ada".to_owned())));
//!
//! let xml = xml_map::ser::serialize(&person)
//!     .registry(&registry)
//!     .root("person")
//!     .to_string()
//!     .unwrap();
//! assert!(xml.ends_with("<person><name>Ada</name></person>"));
//! ```

pub mod de;
pub mod schema;
pub mod ser;
pub mod token;
pub mod value;

pub use de::{from_str, read};
pub use ser::{serialize, to_string};
pub use value::{Mapped, MappedField, Object, Value};

pub use xml::common::TextPosition;

/// Shorthand for `Box<dyn std::error::Error + 'static>`.
pub type BoxedStdError = Box<dyn std::error::Error + 'static>;
