// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serialization from mapped values to XML.

use std::io::Write;

use log::trace;
use xml::writer::XmlEvent;

use crate::schema::{Registry, SchemaError, TypeDescriptor};
use crate::token::TokenSink;
use crate::value::{Mapped, Object, Value};

/// An error while serializing.
#[derive(Clone, Debug)]
pub enum Error {
    Schema(SchemaError),

    /// A value whose kind doesn't match its field's descriptor.
    Mismatch {
        tag: String,
        expected: String,
        found: &'static str,
    },

    /// A failure reported by the token sink or underlying writer.
    Writer(String),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Schema(e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Error::Schema(e) => e.fmt(f),
            Error::Mismatch {
                tag,
                expected,
                found,
            } => write!(f, "<{}> expects {}, found {}", tag, expected, found),
            Error::Writer(msg) => msg.fmt(f),
        }
    }
}

impl From<SchemaError> for Error {
    fn from(e: SchemaError) -> Self {
        Error::Schema(e)
    }
}

/// A [`TokenSink`] over an `xml-rs` writer.
struct WrappedWriter<W: Write> {
    inner: xml::writer::EventWriter<W>,

    /// When `Some`, all future writes and the overall operation should fail with this error.
    poison: Option<String>,
}

impl<W: Write> WrappedWriter<W> {
    fn write(&mut self, event: XmlEvent) -> Result<(), crate::BoxedStdError> {
        if let Some(ref poison) = self.poison {
            return Err(poison.clone().into());
        }
        if let Err(e) = self.inner.write(event) {
            let msg = e.to_string();
            self.poison = Some(msg.clone());
            return Err(msg.into());
        }
        Ok(())
    }
}

impl<W: Write> TokenSink for WrappedWriter<W> {
    fn start_element(&mut self, name: &str) -> Result<(), crate::BoxedStdError> {
        self.write(XmlEvent::start_element(name).into())
    }

    fn end_element(&mut self, name: &str) -> Result<(), crate::BoxedStdError> {
        self.write(XmlEvent::end_element().name(name).into())
    }

    fn text(&mut self, text: &str) -> Result<(), crate::BoxedStdError> {
        self.write(XmlEvent::characters(text))
    }

    fn cdata(&mut self, text: &str) -> Result<(), crate::BoxedStdError> {
        self.write(XmlEvent::cdata(text))
    }
}

/// Serializer for an object and its root tag; returned by [`serialize`].
#[derive(Copy, Clone)]
pub struct Serializer<'a> {
    object: &'a Object,
    root: Option<&'a str>,
    registry: &'a Registry,
    perform_indent: bool,
}

impl<'a> Serializer<'a> {
    /// Encloses the fields in an element with the given name.
    ///
    /// Without a root, the fields are written at top level, which suits
    /// embedding in a larger document via [`Serializer::to_sink`].
    #[inline]
    pub fn root(self, root: &'a str) -> Self {
        Self {
            root: Some(root),
            ..self
        }
    }

    /// Uses the given registry rather than [`Registry::global`].
    #[inline]
    pub fn registry(self, registry: &'a Registry) -> Self {
        Self { registry, ..self }
    }

    /// Sets if the output should be indented; defaults to false.
    #[inline]
    pub fn perform_indent(self, perform_indent: bool) -> Self {
        Self {
            perform_indent,
            ..self
        }
    }

    /// Emits tokens to the given sink.
    pub fn to_sink(self, sink: &mut dyn TokenSink) -> Result<(), Error> {
        let mut w = Emitter {
            sink,
            registry: self.registry,
        };
        match self.root {
            Some(root) => {
                w.start(root)?;
                w.fields(self.object)?;
                w.end(root)
            }
            None => w.fields(self.object),
        }
    }

    /// Serializes to any `Write` impl, starting with an XML declaration.
    pub fn to<W: Write>(self, writer: W) -> Result<(), Error> {
        let mut writer = WrappedWriter {
            inner: xml::writer::EventWriter::new_with_config(
                writer,
                xml::writer::EmitterConfig::new().perform_indent(self.perform_indent),
            ),
            poison: None,
        };
        writer
            .write(XmlEvent::StartDocument {
                version: xml::common::XmlVersion::Version10,
                encoding: Some("utf-8"),
                standalone: None,
            })
            .map_err(|e| Error::Writer(e.to_string()))?;
        self.to_sink(&mut writer)
    }

    /// Serializes to a `String`.
    pub fn to_string(self) -> Result<String, Error> {
        let mut out = Vec::new();
        self.to(&mut out)?;
        String::from_utf8(out).map_err(|e| Error::Writer(e.to_string()))
    }
}

/// Serializes the given object's fields, as described by the schema of its type.
///
/// Nested objects are written with the schemas of their own type names.
#[inline]
pub fn serialize(object: &Object) -> Serializer {
    Serializer {
        object,
        root: None,
        registry: Registry::global(),
        perform_indent: false,
    }
}

/// Serializes a mapped value to a `String`, registering its type with
/// [`Registry::global`] first.
pub fn to_string<T: Mapped>(value: &T, root: Option<&str>) -> Result<String, Error> {
    Registry::global().register_type::<T>()?;
    let object = value.to_object();
    let s = serialize(&object);
    match root {
        Some(root) => s.root(root).to_string(),
        None => s.to_string(),
    }
}

/// Walks values, writing their tokens to `sink`.
struct Emitter<'a> {
    sink: &'a mut dyn TokenSink,
    registry: &'a Registry,
}

impl Emitter<'_> {
    fn start(&mut self, name: &str) -> Result<(), Error> {
        trace!("writing <{}>", name);
        self.sink
            .start_element(name)
            .map_err(|e| Error::Writer(e.to_string()))
    }

    fn end(&mut self, name: &str) -> Result<(), Error> {
        self.sink
            .end_element(name)
            .map_err(|e| Error::Writer(e.to_string()))
    }

    /// Writes each present field of `object` in declaration order.
    fn fields(&mut self, object: &Object) -> Result<(), Error> {
        let schema = self.registry.lookup(object.type_name())?;
        for field in schema.fields() {
            let value = match object.get(&field.name) {
                Some(v) => v,
                None => continue,
            };
            match &field.descriptor {
                TypeDescriptor::List { element, item_tag } => {
                    let items = match value {
                        Value::List(items) => items,
                        v => return Err(mismatch(&field.xml_tag, &field.descriptor, v)),
                    };
                    for item in items {
                        self.element(item_tag, element, item, field.cdata)?;
                    }
                }
                d => self.element(&field.xml_tag, d, value, field.cdata)?,
            }
        }
        Ok(())
    }

    fn element(
        &mut self,
        tag: &str,
        descriptor: &TypeDescriptor,
        value: &Value,
        cdata: bool,
    ) -> Result<(), Error> {
        let text = match (descriptor, value) {
            (TypeDescriptor::Object(_), Value::Object(o)) => {
                self.start(tag)?;
                self.fields(o)?;
                return self.end(tag);
            }
            (TypeDescriptor::Scalar(kind), v) if kind.name() == v.kind_name() => format_scalar(v),
            (TypeDescriptor::DateTime, Value::DateTime(d)) => {
                d.format(crate::de::DATE_TIME_FORMAT).to_string()
            }
            (d, v) => return Err(mismatch(tag, d, v)),
        };
        self.start(tag)?;
        let r = if cdata {
            cdata_sections(&text).try_for_each(|s| self.sink.cdata(s))
        } else {
            self.sink.text(&text)
        };
        r.map_err(|e| Error::Writer(e.to_string()))?;
        self.end(tag)
    }
}

fn mismatch(tag: &str, descriptor: &TypeDescriptor, value: &Value) -> Error {
    Error::Mismatch {
        tag: tag.to_owned(),
        expected: descriptor.describe().to_owned(),
        found: value.kind_name(),
    }
}

fn format_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Double(d) => d.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::DateTime(d) => d.format(crate::de::DATE_TIME_FORMAT).to_string(),
        Value::Object(_) | Value::List(_) => String::new(),
    }
}

/// Splits `text` so that no piece contains `]]>`.
///
/// Each occurrence is cut between `]]` and `>`, so the pieces concatenate to
/// the original text.
fn cdata_sections(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = Some(text);
    std::iter::from_fn(move || {
        let r = rest?;
        match r.find("]]>") {
            Some(i) => {
                rest = Some(&r[i + 2..]);
                Some(&r[..i + 2])
            }
            None => {
                rest = None;
                Some(r)
            }
        }
    })
}
