// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deserialization from XML to mapped values.

use std::sync::Arc;

use log::trace;
use xml::{
    common::{Position, TextPosition},
    reader::{ParserConfig, XmlEvent},
};

use crate::schema::{Registry, ScalarKind, SchemaError, TypeDescriptor, TypeSchema};
use crate::token::{Token, TokenSource};
use crate::value::{Mapped, Object, Value, ValueError};

mod text;

pub use text::{parse_date_time, parse_scalar};
pub(crate) use text::DATE_TIME_FORMAT;

/// A single element in the tag-path stack; see [`Error::stack`].
#[derive(Clone, Debug)]
pub struct StackElement {
    pub name: String,

    /// The position of this element's start within the underlying document, if known.
    pub pos: Option<TextPosition>,
}

/// An error encountered while deserializing.
///
/// This type's `Display` impl will show the error encountered and the XML
/// element stack, printing the name and line:column of each element. E.g.:
///
/// ```text
/// can't convert "x" in <age>: invalid digit found in string @ 3:22
///
/// XML element stack:
///    1: <age> @ 3:17
///    0: <person> @ 1:1
/// ```
///
/// Cloning an `Error` is cheap.
#[derive(Clone, Debug)]
pub struct Error(Arc<ErrorInner>);

impl Error {
    fn new(kind: ErrorKind, stack: &[StackElement], pos: Option<TextPosition>) -> Self {
        Error(Arc::new(ErrorInner {
            kind,
            stack: stack.to_vec(),
            pos,
        }))
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.0.kind
    }

    /// Returns the stack of XML elements as of when this error occurred.
    ///
    /// `stack()[0]` is the root; `stack.last()` is the current element.
    pub fn stack(&self) -> &[StackElement] {
        &self.0.stack
    }

    pub fn position(&self) -> Option<TextPosition> {
        self.0.pos
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = &*self.0;
        inner.kind.fmt(f)?;
        if let Some(pos) = inner.pos {
            write!(f, " @ {}", pos)?;
        }
        if !inner.stack.is_empty() {
            write!(f, "\n\nXML element stack:\n")?;
            for (i, element) in inner.stack.iter().enumerate().rev() {
                write!(f, "{:4x}: <{}>", i, element.name)?;
                if let Some(pos) = element.pos {
                    write!(f, " @ {}", pos)?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.kind.source()
    }
}

/// Information about an error, which should be enclosed in an `Arc` to make cloning cheap.
#[derive(Debug)]
struct ErrorInner {
    kind: ErrorKind,
    stack: Vec<StackElement>,
    pos: Option<TextPosition>,
}

/// The cause of an [`Error`].
#[derive(Debug)]
pub enum ErrorKind {
    /// An error produced by the token source, including I/O and syntax errors.
    Source(crate::BoxedStdError),

    /// A type with no registered schema, or an invalid schema.
    Schema(SchemaError),

    /// Element text that isn't valid for the field's scalar kind.
    Conversion {
        tag: String,
        text: String,
        source: crate::BoxedStdError,
    },

    /// Element text that matches neither accepted date format.
    DateParse {
        tag: String,
        text: String,
        source: chrono::ParseError,
    },

    /// A value that doesn't fit the requested Rust type.
    Value(ValueError),

    Msg(String),
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Source(e) => e.fmt(f),
            ErrorKind::Schema(e) => e.fmt(f),
            ErrorKind::Conversion { tag, text, source } => {
                write!(f, "can't convert {:?} in <{}>: {}", text, tag, source)
            }
            ErrorKind::DateParse { tag, text, source } => {
                write!(f, "invalid date {:?} in <{}>: {}", text, tag, source)
            }
            ErrorKind::Value(e) => e.fmt(f),
            ErrorKind::Msg(msg) => msg.fmt(f),
        }
    }
}

impl std::error::Error for ErrorKind {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ErrorKind::Source(e) => Some(e.as_ref()),
            ErrorKind::Schema(e) => Some(e),
            ErrorKind::Conversion { source, .. } => Some(source.as_ref()),
            ErrorKind::DateParse { source, .. } => Some(source),
            ErrorKind::Value(e) => Some(e),
            ErrorKind::Msg(_) => None,
        }
    }
}

/// Reads and returns the root element of the given XML document as a `T`.
///
/// `T` and the types of its fields are registered with [`Registry::global`]
/// first. The root element's name is not checked.
pub fn read<R: std::io::Read, T: Mapped>(source: R) -> Result<T, Error> {
    let registry = Registry::global();
    registry
        .register_type::<T>()
        .map_err(|e| Error::new(ErrorKind::Schema(e), &[], None))?;
    let root = TypeDescriptor::Object(T::type_name().to_owned());
    let value = read_value(source, registry, &root)?;
    T::from_value(value).map_err(|e| Error::new(ErrorKind::Value(e), &[], None))
}

/// Returns the root element of the given XML document enclosed in a string.
///
/// This is simply `read(source.as_bytes())`; it's common enough to a merit a
/// convenience method.
///
/// See [`read`].
#[inline]
pub fn from_str<T: Mapped>(source: &str) -> Result<T, Error> {
    read(source.as_bytes())
}

/// Reads the root element of the given XML document as described by `root`.
pub fn read_value<R: std::io::Read>(
    source: R,
    registry: &Registry,
    root: &TypeDescriptor,
) -> Result<Value, Error> {
    deserialize(&mut Reader::new(source), registry, root)
}

/// Deserializes the root element of `tokens` as described by `root`.
///
/// The root may be of any kind. With a list descriptor the root element is
/// the container, and each of its `item_tag` children is one item.
pub fn deserialize(
    tokens: &mut dyn TokenSource,
    registry: &Registry,
    root: &TypeDescriptor,
) -> Result<Value, Error> {
    let mut cursor = Cursor {
        source: tokens,
        registry,
        stack: Vec::new(),
    };
    let value = cursor.root(root)?;
    cursor.end()?;
    Ok(value)
}

/// Adapts an `xml-rs` reader to a [`TokenSource`].
///
/// `xml-rs` reports `<a/>` as a start followed by an end, so this looks one
/// event ahead: an element whose end immediately follows its start (`<a/>`
/// or `<a></a>`) is returned as a single empty [`Token::StartElement`].
pub struct Reader<R: std::io::Read> {
    inner: xml::reader::EventReader<R>,

    /// An event read ahead, with its position.
    peeked: Option<(XmlEvent, TextPosition)>,

    /// The position of the event behind the most recently returned token.
    pos: TextPosition,
    done: bool,
}

impl<R: std::io::Read> Reader<R> {
    pub fn new(source: R) -> Self {
        Self::with_config(
            source,
            ParserConfig::new()
                .trim_whitespace(false)
                .whitespace_to_characters(true)
                .cdata_to_characters(true)
                .coalesce_characters(true)
                .ignore_comments(true),
        )
    }

    pub fn with_config(source: R, config: ParserConfig) -> Self {
        Self {
            inner: xml::reader::EventReader::new_with_config(source, config),
            peeked: None,
            pos: TextPosition::new(),
            done: false,
        }
    }

    fn next_event(&mut self) -> Result<(XmlEvent, TextPosition), xml::reader::Error> {
        match self.peeked.take() {
            Some(p) => Ok(p),
            None => {
                let e = self.inner.next()?;
                Ok((e, self.inner.position()))
            }
        }
    }
}

impl<R: std::io::Read> TokenSource for Reader<R> {
    fn next_token(&mut self) -> Result<Option<Token>, crate::BoxedStdError> {
        while !self.done {
            let (event, pos) = self.next_event()?;
            self.pos = pos;
            match event {
                XmlEvent::StartElement { name, .. } => {
                    let following = loop {
                        match self.inner.next()? {
                            XmlEvent::Comment(_) | XmlEvent::ProcessingInstruction { .. } => {}
                            e => break e,
                        }
                    };
                    let empty = matches!(following, XmlEvent::EndElement { .. });
                    if !empty {
                        self.peeked = Some((following, self.inner.position()));
                    }
                    return Ok(Some(Token::StartElement {
                        name: name.local_name,
                        empty,
                    }));
                }
                XmlEvent::EndElement { name } => {
                    return Ok(Some(Token::EndElement {
                        name: name.local_name,
                    }))
                }
                XmlEvent::Characters(s) | XmlEvent::Whitespace(s) => {
                    return Ok(Some(Token::Text(s)))
                }
                XmlEvent::CData(s) => return Ok(Some(Token::CData(s))),
                XmlEvent::EndDocument => self.done = true,
                _ => {}
            }
        }
        Ok(None)
    }

    fn position(&self) -> Option<TextPosition> {
        Some(self.pos)
    }
}

/// How [`Cursor::descend`] treats the children of the current element.
enum Mode<'s> {
    /// Children are fields of `object`, as described by `schema`.
    Object {
        schema: &'s TypeSchema,
        object: Object,
    },

    /// Children named `item_tag` are list items.
    List {
        element: &'s TypeDescriptor,
        item_tag: &'s str,
        items: Vec<Value>,
    },
}

impl Mode<'_> {
    fn into_value(self) -> Value {
        match self {
            Mode::Object { object, .. } => Value::Object(object),
            Mode::List { items, .. } => Value::List(items),
        }
    }
}

/// Walks a token stream, tracking the tag-path stack.
///
/// Every content-reading method is entered with its element on top of the
/// stack, and returns having consumed that element's end and popped it.
struct Cursor<'a> {
    source: &'a mut dyn TokenSource,
    registry: &'a Registry,
    stack: Vec<StackElement>,
}

impl<'a> Cursor<'a> {
    fn next(&mut self) -> Result<Option<Token>, Error> {
        match self.source.next_token() {
            Ok(t) => Ok(t),
            Err(e) => Err(self.error(ErrorKind::Source(e))),
        }
    }

    fn error(&self, kind: ErrorKind) -> Error {
        Error::new(kind, &self.stack, self.source.position())
    }

    fn msg(&self, msg: String) -> Error {
        self.error(ErrorKind::Msg(msg))
    }

    fn unexpected_eof(&self) -> Error {
        self.msg("unexpected end of token stream".to_owned())
    }

    fn push(&mut self, name: String) {
        trace!("Starting {}, new depth {}", &name, self.stack.len() + 1);
        let pos = self.source.position();
        self.stack.push(StackElement { name, pos });
    }

    /// Checks that `name` closes the element on top of the stack.
    fn check_end(&self, name: &str) -> Result<(), Error> {
        match self.stack.last() {
            Some(top) if top.name == name => Ok(()),
            Some(top) => Err(self.msg(format!(
                "end element </{}> doesn't match <{}>",
                name, &top.name
            ))),
            None => Err(self.msg(format!("unexpected end element </{}>", name))),
        }
    }

    fn pop(&mut self, name: &str) -> Result<(), Error> {
        self.check_end(name)?;
        trace!("Ending {}, new depth {}", name, self.stack.len() - 1);
        self.stack.pop();
        Ok(())
    }

    fn root(&mut self, descriptor: &TypeDescriptor) -> Result<Value, Error> {
        let (name, empty) = loop {
            match self.next()? {
                Some(Token::StartElement { name, empty }) => break (name, empty),
                Some(Token::Text(_)) | Some(Token::CData(_)) => {}
                Some(Token::EndElement { name }) => {
                    return Err(self.msg(format!("unexpected end element </{}>", name)))
                }
                None => return Err(self.msg("missing root element".to_owned())),
            }
        };
        if !empty {
            self.push(name);
            return self.content(descriptor);
        }
        self.push(name);
        let value = self.empty_content(descriptor)?;
        self.stack.pop();
        Ok(value)
    }

    /// Ensures nothing but text follows the root element.
    fn end(&mut self) -> Result<(), Error> {
        loop {
            match self.next()? {
                None => return Ok(()),
                Some(Token::Text(_)) | Some(Token::CData(_)) => {}
                Some(t) => return Err(self.msg(format!("expected end of document, got {:?}", t))),
            }
        }
    }

    /// Reads the content of the element on top of the stack as `descriptor`.
    fn content(&mut self, descriptor: &TypeDescriptor) -> Result<Value, Error> {
        let value = match descriptor {
            TypeDescriptor::Scalar(kind) => {
                let text = self.read_text()?;
                self.convert(*kind, text)?
            }
            TypeDescriptor::DateTime => {
                let text = self.read_text()?;
                self.convert_date(text)?
            }
            TypeDescriptor::Object(type_name) => {
                let schema = self.schema(type_name)?;
                return self.descend(Mode::Object {
                    schema: &*schema,
                    object: Object::new(type_name.as_str()),
                });
            }
            TypeDescriptor::List { element, item_tag } => {
                return self.descend(Mode::List {
                    element: &**element,
                    item_tag: item_tag.as_str(),
                    items: Vec::new(),
                });
            }
        };
        trace!("Ending {}, new depth {}", self.current(), self.stack.len() - 1);
        self.stack.pop();
        Ok(value)
    }

    /// As [`Cursor::content`] for an empty element, which has no end token.
    fn empty_content(&mut self, descriptor: &TypeDescriptor) -> Result<Value, Error> {
        match descriptor {
            TypeDescriptor::Scalar(kind) => self.convert(*kind, String::new()),
            TypeDescriptor::DateTime => self.convert_date(String::new()),
            TypeDescriptor::Object(type_name) => {
                self.schema(type_name)?;
                Ok(Value::Object(Object::new(type_name.as_str())))
            }
            TypeDescriptor::List { .. } => Ok(Value::List(Vec::new())),
        }
    }

    fn current(&self) -> &str {
        self.stack.last().map_or("", |e| &e.name)
    }

    fn schema(&self, type_name: &str) -> Result<Arc<TypeSchema>, Error> {
        self.registry
            .lookup(type_name)
            .map_err(|e| self.error(ErrorKind::Schema(e)))
    }

    fn convert(&self, kind: ScalarKind, text: String) -> Result<Value, Error> {
        parse_scalar(kind, &text).map_err(|source| {
            self.error(ErrorKind::Conversion {
                tag: self.current().to_owned(),
                text,
                source,
            })
        })
    }

    fn convert_date(&self, text: String) -> Result<Value, Error> {
        parse_date_time(&text).map(Value::DateTime).map_err(|source| {
            self.error(ErrorKind::DateParse {
                tag: self.current().to_owned(),
                text,
                source,
            })
        })
    }

    /// Accumulates all text within the current element, including descendants.
    ///
    /// Stops at the element's end token, leaving the element on the stack.
    fn read_text(&mut self) -> Result<String, Error> {
        let depth = self.stack.len();
        let mut out = String::new();
        loop {
            match self.next()? {
                Some(Token::Text(s)) | Some(Token::CData(s)) => {
                    if out.is_empty() {
                        out = s;
                    } else {
                        out.push_str(&s);
                    }
                }
                Some(Token::StartElement { name, empty: false }) => self.push(name),
                Some(Token::StartElement { empty: true, .. }) => {}
                Some(Token::EndElement { name }) if self.stack.len() == depth => {
                    self.check_end(&name)?;
                    return Ok(out);
                }
                Some(Token::EndElement { name }) => self.pop(&name)?,
                None => return Err(self.unexpected_eof()),
            }
        }
    }

    /// Reads the children of the current element according to `mode`.
    ///
    /// Only direct children are matched. Anything else, including the
    /// subtrees of unmatched children, is walked past without being stored.
    fn descend(&mut self, mut mode: Mode<'_>) -> Result<Value, Error> {
        let depth = self.stack.len();
        loop {
            match self.next()? {
                Some(Token::StartElement { name, empty }) => {
                    if self.stack.len() != depth {
                        if !empty {
                            self.push(name);
                        }
                        continue;
                    }
                    self.push(name.clone());
                    match &mut mode {
                        Mode::Object { schema, object } => match schema.field(&name) {
                            Some(field) => match &field.descriptor {
                                TypeDescriptor::List { element, .. } => {
                                    if let Some(item) = self.child(element, empty)? {
                                        object.push_item(&field.name, item);
                                    }
                                }
                                d => {
                                    if let Some(value) = self.child(d, empty)? {
                                        object.set(field.name.as_str(), value);
                                    }
                                }
                            },
                            None => {
                                trace!("Ignoring unmapped {} in {}", &name, schema.type_name());
                                self.skip_empty(empty);
                            }
                        },
                        Mode::List {
                            element,
                            item_tag,
                            items,
                        } => {
                            if name == *item_tag {
                                if let Some(item) = self.child(*element, empty)? {
                                    items.push(item);
                                }
                            } else {
                                trace!("Ignoring {} in list of {}", &name, item_tag);
                                self.skip_empty(empty);
                            }
                        }
                    }
                }
                Some(Token::EndElement { name }) if self.stack.len() == depth => {
                    self.pop(&name)?;
                    return Ok(mode.into_value());
                }
                Some(Token::EndElement { name }) => self.pop(&name)?,
                Some(Token::Text(_)) | Some(Token::CData(_)) => {}
                None => return Err(self.unexpected_eof()),
            }
        }
    }

    /// Reads a matched child, which has just been pushed.
    ///
    /// An empty element is a string `""` or an object with every field
    /// absent. Other kinds have no empty form, so they are skipped and
    /// `None` is returned.
    fn child(&mut self, descriptor: &TypeDescriptor, empty: bool) -> Result<Option<Value>, Error> {
        if !empty {
            return self.content(descriptor).map(Some);
        }
        let value = match descriptor {
            TypeDescriptor::Scalar(ScalarKind::String) | TypeDescriptor::Object(_) => {
                Some(self.empty_content(descriptor)?)
            }
            _ => {
                trace!("Skipping empty {}", self.current());
                None
            }
        };
        self.stack.pop();
        Ok(value)
    }

    /// Pops an ignored element if it has no end token to pop it later.
    fn skip_empty(&mut self, empty: bool) {
        if empty {
            self.stack.pop();
        }
    }
}
