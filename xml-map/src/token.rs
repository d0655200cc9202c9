// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token streams: the boundary between the mapping engines and concrete XML
//! readers and writers.

use xml::common::TextPosition;

/// A pull-style XML event.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Token {
    /// The start of an element.
    ///
    /// An `empty` element (`<a/>`) has no matching [`Token::EndElement`].
    StartElement { name: String, empty: bool },

    EndElement { name: String },

    /// Character data, already unescaped.
    Text(String),

    /// The contents of a CDATA section. Readers treat this like `Text`.
    CData(String),
}

impl Token {
    /// Shorthand for a non-empty `StartElement`.
    pub fn start(name: &str) -> Self {
        Token::StartElement {
            name: name.to_owned(),
            empty: false,
        }
    }

    pub fn end(name: &str) -> Self {
        Token::EndElement {
            name: name.to_owned(),
        }
    }

    pub fn text(text: &str) -> Self {
        Token::Text(text.to_owned())
    }
}

/// A source of tokens consumed by [`crate::de::deserialize`].
pub trait TokenSource {
    /// Returns the next token, or `None` at the end of the document.
    fn next_token(&mut self) -> Result<Option<Token>, crate::BoxedStdError>;

    /// Returns the position of the most recently returned token, if known.
    fn position(&self) -> Option<TextPosition> {
        None
    }
}

impl TokenSource for std::vec::IntoIter<Token> {
    fn next_token(&mut self) -> Result<Option<Token>, crate::BoxedStdError> {
        Ok(self.next())
    }
}

/// A destination for tokens produced by [`crate::ser::Serializer`].
pub trait TokenSink {
    fn start_element(&mut self, name: &str) -> Result<(), crate::BoxedStdError>;
    fn end_element(&mut self, name: &str) -> Result<(), crate::BoxedStdError>;
    fn text(&mut self, text: &str) -> Result<(), crate::BoxedStdError>;
    fn cdata(&mut self, text: &str) -> Result<(), crate::BoxedStdError>;
}

/// Records tokens, mostly for tests and for embedding output in another stream.
impl TokenSink for Vec<Token> {
    fn start_element(&mut self, name: &str) -> Result<(), crate::BoxedStdError> {
        self.push(Token::start(name));
        Ok(())
    }

    fn end_element(&mut self, name: &str) -> Result<(), crate::BoxedStdError> {
        self.push(Token::end(name));
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<(), crate::BoxedStdError> {
        self.push(Token::text(text));
        Ok(())
    }

    fn cdata(&mut self, text: &str) -> Result<(), crate::BoxedStdError> {
        self.push(Token::CData(text.to_owned()));
        Ok(())
    }
}
