// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

mod common;
mod mapped;

use common::Errors;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

fn derive(
    input: proc_macro::TokenStream,
    f: fn(&Errors, syn::DeriveInput) -> Result<proc_macro2::TokenStream, ()>,
) -> proc_macro::TokenStream {
    let errors = Errors::new();
    let input = parse_macro_input!(input as DeriveInput);
    let out = f(&errors, input).unwrap_or_default();
    let errors = errors.take_compile_errors();
    proc_macro::TokenStream::from(quote! {
        const _: () = {
            #errors
            #out
        };
    })
}

/// Implements `xml_map::Mapped` and `xml_map::MappedField` for a struct with
/// named fields.
///
/// Container attributes:
///
/// *   `#[xml_map(rename = "Name")]`: the key under which the schema is
///     registered. Defaults to the struct's name.
///
/// Field attributes:
///
/// *   `#[xml_map(rename = "tag")]`: the element name. Defaults to the
///     field's name.
/// *   `#[xml_map(list = "item")]`: for `Vec` fields, the name of each item's
///     element. Defaults to the field's element name.
/// *   `#[xml_map(cdata)]`: write text in a CDATA section.
/// *   `#[xml_map(default)]`: use `Default::default()` when the element is
///     missing rather than failing.
/// *   `#[xml_map(skip)]`: don't map this field at all.
#[proc_macro_derive(Mapped, attributes(xml_map))]
pub fn derive_mapped(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    derive(input, mapped::derive)
}
