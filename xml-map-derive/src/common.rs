// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::cell::RefCell;

use proc_macro2::TokenStream;
use quote::{quote, ToTokens};
use syn::{DeriveInput, Fields, Lit, LitStr, Meta, MetaNameValue, NestedMeta};

// See serde/serde_derive/src/internals/attr.rs and yaserde_derive/src/common/field.rs

/// Accumulates compiler errors. Similar to `serde_derive`'s `Ctxt`.
pub(crate) struct Errors(RefCell<Option<Vec<syn::Error>>>);

impl Errors {
    pub(crate) fn new() -> Self {
        Errors(RefCell::new(Some(Vec::new())))
    }

    pub(crate) fn push(&self, err: syn::Error) {
        self.0.borrow_mut().as_mut().unwrap().push(err);
    }

    pub(crate) fn take_compile_errors(&self) -> TokenStream {
        let errors = self
            .0
            .borrow_mut()
            .take()
            .unwrap()
            .into_iter()
            .map(syn::Error::into_compile_error);
        quote! {
            #(#errors)*
        }
    }
}

impl Drop for Errors {
    fn drop(&mut self) {
        if self.0.borrow().is_some() {
            panic!("Errors dropped without take_compile_errors call");
        }
    }
}

/// A `struct` with `#[derive(Mapped)]`.
pub(crate) struct MappedStruct<'a> {
    pub(crate) input: &'a DeriveInput,

    /// The registry key; the struct's ident unless renamed.
    pub(crate) type_name: String,

    /// All fields, in declaration order, including skipped ones.
    pub(crate) fields: Vec<MappedField<'a>>,
}

impl<'a> MappedStruct<'a> {
    pub(crate) fn new(
        errors: &Errors,
        input: &'a DeriveInput,
        struct_: &'a syn::DataStruct,
    ) -> Result<Self, ()> {
        let mut type_name = input.ident.to_string();
        for item in get_meta_items(errors, &input.attrs) {
            match &item {
                NestedMeta::Meta(Meta::NameValue(nv @ MetaNameValue { ref path, .. }))
                    if path.is_ident("rename") =>
                {
                    with_lit_str(errors, nv, &mut |l| type_name = l.value());
                }
                i => errors.push(syn::Error::new_spanned(i, "item not understood")),
            }
        }
        if !input.generics.params.is_empty() {
            errors.push(syn::Error::new_spanned(
                &input.generics,
                "#[derive(xml_map::Mapped)] doesn't support generic structs",
            ));
            return Err(());
        }
        let fields = match struct_.fields {
            Fields::Named(ref fields) => fields
                .named
                .iter()
                .flat_map(|f| MappedField::new(errors, f))
                .collect(),
            _ => {
                errors.push(syn::Error::new_spanned(
                    &input.ident,
                    "#[derive(xml_map::Mapped)] only supports structs with named fields",
                ));
                return Err(());
            }
        };
        Ok(MappedStruct {
            input,
            type_name,
            fields,
        })
    }
}

const XML_MAP: &str = "xml_map";

// Stolen from serde/serde_derive/src/internals/attr.rs.
pub(crate) fn get_meta_items(errors: &Errors, attrs: &[syn::Attribute]) -> Vec<NestedMeta> {
    let mut out = Vec::new();
    for attr in attrs {
        if !attr.path.is_ident(XML_MAP) {
            continue;
        }

        match attr.parse_meta() {
            Ok(Meta::List(meta)) => out.extend(meta.nested.into_iter()),
            Ok(other) => errors.push(syn::Error::new_spanned(other, "expected #[xml_map(...)]")),
            Err(err) => errors.push(err),
        }
    }
    out
}

/// How a field participates in mapping.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum FieldMode {
    /// Mapped; a missing element is handled by the field type's `MappedField::absent`.
    Mapped,

    /// Mapped; a missing element yields `Default::default()`.
    MappedOrDefault,

    /// Not mapped; always `Default::default()` when deserialized.
    Skip,
}

/// Field within a `MappedStruct`.
pub(crate) struct MappedField<'a> {
    pub(crate) inner: &'a syn::Field,
    pub(crate) ident: &'a syn::Ident,
    pub(crate) mode: FieldMode,
    pub(crate) xml_tag: String,

    /// The element name of each item, for `Vec` fields.
    pub(crate) item_tag: String,
    pub(crate) cdata: bool,
}

impl<'a> MappedField<'a> {
    /// For use by `MappedStruct::new` only.
    fn new(errors: &Errors, inner: &'a syn::Field) -> Result<Self, ()> {
        let ident = inner.ident.as_ref().expect("struct fields should be named");
        let mut default = false;
        let mut skip = false;
        let mut cdata = false;
        let mut xml_tag = ident.to_string();
        let mut item_tag = None;
        for item in get_meta_items(errors, &inner.attrs) {
            match &item {
                NestedMeta::Meta(Meta::Path(p)) if p.is_ident("default") => default = true,
                NestedMeta::Meta(Meta::Path(p)) if p.is_ident("skip") => skip = true,
                NestedMeta::Meta(Meta::Path(p)) if p.is_ident("cdata") => cdata = true,
                NestedMeta::Meta(Meta::NameValue(nv @ MetaNameValue { ref path, .. }))
                    if path.is_ident("rename") =>
                {
                    with_lit_str(errors, nv, &mut |l| xml_tag = l.value());
                }
                NestedMeta::Meta(Meta::NameValue(nv @ MetaNameValue { ref path, .. }))
                    if path.is_ident("list") =>
                {
                    with_lit_str(errors, nv, &mut |l| item_tag = Some(l.value()));
                }
                i => errors.push(syn::Error::new_spanned(i, "item not understood")),
            }
        }
        if xml_tag.is_empty() || item_tag.as_deref() == Some("") {
            errors.push(syn::Error::new_spanned(inner, "tags must be non-empty"));
            return Err(());
        }
        if item_tag.is_some() && !is_vec(&inner.ty) {
            errors.push(syn::Error::new_spanned(
                &inner.ty,
                "list applies only to Vec fields",
            ));
            return Err(());
        }
        let mode = match (skip, default) {
            (false, false) => FieldMode::Mapped,
            (false, true) => FieldMode::MappedOrDefault,
            (true, false) => FieldMode::Skip,
            (true, true) => {
                errors.push(syn::Error::new_spanned(
                    inner,
                    "default and skip are mutually exclusive",
                ));
                return Err(());
            }
        };
        Ok(MappedField {
            inner,
            ident,
            mode,
            item_tag: item_tag.unwrap_or_else(|| xml_tag.clone()),
            xml_tag,
            cdata,
        })
    }
}

/// Returns the type argument of `ty` if it's `wrapper<T>`, e.g. `Option<T>`.
fn generic_arg<'a>(ty: &'a syn::Type, wrapper: &str) -> Option<&'a syn::Type> {
    let p = match ty {
        syn::Type::Path(p) if p.qself.is_none() => p,
        _ => return None,
    };
    let last = p.path.segments.last()?;
    if last.ident != wrapper {
        return None;
    }
    match &last.arguments {
        syn::PathArguments::AngleBracketed(a) if a.args.len() == 1 => match &a.args[0] {
            syn::GenericArgument::Type(t) => Some(t),
            _ => None,
        },
        _ => None,
    }
}

/// True for `Vec<T>`, possibly within `Option` or `Box`.
fn is_vec(ty: &syn::Type) -> bool {
    if generic_arg(ty, "Vec").is_some() {
        return true;
    }
    generic_arg(ty, "Option")
        .or_else(|| generic_arg(ty, "Box"))
        .map_or(false, is_vec)
}

pub(crate) fn with_lit_str(
    errors: &Errors,
    name_value: &MetaNameValue,
    f: &mut dyn FnMut(&LitStr),
) {
    if let Lit::Str(s) = &name_value.lit {
        f(s);
    } else {
        errors.push(syn::Error::new_spanned(
            &name_value.lit,
            format!(
                "{:?} expects a string literal",
                name_value.path.to_token_stream()
            ),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &DeriveInput) -> (bool, String) {
        let errors = Errors::new();
        let ok = match input.data {
            syn::Data::Struct(ref data) => MappedStruct::new(&errors, input, data).is_ok(),
            _ => false,
        };
        (ok, errors.take_compile_errors().to_string())
    }

    #[test]
    fn list_requires_vec() {
        let input: DeriveInput = syn::parse_quote! {
            struct Person {
                #[xml_map(list = "tag")]
                tags: Vec<String>,

                #[xml_map(list = "alias")]
                aliases: Option<Vec<String>>,
            }
        };
        let (ok, errors) = parse(&input);
        assert!(ok);
        assert_eq!(errors, "");

        let input: DeriveInput = syn::parse_quote! {
            struct Person {
                #[xml_map(list = "tag")]
                name: String,
            }
        };
        let (_, errors) = parse(&input);
        assert!(errors.contains("list applies only to Vec fields"), "{}", errors);
    }

    #[test]
    fn rejected_shapes() {
        let input: DeriveInput = syn::parse_quote! {
            struct Person {
                #[xml_map(default, skip)]
                name: String,
            }
        };
        let (_, errors) = parse(&input);
        assert!(errors.contains("mutually exclusive"), "{}", errors);

        let input: DeriveInput = syn::parse_quote! {
            struct Wrapper<T> {
                inner: T,
            }
        };
        let (ok, errors) = parse(&input);
        assert!(!ok);
        assert!(errors.contains("generic"), "{}", errors);

        let input: DeriveInput = syn::parse_quote! {
            struct Pair(String, String);
        };
        let (ok, errors) = parse(&input);
        assert!(!ok);
        assert!(errors.contains("named fields"), "{}", errors);
    }
}
