// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Logic to derive the `xml_map::Mapped` trait.

use proc_macro2::TokenStream;
use quote::{quote, quote_spanned};
use syn::Data;

use crate::common::{Errors, FieldMode, MappedStruct};

fn schema_fields(struct_: &MappedStruct) -> Vec<TokenStream> {
    struct_
        .fields
        .iter()
        .filter(|f| f.mode != FieldMode::Skip)
        .map(|f| {
            let name = f.ident.to_string();
            let xml_tag = &f.xml_tag;
            let item_tag = &f.item_tag;
            let cdata = f.cdata;
            let ty = &f.inner.ty;
            quote_spanned! {
                f.ident.span() =>
                ::xml_map::schema::FieldSchema::new(
                    #name,
                    #xml_tag,
                    <#ty as ::xml_map::value::MappedField>::descriptor(#item_tag),
                ).with_cdata(#cdata)
            }
        })
        .collect()
}

fn register_fields(struct_: &MappedStruct) -> Vec<TokenStream> {
    struct_
        .fields
        .iter()
        .filter(|f| f.mode != FieldMode::Skip)
        .map(|f| {
            let ty = &f.inner.ty;
            quote_spanned! {
                f.ident.span() =>
                <#ty as ::xml_map::value::MappedField>::register(registry)?;
            }
        })
        .collect()
}

fn take_fields(struct_: &MappedStruct) -> Vec<TokenStream> {
    struct_
        .fields
        .iter()
        .map(|f| {
            let ident = f.ident;
            let name = ident.to_string();
            match f.mode {
                FieldMode::Mapped => quote_spanned! {
                    ident.span() =>
                    #ident: ::xml_map::value::take_field(&mut object, #name)?
                },
                FieldMode::MappedOrDefault => quote_spanned! {
                    ident.span() =>
                    #ident: ::xml_map::value::take_field_or_default(&mut object, #name)?
                },
                FieldMode::Skip => quote_spanned! {
                    ident.span() =>
                    #ident: ::std::default::Default::default()
                },
            }
        })
        .collect()
}

fn set_fields(struct_: &MappedStruct) -> Vec<TokenStream> {
    struct_
        .fields
        .iter()
        .filter(|f| f.mode != FieldMode::Skip)
        .map(|f| {
            let ident = f.ident;
            let name = ident.to_string();
            quote_spanned! {
                ident.span() =>
                if let Some(v) = ::xml_map::value::MappedField::to_value(&self.#ident) {
                    object.set(#name, v);
                }
            }
        })
        .collect()
}

fn do_struct(struct_: &MappedStruct) -> TokenStream {
    let ident = &struct_.input.ident;
    let type_name = &struct_.type_name;
    let schema_fields = schema_fields(struct_);
    let register_fields = register_fields(struct_);
    let take_fields = take_fields(struct_);
    let set_fields = set_fields(struct_);
    quote! {
        impl ::xml_map::value::Mapped for #ident {
            fn type_name() -> &'static str {
                #type_name
            }

            fn schema() -> Result<::xml_map::schema::TypeSchema, ::xml_map::schema::SchemaError> {
                ::xml_map::schema::TypeSchema::new(#type_name, vec![#(#schema_fields),*])
            }

            #[allow(unused_variables)]
            fn register_fields(registry: &::xml_map::schema::Registry) -> Result<(), ::xml_map::schema::SchemaError> {
                #(#register_fields)*
                Ok(())
            }

            #[allow(unused_mut, unused_variables)]
            fn from_object(mut object: ::xml_map::value::Object) -> Result<Self, ::xml_map::value::ValueError> {
                Ok(Self {
                    #(#take_fields,)*
                })
            }

            fn to_object(&self) -> ::xml_map::value::Object {
                let mut object = ::xml_map::value::Object::new(#type_name);
                #(#set_fields)*
                object
            }
        }

        impl ::xml_map::value::MappedField for #ident {
            fn descriptor(_item_tag: &str) -> ::xml_map::schema::TypeDescriptor {
                ::xml_map::schema::TypeDescriptor::Object(#type_name.to_owned())
            }

            fn register(registry: &::xml_map::schema::Registry) -> Result<(), ::xml_map::schema::SchemaError> {
                registry.register_type::<Self>()
            }

            fn from_value(value: ::xml_map::value::Value) -> Result<Self, ::xml_map::value::ValueError> {
                match value {
                    ::xml_map::value::Value::Object(o) => <Self as ::xml_map::value::Mapped>::from_object(o),
                    other => Err(::xml_map::value::ValueError::mismatch(#type_name, &other)),
                }
            }

            fn to_value(&self) -> Option<::xml_map::value::Value> {
                Some(::xml_map::value::Value::Object(<Self as ::xml_map::value::Mapped>::to_object(self)))
            }
        }
    }
}

pub(crate) fn derive(errors: &Errors, input: syn::DeriveInput) -> Result<TokenStream, ()> {
    match input.data {
        Data::Struct(ref data) => MappedStruct::new(errors, &input, data).map(|s| do_struct(&s)),
        _ => {
            errors.push(syn::Error::new_spanned(
                input.ident,
                "#[derive(xml_map::Mapped)] only supports structs",
            ));
            Err(())
        }
    }
}
