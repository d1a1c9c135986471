//! Walks a fieldless enum's variants, recovering its `#[repr(..)]` discriminant type and any
//! `#[wire(alternatives = [..])]` aliases.

use crate::attr::WireAttr;
use proc_macro2::Ident;
use syn::{DeriveInput, Expr};

#[derive(Clone)]
pub struct VariantMeta {
    pub name: Ident,
    pub discriminant: Expr,
    /// Extra raw values that should also decode to this variant, e.g. a manufacturer-specific
    /// range that all maps to one logical variant.
    pub alternatives: Vec<Expr>,
}

#[derive(Clone)]
pub struct EnumMeta {
    /// The `#[repr(..)]` primitive backing this enum's discriminant, e.g. `u8` or `u16`.
    pub repr: Ident,
    pub variants: Vec<VariantMeta>,
}

pub fn parse_enum(input: &DeriveInput) -> syn::Result<EnumMeta> {
    let data = match &input.data {
        syn::Data::Enum(data) => data,
        _ => return Err(syn::Error::new_spanned(input, "Wire: expected an enum")),
    };

    let repr = input
        .attrs
        .iter()
        .find(|attr| attr.path().is_ident("repr"))
        .and_then(|attr| attr.parse_args::<Ident>().ok())
        .ok_or_else(|| {
            syn::Error::new_spanned(
                input,
                "Wire: enums need a `#[repr(u8)]`/`#[repr(u16)]`/.. matching their wire width",
            )
        })?;

    let mut variants = Vec::with_capacity(data.variants.len());
    let mut next_discriminant: Expr = syn::parse_quote!(0);

    for variant in &data.variants {
        if !matches!(variant.fields, syn::Fields::Unit) {
            return Err(syn::Error::new_spanned(
                variant,
                "Wire: enum variants must not carry fields",
            ));
        }

        let attr = WireAttr::parse(&variant.attrs)?;
        let name = variant.ident.clone();

        let discriminant = match &variant.discriminant {
            Some((_, expr)) => expr.clone(),
            None => next_discriminant.clone(),
        };

        next_discriminant = syn::parse_quote!((#discriminant) + 1);

        variants.push(VariantMeta {
            name,
            discriminant,
            alternatives: attr.alternatives,
        });
    }

    Ok(EnumMeta { repr, variants })
}
