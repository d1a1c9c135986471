//! Walks a struct's fields and lays them out into a bit-packed wire layout.

use crate::attr::WireAttr;
use proc_macro2::Ident;
use std::ops::Range;
use syn::{DeriveInput, Fields, Type};

#[derive(Clone)]
pub struct FieldMeta {
    pub name: Ident,
    pub ty: Type,
    /// The leaf identifier of the field's type, e.g. `u8` out of `core::primitive::u8`. Used to
    /// special-case the single-byte primitives during codegen.
    pub ty_name: Option<Ident>,
    /// Byte range in the packed buffer this field occupies. For sub-byte fields this is the
    /// single byte containing it.
    pub bytes: Range<usize>,
    /// Offset in bits of this field within `bytes.start`.
    pub bit_offset: usize,
    /// Width in bits of this field. Only the length of this range is meaningful.
    pub bits: Range<usize>,
    pub skip: bool,
}

#[derive(Clone)]
pub struct StructMeta {
    pub width_bits: usize,
    pub fields: Vec<FieldMeta>,
}

pub fn parse_struct(input: &DeriveInput) -> syn::Result<StructMeta> {
    let struct_attr = WireAttr::parse(&input.attrs)?;

    let data = match &input.data {
        syn::Data::Struct(data) => data,
        _ => return Err(syn::Error::new_spanned(input, "Wire: expected a struct")),
    };

    let named = match &data.fields {
        Fields::Named(named) => &named.named,
        _ => {
            return Err(syn::Error::new_spanned(
                &data.fields,
                "Wire: struct fields must be named",
            ))
        }
    };

    let mut cursor = 0usize;
    let mut fields = Vec::with_capacity(named.len());

    for field in named {
        let attr = WireAttr::parse(&field.attrs)?;
        let name = field
            .ident
            .clone()
            .expect("Fields::Named fields always have an ident");
        let ty = field.ty.clone();

        let ty_name = match &ty {
            Type::Path(path) => path.path.segments.last().map(|seg| seg.ident.clone()),
            _ => None,
        };

        cursor += attr.pre_skip;

        if attr.skip {
            fields.push(FieldMeta {
                name,
                ty,
                ty_name,
                bytes: 0..0,
                bit_offset: 0,
                bits: 0..0,
                skip: true,
            });

            continue;
        }

        let width = attr.width_bits().ok_or_else(|| {
            syn::Error::new_spanned(
                &name,
                "Wire: field needs a `#[wire(bits = ..)]` or `#[wire(bytes = ..)]` attribute",
            )
        })?;

        let byte_start = cursor / 8;
        let bit_offset = cursor % 8;
        let byte_end = (cursor + width).div_ceil(8);

        fields.push(FieldMeta {
            name,
            ty,
            ty_name,
            bytes: byte_start..byte_end,
            bit_offset,
            bits: 0..width,
            skip: false,
        });

        cursor += width + attr.post_skip;
    }

    let width_bits = struct_attr.width_bits().unwrap_or(cursor);

    if width_bits < cursor {
        return Err(syn::Error::new_spanned(
            input,
            format!(
                "Wire: struct declares {width_bits} bits but its fields need at least {cursor}"
            ),
        ));
    }

    Ok(StructMeta { width_bits, fields })
}
