//! Parsing for the `#[wire(..)]` attribute shared by structs, enums and their fields.

use syn::{Attribute, Expr, LitInt};

/// The parsed contents of zero or more `#[wire(..)]` attributes attached to one item or field.
#[derive(Default, Clone)]
pub struct WireAttr {
    pub bits: Option<usize>,
    pub bytes: Option<usize>,
    pub pre_skip: usize,
    pub post_skip: usize,
    pub alternatives: Vec<Expr>,
    pub skip: bool,
}

impl WireAttr {
    /// The bit width named by this attribute, preferring an explicit `bits` over `bytes * 8`.
    pub fn width_bits(&self) -> Option<usize> {
        self.bits.or_else(|| self.bytes.map(|bytes| bytes * 8))
    }

    pub fn parse(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut out = WireAttr::default();

        for attr in attrs {
            if !attr.path().is_ident("wire") {
                continue;
            }

            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("bits") {
                    let lit: LitInt = meta.value()?.parse()?;
                    out.bits = Some(lit.base10_parse()?);
                } else if meta.path.is_ident("bytes") {
                    let lit: LitInt = meta.value()?.parse()?;
                    out.bytes = Some(lit.base10_parse()?);
                } else if meta.path.is_ident("pre_skip") {
                    let lit: LitInt = meta.value()?.parse()?;
                    out.pre_skip = lit.base10_parse()?;
                } else if meta.path.is_ident("post_skip") {
                    let lit: LitInt = meta.value()?.parse()?;
                    out.post_skip = lit.base10_parse()?;
                } else if meta.path.is_ident("skip") {
                    out.skip = true;
                } else if meta.path.is_ident("alternatives") {
                    let content;
                    syn::bracketed!(content in meta.value()?);
                    let exprs =
                        content.parse_terminated(Expr::parse, syn::Token![,])?;
                    out.alternatives = exprs.into_iter().collect();
                } else {
                    return Err(meta.error("unsupported key in #[wire(..)] attribute"));
                }

                Ok(())
            })?;
        }

        Ok(out)
    }
}
