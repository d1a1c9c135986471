use crate::parse_struct::StructMeta;
use proc_macro2::{Ident, Span};
use quote::quote;
use std::str::FromStr;
use syn::DeriveInput;

fn bit_mask(bits: usize, shift: usize) -> proc_macro2::TokenStream {
    let mask = (2u16.pow(bits as u32) - 1) << shift;

    proc_macro2::TokenStream::from_str(&format!("{mask:#010b}")).unwrap()
}

pub fn generate_struct(
    parsed: StructMeta,
    input: &DeriveInput,
) -> Result<proc_macro2::TokenStream, syn::Error> {
    let name = input.ident.clone();
    let size_bytes = parsed.width_bits.div_ceil(8);

    let fields_pack = parsed.fields.clone().into_iter().map(|field| {
        let name = field.name;
        let field_ty = field.ty;
        let byte_start = field.bytes.start;
        let bit_start = field.bit_offset;

        if field.skip {
            return quote! {};
        }

        let ty_name = field
            .ty_name
            .unwrap_or_else(|| Ident::new("UnknownTypeStopLookingAtMe", Span::call_site()));

        // Small optimisation: a single-bit-or-wider bool/u8 field can be masked directly into
        // place without a round trip through a temporary buffer.
        if ty_name == "u8" || ty_name == "bool" {
            let mask = bit_mask(field.bits.len(), bit_start);

            quote! {
                buf[#byte_start] |= ((self.#name as u8) << #bit_start) & #mask;
            }
        }
        // Other sub-byte fields (enums stored in a single byte) pack into a scratch byte first.
        else if field.bytes.len() == 1 {
            let mask = bit_mask(field.bits.len(), bit_start);

            quote! {
                let mut field_buf = [0u8; 1];
                let res = <#field_ty as ::fieldring_wire::WireWrite>::pack_to_slice_unchecked(&self.#name, &mut field_buf)[0];

                buf[#byte_start] |= (res << #bit_start) & #mask;
            }
        }
        // Multi-byte fields are assumed byte-aligned; this is validated during attribute parsing.
        else {
            let byte_end = field.bytes.end;

            quote! {
                <#field_ty as ::fieldring_wire::WireWrite>::pack_to_slice_unchecked(&self.#name, &mut buf[#byte_start..#byte_end]);
            }
        }
    });

    let fields_unpack = parsed.fields.into_iter().map(|field| {
        let ty = field.ty;
        let name = field.name;
        let byte_start = field.bytes.start;
        let bit_start = field.bit_offset;
        let ty_name = field
            .ty_name
            .unwrap_or_else(|| Ident::new("UnknownTypeStopLookingAtMe", Span::call_site()));

        if field.skip {
            return quote! {
                #name: Default::default()
            };
        }

        if field.bits.len() <= 8 {
            let mask = bit_mask(field.bits.len(), bit_start);

            if ty_name == "bool" {
                quote! {
                    #name: ((buf[#byte_start] & #mask) >> #bit_start) > 0
                }
            } else if ty_name == "u8" {
                quote! {
                    #name: (buf[#byte_start] & #mask) >> #bit_start
                }
            }
            // Anything else sub-byte will be an enum.
            else {
                quote! {
                    #name: {
                        let masked = (buf[#byte_start] & #mask) >> #bit_start;

                        <#ty as ::fieldring_wire::WireRead>::unpack_from_slice(&[masked])?
                    }
                }
            }
        }
        // Multi-byte fields are assumed byte-aligned; this is validated during attribute parsing.
        else {
            let byte_end = field.bytes.end;

            quote! {
                #name: <#ty as ::fieldring_wire::WireRead>::unpack_from_slice(&buf[#byte_start..#byte_end])?
            }
        }
    });

    let out = quote! {
        impl ::fieldring_wire::WireWrite for #name {
            fn pack_to_slice_unchecked<'buf>(&self, buf: &'buf mut [u8]) -> &'buf [u8] {
                let buf = match buf.get_mut(0..#size_bytes) {
                    Some(buf) => buf,
                    None => unreachable!(),
                };

                #(#fields_pack)*

                buf
            }

            fn packed_len(&self) -> usize {
                #size_bytes
            }
        }

        impl ::fieldring_wire::WireRead for #name {
            fn unpack_from_slice(buf: &[u8]) -> Result<Self, ::fieldring_wire::WireError> {
                let buf = buf
                    .get(0..#size_bytes)
                    .ok_or(::fieldring_wire::WireError::ReadBufferTooShort {
                        expected: #size_bytes,
                        got: buf.len(),
                    })?;

                Ok(Self {
                    #(#fields_unpack),*
                })
            }
        }

        impl ::fieldring_wire::WireSized for #name {
            const PACKED_LEN: usize = #size_bytes;

            type Buffer = [u8; #size_bytes];

            fn buffer() -> Self::Buffer {
                [0u8; #size_bytes]
            }
        }
    };

    Ok(out)
}
