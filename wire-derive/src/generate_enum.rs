use crate::parse_enum::EnumMeta;
use quote::quote;
use syn::DeriveInput;

pub fn generate_enum(
    parsed: EnumMeta,
    input: &DeriveInput,
) -> Result<proc_macro2::TokenStream, syn::Error> {
    let name = input.ident.clone();
    let repr = parsed.repr;

    let write_arms = parsed.variants.iter().map(|variant| {
        let variant_name = &variant.name;
        let discriminant = &variant.discriminant;

        quote! {
            #name::#variant_name => (#discriminant) as #repr,
        }
    });

    let read_arms = parsed.variants.iter().map(|variant| {
        let variant_name = &variant.name;
        let discriminant = &variant.discriminant;
        let alternatives = &variant.alternatives;

        quote! {
            raw if raw == ((#discriminant) as #repr) #(|| raw == ((#alternatives) as #repr))* => {
                #name::#variant_name
            }
        }
    });

    let out = quote! {
        impl ::fieldring_wire::WireWrite for #name {
            fn pack_to_slice_unchecked<'buf>(&self, buf: &'buf mut [u8]) -> &'buf [u8] {
                let raw: #repr = match self {
                    #(#write_arms)*
                };

                ::fieldring_wire::WireWrite::pack_to_slice_unchecked(&raw, buf)
            }

            fn packed_len(&self) -> usize {
                <#repr as ::fieldring_wire::WireSized>::PACKED_LEN
            }
        }

        impl ::fieldring_wire::WireRead for #name {
            fn unpack_from_slice(buf: &[u8]) -> Result<Self, ::fieldring_wire::WireError> {
                let raw = <#repr as ::fieldring_wire::WireRead>::unpack_from_slice(buf)?;

                Ok(match raw {
                    #(#read_arms)*
                    other => {
                        return Err(::fieldring_wire::WireError::InvalidDiscriminant {
                            value: other as u32,
                        })
                    }
                })
            }
        }

        impl ::fieldring_wire::WireSized for #name {
            const PACKED_LEN: usize = <#repr as ::fieldring_wire::WireSized>::PACKED_LEN;

            type Buffer = <#repr as ::fieldring_wire::WireSized>::Buffer;

            fn buffer() -> Self::Buffer {
                <#repr as ::fieldring_wire::WireSized>::buffer()
            }
        }
    };

    Ok(out)
}
