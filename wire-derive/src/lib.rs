//! Derive macro implementation backing `fieldring_wire::Wire`.

mod attr;
mod generate_enum;
mod generate_struct;
mod parse_enum;
mod parse_struct;

use proc_macro::TokenStream;
use syn::{parse_macro_input, Data, DeriveInput};

/// Derives [`WireWrite`][wr], [`WireRead`][rd] and [`WireSized`][sz] for a struct or fieldless
/// enum.
///
/// Structs need a `#[wire(bits = N)]` or `#[wire(bytes = N)]` attribute giving their total
/// packed width, and each field needs the same to give its own width. `pre_skip`/`post_skip`
/// (in bits) pad around a field, and `#[wire(skip)]` excludes a field from the wire
/// representation entirely (it is populated with `Default::default()` on unpack).
///
/// Enums need a `#[repr(..)]` matching their wire width. A variant may declare
/// `#[wire(alternatives = [..])]` to accept additional raw values that decode to the same
/// variant.
///
/// [wr]: https://docs.rs/fieldring-wire/latest/fieldring_wire/trait.WireWrite.html
/// [rd]: https://docs.rs/fieldring-wire/latest/fieldring_wire/trait.WireRead.html
/// [sz]: https://docs.rs/fieldring-wire/latest/fieldring_wire/trait.WireSized.html
#[proc_macro_derive(Wire, attributes(wire))]
pub fn wire(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let result = match &input.data {
        Data::Struct(_) => parse_struct::parse_struct(&input)
            .and_then(|parsed| generate_struct::generate_struct(parsed, &input)),
        Data::Enum(_) => parse_enum::parse_enum(&input)
            .and_then(|parsed| generate_enum::generate_enum(parsed, &input)),
        Data::Union(_) => Err(syn::Error::new_spanned(&input, "Wire: unions are not supported")),
    };

    match result {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
