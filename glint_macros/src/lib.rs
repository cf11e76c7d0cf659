use proc_macro::TokenStream;

mod record;

/// Derives the Glint codec traits for a struct with named fields. The
/// field declaration order becomes the schema order, and field names become
/// the wire names the decoder matches against.
///
/// `#[glint(delta)]` on an integer `Vec` field delta-encodes it: elements
/// after the first are written as zigzag varints of the difference from the
/// prior element.
#[proc_macro_error::proc_macro_error]
#[proc_macro_derive(Glint, attributes(glint))]
pub fn glint(input: TokenStream) -> TokenStream { record::derive(input) }
