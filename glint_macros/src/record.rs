use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use proc_macro_error::abort;
use quote::{quote, quote_spanned};
use syn::{parse_macro_input, spanned::Spanned, Data, DeriveInput, Fields, Meta, NestedMeta};

pub fn derive(input: TokenStream) -> TokenStream {
  let input = parse_macro_input!(input as DeriveInput);
  let ty = &input.ident;
  let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
  let fields = match &input.data {
    Data::Struct(s) => match &s.fields {
      Fields::Named(f) => &f.named,
      _ => abort!(ty.span(), "Glint can only be derived for structs with named fields"),
    },
    _ => abort!(ty.span(), "Glint can only be derived for structs"),
  };

  let mut schema_fields = Vec::new();
  let mut writers = Vec::new();
  let mut name_arms = Vec::new();
  let mut wire_arms = Vec::new();
  let mut read_arms = Vec::new();
  for (i, f) in fields.iter().enumerate() {
    let ident = f.ident.as_ref().unwrap();
    let name = ident.to_string();
    let fty = &f.ty;
    let delta = match delta_flag(&f.attrs) {
      Ok(v) => v,
      Err(e) => return e.into(),
    };
    let flags = if delta { quote!(glint::wire::DELTA) } else { quote!(0u8) };
    schema_fields.push(quote! {
      glint::schema::append_field::<#fty>(out, #name, #flags);
    });
    writers.push(if delta {
      // The trait bound on write_delta_slice rejects non-integer elements.
      quote! { glint::encode::write_delta_slice(&self.#ident, buf); }
    } else {
      quote! { <#fty as glint::ValueWrite>::write(&self.#ident, buf); }
    });
    name_arms.push(quote! { #name => Some(#i), });
    wire_arms.push(quote! { #i => <#fty as glint::ValueWrite>::WIRE | #flags, });
    read_arms.push(quote! {
      #i => self.#ident = <#fty as glint::ValueRead>::read(field, r, st)?,
    });
  }

  let out = quote! {
    impl #impl_generics glint::Record for #ty #ty_generics #where_clause {
      fn append_schema(out: &mut ::std::vec::Vec<u8>) {
        #( #schema_fields )*
      }
      fn write_body(&self, buf: &mut glint::Buffer) {
        #( #writers )*
      }
      fn field_index(name: &str) -> ::std::option::Option<usize> {
        match name {
          #( #name_arms )*
          _ => None,
        }
      }
      fn field_wire(index: usize) -> u8 {
        match index {
          #( #wire_arms )*
          _ => 0,
        }
      }
      fn read_field(
        &mut self,
        index: usize,
        field: &glint::SchemaField,
        r: &mut glint::Reader<'_>,
        st: &mut glint::DecodeState,
      ) -> ::std::result::Result<(), glint::ReadError> {
        match index {
          #( #read_arms )*
          _ => {}
        }
        Ok(())
      }
    }

    impl #impl_generics glint::ValueWrite for #ty #ty_generics #where_clause {
      const WIRE: u8 = glint::wire::BaseType::Struct.id();
      fn extra_schema(out: &mut ::std::vec::Vec<u8>) {
        let mut inner = ::std::vec::Vec::new();
        <Self as glint::Record>::append_schema(&mut inner);
        glint::buffer::put_varint(out, inner.len() as u64);
        out.extend_from_slice(&inner);
      }
      fn write(&self, buf: &mut glint::Buffer) { glint::Record::write_body(self, buf) }
      fn write_entry(&self, buf: &mut glint::Buffer) {
        // A struct in a map-value position has no descriptor, so it
        // inlines its schema ahead of the body.
        let schema = glint::schema_of::<Self>();
        buf.put_varint(schema.bytes.len() as u64);
        buf.extend_from_slice(&schema.bytes);
        glint::Record::write_body(self, buf);
      }
    }

    impl #impl_generics glint::ValueRead for #ty #ty_generics #where_clause {
      fn read(
        field: &glint::SchemaField,
        r: &mut glint::Reader<'_>,
        st: &mut glint::DecodeState,
      ) -> ::std::result::Result<Self, glint::ReadError> {
        glint::decode::read_struct_body::<Self>(&field.inner, r, st)
      }
      fn read_entry(
        r: &mut glint::Reader<'_>,
        st: &mut glint::DecodeState,
      ) -> ::std::result::Result<Self, glint::ReadError> {
        let fields = glint::decode::read_inline_schema(r, st)?;
        glint::decode::read_struct_body::<Self>(&fields, r, st)
      }
    }

    impl #impl_generics glint::Element for #ty #ty_generics #where_clause {}
    impl #impl_generics glint::MapValue for #ty #ty_generics #where_clause {}
  };
  out.into()
}

fn delta_flag(attrs: &[syn::Attribute]) -> Result<bool, TokenStream2> {
  let mut delta = false;
  for a in attrs {
    if !a.path.is_ident("glint") {
      continue;
    }
    let meta = a.parse_meta().map_err(|e| e.to_compile_error())?;
    let list = match meta {
      Meta::List(list) => list,
      _ => {
        return Err(quote_spanned!(
          a.span() =>
          compile_error!("expected #[glint(delta)]");
        ));
      }
    };
    for nested in &list.nested {
      match nested {
        NestedMeta::Meta(Meta::Path(p)) if p.is_ident("delta") => delta = true,
        _ => {
          return Err(quote_spanned!(
            a.span() =>
            compile_error!("unknown glint attribute, expected #[glint(delta)]");
          ));
        }
      }
    }
  }
  Ok(delta)
}
