//! # Accessor Derive
//!
//! Derive macros generating builder-style setters and by-value getters for
//! plain structs with named fields, e.g. permission sets that are passed
//! around by value.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::punctuated::Punctuated;
use syn::token::Comma;
use syn::{
    Data, DeriveInput, Field, Fields, Ident, LitBool, Type, parse_macro_input, spanned::Spanned,
};

/// Derive to generate `.set_<field>(&mut self, value: Ty) -> &mut Self` and
/// `const .with_<field>(mut self, value: Ty) -> Self` for each **named** field.
///
/// - Skipping a field: `#[accessors(skip)]`
///
/// # Example
///
/// ```
/// use utils_accessors_derive::Setters;
///
/// #[derive(Setters)]
/// struct Foo<T> where T: Default {
///     a: u32,
///     #[accessors(skip)]
///     _phantom: T,
/// }
///
/// let mut f = Foo { a: 1, _phantom: u8::default() };
/// f.set_a(10).set_a(11);
/// let f2 = f.with_a(42);
/// assert_eq!(f2.a, 42);
/// ```
#[proc_macro_derive(Setters, attributes(accessors))]
pub fn derive_generate_setters(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let fields = match accessor_fields(&input) {
        Ok(fields) => fields,
        Err(e) => return e.to_compile_error().into(),
    };

    let methods = fields.iter().map(|(fname, ty)| {
        let set_name = format_ident!("set_{}", fname);
        let with_name = format_ident!("with_{}", fname);
        quote! {
            #[inline]
            pub fn #set_name(&mut self, value: #ty) -> &mut Self {
                self.#fname = value;
                self
            }

            #[inline]
            #[must_use]
            pub const fn #with_name(mut self, value: #ty) -> Self {
                self.#fname = value;
                self
            }
        }
    });

    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    TokenStream::from(quote! {
        impl #impl_generics #ident #ty_generics #where_clause {
            #(#methods)*
        }
    })
}

/// Derive to generate `const .<field>(&self) -> Ty` for each **named** field.
///
/// Field types must be `Copy`; fields are returned by value.
///
/// - Skipping a field: `#[accessors(skip)]`
///
/// # Example
///
/// ```
/// use utils_accessors_derive::{Getters, Setters};
///
/// #[derive(Clone, Copy, Default, Getters, Setters)]
/// struct Perm {
///     read: bool,
///     write: bool,
/// }
///
/// let p = Perm::default().with_read(true);
/// assert!(p.read());
/// assert!(!p.write());
/// ```
#[proc_macro_derive(Getters, attributes(accessors))]
pub fn derive_generate_getters(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let fields = match accessor_fields(&input) {
        Ok(fields) => fields,
        Err(e) => return e.to_compile_error().into(),
    };

    let methods = fields.iter().map(|(fname, ty)| {
        quote! {
            #[inline]
            #[must_use]
            pub const fn #fname(&self) -> #ty {
                self.#fname
            }
        }
    });

    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    TokenStream::from(quote! {
        impl #impl_generics #ident #ty_generics #where_clause {
            #(#methods)*
        }
    })
}

/// Named, non-skipped fields of the derive input.
fn accessor_fields(input: &DeriveInput) -> syn::Result<Vec<(Ident, Type)>> {
    Ok(named_fields(&input.ident, &input.data)?
        .iter()
        .filter(|field| !should_skip(&field.attrs))
        .filter_map(|field| field.ident.clone().map(|name| (name, field.ty.clone())))
        .collect())
}

fn named_fields<'a>(ident: &Ident, data: &'a Data) -> syn::Result<&'a Punctuated<Field, Comma>> {
    match data {
        Data::Struct(s) => match &s.fields {
            Fields::Named(n) => Ok(&n.named),
            Fields::Unnamed(u) => Err(syn::Error::new(
                u.span(),
                "accessors only support named fields",
            )),
            Fields::Unit => Err(syn::Error::new(
                ident.span(),
                "accessors do not apply to unit structs",
            )),
        },
        _ => Err(syn::Error::new(
            ident.span(),
            "accessors can only be derived for structs",
        )),
    }
}

fn should_skip(attrs: &[syn::Attribute]) -> bool {
    let mut skip = false;
    for attr in attrs {
        if !attr.path().is_ident("accessors") {
            continue;
        }

        // Accept #[accessors(skip)] and #[accessors(skip = true)]
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                if meta.input.is_empty() {
                    skip = true;
                } else if let Ok(v) = meta.value()?.parse::<LitBool>()
                    && v.value
                {
                    skip = true;
                }
            }
            Ok(())
        });
    }
    skip
}
