//! Procedural macros shared by the TileQuet crates.
//!
//! The only macro is [`macro@context`], which attaches a formatted message to every
//! error leaving the annotated function:
//!
//! ```ignore
//! #[context("reading container metadata from '{}'", path.display())]
//! pub fn read_metadata(path: &Path) -> anyhow::Result<TileQuetMetadata> {
//!     /* ... */
//! }
//! ```
//!
//! The function must return `anyhow::Result<_>`. Async functions are supported as well.

mod args;

use crate::args::ContextArgs;
use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use quote::{ToTokens, quote};
use syn::{ItemFn, ReturnType, parse_macro_input};

/// Wraps the body of a function so that any returned error gets `.context(format!(...))`.
///
/// Use `#[context(move, "...")]` when the body needs to move captured arguments.
#[proc_macro_attribute]
pub fn context(args: TokenStream, input: TokenStream) -> TokenStream {
	let args = parse_macro_input!(args as ContextArgs);
	let mut function = parse_macro_input!(input as ItemFn);

	let wrapped = if function.sig.asyncness.is_some() {
		wrap_async(&function, &args)
	} else {
		Ok(wrap_sync(&function, &args))
	};

	match wrapped {
		Ok(body) => {
			function.block.stmts = vec![syn::Stmt::Expr(syn::Expr::Verbatim(body), None)];
			function.into_token_stream().into()
		}
		Err(err) => err.to_compile_error().into(),
	}
}

fn wrap_sync(function: &ItemFn, args: &ContextArgs) -> TokenStream2 {
	let body = &function.block;
	let output = &function.sig.output;
	let move_token = &args.move_token;
	let format_args = &args.format_args;
	let err = Ident::new("err", Span::mixed_site());
	let once = Ident::new("once", Span::mixed_site());

	quote! {
		// Moving a non-`Copy` value into the closure makes it `FnOnce`, so the body may move its arguments.
		let #once = ::core::iter::empty::<()>();
		(#move_token || #output {
			::core::mem::drop(#once);
			#body
		})().map_err(|#err| #err.context(format!(#format_args)).into())
	}
}

fn wrap_async(function: &ItemFn, args: &ContextArgs) -> syn::Result<TokenStream2> {
	let body = &function.block;
	let move_token = &args.move_token;
	let format_args = &args.format_args;
	let err = Ident::new("err", Span::mixed_site());
	let result = Ident::new("result", Span::mixed_site());

	let output = match &function.sig.output {
		ReturnType::Default => {
			return Err(syn::Error::new_spanned(
				&function.sig,
				"#[context] requires the function to return a Result",
			));
		}
		ReturnType::Type(_, output) => output,
	};

	Ok(quote! {
		let #result: #output = async #move_token { #body }.await;
		#result.map_err(|#err| #err.context(format!(#format_args)).into())
	})
}
