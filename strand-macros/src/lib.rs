//! Entry-point attributes for the Strand runtime.
//!
//! Both attributes turn an `async fn` into a synchronous one that builds a
//! runtime and drives the body with `block_on`.

mod args;

use args::{ClockArg, EntryArgs};

use proc_macro::TokenStream;
use quote::quote;
use syn::{Error, ItemFn, ReturnType, parse_macro_input};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Entry {
    Main,
    Test,
}

impl Entry {
    fn name(self) -> &'static str {
        match self {
            Entry::Main => "#[strand::main]",
            Entry::Test => "#[strand::test]",
        }
    }

    fn default_clock(self) -> ClockArg {
        match self {
            Entry::Main => ClockArg::System,
            Entry::Test => ClockArg::Virtual,
        }
    }
}

/// Runs `async fn main` on a Strand runtime.
///
/// The runtime uses the system clock unless `clock = "virtual"` is given.
///
/// ```rust,ignore
/// #[strand::main]
/// async fn main() -> strand::Result<()> {
///     strand::time::delay(std::time::Duration::from_millis(10)).await
/// }
/// ```
#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as EntryArgs);
    let input = parse_macro_input!(item as ItemFn);

    if input.sig.ident != "main" {
        return Error::new_spanned(&input.sig.ident, "#[strand::main] must be used on fn main")
            .to_compile_error()
            .into();
    }

    expand(Entry::Main, args, input)
}

/// Runs an `async` test on a Strand runtime.
///
/// Tests use the virtual clock unless `clock = "system"` is given, so
/// delays and timeouts complete instantly.
///
/// ```rust,ignore
/// #[strand::test]
/// async fn delays_are_instant() -> strand::Result<()> {
///     strand::time::delay(std::time::Duration::from_secs(60)).await
/// }
/// ```
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as EntryArgs);
    let input = parse_macro_input!(item as ItemFn);

    expand(Entry::Test, args, input)
}

fn expand(entry: Entry, args: EntryArgs, input: ItemFn) -> TokenStream {
    let ItemFn {
        attrs,
        vis,
        mut sig,
        block,
    } = input;

    if sig.asyncness.is_none() {
        return Error::new_spanned(
            sig.fn_token,
            format!("{} must be used on an async function", entry.name()),
        )
        .to_compile_error()
        .into();
    }

    if !sig.inputs.is_empty() {
        return Error::new_spanned(
            &sig.inputs,
            format!("{} functions cannot take arguments", entry.name()),
        )
        .to_compile_error()
        .into();
    }

    sig.asyncness = None;

    let clock = args.clock.unwrap_or(entry.default_clock());
    let runtime = quote! {
        ::strand::RuntimeBuilder::new()
            .clock(#clock)
            .build()
    };

    let body = match &sig.output {
        ReturnType::Default => quote! {
            if let ::core::result::Result::Err(err) = #runtime.block_on(async move {
                #block;
                ::core::result::Result::Ok::<(), ::strand::Error>(())
            }) {
                ::core::panic!("{}", err);
            }
        },
        ReturnType::Type(..) => quote! {
            #runtime
                .block_on(async move #block)
                .map_err(::core::convert::Into::into)
        },
    };

    let test_attr = match entry {
        Entry::Test => quote!(#[::core::prelude::v1::test]),
        Entry::Main => quote!(),
    };

    quote! {
        #test_attr
        #(#attrs)*
        #vis #sig {
            #body
        }
    }
    .into()
}
