use proc_macro2::TokenStream;
use quote::{ToTokens, quote};
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{Error, Expr, ExprLit, Lit, MetaNameValue, Token};

/// Clock requested by `clock = "..."`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClockArg {
    System,
    Virtual,
}

impl ToTokens for ClockArg {
    fn to_tokens(&self, tokens: &mut TokenStream) {
        tokens.extend(match self {
            ClockArg::System => quote!(::strand::Clock::System),
            ClockArg::Virtual => quote!(::strand::Clock::Virtual),
        });
    }
}

/// Options accepted by `#[strand::main]` and `#[strand::test]`.
#[derive(Debug, Default)]
pub(crate) struct EntryArgs {
    pub(crate) clock: Option<ClockArg>,
}

impl Parse for EntryArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut args = EntryArgs::default();
        let pairs = Punctuated::<MetaNameValue, Token![,]>::parse_terminated(input)?;

        for pair in pairs {
            if !pair.path.is_ident("clock") {
                return Err(Error::new_spanned(
                    &pair.path,
                    "unknown option, expected `clock`",
                ));
            }

            if args.clock.is_some() {
                return Err(Error::new_spanned(&pair.path, "duplicate `clock` option"));
            }

            let Expr::Lit(ExprLit {
                lit: Lit::Str(value),
                ..
            }) = &pair.value
            else {
                return Err(Error::new_spanned(&pair.value, "expected a string literal"));
            };

            args.clock = Some(match value.value().as_str() {
                "system" => ClockArg::System,
                "virtual" => ClockArg::Virtual,
                _ => {
                    return Err(Error::new_spanned(
                        value,
                        "expected \"system\" or \"virtual\"",
                    ));
                }
            });
        }

        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_arguments() {
        let args: EntryArgs = syn::parse_str("").unwrap();
        assert_eq!(args.clock, None);
    }

    #[test]
    fn clock_option() {
        let args: EntryArgs = syn::parse_str(r#"clock = "virtual""#).unwrap();
        assert_eq!(args.clock, Some(ClockArg::Virtual));

        let args: EntryArgs = syn::parse_str(r#"clock = "system","#).unwrap();
        assert_eq!(args.clock, Some(ClockArg::System));
    }

    #[test]
    fn rejects_unknown_values() {
        assert!(syn::parse_str::<EntryArgs>(r#"clock = "lunar""#).is_err());
        assert!(syn::parse_str::<EntryArgs>(r#"worker_threads = "4""#).is_err());
        assert!(syn::parse_str::<EntryArgs>("clock = 1").is_err());
        assert!(syn::parse_str::<EntryArgs>(r#"clock = "system", clock = "virtual""#).is_err());
    }

    #[test]
    fn clock_expands_to_path() {
        let tokens = ClockArg::Virtual.to_token_stream().to_string();
        assert_eq!(tokens, ":: strand :: Clock :: Virtual");
    }
}
