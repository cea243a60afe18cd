//! Procedural macros for dash-dispatch

use darling::{FromDeriveInput, FromVariant};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

/// Container-level attributes for #[derive(Action)]
#[derive(Debug, FromDeriveInput)]
#[darling(attributes(action), supports(enum_any))]
struct ActionOpts {
    ident: syn::Ident,
    data: darling::ast::Data<ActionVariant, ()>,
}

/// Variant-level attributes
#[derive(Debug, FromVariant)]
#[darling(attributes(action))]
struct ActionVariant {
    ident: syn::Ident,
    fields: darling::ast::Fields<()>,

    /// Explicit gateway name override
    #[darling(default)]
    name: Option<String>,
}

/// Convert PascalCase to kebab-case, keeping acronyms together
///
/// `FlipResource` becomes `flip-resource`, `GetAPIStatus` becomes `get-api-status`.
fn to_kebab_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::new();
    for (i, &ch) in chars.iter().enumerate() {
        if ch.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                None => false,
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) => p.is_uppercase() && next.is_some_and(char::is_lowercase),
            };
            if boundary {
                result.push('-');
            }
            result.extend(ch.to_lowercase());
        } else {
            result.push(ch);
        }
    }
    result
}

/// Check a gateway name the same way `ActionName::new` does
fn is_valid_action_name(name: &str) -> bool {
    const DERIVED_SUFFIXES: [&str; 3] = ["_result", "_error", "_loading"];

    !name.is_empty()
        && !name.contains('/')
        && !DERIVED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Derive macro for the `Action` and `ActionPayload` traits
///
/// Each variant maps to one gateway action. The name defaults to the
/// kebab-case variant name and can be overridden with
/// `#[action(name = "...")]`.
///
/// Variants are either unit variants (sent as `{}`, input ignored on decode)
/// or newtype variants wrapping a `Serialize + DeserializeOwned` input type.
///
/// # Example
/// ```ignore
/// #[derive(Action, Clone, Debug)]
/// enum DashboardAction {
///     FlipResource(FlipResourceInput),
///     #[action(name = "get-analytics")]
///     Analytics(AnalyticsInput),
///     Ping,
/// }
///
/// let action = DashboardAction::Ping;
/// assert_eq!(action.name(), "ping");
/// assert_eq!(DashboardAction::names(), &["flip-resource", "get-analytics", "ping"]);
/// ```
#[proc_macro_derive(Action, attributes(action))]
pub fn derive_action(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let opts = match ActionOpts::from_derive_input(&input) {
        Ok(opts) => opts,
        Err(e) => return e.write_errors().into(),
    };

    match expand_action(&opts) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(e) => e.to_compile_error().into(),
    }
}

fn expand_action(opts: &ActionOpts) -> syn::Result<TokenStream2> {
    let name = &opts.ident;

    let variants = match &opts.data {
        darling::ast::Data::Enum(variants) => variants,
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "Action can only be derived for enums",
            ))
        }
    };

    let mut name_arms = Vec::new();
    let mut payload_arms = Vec::new();
    let mut decode_arms = Vec::new();
    let mut action_names: Vec<String> = Vec::new();

    for v in variants {
        let variant = &v.ident;
        let action_name = v
            .name
            .clone()
            .unwrap_or_else(|| to_kebab_case(&variant.to_string()));

        if !is_valid_action_name(&action_name) {
            return Err(syn::Error::new_spanned(
                variant,
                format!(
                    "action name {:?} must be non-empty, contain no '/' and not end in _result, _error or _loading",
                    action_name
                ),
            ));
        }
        if action_names.contains(&action_name) {
            return Err(syn::Error::new_spanned(
                variant,
                format!("duplicate action name {:?}", action_name),
            ));
        }

        match v.fields.style {
            darling::ast::Style::Unit => {
                name_arms.push(quote! { #name::#variant => #action_name });
                payload_arms.push(quote! {
                    #name::#variant => ::core::result::Result::Ok(
                        ::dash_dispatch::serde_json::Value::Object(
                            ::dash_dispatch::serde_json::Map::new(),
                        ),
                    )
                });
                decode_arms.push(quote! {
                    #action_name => ::core::result::Result::Ok(#name::#variant)
                });
            }
            darling::ast::Style::Tuple if v.fields.len() == 1 => {
                name_arms.push(quote! { #name::#variant(..) => #action_name });
                payload_arms.push(quote! {
                    #name::#variant(input) => ::dash_dispatch::serde_json::to_value(input)
                });
                decode_arms.push(quote! {
                    #action_name => ::dash_dispatch::serde_json::from_value(data)
                        .map(#name::#variant)
                        .map_err(|source| ::dash_dispatch::DecodeError::InvalidPayload {
                            action: #action_name.to_string(),
                            source,
                        })
                });
            }
            _ => {
                return Err(syn::Error::new_spanned(
                    variant,
                    "Action variants must be unit variants or wrap exactly one input type",
                ))
            }
        }

        action_names.push(action_name);
    }

    Ok(quote! {
        impl ::dash_dispatch::Action for #name {
            fn name(&self) -> &'static str {
                match self {
                    #(#name_arms),*
                }
            }
        }

        impl ::dash_dispatch::ActionPayload for #name {
            fn payload(
                &self,
            ) -> ::core::result::Result<
                ::dash_dispatch::serde_json::Value,
                ::dash_dispatch::serde_json::Error,
            > {
                match self {
                    #(#payload_arms),*
                }
            }

            #[allow(unused_variables)]
            fn decode(
                name: &str,
                data: ::dash_dispatch::serde_json::Value,
            ) -> ::core::result::Result<Self, ::dash_dispatch::DecodeError> {
                match name {
                    #(#decode_arms,)*
                    other => ::core::result::Result::Err(
                        ::dash_dispatch::DecodeError::UnknownAction(other.to_string()),
                    ),
                }
            }

            fn names() -> &'static [&'static str] {
                &[#(#action_names),*]
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_kebab_case() {
        assert_eq!(to_kebab_case("FlipResource"), "flip-resource");
        assert_eq!(to_kebab_case("TestApiConnection"), "test-api-connection");
        assert_eq!(to_kebab_case("GetAPIStatus"), "get-api-status");
        assert_eq!(to_kebab_case("Ping"), "ping");
        assert_eq!(to_kebab_case("Get2Fa"), "get2-fa");
    }

    #[test]
    fn test_is_valid_action_name() {
        assert!(is_valid_action_name("get-cache-rule-status"));
        assert!(is_valid_action_name("my_action"));
        assert!(is_valid_action_name("getAnalytics"));
        assert!(!is_valid_action_name(""));
        assert!(!is_valid_action_name("zones/purge"));
        assert!(!is_valid_action_name("flip_result"));
        assert!(!is_valid_action_name("flip_loading"));
    }
}
