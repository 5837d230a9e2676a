//! Test attributes that run the body on a watchdog thread and fail the test
//! when it overruns its budget (default 60 seconds).
//!
//! ```ignore
//! #[test_timeout::timeout(5)]
//! fn parses_quickly() { /* ... */ }
//!
//! #[test_timeout::tokio_timeout_test]
//! async fn talks_to_socket() { /* ... */ }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Attribute, ItemFn, LitInt};

const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Flavor {
    Sync,
    Tokio,
}

#[proc_macro_attribute]
pub fn timeout(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, Flavor::Sync)
}

#[proc_macro_attribute]
pub fn tokio_timeout_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, Flavor::Tokio)
}

fn expand(attr: TokenStream, item: TokenStream, flavor: Flavor) -> TokenStream {
    let secs = if attr.is_empty() {
        DEFAULT_TIMEOUT_SECS
    } else {
        let lit = parse_macro_input!(attr as LitInt);
        match parse_secs(&lit) {
            Ok(secs) => secs,
            Err(err) => return err.to_compile_error().into(),
        }
    };

    let ItemFn {
        attrs,
        vis,
        mut sig,
        block,
    } = parse_macro_input!(item as ItemFn);

    match (flavor, sig.asyncness.is_some()) {
        (Flavor::Sync, true) => {
            return syn::Error::new_spanned(
                &sig.ident,
                "timeout expects a synchronous test function; use tokio_timeout_test",
            )
            .to_compile_error()
            .into();
        }
        (Flavor::Tokio, false) => {
            return syn::Error::new_spanned(
                &sig.ident,
                "tokio_timeout_test can only be applied to async functions",
            )
            .to_compile_error()
            .into();
        }
        _ => {}
    }
    sig.asyncness = None;

    let attrs: Vec<Attribute> = attrs
        .into_iter()
        .filter(|attr| !is_test_marker(attr))
        .collect();

    let body: TokenStream2 = match flavor {
        Flavor::Sync => quote! { (|| #block)() },
        Flavor::Tokio => quote! {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to build Tokio runtime")
                .block_on(async {
                    tokio::time::timeout(budget, async move #block)
                        .await
                        .expect("test timed out");
                })
        },
    };

    TokenStream::from(quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            let budget = std::time::Duration::from_secs(#secs);
            let (sender, receiver) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    #body
                }));
                let _ = sender.send(result);
            });
            match receiver.recv_timeout(budget) {
                Ok(Ok(_)) => {}
                Ok(Err(payload)) => std::panic::resume_unwind(payload),
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => panic!("test timed out"),
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    panic!("test thread failed before reporting result")
                }
            }
        }
    })
}

fn parse_secs(lit: &LitInt) -> syn::Result<u64> {
    let secs: u64 = lit.base10_parse()?;
    if secs == 0 {
        return Err(syn::Error::new_spanned(lit, "timeout must be greater than zero"));
    }
    Ok(secs)
}

/// Drops `#[test]` and `#[tokio::test]` so the generated `#[test]` is the only one.
fn is_test_marker(attr: &Attribute) -> bool {
    let idents: Vec<String> = attr
        .path()
        .segments
        .iter()
        .map(|segment| segment.ident.to_string())
        .collect();
    matches!(
        idents.iter().map(String::as_str).collect::<Vec<_>>().as_slice(),
        ["test"] | ["tokio", "test"]
    )
}
