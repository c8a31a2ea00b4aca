//! Build script for storefront crate.
//!
//! Generates content-based hashes for static assets so templates can append
//! a cache-busting `?v=` query.

use std::env;
use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Static asset and the environment variable its hash is exported as.
const ASSETS: [(&str, &str); 3] = [
    ("static/css/main.css", "CSS_HASH"),
    ("static/js/cart.js", "CART_JS_HASH"),
    ("static/js/checkout.js", "CHECKOUT_JS_HASH"),
];

fn main() {
    let manifest_dir =
        env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR must be set by Cargo");

    for (relative, var) in ASSETS {
        hash_asset(&Path::new(&manifest_dir).join(relative), var);
    }
}

/// Set `var` to the first 8 hex chars of the file's SHA-256.
fn hash_asset(path: &Path, var: &str) {
    println!("cargo:rerun-if-changed={}", path.display());

    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) => {
            println!("cargo:warning=Could not read {}: {e}", path.display());
            println!("cargo:rustc-env={var}=");
            return;
        }
    };

    let hash = format!("{:x}", Sha256::digest(&content));
    println!("cargo:rustc-env={var}={}", &hash[..8]);
}
