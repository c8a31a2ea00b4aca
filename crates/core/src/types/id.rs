//! Newtype IDs for type-safe entity references.
//!
//! Use the `define_id!` macro to create string-backed ID wrappers that
//! prevent accidentally mixing IDs from different entity types. Catalog and
//! processor identifiers are opaque strings, so the wrappers never parse or
//! reformat their contents.

/// Macro to define a type-safe, string-backed ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - `new()`, `as_str()`, `is_empty()`
/// - `Display`, `From<String>`, `From<&str>` and `AsRef<str>`
///
/// # Example
///
/// ```rust
/// # use gi_foundation_core::define_id;
/// define_id!(ProductSlug);
/// define_id!(PaymentRef);
///
/// let product = ProductSlug::new("tote-bag");
/// let payment = PaymentRef::new("tote-bag");
///
/// assert_eq!(product.as_str(), payment.as_str());
/// // These are different types, so this won't compile:
/// // let _: ProductSlug = payment;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Default,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True if the ID is empty or only whitespace.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

// Catalog product identifier (slug or id from the product list).
define_id!(ProductId);
// Local transaction identifier, also used as the processor idempotency key.
define_id!(TransactionId);
// Processor-issued payment identifier.
define_id!(PaymentId);
