//! Newtype IDs for type-safe entity references.
//!
//! Use the `define_id!` macro to create type-safe ID wrappers that prevent
//! accidentally mixing identifiers from different entity types. Identifiers
//! coming from the remote API are opaque strings, so the wrappers are
//! string-backed.

use thiserror::Error;

/// Errors that can occur when parsing an ID.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The input was empty or only whitespace.
    #[error("{kind} cannot be empty")]
    Empty {
        /// Name of the ID type being parsed.
        kind: &'static str,
    },
    /// The input is too long.
    #[error("{kind} must be at most {max} characters")]
    TooLong {
        /// Name of the ID type being parsed.
        kind: &'static str,
        /// Maximum allowed length.
        max: usize,
    },
}

/// Macro to define a type-safe, string-backed ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - `parse()` that trims input and rejects empty or oversized values
/// - `Display`, `AsRef<str>` and `FromStr`
///
/// # Example
///
/// ```rust
/// # use reboul_core::define_id;
/// define_id!(UserId);
/// define_id!(OrderId);
///
/// let user_id = UserId::parse("u-1").unwrap();
/// let order_id = OrderId::parse("u-1").unwrap();
///
/// // These are different types, so this won't compile:
/// // let _: UserId = order_id;
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
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Maximum length of the identifier.
            pub const MAX_LENGTH: usize = 128;

            /// Parse an ID from a string, trimming surrounding whitespace.
            ///
            /// # Errors
            ///
            /// Returns an error if the trimmed input is empty or longer than
            /// `MAX_LENGTH` characters.
            pub fn parse(s: &str) -> ::core::result::Result<Self, $crate::IdError> {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err($crate::IdError::Empty {
                        kind: stringify!($name),
                    });
                }
                if trimmed.chars().count() > Self::MAX_LENGTH {
                    return Err($crate::IdError::TooLong {
                        kind: stringify!($name),
                        max: Self::MAX_LENGTH,
                    });
                }
                Ok(Self(trimmed.to_owned()))
            }

            /// Get the underlying string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the ID and return its inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl ::core::convert::AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

// Identity of an authenticated customer, as issued by the remote API.
define_id!(UserId);
// Product identity of a cart line.
define_id!(ItemKey);
