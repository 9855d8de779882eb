//! Macro for implementing Display and FromStr for stored enums
//!
//! Status and tag enums are persisted as lowercase text columns. This macro
//! generates both directions of the conversion from a single mapping so the
//! stored spelling is declared once.
//!
//! # Example
//!
//! ```rust
//! use metasync_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum ReplayState {
//!     Queued,
//!     Replayed,
//! }
//!
//! impl_domain_status_conversions!(ReplayState {
//!     Queued => "queued",
//!     Replayed => "replayed",
//! });
//!
//! assert_eq!(ReplayState::Queued.to_string(), "queued");
//! assert_eq!("REPLAYED".parse::<ReplayState>(), Ok(ReplayState::Replayed));
//! ```

/// Implements Display and FromStr traits for stored enums
///
/// * `Display` writes the declared string.
/// * `FromStr` parses case-insensitively and reports the enum name on
///   failure.
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
