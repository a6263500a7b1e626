//! Closed enumerations used by compilation requests.
//!
//! All enums serialize as the lowercase (or `O<n>`) strings accepted in
//! request documents, and parse back with `FromStr` for command-line use.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Accepted spellings, in declaration order.
            pub const NAMES: &'static [&'static str] = &[$($text),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!(
                        "unsupported {} '{other}', expected one of: {}",
                        stringify!($name),
                        Self::NAMES.join(", ")
                    )),
                }
            }
        }
    };
}

string_enum!(
    /// Backend the IR program is compiled for.
    Target {
        #[default]
        Cuda => "cuda",
        Cpu => "cpu",
        Vulkan => "vulkan",
        Metal => "metal",
    }
);

string_enum!(
    /// Compiler optimization level, ordered from none to most aggressive.
    OptimizationLevel {
        O0 => "O0",
        O1 => "O1",
        O2 => "O2",
        #[default]
        O3 => "O3",
    }
);

string_enum!(
    /// Container format of the produced artifact.
    OutputFormat {
        #[default]
        Vmfb => "vmfb",
        So => "so",
        Dylib => "dylib",
    }
);

string_enum!(
    MemoryPlanning {
        #[default]
        Default => "default",
        Aggressive => "aggressive",
        Conservative => "conservative",
    }
);

impl OutputFormat {
    /// File extension including the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Vmfb => ".vmfb",
            Self::So => ".so",
            Self::Dylib => ".dylib",
        }
    }

    /// Find the format whose extension ends `name`, if any.
    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|f| name.ends_with(f.extension()))
    }
}

/// Parse a `major.minor` version string such as `"1.3"` or `"15.0"`.
///
/// A bare major (`"15"`) is accepted as `major.0`. Anything else is `None`.
pub fn parse_version(s: &str) -> Option<(u32, u32)> {
    let s = s.trim();
    let (major, minor) = match s.split_once('.') {
        Some((major, minor)) => (major, minor),
        None => (s, "0"),
    };
    if major.is_empty() || minor.is_empty() || minor.contains('.') {
        return None;
    }
    Some((major.parse().ok()?, minor.parse().ok()?))
}
