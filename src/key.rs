//! Key kinds and their collision derivation rules.
//!
//! Each supported key type implements [`CollisionKey`], which turns a
//! collision count `n` into a candidate key:
//!
//! | kind        | candidate                                            |
//! |-------------|------------------------------------------------------|
//! | text        | `key + "_" + n`                                      |
//! | integer     | `key + n`, wrapping                                  |
//! | float       | `key + 0.1 * n`                                      |
//! | character   | `n` scalar values later, wrapping to `'\0'`          |
//! | boolean     | `!key`                                               |
//! | enumeration | integer rule on the representation (8/32/64-bit)     |
//!
//! Types outside this set may still implement the trait with its default
//! method; they report [`UnsupportedKeyType`] on every collision.

use crate::error::UnsupportedKeyType;
use core::fmt;
use core::hash::{Hash, Hasher};
use serde::{Deserialize, Serialize};

/// Which derivation rule a key type follows.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum KeyKind {
    Text,
    Integer,
    Float,
    Character,
    Boolean,
    Enumerated,
    Unsupported,
}

/// A key the map can remap on collision.
pub trait CollisionKey: Eq + Hash + Clone + fmt::Debug {
    const KIND: KeyKind = KeyKind::Unsupported;

    /// Candidate for the `n`th collision on `self` (`n >= 1`).
    ///
    /// `Ok(None)` means there is no candidate for this `n`; the caller moves
    /// on to `n + 1`.
    fn derive_key(&self, n: u32) -> Result<Option<Self>, UnsupportedKeyType> {
        let _ = n;
        Err(UnsupportedKeyType::of::<Self>())
    }
}

impl CollisionKey for String {
    const KIND: KeyKind = KeyKind::Text;

    fn derive_key(&self, n: u32) -> Result<Option<Self>, UnsupportedKeyType> {
        Ok(Some(format!("{self}_{n}")))
    }
}

macro_rules! integer_keys {
    ($($t:ty),+ $(,)?) => {$(
        impl CollisionKey for $t {
            const KIND: KeyKind = KeyKind::Integer;

            #[inline]
            fn derive_key(&self, n: u32) -> Result<Option<Self>, UnsupportedKeyType> {
                Ok(Some(self.wrapping_add(n as $t)))
            }
        }
    )+};
}

integer_keys!(i8, u8, i16, u16, i32, u32, i64, u64, isize, usize);

impl CollisionKey for bool {
    const KIND: KeyKind = KeyKind::Boolean;

    fn derive_key(&self, _n: u32) -> Result<Option<Self>, UnsupportedKeyType> {
        Ok(Some(!*self))
    }
}

const SURROGATE_START: u32 = 0xD800;
const SURROGATE_LEN: u32 = 0x800;
// Number of Unicode scalar values.
const SCALAR_COUNT: u64 = 0x11_0000 - SURROGATE_LEN as u64;

// Position of `c` among the scalar values, with the surrogate gap removed.
fn scalar_index(c: char) -> u32 {
    let code = c as u32;
    if code < SURROGATE_START {
        code
    } else {
        code - SURROGATE_LEN
    }
}

fn scalar_at(index: u32) -> Option<char> {
    if index < SURROGATE_START {
        char::from_u32(index)
    } else {
        char::from_u32(index + SURROGATE_LEN)
    }
}

impl CollisionKey for char {
    const KIND: KeyKind = KeyKind::Character;

    fn derive_key(&self, n: u32) -> Result<Option<Self>, UnsupportedKeyType> {
        let index = (u64::from(scalar_index(*self)) + u64::from(n)) % SCALAR_COUNT;
        // `index` is below SCALAR_COUNT, so it fits and maps to a scalar.
        Ok(u32::try_from(index).ok().and_then(scalar_at))
    }
}

macro_rules! float_key {
    ($(#[$meta:meta])* $name:ident, $f:ty, $bits:ty) => {
        $(#[$meta])*
        ///
        /// Equality and hashing use the bit pattern after folding `-0.0` into
        /// `0.0` and every NaN into one canonical NaN, so the type is a valid
        /// hash key.
        #[derive(Copy, Clone, Debug, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $f);

        impl $name {
            fn canonical_bits(self) -> $bits {
                if self.0.is_nan() {
                    <$f>::NAN.to_bits()
                } else if self.0 == 0.0 {
                    0
                } else {
                    self.0.to_bits()
                }
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.canonical_bits() == other.canonical_bits()
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.canonical_bits().hash(state);
            }
        }

        impl From<$f> for $name {
            fn from(v: $f) -> Self {
                $name(v)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl CollisionKey for $name {
            const KIND: KeyKind = KeyKind::Float;

            fn derive_key(&self, n: u32) -> Result<Option<Self>, UnsupportedKeyType> {
                Ok(Some($name(self.0 + 0.1 * n as $f)))
            }
        }
    };
}

float_key!(
    /// Single-precision float usable as a map key.
    F32Key, f32, u32
);
float_key!(
    /// Double-precision float usable as a map key.
    F64Key, f64, u64
);

/// Integer type backing an [`EnumKey`].
pub trait EnumRepr: Copy + Eq + fmt::Debug {
    const BITS: u32;
    const NAME: &'static str;

    /// `self + n`, wrapping at the type's width.
    fn offset(self, n: u32) -> Self;
}

macro_rules! enum_reprs {
    ($($t:ty),+ $(,)?) => {$(
        impl EnumRepr for $t {
            const BITS: u32 = <$t>::BITS;
            const NAME: &'static str = stringify!($t);

            #[inline]
            fn offset(self, n: u32) -> Self {
                self.wrapping_add(n as $t)
            }
        }
    )+};
}

enum_reprs!(i8, u8, i16, u16, i32, u32, i64, u64);

/// A fieldless enumeration that converts to and from its representation.
///
/// Normally implemented through [`collision_enum!`](crate::collision_enum).
pub trait EnumKey: Copy + Eq + Hash + fmt::Debug {
    type Repr: EnumRepr;

    fn to_repr(self) -> Self::Repr;

    /// Variant with the given discriminant, if one exists.
    fn from_repr(repr: Self::Repr) -> Option<Self>;
}

/// Integer rule applied to an enumeration's representation.
///
/// Only 8-, 32- and 64-bit representations are supported. A shifted value
/// that names no variant yields `Ok(None)`.
pub fn derive_enum_key<E: EnumKey>(key: E, n: u32) -> Result<Option<E>, UnsupportedKeyType> {
    match <E::Repr as EnumRepr>::BITS {
        8 | 32 | 64 => Ok(E::from_repr(key.to_repr().offset(n))),
        _ => Err(UnsupportedKeyType::with_underlying::<E>(
            <E::Repr as EnumRepr>::NAME,
        )),
    }
}

/// Declares a fieldless enum usable as a [`CollisionSafeMap`](crate::CollisionSafeMap) key.
///
/// Every variant needs an explicit discriminant. The macro adds
/// `#[repr(..)]` and derives `Clone, Copy, PartialEq, Eq, Hash, Debug`;
/// further attributes (e.g. serde derives) pass through.
///
/// ```
/// use collision_map::{collision_enum, CollisionSafeMap};
///
/// collision_enum! {
///     pub enum Slot: u8 {
///         Head = 0,
///         Body = 1,
///         Feet = 2,
///     }
/// }
///
/// let mut m = CollisionSafeMap::new();
/// m.insert(Slot::Head, "helmet").unwrap();
/// m.insert(Slot::Head, "hat").unwrap();
/// assert_eq!(m.get(&Slot::Body), Some(&"hat"));
/// ```
#[macro_export]
macro_rules! collision_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $repr:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:expr),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
        #[repr($repr)]
        $vis enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl $crate::EnumKey for $name {
            type Repr = $repr;

            fn to_repr(self) -> $repr {
                self as $repr
            }

            fn from_repr(repr: $repr) -> ::core::option::Option<Self> {
                $(
                    if repr == ($value) {
                        return ::core::option::Option::Some($name::$variant);
                    }
                )+
                ::core::option::Option::None
            }
        }

        impl $crate::CollisionKey for $name {
            const KIND: $crate::KeyKind = $crate::KeyKind::Enumerated;

            fn derive_key(
                &self,
                n: u32,
            ) -> ::core::result::Result<::core::option::Option<Self>, $crate::UnsupportedKeyType> {
                $crate::derive_enum_key(*self, n)
            }
        }
    };
}
