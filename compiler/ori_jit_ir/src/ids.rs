//! Identifier newtypes for JIT-time snapshots.
//!
//! Two families live here:
//!
//! - **Foreign identifiers** describe things that exist in the owning
//!   process: [`RemoteAddr`], [`PropertyId`], [`LocalFunctionId`],
//!   [`SourceContextId`], [`FunctionNumber`], [`ProfileId`] and
//!   [`InlineCacheIndex`]. They are copied verbatim from the live runtime and
//!   only ever compared.
//! - **Arena indices** ([`SnapshotId`], [`BodyId`], [`RuntimeId`],
//!   [`ProfileSlotId`]) and arena ranges point into a
//!   [`SnapshotArena`](crate::SnapshotArena) and are meaningless outside it.

use std::fmt;

/// An address inside the owning process.
///
/// Snapshots are read by a compiler that may live in another process, so
/// addresses are carried as plain integers. This layer never turns one back
/// into a reference: the only operations are equality, hashing and access to
/// the raw value for emission into generated code.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
#[cfg_attr(feature = "transport", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct RemoteAddr(u64);

impl RemoteAddr {
    /// The null address.
    pub const NULL: RemoteAddr = RemoteAddr(0);

    /// Wrap a raw address value.
    #[inline]
    pub const fn new(raw: u64) -> Self {
        RemoteAddr(raw)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns `true` for the null address.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for RemoteAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "RemoteAddr::NULL")
        } else {
            write!(f, "RemoteAddr(0x{:X})", self.0)
        }
    }
}

/// Defines plain foreign identifier newtypes.
///
/// Each generated type has `new()`, `raw()`, `Debug` as `TypeName(n)` and
/// `Display` as the bare number.
macro_rules! define_foreign_id {
    ($($(#[$meta:meta])* $name:ident($repr:ty);)*) => { $(
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
        #[cfg_attr(feature = "transport", derive(serde::Serialize, serde::Deserialize))]
        #[repr(transparent)]
        pub struct $name($repr);

        impl $name {
            #[inline]
            pub const fn new(raw: $repr) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn raw(self) -> $repr {
                self.0
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    )* };
}

define_foreign_id! {
    /// Runtime property identifier (the key of a shared property guard).
    PropertyId(u32);
    /// Function id local to its source context.
    LocalFunctionId(u32);
    /// Identifier of the source file/context a function was parsed from.
    SourceContextId(u32);
    /// Process-wide function number, used in debug output.
    FunctionNumber(u32);
    /// Index of a profiled call site within a function body.
    ProfileId(u16);
    /// Index of an inline cache within a function body.
    InlineCacheIndex(u32);
}

impl ProfileId {
    /// Slot index into a call-site list.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl InlineCacheIndex {
    /// Slot index into an inline-cache list.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Defines arena index newtypes.
///
/// Indices are dense `u32` positions; `Debug` prints `TypeName(n)`.
macro_rules! define_arena_id {
    ($($(#[$meta:meta])* $name:ident;)*) => { $(
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Hash)]
        #[cfg_attr(feature = "transport", derive(serde::Serialize, serde::Deserialize))]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            #[inline]
            pub const fn new(index: u32) -> Self {
                Self(index)
            }

            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }

            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    )* };
}

define_arena_id! {
    /// Index of a [`SnapshotRecord`](crate::SnapshotRecord).
    SnapshotId;
    /// Index of a [`BodyRecord`](crate::BodyRecord).
    BodyId;
    /// Index of a [`RuntimeRecord`](crate::RuntimeRecord).
    RuntimeId;
    /// Index of a [`ProfileRecord`](crate::ProfileRecord).
    ProfileSlotId;
}

/// Defines range types over the arena's flat lists.
///
/// Each generated type has:
/// - `start: u32` and `len: u32` fields
/// - `EMPTY` constant
/// - `new()`, `is_empty()`, `len()`, `end()` methods
/// - `Debug` implementation showing the range as `TypeName(start..end)`
macro_rules! define_range {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => { $(
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
        #[cfg_attr(feature = "transport", derive(serde::Serialize, serde::Deserialize))]
        #[repr(C)]
        pub struct $name {
            pub start: u32,
            pub len: u32,
        }

        impl $name {
            pub const EMPTY: Self = Self { start: 0, len: 0 };

            #[inline]
            pub const fn new(start: u32, len: u32) -> Self {
                Self { start, len }
            }

            #[inline]
            pub const fn is_empty(&self) -> bool {
                self.len == 0
            }

            #[inline]
            pub const fn len(&self) -> usize {
                self.len as usize
            }

            /// One past the last index, widened so it cannot overflow.
            #[inline]
            pub const fn end(&self) -> u64 {
                self.start as u64 + self.len as u64
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}({}..{})", stringify!($name), self.start, self.end())
            }
        }
    )* };
}

define_range!(
    /// Inlinee slots (`Option<SnapshotId>`), one per call site or inline cache.
    SlotRange,
    /// Cloned inline-cache addresses.
    AddrRange,
    /// Shared property-guard ids.
    GuardRange,
    /// Type-specialization records.
    TypeSpecRange,
);

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    #[test]
    fn test_remote_addr_null() {
        assert!(RemoteAddr::NULL.is_null());
        assert!(RemoteAddr::default().is_null());
        assert!(!RemoteAddr::new(0x1000).is_null());
        assert_eq!(RemoteAddr::new(0xBEEF).raw(), 0xBEEF);
    }

    #[test]
    fn test_remote_addr_debug() {
        assert_eq!(format!("{:?}", RemoteAddr::NULL), "RemoteAddr::NULL");
        assert_eq!(format!("{:?}", RemoteAddr::new(0xAB0)), "RemoteAddr(0xAB0)");
    }

    #[test]
    fn test_remote_addr_hash() {
        let mut set = HashSet::new();
        set.insert(RemoteAddr::new(8));
        set.insert(RemoteAddr::new(8));
        set.insert(RemoteAddr::new(16));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_foreign_id_formatting() {
        assert_eq!(format!("{:?}", PropertyId::new(42)), "PropertyId(42)");
        assert_eq!(format!("{}", SourceContextId::new(3)), "3");
        assert_eq!(ProfileId::new(7).index(), 7);
        assert_eq!(InlineCacheIndex::new(9).index(), 9);
    }

    #[test]
    fn test_arena_id_debug() {
        assert_eq!(format!("{:?}", SnapshotId::new(4)), "SnapshotId(4)");
        assert_eq!(BodyId::new(2).index(), 2);
    }

    #[test]
    fn test_range_empty_constant() {
        assert!(SlotRange::EMPTY.is_empty());
        assert!(AddrRange::EMPTY.is_empty());
        assert!(GuardRange::EMPTY.is_empty());
        assert!(TypeSpecRange::EMPTY.is_empty());
        assert_eq!(SlotRange::default(), SlotRange::EMPTY);
    }

    #[test]
    fn test_range_end_does_not_overflow() {
        let range = GuardRange::new(u32::MAX, u32::MAX);
        assert_eq!(range.end(), 2 * u64::from(u32::MAX));
    }

    #[test]
    fn test_range_debug_format() {
        assert_eq!(format!("{:?}", SlotRange::new(5, 3)), "SlotRange(5..8)");
    }
}
