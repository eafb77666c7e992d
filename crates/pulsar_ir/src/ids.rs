//! Opaque ID newtypes for IR entities.
//!
//! Each ID is a `u32` wrapper created by [`Arena::alloc`](crate::arena::Arena::alloc)
//! and used for O(1) lookup into the owning [`System`](crate::system::System).

use crate::arena::ArenaId;
use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            /// Creates an ID from a raw `u32` index.
            pub fn from_raw(index: u32) -> Self {
                Self(index)
            }

            /// Returns the raw `u32` index.
            pub fn as_raw(self) -> u32 {
                self.0
            }
        }

        impl ArenaId for $name {
            fn from_raw(index: u32) -> Self {
                Self(index)
            }

            fn as_raw(self) -> u32 {
                self.0
            }
        }
    };
}

define_id!(
    /// ID of a module in the system.
    ModuleId
);

define_id!(
    /// ID of a FIFO port on an event-driven module.
    PortId
);

define_id!(
    /// ID of a register array.
    ArrayId
);

define_id!(
    /// ID of a directed wire on an externally-implemented module.
    WireId
);

define_id!(
    /// ID of an expression node.
    ExprId
);

define_id!(
    /// ID of a statement block.
    BlockId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_roundtrip() {
        let id = ExprId::from_raw(42);
        assert_eq!(id.as_raw(), 42);
    }

    #[test]
    fn ordering_follows_allocation() {
        assert!(ModuleId::from_raw(0) < ModuleId::from_raw(1));
    }

    #[test]
    fn serde_roundtrip() {
        let id = PortId::from_raw(9);
        let json = serde_json::to_string(&id).unwrap();
        let back: PortId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
