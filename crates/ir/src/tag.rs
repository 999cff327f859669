//! Identity keys for values and basic blocks.
//!
//! A tag is compared by an id that is allocated once per construction. The
//! display name only exists for diagnostics and re-serialization, so two tags
//! carrying the same name are still distinct keys.
use std::{
    cmp, fmt,
    hash::{Hash, Hasher},
    sync::atomic::{AtomicU64, Ordering},
};

use smol_str::SmolStr;

static NEXT_TAG_ID: AtomicU64 = AtomicU64::new(0);

fn fresh_id() -> u64 {
    NEXT_TAG_ID.fetch_add(1, Ordering::Relaxed)
}

macro_rules! define_tag {
    ($(#[$attr:meta])* $name:ident, $prefix:literal) => {
        $(#[$attr])*
        #[derive(Clone)]
        pub struct $name {
            id: u64,
            name: SmolStr,
        }

        impl $name {
            pub fn new(name: impl Into<SmolStr>) -> Self {
                Self {
                    id: fresh_id(),
                    name: name.into(),
                }
            }

            pub fn anonymous() -> Self {
                Self::new("")
            }

            /// Returns the preferred display name. May be empty.
            pub fn name(&self) -> &str {
                &self.name
            }

            pub fn id(&self) -> u64 {
                self.id
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.id == other.id
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.id.hash(state)
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> cmp::Ordering {
                self.id.cmp(&other.id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.name.is_empty() {
                    write!(f, "{}{}", $prefix, self.id)
                } else {
                    f.write_str(&self.name)
                }
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", self, self.id)
            }
        }
    };
}

define_tag!(
    /// Names a value: a block parameter or the result of a named instruction.
    ValueTag,
    "%"
);

define_tag!(
    /// Names a basic block.
    BasicBlockTag,
    "@"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_not_name() {
        let a = ValueTag::new("x");
        let b = ValueTag::new("x");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn creation_order() {
        let first = BasicBlockTag::new("entry");
        let second = BasicBlockTag::anonymous();
        assert!(first < second);
        assert!(second.to_string().starts_with('@'));
    }
}
