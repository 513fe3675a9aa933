//! Access type flags (part of C5).
//!
//! A small hand-rolled flag set rather than a dependency: only three bits
//! are ever in play, and the flags are checked at runtime (never matched
//! exhaustively), so a `bitflags!`-style macro buys little here.
//!
//! `spec.md` §9 notes that a statically typed port could split the driver
//! into distinct `Reader`/`Writer` types and drop the runtime check
//! entirely. This crate keeps the runtime flag instead, because the
//! "access mismatch" scenario (`spec.md` §8, scenario 6) is a testable
//! property of the driver's behavior, not just its type signature — it
//! should produce a catchable error, not fail to compile.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessType(u8);

impl AccessType {
    const READ_BIT: u8 = 0b001;
    const APPEND_BIT: u8 = 0b010;
    const OVERWRITE_BIT: u8 = 0b100;

    pub const READ: AccessType = AccessType(Self::READ_BIT);
    pub const APPEND: AccessType = AccessType(Self::APPEND_BIT);
    pub const WRITE: AccessType = AccessType(Self::APPEND_BIT | Self::OVERWRITE_BIT);

    pub fn contains(&self, required: AccessType) -> bool {
        self.0 & required.0 == required.0
    }
}

impl std::ops::BitOr for AccessType {
    type Output = AccessType;

    fn bitor(self, rhs: AccessType) -> AccessType {
        AccessType(self.0 | rhs.0)
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.0 & Self::READ_BIT != 0 {
            names.push("READ");
        }
        if self.0 & Self::APPEND_BIT != 0 {
            names.push("APPEND");
        }
        if self.0 & Self::OVERWRITE_BIT != 0 {
            names.push("OVERWRITE");
        }
        write!(f, "{}", names.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_contains_append_but_not_read() {
        assert!(AccessType::WRITE.contains(AccessType::APPEND));
        assert!(!AccessType::WRITE.contains(AccessType::READ));
    }

    #[test]
    fn read_does_not_contain_append() {
        assert!(!AccessType::READ.contains(AccessType::APPEND));
    }
}
