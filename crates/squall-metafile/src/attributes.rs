//! BEP-47 file attributes.
//!
//! The `attr` value in a file dict is a string of single-letter flags:
//! `x` executable, `l` symlink, `h` hidden, `p` padding. Parsing accepts the
//! letters in any order; rendering is always `x`, `l`, `h`, `p`.

use std::fmt::{self, Display, Formatter};
use std::ops::BitOr;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown file attribute '{0}'")]
pub struct UnknownAttribute(pub char);

/// Set of BEP-47 file attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileAttributes {
    bits: u8,
}

impl FileAttributes {
    pub const SYMLINK: Self = Self { bits: 1 };
    pub const EXECUTABLE: Self = Self { bits: 2 };
    pub const HIDDEN: Self = Self { bits: 4 };
    pub const PADDING: Self = Self { bits: 8 };

    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.bits & other.bits == other.bits
    }

    pub fn insert(&mut self, other: Self) {
        self.bits |= other.bits;
    }

    pub const fn is_symlink(self) -> bool {
        self.contains(Self::SYMLINK)
    }

    pub const fn is_executable(self) -> bool {
        self.contains(Self::EXECUTABLE)
    }

    pub const fn is_hidden(self) -> bool {
        self.contains(Self::HIDDEN)
    }

    pub const fn is_padding(self) -> bool {
        self.contains(Self::PADDING)
    }
}

impl BitOr for FileAttributes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            bits: self.bits | rhs.bits,
        }
    }
}

impl Display for FileAttributes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_executable() {
            f.write_str("x")?;
        }
        if self.is_symlink() {
            f.write_str("l")?;
        }
        if self.is_hidden() {
            f.write_str("h")?;
        }
        if self.is_padding() {
            f.write_str("p")?;
        }
        Ok(())
    }
}

impl FromStr for FileAttributes {
    type Err = UnknownAttribute;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut attributes = Self::empty();
        for c in s.chars() {
            match c {
                'l' => attributes.insert(Self::SYMLINK),
                'x' => attributes.insert(Self::EXECUTABLE),
                'h' => attributes.insert(Self::HIDDEN),
                'p' => attributes.insert(Self::PADDING),
                other => return Err(UnknownAttribute(other)),
            }
        }
        Ok(attributes)
    }
}
