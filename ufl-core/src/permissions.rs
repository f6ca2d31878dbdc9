// SPDX-License-Identifier: AGPL-3.0-or-later
//! Unix-style permission bits with an applicability mask
//!
//! Backends differ in what they can report. A plain network share knows
//! whether a file is readable and writable but has no notion of execute or of
//! owner/group/other. Bits a backend cannot report are cleared from the
//! *mask* instead of being reported as denied.

use serde::{Deserialize, Serialize};
use std::fmt;

const ALL_BITS: u16 = 0o777;

/// Kind of access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
    Execute,
}

/// Access class a permission applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Class {
    Owner,
    Group,
    Other,
}

impl Access {
    pub const ALL: [Access; 3] = [Access::Read, Access::Write, Access::Execute];

    fn shift(self) -> u16 {
        match self {
            Access::Read => 2,
            Access::Write => 1,
            Access::Execute => 0,
        }
    }
}

impl Class {
    pub const ALL: [Class; 3] = [Class::Owner, Class::Group, Class::Other];

    fn shift(self) -> u16 {
        match self {
            Class::Owner => 6,
            Class::Group => 3,
            Class::Other => 0,
        }
    }
}

fn bit(access: Access, class: Class) -> u16 {
    1 << (access.shift() + class.shift())
}

/// Replicate a single access flag across owner, group and other
fn all_classes(access: Access) -> u16 {
    Class::ALL.iter().fold(0, |acc, c| acc | bit(access, *c))
}

/// Immutable 3×3 permission grid plus the mask of bits that mean something
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionBits {
    bits: u16,
    mask: u16,
}

impl PermissionBits {
    /// Bits outside `mask` (and outside 0o777) are dropped.
    pub fn new(bits: u16, mask: u16) -> Self {
        let mask = mask & ALL_BITS;
        Self {
            bits: bits & mask,
            mask,
        }
    }

    /// Fully meaningful unix mode; file-type bits are ignored.
    pub fn from_mode(mode: u32) -> Self {
        Self::new((mode & ALL_BITS as u32) as u16, ALL_BITS)
    }

    /// Everything allowed and meaningful
    pub fn all() -> Self {
        Self::new(ALL_BITS, ALL_BITS)
    }

    /// Nothing known about the resource
    pub fn unknown() -> Self {
        Self::new(0, 0)
    }

    /// Build from coarse flags of a backend with no owner/group/other
    /// distinction.
    ///
    /// Each flag is replicated across the three classes, so asking whether
    /// group may write gets the same answer as asking about the owner. When
    /// the backend does not know about execute, the execute bits are masked
    /// out.
    pub fn combine(readable: bool, writable: bool, executable: Option<bool>) -> Self {
        let mut bits = 0;
        let mut mask = all_classes(Access::Read) | all_classes(Access::Write);
        if readable {
            bits |= all_classes(Access::Read);
        }
        if writable {
            bits |= all_classes(Access::Write);
        }
        if let Some(executable) = executable {
            mask |= all_classes(Access::Execute);
            if executable {
                bits |= all_classes(Access::Execute);
            }
        }
        Self::new(bits, mask)
    }

    pub fn bits(&self) -> u16 {
        self.bits
    }

    pub fn mask(&self) -> u16 {
        self.mask
    }

    /// Copy with every bit outside `mask` cleared and marked not applicable
    pub fn masked(&self, mask: u16) -> Self {
        Self::new(self.bits, self.mask & mask)
    }

    /// Same mask, write bits removed
    pub fn read_only(&self) -> Self {
        Self::new(self.bits & !all_classes(Access::Write), self.mask)
    }

    pub fn can(&self, access: Access, class: Class) -> bool {
        self.bits & bit(access, class) != 0
    }

    pub fn is_applicable(&self, access: Access, class: Class) -> bool {
        self.mask & bit(access, class) != 0
    }

    pub fn is_readable(&self) -> bool {
        self.bits & all_classes(Access::Read) != 0
    }

    pub fn is_writable(&self) -> bool {
        self.bits & all_classes(Access::Write) != 0
    }

    pub fn is_executable(&self) -> bool {
        self.bits & all_classes(Access::Execute) != 0
    }
}

impl Default for PermissionBits {
    fn default() -> Self {
        Self::unknown()
    }
}

/// `rwxr-x---`, with `?` for bits the backend cannot report
impl fmt::Display for PermissionBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for class in Class::ALL {
            for (access, letter) in Access::ALL.into_iter().zip(['r', 'w', 'x']) {
                let c = if !self.is_applicable(access, class) {
                    '?'
                } else if self.can(access, class) {
                    letter
                } else {
                    '-'
                };
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked() {
        let full = PermissionBits::from_mode(0o777);
        let masked = full.masked(0o600);
        assert_eq!(masked.bits(), 0o600);
        assert_eq!(masked.mask(), 0o600);
        assert!(!masked.is_applicable(Access::Read, Class::Group));
    }

    #[test]
    fn test_combine_read_only_without_execute() {
        let p = PermissionBits::combine(true, false, None);
        for class in Class::ALL {
            assert!(p.can(Access::Read, class));
            assert!(!p.can(Access::Write, class));
            assert!(p.is_applicable(Access::Read, class));
            assert!(p.is_applicable(Access::Write, class));
            assert!(!p.is_applicable(Access::Execute, class));
        }
        assert_eq!(p.bits(), 0o444);
        assert_eq!(p.mask(), 0o666);
        assert_eq!(p.to_string(), "r-?r-?r-?");
    }

    #[test]
    fn test_combine_with_execute() {
        let p = PermissionBits::combine(true, true, Some(true));
        assert_eq!(p.bits(), 0o777);
        assert_eq!(p.mask(), 0o777);
        let p = PermissionBits::combine(false, true, Some(false));
        assert_eq!(p.bits(), 0o222);
        assert_eq!(p.mask(), 0o777);
    }

    #[test]
    fn test_group_answer_matches_owner() {
        let p = PermissionBits::combine(true, true, None);
        assert_eq!(
            p.can(Access::Write, Class::Group),
            p.can(Access::Write, Class::Owner)
        );
    }

    #[test]
    fn test_from_mode_ignores_file_type() {
        let p = PermissionBits::from_mode(0o100644);
        assert_eq!(p.bits(), 0o644);
        assert_eq!(p.to_string(), "rw-r--r--");
        assert!(p.can(Access::Read, Class::Other));
        assert!(!p.can(Access::Write, Class::Group));
    }

    #[test]
    fn test_bits_outside_mask_dropped() {
        let p = PermissionBits::new(0o777, 0o700);
        assert_eq!(p.bits(), 0o700);
        assert_eq!(p.to_string(), "rwx??????");
    }

    #[test]
    fn test_read_only() {
        let p = PermissionBits::from_mode(0o755).read_only();
        assert_eq!(p.bits(), 0o555);
        assert_eq!(p.mask(), 0o777);
        assert!(!p.is_writable());
    }

    #[test]
    fn test_unknown() {
        let p = PermissionBits::unknown();
        assert!(!p.is_readable());
        assert_eq!(p.to_string(), "?????????");
    }
}
