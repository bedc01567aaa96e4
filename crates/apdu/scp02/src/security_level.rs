//! Security level negotiated for an SCP02 channel

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::{Error, Result};

/// Set of protections applied to commands and responses
///
/// The raw bits are sent as P1 of EXTERNAL AUTHENTICATE.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SecurityLevel(u8);

impl SecurityLevel {
    /// No secure messaging
    pub const NONE: Self = Self(0x00);
    /// Command authentication
    pub const C_MAC: Self = Self(0x01);
    /// Command data encryption
    pub const C_DECRYPTION: Self = Self(0x02);
    /// Response authentication
    pub const R_MAC: Self = Self(0x10);
    /// Response data encryption
    pub const R_DECRYPTION: Self = Self(0x20);

    const ALL: u8 = 0x33;

    /// Build a level from raw bits, rejecting bits SCP02 does not define
    pub const fn from_bits(bits: u8) -> Result<Self> {
        if bits & !Self::ALL != 0 {
            return Err(Error::InvalidSecurityLevel("undefined security level bits"));
        }
        Ok(Self(bits))
    }

    /// The raw bits
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every bit of `other` is set in `self`
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no protection is requested
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Union of two levels
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Command MACs are applied
    pub const fn has_cmac(self) -> bool {
        self.contains(Self::C_MAC)
    }

    /// Command data is encrypted
    pub const fn has_cdecryption(self) -> bool {
        self.contains(Self::C_DECRYPTION)
    }

    /// Response MACs are verified
    pub const fn has_rmac(self) -> bool {
        self.contains(Self::R_MAC)
    }

    /// Response data encryption was requested
    pub const fn has_rdecryption(self) -> bool {
        self.contains(Self::R_DECRYPTION)
    }

    /// Check the combination rules: encryption always needs the matching MAC
    pub const fn validate(self) -> Result<()> {
        if self.has_cdecryption() && !self.has_cmac() {
            return Err(Error::InvalidSecurityLevel(
                "C_DECRYPTION must be combined with C_MAC",
            ));
        }
        if self.has_rdecryption() && !self.has_rmac() {
            return Err(Error::InvalidSecurityLevel(
                "R_DECRYPTION must be combined with R_MAC",
            ));
        }
        Ok(())
    }
}

impl BitOr for SecurityLevel {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for SecurityLevel {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

impl fmt::Debug for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecurityLevel({self})")
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        let names = [
            (Self::C_MAC, "C_MAC"),
            (Self::C_DECRYPTION, "C_DECRYPTION"),
            (Self::R_MAC, "R_MAC"),
            (Self::R_DECRYPTION, "R_DECRYPTION"),
        ];
        let mut first = true;
        for (level, name) in names {
            if self.contains(level) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}
