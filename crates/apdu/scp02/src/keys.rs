//! Static and session key material
//!
//! Long-term keys are looked up through a [`KeyProvider`] by key identifier and
//! key version number. Session keys are derived once per handshake and owned
//! by the session that derived them; both are wiped from memory on drop.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    Error, Result,
    constants::{derivation, key_id},
    crypto::{SequenceCounter, derive_session_key, key_check_value, resize_key},
    params::ScpParameters,
};

/// Purpose a session key is derived for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyUsage {
    /// Command data encryption and cryptograms
    Enc,
    /// Command MAC
    Mac,
    /// Sensitive data encryption
    Dek,
    /// Response MAC
    RMac,
}

impl KeyUsage {
    /// All usages, in derivation order
    pub const ALL: [Self; 4] = [Self::Enc, Self::Mac, Self::Dek, Self::RMac];

    /// Constant placed in the first two bytes of the derivation block
    pub const fn derivation_constant(self) -> [u8; 2] {
        match self {
            Self::Enc => derivation::ENC,
            Self::Mac => derivation::C_MAC,
            Self::Dek => derivation::DEK,
            Self::RMac => derivation::R_MAC,
        }
    }
}

/// Long-term triple-DES key shared with the card
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct StaticKey([u8; 24]);

impl StaticKey {
    /// Create a key from a 16-byte double-length key
    pub fn from_double_length(key: [u8; 16]) -> Self {
        Self(resize_key(&key))
    }

    /// Create a key from 16 or 24 bytes
    pub fn from_slice(key: &[u8]) -> Result<Self> {
        match key.len() {
            16 => {
                let mut double = [0u8; 16];
                double.copy_from_slice(key);
                let key = Self::from_double_length(double);
                double.zeroize();
                Ok(key)
            }
            24 => {
                let mut triple = [0u8; 24];
                triple.copy_from_slice(key);
                Ok(Self(triple))
            }
            _ => Err(Error::Crypto("static keys must be 16 or 24 bytes")),
        }
    }

    /// The 24-byte triple-DES key
    pub const fn as_bytes(&self) -> &[u8; 24] {
        &self.0
    }
}

impl fmt::Debug for StaticKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kcv = key_check_value(&self.0).map(hex::encode).unwrap_or_default();
        f.debug_struct("StaticKey").field("kcv", &kcv).finish()
    }
}

/// Per-session triple-DES key
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; 24]);

impl SessionKey {
    /// Create a key from a 16-byte double-length key
    pub fn from_double_length(key: [u8; 16]) -> Self {
        Self(resize_key(&key))
    }

    /// The 24-byte triple-DES key
    pub const fn as_bytes(&self) -> &[u8; 24] {
        &self.0
    }

    /// The first 8 bytes, used as a single-DES key
    pub fn des_key(&self) -> &[u8] {
        &self.0[..8]
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Inputs to session key derivation that come from the card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivationContext {
    /// Card sequence counter
    pub sequence_counter: SequenceCounter,
    /// Key version number reported by the card
    pub key_version: u8,
}

/// Source of long-term key material
///
/// Implementations may hold keys in memory, in an HSM, or anywhere else; the
/// engine only asks for a key by identifier and version.
pub trait KeyProvider: fmt::Debug {
    /// Look up the long-term key with the given identifier in key set `key_version`
    fn static_key(&self, key_id: u8, key_version: u8) -> Result<StaticKey>;

    /// Derive the session key for `usage` from the long-term key `key_id`
    fn derive_session_key(
        &self,
        context: &DerivationContext,
        key_id: u8,
        usage: KeyUsage,
    ) -> Result<SessionKey> {
        let static_key = self.static_key(key_id, context.key_version)?;
        derive_session_key(&static_key, usage, &context.sequence_counter)
    }
}

impl<K: KeyProvider + ?Sized> KeyProvider for &K {
    fn static_key(&self, key_id: u8, key_version: u8) -> Result<StaticKey> {
        (**self).static_key(key_id, key_version)
    }

    fn derive_session_key(
        &self,
        context: &DerivationContext,
        key_id: u8,
        usage: KeyUsage,
    ) -> Result<SessionKey> {
        (**self).derive_session_key(context, key_id, usage)
    }
}

/// Which long-term keys the session keys are derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivationStrategy {
    /// Every usage derives from the same base key
    SingleBaseKey {
        /// Identifier of the base key
        key_id: u8,
    },
    /// ENC, MAC and DEK derive from their own base keys; R-MAC shares the MAC key
    ThreeBaseKeys {
        /// Identifier of the encryption base key
        enc: u8,
        /// Identifier of the MAC base key
        mac: u8,
        /// Identifier of the data encryption base key
        dek: u8,
    },
}

impl DerivationStrategy {
    /// Strategy selected by the card's "i" parameter with the standard key identifiers
    pub const fn for_parameters(params: ScpParameters) -> Self {
        if params.three_base_keys() {
            Self::ThreeBaseKeys {
                enc: key_id::ENC,
                mac: key_id::MAC,
                dek: key_id::DEK,
            }
        } else {
            Self::SingleBaseKey {
                key_id: key_id::ENC,
            }
        }
    }

    /// Base key identifier used for `usage`
    pub const fn key_id(self, usage: KeyUsage) -> u8 {
        match self {
            Self::SingleBaseKey { key_id } => key_id,
            Self::ThreeBaseKeys { enc, mac, dek } => match usage {
                KeyUsage::Enc => enc,
                KeyUsage::Mac | KeyUsage::RMac => mac,
                KeyUsage::Dek => dek,
            },
        }
    }
}

/// Session keys derived during the handshake
#[derive(Debug, Clone)]
pub struct SessionKeys {
    enc: SessionKey,
    mac: SessionKey,
    dek: SessionKey,
    rmac: SessionKey,
}

impl SessionKeys {
    /// Derive all four session keys
    pub fn derive<K: KeyProvider + ?Sized>(
        provider: &K,
        strategy: DerivationStrategy,
        context: &DerivationContext,
    ) -> Result<Self> {
        let derive =
            |usage| provider.derive_session_key(context, strategy.key_id(usage), usage);

        Ok(Self {
            enc: derive(KeyUsage::Enc)?,
            mac: derive(KeyUsage::Mac)?,
            dek: derive(KeyUsage::Dek)?,
            rmac: derive(KeyUsage::RMac)?,
        })
    }

    /// The session key for `usage`
    pub const fn get(&self, usage: KeyUsage) -> &SessionKey {
        match usage {
            KeyUsage::Enc => &self.enc,
            KeyUsage::Mac => &self.mac,
            KeyUsage::Dek => &self.dek,
            KeyUsage::RMac => &self.rmac,
        }
    }

    /// The encryption key
    pub const fn enc(&self) -> &SessionKey {
        &self.enc
    }

    /// The command MAC key
    pub const fn mac(&self) -> &SessionKey {
        &self.mac
    }

    /// The data encryption key
    pub const fn dek(&self) -> &SessionKey {
        &self.dek
    }

    /// The response MAC key
    pub const fn rmac(&self) -> &SessionKey {
        &self.rmac
    }
}

/// In-memory key set: ENC, MAC and DEK for one key version
#[derive(Debug, Clone)]
pub struct StaticKeys {
    key_version: u8,
    enc: StaticKey,
    mac: StaticKey,
    dek: StaticKey,
}

impl StaticKeys {
    /// Create a key set with all three keys for `key_version`
    ///
    /// A key version of zero answers for any version the card reports.
    pub const fn new(key_version: u8, enc: StaticKey, mac: StaticKey, dek: StaticKey) -> Self {
        Self {
            key_version,
            enc,
            mac,
            dek,
        }
    }

    /// Create a key set where all keys are the same
    pub fn from_single_key(key_version: u8, key: StaticKey) -> Self {
        Self::new(key_version, key.clone(), key.clone(), key)
    }

    /// Key version this set answers for
    pub const fn key_version(&self) -> u8 {
        self.key_version
    }
}

impl KeyProvider for StaticKeys {
    fn static_key(&self, key_id: u8, key_version: u8) -> Result<StaticKey> {
        if self.key_version != 0 && key_version != self.key_version {
            return Err(Error::KeyNotFound {
                key_id,
                key_version,
            });
        }
        match key_id {
            key_id::ENC => Ok(self.enc.clone()),
            key_id::MAC => Ok(self.mac.clone()),
            key_id::DEK => Ok(self.dek.clone()),
            _ => Err(Error::KeyNotFound {
                key_id,
                key_version,
            }),
        }
    }
}

/// Well-known GlobalPlatform test keys
#[derive(Debug, Clone, Copy)]
pub struct DefaultKeys;

impl DefaultKeys {
    /// The `404142..4F` test key
    pub const KEY: [u8; 16] = [
        0x40, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0x4A, 0x4B, 0x4C, 0x4D, 0x4E,
        0x4F,
    ];

    /// A key set using the test key for every key and any key version
    pub fn key_set() -> StaticKeys {
        StaticKeys::from_single_key(0, StaticKey::from_double_length(Self::KEY))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn three_key_set() -> StaticKeys {
        StaticKeys::new(
            0x20,
            StaticKey::from_slice(&hex!("0123456789ABCDEFFEDCBA9876543210")).unwrap(),
            StaticKey::from_slice(&hex!("0123456789ABCDEFFEDCBA9876543211")).unwrap(),
            StaticKey::from_slice(&hex!("0123456789ABCDEFFEDCBA9876543212")).unwrap(),
        )
    }

    #[test]
    fn test_static_key_lengths() {
        let double = StaticKey::from_slice(&DefaultKeys::KEY).unwrap();
        assert_eq!(
            double.as_bytes(),
            &hex!("404142434445464748494A4B4C4D4E4F4041424344454647")
        );
        let triple = StaticKey::from_slice(double.as_bytes()).unwrap();
        assert_eq!(triple.as_bytes(), double.as_bytes());
        assert!(matches!(
            StaticKey::from_slice(&[0u8; 8]),
            Err(Error::Crypto(_))
        ));
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let key = StaticKey::from_double_length(DefaultKeys::KEY);
        let debug = format!("{key:?}");
        assert!(debug.contains("8baf47"));
        assert!(!debug.contains("4041"));
        assert_eq!(
            format!("{:?}", SessionKey::from_double_length(DefaultKeys::KEY)),
            "SessionKey(..)"
        );
    }

    #[test]
    fn test_strategy_key_ids() {
        let single = DerivationStrategy::for_parameters(ScpParameters::new(0x14));
        assert_eq!(single, DerivationStrategy::SingleBaseKey { key_id: 1 });
        for usage in KeyUsage::ALL {
            assert_eq!(single.key_id(usage), 1);
        }

        let three = DerivationStrategy::for_parameters(ScpParameters::default());
        assert_eq!(three.key_id(KeyUsage::Enc), 1);
        assert_eq!(three.key_id(KeyUsage::Mac), 2);
        assert_eq!(three.key_id(KeyUsage::Dek), 3);
        assert_eq!(three.key_id(KeyUsage::RMac), 2);
    }

    #[test]
    fn test_derive_three_key_session() {
        let context = DerivationContext {
            sequence_counter: hex!("001C"),
            key_version: 0x20,
        };
        let strategy = DerivationStrategy::for_parameters(ScpParameters::default());
        let keys = SessionKeys::derive(&three_key_set(), strategy, &context).unwrap();

        assert_eq!(
            keys.enc().as_bytes(),
            &hex!("48B8C246FD202D2965CCB8D8FF35CDC148B8C246FD202D29")
        );
        assert_eq!(
            keys.mac().as_bytes(),
            &hex!("7BDAEAA601EC18885053EDAF4F2081107BDAEAA601EC1888")
        );
        assert_eq!(
            keys.dek().as_bytes(),
            &hex!("1959DCECE0CC551E1A824096FEC209451959DCECE0CC551E")
        );
        assert_eq!(
            keys.get(KeyUsage::RMac).as_bytes(),
            &hex!("CF98C95DF537D8AC05E16B8BEBC50DABCF98C95DF537D8AC")
        );
    }

    #[test]
    fn test_single_key_session() {
        let context = DerivationContext {
            sequence_counter: hex!("0004"),
            key_version: 0x01,
        };
        let strategy = DerivationStrategy::SingleBaseKey { key_id: 1 };
        let keys = SessionKeys::derive(&DefaultKeys::key_set(), strategy, &context).unwrap();

        assert_eq!(
            keys.enc().as_bytes(),
            &hex!("A9875ADFB0F8402FB6F7DBF7F75FFAFAA9875ADFB0F8402F")
        );
        assert_eq!(
            keys.mac().as_bytes(),
            &hex!("C8F6243ECF0DF436AF901514F65C7EF9C8F6243ECF0DF436")
        );
        assert_eq!(
            keys.dek().as_bytes(),
            &hex!("9173A79C237D68991B6BBAF5DC2762B69173A79C237D6899")
        );
        assert_eq!(
            keys.rmac().as_bytes(),
            &hex!("D4DE6363159EBD4F89F99EF9ED7D5EF6D4DE6363159EBD4F")
        );
    }

    #[test]
    fn test_key_version_lookup() {
        let keys = three_key_set();
        assert!(keys.static_key(key_id::MAC, 0x20).is_ok());
        assert!(matches!(
            keys.static_key(key_id::MAC, 0x21),
            Err(Error::KeyNotFound {
                key_id: 2,
                key_version: 0x21
            })
        ));
        assert!(keys.static_key(0x04, 0x20).is_err());
        assert!(DefaultKeys::key_set().static_key(key_id::DEK, 0x7F).is_ok());
    }
}
