//! Configuration options for SCP02 sessions

use crate::{
    Error, Result,
    constants::{key_id, scp},
    keys::DerivationStrategy,
    params::ScpParameters,
};

/// Configuration options for an SCP02 session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Largest data field the card accepts in one short APDU
    pub max_apdu_data_length: usize,

    /// Key version number sent in INITIALIZE UPDATE; zero selects any key set
    pub key_version: u8,

    /// "i" parameter to use instead of the one advertised by the card
    pub parameters_override: Option<ScpParameters>,

    /// Base key identifier used when the card has a single base key
    pub single_base_key_id: u8,

    /// Base key identifiers (ENC, MAC, DEK) used when the card has three base keys
    pub three_base_key_ids: (u8, u8, u8),
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_apdu_data_length: scp::DEFAULT_MAX_APDU_DATA_LENGTH,
            key_version: scp::ANY_KEY_VERSION,
            parameters_override: None,
            single_base_key_id: key_id::ENC,
            three_base_key_ids: (key_id::ENC, key_id::MAC, key_id::DEK),
        }
    }
}

impl ChannelConfig {
    /// Set the maximum APDU data length
    pub const fn with_max_apdu_data_length(mut self, length: usize) -> Self {
        self.max_apdu_data_length = length;
        self
    }

    /// Set the key version number to request
    pub const fn with_key_version(mut self, key_version: u8) -> Self {
        self.key_version = key_version;
        self
    }

    /// Force the "i" parameter regardless of card metadata
    pub const fn with_parameters(mut self, parameters: ScpParameters) -> Self {
        self.parameters_override = Some(parameters);
        self
    }

    /// Set the base key identifier for single-key cards
    pub const fn with_single_base_key_id(mut self, key_id: u8) -> Self {
        self.single_base_key_id = key_id;
        self
    }

    /// Set the base key identifiers for three-key cards
    pub const fn with_three_base_key_ids(mut self, enc: u8, mac: u8, dek: u8) -> Self {
        self.three_base_key_ids = (enc, mac, dek);
        self
    }

    /// Check that the values are usable
    pub const fn validate(&self) -> Result<()> {
        // Room for at least one byte of data next to a C-MAC and encryption padding
        if self.max_apdu_data_length <= 2 * scp::MAC_LENGTH
            || self.max_apdu_data_length > scp::DEFAULT_MAX_APDU_DATA_LENGTH
        {
            return Err(Error::InvalidConfig(
                "max APDU data length must be between 17 and 255",
            ));
        }
        Ok(())
    }

    /// Derivation strategy for a card with the given parameters
    pub const fn derivation_strategy(&self, parameters: ScpParameters) -> DerivationStrategy {
        if parameters.three_base_keys() {
            let (enc, mac, dek) = self.three_base_key_ids;
            DerivationStrategy::ThreeBaseKeys { enc, mac, dek }
        } else {
            DerivationStrategy::SingleBaseKey {
                key_id: self.single_base_key_id,
            }
        }
    }
}
