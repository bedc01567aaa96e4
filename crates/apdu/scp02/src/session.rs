//! SCP02 session handshake
//!
//! [`Scp02Session`] owns a card transport and a key provider and drives the
//! two-command mutual authentication (INITIALIZE UPDATE, EXTERNAL
//! AUTHENTICATE). Once authenticated it holds the [`SecureMessaging`] state
//! and protects every command sent through it.
//!
//! A session serves one channel. Callers sharing a card across threads must
//! serialize access themselves, e.g. by wrapping the session in a `Mutex`.

use bytes::Bytes;
use gpcard_apdu_core::{ApduCommand, CardTransport, Command, Response};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::{
    Error, Result,
    commands::{ExternalAuthenticateCommand, InitializeUpdateCommand},
    config::ChannelConfig,
    constants::scp,
    crypto::{
        CardChallenge, HostChallenge, Icv, SequenceCounter, calculate_cryptogram, encrypt_ecb,
    },
    keys::{DerivationContext, KeyProvider, SessionKeys},
    params::{CardMetadata, ScpParameters},
    secure_channel::SecureMessaging,
    security_level::SecurityLevel,
};

/// Where a session is in the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStage {
    /// Nothing sent yet
    New,
    /// INITIALIZE UPDATE succeeded and the card cryptogram verified
    Challenged,
    /// EXTERNAL AUTHENTICATE accepted by the card
    Authenticated,
    /// Secure messaging is active
    Open,
    /// The last attempt failed; keys have been discarded
    Failed,
}

/// Values exchanged during INITIALIZE UPDATE
#[derive(Debug)]
pub struct HandshakeState {
    /// Challenge sent by the host
    pub host_challenge: HostChallenge,
    /// Challenge returned by the card
    pub card_challenge: CardChallenge,
    /// Card sequence counter
    pub sequence_counter: SequenceCounter,
    /// Key diversification data returned by the card
    pub key_diversification_data: [u8; 10],
    /// Key version number reported by the card
    pub key_version: u8,
    keys: SessionKeys,
}

impl HandshakeState {
    /// Session keys derived for this handshake
    pub(crate) const fn session_keys(&self) -> &SessionKeys {
        &self.keys
    }
}

/// An SCP02 session over a card transport
#[derive(Debug)]
pub struct Scp02Session<T: CardTransport, K: KeyProvider> {
    transport: T,
    keys: K,
    config: ChannelConfig,
    parameters: ScpParameters,
    stage: HandshakeStage,
    channel: Option<SecureMessaging>,
}

impl<T: CardTransport, K: KeyProvider> Scp02Session<T, K> {
    /// Create a session for a card described by `metadata`
    ///
    /// The "i" parameter comes from the configuration override, then from the
    /// card metadata, then falls back to `0x15`. A card that reports a
    /// protocol other than SCP02 is rejected.
    pub fn new(
        transport: T,
        keys: K,
        metadata: &impl CardMetadata,
        config: ChannelConfig,
    ) -> Result<Self> {
        config.validate()?;

        if let Some(version) = metadata.scp_version() {
            if version != scp::SCP02 {
                return Err(Error::UnsupportedScpVersion(version));
            }
        }

        let parameters = config
            .parameters_override
            .unwrap_or_else(|| ScpParameters::from_metadata(metadata));
        debug!(?parameters, "Created SCP02 session");

        Ok(Self {
            transport,
            keys,
            config,
            parameters,
            stage: HandshakeStage::New,
            channel: None,
        })
    }

    /// Current handshake stage
    pub const fn stage(&self) -> HandshakeStage {
        self.stage
    }

    /// Whether secure messaging is active
    pub const fn is_open(&self) -> bool {
        matches!(self.stage, HandshakeStage::Open)
    }

    /// The "i" parameter in use
    pub const fn parameters(&self) -> ScpParameters {
        self.parameters
    }

    /// Security level of the open channel
    pub fn security_level(&self) -> Option<SecurityLevel> {
        self.channel.as_ref().map(SecureMessaging::security_level)
    }

    /// The session configuration
    pub const fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// The underlying transport
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Send INITIALIZE UPDATE with a random host challenge
    pub fn initialize_update(&mut self, key_version: u8) -> Result<HandshakeState> {
        let command = InitializeUpdateCommand::with_random_challenge(key_version);
        self.run_initialize_update(command)
    }

    /// Send INITIALIZE UPDATE with a caller-chosen host challenge
    pub fn initialize_update_with_challenge(
        &mut self,
        key_version: u8,
        host_challenge: HostChallenge,
    ) -> Result<HandshakeState> {
        let command = InitializeUpdateCommand::with_challenge(key_version, host_challenge);
        self.run_initialize_update(command)
    }

    fn run_initialize_update(&mut self, command: InitializeUpdateCommand) -> Result<HandshakeState> {
        self.channel = None;
        self.stage = HandshakeStage::New;

        let result = self.initialize_update_inner(&command);
        match result {
            Ok(_) => self.stage = HandshakeStage::Challenged,
            Err(ref e) => self.fail(e),
        }
        result
    }

    fn initialize_update_inner(
        &mut self,
        command: &InitializeUpdateCommand,
    ) -> Result<HandshakeState> {
        let requested = command.p1();
        let raw = self.transport.transmit_raw(&command.to_bytes()?)?;
        let response = InitializeUpdateCommand::parse_response_raw(raw)?;

        if response.scp_version != scp::SCP02 {
            return Err(Error::UnsupportedScpVersion(response.scp_version));
        }
        if requested != scp::ANY_KEY_VERSION && response.key_version != requested {
            return Err(Error::KeyVersionMismatch {
                requested,
                reported: response.key_version,
            });
        }

        let context = DerivationContext {
            sequence_counter: response.sequence_counter,
            key_version: response.key_version,
        };
        let strategy = self.config.derivation_strategy(self.parameters);
        let keys = SessionKeys::derive(&self.keys, strategy, &context)?;

        let host_challenge = *command.host_challenge();
        let expected = calculate_cryptogram(
            keys.enc(),
            &response.sequence_counter,
            &response.card_challenge,
            &host_challenge,
            false,
        )?;
        if !bool::from(expected.ct_eq(&response.card_cryptogram)) {
            warn!("Card cryptogram verification failed");
            return Err(Error::AuthenticationFailed("invalid card cryptogram"));
        }

        debug!(
            key_version = response.key_version,
            sequence_counter = %hex::encode(response.sequence_counter),
            "Card authenticated"
        );

        Ok(HandshakeState {
            host_challenge,
            card_challenge: response.card_challenge,
            sequence_counter: response.sequence_counter,
            key_diversification_data: response.key_diversification_data,
            key_version: response.key_version,
            keys,
        })
    }

    /// Send EXTERNAL AUTHENTICATE for a verified INITIALIZE UPDATE exchange
    ///
    /// The command is C-MAC'd with a zero ICV. The returned MAC seeds the
    /// chaining values of the secure channel.
    pub fn external_authenticate(
        &mut self,
        state: &HandshakeState,
        security_level: SecurityLevel,
    ) -> Result<Icv> {
        if self.stage != HandshakeStage::Challenged {
            return Err(Error::Protocol(
                "EXTERNAL AUTHENTICATE requires a completed INITIALIZE UPDATE",
            ));
        }
        security_level.validate()?;

        let result = self.external_authenticate_inner(state, security_level);
        match result {
            Ok(_) => self.stage = HandshakeStage::Authenticated,
            Err(ref e) => self.fail(e),
        }
        result
    }

    fn external_authenticate_inner(
        &mut self,
        state: &HandshakeState,
        security_level: SecurityLevel,
    ) -> Result<Icv> {
        let host_cryptogram = calculate_cryptogram(
            state.session_keys().enc(),
            &state.sequence_counter,
            &state.card_challenge,
            &state.host_challenge,
            true,
        )?;

        let mut bootstrap = SecureMessaging::new(
            state.session_keys().clone(),
            self.parameters,
            SecurityLevel::C_MAC,
            None,
            self.config.max_apdu_data_length,
        )?;
        let command = ExternalAuthenticateCommand::new(security_level, host_cryptogram);
        let wrapped = bootstrap.wrap(&command.to_command())?;

        let raw = self.transport.transmit_raw(&wrapped.to_bytes()?)?;
        ExternalAuthenticateCommand::parse_response_raw(raw)?;

        debug!(%security_level, "Host authenticated");
        bootstrap
            .icv()
            .ok_or(Error::Protocol("EXTERNAL AUTHENTICATE was not MAC'd"))
    }

    /// Run the full handshake and activate secure messaging
    ///
    /// Invalid security levels are rejected before anything is sent.
    pub fn open_secure_channel(&mut self, security_level: SecurityLevel) -> Result<()> {
        security_level.validate()?;

        let state = self.initialize_update(self.config.key_version)?;
        let icv = self.external_authenticate(&state, security_level)?;

        let channel = SecureMessaging::new(
            state.keys,
            self.parameters,
            security_level,
            Some(icv),
            self.config.max_apdu_data_length,
        );
        match channel {
            Ok(channel) => {
                self.channel = Some(channel);
                self.stage = HandshakeStage::Open;
                debug!(%security_level, "Secure channel open");
                Ok(())
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Send a command through the secure channel
    ///
    /// Any failure other than oversized command data closes the channel.
    pub fn transmit(&mut self, command: &Command) -> Result<Response> {
        let Some(channel) = self.channel.as_mut() else {
            return Err(Error::NoSecureChannel);
        };

        let result = channel.transmit(&mut self.transport, command);
        if let Err(ref e) = result {
            if !matches!(e, Error::DataTooLong { .. }) {
                self.fail(e);
            }
        }
        result
    }

    /// Send raw command bytes through the secure channel
    pub fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes> {
        let command = Command::from_bytes(command)?;
        Ok(self.transmit(&command)?.to_bytes())
    }

    /// Encrypt key material with the session DEK
    ///
    /// The data must already be a multiple of 8 bytes.
    pub fn encrypt_sensitive_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        let channel = self.channel.as_ref().ok_or(Error::NoSecureChannel)?;
        encrypt_ecb(channel.keys().dek(), data)
    }

    /// Drop the secure channel and its keys
    pub fn close(&mut self) {
        if self.channel.take().is_some() {
            debug!("Secure channel closed");
        }
        self.stage = HandshakeStage::New;
    }

    /// Close the session and return the transport
    pub fn into_inner(mut self) -> T {
        self.close();
        self.transport
    }

    fn fail(&mut self, error: &Error) {
        warn!(%error, kind = ?error.kind(), "SCP02 session failed");
        self.channel = None;
        self.stage = HandshakeStage::Failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        crypto::encrypt_cbc,
        keys::{DefaultKeys, DerivationStrategy, StaticKeys},
        params::CardRecognition,
    };
    use gpcard_apdu_core::TransportError;
    use hex_literal::hex;

    #[derive(Debug, Default)]
    struct ScriptedTransport {
        responses: Vec<Vec<u8>>,
        commands: Vec<Vec<u8>>,
    }

    impl ScriptedTransport {
        fn new(responses: &[&[u8]]) -> Self {
            Self {
                responses: responses.iter().map(|r| r.to_vec()).collect(),
                commands: Vec::new(),
            }
        }
    }

    impl CardTransport for ScriptedTransport {
        fn do_transmit_raw(&mut self, command: &[u8]) -> std::result::Result<Bytes, TransportError> {
            self.commands.push(command.to_vec());
            if self.responses.is_empty() {
                return Err(TransportError::Transmission);
            }
            Ok(Bytes::from(self.responses.remove(0)))
        }

        fn is_connected(&self) -> bool {
            true
        }

        fn reset(&mut self) -> std::result::Result<(), TransportError> {
            Ok(())
        }
    }

    const HOST_CHALLENGE: HostChallenge = hex!("E4C522735415CC5C");
    const INIT_RESPONSE: [u8; 30] =
        hex!("0000000000000000000001020002D9857D532F04EFA4524D0C2472659000");

    fn scripted_session(responses: &[&[u8]]) -> Scp02Session<ScriptedTransport, StaticKeys> {
        Scp02Session::new(
            ScriptedTransport::new(responses),
            DefaultKeys::key_set(),
            &CardRecognition::default(),
            ChannelConfig::default(),
        )
        .unwrap()
    }

    /// INITIALIZE UPDATE response with a valid card cryptogram
    fn init_response(
        sequence_counter: SequenceCounter,
        card_challenge: CardChallenge,
        host_challenge: &HostChallenge,
    ) -> Vec<u8> {
        let context = DerivationContext {
            sequence_counter,
            key_version: 1,
        };
        let keys = SessionKeys::derive(
            &DefaultKeys::key_set(),
            DerivationStrategy::SingleBaseKey { key_id: 1 },
            &context,
        )
        .unwrap();
        let cryptogram = calculate_cryptogram(
            keys.enc(),
            &sequence_counter,
            &card_challenge,
            host_challenge,
            false,
        )
        .unwrap();

        let mut response = vec![0u8; 10];
        response.extend_from_slice(&[0x01, 0x02]);
        response.extend_from_slice(&sequence_counter);
        response.extend_from_slice(&card_challenge);
        response.extend_from_slice(&cryptogram);
        response.extend_from_slice(&[0x90, 0x00]);
        response
    }

    #[test]
    fn test_initialize_update() {
        let mut session = scripted_session(&[&INIT_RESPONSE]);
        let state = session
            .initialize_update_with_challenge(0, HOST_CHALLENGE)
            .unwrap();

        assert_eq!(state.sequence_counter, hex!("0002"));
        assert_eq!(state.card_challenge, hex!("D9857D532F04"));
        assert_eq!(state.key_version, 0x01);
        assert_eq!(session.stage(), HandshakeStage::Challenged);
        assert_eq!(
            session.transport().commands[0],
            hex!("8050000008E4C522735415CC5C00")
        );
    }

    #[test]
    fn test_external_authenticate() {
        let mut session = scripted_session(&[&INIT_RESPONSE, &hex!("9000")]);
        let state = session
            .initialize_update_with_challenge(0, HOST_CHALLENGE)
            .unwrap();
        let icv = session
            .external_authenticate(&state, SecurityLevel::C_MAC)
            .unwrap();

        assert_eq!(icv, hex!("0772395773758FE4"));
        assert_eq!(session.stage(), HandshakeStage::Authenticated);
        assert_eq!(
            session.transport().commands[1],
            hex!("84820100100958CFB92281CADE0772395773758FE4")
        );
    }

    #[test]
    fn test_external_authenticate_with_encryption_level() {
        let host_challenge = hex!("4534CEAB691E93FC");
        let response = init_response(hex!("0005"), hex!("BD1A6BE9D3D5"), &host_challenge);
        let mut session = scripted_session(&[response.as_slice(), &hex!("9000")]);

        let state = session
            .initialize_update_with_challenge(0, host_challenge)
            .unwrap();
        let icv = session
            .external_authenticate(&state, SecurityLevel::C_MAC | SecurityLevel::C_DECRYPTION)
            .unwrap();

        assert_eq!(
            session.transport().commands[1],
            hex!("8482030010BFD9D136839B3BB9AD88229B0C0773C3")
        );
        assert_eq!(icv, hex!("AD88229B0C0773C3"));

        let expected = encrypt_cbc(state.session_keys().enc(), &hex!("4F00")).unwrap();
        assert_eq!(expected, hex!("82E63A0FE0BFAD7C"));
    }

    #[test]
    fn test_initialize_update_status_words() {
        let cases: [(&[u8], fn(&Error) -> bool); 4] = [
            (&hex!("6982"), |e| matches!(e, Error::CardLocked(_))),
            (&hex!("6983"), |e| matches!(e, Error::CardLocked(_))),
            (&hex!("6A88"), |e| matches!(e, Error::ReferencedDataNotFound)),
            (&hex!("6D00"), |e| matches!(e, Error::CardStatus { .. })),
        ];

        for (status, check) in cases {
            let mut session = scripted_session(&[status]);
            let err = session
                .initialize_update_with_challenge(0, HOST_CHALLENGE)
                .unwrap_err();
            assert!(check(&err), "unexpected error {err:?}");
            assert_eq!(session.stage(), HandshakeStage::Failed);
        }
    }

    #[test]
    fn test_initialize_update_rejects_bad_response() {
        let mut wrong_version = INIT_RESPONSE;
        wrong_version[11] = 0x03;
        let mut session = scripted_session(&[&wrong_version]);
        assert!(matches!(
            session.initialize_update_with_challenge(0, HOST_CHALLENGE),
            Err(Error::UnsupportedScpVersion(0x03))
        ));

        let mut bad_cryptogram = INIT_RESPONSE;
        bad_cryptogram[27] ^= 0xFF;
        let mut session = scripted_session(&[&bad_cryptogram]);
        assert!(matches!(
            session.initialize_update_with_challenge(0, HOST_CHALLENGE),
            Err(Error::AuthenticationFailed(_))
        ));
        assert_eq!(session.stage(), HandshakeStage::Failed);

        let mut session = scripted_session(&[&hex!("00112233449000")]);
        assert!(matches!(
            session.initialize_update_with_challenge(0, HOST_CHALLENGE),
            Err(Error::InvalidLength {
                expected: 28,
                actual: 5
            })
        ));
    }

    #[test]
    fn test_key_version_mismatch() {
        let mut session = scripted_session(&[&INIT_RESPONSE]);
        assert!(matches!(
            session.initialize_update_with_challenge(0x20, HOST_CHALLENGE),
            Err(Error::KeyVersionMismatch {
                requested: 0x20,
                reported: 0x01
            })
        ));
    }

    #[test]
    fn test_host_cryptogram_rejected() {
        let mut session = scripted_session(&[&INIT_RESPONSE, &hex!("6300")]);
        let state = session
            .initialize_update_with_challenge(0, HOST_CHALLENGE)
            .unwrap();

        assert!(matches!(
            session.external_authenticate(&state, SecurityLevel::C_MAC),
            Err(Error::HostCryptogramRejected)
        ));
        assert_eq!(session.stage(), HandshakeStage::Failed);
        assert!(matches!(
            session.external_authenticate(&state, SecurityLevel::C_MAC),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_invalid_levels_send_nothing() {
        for level in [
            SecurityLevel::C_DECRYPTION,
            SecurityLevel::R_DECRYPTION,
            SecurityLevel::C_MAC | SecurityLevel::R_DECRYPTION,
        ] {
            let mut session = scripted_session(&[&INIT_RESPONSE]);
            assert!(matches!(
                session.open_secure_channel(level),
                Err(Error::InvalidSecurityLevel(_))
            ));
            assert!(session.transport().commands.is_empty());
            assert_eq!(session.stage(), HandshakeStage::New);
        }
    }

    #[test]
    fn test_transmit_requires_open_channel() {
        let mut session = scripted_session(&[]);
        assert!(matches!(
            session.transmit(&Command::new(0x80, 0xF2, 0x80, 0x02)),
            Err(Error::NoSecureChannel)
        ));
        assert!(matches!(
            session.encrypt_sensitive_data(&[0u8; 16]),
            Err(Error::NoSecureChannel)
        ));
        assert!(session.transport().commands.is_empty());
    }

    #[test]
    fn test_rejects_other_protocols() {
        let metadata = CardRecognition {
            scp_version: Some(0x03),
            scp_parameter: None,
        };
        let result = Scp02Session::new(
            ScriptedTransport::default(),
            DefaultKeys::key_set(),
            &metadata,
            ChannelConfig::default(),
        );
        assert!(matches!(result, Err(Error::UnsupportedScpVersion(0x03))));
    }

    #[test]
    fn test_parameters_selection() {
        let card = CardRecognition::scp02(0x55);
        let session = Scp02Session::new(
            ScriptedTransport::default(),
            DefaultKeys::key_set(),
            &card,
            ChannelConfig::default(),
        )
        .unwrap();
        assert_eq!(session.parameters(), ScpParameters::new(0x55));

        let session = Scp02Session::new(
            ScriptedTransport::default(),
            DefaultKeys::key_set(),
            &card,
            ChannelConfig::default().with_parameters(ScpParameters::new(0x05)),
        )
        .unwrap();
        assert_eq!(session.parameters(), ScpParameters::new(0x05));

        let session = Scp02Session::new(
            ScriptedTransport::default(),
            DefaultKeys::key_set(),
            &CardRecognition::default(),
            ChannelConfig::default(),
        )
        .unwrap();
        assert_eq!(session.parameters(), ScpParameters::default());
    }
}
