//! Cryptographic operations for GlobalPlatform SCP02 protocol
//!
//! This module provides implementations of the cryptographic operations
//! required for the SCP02 protocol, including session key derivation,
//! cryptogram calculation, retail MAC calculation and ICV encryption.

use cbc_mac::{CbcMac, Mac};
use cipher::{
    Block, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit,
    block_padding::NoPadding, generic_array::GenericArray,
};
use des::{Des, TdesEde3};

use crate::{
    Error, Result,
    constants::scp::BLOCK_SIZE,
    keys::{KeyUsage, SessionKey, StaticKey},
    util::{pad, unpad},
};

pub type SequenceCounter = [u8; 2];
pub type CardChallenge = [u8; 6];
pub type HostChallenge = [u8; 8];
pub type Cryptogram = [u8; 8];
pub type Icv = [u8; 8];
pub type Scp02Mac = [u8; 8];
pub type KeyCheckValue = [u8; 3];

const ZERO_IV: [u8; BLOCK_SIZE] = [0u8; BLOCK_SIZE];

fn check_aligned(data: &[u8]) -> Result<()> {
    if data.len() % BLOCK_SIZE != 0 {
        return Err(Error::Crypto("input is not a multiple of the block size"));
    }
    Ok(())
}

/// Triple-DES CBC over block-aligned data
fn tdes_cbc_encrypt(key: &[u8], iv: &[u8], blocks: &[u8]) -> Result<Vec<u8>> {
    check_aligned(blocks)?;
    let encryptor = cbc::Encryptor::<TdesEde3>::new_from_slices(key, iv)?;
    Ok(encryptor.encrypt_padded_vec_mut::<NoPadding>(blocks))
}

/// Derive a session key from a static key using the sequence counter
///
/// The derivation block is the usage constant, the sequence counter and
/// twelve zero bytes, encrypted with triple-DES CBC under a zero IV. The
/// double-length result is expanded to a 24-byte triple-DES key.
pub fn derive_session_key(
    static_key: &StaticKey,
    usage: KeyUsage,
    sequence_counter: &SequenceCounter,
) -> Result<SessionKey> {
    let mut block = [0u8; 16];
    block[..2].copy_from_slice(&usage.derivation_constant());
    block[2..4].copy_from_slice(sequence_counter);

    let derived = tdes_cbc_encrypt(static_key.as_bytes(), &ZERO_IV, &block)?;

    let mut key = [0u8; 16];
    key.copy_from_slice(&derived);
    Ok(SessionKey::from_double_length(key))
}

/// Calculate a card or host cryptogram
///
/// The card cryptogram covers `host challenge || sequence counter || card challenge`,
/// the host cryptogram covers `sequence counter || card challenge || host challenge`.
/// Both are the last block of triple-DES CBC over the padded input.
pub fn calculate_cryptogram(
    enc_key: &SessionKey,
    sequence_counter: &SequenceCounter,
    card_challenge: &CardChallenge,
    host_challenge: &HostChallenge,
    for_host: bool,
) -> Result<Cryptogram> {
    let mut data = Vec::with_capacity(16);
    if for_host {
        data.extend_from_slice(sequence_counter);
        data.extend_from_slice(card_challenge);
        data.extend_from_slice(host_challenge);
    } else {
        data.extend_from_slice(host_challenge);
        data.extend_from_slice(sequence_counter);
        data.extend_from_slice(card_challenge);
    }

    let encrypted = tdes_cbc_encrypt(enc_key.as_bytes(), &ZERO_IV, &pad(&data))?;

    let mut cryptogram = Cryptogram::default();
    cryptogram.copy_from_slice(&encrypted[encrypted.len() - BLOCK_SIZE..]);
    Ok(cryptogram)
}

/// Calculate a full 3DES MAC for SCP02 (ISO/IEC 9797-1 MAC algorithm 3)
///
/// The data is padded, every block but the last is chained with single DES
/// under the first key half, and the last block is encrypted with triple-DES.
pub fn mac_full_3des(key: &SessionKey, iv: &Icv, data: &[u8]) -> Result<Scp02Mac> {
    let padded = pad(data);
    let (head, last) = padded.split_at(padded.len() - BLOCK_SIZE);

    let mut chaining = *iv;
    if !head.is_empty() {
        let encrypted = cbc::Encryptor::<Des>::new_from_slices(key.des_key(), iv)?
            .encrypt_padded_vec_mut::<NoPadding>(head);
        chaining.copy_from_slice(&encrypted[encrypted.len() - BLOCK_SIZE..]);
    }

    let mut block = Block::<TdesEde3>::clone_from_slice(last);
    for (b, c) in block.iter_mut().zip(chaining.iter()) {
        *b ^= *c;
    }
    TdesEde3::new_from_slice(key.as_bytes())?.encrypt_block(&mut block);

    let mut mac = Scp02Mac::default();
    mac.copy_from_slice(&block);
    Ok(mac)
}

/// Encrypt an ICV (Initial Chaining Vector) for SCP02
///
/// Single DES under the first 8 bytes of the session MAC key.
pub fn encrypt_icv(mac_key: &SessionKey, icv: &Icv) -> Result<Icv> {
    let mut mac = <CbcMac<Des> as Mac>::new_from_slice(mac_key.des_key())?;
    mac.update(icv);

    let mut encrypted = Icv::default();
    encrypted.copy_from_slice(&mac.finalize().into_bytes());
    Ok(encrypted)
}

/// Pad and encrypt command data with triple-DES CBC under a zero IV
pub fn encrypt_cbc(enc_key: &SessionKey, data: &[u8]) -> Result<Vec<u8>> {
    tdes_cbc_encrypt(enc_key.as_bytes(), &ZERO_IV, &pad(data))
}

/// Decrypt triple-DES CBC data and strip its ISO/IEC 7816-4 padding
pub fn decrypt_cbc(enc_key: &SessionKey, data: &[u8]) -> Result<Vec<u8>> {
    check_aligned(data)?;
    let decrypted = cbc::Decryptor::<TdesEde3>::new_from_slices(enc_key.as_bytes(), &ZERO_IV)?
        .decrypt_padded_vec_mut::<NoPadding>(data)
        .map_err(|_| Error::Crypto("decryption failed"))?;
    Ok(unpad(&decrypted)?.to_vec())
}

/// Encrypt block-aligned sensitive data with triple-DES ECB under the DEK
pub fn encrypt_ecb(dek: &SessionKey, data: &[u8]) -> Result<Vec<u8>> {
    check_aligned(data)?;
    let cipher = TdesEde3::new_from_slice(dek.as_bytes())?;

    let mut out = data.to_vec();
    for chunk in out.chunks_exact_mut(BLOCK_SIZE) {
        cipher.encrypt_block(GenericArray::from_mut_slice(chunk));
    }
    Ok(out)
}

/// Key check value: first three bytes of a zero block encrypted under the key
pub fn key_check_value(key: &[u8]) -> Result<KeyCheckValue> {
    let mut block = Block::<TdesEde3>::default();
    TdesEde3::new_from_slice(key)?.encrypt_block(&mut block);

    let mut kcv = KeyCheckValue::default();
    kcv.copy_from_slice(&block[..3]);
    Ok(kcv)
}

/// Resize a 16-byte double-length key to 24 bytes for 3DES
///
/// This copies the first 8 bytes to the end of the key.
pub fn resize_key(key: &[u8; 16]) -> [u8; 24] {
    let mut result = [0u8; 24];
    result[..16].copy_from_slice(key);
    result[16..].copy_from_slice(&key[..8]);
    result
}
