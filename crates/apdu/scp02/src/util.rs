//! Common utilities for SCP02 operations

use cipher::block_padding::{Iso7816, RawPadding};

use crate::{Error, Result, constants::scp::BLOCK_SIZE};

/// Length of `len` bytes after ISO/IEC 7816-4 padding
///
/// Padding always adds at least one byte, so block-aligned input grows by a
/// full block.
pub const fn padded_len(len: usize) -> usize {
    (len + 1).next_multiple_of(BLOCK_SIZE)
}

/// Apply ISO/IEC 7816-4 padding (`80 00 .. 00`) up to the next block boundary
pub fn pad(data: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; padded_len(data.len())];
    out[..data.len()].copy_from_slice(data);
    let last_block = out.len() - BLOCK_SIZE;
    Iso7816::raw_pad(&mut out[last_block..], data.len() - last_block);
    out
}

/// Remove ISO/IEC 7816-4 padding from block-aligned data
pub fn unpad(data: &[u8]) -> Result<&[u8]> {
    if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
        return Err(Error::Crypto("padded data is not block aligned"));
    }
    let last_block = data.len() - BLOCK_SIZE;
    let kept = Iso7816::raw_unpad(&data[last_block..])
        .map_err(|_| Error::Crypto("invalid ISO 7816-4 padding"))?
        .len();
    Ok(&data[..last_block + kept])
}

/// Validate that data has the expected length
pub const fn check_length(data: &[u8], expected: usize) -> Result<()> {
    if data.len() != expected {
        return Err(Error::InvalidLength {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}
