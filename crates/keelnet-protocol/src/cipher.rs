//! Symmetric body cipher: AES-128 in ECB mode with PKCS7 padding.
//!
//! Both peers share one fixed 16-byte key. It is never stored as a literal:
//! [`CipherKey::embedded`] rebuilds it by XOR-ing two tables compiled into
//! the binary. That is obfuscation only. There is no key exchange, and
//! ECB leaks equal-block patterns; the format is kept for wire
//! compatibility with existing peers.
//!
//! ## The inert IV
//!
//! [`derive_iv`] computes a per-frame 16-byte value from the session id
//! and the sequence number. ECB consumes no IV, so nothing ever feeds it
//! to the cipher. It is kept so the send path can log it and so a future
//! cipher mode has the derivation ready. Switching to CBC here would change
//! every byte on the wire.

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit, block_padding::Pkcs7};

use crate::{FrameError, SessionId};

type Aes128EcbEnc = ecb::Encryptor<aes::Aes128>;
type Aes128EcbDec = ecb::Decryptor<aes::Aes128>;

/// AES block length in bytes.
pub const BLOCK_SIZE: usize = 16;

// Both tables are 16 entries of which only the low byte survives the XOR.
const XOR_CODE: [u16; 16] = [
    0x0b96, 0x0135, 0x0bf0, 0x0b0a, 0x1ad2, 0x0ff1, 0x0ce8, 0x13b8, 0x0430, 0x01d5, 0x0631,
    0x080b, 0x109c, 0x1cd8, 0x1e3d, 0x1047,
];
const FAKE_CODE: [u16; 16] = [
    0x0b1d, 0x01ad, 0x0b64, 0x0b57, 0x1afb, 0x0f9d, 0x0ca9, 0x1339, 0x048a, 0x0111, 0x0669,
    0x0868, 0x1062, 0x1cd3, 0x1e54, 0x1043,
];

/// A 128-bit AES key.
///
/// `Debug` is implemented by hand so a key never ends up in a log line.
#[derive(Clone, PartialEq, Eq)]
pub struct CipherKey([u8; 16]);

impl CipherKey {
    /// Wraps raw key bytes. Mostly useful in tests.
    pub fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// The shared key every Keelnet peer embeds.
    pub fn embedded() -> Self {
        let mut bytes = [0u8; 16];
        for (i, byte) in bytes.iter_mut().enumerate() {
            // Truncation to the low byte is part of the key schedule.
            *byte = (XOR_CODE[i] ^ FAKE_CODE[i]) as u8;
        }
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Encrypts `plaintext`, returning a PKCS7-padded ciphertext whose
    /// length is the next multiple of 16 strictly above the input length.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        Aes128EcbEnc::new(&self.0.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }

    /// Decrypts `ciphertext` and strips PKCS7 padding.
    ///
    /// # Errors
    /// [`FrameError::DecryptFailure`] if the input is empty, not a whole
    /// number of blocks, or its padding is malformed.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, FrameError> {
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(FrameError::DecryptFailure);
        }
        Aes128EcbDec::new(&self.0.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| FrameError::DecryptFailure)
    }
}

impl Default for CipherKey {
    fn default() -> Self {
        Self::embedded()
    }
}

impl std::fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CipherKey(..)")
    }
}

/// Per-frame IV: `session` little-endian in the first 8 bytes, `sequence`
/// widened to `u64` little-endian in the last 8. All zeroes before login.
///
/// Not consumed by the ECB cipher (see the module docs).
pub fn derive_iv(session: SessionId, sequence: u16) -> [u8; 16] {
    let mut iv = [0u8; 16];
    if session.is_authenticated() {
        iv[..8].copy_from_slice(&session.0.to_le_bytes());
        iv[8..].copy_from_slice(&u64::from(sequence).to_le_bytes());
    }
    iv
}
