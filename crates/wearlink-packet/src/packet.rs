//! Command packets.
//!
//! ## Packet Format
//!
//! | Field      | Size (bytes) | Description                              |
//! |------------|--------------|------------------------------------------|
//! | service_id | 1            | Service the command belongs to           |
//! | command_id | 1            | Command within the service               |
//! | body       | variable     | TLV entries (see [`Tlv`](crate::Tlv))    |
//!
//! Encrypted packets replace the body with three entries: an encryption flag,
//! the nonce and the ciphertext of the plaintext TLV body.

use crate::{decrypt_data, encrypt_data, CryptoError, PacketError, SessionKey, Tlv};

/// Tag carrying a device error code.
pub const TAG_ERROR: u8 = 0x7F;
/// Tag marking an encrypted body.
pub const TAG_ENCRYPTED: u8 = 0x7C;
/// Tag carrying the encryption nonce.
pub const TAG_NONCE: u8 = 0x7D;
/// Tag carrying the ciphertext.
pub const TAG_CIPHERTEXT: u8 = 0x7E;

/// Error code the device uses to report success inside tag 0x7F.
pub const DEVICE_OK: u32 = 0x000186A0;

/// A command packet addressed to one (service, command) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Service identifier.
    pub service_id: u8,
    /// Command identifier.
    pub command_id: u8,
    /// Body entries.
    pub tlv: Tlv,
}

impl Packet {
    /// Create a packet.
    pub fn new(service_id: u8, command_id: u8, tlv: Tlv) -> Self {
        Packet {
            service_id,
            command_id,
            tlv,
        }
    }

    /// The (service, command) pair used to match responses.
    pub fn key(&self) -> (u8, u8) {
        (self.service_id, self.command_id)
    }

    /// Device error code carried in tag 0x7F, if any.
    pub fn error_code(&self) -> Option<u32> {
        self.tlv.get_u32(TAG_ERROR).ok()
    }

    /// Fail if the device reported an error.
    pub fn check_device_error(&self) -> Result<(), PacketError> {
        match self.error_code() {
            Some(code) if code != DEVICE_OK => Err(PacketError::DeviceError(code)),
            _ => Ok(()),
        }
    }

    /// Whether the body is encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.tlv.contains(TAG_ENCRYPTED)
    }

    /// Serialize the packet.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![self.service_id, self.command_id];
        self.tlv.encode_into(&mut buf);
        buf
    }

    /// Parse a packet.
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < 2 {
            return Err(PacketError::decode_at(data.len(), "packet shorter than header"));
        }
        let tlv = Tlv::decode(&data[2..], 2)?;
        Ok(Packet::new(data[0], data[1], tlv))
    }

    /// Encrypt the body with a fresh nonce.
    pub fn encrypt(&self, key: &SessionKey) -> Result<Packet, CryptoError> {
        let (nonce, ciphertext) = encrypt_data(&self.tlv.encode(), key)?;
        let tlv = Tlv::new()
            .put_bool(TAG_ENCRYPTED, true)
            .put_bytes(TAG_NONCE, nonce.to_vec())
            .put_bytes(TAG_CIPHERTEXT, ciphertext);
        Ok(Packet::new(self.service_id, self.command_id, tlv))
    }

    /// Decrypt the body. Plaintext packets are returned unchanged.
    pub fn decrypt(self, key: Option<&SessionKey>) -> Result<Packet, PacketError> {
        if !self.is_encrypted() {
            return Ok(self);
        }
        let key = key.ok_or(CryptoError::MissingKey)?;
        let nonce = self.tlv.require_bytes(TAG_NONCE)?;
        let ciphertext = self.tlv.require_bytes(TAG_CIPHERTEXT)?;
        let plaintext = decrypt_data(ciphertext, key, nonce)?;
        let tlv = Tlv::decode(&plaintext, 0)?;
        Ok(Packet::new(self.service_id, self.command_id, tlv))
    }
}

impl std::fmt::Display for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "packet {:02X}/{:02X} ({} tags)",
            self.service_id,
            self.command_id,
            self.tlv.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate_random_key;

    #[test]
    fn test_encode_layout() {
        let packet = Packet::new(0x01, 0x04, Tlv::new().put_u8(0x01, 2).put_u8(0x02, 1));
        assert_eq!(
            packet.encode(),
            vec![0x01, 0x04, 0x01, 0x01, 0x02, 0x02, 0x01, 0x01]
        );
    }

    #[test]
    fn test_decode() {
        let packet = Packet::decode(&[0x07, 0x16, 0x01, 0x01, 0x01]).unwrap();
        assert_eq!(packet.key(), (0x07, 0x16));
        assert!(packet.tlv.get_bool(0x01).unwrap());
    }

    #[test]
    fn test_decode_too_short() {
        assert!(Packet::decode(&[0x01]).is_err());
    }

    #[test]
    fn test_device_error() {
        let packet = Packet::new(1, 1, Tlv::new().put_u32(TAG_ERROR, 0x0001_E078));
        assert_eq!(packet.error_code(), Some(0x0001_E078));
        assert_eq!(
            packet.check_device_error(),
            Err(PacketError::DeviceError(0x0001_E078))
        );

        let ok = Packet::new(1, 1, Tlv::new().put_u32(TAG_ERROR, DEVICE_OK));
        assert!(ok.check_device_error().is_ok());
        assert!(Packet::new(1, 1, Tlv::new()).check_device_error().is_ok());
    }

    #[test]
    fn test_encrypt_decrypt() {
        let key = generate_random_key();
        let packet = Packet::new(0x07, 0x16, Tlv::new().put_bool(0x01, true));
        let encrypted = packet.encrypt(&key).unwrap();
        assert!(encrypted.is_encrypted());
        assert_eq!(encrypted.tlv.get_bytes(TAG_NONCE).map(<[u8]>::len), Some(12));

        let wire = encrypted.encode();
        let decrypted = Packet::decode(&wire).unwrap().decrypt(Some(&key)).unwrap();
        assert_eq!(decrypted, packet);
    }

    #[test]
    fn test_decrypt_without_key() {
        let key = generate_random_key();
        let encrypted = Packet::new(1, 1, Tlv::new()).encrypt(&key).unwrap();
        assert_eq!(
            encrypted.decrypt(None),
            Err(PacketError::Crypto(CryptoError::MissingKey))
        );
    }

    #[test]
    fn test_plaintext_passthrough() {
        let packet = Packet::new(1, 1, Tlv::new().put_u8(1, 1));
        assert_eq!(packet.clone().decrypt(None).unwrap(), packet);
    }
}
