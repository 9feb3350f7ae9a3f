use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, WireError};

/// Frame header: module (1) + register (1).
pub const HEADER_SIZE: usize = 2;

/// High bit of the register byte: set on responses and notifications.
pub const RESPONSE_FLAG: u8 = 0x80;

/// A `(module, register)` pair addressing one command/response slot.
///
/// The register byte carries the response flag in its high bit; two
/// addresses that differ only in that bit refer to the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub module: u8,
    pub register: u8,
}

impl Address {
    pub fn new(module: u8, register: u8) -> Self {
        Self { module, register }
    }

    /// The same address with the response flag cleared.
    pub fn request(self) -> Self {
        Self {
            module: self.module,
            register: self.register & !RESPONSE_FLAG,
        }
    }

    /// The same address with the response flag set.
    pub fn response(self) -> Self {
        Self {
            module: self.module,
            register: self.register | RESPONSE_FLAG,
        }
    }

    /// Register id without the response flag.
    pub fn register_id(self) -> u8 {
        self.register & !RESPONSE_FLAG
    }

    pub fn is_response(self) -> bool {
        self.register & RESPONSE_FLAG != 0
    }
}

/// One wire command or response: address plus payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub address: Address,
    pub payload: Bytes,
}

impl Command {
    pub fn new(module: u8, register: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            address: Address::new(module, register),
            payload: payload.into(),
        }
    }

    /// Encode into the wire format `[module, register, payload...]`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE + self.payload.len());
        dst.put_u8(self.address.module);
        dst.put_u8(self.address.register);
        dst.put_slice(&self.payload);
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decode an inbound frame. The response flag stays on the address.
    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() < HEADER_SIZE {
            return Err(WireError::ShortFrame { len: frame.len() });
        }
        Ok(Self {
            address: Address::new(frame[0], frame[1]),
            payload: Bytes::copy_from_slice(&frame[HEADER_SIZE..]),
        })
    }

    pub fn is_response(&self) -> bool {
        self.address.is_response()
    }

    /// Subscribe to notifications from `address` (enable byte 0x01).
    pub fn subscribe(address: Address) -> Self {
        Self {
            address: address.request(),
            payload: Bytes::from_static(&[0x01]),
        }
    }

    /// Unsubscribe from notifications at `address` (enable byte 0x00).
    pub fn unsubscribe(address: Address) -> Self {
        Self {
            address: address.request(),
            payload: Bytes::from_static(&[0x00]),
        }
    }

    /// The inverse of a subscribe command: same address, cleared enable
    /// byte. Returns `None` for commands that are not subscriptions.
    pub fn inverse_subscription(&self) -> Option<Self> {
        if self.payload.as_ref() == [0x01] {
            Some(Self::unsubscribe(self.address))
        } else {
            None
        }
    }

    /// Leading bytes a response to this request will carry.
    pub fn response_prefix(&self) -> Vec<u8> {
        vec![
            self.address.module,
            self.address.register | RESPONSE_FLAG,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let cmd = Command::new(0x03, 0x04, vec![0xaa, 0xbb]);
        let wire = cmd.to_bytes();
        assert_eq!(wire.as_ref(), &[0x03, 0x04, 0xaa, 0xbb]);

        let decoded = Command::decode(&wire).unwrap();
        assert_eq!(decoded, cmd);
        assert!(!decoded.is_response());
    }

    #[test]
    fn response_flag_detected() {
        let decoded = Command::decode(&[0x09, 0x83, 0x00]).unwrap();
        assert!(decoded.is_response());
        assert_eq!(decoded.address.register_id(), 0x03);
        assert_eq!(decoded.address.request(), Address::new(0x09, 0x03));
    }

    #[test]
    fn short_frame_rejected() {
        let err = Command::decode(&[0x03]).unwrap_err();
        assert!(matches!(err, WireError::ShortFrame { len: 1 }));
    }

    #[test]
    fn empty_payload_allowed() {
        let decoded = Command::decode(&[0x0b, 0x06]).unwrap();
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn subscribe_has_computable_inverse() {
        let sub = Command::subscribe(Address::new(0x03, 0x04));
        let unsub = sub.inverse_subscription().unwrap();
        assert_eq!(unsub.address, sub.address);
        assert_eq!(unsub.payload.as_ref(), &[0x00]);
        assert!(unsub.inverse_subscription().is_none());
    }

    #[test]
    fn response_prefix_sets_flag() {
        let cmd = Command::new(0x05, 0x03, vec![0x01]);
        assert_eq!(cmd.response_prefix(), vec![0x05, 0x83]);
    }
}
