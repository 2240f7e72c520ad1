use crate::error::{ModemError, Result};
use crate::protocol::ProtocolId;
use crate::{FSK_BYTES_PER_SYMBOL, HEADER_SIZE, MAX_PAYLOAD_SIZE, PAYLOAD_CRC_SIZE};

/// CRC-16-CCITT for payload integrity verification
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u32 = 0xFFFF;
    for &byte in data {
        crc ^= (byte as u32) << 8;
        for _ in 0..8 {
            crc <<= 1;
            if crc & 0x10000 != 0 {
                crc ^= 0x1021;
            }
        }
    }
    (crc & 0xFFFF) as u16
}

/// CRC-8 with polynomial 0xD5
pub fn crc8(data: &[u8]) -> u8 {
    const POLYNOMIAL: u8 = 0xD5;
    let mut crc = 0u8;

    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            if (crc & 0x80) != 0 {
                crc = (crc << 1) ^ POLYNOMIAL;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Header symbol sent right after the start marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub protocol: ProtocolId,
    pub payload_len: usize,
}

impl Header {
    pub fn new(protocol: ProtocolId, payload_len: usize) -> Result<Self> {
        if payload_len == 0 {
            return Err(ModemError::EmptyPayload);
        }
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ModemError::PayloadTooLarge {
                len: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(Self {
            protocol,
            payload_len,
        })
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let fields = [self.protocol.id() as u8, self.payload_len as u8];
        [fields[0], fields[1], crc8(&fields)]
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(ModemError::InvalidInputSize);
        }
        if crc8(&bytes[..2]) != bytes[2] {
            return Err(ModemError::HeaderCrcMismatch);
        }
        let protocol = ProtocolId::try_from(bytes[0] as i32)?;
        Self::new(protocol, bytes[1] as usize)
    }

    /// Number of data symbols carrying payload and CRC-16
    pub fn data_symbols(&self) -> usize {
        (self.payload_len + PAYLOAD_CRC_SIZE).div_ceil(FSK_BYTES_PER_SYMBOL)
    }
}

/// Append CRC-16 and pad to whole symbols
pub fn encode_payload(payload: &[u8]) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(payload.len() + PAYLOAD_CRC_SIZE + FSK_BYTES_PER_SYMBOL);
    encoded.extend_from_slice(payload);
    encoded.extend_from_slice(&crc16(payload).to_be_bytes());

    let remainder = encoded.len() % FSK_BYTES_PER_SYMBOL;
    if remainder != 0 {
        encoded.resize(encoded.len() + FSK_BYTES_PER_SYMBOL - remainder, 0u8);
    }
    encoded
}

/// Verify the CRC-16 trailer and return the payload
pub fn decode_payload(data: &[u8], payload_len: usize) -> Result<Vec<u8>> {
    if data.len() < payload_len + PAYLOAD_CRC_SIZE {
        return Err(ModemError::InvalidInputSize);
    }
    let payload = &data[..payload_len];
    let received = u16::from_be_bytes([data[payload_len], data[payload_len + 1]]);
    if received != crc16(payload) {
        return Err(ModemError::PayloadCrcMismatch);
    }
    Ok(payload.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode() {
        let header = Header::new(ProtocolId::UltrasoundFast, 42).unwrap();
        let bytes = header.encode();
        assert_eq!(bytes[0], 4);
        assert_eq!(bytes[1], 42);
        assert_eq!(Header::decode(&bytes).unwrap(), header);
    }

    #[test]
    fn test_header_crc_validation() {
        let mut bytes = Header::new(ProtocolId::AudibleFast, 5).unwrap().encode();
        bytes[1] = 6;

        match Header::decode(&bytes) {
            Err(ModemError::HeaderCrcMismatch) => {} // Expected
            other => panic!("Expected HeaderCrcMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_header_rejects_unknown_protocol_with_valid_crc() {
        let fields = [9u8, 5u8];
        let bytes = [fields[0], fields[1], crc8(&fields)];
        assert_eq!(
            Header::decode(&bytes),
            Err(ModemError::UnsupportedProtocol(9))
        );
    }

    #[test]
    fn test_header_length_bounds() {
        assert_eq!(
            Header::new(ProtocolId::AudibleNormal, 0),
            Err(ModemError::EmptyPayload)
        );
        assert!(Header::new(ProtocolId::AudibleNormal, MAX_PAYLOAD_SIZE).is_ok());
        assert!(Header::new(ProtocolId::AudibleNormal, MAX_PAYLOAD_SIZE + 1).is_err());
    }

    #[test]
    fn test_payload_padding_and_symbol_count() {
        let encoded = encode_payload(b"Hello");
        // 5 payload + 2 CRC = 7, padded to 9
        assert_eq!(encoded.len(), 9);
        let header = Header::new(ProtocolId::AudibleNormal, 5).unwrap();
        assert_eq!(header.data_symbols(), 3);
        assert_eq!(decode_payload(&encoded, 5).unwrap(), b"Hello");
    }

    #[test]
    fn test_corrupted_payload_rejected() {
        let mut encoded = encode_payload(b"Hello World");
        encoded[1] = b'g';

        match decode_payload(&encoded, 11) {
            Err(ModemError::PayloadCrcMismatch) => {} // Expected
            other => panic!("Expected PayloadCrcMismatch, got {:?}", other),
        }
    }
}
