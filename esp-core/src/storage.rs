//! Flash-Record Format für das interne Fallback-Backend
//!
//! Ein Sektor enthält genau einen Record:
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ Magic: [u8; 4] = b"HCFG"     │  Offset: 0
//! ├──────────────────────────────┤
//! │ Länge: u32 (LE)              │  Offset: 4
//! ├──────────────────────────────┤
//! │ JSON-Dokument                │  Offset: 8
//! ├──────────────────────────────┤
//! │ CRC32 über das Dokument (LE) │  Offset: 8 + Länge
//! └──────────────────────────────┘
//! ```
//!
//! Ein gelöschter Sektor (0xFF) oder ein abgebrochener Schreibvorgang
//! ergibt `NotFound` bzw. `Corrupt`, nie ein halbes Dokument.

use crc::{CRC_32_ISO_HDLC, Crc};

use crate::traits::StorageError;

/// Magic-Bytes am Anfang des Records
pub const FLASH_RECORD_MAGIC: [u8; 4] = *b"HCFG";

/// Header-Größe (Magic + Länge)
pub const FLASH_RECORD_HEADER: usize = 8;

/// CRC-Größe am Ende
pub const FLASH_RECORD_TRAILER: usize = 4;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Schreibt `payload` als Record in `out`, gibt die Record-Länge zurück
pub fn encode_flash_record(payload: &[u8], out: &mut [u8]) -> Result<usize, StorageError> {
    let total = FLASH_RECORD_HEADER + payload.len() + FLASH_RECORD_TRAILER;
    if total > out.len() {
        return Err(StorageError::TooLarge);
    }

    let len = u32::try_from(payload.len()).map_err(|_| StorageError::TooLarge)?;
    out[..4].copy_from_slice(&FLASH_RECORD_MAGIC);
    out[4..8].copy_from_slice(&len.to_le_bytes());
    out[8..8 + payload.len()].copy_from_slice(payload);
    out[8 + payload.len()..total].copy_from_slice(&CRC32.checksum(payload).to_le_bytes());

    Ok(total)
}

/// Prüft einen Record und gibt das enthaltene Dokument zurück
pub fn decode_flash_record(record: &[u8]) -> Result<&[u8], StorageError> {
    if record.len() < FLASH_RECORD_HEADER + FLASH_RECORD_TRAILER {
        return Err(StorageError::NotFound);
    }
    if record[..4] != FLASH_RECORD_MAGIC {
        // Gelöschter oder fremder Sektor
        return Err(StorageError::NotFound);
    }

    let len = u32::from_le_bytes([record[4], record[5], record[6], record[7]]) as usize;
    let end = FLASH_RECORD_HEADER
        .checked_add(len)
        .filter(|end| end + FLASH_RECORD_TRAILER <= record.len())
        .ok_or(StorageError::Corrupt)?;

    let payload = &record[FLASH_RECORD_HEADER..end];
    let stored = u32::from_le_bytes([
        record[end],
        record[end + 1],
        record[end + 2],
        record[end + 3],
    ]);
    if stored != CRC32.checksum(payload) {
        return Err(StorageError::Corrupt);
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_roundtrip() {
        let mut sector = [0xFFu8; 128];
        let n = encode_flash_record(br#"{"hub_id":"H-1"}"#, &mut sector).unwrap();
        assert_eq!(n, 8 + 16 + 4);
        assert_eq!(decode_flash_record(&sector).unwrap(), br#"{"hub_id":"H-1"}"#);
    }

    #[test]
    fn test_erased_sector_is_not_found() {
        let sector = [0xFFu8; 64];
        assert_eq!(decode_flash_record(&sector), Err(StorageError::NotFound));
    }

    #[test]
    fn test_flipped_payload_bit_is_corrupt() {
        let mut sector = [0xFFu8; 64];
        encode_flash_record(b"{}", &mut sector).unwrap();
        sector[9] ^= 0x01;
        assert_eq!(decode_flash_record(&sector), Err(StorageError::Corrupt));
    }

    #[test]
    fn test_length_beyond_sector_is_corrupt() {
        let mut sector = [0u8; 32];
        sector[..4].copy_from_slice(&FLASH_RECORD_MAGIC);
        sector[4..8].copy_from_slice(&1000u32.to_le_bytes());
        assert_eq!(decode_flash_record(&sector), Err(StorageError::Corrupt));
    }

    #[test]
    fn test_payload_too_large() {
        let mut sector = [0u8; 16];
        assert_eq!(
            encode_flash_record(&[b'x'; 9], &mut sector),
            Err(StorageError::TooLarge)
        );
    }
}
