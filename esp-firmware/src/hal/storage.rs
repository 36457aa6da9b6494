// Konfigurations-Backends: SD-Karte (primär) und Flash-Sektor (Fallback)
//
// Die SD-Operationen sind blockierend. Sie laufen nur beim Boot und beim
// Speichern aus dem Portal, danach folgt ohnehin ein Neustart.

use defmt::{info, warn};
use embedded_sdmmc::{Mode, SdCard, TimeSource, Timestamp, VolumeIdx, VolumeManager};
use embedded_storage::{ReadStorage, Storage};
use esp_core::config_store::CONFIG_DOC_CAPACITY;
use esp_core::storage::{
    FLASH_RECORD_HEADER, FLASH_RECORD_TRAILER, decode_flash_record, encode_flash_record,
};
use esp_core::{ConfigBackend, StorageError, TimeSource as HubTimeSource};

use crate::CLOCK;
use crate::config::{FLASH_SECTOR_SIZE, SD_CONFIG_FILE};

const FLASH_RECORD_CAPACITY: usize = FLASH_RECORD_HEADER + CONFIG_DOC_CAPACITY + FLASH_RECORD_TRAILER;

// Der Record muss in einen einzelnen Sektor passen
const _: () = assert!(FLASH_RECORD_CAPACITY <= FLASH_SECTOR_SIZE);

// ============================================================================
// Zeitstempel für FAT-Einträge
// ============================================================================

/// Liefert die SNTP-Zeit, vor dem ersten Sync den 1.1.2024
#[derive(Debug, Clone, Copy, Default)]
pub struct FatClock;

impl TimeSource for FatClock {
    fn get_timestamp(&self) -> Timestamp {
        match CLOCK.current_time() {
            Some(t) => Timestamp {
                year_since_1970: t.year.saturating_sub(1970) as u8,
                zero_indexed_month: t.month.saturating_sub(1),
                zero_indexed_day: t.day.saturating_sub(1),
                hours: t.hour,
                minutes: t.minute,
                seconds: t.second,
            },
            None => Timestamp {
                year_since_1970: 54,
                zero_indexed_month: 0,
                zero_indexed_day: 0,
                hours: 0,
                minutes: 0,
                seconds: 0,
            },
        }
    }
}

fn sd_error<E: core::fmt::Debug>(e: embedded_sdmmc::Error<E>) -> StorageError {
    match e {
        embedded_sdmmc::Error::NotFound => StorageError::NotFound,
        _ => StorageError::Io,
    }
}

// ============================================================================
// SD-Karte
// ============================================================================

/// `CONFIG.JSN` im Root-Verzeichnis der ersten FAT-Partition
pub struct SdCardBackend<S, D>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
{
    volume_mgr: VolumeManager<SdCard<S, D>, FatClock, 4, 4, 1>,
    available: bool,
}

impl<S, D> SdCardBackend<S, D>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
{
    pub fn new(sd_card: SdCard<S, D>) -> Self {
        Self {
            volume_mgr: VolumeManager::new(sd_card, FatClock),
            available: false,
        }
    }

    fn read_file(&self, buf: &mut [u8]) -> Result<usize, StorageError> {
        let volume = self.volume_mgr.open_volume(VolumeIdx(0)).map_err(sd_error)?;
        let root_dir = volume.open_root_dir().map_err(sd_error)?;
        let file = root_dir
            .open_file_in_dir(SD_CONFIG_FILE, Mode::ReadOnly)
            .map_err(sd_error)?;

        if file.length() as usize > buf.len() {
            return Err(StorageError::TooLarge);
        }

        let mut filled = 0;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..]).map_err(sd_error)?;
            if n == 0 {
                break; // EOF
            }
            filled += n;
        }

        // Explizit schließen um Fehler zu sehen
        file.close().map_err(sd_error)?;
        root_dir.close().map_err(sd_error)?;
        volume.close().map_err(sd_error)?;

        Ok(filled)
    }

    fn write_file(&self, data: &[u8]) -> Result<(), StorageError> {
        let volume = self.volume_mgr.open_volume(VolumeIdx(0)).map_err(sd_error)?;
        let root_dir = volume.open_root_dir().map_err(sd_error)?;
        let file = root_dir
            .open_file_in_dir(SD_CONFIG_FILE, Mode::ReadWriteCreateOrTruncate)
            .map_err(sd_error)?;

        file.write(data).map_err(sd_error)?;

        file.close().map_err(sd_error)?;
        root_dir.close().map_err(sd_error)?;
        volume.close().map_err(sd_error)?;

        Ok(())
    }
}

impl<S, D> ConfigBackend for SdCardBackend<S, D>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
{
    fn name(&self) -> &'static str {
        "sd"
    }

    fn init(&mut self) -> bool {
        // Karte + FAT vorhanden, wenn sich das Root-Verzeichnis öffnen lässt
        self.available = match self.volume_mgr.open_volume(VolumeIdx(0)) {
            Ok(volume) => {
                let root_ok = volume
                    .open_root_dir()
                    .and_then(|root_dir| root_dir.close())
                    .is_ok();
                volume.close().is_ok() && root_ok
            }
            Err(e) => {
                warn!("Config: SD card not usable: {}", defmt::Debug2Format(&e));
                false
            }
        };
        self.available
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        if !self.available {
            return Err(StorageError::Unavailable);
        }
        self.read_file(buf)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), StorageError> {
        if !self.available {
            return Err(StorageError::Unavailable);
        }
        self.write_file(data)?;
        info!("Config: wrote {} bytes to {}", data.len(), SD_CONFIG_FILE);
        Ok(())
    }
}

// ============================================================================
// Flash
// ============================================================================

/// Ein Record (Magic, Länge, JSON, CRC) in einem Flash-Sektor
pub struct FlashBackend<F> {
    flash: F,
    offset: u32,
    available: bool,
}

impl<F> FlashBackend<F>
where
    F: ReadStorage + Storage,
{
    pub fn new(flash: F, offset: u32) -> Self {
        Self {
            flash,
            offset,
            available: false,
        }
    }
}

impl<F> ConfigBackend for FlashBackend<F>
where
    F: ReadStorage + Storage,
{
    fn name(&self) -> &'static str {
        "flash"
    }

    fn init(&mut self) -> bool {
        let mut probe = [0u8; 4];
        self.available = self.flash.read(self.offset, &mut probe).is_ok();
        self.available
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        if !self.available {
            return Err(StorageError::Unavailable);
        }

        let mut record = [0u8; FLASH_RECORD_CAPACITY];
        self.flash
            .read(self.offset, &mut record)
            .map_err(|_| StorageError::Io)?;

        let payload = decode_flash_record(&record)?;
        if payload.len() > buf.len() {
            return Err(StorageError::TooLarge);
        }
        buf[..payload.len()].copy_from_slice(payload);
        Ok(payload.len())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), StorageError> {
        if !self.available {
            return Err(StorageError::Unavailable);
        }

        let mut record = [0xFFu8; FLASH_RECORD_CAPACITY];
        let len = encode_flash_record(data, &mut record)?;

        // Storage::write löscht den Sektor selbst (read-modify-write)
        self.flash
            .write(self.offset, &record[..len])
            .map_err(|_| StorageError::Io)?;
        info!("Config: wrote {} byte record to flash", len);
        Ok(())
    }
}
