//! Konfigurations-Persistenz über mehrere Backends
//!
//! Strategie: **auf alle schreiben, mit Fallback lesen**.
//!
//! - Backends werden in fester Priorität geprüft (Index 0 = primär, z.B. SD-Karte)
//! - `load()` nimmt das erste Backend mit gültigem Dokument
//! - `save()` schreibt auf jedes verfügbare Backend; Erfolg wenn mindestens eins klappt
//!
//! Teil-Dokumente: fehlende Keys behalten den aktuellen Wert im Speicher.

use heapless::String;
use serde::Deserialize;

use crate::logging::{log_debug, log_info, log_warn};
use crate::traits::{ConfigBackend, StorageError};
use crate::types::*;

/// Längstes Escape eines einzelnen Zeichens (`\u00XX` für Steuerzeichen)
const MAX_ESCAPE_LEN: usize = 6;

/// Keys, Anführungszeichen, Doppelpunkte, Kommas, Klammern und ein fünfstelliger Port
const CONFIG_DOC_OVERHEAD: usize = 128;

/// Maximale Größe des JSON-Dokuments in Bytes
///
/// Reicht für einen Record, dessen Strings voll ausgeschöpft und komplett
/// escaped sind.
pub const CONFIG_DOC_CAPACITY: usize = (MQTT_SERVER_CAPACITY
    + MQTT_USERNAME_CAPACITY
    + MQTT_PASSWORD_CAPACITY
    + WIFI_SSID_CAPACITY
    + WIFI_PASSWORD_CAPACITY
    + HUB_ID_CAPACITY)
    * MAX_ESCAPE_LEN
    + CONFIG_DOC_OVERHEAD;

/// Scratch-Buffer für das Unescaping von JSON-Strings
const UNESCAPE_BUFFER_SIZE: usize = 128;

/// Fehler-Typ für Konfigurations-Operationen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Kein Backend verfügbar
    NoBackend,
    /// Auf keinem Backend ein gültiges Dokument gefunden
    NotFound,
    /// JSON-Dokument nicht lesbar (Syntax, Typen oder zu lange Werte)
    Malformed,
    /// Record passt nicht in den Serialisierungs-Buffer
    Encode,
    /// Kein einziges Backend konnte schreiben
    WriteFailed,
}

/// Teil-Dokument: jeder Key ist optional
///
/// Unbekannte Keys werden ignoriert.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    pub mqtt_server: Option<String<MQTT_SERVER_CAPACITY>>,
    pub mqtt_port: Option<u16>,
    pub mqtt_username: Option<String<MQTT_USERNAME_CAPACITY>>,
    pub mqtt_password: Option<String<MQTT_PASSWORD_CAPACITY>>,
    pub wifi_ssid: Option<String<WIFI_SSID_CAPACITY>>,
    pub wifi_password: Option<String<WIFI_PASSWORD_CAPACITY>>,
    pub hub_id: Option<String<HUB_ID_CAPACITY>>,
}

impl ConfigPatch {
    /// Überträgt alle vorhandenen Keys auf `config`
    pub fn apply_to(self, config: &mut HubConfig) {
        if let Some(v) = self.mqtt_server {
            config.mqtt_server = v;
        }
        if let Some(v) = self.mqtt_port {
            config.mqtt_port = v;
        }
        if let Some(v) = self.mqtt_username {
            config.mqtt_username = v;
        }
        if let Some(v) = self.mqtt_password {
            config.mqtt_password = v;
        }
        if let Some(v) = self.wifi_ssid {
            config.wifi_ssid = v;
        }
        if let Some(v) = self.wifi_password {
            config.wifi_password = v;
        }
        if let Some(v) = self.hub_id {
            config.hub_id = v;
        }
    }
}

/// Parst ein (Teil-)Dokument
pub fn parse_patch(doc: &[u8]) -> Result<ConfigPatch, ConfigError> {
    let mut scratch = [0u8; UNESCAPE_BUFFER_SIZE];
    serde_json_core::from_slice_escaped::<ConfigPatch>(doc, &mut scratch)
        .map(|(patch, _)| patch)
        .map_err(|_| ConfigError::Malformed)
}

/// Serialisiert den kompletten Record, gibt die Länge zurück
pub fn encode_config(config: &HubConfig, out: &mut [u8]) -> Result<usize, ConfigError> {
    serde_json_core::to_slice(config, out).map_err(|_| ConfigError::Encode)
}

/// Konfigurations-Store über `N` Backends in Prioritäts-Reihenfolge
///
/// Hält den einzigen In-Memory Record für die gesamte Laufzeit.
pub struct ConfigStore<'a, const N: usize> {
    backends: [&'a mut dyn ConfigBackend; N],
    available: [bool; N],
    config: HubConfig,
    loaded: bool,
}

impl<'a, const N: usize> ConfigStore<'a, N> {
    /// Erstellt den Store mit Default-Konfiguration
    ///
    /// # Parameter
    /// - `backends`: Backends in Prioritäts-Reihenfolge (primär zuerst)
    pub fn new(backends: [&'a mut dyn ConfigBackend; N]) -> Self {
        Self {
            backends,
            available: [false; N],
            config: HubConfig::default(),
            loaded: false,
        }
    }

    /// Prüft alle Backends; `true` wenn mindestens eins verfügbar ist
    pub fn init_storage(&mut self) -> bool {
        for (backend, available) in self.backends.iter_mut().zip(self.available.iter_mut()) {
            *available = backend.init();
            if *available {
                log_info!("Config: backend '{}' available", backend.name());
            } else {
                log_warn!("Config: backend '{}' unavailable", backend.name());
            }
        }

        self.available.iter().any(|&a| a)
    }

    pub fn is_available(&self, index: usize) -> bool {
        self.available.get(index).copied().unwrap_or(false)
    }

    /// Lädt die Konfiguration vom ersten Backend mit gültigem Dokument
    ///
    /// Gibt den Namen des Backends zurück. Fehlende, unlesbare oder beschädigte
    /// Dokumente werden wie "nicht gefunden" behandelt.
    pub fn load(&mut self) -> Result<&'static str, ConfigError> {
        let mut buf = [0u8; CONFIG_DOC_CAPACITY];

        for (backend, &available) in self.backends.iter_mut().zip(self.available.iter()) {
            if !available {
                continue;
            }

            let len = match backend.read(&mut buf) {
                Ok(len) => len,
                Err(StorageError::NotFound) => {
                    log_info!("Config: no config file on '{}'", backend.name());
                    continue;
                }
                Err(e) => {
                    log_warn!("Config: read from '{}' failed: {}", backend.name(), e);
                    continue;
                }
            };

            match parse_patch(&buf[..len]) {
                Ok(patch) => {
                    patch.apply_to(&mut self.config);
                    self.loaded = true;
                    log_info!(
                        "Config: loaded from '{}' (MQTT {}:{}, hub {})",
                        backend.name(),
                        self.config.mqtt_server.as_str(),
                        self.config.mqtt_port,
                        self.config.hub_id.as_str()
                    );
                    return Ok(backend.name());
                }
                Err(_) => {
                    log_warn!("Config: failed to parse config on '{}'", backend.name());
                }
            }
        }

        Err(ConfigError::NotFound)
    }

    /// Speichert den aktuellen Record auf jedes verfügbare Backend
    ///
    /// Gibt die Anzahl erfolgreich beschriebener Backends zurück.
    pub fn save(&mut self) -> Result<usize, ConfigError> {
        persist(&mut self.backends, &self.available, &self.config)
    }

    /// Übernimmt ein Dokument vom Konfigurations-Portal
    ///
    /// - Ungültiges JSON: `ConfigError::Malformed`, Record bleibt unverändert
    /// - Leeres `wifi_password`: gespeichertes Passwort bleibt erhalten
    /// - Der neue Record ersetzt den alten erst, wenn er auf mindestens
    ///   einem Backend gespeichert wurde
    pub fn apply_update(&mut self, doc: &[u8]) -> Result<usize, ConfigError> {
        let mut patch = parse_patch(doc)?;
        if patch.wifi_password.as_ref().is_some_and(|p| p.is_empty()) {
            patch.wifi_password = None;
        }

        let mut candidate = self.config.clone();
        patch.apply_to(&mut candidate);

        let written = persist(&mut self.backends, &self.available, &candidate)?;
        self.config = candidate;
        Ok(written)
    }

    /// JSON-Ansicht für das Portal (ohne WiFi-Passwort)
    pub fn portal_view(&self, out: &mut [u8]) -> Result<usize, ConfigError> {
        let mut view = self.config.clone();
        view.wifi_password.clear();
        encode_config(&view, out)
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Wurde ein Dokument von einem Backend geladen?
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

/// Schreibt `config` auf jedes verfügbare Backend
///
/// Das Dokument wird vollständig serialisiert bevor ein Backend berührt wird.
fn persist<const N: usize>(
    backends: &mut [&mut dyn ConfigBackend; N],
    available: &[bool; N],
    config: &HubConfig,
) -> Result<usize, ConfigError> {
    if !available.iter().any(|&a| a) {
        return Err(ConfigError::NoBackend);
    }

    let mut buf = [0u8; CONFIG_DOC_CAPACITY];
    let len = encode_config(config, &mut buf)?;

    let mut written = 0;
    for (backend, &available) in backends.iter_mut().zip(available.iter()) {
        if !available {
            continue;
        }
        match backend.write(&buf[..len]) {
            Ok(()) => {
                log_info!("Config: saved to '{}'", backend.name());
                written += 1;
            }
            Err(e) => log_warn!("Config: write to '{}' failed: {}", backend.name(), e),
        }
    }

    log_debug!("Config: {} backend(s) written", written);
    if written == 0 {
        Err(ConfigError::WriteFailed)
    } else {
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_patch_full_document() {
        let doc = br#"{"mqtt_server":"10.0.0.2","mqtt_port":8883,"mqtt_username":"u","mqtt_password":"p","wifi_ssid":"Net","wifi_password":"secret","hub_id":"H-3"}"#;
        let mut config = HubConfig::default();
        parse_patch(doc).unwrap().apply_to(&mut config);

        assert_eq!(config.mqtt_server.as_str(), "10.0.0.2");
        assert_eq!(config.mqtt_port, 8883);
        assert_eq!(config.mqtt_username.as_str(), "u");
        assert_eq!(config.mqtt_password.as_str(), "p");
        assert_eq!(config.wifi_ssid.as_str(), "Net");
        assert_eq!(config.wifi_password.as_str(), "secret");
        assert_eq!(config.hub_id.as_str(), "H-3");
    }

    #[test]
    fn test_missing_keys_keep_current_values() {
        let mut config = HubConfig::default();
        config.mqtt_port = 1884;
        parse_patch(br#"{"hub_id":"H-9"}"#)
            .unwrap()
            .apply_to(&mut config);

        assert_eq!(config.hub_id.as_str(), "H-9");
        assert_eq!(config.mqtt_port, 1884);
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let mut config = HubConfig::default();
        parse_patch(br#"{"color":"blue","wifi_ssid":"Net","retries":3}"#)
            .unwrap()
            .apply_to(&mut config);
        assert_eq!(config.wifi_ssid.as_str(), "Net");
    }

    #[test]
    fn test_truncated_document_is_malformed() {
        assert!(matches!(
            parse_patch(br#"{"mqtt_server":"broker"#),
            Err(ConfigError::Malformed)
        ));
    }

    #[test]
    fn test_value_too_long_is_malformed() {
        let doc = br#"{"hub_id":"this-hub-id-is-way-too-long"}"#;
        assert!(matches!(parse_patch(doc), Err(ConfigError::Malformed)));
    }

    #[test]
    fn test_port_out_of_range_is_malformed() {
        assert!(matches!(
            parse_patch(br#"{"mqtt_port":70000}"#),
            Err(ConfigError::Malformed)
        ));
    }

    #[test]
    fn test_encode_config_keys() {
        let mut buf = [0u8; CONFIG_DOC_CAPACITY];
        let n = encode_config(&HubConfig::default(), &mut buf).unwrap();
        assert_eq!(
            core::str::from_utf8(&buf[..n]).unwrap(),
            r#"{"mqtt_server":"","mqtt_port":1883,"mqtt_username":"","mqtt_password":"","wifi_ssid":"","wifi_password":"","hub_id":"H-0"}"#
        );
    }

    #[test]
    fn test_fully_escaped_record_fits_document() {
        fn fill<const N: usize>(s: &mut String<N>, c: char) {
            s.clear();
            while s.push(c).is_ok() {}
        }

        let mut config = HubConfig::default();
        config.mqtt_port = u16::MAX;
        fill(&mut config.mqtt_server, '\u{1}');
        fill(&mut config.mqtt_username, '\u{1}');
        fill(&mut config.mqtt_password, '\u{1}');
        fill(&mut config.wifi_ssid, '\u{1}');
        fill(&mut config.wifi_password, '\u{1}');
        fill(&mut config.hub_id, '\u{1}');

        let mut buf = [0u8; CONFIG_DOC_CAPACITY];
        assert!(encode_config(&config, &mut buf).is_ok());
    }

    #[test]
    fn test_encode_into_small_buffer_fails() {
        let mut buf = [0u8; 16];
        assert_eq!(
            encode_config(&HubConfig::default(), &mut buf),
            Err(ConfigError::Encode)
        );
    }
}
