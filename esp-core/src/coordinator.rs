//! Pipeline-Koordinator
//!
//! Entscheidet beim Boot zwischen Normalbetrieb und Konfigurations-Portal,
//! bringt die Verbindung zum Companion-Gerät und das WiFi hoch und überwacht
//! im laufenden Betrieb die Association.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::delay::DelayNs;

use crate::config_store::ConfigStore;
use crate::link::{DeliveryStatus, probe, send_credentials};
use crate::logging::{log_error, log_info, log_warn};
use crate::supervisor::{ConnectError, ConnectionSupervisor};
use crate::traits::{ConfigPortal, SerialLink, StatusDisplay, WifiRadio};
use crate::types::WifiCredentials;

/// Fehlgeschlagene Reconnects in Folge, bevor das Portal startet
pub const MAX_WIFI_FAILURES: u32 = 5;

/// Pause nach fehlgeschlagenem Reconnect
pub const RECONNECT_BACKOFF_MS: u32 = 5000;

/// Poll-Intervall während das Portal aktiv ist
pub const PORTAL_POLL_MS: u32 = 100;

/// Betriebsart nach dem Boot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootMode {
    Normal,
    Portal,
}

/// Ergebnis eines Koordinator-Durchlaufs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoopOutcome {
    /// WiFi steht, nichts zu tun
    Idle,
    /// Portal hat übernommen
    PortalActive,
    /// Reconnect fehlgeschlagen, Backoff abgewartet
    ReconnectFailed,
    /// Zu viele Fehlschläge, Portal wurde gestartet
    PortalStarted,
    /// WiFi wieder verbunden; `send_credentials` beim ersten Connect überhaupt
    Reconnected { send_credentials: bool },
}

/// Wählt die Betriebsart beim Boot
///
/// Ohne Speicher oder ohne gültige Konfiguration wird das Portal gestartet.
pub fn select_mode<const N: usize, D: StatusDisplay, P: ConfigPortal>(
    store: &mut ConfigStore<'_, N>,
    display: &mut D,
    portal: &mut P,
) -> BootMode {
    if !store.init_storage() {
        log_error!("Config: all storage systems failed, using defaults");
        display.show_status("No config found");
        portal.begin();
        return BootMode::Portal;
    }

    if store.load().is_err() {
        log_warn!("Config: no configuration found");
        display.show_status("Config required");
        portal.begin();
        return BootMode::Portal;
    }

    portal.check_trigger();
    if portal.is_active() {
        log_info!("Portal: active, normal operation paused");
        display.show_status("Config portal active");
        return BootMode::Portal;
    }

    BootMode::Normal
}

/// Treibt Boot-Sequenz und Überwachungs-Schleife
pub struct Coordinator<'s, M: RawMutex> {
    supervisor: &'s ConnectionSupervisor<M>,
    credentials_sent: bool,
    wifi_failures: u32,
}

impl<'s, M: RawMutex> Coordinator<'s, M> {
    pub fn new(supervisor: &'s ConnectionSupervisor<M>) -> Self {
        Self {
            supervisor,
            credentials_sent: false,
            wifi_failures: 0,
        }
    }

    pub fn credentials_sent(&self) -> bool {
        self.credentials_sent
    }

    pub fn wifi_failures(&self) -> u32 {
        self.wifi_failures
    }

    /// Liveness-Probe mit Statusanzeige
    pub async fn probe_link<L: SerialLink, D: DelayNs, S: StatusDisplay>(
        &mut self,
        link: &mut L,
        delay: &mut D,
        display: &mut S,
    ) -> bool {
        display.show_status("Testing UART...");
        if probe(link, delay).await {
            display.show_status("UART connected");
            delay.delay_ms(1000).await;
            true
        } else {
            display.show_status("UART failed");
            delay.delay_ms(2000).await;
            false
        }
    }

    /// Erste Association und Credential-Versand
    ///
    /// Ein fehlgeschlagener Versand wird nach 1 s genau einmal wiederholt.
    pub async fn bring_up<R, L, D, S>(
        &mut self,
        radio: &mut R,
        link: &mut L,
        delay: &mut D,
        display: &mut S,
        creds: &WifiCredentials<'_>,
    ) -> Result<(), ConnectError>
    where
        R: WifiRadio,
        L: SerialLink,
        D: DelayNs,
        S: StatusDisplay,
    {
        display.show_status("Connecting WiFi...");
        if let Err(e) = self.supervisor.associate(radio, delay, creds).await {
            display.show_wifi_status(false, None);
            return Err(e);
        }

        display.show_wifi_status(true, Some(creds.ssid));
        delay.delay_ms(1000).await;
        display.show_status("Sending WiFi to ESP-NOW");
        delay.delay_ms(1000).await;

        let mut status = send_credentials(link, delay, creds).await;
        if status == DeliveryStatus::Failed {
            log_warn!("Link: retrying credential send");
            delay.delay_ms(1000).await;
            status = send_credentials(link, delay, creds).await;
        }
        self.credentials_sent = true;

        if status.is_success() {
            display.show_status("WiFi info sent");
            delay.delay_ms(1000).await;
        } else {
            log_error!("Link: second credential send failed");
            display.show_status("WiFi send failed");
            delay.delay_ms(2000).await;
        }

        display.show_status("Connecting MQTT...");
        Ok(())
    }

    /// Ein Durchlauf der Überwachungs-Schleife
    ///
    /// Credentials werden bei einem Reconnect nie erneut gesendet. Kam die
    /// allererste Association erst hier zustande, meldet das Ergebnis
    /// `send_credentials: true` und der Aufrufer stößt den Versand an.
    pub async fn maintain<R, P, D, S>(
        &mut self,
        radio: &mut R,
        portal: &mut P,
        delay: &mut D,
        display: &mut S,
        creds: &WifiCredentials<'_>,
    ) -> LoopOutcome
    where
        R: WifiRadio,
        P: ConfigPortal,
        D: DelayNs,
        S: StatusDisplay,
    {
        if portal.check_trigger() || portal.is_active() {
            delay.delay_ms(PORTAL_POLL_MS).await;
            return LoopOutcome::PortalActive;
        }

        if self.supervisor.is_associated() {
            if radio.is_associated() {
                return LoopOutcome::Idle;
            }
            self.supervisor.link_lost();
        }

        display.show_status("WiFi reconnecting...");
        if self.supervisor.associate(radio, delay, creds).await.is_err() {
            self.wifi_failures += 1;
            display.show_wifi_status(false, None);

            if self.wifi_failures >= MAX_WIFI_FAILURES {
                log_error!(
                    "WiFi: {} failed reconnects, starting config portal",
                    self.wifi_failures
                );
                self.wifi_failures = 0;
                portal.begin();
                display.show_status("Config portal active");
                return LoopOutcome::PortalStarted;
            }

            log_warn!("WiFi: reconnect failed, press config button to enter setup");
            delay.delay_ms(RECONNECT_BACKOFF_MS).await;
            return LoopOutcome::ReconnectFailed;
        }

        self.wifi_failures = 0;
        display.show_wifi_status(true, Some(creds.ssid));

        let send_credentials = !self.credentials_sent;
        self.credentials_sent = true;

        log_info!("WiFi: reconnected");
        display.show_status("WiFi reconnected");
        delay.delay_ms(1000).await;

        LoopOutcome::Reconnected { send_credentials }
    }
}
