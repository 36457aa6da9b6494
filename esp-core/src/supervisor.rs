//! Verbindungs-Supervisor für WiFi und MQTT Broker
//!
//! Der Supervisor hält den Verbindungszustand, die Hardware wird bei jedem
//! Aufruf übergeben. Der Zustand liegt hinter einem `blocking_mutex` und
//! kann deshalb von mehreren Tasks gelesen werden (Koordinator für WiFi,
//! MQTT-Task für den Broker).
//!
//! ```text
//! Disconnected → Associating → Associated → BrokerConnecting → BrokerConnected
//!                     ↓                            ↓
//!                   Failed ←───────────────────────┘
//! ```

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::delay::DelayNs;

use crate::logging::{log_error, log_info, log_warn};
use crate::traits::{BrokerClient, FaultIndicator, WifiRadio};
use crate::types::WifiCredentials;

/// Zustand der Konnektivität
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    Disconnected,
    Associating,
    Associated,
    BrokerConnecting,
    BrokerConnected,
    Failed,
}

/// Fehler beim Verbindungsaufbau
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectError {
    /// Radio hat die Association abgelehnt
    RadioRejected,
    /// Keine Association innerhalb der Poll-Zeit
    AssociationTimeout,
    /// Broker-Verbindung ohne WiFi versucht
    NotAssociated,
    /// Alle Broker-Versuche fehlgeschlagen
    BrokerExhausted,
}

/// Retry-Parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Anzahl Polls während der Association
    pub association_polls: u32,
    /// Abstand zwischen zwei Polls
    pub association_poll_ms: u32,
    /// Broker-Versuche pro `connect_broker` Aufruf
    pub broker_attempts: u32,
    /// Wartezeit zwischen zwei Broker-Versuchen
    pub broker_backoff_ms: u32,
    /// Dauer der Fehleranzeige nach erschöpften Broker-Versuchen
    pub fault_hold_ms: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            association_polls: 30,
            association_poll_ms: 1000,
            broker_attempts: 2,
            broker_backoff_ms: 2000,
            fault_hold_ms: 2000,
        }
    }
}

#[derive(Clone, Copy)]
struct Link {
    state: ConnectionState,
    associated: bool,
}

/// Überwacht WiFi-Association und Broker-Session
pub struct ConnectionSupervisor<M: RawMutex> {
    link: Mutex<M, Cell<Link>>,
    policy: RetryPolicy,
}

impl<M: RawMutex> ConnectionSupervisor<M> {
    pub const fn new(policy: RetryPolicy) -> Self {
        Self {
            link: Mutex::new(Cell::new(Link {
                state: ConnectionState::Disconnected,
                associated: false,
            })),
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.link.lock(|l| l.get().state)
    }

    /// WiFi zuletzt erfolgreich assoziiert (unabhängig vom Broker)
    pub fn is_associated(&self) -> bool {
        self.link.lock(|l| l.get().associated)
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn update(&self, f: impl FnOnce(&mut Link)) {
        self.link.lock(|cell| {
            let mut link = cell.get();
            f(&mut link);
            cell.set(link);
        });
    }

    fn set_state(&self, state: ConnectionState) {
        self.update(|l| l.state = state);
    }

    /// Stellt die WiFi-Association her
    ///
    /// Kehrt sofort zurück wenn bereits assoziiert. Sonst wird die Association
    /// gestartet und bis zu `association_polls` mal im Abstand von
    /// `association_poll_ms` geprüft.
    pub async fn associate<R: WifiRadio, D: DelayNs>(
        &self,
        radio: &mut R,
        delay: &mut D,
        creds: &WifiCredentials<'_>,
    ) -> Result<(), ConnectError> {
        if self.is_associated() && radio.is_associated() {
            return Ok(());
        }

        log_info!("WiFi: connecting to '{}'", creds.ssid);
        self.update(|l| {
            l.state = ConnectionState::Associating;
            l.associated = false;
        });

        if let Err(e) = radio.begin_association(creds.ssid, creds.password).await {
            log_error!("WiFi: radio rejected association: {}", e);
            self.set_state(ConnectionState::Failed);
            return Err(ConnectError::RadioRejected);
        }

        for _ in 0..self.policy.association_polls {
            if radio.is_associated() {
                break;
            }
            delay.delay_ms(self.policy.association_poll_ms).await;
        }

        if radio.is_associated() {
            log_info!("WiFi: associated");
            self.update(|l| {
                l.state = ConnectionState::Associated;
                l.associated = true;
            });
            Ok(())
        } else {
            log_warn!("WiFi: association timed out");
            self.set_state(ConnectionState::Failed);
            Err(ConnectError::AssociationTimeout)
        }
    }

    /// Stellt die Broker-Session her
    ///
    /// Höchstens `broker_attempts` Versuche mit `broker_backoff_ms` Pause
    /// dazwischen. Sind alle Versuche erschöpft, wird die Fehleranzeige für
    /// `fault_hold_ms` aktiviert und `BrokerExhausted` gemeldet.
    pub async fn connect_broker<B: BrokerClient, F: FaultIndicator, D: DelayNs>(
        &self,
        broker: &mut B,
        fault: &mut F,
        delay: &mut D,
    ) -> Result<(), ConnectError> {
        if self.state() == ConnectionState::BrokerConnected && broker.is_connected() {
            return Ok(());
        }
        if !self.is_associated() {
            return Err(ConnectError::NotAssociated);
        }

        self.set_state(ConnectionState::BrokerConnecting);

        for attempt in 1..=self.policy.broker_attempts {
            log_info!(
                "MQTT: connecting (attempt {}/{})",
                attempt,
                self.policy.broker_attempts
            );
            match broker.connect().await {
                Ok(()) => {
                    log_info!("MQTT: connected");
                    self.set_state(ConnectionState::BrokerConnected);
                    return Ok(());
                }
                Err(e) => log_warn!("MQTT: connect failed: {}", e),
            }

            if attempt < self.policy.broker_attempts {
                delay.delay_ms(self.policy.broker_backoff_ms).await;
            }
        }

        log_error!("MQTT: giving up after {} attempts", self.policy.broker_attempts);
        self.set_state(ConnectionState::Failed);
        fault.set_fault(true);
        delay.delay_ms(self.policy.fault_hold_ms).await;
        fault.set_fault(false);

        Err(ConnectError::BrokerExhausted)
    }

    /// WiFi-Verbindung verloren
    pub fn link_lost(&self) {
        log_warn!("WiFi: link lost");
        self.update(|l| {
            l.state = ConnectionState::Disconnected;
            l.associated = false;
        });
    }

    /// Broker-Session verloren, WiFi besteht weiter
    pub fn broker_lost(&self) {
        self.update(|l| {
            if l.state == ConnectionState::BrokerConnected
                || l.state == ConnectionState::BrokerConnecting
            {
                l.state = if l.associated {
                    ConnectionState::Associated
                } else {
                    ConnectionState::Disconnected
                };
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    #[test]
    fn test_initial_state() {
        let sup = ConnectionSupervisor::<NoopRawMutex>::new(RetryPolicy::default());
        assert_eq!(sup.state(), ConnectionState::Disconnected);
        assert!(!sup.is_associated());
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.association_polls, 30);
        assert_eq!(policy.association_poll_ms, 1000);
        assert_eq!(policy.broker_attempts, 2);
        assert_eq!(policy.broker_backoff_ms, 2000);
        assert_eq!(policy.fault_hold_ms, 2000);
    }

    #[test]
    fn test_link_lost_clears_association() {
        let sup = ConnectionSupervisor::<NoopRawMutex>::new(RetryPolicy::default());
        sup.update(|l| {
            l.state = ConnectionState::BrokerConnected;
            l.associated = true;
        });

        sup.broker_lost();
        assert_eq!(sup.state(), ConnectionState::Associated);
        assert!(sup.is_associated());

        sup.link_lost();
        assert_eq!(sup.state(), ConnectionState::Disconnected);
        assert!(!sup.is_associated());
    }
}
