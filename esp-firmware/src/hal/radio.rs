// WiFi Station-Adapter für den Supervisor
use defmt::{Debug2Format, error, info};
use embassy_net::Stack;
use embassy_time::{Duration, with_timeout};
use esp_core::{RadioError, WifiRadio};
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController};

/// Wie lange `begin_association` maximal auf den Treiber wartet
const CONNECT_START_TIMEOUT_SECS: u64 = 10;

/// WiFi Controller + Netzwerk-Stack
///
/// "Verbunden" heißt: Station assoziiert UND DHCP-Adresse vorhanden.
pub struct EspRadio {
    controller: WifiController<'static>,
    stack: &'static Stack<'static>,
}

impl EspRadio {
    pub fn new(controller: WifiController<'static>, stack: &'static Stack<'static>) -> Self {
        Self { controller, stack }
    }
}

impl WifiRadio for EspRadio {
    async fn begin_association(&mut self, ssid: &str, password: &str) -> Result<(), RadioError> {
        if matches!(self.controller.is_connected(), Ok(true)) {
            let _ = self.controller.disconnect_async().await;
        }

        let client_config = ModeConfig::Client(
            ClientConfig::default()
                .with_ssid(ssid.into())
                .with_password(password.into()),
        );
        self.controller.set_config(&client_config).map_err(|e| {
            error!("WiFi: Failed to set configuration: {}", Debug2Format(&e));
            RadioError::ConfigRejected
        })?;

        if !matches!(self.controller.is_started(), Ok(true)) {
            self.controller.start_async().await.map_err(|e| {
                error!("WiFi: Failed to start: {}", Debug2Format(&e));
                RadioError::StartFailed
            })?;
            info!("WiFi: Started successfully");
        }

        info!("WiFi: Connecting to '{}'...", ssid);
        // Timeout = Verbindung läuft im Treiber weiter, der Supervisor pollt
        match with_timeout(
            Duration::from_secs(CONNECT_START_TIMEOUT_SECS),
            self.controller.connect_async(),
        )
        .await
        {
            Ok(Err(e)) => {
                error!("WiFi: Connection failed: {}", Debug2Format(&e));
                Err(RadioError::ConnectFailed)
            }
            Ok(Ok(())) | Err(_) => Ok(()),
        }
    }

    fn is_associated(&mut self) -> bool {
        matches!(self.controller.is_connected(), Ok(true)) && self.stack.config_v4().is_some()
    }
}
