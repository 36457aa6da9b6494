// MQTT Task - Published Sensor-Frames an den Broker
use defmt::{error, info, warn};
use embassy_net::Stack;
use embassy_time::{Delay, Duration, Instant, Timer};
use esp_core::{BrokerClient, ConnectError, HubConfig, Publisher, TimeSource};
use static_cell::ConstStaticCell;

use crate::config::{MQTT_RECONNECT_DELAY_SECS, PUBLISH_INTERVAL_MS};
use crate::hal::{MqttBroker, MqttBuffers, StatusLed};
use crate::{CLOCK, HubFrameSlot, HubSupervisor};

static BUFFERS: ConstStaticCell<MqttBuffers> = ConstStaticCell::new(MqttBuffers::new());

/// MQTT Task - läuft parallel zu anderen Tasks
///
/// Dieser Task übernimmt das MQTT-Publishing:
/// - Wartet auf WiFi (Association macht main über den Supervisor)
/// - Verbindet sich mit dem Broker (2 Versuche, danach Fehler-LED und 5 s Pause)
/// - Nimmt alle 50 ms den neuesten Frame aus dem Slot und published ihn
/// - Hält die Session per Keep-Alive am Leben
///
/// # Parameter
/// - `stack`: embassy-net Stack für Netzwerk-Zugriff
/// - `config`: Hub-Konfiguration (Broker, Zugangsdaten, Hub-ID)
/// - `supervisor`: geteilter Verbindungszustand
/// - `slot`: Handoff vom Link Task
/// - `led`: Status-LED für die Fehleranzeige
#[embassy_executor::task]
pub async fn mqtt_task(
    stack: &'static Stack<'static>,
    config: &'static HubConfig,
    supervisor: &'static HubSupervisor,
    slot: &'static HubFrameSlot,
    mut led: StatusLed<'static>,
) {
    info!("MQTT: Task started, waiting for WiFi...");

    let mut broker = MqttBroker::new(stack, config, BUFFERS.take());
    let publisher = Publisher::new(config.hub_id.as_str());
    let mut delay = Delay;

    loop {
        Timer::after(Duration::from_millis(PUBLISH_INTERVAL_MS)).await;

        match supervisor
            .connect_broker(&mut broker, &mut led, &mut delay)
            .await
        {
            Ok(()) => {}
            Err(ConnectError::NotAssociated) => continue,
            Err(e) => {
                error!("MQTT: {}", e);
                info!("MQTT: Reconnecting in {}s...", MQTT_RECONNECT_DELAY_SECS);
                Timer::after(Duration::from_secs(MQTT_RECONNECT_DELAY_SECS)).await;
                continue;
            }
        }

        match publisher
            .publish_once(
                &mut broker,
                slot,
                CLOCK.current_time(),
                Instant::now().as_millis(),
            )
            .await
        {
            Ok(true) => info!("MQTT: frame published"),
            Ok(false) => {}
            Err(e) => {
                warn!("MQTT: {}", e);
                supervisor.broker_lost();
                continue;
            }
        }

        if broker.poll().await.is_err() {
            supervisor.broker_lost();
        }
    }
}
