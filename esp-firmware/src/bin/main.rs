// Keine Standard-Bibliothek verwenden (Embedded System)
#![no_std]
// Kein normaler main() Einstiegspunkt (wird von esp_rtos bereitgestellt)
#![no_main]
// Verbiete mem::forget - gefährlich bei ESP HAL Types mit DMA-Buffern
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
// Verbiete große Stack-Frames (Stack ist auf Embedded Systemen begrenzt)
#![deny(clippy::large_stack_frames)]

// Heap Allocator (WiFi und picoserve brauchen dynamischen Speicher)
extern crate alloc;

// Embassy Async Runtime
use defmt::{info, warn};
use embassy_executor::Spawner;
use embassy_net::{Config as NetConfig, Stack, StackResources};
use embassy_time::{Delay, Duration, Timer};
use embedded_hal_bus::spi::ExclusiveDevice;
use embedded_sdmmc::SdCard;
use esp_storage::FlashStorage;
use static_cell::StaticCell;

// ESP32-S3 HAL
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::rmt::PulseCode;
use esp_hal::rng::Rng;
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use esp_hal_smartled::smart_led_buffer;

// Backtrace bei Panic und println!() Support
use {esp_backtrace as _, esp_println as _};

// Core-Logik
use esp_core::config_store::CONFIG_DOC_CAPACITY;
use esp_core::coordinator::RECONNECT_BACKOFF_MS;
use esp_core::{
    BootMode, ConfigStore, Coordinator, HubConfig, LoopOutcome, RetryPolicy, StatusDisplay,
    select_mode,
};

// Projekt-Module und Konfiguration
use esp_mqtt_hub::config::{
    EXTRA_HEAP_SIZE, FALLBACK_MQTT_BROKER, FALLBACK_WIFI_PASSWORD, FALLBACK_WIFI_SSID,
    FLASH_CONFIG_OFFSET, RESTART_DELAY_MS, RMT_CLOCK_MHZ, SD_SPI_FREQUENCY_KHZ,
    SUPERVISOR_INTERVAL_MS, WIFI_HEAP_SIZE,
};
use esp_mqtt_hub::hal::{
    ButtonPortal, ConsoleDisplay, ConsoleInput, EspRadio, FlashBackend, LED_BUFFER_SIZE,
    SdCardBackend, StatusLed, UartLink,
};
use esp_mqtt_hub::tasks::{
    clock_task, dhcp_task, display_task, link_task, mqtt_task, net_task, portal_task,
};
use esp_mqtt_hub::{
    FreshFrame, HubFrameSlot, HubSupervisor, PORTAL_SAVE, PORTAL_SAVE_RESULT, PORTAL_VIEW,
    RESTART, ResendRequest,
};

// ESP-IDF App Descriptor - erforderlich für den Bootloader!
// Ohne diesen schlägt das Flashen mit "ESP-IDF App Descriptor missing" fehl
esp_bootloader_esp_idf::esp_app_desc!();

/// Main Entry Point
///
/// Boot-Reihenfolge:
/// 1. Konfiguration laden (SD-Karte, sonst Flash), Betriebsart wählen
/// 2. Portal-Modus: nur WiFi + HTTP-Portal bis zum Neustart
/// 3. Normal: UART testen, WiFi verbinden, Credentials senden, Tasks starten
/// 4. Überwachungs-Schleife: WiFi-Reconnect, Portal-Saves, Neustart
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    // ESP32-S3 Konfiguration: CPU auf maximale Taktfrequenz (240 MHz)
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    // Heap Allocator initialisieren (WiFi braucht dynamischen Speicher!)
    // Zwei Bereiche: reclaimed RAM (64 KB) + extra (36 KB) = 100 KB total
    esp_alloc::heap_allocator!(
        #[esp_hal::ram(reclaimed)]
        size: WIFI_HEAP_SIZE
    );
    esp_alloc::heap_allocator!(size: EXTRA_HEAP_SIZE);

    // Embassy Runtime initialisieren (Xtensa: nur Timer, kein Software Interrupt)
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Hub: booting");
    let mut display = ConsoleDisplay::new();
    let mut portal = ButtonPortal::new(peripherals.GPIO0);

    // ------------------------------------------------------------------------
    // Konfiguration: SD-Karte (SPI2) vor Flash
    // ------------------------------------------------------------------------
    let spi_bus = Spi::new(
        peripherals.SPI2,
        SpiConfig::default().with_frequency(Rate::from_khz(SD_SPI_FREQUENCY_KHZ)),
    )
    .unwrap()
    .with_sck(peripherals.GPIO12)
    .with_mosi(peripherals.GPIO11)
    .with_miso(peripherals.GPIO13);
    let sd_cs = Output::new(peripherals.GPIO10, Level::High, OutputConfig::default());
    let sd_device = ExclusiveDevice::new_no_delay(spi_bus, sd_cs).unwrap();

    let mut sd = SdCardBackend::new(SdCard::new(sd_device, esp_hal::delay::Delay::new()));
    let mut flash = FlashBackend::new(FlashStorage::new(peripherals.FLASH), FLASH_CONFIG_OFFSET);
    let mut store = ConfigStore::new([&mut sd, &mut flash]);

    let mode = select_mode(&mut store, &mut display, &mut portal);
    refresh_portal_view(&store);

    // Tasks brauchen die Konfiguration als 'static
    static HUB_CONFIG: StaticCell<HubConfig> = StaticCell::new();
    let hub_config: &'static HubConfig =
        HUB_CONFIG.init(with_fallback(store.config().clone(), store.is_loaded()));
    let creds = hub_config.wifi_credentials();

    // ------------------------------------------------------------------------
    // WiFi + Netzwerk-Stack
    // ------------------------------------------------------------------------
    static RADIO_INIT: StaticCell<esp_radio::Controller> = StaticCell::new();
    let radio_init =
        RADIO_INIT.init(esp_radio::init().expect("Failed to initialize Wi-Fi/BLE controller"));

    let (wifi_controller, wifi_interface) =
        esp_radio::wifi::new(radio_init, peripherals.WIFI, Default::default())
            .expect("Failed to initialize Wi-Fi");

    // Random seed für TCP/IP Stack (von Hardware RNG)
    let rng = Rng::new();
    let seed = (rng.random() as u64) << 32 | rng.random() as u64;

    // Sockets: MQTT (1) + HTTP-Portal (1) + SNTP (1) + DNS
    static RESOURCES: StaticCell<StackResources<6>> = StaticCell::new();
    let resources = RESOURCES.init(StackResources::new());

    let (stack, runner) = embassy_net::new(
        wifi_interface.sta,
        NetConfig::dhcpv4(Default::default()),
        resources,
        seed,
    );

    // Stack muss 'static sein für Tasks
    static STACK: StaticCell<Stack<'static>> = StaticCell::new();
    let stack = &*STACK.init(stack);

    spawner.spawn(net_task(runner)).unwrap();
    spawner.spawn(dhcp_task(stack)).unwrap();
    spawner.spawn(portal_task(stack)).unwrap();

    static SUPERVISOR: StaticCell<HubSupervisor> = StaticCell::new();
    let supervisor = &*SUPERVISOR.init(HubSupervisor::new(RetryPolicy::default()));

    let mut radio = EspRadio::new(wifi_controller, stack);
    let mut delay = Delay;

    // ------------------------------------------------------------------------
    // Portal-Modus: kein Link, kein MQTT
    // ------------------------------------------------------------------------
    if mode == BootMode::Portal {
        if creds.ssid.is_empty() {
            warn!("Portal: no WiFi credentials, set FALLBACK_WIFI_SSID at build time");
        } else {
            while supervisor
                .associate(&mut radio, &mut delay, &creds)
                .await
                .is_err()
            {
                display.show_wifi_status(false, None);
                Timer::after(Duration::from_millis(u64::from(RECONNECT_BACKOFF_MS))).await;
            }
            display.show_wifi_status(true, Some(creds.ssid));
        }

        loop {
            handle_portal_save(&mut store);
            restart_if_requested().await;
            Timer::after(Duration::from_millis(SUPERVISOR_INTERVAL_MS)).await;
        }
    }

    // ------------------------------------------------------------------------
    // Normaler Betrieb
    // ------------------------------------------------------------------------
    let mut link = UartLink::new(peripherals.UART1, peripherals.GPIO19, peripherals.GPIO20)
        .expect("Failed to initialize link UART");
    let console = ConsoleInput::new(peripherals.UART0, peripherals.GPIO44)
        .expect("Failed to initialize console UART");

    static LED_BUFFER: StaticCell<[PulseCode; LED_BUFFER_SIZE]> = StaticCell::new();
    let led = StatusLed::new(
        peripherals.GPIO48,
        peripherals.RMT,
        RMT_CLOCK_MHZ,
        LED_BUFFER.init(smart_led_buffer!(1)),
    )
    .expect("Failed to initialize status LED");

    let mut coordinator = Coordinator::new(supervisor);
    coordinator
        .probe_link(&mut link, &mut delay, &mut display)
        .await;
    if let Err(e) = coordinator
        .bring_up(&mut radio, &mut link, &mut delay, &mut display, &creds)
        .await
    {
        warn!("WiFi: initial connection failed: {}", e);
    }

    // Handoff Link → MQTT/Display, gehört main und wird an die Tasks verliehen
    static FRAME_SLOT: StaticCell<HubFrameSlot> = StaticCell::new();
    let frame_slot = &*FRAME_SLOT.init(HubFrameSlot::new());
    static FRESH_FRAME: StaticCell<FreshFrame> = StaticCell::new();
    let fresh_frame = &*FRESH_FRAME.init(FreshFrame::new());
    static RESEND_REQUEST: StaticCell<ResendRequest> = StaticCell::new();
    let resend_request = &*RESEND_REQUEST.init(ResendRequest::new());

    // Ab hier gehört der Link dem Link Task
    spawner
        .spawn(link_task(
            link,
            console,
            creds,
            frame_slot,
            fresh_frame,
            resend_request,
        ))
        .unwrap();
    spawner
        .spawn(mqtt_task(stack, hub_config, supervisor, frame_slot, led))
        .unwrap();
    spawner
        .spawn(display_task(frame_slot, fresh_frame, supervisor))
        .unwrap();
    spawner.spawn(clock_task(stack, supervisor)).unwrap();

    display.show_status("System ready");

    // Überwachungs-Schleife
    loop {
        if let LoopOutcome::Reconnected {
            send_credentials: true,
        } = coordinator
            .maintain(&mut radio, &mut portal, &mut delay, &mut display, &creds)
            .await
        {
            resend_request.signal(());
        }

        handle_portal_save(&mut store);
        restart_if_requested().await;
        Timer::after(Duration::from_millis(SUPERVISOR_INTERVAL_MS)).await;
    }
}

/// Ohne gespeicherte Konfiguration: Build-Zeit-Werte aus .env übernehmen
fn with_fallback(mut config: HubConfig, loaded: bool) -> HubConfig {
    if loaded {
        return config;
    }

    if let Some(ssid) = FALLBACK_WIFI_SSID {
        config.wifi_ssid.clear();
        let _ = config.wifi_ssid.push_str(ssid);
    }
    if let Some(password) = FALLBACK_WIFI_PASSWORD {
        config.wifi_password.clear();
        let _ = config.wifi_password.push_str(password);
    }
    if let Some(broker) = FALLBACK_MQTT_BROKER {
        config.mqtt_server.clear();
        let _ = config.mqtt_server.push_str(broker);
    }
    config
}

/// Aktualisiert die Ansicht für GET /config
fn refresh_portal_view<const N: usize>(store: &ConfigStore<'_, N>) {
    let mut buf = [0u8; CONFIG_DOC_CAPACITY];
    match store.portal_view(&mut buf) {
        Ok(n) => PORTAL_VIEW.lock(|view| {
            let mut view = view.borrow_mut();
            view.clear();
            let _ = view.extend_from_slice(&buf[..n]);
        }),
        Err(e) => warn!("Portal: cannot render config: {}", e),
    }
}

/// Bearbeitet ein Dokument von POST /save
fn handle_portal_save<const N: usize>(store: &mut ConfigStore<'_, N>) {
    let Ok(doc) = PORTAL_SAVE.try_receive() else {
        return;
    };

    let result = store.apply_update(&doc);
    match result {
        Ok(written) => {
            info!("Config: saved to {} backend(s)", written);
            refresh_portal_view(store);
        }
        Err(e) => warn!("Config: update rejected: {}", e),
    }
    PORTAL_SAVE_RESULT.signal(result);
}

/// Neustart 1 s nach der Anforderung (Antwort muss noch raus)
async fn restart_if_requested() {
    if !RESTART.signaled() {
        return;
    }
    info!("Hub: restarting in {} ms", RESTART_DELAY_MS);
    Timer::after(Duration::from_millis(RESTART_DELAY_MS)).await;
    esp_hal::system::software_reset();
}
