// Portal Task - HTTP-API zum Lesen und Speichern der Konfiguration
use defmt::{info, warn};
use embassy_net::Stack;
use embassy_time::Duration;
use esp_core::ConfigError;
use picoserve::io::Write;
use picoserve::response::{Content, IntoResponse, Response, StatusCode};
use picoserve::routing::{get, post};

use crate::config::{HTTP_BUFFER_SIZE, PORTAL_PORT, TCP_RX_BUFFER_SIZE, TCP_TX_BUFFER_SIZE};
use crate::{PORTAL_SAVE, PORTAL_SAVE_RESULT, PORTAL_STARTED, PORTAL_VIEW, PortalDocument, RESTART};

/// Ein JSON-Dokument als Response-Body
struct JsonDocument(PortalDocument);

impl Content for JsonDocument {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn content_length(&self) -> usize {
        self.0.len()
    }

    async fn write_content<W: Write>(self, mut writer: W) -> Result<(), W::Error> {
        writer.write_all(&self.0).await
    }
}

/// Portal Task - startet erst, wenn das Portal aktiviert wurde
///
/// Routen:
/// - `GET /config`: aktuelle Konfiguration ohne WiFi-Passwort
/// - `POST /save`: JSON-Dokument speichern, danach Neustart
/// - `POST /restart`: Neustart
///
/// Gespeichert wird in main, das den ConfigStore besitzt.
#[embassy_executor::task]
pub async fn portal_task(stack: &'static Stack<'static>) {
    PORTAL_STARTED.wait().await;
    info!("Portal: HTTP server starting on port {}...", PORTAL_PORT);

    let app = picoserve::Router::new()
        .route("/config", get(serve_config))
        .route("/save", post(save_config))
        .route("/restart", post(request_restart));

    // Server-Konfiguration
    let config = picoserve::Config::new(picoserve::Timeouts {
        start_read_request: Some(Duration::from_secs(5)),
        read_request: Some(Duration::from_secs(1)),
        write: Some(Duration::from_secs(1)),
        persistent_start_read_request: Some(Duration::from_secs(5)),
    })
    .keep_connection_alive();

    // HTTP-Buffer für Requests/Responses
    let mut http_buffer = [0u8; HTTP_BUFFER_SIZE];

    // TCP-Buffers für Socket
    let mut rx_buffer = [0u8; TCP_RX_BUFFER_SIZE];
    let mut tx_buffer = [0u8; TCP_TX_BUFFER_SIZE];

    loop {
        let server = picoserve::Server::new(&app, &config, &mut http_buffer);
        let _ = server
            .listen_and_serve(0, *stack, PORTAL_PORT, &mut rx_buffer, &mut tx_buffer)
            .await;
        warn!("Portal: HTTP server stopped, restarting listener");
    }
}

async fn serve_config() -> impl IntoResponse {
    let view = PORTAL_VIEW.lock(|view| view.borrow().clone());
    Response::new(StatusCode::OK, JsonDocument(view))
}

async fn save_config(body: alloc::vec::Vec<u8>) -> impl IntoResponse {
    let Ok(doc) = PortalDocument::from_slice(&body) else {
        warn!("Portal: document too large ({} bytes)", body.len());
        return Response::new(StatusCode::new(413), "Configuration too large");
    };

    PORTAL_SAVE.send(doc).await;
    match PORTAL_SAVE_RESULT.wait().await {
        Ok(_) => {
            RESTART.signal(());
            Response::new(
                StatusCode::OK,
                "Configuration saved. The system will restart.",
            )
        }
        Err(ConfigError::Malformed) => Response::new(StatusCode::new(400), "Invalid JSON"),
        Err(e) => {
            warn!("Portal: save failed: {}", e);
            Response::new(StatusCode::new(500), "Failed to save configuration")
        }
    }
}

async fn request_restart() -> impl IntoResponse {
    info!("Portal: restart requested");
    RESTART.signal(());
    Response::new(StatusCode::OK, "Restarting...")
}
