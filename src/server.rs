//! WebSocket transport.
//!
//! Each socket is given a random delivery address, registered with the
//! [`ConnectionRegistry`] for the lifetime of the connection. Text frames are
//! decoded as [`PlayerMessage`]s and handed to the [`GameService`].

use crate::message::PlayerMessage;
use crate::notify::ConnectionRegistry;
use crate::service::{GameService, ServiceError};
use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::Request;
use axum::response::IntoResponse;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use rand::Rng;
use rand::distr::Alphanumeric;
use tower::ServiceBuilder;
use tracing::{debug, info, instrument, warn};

/// Length of generated connection addresses.
const ADDRESS_LENGTH: usize = 16;

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    service: GameService,
    registry: ConnectionRegistry,
}

impl AppState {
    /// Creates handler state. `registry` must be the notifier `service`
    /// delivers through.
    pub fn new(service: GameService, registry: ConnectionRegistry) -> Self {
        Self { service, registry }
    }

    /// Handles one text frame from `address`, reporting rejections back to it.
    #[instrument(skip(self, text))]
    pub async fn handle_frame(&self, address: &str, text: &str) {
        let message: PlayerMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Unable to decode player message");
                let error = ServiceError::MalformedMessage(e.to_string());
                self.service.reject(address, None, &error).await;
                return;
            }
        };

        let game_id = message.game_id.clone();
        if let Err(e) = self.service.handle(address, message).await {
            warn!(error = %e, kind = e.kind(), "Request rejected");
            self.service.reject(address, game_id.as_deref(), &e).await;
        }
    }
}

/// Generates a random delivery address.
pub fn new_address() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(ADDRESS_LENGTH)
        .map(char::from)
        .collect()
}

/// Builds the router: `GET /ws` and `GET /health`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(|| async { "ok" }))
        .layer(ServiceBuilder::new().map_request(|req: Request<Body>| {
            info!(method = %req.method(), uri = %req.uri(), "Incoming HTTP request");
            req
        }))
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

#[instrument(skip_all, fields(address = tracing::field::Empty))]
async fn handle_socket(socket: WebSocket, state: AppState) {
    let address = new_address();
    tracing::Span::current().record("address", address.as_str());
    info!("Connection opened");

    let (mut sender, mut receiver) = socket.split();
    let mut outbox = state.registry.register(address.clone()).await;

    let writer = tokio::spawn(async move {
        while let Some(payload) = outbox.recv().await {
            let text = String::from_utf8_lossy(&payload).into_owned();
            if let Err(e) = sender.send(Message::Text(text.into())).await {
                debug!(error = %e, "Socket closed while sending");
                break;
            }
        }
    });

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => state.handle_frame(&address, text.as_str()).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "Socket error");
                break;
            }
        }
    }

    state.registry.unregister(&address).await;
    writer.abort();
    info!("Connection closed");
}

/// Binds `host:port` and serves until the process is stopped.
///
/// # Errors
///
/// Returns an I/O error if the listener cannot be bound or fails.
#[instrument(skip(state))]
pub async fn serve(host: &str, port: u16, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!("Server ready at ws://{}:{}/ws", host, port);
    axum::serve(listener, router(state)).await
}
