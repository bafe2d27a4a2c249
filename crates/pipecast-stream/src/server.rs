use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pipecast_frame::{FrameCodec, Palette, STREAM_CONTENT_TYPE};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::error::{Result, StreamError};
use crate::feed::{Feed, FeedMonitor, FeedState, FeedStats};
use crate::input::{InputRelay, InputStats};
use crate::mux::{client_stream, ClientRegistry};
use crate::slot::FrameSlot;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub slot: FrameSlot,
    pub relay: Arc<InputRelay>,
    pub feed: FeedMonitor,
    pub clients: Arc<ClientRegistry>,
    pub shutdown: CancellationToken,
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    feed: FeedState,
    stats: FeedStats,
    last_seq: Option<u64>,
    clients: usize,
    input: InputStats,
}

/// Build the HTTP routes.
///
/// | Route | Method | Purpose |
/// |-------|--------|---------|
/// | `stream_path` | GET | multipart JPEG stream |
/// | `input_path` | GET | input WebSocket |
/// | `/input` | POST | one JSON input message |
/// | `/health` | GET | feed state and counters |
///
/// Anything else falls through to `static_dir` when one is configured.
pub fn router(state: AppState, config: &RelayConfig) -> Router {
    let mut app = Router::new()
        .route(&config.stream_path, get(stream_frames))
        .route(&config.input_path, get(input_socket))
        .route("/input", post(post_input))
        .route("/health", get(health));

    if let Some(dir) = &config.static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.with_state(state)
}

async fn stream_frames(State(state): State<AppState>) -> Response {
    let guard = state.clients.register();
    let stream = client_stream(state.slot.subscribe(), guard, state.shutdown.clone());

    (
        [
            (header::CONTENT_TYPE, STREAM_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

async fn input_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_input_socket(socket, state))
}

async fn handle_input_socket(mut socket: WebSocket, state: AppState) {
    debug!("input socket opened");
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            message = socket.recv() => match message {
                Some(Ok(Message::Text(text))) => {
                    state.relay.submit_json(text.as_str().as_bytes());
                }
                Some(Ok(Message::Binary(data))) => {
                    state.relay.submit_json(&data);
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(error = %err, "input socket error");
                    break;
                }
            }
        }
    }
    debug!("input socket closed");
}

async fn post_input(State(state): State<AppState>, body: Bytes) -> StatusCode {
    state.relay.submit_json(&body);
    StatusCode::NO_CONTENT
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        feed: state.feed.state(),
        stats: state.feed.stats(),
        last_seq: state.slot.latest().map(|frame| frame.seq),
        clients: state.clients.active(),
        input: state.relay.stats(),
    })
}

/// A running relay: feed thread plus HTTP state, ready to serve.
pub struct Relay {
    config: RelayConfig,
    state: AppState,
    feed: Feed,
}

impl Relay {
    /// Validate `config`, create both pipes and start the feed.
    ///
    /// Cancelling `shutdown` stops the server and the feed.
    pub fn start(
        config: RelayConfig,
        palette: Arc<Palette>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        config.validate()?;

        let codec = FrameCodec::new(palette, config.codec)?;
        let slot = FrameSlot::new();
        let relay = Arc::new(InputRelay::new(config.input.clone())?);
        let feed = Feed::spawn(
            config.feed.clone(),
            codec,
            slot.clone(),
            shutdown.child_token(),
        )?;

        let state = AppState {
            slot,
            relay,
            feed: feed.monitor(),
            clients: Arc::new(ClientRegistry::new()),
            shutdown,
        };

        Ok(Self {
            config,
            state,
            feed,
        })
    }

    pub fn router(&self) -> Router {
        router(self.state.clone(), &self.config)
    }

    pub fn slot(&self) -> &FrameSlot {
        &self.state.slot
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn serve(self) -> Result<()> {
        let addr = self.config.bind;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| StreamError::Bind { addr, source })?;
        self.serve_on(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    pub async fn serve_on(self, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!(
                %addr,
                stream = %self.config.stream_path,
                input = %self.config.input_path,
                "relay listening"
            );
        }

        let app = self.router();
        let shutdown = self.state.shutdown.clone();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;

        self.state.shutdown.cancel();
        let grace = self.config.shutdown_grace;
        let feed = self.feed;
        match tokio::task::spawn_blocking(move || feed.shutdown(grace)).await {
            Ok(true) => debug!("feed stopped"),
            Ok(false) => warn!("feed did not stop within {grace:?}"),
            Err(err) => warn!(error = %err, "feed shutdown task failed"),
        }

        served.map_err(StreamError::Serve)?;
        info!("relay stopped");
        Ok(())
    }
}
