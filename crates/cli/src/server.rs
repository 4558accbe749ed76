//! Controller websocket at `/controller`.
//!
//! Every text frame is a controller envelope. Requests are answered
//! concurrently; host events are pushed to every connected controller.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use roundtable_protocol::Envelope;
use roundtable_runtime::{ChannelOrigin, Dispatcher};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

pub fn app(dispatcher: Dispatcher) -> Router {
	Router::new()
		.route("/", get(|| async { "OK" }))
		.route(
			"/controller",
			get(
				|ws: WebSocketUpgrade, State(dispatcher): State<Dispatcher>| async move {
					ws.on_upgrade(|socket| handle_controller_socket(socket, dispatcher))
				},
			),
		)
		.with_state(dispatcher)
}

pub async fn bind(host: &str, port: u16) -> Result<TcpListener> {
	let addr: SocketAddr = format!("{host}:{port}")
		.parse()
		.with_context(|| format!("Invalid host/port combination: {host}:{port}"))?;
	TcpListener::bind(addr)
		.await
		.with_context(|| format!("Failed to bind controller server to {addr}"))
}

pub async fn serve(listener: TcpListener, dispatcher: Dispatcher) -> Result<()> {
	if let Ok(addr) = listener.local_addr() {
		info!(target = "rt.server", %addr, "serving controllers");
	}
	axum::serve(listener, app(dispatcher).into_make_service())
		.await
		.context("Controller server error")
}

async fn handle_controller_socket(socket: WebSocket, dispatcher: Dispatcher) {
	info!(target = "rt.server", "controller connected");

	let (tx, rx) = mpsc::unbounded_channel::<Message>();
	let mut rx_stream = UnboundedReceiverStream::new(rx);
	let (mut ws_tx, mut ws_rx) = socket.split();

	let send_task = tokio::spawn(async move {
		while let Some(msg) = rx_stream.next().await {
			if ws_tx.send(msg).await.is_err() {
				break;
			}
		}
	});

	let mut events = dispatcher.router().subscribe();
	let event_tx = tx.clone();
	let event_task = tokio::spawn(async move {
		loop {
			match events.recv().await {
				Ok(event) => {
					let frame = Envelope::Event(event.to_event()).to_json();
					if event_tx.send(Message::Text(frame.into())).is_err() {
						break;
					}
				}
				Err(broadcast::error::RecvError::Lagged(skipped)) => {
					warn!(target = "rt.server", skipped, "controller fell behind on events");
				}
				Err(broadcast::error::RecvError::Closed) => break,
			}
		}
	});

	while let Some(msg) = ws_rx.next().await {
		match msg {
			Ok(Message::Text(text)) => {
				let dispatcher = dispatcher.clone();
				let tx = tx.clone();
				tokio::spawn(async move {
					if let Some(response) = dispatcher.dispatch_text(&text, ChannelOrigin::External).await {
						let _ = tx.send(Message::Text(Envelope::Response(response).to_json().into()));
					}
				});
			}
			Ok(Message::Close(_)) => break,
			Ok(_) => {}
			Err(err) => {
				warn!(target = "rt.server", error = %err, "controller websocket error");
				break;
			}
		}
	}

	event_task.abort();
	send_task.abort();
	debug!(target = "rt.server", "controller disconnected");
}
