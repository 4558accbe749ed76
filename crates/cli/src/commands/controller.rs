//! Controller-side commands over the host websocket.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use futures::{SinkExt, StreamExt};
use roundtable_protocol::{Envelope, SiteId};
use roundtable_runtime::{ControllerClient, JsonFileStore, KeyValueStore, KeyValueStoreExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

const TOKEN_KEY: &str = "token";

/// A controller connected to a host, with its token kept in `store`.
pub struct Session {
	client: Arc<ControllerClient>,
	store: JsonFileStore,
	tasks: [JoinHandle<()>; 2],
}

impl Session {
	pub async fn connect(url: &str, store: JsonFileStore) -> Result<Self> {
		let (socket, _) = connect_async(url)
			.await
			.with_context(|| format!("Cannot reach the host at {url}; is `roundtable serve` running?"))?;
		let (mut ws_tx, mut ws_rx) = socket.split();

		let token: Option<String> = store.load(TOKEN_KEY)?;
		let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
		let client = Arc::new(ControllerClient::new(tx).with_token(token));

		let writer = tokio::spawn(async move {
			while let Some(envelope) = rx.recv().await {
				if ws_tx.send(Message::Text(envelope.to_json().into())).await.is_err() {
					break;
				}
			}
		});

		let reader_client = client.clone();
		let reader = tokio::spawn(async move {
			while let Some(msg) = ws_rx.next().await {
				match msg {
					Ok(Message::Text(text)) => reader_client.handle_text(&text),
					Ok(Message::Close(_)) | Err(_) => break,
					Ok(_) => {}
				}
			}
			let failed = reader_client.disconnected();
			debug!(target = "rt.client", failed, "host connection closed");
		});

		Ok(Self {
			client,
			store,
			tasks: [writer, reader],
		})
	}

	/// Writes the client's current token back, dropping a token the host rejected.
	fn persist_token(&self) -> Result<()> {
		match self.client.token() {
			Some(token) => self.store.save(TOKEN_KEY, &token)?,
			None => self.store.remove(TOKEN_KEY)?,
		}
		Ok(())
	}

	fn require_token(&self) -> Result<()> {
		if self.client.token().is_none() {
			bail!("Not paired with the host; run `roundtable pair` first");
		}
		Ok(())
	}

	pub async fn pair(&self, code: Option<&str>) -> Result<()> {
		match code {
			None => {
				self.client.request_pair_code().await?;
				println!("A pairing code is shown by the host. Run `roundtable pair <CODE>` to confirm it.");
			}
			Some(code) => {
				self.client.confirm_pairing(code).await?;
				self.persist_token()?;
				println!("Paired.");
			}
		}
		Ok(())
	}

	pub async fn send(&self, site: SiteId, text: &str) -> Result<()> {
		self.require_token()?;
		let result = self.client.send_message(site, text).await;
		self.finish(result)
	}

	pub async fn status(&self) -> Result<()> {
		self.require_token()?;
		let result = self.client.get_status().await;
		self.finish(result)
	}

	pub async fn response(&self, site: SiteId) -> Result<()> {
		self.require_token()?;
		match self.client.get_response(site).await {
			Ok(Some(content)) => {
				println!("{content}");
				Ok(())
			}
			Ok(None) => bail!("No response recorded for {site}"),
			Err(err) => {
				self.persist_token()?;
				Err(err.into())
			}
		}
	}

	pub async fn new_conversation(&self, sites: Vec<SiteId>) -> Result<()> {
		self.require_token()?;
		let result = self.client.new_conversation(sites).await;
		self.finish(result)
	}

	fn finish<T: Serialize>(&self, result: roundtable_runtime::Result<T>) -> Result<()> {
		// A rejected token has been cleared by the client.
		self.persist_token()?;
		print_json(&result?)
	}
}

impl Drop for Session {
	fn drop(&mut self) {
		self.tasks.iter().for_each(JoinHandle::abort);
	}
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}
