//! Trusted controller channel over a line-delimited JSON stream.
//!
//! Used by a local parent process that owns the host; requests are not
//! subject to pairing.

use roundtable_protocol::Envelope;
use roundtable_runtime::{ChannelOrigin, Dispatcher};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

/// Serves requests read from `reader` until it ends, writing responses and
/// host events to `writer`, one envelope per line.
pub async fn serve<R, W>(dispatcher: Dispatcher, reader: R, mut writer: W) -> std::io::Result<()>
where
	R: AsyncRead + Unpin,
	W: AsyncWrite + Unpin + Send + 'static,
{
	let (tx, mut rx) = mpsc::unbounded_channel::<String>();

	let write_task = tokio::spawn(async move {
		while let Some(line) = rx.recv().await {
			if writer.write_all(line.as_bytes()).await.is_err() || writer.write_all(b"\n").await.is_err() {
				break;
			}
			if writer.flush().await.is_err() {
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
					if event_tx.send(Envelope::Event(event.to_event()).to_json()).is_err() {
						break;
					}
				}
				Err(broadcast::error::RecvError::Lagged(skipped)) => {
					warn!(target = "rt.stdio", skipped, "stdio controller fell behind on events");
				}
				Err(broadcast::error::RecvError::Closed) => break,
			}
		}
	});

	let mut lines = BufReader::new(reader).lines();
	let result = loop {
		let line = match lines.next_line().await {
			Ok(Some(line)) => line,
			Ok(None) => break Ok(()),
			Err(err) => break Err(err),
		};
		if line.trim().is_empty() {
			continue;
		}
		let dispatcher = dispatcher.clone();
		let tx = tx.clone();
		tokio::spawn(async move {
			if let Some(response) = dispatcher.dispatch_text(&line, ChannelOrigin::Internal).await {
				let _ = tx.send(Envelope::Response(response).to_json());
			}
		});
	};

	event_task.abort();
	drop(tx);
	// Requests still in flight hold senders; the writer ends with the last one.
	let _ = write_task.await;
	debug!(target = "rt.stdio", "stdio channel closed");
	result
}
