//! [`Page`] over a DevTools connection.

use std::sync::Arc;

use async_trait::async_trait;
use roundtable::{DomEvent, Element, ElementContent, ElementHandle, Error, Page, Result};
use roundtable_protocol::DomNode;
use serde::Deserialize;
use serde_json::{Value, json};

use super::connection::{CdpConnection, CdpError};
use super::script;

/// Element description returned by the page scripts.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ElementInfo {
	handle: u64,
	tag: String,
	editable: bool,
	visible: bool,
	disabled: bool,
	has_icon: bool,
	bottom: f64,
	viewport_height: f64,
}

impl From<ElementInfo> for Element {
	fn from(info: ElementInfo) -> Self {
		Element {
			editable: info.editable,
			visible: info.visible,
			disabled: info.disabled,
			has_icon: info.has_icon,
			bottom: info.bottom,
			viewport_height: info.viewport_height,
			..Element::new(ElementHandle(info.handle), info.tag)
		}
	}
}

fn page_error(err: CdpError) -> Error {
	match err {
		CdpError::Closed => Error::PageClosed,
		other => Error::Page(other.to_string()),
	}
}

pub struct CdpPage {
	conn: Arc<CdpConnection>,
}

impl CdpPage {
	pub fn new(conn: Arc<CdpConnection>) -> Self {
		Self { conn }
	}

	async fn run(&self, function: &str, args: &[Value]) -> Result<Value> {
		self.conn.evaluate(&script::call(function, args)).await.map_err(page_error)
	}

	async fn elements(&self, selector: &str, all: bool) -> Result<Vec<Element>> {
		let value = self.run(script::QUERY, &[json!(selector), json!(all)]).await?;
		let infos: Vec<ElementInfo> = serde_json::from_value(value)?;
		Ok(infos.into_iter().map(Element::from).collect())
	}
}

#[async_trait]
impl Page for CdpPage {
	async fn query(&self, selector: &str) -> Result<Option<Element>> {
		Ok(self.elements(selector, false).await?.into_iter().next())
	}

	async fn query_all(&self, selector: &str) -> Result<Vec<Element>> {
		self.elements(selector, true).await
	}

	async fn closest(&self, element: &Element, selector: &str) -> Result<Option<Element>> {
		let value = self
			.run(script::CLOSEST, &[json!(element.handle.0), json!(selector)])
			.await?;
		let info: Option<ElementInfo> = serde_json::from_value(value)?;
		Ok(info.map(Element::from))
	}

	async fn write(&self, element: &Element, content: ElementContent) -> Result<()> {
		let (kind, text) = match content {
			ElementContent::Value(text) => ("value", text),
			ElementContent::Text(text) => ("text", text),
			ElementContent::Html(html) => ("html", html),
		};
		self.run(script::WRITE, &[json!(element.handle.0), json!(kind), json!(text)])
			.await?;
		Ok(())
	}

	async fn dispatch(&self, element: &Element, event: &DomEvent) -> Result<()> {
		let key = match event {
			DomEvent::KeyDown(key) => Value::from(key.as_str()),
			_ => Value::Null,
		};
		self.run(script::DISPATCH, &[json!(element.handle.0), json!(event.name()), key])
			.await?;
		Ok(())
	}

	async fn snapshot(&self, element: &Element, exclude: &[String]) -> Result<DomNode> {
		let value = self
			.run(script::SNAPSHOT, &[json!(element.handle.0), json!(exclude)])
			.await?;
		Ok(serde_json::from_value(value)?)
	}

	async fn navigate(&self, url: &str) -> Result<()> {
		self.conn
			.call("Page.navigate", json!({ "url": url }))
			.await
			.map_err(page_error)?;
		Ok(())
	}
}
