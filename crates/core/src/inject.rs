//! Message injection.
//!
//! Fills a site's input the way its editor expects, lets the page's reactive
//! framework catch up, then submits through the send control or the Enter key.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::page::{DomEvent, Element, ElementContent, Lookup, Page};
use crate::site::{FillMode, SubmitMode, TargetSite};

/// Upper bound for one complete fill-and-submit.
pub const SUBMISSION_TIMEOUT: Duration = Duration::from_secs(15);

/// How long a disabled send control is given to become enabled.
pub const ENABLE_WAIT: Duration = Duration::from_secs(2);

const ENABLE_POLL: Duration = Duration::from_millis(50);

/// Path that was used to submit the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
	/// A configured send lookup matched.
	Clicked,
	/// The generic icon-button scan found the control.
	ClickedHeuristic,
	/// The site submits with Enter.
	EnterKey,
	/// No send control was found; Enter was pressed instead.
	EnterFallback,
}

impl Submission {
	pub fn used_fallback(self) -> bool {
		matches!(self, Submission::ClickedHeuristic | Submission::EnterFallback)
	}
}

/// Writes `text` into the site's input and submits it.
///
/// Fails with [`Error::InputNotFound`], [`Error::SendControlNotFound`] or,
/// when the page stops responding, [`Error::SubmissionTimeout`].
pub async fn inject(page: &dyn Page, site: &TargetSite, text: &str) -> Result<Submission> {
	match tokio::time::timeout(SUBMISSION_TIMEOUT, inject_inner(page, site, text)).await {
		Ok(result) => result,
		Err(_) => Err(Error::SubmissionTimeout {
			site: site.id,
			timeout_ms: SUBMISSION_TIMEOUT.as_millis() as u64,
		}),
	}
}

async fn inject_inner(page: &dyn Page, site: &TargetSite, text: &str) -> Result<Submission> {
	let input = first_match(page, &site.input_lookups())
		.await?
		.ok_or(Error::InputNotFound { site: site.id })?;
	debug!(target = "rt.inject", site = %site.id, tag = %input.tag, "input resolved");

	fill(page, site, &input, text).await?;
	tokio::time::sleep(site.timing.settle()).await;

	let submission = match site.submit {
		SubmitMode::EnterKey => {
			press_enter(page, &input).await?;
			Submission::EnterKey
		}
		SubmitMode::Click | SubmitMode::ClickOrEnter => match find_send_control(page, site).await? {
			Some((control, submission)) => {
				let control = wait_enabled(page, site, control).await?;
				trigger(page, site, &control).await?;
				submission
			}
			None if site.submit == SubmitMode::ClickOrEnter => {
				press_enter(page, &input).await?;
				Submission::EnterFallback
			}
			None => return Err(Error::SendControlNotFound { site: site.id }),
		},
	};

	if submission.used_fallback() {
		warn!(target = "rt.inject", site = %site.id, ?submission, "message submitted through fallback path");
	} else {
		debug!(target = "rt.inject", site = %site.id, ?submission, "message submitted");
	}
	Ok(submission)
}

/// First lookup that resolves, in priority order.
pub async fn first_match(page: &dyn Page, lookups: &[Lookup]) -> Result<Option<Element>> {
	for lookup in lookups {
		if let Some(element) = lookup.resolve(page).await? {
			return Ok(Some(element));
		}
	}
	Ok(None)
}

async fn fill(page: &dyn Page, site: &TargetSite, input: &Element, text: &str) -> Result<()> {
	page.dispatch(input, &DomEvent::Focus).await?;
	if input.is_text_field() {
		page.write(input, ElementContent::Value(text.to_string())).await?;
		page.dispatch(input, &DomEvent::Input).await?;
		page.dispatch(input, &DomEvent::Change).await?;
		return Ok(());
	}
	let content = match site.fill {
		FillMode::Paragraph => ElementContent::paragraph(text),
		FillMode::Auto => ElementContent::Text(text.to_string()),
	};
	page.write(input, content).await?;
	page.dispatch(input, &DomEvent::Input).await
}

/// Resolves the send control through the site lookups, then through the
/// generic scan for a visible icon button near the bottom of the viewport.
pub async fn find_send_control(page: &dyn Page, site: &TargetSite) -> Result<Option<(Element, Submission)>> {
	for lookup in site.send_lookups() {
		if let Some(element) = lookup.resolve(page).await? {
			if element.visible {
				return Ok(Some((element, Submission::Clicked)));
			}
		}
	}
	for selector in &site.send_scan {
		let candidates = page.query_all(selector).await?;
		let found = candidates.into_iter().find(|el| {
			el.has_icon && el.visible && site.scan_bottom_margin.is_none_or(|margin| el.near_bottom(margin))
		});
		if let Some(element) = found {
			return Ok(Some((element, Submission::ClickedHeuristic)));
		}
	}
	Ok(None)
}

/// Re-resolves the control until it reports enabled or [`ENABLE_WAIT`] passes.
/// Returns the freshest handle either way; a still-disabled control is clicked anyway.
async fn wait_enabled(page: &dyn Page, site: &TargetSite, control: Element) -> Result<Element> {
	if !control.disabled {
		return Ok(control);
	}
	let deadline = Instant::now() + ENABLE_WAIT;
	let mut current = control;
	while Instant::now() < deadline {
		tokio::time::sleep(ENABLE_POLL).await;
		if let Some((fresh, _)) = find_send_control(page, site).await? {
			current = fresh;
			if !current.disabled {
				return Ok(current);
			}
		}
	}
	debug!(target = "rt.inject", site = %site.id, "send control still disabled, clicking anyway");
	Ok(current)
}

async fn trigger(page: &dyn Page, site: &TargetSite, control: &Element) -> Result<()> {
	let gap = site.timing.trigger_gap();
	for (idx, event) in site.trigger_events.iter().enumerate() {
		if idx > 0 && !gap.is_zero() {
			tokio::time::sleep(gap).await;
		}
		page.dispatch(control, event).await?;
	}
	Ok(())
}

async fn press_enter(page: &dyn Page, input: &Element) -> Result<()> {
	page.dispatch(input, &DomEvent::Focus).await?;
	page.dispatch(input, &DomEvent::enter()).await
}
