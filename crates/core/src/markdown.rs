//! Markdown rendering of captured response subtrees.
//!
//! Sites render answers as rich HTML. Controllers want text they can quote
//! back into another site's input, so every capture is reduced to Markdown:
//! headings, emphasis, inline and fenced code, lists with nesting, links,
//! blockquotes and tables. Page chrome (buttons, icons, screen-reader text)
//! is dropped.

use std::sync::LazyLock;

use regex_lite::Regex;
use roundtable_protocol::DomNode;

static EXCESS_NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{2,}").unwrap());
static LANGUAGE_CLASS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"language-(\w+)").unwrap());

const SKIPPED_TAGS: &[&str] = &["button", "script", "style", "svg", "noscript", "template"];
const SKIPPED_CLASSES: &[&str] = &["copy-btn", "sr-only"];

/// Renders `node` and its descendants as Markdown.
///
/// The root element itself is treated as a transparent container.
pub fn to_markdown(node: &DomNode) -> String {
	let mut out = String::new();
	match node {
		DomNode::Element { .. } if is_skipped(node) => {}
		DomNode::Element { .. } => render_children(node, 0, &mut out),
		DomNode::Text { .. } => render(node, 0, &mut out),
	}
	EXCESS_NEWLINES.replace_all(&out, "\n\n").trim().to_string()
}

fn is_skipped(node: &DomNode) -> bool {
	match node.tag() {
		Some(tag) => SKIPPED_TAGS.contains(&tag) || SKIPPED_CLASSES.iter().any(|c| node.has_class(c)),
		None => false,
	}
}

fn render_children(node: &DomNode, depth: usize, out: &mut String) {
	for child in node.children() {
		render(child, depth, out);
	}
}

fn inline(node: &DomNode, depth: usize) -> String {
	let mut buf = String::new();
	render_children(node, depth, &mut buf);
	buf
}

fn render(node: &DomNode, depth: usize, out: &mut String) {
	let tag = match node {
		DomNode::Text { text } => {
			out.push_str(text);
			return;
		}
		_ if is_skipped(node) => return,
		DomNode::Element { tag, .. } => tag.as_str(),
	};

	match tag {
		"h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
			let level = usize::from(tag.as_bytes()[1] - b'0');
			let title = inline(node, 0);
			let title = title.trim();
			if !title.is_empty() {
				out.push_str(&"#".repeat(level));
				out.push(' ');
				out.push_str(title);
				out.push_str("\n\n");
			}
		}
		"strong" | "b" => wrap(out, "**", &inline(node, depth)),
		"em" | "i" => wrap(out, "*", &inline(node, depth)),
		"code" => {
			out.push('`');
			out.push_str(&node.text_content());
			out.push('`');
		}
		"pre" => render_code_block(node, out),
		"p" => {
			render_children(node, depth, out);
			out.push_str("\n\n");
		}
		"br" => out.push('\n'),
		"hr" => out.push_str("\n---\n\n"),
		"ul" | "ol" => {
			render_list(node, tag == "ol", depth, out);
			out.push('\n');
		}
		"a" => {
			let text = inline(node, depth);
			match node.attr("href").filter(|h| !h.is_empty()) {
				Some(href) => {
					out.push('[');
					out.push_str(&text);
					out.push_str("](");
					out.push_str(href);
					out.push(')');
				}
				None => out.push_str(&text),
			}
		}
		"blockquote" => {
			let body = inline(node, depth);
			let body = EXCESS_NEWLINES.replace_all(body.trim(), "\n\n");
			for line in body.lines() {
				out.push_str("> ");
				out.push_str(line);
				out.push('\n');
			}
			out.push('\n');
		}
		"table" => {
			render_table(node, out);
			out.push('\n');
		}
		_ => render_children(node, depth, out),
	}
}

fn wrap(out: &mut String, marker: &str, inner: &str) {
	if inner.trim().is_empty() {
		out.push_str(inner);
		return;
	}
	out.push_str(marker);
	out.push_str(inner);
	out.push_str(marker);
}

fn render_code_block(pre: &DomNode, out: &mut String) {
	let code = pre.find_descendant("code");
	let text = code.map_or_else(|| pre.text_content(), DomNode::text_content);
	let lang = code
		.and_then(|c| c.attr("class"))
		.and_then(|class| LANGUAGE_CLASS.captures(class))
		.or_else(|| pre.attr("class").and_then(|class| LANGUAGE_CLASS.captures(class)))
		.and_then(|caps| caps.get(1))
		.map_or("", |m| m.as_str());
	out.push_str("\n```");
	out.push_str(lang);
	out.push('\n');
	out.push_str(text.trim());
	out.push_str("\n```\n\n");
}

fn render_list(list: &DomNode, ordered: bool, depth: usize, out: &mut String) {
	let items = list.children().iter().filter(|c| c.tag() == Some("li"));
	for (idx, item) in items.enumerate() {
		let indent = "  ".repeat(depth);
		let prefix = if ordered { format!("{}. ", idx + 1) } else { "- ".to_string() };

		let mut text = String::new();
		let mut nested = String::new();
		for child in item.children() {
			match child.tag() {
				Some("ul") => render_list(child, false, depth + 1, &mut nested),
				Some("ol") => render_list(child, true, depth + 1, &mut nested),
				_ => render(child, depth, &mut text),
			}
		}
		let text = BLANK_RUNS.replace_all(text.trim(), "\n");

		out.push_str(&indent);
		out.push_str(&prefix);
		out.push_str(&text);
		out.push('\n');
		out.push_str(&nested);
	}
}

fn render_table(table: &DomNode, out: &mut String) {
	let mut rows = Vec::new();
	collect_rows(table, &mut rows);
	for (idx, row) in rows.iter().enumerate() {
		let cells: Vec<String> = row
			.children()
			.iter()
			.filter(|c| matches!(c.tag(), Some("th" | "td")))
			.map(|cell| inline(cell, 0).trim().replace('|', "\\|").replace('\n', " "))
			.collect();
		out.push_str("| ");
		out.push_str(&cells.join(" | "));
		out.push_str(" |\n");
		if idx == 0 {
			let separator = vec!["---"; cells.len()];
			out.push_str("| ");
			out.push_str(&separator.join(" | "));
			out.push_str(" |\n");
		}
	}
}

fn collect_rows<'a>(node: &'a DomNode, rows: &mut Vec<&'a DomNode>) {
	for child in node.children() {
		match child.tag() {
			Some("tr") => rows.push(child),
			Some("table") => {}
			Some(_) => collect_rows(child, rows),
			None => {}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn el(tag: &str) -> DomNode {
		DomNode::element(tag)
	}

	fn root(children: Vec<DomNode>) -> DomNode {
		children.into_iter().fold(el("div"), DomNode::with_child)
	}

	#[test]
	fn headings_and_emphasis() {
		let node = root(vec![
			el("h2").with_text("Summary"),
			el("p")
				.with_text("This is ")
				.with_child(el("strong").with_text("bold"))
				.with_text(" and ")
				.with_child(el("em").with_text("soft")),
		]);
		assert_eq!(to_markdown(&node), "## Summary\n\nThis is **bold** and *soft*");
	}

	#[test]
	fn fenced_code_keeps_language() {
		let node = root(vec![
			el("p").with_text("Run ").with_child(el("code").with_text("cargo")),
			el("pre").with_child(
				el("code")
					.with_attr("class", "hljs language-rust")
					.with_text("fn main() {}\n"),
			),
		]);
		assert_eq!(to_markdown(&node), "Run `cargo`\n\n```rust\nfn main() {}\n```");
	}

	#[test]
	fn nested_lists_indent_two_spaces_per_level() {
		let inner = el("ol").with_child(el("li").with_text("one")).with_child(el("li").with_text("two"));
		let node = root(vec![
			el("ul")
				.with_child(el("li").with_text("first").with_child(inner))
				.with_child(el("li").with_child(el("p").with_text("second"))),
		]);
		assert_eq!(to_markdown(&node), "- first\n  1. one\n  2. two\n- second");
	}

	#[test]
	fn links_and_blockquotes() {
		let node = root(vec![
			el("p").with_child(el("a").with_attr("href", "https://example.com").with_text("docs")),
			el("blockquote").with_child(el("p").with_text("quoted")),
		]);
		assert_eq!(to_markdown(&node), "[docs](https://example.com)\n\n> quoted");
	}

	#[test]
	fn tables_get_separator_and_escaped_pipes() {
		let header = el("tr").with_child(el("th").with_text("Key")).with_child(el("th").with_text("Value"));
		let row = el("tr").with_child(el("td").with_text("a|b")).with_child(el("td").with_text("line\nbreak"));
		let node = root(vec![
			el("table")
				.with_child(el("thead").with_child(header))
				.with_child(el("tbody").with_child(row)),
		]);
		assert_eq!(
			to_markdown(&node),
			"| Key | Value |\n| --- | --- |\n| a\\|b | line break |"
		);
	}

	#[test]
	fn drops_page_chrome() {
		let node = root(vec![
			el("p").with_text("answer"),
			el("button").with_text("Copy"),
			el("span").with_attr("class", "sr-only").with_text("assistant said"),
			el("div").with_attr("class", "copy-btn").with_text("copy"),
			el("svg").with_child(el("path")),
		]);
		assert_eq!(to_markdown(&node), "answer");
	}

	#[test]
	fn collapses_blank_runs() {
		let node = root(vec![
			el("p").with_text("a"),
			el("p"),
			el("p"),
			el("p").with_text("b"),
		]);
		assert_eq!(to_markdown(&node), "a\n\nb");
	}
}
