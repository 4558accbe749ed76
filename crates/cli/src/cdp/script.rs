//! Page-side JavaScript for the CDP driver.
//!
//! Elements are handed to Rust as numeric handles kept in
//! `window.__rtHandles`. A handle stays valid while its element is attached;
//! resolving a detached one throws.

use serde_json::Value;

/// Binding the mutation hook calls on relevant DOM changes.
pub const MUTATION_BINDING: &str = "__rtMutation";
/// Binding the mutation hook calls with `document.visibilityState`.
pub const VISIBILITY_BINDING: &str = "__rtVisibility";

const PRELUDE: &str = r#"
const rt = window.__rtHandles || (window.__rtHandles = { next: 1, byId: new Map(), ids: new WeakMap() });
const handleOf = (el) => {
	let id = rt.ids.get(el);
	if (!id) {
		id = rt.next++;
		rt.ids.set(el, id);
		rt.byId.set(id, new WeakRef(el));
	}
	return id;
};
const elementOf = (id) => {
	const ref = rt.byId.get(id);
	const el = ref && ref.deref();
	if (!el || !el.isConnected) {
		rt.byId.delete(id);
		throw new Error('stale element ' + id);
	}
	return el;
};
const describe = (el) => {
	const style = getComputedStyle(el);
	const rect = el.getBoundingClientRect();
	return {
		handle: handleOf(el),
		tag: el.tagName.toLowerCase(),
		editable: el.isContentEditable,
		visible: style.display !== 'none' && style.visibility !== 'hidden' && style.opacity !== '0',
		disabled: el.disabled === true
			|| el.getAttribute('aria-disabled') === 'true'
			|| el.classList.contains('disabled')
			|| style.pointerEvents === 'none',
		hasIcon: !!el.querySelector('svg'),
		bottom: rect.bottom,
		viewportHeight: window.innerHeight,
	};
};
"#;

/// `(selector, all) -> ElementInfo[]`. Selectors the browser rejects match nothing.
pub const QUERY: &str = r#"(selector, all) => {
	try {
		const found = all
			? Array.from(document.querySelectorAll(selector))
			: [document.querySelector(selector)].filter(Boolean);
		return found.map(describe);
	} catch (err) {
		if (err instanceof DOMException) return [];
		throw err;
	}
}"#;

/// `(handle, selector) -> ElementInfo | null`
pub const CLOSEST: &str = r#"(id, selector) => {
	try {
		const el = elementOf(id).closest(selector);
		return el ? describe(el) : null;
	} catch (err) {
		if (err instanceof DOMException) return null;
		throw err;
	}
}"#;

/// `(handle, kind, content)` where kind is `value`, `text` or `html`.
pub const WRITE: &str = r#"(id, kind, content) => {
	const el = elementOf(id);
	el.focus();
	if (kind === 'value') {
		const proto = el.tagName === 'TEXTAREA' ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
		Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, content);
	} else if (kind === 'html') {
		el.innerHTML = content;
	} else {
		el.textContent = content;
	}
	return true;
}"#;

/// `(handle, type, key)`
pub const DISPATCH: &str = r#"(id, type, key) => {
	const el = elementOf(id);
	if (type === 'focus') {
		el.focus();
		return true;
	}
	const init = { bubbles: true, cancelable: true };
	let event;
	if (type === 'keydown') {
		const code = key === 'Enter' ? 13 : 0;
		event = new KeyboardEvent(type, { ...init, key, code: key, keyCode: code, which: code });
	} else if (type.startsWith('pointer')) {
		event = new PointerEvent(type, init);
	} else if (type.startsWith('mouse') || type === 'click') {
		event = new MouseEvent(type, init);
	} else {
		event = new Event(type, init);
	}
	el.dispatchEvent(event);
	return true;
}"#;

/// `(handle, exclude) -> DomNode`. The root itself is never excluded.
pub const SNAPSHOT: &str = r#"(id, exclude) => {
	const skip = (el) => exclude.some((s) => {
		try { return el.matches(s); } catch (_) { return false; }
	});
	const walk = (node, root) => {
		if (node.nodeType === Node.TEXT_NODE) return { t: 'text', text: node.textContent };
		if (node.nodeType !== Node.ELEMENT_NODE || (!root && skip(node))) return null;
		const attrs = {};
		for (const a of node.attributes) attrs[a.name] = a.value;
		const children = Array.from(node.childNodes).map((c) => walk(c, false)).filter(Boolean);
		return { t: 'element', tag: node.tagName.toLowerCase(), attrs, children };
	};
	return walk(elementOf(id), true);
}"#;

/// `() -> bool`
pub const IS_VISIBLE: &str = r#"() => document.visibilityState === 'visible'"#;

const HOOK: &str = r#"(() => {
	if (window.__rtHooked) return;
	window.__rtHooked = true;
	const observe = __OBSERVE__;
	const relevant = (node) => {
		if (observe.length === 0) return true;
		const el = node.nodeType === Node.ELEMENT_NODE ? node : node.parentElement;
		return !!el && observe.some((s) => {
			try { return !!el.closest(s) || !!el.querySelector(s); } catch (_) { return false; }
		});
	};
	const start = () => {
		new MutationObserver((records) => {
			if (records.some((r) => relevant(r.target))) window.__rtMutation('');
		}).observe(document.body, { childList: true, subtree: true, characterData: true });
		document.addEventListener('visibilitychange', () => window.__rtVisibility(document.visibilityState));
	};
	if (document.body) start(); else document.addEventListener('DOMContentLoaded', start);
})()"#;

/// Builds an expression that applies one of the function sources above to
/// `args`, with the handle registry in scope.
pub fn call(function: &str, args: &[Value]) -> String {
	let args = args.iter().map(Value::to_string).collect::<Vec<_>>().join(", ");
	["(() => {", PRELUDE, "return (", function, ")(", &args, ");\n})()"].concat()
}

/// Mutation and visibility hook watching the given selectors.
pub fn mutation_hook(observe: &[String]) -> String {
	HOOK.replace("__OBSERVE__", &Value::from(observe.to_vec()).to_string())
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn call_embeds_arguments_as_json() {
		let expr = call(QUERY, &[json!("div[title=\"a'b\"]"), json!(true)]);
		assert!(expr.starts_with("(() => {"));
		assert!(expr.contains(r#"("div[title=\"a'b\"]", true);"#));
		assert!(expr.contains("window.__rtHandles"));
		assert!(expr.ends_with("})()"));
	}

	#[test]
	fn hook_lists_observed_selectors() {
		let hook = mutation_hook(&["[data-is-streaming]".to_string()]);
		assert!(hook.contains(r#"const observe = ["[data-is-streaming]"];"#));
		assert!(hook.contains(MUTATION_BINDING));
		assert!(hook.contains(VISIBILITY_BINDING));
	}
}
