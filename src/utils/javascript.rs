//! Scripts evaluated by the Chrome driver.
//!
//! Element handles live in a registry on the top window (`window.__nowpilot`)
//! so elements inside same-origin frames and shadow roots can be addressed by
//! id from any later call. Ids carry a nonce drawn when the registry is
//! created, so a handle from a previous document never names an element of
//! the current one. Every script returns a JSON string envelope:
//! `{status: "ok", value}`, `{status: "missing"}` or
//! `{status: "fault", kind, message}`.

use crate::errors::{BrowserError, Result};
use crate::types::{Locator, OptionChoice, TraversalContext};
use serde::Deserialize;
use serde_json::Value;

const PRELUDE: &str = r#"
const __np = (() => {
  const nonce = () => (window.crypto && crypto.randomUUID)
    ? crypto.randomUUID()
    : Date.now().toString(36) + Math.random().toString(36).slice(2);
  const reg = window.__nowpilot
    || (window.__nowpilot = { nonce: nonce(), seq: 0, byId: new Map(), ids: new WeakMap() });
  class Fault {
    constructor(kind, message) { this.kind = kind; this.message = message; }
  }
  const fail = (kind, message) => { throw new Fault(kind, message); };
  const register = (el) => {
    let id = reg.ids.get(el);
    if (!id) {
      id = 'np-' + reg.nonce + '-' + (++reg.seq);
      reg.ids.set(el, id);
      reg.byId.set(id, el);
    }
    return id;
  };
  const lookup = (id) => {
    const el = reg.byId.get(id);
    if (!el || !el.isConnected) fail('stale', 'element ' + id + ' is no longer attached');
    return el;
  };
  const root = (frames) => {
    let doc = document;
    for (const id of frames) {
      const frame = reg.byId.get(id);
      if (!frame || !frame.isConnected) fail('context', 'frame ' + id + ' is no longer attached');
      doc = frame.contentDocument;
      if (!doc) fail('context', 'frame ' + id + ' has no accessible document');
    }
    return doc;
  };
  const textOf = (el) => (el.innerText || el.textContent || '').replace(/\s+/g, ' ').trim();
  const finders = {
    css: (scope, selector) => Array.from(scope.querySelectorAll(selector)),
    id: (scope, selector) => {
      const el = scope.getElementById(selector);
      return el ? [el] : [];
    },
    xpath: (scope, selector) => {
      const doc = scope.ownerDocument || scope;
      const snapshot = doc.evaluate(selector, scope, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
      const found = [];
      for (let i = 0; i < snapshot.snapshotLength; i++) found.push(snapshot.snapshotItem(i));
      return found;
    },
    tag_prefix: (scope, selector) => {
      const prefix = selector.toLowerCase();
      return Array.from(scope.querySelectorAll('*')).filter((el) => el.localName.startsWith(prefix));
    },
  };
  const findAll = (scope, strategy, selector) => {
    const find = finders[strategy];
    if (!find) fail('strategy', 'unknown strategy ' + strategy);
    try {
      return find(scope, selector);
    } catch (e) {
      fail('selector', selector + ': ' + (e && e.message ? e.message : String(e)));
    }
  };
  const interactable = (el) => {
    if (!el.isConnected || el.disabled) return false;
    const view = el.ownerDocument.defaultView;
    const style = view ? view.getComputedStyle(el) : null;
    if (style && (style.visibility === 'hidden' || style.display === 'none')) return false;
    const rect = el.getBoundingClientRect();
    return rect.width > 0 && rect.height > 0;
  };
  const mouse = (el, type, detail) => {
    const rect = el.getBoundingClientRect();
    el.dispatchEvent(new MouseEvent(type, {
      bubbles: true,
      cancelable: true,
      view: el.ownerDocument.defaultView,
      detail,
      clientX: rect.left + rect.width / 2,
      clientY: rect.top + rect.height / 2,
    }));
  };
  const toReply = (e) => e instanceof Fault
    ? { status: 'fault', kind: e.kind, message: e.message }
    : { status: 'fault', kind: 'script', message: e && e.message ? e.message : String(e) };
  return { fail, register, lookup, root, textOf, findAll, interactable, mouse, toReply };
})();
"#;

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ScriptReply {
    Ok {
        #[serde(default)]
        value: Value,
    },
    Missing,
    Fault {
        kind: String,
        message: String,
    },
}

impl ScriptReply {
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// `Some(value)` for ok, `None` for missing, the mapped error for faults.
    pub fn into_result(self) -> Result<Option<Value>> {
        match self {
            ScriptReply::Ok { value } => Ok(Some(value)),
            ScriptReply::Missing => Ok(None),
            ScriptReply::Fault { kind, message } => Err(match kind.as_str() {
                "stale" => BrowserError::StaleElement(message),
                "context" => BrowserError::ContextInvalid(message),
                "selector" => BrowserError::InvalidSelector(message),
                "strategy" => BrowserError::UnsupportedLocator(message),
                _ => BrowserError::JavaScriptFailed(message),
            }),
        }
    }
}

pub struct Scripts;

impl Scripts {
    fn wrap(body: &str) -> String {
        format!(
            "(() => {{\n{}\ntry {{\nconst reply = (() => {{\n{}\n}})();\nreturn JSON.stringify(reply);\n}} catch (e) {{\nreturn JSON.stringify(__np.toReply(e));\n}}\n}})()",
            PRELUDE, body
        )
    }

    fn literal<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }

    pub fn query(context: &TraversalContext, locator: &Locator) -> Result<String> {
        Ok(Self::wrap(&format!(
            r#"const scope = __np.root({frames});
const text = {text};
const el = __np.findAll(scope, {strategy}, {selector})
  .find((candidate) => text === null || __np.textOf(candidate).includes(text));
return el ? {{ status: 'ok', value: __np.register(el) }} : {{ status: 'missing' }};"#,
            frames = Self::literal(context.frames())?,
            text = Self::literal(&locator.contains)?,
            strategy = Self::literal(locator.strategy.as_str())?,
            selector = Self::literal(&locator.selector)?,
        )))
    }

    pub fn query_shadow(host_id: &str, selector: &str) -> Result<String> {
        Ok(Self::wrap(&format!(
            r#"const host = __np.lookup({host});
if (!host.shadowRoot) return {{ status: 'missing' }};
const el = __np.findAll(host.shadowRoot, 'css', {selector})[0];
return el ? {{ status: 'ok', value: __np.register(el) }} : {{ status: 'missing' }};"#,
            host = Self::literal(host_id)?,
            selector = Self::literal(selector)?,
        )))
    }

    pub fn interactable(id: &str) -> Result<String> {
        Ok(Self::wrap(&format!(
            "return {{ status: 'ok', value: __np.interactable(__np.lookup({})) }};",
            Self::literal(id)?
        )))
    }

    pub fn enter_frame(context: &TraversalContext, frame_id: &str) -> Result<String> {
        Ok(Self::wrap(&format!(
            r#"__np.root({frames});
const id = {id};
const frame = window.__nowpilot.byId.get(id);
if (!frame || !frame.isConnected) __np.fail('context', 'frame ' + id + ' is no longer attached');
if (frame.localName !== 'iframe' && frame.localName !== 'frame') __np.fail('context', 'element ' + id + ' is not a frame');
if (!frame.contentDocument) __np.fail('context', 'frame ' + id + ' has no accessible document');
return {{ status: 'ok', value: id }};"#,
            frames = Self::literal(context.frames())?,
            id = Self::literal(frame_id)?,
        )))
    }

    /// `script` is a function body; `document` inside it is the context's
    /// document and `arguments` holds `args`.
    pub fn execute(context: &TraversalContext, script: &str, args: &[Value]) -> Result<String> {
        Ok(Self::wrap(&format!(
            r#"const document = __np.root({frames});
const run = function () {{
{script}
}};
const value = run.apply(document.defaultView || window, {args});
return {{ status: 'ok', value: value === undefined ? null : value }};"#,
            frames = Self::literal(context.frames())?,
            script = script,
            args = Self::literal(args)?,
        )))
    }

    pub fn click(id: &str) -> Result<String> {
        Ok(Self::wrap(&format!(
            r#"const el = __np.lookup({});
el.scrollIntoView({{ block: 'center' }});
__np.mouse(el, 'mousedown', 1);
__np.mouse(el, 'mouseup', 1);
el.click();
return {{ status: 'ok', value: null }};"#,
            Self::literal(id)?
        )))
    }

    pub fn double_click(id: &str) -> Result<String> {
        Ok(Self::wrap(&format!(
            r#"const el = __np.lookup({});
el.scrollIntoView({{ block: 'center' }});
for (const detail of [1, 2]) {{
  __np.mouse(el, 'mousedown', detail);
  __np.mouse(el, 'mouseup', detail);
  __np.mouse(el, 'click', detail);
}}
__np.mouse(el, 'dblclick', 2);
return {{ status: 'ok', value: null }};"#,
            Self::literal(id)?
        )))
    }

    pub fn focus(id: &str) -> Result<String> {
        Ok(Self::wrap(&format!(
            r#"const el = __np.lookup({});
el.scrollIntoView({{ block: 'center' }});
el.focus();
return {{ status: 'ok', value: el.ownerDocument.activeElement === el }};"#,
            Self::literal(id)?
        )))
    }

    pub fn text(id: &str) -> Result<String> {
        Ok(Self::wrap(&format!(
            "return {{ status: 'ok', value: __np.textOf(__np.lookup({})) }};",
            Self::literal(id)?
        )))
    }

    pub fn select_option(id: &str, choice: &OptionChoice) -> Result<String> {
        Ok(Self::wrap(&format!(
            r#"const el = __np.lookup({id});
if (el.localName !== 'select') __np.fail('script', 'element ' + {id} + ' is not a <select>');
const choice = {choice};
const options = Array.from(el.options);
const option = 'visible_text' in choice
  ? options.find((o) => o.text.replace(/\s+/g, ' ').trim() === choice.visible_text.trim())
  : options[choice.index];
if (!option) return {{ status: 'ok', value: false }};
option.selected = true;
el.value = option.value;
el.dispatchEvent(new Event('input', {{ bubbles: true }}));
el.dispatchEvent(new Event('change', {{ bubbles: true }}));
return {{ status: 'ok', value: true }};"#,
            id = Self::literal(id)?,
            choice = Self::literal(choice)?,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_are_embedded_as_json_literals() {
        let locator = Locator::css(r#"input#sys_display\.LIST_EDIT_incident\.assigned_to"#);
        let script = Scripts::query(&TraversalContext::top(), &locator).unwrap();

        assert!(script.contains(r#""input#sys_display\\.LIST_EDIT_incident\\.assigned_to""#));
        assert!(script.contains("__np.root([])"));
        assert!(script.contains("const text = null;"));
    }

    #[test]
    fn handle_ids_are_scoped_to_the_registry_nonce() {
        let script = Scripts::query(&TraversalContext::top(), &Locator::css("a")).unwrap();

        assert!(script.contains("nonce: nonce()"));
        assert!(script.contains("'np-' + reg.nonce + '-' + (++reg.seq)"));
        assert!(!script.contains("'np-' + (++reg.seq)"));
    }

    #[test]
    fn query_resolves_nested_frames() {
        let context = TraversalContext::top().child("np-3");
        let locator = Locator::css("span.tabs2_tab").with_text("Resolution Information");
        let script = Scripts::query(&context, &locator).unwrap();

        assert!(script.contains(r#"__np.root(["np-3"])"#));
        assert!(script.contains(r#"const text = "Resolution Information";"#));
    }

    #[test]
    fn option_choice_serializes_for_the_select_script() {
        let script =
            Scripts::select_option("np-7", &OptionChoice::VisibleText("Resolved".into())).unwrap();
        assert!(script.contains(r#"const choice = {"visible_text":"Resolved"};"#));

        let script = Scripts::select_option("np-7", &OptionChoice::Index(1)).unwrap();
        assert!(script.contains(r#"const choice = {"index":1};"#));
    }

    #[test]
    fn replies_map_to_outcomes() {
        let ok = ScriptReply::parse(r#"{"status":"ok","value":"np-1"}"#)
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(ok, Some(Value::String("np-1".into())));

        let missing = ScriptReply::parse(r#"{"status":"missing"}"#)
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn fault_kinds_map_to_errors() {
        let fault = |kind: &str| {
            ScriptReply::parse(&format!(
                r#"{{"status":"fault","kind":"{}","message":"boom"}}"#,
                kind
            ))
            .unwrap()
            .into_result()
            .unwrap_err()
        };

        assert!(matches!(fault("stale"), BrowserError::StaleElement(_)));
        assert!(matches!(fault("context"), BrowserError::ContextInvalid(_)));
        assert!(matches!(fault("selector"), BrowserError::InvalidSelector(_)));
        assert!(matches!(fault("strategy"), BrowserError::UnsupportedLocator(_)));
        assert!(matches!(fault("script"), BrowserError::JavaScriptFailed(_)));
    }

    #[test]
    fn execute_binds_arguments() {
        let script = Scripts::execute(
            &TraversalContext::top(),
            "return document.readyState;",
            &[Value::from(1)],
        )
        .unwrap();
        assert!(script.contains("run.apply(document.defaultView || window, [1])"));
        assert!(script.contains("return document.readyState;"));
    }
}
