//! CDP driver adapter
//!
//! Maps the [`Driver`] contract onto Chrome DevTools Protocol commands. The
//! wire client itself stays external: callers inject a [`CdpTransport`] that
//! executes one command and returns its result payload.

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::driver::traits::{Driver, ElementKind, Handle, Matcher, Selector};
use crate::{Error, Result};

/// CDP command transport
///
/// Executes a single protocol command and returns its `result` object.
/// Errors may carry the protocol's error message verbatim; the adapter
/// classifies detached-node messages as stale.
#[async_trait]
pub trait CdpTransport: Send + Sync + std::fmt::Debug {
    /// Execute one CDP command
    async fn execute(&self, method: &str, params: Value) -> Result<Value>;
}

/// CDP error messages that mean the node is gone, not that the call failed
const STALE_MARKERS: [&str; 4] = [
    "No node with given id",
    "Could not find node",
    "does not belong to the document",
    "detached",
];

fn classify(err: Error) -> Error {
    match err {
        Error::Protocol(msg) if STALE_MARKERS.iter().any(|m| msg.contains(m)) => {
            Error::StaleHandle(msg)
        }
        other => other,
    }
}

fn node_id(handle: &Handle) -> Result<i64> {
    handle
        .id
        .parse()
        .map_err(|_| Error::protocol(format!("handle `{}` is not a CDP node id", handle.id)))
}

/// Append an attribute requirement to every alternative of a CSS expression
fn css_with_attr(css: &str, attr: &str, value: &str) -> String {
    css.split(',')
        .map(|alt| format!("{}[{}=\"{}\"]", alt, attr, value.replace('"', "\\\"")))
        .collect::<Vec<_>>()
        .join(",")
}

/// [`Driver`] implementation above an injected CDP transport
#[derive(Debug)]
pub struct CdpDriver {
    transport: Arc<dyn CdpTransport>,
}

impl CdpDriver {
    /// Create a driver above the given transport
    pub fn new(transport: Arc<dyn CdpTransport>) -> Self {
        Self { transport }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        debug!("CdpDriver::call: {} {}", method, params);
        self.transport.execute(method, params).await.map_err(classify)
    }

    async fn evaluate_string(&self, expression: &str) -> Result<String> {
        let result = self
            .call(
                "Runtime.evaluate",
                json!({ "expression": expression, "returnByValue": true }),
            )
            .await?;
        result
            .pointer("/result/value")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| Error::protocol(format!("no string result for `{}`", expression)))
    }

    async fn document_root(&self) -> Result<i64> {
        let result = self.call("DOM.getDocument", json!({ "depth": 0 })).await?;
        result
            .pointer("/root/nodeId")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| Error::protocol("DOM.getDocument returned no root"))
    }

    /// Resolve a node to a runtime object and call a function on it
    async fn call_on_node(&self, handle: &Handle, declaration: &str) -> Result<Value> {
        let resolved = self
            .call("DOM.resolveNode", json!({ "nodeId": node_id(handle)? }))
            .await?;
        let object_id = resolved
            .pointer("/object/objectId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::protocol("DOM.resolveNode returned no object id"))?;
        self.call(
            "Runtime.callFunctionOn",
            json!({
                "objectId": object_id,
                "functionDeclaration": declaration,
                "returnByValue": true,
            }),
        )
        .await
    }

    async fn attributes_of(&self, id: i64) -> Result<Vec<(String, String)>> {
        let result = self
            .call("DOM.getAttributes", json!({ "nodeId": id }))
            .await?;
        let flat = result
            .get("attributes")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let mut attrs = Vec::new();
        for pair in flat.chunks(2) {
            if let (Some(k), Some(v)) = (pair[0].as_str(), pair.get(1).and_then(|v| v.as_str())) {
                attrs.push((k.to_string(), v.to_string()));
            }
        }
        Ok(attrs)
    }

    async fn text_of(&self, handle: &Handle) -> Result<String> {
        let result = self
            .call_on_node(handle, "function() { return this.textContent; }")
            .await?;
        Ok(result
            .pointer("/result/value")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }
}

#[async_trait]
impl Driver for CdpDriver {
    async fn current_url(&self) -> Result<String> {
        self.evaluate_string("window.location.href").await
    }

    async fn current_title(&self) -> Result<String> {
        self.evaluate_string("document.title").await
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.call("Page.navigate", json!({ "url": url })).await?;
        Ok(())
    }

    async fn find_all(
        &self,
        kind: ElementKind,
        selector: &Selector,
        scope: Option<&Handle>,
    ) -> Result<Vec<Handle>> {
        let root = match scope {
            Some(handle) => node_id(handle)?,
            None => self.document_root().await?,
        };

        // Exact attribute parts (other than rendered text) are expressible
        // in CSS; patterns and text matching filter the candidates after.
        let mut css = kind.css().to_string();
        let mut residual: Vec<&(String, Matcher)> = Vec::new();
        for part in selector.parts() {
            match part {
                (attr, Matcher::Exact(value)) if attr != "text" => {
                    css = css_with_attr(&css, attr, value);
                }
                other => residual.push(other),
            }
        }

        let result = self
            .call(
                "DOM.querySelectorAll",
                json!({ "nodeId": root, "selector": css }),
            )
            .await?;
        let ids: Vec<i64> = result
            .get("nodeIds")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_i64()).collect())
            .unwrap_or_default();

        if residual.is_empty() {
            return Ok(ids.into_iter().map(|id| Handle::new(id.to_string())).collect());
        }

        let mut handles = Vec::new();
        'candidates: for id in ids {
            let handle = Handle::new(id.to_string());
            for (attr, matcher) in &residual {
                let value = if attr == "text" {
                    self.text_of(&handle).await?
                } else {
                    match self
                        .attributes_of(id)
                        .await?
                        .into_iter()
                        .find(|(k, _)| k == attr)
                    {
                        Some((_, v)) => v,
                        None => continue 'candidates,
                    }
                };
                if !matcher.matches(&value) {
                    continue 'candidates;
                }
            }
            handles.push(handle);
        }
        Ok(handles)
    }

    async fn click(&self, handle: &Handle) -> Result<()> {
        let id = node_id(handle)?;
        self.call("DOM.scrollIntoViewIfNeeded", json!({ "nodeId": id }))
            .await?;

        let result = self.call("DOM.getBoxModel", json!({ "nodeId": id })).await?;
        let content = result
            .pointer("/model/content")
            .and_then(|v| v.as_array())
            .cloned()
            .ok_or_else(|| Error::protocol("DOM.getBoxModel returned no content quad"))?;
        let x1 = content.first().and_then(|v| v.as_f64()).unwrap_or(0.0);
        let y1 = content.get(1).and_then(|v| v.as_f64()).unwrap_or(0.0);
        let x2 = content.get(4).and_then(|v| v.as_f64()).unwrap_or(x1);
        let y2 = content.get(5).and_then(|v| v.as_f64()).unwrap_or(y1);
        let x = (x1 + x2) / 2.0;
        let y = (y1 + y2) / 2.0;

        self.call(
            "Input.dispatchMouseEvent",
            json!({
                "type": "mousePressed",
                "x": x,
                "y": y,
                "button": "left",
                "clickCount": 1,
            }),
        )
        .await?;
        self.call(
            "Input.dispatchMouseEvent",
            json!({
                "type": "mouseReleased",
                "x": x,
                "y": y,
                "button": "left",
                "clickCount": 1,
            }),
        )
        .await?;
        Ok(())
    }

    async fn set_value(&self, handle: &Handle, text: &str) -> Result<()> {
        self.call("DOM.focus", json!({ "nodeId": node_id(handle)? }))
            .await?;
        let declaration = format!(
            "function() {{ this.value = {}; \
             this.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             this.dispatchEvent(new Event('change', {{ bubbles: true }})); }}",
            Value::String(text.to_string())
        );
        self.call_on_node(handle, &declaration).await?;
        Ok(())
    }

    async fn select(&self, handle: &Handle) -> Result<()> {
        self.call_on_node(
            handle,
            "function() { \
             if (this.tagName === 'OPTION') { this.selected = true; } \
             else { this.checked = true; } \
             this.dispatchEvent(new Event('change', { bubbles: true })); }",
        )
        .await?;
        Ok(())
    }

    async fn read_value(&self, handle: &Handle) -> Result<String> {
        let result = self
            .call_on_node(handle, "function() { return this.value || ''; }")
            .await?;
        Ok(result
            .pointer("/result/value")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }

    async fn read_text(&self, handle: &Handle) -> Result<String> {
        self.text_of(handle).await
    }

    async fn is_present(&self, handle: &Handle) -> Result<bool> {
        match self
            .call("DOM.describeNode", json!({ "nodeId": node_id(handle)? }))
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if err.is_stale() => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn is_visible(&self, handle: &Handle) -> Result<bool> {
        match self
            .call("DOM.getBoxModel", json!({ "nodeId": node_id(handle)? }))
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if err.is_stale() => Ok(false),
            Err(Error::Protocol(msg)) if msg.contains("Could not compute box model") => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn is_selected(&self, handle: &Handle) -> Result<bool> {
        let result = self
            .call_on_node(
                handle,
                "function() { return this.checked === true || this.selected === true; }",
            )
            .await?;
        Ok(result
            .pointer("/result/value")
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let result = self
            .call("Page.captureScreenshot", json!({ "format": "png" }))
            .await?;
        let data = result
            .get("data")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::protocol("Page.captureScreenshot returned no data"))?;
        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| Error::protocol(format!("screenshot payload is not base64: {}", e)))
    }

    async fn page_source(&self) -> Result<String> {
        let root = self.document_root().await?;
        let result = self
            .call("DOM.getOuterHTML", json!({ "nodeId": root }))
            .await?;
        result
            .get("outerHTML")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| Error::protocol("DOM.getOuterHTML returned no markup"))
    }

    async fn dismiss_dialog(&self, accept: bool) -> Result<bool> {
        match self
            .call("Page.handleJavaScriptDialog", json!({ "accept": accept }))
            .await
        {
            Ok(_) => Ok(true),
            Err(Error::Protocol(msg)) if msg.contains("No dialog") => Ok(false),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Transport that replays queued responses and records every call
    #[derive(Debug, Default)]
    struct ScriptedTransport {
        calls: Mutex<Vec<(String, Value)>>,
        responses: Mutex<VecDeque<Result<Value>>>,
    }

    impl ScriptedTransport {
        fn push_ok(&self, value: Value) {
            self.responses.lock().unwrap().push_back(Ok(value));
        }

        fn push_err(&self, msg: &str) {
            self.responses
                .lock()
                .unwrap()
                .push_back(Err(Error::protocol(msg)));
        }

        fn calls(&self) -> Vec<(String, Value)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CdpTransport for ScriptedTransport {
        async fn execute(&self, method: &str, params: Value) -> Result<Value> {
            self.calls
                .lock()
                .unwrap()
                .push((method.to_string(), params));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(json!({})))
        }
    }

    #[tokio::test]
    async fn test_find_all_exact_selector_maps_to_css() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_ok(json!({ "root": { "nodeId": 1 } }));
        transport.push_ok(json!({ "nodeIds": [7, 9] }));

        let driver = CdpDriver::new(transport.clone());
        let handles = driver
            .find_all(ElementKind::Button, &Selector::id("submit"), None)
            .await
            .unwrap();

        assert_eq!(handles, vec![Handle::new("7"), Handle::new("9")]);
        let calls = transport.calls();
        assert_eq!(calls[0].0, "DOM.getDocument");
        assert_eq!(calls[1].0, "DOM.querySelectorAll");
        assert_eq!(calls[1].1["selector"], "button[id=\"submit\"]");
    }

    #[tokio::test]
    async fn test_find_all_scoped_skips_get_document() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_ok(json!({ "nodeIds": [3] }));

        let driver = CdpDriver::new(transport.clone());
        let scope = Handle::new("42");
        let handles = driver
            .find_all(ElementKind::Link, &Selector::attr("href", "/x"), Some(&scope))
            .await
            .unwrap();

        assert_eq!(handles.len(), 1);
        let calls = transport.calls();
        assert_eq!(calls[0].0, "DOM.querySelectorAll");
        assert_eq!(calls[0].1["nodeId"], 42);
    }

    #[tokio::test]
    async fn test_find_all_pattern_filters_candidates() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_ok(json!({ "root": { "nodeId": 1 } }));
        transport.push_ok(json!({ "nodeIds": [7, 9] }));
        transport.push_ok(json!({ "attributes": ["href", "/repos/42"] }));
        transport.push_ok(json!({ "attributes": ["href", "/about"] }));

        let driver = CdpDriver::new(transport);
        let selector = Selector::matching("href", r"^/repos/").unwrap();
        let handles = driver
            .find_all(ElementKind::Link, &selector, None)
            .await
            .unwrap();

        assert_eq!(handles, vec![Handle::new("7")]);
    }

    #[tokio::test]
    async fn test_detached_node_classifies_as_stale() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_err("Could not find node with given id");

        let driver = CdpDriver::new(transport);
        let err = driver
            .read_value(&Handle::new("12"))
            .await
            .unwrap_err();
        assert!(err.is_stale());
    }

    #[tokio::test]
    async fn test_other_errors_stay_protocol() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_err("Target closed");

        let driver = CdpDriver::new(transport);
        let err = driver.navigate("https://example.com").await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_screenshot_decodes_base64() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_ok(json!({ "data": "aGVsbG8=" }));

        let driver = CdpDriver::new(transport);
        let bytes = driver.screenshot().await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn test_dismiss_dialog_absent_is_false() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_err("No dialog is showing");

        let driver = CdpDriver::new(transport);
        assert!(!driver.dismiss_dialog(true).await.unwrap());
    }

    #[tokio::test]
    async fn test_click_dispatches_press_and_release() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_ok(json!({}));
        transport.push_ok(json!({ "model": { "content": [0.0, 0.0, 10.0, 0.0, 10.0, 20.0, 0.0, 20.0] } }));
        transport.push_ok(json!({}));
        transport.push_ok(json!({}));

        let driver = CdpDriver::new(transport.clone());
        driver.click(&Handle::new("5")).await.unwrap();

        let calls = transport.calls();
        assert_eq!(calls[0].0, "DOM.scrollIntoViewIfNeeded");
        assert_eq!(calls[2].0, "Input.dispatchMouseEvent");
        assert_eq!(calls[2].1["type"], "mousePressed");
        assert_eq!(calls[2].1["x"], 5.0);
        assert_eq!(calls[2].1["y"], 10.0);
        assert_eq!(calls[3].1["type"], "mouseReleased");
    }
}
