//! Mock driver for testing
//!
//! A scripted in-memory browser. DOMs are staged per URL; navigation swaps
//! the live DOM and mints fresh node instance ids, so handles cached across
//! navigations genuinely go stale. Dedicated scripting hooks exercise the
//! resilience paths: stale-once nodes, permanently stale nodes, swallowed
//! writes, and late-appearing elements.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::driver::traits::{Driver, ElementKind, Handle, Selector};
use crate::{Error, Result};

/// One staged DOM node
#[derive(Debug, Clone)]
pub struct MockNode {
    kind: ElementKind,
    attrs: Vec<(String, String)>,
    text: String,
    value: String,
    selected: bool,
    visible: bool,
    navigates_to: Option<String>,
    children: Vec<MockNode>,
}

impl MockNode {
    /// Create a node of the given kind
    pub fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            attrs: Vec::new(),
            text: String::new(),
            value: String::new(),
            selected: false,
            visible: true,
            navigates_to: None,
            children: Vec::new(),
        }
    }

    /// Set the `id` attribute
    pub fn id<S: Into<String>>(self, value: S) -> Self {
        self.attr("id", value)
    }

    /// Set an attribute
    pub fn attr<S: Into<String>>(mut self, name: &str, value: S) -> Self {
        self.attrs.push((name.to_string(), value.into()));
        self
    }

    /// Set the rendered text
    pub fn text<S: Into<String>>(mut self, text: S) -> Self {
        self.text = text.into();
        self
    }

    /// Set the initial value
    pub fn value<S: Into<String>>(mut self, value: S) -> Self {
        self.value = value.into();
        self
    }

    /// Mark the node as not visibly rendered
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Mark a toggle-like node as initially on
    pub fn selected(mut self) -> Self {
        self.selected = true;
        self
    }

    /// Clicking this node navigates to the given URL
    pub fn navigates_to<S: Into<String>>(mut self, url: S) -> Self {
        self.navigates_to = Some(url.into());
        self
    }

    /// Nest a child node
    pub fn child(mut self, node: MockNode) -> Self {
        self.children.push(node);
        self
    }
}

/// One staged DOM, keyed by URL when handed to [`MockDriver::stage`]
#[derive(Debug, Clone, Default)]
pub struct MockDom {
    title: String,
    nodes: Vec<MockNode>,
}

impl MockDom {
    /// Create a DOM with the given document title
    pub fn new<S: Into<String>>(title: S) -> Self {
        Self {
            title: title.into(),
            nodes: Vec::new(),
        }
    }

    /// Add a top-level node
    pub fn node(mut self, node: MockNode) -> Self {
        self.nodes.push(node);
        self
    }
}

/// A node instantiated into the live document
#[derive(Debug, Clone)]
struct LiveNode {
    instance: String,
    parent: Option<usize>,
    kind: ElementKind,
    attrs: Vec<(String, String)>,
    text: String,
    value: String,
    selected: bool,
    visible: bool,
    navigates_to: Option<String>,
}

impl LiveNode {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// The node's `id` attribute when set, otherwise its instance id
    fn label(&self) -> String {
        self.attr("id")
            .map(|s| s.to_string())
            .unwrap_or_else(|| self.instance.clone())
    }
}

#[derive(Debug, Default)]
struct MockState {
    staged: HashMap<String, MockDom>,
    url: String,
    title: String,
    live: Vec<LiveNode>,
    dialog: bool,
    find_count: usize,
    navigations: Vec<String>,
    ops: Vec<(String, String)>,
    always_stale: HashSet<String>,
    swallow: HashMap<String, usize>,
    deferred: HashMap<String, usize>,
}

/// Scripted mock driver
#[derive(Debug, Default)]
pub struct MockDriver {
    state: Mutex<MockState>,
}

impl MockDriver {
    /// Create an empty mock driver parked on `about:blank`
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                url: "about:blank".to_string(),
                ..MockState::default()
            }),
        }
    }

    /// Stage a DOM to be instantiated when `url` is navigated to
    pub fn stage<S: Into<String>>(&self, url: S, dom: MockDom) {
        self.state.lock().unwrap().staged.insert(url.into(), dom);
    }

    /// Re-mint one live node's instance id; handles held to it go stale
    pub fn replace_node(&self, id_attr: &str) {
        let mut state = self.state.lock().unwrap();
        for node in state.live.iter_mut() {
            if node.attr("id") == Some(id_attr) {
                node.instance = Uuid::new_v4().to_string();
            }
        }
    }

    /// Every operation on this node reports a stale handle
    pub fn always_stale(&self, id_attr: &str) {
        self.state
            .lock()
            .unwrap()
            .always_stale
            .insert(id_attr.to_string());
    }

    /// Silently drop the first `n` writes to this node
    pub fn swallow_writes(&self, id_attr: &str, n: usize) {
        self.state
            .lock()
            .unwrap()
            .swallow
            .insert(id_attr.to_string(), n);
    }

    /// Hide this node from the first `n` queries that would match it
    pub fn defer(&self, id_attr: &str, n: usize) {
        self.state
            .lock()
            .unwrap()
            .deferred
            .insert(id_attr.to_string(), n);
    }

    /// Stage an open modal dialog
    pub fn stage_dialog(&self) {
        self.state.lock().unwrap().dialog = true;
    }

    /// Number of `find_all` queries executed so far
    pub fn find_count(&self) -> usize {
        self.state.lock().unwrap().find_count
    }

    /// Every URL navigated to, in order
    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    /// Number of recorded `op` operations against the node with this id
    pub fn count_ops(&self, op: &str, id_attr: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .ops
            .iter()
            .filter(|(o, id)| o == op && id == id_attr)
            .count()
    }
}

fn instantiate(dom: &MockDom) -> Vec<LiveNode> {
    let mut live = Vec::new();
    for node in &dom.nodes {
        push_node(node, None, &mut live);
    }
    live
}

fn push_node(node: &MockNode, parent: Option<usize>, live: &mut Vec<LiveNode>) {
    let idx = live.len();
    live.push(LiveNode {
        instance: Uuid::new_v4().to_string(),
        parent,
        kind: node.kind,
        attrs: node.attrs.clone(),
        text: node.text.clone(),
        value: node.value.clone(),
        selected: node.selected,
        visible: node.visible,
        navigates_to: node.navigates_to.clone(),
    });
    for child in &node.children {
        push_node(child, Some(idx), live);
    }
}

fn apply_navigation(state: &mut MockState, url: &str) {
    state.navigations.push(url.to_string());
    state.url = url.to_string();
    match state.staged.get(url) {
        Some(dom) => {
            state.title = dom.title.clone();
            state.live = instantiate(&dom.clone());
        }
        None => {
            state.title = String::new();
            state.live = Vec::new();
        }
    }
}

fn descendant_of(live: &[LiveNode], mut idx: usize, ancestor: usize) -> bool {
    while let Some(parent) = live[idx].parent {
        if parent == ancestor {
            return true;
        }
        idx = parent;
    }
    false
}

fn kind_matches(requested: ElementKind, actual: ElementKind) -> bool {
    requested == ElementKind::Any || requested == actual
}

fn selector_matches(node: &LiveNode, selector: &Selector) -> bool {
    selector.parts().iter().all(|(attr, matcher)| {
        let value = if attr == "text" {
            Some(node.text.as_str())
        } else {
            node.attr(attr)
        };
        value.map(|v| matcher.matches(v)).unwrap_or(false)
    })
}

fn locate(state: &MockState, handle: &Handle) -> Result<usize> {
    state
        .live
        .iter()
        .position(|n| n.instance == handle.id)
        .ok_or_else(|| {
            Error::stale_handle(format!("mock node {} is no longer attached", handle.id))
        })
}

/// Record the operation, then fail if the node is scripted always-stale
fn touch(state: &mut MockState, op: &str, idx: usize) -> Result<()> {
    let label = state.live[idx].label();
    state.ops.push((op.to_string(), label.clone()));
    if state.always_stale.contains(&label) {
        return Err(Error::stale_handle(format!(
            "mock node {} is no longer attached",
            label
        )));
    }
    Ok(())
}

#[async_trait]
impl Driver for MockDriver {
    async fn current_url(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn current_title(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().title.clone())
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        apply_navigation(&mut state, url);
        Ok(())
    }

    async fn find_all(
        &self,
        kind: ElementKind,
        selector: &Selector,
        scope: Option<&Handle>,
    ) -> Result<Vec<Handle>> {
        let mut state = self.state.lock().unwrap();
        state.find_count += 1;

        let scope_idx = match scope {
            Some(handle) => Some(locate(&state, handle)?),
            None => None,
        };

        let mut handles = Vec::new();
        let mut defer_hits = Vec::new();
        for (idx, node) in state.live.iter().enumerate() {
            if let Some(ancestor) = scope_idx {
                if !descendant_of(&state.live, idx, ancestor) {
                    continue;
                }
            }
            if !kind_matches(kind, node.kind) || !selector_matches(node, selector) {
                continue;
            }
            if let Some(id) = node.attr("id") {
                if state.deferred.get(id).copied().unwrap_or(0) > 0 {
                    defer_hits.push(id.to_string());
                    continue;
                }
            }
            handles.push(Handle::new(node.instance.clone()));
        }
        for id in defer_hits {
            if let Some(remaining) = state.deferred.get_mut(&id) {
                *remaining -= 1;
            }
        }
        Ok(handles)
    }

    async fn click(&self, handle: &Handle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let idx = locate(&state, handle)?;
        touch(&mut state, "click", idx)?;
        if let Some(url) = state.live[idx].navigates_to.clone() {
            apply_navigation(&mut state, &url);
        }
        Ok(())
    }

    async fn set_value(&self, handle: &Handle, text: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let idx = locate(&state, handle)?;
        touch(&mut state, "set_value", idx)?;
        let label = state.live[idx].label();
        if let Some(remaining) = state.swallow.get_mut(&label) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(());
            }
        }
        state.live[idx].value = text.to_string();
        Ok(())
    }

    async fn select(&self, handle: &Handle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let idx = locate(&state, handle)?;
        touch(&mut state, "select", idx)?;
        let label = state.live[idx].label();
        if let Some(remaining) = state.swallow.get_mut(&label) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(());
            }
        }
        state.live[idx].selected = true;
        Ok(())
    }

    async fn read_value(&self, handle: &Handle) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        let idx = locate(&state, handle)?;
        touch(&mut state, "read_value", idx)?;
        Ok(state.live[idx].value.clone())
    }

    async fn read_text(&self, handle: &Handle) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        let idx = locate(&state, handle)?;
        touch(&mut state, "read_text", idx)?;
        Ok(state.live[idx].text.clone())
    }

    async fn is_present(&self, handle: &Handle) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        match locate(&state, handle) {
            Ok(idx) => {
                touch(&mut state, "is_present", idx)?;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    async fn is_visible(&self, handle: &Handle) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let idx = locate(&state, handle)?;
        touch(&mut state, "is_visible", idx)?;
        Ok(state.live[idx].visible)
    }

    async fn is_selected(&self, handle: &Handle) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let idx = locate(&state, handle)?;
        touch(&mut state, "is_selected", idx)?;
        Ok(state.live[idx].selected)
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        // Minimal PNG header, enough for capture plumbing
        Ok(vec![
            0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48,
            0x44, 0x52,
        ])
    }

    async fn page_source(&self) -> Result<String> {
        let state = self.state.lock().unwrap();
        let tags: Vec<&str> = state.live.iter().map(|n| n.kind.css()).collect();
        Ok(format!(
            "<html><head><title>{}</title></head><body>{}</body></html>",
            state.title,
            tags.join(" ")
        ))
    }

    async fn dismiss_dialog(&self, _accept: bool) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        if state.dialog {
            state.dialog = false;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
