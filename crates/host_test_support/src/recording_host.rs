//! In-memory host backend that records and validates every call.
//!
//! Nodes live in a flat arena indexed by handle. Appending or inserting a
//! node that is already attached moves it, like a DOM. Invalid calls are
//! recorded in `errors()` and trip a `debug_assert!`.

use core_types::HostHandle;
use reconciler::{Attributes, HostBackend};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One backend call, in a form that serializes to a stable JSON line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HostOp {
    CreateContainer {
        handle: u32,
    },
    CreatePrimitive {
        handle: u32,
        kind: String,
        attributes: Vec<(String, Option<String>)>,
    },
    CreateText {
        handle: u32,
        content: String,
    },
    AppendChild {
        parent: u32,
        child: u32,
    },
    InsertBefore {
        parent: u32,
        child: u32,
        before: u32,
    },
    RemoveChild {
        parent: u32,
        child: u32,
    },
    UpdateText {
        handle: u32,
        content: String,
    },
    UpdateProps {
        handle: u32,
        attributes: Vec<(String, Option<String>)>,
    },
    SetVisibility {
        handle: u32,
        hidden: bool,
    },
}

impl HostOp {
    /// Whether the op changes the shape or content of the tree, as opposed
    /// to creating a detached node.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            HostOp::CreateContainer { .. } | HostOp::CreatePrimitive { .. } | HostOp::CreateText { .. }
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostOpError {
    UnknownHandle(HostHandle),
    WrongNodeKind(HostHandle),
    InvalidParent(HostHandle),
    NotAChild { parent: HostHandle, child: HostHandle },
    InvalidSibling { parent: HostHandle, before: HostHandle },
    CycleDetected { parent: HostHandle, child: HostHandle },
}

impl fmt::Display for HostOpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostOpError::UnknownHandle(handle) => write!(f, "unknown handle {}", handle.0),
            HostOpError::WrongNodeKind(handle) => write!(f, "wrong node kind for {}", handle.0),
            HostOpError::InvalidParent(handle) => write!(f, "{} cannot have children", handle.0),
            HostOpError::NotAChild { parent, child } => {
                write!(f, "{} is not a child of {}", child.0, parent.0)
            }
            HostOpError::InvalidSibling { parent, before } => {
                write!(f, "anchor {} is not a child of {}", before.0, parent.0)
            }
            HostOpError::CycleDetected { parent, child } => {
                write!(f, "attaching {} under {} creates a cycle", child.0, parent.0)
            }
        }
    }
}

impl std::error::Error for HostOpError {}

enum NodeKind {
    Container,
    Primitive { kind: Arc<str>, attributes: Attributes },
    Text { content: String },
}

struct NodeRecord {
    kind: NodeKind,
    parent: Option<HostHandle>,
    children: Vec<HostHandle>,
    hidden: bool,
}

impl NodeRecord {
    fn allows_children(&self) -> bool {
        matches!(self.kind, NodeKind::Container | NodeKind::Primitive { .. })
    }
}

#[derive(Default)]
pub struct RecordingHost {
    nodes: Vec<NodeRecord>,
    ops: Vec<HostOp>,
    errors: Vec<HostOpError>,
}

fn owned_attributes(attributes: &Attributes) -> Vec<(String, Option<String>)> {
    attributes
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_container(&mut self) -> HostHandle {
        let handle = self.insert(NodeKind::Container);
        self.ops.push(HostOp::CreateContainer { handle: handle.0 });
        handle
    }

    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.ops)
    }

    /// Ops recorded so far, one JSON object per line.
    pub fn ops_json(&self) -> Vec<String> {
        self.ops
            .iter()
            .map(|op| serde_json::to_string(op).unwrap_or_else(|err| format!("<unserializable: {err}>")))
            .collect()
    }

    pub fn errors(&self) -> &[HostOpError] {
        &self.errors
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn parent(&self, handle: HostHandle) -> Option<HostHandle> {
        self.record(handle).and_then(|node| node.parent)
    }

    pub fn children(&self, handle: HostHandle) -> &[HostHandle] {
        self.record(handle).map(|node| node.children.as_slice()).unwrap_or_default()
    }

    pub fn text(&self, handle: HostHandle) -> Option<&str> {
        match &self.record(handle)?.kind {
            NodeKind::Text { content } => Some(content),
            _ => None,
        }
    }

    pub fn attribute(&self, handle: HostHandle, name: &str) -> Option<&str> {
        match &self.record(handle)?.kind {
            NodeKind::Primitive { attributes, .. } => attributes
                .iter()
                .find(|(key, _)| &**key == name)
                .and_then(|(_, value)| value.as_deref()),
            _ => None,
        }
    }

    pub fn is_hidden(&self, handle: HostHandle) -> bool {
        self.record(handle).is_some_and(|node| node.hidden)
    }

    /// Concatenated text of every visible text node below `root`, in
    /// document order.
    pub fn render_text(&self, root: HostHandle) -> String {
        let mut out = String::new();
        let mut stack = vec![root];
        while let Some(handle) = stack.pop() {
            let Some(node) = self.record(handle) else {
                continue;
            };
            if node.hidden {
                continue;
            }
            if let NodeKind::Text { content } = &node.kind {
                out.push_str(content);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// Indented dump of the tree below `root`. Hidden nodes carry a
    /// `[hidden]` marker.
    pub fn snapshot(&self, root: HostHandle) -> Vec<String> {
        let mut lines = Vec::new();
        let Some(node) = self.record(root) else {
            return lines;
        };
        for child in &node.children {
            self.snapshot_node(*child, 0, &mut lines);
        }
        lines
    }

    fn snapshot_node(&self, handle: HostHandle, depth: usize, lines: &mut Vec<String>) {
        let Some(node) = self.record(handle) else {
            lines.push(format!("{}<missing {}>", "  ".repeat(depth), handle.0));
            return;
        };
        let mut line = "  ".repeat(depth);
        match &node.kind {
            NodeKind::Container => line.push_str("#container"),
            NodeKind::Primitive { kind, attributes } => {
                line.push('<');
                line.push_str(kind);
                for (name, value) in attributes {
                    match value {
                        Some(value) => {
                            line.push_str(&format!(" {name}=\"{}\"", crate::escape_text(value)));
                        }
                        None => line.push_str(&format!(" {name}")),
                    }
                }
                line.push('>');
            }
            NodeKind::Text { content } => {
                line.push('"');
                line.push_str(&crate::escape_text(content));
                line.push('"');
            }
        }
        if node.hidden {
            line.push_str(" [hidden]");
        }
        lines.push(line);
        for child in &node.children {
            self.snapshot_node(*child, depth + 1, lines);
        }
    }

    fn insert(&mut self, kind: NodeKind) -> HostHandle {
        self.nodes.push(NodeRecord {
            kind,
            parent: None,
            children: Vec::new(),
            hidden: false,
        });
        HostHandle(self.nodes.len() as u32)
    }

    fn index(&self, handle: HostHandle) -> Option<usize> {
        let index = (handle.0 as usize).checked_sub(1)?;
        (index < self.nodes.len()).then_some(index)
    }

    fn record(&self, handle: HostHandle) -> Option<&NodeRecord> {
        self.index(handle).map(|index| &self.nodes[index])
    }

    fn report(&mut self, error: HostOpError) {
        log::error!(target: "host_test_support", "invalid host call: {error}");
        debug_assert!(false, "invalid host call: {error}");
        self.errors.push(error);
    }

    fn live_index(&mut self, handle: HostHandle) -> Option<usize> {
        let index = self.index(handle);
        if index.is_none() {
            self.report(HostOpError::UnknownHandle(handle));
        }
        index
    }

    fn is_descendant(&self, ancestor: HostHandle, maybe_descendant: HostHandle) -> bool {
        let mut cursor = self.parent(maybe_descendant);
        while let Some(handle) = cursor {
            if handle == ancestor {
                return true;
            }
            cursor = self.parent(handle);
        }
        false
    }

    /// Validates an attach of `child` under `parent` and detaches `child`
    /// from its current parent. Returns the parent's index.
    fn prepare_attach(&mut self, parent: HostHandle, child: HostHandle) -> Option<usize> {
        let parent_index = self.live_index(parent)?;
        let child_index = self.live_index(child)?;
        if parent == child || self.is_descendant(child, parent) {
            self.report(HostOpError::CycleDetected { parent, child });
            return None;
        }
        if !self.nodes[parent_index].allows_children() {
            self.report(HostOpError::InvalidParent(parent));
            return None;
        }
        if let Some(old_parent) = self.nodes[child_index].parent.take() {
            if let Some(old_index) = self.index(old_parent) {
                self.nodes[old_index].children.retain(|c| *c != child);
            }
        }
        Some(parent_index)
    }
}

impl HostBackend for RecordingHost {
    fn create_primitive(&mut self, kind: &str, attributes: &Attributes) -> HostHandle {
        let handle = self.insert(NodeKind::Primitive {
            kind: Arc::from(kind),
            attributes: attributes.clone(),
        });
        self.ops.push(HostOp::CreatePrimitive {
            handle: handle.0,
            kind: kind.to_string(),
            attributes: owned_attributes(attributes),
        });
        handle
    }

    fn create_text_primitive(&mut self, content: &str) -> HostHandle {
        let handle = self.insert(NodeKind::Text {
            content: content.to_string(),
        });
        self.ops.push(HostOp::CreateText {
            handle: handle.0,
            content: content.to_string(),
        });
        handle
    }

    fn append_child(&mut self, parent: HostHandle, child: HostHandle) {
        self.ops.push(HostOp::AppendChild {
            parent: parent.0,
            child: child.0,
        });
        let Some(parent_index) = self.prepare_attach(parent, child) else {
            return;
        };
        self.nodes[parent_index].children.push(child);
        if let Some(child_index) = self.index(child) {
            self.nodes[child_index].parent = Some(parent);
        }
    }

    fn insert_before(&mut self, parent: HostHandle, child: HostHandle, before: HostHandle) {
        self.ops.push(HostOp::InsertBefore {
            parent: parent.0,
            child: child.0,
            before: before.0,
        });
        if child == before || self.parent(before) != Some(parent) {
            self.report(HostOpError::InvalidSibling { parent, before });
            return;
        }
        let Some(parent_index) = self.prepare_attach(parent, child) else {
            return;
        };
        let siblings = &mut self.nodes[parent_index].children;
        let Some(position) = siblings.iter().position(|c| *c == before) else {
            self.report(HostOpError::InvalidSibling { parent, before });
            return;
        };
        siblings.insert(position, child);
        if let Some(child_index) = self.index(child) {
            self.nodes[child_index].parent = Some(parent);
        }
    }

    fn remove_child(&mut self, parent: HostHandle, child: HostHandle) {
        self.ops.push(HostOp::RemoveChild {
            parent: parent.0,
            child: child.0,
        });
        let (Some(parent_index), Some(child_index)) = (self.live_index(parent), self.live_index(child)) else {
            return;
        };
        if self.nodes[child_index].parent != Some(parent) {
            self.report(HostOpError::NotAChild { parent, child });
            return;
        }
        self.nodes[parent_index].children.retain(|c| *c != child);
        self.nodes[child_index].parent = None;
    }

    fn update_text_content(&mut self, handle: HostHandle, content: &str) {
        self.ops.push(HostOp::UpdateText {
            handle: handle.0,
            content: content.to_string(),
        });
        let Some(index) = self.live_index(handle) else {
            return;
        };
        if let NodeKind::Text { content: existing } = &mut self.nodes[index].kind {
            existing.clear();
            existing.push_str(content);
            return;
        }
        self.report(HostOpError::WrongNodeKind(handle));
    }

    fn update_primitive_props(&mut self, handle: HostHandle, attributes: &Attributes) {
        self.ops.push(HostOp::UpdateProps {
            handle: handle.0,
            attributes: owned_attributes(attributes),
        });
        let Some(index) = self.live_index(handle) else {
            return;
        };
        if let NodeKind::Primitive { attributes: existing, .. } = &mut self.nodes[index].kind {
            existing.clear();
            existing.extend(attributes.iter().cloned());
            return;
        }
        self.report(HostOpError::WrongNodeKind(handle));
    }

    fn set_visibility(&mut self, handle: HostHandle, hidden: bool) {
        self.ops.push(HostOp::SetVisibility {
            handle: handle.0,
            hidden,
        });
        if let Some(index) = self.live_index(handle) {
            self.nodes[index].hidden = hidden;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use reconciler::attrs;

    #[test]
    fn attaching_an_attached_node_moves_it() {
        let mut host = RecordingHost::new();
        let root = host.create_container();
        let a = host.create_text_primitive("a");
        let b = host.create_text_primitive("b");
        host.append_child(root, a);
        host.append_child(root, b);
        host.insert_before(root, b, a);
        assert_eq!(host.render_text(root), "ba");
        host.append_child(root, b);
        assert_eq!(host.render_text(root), "ab");
        assert!(host.errors().is_empty());
    }

    #[test]
    fn snapshot_marks_hidden_nodes() {
        let mut host = RecordingHost::new();
        let root = host.create_container();
        let div = host.create_primitive("div", &attrs([("id", "x")]));
        let text = host.create_text_primitive("hi");
        host.append_child(div, text);
        host.append_child(root, div);
        host.set_visibility(div, true);
        assert_eq!(
            host.snapshot(root),
            vec!["<div id=\"x\"> [hidden]".to_string(), "  \"hi\"".to_string()]
        );
        assert_eq!(host.render_text(root), "");
    }

    #[test]
    fn ops_serialize_as_tagged_json() {
        let mut host = RecordingHost::new();
        let root = host.create_container();
        let text = host.create_text_primitive("x");
        host.append_child(root, text);
        assert_eq!(
            host.ops_json(),
            vec![
                r#"{"op":"create_container","handle":1}"#.to_string(),
                r#"{"op":"create_text","handle":2,"content":"x"}"#.to_string(),
                r#"{"op":"append_child","parent":1,"child":2}"#.to_string(),
            ]
        );
    }
}
