use rustc_hash::FxHashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::deferred::{DeferredSubtree, RenderContext};
use crate::error::ResumeError;

#[derive(Debug, Clone)]
pub enum Node {
    Element { tag: String, attrs: Vec<(String, String)>, children: Vec<Node> },
    Text(String),
    Boundary(BoundaryNode),
    /// Fails whenever it is rendered.
    Throw(String),
}

impl Node {
    pub fn element(tag: impl Into<String>, children: Vec<Node>) -> Self {
        Node::Element { tag: tag.into(), attrs: Vec::new(), children }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(text.into())
    }

    pub fn throw(message: impl Into<String>) -> Self {
        Node::Throw(message.into())
    }

    pub fn boundary(boundary: BoundaryNode) -> Self {
        Node::Boundary(boundary)
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let Node::Element { attrs, .. } = &mut self {
            attrs.push((name.into(), value.into()));
        }
        self
    }
}

/// A tree node that shows either its content or its fallback.
///
/// Each boundary owns one deferred subtree per render context.
#[derive(Debug, Clone)]
pub struct BoundaryNode {
    pub id: String,
    pub fallback: Box<Node>,
    pub content: Box<Node>,
    pub server: Arc<DeferredSubtree>,
    pub client: Arc<DeferredSubtree>,
}

impl BoundaryNode {
    pub fn new(id: impl Into<String>, fallback: Node, content: Node) -> Self {
        Self {
            id: id.into(),
            fallback: Box::new(fallback),
            content: Box::new(content),
            server: Arc::new(DeferredSubtree::new(RenderContext::Server, Duration::ZERO)),
            client: Arc::new(DeferredSubtree::new(RenderContext::Client, Duration::ZERO)),
        }
    }

    pub fn with_client_latency(mut self, latency: Duration) -> Self {
        self.client = Arc::new(DeferredSubtree::new(RenderContext::Client, latency));
        self
    }

    pub fn with_server_subtree(mut self, subtree: DeferredSubtree) -> Self {
        self.server = Arc::new(subtree);
        self
    }

    pub fn with_client_subtree(mut self, subtree: DeferredSubtree) -> Self {
        self.client = Arc::new(subtree);
        self
    }

    /// Both contexts already hold their content.
    pub fn pre_resolved(self) -> Self {
        self.with_server_subtree(DeferredSubtree::pre_resolved(RenderContext::Server))
            .with_client_subtree(DeferredSubtree::pre_resolved(RenderContext::Client))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BoundaryEntry<'a> {
    pub node: &'a BoundaryNode,
    pub parent_id: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct ComponentTree {
    root: Node,
}

impl ComponentTree {
    pub fn new(root: Node) -> Result<Self, ResumeError> {
        let tree = Self { root };
        tree.validate()?;
        Ok(tree)
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Every boundary in document order, nested ones included.
    pub fn boundaries(&self) -> Vec<BoundaryEntry<'_>> {
        let mut entries = Vec::new();
        collect_boundaries(&self.root, None, &mut entries);
        entries
    }

    fn validate(&self) -> Result<(), ResumeError> {
        let mut seen = FxHashSet::default();

        for entry in self.boundaries() {
            let id = entry.node.id.as_str();

            if !is_valid_boundary_id(id) {
                return Err(ResumeError::validation(format!(
                    "Boundary id '{id}' must be non-empty and contain only ASCII letters, digits, '-' or '_'"
                )));
            }

            if !seen.insert(id) {
                return Err(ResumeError::validation(format!("Duplicate boundary id '{id}'")));
            }
        }

        Ok(())
    }
}

fn collect_boundaries<'a>(
    node: &'a Node,
    parent_id: Option<&'a str>,
    entries: &mut Vec<BoundaryEntry<'a>>,
) {
    match node {
        Node::Element { children, .. } => {
            for child in children {
                collect_boundaries(child, parent_id, entries);
            }
        }
        Node::Boundary(boundary) => {
            entries.push(BoundaryEntry { node: boundary, parent_id });
            collect_boundaries(&boundary.fallback, parent_id, entries);
            collect_boundaries(&boundary.content, Some(boundary.id.as_str()), entries);
        }
        Node::Text(_) | Node::Throw(_) => {}
    }
}

pub fn is_valid_boundary_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
