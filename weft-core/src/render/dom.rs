//! DOM Boundary
//!
//! The render transaction drives output through the [`DomBackend`]
//! trait: element and text creation plus the handful of mutation
//! primitives the incremental walk needs. A real host supplies its own
//! backend; [`MemoryDom`] is the in-crate reference implementation, an
//! id-indexed node arena that also counts content mutations per node so
//! tests can assert which nodes a pass touched.

use indexmap::IndexMap;

/// Identity of one node in a backend's arena. Stable for the life of
/// the node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

/// The markup-builder surface the transaction mutates through.
pub trait DomBackend {
    /// Create a detached element node.
    fn create_element(&mut self, tag: &str) -> NodeId;

    /// Create a detached text node.
    fn create_text(&mut self, text: &str) -> NodeId;

    /// Replace a text node's content.
    fn set_text(&mut self, node: NodeId, text: &str);

    /// Set an attribute on an element.
    fn set_attribute(&mut self, element: NodeId, name: &str, value: &str);

    /// Insert `node` into `parent` before `reference`, or append when
    /// `reference` is `None`. A node that already has a parent is
    /// detached first, so this doubles as the move primitive.
    fn insert_before(&mut self, parent: NodeId, node: NodeId, reference: Option<NodeId>);

    /// Detach `node` from `parent`.
    fn remove_child(&mut self, parent: NodeId, node: NodeId);

    /// The mount point for render roots.
    fn root(&self) -> NodeId;
}

enum MemoryKind {
    Element {
        tag: String,
        attributes: IndexMap<String, String>,
    },
    Text(String),
}

struct MemoryNode {
    kind: MemoryKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    mutations: u64,
}

/// An in-memory [`DomBackend`] with per-node mutation counters.
pub struct MemoryDom {
    nodes: Vec<MemoryNode>,
}

impl MemoryDom {
    /// Create a backend holding only the document root.
    pub fn new() -> Self {
        Self {
            nodes: vec![MemoryNode {
                kind: MemoryKind::Element {
                    tag: "#document".to_string(),
                    attributes: IndexMap::new(),
                },
                parent: None,
                children: Vec::new(),
                mutations: 0,
            }],
        }
    }

    fn push(&mut self, kind: MemoryKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(MemoryNode {
            kind,
            parent: None,
            children: Vec::new(),
            mutations: 0,
        });
        id
    }

    fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|child| *child != node);
        }
    }

    /// How many content mutations (`set_text` / `set_attribute`) have
    /// hit this node.
    pub fn mutation_count(&self, node: NodeId) -> u64 {
        self.nodes[node.0].mutations
    }

    /// Child ids of a node, in document order.
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    /// The element tag, if `node` is an element.
    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0].kind {
            MemoryKind::Element { tag, .. } => Some(tag),
            MemoryKind::Text(_) => None,
        }
    }

    /// A text node's content.
    pub fn text(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0].kind {
            MemoryKind::Text(text) => Some(text),
            MemoryKind::Element { .. } => None,
        }
    }

    /// An element's attribute value.
    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.nodes[node.0].kind {
            MemoryKind::Element { attributes, .. } => attributes.get(name).map(String::as_str),
            MemoryKind::Text(_) => None,
        }
    }

    /// Concatenated text of the subtree under `node`.
    pub fn text_content(&self, node: NodeId) -> String {
        match &self.nodes[node.0].kind {
            MemoryKind::Text(text) => text.clone(),
            MemoryKind::Element { .. } => self.nodes[node.0]
                .children
                .iter()
                .map(|child| self.text_content(*child))
                .collect(),
        }
    }

    /// Serialize the subtree under `node` for assertions.
    pub fn to_markup(&self, node: NodeId) -> String {
        match &self.nodes[node.0].kind {
            MemoryKind::Text(text) => text.clone(),
            MemoryKind::Element { tag, attributes } => {
                let mut out = String::new();
                if tag != "#document" {
                    out.push('<');
                    out.push_str(tag);
                    for (name, value) in attributes {
                        out.push_str(&format!(" {name}=\"{value}\""));
                    }
                    out.push('>');
                }
                for child in &self.nodes[node.0].children {
                    out.push_str(&self.to_markup(*child));
                }
                if tag != "#document" {
                    out.push_str(&format!("</{tag}>"));
                }
                out
            }
        }
    }
}

impl Default for MemoryDom {
    fn default() -> Self {
        Self::new()
    }
}

impl DomBackend for MemoryDom {
    fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(MemoryKind::Element {
            tag: tag.to_string(),
            attributes: IndexMap::new(),
        })
    }

    fn create_text(&mut self, text: &str) -> NodeId {
        self.push(MemoryKind::Text(text.to_string()))
    }

    fn set_text(&mut self, node: NodeId, text: &str) {
        if let MemoryKind::Text(current) = &mut self.nodes[node.0].kind {
            *current = text.to_string();
        }
        self.nodes[node.0].mutations += 1;
    }

    fn set_attribute(&mut self, element: NodeId, name: &str, value: &str) {
        if let MemoryKind::Element { attributes, .. } = &mut self.nodes[element.0].kind {
            attributes.insert(name.to_string(), value.to_string());
        }
        self.nodes[element.0].mutations += 1;
    }

    fn insert_before(&mut self, parent: NodeId, node: NodeId, reference: Option<NodeId>) {
        self.detach(node);
        let position = reference
            .and_then(|r| self.nodes[parent.0].children.iter().position(|c| *c == r))
            .unwrap_or(self.nodes[parent.0].children.len());
        self.nodes[parent.0].children.insert(position, node);
        self.nodes[node.0].parent = Some(parent);
    }

    fn remove_child(&mut self, parent: NodeId, node: NodeId) {
        if self.nodes[node.0].parent == Some(parent) {
            self.detach(node);
        }
    }

    fn root(&self) -> NodeId {
        NodeId(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_and_serializes_a_tree() {
        let mut dom = MemoryDom::new();
        let root = dom.root();

        let div = dom.create_element("div");
        dom.set_attribute(div, "class", "card");
        dom.insert_before(root, div, None);

        let text = dom.create_text("hello");
        dom.insert_before(div, text, None);

        assert_eq!(dom.to_markup(root), "<div class=\"card\">hello</div>");
        assert_eq!(dom.text_content(root), "hello");
    }

    #[test]
    fn insert_before_positions_and_moves() {
        let mut dom = MemoryDom::new();
        let root = dom.root();

        let a = dom.create_text("a");
        let b = dom.create_text("b");
        let c = dom.create_text("c");
        dom.insert_before(root, a, None);
        dom.insert_before(root, b, None);
        dom.insert_before(root, c, None);
        assert_eq!(dom.text_content(root), "abc");

        // Moving an attached node detaches it first.
        dom.insert_before(root, c, Some(a));
        assert_eq!(dom.text_content(root), "cab");
    }

    #[test]
    fn mutation_counters_track_content_writes() {
        let mut dom = MemoryDom::new();
        let root = dom.root();
        let text = dom.create_text("x");
        dom.insert_before(root, text, None);

        assert_eq!(dom.mutation_count(text), 0);
        dom.set_text(text, "y");
        dom.set_text(text, "z");
        assert_eq!(dom.mutation_count(text), 2);
        assert_eq!(dom.text(text), Some("z"));
    }

    #[test]
    fn remove_child_detaches() {
        let mut dom = MemoryDom::new();
        let root = dom.root();
        let text = dom.create_text("x");
        dom.insert_before(root, text, None);

        dom.remove_child(root, text);
        assert!(dom.children(root).is_empty());
        assert_eq!(dom.text_content(root), "");
    }
}
