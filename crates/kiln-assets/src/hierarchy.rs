//! Node forest stored as an index-addressed arena.
//!
//! Parents are derived once from the children lists; a node listed under two
//! parents keeps the last one seen. Global transforms are computed in a single
//! parent-before-child pass over a precomputed order.

use std::collections::HashMap;

use glam::Mat4;
use kiln_core::Transform;

/// Default local transform of a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocalTransform {
    /// Explicit matrix, used verbatim and never animated.
    Matrix(Mat4),
    /// Translation, rotation and scale, composed as T * R * S.
    Decomposed(Transform),
}

impl LocalTransform {
    pub fn matrix(&self) -> Mat4 {
        match self {
            LocalTransform::Matrix(m) => *m,
            LocalTransform::Decomposed(trs) => trs.matrix(),
        }
    }
}

impl From<gltf::scene::Transform> for LocalTransform {
    fn from(transform: gltf::scene::Transform) -> Self {
        match transform {
            gltf::scene::Transform::Matrix { matrix } => {
                LocalTransform::Matrix(Mat4::from_cols_array_2d(&matrix))
            }
            gltf::scene::Transform::Decomposed {
                translation,
                rotation,
                scale,
            } => LocalTransform::Decomposed(Transform::from_arrays(translation, rotation, scale)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: Option<String>,
    pub local: LocalTransform,
    pub children: Vec<usize>,
    pub parent: Option<usize>,
}

impl Node {
    pub fn new(name: Option<&str>, local: LocalTransform, children: Vec<usize>) -> Self {
        Self {
            name: name.map(str::to_string),
            local,
            children,
            parent: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeHierarchy {
    nodes: Vec<Node>,
    order: Vec<usize>,
}

impl NodeHierarchy {
    /// Build the arena, deriving parents and the evaluation order.
    ///
    /// Child indices outside the arena are ignored.
    pub fn new(mut nodes: Vec<Node>) -> Self {
        let count = nodes.len();
        let mut parents = vec![None; count];
        for (index, node) in nodes.iter().enumerate() {
            for &child in &node.children {
                if child < count {
                    parents[child] = Some(index);
                }
            }
        }
        for (node, parent) in nodes.iter_mut().zip(parents) {
            node.parent = parent;
        }

        let order = evaluation_order(&nodes);
        Self { nodes, order }
    }

    pub fn from_document(document: &gltf::Document) -> Self {
        let nodes = document
            .nodes()
            .map(|node| {
                Node::new(
                    node.name(),
                    node.transform().into(),
                    node.children().map(|child| child.index()).collect(),
                )
            })
            .collect();
        Self::new(nodes)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn parent(&self, index: usize) -> Option<usize> {
        self.nodes.get(index).and_then(|node| node.parent)
    }

    /// Node indices ordered so every parent precedes its children.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Default local matrix of every node.
    pub fn default_locals(&self) -> Vec<Mat4> {
        self.nodes.iter().map(|node| node.local.matrix()).collect()
    }

    /// Compose local matrices through the parent chain.
    ///
    /// `locals` must hold one matrix per node.
    pub fn global_transforms(&self, locals: &[Mat4]) -> Vec<Mat4> {
        let mut globals = vec![Mat4::IDENTITY; self.nodes.len()];
        let mut done = vec![false; self.nodes.len()];
        for &index in &self.order {
            let local = locals.get(index).copied().unwrap_or(Mat4::IDENTITY);
            globals[index] = match self.nodes[index].parent {
                Some(parent) if done[parent] => globals[parent] * local,
                _ => local,
            };
            done[index] = true;
        }
        globals
    }
}

/// Depth-first from each root, following only the recorded parent links.
/// Nodes unreachable from a root (cycles in malformed files) are appended in
/// index order.
fn evaluation_order(nodes: &[Node]) -> Vec<usize> {
    let mut order = Vec::with_capacity(nodes.len());
    let mut visited = vec![false; nodes.len()];
    let mut stack = Vec::new();

    for root in (0..nodes.len()).filter(|&i| nodes[i].parent.is_none()) {
        stack.push(root);
        while let Some(index) = stack.pop() {
            if visited[index] {
                continue;
            }
            visited[index] = true;
            order.push(index);
            for &child in nodes[index].children.iter().rev() {
                if child < nodes.len() && nodes[child].parent == Some(index) && !visited[child] {
                    stack.push(child);
                }
            }
        }
    }

    order.extend((0..nodes.len()).filter(|&i| !visited[i]));
    order
}

/// Reduce a joint name to a form comparable across exporters: the part after
/// the last `:` or `|` namespace separator, lowercased, alphanumerics only.
///
/// Names that differ only in punctuation collapse to the same key.
pub fn canonical_name(name: &str) -> String {
    let tail = name.rsplit(|c: char| c == ':' || c == '|').next().unwrap_or(name);
    tail.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Two-pass node lookup by name: exact first, then canonical.
#[derive(Debug, Clone, Default)]
pub struct NodeNameLookup {
    exact: HashMap<String, usize>,
    canonical: HashMap<String, usize>,
}

impl NodeNameLookup {
    /// Index every named node; the first node wins on duplicate names.
    pub fn new(hierarchy: &NodeHierarchy) -> Self {
        let mut lookup = Self::default();
        for (index, node) in hierarchy.nodes().iter().enumerate() {
            if let Some(name) = &node.name {
                lookup.exact.entry(name.clone()).or_insert(index);
                let key = canonical_name(name);
                if !key.is_empty() {
                    lookup.canonical.entry(key).or_insert(index);
                }
            }
        }
        lookup
    }

    pub fn find_exact(&self, name: &str) -> Option<usize> {
        self.exact.get(name).copied()
    }

    pub fn find_canonical(&self, name: &str) -> Option<usize> {
        let key = canonical_name(name);
        if key.is_empty() {
            return None;
        }
        self.canonical.get(&key).copied()
    }

    pub fn resolve(&self, name: &str) -> Option<usize> {
        self.find_exact(name).or_else(|| self.find_canonical(name))
    }
}
