use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use sift_core::{ChainRecord, DerivedId, SourceId};
use sift_search::Chain;
use thiserror::Error;
use tracing::{debug, warn};

/// 樹中每個節點的識別碼。 / Identifier of a node inside one forest.
///
/// Ids are handed out by the owning [`Forest`] and never reused within it; a
/// rebuilt forest numbers its nodes afresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// 節點類型。 / Node kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// A source file; carries no identity and an empty chain.
    Root,
    /// One derived document.
    Chain,
}

/// 樹節點。 / Node of the derived-document forest.
#[derive(Clone, Debug, PartialEq)]
pub struct TreeNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub label: String,
    pub chain: Chain,
    pub source: SourceId,
    pub identity: Option<DerivedId>,
    /// Back-reference only; the parent owns this node through `children`.
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub expandable: bool,
}

impl TreeNode {
    pub fn is_root(&self) -> bool {
        self.kind == NodeKind::Root
    }

    /// Key used when comparing forest shapes: the identity, or `root:<source>`.
    fn shape_key(&self) -> String {
        match &self.identity {
            Some(identity) => identity.to_string(),
            None => format!("root:{}", self.source.as_str()),
        }
    }
}

/// 樹操作錯誤。 / Tree manipulation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("node {0} not found")]
    NodeNotFound(NodeId),
    #[error("no tree node for {0}")]
    UnknownIdentity(DerivedId),
}

/// 以來源檔案為根的衍生文件森林。 / Forest of derived documents rooted at their source files.
///
/// Nodes live in a table keyed by [`NodeId`]. Roots are registered per source,
/// chain nodes are indexed by identity so a new sub-chain finds its parent in
/// constant time.
#[derive(Debug, Default)]
pub struct Forest {
    nodes: HashMap<NodeId, TreeNode>,
    roots: HashMap<SourceId, NodeId>,
    root_order: Vec<NodeId>,
    by_identity: HashMap<DerivedId, NodeId>,
    next_id: u64,
}

impl Forest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(&id)
    }

    pub fn node_for(&self, identity: &DerivedId) -> Option<&TreeNode> {
        self.by_identity
            .get(identity)
            .and_then(|id| self.nodes.get(id))
    }

    pub fn root_for(&self, source: &SourceId) -> Option<&TreeNode> {
        self.roots.get(source).and_then(|id| self.nodes.get(id))
    }

    /// Roots in the order they were first created.
    pub fn roots(&self) -> Vec<&TreeNode> {
        self.root_order
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .collect()
    }

    pub fn children(&self, id: NodeId) -> Result<Vec<&TreeNode>, TreeError> {
        let node = self.nodes.get(&id).ok_or(TreeError::NodeNotFound(id))?;
        Ok(node
            .children
            .iter()
            .filter_map(|child| self.nodes.get(child))
            .collect())
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.roots.clear();
        self.root_order.clear();
        self.by_identity.clear();
    }

    /// 取得或建立來源的根節點。 / Returns the root for `source`, creating it on first use.
    pub fn ensure_root(&mut self, source: &SourceId) -> NodeId {
        if let Some(id) = self.roots.get(source) {
            return *id;
        }
        let id = self.allocate();
        self.nodes.insert(
            id,
            TreeNode {
                id,
                kind: NodeKind::Root,
                label: source.file_name().to_string(),
                chain: Chain::new(),
                source: source.clone(),
                identity: None,
                parent: None,
                children: Vec::new(),
                expandable: false,
            },
        );
        self.roots.insert(source.clone(), id);
        self.root_order.push(id);
        id
    }

    /// 在來源根節點下新增文件。 / Attaches a document directly under its source's root.
    pub fn add_root_chain(
        &mut self,
        identity: DerivedId,
        record: &ChainRecord,
    ) -> Result<NodeId, TreeError> {
        let root = self.ensure_root(&record.source_identity);
        self.attach(root, identity, record)
    }

    /// 在已知的父文件下新增子文件。 / Attaches a document under the document it was filtered from.
    pub fn add_sub_chain(
        &mut self,
        parent: &DerivedId,
        identity: DerivedId,
        record: &ChainRecord,
    ) -> Result<NodeId, TreeError> {
        let parent_id = *self
            .by_identity
            .get(parent)
            .ok_or_else(|| TreeError::UnknownIdentity(parent.clone()))?;
        self.attach(parent_id, identity, record)
    }

    /// 由扁平的紀錄重建整個森林。 / Rebuilds the whole forest from a flat record map.
    ///
    /// Records are grouped per source and sorted by chain length, so a
    /// candidate parent is always placed before its children. Each record
    /// goes under the record whose chain is its longest strict prefix, or
    /// under the source root when none is.
    pub fn rebuild<'a, I>(&mut self, records: I)
    where
        I: IntoIterator<Item = (&'a DerivedId, &'a ChainRecord)>,
    {
        self.clear();

        let mut groups: BTreeMap<&SourceId, Vec<(&DerivedId, &ChainRecord)>> = BTreeMap::new();
        for (identity, record) in records {
            groups
                .entry(&record.source_identity)
                .or_default()
                .push((identity, record));
        }

        for (source, mut entries) in groups {
            entries.sort_by_key(|(_, record)| record.chain.len());
            let root = self.ensure_root(source);
            for (identity, record) in &entries {
                let mut best: Option<(&DerivedId, usize)> = None;
                for (candidate, other) in &entries {
                    if !other.chain.is_strict_prefix_of(&record.chain) {
                        continue;
                    }
                    if best.map_or(true, |(_, len)| other.chain.len() > len) {
                        best = Some((*candidate, other.chain.len()));
                    }
                }
                let parent = best
                    .and_then(|(candidate, _)| self.by_identity.get(candidate).copied())
                    .unwrap_or(root);
                if let Err(err) = self.attach(parent, (*identity).clone(), record) {
                    warn!(%identity, %err, "record skipped during rebuild");
                }
            }
        }
        debug!(
            nodes = self.nodes.len(),
            roots = self.root_order.len(),
            "forest rebuilt"
        );
    }

    /// 移除節點及其所有子孫。 / Removes `id` and every descendant.
    ///
    /// Returns the identities of the removed chain nodes in pre-order so the
    /// caller can drop their records and content. A parent left without
    /// children becomes non-expandable; removing a root unregisters it.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Vec<DerivedId>, TreeError> {
        if !self.nodes.contains_key(&id) {
            return Err(TreeError::NodeNotFound(id));
        }
        let order = self.subtree(id);
        self.unlink(id);

        let mut removed = Vec::new();
        for node_id in order {
            if let Some(node) = self.nodes.remove(&node_id) {
                if let Some(identity) = node.identity {
                    self.by_identity.remove(&identity);
                    removed.push(identity);
                }
            }
        }
        debug!(node = %id, removed = removed.len(), "subtree removed");
        Ok(removed)
    }

    /// Removes a single chain node and lifts its children into its place.
    ///
    /// This leaves the same shape a rebuild would produce once the record is gone.
    pub fn splice_out(&mut self, identity: &DerivedId) -> Option<NodeId> {
        let id = self.by_identity.remove(identity)?;
        let node = self.nodes.remove(&id)?;
        let parent = node.parent?;
        for child in &node.children {
            if let Some(child_node) = self.nodes.get_mut(child) {
                child_node.parent = Some(parent);
            }
        }
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            match parent_node.children.iter().position(|child| *child == id) {
                Some(at) => {
                    parent_node
                        .children
                        .splice(at..at + 1, node.children.iter().copied());
                }
                None => parent_node.children.extend(node.children.iter().copied()),
            }
            parent_node.expandable = !parent_node.children.is_empty();
        }
        Some(id)
    }

    /// Parent/child edges keyed by identity (roots as `root:<source>`).
    ///
    /// Two forests with equal shapes hold the same relationships regardless of node ids.
    pub fn shape(&self) -> BTreeSet<(String, String)> {
        self.nodes
            .values()
            .filter_map(|node| {
                let parent = self.nodes.get(&node.parent?)?;
                Some((parent.shape_key(), node.shape_key()))
            })
            .collect()
    }

    /// Indented text rendering, one node per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for root in &self.root_order {
            self.render_node(*root, 0, &mut out);
        }
        out
    }

    fn render_node(&self, id: NodeId, depth: usize, out: &mut String) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        out.push_str(&"  ".repeat(depth));
        out.push_str(&node.label);
        if let Some(identity) = &node.identity {
            out.push_str("  ");
            out.push_str(identity.as_str());
        }
        out.push('\n');
        for child in &node.children {
            self.render_node(*child, depth + 1, out);
        }
    }

    fn allocate(&mut self) -> NodeId {
        self.next_id += 1;
        NodeId(self.next_id)
    }

    fn attach(
        &mut self,
        parent: NodeId,
        identity: DerivedId,
        record: &ChainRecord,
    ) -> Result<NodeId, TreeError> {
        if !self.nodes.contains_key(&parent) {
            return Err(TreeError::NodeNotFound(parent));
        }
        let label = chain_label(&record.chain);

        let node_id = match self.by_identity.get(&identity).copied() {
            Some(existing) if self.is_within(parent, existing) => {
                // Extending a document whose identity is already truncated:
                // the node keeps its place and takes the longer chain.
                let node = self
                    .nodes
                    .get_mut(&existing)
                    .ok_or(TreeError::NodeNotFound(existing))?;
                node.label = label;
                node.chain = record.chain.clone();
                node.source = record.source_identity.clone();
                return Ok(existing);
            }
            Some(existing) => {
                // Identity collision: the newer chain takes over the node.
                self.unlink(existing);
                let node = self
                    .nodes
                    .get_mut(&existing)
                    .ok_or(TreeError::NodeNotFound(existing))?;
                node.label = label;
                node.chain = record.chain.clone();
                node.source = record.source_identity.clone();
                node.parent = Some(parent);
                existing
            }
            None => {
                let id = self.allocate();
                self.nodes.insert(
                    id,
                    TreeNode {
                        id,
                        kind: NodeKind::Chain,
                        label,
                        chain: record.chain.clone(),
                        source: record.source_identity.clone(),
                        identity: Some(identity.clone()),
                        parent: Some(parent),
                        children: Vec::new(),
                        expandable: false,
                    },
                );
                self.by_identity.insert(identity, id);
                id
            }
        };

        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.push(node_id);
            parent_node.expandable = true;
        }
        Ok(node_id)
    }

    /// Detaches `id` from its parent's child list, or from the root registry.
    fn unlink(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        let (parent, source) = (node.parent, node.source.clone());
        match parent {
            Some(parent) => {
                if let Some(parent_node) = self.nodes.get_mut(&parent) {
                    parent_node.children.retain(|child| *child != id);
                    if parent_node.children.is_empty() {
                        parent_node.expandable = false;
                    }
                }
            }
            None => {
                self.roots.remove(&source);
                self.root_order.retain(|root| *root != id);
            }
        }
    }

    fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            order.push(current);
            if let Some(node) = self.nodes.get(&current) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        order
    }

    fn is_within(&self, candidate: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(candidate);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(&id).and_then(|node| node.parent);
        }
        false
    }
}

fn chain_label(chain: &Chain) -> String {
    chain.last().map(ToString::to_string).unwrap_or_default()
}
