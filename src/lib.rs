//! # dnart
//!
//! An in-memory, ordered index over DNS domain names, built on an Adaptive
//! Radix Tree whose node layouts are specialized for domain-name data.
//!
//! ## Features
//!
//! - **O(k) operations**: lookup and insert walk at most one node per key
//!   byte, with path compression over single-child runs
//! - **Canonical order**: keys are a transformation of wire-format names
//!   under which bytewise comparison equals canonical DNS order, so ordered
//!   and prefix enumeration come for free
//! - **Adaptive layouts**: six node shapes (4/16/32/38/48/256) adapt to
//!   population, including a 38-slot shape sized to the hostname alphabet
//!   and SIMD-scanned 16/32-wide shapes
//! - **Reusable cursors**: both walks record the traversed path, so a failed
//!   lookup can be resumed as an insert without rewalking
//!
//! ## Example
//!
//! ```rust
//! use bytes::Bytes;
//! use dnart::{make_key, wire, DnameArt};
//!
//! let mut tree = DnameArt::new();
//!
//! let key = make_key(&wire::parse("www.example.com.").unwrap()).unwrap();
//! tree.insert(&key, Bytes::from_static(b"v=1")).unwrap();
//!
//! // Lookups are case-insensitive: the codec folds case before comparing.
//! let upper = make_key(&wire::parse("WWW.EXAMPLE.COM.").unwrap()).unwrap();
//! assert_eq!(tree.lookup(&upper), Some(&Bytes::from_static(b"v=1")));
//! ```

mod key;
mod node;
mod path;
mod prefix;
#[cfg(test)]
mod proptests;
mod scan;
pub mod wire;

use bytes::Bytes;
use log::trace;
use slab::Slab;
use smallvec::SmallVec;

pub use crate::key::{Key, MAX_KEY, MAX_LABEL, make_key, unmake_key};
pub use crate::node::KidsKind;
pub use crate::path::{MAX_PATH, Path, PathEntry};

use crate::node::{Kids, Kids4, Node, NodeId};
use crate::prefix::{MAX_PREFIX, Prefix};

/// Result kinds surfaced by the tree and the key codec.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The key is not present; the cursor records the deepest matched node.
    #[error("name not present in the tree")]
    NotFound,
    /// The node arena is out of space; the tree is unchanged.
    #[error("node arena is out of space")]
    NoMemory,
    /// The input is not a legal wire-format domain name.
    #[error("malformed wire-format domain name")]
    BadParameter,
}

/// Per-layout node population, as reported by [`DnameArt::stats`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub node4: usize,
    pub node16: usize,
    pub node32: usize,
    pub node38: usize,
    pub node48: usize,
    pub node256: usize,
    pub leaves: usize,
    pub max_height: usize,
}

/// An adaptive radix tree keyed by transformed domain names.
///
/// Nodes and leaves live in one arena; every link between them is an arena
/// id. A node that outgrows its layout is rewritten in place under the same
/// id, so parents and cursors never need fixing up, and the write that links
/// a freshly built subtree is always a single store.
///
/// # Example
///
/// ```rust
/// use bytes::Bytes;
/// use dnart::{make_key, wire, DnameArt};
///
/// let mut tree = DnameArt::new();
/// let key = make_key(&wire::parse("example.com.").unwrap()).unwrap();
///
/// tree.insert(&key, Bytes::from_static(b"value")).unwrap();
/// assert_eq!(tree.lookup(&key), Some(&Bytes::from_static(b"value")));
/// ```
pub struct DnameArt {
    nodes: Slab<Node>,
    root: NodeId,
    node_limit: usize,
    leaves: usize,
}

impl Default for DnameArt {
    fn default() -> Self {
        Self::new()
    }
}

impl DnameArt {
    /// Creates an empty tree with no arena limit.
    pub fn new() -> Self {
        Self::with_node_limit(usize::MAX)
    }

    /// Creates an empty tree whose arena holds at most `node_limit` entries
    /// (leaves and inner nodes, the root included). Once the limit is
    /// reached, [`make_path`](Self::make_path) reports [`Error::NoMemory`]
    /// and leaves the tree untouched.
    pub fn with_node_limit(node_limit: usize) -> Self {
        assert!(node_limit >= 1, "the arena must at least hold the root");
        let mut nodes = Slab::with_capacity(node_limit.min(1024));
        let root =
            nodes.insert(Node::inner(Prefix::default(), Kids::K4(Kids4::default()))) as NodeId;
        Self {
            nodes,
            root,
            node_limit,
            leaves: 0,
        }
    }

    /// Number of stored names.
    pub fn len(&self) -> usize {
        self.leaves
    }

    pub fn is_empty(&self) -> bool {
        self.leaves == 0
    }

    fn node(&self, id: NodeId) -> &Node {
        self.nodes.get(id as usize).expect("arena id on a live path")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes
            .get_mut(id as usize)
            .expect("arena id on a live path")
    }

    fn try_alloc(&mut self, node: Node) -> Result<NodeId, Error> {
        if self.nodes.len() >= self.node_limit {
            return Err(Error::NoMemory);
        }
        Ok(self.nodes.insert(node) as NodeId)
    }

    /// Allocates one arena entry of a multi-entry splice. On failure every
    /// id in `scratch` is released, which keeps a half-built chain from ever
    /// touching the tree.
    fn alloc_tracked(
        &mut self,
        node: Node,
        scratch: &mut SmallVec<[NodeId; 4]>,
    ) -> Result<NodeId, Error> {
        match self.try_alloc(node) {
            Ok(id) => {
                scratch.push(id);
                Ok(id)
            }
            Err(e) => {
                for &id in scratch.iter() {
                    self.nodes.remove(id as usize);
                }
                Err(e)
            }
        }
    }
}

impl DnameArt {
    /// Walks toward `key`, recording every entered node on `path`.
    ///
    /// On success the top of `path` is the leaf holding `key`. On
    /// [`Error::NotFound`] the cursor records the deepest matched node: a
    /// mismatching leaf or a mismatching compressed prefix is popped, while
    /// an absent child leaves the cursor on the parent it was missing from.
    ///
    /// An empty cursor starts from the root; a pre-populated cursor resumes
    /// from its top entry, which makes `find_path` followed by
    /// [`make_path`](Self::make_path) on the same cursor share the walk.
    pub fn find_path(&self, path: &mut Path, key: &Key) -> Result<(), Error> {
        assert!(!key.is_empty(), "keys are never empty");
        if path.is_empty() {
            path.push(0, self.root);
        }
        let mut depth = path.resume_depth();
        loop {
            let entry = path.top().expect("cursor holds at least the root entry");
            match self.node(entry.node) {
                Node::Leaf(leaf) => {
                    if leaf.key.as_bytes() == key.as_bytes() {
                        return Ok(());
                    }
                    path.pop();
                    return Err(Error::NotFound);
                }
                Node::Inner(inner) => {
                    if !inner.prefix.is_empty() {
                        let rest = key.get(depth..).unwrap_or(&[]);
                        let matched = inner.prefix.common_len(rest);
                        if matched < inner.prefix.len() {
                            path.pop();
                            return Err(Error::NotFound);
                        }
                        depth += matched;
                    }
                    if depth >= key.len() {
                        // Codec keys are prefix-free and always end on a
                        // leaf; only a foreign key can exhaust here.
                        return Err(Error::NotFound);
                    }
                    match inner.kids.find(key[depth]) {
                        None => return Err(Error::NotFound),
                        Some(child) => {
                            path.push(depth, child);
                            depth += 1;
                        }
                    }
                }
            }
        }
    }

    /// Walks toward `key` like [`find_path`](Self::find_path), materializing
    /// whatever the walk is missing, so that on success the top of `path` is
    /// the leaf for `key`, pre-existing or freshly created with an unset
    /// value.
    ///
    /// Inserting a key that is already present returns `Ok` and leaves its
    /// value untouched. On [`Error::NoMemory`] the tree is observably
    /// unchanged: splices allocate every arena entry up front and release
    /// them all if any allocation fails.
    pub fn make_path(&mut self, path: &mut Path, key: &Key) -> Result<(), Error> {
        assert!(!key.is_empty(), "keys are never empty");
        if path.is_empty() {
            path.push(0, self.root);
        }
        let mut depth = path.resume_depth();
        loop {
            let entry = path.top().expect("cursor holds at least the root entry");
            let at = entry.node;
            let step = match self.node(at) {
                Node::Leaf(leaf) => {
                    if leaf.key.as_bytes() == key.as_bytes() {
                        Step::Done
                    } else {
                        Step::SplitLeaf
                    }
                }
                Node::Inner(inner) => {
                    let rest = key.get(depth..).unwrap_or(&[]);
                    let matched = inner.prefix.common_len(rest);
                    if matched < inner.prefix.len() {
                        Step::SplitPrefix { matched }
                    } else {
                        let branch_at = depth + matched;
                        assert!(branch_at < key.len(), "key exhausted inside the tree");
                        match inner.kids.find(key[branch_at]) {
                            Some(child) => Step::Descend { child, branch_at },
                            None => Step::AddLeaf { branch_at },
                        }
                    }
                }
            };
            match step {
                Step::Done => return Ok(()),
                Step::Descend { child, branch_at } => {
                    path.push(branch_at, child);
                    depth = branch_at + 1;
                }
                Step::AddLeaf { branch_at } => return self.add_leaf(path, key, branch_at, at),
                Step::SplitLeaf => return self.split_leaf(path, key, depth, at),
                Step::SplitPrefix { matched } => {
                    return self.split_prefix(path, key, depth, matched, at);
                }
            }
        }
    }

    /// Divergence on an absent child: attach a fresh leaf, growing the node
    /// in place when its layout has no room for the branch byte.
    fn add_leaf(
        &mut self,
        path: &mut Path,
        key: &Key,
        branch_at: usize,
        at: NodeId,
    ) -> Result<(), Error> {
        let leaf = self.try_alloc(Node::leaf(key.clone()))?;
        let Node::Inner(inner) = self.node_mut(at) else {
            unreachable!("branch steps only run on inner nodes")
        };
        inner.kids.add(key[branch_at], leaf);
        self.leaves += 1;
        path.push(branch_at, leaf);
        Ok(())
    }

    /// Divergence on a leaf with a different key: replace the leaf's arena
    /// entry with a chain of prefixed nodes covering the shared run, branch
    /// at the first differing byte, and hang the relocated old leaf and the
    /// new leaf there.
    fn split_leaf(
        &mut self,
        path: &mut Path,
        key: &Key,
        depth: usize,
        at: NodeId,
    ) -> Result<(), Error> {
        let (old_branch, cnt) = {
            let Node::Leaf(leaf) = self.node(at) else {
                unreachable!("split_leaf runs on a leaf entry")
            };
            let cnt = common_len(key, &leaf.key);
            debug_assert!(cnt >= depth && cnt < leaf.key.len());
            (leaf.key[cnt], cnt)
        };
        debug_assert!(cnt < key.len());

        // Segment the shared run [depth, cnt): each chain node carries up to
        // MAX_PREFIX bytes in line and consumes one branch byte.
        let mut segs: SmallVec<[(usize, usize); 4]> = SmallVec::new();
        let mut pos = depth;
        while cnt - pos > MAX_PREFIX {
            segs.push((pos, pos + MAX_PREFIX));
            pos += MAX_PREFIX + 1;
        }
        segs.push((pos, cnt));

        // Allocate every id before touching the tree.
        let mut scratch: SmallVec<[NodeId; 4]> = SmallVec::new();
        let new_leaf = self.alloc_tracked(Node::leaf(key.clone()), &mut scratch)?;
        let moved = self.alloc_tracked(Node::placeholder(), &mut scratch)?;
        let mut chain: SmallVec<[NodeId; 4]> = SmallVec::new();
        chain.push(at);
        for _ in 1..segs.len() {
            chain.push(self.alloc_tracked(Node::placeholder(), &mut scratch)?);
        }

        // Fill deepest-first; the head goes into the old leaf's id last,
        // which is the single store that links the chain in.
        for i in (0..segs.len()).rev() {
            let (start, end) = segs[i];
            let kids = if i + 1 < segs.len() {
                Kids4::single(key[end], chain[i + 1])
            } else {
                Kids4::pair(old_branch, moved, key[cnt], new_leaf)
            };
            let filled = Node::inner(Prefix::new(&key[start..end]), Kids::K4(kids));
            if i == 0 {
                let old = std::mem::replace(self.node_mut(at), filled);
                *self.node_mut(moved) = old;
            } else {
                *self.node_mut(chain[i]) = filled;
            }
        }
        self.leaves += 1;
        trace!(
            "leaf split into {}-node chain at key offset {}",
            segs.len(),
            depth
        );

        for i in 1..segs.len() {
            path.push(segs[i - 1].1, chain[i]);
        }
        path.push(cnt, new_leaf);
        Ok(())
    }

    /// Divergence inside a compressed prefix: the node keeps its id but
    /// becomes a two-child node over the shared head of the run; the
    /// original node moves to a fresh id with its prefix truncated past the
    /// split byte.
    fn split_prefix(
        &mut self,
        path: &mut Path,
        key: &Key,
        depth: usize,
        matched: usize,
        at: NodeId,
    ) -> Result<(), Error> {
        let (shared, split_byte) = {
            let Node::Inner(inner) = self.node(at) else {
                unreachable!("split_prefix runs on an inner entry")
            };
            (
                Prefix::new(&inner.prefix.as_slice()[..matched]),
                inner.prefix[matched],
            )
        };
        let branch_at = depth + matched;
        assert!(branch_at < key.len(), "key exhausted inside the tree");

        let mut scratch: SmallVec<[NodeId; 4]> = SmallVec::new();
        let new_leaf = self.alloc_tracked(Node::leaf(key.clone()), &mut scratch)?;
        let moved = self.alloc_tracked(Node::placeholder(), &mut scratch)?;

        let kids = Kids4::pair(split_byte, moved, key[branch_at], new_leaf);
        let replacement = Node::inner(shared, Kids::K4(kids));
        let mut old = std::mem::replace(self.node_mut(at), replacement);
        let Node::Inner(orig) = &mut old else {
            unreachable!("split_prefix runs on an inner entry")
        };
        orig.prefix.truncate_front(matched + 1);
        *self.node_mut(moved) = old;
        self.leaves += 1;
        trace!("prefix split at key offset {depth} ({matched} shared bytes)");

        path.push(branch_at, new_leaf);
        Ok(())
    }
}

impl DnameArt {
    /// Value stored at a cursor entry, if the entry is a leaf with one set.
    pub fn value(&self, entry: PathEntry) -> Option<&Bytes> {
        match self.nodes.get(entry.node as usize)? {
            Node::Leaf(leaf) => leaf.val.as_ref(),
            Node::Inner(_) => None,
        }
    }

    /// Replaces the value at a leaf entry, returning the previous one.
    /// Ignored (returns `None`) when the entry is not a leaf.
    pub fn set_value(&mut self, entry: PathEntry, val: Bytes) -> Option<Bytes> {
        match self.nodes.get_mut(entry.node as usize)? {
            Node::Leaf(leaf) => leaf.val.replace(val),
            Node::Inner(_) => None,
        }
    }

    /// Key stored at a cursor entry, if the entry is a leaf.
    pub fn leaf_key(&self, entry: PathEntry) -> Option<&Key> {
        match self.nodes.get(entry.node as usize)? {
            Node::Leaf(leaf) => Some(&leaf.key),
            Node::Inner(_) => None,
        }
    }

    /// Inserts `key`, setting its value and returning the previous one.
    pub fn insert(&mut self, key: &Key, val: Bytes) -> Result<Option<Bytes>, Error> {
        let mut path = Path::new();
        self.make_path(&mut path, key)?;
        let top = path.top().expect("make_path tops the cursor with a leaf");
        Ok(self.set_value(top, val))
    }

    /// Value stored for `key`, if present and set.
    pub fn lookup(&self, key: &Key) -> Option<&Bytes> {
        let mut path = Path::new();
        self.find_path(&mut path, key).ok()?;
        self.value(path.top()?)
    }

    /// Visits every stored name in canonical order.
    pub fn walk<F: FnMut(&Key, Option<&Bytes>)>(&self, mut f: F) {
        self.visit(self.root, &mut f);
    }

    /// Visits, in canonical order, every stored name whose key starts with
    /// `prefix` (transformed bytes, e.g. a zone key without its terminator).
    pub fn walk_prefix<F: FnMut(&Key, Option<&Bytes>)>(&self, prefix: &[u8], mut f: F) {
        if prefix.is_empty() {
            return self.walk(f);
        }
        let mut id = self.root;
        let mut depth = 0usize;
        loop {
            match self.node(id) {
                Node::Leaf(leaf) => {
                    if leaf.key.starts_with(prefix) {
                        f(&leaf.key, leaf.val.as_ref());
                    }
                    return;
                }
                Node::Inner(inner) => {
                    let rest = &prefix[depth..];
                    let matched = inner.prefix.common_len(rest);
                    if matched == rest.len() {
                        // The query ends inside this node's run; everything
                        // below shares it.
                        return self.visit(id, &mut f);
                    }
                    if matched < inner.prefix.len() {
                        return;
                    }
                    let branch_at = depth + matched;
                    let Some(child) = inner.kids.find(prefix[branch_at]) else {
                        return;
                    };
                    if branch_at + 1 == prefix.len() {
                        return self.visit(child, &mut f);
                    }
                    id = child;
                    depth = branch_at + 1;
                }
            }
        }
    }

    fn visit(&self, id: NodeId, f: &mut impl FnMut(&Key, Option<&Bytes>)) {
        match self.node(id) {
            Node::Leaf(leaf) => f(&leaf.key, leaf.val.as_ref()),
            Node::Inner(inner) => inner.kids.for_each(|_, child| self.visit(child, &mut *f)),
        }
    }

    /// Node-family population and height of the tree.
    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats::default();
        self.stat_visit(self.root, 1, &mut stats);
        stats
    }

    fn stat_visit(&self, id: NodeId, height: usize, stats: &mut TreeStats) {
        stats.max_height = stats.max_height.max(height);
        match self.node(id) {
            Node::Leaf(_) => stats.leaves += 1,
            Node::Inner(inner) => {
                match inner.kids.kind() {
                    KidsKind::Node4 => stats.node4 += 1,
                    KidsKind::Node16 => stats.node16 += 1,
                    KidsKind::Node32 => stats.node32 += 1,
                    KidsKind::Node38 => stats.node38 += 1,
                    KidsKind::Node48 => stats.node48 += 1,
                    KidsKind::Node256 => stats.node256 += 1,
                }
                inner
                    .kids
                    .for_each(|_, child| self.stat_visit(child, height + 1, &mut *stats));
            }
        }
    }
}

enum Step {
    Done,
    Descend { child: NodeId, branch_at: usize },
    AddLeaf { branch_at: usize },
    SplitLeaf,
    SplitPrefix { matched: usize },
}

fn common_len(a: &[u8], b: &[u8]) -> usize {
    let max = a.len().min(b.len());
    for i in 0..max {
        if a[i] != b[i] {
            return i;
        }
    }
    max
}
