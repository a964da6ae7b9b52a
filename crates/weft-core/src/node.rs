//! Widget-tree nodes and the per-cycle arena they live in.
//!
//! Nodes are handles into a thread-local pool of fixed-capacity chunks. The
//! pool is reset as a whole after each render cycle; a handle must never be
//! retained across [`release_pool`] — anything that needs to persist is
//! captured through the entity-reuse mechanism, not by holding onto a node.
//! Building and serializing happen on the one thread that owns the cycle, so
//! the pool needs no lock.

use std::cell::RefCell;
use std::fmt::Write as _;

use smallvec::SmallVec;

use crate::context::Context;
use crate::entity::Entity;
use crate::intent::{Action, IntentHandlers, IntentType};

/// A name/value attribute pair.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Attr {
    pub name: String,
    pub value: String,
}

/// The two synthetic control cases are a closed variant checked before the
/// generic element path; arbitrary element kinds stay a plain tag string.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Element,
    /// Structural no-op: contributes nothing itself, splices its children
    /// into the parent's child sequence.
    Transparent,
    /// Splices the previously rendered subtree of a named entity.
    Reuse,
}

impl NodeKind {
    fn from_tag(tag: &str) -> NodeKind {
        match tag {
            "transparent" => NodeKind::Transparent,
            "reuse" => NodeKind::Reuse,
            _ => NodeKind::Element,
        }
    }
}

pub(crate) struct NodeData {
    pub(crate) kind: NodeKind,
    pub(crate) tag: String,
    pub(crate) classes: String,
    pub(crate) text: String,
    pub(crate) entity: Entity,
    /// Source entity of a reuse node.
    pub(crate) old: Entity,
    pub(crate) attrs: Vec<Attr>,
    pub(crate) children: SmallVec<[Node; 8]>,
    pub(crate) handlers: Option<Box<IntentHandlers>>,
    /// Set while a serialization pass consumes the node; a second visit in
    /// the same pass means the tree has a structural cycle.
    pub(crate) visited: bool,
}

impl NodeData {
    fn empty() -> NodeData {
        NodeData {
            kind: NodeKind::Element,
            tag: String::new(),
            classes: String::new(),
            text: String::new(),
            entity: 0,
            old: 0,
            attrs: Vec::new(),
            children: SmallVec::new(),
            handlers: None,
            visited: false,
        }
    }

    /// Re-initializes a pooled slot, preserving already-allocated capacity.
    fn reset(&mut self, tag: &str) {
        self.kind = NodeKind::from_tag(tag);
        self.tag.clear();
        self.tag.push_str(tag);
        self.classes.clear();
        self.text.clear();
        self.entity = 0;
        self.old = 0;
        self.attrs.clear();
        self.children.clear();
        self.handlers = None;
        self.visited = false;
    }
}

const CHUNK: usize = 512;

pub(crate) struct NodePool {
    chunks: Vec<Vec<NodeData>>,
    spare: Vec<Vec<NodeData>>,
    len: usize,
}

impl NodePool {
    fn new() -> NodePool {
        NodePool {
            chunks: Vec::new(),
            spare: Vec::new(),
            len: 0,
        }
    }

    fn alloc(&mut self, tag: &str) -> Node {
        let id = self.len;
        assert!(id < u32::MAX as usize, "node pool exhausted");

        let (chunk_at, slot_at) = (id / CHUNK, id % CHUNK);
        if chunk_at == self.chunks.len() {
            let chunk = self
                .spare
                .pop()
                .unwrap_or_else(|| Vec::with_capacity(CHUNK));
            self.chunks.push(chunk);
        }
        let chunk = &mut self.chunks[chunk_at];
        if slot_at == chunk.len() {
            chunk.push(NodeData::empty());
        }
        chunk[slot_at].reset(tag);

        self.len += 1;
        Node(id as u32)
    }

    /// Resets occupancy without freeing backing storage: the first chunk
    /// stays hot, the rest move to the spare list for the next burst.
    fn release_all(&mut self) {
        let keep = self.chunks.len().min(1);
        let mut rest = self.chunks.split_off(keep);
        self.spare.append(&mut rest);
        self.len = 0;
    }

    pub(crate) fn get(&self, node: Node) -> &NodeData {
        let id = node.0 as usize;
        assert!(id < self.len, "node handle outlived its render cycle");
        &self.chunks[id / CHUNK][id % CHUNK]
    }

    pub(crate) fn get_mut(&mut self, node: Node) -> &mut NodeData {
        let id = node.0 as usize;
        assert!(id < self.len, "node handle outlived its render cycle");
        &mut self.chunks[id / CHUNK][id % CHUNK]
    }
}

thread_local! {
    static POOL: RefCell<NodePool> = RefCell::new(NodePool::new());
}

pub(crate) fn with_pool<R>(f: impl FnOnce(&mut NodePool) -> R) -> R {
    POOL.with(|pool| f(&mut pool.borrow_mut()))
}

/// De-allocates every node of the cycle at once. Chunk storage is kept for
/// the next cycle.
pub fn release_pool() {
    with_pool(NodePool::release_all);
}

/// A widget-tree node: a handle into the cycle's node pool.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Node(u32);

impl Node {
    /// Obtains a fresh node from the pool. The tags `"transparent"` and
    /// `"reuse"` name the two synthetic control nodes; everything else is a
    /// plain element.
    pub fn new(tag: &str) -> Node {
        with_pool(|pool| pool.alloc(tag))
    }

    pub fn set_text(self, text: &str) -> Node {
        with_pool(|pool| {
            let data = pool.get_mut(self);
            data.text.clear();
            data.text.push_str(text);
        });
        self
    }

    pub fn add_children(self, children: &[Node]) -> Node {
        with_pool(|pool| pool.get_mut(self).children.extend_from_slice(children));
        self
    }

    /// Sets a named attribute; a later write to the same name overwrites the
    /// earlier value.
    pub fn add_attr(self, name: &str, value: &str) -> Node {
        with_pool(|pool| {
            let data = pool.get_mut(self);
            for attr in &mut data.attrs {
                if attr.name == name {
                    attr.value.clear();
                    attr.value.push_str(value);
                    return;
                }
            }
            data.attrs.push(Attr {
                name: name.to_owned(),
                value: value.to_owned(),
            });
        });
        self
    }

    /// Value set for the attribute, or the empty string when unset.
    pub fn get_attr(self, name: &str) -> String {
        with_pool(|pool| {
            pool.get(self)
                .attrs
                .iter()
                .find(|a| a.name == name)
                .map(|a| a.value.clone())
                .unwrap_or_default()
        })
    }

    /// Emits an empty-valued attribute only when `set` holds; used for
    /// attributes such as a checkbox "checked" or a button "disabled".
    pub fn add_bool_attr(self, name: &str, set: bool) -> Node {
        if set {
            with_pool(|pool| {
                pool.get_mut(self).attrs.push(Attr {
                    name: name.to_owned(),
                    value: String::new(),
                })
            });
        }
        self
    }

    /// Appends class tokens. Classes already present are left alone; an
    /// empty list is a no-op.
    pub fn add_classes(self, classes: &[&str]) -> Node {
        let joined = classes.join(" ");
        if joined.is_empty() {
            return self;
        }
        with_pool(|pool| {
            let data = pool.get_mut(self);
            if !data.classes.is_empty() {
                data.classes.push(' ');
            }
            data.classes.push_str(&joined);
        });
        self
    }

    /// Sets the ARIA role, via the "role" property. Useful for reliable
    /// tests.
    pub fn add_role(self, role: &str) -> Node {
        // it's "role", not "aria-role"
        self.add_attr("role", role)
    }

    /// Attaches the action to the intent. When the intent later fires on
    /// this node's entity, the action runs against the then-current context
    /// and its result drives the next render.
    pub fn on_intent(self, intent: IntentType, handler: Action) -> Node {
        with_pool(|pool| {
            pool.get_mut(self)
                .handlers
                .get_or_insert_with(Default::default)
                .set(intent, handler);
        });
        self
    }

    /// Registers a typed state mutator as the handler for `intent`.
    pub fn react<T: Default + Send + 'static>(
        self,
        intent: IntentType,
        f: impl Fn(&mut T) + Send + Sync + 'static,
    ) -> Node {
        self.on_intent(intent, crate::context::mutate(f))
    }

    /// Marks the node for identity tracking by minting it an entity.
    pub fn give_key(self, ctx: &Context) -> Node {
        let entity = ctx.mint_entity();
        with_pool(|pool| pool.get_mut(self).entity = entity);
        self
    }

    /// The element id the display side will address this node by, minting an
    /// entity if none was requested yet. Usable in referencing attributes
    /// such as "for".
    pub fn element_id(self, ctx: &Context) -> String {
        let entity = with_pool(|pool| pool.get(self).entity);
        if entity != 0 {
            return entity.to_string();
        }
        self.give_key(ctx);
        with_pool(|pool| pool.get(self).entity).to_string()
    }

    pub fn entity(self) -> Entity {
        with_pool(|pool| pool.get(self).entity)
    }

    /// One-line debug form: tag, entity, classes and attributes.
    pub fn print_inline(self) -> String {
        with_pool(|pool| {
            let data = pool.get(self);
            format!(
                "{} entity='{}' class='{}' attrs='{:?}'",
                data.tag, data.entity, data.classes, data.attrs
            )
        })
    }

    /// Debug dump of every entity-bearing node in the subtree. Run on the
    /// root to see all entities.
    pub fn print_entity_tree(self) -> String {
        let mut out = String::new();
        with_pool(|pool| print_entity_tree_rec(pool, self, &mut out, 0));
        out
    }
}

fn print_entity_tree_rec(pool: &NodePool, node: Node, out: &mut String, level: usize) {
    let data = pool.get(node);
    for _ in 0..level {
        out.push('\t');
    }
    out.push_str("| ");
    if data.entity != 0 {
        let _ = writeln!(
            out,
            "{} entity='{}' class='{}' attrs='{:?}'",
            data.tag, data.entity, data.classes, data.attrs
        );
    } else {
        out.push_str("non-entity-node\n");
    }
    let count = data.children.len();
    for i in 0..count {
        let child = pool.get(node).children[i];
        print_entity_tree_rec(pool, child, out, level + 1);
    }
}

/// A node that does not appear in the displayed tree: its children become
/// children of its parent. Useful to keep conditionals regular:
///
/// ```
/// # use weft_core::{transparent, Node};
/// # let threshold = 1;
/// # let val = 0;
/// let mut x = transparent(&[]);
/// if val > threshold {
///     x = Node::new("div").add_classes(&["alert"]);
/// }
/// ```
pub fn transparent(children: &[Node]) -> Node {
    Node::new("transparent").add_children(children)
}

/// A node splicing the previously rendered subtree of `old`, unmodified,
/// into the new tree at this position. The splice keeps a live identity by
/// renaming the subtree onto a freshly minted entity.
pub fn reuse_from(ctx: &Context, old: Entity) -> Node {
    let node = Node::new("reuse").give_key(ctx);
    with_pool(|pool| pool.get_mut(node).old = old);
    node
}

/// Anything that can render itself into a node tree.
pub trait Widget {
    fn build(&self, ctx: &Context) -> Node;
}

/// A node is a widget that is self.
impl Widget for Node {
    fn build(&self, _: &Context) -> Node {
        *self
    }
}

/// The simplest form of a widget: a plain build function, without state.
impl<F: Fn(&Context) -> Node> Widget for F {
    fn build(&self, ctx: &Context) -> Node {
        self(ctx)
    }
}

/// Renders each widget in turn into a slice of nodes.
pub fn build_widgets(ctx: &Context, widgets: &[&dyn Widget]) -> Vec<Node> {
    widgets.iter().map(|w| w.build(ctx)).collect()
}
