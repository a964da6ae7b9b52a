//! The preorder compiler from a node tree to a mutation program.

use crate::entity::Counter;
use crate::etree::EntityTree;
use crate::node::{with_pool, Node, NodeKind, NodePool};
use crate::program::{Op, Program};

/// Walks the node tree in preorder, recording entities in the entity tree
/// and emitting the mutation program the display side replays.
///
/// The program buffer is taken and returned so callers can recycle it across
/// cycles. The caller appends [`Op::Term`] once the full walk — possibly
/// over several roots — is done.
///
/// Panics on structural violations: a node visited twice in one pass (the
/// tree must be acyclic; sharing a node instance across positions is
/// forbidden), or an element with an empty tag name.
pub fn serialize(
    node: Node,
    tree: &mut EntityTree,
    counter: &Counter,
    mut program: Program,
) -> Program {
    with_pool(|pool| serialize_node(pool, node, tree, counter, &mut program));
    program
}

fn serialize_node(
    pool: &mut NodePool,
    node: Node,
    tree: &mut EntityTree,
    counter: &Counter,
    program: &mut Program,
) {
    let kind = {
        let data = pool.get_mut(node);
        assert!(!data.visited, "cycle detected in node tree at <{}>", data.tag);
        data.visited = true;
        data.kind
    };

    match kind {
        NodeKind::Transparent => {
            let count = pool.get(node).children.len();
            for i in 0..count {
                let child = pool.get(node).children[i];
                serialize_node(pool, child, tree, counter, program);
            }
            return;
        }
        NodeKind::Reuse => {
            // The splice ports the old subtree into the new generation; the
            // renames keep handlers firing on the correct elements.
            let (old, target) = {
                let data = pool.get(node);
                (data.old, data.entity)
            };
            assert!(old != 0, "reuse node does not name a source entity");
            program.push(Op::Reuse, &[&old.to_string()]);
            tree.reuse(old, target, counter, |from, to| {
                program.push(Op::ReassignId, &[&from.to_string(), &to.to_string()]);
            });
            return;
        }
        NodeKind::Element => {}
    }

    let (child_count, scope) = {
        let data = pool.get_mut(node);
        assert!(!data.tag.is_empty(), "empty tag name");

        program.push(Op::CreateElement, &[&data.tag]);
        if !data.classes.is_empty() {
            program.push(Op::SetClass, &[&data.classes]);
        }

        if data.entity == 0 && data.handlers.is_some() {
            // courtesy: handlers must always be addressable
            data.entity = counter.mint();
        }

        let mut scope = None;
        if data.entity != 0 {
            let index = tree.add(data.entity);
            if let Some(handlers) = &data.handlers {
                tree.attach_handlers((**handlers).clone());
            }
            program.push(Op::SetId, &[&data.entity.to_string()]);
            scope = Some(index);
        }

        for attr in &data.attrs {
            program.push(Op::SetAttr, &[&attr.name, &attr.value]);
        }
        if !data.text.is_empty() {
            program.push(Op::AddText, &[&data.text]);
        }

        (data.children.len(), scope)
    };

    for i in 0..child_count {
        let child = pool.get(node).children[i];
        serialize_node(pool, child, tree, counter, program);
    }

    if let Some(index) = scope {
        tree.close_scope(index);
    }
    program.push(Op::Next, &[]);
}

/// Renders the subtree as a self-contained markup string, for server-side
/// export. No identities are allocated and no callbacks can be attached;
/// the same cycle check applies, and the tree counts as consumed.
pub fn to_html(node: Node) -> String {
    let mut out = String::new();
    with_pool(|pool| html_node(pool, node, &mut out));
    out
}

fn html_node(pool: &mut NodePool, node: Node, out: &mut String) {
    let child_count = {
        let data = pool.get_mut(node);
        assert!(!data.visited, "cycle detected in node tree at <{}>", data.tag);
        data.visited = true;

        out.push('<');
        out.push_str(&data.tag);
        if !data.classes.is_empty() {
            out.push_str(" class=\"");
            out.push_str(&data.classes);
            out.push('"');
        }
        for attr in &data.attrs {
            out.push(' ');
            out.push_str(&attr.name);
            out.push_str("=\"");
            out.push_str(&attr.value);
            out.push('"');
        }
        out.push('>');
        out.push_str(&data.text);

        data.children.len()
    };

    for i in 0..child_count {
        let child = pool.get(node).children[i];
        html_node(pool, child, out);
    }

    let data = pool.get(node);
    out.push_str("</");
    out.push_str(&data.tag);
    out.push('>');
}

impl Node {
    /// See [`to_html`].
    pub fn to_html(self) -> String {
        to_html(self)
    }
}
