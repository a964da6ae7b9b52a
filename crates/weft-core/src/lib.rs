#![doc = r"Core pieces of the weft rendering engine: the widget node tree,
the dual-generation entity tree, and the serializer compiling one into the
mutation program a display-side consumer replays.

Application code builds an immutable tree of nodes from current state; the
serializer turns that tree into a compact instruction stream describing how
the previously rendered tree must change, while entities preserve identity
across renders for elements that must persist (focus, drag state,
animations). Nothing here diffs trees: every cycle rebuilds the whole view,
and only entities explicitly marked for reuse are carried over."]

pub mod context;
pub mod entity;
pub mod etree;
pub mod intent;
pub mod node;
pub mod program;
pub mod serialize;

pub use context::{mutate, Context, Env};
pub use entity::{Counter, Entity, ENTITY_LIMIT};
pub use etree::{EntityRecord, EntityTree};
pub use intent::{
    action, do_nothing, Action, CallFrame, Coord, IntentHandlers, IntentType, Modifiers, Register,
    WorkItem,
};
pub use node::{build_widgets, release_pool, reuse_from, transparent, Attr, Node, Widget};
pub use program::{DecodeError, Decoder, Instr, Op, Program};
pub use serialize::{serialize, to_html};

#[cfg(test)]
#[path = "tests/etree_tests.rs"]
mod etree_tests;

#[cfg(test)]
#[path = "tests/node_tests.rs"]
mod node_tests;

#[cfg(test)]
#[path = "tests/program_tests.rs"]
mod program_tests;

#[cfg(test)]
#[path = "tests/serialize_tests.rs"]
mod serialize_tests;

#[cfg(test)]
#[path = "tests/context_tests.rs"]
mod context_tests;
