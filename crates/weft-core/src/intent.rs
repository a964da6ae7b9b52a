use std::fmt;
use std::sync::mpsc;
use std::sync::Arc;

use crate::context::Context;
use crate::entity::Entity;

/// A state transform: applied to the current context, yields the context the
/// next view is built from. Returning [`Context::no_action`] suppresses the
/// rebuild.
pub type Action = Arc<dyn Fn(Context) -> Context + Send + Sync>;

/// Wraps a closure into an [`Action`].
pub fn action(f: impl Fn(Context) -> Context + Send + Sync + 'static) -> Action {
    Arc::new(f)
}

/// The ready-made no-op action.
pub fn do_nothing(_: Context) -> Context {
    Context::no_action()
}

/// The closed set of interaction codes the display side can raise.
///
/// `Shutdown` is the terminal sentinel and must stay the highest-valued code:
/// handler storage is sized by it.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum IntentType {
    #[default]
    None = 0,
    Click = 1,
    DoubleClick = 2,
    DragStart = 3,
    DragOver = 4,
    DragEnd = 5,
    Drop = 6,
    Escape = 7,
    Scroll = 8,
    Filter = 9,
    Change = 10,
    Blur = 11,
    ViewChange = 12,
    ManifestChange = 13,
    ShowDebugMenu = 14,
    CellSizeChange = 15,
    Submit = 16,
    Shutdown = 17,
}

impl IntentType {
    /// Number of handler slots; the shutdown sentinel has none.
    pub const SLOTS: usize = IntentType::Shutdown as usize;

    pub fn from_code(code: u8) -> Option<IntentType> {
        use IntentType::*;
        Some(match code {
            0 => None,
            1 => Click,
            2 => DoubleClick,
            3 => DragStart,
            4 => DragOver,
            5 => DragEnd,
            6 => Drop,
            7 => Escape,
            8 => Scroll,
            9 => Filter,
            10 => Change,
            11 => Blur,
            12 => ViewChange,
            13 => ManifestChange,
            14 => ShowDebugMenu,
            15 => CellSizeChange,
            16 => Submit,
            17 => Shutdown,
            _ => return Option::None,
        })
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for IntentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IntentType::None => "none",
            IntentType::Click => "click",
            IntentType::DoubleClick => "double-click",
            IntentType::DragStart => "drag-start",
            IntentType::DragOver => "drag-over",
            IntentType::DragEnd => "drag-end",
            IntentType::Drop => "drop",
            IntentType::Escape => "escape",
            IntentType::Scroll => "scroll",
            IntentType::Filter => "filter",
            IntentType::Change => "change",
            IntentType::Blur => "blur",
            IntentType::ViewChange => "view-change",
            IntentType::ManifestChange => "manifest-change",
            IntentType::ShowDebugMenu => "show-debug-menu",
            IntentType::CellSizeChange => "cell-size-change",
            IntentType::Submit => "submit",
            IntentType::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Per-intent handler set carried by a node, and later by the entity-tree
/// record owning it, so dispatch keeps working after the node pool is reset.
#[derive(Clone, Default)]
pub struct IntentHandlers([Option<Action>; IntentType::SLOTS]);

impl IntentHandlers {
    pub fn set(&mut self, intent: IntentType, handler: Action) {
        let slot = intent as usize;
        assert!(
            slot < IntentType::SLOTS,
            "the shutdown sentinel cannot carry a handler"
        );
        self.0[slot] = Some(handler);
    }

    pub fn get(&self, intent: IntentType) -> Option<&Action> {
        self.0.get(intent as usize).and_then(|h| h.as_ref())
    }

    pub fn any(&self) -> bool {
        self.0.iter().any(|h| h.is_some())
    }
}

impl fmt::Debug for IntentHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        for (i, h) in self.0.iter().enumerate() {
            if h.is_some() {
                set.entry(&IntentType::from_code(i as u8).unwrap());
            }
        }
        set.finish()
    }
}

/// Coordinate of an object in the viewport; x runs left to right, y top to
/// bottom.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

/// An opaque value the display side passes through a call frame; handlers
/// read registers and fill return registers without the engine interpreting
/// either.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Register {
    #[default]
    Empty,
    Text(String),
    Bytes(Vec<u8>),
}

impl Register {
    /// The textual payload, or the empty string for anything else.
    pub fn text(&self) -> &str {
        match self {
            Register::Text(s) => s,
            _ => "",
        }
    }
}

/// Everything the display side knows about one fired interaction.
///
/// The generation stamp is captured when the interaction is raised; the
/// driver compares it against the generation current at processing time and
/// silently drops frames from views that no longer exist.
#[derive(Clone, Default)]
pub struct CallFrame {
    pub entity: Entity,
    pub intent: IntentType,
    pub generation: u64,
    pub mouse: Coord,
    pub point: i32,
    pub modifiers: Modifiers,
    pub registers: [Register; 4],
    pub returns: [Register; 4],
    /// When present, the four return registers are answered over this
    /// channel once the cycle completes, whether or not a program was
    /// produced.
    pub reply: Option<mpsc::Sender<[Register; 4]>>,
}

impl fmt::Debug for CallFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallFrame")
            .field("entity", &self.entity)
            .field("intent", &self.intent)
            .field("generation", &self.generation)
            .field("mouse", &self.mouse)
            .field("point", &self.point)
            .field("modifiers", &self.modifiers)
            .field("reply", &self.reply.is_some())
            .finish()
    }
}

/// One unit of work for the cycle-processing worker. Producers only ever
/// enqueue; the single worker drains.
pub enum WorkItem {
    Action(Action),
    Intent(CallFrame),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in 0..=IntentType::Shutdown.code() {
            let intent = IntentType::from_code(code).expect("gap in the intent codes");
            assert_eq!(intent.code(), code);
        }
        assert_eq!(IntentType::from_code(IntentType::Shutdown.code() + 1), None);
    }

    #[test]
    fn shutdown_stays_the_highest_code() {
        for code in 0..IntentType::Shutdown.code() {
            assert!(IntentType::from_code(code).unwrap().code() < IntentType::Shutdown.code());
        }
        assert_eq!(IntentType::SLOTS, IntentType::Shutdown as usize);
    }

    #[test]
    #[should_panic(expected = "shutdown sentinel")]
    fn the_sentinel_carries_no_handler() {
        IntentHandlers::default().set(IntentType::Shutdown, Arc::new(|ctx| ctx));
    }

    #[test]
    fn handler_sets_know_whether_they_are_populated() {
        let mut handlers = IntentHandlers::default();
        assert!(!handlers.any());
        handlers.set(IntentType::Drop, Arc::new(|ctx| ctx));
        assert!(handlers.any());
        assert!(handlers.get(IntentType::Drop).is_some());
        assert!(handlers.get(IntentType::Click).is_none());
        assert!(handlers.get(IntentType::Shutdown).is_none());
    }
}
