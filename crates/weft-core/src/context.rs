//! Context values carried down the build tree.
//!
//! A context is a cheap-clone handle over a type-indexed value store plus,
//! when attached to an engine, the environment of the cycle being processed
//! (entity minting, the live call frame, screen geometry, action enqueue).
//! The zero context is valid but only marginally useful: it cannot mint
//! entities or reach an engine.

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use rustc_hash::FxHashMap;

use crate::entity::{Counter, Entity};
use crate::intent::{Action, CallFrame, Coord, Modifiers, Register, WorkItem};

type ValueMap = FxHashMap<TypeId, Box<dyn Any + Send>>;

/// The shared value store behind a context.
///
/// One coarse lock protects the map. Two unsynchronized writers may each
/// observe the other's write to a different key (happens-after, not a full
/// happens-before order); callers needing stricter ordering should serialize
/// through the action queue instead.
#[derive(Default)]
struct ValueStore {
    kv: Mutex<ValueMap>,
}

/// Engine-side environment a context can be attached to: the entity counter
/// for the generation being built, the call frame of the interaction being
/// processed, viewport geometry, and the work queue.
pub struct Env {
    counter: Counter,
    work: mpsc::Sender<WorkItem>,
    frame: Mutex<CallFrame>,
    screen: Mutex<Coord>,
    cell_height: AtomicI32,
}

impl Env {
    pub fn new(work: mpsc::Sender<WorkItem>) -> Env {
        Env {
            counter: Counter::new(),
            work,
            frame: Mutex::new(CallFrame::default()),
            screen: Mutex::new(Coord::default()),
            cell_height: AtomicI32::new(0),
        }
    }

    pub fn counter(&self) -> &Counter {
        &self.counter
    }

    /// Installs the frame of the interaction about to be processed.
    pub fn begin_frame(&self, frame: CallFrame) {
        *self.frame.lock().expect("frame lock poisoned") = frame;
    }

    /// Answers the frame's reply channel with the return registers, if one
    /// was attached, and clears the frame for the next cycle.
    pub fn finish_frame(&self) {
        let mut frame = self.frame.lock().expect("frame lock poisoned");
        if let Some(reply) = frame.reply.take() {
            let _ = reply.send(std::mem::take(&mut frame.returns));
        }
        *frame = CallFrame::default();
    }

    pub fn set_screen(&self, screen: Coord) {
        *self.screen.lock().expect("screen lock poisoned") = screen;
    }

    pub fn set_cell_height(&self, height: i32) {
        self.cell_height.store(height, Ordering::Relaxed);
    }
}

/// Carries a set of values down the rendering tree, used by widgets to pass
/// state between rendering passes. Cloning is cheap and clones share the
/// same store.
#[derive(Clone, Default)]
pub struct Context {
    values: Option<Arc<ValueStore>>,
    env: Option<Arc<Env>>,
    no_action: bool,
}

impl Context {
    pub fn new() -> Context {
        Context {
            values: Some(Arc::new(ValueStore::default())),
            env: None,
            no_action: false,
        }
    }

    /// A context attached to an engine environment.
    pub fn attached(env: Arc<Env>) -> Context {
        Context {
            values: Some(Arc::new(ValueStore::default())),
            env: Some(env),
            no_action: false,
        }
    }

    /// The marker context an action returns to prevent a render cycle.
    ///
    /// Only useful as a performance optimisation when reacting to events;
    /// the engine may enforce honesty by occasionally rebuilding anyway, per
    /// its sampling policy.
    pub fn no_action() -> Context {
        Context {
            values: None,
            env: None,
            no_action: true,
        }
    }

    pub fn is_no_action(&self) -> bool {
        self.no_action
    }

    /// Stores a value under its type, overwriting any previous one.
    pub fn with_value<T: Send + 'static>(mut self, value: T) -> Context {
        let store = self
            .values
            .get_or_insert_with(|| Arc::new(ValueStore::default()));
        store
            .kv
            .lock()
            .expect("value store lock poisoned")
            .insert(TypeId::of::<T>(), Box::new(value));
        self
    }

    /// Reads the stored value of type `T`, or its default when absent.
    pub fn value_of<T: Clone + Default + Send + 'static>(&self) -> T {
        let Some(store) = &self.values else {
            return T::default();
        };
        let kv = store.kv.lock().expect("value store lock poisoned");
        match kv.get(&TypeId::of::<T>()) {
            Some(v) => v
                .downcast_ref::<T>()
                .expect("value stored under foreign type id")
                .clone(),
            None => T::default(),
        }
    }

    /// Applies a mutator to the stored value of type `T`, starting from the
    /// type's default when absent.
    pub fn update<T: Default + Send + 'static>(&self, f: impl FnOnce(&mut T)) {
        let Some(store) = &self.values else {
            // nothing can be stored on the no-action marker
            return;
        };
        let mut kv = store.kv.lock().expect("value store lock poisoned");
        let slot = kv
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(T::default()));
        f(slot
            .downcast_mut::<T>()
            .expect("value stored under foreign type id"));
    }

    /// Mints an entity from the engine's counter.
    ///
    /// Panics on a detached context: keys only mean something to an engine.
    pub fn mint_entity(&self) -> Entity {
        self.require_env().counter.mint()
    }

    /// Enqueues an action for the engine's worker. The send is fire and
    /// forget; a stopped engine drops it.
    pub fn enqueue(&self, action: Action) {
        if self.require_env().work.send(WorkItem::Action(action)).is_err() {
            log::debug!("action enqueued after engine shutdown; dropped");
        }
    }

    pub fn entity(&self) -> Entity {
        self.with_frame(|f| f.entity)
    }

    pub fn mouse(&self) -> Coord {
        self.with_frame(|f| f.mouse)
    }

    pub fn point(&self) -> i32 {
        self.with_frame(|f| f.point)
    }

    pub fn modifiers(&self) -> Modifiers {
        self.with_frame(|f| f.modifiers)
    }

    /// Reads one of the four opaque registers of the live call frame.
    pub fn register(&self, index: usize) -> Register {
        self.with_frame(|f| f.registers[index].clone())
    }

    /// Fills one of the four return registers answered to the display side
    /// when the cycle completes.
    pub fn set_reply(&self, index: usize, value: Register) {
        let env = self.require_env();
        env.frame.lock().expect("frame lock poisoned").returns[index] = value;
    }

    /// The value of the element an input-carrying intent fired on.
    /// Available on change and blur intents.
    pub fn read_input(&self) -> String {
        self.register(0).text().to_owned()
    }

    pub fn screen(&self) -> Coord {
        *self
            .require_env()
            .screen
            .lock()
            .expect("screen lock poisoned")
    }

    pub fn cell_height(&self) -> i32 {
        self.require_env().cell_height.load(Ordering::Relaxed)
    }

    fn with_frame<R>(&self, f: impl FnOnce(&CallFrame) -> R) -> R {
        f(&self
            .require_env()
            .frame
            .lock()
            .expect("frame lock poisoned"))
    }

    fn require_env(&self) -> &Env {
        self.env
            .as_deref()
            .expect("context is not attached to an engine")
    }
}

/// Builds an action applying a typed mutator to the context's stored value,
/// defaulting to the type's zero value if absent.
pub fn mutate<T: Default + Send + 'static>(
    f: impl Fn(&mut T) + Send + Sync + 'static,
) -> Action {
    Arc::new(move |ctx: Context| {
        ctx.update(|v: &mut T| f(v));
        ctx
    })
}
