#![doc = r"The render cycle driver: one dedicated worker turning queued
actions and interactions into mutation programs, one cycle at a time.

Producers (interaction call sites, background tasks) only ever enqueue;
the single worker applies the action, rebuilds the widget tree from the
resulting context, serializes it, ages the entity tree and publishes the
program. Publication is a rendezvous: the next cycle's output waits until
the consumer hands the previous buffer back, bounding memory to one live
program plus one in flight."]

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use weft_core::{
    release_pool, serialize, Action, CallFrame, Context, Coord, Env, EntityTree, IntentType, Op,
    Program, Widget, WorkItem,
};

/// Where the worker currently is in a cycle. Purely observational.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle = 0,
    ApplyingAction = 1,
    Building = 2,
    Serializing = 3,
    Publishing = 4,
}

impl Phase {
    fn from_code(code: u8) -> Phase {
        match code {
            1 => Phase::ApplyingAction,
            2 => Phase::Building,
            3 => Phase::Serializing,
            4 => Phase::Publishing,
            _ => Phase::Idle,
        }
    }
}

/// Policy for occasionally rebuilding even when an action declared itself a
/// no-op. A consistency safety valve: a view that only renders correctly
/// because no-ops are skipped is a broken view, and sampling surfaces that.
///
/// Forced rebuilds are externally observable (extra programs reach the
/// consumer), so the policy is explicit and off by default.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum RebuildSampling {
    #[default]
    Never,
    /// Roughly one forced rebuild per `n` declared no-ops.
    OneIn(u32),
}

impl RebuildSampling {
    fn pick(self) -> bool {
        match self {
            RebuildSampling::Never | RebuildSampling::OneIn(0) => false,
            RebuildSampling::OneIn(n) => rand::random::<u32>() % n == 0,
        }
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct EngineConfig {
    pub rebuild_sampling: RebuildSampling,
}

/// Handle to a running render engine.
///
/// The consumer side drives [`Engine::recv_program`] /
/// [`Engine::release_program`] in strict alternation; interactions arrive
/// through [`Engine::dispatch`] from any thread.
pub struct Engine {
    work_tx: mpsc::Sender<WorkItem>,
    program_rx: Option<mpsc::Receiver<Program>>,
    free_tx: Option<mpsc::Sender<Program>>,
    env: Arc<Env>,
    phase: Arc<AtomicU8>,
    generation: Arc<AtomicU64>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Engine {
    pub fn new(root: impl Widget + Send + 'static, config: EngineConfig) -> Engine {
        Engine::with_seed(root, config, Vec::new())
    }

    /// Starts an engine whose initial context was run through the seeding
    /// actions, then primes the loop so the first program renders the
    /// initial state.
    pub fn with_seed(
        root: impl Widget + Send + 'static,
        config: EngineConfig,
        seed: Vec<Action>,
    ) -> Engine {
        let (work_tx, work_rx) = mpsc::channel();
        let (program_tx, program_rx) = mpsc::sync_channel(0);
        let (free_tx, free_rx) = mpsc::channel();

        let env = Arc::new(Env::new(work_tx.clone()));
        let phase = Arc::new(AtomicU8::new(Phase::Idle as u8));
        let generation = Arc::new(AtomicU64::new(0));

        let mut ctx = Context::attached(Arc::clone(&env));
        for seed_action in seed {
            let seeded = seed_action(ctx.clone());
            if !seeded.is_no_action() {
                ctx = seeded;
            }
        }

        let worker = Worker {
            root: Box::new(root),
            tree: EntityTree::new(),
            ctx,
            generation: 0,
            buf: Program::new(),
            env: Arc::clone(&env),
            config,
            work_rx,
            program_tx,
            free_rx,
            phase: Arc::clone(&phase),
            shared_generation: Arc::clone(&generation),
        };
        let handle = thread::Builder::new()
            .name("weft-render".into())
            .spawn(move || worker.run())
            .expect("failed to spawn the render worker");

        let _ = work_tx.send(WorkItem::Action(Arc::new(|ctx| ctx)));

        Engine {
            work_tx,
            program_rx: Some(program_rx),
            free_tx: Some(free_tx),
            env,
            phase,
            generation,
            worker: Some(handle),
        }
    }

    /// Enqueues a state transform; a cycle will run for it in turn.
    pub fn enqueue(&self, action: Action) {
        let _ = self.work_tx.send(WorkItem::Action(action));
    }

    /// Hands a fired interaction to the worker. Staleness is judged against
    /// the generation current when the frame is processed, not when it was
    /// raised.
    pub fn dispatch(&self, frame: CallFrame) {
        let _ = self.work_tx.send(WorkItem::Intent(frame));
    }

    /// Blocks until the next mutation program. `None` once the engine has
    /// stopped.
    pub fn recv_program(&self) -> Option<Program> {
        self.program_rx.as_ref()?.recv().ok()
    }

    /// Like [`Engine::recv_program`] with an upper bound on the wait.
    pub fn recv_program_timeout(&self, timeout: Duration) -> Option<Program> {
        self.program_rx.as_ref()?.recv_timeout(timeout).ok()
    }

    /// Returns a consumed program buffer for reuse; the worker will not
    /// produce the next program before getting the previous buffer back.
    pub fn release_program(&self, program: Program) {
        if let Some(free) = &self.free_tx {
            let _ = free.send(program);
        }
    }

    /// Generation of the most recently completed cycle's output; frames
    /// raised against it must carry this stamp.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }

    pub fn phase(&self) -> Phase {
        Phase::from_code(self.phase.load(Ordering::Relaxed))
    }

    pub fn set_screen(&self, screen: Coord) {
        self.env.set_screen(screen);
    }

    pub fn set_cell_height(&self, height: i32) {
        self.env.set_cell_height(height);
    }

    /// Asks the worker to stop once in-flight work completes. The terminal
    /// intent goes through the same queue as everything else.
    pub fn shutdown(&self) {
        let _ = self.work_tx.send(WorkItem::Intent(CallFrame {
            intent: IntentType::Shutdown,
            ..CallFrame::default()
        }));
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
        // unblock a worker waiting to publish or waiting for its buffer back
        self.program_rx = None;
        self.free_tx = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

struct Worker {
    root: Box<dyn Widget + Send>,
    tree: EntityTree,
    ctx: Context,
    generation: u64,
    buf: Program,
    env: Arc<Env>,
    config: EngineConfig,
    work_rx: mpsc::Receiver<WorkItem>,
    program_tx: mpsc::SyncSender<Program>,
    free_rx: mpsc::Receiver<Program>,
    phase: Arc<AtomicU8>,
    shared_generation: Arc<AtomicU64>,
}

impl Worker {
    fn run(mut self) {
        while let Ok(item) = self.work_rx.recv() {
            let action = match item {
                WorkItem::Action(action) => action,
                WorkItem::Intent(frame) => {
                    if frame.intent == IntentType::Shutdown {
                        log::debug!("shutdown intent received; stopping the render loop");
                        break;
                    }
                    match self.resolve_intent(frame) {
                        Some(action) => action,
                        None => continue,
                    }
                }
            };

            if let Some(program) = self.turn_crank(action) {
                self.set_phase(Phase::Publishing);
                if self.program_tx.send(program).is_err() {
                    break;
                }
                match self.free_rx.recv() {
                    Ok(returned) => self.buf = returned,
                    Err(_) => break,
                }
            }

            // answered even when no program was produced
            self.env.finish_frame();
            self.set_phase(Phase::Idle);
        }
        self.set_phase(Phase::Idle);
    }

    /// Turns a fired interaction into the action of its nearest
    /// handler-bearing ancestor. `None` means the frame resolved to nothing:
    /// it was stale and dropped.
    fn resolve_intent(&mut self, frame: CallFrame) -> Option<Action> {
        if frame.generation != self.generation {
            log::debug!(
                "dropping stale {} intent for entity {} (generation {}, now {})",
                frame.intent,
                frame.entity,
                frame.generation,
                self.generation
            );
            return None;
        }

        let (entity, intent) = (frame.entity, frame.intent);
        self.env.begin_frame(frame);

        let handler = self
            .tree
            .ancestors_of(entity)
            .into_iter()
            .find_map(|record| record.handlers.as_ref().and_then(|h| h.get(intent).cloned()));

        Some(handler.unwrap_or_else(|| {
            log::debug!("no {intent} handler at or above entity {entity}");
            Arc::new(|_| Context::no_action())
        }))
    }

    fn turn_crank(&mut self, action: Action) -> Option<Program> {
        let mut trail = CycleTrail::new(self.generation);

        self.set_phase(Phase::ApplyingAction);
        trail.note("applying action");
        let applied = action(self.ctx.clone());

        let next = if applied.is_no_action() {
            if !self.config.rebuild_sampling.pick() {
                self.set_phase(Phase::Idle);
                return None;
            }
            log::debug!("rebuilding despite a declared no-op");
            trail.note("no-op action; rebuild forced by the sampling policy");
            self.ctx.clone()
        } else {
            applied
        };

        self.set_phase(Phase::Building);
        trail.note("building the widget tree");
        let root = self.root.build(&next);

        self.set_phase(Phase::Serializing);
        trail.note("serializing");
        let mut buf = std::mem::take(&mut self.buf);
        buf.clear();
        let mut program = serialize(root, &mut self.tree, self.env.counter(), buf);
        program.push(Op::Term, &[]);

        // The cycle is complete: only now may the previous generation be
        // touched. A panic anywhere above leaves it intact, so the failed
        // cycle's only external effect is the absence of a program.
        self.ctx = next;
        self.tree.age_generation();
        self.generation += 1;
        self.shared_generation
            .store(self.generation, Ordering::Relaxed);
        self.env.counter().reseed((self.generation & 1) as u32);
        release_pool();

        Some(program)
    }

    fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Relaxed);
    }
}

/// Breadcrumbs of the cycle in flight. Dropped silently when the cycle
/// completes; dumped through the log when it panics, so the wreckage names
/// the phase it happened in.
struct CycleTrail {
    generation: u64,
    notes: Vec<&'static str>,
}

impl CycleTrail {
    fn new(generation: u64) -> CycleTrail {
        CycleTrail {
            generation,
            notes: Vec::new(),
        }
    }

    fn note(&mut self, note: &'static str) {
        self.notes.push(note);
    }
}

impl Drop for CycleTrail {
    fn drop(&mut self) {
        if thread::panicking() {
            log::error!("render cycle {} aborted; trail:", self.generation);
            for note in &self.notes {
                log::error!("  {note}");
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/engine_tests.rs"]
mod engine_tests;
