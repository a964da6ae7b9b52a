use std::time::Duration;

use weft_core::{
    action, mutate, reuse_from, CallFrame, Context, Entity, IntentType, Node, Op, Program,
    Register,
};

use super::*;

const TICK: Duration = Duration::from_millis(300);

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Count(i64);

#[derive(Clone, Copy, Debug, Default)]
struct Kept(Entity);

fn ops_of(program: &Program) -> Vec<(Op, Vec<String>)> {
    program
        .decode()
        .map(|instr| {
            let instr = instr.expect("malformed program");
            (
                instr.op,
                instr.operands.iter().map(|s| s.to_string()).collect(),
            )
        })
        .collect()
}

fn first_operand(program: &Program, op: Op) -> Option<String> {
    ops_of(program)
        .into_iter()
        .find(|(o, _)| *o == op)
        .map(|(_, operands)| operands[0].clone())
}

fn counter_view(ctx: &Context) -> Node {
    let count = ctx.value_of::<Count>();
    Node::new("div").add_children(&[
        Node::new("span").set_text(&count.0.to_string()),
        Node::new("button")
            .set_text("+1")
            .react(IntentType::Click, |c: &mut Count| c.0 += 1),
    ])
}

fn click(entity: Entity, generation: u64) -> CallFrame {
    CallFrame {
        entity,
        intent: IntentType::Click,
        generation,
        ..CallFrame::default()
    }
}

#[test]
fn priming_renders_the_initial_state() {
    let engine = Engine::new(counter_view, EngineConfig::default());
    let program = engine.recv_program().expect("priming program");

    assert_eq!(first_operand(&program, Op::AddText).as_deref(), Some("0"));
    assert_eq!(engine.generation(), 1);

    let decoded = ops_of(&program);
    assert_eq!(decoded.last().unwrap().0, Op::Term);
    engine.release_program(program);
}

#[test]
fn a_click_runs_the_handler_and_rerenders() {
    let engine = Engine::new(counter_view, EngineConfig::default());
    let program = engine.recv_program().unwrap();
    let button: Entity = first_operand(&program, Op::SetId).unwrap().parse().unwrap();
    engine.release_program(program);

    engine.dispatch(click(button, engine.generation()));
    let program = engine.recv_program().unwrap();
    assert_eq!(first_operand(&program, Op::AddText).as_deref(), Some("1"));
    engine.release_program(program);
}

#[test]
fn stale_frames_are_dropped_without_effect() {
    let engine = Engine::new(counter_view, EngineConfig::default());
    let program = engine.recv_program().unwrap();
    let button: Entity = first_operand(&program, Op::SetId).unwrap().parse().unwrap();
    engine.release_program(program);

    // raised against a generation that no longer exists
    engine.dispatch(click(button, engine.generation() - 1));
    assert!(engine.recv_program_timeout(TICK).is_none());

    // the counter was not touched: the next real click renders 1, not 2
    engine.dispatch(click(button, engine.generation()));
    let program = engine.recv_program().unwrap();
    assert_eq!(first_operand(&program, Op::AddText).as_deref(), Some("1"));
    engine.release_program(program);
}

#[test]
fn unhandled_intents_skip_the_cycle() {
    let engine = Engine::new(counter_view, EngineConfig::default());
    let program = engine.recv_program().unwrap();
    let button: Entity = first_operand(&program, Op::SetId).unwrap().parse().unwrap();
    engine.release_program(program);

    engine.dispatch(CallFrame {
        entity: button,
        intent: IntentType::DoubleClick,
        generation: engine.generation(),
        ..CallFrame::default()
    });
    assert!(engine.recv_program_timeout(TICK).is_none());

    // the engine is still turning
    engine.dispatch(click(button, engine.generation()));
    assert!(engine.recv_program_timeout(TICK).is_some());
}

#[test]
fn enqueued_actions_drive_cycles_too() {
    let engine = Engine::new(counter_view, EngineConfig::default());
    let program = engine.recv_program().unwrap();
    engine.release_program(program);

    engine.enqueue(mutate(|c: &mut Count| c.0 = 41));
    let program = engine.recv_program().unwrap();
    assert_eq!(first_operand(&program, Op::AddText).as_deref(), Some("41"));
    engine.release_program(program);
}

#[test]
fn declared_noops_emit_nothing_by_default() {
    let engine = Engine::new(counter_view, EngineConfig::default());
    let program = engine.recv_program().unwrap();
    engine.release_program(program);

    engine.enqueue(action(|_| Context::no_action()));
    assert!(engine.recv_program_timeout(TICK).is_none());
}

#[test]
fn sampling_can_force_a_rebuild_on_noops() {
    let config = EngineConfig {
        rebuild_sampling: RebuildSampling::OneIn(1),
    };
    let engine = Engine::new(counter_view, config);
    let program = engine.recv_program().unwrap();
    engine.release_program(program);

    engine.enqueue(action(|_| Context::no_action()));
    let forced = engine
        .recv_program_timeout(TICK)
        .expect("sampling policy forces the rebuild");
    assert_eq!(first_operand(&forced, Op::AddText).as_deref(), Some("0"));
    engine.release_program(forced);
}

#[test]
fn shutdown_closes_the_program_stream() {
    let engine = Engine::new(counter_view, EngineConfig::default());
    let program = engine.recv_program().unwrap();
    engine.release_program(program);

    engine.shutdown();
    assert!(engine.recv_program().is_none());
}

#[test]
fn seeded_values_shape_the_first_render() {
    let engine = Engine::with_seed(
        counter_view,
        EngineConfig::default(),
        vec![mutate(|c: &mut Count| c.0 = 7)],
    );
    let program = engine.recv_program().unwrap();
    assert_eq!(first_operand(&program, Op::AddText).as_deref(), Some("7"));
    engine.release_program(program);
}

fn echo_view(_: &Context) -> Node {
    Node::new("input").on_intent(
        IntentType::Change,
        action(|ctx| {
            let input = ctx.read_input();
            ctx.set_reply(0, Register::Text(input.to_uppercase()));
            Context::no_action()
        }),
    )
}

#[test]
fn replies_are_answered_after_the_cycle() {
    let engine = Engine::new(echo_view, EngineConfig::default());
    let program = engine.recv_program().unwrap();
    let input: Entity = first_operand(&program, Op::SetId).unwrap().parse().unwrap();
    engine.release_program(program);

    let (reply_tx, reply_rx) = std::sync::mpsc::channel();
    engine.dispatch(CallFrame {
        entity: input,
        intent: IntentType::Change,
        generation: engine.generation(),
        registers: [
            Register::Text("quiet".into()),
            Register::Empty,
            Register::Empty,
            Register::Empty,
        ],
        reply: Some(reply_tx),
        ..CallFrame::default()
    });

    let returns = reply_rx.recv_timeout(TICK).expect("reply answered");
    assert_eq!(returns[0], Register::Text("QUIET".into()));
}

fn keeper_view(ctx: &Context) -> Node {
    let count = ctx.value_of::<Count>();
    let kept = ctx.value_of::<Kept>();

    let child = if kept.0 == 0 {
        Node::new("box")
            .give_key(ctx)
            .react(IntentType::Click, |c: &mut Count| c.0 += 1)
    } else {
        reuse_from(ctx, kept.0)
    };
    ctx.update(|k: &mut Kept| k.0 = child.entity());

    Node::new("div")
        .set_text(&count.0.to_string())
        .add_children(&[child])
}

#[test]
fn reused_subtrees_keep_their_handlers_across_generations() {
    let engine = Engine::new(keeper_view, EngineConfig::default());

    let program = engine.recv_program().unwrap();
    let boxed: Entity = first_operand(&program, Op::SetId).unwrap().parse().unwrap();
    engine.release_program(program);

    // first click reaches the freshly built box
    engine.dispatch(click(boxed, engine.generation()));
    let program = engine.recv_program().unwrap();
    let decoded = ops_of(&program);
    assert_eq!(first_operand(&program, Op::AddText).as_deref(), Some("1"));
    assert!(decoded.contains(&(Op::Reuse, vec![boxed.to_string()])));
    let renamed: Entity = decoded
        .iter()
        .find(|(op, _)| *op == Op::ReassignId)
        .map(|(_, operands)| operands[1].parse().unwrap())
        .expect("the splice renames the box");
    engine.release_program(program);

    // second click targets the renamed identity; the spliced subtree still
    // owns the original handler
    engine.dispatch(click(renamed, engine.generation()));
    let program = engine.recv_program().unwrap();
    assert_eq!(first_operand(&program, Op::AddText).as_deref(), Some("2"));
    engine.release_program(program);
}

fn fragile_view(ctx: &Context) -> Node {
    if ctx.value_of::<Count>().0 == 0 {
        return Node::new("div");
    }
    // the same node in two positions: a structural cycle
    let shared = Node::new("span");
    Node::new("div").add_children(&[shared, shared])
}

#[test]
fn a_crashed_cycle_only_withholds_its_program() {
    let engine = Engine::new(fragile_view, EngineConfig::default());
    let program = engine.recv_program().unwrap();
    engine.release_program(program);

    engine.enqueue(mutate(|c: &mut Count| c.0 = 1));
    // the cycle dies on the structural cycle; no program, stream closed
    assert!(engine.recv_program().is_none());
}

#[test]
fn the_worker_returns_to_idle_between_cycles() {
    let engine = Engine::new(counter_view, EngineConfig::default());
    let program = engine.recv_program().unwrap();
    engine.release_program(program);

    let deadline = std::time::Instant::now() + TICK;
    while engine.phase() != Phase::Idle {
        assert!(std::time::Instant::now() < deadline, "worker stuck in {:?}", engine.phase());
        std::thread::yield_now();
    }
}
