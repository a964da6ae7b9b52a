//! A counter behind the full engine loop: build, serialize, publish, click,
//! repeat. Each mutation program is decoded to stdout in place of a real
//! display-side interpreter.

use weft_core::{CallFrame, Context, Entity, IntentType, Node, Op, Program};
use weft_engine::{Engine, EngineConfig};

#[derive(Clone, Copy, Debug, Default)]
struct Count(i64);

fn counter(ctx: &Context) -> Node {
    let count = ctx.value_of::<Count>();
    Node::new("div").add_classes(&["counter"]).add_children(&[
        Node::new("span").set_text(&count.0.to_string()),
        Node::new("button")
            .set_text("+1")
            .react(IntentType::Click, |c: &mut Count| c.0 += 1),
    ])
}

fn print_program(program: &Program) -> Option<Entity> {
    let mut button = None;
    for instr in program.decode() {
        let instr = instr.expect("engine produced a malformed program");
        if instr.op == Op::SetId {
            button = instr.operands[0].parse().ok();
        }
        println!("  {:?} {:?}", instr.op, instr.operands);
    }
    button
}

fn main() {
    env_logger::init();

    let engine = Engine::new(counter, EngineConfig::default());

    let mut round = 0;
    while let Some(program) = engine.recv_program() {
        println!("program {round} ({} bytes):", program.len());
        let button = print_program(&program);
        engine.release_program(program);

        if round == 3 {
            engine.shutdown();
        } else if let Some(button) = button {
            engine.dispatch(CallFrame {
                entity: button,
                intent: IntentType::Click,
                generation: engine.generation(),
                ..CallFrame::default()
            });
        }
        round += 1;
    }
    log::info!("engine stopped after {round} programs");
}
