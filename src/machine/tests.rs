use super::*;
use crate::event::{KeyCode, MouseButton, Point, TestClock};
use crate::graphics::{DC_SCREEN, DC_STAGING};
use crate::instruction::Expr;
use crate::memory::{BitWidth, IntBank, IntReference};
use crate::modules::register_default_modules;
use crate::pause::{new_page_after, PauseLongOperation};
use crate::scenario::MemoryScenario;
use std::cell::RefCell;

const TEST_GAMEEXE: &str = r#"
#SCREENSIZE_MOD = 0
#SEEN_MENU = 2
#WINDOW.000.MOJI_SIZE = 16
#WINDOW.000.MOJI_CNT = 20, 3
#WINDOW.000.MOJI_REP = 0, 0
#WINDOW.000.POS = 0, 0, 0
#COLOR_TABLE.000 = 255, 255, 255
#SEL.000 = 0, 0, 640, 480, 0, 0, 1000, 10, 0, 0, 0, 0, 0, 0, 255, 0, 0
"#;

fn setup_machine(scenario: MemoryScenario) -> (Rc<TestClock>, Machine) {
    setup_machine_with_gameexe(scenario, TEST_GAMEEXE)
}

fn setup_machine_with_gameexe(
    scenario: MemoryScenario,
    gameexe_text: &str,
) -> (Rc<TestClock>, Machine) {
    let clock = Rc::new(TestClock::new());
    let gexe = Gameexe::from_text(gameexe_text).unwrap();
    let system = System::with_clock(gexe, clock.clone()).unwrap();
    let mut registry = OpcodeRegistry::new();
    register_default_modules(&mut registry);
    let machine = Machine::new(system, Box::new(scenario), Rc::new(registry));
    (clock, machine)
}

fn opcode(module: u8, op: u16, overload: u8, args: Vec<Expr>) -> Instruction {
    Instruction::Opcode {
        module,
        opcode: op,
        overload,
        args,
    }
}

fn click(machine: &mut Machine, x: i32, y: i32) {
    machine
        .system
        .event
        .inject(Event::MouseMotion(Point::new(x, y)));
    machine.system.event.inject(Event::MouseButton {
        button: MouseButton::Left,
        pressed: true,
    });
    machine.system.event.inject(Event::MouseButton {
        button: MouseButton::Left,
        pressed: false,
    });
}

// ------------------------------------------------------ [ frame loop core ]

#[test]
fn test_halt_instruction_stops_the_machine() {
    let mut scenario = MemoryScenario::new();
    scenario.add_scene(1, vec![Instruction::Line(1), Instruction::Halt]);
    let (_clock, mut machine) = setup_machine(scenario);
    machine.run_one_frame();
    assert!(machine.halted());
    assert!(machine.last_error().is_none());
    assert_eq!(machine.line_number(), 1);
    // Once halted, frames are no-ops forever.
    machine.run_one_frame();
    assert!(machine.halted());
}

#[test]
fn test_unknown_opcode_is_fatal() {
    let mut scenario = MemoryScenario::new();
    scenario.add_scene(1, vec![opcode(99, 99, 9, vec![])]);
    let (_clock, mut machine) = setup_machine(scenario);
    machine.run_one_frame();
    assert!(machine.halted());
    assert!(machine.last_error().is_some());
}

#[test]
fn test_unsupported_opcode_is_a_warned_no_op() {
    let mut scenario = MemoryScenario::new();
    // Sys_angle is registered as a named no-op; execution continues.
    scenario.add_scene(
        1,
        vec![
            opcode(4, 1132, 0, vec![Expr::IntConst(10), Expr::IntConst(20)]),
            Instruction::Halt,
        ],
    );
    let (_clock, mut machine) = setup_machine(scenario);
    machine.run_one_frame();
    assert!(machine.halted());
    assert!(machine.last_error().is_none());
}

#[test]
fn test_store_register_routing() {
    let mut scenario = MemoryScenario::new();
    // Reset timer 3, wait 100 ms, then the timer-read opcode routes its
    // value into the store register.
    scenario.add_scene(
        1,
        vec![
            opcode(4, 110, 0, vec![Expr::IntConst(3)]),
            opcode(4, 100, 0, vec![Expr::IntConst(100)]),
            opcode(4, 111, 0, vec![Expr::IntConst(3)]),
            Instruction::Halt,
        ],
    );
    let (clock, mut machine) = setup_machine(scenario);
    clock.set(5000);
    machine.run_one_frame();
    assert_eq!(machine.long_operation_count(), 1);
    clock.set(5150);
    machine.run_one_frame();
    assert!(machine.halted());
    assert_eq!(machine.store_register(), 150);
}

#[test]
fn test_gosub_and_return_flow() {
    let mut scenario = MemoryScenario::new();
    // 0: gosub 3; 1: intA[0] = 2; 2: halt; 3: intA[0] = 1; 4: ret
    let target = IntReference::full(IntBank::A, 0);
    scenario.add_scene(
        1,
        vec![
            opcode(1, 5, 0, vec![Expr::IntConst(3)]),
            opcode(11, 0, 0, vec![Expr::IntRef(target), Expr::IntConst(2)]),
            Instruction::Halt,
            opcode(11, 0, 0, vec![Expr::IntRef(target), Expr::IntConst(1)]),
            opcode(1, 10, 0, vec![]),
        ],
    );
    let (_clock, mut machine) = setup_machine(scenario);
    machine.run_one_frame();
    assert!(machine.halted());
    assert!(machine.last_error().is_none());
    // The subroutine ran first, then the fall-through overwrote its value.
    assert_eq!(
        machine
            .memory
            .get_int(IntBank::A, BitWidth::Full, 0)
            .unwrap(),
        2
    );
    assert_eq!(machine.call_stack_depth(), 0);
}

#[test]
fn test_farcall_across_scenes_and_game_hack_skip() {
    // The Little Busters hack returns from the farcall when scene 7030
    // reaches line 15, skipping the whole minigame body.
    let mut scenario = MemoryScenario::new();
    scenario.add_scene(
        1,
        vec![
            opcode(1, 12, 0, vec![Expr::IntConst(7030), Expr::IntConst(0)]),
            Instruction::Halt,
        ],
    );
    scenario.add_scene(
        7030,
        vec![
            Instruction::Line(15),
            Instruction::Textout("never revealed".to_string()),
        ],
    );
    let gameexe_text = format!("{}\nDISKMARK = LB.ENV", TEST_GAMEEXE);
    let (_clock, mut machine) = setup_machine_with_gameexe(scenario, &gameexe_text);
    machine.run_one_frame();
    assert!(machine.halted());
    assert!(machine.last_error().is_none());
    assert_eq!(machine.long_operation_count(), 0);
}

#[test]
fn test_return_menu_jumps_to_configured_scene() {
    let mut scenario = MemoryScenario::new();
    scenario.add_scene(1, vec![opcode(4, 202, 0, vec![]), Instruction::Halt]);
    scenario.add_scene(2, vec![Instruction::Halt]);
    let (_clock, mut machine) = setup_machine(scenario);
    machine.run_one_frame();
    assert!(machine.halted());
    assert_eq!(machine.position().scene, 2);
}

// --------------------------------------------------- [ long-op scheduling ]

struct TrackerOp {
    name: &'static str,
    steps_remaining: u32,
    log: Rc<RefCell<Vec<String>>>,
}

impl LongOperation for TrackerOp {
    fn step(&mut self, _machine: &mut Machine) -> Result<bool, ErrorDetail> {
        self.steps_remaining -= 1;
        Ok(self.steps_remaining == 0)
    }

    fn gain_focus(&mut self, _machine: &mut Machine) {
        self.log.borrow_mut().push(format!("+{}", self.name));
    }

    fn lose_focus(&mut self, _machine: &mut Machine) {
        self.log.borrow_mut().push(format!("-{}", self.name));
    }
}

#[test]
fn test_longop_stack_is_lifo_with_balanced_focus() {
    let mut scenario = MemoryScenario::new();
    scenario.add_scene(1, vec![Instruction::Halt]);
    let (_clock, mut machine) = setup_machine(scenario);

    let log = Rc::new(RefCell::new(Vec::new()));
    for (name, steps) in [("A", 3), ("B", 2), ("C", 1)] {
        machine.push_long_operation(Box::new(TrackerOp {
            name,
            steps_remaining: steps,
            log: log.clone(),
        }));
    }

    // C retires first, then B, then A.
    for _ in 0..6 {
        machine.run_one_frame();
        if machine.long_operation_count() == 0 {
            break;
        }
    }
    assert_eq!(machine.long_operation_count(), 0);

    // Every operation ends its life focused: one more gain than loss each.
    let log = log.borrow();
    for name in ["A", "B", "C"] {
        let gains = log.iter().filter(|e| *e == &format!("+{}", name)).count();
        let losses = log.iter().filter(|e| *e == &format!("-{}", name)).count();
        assert_eq!(gains, losses + 1, "focus imbalance for {}: {:?}", name, *log);
    }
}

#[test]
fn test_wait_operation_completes_on_target_time() {
    let mut scenario = MemoryScenario::new();
    scenario.add_scene(
        1,
        vec![opcode(4, 100, 0, vec![Expr::IntConst(100)]), Instruction::Halt],
    );
    let (clock, mut machine) = setup_machine(scenario);

    machine.run_one_frame();
    assert_eq!(machine.long_operation_count(), 1);
    clock.set(50);
    machine.run_one_frame();
    assert_eq!(machine.long_operation_count(), 1);
    assert!(!machine.halted());
    clock.set(150);
    machine.run_one_frame();
    assert!(machine.halted());
    assert!(machine.last_error().is_none());
}

#[test]
fn test_get_click_saves_location_into_memory() {
    let mut scenario = MemoryScenario::new();
    let x = IntReference::full(IntBank::B, 10);
    let y = IntReference::full(IntBank::B, 11);
    scenario.add_scene(
        1,
        vec![
            opcode(4, 610, 0, vec![Expr::IntRef(x), Expr::IntRef(y)]),
            Instruction::Halt,
        ],
    );
    let (_clock, mut machine) = setup_machine(scenario);
    machine.run_one_frame();
    assert_eq!(machine.long_operation_count(), 1);

    click(&mut machine, 123, 45);
    machine.run_one_frame();
    assert!(machine.halted());
    assert_eq!(machine.memory.read_ref(x).unwrap(), 123);
    assert_eq!(machine.memory.read_ref(y).unwrap(), 45);
}

// ------------------------------------------------------- [ text pipeline ]

#[test]
fn test_textout_reveals_one_character_per_frame() {
    let mut scenario = MemoryScenario::new();
    scenario.add_scene(
        1,
        vec![Instruction::Textout("hello".to_string()), Instruction::Halt],
    );
    let (_clock, mut machine) = setup_machine(scenario);

    machine.run_one_frame();
    assert_eq!(machine.long_operation_count(), 1);
    // Five characters take five reveal frames; the halt executes on the
    // frame the reveal finishes.
    for _ in 0..4 {
        machine.run_one_frame();
        assert!(!machine.halted());
    }
    machine.run_one_frame();
    assert!(machine.halted());
    assert_eq!(machine.system.text.current_page_char_count(), 5);
    assert_eq!(
        machine.system.text.window(0).unwrap().insertion_point(),
        (80, 0, 0)
    );
    assert!(!machine.system.text.page_is_full());
}

#[test]
fn test_textout_click_dumps_remaining_text() {
    let mut scenario = MemoryScenario::new();
    scenario.add_scene(
        1,
        vec![
            Instruction::Textout("a long line of text".to_string()),
            Instruction::Halt,
        ],
    );
    let (_clock, mut machine) = setup_machine(scenario);
    machine.run_one_frame();
    click(&mut machine, 10, 10);
    machine.run_one_frame();
    assert!(machine.halted());
}

#[test]
fn test_name_construct_is_atomic_and_missing_bracket_is_fatal() {
    let mut scenario = MemoryScenario::new();
    scenario.add_scene(
        1,
        vec![
            Instruction::Textout("【朋也】「あ」".to_string()),
            Instruction::Halt,
        ],
    );
    let (_clock, mut machine) = setup_machine(scenario);
    machine.run_one_frame();
    // One reveal frame consumes the whole name construct.
    machine.run_one_frame();
    assert_eq!(machine.system.text.current_page_char_count(), 1);
    machine.run_one_frame();
    assert!(machine.system.text.current_page_char_count() >= 2);
    assert!(machine.last_error().is_none());

    let mut scenario = MemoryScenario::new();
    scenario.add_scene(
        1,
        vec![Instruction::Textout("【朋也 no closing".to_string())],
    );
    let (_clock, mut machine) = setup_machine(scenario);
    machine.run_one_frame();
    machine.run_one_frame();
    assert!(machine.halted());
    assert!(matches!(
        machine.last_error().unwrap().inner_error,
        ErrorDetail::MalformedScenario { .. }
    ));
}

#[test]
fn test_paragraph_pause_waits_for_click_then_breaks_line() {
    let mut scenario = MemoryScenario::new();
    scenario.add_scene(
        1,
        vec![
            Instruction::Textout("ab".to_string()),
            opcode(3, 3, 0, vec![]),
            Instruction::Halt,
        ],
    );
    let (_clock, mut machine) = setup_machine(scenario);

    // Reveal both characters, then the paragraph pause goes up.
    for _ in 0..3 {
        machine.run_one_frame();
    }
    assert_eq!(machine.long_operation_count(), 1);
    assert!(machine.system.text.in_pause_state());
    assert!(!machine.halted());

    click(&mut machine, 10, 10);
    machine.run_one_frame();
    assert!(machine.halted());
    assert!(!machine.system.text.in_pause_state());
    // The after-hook reset indentation and broke the line.
    let (x, _, line) = machine.system.text.window(0).unwrap().insertion_point();
    assert_eq!((x, line), (0, 1));
}

#[test]
fn test_pause_auto_mode_budget() {
    let mut scenario = MemoryScenario::new();
    scenario.add_scene(1, vec![Instruction::Halt]);
    let (clock, mut machine) = setup_machine(scenario);

    machine.system.text.set_auto_times(1000, 50);
    machine.system.text.set_auto_mode(true);
    for _ in 0..40 {
        machine.system.text.page_character("x", "x").unwrap();
    }

    let mut pause = PauseLongOperation::new(&mut machine);
    clock.set(2999);
    assert!(!pause.step(&mut machine).unwrap());
    clock.set(3001);
    assert!(pause.step(&mut machine).unwrap());
    // The completed pause stopped the voice channel.
    assert!(!machine.system.sound.koe_playing());
}

#[test]
fn test_new_page_after_pause_yields_fresh_page() {
    let mut scenario = MemoryScenario::new();
    scenario.add_scene(1, vec![Instruction::Halt]);
    let (_clock, mut machine) = setup_machine(scenario);

    for _ in 0..25 {
        machine.system.text.page_character("x", "x").unwrap();
    }
    let pause = PauseLongOperation::new(&mut machine);
    machine.push_long_operation(new_page_after(Box::new(pause)));

    click(&mut machine, 10, 10);
    machine.run_one_frame();
    assert!(machine.halted());
    assert_eq!(machine.system.text.current_page_char_count(), 0);
    assert!(!machine.system.text.page_is_full());
    assert_eq!(
        machine.system.text.window(0).unwrap().insertion_point(),
        (0, 0, 0)
    );
    assert_eq!(machine.system.text.backlog_depth(), 1);
}

// ----------------------------------------------------------- [ effects ]

fn setup_effect_machine() -> (Rc<TestClock>, Machine) {
    let mut scenario = MemoryScenario::new();
    scenario.add_scene(
        1,
        vec![opcode(33, 10, 0, vec![Expr::IntConst(0)]), Instruction::Halt],
    );
    let (clock, mut machine) = setup_machine(scenario);
    machine.system.graphics.dc_mut(DC_SCREEN).fill(255, 0, 0, 255);
    machine
        .system
        .graphics
        .dc_mut(DC_STAGING)
        .fill(0, 0, 255, 255);
    (clock, machine)
}

#[test]
fn test_wipe_midway_draws_staging_into_top_half() {
    let (clock, mut machine) = setup_effect_machine();

    // Frame 1 pushes the #SEL.000 wipe (1000 ms, top to bottom).
    machine.run_one_frame();
    assert_eq!(machine.long_operation_count(), 1);
    assert!(!machine.system.graphics.is_responsible_for_update());

    clock.set(500);
    machine.run_one_frame();
    let screen = machine.system.graphics.screen();
    // Rows [0, 240): the incoming staging image.
    assert_eq!(screen.pixel(320, 0), [0, 0, 255, 255]);
    assert_eq!(screen.pixel(320, 239), [0, 0, 255, 255]);
    // Rows [240, 480): still the outgoing screen image.
    assert_eq!(screen.pixel(320, 240), [255, 0, 0, 255]);
    assert_eq!(screen.pixel(320, 479), [255, 0, 0, 255]);
    assert!(!machine.halted());
}

#[test]
fn test_wipe_is_deterministic_in_t() {
    let run = || {
        let (clock, mut machine) = setup_effect_machine();
        machine.run_one_frame();
        clock.set(333);
        machine.run_one_frame();
        let screen = machine.system.graphics.screen();
        [
            screen.pixel(100, 100),
            screen.pixel(320, 159),
            screen.pixel(320, 160),
            screen.pixel(600, 400),
        ]
    };
    assert_eq!(run(), run());
}

#[test]
fn test_completed_effect_blits_staging_onto_screen_context() {
    let (clock, mut machine) = setup_effect_machine();
    machine.run_one_frame();
    clock.set(1100);
    machine.run_one_frame();
    assert!(machine.halted());
    assert!(machine.last_error().is_none());
    // The final-blit decorator established the steady state.
    assert_eq!(
        machine.system.graphics.dc(DC_SCREEN).pixel(320, 240),
        [0, 0, 255, 255]
    );
    assert!(machine.system.graphics.is_responsible_for_update());
}

#[test]
fn test_ctrl_skips_an_effect_immediately() {
    let (_clock, mut machine) = setup_effect_machine();
    machine.run_one_frame();
    machine.system.event.inject(Event::Key {
        code: KeyCode::LeftCtrl,
        pressed: true,
    });
    machine.run_one_frame();
    assert!(machine.halted());
    assert_eq!(
        machine.system.graphics.dc(DC_SCREEN).pixel(0, 0),
        [0, 0, 255, 255]
    );
}

#[test]
fn test_missing_sel_entry_is_fatal() {
    let mut scenario = MemoryScenario::new();
    scenario.add_scene(
        1,
        vec![opcode(33, 10, 0, vec![Expr::IntConst(7)]), Instruction::Halt],
    );
    let (_clock, mut machine) = setup_machine(scenario);
    machine.run_one_frame();
    assert!(machine.halted());
    assert!(machine.last_error().is_some());
}
