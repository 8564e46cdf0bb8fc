use crate::assets::AssetPaths;
use crate::error::{ErrorDetail, ReliveError};
use crate::event::{Clock, Event, EventSystem};
use crate::gameexe::Gameexe;
use crate::graphics::{GraphicsSystem, Size};
use crate::hacks::{hacks_for, GameHacks};
use crate::instruction::{decode_args, Instruction};
use crate::longop::LongOperation;
use crate::registry::{OpOutcome, OpcodeRegistry};
use crate::scenario::{CallStack, FrameType, ProgramPosition, Scenario, StackFrame};
use crate::serialization;
use crate::sound::SoundSystem;
use crate::text::TextSystem;
use crate::textout::TextoutLongOperation;
use std::collections::HashSet;
use std::rc::Rc;

#[cfg(test)]
mod tests;

/// How many completed long operations the frame loop will retire in a
/// single frame before yielding back to the host.
const MAX_LONGOP_RETIREMENTS_PER_FRAME: usize = 10;
/// How many bytecode instructions may run in one frame.  A scenario that
/// never pushes a long operation still yields to the host in bounded time.
const MAX_INSTRUCTIONS_PER_FRAME: usize = 10_000;

/// The engine's subsystem collection, owned by the machine and threaded to
/// opcode handlers and long operations through it.
pub struct System {
    pub gameexe: Gameexe,
    pub event: EventSystem,
    pub graphics: GraphicsSystem,
    pub text: TextSystem,
    pub sound: SoundSystem,
    pub assets: AssetPaths,
}

impl System {
    /// The display size the configuration asks for.
    fn screen_size(gexe: &Gameexe) -> Size {
        match gexe.int("SCREENSIZE_MOD", 0) {
            1 => Size::new(800, 600),
            _ => Size::new(640, 480),
        }
    }

    /// Constructor with a live audio device.
    pub fn new(gexe: Gameexe) -> Result<Self, ErrorDetail> {
        let sound = SoundSystem::new(&gexe)?;
        System::assemble(gexe, sound, EventSystem::new())
    }

    /// Constructor with no audio device and the wall clock.
    pub fn silent(gexe: Gameexe) -> Result<Self, ErrorDetail> {
        let sound = SoundSystem::silent(&gexe);
        System::assemble(gexe, sound, EventSystem::new())
    }

    /// Constructor with no audio device and an explicit clock, used by every
    /// time-driven test.
    pub fn with_clock(gexe: Gameexe, clock: Rc<dyn Clock>) -> Result<Self, ErrorDetail> {
        let sound = SoundSystem::silent(&gexe);
        System::assemble(gexe, sound, EventSystem::with_clock(clock))
    }

    fn assemble(
        gexe: Gameexe,
        sound: SoundSystem,
        event: EventSystem,
    ) -> Result<Self, ErrorDetail> {
        let screen_size = System::screen_size(&gexe);
        let graphics = GraphicsSystem::new(screen_size);
        let text = TextSystem::new(&gexe, screen_size)?;
        let assets = AssetPaths::from_gameexe(&gexe);
        Ok(System {
            gameexe: gexe,
            event,
            graphics,
            text,
            sound,
            assets,
        })
    }
}

/// The virtual machine: program position, memory, the long-operation stack,
/// and the per-frame scheduling that ties the subsystems together.
///
/// The host calls [Machine::run_one_frame] once per display frame; all
/// bytecode and long-operation work happens inside it.
pub struct Machine {
    pub memory: crate::memory::Memory,
    pub system: System,
    scenario: Box<dyn Scenario>,
    registry: Rc<OpcodeRegistry>,
    position: ProgramPosition,
    call_stack: CallStack,
    store_register: i32,
    line_number: i32,
    halted: bool,
    last_error: Option<ReliveError>,
    long_ops: Vec<Box<dyn LongOperation>>,
    warned_opcodes: HashSet<(u8, u16, u8)>,
    hacks: GameHacks,
}

impl Machine {
    /// Constructor.  The machine starts at the scenario's first scene with
    /// the game-hack table the Gameexe's DISKMARK selects.
    pub fn new(
        system: System,
        scenario: Box<dyn Scenario>,
        registry: Rc<OpcodeRegistry>,
    ) -> Self {
        let first_scene = scenario.first_scene().unwrap_or(0);
        let hacks = hacks_for(&system.gameexe);
        Machine {
            memory: crate::memory::Memory::new(),
            system,
            scenario,
            registry,
            position: ProgramPosition::new(first_scene, 0),
            call_stack: CallStack::new(),
            store_register: 0,
            line_number: 0,
            halted: false,
            last_error: None,
            long_ops: Vec::new(),
            warned_opcodes: HashSet::new(),
            hacks,
        }
    }

    // ------------------------------------------------------ [ frame loop ]

    /// Runs one display frame: pump input to the top long operation, advance
    /// the operation stack, execute bytecode while no operation is active,
    /// tick the sound system, and refresh the screen if anything needs it.
    ///
    /// After a halt this is a no-op forever.
    pub fn run_one_frame(&mut self) {
        if self.halted {
            return;
        }

        // 1. Deliver pending input, oldest first.
        while let Some(event) = self.system.event.pop_event() {
            self.dispatch_event(event);
        }

        // 2. Advance the top long operation, retiring completed ones.
        for _ in 0..MAX_LONGOP_RETIREMENTS_PER_FRAME {
            let Some(mut operation) = self.long_ops.pop() else {
                break;
            };
            let resume_at = self.long_ops.len();
            match operation.step(self) {
                Ok(false) => {
                    // Still running; it keeps its place beneath anything it
                    // pushed during the step.
                    self.long_ops.insert(resume_at, operation);
                    break;
                }
                Ok(true) => {
                    // Completed (after-hooks already ran inside step).
                    if self.long_ops.len() > resume_at {
                        // It pushed replacements; they get their first step
                        // next frame.
                        break;
                    }
                    self.notify_top_gain_focus();
                }
                Err(e) => {
                    self.long_ops.insert(resume_at, operation);
                    self.fail(e);
                    return;
                }
            }
        }

        // 3. Execute bytecode while nothing multi-frame is pending.
        let mut executed = 0;
        while !self.halted && self.long_ops.is_empty() && executed < MAX_INSTRUCTIONS_PER_FRAME {
            if let Err(e) = self.execute_next_instruction() {
                self.fail(e);
                return;
            }
            executed += 1;
        }

        // 4. Per-frame sound housekeeping (fades, queued BGM).
        let now = self.system.event.ticks();
        self.system.sound.execute(now);

        // 5. Steady-state refresh, unless an active effect owns the frame.
        if self.system.graphics.refresh_needed() {
            if let Err(e) = self.render_frame() {
                self.fail(e);
            }
        }
    }

    /// Whether the host pacer may sleep after this frame: nothing realtime
    /// is running and either the top operation is an idle wait or a nice
    /// task asked for low-priority pacing.
    pub fn may_sleep(&self) -> bool {
        if self.system.event.has_realtime_tasks() {
            return false;
        }
        self.system.event.can_be_nice()
            || self
                .long_ops
                .last()
                .map(|op| op.sleep_every_tick())
                .unwrap_or(false)
    }

    fn render_frame(&mut self) -> Result<(), ErrorDetail> {
        self.system.graphics.begin_frame();
        self.system.graphics.render_background_and_objects();
        if !self.system.graphics.interface_hidden() {
            let (graphics, text) = (&mut self.system.graphics, &self.system.text);
            text.render(graphics.screen_mut())?;
        }
        self.system.graphics.end_frame();
        Ok(())
    }

    /// Routes one event to the top long operation; unconsumed events fall
    /// through to the defaults (currently none beyond the modifier tracking
    /// the event system already did on inject).
    fn dispatch_event(&mut self, event: Event) {
        let Some(mut operation) = self.long_ops.pop() else {
            return;
        };
        let resume_at = self.long_ops.len();
        match event {
            Event::MouseMotion(point) => operation.on_mouse_motion(self, point),
            Event::MouseButton { button, pressed } => {
                operation.on_mouse_button(self, button, pressed);
            }
            Event::Key { code, pressed } => {
                operation.on_key(self, code, pressed);
            }
        }
        self.long_ops.insert(resume_at, operation);
    }

    // ------------------------------------------------------ [ operations ]

    /// Pushes a long operation; it becomes the top immediately, taking focus
    /// from the previous top.
    pub fn push_long_operation(&mut self, operation: Box<dyn LongOperation>) {
        if let Some(mut previous) = self.long_ops.pop() {
            previous.lose_focus(self);
            self.long_ops.push(previous);
        }
        let mut operation = operation;
        operation.gain_focus(self);
        self.long_ops.push(operation);
    }

    fn notify_top_gain_focus(&mut self) {
        if let Some(mut top) = self.long_ops.pop() {
            top.gain_focus(self);
            self.long_ops.push(top);
        }
    }

    pub fn long_operation_count(&self) -> usize {
        self.long_ops.len()
    }

    /// Pushes the reveal operation for a run of narrative text.  Ruby
    /// glosses render atomically, so mid-gloss reveals start in no-wait.
    pub fn perform_textout(&mut self, text: String) {
        let mut reveal = TextoutLongOperation::new(text);
        if self.system.text.in_ruby_gloss() {
            reveal.set_no_wait();
        }
        self.push_long_operation(Box::new(reveal));
    }

    // ----------------------------------------------------- [ control flow ]

    pub fn position(&self) -> ProgramPosition {
        self.position
    }

    pub fn line_number(&self) -> i32 {
        self.line_number
    }

    fn advance(&mut self) {
        self.position.offset += 1;
    }

    /// Jumps within or across scenes.
    pub fn jump(&mut self, scene: i32, offset: usize) -> Result<(), ErrorDetail> {
        if !self.scenario.scene_exists(scene) {
            return Err(ErrorDetail::NoSuchScene { scene });
        }
        self.position = ProgramPosition::new(scene, offset);
        Ok(())
    }

    /// In-scene subroutine call: saves the next position and jumps.
    pub fn gosub(&mut self, offset: usize) -> Result<(), ErrorDetail> {
        self.call_stack.push(StackFrame {
            return_to: ProgramPosition::new(self.position.scene, self.position.offset + 1),
            frame_type: FrameType::Gosub,
        })?;
        self.position.offset = offset;
        Ok(())
    }

    /// Cross-scene call: saves the next position and jumps to another scene.
    pub fn farcall(&mut self, scene: i32, offset: usize) -> Result<(), ErrorDetail> {
        if !self.scenario.scene_exists(scene) {
            return Err(ErrorDetail::NoSuchScene { scene });
        }
        self.call_stack.push(StackFrame {
            return_to: ProgramPosition::new(self.position.scene, self.position.offset + 1),
            frame_type: FrameType::Farcall,
        })?;
        self.position = ProgramPosition::new(scene, offset);
        Ok(())
    }

    fn return_matching(&mut self, expected: FrameType) -> Result<(), ErrorDetail> {
        let frame = self.call_stack.pop()?;
        if frame.frame_type != expected {
            return Err(ErrorDetail::MalformedScenario {
                reason: format!(
                    "return type mismatch: top frame is {:?}, return expected {:?}",
                    frame.frame_type, expected
                ),
            });
        }
        self.position = frame.return_to;
        Ok(())
    }

    pub fn return_from_gosub(&mut self) -> Result<(), ErrorDetail> {
        self.return_matching(FrameType::Gosub)
    }

    pub fn return_from_farcall(&mut self) -> Result<(), ErrorDetail> {
        self.return_matching(FrameType::Farcall)
    }

    pub fn call_stack_depth(&self) -> usize {
        self.call_stack.depth()
    }

    /// Abandons the current script state and jumps to the configured menu
    /// scene.
    pub fn return_menu(&mut self) -> Result<(), ErrorDetail> {
        let menu_scene = self.system.gameexe.int("SEEN_MENU", -1);
        if menu_scene < 0 {
            return Err(ErrorDetail::UnsupportedFeature {
                what: "ReturnMenu without a #SEEN_MENU entry".to_string(),
            });
        }
        self.long_ops.clear();
        while self.call_stack.depth() > 0 {
            self.call_stack.pop()?;
        }
        self.jump(menu_scene, 0)
    }

    /// The right-click system menu is the host platform's concern; the core
    /// only reports that it was requested.
    pub fn show_system_menu(&mut self) {
        log::info!("system menu requested");
    }

    // -------------------------------------------------------- [ registers ]

    pub fn store_register(&self) -> i32 {
        self.store_register
    }

    pub fn set_store_register(&mut self, value: i32) {
        self.store_register = value;
    }

    /// Whether pauses and transitions should be skipped: the read-skip
    /// toggle, or ctrl held in a configuration that allows ctrl-skip.
    pub fn fast_forward(&self) -> bool {
        self.system.text.skip_mode()
            || (self.system.event.ctrl_pressed() && self.system.text.ctrl_key_skip())
    }

    // ------------------------------------------------------------ [ halt ]

    pub fn halt(&mut self) {
        self.halted = true;
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    pub fn last_error(&self) -> Option<&ReliveError> {
        self.last_error.as_ref()
    }

    /// The top-level frame handler: record the error with its scenario
    /// context, log it, and halt.
    fn fail(&mut self, error: ErrorDetail) {
        let wrapped = ReliveError {
            scene: self.position.scene,
            line: self.line_number,
            inner_error: error,
        };
        log::error!("{}", wrapped);
        self.last_error = Some(wrapped);
        self.halted = true;
    }

    // -------------------------------------------------------- [ execution ]

    /// Fetches, dispatches and retires exactly one instruction.
    fn execute_next_instruction(&mut self) -> Result<(), ErrorDetail> {
        let instruction = self
            .scenario
            .instruction_at(self.position.scene, self.position.offset)?
            .clone();
        match instruction {
            Instruction::Line(number) => {
                self.line_number = number;
                if let Some(action) = self.hacks.action_for(self.position.scene, number) {
                    let before = self.position;
                    action(self);
                    if self.position != before {
                        // The hack redirected execution; the marker must not
                        // advance past the new position.
                        return Ok(());
                    }
                }
                self.advance();
            }
            Instruction::Halt => {
                self.halt();
            }
            Instruction::Textout(text) => {
                self.advance();
                self.perform_textout(text);
            }
            Instruction::Opcode {
                module,
                opcode,
                overload,
                args,
            } => {
                let registry = self.registry.clone();
                let entry = registry.entry(module, opcode, overload).ok_or_else(|| {
                    ErrorDetail::MalformedScenario {
                        reason: format!(
                            "unknown opcode <{}:{:05}, {}>",
                            module, opcode, overload
                        ),
                    }
                })?;
                match &entry.handler {
                    None => {
                        if self.warned_opcodes.insert((module, opcode, overload)) {
                            log::warn!(
                                "unsupported opcode {} <{}:{:05}, {}>; ignoring",
                                entry.name,
                                module,
                                opcode,
                                overload
                            );
                        }
                        self.advance();
                    }
                    Some(handler) => {
                        let values =
                            decode_args(&entry.name, &entry.signature, &args, &self.memory)?;
                        match handler(self, &values)? {
                            OpOutcome::Next => self.advance(),
                            OpOutcome::Jumped => {}
                            OpOutcome::Store(value) => {
                                self.store_register = value;
                                self.advance();
                            }
                            OpOutcome::Halt => self.halt(),
                        }
                    }
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------ [ persistence ]

    /// Writes the persistent banks to the per-game save directory.
    pub fn save_global_memory(&self) -> Result<(), ErrorDetail> {
        let directory = crate::assets::save_directory(&self.system.gameexe)?;
        serialization::save_globals(&directory, &self.memory)
    }

    /// Loads the persistent banks if a save exists.
    pub fn load_global_memory(&mut self) -> Result<bool, ErrorDetail> {
        let directory = crate::assets::save_directory(&self.system.gameexe)?;
        serialization::load_globals(&directory, &mut self.memory)
    }

    /// Soft reset: back to the first scene with fresh local state.  The
    /// persistent banks are untouched.
    pub fn reset(&mut self) -> Result<(), ErrorDetail> {
        self.long_ops.clear();
        while self.call_stack.depth() > 0 {
            self.call_stack.pop()?;
        }
        let first_scene = self.scenario.first_scene().unwrap_or(0);
        self.position = ProgramPosition::new(first_scene, 0);
        self.line_number = 0;
        self.halted = false;
        self.last_error = None;
        self.system.text.snapshot();
        self.system.text.start_new_page();
        self.system.sound.bgm_stop();
        self.system.sound.wav_stop_all();
        Ok(())
    }
}
