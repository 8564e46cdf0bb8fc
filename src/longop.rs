use crate::error::ErrorDetail;
use crate::event::{KeyCode, MouseButton, Point};
use crate::graphics::{Rect, DC_SCREEN, DC_STAGING};
use crate::machine::Machine;
use crate::memory::IntReference;

/// A cooperatively scheduled multi-frame task.
///
/// The machine polls the top of its operation stack once per frame; an
/// operation runs at most one frame of work per [LongOperation::step] and
/// reports completion by returning true.  Input arriving while an operation
/// is on top is offered to its hooks first; a hook returning true consumes
/// the event.
pub trait LongOperation {
    /// Runs one frame of work.  Returns true iff the operation is complete.
    fn step(&mut self, machine: &mut Machine) -> Result<bool, ErrorDetail>;

    /// Called when this operation becomes the top of the stack.
    fn gain_focus(&mut self, _machine: &mut Machine) {}

    /// Called when this operation stops being the top of the stack.
    fn lose_focus(&mut self, _machine: &mut Machine) {}

    fn on_mouse_motion(&mut self, _machine: &mut Machine, _point: Point) {}

    fn on_mouse_button(
        &mut self,
        _machine: &mut Machine,
        _button: MouseButton,
        _pressed: bool,
    ) -> bool {
        false
    }

    fn on_key(&mut self, _machine: &mut Machine, _code: KeyCode, _pressed: bool) -> bool {
        false
    }

    /// If true, the host frame loop may insert a short sleep after invoking
    /// this operation.
    fn sleep_every_tick(&self) -> bool {
        false
    }
}

/// What a [PerformAfterDecorator] does once its wrapped operation completes.
#[derive(Clone, Debug, PartialEq)]
pub enum AfterAction {
    /// Snapshot the page set into history, clear the active window and begin
    /// a new page.
    NewPage,
    /// Reset indentation and hard-break the current page.
    NewParagraph,
    /// Blit a source rect of one display context onto a dest rect of another
    /// at full opacity and force a refresh.  Establishes the steady state
    /// after a transition effect.
    FinalBlit {
        src_dc: usize,
        dst_dc: usize,
        src_rect: Rect,
        dst_rect: Rect,
    },
}

/// Wraps another operation and performs an [AfterAction] when it completes.
/// Decorators nest; the hooks run innermost-first as each completion
/// propagates outward, and focus events pass straight through.
pub struct PerformAfterDecorator {
    operation: Box<dyn LongOperation>,
    action: AfterAction,
}

impl PerformAfterDecorator {
    pub fn new(operation: Box<dyn LongOperation>, action: AfterAction) -> Self {
        PerformAfterDecorator { operation, action }
    }

    fn perform_after(&self, machine: &mut Machine) -> Result<(), ErrorDetail> {
        match &self.action {
            AfterAction::NewPage => {
                machine.system.text.snapshot();
                machine.system.text.start_new_page();
                machine.system.graphics.mark_dirty();
            }
            AfterAction::NewParagraph => {
                machine.system.text.page_reset_indentation();
                machine.system.text.page_hard_break();
            }
            AfterAction::FinalBlit {
                src_dc,
                dst_dc,
                src_rect,
                dst_rect,
            } => {
                let src = machine.system.graphics.dc(*src_dc).clone();
                src.blit_to(
                    machine.system.graphics.dc_mut(*dst_dc),
                    *src_rect,
                    *dst_rect,
                    crate::graphics::Opacity::Uniform(255),
                );
                machine.system.graphics.force_refresh();
            }
        }
        Ok(())
    }
}

impl LongOperation for PerformAfterDecorator {
    fn step(&mut self, machine: &mut Machine) -> Result<bool, ErrorDetail> {
        let done = self.operation.step(machine)?;
        if done {
            self.perform_after(machine)?;
        }
        Ok(done)
    }

    fn gain_focus(&mut self, machine: &mut Machine) {
        self.operation.gain_focus(machine);
    }

    fn lose_focus(&mut self, machine: &mut Machine) {
        self.operation.lose_focus(machine);
    }

    fn on_mouse_motion(&mut self, machine: &mut Machine, point: Point) {
        self.operation.on_mouse_motion(machine, point);
    }

    fn on_mouse_button(
        &mut self,
        machine: &mut Machine,
        button: MouseButton,
        pressed: bool,
    ) -> bool {
        self.operation.on_mouse_button(machine, button, pressed)
    }

    fn on_key(&mut self, machine: &mut Machine, code: KeyCode, pressed: bool) -> bool {
        self.operation.on_key(machine, code, pressed)
    }

    fn sleep_every_tick(&self) -> bool {
        self.operation.sleep_every_tick()
    }
}

/// Convenience constructor for the blit decorator every transition effect is
/// wrapped in: when the effect completes, the staging context lands on the
/// screen context at full opacity.
pub fn decorate_effect_with_blit(
    effect: Box<dyn LongOperation>,
    screen_rect: Rect,
) -> Box<dyn LongOperation> {
    Box::new(PerformAfterDecorator::new(
        effect,
        AfterAction::FinalBlit {
            src_dc: DC_STAGING,
            dst_dc: DC_SCREEN,
            src_rect: screen_rect,
            dst_rect: screen_rect,
        },
    ))
}

/// Pauses interpretation until any of its configured break conditions fires:
/// a target time, a mouse click, ctrl, or an arbitrary predicate.
///
/// Conditions are opt-in at construction; an unconfigured wait never
/// completes on its own.
pub struct WaitLongOperation {
    wait_until_target_time: bool,
    target_time: u32,
    break_on_clicks: bool,
    clicked: bool,
    click_location: Point,
    break_on_event: Option<Box<dyn Fn(&Machine) -> bool>>,
    break_on_ctrl_pressed: bool,
    ctrl_pressed: bool,
    save_click_location: Option<(IntReference, IntReference)>,
}

impl WaitLongOperation {
    pub fn new() -> Self {
        WaitLongOperation {
            wait_until_target_time: false,
            target_time: 0,
            break_on_clicks: false,
            clicked: false,
            click_location: Point::default(),
            break_on_event: None,
            break_on_ctrl_pressed: false,
            ctrl_pressed: false,
            save_click_location: None,
        }
    }

    /// This instance should complete once the event clock reaches
    /// `target_time` (an absolute tick, not a duration).
    pub fn wait_until(mut self, target_time: u32) -> Self {
        self.wait_until_target_time = true;
        self.target_time = target_time;
        self
    }

    /// Complete on a left-click.
    pub fn break_on_clicks(mut self) -> Self {
        self.break_on_clicks = true;
        self
    }

    /// Complete as soon as `predicate` reports true.  Checked every step.
    pub fn break_on_event(mut self, predicate: Box<dyn Fn(&Machine) -> bool>) -> Self {
        self.break_on_event = Some(predicate);
        self
    }

    /// Complete when ctrl is pressed.
    pub fn break_on_ctrl(mut self) -> Self {
        self.break_on_ctrl_pressed = true;
        self
    }

    /// Write the click location into the referenced memory slots on
    /// completion.  Implies breaking on clicks.
    pub fn save_click_location(mut self, x: IntReference, y: IntReference) -> Self {
        self.save_click_location = Some((x, y));
        self.break_on_clicks = true;
        self
    }
}

impl Default for WaitLongOperation {
    fn default() -> Self {
        WaitLongOperation::new()
    }
}

impl LongOperation for WaitLongOperation {
    fn step(&mut self, machine: &mut Machine) -> Result<bool, ErrorDetail> {
        let mut done = false;

        if self.wait_until_target_time && machine.system.event.ticks() >= self.target_time {
            done = true;
        }
        if let Some(predicate) = &self.break_on_event {
            if predicate(machine) {
                done = true;
            }
        }
        if self.break_on_ctrl_pressed
            && (self.ctrl_pressed || machine.system.event.ctrl_pressed())
        {
            done = true;
        }
        if self.clicked {
            if let Some((x, y)) = self.save_click_location {
                machine.memory.write_ref(x, self.click_location.x)?;
                machine.memory.write_ref(y, self.click_location.y)?;
            }
            done = true;
        }

        Ok(done)
    }

    fn on_mouse_button(
        &mut self,
        machine: &mut Machine,
        button: MouseButton,
        pressed: bool,
    ) -> bool {
        if self.break_on_clicks && button == MouseButton::Left && pressed {
            self.clicked = true;
            self.click_location = machine.system.event.cursor_position();
            return true;
        }
        false
    }

    fn on_key(&mut self, _machine: &mut Machine, code: KeyCode, pressed: bool) -> bool {
        if self.break_on_ctrl_pressed && code.is_ctrl() && pressed {
            self.ctrl_pressed = true;
            return true;
        }
        false
    }

    fn sleep_every_tick(&self) -> bool {
        true
    }
}
