use crate::error::ErrorDetail;
use crate::event::{KeyCode, MouseButton, Point};
use crate::longop::{AfterAction, LongOperation, PerformAfterDecorator};
use crate::machine::Machine;
use crate::text::window::WindowButton;

/// Waits for the user to advance past the current text, honouring auto mode,
/// fast-forward, the back-log keys and the window chrome buttons.
///
/// Constructed implicitly after every paragraph and whenever the reveal
/// operation fills a page.
pub struct PauseLongOperation {
    start_time: u32,
    automode_time: u32,
    is_done: bool,
}

impl PauseLongOperation {
    /// Constructor.  Computes the auto-mode budget from the current page's
    /// character count and flags the text system as paused.
    pub fn new(machine: &mut Machine) -> Self {
        let num_chars = machine.system.text.current_page_char_count();
        let automode_time = machine.system.text.auto_time(num_chars);
        machine.system.graphics.mark_dirty();
        machine.system.text.set_in_pause_state(true);
        PauseLongOperation {
            start_time: machine.system.event.ticks(),
            automode_time,
            is_done: false,
        }
    }

    fn act_on_button(&mut self, machine: &mut Machine, button: WindowButton) {
        let outcome = match button {
            WindowButton::BacklogPrev => machine.system.text.back_page(),
            WindowButton::BacklogNext => machine.system.text.forward_page(),
            WindowButton::AutoModeToggle => {
                let auto = !machine.system.text.auto_mode();
                machine.system.text.set_auto_mode(auto);
                Ok(())
            }
            WindowButton::SkipToggle => {
                let skip = !machine.system.text.skip_mode();
                machine.system.text.set_skip_mode(skip);
                Ok(())
            }
            WindowButton::HideInterface => {
                machine.system.graphics.toggle_interface_hidden();
                Ok(())
            }
        };
        if let Err(e) = outcome {
            log::warn!("window button {:?} failed: {}", button, e);
        }
        machine.system.graphics.mark_dirty();
    }
}

impl LongOperation for PauseLongOperation {
    fn step(&mut self, machine: &mut Machine) -> Result<bool, ErrorDetail> {
        // Auto mode advances once the page's time budget elapses.
        if machine.system.text.auto_mode() {
            let now = machine.system.event.ticks();
            if self.start_time + self.automode_time < now {
                self.is_done = true;
            }
        }

        // Fast-forward never stops at a pause.
        if machine.fast_forward() {
            self.is_done = true;
        }

        if self.is_done {
            // Stop any voice still speaking before the script moves on.
            machine.system.sound.koe_stop();
            machine.system.text.set_in_pause_state(false);
            return Ok(true);
        }
        Ok(false)
    }

    fn on_mouse_motion(&mut self, machine: &mut Machine, point: Point) {
        machine.system.text.set_mouse_position(point);
    }

    fn on_mouse_button(
        &mut self,
        machine: &mut Machine,
        button: MouseButton,
        pressed: bool,
    ) -> bool {
        match button {
            MouseButton::Left => {
                if machine.system.graphics.interface_hidden() {
                    // Only unhide on release of the left button.
                    if !pressed {
                        machine.system.graphics.toggle_interface_hidden();
                        return true;
                    }
                } else {
                    let position = machine.system.event.cursor_position();
                    let hit = machine
                        .system
                        .text
                        .button_at(position)
                        .ok()
                        .flatten();
                    if let Some(window_button) = hit {
                        if !pressed {
                            self.act_on_button(machine, window_button);
                        }
                        return true;
                    }
                    // Respond on mouseups only.
                    if !pressed {
                        if machine.system.text.is_reading_backlog() {
                            if let Err(e) = machine.system.text.stop_reading_backlog() {
                                log::warn!("backlog replay failed: {}", e);
                            }
                        } else {
                            self.is_done = true;
                        }
                        return true;
                    }
                }
            }
            MouseButton::Right => {
                if !pressed {
                    machine.show_system_menu();
                    return true;
                }
            }
            MouseButton::WheelUp => {
                if pressed {
                    if let Err(e) = machine.system.text.back_page() {
                        log::warn!("backlog replay failed: {}", e);
                    }
                    return true;
                }
            }
            MouseButton::WheelDown => {
                if pressed {
                    if let Err(e) = machine.system.text.forward_page() {
                        log::warn!("backlog replay failed: {}", e);
                    }
                    return true;
                }
            }
        }
        false
    }

    fn on_key(&mut self, machine: &mut Machine, code: KeyCode, pressed: bool) -> bool {
        if !pressed {
            return false;
        }
        if machine.system.graphics.interface_hidden() {
            machine.system.graphics.toggle_interface_hidden();
            return true;
        }

        let ctrl_key_skips = machine.system.text.ctrl_key_skip();
        if ctrl_key_skips && code.is_ctrl() {
            self.is_done = true;
            return true;
        }
        match code {
            KeyCode::Space => {
                machine.system.graphics.toggle_interface_hidden();
                true
            }
            KeyCode::Up => {
                if let Err(e) = machine.system.text.back_page() {
                    log::warn!("backlog replay failed: {}", e);
                }
                true
            }
            KeyCode::Down => {
                if let Err(e) = machine.system.text.forward_page() {
                    log::warn!("backlog replay failed: {}", e);
                }
                true
            }
            KeyCode::Return => {
                if machine.system.text.is_reading_backlog() {
                    if let Err(e) = machine.system.text.stop_reading_backlog() {
                        log::warn!("backlog replay failed: {}", e);
                    }
                } else {
                    self.is_done = true;
                }
                true
            }
            _ => false,
        }
    }

    fn sleep_every_tick(&self) -> bool {
        true
    }
}

/// Wraps an operation so that its completion snapshots the page history,
/// clears the window and begins a new page.
pub fn new_page_after(operation: Box<dyn LongOperation>) -> Box<dyn LongOperation> {
    Box::new(PerformAfterDecorator::new(operation, AfterAction::NewPage))
}

/// Wraps an operation so that its completion resets indentation and breaks
/// the line, starting a fresh paragraph on the same page.
pub fn new_paragraph_after(operation: Box<dyn LongOperation>) -> Box<dyn LongOperation> {
    Box::new(PerformAfterDecorator::new(
        operation,
        AfterAction::NewParagraph,
    ))
}
