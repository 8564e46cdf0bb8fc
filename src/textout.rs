use crate::error::ErrorDetail;
use crate::event::KeyCode;
use crate::event::MouseButton;
use crate::longop::LongOperation;
use crate::machine::Machine;
use crate::pause::{new_page_after, PauseLongOperation};

/// Reveals a UTF-8 string into the current text page one character per
/// frame, with a no-wait mode that dumps the rest of the string at once.
///
/// The most recently emitted character is kept so each call can hand the
/// window a `(current, next)` pair for its line-breaking lookahead.
pub struct TextoutLongOperation {
    text: String,
    /// Byte offset just past `current_char`.
    position: usize,
    current_char: String,
    no_wait: bool,
}

impl TextoutLongOperation {
    /// Constructor priming the first character.
    pub fn new(text: String) -> Self {
        let (current_char, position) = match text.chars().next() {
            Some(c) => (c.to_string(), c.len_utf8()),
            None => (String::new(), 0),
        };
        TextoutLongOperation {
            text,
            position,
            current_char,
            no_wait: false,
        }
    }

    /// Drops the per-character delay; the whole string renders this frame.
    /// Set when revealing ruby glosses and when the user clicks through.
    pub fn set_no_wait(&mut self) {
        self.no_wait = true;
    }

    /// Extracts a 【name】 construct and hands it to the text system as one
    /// atomic display event.  `current_char` holds the opening bracket when
    /// this is called.  Returns true if the string is exhausted.
    fn display_name(&mut self, machine: &mut Machine) -> Result<bool, ErrorDetail> {
        let rest = &self.text[self.position..];
        let close = rest
            .char_indices()
            .find(|(_, c)| *c == '】')
            .map(|(i, _)| i)
            .ok_or_else(|| ErrorDetail::MalformedScenario {
                reason: "opening bracket in name construct, but missing closing bracket"
                    .to_string(),
            })?;
        let name = rest[..close].to_string();
        self.position += close + '】'.len_utf8();

        // Prime the character that follows the construct.
        let at_end = match self.text[self.position..].chars().next() {
            Some(c) => {
                self.current_char = c.to_string();
                self.position += c.len_utf8();
                self.position >= self.text.len()
            }
            None => {
                self.current_char = String::new();
                true
            }
        };

        machine.system.text.page_name(&name, &self.current_char)?;
        Ok(at_end)
    }

    /// Emits one character's worth of output.  Sets `paused` and pushes the
    /// page-break pause when the window fills.  Returns true when the whole
    /// string has been emitted.
    fn display_one_more_character(
        &mut self,
        machine: &mut Machine,
        paused: &mut bool,
    ) -> Result<bool, ErrorDetail> {
        if self.current_char.starts_with('【') {
            return self.display_name(machine);
        }

        match self.text[self.position..].chars().next() {
            Some(next_char) => {
                let next = next_char.to_string();
                let rendered = machine
                    .system
                    .text
                    .page_character(&self.current_char, &next)?;
                if rendered {
                    self.current_char = next;
                    self.position += next_char.len_utf8();
                }

                if machine.system.text.page_is_full() {
                    *paused = true;
                    machine.system.graphics.mark_dirty();
                    let pause = PauseLongOperation::new(machine);
                    machine.push_long_operation(new_page_after(Box::new(pause)));
                }
                Ok(false)
            }
            None => {
                machine.system.text.page_character(&self.current_char, "")?;
                Ok(true)
            }
        }
    }

    /// No-wait path: consume until the end of the string or a page break.
    fn display_as_much_as_we_can_then_pause(
        &mut self,
        machine: &mut Machine,
    ) -> Result<bool, ErrorDetail> {
        let mut paused = false;
        loop {
            if self.display_one_more_character(machine, &mut paused)? {
                return Ok(true);
            }
            if paused {
                return Ok(false);
            }
        }
    }
}

impl LongOperation for TextoutLongOperation {
    fn step(&mut self, machine: &mut Machine) -> Result<bool, ErrorDetail> {
        if !machine.system.text.system_visible() {
            return Err(ErrorDetail::MalformedScenario {
                reason: "trying to textout while the text system is hidden".to_string(),
            });
        }

        if self.no_wait {
            self.display_as_much_as_we_can_then_pause(machine)
        } else {
            let mut paused = false;
            self.display_one_more_character(machine, &mut paused)
        }
    }

    fn on_mouse_button(
        &mut self,
        _machine: &mut Machine,
        button: MouseButton,
        pressed: bool,
    ) -> bool {
        if pressed && button == MouseButton::Left {
            self.no_wait = true;
            return true;
        }
        false
    }

    fn on_key(&mut self, _machine: &mut Machine, code: KeyCode, pressed: bool) -> bool {
        if pressed && code.is_ctrl() {
            self.no_wait = true;
            return true;
        }
        false
    }

    fn sleep_every_tick(&self) -> bool {
        !self.no_wait
    }
}
