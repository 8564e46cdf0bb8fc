use crate::gameexe::Gameexe;
use crate::graphics::ScreenUpdateMode;
use crate::machine::Machine;
use std::collections::HashMap;

/// A callback run when the interpreter passes a specific source line.
pub type LineAction = fn(&mut Machine);

/// Per-script patch points, selected by the game's DISKMARK identifier.
///
/// These exist solely to work around known bugs in specific commercial
/// scripts; a game without hacks gets an empty table.
#[derive(Default)]
pub struct GameHacks {
    actions: HashMap<(i32, i32), LineAction>,
}

impl GameHacks {
    pub fn new() -> Self {
        GameHacks {
            actions: HashMap::new(),
        }
    }

    /// Registers a callback for `(scene, line)`.
    pub fn add_line_action(&mut self, scene: i32, line: i32, action: LineAction) {
        self.actions.insert((scene, line), action);
    }

    /// The callback for `(scene, line)`, if one is registered.
    pub fn action_for(&self, scene: i32, line: i32) -> Option<LineAction> {
        self.actions.get(&(scene, line)).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Princess Bride: clicking through the first ending credits leaves the
/// screen update mode stuck on manual; the real engine restores it.
fn pbride_reset_draw_mode(machine: &mut Machine) {
    machine
        .system
        .graphics
        .set_screen_update_mode(ScreenUpdateMode::Automatic);
}

/// Little Busters: the baseball minigame talks to a Windows DLL we cannot
/// emulate; skip straight back out of it.
fn lb_skip_baseball(machine: &mut Machine) {
    if let Err(e) = machine.return_from_farcall() {
        log::warn!("baseball skip hack failed: {}", e);
    }
}

/// Builds the hack table the Gameexe's DISKMARK selects.
pub fn hacks_for(gexe: &Gameexe) -> GameHacks {
    let mut hacks = GameHacks::new();
    match gexe.str("DISKMARK") {
        Some("P_BRIDE_SE.ENV") => {
            hacks.add_line_action(310, 446, pbride_reset_draw_mode);
        }
        Some("LB.ENV") | Some("LB_EX.ENV") => {
            hacks.add_line_action(7030, 15, lb_skip_baseball);
        }
        _ => {}
    }
    hacks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diskmark_selects_hack_table() {
        let gexe = Gameexe::from_text("DISKMARK = LB.ENV").unwrap();
        let hacks = hacks_for(&gexe);
        assert!(hacks.action_for(7030, 15).is_some());
        assert!(hacks.action_for(7030, 16).is_none());
    }

    #[test]
    fn test_unknown_diskmark_gets_no_hacks() {
        let gexe = Gameexe::from_text("DISKMARK = SOMETHING_ELSE.ENV").unwrap();
        assert!(hacks_for(&gexe).is_empty());
    }
}
