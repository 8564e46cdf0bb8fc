pub mod page;
pub mod window;

use crate::error::ErrorDetail;
use crate::event::Point;
use crate::gameexe::Gameexe;
use crate::graphics::{Size, Surface};
use crate::text::page::{ColourTable, PageSet, TextPage};
use crate::text::window::{TextWindow, WindowButton};
use std::collections::BTreeMap;

/// The text-output half of the engine: windows, the current page set, the
/// frozen page history for the back-log, and the auto/skip mode state that
/// the pause machinery consults.
pub struct TextSystem {
    windows: BTreeMap<usize, TextWindow>,
    active_window: usize,
    pages: PageSet,
    history: Vec<PageSet>,
    backlog_cursor: Option<usize>,
    colours: ColourTable,

    auto_mode: bool,
    auto_base_time: u32,
    auto_char_time: u32,
    message_speed: i32,
    ctrl_key_skip: bool,
    skip_mode: bool,
    in_pause_state: bool,
    system_visible: bool,
}

impl TextSystem {
    /// Constructor reading every `#WINDOW.<n>` block in the Gameexe.  A
    /// configuration with no window entries still gets window 0 with the
    /// built-in defaults.
    pub fn new(gexe: &Gameexe, screen_size: Size) -> Result<Self, ErrorDetail> {
        let mut window_numbers: Vec<usize> = gexe
            .filtering("WINDOW")
            .filter_map(|entry| entry.key_parts().get(1).and_then(|s| s.parse().ok()))
            .collect();
        window_numbers.sort_unstable();
        window_numbers.dedup();
        if window_numbers.is_empty() {
            window_numbers.push(0);
        }

        let mut windows = BTreeMap::new();
        let mut pages = PageSet::new();
        for number in window_numbers {
            windows.insert(number, TextWindow::from_gameexe(gexe, number, screen_size)?);
            pages.insert(number, TextPage::new(number));
        }

        let mut colours = ColourTable::new();
        for entry in gexe.filtering("COLOR_TABLE") {
            if let (Some(index), Some(rgb)) = (
                entry.key_parts().get(1).and_then(|s| s.parse().ok()),
                entry.to_int_vector(),
            ) {
                if rgb.len() >= 3 {
                    colours.insert(index, [rgb[0] as u8, rgb[1] as u8, rgb[2] as u8]);
                }
            }
        }

        let active_window = *windows.keys().next().unwrap();
        Ok(TextSystem {
            windows,
            active_window,
            pages,
            history: Vec::new(),
            backlog_cursor: None,
            colours,
            auto_mode: false,
            auto_base_time: gexe.int("MESSAGE_KEY_WAIT_TIME", 1500) as u32,
            auto_char_time: 50,
            message_speed: gexe.int("INIT_MESSAGE_SPEED", 30),
            ctrl_key_skip: gexe.int("CTRL_USE", 1) != 0,
            skip_mode: false,
            in_pause_state: false,
            system_visible: true,
        })
    }

    // ---------------------------------------------------------- [ windows ]

    pub fn active_window(&self) -> usize {
        self.active_window
    }

    /// Switches text output to another window, creating its page if needed.
    pub fn set_active_window(&mut self, number: usize) -> Result<(), ErrorDetail> {
        if !self.windows.contains_key(&number) {
            return Err(ErrorDetail::BadOpcodeArguments {
                name: "set_active_window".to_string(),
                reason: format!("no window {}", number),
            });
        }
        self.active_window = number;
        self.pages
            .entry(number)
            .or_insert_with(|| TextPage::new(number));
        Ok(())
    }

    pub fn window(&self, number: usize) -> Option<&TextWindow> {
        self.windows.get(&number)
    }

    pub fn window_mut(&mut self, number: usize) -> Option<&mut TextWindow> {
        self.windows.get_mut(&number)
    }

    // ------------------------------------------------- [ page operations ]

    /// Prints one character on the active page.  Returns whether it was
    /// rendered; false means the page is full.
    pub fn page_character(&mut self, current: &str, next: &str) -> Result<bool, ErrorDetail> {
        let window = self.windows.get_mut(&self.active_window).unwrap();
        let page = self
            .pages
            .entry(self.active_window)
            .or_insert_with(|| TextPage::new(self.active_window));
        page.character(window, current, next)
    }

    pub fn page_name(&mut self, name: &str, next_char: &str) -> Result<(), ErrorDetail> {
        let window = self.windows.get_mut(&self.active_window).unwrap();
        let page = self
            .pages
            .entry(self.active_window)
            .or_insert_with(|| TextPage::new(self.active_window));
        page.name(window, name, next_char)
    }

    pub fn page_hard_break(&mut self) {
        let window = self.windows.get_mut(&self.active_window).unwrap();
        if let Some(page) = self.pages.get_mut(&self.active_window) {
            page.hard_break(window);
        }
    }

    pub fn page_reset_indentation(&mut self) {
        let window = self.windows.get_mut(&self.active_window).unwrap();
        if let Some(page) = self.pages.get_mut(&self.active_window) {
            page.reset_indentation(window);
        }
    }

    pub fn page_set_indentation(&mut self) {
        let window = self.windows.get_mut(&self.active_window).unwrap();
        if let Some(page) = self.pages.get_mut(&self.active_window) {
            page.set_indentation(window);
        }
    }

    pub fn page_font_colour(&mut self, index: usize) {
        let window = self.windows.get_mut(&self.active_window).unwrap();
        if let Some(page) = self.pages.get_mut(&self.active_window) {
            page.font_colour(window, &self.colours, index);
        }
    }

    pub fn page_mark_ruby_begin(&mut self) {
        let window = self.windows.get_mut(&self.active_window).unwrap();
        if let Some(page) = self.pages.get_mut(&self.active_window) {
            page.mark_ruby_begin(window);
        }
    }

    pub fn page_ruby_text(&mut self, text: &str) {
        let window = self.windows.get_mut(&self.active_window).unwrap();
        if let Some(page) = self.pages.get_mut(&self.active_window) {
            page.ruby_text(window, text);
        }
    }

    /// Whether the active page is mid-ruby; the reveal operation renders
    /// such text atomically.
    pub fn in_ruby_gloss(&self) -> bool {
        self.pages
            .get(&self.active_window)
            .map(|p| p.in_ruby_gloss())
            .unwrap_or(false)
    }

    /// Whether the active window has no room for another line.
    pub fn page_is_full(&self) -> bool {
        self.windows
            .get(&self.active_window)
            .map(|w| w.is_full())
            .unwrap_or(false)
    }

    pub fn current_page_char_count(&self) -> usize {
        self.pages
            .get(&self.active_window)
            .map(|p| p.number_of_chars_on_page())
            .unwrap_or(0)
    }

    // ------------------------------------------------ [ pagination, log ]

    /// Freezes the current page set into the back-log history.
    pub fn snapshot(&mut self) {
        self.history.push(self.pages.clone());
    }

    /// Clears the active window and begins accumulating a fresh page on it.
    pub fn start_new_page(&mut self) {
        if let Some(window) = self.windows.get_mut(&self.active_window) {
            window.clear();
        }
        self.pages
            .insert(self.active_window, TextPage::new(self.active_window));
    }

    /// Steps the back-log cursor one page older and redraws from history.
    pub fn back_page(&mut self) -> Result<(), ErrorDetail> {
        let target = match self.backlog_cursor {
            None if !self.history.is_empty() => self.history.len() - 1,
            Some(i) if i > 0 => i - 1,
            _ => return Ok(()),
        };
        self.backlog_cursor = Some(target);
        self.replay_view()
    }

    /// Steps the back-log cursor one page newer, returning to the live page
    /// set when it moves past the newest snapshot.
    pub fn forward_page(&mut self) -> Result<(), ErrorDetail> {
        match self.backlog_cursor {
            Some(i) if i + 1 < self.history.len() => {
                self.backlog_cursor = Some(i + 1);
                self.replay_view()
            }
            Some(_) => self.stop_reading_backlog(),
            None => Ok(()),
        }
    }

    /// True while the rendered content comes from history.
    pub fn is_reading_backlog(&self) -> bool {
        self.backlog_cursor.is_some()
    }

    /// Returns to the live page set and replays it into the windows.
    pub fn stop_reading_backlog(&mut self) -> Result<(), ErrorDetail> {
        self.backlog_cursor = None;
        self.replay_view()
    }

    /// Redraws every window from the page set the cursor selects.
    fn replay_view(&mut self) -> Result<(), ErrorDetail> {
        let is_active_page = self.backlog_cursor.is_none();
        let view: PageSet = match self.backlog_cursor {
            Some(i) => self.history[i].clone(),
            None => self.pages.clone(),
        };
        for (number, page) in &view {
            if let Some(window) = self.windows.get_mut(number) {
                window.clear();
                page.replay(window, &self.colours, is_active_page)?;
            }
        }
        Ok(())
    }

    pub fn backlog_depth(&self) -> usize {
        self.history.len()
    }

    // ------------------------------------------------------ [ mode state ]

    pub fn auto_mode(&self) -> bool {
        self.auto_mode
    }

    pub fn set_auto_mode(&mut self, on: bool) {
        self.auto_mode = on;
    }

    /// The auto-mode budget for a page of `num_chars` characters.
    pub fn auto_time(&self, num_chars: usize) -> u32 {
        self.auto_base_time + self.auto_char_time * num_chars as u32
    }

    /// Overrides the auto-mode timing parameters.
    pub fn set_auto_times(&mut self, base_time: u32, char_time: u32) {
        self.auto_base_time = base_time;
        self.auto_char_time = char_time;
    }

    pub fn message_speed(&self) -> i32 {
        self.message_speed
    }

    pub fn ctrl_key_skip(&self) -> bool {
        self.ctrl_key_skip
    }

    /// The read-skip toggle flipped by the window's skip button.
    pub fn skip_mode(&self) -> bool {
        self.skip_mode
    }

    pub fn set_skip_mode(&mut self, on: bool) {
        self.skip_mode = on;
    }

    pub fn in_pause_state(&self) -> bool {
        self.in_pause_state
    }

    pub fn set_in_pause_state(&mut self, in_pause: bool) {
        self.in_pause_state = in_pause;
    }

    pub fn system_visible(&self) -> bool {
        self.system_visible
    }

    pub fn set_system_visible(&mut self, visible: bool) {
        self.system_visible = visible;
    }

    // ---------------------------------------------------------- [ input ]

    pub fn set_mouse_position(&mut self, point: Point) {
        for window in self.windows.values_mut() {
            window.set_mouse_position(point);
        }
    }

    /// Returns the chrome button under `point`, if any visible window has
    /// one there.
    pub fn button_at(&self, point: Point) -> Result<Option<WindowButton>, ErrorDetail> {
        for window in self.windows.values() {
            if let Some(button) = window.button_at(point)? {
                return Ok(Some(button));
            }
        }
        Ok(None)
    }

    // --------------------------------------------------------- [ render ]

    /// Draws every visible window onto the output frame; the key cursor is
    /// drawn on the active window while a pause is waiting for input.
    pub fn render(&self, screen: &mut Surface) -> Result<(), ErrorDetail> {
        if !self.system_visible {
            return Ok(());
        }
        for (number, window) in &self.windows {
            let draw_keycursor = self.in_pause_state
                && *number == self.active_window
                && !self.is_reading_backlog();
            window.render(screen, draw_keycursor)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_test_text_system() -> TextSystem {
        let gexe = Gameexe::from_text(
            r#"
#WINDOW.000.MOJI_SIZE = 16
#WINDOW.000.MOJI_CNT = 20, 3
#WINDOW.000.MOJI_REP = 0, 0
#WINDOW.000.POS = 0, 0, 0
#COLOR_TABLE.000 = 255, 255, 255
#COLOR_TABLE.001 = 255, 255, 0
#COLOR_TABLE.254 = 120, 120, 120
"#,
        )
        .unwrap();
        TextSystem::new(&gexe, Size::new(640, 480)).unwrap()
    }

    fn type_string(system: &mut TextSystem, s: &str) {
        let chars: Vec<String> = s.chars().map(|c| c.to_string()).collect();
        for (i, c) in chars.iter().enumerate() {
            let next = chars.get(i + 1).map(|x| x.as_str()).unwrap_or("");
            system.page_character(c, next).unwrap();
        }
    }

    #[test]
    fn test_page_char_count_tracks_rendered_characters() {
        let mut system = setup_test_text_system();
        type_string(&mut system, "hello");
        assert_eq!(system.current_page_char_count(), 5);
    }

    #[test]
    fn test_auto_time_combines_base_and_per_char() {
        let mut system = setup_test_text_system();
        system.set_auto_times(1000, 50);
        assert_eq!(system.auto_time(40), 3000);
    }

    #[test]
    fn test_replay_reproduces_insertion_point() {
        let mut system = setup_test_text_system();
        type_string(&mut system, "hello");
        system.page_set_indentation();
        system.page_hard_break();
        type_string(&mut system, "world");
        let original = system.window(0).unwrap().insertion_point();

        // Redraw the live view from the replay log and compare.
        system.replay_view().unwrap();
        assert_eq!(system.window(0).unwrap().insertion_point(), original);
    }

    #[test]
    fn test_new_page_resets_window_and_page() {
        let mut system = setup_test_text_system();
        type_string(&mut system, "some text");
        system.snapshot();
        system.start_new_page();
        assert_eq!(system.current_page_char_count(), 0);
        assert!(!system.page_is_full());
        assert_eq!(system.window(0).unwrap().insertion_point(), (0, 0, 0));
        assert_eq!(system.backlog_depth(), 1);
    }

    #[test]
    fn test_backlog_navigation_flags() {
        let mut system = setup_test_text_system();
        type_string(&mut system, "page one");
        system.snapshot();
        system.start_new_page();
        type_string(&mut system, "page two");

        assert!(!system.is_reading_backlog());
        system.back_page().unwrap();
        assert!(system.is_reading_backlog());
        // Forward past the newest snapshot returns to the live page.
        system.forward_page().unwrap();
        assert!(!system.is_reading_backlog());
    }

    #[test]
    fn test_back_page_stops_at_oldest_snapshot() {
        let mut system = setup_test_text_system();
        type_string(&mut system, "one");
        system.snapshot();
        system.start_new_page();
        type_string(&mut system, "two");
        system.snapshot();
        system.start_new_page();

        system.back_page().unwrap();
        system.back_page().unwrap();
        assert!(system.is_reading_backlog());
        // Already at the oldest page; another back is a no-op.
        system.back_page().unwrap();
        assert!(system.is_reading_backlog());
    }

    #[test]
    fn test_stop_reading_backlog_restores_live_page() {
        let mut system = setup_test_text_system();
        type_string(&mut system, "history");
        system.snapshot();
        system.start_new_page();
        type_string(&mut system, "live");
        let live_point = system.window(0).unwrap().insertion_point();

        system.back_page().unwrap();
        assert_ne!(system.window(0).unwrap().insertion_point(), live_point);
        system.stop_reading_backlog().unwrap();
        assert_eq!(system.window(0).unwrap().insertion_point(), live_point);
    }

    #[test]
    fn test_ruby_gloss_flag_follows_markers() {
        let mut system = setup_test_text_system();
        assert!(!system.in_ruby_gloss());
        system.page_mark_ruby_begin();
        assert!(system.in_ruby_gloss());
        type_string(&mut system, "漢字");
        system.page_ruby_text("かんじ");
        assert!(!system.in_ruby_gloss());
    }
}
