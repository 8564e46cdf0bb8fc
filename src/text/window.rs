use crate::error::ErrorDetail;
use crate::event::Point;
use crate::gameexe::Gameexe;
use crate::graphics::{Opacity, Rect, Size, Surface};
use std::rc::Rc;

/// Characters that may not begin a line (the "kinsoku" class): closing
/// punctuation, small kana and prolonged-sound marks.
const KINSOKU_MAY_NOT_START_LINE: &[char] = &[
    '。', '、', '，', '．', '」', '』', '）', '〉', '》', '】', '〕', '｝', '！', '？', 'ー',
    '…', '‥', 'ぁ', 'ぃ', 'ぅ', 'ぇ', 'ぉ', 'っ', 'ゃ', 'ゅ', 'ょ', 'ァ', 'ィ', 'ゥ', 'ェ',
    'ォ', 'ッ', 'ャ', 'ュ', 'ョ', '々', '゛', '゜',
];

/// Returns whether `c` belongs to the may-not-start-line set.
pub fn is_kinsoku(c: char) -> bool {
    KINSOKU_MAY_NOT_START_LINE.contains(&c)
}

/// Opening quote marks that pull the indentation point past themselves when
/// they immediately follow a speaker name.
const OPENING_QUOTES: &[char] = &['「', '『', '（'];

/// The window chrome buttons a click can land on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WindowButton {
    BacklogPrev,
    BacklogNext,
    AutoModeToggle,
    SkipToggle,
    HideInterface,
}

#[derive(Clone, Debug)]
struct ButtonRegion {
    button: WindowButton,
    rect: Rect,
}

/// The window decoration images: main frame, shaded backing, button strip.
#[derive(Clone, Default)]
pub struct Waku {
    pub main: Option<Rc<Surface>>,
    pub backing: Option<Rc<Surface>>,
    pub button: Option<Rc<Surface>>,
}

/// One on-screen text window: layout configuration, decoration, insertion
/// point state and the surface its glyph cells render into.
///
/// Font rasterisation is a host concern; the window works in fixed character
/// cells of `font_size` pixels, which keeps every layout decision (fit,
/// kinsoku, indentation) exact.
pub struct TextWindow {
    window_no: usize,
    screen_size: Size,

    // Layout, from #WINDOW.<n>.* entries.
    font_size: i32,
    x_window_size_in_chars: i32,
    y_window_size_in_chars: i32,
    x_spacing: i32,
    y_spacing: i32,
    ruby_size: i32,
    origin: i32,
    x_distance_from_origin: i32,
    y_distance_from_origin: i32,
    left_box_padding: i32,
    upper_box_padding: i32,
    keycursor_type: i32,
    keycursor_x: i32,
    keycursor_y: i32,
    name_mod: i32,
    /// (r, g, b, a, filter) backing colour.
    colour_attributes: [i32; 5],

    waku: Waku,
    buttons: Vec<ButtonRegion>,

    // Insertion state.
    insertion_point_x: i32,
    insertion_point_y: i32,
    current_indentation: i32,
    current_line_number: i32,
    font_colour: [u8; 3],
    default_colour: [u8; 3],
    ruby_begin_point: Option<i32>,
    visible: bool,

    surface: Surface,
    mouse_position: Point,
}

impl TextWindow {
    /// Constructor reading the window's layout from the Gameexe.  Missing
    /// keys fall back to a conventional 640x480 message window.
    pub fn from_gameexe(
        gexe: &Gameexe,
        window_no: usize,
        screen_size: Size,
    ) -> Result<Self, ErrorDetail> {
        let key = |sub: &str| Gameexe::key_with_index("WINDOW", window_no as i32, sub);
        let ints = |sub: &str| gexe.int_vector(&key(sub));

        let font_size = gexe.int(&key("MOJI_SIZE"), 16);
        let moji_cnt = ints("MOJI_CNT").unwrap_or_else(|| vec![22, 3]);
        let moji_rep = ints("MOJI_REP").unwrap_or_else(|| vec![0, 2]);
        let moji_pos = ints("MOJI_POS").unwrap_or_else(|| vec![0, 0]);
        let pos = ints("POS").unwrap_or_else(|| vec![2, 0, 16]);
        let keycur = ints("KEYCUR_MOD").unwrap_or_else(|| vec![0, 0, 0]);

        // Window colour: the shared #WINDOW_ATTR unless ATTR_MOD selects the
        // per-window #WINDOW.<n>.ATTR.
        let attr_source = if gexe.int(&key("ATTR_MOD"), 0) == 0 {
            gexe.int_vector("WINDOW_ATTR")
        } else {
            ints("ATTR")
        };
        let attr = attr_source.unwrap_or_else(|| vec![0, 0, 0, 192, 0]);
        let mut colour_attributes = [0, 0, 0, 192, 0];
        for (slot, value) in colour_attributes.iter_mut().zip(&attr) {
            *slot = *value;
        }

        let default_colour = gexe
            .int_vector("COLOR_TABLE.000")
            .map(|v| [v[0] as u8, v[1] as u8, v[2] as u8])
            .unwrap_or([255, 255, 255]);

        let mut window = TextWindow {
            window_no,
            screen_size,
            font_size,
            x_window_size_in_chars: *moji_cnt.first().unwrap_or(&22),
            y_window_size_in_chars: *moji_cnt.get(1).unwrap_or(&3),
            x_spacing: *moji_rep.first().unwrap_or(&0),
            y_spacing: *moji_rep.get(1).unwrap_or(&2),
            ruby_size: gexe.int(&key("LUBY_SIZE"), 0),
            origin: *pos.first().unwrap_or(&2),
            x_distance_from_origin: *pos.get(1).unwrap_or(&0),
            y_distance_from_origin: *pos.get(2).unwrap_or(&16),
            left_box_padding: *moji_pos.first().unwrap_or(&0),
            upper_box_padding: *moji_pos.get(1).unwrap_or(&0),
            keycursor_type: *keycur.first().unwrap_or(&0),
            keycursor_x: *keycur.get(1).unwrap_or(&0),
            keycursor_y: *keycur.get(2).unwrap_or(&0),
            name_mod: gexe.int(&key("NAME_MOD"), 0),
            colour_attributes,
            waku: Waku::default(),
            buttons: Vec::new(),
            insertion_point_x: 0,
            insertion_point_y: 0,
            current_indentation: 0,
            current_line_number: 0,
            font_colour: default_colour,
            default_colour,
            ruby_begin_point: None,
            visible: false,
            surface: Surface::new(1, 1),
            mouse_position: Point::default(),
        };
        window.read_buttons(gexe)?;
        window.clear();
        Ok(window)
    }

    /// Reads the chrome button rectangles from the window's waku set.
    fn read_buttons(&mut self, gexe: &Gameexe) -> Result<(), ErrorDetail> {
        let set = gexe.int(
            &Gameexe::key_with_index("WINDOW", self.window_no as i32, "WAKU_SETNO"),
            0,
        );
        let boxes = [
            ("MSGBKLEFT_BOX", WindowButton::BacklogPrev),
            ("MSGBKRIGHT_BOX", WindowButton::BacklogNext),
            ("AUTOMODE_BOX", WindowButton::AutoModeToggle),
            ("READJUMP_BOX", WindowButton::SkipToggle),
            ("CLEAR_BOX", WindowButton::HideInterface),
        ];
        for (name, button) in boxes {
            let key = format!("WAKU.{:03}.000.{}", set, name);
            if let Some(v) = gexe.int_vector(&key) {
                // Layout is (use, x, y, w, h); use 0 disables the button.
                if v.len() >= 5 && v[0] != 0 {
                    self.buttons.push(ButtonRegion {
                        button,
                        rect: Rect::rec(v[1], v[2], v[3], v[4]),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn window_no(&self) -> usize {
        self.window_no
    }

    /// Installs the decoration images once the host has loaded them.
    pub fn set_waku(&mut self, waku: Waku) {
        self.waku = waku;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Width of the text area in pixels.
    pub fn text_window_width(&self) -> i32 {
        self.x_window_size_in_chars * (self.font_size + self.x_spacing)
    }

    /// Height of the text area in pixels.
    pub fn text_window_height(&self) -> i32 {
        self.y_window_size_in_chars * (self.font_size + self.y_spacing + self.ruby_size)
    }

    /// X of the window box, resolved through the origin mode.
    pub fn box_x1(&self) -> Result<i32, ErrorDetail> {
        match self.origin {
            0 | 2 => Ok(self.x_distance_from_origin),
            1 | 3 => Ok(self.screen_size.width
                - self.x_distance_from_origin
                - self.text_window_width()
                - self.left_box_padding),
            _ => Err(ErrorDetail::MalformedScenario {
                reason: format!("invalid window origin {}", self.origin),
            }),
        }
    }

    /// Y of the window box, resolved through the origin mode.
    pub fn box_y1(&self) -> Result<i32, ErrorDetail> {
        match self.origin {
            0 | 1 => Ok(self.y_distance_from_origin),
            2 | 3 => Ok(self.screen_size.height
                - self.y_distance_from_origin
                - self.text_window_height()
                - self.upper_box_padding),
            _ => Err(ErrorDetail::MalformedScenario {
                reason: format!("invalid window origin {}", self.origin),
            }),
        }
    }

    pub fn text_x1(&self) -> Result<i32, ErrorDetail> {
        Ok(self.box_x1()? + self.left_box_padding)
    }

    pub fn text_y1(&self) -> Result<i32, ErrorDetail> {
        Ok(self.box_y1()? + self.upper_box_padding)
    }

    /// Where the pause key-cursor draws, resolved through the keycursor mode.
    pub fn keycursor_position(&self) -> Result<Point, ErrorDetail> {
        match self.keycursor_type {
            0 => Ok(Point::new(
                self.text_x1()? + self.text_window_width(),
                self.text_y1()? + self.text_window_height(),
            )),
            1 => Ok(Point::new(
                self.text_x1()? + self.insertion_point_x,
                self.text_y1()? + self.insertion_point_y,
            )),
            2 => Ok(Point::new(
                self.text_x1()? + self.keycursor_x,
                self.text_y1()? + self.keycursor_y,
            )),
            _ => Err(ErrorDetail::MalformedScenario {
                reason: format!("invalid keycursor type {}", self.keycursor_type),
            }),
        }
    }

    /// Resets the insertion point and text surface for a fresh page.
    pub fn clear(&mut self) {
        self.insertion_point_x = 0;
        self.insertion_point_y = self.ruby_size;
        self.current_indentation = 0;
        self.current_line_number = 0;
        self.ruby_begin_point = None;
        self.font_colour = self.default_colour;
        self.surface = Surface::new(self.text_window_width(), self.text_window_height());
    }

    /// Renders `current` at the insertion point and advances it, applying
    /// the line-breaking rules.  Returns false (without rendering) when the
    /// window is full.
    ///
    /// If `current` fits but is not kinsoku while `next` both is kinsoku and
    /// would not fit, the break happens before `current` so `next` is not
    /// stranded at a line start.
    pub fn display_char(&mut self, current: &str, next: &str) -> Result<bool, ErrorDetail> {
        if self.is_full() {
            return Ok(false);
        }
        let current_char = match current.chars().next() {
            Some(c) => c,
            None => return Ok(true),
        };
        if current_char == '【' || current_char == '】' {
            return Err(ErrorDetail::MalformedScenario {
                reason: "name construct should be handled before display_char".to_string(),
            });
        }
        self.visible = true;

        let advance = self.font_size + self.x_spacing;
        let char_will_fit = self.insertion_point_x + advance <= self.text_window_width();
        let next_char_will_fit = self.insertion_point_x + 2 * advance <= self.text_window_width();
        let next_is_kinsoku = next.chars().next().map(is_kinsoku).unwrap_or(false);

        if !char_will_fit
            || (char_will_fit
                && !is_kinsoku(current_char)
                && !next_char_will_fit
                && next_is_kinsoku)
        {
            self.hard_break();
            if self.is_full() {
                return Ok(false);
            }
        }

        // Fixed-cell glyph: fill the cell with the current text colour.
        let [r, g, b] = self.font_colour;
        self.surface.fill_rect(
            Rect::rec(
                self.insertion_point_x,
                self.insertion_point_y,
                self.font_size,
                self.font_size,
            ),
            r,
            g,
            b,
            255,
        );
        self.insertion_point_x += advance;
        Ok(true)
    }

    /// Whether the line count has reached the window's maximum.
    pub fn is_full(&self) -> bool {
        self.current_line_number >= self.y_window_size_in_chars
    }

    /// Breaks to the next line at the stored indentation.
    pub fn hard_break(&mut self) {
        self.insertion_point_x = self.current_indentation;
        self.insertion_point_y += self.font_size + self.y_spacing + self.ruby_size;
        self.current_line_number += 1;
    }

    /// Stores the current x as the indentation for wrapped lines.
    pub fn set_indentation(&mut self) {
        self.current_indentation = self.insertion_point_x;
    }

    pub fn reset_indentation(&mut self) {
        self.current_indentation = 0;
    }

    /// Renders a speaker name in one pass and arranges indentation so
    /// wrapped dialogue lines align after it.
    pub fn set_name(&mut self, name: &str, next_char: &str) -> Result<(), ErrorDetail> {
        match self.name_mod {
            0 => {
                let chars: Vec<String> = name.chars().map(|c| c.to_string()).collect();
                for (i, c) in chars.iter().enumerate() {
                    let next = chars
                        .get(i + 1)
                        .map(|s| s.as_str())
                        .unwrap_or(next_char);
                    self.display_char(c, next)?;
                }
                self.set_indentation();
                self.set_indentation_if_next_char_is_opening_quote(next_char);
                Ok(())
            }
            1 => Err(ErrorDetail::UnsupportedFeature {
                what: "NAME_MOD=1".to_string(),
            }),
            2 => {
                // Name goes to a dedicated name waku; the main window's
                // indentation is untouched.
                Ok(())
            }
            other => Err(ErrorDetail::MalformedScenario {
                reason: format!("invalid NAME_MOD {}", other),
            }),
        }
    }

    fn set_indentation_if_next_char_is_opening_quote(&mut self, next_char: &str) {
        if let Some(c) = next_char.chars().next() {
            if OPENING_QUOTES.contains(&c) {
                self.current_indentation =
                    self.insertion_point_x + self.font_size + self.x_spacing;
            }
        }
    }

    pub fn set_font_colour(&mut self, rgb: [u8; 3]) {
        self.font_colour = rgb;
    }

    /// Marks the start of a run of main text that will receive a ruby gloss.
    pub fn mark_ruby_begin(&mut self) {
        self.ruby_begin_point = Some(self.insertion_point_x);
    }

    /// True while a ruby-begin marker is open.
    pub fn in_ruby_gloss(&self) -> bool {
        self.ruby_begin_point.is_some()
    }

    /// Draws the gloss text in the ruby strip above the glossed run.
    pub fn display_ruby_text(&mut self, text: &str) {
        if let Some(begin) = self.ruby_begin_point.take() {
            if self.ruby_size <= 0 {
                return;
            }
            let end = self.insertion_point_x;
            let count = text.chars().count() as i32;
            if count == 0 || end <= begin {
                return;
            }
            let step = (end - begin) / count;
            let [r, g, b] = self.font_colour;
            for i in 0..count {
                self.surface.fill_rect(
                    Rect::rec(
                        begin + i * step,
                        self.insertion_point_y - self.ruby_size,
                        self.ruby_size,
                        self.ruby_size,
                    ),
                    r,
                    g,
                    b,
                    255,
                );
            }
        }
    }

    /// The insertion point as (x, y, line), exposed for layout assertions.
    pub fn insertion_point(&self) -> (i32, i32, i32) {
        (
            self.insertion_point_x,
            self.insertion_point_y,
            self.current_line_number,
        )
    }

    pub fn current_indentation(&self) -> i32 {
        self.current_indentation
    }

    pub fn set_mouse_position(&mut self, point: Point) {
        self.mouse_position = point;
    }

    /// Returns which chrome button (if any) the point lands on.  Button
    /// rectangles are relative to the window box.
    pub fn button_at(&self, point: Point) -> Result<Option<WindowButton>, ErrorDetail> {
        if !self.visible {
            return Ok(None);
        }
        let origin = Point::new(self.box_x1()?, self.box_y1()?);
        for region in &self.buttons {
            let absolute = Rect::rec(
                origin.x + region.rect.x,
                origin.y + region.rect.y,
                region.rect.width,
                region.rect.height,
            );
            if absolute.contains(point) {
                return Ok(Some(region.button));
            }
        }
        Ok(None)
    }

    /// Composites the window onto the output frame: backing colour, waku
    /// images, then the text surface, then the key cursor when requested.
    pub fn render(&self, screen: &mut Surface, draw_keycursor: bool) -> Result<(), ErrorDetail> {
        if !self.visible {
            return Ok(());
        }
        let box_rect = Rect::rec(
            self.box_x1()?,
            self.box_y1()?,
            self.text_window_width() + self.left_box_padding * 2,
            self.text_window_height() + self.upper_box_padding * 2,
        );
        let [r, g, b, a, _filter] = self.colour_attributes;
        match &self.waku.backing {
            Some(backing) => backing.blit_to(
                screen,
                backing.rect(),
                box_rect,
                Opacity::Uniform(a.clamp(0, 255) as u8),
            ),
            None => screen.fill_rect(
                box_rect,
                r.clamp(0, 255) as u8,
                g.clamp(0, 255) as u8,
                b.clamp(0, 255) as u8,
                a.clamp(0, 255) as u8,
            ),
        }
        if let Some(main) = &self.waku.main {
            main.blit_to(screen, main.rect(), box_rect, Opacity::Uniform(255));
        }
        if let Some(button) = &self.waku.button {
            button.blit_to(screen, button.rect(), box_rect, Opacity::Uniform(255));
        }

        let text_dst = Rect::rec(
            self.text_x1()?,
            self.text_y1()?,
            self.text_window_width(),
            self.text_window_height(),
        );
        self.surface
            .blit_to(screen, self.surface.rect(), text_dst, Opacity::Uniform(255));

        if draw_keycursor {
            let cursor = self.keycursor_position()?;
            let size = (self.font_size / 2).max(4);
            screen.fill_rect(
                Rect::rec(cursor.x - size, cursor.y - size, size, size),
                255,
                255,
                255,
                255,
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A 20x3 window of 16 px cells with no spacing, at the top-left.
    fn setup_test_window() -> TextWindow {
        let gexe = Gameexe::from_text(
            r#"
#WINDOW.000.MOJI_SIZE = 16
#WINDOW.000.MOJI_CNT = 20, 3
#WINDOW.000.MOJI_REP = 0, 0
#WINDOW.000.POS = 0, 0, 0
"#,
        )
        .unwrap();
        TextWindow::from_gameexe(&gexe, 0, Size::new(640, 480)).unwrap()
    }

    #[test]
    fn test_five_characters_advance_eighty_pixels() {
        let mut window = setup_test_window();
        let text = "hello";
        let chars: Vec<String> = text.chars().map(|c| c.to_string()).collect();
        for (i, c) in chars.iter().enumerate() {
            let next = chars.get(i + 1).map(|s| s.as_str()).unwrap_or("");
            assert!(window.display_char(c, next).unwrap());
        }
        assert_eq!(window.insertion_point(), (80, 0, 0));
        assert!(!window.is_full());
    }

    #[test]
    fn test_overflow_wraps_to_next_line() {
        let mut window = setup_test_window();
        for _ in 0..21 {
            window.display_char("x", "x").unwrap();
        }
        let (x, _, line) = window.insertion_point();
        assert_eq!(line, 1);
        assert_eq!(x, 16);
    }

    #[test]
    fn test_kinsoku_breaks_before_current_to_keep_pair_together() {
        let mut window = setup_test_window();
        // Fill 19 of the 20 columns.
        for _ in 0..19 {
            window.display_char("…", "…").unwrap();
        }
        // "a" fits in the final column, but the following "。" would not and
        // may not start a line; the break happens before "a".
        assert!(window.display_char("a", "。").unwrap());
        assert_eq!(window.insertion_point(), (16, 16, 1));
        assert!(window.display_char("。", "b").unwrap());
        assert!(window.display_char("b", "").unwrap());
        assert_eq!(window.insertion_point(), (48, 16, 1));
    }

    #[test]
    fn test_kinsoku_character_itself_may_end_a_line() {
        let mut window = setup_test_window();
        for _ in 0..19 {
            window.display_char("x", "x").unwrap();
        }
        // A kinsoku char in the last column stays there; no orphan rule.
        assert!(window.display_char("。", "b").unwrap());
        assert_eq!(window.insertion_point(), (320, 0, 0));
        assert!(window.display_char("b", "").unwrap());
        assert_eq!(window.insertion_point(), (16, 16, 1));
    }

    #[test]
    fn test_is_full_after_three_lines() {
        let mut window = setup_test_window();
        for _ in 0..3 {
            window.hard_break();
        }
        assert!(window.is_full());
        assert!(!window.display_char("x", "").unwrap());
    }

    #[test]
    fn test_indentation_applies_on_break() {
        let mut window = setup_test_window();
        window.display_char("a", "b").unwrap();
        window.display_char("b", "").unwrap();
        window.set_indentation();
        window.hard_break();
        let (x, _, line) = window.insertion_point();
        assert_eq!((x, line), (32, 1));
        window.reset_indentation();
        window.hard_break();
        let (x, _, _) = window.insertion_point();
        assert_eq!(x, 0);
    }

    #[test]
    fn test_set_name_indents_past_opening_quote() {
        let mut window = setup_test_window();
        window.set_name("朋也", "「").unwrap();
        // Two name cells rendered, indentation lands one cell further on.
        assert_eq!(window.insertion_point().0, 32);
        assert_eq!(window.current_indentation(), 48);
    }

    #[test]
    fn test_set_name_without_quote_indents_at_insertion_point() {
        let mut window = setup_test_window();
        window.set_name("渚", "そ").unwrap();
        assert_eq!(window.current_indentation(), 16);
    }

    #[test]
    fn test_name_mod_one_is_unsupported() {
        let gexe = Gameexe::from_text("#WINDOW.000.NAME_MOD = 1").unwrap();
        let mut window = TextWindow::from_gameexe(&gexe, 0, Size::new(640, 480)).unwrap();
        assert_eq!(
            window.set_name("x", "").unwrap_err(),
            ErrorDetail::UnsupportedFeature {
                what: "NAME_MOD=1".to_string()
            }
        );
    }

    #[test]
    fn test_lenticular_brackets_are_rejected_here() {
        let mut window = setup_test_window();
        assert!(matches!(
            window.display_char("【", "x").unwrap_err(),
            ErrorDetail::MalformedScenario { .. }
        ));
    }

    #[test]
    fn test_clear_resets_insertion_state() {
        let mut window = setup_test_window();
        window.display_char("x", "y").unwrap();
        window.set_indentation();
        window.hard_break();
        window.clear();
        assert_eq!(window.insertion_point(), (0, 0, 0));
        assert_eq!(window.current_indentation(), 0);
    }

    #[test]
    fn test_keycursor_modes() {
        let gexe = Gameexe::from_text(
            r#"
#WINDOW.000.MOJI_SIZE = 16
#WINDOW.000.MOJI_CNT = 20, 3
#WINDOW.000.MOJI_REP = 0, 0
#WINDOW.000.POS = 0, 10, 20
#WINDOW.000.KEYCUR_MOD = 2, 5, 7
"#,
        )
        .unwrap();
        let window = TextWindow::from_gameexe(&gexe, 0, Size::new(640, 480)).unwrap();
        assert_eq!(window.keycursor_position().unwrap(), Point::new(15, 27));
    }

    #[test]
    fn test_bottom_origin_window_sits_above_bottom_edge() {
        let gexe = Gameexe::from_text(
            r#"
#WINDOW.000.MOJI_SIZE = 16
#WINDOW.000.MOJI_CNT = 20, 3
#WINDOW.000.MOJI_REP = 0, 0
#WINDOW.000.POS = 2, 0, 16
"#,
        )
        .unwrap();
        let window = TextWindow::from_gameexe(&gexe, 0, Size::new(640, 480)).unwrap();
        // 480 - 16 - 48 = 416.
        assert_eq!(window.box_y1().unwrap(), 416);
        assert_eq!(window.box_x1().unwrap(), 0);
    }

    #[test]
    fn test_button_hit_testing() {
        let gexe = Gameexe::from_text(
            r#"
#WINDOW.000.MOJI_SIZE = 16
#WINDOW.000.MOJI_CNT = 20, 3
#WINDOW.000.MOJI_REP = 0, 0
#WINDOW.000.POS = 0, 100, 200
#WINDOW.000.WAKU_SETNO = 0
#WAKU.000.000.MSGBKLEFT_BOX = 1, 4, 4, 10, 10
#WAKU.000.000.AUTOMODE_BOX = 0, 20, 4, 10, 10
"#,
        )
        .unwrap();
        let mut window = TextWindow::from_gameexe(&gexe, 0, Size::new(640, 480)).unwrap();
        window.set_visible(true);
        assert_eq!(
            window.button_at(Point::new(105, 205)).unwrap(),
            Some(WindowButton::BacklogPrev)
        );
        // AUTOMODE_BOX has use=0 and is not active.
        assert_eq!(window.button_at(Point::new(125, 205)).unwrap(), None);
        window.set_visible(false);
        assert_eq!(window.button_at(Point::new(105, 205)).unwrap(), None);
    }
}
