use crate::error::ErrorDetail;
use crate::text::window::TextWindow;
use std::collections::{BTreeMap, HashMap};

/// The colour-table index used for backlog text when replaying a historical
/// page.
const BACKLOG_COLOUR_INDEX: usize = 254;

/// One replayable step in a page's life.  Pages are append-only logs of
/// these; replaying the log against a cleared window of the same layout
/// reproduces the page exactly.
#[derive(Clone, Debug, PartialEq)]
enum PageElement {
    /// A run of printed characters and the lookahead character the last
    /// append saw (needed so kinsoku decisions replay identically).
    Text { chars: Vec<String>, next_char: String },
    /// A speaker name handed to the window as one atomic event.
    Name { name: String, next_char: String },
    HardBreak,
    ResetIndentation,
    SetIndentation,
    /// A colour-table index, resolved against the table at replay time.
    FontColour { index: usize },
    /// Selects the backlog colour when the page replays as history.
    SetToRightStartingColour,
    MarkRubyBegin,
    RubyText { text: String },
}

/// An append-only log of everything printed to one window since the last
/// page break, replayable for back-log display.
#[derive(Clone, Debug)]
pub struct TextPage {
    window_no: usize,
    elements: Vec<PageElement>,
    number_of_chars_on_page: usize,
    in_ruby_gloss: bool,
}

/// Maps window number to the page currently accumulating in that window.
pub type PageSet = BTreeMap<usize, TextPage>;

/// The text-colour palette from `#COLOR_TABLE.<n>` entries.
pub type ColourTable = HashMap<usize, [u8; 3]>;

impl TextPage {
    /// Constructor for a fresh page on the given window.  Every page starts
    /// with the colour-correcting element so backlog replays recolour
    /// themselves.
    pub fn new(window_no: usize) -> Self {
        TextPage {
            window_no,
            elements: vec![PageElement::SetToRightStartingColour],
            number_of_chars_on_page: 0,
            in_ruby_gloss: false,
        }
    }

    pub fn window_no(&self) -> usize {
        self.window_no
    }

    /// How many characters have been printed to this page, the input to the
    /// auto-mode time budget.
    pub fn number_of_chars_on_page(&self) -> usize {
        self.number_of_chars_on_page
    }

    /// True between a ruby-begin marker and its gloss text; the reveal
    /// operation renders such runs atomically.
    pub fn in_ruby_gloss(&self) -> bool {
        self.in_ruby_gloss
    }

    /// Prints one character, logging it for replay if the window accepted it.
    /// Returns whether the character was rendered (false means the window is
    /// full and the caller should paginate).
    pub fn character(
        &mut self,
        window: &mut TextWindow,
        current: &str,
        next: &str,
    ) -> Result<bool, ErrorDetail> {
        let rendered = window.display_char(current, next)?;
        if rendered {
            match self.elements.last_mut() {
                Some(PageElement::Text { chars, next_char }) => {
                    chars.push(current.to_string());
                    *next_char = next.to_string();
                }
                _ => self.elements.push(PageElement::Text {
                    chars: vec![current.to_string()],
                    next_char: next.to_string(),
                }),
            }
            self.number_of_chars_on_page += 1;
        }
        Ok(rendered)
    }

    /// Hands a speaker name to the window as a single display event.
    pub fn name(
        &mut self,
        window: &mut TextWindow,
        name: &str,
        next_char: &str,
    ) -> Result<(), ErrorDetail> {
        self.elements.push(PageElement::Name {
            name: name.to_string(),
            next_char: next_char.to_string(),
        });
        self.number_of_chars_on_page += 1;
        window.set_name(name, next_char)
    }

    pub fn hard_break(&mut self, window: &mut TextWindow) {
        self.elements.push(PageElement::HardBreak);
        window.hard_break();
    }

    pub fn reset_indentation(&mut self, window: &mut TextWindow) {
        self.elements.push(PageElement::ResetIndentation);
        window.reset_indentation();
    }

    pub fn set_indentation(&mut self, window: &mut TextWindow) {
        self.elements.push(PageElement::SetIndentation);
        window.set_indentation();
    }

    /// Switches the text colour to palette entry `index`.
    pub fn font_colour(
        &mut self,
        window: &mut TextWindow,
        colours: &ColourTable,
        index: usize,
    ) {
        self.elements.push(PageElement::FontColour { index });
        if let Some(rgb) = colours.get(&index) {
            window.set_font_colour(*rgb);
        }
    }

    pub fn mark_ruby_begin(&mut self, window: &mut TextWindow) {
        self.elements.push(PageElement::MarkRubyBegin);
        window.mark_ruby_begin();
        self.in_ruby_gloss = true;
    }

    pub fn ruby_text(&mut self, window: &mut TextWindow, text: &str) {
        self.elements.push(PageElement::RubyText {
            text: text.to_string(),
        });
        window.display_ruby_text(text);
        self.in_ruby_gloss = false;
    }

    /// Re-emits every logged element onto `window`.  When `is_active_page`
    /// is false the page is being shown as backlog: the opening colour
    /// element selects the backlog colour instead of the default, while
    /// layout-affecting elements replay exactly.
    pub fn replay(
        &self,
        window: &mut TextWindow,
        colours: &ColourTable,
        is_active_page: bool,
    ) -> Result<(), ErrorDetail> {
        for element in &self.elements {
            match element {
                PageElement::Text { chars, next_char } => {
                    for (i, c) in chars.iter().enumerate() {
                        let next = chars
                            .get(i + 1)
                            .map(|s| s.as_str())
                            .unwrap_or(next_char.as_str());
                        window.display_char(c, next)?;
                    }
                }
                PageElement::Name { name, next_char } => {
                    window.set_name(name, next_char)?;
                }
                PageElement::HardBreak => window.hard_break(),
                PageElement::ResetIndentation => window.reset_indentation(),
                PageElement::SetIndentation => window.set_indentation(),
                PageElement::FontColour { index } => {
                    if let Some(rgb) = colours.get(index) {
                        window.set_font_colour(*rgb);
                    }
                }
                PageElement::SetToRightStartingColour => {
                    if !is_active_page {
                        if let Some(rgb) = colours.get(&BACKLOG_COLOUR_INDEX) {
                            window.set_font_colour(*rgb);
                        }
                    }
                }
                PageElement::MarkRubyBegin => window.mark_ruby_begin(),
                PageElement::RubyText { text } => window.display_ruby_text(text),
            }
        }
        Ok(())
    }
}
