use crate::error::ErrorDetail;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// A single value in a Gameexe entry.  Entries mix integers and quoted strings
/// freely, so values are kept as a tagged list rather than coerced up front.
#[derive(Debug, Clone, PartialEq)]
pub enum GameexeToken {
    Int(i32),
    Str(String),
}

/// One `#KEY.000.SUB = ...` line from the configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct GameexeEntry {
    key: String,
    tokens: Vec<GameexeToken>,
}

impl GameexeEntry {
    /// Returns the full dotted key of this entry.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the dot-separated segments of the key.
    pub fn key_parts(&self) -> Vec<&str> {
        self.key.split('.').collect()
    }

    /// Returns the integer at token position `index`, if present and numeric.
    pub fn int_at(&self, index: usize) -> Option<i32> {
        match self.tokens.get(index) {
            Some(GameexeToken::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string at token position `index`, if present and textual.
    pub fn str_at(&self, index: usize) -> Option<&str> {
        match self.tokens.get(index) {
            Some(GameexeToken::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns every token coerced to an integer, or `None` if any token is a
    /// string.  Used for the all-integer vector entries (#SEL, #WINDOW_ATTR,
    /// #COLOR_TABLE).
    pub fn to_int_vector(&self) -> Option<Vec<i32>> {
        self.tokens
            .iter()
            .map(|t| match t {
                GameexeToken::Int(v) => Some(*v),
                GameexeToken::Str(_) => None,
            })
            .collect()
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

/// The engine configuration database, loaded once at startup and treated as
/// read-only afterwards.
///
/// Keys are dotted paths (`WINDOW.003.MOJI_SIZE`); numeric path segments are
/// stored zero-padded to three digits exactly as they appear in the file, and
/// [Gameexe::key_with_index] reproduces that padding for lookups.
#[derive(Debug)]
pub struct Gameexe {
    entries: Vec<GameexeEntry>,
    index: HashMap<String, usize>,
}

impl Gameexe {
    /// Returns an empty configuration (used by tests that build entries
    /// programmatically via [Gameexe::parse_line]).
    pub fn empty() -> Self {
        Gameexe {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Parses a full Gameexe.ini-style text.  Unparseable lines are hard
    /// errors; a configuration typo otherwise surfaces as a subtly broken
    /// game much later.
    pub fn from_text(text: &str) -> Result<Self, ErrorDetail> {
        let mut gexe = Gameexe::empty();
        for (i, line) in text.lines().enumerate() {
            gexe.parse_numbered_line(line, i + 1)?;
        }
        Ok(gexe)
    }

    /// Loads and parses the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, ErrorDetail> {
        let text = fs::read_to_string(path).map_err(|_| ErrorDetail::FileError {
            path: path.display().to_string(),
        })?;
        Gameexe::from_text(&text)
    }

    /// Parses and stores a single configuration line.  Blank lines and `;`
    /// comments are ignored.  A later entry with the same key replaces the
    /// earlier one, matching how RealLive reads its configuration.
    pub fn parse_line(&mut self, line: &str) -> Result<(), ErrorDetail> {
        self.parse_numbered_line(line, 0)
    }

    fn parse_numbered_line(&mut self, line: &str, line_no: usize) -> Result<(), ErrorDetail> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(';') {
            return Ok(());
        }

        let (raw_key, raw_value) =
            trimmed
                .split_once('=')
                .ok_or_else(|| ErrorDetail::GameexeParse {
                    line_no,
                    reason: "expected KEY = value".to_string(),
                })?;

        let key = raw_key.trim().trim_start_matches('#').to_uppercase();
        if key.is_empty() {
            return Err(ErrorDetail::GameexeParse {
                line_no,
                reason: "empty key".to_string(),
            });
        }

        let tokens = parse_tokens(raw_value, line_no)?;
        match self.index.get(&key) {
            Some(&slot) => self.entries[slot] = GameexeEntry { key, tokens },
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push(GameexeEntry { key, tokens });
            }
        }
        Ok(())
    }

    /// Returns the entry for `key`, if present.  Keys are matched
    /// case-insensitively and without any leading `#`.
    pub fn entry(&self, key: &str) -> Option<&GameexeEntry> {
        let canonical = key.trim_start_matches('#').to_uppercase();
        self.index.get(&canonical).map(|&slot| &self.entries[slot])
    }

    /// Returns true if `key` has an entry.
    pub fn exists(&self, key: &str) -> bool {
        self.entry(key).is_some()
    }

    /// Returns the first token of `key` as an integer, or `default` if the key
    /// is absent or non-numeric.
    pub fn int(&self, key: &str, default: i32) -> i32 {
        self.entry(key).and_then(|e| e.int_at(0)).unwrap_or(default)
    }

    /// Returns the first token of `key` as a string, if the key exists and its
    /// first token is textual.
    pub fn str(&self, key: &str) -> Option<&str> {
        self.entry(key).and_then(|e| e.str_at(0))
    }

    /// Returns all tokens of `key` as an integer vector, if possible.
    pub fn int_vector(&self, key: &str) -> Option<Vec<i32>> {
        self.entry(key).and_then(|e| e.to_int_vector())
    }

    /// Returns an iterator over all entries whose key begins with `prefix`
    /// followed by a `.` separator (or equals `prefix` exactly), in file
    /// order.  This is the access pattern for the numbered families:
    /// `filtering("SE")`, `filtering("DSTRACK")`, `filtering("WINDOW.002")`.
    pub fn filtering<'a>(&'a self, prefix: &str) -> impl Iterator<Item = &'a GameexeEntry> {
        let canonical = prefix.trim_start_matches('#').to_uppercase();
        let with_dot = format!("{}.", canonical);
        self.entries
            .iter()
            .filter(move |e| e.key == canonical || e.key.starts_with(&with_dot))
    }

    /// Joins `base`, a zero-padded three digit index and `sub` into a dotted
    /// key: `key_with_index("WINDOW", 3, "MOJI_SIZE")` is
    /// `"WINDOW.003.MOJI_SIZE"`.  Pass an empty `sub` to omit the tail.
    pub fn key_with_index(base: &str, n: i32, sub: &str) -> String {
        if sub.is_empty() {
            format!("{}.{:03}", base, n)
        } else {
            format!("{}.{:03}.{}", base, n, sub)
        }
    }
}

/// Splits the value side of a line into integer and quoted-string tokens.
/// Accepted separators are commas and runs of whitespace.
fn parse_tokens(raw: &str, line_no: usize) -> Result<Vec<GameexeToken>, ErrorDetail> {
    let mut tokens = Vec::new();
    let mut rest = raw.trim();
    while !rest.is_empty() {
        if let Some(stripped) = rest.strip_prefix('"') {
            let end = stripped
                .find('"')
                .ok_or_else(|| ErrorDetail::GameexeParse {
                    line_no,
                    reason: "unterminated string".to_string(),
                })?;
            tokens.push(GameexeToken::Str(stripped[..end].to_string()));
            rest = stripped[end + 1..].trim_start().trim_start_matches(',').trim_start();
        } else {
            let end = rest
                .find(|c: char| c == ',' || c.is_whitespace())
                .unwrap_or(rest.len());
            let word = &rest[..end];
            match word.parse::<i32>() {
                Ok(v) => tokens.push(GameexeToken::Int(v)),
                // Unquoted words appear in the wild (DISKMARK=LB.ENV); accept
                // them as strings.
                Err(_) => tokens.push(GameexeToken::Str(word.to_string())),
            }
            rest = rest[end..].trim_start().trim_start_matches(',').trim_start();
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_test_gameexe() -> Gameexe {
        Gameexe::from_text(
            r#"
; Relive test configuration
__GAMEPATH = "/games/clannad"
#SEEN_MENU = 9030
#COLOR_TABLE.000 = 255, 255, 255
#COLOR_TABLE.001 = 255, 255, 0
#SE.000 = "se000", 1
#SE.014 = "se014", 2
#DSTRACK = 0, 99999999, 269364, "bgm01", "memories"
#WINDOW.002.MOJI_SIZE = 24
DISKMARK = LB.ENV
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_int_access() {
        let gexe = setup_test_gameexe();
        assert_eq!(gexe.int("SEEN_MENU", -1), 9030);
        assert_eq!(gexe.int("NOT_PRESENT", -1), -1);
    }

    #[test]
    fn test_str_access_and_unquoted_words() {
        let gexe = setup_test_gameexe();
        assert_eq!(gexe.str("__GAMEPATH"), Some("/games/clannad"));
        assert_eq!(gexe.str("DISKMARK"), Some("LB.ENV"));
    }

    #[test]
    fn test_leading_hash_and_case_are_ignored_in_lookups() {
        let gexe = setup_test_gameexe();
        assert!(gexe.exists("#seen_menu"));
        assert!(gexe.exists("SEEN_MENU"));
    }

    #[test]
    fn test_int_vector() {
        let gexe = setup_test_gameexe();
        assert_eq!(
            gexe.int_vector("COLOR_TABLE.001"),
            Some(vec![255, 255, 0])
        );
    }

    #[test]
    fn test_key_with_index_zero_pads() {
        assert_eq!(
            Gameexe::key_with_index("WINDOW", 2, "MOJI_SIZE"),
            "WINDOW.002.MOJI_SIZE"
        );
        let gexe = setup_test_gameexe();
        assert_eq!(gexe.int(&Gameexe::key_with_index("WINDOW", 2, "MOJI_SIZE"), 0), 24);
    }

    #[test]
    fn test_filtering_matches_prefix_in_file_order() {
        let gexe = setup_test_gameexe();
        let keys: Vec<&str> = gexe.filtering("SE").map(|e| e.key()).collect();
        assert_eq!(keys, vec!["SE.000", "SE.014"]);
        // SEEN_MENU must not leak into the SE prefix.
        assert!(!keys.contains(&"SEEN_MENU"));
    }

    #[test]
    fn test_mixed_entry_tokens() {
        let gexe = setup_test_gameexe();
        let entry = gexe.entry("DSTRACK").unwrap();
        assert_eq!(entry.int_at(2), Some(269364));
        assert_eq!(entry.str_at(3), Some("bgm01"));
        assert_eq!(entry.str_at(4), Some("memories"));
    }

    #[test]
    fn test_later_entry_replaces_earlier() {
        let mut gexe = setup_test_gameexe();
        gexe.parse_line("#SEEN_MENU = 9999").unwrap();
        assert_eq!(gexe.int("SEEN_MENU", -1), 9999);
    }

    #[test]
    fn test_unterminated_string_is_an_error() {
        let result = Gameexe::from_text("#BAD = \"oops");
        assert!(matches!(
            result.unwrap_err(),
            ErrorDetail::GameexeParse { line_no: 1, .. }
        ));
    }
}
