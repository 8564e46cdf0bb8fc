use crate::error::ErrorDetail;
use crate::gameexe::Gameexe;
use std::fs;
use std::path::{Path, PathBuf};

/// Extension groups for each asset class, in probe order.
pub const IMAGE_FILETYPES: &[&str] = &["g00", "pdt", "png", "jpg", "bmp"];
pub const SOUND_FILETYPES: &[&str] = &["wav", "ogg", "nwa", "mp3"];
pub const KOE_ARCHIVE_FILETYPES: &[&str] = &["ovk", "nwk", "koe"];
pub const KOE_LOOSE_FILETYPES: &[&str] = &["ogg"];

/// The asset search path list: the game directory plus every `#FOLDNAME`
/// entry, in declaration order.
///
/// Lookups are by bare stem with an extension group, matched
/// case-insensitively; each search path and its immediate subdirectories are
/// scanned, which is what lets loose voice files under `KOE/0008/` resolve.
pub struct AssetPaths {
    search_paths: Vec<PathBuf>,
}

impl AssetPaths {
    /// Constructor with an explicit root (used by tests).
    pub fn with_root(root: PathBuf) -> Self {
        AssetPaths {
            search_paths: vec![root],
        }
    }

    /// Builds the search list from `__GAMEPATH` and the `#FOLDNAME` entries.
    pub fn from_gameexe(gexe: &Gameexe) -> Self {
        let mut search_paths = Vec::new();
        if let Some(base) = gexe.str("__GAMEPATH") {
            let base = PathBuf::from(base);
            search_paths.push(base.clone());
            for entry in gexe.filtering("FOLDNAME") {
                if let Some(folder) = entry.str_at(0) {
                    search_paths.push(base.join(folder));
                }
            }
        }
        AssetPaths { search_paths }
    }

    pub fn add_path(&mut self, path: PathBuf) {
        self.search_paths.push(path);
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Walks the search paths looking for `<stem>.<ext>` for each extension
    /// in `extensions`, case-insensitively.
    pub fn find_file(&self, stem: &str, extensions: &[&str]) -> Result<PathBuf, ErrorDetail> {
        for path in &self.search_paths {
            if let Some(found) = Self::find_in_directory(path, stem, extensions) {
                return Ok(found);
            }
            // One level of subdirectories (KOE/0008 and friends).
            if let Ok(entries) = fs::read_dir(path) {
                for entry in entries.flatten() {
                    let child = entry.path();
                    if child.is_dir() {
                        if let Some(found) = Self::find_in_directory(&child, stem, extensions) {
                            return Ok(found);
                        }
                    }
                }
            }
        }
        Err(ErrorDetail::MissingAsset {
            stem: stem.to_string(),
        })
    }

    fn find_in_directory(directory: &Path, stem: &str, extensions: &[&str]) -> Option<PathBuf> {
        let entries = fs::read_dir(directory).ok()?;
        let stem_lower = stem.to_lowercase();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let file_stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(|s| s.to_lowercase());
            let extension = path
                .extension()
                .and_then(|s| s.to_str())
                .map(|s| s.to_lowercase());
            if let (Some(file_stem), Some(extension)) = (file_stem, extension) {
                if file_stem == stem_lower && extensions.contains(&extension.as_str()) {
                    return Some(path);
                }
            }
        }
        None
    }
}

/// The per-game save directory: `<home>/.rlvm/<regname>/`, with path
/// separators in REGNAME flattened to underscores.
pub fn save_directory(gexe: &Gameexe) -> Result<PathBuf, ErrorDetail> {
    let regname = gexe.str("REGNAME").unwrap_or("UNKNOWN_GAME");
    let flattened: String = regname
        .chars()
        .map(|c| if c == '\\' || c == '/' { '_' } else { c })
        .collect();
    let home = dirs::home_dir().ok_or(ErrorDetail::FileError {
        path: "<home>".to_string(),
    })?;
    Ok(home.join(".rlvm").join(flattened))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn touch(path: &Path) {
        File::create(path).unwrap().write_all(b"x").unwrap();
    }

    #[test]
    fn test_find_file_matches_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("BGM01.WAV"));
        let assets = AssetPaths::with_root(dir.path().to_path_buf());
        let found = assets.find_file("bgm01", SOUND_FILETYPES).unwrap();
        assert_eq!(found.file_name().unwrap(), "BGM01.WAV");
    }

    #[test]
    fn test_find_file_respects_extension_group() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("title.g00"));
        let assets = AssetPaths::with_root(dir.path().to_path_buf());
        assert!(assets.find_file("title", IMAGE_FILETYPES).is_ok());
        assert_eq!(
            assets.find_file("title", SOUND_FILETYPES).unwrap_err(),
            ErrorDetail::MissingAsset {
                stem: "title".to_string()
            }
        );
    }

    #[test]
    fn test_find_file_searches_immediate_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let koe = dir.path().join("KOE").join("0009");
        fs::create_dir_all(&koe).unwrap();
        touch(&koe.join("z000900000.ogg"));
        let mut assets = AssetPaths::with_root(dir.path().to_path_buf());
        assets.add_path(dir.path().join("KOE"));
        assert!(assets
            .find_file("z000900000", KOE_LOOSE_FILETYPES)
            .is_ok());
    }

    #[test]
    fn test_search_paths_follow_foldname_declaration_order() {
        let gexe = Gameexe::from_text(
            r#"
__GAMEPATH = "/games/kanon"
#FOLDNAME.000 = "g00"
#FOLDNAME.001 = "wav"
"#,
        )
        .unwrap();
        let assets = AssetPaths::from_gameexe(&gexe);
        let paths: Vec<String> = assets
            .search_paths()
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        assert_eq!(paths, vec!["/games/kanon", "/games/kanon/g00", "/games/kanon/wav"]);
    }

    #[test]
    fn test_save_directory_flattens_regname_separators() {
        let gexe = Gameexe::from_text("REGNAME = \"KEY\\CLANNAD\"").unwrap();
        let dir = save_directory(&gexe).unwrap();
        assert!(dir.ends_with(".rlvm/KEY_CLANNAD"));
    }
}
