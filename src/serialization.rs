use crate::error::ErrorDetail;
use crate::memory::{GlobalMemory, Memory};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

/// The global-memory save file inside the per-game save directory.
const GLOBAL_SAVE_NAME: &str = "global.sav.gz";

/// Writes the persistent banks to `<directory>/global.sav.gz` as
/// gzip-compressed JSON, creating the directory if needed.
pub fn save_globals(directory: &Path, memory: &Memory) -> Result<(), ErrorDetail> {
    let path = directory.join(GLOBAL_SAVE_NAME);
    let failed = || ErrorDetail::FileError {
        path: path.display().to_string(),
    };

    fs::create_dir_all(directory).map_err(|_| failed())?;
    let json = serde_json::to_vec(&memory.export_globals()).map_err(|_| failed())?;
    let file = File::create(&path).map_err(|_| failed())?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(&json).map_err(|_| failed())?;
    encoder.finish().map_err(|_| failed())?;
    Ok(())
}

/// Restores the persistent banks from the save directory.  Returns false
/// when no save exists yet (a fresh game); a present-but-unreadable save is
/// an error.
pub fn load_globals(directory: &Path, memory: &mut Memory) -> Result<bool, ErrorDetail> {
    let path = directory.join(GLOBAL_SAVE_NAME);
    if !path.exists() {
        return Ok(false);
    }
    let failed = || ErrorDetail::FileError {
        path: path.display().to_string(),
    };

    let file = File::open(&path).map_err(|_| failed())?;
    let mut json = Vec::new();
    GzDecoder::new(file)
        .read_to_end(&mut json)
        .map_err(|_| failed())?;
    let globals: GlobalMemory = serde_json::from_slice(&json).map_err(|_| failed())?;
    memory.import_globals(globals);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{BitWidth, IntBank, StrBank};

    #[test]
    fn test_globals_survive_a_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = Memory::new();
        memory.set_int(IntBank::G, BitWidth::Full, 0, 12345).unwrap();
        memory
            .set_str(StrBank::M, 1, "after story".to_string())
            .unwrap();
        save_globals(dir.path(), &memory).unwrap();

        let mut restored = Memory::new();
        assert!(load_globals(dir.path(), &mut restored).unwrap());
        assert_eq!(
            restored.get_int(IntBank::G, BitWidth::Full, 0).unwrap(),
            12345
        );
        assert_eq!(restored.get_str(StrBank::M, 1).unwrap(), "after story");
    }

    #[test]
    fn test_missing_save_is_a_fresh_game() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = Memory::new();
        assert!(!load_globals(dir.path(), &mut memory).unwrap());
    }

    #[test]
    fn test_corrupt_save_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(GLOBAL_SAVE_NAME), b"not gzip at all").unwrap();
        let mut memory = Memory::new();
        assert!(load_globals(dir.path(), &mut memory).is_err());
    }
}
