use std::error;
use std::fmt;

/// An Error enum used throughout the Relive crate to communicate details of runtime
/// errors that have occurred.
///
/// Instances of [ErrorDetail] bubble up through the public API methods; whatever
/// reaches the machine's top-level frame handler logs the error and halts the
/// interpreter.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorDetail {
    /// The scenario contained a construct the interpreter cannot make sense of
    /// (for example a name construct with no closing bracket).  Always fatal.
    MalformedScenario { reason: String },
    /// A jump or call referenced a scene number that does not exist
    NoSuchScene { scene: i32 },
    /// The program position advanced past the end of a scene's instruction list
    InstructionOutOfBounds { scene: i32, offset: usize },
    /// An attempt was made to push to the script call stack while it is full
    CallStackOverflow,
    /// An attempt was made to return/pop while the script call stack is empty
    CallStackUnderflow,
    /// A memory access referenced a bank slot outside the bank's range
    MemoryOutOfBounds { bank: &'static str, index: usize },
    /// The arguments attached to an opcode did not match the handler's declared
    /// parameter signature
    BadOpcodeArguments { name: String, reason: String },
    /// A required asset (image, sound, music track, voice sample) could not be
    /// located on the configured search paths
    MissingAsset { stem: String },
    /// A recognised but unimplemented engine feature was invoked (CD audio,
    /// certain NAME_MOD values)
    UnsupportedFeature { what: String },
    /// A sound call referenced a channel outside the mixer's channel set
    InvalidChannel { channel: usize },
    /// Every extra wav-play channel is busy
    NoFreeChannel,
    /// A sound call passed a volume outside the 0-255 range
    InvalidVolume { volume: i32 },
    /// The audio device could not be opened at startup
    AudioDeviceFailure { reason: String },
    /// A voice id resolved to neither an archived nor a loose sample
    NoSuchVoiceSample { id: i32 },
    /// A voice archive's entry table could not be read
    CorruptVoiceArchive { path: String },
    /// A Gameexe configuration line could not be parsed
    GameexeParse { line_no: usize, reason: String },
    /// Error used for any file I/O issues
    FileError { path: String },
}

impl error::Error for ErrorDetail {}

impl fmt::Display for ErrorDetail {
    /// Returns a textual description of each enum variant for display purposes.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorDetail::MalformedScenario { reason } => {
                write!(f, "malformed scenario: {}", reason)
            }
            ErrorDetail::NoSuchScene { scene } => {
                write!(f, "no such scene {:04}", scene)
            }
            ErrorDetail::InstructionOutOfBounds { scene, offset } => {
                write!(
                    f,
                    "instruction offset {} is past the end of scene {:04}",
                    offset, scene
                )
            }
            ErrorDetail::CallStackOverflow => {
                write!(f, "the script call stack overflowed")
            }
            ErrorDetail::CallStackUnderflow => {
                write!(f, "a return was executed with an empty call stack")
            }
            ErrorDetail::MemoryOutOfBounds { bank, index } => {
                write!(f, "index {} is outside the {} bank", index, bank)
            }
            ErrorDetail::BadOpcodeArguments { name, reason } => {
                write!(f, "bad arguments to {}: {}", name, reason)
            }
            ErrorDetail::MissingAsset { stem } => {
                write!(f, "could not find asset \"{}\" on any search path", stem)
            }
            ErrorDetail::UnsupportedFeature { what } => {
                write!(f, "unsupported feature: {}", what)
            }
            ErrorDetail::InvalidChannel { channel } => {
                write!(f, "invalid channel number {}", channel)
            }
            ErrorDetail::NoFreeChannel => {
                write!(f, "couldn't find a free channel for wav_play")
            }
            ErrorDetail::InvalidVolume { volume } => {
                write!(f, "invalid volume \"{}\"; valid values are 0-255", volume)
            }
            ErrorDetail::AudioDeviceFailure { reason } => {
                write!(f, "couldn't initialize audio: {}", reason)
            }
            ErrorDetail::NoSuchVoiceSample { id } => {
                write!(f, "no such voice archive or sample for id {}", id)
            }
            ErrorDetail::CorruptVoiceArchive { path } => {
                write!(f, "could not read voice archive \"{}\"", path)
            }
            ErrorDetail::GameexeParse { line_no, reason } => {
                write!(f, "Gameexe line {}: {}", line_no, reason)
            }
            ErrorDetail::FileError { path } => {
                write!(f, "file error on \"{}\"", path)
            }
        }
    }
}

/// An Error struct used to bubble up interpreter failures to the hosting
/// application.  This wraps the more specific [ErrorDetail] error enum and
/// records where in the scenario the machine was when it crashed.
#[derive(Debug, Clone, PartialEq)]
pub struct ReliveError {
    pub scene: i32,
    pub line: i32,
    pub inner_error: ErrorDetail,
}

impl error::Error for ReliveError {}

impl fmt::Display for ReliveError {
    /// Returns a textual description of the error
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "an error occurred in scene {:04} at line {}: ",
            self.scene, self.line
        )?;
        self.inner_error.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_scene_context() {
        let error = ReliveError {
            scene: 9030,
            line: 418,
            inner_error: ErrorDetail::NoSuchScene { scene: 9031 },
        };
        let text = format!("{}", error);
        assert!(text.contains("scene 9030"));
        assert!(text.contains("line 418"));
        assert!(text.contains("9031"));
    }
}
