// Window titles
pub(super) const TITLE_APP_WINDOW: &str = "Relive: RealLive virtual machine";
pub(super) const TITLE_PICK_GAME_WINDOW: &str = "Locate game directory";
pub(super) const TITLE_FATAL_ERROR_WINDOW: &str = "Interpreter error";

// Error messages
pub(super) const ERROR_NO_GAMEEXE: &str = "No Gameexe.ini found in the game directory";
pub(super) const ERROR_NO_GAME_DIRECTORY: &str = "No game directory was specified";
pub(super) const ERROR_AUDIO_DEVICE: &str = "Could not open the audio device";

// Widget captions
pub(super) const CAPTION_BUTTON_QUIT: &str = "Quit";

// Configuration
pub(super) const GAMEEXE_FILE_NAME: &str = "Gameexe.ini";
