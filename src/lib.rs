mod assets;
mod counter;
mod effects;
mod error;
mod event;
mod gameexe;
mod graphics;
mod hacks;
mod instruction;
mod longop;
mod machine;
mod memory;
mod modules;
mod pause;
mod registry;
mod scenario;
mod serialization;
mod sound;
mod text;
mod textout;
mod voice;

// Re-exports
pub use crate::assets::{
    save_directory, AssetPaths, IMAGE_FILETYPES, KOE_ARCHIVE_FILETYPES, KOE_LOOSE_FILETYPES,
    SOUND_FILETYPES,
};
pub use crate::counter::{CounterKind, FrameCounter, Timer};
pub use crate::effects::{
    build_effect, build_zoom, effect_from_sel, effect_from_selr, Composition, Direction, Effect,
    EffectKind,
};
pub use crate::error::{ErrorDetail, ReliveError};
pub use crate::event::{
    Clock, Event, EventSystem, KeyCode, MouseButton, Point, TestClock, WallClock,
};
pub use crate::gameexe::{Gameexe, GameexeEntry, GameexeToken};
pub use crate::graphics::{
    CompositeMode, GraphicsObject, GraphicsSystem, ObjectFilters, Opacity, Rect, ScreenUpdateMode,
    Size, Surface, SurfaceRegion, DC_SCREEN, DC_STAGING,
};
pub use crate::hacks::{hacks_for, GameHacks, LineAction};
pub use crate::instruction::{decode_args, Expr, Instruction, ParamSpec, Value};
pub use crate::longop::{
    decorate_effect_with_blit, AfterAction, LongOperation, PerformAfterDecorator,
    WaitLongOperation,
};
pub use crate::machine::{Machine, System};
pub use crate::memory::{
    BitWidth, GlobalMemory, IntBank, IntReference, Memory, StrBank, StrReference,
};
pub use crate::modules::register_default_modules;
pub use crate::pause::{new_page_after, new_paragraph_after, PauseLongOperation};
pub use crate::registry::{OpOutcome, OpcodeEntry, OpcodeHandler, OpcodeRegistry};
pub use crate::scenario::{
    CallStack, FrameType, MemoryScenario, ProgramPosition, Scenario, StackFrame,
};
pub use crate::serialization::{load_globals, save_globals};
pub use crate::sound::{
    mix_music, open_audio_decoder, AudioDecoder, BgmMixerState, CDTrack, DSTrack, MemoryDecoder,
    SoundSystem, StreamingDecoder, WavFileDecoder, KOE_CHANNEL, NUM_BASE_CHANNELS,
    NUM_EXTRA_WAVPLAY_CHANNELS, NUM_TOTAL_CHANNELS, STOP_AT_END, STOP_NOW,
};
pub use crate::text::page::{ColourTable, PageSet, TextPage};
pub use crate::text::window::{is_kinsoku, TextWindow, Waku, WindowButton};
pub use crate::text::TextSystem;
pub use crate::textout::TextoutLongOperation;
pub use crate::voice::{make_wav_header, VoiceCache, VoiceSample};
