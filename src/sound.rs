use crate::assets::{AssetPaths, SOUND_FILETYPES};
use crate::error::ErrorDetail;
use crate::gameexe::Gameexe;
use crate::voice::{VoiceCache, VoiceSample};
use byteorder::{LittleEndian, ReadBytesExt};
use lru::LruCache;
use rodio::Source;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Interface and effect channels addressable by the scenario.
pub const NUM_BASE_CHANNELS: usize = 16;
/// Channels allocated dynamically for anonymous `wav_play` calls.
pub const NUM_EXTRA_WAVPLAY_CHANNELS: usize = 8;
/// The dedicated voice channel.
pub const KOE_CHANNEL: usize = NUM_BASE_CHANNELS + NUM_EXTRA_WAVPLAY_CHANNELS;
pub const NUM_TOTAL_CHANNELS: usize = KOE_CHANNEL + 1;

/// Loop-point sentinel: play to the natural end, then stop.
pub const STOP_AT_END: i64 = -1;
/// Loop-point sentinel: the stream is over; emit silence.
pub const STOP_NOW: i64 = -2;

/// How many decoded wav chunks stay cached.
const WAV_CACHE_SIZE: usize = 5;

/// The `(rate, bits)` pairs selected by the SOUND_DEFAULT quality tier.
const SOUND_QUALITIES: [(u32, u16); 8] = [
    (11025, 8),
    (11025, 16),
    (22050, 8),
    (22050, 16),
    (44100, 8),
    (44100, 16),
    (48000, 8),
    (48000, 16),
];

/// A streaming-music descriptor from the `#DSTRACK` table.
#[derive(Clone, Debug, PartialEq)]
pub struct DSTrack {
    pub name: String,
    pub file: String,
    pub from: i64,
    pub to: i64,
    pub loop_point: i64,
}

/// A CD-audio descriptor from the `#CDTRACK` table.  Recognised so that
/// playing one can fail with a useful message; CD audio itself is not
/// supported.
#[derive(Clone, Debug, PartialEq)]
pub struct CDTrack {
    pub name: String,
    pub from: i64,
    pub to: i64,
    pub loop_point: i64,
}

/// A pull-based PCM decoder.  Decoding of the individual formats is an
/// external concern; the engine only needs this interface.
pub trait AudioDecoder: Send {
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> u16;
    /// Fills `buffer` with interleaved i16 samples; returns how many were
    /// written.  Less than the buffer length means end of stream.
    fn read(&mut self, buffer: &mut [i16]) -> usize;
    /// Repositions to an absolute per-channel sample frame.
    fn seek(&mut self, frame: u64);
}

/// An in-memory decoder, used by tests and by hosts with pre-decoded data.
pub struct MemoryDecoder {
    data: Vec<i16>,
    position: usize,
    rate: u32,
    channels: u16,
}

impl MemoryDecoder {
    pub fn new(data: Vec<i16>, rate: u32, channels: u16) -> Self {
        MemoryDecoder {
            data,
            position: 0,
            rate,
            channels,
        }
    }
}

impl AudioDecoder for MemoryDecoder {
    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn read(&mut self, buffer: &mut [i16]) -> usize {
        let available = self.data.len().saturating_sub(self.position);
        let count = available.min(buffer.len());
        buffer[..count].copy_from_slice(&self.data[self.position..self.position + count]);
        self.position += count;
        count
    }

    fn seek(&mut self, frame: u64) {
        self.position = (frame as usize * self.channels as usize).min(self.data.len());
    }
}

/// A seekable 16-bit PCM WAV reader.
pub struct WavFileDecoder {
    file: File,
    data_offset: u64,
    data_len: u64,
    rate: u32,
    channels: u16,
    position_frames: u64,
}

impl WavFileDecoder {
    pub fn open(path: &Path) -> Result<Self, ErrorDetail> {
        let bad = || ErrorDetail::FileError {
            path: path.display().to_string(),
        };
        let mut file = File::open(path).map_err(|_| bad())?;
        let mut fourcc = [0u8; 4];
        file.read_exact(&mut fourcc).map_err(|_| bad())?;
        if &fourcc != b"RIFF" {
            return Err(bad());
        }
        file.seek(SeekFrom::Current(4)).map_err(|_| bad())?;
        file.read_exact(&mut fourcc).map_err(|_| bad())?;
        if &fourcc != b"WAVE" {
            return Err(bad());
        }

        let mut rate = 44100u32;
        let mut channels = 2u16;
        loop {
            file.read_exact(&mut fourcc).map_err(|_| bad())?;
            let chunk_len = file.read_u32::<LittleEndian>().map_err(|_| bad())? as u64;
            match &fourcc {
                b"fmt " => {
                    let _format = file.read_u16::<LittleEndian>().map_err(|_| bad())?;
                    channels = file.read_u16::<LittleEndian>().map_err(|_| bad())?;
                    rate = file.read_u32::<LittleEndian>().map_err(|_| bad())?;
                    file.seek(SeekFrom::Current(chunk_len as i64 - 8))
                        .map_err(|_| bad())?;
                }
                b"data" => {
                    let data_offset = file.stream_position().map_err(|_| bad())?;
                    return Ok(WavFileDecoder {
                        file,
                        data_offset,
                        data_len: chunk_len,
                        rate,
                        channels,
                        position_frames: 0,
                    });
                }
                _ => {
                    file.seek(SeekFrom::Current(chunk_len as i64))
                        .map_err(|_| bad())?;
                }
            }
        }
    }
}

impl AudioDecoder for WavFileDecoder {
    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn read(&mut self, buffer: &mut [i16]) -> usize {
        let frame_bytes = 2 * self.channels as u64;
        let consumed = self.position_frames * frame_bytes;
        let remaining_bytes = self.data_len.saturating_sub(consumed);
        let want = buffer.len().min((remaining_bytes / 2) as usize);
        let mut written = 0;
        for slot in buffer.iter_mut().take(want) {
            match self.file.read_i16::<LittleEndian>() {
                Ok(sample) => {
                    *slot = sample;
                    written += 1;
                }
                Err(_) => break,
            }
        }
        self.position_frames += written as u64 / self.channels as u64;
        written
    }

    fn seek(&mut self, frame: u64) {
        let frame_bytes = 2 * self.channels as u64;
        let target = self.data_offset + frame * frame_bytes;
        if self.file.seek(SeekFrom::Start(target)).is_ok() {
            self.position_frames = frame;
        }
    }
}

/// Ogg/MP3 streaming through the audio backend's decoders.  Backwards seeks
/// reopen the file and skip forward, which is how the loop-point jump works
/// for formats without native seeking.
pub struct StreamingDecoder {
    path: PathBuf,
    inner: rodio::Decoder<BufReader<File>>,
    rate: u32,
    channels: u16,
    position_frames: u64,
}

impl StreamingDecoder {
    pub fn open(path: &Path) -> Result<Self, ErrorDetail> {
        let bad = || ErrorDetail::FileError {
            path: path.display().to_string(),
        };
        let file = File::open(path).map_err(|_| bad())?;
        let inner = rodio::Decoder::new(BufReader::new(file)).map_err(|_| bad())?;
        let rate = inner.sample_rate();
        let channels = inner.channels();
        Ok(StreamingDecoder {
            path: path.to_path_buf(),
            inner,
            rate,
            channels,
            position_frames: 0,
        })
    }
}

impl AudioDecoder for StreamingDecoder {
    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn read(&mut self, buffer: &mut [i16]) -> usize {
        let mut written = 0;
        for slot in buffer.iter_mut() {
            match self.inner.next() {
                Some(sample) => {
                    *slot = sample;
                    written += 1;
                }
                None => break,
            }
        }
        self.position_frames += written as u64 / self.channels as u64;
        written
    }

    fn seek(&mut self, frame: u64) {
        if frame < self.position_frames {
            if let Ok(file) = File::open(&self.path) {
                if let Ok(inner) = rodio::Decoder::new(BufReader::new(file)) {
                    self.inner = inner;
                    self.position_frames = 0;
                }
            }
        }
        let skip = (frame - self.position_frames) * self.channels as u64;
        for _ in 0..skip {
            if self.inner.next().is_none() {
                break;
            }
        }
        self.position_frames = frame;
    }
}

/// Opens the format-appropriate decoder for a music file.
pub fn open_audio_decoder(path: &Path) -> Result<Box<dyn AudioDecoder>, ErrorDetail> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "wav" => Ok(Box::new(WavFileDecoder::open(path)?)),
        "ogg" | "mp3" => Ok(Box::new(StreamingDecoder::open(path)?)),
        "nwa" => Err(ErrorDetail::UnsupportedFeature {
            what: format!("NWA music decoding (\"{}\")", path.display()),
        }),
        other => Err(ErrorDetail::UnsupportedFeature {
            what: format!("music file type \"{}\"", other),
        }),
    }
}

/// The one BGM stream, owned by the mixer-visible state.
pub struct BgmStream {
    pub name: String,
    decoder: Box<dyn AudioDecoder>,
    loop_point: i64,
    fade_out_total: u64,
    fade_out_count: u64,
    fade_in_total: u64,
    fade_in_count: u64,
}

/// Everything the audio thread's mix hook may touch.  All access goes
/// through the mutex; the hook never runs concurrently with a main-thread
/// mutation while the lock is held.
pub struct BgmMixerState {
    pub playing: Option<BgmStream>,
    pub bgm_enabled: bool,
    pub paused: bool,
    /// Computed BGM volume, 0-255.
    pub volume: u8,
    pub mixer_rate: u32,
    pub mixer_channels: u16,
    /// Set by the hook on stream failure; drained by the next sound tick.
    pub error: Option<String>,
}

/// Fills `buffer` from the current BGM stream: decode, loop or stop at the
/// stream end, then apply the fade envelopes and the volume.
///
/// This is the music hook the audio thread drives; tests drive it directly
/// with a chosen buffer size to simulate time.
pub fn mix_music(state: &mut BgmMixerState, buffer: &mut [i16]) {
    let enabled = state.bgm_enabled && !state.paused;
    let volume = state.volume;
    let mut clear_playing = false;

    match state.playing.as_mut() {
        None => buffer.fill(0),
        Some(music) => {
            if !enabled || music.loop_point == STOP_NOW {
                buffer.fill(0);
                return;
            }
            let count = music.decoder.read(buffer);
            if count != buffer.len() {
                buffer[count..].fill(0);
                if music.loop_point == STOP_AT_END {
                    music.loop_point = STOP_NOW;
                } else {
                    music.decoder.seek(music.loop_point as u64);
                    let more = music.decoder.read(&mut buffer[count..]);
                    if more == 0 {
                        // A loop jump that yields nothing means the stream
                        // has gone bad; flag it for the main thread.
                        state.error =
                            Some(format!("loop seek produced no samples in {}", music.name));
                        music.loop_point = STOP_NOW;
                    }
                    buffer[count + more..].fill(0);
                }
            }

            if music.fade_out_total > 0 {
                if music.fade_out_count >= music.fade_out_total {
                    music.loop_point = STOP_NOW;
                    buffer.fill(0);
                    clear_playing = true;
                } else {
                    let gain = (music.fade_out_total - music.fade_out_count) as f32
                        / music.fade_out_total as f32;
                    for sample in buffer.iter_mut() {
                        *sample = (*sample as f32 * gain) as i16;
                    }
                    music.fade_out_count += buffer.len() as u64;
                }
            }
            if music.fade_in_total > 0 && music.fade_in_count < music.fade_in_total {
                let gain =
                    (music.fade_in_count as f32 / music.fade_in_total as f32).min(1.0);
                for sample in buffer.iter_mut() {
                    *sample = (*sample as f32 * gain) as i16;
                }
                music.fade_in_count += buffer.len() as u64;
            }

            let scale = volume as f32 / 255.0;
            if scale < 1.0 {
                for sample in buffer.iter_mut() {
                    *sample = (*sample as f32 * scale) as i16;
                }
            }
        }
    }
    if clear_playing {
        state.playing = None;
    }
}

/// The infinite source registered with the audio backend; each pull refills
/// an internal block through [mix_music] under the state lock.
struct BgmSource {
    state: Arc<Mutex<BgmMixerState>>,
    block: Vec<i16>,
    position: usize,
    rate: u32,
    channels: u16,
}

impl Iterator for BgmSource {
    type Item = i16;

    fn next(&mut self) -> Option<i16> {
        if self.position >= self.block.len() {
            let mut state = self.state.lock().unwrap();
            mix_music(&mut state, &mut self.block);
            self.position = 0;
        }
        let sample = self.block[self.position];
        self.position += 1;
        Some(sample)
    }
}

impl Source for BgmSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

/// Cached sound-chunk bytes, shareable with the audio thread.
#[derive(Clone)]
struct SoundChunk(Arc<Vec<u8>>);

impl AsRef<[u8]> for SoundChunk {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A linear channel-volume fade in progress.
#[derive(Clone, Debug)]
struct VolumeAdjustTask {
    start_time: u32,
    end_time: u32,
    start_volume: u8,
    final_volume: u8,
    stop_when_done: bool,
}

impl VolumeAdjustTask {
    fn volume_for(&self, now: u32) -> u8 {
        let span = self.end_time.saturating_sub(self.start_time).max(1);
        let elapsed = now.saturating_sub(self.start_time);
        let fraction = (elapsed as f32 / span as f32).clamp(0.0, 1.0);
        let value = self.start_volume as f32
            + fraction * (self.final_volume as f32 - self.start_volume as f32);
        value.round().clamp(0.0, 255.0) as u8
    }
}

/// The live audio device: one sink per channel plus the BGM hook sink.
struct AudioOutput {
    _stream: rodio::OutputStream,
    handle: rodio::OutputStreamHandle,
    channel_sinks: Vec<rodio::Sink>,
    _bgm_sink: rodio::Sink,
}

impl AudioOutput {
    fn new(bgm: Arc<Mutex<BgmMixerState>>, rate: u32, channels: u16) -> Result<Self, ErrorDetail> {
        let failed = |e: String| ErrorDetail::AudioDeviceFailure { reason: e };
        let (_stream, handle) =
            rodio::OutputStream::try_default().map_err(|e| failed(e.to_string()))?;
        let mut channel_sinks = Vec::with_capacity(NUM_TOTAL_CHANNELS);
        for _ in 0..NUM_TOTAL_CHANNELS {
            channel_sinks.push(rodio::Sink::try_new(&handle).map_err(|e| failed(e.to_string()))?);
        }
        let bgm_sink = rodio::Sink::try_new(&handle).map_err(|e| failed(e.to_string()))?;
        bgm_sink.append(BgmSource {
            state: bgm,
            block: vec![0; 1024],
            position: 1024,
            rate,
            channels,
        });
        Ok(AudioOutput {
            _stream,
            handle,
            channel_sinks,
            _bgm_sink: bgm_sink,
        })
    }

    /// Stops a channel by replacing its sink; a fresh sink accepts the next
    /// append cleanly.
    fn reset_sink(&mut self, channel: usize) {
        if let Ok(sink) = rodio::Sink::try_new(&self.handle) {
            self.channel_sinks[channel] = sink;
        }
    }
}

/// A track loaded and waiting for the current stream to fade out.
struct QueuedBgm {
    stream: BgmStream,
    fade_in_ms: u32,
}

/// The mixer: channel volumes and fades, the SE/DSTRACK/CDTRACK tables, wav
/// playback with chunk caching, the single BGM stream, and the voice cache.
///
/// Constructed against a real audio device normally; the silent constructor
/// builds the identical state machine with no device for tests and headless
/// use.
pub struct SoundSystem {
    sound_quality: usize,
    bgm_enabled: bool,
    bgm_volume: u8,
    pcm_enabled: bool,
    pcm_volume: u8,
    se_enabled: bool,
    se_volume: u8,
    koe_volume: u8,

    channel_volume: [u8; NUM_TOTAL_CHANNELS],
    channel_playing: [bool; NUM_TOTAL_CHANNELS],
    adjustment_tasks: HashMap<usize, VolumeAdjustTask>,

    se_table: HashMap<i32, (String, usize)>,
    ds_tracks: HashMap<String, DSTrack>,
    cd_tracks: HashMap<String, CDTrack>,

    wav_cache: LruCache<String, SoundChunk>,
    voices: VoiceCache,

    bgm: Arc<Mutex<BgmMixerState>>,
    queued_bgm: Option<QueuedBgm>,

    output: Option<AudioOutput>,
}

impl SoundSystem {
    /// Constructor that opens the audio device.  Fails with
    /// [ErrorDetail::AudioDeviceFailure] when no device is available.
    pub fn new(gexe: &Gameexe) -> Result<Self, ErrorDetail> {
        let mut system = SoundSystem::build(gexe);
        let (rate, channels) = system.mixer_spec();
        system.output = Some(AudioOutput::new(system.bgm.clone(), rate, channels)?);
        Ok(system)
    }

    /// Constructor with no audio device; everything but audible output
    /// behaves identically.
    pub fn silent(gexe: &Gameexe) -> Self {
        SoundSystem::build(gexe)
    }

    fn build(gexe: &Gameexe) -> Self {
        let sound_quality = gexe.int("SOUND_DEFAULT", 5).clamp(0, 7) as usize;

        // The #SE.<n> table: number -> (file stem, channel).
        let mut se_table = HashMap::new();
        for entry in gexe.filtering("SE") {
            if let Some(number) = entry.key_parts().get(1).and_then(|s| s.parse().ok()) {
                let file = entry.str_at(0).unwrap_or("").to_string();
                let channel = entry.int_at(1).unwrap_or(0).max(0) as usize;
                se_table.insert(number, (file, channel));
            }
        }

        // The #DSTRACK table: (from, to, loop, file, name).
        let mut ds_tracks = HashMap::new();
        for entry in gexe.filtering("DSTRACK") {
            let from = entry.int_at(0).unwrap_or(-1) as i64;
            let to = entry.int_at(1).unwrap_or(-1) as i64;
            let loop_point = entry.int_at(2).unwrap_or(STOP_AT_END as i32) as i64;
            let file = entry.str_at(3).unwrap_or("").to_string();
            let name = entry.str_at(4).unwrap_or("").to_lowercase();
            if !name.is_empty() {
                ds_tracks.insert(
                    name.clone(),
                    DSTrack {
                        name,
                        file,
                        from,
                        to,
                        loop_point,
                    },
                );
            }
        }

        // The #CDTRACK table: (from, to, loop, name).
        let mut cd_tracks = HashMap::new();
        for entry in gexe.filtering("CDTRACK") {
            let from = entry.int_at(0).unwrap_or(-1) as i64;
            let to = entry.int_at(1).unwrap_or(-1) as i64;
            let loop_point = entry.int_at(2).unwrap_or(-1) as i64;
            let name = entry.str_at(3).unwrap_or("").to_lowercase();
            if !name.is_empty() {
                cd_tracks.insert(
                    name.clone(),
                    CDTrack {
                        name,
                        from,
                        to,
                        loop_point,
                    },
                );
            }
        }

        let (rate, _) = SOUND_QUALITIES[sound_quality];
        SoundSystem {
            sound_quality,
            bgm_enabled: true,
            bgm_volume: 255,
            pcm_enabled: true,
            pcm_volume: 255,
            se_enabled: true,
            se_volume: 255,
            koe_volume: 255,
            channel_volume: [255; NUM_TOTAL_CHANNELS],
            channel_playing: [false; NUM_TOTAL_CHANNELS],
            adjustment_tasks: HashMap::new(),
            se_table,
            ds_tracks,
            cd_tracks,
            wav_cache: LruCache::new(NonZeroUsize::new(WAV_CACHE_SIZE).unwrap()),
            voices: VoiceCache::new(),
            bgm: Arc::new(Mutex::new(BgmMixerState {
                playing: None,
                bgm_enabled: true,
                paused: false,
                volume: 255,
                mixer_rate: rate,
                mixer_channels: 2,
                error: None,
            })),
            queued_bgm: None,
            output: None,
        }
    }

    /// The mixer's output format, chosen by the SOUND_DEFAULT quality tier.
    pub fn mixer_spec(&self) -> (u32, u16) {
        (SOUND_QUALITIES[self.sound_quality].0, 2)
    }

    fn check_channel(channel: usize) -> Result<(), ErrorDetail> {
        if channel >= NUM_TOTAL_CHANNELS {
            return Err(ErrorDetail::InvalidChannel { channel });
        }
        Ok(())
    }

    fn check_volume(volume: i32) -> Result<u8, ErrorDetail> {
        if !(0..=255).contains(&volume) {
            return Err(ErrorDetail::InvalidVolume { volume });
        }
        Ok(volume as u8)
    }

    // ----------------------------------------------------- [ global state ]

    pub fn set_bgm_enabled(&mut self, enabled: bool) {
        self.bgm_enabled = enabled;
        self.bgm.lock().unwrap().bgm_enabled = enabled;
    }

    pub fn bgm_enabled(&self) -> bool {
        self.bgm_enabled
    }

    pub fn set_bgm_volume(&mut self, volume: i32) -> Result<(), ErrorDetail> {
        self.bgm_volume = Self::check_volume(volume)?;
        self.bgm.lock().unwrap().volume = self.bgm_volume;
        Ok(())
    }

    pub fn bgm_volume(&self) -> u8 {
        self.bgm_volume
    }

    pub fn set_pcm_enabled(&mut self, enabled: bool) {
        self.pcm_enabled = enabled;
    }

    pub fn pcm_enabled(&self) -> bool {
        self.pcm_enabled
    }

    pub fn set_pcm_volume(&mut self, volume: i32) -> Result<(), ErrorDetail> {
        self.pcm_volume = Self::check_volume(volume)?;
        Ok(())
    }

    pub fn set_se_enabled(&mut self, enabled: bool) {
        self.se_enabled = enabled;
    }

    pub fn set_se_volume(&mut self, volume: i32) -> Result<(), ErrorDetail> {
        self.se_volume = Self::check_volume(volume)?;
        Ok(())
    }

    // --------------------------------------------------- [ channel volume ]

    /// Sets a channel's volume immediately.
    pub fn set_channel_volume(&mut self, channel: usize, volume: i32) -> Result<(), ErrorDetail> {
        Self::check_channel(channel)?;
        let volume = Self::check_volume(volume)?;
        self.channel_volume[channel] = volume;
        self.apply_channel_volume(channel);
        Ok(())
    }

    /// Schedules a linear fade of a channel's volume over `fade_ms`,
    /// advanced by [SoundSystem::execute].
    pub fn set_channel_volume_with_fade(
        &mut self,
        channel: usize,
        now: u32,
        volume: i32,
        fade_ms: u32,
    ) -> Result<(), ErrorDetail> {
        Self::check_channel(channel)?;
        let volume = Self::check_volume(volume)?;
        self.adjustment_tasks.insert(
            channel,
            VolumeAdjustTask {
                start_time: now,
                end_time: now + fade_ms,
                start_volume: self.channel_volume[channel],
                final_volume: volume,
                stop_when_done: false,
            },
        );
        Ok(())
    }

    pub fn channel_volume(&self, channel: usize) -> Result<u8, ErrorDetail> {
        Self::check_channel(channel)?;
        Ok(self.channel_volume[channel])
    }

    fn effective_channel_volume(&self, channel: usize) -> u8 {
        let modifier = if channel == KOE_CHANNEL {
            self.koe_volume
        } else {
            self.pcm_volume
        };
        ((self.channel_volume[channel] as u32 * modifier as u32) / 255) as u8
    }

    fn apply_channel_volume(&mut self, channel: usize) {
        let volume = self.effective_channel_volume(channel) as f32 / 255.0;
        if let Some(output) = &self.output {
            output.channel_sinks[channel].set_volume(volume);
        }
    }

    // ------------------------------------------------------- [ wav / se ]

    fn get_sound_chunk(
        &mut self,
        assets: &AssetPaths,
        file: &str,
    ) -> Result<SoundChunk, ErrorDetail> {
        if let Some(chunk) = self.wav_cache.get(file) {
            return Ok(chunk.clone());
        }
        let path = assets.find_file(file, SOUND_FILETYPES)?;
        let mut data = Vec::new();
        File::open(&path)
            .and_then(|mut f| f.read_to_end(&mut data))
            .map_err(|_| ErrorDetail::FileError {
                path: path.display().to_string(),
            })?;
        let chunk = SoundChunk(Arc::new(data));
        self.wav_cache.put(file.to_string(), chunk.clone());
        Ok(chunk)
    }

    fn play_chunk_on(&mut self, channel: usize, chunk: SoundChunk, looping: bool, fadein_ms: u32) {
        self.channel_playing[channel] = true;
        let Some(output) = &mut self.output else {
            return;
        };
        output.reset_sink(channel);
        let Ok(decoder) = rodio::Decoder::new(Cursor::new(chunk)) else {
            log::warn!("could not decode sound chunk for channel {}", channel);
            self.channel_playing[channel] = false;
            return;
        };
        let sink = &output.channel_sinks[channel];
        match (looping, fadein_ms) {
            (true, 0) => sink.append(decoder.repeat_infinite()),
            (true, ms) => {
                sink.append(decoder.repeat_infinite().fade_in(Duration::from_millis(ms as u64)))
            }
            (false, 0) => sink.append(decoder),
            (false, ms) => sink.append(decoder.fade_in(Duration::from_millis(ms as u64))),
        }
        self.apply_channel_volume(channel);
    }

    fn wav_play_impl(
        &mut self,
        assets: &AssetPaths,
        file: &str,
        channel: usize,
        looping: bool,
        fadein_ms: u32,
    ) -> Result<(), ErrorDetail> {
        if !self.pcm_enabled {
            return Ok(());
        }
        let chunk = self.get_sound_chunk(assets, file)?;
        self.play_chunk_on(channel, chunk, looping, fadein_ms);
        Ok(())
    }

    /// Plays a wav on an explicit channel, optionally fading in.
    pub fn wav_play(
        &mut self,
        assets: &AssetPaths,
        file: &str,
        looping: bool,
        channel: usize,
        fadein_ms: u32,
    ) -> Result<(), ErrorDetail> {
        Self::check_channel(channel)?;
        self.wav_play_impl(assets, file, channel, looping, fadein_ms)
    }

    /// Plays a wav on the lowest-numbered free extra channel.
    pub fn wav_play_auto_channel(
        &mut self,
        assets: &AssetPaths,
        file: &str,
        looping: bool,
    ) -> Result<usize, ErrorDetail> {
        let channel = (NUM_BASE_CHANNELS..NUM_BASE_CHANNELS + NUM_EXTRA_WAVPLAY_CHANNELS)
            .find(|&c| !self.is_channel_playing(c))
            .ok_or(ErrorDetail::NoFreeChannel)?;
        self.wav_play_impl(assets, file, channel, looping, 0)?;
        Ok(channel)
    }

    fn is_channel_playing(&self, channel: usize) -> bool {
        match &self.output {
            Some(output) => !output.channel_sinks[channel].empty(),
            None => self.channel_playing[channel],
        }
    }

    pub fn wav_playing(&self, channel: usize) -> Result<bool, ErrorDetail> {
        Self::check_channel(channel)?;
        Ok(self.is_channel_playing(channel))
    }

    pub fn wav_stop(&mut self, channel: usize) -> Result<(), ErrorDetail> {
        Self::check_channel(channel)?;
        self.channel_playing[channel] = false;
        if let Some(output) = &mut self.output {
            output.reset_sink(channel);
        }
        Ok(())
    }

    pub fn wav_stop_all(&mut self) {
        for channel in 0..NUM_TOTAL_CHANNELS {
            let _ = self.wav_stop(channel);
        }
    }

    /// Fades a channel to silence over `fade_ms`, then stops it.
    pub fn wav_fade_out(
        &mut self,
        channel: usize,
        now: u32,
        fade_ms: u32,
    ) -> Result<(), ErrorDetail> {
        Self::check_channel(channel)?;
        self.adjustment_tasks.insert(
            channel,
            VolumeAdjustTask {
                start_time: now,
                end_time: now + fade_ms,
                start_volume: self.channel_volume[channel],
                final_volume: 0,
                stop_when_done: true,
            },
        );
        Ok(())
    }

    /// Plays a numbered sound effect through its configured channel.  An SE
    /// entry with an empty filename just halts the channel.
    pub fn play_se(&mut self, assets: &AssetPaths, se_num: i32) -> Result<(), ErrorDetail> {
        if !self.se_enabled {
            return Ok(());
        }
        let (file, channel) = self
            .se_table
            .get(&se_num)
            .cloned()
            .ok_or_else(|| ErrorDetail::BadOpcodeArguments {
                name: "play_se".to_string(),
                reason: format!("no #SE entry for sound effect {}", se_num),
            })?;
        Self::check_channel(channel)?;
        self.wav_stop(channel)?;
        if file.is_empty() {
            return Ok(());
        }
        let chunk = self.get_sound_chunk(assets, &file)?;
        self.channel_volume[channel] = self.se_volume;
        self.play_chunk_on(channel, chunk, false, 0);
        Ok(())
    }

    pub fn has_se(&self, se_num: i32) -> bool {
        self.se_table.contains_key(&se_num)
    }

    // -------------------------------------------------------------- [ koe ]

    /// Plays a voice sample on the dedicated KOE channel.
    pub fn koe_play(&mut self, assets: &AssetPaths, id: i32) -> Result<(), ErrorDetail> {
        let sample = self.voices.find(assets, id)?;
        let chunk = SoundChunk(Arc::new(match sample {
            VoiceSample::Wav(bytes) | VoiceSample::Ogg(bytes) => bytes,
        }));
        self.play_chunk_on(KOE_CHANNEL, chunk, false, 0);
        Ok(())
    }

    pub fn koe_playing(&self) -> bool {
        self.is_channel_playing(KOE_CHANNEL)
    }

    pub fn koe_stop(&mut self) {
        let _ = self.wav_stop(KOE_CHANNEL);
    }

    // -------------------------------------------------------------- [ bgm ]

    fn ms_to_mix_samples(&self, ms: u32) -> u64 {
        let state = self.bgm.lock().unwrap();
        ms as u64 * state.mixer_rate as u64 * state.mixer_channels as u64 / 1000
    }

    fn lookup_track(&self, name: &str) -> Result<DSTrack, ErrorDetail> {
        let lowered = name.to_lowercase();
        if let Some(track) = self.ds_tracks.get(&lowered) {
            return Ok(track.clone());
        }
        if self.cd_tracks.contains_key(&lowered) {
            return Err(ErrorDetail::UnsupportedFeature {
                what: format!("CD audio (track \"{}\")", name),
            });
        }
        Err(ErrorDetail::MissingAsset {
            stem: format!("music track \"{}\"", name),
        })
    }

    fn load_bgm_stream(
        &self,
        assets: &AssetPaths,
        name: &str,
        looping: bool,
    ) -> Result<BgmStream, ErrorDetail> {
        let track = self.lookup_track(name)?;
        let path = assets.find_file(&track.file, SOUND_FILETYPES)?;
        let mut decoder = open_audio_decoder(&path)?;
        if track.from > 0 {
            decoder.seek(track.from as u64);
        }
        Ok(BgmStream {
            name: track.name,
            decoder,
            loop_point: if looping { track.loop_point } else { STOP_AT_END },
            fade_out_total: 0,
            fade_out_count: 0,
            fade_in_total: 0,
            fade_in_count: 0,
        })
    }

    fn install_stream(&mut self, mut stream: BgmStream, fade_in_ms: u32) {
        stream.fade_in_total = self.ms_to_mix_samples(fade_in_ms);
        stream.fade_in_count = 0;
        let mut state = self.bgm.lock().unwrap();
        state.playing = Some(stream);
        state.paused = false;
    }

    /// Starts a BGM track immediately, replacing whatever plays now.
    pub fn bgm_play(
        &mut self,
        assets: &AssetPaths,
        name: &str,
        looping: bool,
    ) -> Result<(), ErrorDetail> {
        self.bgm_play_with_fade_in(assets, name, looping, 0)
    }

    /// Starts a BGM track with a fade-in envelope.
    pub fn bgm_play_with_fade_in(
        &mut self,
        assets: &AssetPaths,
        name: &str,
        looping: bool,
        fade_in_ms: u32,
    ) -> Result<(), ErrorDetail> {
        if self.bgm_name().eq_ignore_ascii_case(name) {
            return Ok(());
        }
        let stream = self.load_bgm_stream(assets, name, looping)?;
        self.install_stream(stream, fade_in_ms);
        Ok(())
    }

    /// Queues a track to start (with fade-in) after the current one fades
    /// out.  The next [SoundSystem::execute] after the fade starts it.
    pub fn bgm_play_queued(
        &mut self,
        assets: &AssetPaths,
        name: &str,
        looping: bool,
        fade_out_ms: u32,
        fade_in_ms: u32,
    ) -> Result<(), ErrorDetail> {
        if self.bgm_name().eq_ignore_ascii_case(name) {
            return Ok(());
        }
        let stream = self.load_bgm_stream(assets, name, looping)?;
        self.queued_bgm = Some(QueuedBgm {
            stream,
            fade_in_ms,
        });
        self.bgm_fade_out(fade_out_ms);
        Ok(())
    }

    /// Installs a prepared decoder as the playing stream.  This is the
    /// device-free path used by tests and by hosts that decode externally.
    pub fn bgm_play_decoder(
        &mut self,
        name: &str,
        decoder: Box<dyn AudioDecoder>,
        loop_point: i64,
        fade_in_ms: u32,
    ) {
        let stream = BgmStream {
            name: name.to_string(),
            decoder,
            loop_point,
            fade_out_total: 0,
            fade_out_count: 0,
            fade_in_total: 0,
            fade_in_count: 0,
        };
        self.install_stream(stream, fade_in_ms);
    }

    /// Queues a prepared decoder behind a fade-out of the current stream.
    pub fn bgm_queue_decoder(
        &mut self,
        name: &str,
        decoder: Box<dyn AudioDecoder>,
        loop_point: i64,
        fade_out_ms: u32,
        fade_in_ms: u32,
    ) {
        self.queued_bgm = Some(QueuedBgm {
            stream: BgmStream {
                name: name.to_string(),
                decoder,
                loop_point,
                fade_out_total: 0,
                fade_out_count: 0,
                fade_in_total: 0,
                fade_in_count: 0,
            },
            fade_in_ms,
        });
        self.bgm_fade_out(fade_out_ms);
    }

    /// Starts fading the current stream to silence.
    pub fn bgm_fade_out(&mut self, fade_out_ms: u32) {
        let samples = self.ms_to_mix_samples(fade_out_ms.max(1));
        let mut state = self.bgm.lock().unwrap();
        if let Some(music) = state.playing.as_mut() {
            music.fade_out_total = samples;
            music.fade_out_count = 0;
        }
    }

    pub fn bgm_stop(&mut self) {
        self.bgm.lock().unwrap().playing = None;
        self.queued_bgm = None;
    }

    pub fn bgm_pause(&mut self) {
        self.bgm.lock().unwrap().paused = true;
    }

    pub fn bgm_unpause(&mut self) {
        self.bgm.lock().unwrap().paused = false;
    }

    /// 1 while a stream is playing, 0 otherwise.
    pub fn bgm_status(&self) -> i32 {
        let state = self.bgm.lock().unwrap();
        match &state.playing {
            Some(music) if music.loop_point != STOP_NOW => 1,
            _ => 0,
        }
    }

    pub fn bgm_name(&self) -> String {
        let state = self.bgm.lock().unwrap();
        state
            .playing
            .as_ref()
            .map(|m| m.name.clone())
            .unwrap_or_default()
    }

    /// Pulls one block through the music hook, exactly as the audio thread
    /// would.  Tests use this to advance stream time deterministically.
    pub fn mix_into(&self, buffer: &mut [i16]) {
        let mut state = self.bgm.lock().unwrap();
        mix_music(&mut state, buffer);
    }

    pub fn ds_track(&self, name: &str) -> Option<&DSTrack> {
        self.ds_tracks.get(&name.to_lowercase())
    }

    pub fn cd_track(&self, name: &str) -> Option<&CDTrack> {
        self.cd_tracks.get(&name.to_lowercase())
    }

    // ------------------------------------------------------- [ frame tick ]

    /// The per-frame sound tick: advances channel fades, surfaces audio
    /// thread errors, and starts the queued BGM track once the current one
    /// has ended.
    pub fn execute(&mut self, now: u32) {
        // Advance volume fades, committing and dropping finished ones.
        let mut finished: Vec<(usize, bool)> = Vec::new();
        for (&channel, task) in &self.adjustment_tasks {
            if now >= task.end_time {
                finished.push((channel, task.stop_when_done));
            }
        }
        for (channel, stop) in finished {
            if let Some(task) = self.adjustment_tasks.remove(&channel) {
                self.channel_volume[channel] = task.final_volume;
                self.apply_channel_volume(channel);
                if stop {
                    let _ = self.wav_stop(channel);
                }
            }
        }
        let in_flight: Vec<usize> = self.adjustment_tasks.keys().copied().collect();
        for channel in in_flight {
            let volume = self.adjustment_tasks[&channel].volume_for(now);
            self.channel_volume[channel] = volume;
            self.apply_channel_volume(channel);
        }

        // Surface any error the mix hook recorded, and drop a stream that
        // has reached its stop state.
        let error = {
            let mut state = self.bgm.lock().unwrap();
            let error = state.error.take();
            let stream_over = matches!(
                &state.playing,
                Some(music) if music.loop_point == STOP_NOW
            );
            if stream_over {
                state.playing = None;
            }
            error
        };
        if let Some(error) = error {
            log::warn!("audio stream error: {}", error);
        }

        // Start the queued track once nothing is playing.
        if self.queued_bgm.is_some() && self.bgm_status() == 0 {
            let queued = self.queued_bgm.take().unwrap();
            self.install_stream(queued.stream, queued.fade_in_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_test_sound() -> SoundSystem {
        let gexe = Gameexe::from_text(
            r#"
#SOUND_DEFAULT = 5
#SE.000 = "door", 2
#SE.001 = "", 3
#DSTRACK = 0, 99999999, 300, "bgm01", "memories"
#CDTRACK = 0, 99999999, 0, "cdsong"
"#,
        )
        .unwrap();
        SoundSystem::silent(&gexe)
    }

    fn constant_decoder(len: usize, value: i16) -> Box<dyn AudioDecoder> {
        Box::new(MemoryDecoder::new(vec![value; len], 44100, 2))
    }

    #[test]
    fn test_se_table_parsed() {
        let sound = setup_test_sound();
        assert!(sound.has_se(0));
        assert!(sound.has_se(1));
        assert!(!sound.has_se(7));
    }

    #[test]
    fn test_ds_track_parsed_and_lowercased() {
        let sound = setup_test_sound();
        let track = sound.ds_track("MEMORIES").unwrap();
        assert_eq!(track.file, "bgm01");
        assert_eq!(track.loop_point, 300);
    }

    #[test]
    fn test_cd_track_is_recognised_but_rejected() {
        let sound = setup_test_sound();
        let error = sound.lookup_track("cdsong").unwrap_err();
        assert!(matches!(error, ErrorDetail::UnsupportedFeature { .. }));
    }

    #[test]
    fn test_unknown_track_is_missing_asset() {
        let sound = setup_test_sound();
        assert!(matches!(
            sound.lookup_track("nothing"),
            Err(ErrorDetail::MissingAsset { .. })
        ));
    }

    #[test]
    fn test_invalid_channel_and_volume_are_rejected() {
        let mut sound = setup_test_sound();
        assert_eq!(
            sound.set_channel_volume(NUM_TOTAL_CHANNELS, 100).unwrap_err(),
            ErrorDetail::InvalidChannel {
                channel: NUM_TOTAL_CHANNELS
            }
        );
        assert_eq!(
            sound.set_channel_volume(0, 300).unwrap_err(),
            ErrorDetail::InvalidVolume { volume: 300 }
        );
    }

    #[test]
    fn test_volume_fade_interpolates_and_commits() {
        let mut sound = setup_test_sound();
        sound.set_channel_volume(2, 0).unwrap();
        sound
            .set_channel_volume_with_fade(2, 1000, 200, 1000)
            .unwrap();
        sound.execute(1500);
        let halfway = sound.channel_volume(2).unwrap();
        assert!((95..=105).contains(&halfway), "got {}", halfway);
        sound.execute(2100);
        assert_eq!(sound.channel_volume(2).unwrap(), 200);
        // Task removed; later ticks leave the volume alone.
        sound.set_channel_volume(2, 7).unwrap();
        sound.execute(3000);
        assert_eq!(sound.channel_volume(2).unwrap(), 7);
    }

    #[test]
    fn test_bgm_loop_continuity() {
        let mut sound = setup_test_sound();
        // Stream of 10 frames (20 samples, stereo), looping back to frame 3.
        let data: Vec<i16> = (0..20).collect();
        sound.bgm_play_decoder(
            "loop",
            Box::new(MemoryDecoder::new(data, 44100, 2)),
            3,
            0,
        );

        let mut buffer = [0i16; 16];
        sound.mix_into(&mut buffer);
        assert_eq!(buffer[0], 0);
        assert_eq!(buffer[15], 15);

        // The next pull exhausts the stream (4 samples) and resumes at the
        // loop point (frame 3 = sample 6) with no gap.
        sound.mix_into(&mut buffer);
        assert_eq!(&buffer[0..4], &[16, 17, 18, 19]);
        assert_eq!(&buffer[4..8], &[6, 7, 8, 9]);
        assert_eq!(sound.bgm_status(), 1);
    }

    #[test]
    fn test_bgm_stop_at_end_pads_silence_then_stops() {
        let mut sound = setup_test_sound();
        let data: Vec<i16> = vec![9; 6];
        sound.bgm_play_decoder(
            "once",
            Box::new(MemoryDecoder::new(data, 44100, 2)),
            STOP_AT_END,
            0,
        );

        let mut buffer = [1i16; 8];
        sound.mix_into(&mut buffer);
        assert_eq!(&buffer[0..6], &[9; 6]);
        assert_eq!(&buffer[6..8], &[0, 0]);
        assert_eq!(sound.bgm_status(), 0);

        // Subsequent pulls are pure silence.
        let mut buffer = [1i16; 8];
        sound.mix_into(&mut buffer);
        assert_eq!(buffer, [0i16; 8]);
    }

    #[test]
    fn test_bgm_disabled_mixes_silence() {
        let mut sound = setup_test_sound();
        sound.bgm_play_decoder("x", constant_decoder(100, 5), STOP_AT_END, 0);
        sound.set_bgm_enabled(false);
        let mut buffer = [1i16; 8];
        sound.mix_into(&mut buffer);
        assert_eq!(buffer, [0i16; 8]);
    }

    #[test]
    fn test_bgm_volume_scales_output() {
        let mut sound = setup_test_sound();
        sound.bgm_play_decoder("x", constant_decoder(100, 100), STOP_AT_END, 0);
        sound.set_bgm_volume(128).unwrap();
        let mut buffer = [0i16; 8];
        sound.mix_into(&mut buffer);
        assert!((45..=55).contains(&buffer[0]), "got {}", buffer[0]);
    }

    #[test]
    fn test_queued_bgm_takes_over_after_fade_out() {
        let mut sound = setup_test_sound();
        sound.bgm_play_decoder("a", constant_decoder(1_000_000, 100), 0, 0);
        assert_eq!(sound.bgm_name(), "a");

        // Queue B behind a 500 ms fade-out, with a 500 ms fade-in.
        sound.bgm_queue_decoder("b", constant_decoder(1_000_000, 100), 0, 500, 500);

        // 500 ms at 44100 Hz stereo is 44100 samples; pull past it.
        let fade_samples = sound.ms_to_mix_samples(500) as usize;
        let mut buffer = vec![0i16; 4096];
        let mut last_nonzero = 0i16;
        let mut pulled = 0usize;
        while pulled <= fade_samples + 8192 {
            sound.mix_into(&mut buffer);
            if buffer[0] != 0 {
                last_nonzero = buffer[0];
            }
            pulled += buffer.len();
        }
        // The envelope brought A towards silence before it stopped.
        assert!(last_nonzero < 20, "fade-out ended at {}", last_nonzero);
        assert_eq!(sound.bgm_status(), 0);

        // The frame tick starts the queued track, ramping from silence.
        sound.execute(0);
        assert_eq!(sound.bgm_name(), "b");
        assert_eq!(sound.bgm_status(), 1);
        let mut buffer = vec![0i16; 4096];
        sound.mix_into(&mut buffer);
        let early = buffer[16];
        assert!(early < 20, "fade-in started at {}", early);
        // Pull through the fade-in window; B reaches steady volume.
        let mut pulled = buffer.len();
        while pulled <= fade_samples + 8192 {
            sound.mix_into(&mut buffer);
            pulled += buffer.len();
        }
        assert!((90..=100).contains(&buffer[4000]), "got {}", buffer[4000]);
    }

    #[test]
    fn test_wav_auto_channel_allocates_lowest_free() {
        let mut sound = setup_test_sound();
        // Silent mode: mark extra channels busy by hand.
        for channel in NUM_BASE_CHANNELS..NUM_BASE_CHANNELS + 2 {
            sound.channel_playing[channel] = true;
        }
        // wav_play_auto_channel would pick 18 next, but the file is missing;
        // the channel scan itself is what we check here.
        let free = (NUM_BASE_CHANNELS..NUM_BASE_CHANNELS + NUM_EXTRA_WAVPLAY_CHANNELS)
            .find(|&c| !sound.is_channel_playing(c));
        assert_eq!(free, Some(NUM_BASE_CHANNELS + 2));

        for channel in NUM_BASE_CHANNELS..NUM_BASE_CHANNELS + NUM_EXTRA_WAVPLAY_CHANNELS {
            sound.channel_playing[channel] = true;
        }
        let dir = tempfile::tempdir().unwrap();
        let assets = AssetPaths::with_root(dir.path().to_path_buf());
        assert_eq!(
            sound
                .wav_play_auto_channel(&assets, "anything", false)
                .unwrap_err(),
            ErrorDetail::NoFreeChannel
        );
    }

    #[test]
    fn test_missing_se_entry_is_an_error() {
        let mut sound = setup_test_sound();
        let dir = tempfile::tempdir().unwrap();
        let assets = AssetPaths::with_root(dir.path().to_path_buf());
        assert!(sound.play_se(&assets, 42).is_err());
    }

    #[test]
    fn test_empty_se_filename_only_stops_the_channel() {
        let mut sound = setup_test_sound();
        let dir = tempfile::tempdir().unwrap();
        let assets = AssetPaths::with_root(dir.path().to_path_buf());
        sound.channel_playing[3] = true;
        sound.play_se(&assets, 1).unwrap();
        assert!(!sound.wav_playing(3).unwrap());
    }

    #[test]
    fn test_koe_stop_silences_voice_channel() {
        let mut sound = setup_test_sound();
        sound.channel_playing[KOE_CHANNEL] = true;
        assert!(sound.koe_playing());
        sound.koe_stop();
        assert!(!sound.koe_playing());
    }
}
