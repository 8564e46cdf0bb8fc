use crate::assets::{AssetPaths, KOE_ARCHIVE_FILETYPES, KOE_LOOSE_FILETYPES};
use crate::error::ErrorDetail;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use lru::LruCache;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Voice ids pack the archive number and sample number in decimal:
/// `id = archive_no * 100000 + sample_no`.
const ID_RADIX: i32 = 100_000;
/// How many open archives the cache keeps.
const ARCHIVE_CACHE_SIZE: usize = 7;

/// The container formats voice samples arrive in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ArchiveFormat {
    /// Ogg Vorbis entries.
    Ovk,
    /// Raw VisualArts audio entries.
    Nwk,
    /// KOEPAC compressed entries.
    Koepac,
}

/// One entry in an archive's table, sorted by sample number.
#[derive(Copy, Clone, Debug)]
struct Entry {
    koe_num: i32,
    length: u32,
    offset: u32,
}

/// A voice sample ready for the mixer: either a self-contained WAV or an
/// Ogg Vorbis stream for the audio backend's vorbis decoder.
#[derive(Clone, Debug, PartialEq)]
pub enum VoiceSample {
    Wav(Vec<u8>),
    Ogg(Vec<u8>),
}

impl VoiceSample {
    pub fn bytes(&self) -> &[u8] {
        match self {
            VoiceSample::Wav(b) | VoiceSample::Ogg(b) => b,
        }
    }

    pub fn total_size(&self) -> usize {
        self.bytes().len()
    }
}

/// The canonical 44-byte RIFF/WAVE header, patched with the stream's rate,
/// channel count, sample width and size.
pub fn make_wav_header(rate: u32, channels: u16, bytes_per_sample: u16, size: u32) -> Vec<u8> {
    let mut header = Vec::with_capacity(0x2C);
    header.extend_from_slice(b"RIFF");
    header.write_u32::<LittleEndian>(size.saturating_sub(8)).unwrap();
    header.extend_from_slice(b"WAVEfmt ");
    header.write_u32::<LittleEndian>(0x10).unwrap();
    header.write_u16::<LittleEndian>(1).unwrap();
    header.write_u16::<LittleEndian>(channels).unwrap();
    header.write_u32::<LittleEndian>(rate).unwrap();
    header
        .write_u32::<LittleEndian>(rate * channels as u32 * bytes_per_sample as u32)
        .unwrap();
    header
        .write_u16::<LittleEndian>(channels * bytes_per_sample)
        .unwrap();
    header.write_u16::<LittleEndian>(bytes_per_sample * 8).unwrap();
    header.extend_from_slice(b"data");
    header
        .write_u32::<LittleEndian>(size.saturating_sub(0x2C))
        .unwrap();
    header
}

/// An opened voice archive: its entry table, sorted for binary search.
pub struct VoiceArchive {
    format: ArchiveFormat,
    path: PathBuf,
    entries: Vec<Entry>,
}

impl VoiceArchive {
    /// Opens an archive and reads its VisualArts entry table: a 4-byte
    /// little-endian count, then fixed-size records of
    /// `(length, offset, sample_no)` — 16 bytes each for OVK, 12 for NWK.
    fn open(path: &Path) -> Result<Self, ErrorDetail> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        let (format, entry_length) = match extension.as_str() {
            "ovk" => (ArchiveFormat::Ovk, 16usize),
            "nwk" => (ArchiveFormat::Nwk, 12usize),
            "koe" => (ArchiveFormat::Koepac, 0usize),
            _ => {
                return Err(ErrorDetail::CorruptVoiceArchive {
                    path: path.display().to_string(),
                })
            }
        };
        if format == ArchiveFormat::Koepac {
            // KOEPAC stores NWA-compressed samples; that codec lives outside
            // this crate, so the container is recognised but not readable.
            return Err(ErrorDetail::UnsupportedFeature {
                what: format!("KOEPAC voice archive \"{}\"", path.display()),
            });
        }

        let corrupt = || ErrorDetail::CorruptVoiceArchive {
            path: path.display().to_string(),
        };
        let mut file = File::open(path).map_err(|_| corrupt())?;
        let table_len = file.read_u32::<LittleEndian>().map_err(|_| corrupt())?;
        let mut entries = Vec::with_capacity(table_len as usize);
        let mut record = vec![0u8; entry_length];
        for _ in 0..table_len {
            file.read_exact(&mut record).map_err(|_| corrupt())?;
            let length = u32::from_le_bytes(record[0..4].try_into().unwrap());
            let offset = u32::from_le_bytes(record[4..8].try_into().unwrap());
            let koe_num = i32::from_le_bytes(record[8..12].try_into().unwrap());
            entries.push(Entry {
                koe_num,
                length,
                offset,
            });
        }
        entries.sort_by_key(|e| e.koe_num);
        Ok(VoiceArchive {
            format,
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Binary-searches the table and extracts the sample's bytes.
    fn find_sample(&self, sample_no: i32) -> Result<VoiceSample, ErrorDetail> {
        let slot = self
            .entries
            .binary_search_by_key(&sample_no, |e| e.koe_num)
            .map_err(|_| ErrorDetail::NoSuchVoiceSample {
                id: sample_no,
            })?;
        let entry = self.entries[slot];

        let corrupt = || ErrorDetail::CorruptVoiceArchive {
            path: self.path.display().to_string(),
        };
        let mut file = File::open(&self.path).map_err(|_| corrupt())?;
        file.seek(SeekFrom::Start(entry.offset as u64))
            .map_err(|_| corrupt())?;
        let mut data = vec![0u8; entry.length as usize];
        file.read_exact(&mut data).map_err(|_| corrupt())?;

        match self.format {
            ArchiveFormat::Ovk => Ok(VoiceSample::Ogg(data)),
            ArchiveFormat::Nwk => {
                // NWK entries are raw sample data; hand them over with a WAV
                // header so the mixer can play them directly.
                let mut wav = make_wav_header(44100, 2, 2, data.len() as u32 + 0x2C);
                wav.extend_from_slice(&data);
                Ok(VoiceSample::Wav(wav))
            }
            ArchiveFormat::Koepac => unreachable!("KOEPAC archives are rejected at open"),
        }
    }
}

/// Resolves voice ids to samples, caching open archives.
///
/// Lookup order: the archive `z<nnnn>.{ovk,nwk,koe}` on the search paths,
/// then a loose `z<nnnn><nnnnn>.ogg` file for games that ship unpacked
/// voices.
pub struct VoiceCache {
    archives: LruCache<i32, Rc<VoiceArchive>>,
}

impl VoiceCache {
    pub fn new() -> Self {
        VoiceCache {
            archives: LruCache::new(NonZeroUsize::new(ARCHIVE_CACHE_SIZE).unwrap()),
        }
    }

    /// Finds the sample for a packed voice id.
    pub fn find(&mut self, assets: &AssetPaths, id: i32) -> Result<VoiceSample, ErrorDetail> {
        let file_no = id / ID_RADIX;
        let index = id % ID_RADIX;

        if let Some(archive) = self.archives.get(&file_no) {
            return archive.find_sample(index);
        }

        match self.find_archive(assets, file_no)? {
            Some(archive) => {
                let archive = Rc::new(archive);
                self.archives.put(file_no, archive.clone());
                archive.find_sample(index)
            }
            None => self
                .find_unpacked_sample(assets, file_no, index)
                .ok_or(ErrorDetail::NoSuchVoiceSample { id }),
        }
    }

    /// Probes the search paths for this archive number's container.
    fn find_archive(
        &self,
        assets: &AssetPaths,
        file_no: i32,
    ) -> Result<Option<VoiceArchive>, ErrorDetail> {
        let stem = format!("z{:04}", file_no);
        match assets.find_file(&stem, KOE_ARCHIVE_FILETYPES) {
            Ok(path) => VoiceArchive::open(&path).map(Some),
            Err(ErrorDetail::MissingAsset { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Loose voice files live in per-archive directories, like
    /// `KOE/0008/z000800073.ogg`; only the filename matters for the search.
    fn find_unpacked_sample(
        &self,
        assets: &AssetPaths,
        file_no: i32,
        index: i32,
    ) -> Option<VoiceSample> {
        let stem = format!("z{:04}{:05}", file_no, index);
        let path = assets.find_file(&stem, KOE_LOOSE_FILETYPES).ok()?;
        let mut data = Vec::new();
        File::open(path).ok()?.read_to_end(&mut data).ok()?;
        Some(VoiceSample::Ogg(data))
    }
}

impl Default for VoiceCache {
    fn default() -> Self {
        VoiceCache::new()
    }
}
