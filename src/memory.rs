use crate::error::ErrorDetail;
use serde_derive::{Deserialize, Serialize};

/// The number of slots in each integer bank.
const INT_BANK_SIZE: usize = 2000;
/// The number of slots in the strS and strM string banks.
const STR_BANK_SIZE: usize = 2000;
/// The number of slots in the strK bank (scratch strings for text formatting).
const STR_K_BANK_SIZE: usize = 3;

/// Identifies one of the interpreter's integer variable banks.
///
/// A-F are general purpose local banks, G and Z persist across playthroughs,
/// and L is scoped to the current scene.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum IntBank {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    Z,
    L,
}

impl IntBank {
    /// The bank's conventional name, used in error reports.
    pub fn name(self) -> &'static str {
        match self {
            IntBank::A => "intA",
            IntBank::B => "intB",
            IntBank::C => "intC",
            IntBank::D => "intD",
            IntBank::E => "intE",
            IntBank::F => "intF",
            IntBank::G => "intG",
            IntBank::Z => "intZ",
            IntBank::L => "intL",
        }
    }

    fn slot(self) -> usize {
        match self {
            IntBank::A => 0,
            IntBank::B => 1,
            IntBank::C => 2,
            IntBank::D => 3,
            IntBank::E => 4,
            IntBank::F => 5,
            IntBank::G => 6,
            IntBank::Z => 7,
            IntBank::L => 8,
        }
    }
}

/// Identifies one of the string variable banks.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StrBank {
    S,
    M,
    K,
}

impl StrBank {
    pub fn name(self) -> &'static str {
        match self {
            StrBank::S => "strS",
            StrBank::M => "strM",
            StrBank::K => "strK",
        }
    }
}

/// The access width used when reading or writing an integer bank.
///
/// The narrower views are pure functions of the underlying 32-bit storage: a
/// `Byte` access at index `i` addresses byte `i % 4` of word `i / 4`, and a
/// `Short` access at index `i` addresses halfword `i % 2` of word `i / 2`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BitWidth {
    Full,
    Short,
    Byte,
}

impl BitWidth {
    /// How many view slots map onto one 32-bit word.
    fn slots_per_word(self) -> usize {
        match self {
            BitWidth::Full => 1,
            BitWidth::Short => 2,
            BitWidth::Byte => 4,
        }
    }
}

/// A writable handle to a single integer slot, passed into opcode handlers in
/// place of the raw bank so that writes through the handle mutate interpreter
/// memory.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IntReference {
    pub bank: IntBank,
    pub index: usize,
    pub width: BitWidth,
}

impl IntReference {
    /// A full-width reference, the common case.
    pub fn full(bank: IntBank, index: usize) -> Self {
        IntReference {
            bank,
            index,
            width: BitWidth::Full,
        }
    }

    /// The reference for the slot `offset` places after this one, used by
    /// variadic store opcodes that fill consecutive slots.
    pub fn offset(self, offset: usize) -> Self {
        IntReference {
            index: self.index + offset,
            ..self
        }
    }
}

/// A writable handle to a single string slot.
#[derive(Clone, Debug, PartialEq)]
pub struct StrReference {
    pub bank: StrBank,
    pub index: usize,
}

/// The subset of memory that persists across play sessions, written to
/// `global.sav.gz` in the save directory.
#[derive(Clone, Serialize, Deserialize)]
pub struct GlobalMemory {
    pub int_g: Vec<i32>,
    pub int_z: Vec<i32>,
    pub str_m: Vec<String>,
}

/// An abstraction of the interpreter's variable memory: nine integer banks
/// and three string banks.  All slots read as zero / empty until written.
#[derive(Clone)]
pub struct Memory {
    int_banks: [Vec<i32>; 9],
    str_s: Vec<String>,
    str_m: Vec<String>,
    str_k: Vec<String>,
}

impl Memory {
    /// Constructor that returns a [Memory] instance with every slot zeroed.
    pub fn new() -> Self {
        Memory {
            int_banks: std::array::from_fn(|_| vec![0; INT_BANK_SIZE]),
            str_s: vec![String::new(); STR_BANK_SIZE],
            str_m: vec![String::new(); STR_BANK_SIZE],
            str_k: vec![String::new(); STR_K_BANK_SIZE],
        }
    }

    /// Reads one value through the given bank view.  Narrow reads return the
    /// unsigned byte/halfword slice of the underlying word.
    pub fn get_int(
        &self,
        bank: IntBank,
        width: BitWidth,
        index: usize,
    ) -> Result<i32, ErrorDetail> {
        let per_word = width.slots_per_word();
        let word_index = index / per_word;
        let storage = &self.int_banks[bank.slot()];
        if word_index >= storage.len() {
            return Err(ErrorDetail::MemoryOutOfBounds {
                bank: bank.name(),
                index,
            });
        }
        let word = storage[word_index] as u32;
        Ok(match width {
            BitWidth::Full => word as i32,
            BitWidth::Short => ((word >> (16 * (index % 2))) & 0xFFFF) as i32,
            BitWidth::Byte => ((word >> (8 * (index % 4))) & 0xFF) as i32,
        })
    }

    /// Writes one value through the given bank view.  Narrow writes replace
    /// only their slice of the underlying word, truncating `value` to the
    /// view's width.
    pub fn set_int(
        &mut self,
        bank: IntBank,
        width: BitWidth,
        index: usize,
        value: i32,
    ) -> Result<(), ErrorDetail> {
        let per_word = width.slots_per_word();
        let word_index = index / per_word;
        let storage = &mut self.int_banks[bank.slot()];
        if word_index >= storage.len() {
            return Err(ErrorDetail::MemoryOutOfBounds {
                bank: bank.name(),
                index,
            });
        }
        let word = storage[word_index] as u32;
        storage[word_index] = match width {
            BitWidth::Full => value,
            BitWidth::Short => {
                let shift = 16 * (index % 2);
                let mask = 0xFFFFu32 << shift;
                ((word & !mask) | (((value as u32) & 0xFFFF) << shift)) as i32
            }
            BitWidth::Byte => {
                let shift = 8 * (index % 4);
                let mask = 0xFFu32 << shift;
                ((word & !mask) | (((value as u32) & 0xFF) << shift)) as i32
            }
        };
        Ok(())
    }

    /// Reads the slot an [IntReference] points at.
    pub fn read_ref(&self, reference: IntReference) -> Result<i32, ErrorDetail> {
        self.get_int(reference.bank, reference.width, reference.index)
    }

    /// Writes the slot an [IntReference] points at.
    pub fn write_ref(&mut self, reference: IntReference, value: i32) -> Result<(), ErrorDetail> {
        self.set_int(reference.bank, reference.width, reference.index, value)
    }

    fn str_bank(&self, bank: StrBank) -> &Vec<String> {
        match bank {
            StrBank::S => &self.str_s,
            StrBank::M => &self.str_m,
            StrBank::K => &self.str_k,
        }
    }

    fn str_bank_mut(&mut self, bank: StrBank) -> &mut Vec<String> {
        match bank {
            StrBank::S => &mut self.str_s,
            StrBank::M => &mut self.str_m,
            StrBank::K => &mut self.str_k,
        }
    }

    /// Reads one string slot.
    pub fn get_str(&self, bank: StrBank, index: usize) -> Result<&str, ErrorDetail> {
        self.str_bank(bank)
            .get(index)
            .map(|s| s.as_str())
            .ok_or(ErrorDetail::MemoryOutOfBounds {
                bank: bank.name(),
                index,
            })
    }

    /// Writes one string slot.
    pub fn set_str(&mut self, bank: StrBank, index: usize, value: String) -> Result<(), ErrorDetail> {
        let storage = self.str_bank_mut(bank);
        if index >= storage.len() {
            return Err(ErrorDetail::MemoryOutOfBounds {
                bank: bank.name(),
                index,
            });
        }
        storage[index] = value;
        Ok(())
    }

    /// Snapshots the banks that persist across sessions.
    pub fn export_globals(&self) -> GlobalMemory {
        GlobalMemory {
            int_g: self.int_banks[IntBank::G.slot()].clone(),
            int_z: self.int_banks[IntBank::Z.slot()].clone(),
            str_m: self.str_m.clone(),
        }
    }

    /// Restores previously saved persistent banks.  Undersized vectors (from
    /// an older save) leave the tail of the bank zeroed.
    pub fn import_globals(&mut self, globals: GlobalMemory) {
        let copy_ints = |dst: &mut Vec<i32>, src: Vec<i32>| {
            let n = src.len().min(dst.len());
            dst[..n].copy_from_slice(&src[..n]);
        };
        copy_ints(&mut self.int_banks[IntBank::G.slot()], globals.int_g);
        copy_ints(&mut self.int_banks[IntBank::Z.slot()], globals.int_z);
        let n = globals.str_m.len().min(self.str_m.len());
        self.str_m[..n].clone_from_slice(&globals.str_m[..n]);
    }
}

impl Default for Memory {
    fn default() -> Self {
        Memory::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uninitialised_slots_read_zero_and_empty() {
        let memory = Memory::new();
        assert_eq!(memory.get_int(IntBank::A, BitWidth::Full, 1999).unwrap(), 0);
        assert_eq!(memory.get_str(StrBank::S, 0).unwrap(), "");
    }

    #[test]
    fn test_full_write_visible_through_byte_view() {
        let mut memory = Memory::new();
        memory
            .set_int(IntBank::B, BitWidth::Full, 5, 0x04030201)
            .unwrap();
        // Byte view indices 20..24 cover word 5.
        assert_eq!(memory.get_int(IntBank::B, BitWidth::Byte, 20).unwrap(), 0x01);
        assert_eq!(memory.get_int(IntBank::B, BitWidth::Byte, 21).unwrap(), 0x02);
        assert_eq!(memory.get_int(IntBank::B, BitWidth::Byte, 22).unwrap(), 0x03);
        assert_eq!(memory.get_int(IntBank::B, BitWidth::Byte, 23).unwrap(), 0x04);
    }

    #[test]
    fn test_full_write_visible_through_short_view() {
        let mut memory = Memory::new();
        memory
            .set_int(IntBank::C, BitWidth::Full, 3, 0x7FFF0102)
            .unwrap();
        assert_eq!(
            memory.get_int(IntBank::C, BitWidth::Short, 6).unwrap(),
            0x0102
        );
        assert_eq!(
            memory.get_int(IntBank::C, BitWidth::Short, 7).unwrap(),
            0x7FFF
        );
    }

    #[test]
    fn test_byte_write_visible_through_full_view() {
        let mut memory = Memory::new();
        memory.set_int(IntBank::A, BitWidth::Byte, 1, 0xAB).unwrap();
        assert_eq!(
            memory.get_int(IntBank::A, BitWidth::Full, 0).unwrap(),
            0x0000AB00
        );
    }

    #[test]
    fn test_narrow_write_truncates_and_preserves_neighbours() {
        let mut memory = Memory::new();
        memory
            .set_int(IntBank::D, BitWidth::Full, 0, 0x11223344)
            .unwrap();
        memory
            .set_int(IntBank::D, BitWidth::Byte, 2, 0x1FF)
            .unwrap();
        assert_eq!(
            memory.get_int(IntBank::D, BitWidth::Full, 0).unwrap(),
            0x11FF3344u32 as i32
        );
    }

    #[test]
    fn test_out_of_bounds_error_names_the_bank() {
        let memory = Memory::new();
        assert_eq!(
            memory
                .get_int(IntBank::L, BitWidth::Full, 2000)
                .unwrap_err(),
            ErrorDetail::MemoryOutOfBounds {
                bank: "intL",
                index: 2000
            }
        );
    }

    #[test]
    fn test_byte_view_covers_four_times_the_indices() {
        let mut memory = Memory::new();
        // The last addressable byte slot maps onto the last word.
        memory
            .set_int(IntBank::A, BitWidth::Byte, INT_BANK_SIZE * 4 - 1, 0x7F)
            .unwrap();
        assert!(memory
            .set_int(IntBank::A, BitWidth::Byte, INT_BANK_SIZE * 4, 0x7F)
            .is_err());
    }

    #[test]
    fn test_write_through_reference() {
        let mut memory = Memory::new();
        let reference = IntReference::full(IntBank::F, 100);
        memory.write_ref(reference, -42).unwrap();
        assert_eq!(memory.read_ref(reference).unwrap(), -42);
        assert_eq!(memory.read_ref(reference.offset(1)).unwrap(), 0);
    }

    #[test]
    fn test_globals_round_trip() {
        let mut memory = Memory::new();
        memory.set_int(IntBank::G, BitWidth::Full, 7, 777).unwrap();
        memory.set_int(IntBank::Z, BitWidth::Full, 8, 888).unwrap();
        memory
            .set_str(StrBank::M, 9, "cleared".to_string())
            .unwrap();
        memory.set_int(IntBank::A, BitWidth::Full, 1, 111).unwrap();

        let globals = memory.export_globals();
        let mut fresh = Memory::new();
        fresh.import_globals(globals);
        assert_eq!(fresh.get_int(IntBank::G, BitWidth::Full, 7).unwrap(), 777);
        assert_eq!(fresh.get_int(IntBank::Z, BitWidth::Full, 8).unwrap(), 888);
        assert_eq!(fresh.get_str(StrBank::M, 9).unwrap(), "cleared");
        // Local banks do not travel with the globals.
        assert_eq!(fresh.get_int(IntBank::A, BitWidth::Full, 1).unwrap(), 0);
    }
}
