use crate::error::ErrorDetail;
use crate::instruction::{ParamSpec, Value};
use crate::machine::Machine;
use std::collections::HashMap;

/// What an opcode handler asks the machine to do once it returns.
#[derive(Debug)]
pub enum OpOutcome {
    /// Advance to the next instruction.
    Next,
    /// The handler moved the program position itself (jump/call/return).
    Jumped,
    /// Advance, routing this value to the store register.
    Store(i32),
    /// Set the terminal halt flag.
    Halt,
}

/// The callable form of an opcode implementation.  Handlers receive the
/// machine and their decoded argument list.
pub type OpcodeHandler = Box<dyn Fn(&mut Machine, &[Value]) -> Result<OpOutcome, ErrorDetail>>;

/// One registered opcode: its name, declared parameter signature, and
/// handler.  A `None` handler marks a known-but-unsupported opcode that the
/// machine warns about once and then ignores.
pub struct OpcodeEntry {
    pub name: String,
    pub signature: Vec<ParamSpec>,
    pub handler: Option<OpcodeHandler>,
}

/// The `(module, opcode, overload) -> handler` table.  Registration happens
/// eagerly at machine construction; dispatch is a plain map lookup.
#[derive(Default)]
pub struct OpcodeRegistry {
    entries: HashMap<(u8, u16, u8), OpcodeEntry>,
}

impl OpcodeRegistry {
    /// Constructor that returns an empty registry.
    pub fn new() -> Self {
        OpcodeRegistry {
            entries: HashMap::new(),
        }
    }

    /// Registers an opcode implementation.  Re-registering a key replaces
    /// the earlier entry; game-hack setups use this to patch single opcodes.
    pub fn register(
        &mut self,
        module: u8,
        opcode: u16,
        overload: u8,
        name: &str,
        signature: Vec<ParamSpec>,
        handler: OpcodeHandler,
    ) {
        self.entries.insert(
            (module, opcode, overload),
            OpcodeEntry {
                name: name.to_string(),
                signature,
                handler: Some(handler),
            },
        );
    }

    /// Registers a named no-op for an opcode this implementation does not
    /// support.  Executing it warns once and continues.
    pub fn register_unsupported(&mut self, module: u8, opcode: u16, overload: u8, name: &str) {
        self.entries.insert(
            (module, opcode, overload),
            OpcodeEntry {
                name: name.to_string(),
                signature: Vec::new(),
                handler: None,
            },
        );
    }

    /// Looks up the entry for an instruction key.
    pub fn entry(&self, module: u8, opcode: u16, overload: u8) -> Option<&OpcodeEntry> {
        self.entries.get(&(module, opcode, overload))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
