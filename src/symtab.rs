//! Symbol-name resolution.
//!
//! The front half passes symbols around as 16-bit ids and ships the
//! textual names in a side file. The back half only touches names at
//! emission time (exports, globals, call targets), so lookups go through
//! the `NameSource` trait: the streaming binary uses the on-disk table,
//! tests and embedders use the in-memory one.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{CodegenError, CodegenResult};
use crate::types::SymId;

/// Bytes per on-disk record: id + NUL-padded name.
const RECORD_LEN: u64 = 16;
const NAME_LEN: usize = 14;
/// Resolved names kept hot; eviction is strict LRU.
const CACHE_SLOTS: usize = 32;

pub trait NameSource {
    fn name(&mut self, sym: SymId) -> CodegenResult<String>;
}

/// The on-disk symbol table: a little-endian `u16` record count, then
/// fixed 16-byte records (`id:u16` + 14-byte NUL-padded name) in id
/// order, so a lookup is one seek. Bit 15 of the id is a storage-class
/// marker and does not participate in record addressing.
pub struct SymFile {
    file: File,
    count: u16,
    // Front of the vec is the most recently used entry.
    cache: Vec<(SymId, String)>,
}

impl SymFile {
    pub fn open<P: AsRef<Path>>(path: P) -> CodegenResult<SymFile> {
        let mut file = File::open(path)?;
        let mut header = [0u8; 2];
        file.read_exact(&mut header)
            .map_err(|_| CodegenError::ShortRead)?;
        Ok(SymFile {
            file,
            count: u16::from_le_bytes(header),
            cache: Vec::with_capacity(CACHE_SLOTS),
        })
    }

    fn load(&mut self, sym: SymId) -> CodegenResult<String> {
        let slot = (sym & 0x7FFF) as u64;
        if slot >= self.count as u64 {
            return Err(CodegenError::SymbolTable {
                reason: format!("symbol {} out of range ({} entries)", sym, self.count),
            });
        }
        self.file.seek(SeekFrom::Start(2 + RECORD_LEN * slot))?;
        let mut record = [0u8; RECORD_LEN as usize];
        self.file
            .read_exact(&mut record)
            .map_err(|_| CodegenError::ShortRead)?;
        let stored = u16::from_le_bytes([record[0], record[1]]);
        if stored & 0x7FFF != sym & 0x7FFF {
            return Err(CodegenError::SymbolTable {
                reason: format!("symbol {} maps to record {}", sym, stored),
            });
        }
        let name = &record[2..2 + NAME_LEN];
        let end = name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        let name = std::str::from_utf8(&name[..end]).map_err(|_| {
            CodegenError::SymbolTable {
                reason: format!("symbol {} has a non-utf8 name", sym),
            }
        })?;
        Ok(name.to_string())
    }
}

impl NameSource for SymFile {
    fn name(&mut self, sym: SymId) -> CodegenResult<String> {
        if let Some(pos) = self.cache.iter().position(|(id, _)| *id == sym) {
            let hit = self.cache.remove(pos);
            let name = hit.1.clone();
            self.cache.insert(0, hit);
            return Ok(name);
        }
        let name = self.load(sym)?;
        if self.cache.len() == CACHE_SLOTS {
            self.cache.pop();
        }
        self.cache.insert(0, (sym, name.clone()));
        Ok(name)
    }
}

/// Serialize a symbol table in the on-disk format. Records must be
/// supplied in id order with ids dense from 0; names longer than the
/// record field are rejected rather than truncated.
pub fn write_symbol_file<W: Write>(w: &mut W, names: &[&str]) -> CodegenResult<()> {
    if names.len() > 0x8000 {
        return Err(CodegenError::SymbolTable {
            reason: format!("{} symbols exceed the id space", names.len()),
        });
    }
    w.write_all(&(names.len() as u16).to_le_bytes())?;
    for (id, name) in names.iter().enumerate() {
        if name.len() > NAME_LEN {
            return Err(CodegenError::SymbolTable {
                reason: format!("name '{}' longer than {} bytes", name, NAME_LEN),
            });
        }
        let mut record = [0u8; RECORD_LEN as usize];
        record[..2].copy_from_slice(&(id as u16).to_le_bytes());
        record[2..2 + name.len()].copy_from_slice(name.as_bytes());
        w.write_all(&record)?;
    }
    Ok(())
}

/// In-memory name table for tests and embedders that never touch disk.
#[derive(Debug, Default)]
pub struct NameTable {
    names: HashMap<SymId, String>,
}

impl NameTable {
    pub fn new() -> NameTable {
        NameTable::default()
    }

    pub fn insert(&mut self, sym: SymId, name: &str) {
        self.names.insert(sym, name.to_string());
    }

    /// Convenience for tests: ids assigned in order from 0.
    pub fn from_names(names: &[&str]) -> NameTable {
        let mut table = NameTable::new();
        for (id, name) in names.iter().enumerate() {
            table.insert(id as SymId, name);
        }
        table
    }
}

impl NameSource for NameTable {
    fn name(&mut self, sym: SymId) -> CodegenResult<String> {
        self.names
            .get(&sym)
            .cloned()
            .ok_or_else(|| CodegenError::SymbolTable {
                reason: format!("unknown symbol {}", sym),
            })
    }
}
