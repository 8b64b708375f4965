//! # Trailer-Appended Bundle Discovery
//!
//! The host executable may have a module bundle appended after link time.
//! The final 16 bytes are the sentinel `"@tjs/modules"` followed by a
//! big-endian `u32` offset; at that offset sits a sequence of length-prefixed
//! records. This parsing fails closed: any truncation or sentinel mismatch
//! is treated as "no bundle", never as an error the caller must handle,
//! since most executables simply have nothing appended.

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::modules::registry::ModuleRegistry;

const SENTINEL: &[u8; 12] = b"@tjs/modules";
const TRAILER_LEN: u64 = 16;

/// One `[size, name, bytecode]` record recovered from the trailer.
struct Record {
    name: String,
    bytecode: Vec<u8>,
}

/// Opens `path` (normally `std::env::current_exe()`) and loads every
/// trailer-appended module into `registry`. Returns the number of modules
/// loaded; `0` on any malformed or absent trailer.
pub fn load_from_executable(path: &Path, registry: &mut ModuleRegistry) -> usize {
    match try_load(path, registry) {
        Ok(n) => n,
        Err(e) => {
            tracing::debug!(error = %e, "no trailer-appended module bundle found");
            0
        }
    }
}

fn try_load(path: &Path, registry: &mut ModuleRegistry) -> std::io::Result<usize> {
    let mut file = std::fs::File::open(path)?;
    let len = file.metadata()?.len();
    if len < TRAILER_LEN {
        return Ok(0);
    }

    file.seek(SeekFrom::End(-(TRAILER_LEN as i64)))?;
    let mut trailer = [0u8; TRAILER_LEN as usize];
    file.read_exact(&mut trailer)?;

    if &trailer[0..12] != SENTINEL {
        return Ok(0);
    }
    let offset = u32::from_be_bytes([trailer[12], trailer[13], trailer[14], trailer[15]]) as u64;
    if offset >= len - TRAILER_LEN {
        return Ok(0);
    }

    file.seek(SeekFrom::Start(offset))?;
    let bundle_len = len - TRAILER_LEN - offset;
    let mut buf = vec![0u8; bundle_len as usize];
    file.read_exact(&mut buf)?;

    let records = match parse_records(&buf) {
        Some(records) => records,
        None => return Ok(0),
    };

    let count = records.len();
    for record in records {
        registry.register(record.name, record.bytecode);
    }
    Ok(count)
}

fn parse_records(buf: &[u8]) -> Option<Vec<Record>> {
    let mut records = Vec::new();
    let mut cursor = 0usize;
    while cursor < buf.len() {
        if buf.len() - cursor < 4 + 3 + 1 {
            return None;
        }
        let size = u32::from_be_bytes(buf[cursor..cursor + 4].try_into().ok()?) as usize;
        cursor += 4 + 3; // size + 3 reserved bytes
        let name_len = *buf.get(cursor)? as usize;
        cursor += 1;
        if buf.len() - cursor < name_len {
            return None;
        }
        let name = String::from_utf8(buf[cursor..cursor + name_len].to_vec()).ok()?;
        cursor += name_len;

        let bytecode_len = size.checked_sub(3 + 1 + name_len)?;
        if buf.len() - cursor < bytecode_len {
            return None;
        }
        let bytecode = buf[cursor..cursor + bytecode_len].to_vec();
        cursor += bytecode_len;

        records.push(Record { name, bytecode });
    }
    Some(records)
}

/// Appends a trailer (records + sentinel) to `base`, the inverse operation
/// used to build fixtures in tests and `scenario-tests`, since no AOT
/// compiler producing this format is in scope to build.
pub fn append_trailer(base: &mut Vec<u8>, modules: &[(&str, &[u8])]) {
    let bundle_start = base.len() as u32;
    for (name, bytecode) in modules {
        let name_bytes = name.as_bytes();
        let size = 3 + 1 + name_bytes.len() + bytecode.len();
        base.extend_from_slice(&(size as u32).to_be_bytes());
        base.extend_from_slice(&[0u8; 3]);
        base.push(name_bytes.len() as u8);
        base.extend_from_slice(name_bytes);
        base.extend_from_slice(bytecode);
    }
    base.extend_from_slice(SENTINEL);
    base.extend_from_slice(&bundle_start.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_a_single_trailer_appended_module() {
        let mut exe = b"fake-elf-header".to_vec();
        append_trailer(&mut exe, &[("@test/hello", b"world-bytecode")]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture-bin");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&exe)
            .unwrap();

        let mut registry = ModuleRegistry::new();
        let n = load_from_executable(&path, &mut registry);
        assert_eq!(n, 1);
        assert_eq!(
            registry.lookup("@test/hello").unwrap().as_ref(),
            b"world-bytecode"
        );
    }

    #[test]
    fn absent_trailer_loads_zero_modules() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain-bin");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"no trailer here at all")
            .unwrap();

        let mut registry = ModuleRegistry::new();
        assert_eq!(load_from_executable(&path, &mut registry), 0);
    }

    #[test]
    fn truncated_trailer_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short-bin");
        std::fs::File::create(&path).unwrap().write_all(b"x").unwrap();

        let mut registry = ModuleRegistry::new();
        assert_eq!(load_from_executable(&path, &mut registry), 0);
    }
}
