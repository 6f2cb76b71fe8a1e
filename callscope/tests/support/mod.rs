//! Shared fixtures: minimal ELF files, a scripted line-table tool and
//! sample builders.

#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use callscope_common::{Sample, SymbolEntry};

pub const EM_X86_64: u16 = 62;
pub const EM_AARCH64: u16 = 183;

const SHT_PROGBITS: u32 = 1;
const SHT_STRTAB: u32 = 3;
const SHT_NOTE: u32 = 7;
const NT_GNU_BUILD_ID: u32 = 3;

struct Section {
    name: &'static str,
    kind: u32,
    align: u64,
    data: Vec<u8>,
}

/// Write a section-only ELF64 little-endian shared object.
///
/// The file carries a GNU build-id note and, if requested, a (meaningless)
/// `.debug_line` section. That is all the inspection code looks at.
pub fn write_elf(path: &Path, machine: u16, build_id: &[u8], debug_line: bool) {
    let mut sections = vec![Section {
        name: ".note.gnu.build-id",
        kind: SHT_NOTE,
        align: 4,
        data: build_id_note(build_id),
    }];
    if debug_line {
        sections.push(Section {
            name: ".debug_line",
            kind: SHT_PROGBITS,
            align: 1,
            data: vec![0; 16],
        });
    }

    // Section name table: "\0" then each name, then ".shstrtab"
    let mut shstrtab = vec![0u8];
    let mut name_offsets = Vec::new();
    for section in &sections {
        name_offsets.push(u32::try_from(shstrtab.len()).unwrap());
        shstrtab.extend_from_slice(section.name.as_bytes());
        shstrtab.push(0);
    }
    let shstrtab_name = u32::try_from(shstrtab.len()).unwrap();
    shstrtab.extend_from_slice(b".shstrtab\0");

    let mut body = Vec::new();
    let mut offsets = Vec::new();
    let mut offset = 64u64;
    for section in &sections {
        offsets.push(offset);
        body.extend_from_slice(&section.data);
        offset += section.data.len() as u64;
    }
    let shstrtab_offset = offset;
    body.extend_from_slice(&shstrtab);
    offset += shstrtab.len() as u64;
    while offset % 8 != 0 {
        body.push(0);
        offset += 1;
    }
    let shoff = offset;
    let shnum = u16::try_from(sections.len() + 2).unwrap();

    let mut out = Vec::new();
    // e_ident
    out.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 0]);
    out.extend_from_slice(&[0; 8]);
    out.extend_from_slice(&3u16.to_le_bytes()); // ET_DYN
    out.extend_from_slice(&machine.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes()); // e_version
    out.extend_from_slice(&0u64.to_le_bytes()); // e_entry
    out.extend_from_slice(&0u64.to_le_bytes()); // e_phoff
    out.extend_from_slice(&shoff.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    out.extend_from_slice(&64u16.to_le_bytes()); // e_ehsize
    out.extend_from_slice(&56u16.to_le_bytes()); // e_phentsize
    out.extend_from_slice(&0u16.to_le_bytes()); // e_phnum
    out.extend_from_slice(&64u16.to_le_bytes()); // e_shentsize
    out.extend_from_slice(&shnum.to_le_bytes());
    out.extend_from_slice(&(shnum - 1).to_le_bytes()); // e_shstrndx
    assert_eq!(out.len(), 64);
    out.extend_from_slice(&body);

    out.extend_from_slice(&[0; 64]);
    for ((section, name), offset) in sections.iter().zip(&name_offsets).zip(&offsets) {
        push_section_header(&mut out, *name, section.kind, *offset, section.data.len(), section.align);
    }
    push_section_header(&mut out, shstrtab_name, SHT_STRTAB, shstrtab_offset, shstrtab.len(), 1);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, out).unwrap();
}

fn build_id_note(build_id: &[u8]) -> Vec<u8> {
    let mut note = Vec::new();
    note.extend_from_slice(&4u32.to_le_bytes());
    note.extend_from_slice(&u32::try_from(build_id.len()).unwrap().to_le_bytes());
    note.extend_from_slice(&NT_GNU_BUILD_ID.to_le_bytes());
    note.extend_from_slice(b"GNU\0");
    note.extend_from_slice(build_id);
    while note.len() % 4 != 0 {
        note.push(0);
    }
    note
}

fn push_section_header(out: &mut Vec<u8>, name: u32, kind: u32, offset: u64, size: usize, align: u64) {
    out.extend_from_slice(&name.to_le_bytes());
    out.extend_from_slice(&kind.to_le_bytes());
    out.extend_from_slice(&0u64.to_le_bytes()); // sh_flags
    out.extend_from_slice(&0u64.to_le_bytes()); // sh_addr
    out.extend_from_slice(&offset.to_le_bytes());
    out.extend_from_slice(&(size as u64).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // sh_link
    out.extend_from_slice(&0u32.to_le_bytes()); // sh_info
    out.extend_from_slice(&align.to_le_bytes());
    out.extend_from_slice(&0u64.to_le_bytes()); // sh_entsize
}

/// Write an executable `/bin/sh` script that behaves like `addr2line -aiC`.
///
/// Each invocation appends `--` to `log`, followed by every address it was
/// asked for. Addresses in `answers` (lowercase hex, no prefix) print the
/// given `file:line` frames; everything else prints `??:0`.
pub fn write_line_tool(path: &Path, log: &Path, answers: &[(&str, &[&str])]) {
    let mut cases = String::new();
    for (addr, frames) in answers {
        let echoes: Vec<String> = frames.iter().map(|f| format!("echo \"{f}\"")).collect();
        cases.push_str(&format!("    {addr}) {} ;;\n", echoes.join("; ")));
    }
    let script = format!(
        "#!/bin/sh\n\
         echo -- >> \"{log}\"\n\
         while read addr; do\n\
         \x20 echo \"$addr\" >> \"{log}\"\n\
         \x20 echo \"0x$addr\"\n\
         \x20 case \"$addr\" in\n\
         {cases}\
         \x20   *) echo \"??:0\" ;;\n\
         \x20 esac\n\
         done\n",
        log = log.display(),
    );
    write_script(path, &script);
}

/// Write an executable `/bin/sh` script that behaves like `objdump -dlC`.
///
/// Each invocation appends its arguments to `log` as one line and prints a
/// fixed listing for a function at 0x1000.
pub fn write_disassembler(path: &Path, log: &Path) {
    let script = format!(
        "#!/bin/sh\n\
         echo \"$*\" >> \"{log}\"\n\
         echo\n\
         echo \"0000000000001000 <compute>:\"\n\
         echo \"/build/demo/compute.c:10\"\n\
         echo \"    1000:  push   %rbp\"\n\
         echo \"    1010:  ret\"\n",
        log = log.display(),
    );
    write_script(path, &script);
}

/// Write an executable script that never answers.
pub fn write_hanging_tool(path: &Path) {
    write_script(path, "#!/bin/sh\nexec sleep 30\n");
}

fn write_script(path: &Path, script: &str) {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o755)
        .open(path)
        .unwrap();
    file.write_all(script.as_bytes()).unwrap();
    file.sync_all().unwrap();
}

/// Addresses the scripted tool was asked for, one `Vec` per invocation
pub fn tool_invocations(log: &Path) -> Vec<Vec<String>> {
    let Ok(text) = fs::read_to_string(log) else { return Vec::new() };
    let mut invocations: Vec<Vec<String>> = Vec::new();
    for line in text.lines() {
        if line == "--" {
            invocations.push(Vec::new());
        } else if let Some(current) = invocations.last_mut() {
            current.push(line.to_string());
        }
    }
    invocations
}

pub fn frame(dso: &str, name: &str, addr: u64) -> SymbolEntry {
    SymbolEntry {
        dso_path: dso.to_string(),
        symbol_name: name.to_string(),
        symbol_addr: addr,
        symbol_len: 0x40,
        vaddr_in_file: addr,
    }
}

/// A sample on pid/tid 100 with `leaf` as the interrupted frame
pub fn sample(event: &str, period: u64, leaf: SymbolEntry, callchain: Vec<SymbolEntry>) -> Sample {
    Sample {
        pid: 100,
        tid: 100,
        thread_comm: "main".to_string(),
        event_name: event.to_string(),
        period,
        symbol: leaf,
        callchain,
    }
}

pub fn temp_path(dir: &tempfile::TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}
