//! Container detection from the first bytes of a file.
//!
//! Detection is a list of independent predicates tried in priority order; the
//! first one to claim the file decides its kind.

use std::fmt;

use super::cia::{CIA_HEADER_SIZE, CIA_SIZE_SLACK};
use super::ncsd::{NAND_CRYPT_TYPES_NEW, NAND_CRYPT_TYPES_OLD, NCSD_CRYPT_TYPE_OFFSET, NCSD_MAGIC_OFFSET};
use super::smdh::{SMDH_SIZE, Smdh};
use super::threedsx::{THREEDSX_HEADER_SIZE, Threedsx};
use crate::util::checked_align64;

/// Bytes callers should read from the start of a file before calling
/// [`detect`]. Shorter buffers are never recognised.
pub const PROBE_SIZE: usize = 0x200;

const NCCH_MAGIC_OFFSET: usize = 0x100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// Bare SMDH icon file
    Smdh,
    /// 3DSX homebrew executable
    Homebrew3dsx,
    /// NCSD game card image
    Cci,
    /// CTR Importable Archive
    Cia,
    /// Bare NCCH partition (CXI/CFA)
    Ncch,
    /// NCSD eMMC image
    NandDump { new_hardware: bool },
    Unknown,
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ContainerKind::Smdh => "SMDH",
            ContainerKind::Homebrew3dsx => "3DSX",
            ContainerKind::Cci => "CCI",
            ContainerKind::Cia => "CIA",
            ContainerKind::Ncch => "NCCH",
            ContainerKind::NandDump {
                new_hardware: false,
            } => "eMMC (Old 3DS)",
            ContainerKind::NandDump { new_hardware: true } => "eMMC (New 3DS)",
            ContainerKind::Unknown => "Unknown",
        })
    }
}

struct Probe<'a> {
    header: &'a [u8],
    file_size: u64,
    extension: Option<&'a str>,
}

impl Probe<'_> {
    fn u32_at(&self, offset: usize) -> u64 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.header[offset..offset + 4]);
        u64::from(u32::from_le_bytes(bytes))
    }

    fn u64_at(&self, offset: usize) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.header[offset..offset + 8]);
        u64::from_le_bytes(bytes)
    }

    fn magic_at(&self, offset: usize, magic: &[u8]) -> bool {
        self.header.get(offset..offset + magic.len()) == Some(magic)
    }
}

type Detector = fn(&Probe<'_>) -> Option<ContainerKind>;

const DETECTORS: &[Detector] = &[
    detect_cia,
    detect_smdh,
    detect_3dsx,
    detect_ncsd,
    detect_ncch,
];

/// The CIA header has no magic. It is recognised by its extension, header
/// size and the section sizes adding up to the file size.
fn detect_cia(probe: &Probe<'_>) -> Option<ContainerKind> {
    let is_cia_ext = probe
        .extension
        .is_some_and(|ext| ext.trim_start_matches('.').eq_ignore_ascii_case("cia"));
    if !is_cia_ext || probe.u32_at(0) != u64::from(CIA_HEADER_SIZE) {
        return None;
    }

    let sections = [
        probe.u32_at(0x00),
        probe.u32_at(0x08),
        probe.u32_at(0x0C),
        probe.u32_at(0x10),
        probe.u32_at(0x14),
        probe.u64_at(0x18),
    ];
    let expected = sections
        .into_iter()
        .try_fold(0u64, |sum, size| sum.checked_add(checked_align64(size)?))?;
    let upper = expected.saturating_add(CIA_SIZE_SLACK);
    (expected..=upper)
        .contains(&probe.file_size)
        .then_some(ContainerKind::Cia)
}

fn detect_smdh(probe: &Probe<'_>) -> Option<ContainerKind> {
    (probe.magic_at(0, &Smdh::MAGIC) && probe.file_size >= SMDH_SIZE)
        .then_some(ContainerKind::Smdh)
}

fn detect_3dsx(probe: &Probe<'_>) -> Option<ContainerKind> {
    (probe.magic_at(0, &Threedsx::MAGIC) && probe.file_size >= THREEDSX_HEADER_SIZE)
        .then_some(ContainerKind::Homebrew3dsx)
}

fn detect_ncsd(probe: &Probe<'_>) -> Option<ContainerKind> {
    if !probe.magic_at(NCSD_MAGIC_OFFSET, b"NCSD") {
        return None;
    }
    let crypt_types = &probe.header[NCSD_CRYPT_TYPE_OFFSET..NCSD_CRYPT_TYPE_OFFSET + 8];
    if crypt_types == [0; 8] {
        Some(ContainerKind::Cci)
    } else if crypt_types == NAND_CRYPT_TYPES_OLD {
        Some(ContainerKind::NandDump {
            new_hardware: false,
        })
    } else if crypt_types == NAND_CRYPT_TYPES_NEW {
        Some(ContainerKind::NandDump { new_hardware: true })
    } else {
        None
    }
}

fn detect_ncch(probe: &Probe<'_>) -> Option<ContainerKind> {
    probe
        .magic_at(NCCH_MAGIC_OFFSET, b"NCCH")
        .then_some(ContainerKind::Ncch)
}

/// Identify a container from its first [`PROBE_SIZE`] bytes.
///
/// `extension` may be given with or without the leading dot.
pub fn detect(header: &[u8], file_size: u64, extension: Option<&str>) -> ContainerKind {
    if header.len() < PROBE_SIZE {
        return ContainerKind::Unknown;
    }
    let probe = Probe {
        header,
        file_size,
        extension,
    };
    let kind = DETECTORS
        .iter()
        .find_map(|detector| detector(&probe))
        .unwrap_or(ContainerKind::Unknown);
    tracing::debug!(%kind, file_size, "Detected container");
    kind
}
