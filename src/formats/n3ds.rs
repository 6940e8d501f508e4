//! # Nintendo 3DS container front end
//!
//! [`Nintendo3ds`] detects what kind of file it was given, parses the primary
//! header up front and loads everything else on demand: the CIA ticket and
//! TMD, per-content NCCH readers, the SMDH and the decoded icons. Each of
//! those is loaded at most once and cached.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use binrw::BinReaderExt;
use tracing::{debug, trace, warn};

use super::cia::{CiaHeader, ContentCrypto, META_SMDH_OFFSET, Ticket, Tmd};
use super::detect::{ContainerKind, PROBE_SIZE, detect};
use super::names::{describe_maker, format_version, platform_name, title_type_name};
use super::ncch::keys::CryptoContext;
use super::ncch::{DEFAULT_MEDIA_UNIT_SHIFT, NcchReader};
use super::ncsd::Ncsd;
use super::smdh::{Language, SMDH_SIZE, Smdh};
use super::srl::Srl;
use super::threedsx::Threedsx;
use crate::error::{Error, Result};
use crate::fields::{ImageType, RomFields};
use crate::io::{DynReader, SharedReader};
use crate::keys::{KeyStore, VerifyResult};
use crate::texture::DecodedImage;
use crate::util::{TitleDataExt, format_title_id};

/// Byte range of one CIA content or NCSD partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub offset: u64,
    pub length: u64,
    /// CIA-layer encryption, if the content has any
    pub crypto: Option<ContentCrypto>,
}

impl ContentRange {
    /// End offset; fails when the declared length runs past the end of a u64.
    pub fn end(&self) -> Result<u64> {
        self.offset.checked_add(self.length).ok_or_else(|| {
            Error::InvalidData(format!(
                "content at {:012X} with length {:X} overflows",
                self.offset, self.length
            ))
        })
    }
}

struct CiaState {
    header: CiaHeader,
    ticket: Option<Ticket>,
    tmd: Option<Tmd>,
    title_key: Option<std::result::Result<[u8; 0x10], VerifyResult>>,
    /// DS ROM in content 0 of a DSiWare package
    srl: Option<Srl>,
}

impl CiaState {
    fn content_range(&self, index: usize) -> Result<ContentRange> {
        let tmd = self.tmd.as_ref().ok_or(Error::NotLoaded("TMD"))?;
        let chunk = tmd.chunks.get(index).ok_or(Error::IndexOutOfRange {
            index,
            count: tmd.chunks.len(),
        })?;
        let relative = tmd.content_offsets()?[index];
        let offset = self
            .header
            .content_offset()
            .checked_add(relative)
            .ok_or_else(|| Error::InvalidData(format!("content {index} starts past 2^64")))?;
        Ok(ContentRange {
            offset,
            length: chunk.size,
            crypto: ContentCrypto::for_chunk(chunk, self.title_key),
        })
    }

    fn has_encrypted_content(&self) -> bool {
        self.tmd
            .as_ref()
            .is_some_and(|tmd| tmd.chunks.iter().any(|c| c.is_encrypted()))
    }
}

/// Primary headers, by container kind.
enum Headers {
    /// The SMDH itself is kept in [`Nintendo3ds::smdh`].
    Smdh,
    Homebrew(Threedsx),
    /// Game card or eMMC image
    Ncsd(Ncsd),
    Cia(Box<CiaState>),
    /// The header is kept in content reader 0.
    Ncch,
}

pub struct Nintendo3ds {
    source: DynReader,
    file_size: u64,
    kind: ContainerKind,
    keys: Option<Arc<KeyStore>>,
    language: Language,
    headers: Headers,
    contents: HashMap<usize, NcchReader>,
    smdh: Option<Smdh>,
    images: HashMap<ImageType, DecodedImage>,
}

impl Nintendo3ds {
    /// Open a file. `file_name` is only used for its extension, which is
    /// how CIAs are recognised.
    #[tracing::instrument(skip(reader, keys), level = "trace")]
    pub fn new<R: Read + Seek + Send + 'static>(
        reader: R,
        file_name: Option<&str>,
        keys: Option<Arc<KeyStore>>,
    ) -> Result<Self> {
        Self::from_shared(SharedReader::from_reader(reader), file_name, keys)
    }

    /// Open a file from a reader shared with other consumers.
    pub fn from_shared(
        source: DynReader,
        file_name: Option<&str>,
        keys: Option<Arc<KeyStore>>,
    ) -> Result<Self> {
        let file_size = source.len()?;
        let mut probe = vec![0u8; PROBE_SIZE];
        let read = source.read_at(0, &mut probe)?;
        probe.truncate(read);
        let extension = file_name
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str());
        let kind = detect(&probe, file_size, extension);

        let whole = || source.sub_file(0, file_size);
        let mut smdh = None;
        let headers = match kind {
            ContainerKind::Unknown => {
                return Err(Error::InvalidFormat(
                    "not a Nintendo 3DS container".to_string(),
                ));
            }
            ContainerKind::Smdh => {
                smdh = Some(Smdh::read(&mut whole())?);
                Headers::Smdh
            }
            ContainerKind::Homebrew3dsx => Headers::Homebrew(Threedsx::read(&mut whole())?),
            ContainerKind::Cci | ContainerKind::NandDump { .. } => {
                Headers::Ncsd(Ncsd::read(&mut whole())?)
            }
            ContainerKind::Cia => Headers::Cia(Box::new(CiaState {
                header: whole().read_le()?,
                ticket: None,
                tmd: None,
                title_key: None,
                srl: None,
            })),
            ContainerKind::Ncch => Headers::Ncch,
        };
        trace!(%kind, file_size = %format!("{:012X}", file_size), "Primary header loaded");

        let mut this = Self {
            source,
            file_size,
            kind,
            keys,
            language: Language::English,
            headers,
            contents: HashMap::new(),
            smdh,
            images: HashMap::new(),
        };
        if kind == ContainerKind::Ncch {
            let reader = this.open_content(0)?;
            if !reader.is_open() {
                return Err(Error::ReaderNotOpen(reader.verify_result()));
            }
        }
        Ok(this)
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Language used for SMDH titles in [`Nintendo3ds::fields`].
    pub fn set_language(&mut self, language: Language) {
        self.language = language;
    }

    fn cia_state(&self) -> Option<&CiaState> {
        match &self.headers {
            Headers::Cia(state) => Some(state),
            _ => None,
        }
    }

    pub fn cia_header(&self) -> Option<&CiaHeader> {
        self.cia_state().map(|s| &s.header)
    }

    pub fn ticket(&self) -> Option<&Ticket> {
        self.cia_state()?.ticket.as_ref()
    }

    pub fn tmd(&self) -> Option<&Tmd> {
        self.cia_state()?.tmd.as_ref()
    }

    /// DS ROM nested in a DSiWare CIA.
    pub fn srl(&self) -> Option<&Srl> {
        self.cia_state()?.srl.as_ref()
    }

    pub fn ncsd(&self) -> Option<&Ncsd> {
        match &self.headers {
            Headers::Ncsd(ncsd) => Some(ncsd),
            _ => None,
        }
    }

    fn media_unit_shift(&self) -> u8 {
        match &self.headers {
            Headers::Ncsd(ncsd) => ncsd.media_unit_shift(),
            _ => DEFAULT_MEDIA_UNIT_SHIFT,
        }
    }

    /// Read the ticket and TMD of a CIA. Calling it again is a no-op.
    ///
    /// When the TMD lists at most two contents, content 0 is also tried as a
    /// DS ROM; failing that is not an error.
    #[tracing::instrument(skip(self), level = "trace")]
    pub fn load_ticket_and_tmd(&mut self) -> Result<()> {
        let Headers::Cia(state) = &mut self.headers else {
            return Err(Error::NotSupported(format!(
                "{} has no ticket or TMD",
                self.kind
            )));
        };
        if state.tmd.is_some() {
            return Ok(());
        }

        let mut reader = self.source.sub_file(0, self.file_size);
        let ticket = if state.header.ticket_size != 0 {
            reader.seek(SeekFrom::Start(state.header.ticket_offset()))?;
            Some(Ticket::read(&mut reader)?)
        } else {
            None
        };
        reader.seek(SeekFrom::Start(state.header.tmd_offset()))?;
        let tmd = Tmd::read(&mut reader)?;

        let title_key = ticket
            .as_ref()
            .map(|ticket| ticket.decrypt_title_key(self.keys.as_deref()));
        if let Some(Err(reason)) = &title_key {
            warn!(%reason, "Title key unavailable");
        }
        trace!(
            title_id = %format_title_id(tmd.header.title_id),
            contents = tmd.chunks.len(),
            boot_content = tmd.header.boot_content,
            "Ticket and TMD loaded"
        );

        let try_srl = tmd.header.content_count <= 2;
        state.ticket = ticket;
        state.tmd = Some(tmd);
        state.title_key = title_key;

        if try_srl {
            match Self::open_srl(&self.source, state) {
                Ok(srl) => {
                    debug!(game_code = %srl.header.game_code(), "Content 0 is a DS ROM");
                    state.srl = Some(srl);
                }
                Err(e) => warn!("Content 0 is not a DS ROM: {}", e),
            }
        }
        Ok(())
    }

    fn open_srl(source: &DynReader, state: &CiaState) -> Result<Srl> {
        let range = state.content_range(0)?;
        let raw = source.sub_file(range.offset, range.end()?);
        let mut content = match range.crypto {
            Some(crypto) => crypto.open(raw).map_err(Error::ReaderNotOpen)?,
            None => raw,
        };
        Srl::read(&mut content)
    }

    /// Where content `index` lives in the file.
    ///
    /// For CIAs `index` is the TMD record position and the ticket and TMD
    /// must already be loaded. For card images it is the partition number.
    pub fn resolve_content_byte_range(&self, index: usize) -> Result<ContentRange> {
        let range = match &self.headers {
            Headers::Cia(state) => state.content_range(index)?,
            Headers::Ncsd(ncsd) => {
                let (offset, length) = ncsd
                    .partition_range(index)?
                    .ok_or_else(|| Error::NotFound(format!("partition {index}")))?;
                ContentRange {
                    offset,
                    length,
                    crypto: None,
                }
            }
            Headers::Ncch if index == 0 => ContentRange {
                offset: 0,
                length: self.file_size,
                crypto: None,
            },
            Headers::Ncch => return Err(Error::IndexOutOfRange { index, count: 1 }),
            Headers::Smdh | Headers::Homebrew(_) => {
                return Err(Error::NotSupported(format!("{} has no contents", self.kind)));
            }
        };
        trace!(
            index,
            offset = %format!("{:012X}", range.offset),
            length = %format!("{:012X}", range.length),
            "Resolved content range"
        );
        Ok(range)
    }

    /// NCCH reader for content `index`, created on first use.
    ///
    /// A reader whose keys are missing is still returned; check
    /// [`NcchReader::verify_result`].
    #[tracing::instrument(skip(self), level = "trace")]
    pub fn open_content(&mut self, index: usize) -> Result<&mut NcchReader> {
        if matches!(self.kind, ContainerKind::NandDump { .. }) {
            return Err(Error::NotSupported(
                "eMMC partitions are not NCCH".to_string(),
            ));
        }
        if self.kind == ContainerKind::Cia {
            self.load_ticket_and_tmd()?;
        }
        if !self.contents.contains_key(&index) {
            let range = self.resolve_content_byte_range(index)?;
            let reader = NcchReader::new(
                self.source.sub_file(range.offset, range.end()?),
                self.media_unit_shift(),
                self.keys.as_deref(),
                range.crypto.as_ref(),
            );
            self.contents.insert(index, reader);
        }
        self.contents
            .get_mut(&index)
            .ok_or(Error::NotLoaded("content reader"))
    }

    /// The content that carries the title's icon and exheader: the TMD boot
    /// content for CIAs, partition 0 for card images, the file itself for
    /// bare NCCHs.
    ///
    /// Only fails for kinds without contents. When the content cannot be
    /// opened, a closed reader is returned whose `verify_result` says why.
    pub fn resolve_primary_content(&mut self) -> Result<&mut NcchReader> {
        if !matches!(
            self.kind,
            ContainerKind::Cia | ContainerKind::Cci | ContainerKind::Ncch
        ) {
            return Err(Error::NotSupported(format!(
                "{} has no primary content",
                self.kind
            )));
        }

        let index = if self.kind == ContainerKind::Cia {
            if let Err(e) = self.load_ticket_and_tmd() {
                warn!("TMD unavailable, assuming content 0: {}", e);
            }
            self.tmd().map_or(0, Tmd::boot_chunk)
        } else {
            0
        };

        if let Err(e) = self.open_content(index).map(|_| ()) {
            warn!(index, "Primary content unavailable: {}", e);
            let reason = match e {
                Error::ReaderNotOpen(reason) => reason,
                _ => VerifyResult::HeaderInvalid,
            };
            let closed = NcchReader::closed(
                self.source.sub_file(0, 0),
                DEFAULT_MEDIA_UNIT_SHIFT,
                reason,
            );
            self.contents.insert(index, closed);
        }
        self.contents
            .get_mut(&index)
            .ok_or(Error::NotLoaded("primary content"))
    }

    fn read_smdh_at(&self, offset: u64, size: u64) -> Result<Smdh> {
        trace!(offset = %format!("{:012X}", offset), "Reading SMDH");
        Smdh::read(&mut self.source.sub_file(offset, offset + size))
    }

    /// SMDH position in the CIA meta block, when the block is large enough.
    /// Only the CIA header is needed to find it.
    fn meta_smdh_offset(&self) -> Option<u64> {
        let header = self.cia_header()?;
        if u64::from(header.meta_size) < META_SMDH_OFFSET + SMDH_SIZE {
            return None;
        }
        header.meta_offset()?.checked_add(META_SMDH_OFFSET)
    }

    fn smdh_from_primary_exefs(&mut self) -> Result<Smdh> {
        let content = self.resolve_primary_content()?;
        if !content.is_open() {
            return Err(Error::ReaderNotOpen(content.verify_result()));
        }
        let icon = content
            .read_exefs_file("icon")?
            .ok_or_else(|| Error::NotFound("ExeFS icon".to_string()))?;
        Smdh::read(&mut Cursor::new(icon))
    }

    fn locate_smdh(&mut self) -> Result<Smdh> {
        match self.kind {
            ContainerKind::Smdh => self.read_smdh_at(0, self.file_size),
            ContainerKind::Homebrew3dsx => {
                let Headers::Homebrew(tdsx) = &self.headers else {
                    return Err(Error::NotLoaded("3DSX header"));
                };
                let (offset, size) = tdsx
                    .smdh_range()
                    .ok_or_else(|| Error::NotFound("3DSX has no SMDH".to_string()))?;
                self.read_smdh_at(offset, size)
            }
            ContainerKind::Cia => {
                match self.meta_smdh_offset() {
                    Some(offset) => match self.read_smdh_at(offset, SMDH_SIZE) {
                        Ok(smdh) => return Ok(smdh),
                        Err(e) => warn!("Meta block SMDH unreadable, trying the ExeFS: {}", e),
                    },
                    None => trace!("No SMDH in the meta block"),
                }
                self.smdh_from_primary_exefs()
            }
            ContainerKind::Cci | ContainerKind::Ncch => self.smdh_from_primary_exefs(),
            ContainerKind::NandDump { .. } => Err(Error::NotSupported(
                "eMMC images carry no icon".to_string(),
            )),
            ContainerKind::Unknown => Err(Error::InvalidFormat(
                "not a Nintendo 3DS container".to_string(),
            )),
        }
    }

    /// The title's SMDH, located according to the container kind.
    pub fn load_icon_metadata(&mut self) -> Result<&Smdh> {
        if self.smdh.is_none() {
            let smdh = self.locate_smdh()?;
            self.smdh = Some(smdh);
        }
        self.smdh.as_ref().ok_or(Error::NotLoaded("SMDH"))
    }

    fn decode_image(&mut self, image_type: ImageType) -> Result<DecodedImage> {
        let smdh_error = match self.load_icon_metadata() {
            Ok(smdh) => {
                return smdh
                    .icon(image_type)
                    .ok_or_else(|| Error::InvalidData("SMDH icon could not be decoded".to_string()));
            }
            Err(e) => e,
        };
        if image_type == ImageType::Icon {
            if let Some(icon) = self.srl().and_then(Srl::icon) {
                debug!("Using the DS banner icon");
                return Ok(icon);
            }
        }
        Err(smdh_error)
    }

    /// Decoded icon, cached after the first call.
    pub fn image(&mut self, image_type: ImageType) -> Result<&DecodedImage> {
        if !self.images.contains_key(&image_type) {
            let image = self.decode_image(image_type)?;
            self.images.insert(image_type, image);
        }
        self.images
            .get(&image_type)
            .ok_or(Error::NotLoaded("image"))
    }

    fn add_cia_fields(&mut self, fields: &mut RomFields) {
        if let Err(e) = self.load_ticket_and_tmd() {
            fields.add_warning(format!("ticket and TMD could not be loaded: {e}"));
            return;
        }
        let Some(state) = self.cia_state() else {
            return;
        };

        if let Some(tmd) = &state.tmd {
            let h = &tmd.header;
            fields.add_string("Title ID", format_title_id(h.title_id));
            fields.add_string("Title Type", title_type_name(h.title_id));
            fields.add_string("Title Version", format_version(h.title_version));
            let rows = tmd
                .chunks
                .iter()
                .map(|chunk| {
                    vec![
                        chunk.index.to_string(),
                        format!("{:08X}", chunk.id),
                        if chunk.is_encrypted() { "Encrypted" } else { "" }.to_string(),
                        format!("0x{:X}", chunk.size),
                    ]
                })
                .collect();
            fields.add_list("Contents", &["#", "ID", "Flags", "Size"], rows);
        }
        if let Some(ticket) = &state.ticket {
            fields.add_string("Issuer", ticket.issuer());
            fields.add_dec("Common Key Index", u64::from(ticket.common_key_index));
        }
        if let Some(Err(reason)) = state.title_key {
            if state.has_encrypted_content() {
                fields.add_warning(reason);
            }
        }
        if let Some(srl) = &state.srl {
            srl.add_fields(fields);
        }
    }

    fn add_primary_content_fields(&mut self, fields: &mut RomFields) {
        let content = match self.resolve_primary_content() {
            Ok(content) => content,
            Err(e) => {
                fields.add_warning(e);
                return;
            }
        };
        if !content.is_open() {
            fields.add_warning(format!("content cannot be read: {}", content.verify_result()));
            return;
        }

        if let (Some(h), Some(ctx)) = (content.header(), content.crypto_context()) {
            fields.add_string("Program ID", format_title_id(h.program_id));
            fields.add_string("Product Code", h.product_code());
            fields.add_string("Maker", describe_maker(&h.maker_code()));
            fields.add_string("Content Type", h.content_type_name());
            fields.add_string("Hardware", platform_name(h.flags.platform));
            fields.add_dec("NCCH Version", u64::from(h.version));
            fields.add_string("Encryption", describe_crypto(ctx));
        }

        let status = content.verify_result();
        if !status.is_ok() {
            fields.add_warning(status);
            return;
        }
        match content.exheader() {
            Ok(Some(exheader)) => {
                fields.add_string("Process Name", exheader.sci.title());
                fields.add_hex("Save Data Size", exheader.sci.save_data_size, 8);
                fields.add_hex("Jump ID", exheader.sci.jump_id, 16);
                fields.add_hex("Core Version", u64::from(exheader.aci.core_version), 8);
            }
            Ok(None) => {}
            Err(e) => fields.add_warning(e),
        }
    }

    /// All metadata as display fields.
    ///
    /// Failures past the primary header become `Warning` fields instead of
    /// errors.
    pub fn fields(&mut self) -> RomFields {
        let mut fields = RomFields::new();
        fields.add_string("Container", self.kind.to_string());

        match &self.headers {
            Headers::Homebrew(tdsx) => tdsx.add_fields(&mut fields),
            Headers::Ncsd(ncsd) => ncsd.add_fields(&mut fields),
            Headers::Smdh | Headers::Cia(_) | Headers::Ncch => {}
        }
        if self.kind == ContainerKind::Cia {
            self.add_cia_fields(&mut fields);
        }

        let is_dsiware = self.srl().is_some();
        if matches!(
            self.kind,
            ContainerKind::Cia | ContainerKind::Cci | ContainerKind::Ncch
        ) && !is_dsiware
        {
            self.add_primary_content_fields(&mut fields);
        }

        let expects_smdh = match &self.headers {
            Headers::Homebrew(tdsx) => tdsx.smdh_range().is_some(),
            Headers::Ncsd(ncsd) => !ncsd.is_nand(),
            _ => !is_dsiware,
        };
        if expects_smdh {
            let language = self.language;
            match self.load_icon_metadata() {
                Ok(smdh) => smdh.add_fields(&mut fields, language),
                Err(e) => fields.add_warning(format!("SMDH could not be loaded: {e}")),
            }
        }
        fields
    }
}

fn describe_crypto(ctx: &CryptoContext) -> String {
    if !ctx.encrypted {
        return "None".to_string();
    }
    if ctx.fixed_key {
        return "Fixed key".to_string();
    }
    match ctx.keyslot {
        Some(slot) if ctx.uses_seed => format!("Slot 0x{slot:02X} (seeded)"),
        Some(slot) => format!("Slot 0x{slot:02X}"),
        None => "Unknown".to_string(),
    }
}

impl TitleDataExt for Nintendo3ds {
    fn title_id(&self) -> Result<u64> {
        match &self.headers {
            Headers::Cia(state) => state
                .tmd
                .as_ref()
                .map(|tmd| tmd.header.title_id)
                .ok_or(Error::NotLoaded("TMD")),
            Headers::Ncsd(ncsd) if !ncsd.is_nand() => Ok(ncsd.header.media_id),
            Headers::Ncch => self
                .contents
                .get(&0)
                .ok_or(Error::NotLoaded("NCCH header"))?
                .title_id(),
            _ => Err(Error::NotSupported(format!("{} has no title ID", self.kind))),
        }
    }
}
