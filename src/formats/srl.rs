//! # SRL (Nintendo DS ROM)
//!
//! DSiWare titles ship as CIAs whose first content is a plain DS ROM. Only
//! the ROM header and the icon/title banner are read.

use std::io::{Read, Seek, SeekFrom};

use binrw::prelude::*;
use tracing::trace;

use super::names::describe_maker;
use crate::error::{Error, Result};
use crate::fields::RomFields;
use crate::texture::DecodedImage;
use crate::texture::tiled::decode_nds_ci4;
use crate::util::{ascii_to_string, utf16_to_string};

/// CRC16 of the Nintendo logo, identical in every retail ROM.
pub const NINTENDO_LOGO_CRC: u16 = 0xCF56;
pub const SRL_HEADER_SIZE: u64 = 0x160;
pub const ICON_SIZE: u32 = 32;

/// Banner title languages.
const BANNER_LANGUAGES: [&str; 8] = [
    "Japanese", "English", "French", "German", "Italian", "Spanish", "Chinese", "Korean",
];
const BANNER_ENGLISH: usize = 1;

#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct SrlHeader {
    pub title: [u8; 12],
    pub game_code: [u8; 4],
    pub maker_code: [u8; 2],
    /// 0 = DS, 2 = DS/DSi, 3 = DSi only
    pub unit_code: u8,
    pub encryption_seed_select: u8,
    /// Chip size is `128 KiB << device_capacity`
    pub device_capacity: u8,
    _reserved: [u8; 7],
    pub dsi_flags: u8,
    pub region: u8,
    pub rom_version: u8,
    pub autostart: u8,
    #[br(pad_before = 0x48)]
    pub banner_offset: u32,
    #[br(pad_before = 0xF0)]
    pub logo_crc: u16,
    pub header_crc: u16,
}

impl SrlHeader {
    pub fn title(&self) -> String {
        ascii_to_string(&self.title)
    }

    pub fn game_code(&self) -> String {
        ascii_to_string(&self.game_code)
    }

    pub fn maker_code(&self) -> String {
        ascii_to_string(&self.maker_code)
    }

    pub fn unit_name(&self) -> &'static str {
        match self.unit_code {
            0 => "Nintendo DS",
            2 => "Nintendo DS / DSi",
            3 => "Nintendo DSi",
            _ => "Unknown",
        }
    }

    pub fn region_name(&self) -> &'static str {
        match self.region {
            0x80 => "China",
            0x40 => "South Korea",
            _ => "Region-Free",
        }
    }
}

/// Number of title slots a banner of `version` carries.
pub fn banner_title_count(version: u16) -> usize {
    match version {
        2 => 7,
        3 | 0x103 => 8,
        _ => 6,
    }
}

#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct SrlBanner {
    pub version: u16,
    pub crcs: [u16; 4],
    _reserved: [u8; 0x16],
    /// 32x32, 4bpp in 8x8 tiles
    pub icon: [u8; 0x200],
    pub palette: [u16; 16],
    #[br(count = banner_title_count(version))]
    pub titles: Vec<[u16; 0x80]>,
}

impl SrlBanner {
    /// Title lines (title, subtitle, publisher) for `language`, falling back
    /// to English.
    pub fn title_lines(&self, language: usize) -> Vec<String> {
        let raw = self
            .titles
            .get(language)
            .filter(|t| t[0] != 0)
            .or_else(|| self.titles.get(BANNER_ENGLISH))
            .map(|t| utf16_to_string(t))
            .unwrap_or_default();
        raw.lines().map(str::to_string).collect()
    }

    pub fn icon(&self) -> Option<DecodedImage> {
        decode_nds_ci4(ICON_SIZE, ICON_SIZE, &self.icon, &self.palette)
    }
}

#[derive(Debug, Clone)]
pub struct Srl {
    pub header: SrlHeader,
    pub banner: Option<SrlBanner>,
}

impl Srl {
    /// Parse a DS ROM. Fails unless the Nintendo logo CRC matches.
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        reader.seek(SeekFrom::Start(0))?;
        let header: SrlHeader = reader.read_le()?;
        if header.logo_crc != NINTENDO_LOGO_CRC {
            return Err(Error::InvalidFormat(format!(
                "Nintendo logo CRC is {:04X}, not a DS ROM",
                header.logo_crc
            )));
        }

        let banner = if header.banner_offset != 0 {
            reader.seek(SeekFrom::Start(u64::from(header.banner_offset)))?;
            Some(reader.read_le::<SrlBanner>()?)
        } else {
            None
        };
        trace!(
            game_code = %header.game_code(),
            banner_version = banner.as_ref().map(|b| b.version),
            "Parsed SRL header"
        );
        Ok(Self { header, banner })
    }

    pub fn icon(&self) -> Option<DecodedImage> {
        self.banner.as_ref()?.icon()
    }

    pub fn add_fields(&self, fields: &mut RomFields) {
        let h = &self.header;
        let lines = self
            .banner
            .as_ref()
            .map(|b| b.title_lines(BANNER_ENGLISH))
            .unwrap_or_default();
        match lines.first() {
            Some(title) => fields.add_string("DS Title", title.as_str()),
            None => fields.add_string("DS Title", h.title()),
        }
        if let Some(publisher) = lines.get(1..).and_then(<[String]>::last) {
            fields.add_string("DS Publisher", publisher.as_str());
        }
        fields.add_string("DS Game Code", h.game_code());
        fields.add_string("DS Maker", describe_maker(&h.maker_code()));
        fields.add_string("DS Hardware", h.unit_name());
        fields.add_string("DS Region", h.region_name());
        fields.add_dec("DS Revision", u64::from(h.rom_version));
        if let Some(banner) = &self.banner {
            let languages: Vec<&str> = BANNER_LANGUAGES
                .iter()
                .take(banner.titles.len())
                .copied()
                .collect();
            fields.add_string("DS Banner Languages", languages.join(", "));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::testdata;
    use crate::texture::pixel::bgr555_to_argb32;
    use std::io::Cursor;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn header_and_banner() {
        let srl = Srl::read(&mut Cursor::new(testdata::srl("DSGAME", "ADGE"))).unwrap();
        assert_eq!(srl.header.title(), "DSGAME");
        assert_eq!(srl.header.game_code(), "ADGE");
        assert_eq!(srl.header.maker_code(), "01");
        let banner = srl.banner.as_ref().unwrap();
        assert_eq!(banner.version, 1);
        assert_eq!(banner.titles.len(), 6);
        assert_eq!(
            banner.title_lines(7),
            ["DSGAME", "DS Subtitle", "Nintendo"]
        );

        let mut fields = RomFields::new();
        srl.add_fields(&mut fields);
        assert_eq!(fields.get("DS Title").unwrap().to_string(), "DSGAME");
        assert_eq!(fields.get("DS Publisher").unwrap().to_string(), "Nintendo");
        assert_eq!(fields.get("DS Maker").unwrap().to_string(), "Nintendo R&D1 (01)");
    }

    #[test]
    fn icon_uses_palette() {
        let srl = Srl::read(&mut Cursor::new(testdata::srl("DSGAME", "ADGE"))).unwrap();
        let icon = srl.icon().unwrap();
        assert_eq!((icon.width(), icon.height()), (32, 32));
        assert_eq!(icon.pixel(0, 0), Some(0));
        assert_eq!(icon.pixel(1, 0), Some(bgr555_to_argb32(0x001F)));
        assert_eq!(icon.pixel(31, 31), Some(bgr555_to_argb32(0x001F)));
    }

    #[test]
    fn logo_crc_required() {
        let mut data = testdata::srl("DSGAME", "ADGE");
        data[0x15C] = 0;
        assert!(matches!(
            Srl::read(&mut Cursor::new(data)),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn title_count_by_version() {
        assert_eq!(banner_title_count(1), 6);
        assert_eq!(banner_title_count(2), 7);
        assert_eq!(banner_title_count(3), 8);
        assert_eq!(banner_title_count(0x103), 8);
    }
}
