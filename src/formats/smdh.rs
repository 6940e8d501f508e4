//! # SMDH (System Menu Data Header)
//!
//! Icon and metadata blob shown by the HOME Menu: sixteen title slots in
//! UTF-16, age ratings, a region lockout mask, display flags and two tiled
//! RGB565 icons (24x24 and 48x48).

use std::io::{Read, Seek};

use binrw::prelude::*;

use crate::error::Result;
use crate::fields::{ImageType, RomFields};
use crate::texture::DecodedImage;
use crate::texture::tiled::decode_n3ds_rgb565;
use crate::util::utf16_to_string;

/// Header (titles and settings) size.
pub const SMDH_HEADER_SIZE: u64 = 0x2040;
/// Header plus both icons.
pub const SMDH_SIZE: u64 = 0x36C0;

pub const SMALL_ICON_SIZE: u32 = 24;
pub const LARGE_ICON_SIZE: u32 = 48;

/// Region value meaning "all regions".
pub const REGION_FREE: u32 = 0x7FFF_FFFF;

pub const REGION_NAMES: &[&str] = &[
    "Japan",
    "USA",
    "Europe",
    "Australia",
    "China",
    "South Korea",
    "Taiwan",
];

pub const FLAG_NAMES: &[&str] = &[
    "Visible",
    "Auto-boot",
    "Uses 3D",
    "Requires EULA",
    "Auto-save on exit",
    "Extended banner",
    "Rating required",
    "Uses save data",
    "Record usage",
    "",
    "Disable save backups",
    "",
    "New 3DS exclusive",
];

/// Rating agency for each of the 16 rating slots; empty slots are unused.
const RATING_AGENCIES: [&str; 16] = [
    "CERO", "ESRB", "", "USK", "PEGI", "", "PEGI (PRT)", "PEGI (BBFC)", "COB", "GRB", "CGSRR", "",
    "", "", "", "",
];

/// Title slot languages, in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Japanese = 0,
    English = 1,
    French = 2,
    German = 3,
    Italian = 4,
    Spanish = 5,
    SimplifiedChinese = 6,
    Korean = 7,
    Dutch = 8,
    Portuguese = 9,
    Russian = 10,
    TraditionalChinese = 11,
}

#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct SmdhTitle {
    pub short_description: [u16; 0x40],
    pub long_description: [u16; 0x80],
    pub publisher: [u16; 0x40],
}

impl SmdhTitle {
    pub fn short_description(&self) -> String {
        utf16_to_string(&self.short_description)
    }

    pub fn long_description(&self) -> String {
        utf16_to_string(&self.long_description)
    }

    pub fn publisher(&self) -> String {
        utf16_to_string(&self.publisher)
    }

    pub fn is_empty(&self) -> bool {
        self.short_description[0] == 0
    }
}

#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct SmdhSettings {
    pub ratings: [u8; 16],
    /// Bit `n` enables region `REGION_NAMES[n]`
    pub region_lockout: u32,
    pub matchmaker_id: u32,
    pub matchmaker_bit_id: u64,
    pub flags: u32,
    pub eula_version: u16,
    _reserved: u16,
    pub optimal_animation_frame: f32,
    pub streetpass_id: u32,
}

#[derive(Debug, Clone, BinRead)]
#[br(little, magic = b"SMDH")]
pub struct Smdh {
    pub version: u16,
    _reserved1: u16,
    pub titles: [SmdhTitle; 16],
    pub settings: SmdhSettings,
    _reserved2: [u8; 8],
    #[br(count = SMALL_ICON_SIZE * SMALL_ICON_SIZE)]
    pub small_icon: Vec<u16>,
    #[br(count = LARGE_ICON_SIZE * LARGE_ICON_SIZE)]
    pub large_icon: Vec<u16>,
}

impl Smdh {
    pub const MAGIC: [u8; 4] = *b"SMDH";

    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        Ok(reader.read_le()?)
    }

    /// Title in `lang`, falling back to English, then Japanese, then the
    /// first non-empty slot.
    pub fn title(&self, lang: Language) -> Option<&SmdhTitle> {
        [lang, Language::English, Language::Japanese]
            .into_iter()
            .map(|l| &self.titles[l as usize])
            .find(|t| !t.is_empty())
            .or_else(|| self.titles.iter().find(|t| !t.is_empty()))
    }

    pub fn is_region_free(&self) -> bool {
        self.settings.region_lockout == REGION_FREE
    }

    /// Active age ratings as `(agency, rating)`.
    pub fn ratings(&self) -> Vec<(&'static str, String)> {
        self.settings
            .ratings
            .iter()
            .zip(RATING_AGENCIES)
            .filter(|&(&value, agency)| value & 0x80 != 0 && !agency.is_empty())
            .map(|(&value, agency)| {
                let rating = if value & 0x40 != 0 {
                    "RP".to_string()
                } else if value & 0x20 != 0 {
                    "All ages".to_string()
                } else {
                    (value & 0x1F).to_string()
                };
                (agency, rating)
            })
            .collect()
    }

    /// Decode one of the two icons.
    pub fn icon(&self, image_type: ImageType) -> Option<DecodedImage> {
        match image_type {
            ImageType::Icon => decode_n3ds_rgb565(LARGE_ICON_SIZE, LARGE_ICON_SIZE, &self.large_icon),
            ImageType::IconSmall => {
                decode_n3ds_rgb565(SMALL_ICON_SIZE, SMALL_ICON_SIZE, &self.small_icon)
            }
        }
    }

    pub fn add_fields(&self, fields: &mut RomFields, lang: Language) {
        if let Some(title) = self.title(lang) {
            fields.add_string("Title", title.short_description());
            fields.add_string("Full Title", title.long_description());
            fields.add_string("Publisher", title.publisher());
        }

        if self.is_region_free() {
            fields.add_string("Region Code", "Region-Free");
        } else {
            fields.add_bitfield("Region Code", self.settings.region_lockout, REGION_NAMES);
        }

        let ratings = self.ratings();
        if !ratings.is_empty() {
            let rendered: Vec<String> = ratings
                .iter()
                .map(|(agency, rating)| format!("{agency}: {rating}"))
                .collect();
            fields.add_string("Age Rating", rendered.join(", "));
        }

        fields.add_bitfield("Flags", self.settings.flags, FLAG_NAMES);
    }
}
