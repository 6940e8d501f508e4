//! Display names for the small enumerations shared by several headers.

/// Publisher for a two-character maker code.
pub fn maker_name(code: &str) -> Option<&'static str> {
    Some(match code {
        "01" => "Nintendo R&D1",
        "08" => "Capcom",
        "13" => "Electronic Arts Japan",
        "18" => "Hudson Soft",
        "20" => "KSS",
        "28" => "Kemco Japan",
        "31" => "Nintendo",
        "32" => "Bandai",
        "34" => "Konami",
        "37" => "Taito",
        "38" => "Hudson",
        "39" => "Banpresto",
        "41" => "Ubisoft",
        "42" => "Atlus",
        "49" => "Irem",
        "4Q" => "Disney Interactive",
        "4Z" => "Crave Entertainment",
        "52" => "Activision",
        "54" => "Konami",
        "5G" => "Majesco",
        "64" => "LucasArts",
        "69" => "Electronic Arts",
        "70" => "Atari",
        "78" => "THQ",
        "7D" => "Sierra",
        "8P" => "Sega",
        "91" => "Chunsoft",
        "A4" => "Konami",
        "AF" => "Namco",
        "E5" => "Epoch",
        "EB" => "Atlus",
        "GT" => "Gust",
        "HB" => "Happinet",
        "KA" => "Kadokawa",
        "MR" => "Marvelous",
        "NB" => "Bandai Namco",
        "QH" => "D3 Publisher",
        "SQ" => "Square Enix",
        "XB" => "XSEED",
        _ => return None,
    })
}

/// `"Nintendo (31)"`, or the bare code when unknown.
pub fn describe_maker(code: &str) -> String {
    match maker_name(code) {
        Some(name) => format!("{name} ({code})"),
        None => code.to_string(),
    }
}

/// NCSD partition flag 5.
pub fn media_type_name(media_type: u8) -> &'static str {
    match media_type {
        0 => "Inner Device",
        1 => "Card1",
        2 => "Card2",
        3 => "Extended Device",
        _ => "Unknown",
    }
}

/// NCSD partition flag 4 and NCCH flag 4.
pub fn platform_name(platform: u8) -> &'static str {
    match platform {
        1 => "Old 3DS (CTR)",
        2 => "New 3DS",
        _ => "Unknown",
    }
}

/// Title category from the high word of a title ID.
pub fn title_type_name(title_id: u64) -> &'static str {
    match (title_id >> 32) as u32 {
        0x0004_0000 => "Application",
        0x0004_0001 => "Download Play Child",
        0x0004_0002 => "Demo",
        0x0004_000E => "Patch/Update",
        0x0004_0010 => "System Application",
        0x0004_001B => "System Data Archive",
        0x0004_0030 => "System Applet",
        0x0004_008C => "DLC",
        0x0004_0130 => "System Module",
        0x0004_0138 => "System Firmware",
        0x0004_8004 | 0x0004_8005 => "DSiWare",
        0x0004_800F => "DSi System Data",
        _ => "Unknown",
    }
}

/// Title version as `major.minor.micro` (6, 6 and 4 bits).
pub fn format_version(version: u16) -> String {
    format!("{}.{}.{}", version >> 10, (version >> 4) & 0x3F, version & 0xF)
}
