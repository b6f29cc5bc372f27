use chrono::Datelike;

/// EXIF tag id for the Copyright field (IFD0)
pub const COPYRIGHT_TAG: u16 = 0x8298;
/// Identifier that precedes the TIFF block in a JPEG APP1 segment
pub const EXIF_HEADER: &[u8; 6] = b"Exif\0\0";

const TIFF_ASCII: u16 = 2;
const IFD0_OFFSET: u32 = 8;

/// Copyright notice stamped into derived images as EXIF metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyrightConfig {
    /// The copyright holder name (e.g., "John Doe Photography")
    pub copyright_holder: String,
}

impl CopyrightConfig {
    pub fn new(copyright_holder: impl Into<String>) -> Self {
        Self {
            copyright_holder: copyright_holder.into(),
        }
    }

    pub fn notice_for_year(&self, year: i32) -> String {
        format!("© {} {}", year, self.copyright_holder)
    }

    pub fn notice(&self) -> String {
        self.notice_for_year(chrono::Local::now().year())
    }

    /// TIFF-structured EXIF block for the current year's notice
    pub fn exif_block(&self) -> Vec<u8> {
        exif_copyright_block(&self.notice())
    }
}

/// Little-endian TIFF block holding a single IFD0 Copyright entry.
pub fn exif_copyright_block(notice: &str) -> Vec<u8> {
    let mut text = notice.as_bytes().to_vec();
    text.push(0);

    let entry_count: u16 = 1;
    let data_offset = IFD0_OFFSET + 2 + 12 * entry_count as u32 + 4;

    let mut block = Vec::with_capacity(data_offset as usize + text.len());
    block.extend_from_slice(b"II");
    block.extend_from_slice(&42u16.to_le_bytes());
    block.extend_from_slice(&IFD0_OFFSET.to_le_bytes());

    block.extend_from_slice(&entry_count.to_le_bytes());
    block.extend_from_slice(&COPYRIGHT_TAG.to_le_bytes());
    block.extend_from_slice(&TIFF_ASCII.to_le_bytes());
    block.extend_from_slice(&(text.len() as u32).to_le_bytes());
    if text.len() <= 4 {
        // Short values are stored inline in the offset field
        let mut inline = [0u8; 4];
        inline[..text.len()].copy_from_slice(&text);
        block.extend_from_slice(&inline);
        block.extend_from_slice(&0u32.to_le_bytes());
        return block;
    }
    block.extend_from_slice(&data_offset.to_le_bytes());
    block.extend_from_slice(&0u32.to_le_bytes()); // no next IFD

    block.extend_from_slice(&text);
    block
}

/// Read back the Copyright string from a block built by [`exif_copyright_block`]
/// or any little-endian TIFF block with the tag in IFD0.
pub fn read_copyright(block: &[u8]) -> Option<String> {
    let u16_at = |pos: usize| {
        block
            .get(pos..pos + 2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
    };
    let u32_at = |pos: usize| {
        block
            .get(pos..pos + 4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    };

    if block.get(0..2)? != b"II" || u16_at(2)? != 42 {
        return None;
    }
    let ifd = u32_at(4)? as usize;
    let count = u16_at(ifd)? as usize;

    (0..count).find_map(|index| {
        let entry = ifd + 2 + index * 12;
        if u16_at(entry)? != COPYRIGHT_TAG || u16_at(entry + 2)? != TIFF_ASCII {
            return None;
        }
        let length = u32_at(entry + 4)? as usize;
        let value = if length <= 4 {
            block.get(entry + 8..entry + 8 + length)?
        } else {
            let offset = u32_at(entry + 8)? as usize;
            block.get(offset..offset.checked_add(length)?)?
        };
        let text = value.strip_suffix(&[0u8]).unwrap_or(value);
        String::from_utf8(text.to_vec()).ok()
    })
}
