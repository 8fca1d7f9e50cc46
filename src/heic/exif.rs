//! Raw EXIF handling for HEIF metadata blocks.
//!
//! libheif hands out the `Exif` item exactly as stored in the container: a
//! 4-byte big-endian offset to the TIFF header followed by the payload.
//! JPEG APP1 and PNG `eXIf` both want the bare TIFF structure, so the block
//! is unwrapped here. The Orientation helpers work in place on that TIFF data
//! and never re-layout IFDs, so every other tag stays byte-identical.

const TAG_ORIENTATION: u16 = 0x0112;
const FORMAT_SHORT: u16 = 3;
const EXIF_PREFIX: &[u8] = b"Exif\0\0";

/// Unwrap a HEIF `Exif` item into bare TIFF data.
///
/// Returns `None` when the block is too short or does not lead to a TIFF
/// header (`II*\0` / `MM\0*`).
pub fn tiff_from_heif_block(block: &[u8]) -> Option<&[u8]> {
    if block.len() < 4 {
        return None;
    }
    let offset = u32::from_be_bytes([block[0], block[1], block[2], block[3]]) as usize;
    let mut data = block.get(4usize.checked_add(offset)?..)?;

    // Some writers keep the JPEG-style prefix and leave the offset at 0.
    if data.starts_with(EXIF_PREFIX) {
        data = &data[EXIF_PREFIX.len()..];
    }

    if is_tiff_header(data) { Some(data) } else { None }
}

fn is_tiff_header(data: &[u8]) -> bool {
    data.len() >= 8 && (data.starts_with(b"II*\0") || data.starts_with(b"MM\0*"))
}

/// Byte-order aware reads over a TIFF buffer.
#[derive(Clone, Copy)]
struct ByteOrder {
    big_endian: bool,
}

impl ByteOrder {
    fn of(tiff: &[u8]) -> Option<Self> {
        match tiff.get(0..2)? {
            b"MM" => Some(Self { big_endian: true }),
            b"II" => Some(Self { big_endian: false }),
            _ => None,
        }
    }

    fn read_u16(self, data: &[u8], offset: usize) -> Option<u16> {
        let b = data.get(offset..offset + 2)?;
        Some(if self.big_endian {
            u16::from_be_bytes([b[0], b[1]])
        } else {
            u16::from_le_bytes([b[0], b[1]])
        })
    }

    fn read_u32(self, data: &[u8], offset: usize) -> Option<u32> {
        let b = data.get(offset..offset + 4)?;
        Some(if self.big_endian {
            u32::from_be_bytes([b[0], b[1], b[2], b[3]])
        } else {
            u32::from_le_bytes([b[0], b[1], b[2], b[3]])
        })
    }

    fn encode_u16(self, val: u16) -> [u8; 2] {
        if self.big_endian { val.to_be_bytes() } else { val.to_le_bytes() }
    }
}

/// Locate a tag in IFD0 and return the offset of its 12-byte entry.
fn find_ifd0_entry(tiff: &[u8], order: ByteOrder, tag: u16) -> Option<usize> {
    let ifd0_offset = order.read_u32(tiff, 4)? as usize;
    let count = order.read_u16(tiff, ifd0_offset)? as usize;
    let start = ifd0_offset + 2;

    (0..count)
        .map(|i| start + i * 12)
        .take_while(|&entry| entry + 12 <= tiff.len())
        .find(|&entry| order.read_u16(tiff, entry) == Some(tag))
}

/// Read the EXIF Orientation (1-8) from TIFF data, if present.
pub fn orientation(tiff: &[u8]) -> Option<u16> {
    let order = ByteOrder::of(tiff)?;
    let entry = find_ifd0_entry(tiff, order, TAG_ORIENTATION)?;
    if order.read_u16(tiff, entry + 2)? != FORMAT_SHORT {
        return None;
    }
    order.read_u16(tiff, entry + 8)
}

/// Rewrite the Orientation tag to 1 (top-left) in place.
///
/// Returns `true` if the value changed. Data without an Orientation tag, or
/// with one in an unexpected format, is left untouched.
pub fn reset_orientation(tiff: &mut [u8]) -> bool {
    let Some(order) = ByteOrder::of(tiff) else {
        return false;
    };
    let Some(entry) = find_ifd0_entry(tiff, order, TAG_ORIENTATION) else {
        return false;
    };
    if order.read_u16(tiff, entry + 2) != Some(FORMAT_SHORT)
        || order.read_u16(tiff, entry + 8) == Some(1)
    {
        return false;
    }
    tiff[entry + 8..entry + 10].copy_from_slice(&order.encode_u16(1));
    true
}
