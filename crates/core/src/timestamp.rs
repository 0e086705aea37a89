use crate::error::ResolveError;
use chrono::NaiveDateTime;
use exif::{In, Reader, Tag, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";
const EXIF_DATE_LEN: usize = 19;
/// kamadak-exif's error for a container it cannot carry EXIF in (GIF, BMP, ...).
const UNKNOWN_CONTAINER: &str = "Unknown image format";

/// Moment a photograph was taken, second resolution, no timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaptureMoment(NaiveDateTime);

impl CaptureMoment {
    pub fn as_naive(&self) -> NaiveDateTime {
        self.0
    }
}

impl fmt::Display for CaptureMoment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(EXIF_DATE_FORMAT))
    }
}

pub trait TimestampResolver {
    fn resolve(&self, path: &Path) -> Result<CaptureMoment, ResolveError>;
}

/// Reads `DateTimeOriginal` from the primary image's EXIF block.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifTimestampResolver;

impl TimestampResolver for ExifTimestampResolver {
    fn resolve(&self, path: &Path) -> Result<CaptureMoment, ResolveError> {
        let file = File::open(path).map_err(|source| ResolveError::Unreadable { source })?;
        let mut buf = BufReader::new(file);
        let exif = match Reader::new().read_from_container(&mut buf) {
            Ok(exif) => exif,
            Err(exif::Error::NotFound(_)) => return Err(ResolveError::MissingTimestamp),
            Err(exif::Error::InvalidFormat(msg)) if msg == UNKNOWN_CONTAINER => {
                return Err(ResolveError::MissingTimestamp)
            }
            Err(exif::Error::Io(source)) => return Err(ResolveError::Unreadable { source }),
            Err(err) => {
                return Err(ResolveError::MalformedTimestamp {
                    value: err.to_string(),
                })
            }
        };

        let field = exif
            .get_field(Tag::DateTimeOriginal, In::PRIMARY)
            .ok_or(ResolveError::MissingTimestamp)?;

        match &field.value {
            Value::Ascii(values) => {
                let Some(raw) = values.first() else {
                    return Err(ResolveError::MissingTimestamp);
                };
                let text =
                    std::str::from_utf8(raw).map_err(|_| ResolveError::MalformedTimestamp {
                        value: String::from_utf8_lossy(raw).into_owned(),
                    })?;
                parse_capture_moment(text)
            }
            other => Err(ResolveError::MalformedTimestamp {
                value: format!("{other:?}"),
            }),
        }
    }
}

/// Parses the fixed-width EXIF form `YYYY:MM:DD HH:MM:SS`.
///
/// Trailing NUL or space padding is tolerated. Anything else (ISO separators,
/// fractional seconds, offsets, out-of-range fields) is rejected.
pub fn parse_capture_moment(input: &str) -> Result<CaptureMoment, ResolveError> {
    let trimmed = input.trim_end_matches(['\0', ' ']);
    let malformed = || ResolveError::MalformedTimestamp {
        value: input.to_string(),
    };

    if !has_exif_date_shape(trimmed) {
        return Err(malformed());
    }

    NaiveDateTime::parse_from_str(trimmed, EXIF_DATE_FORMAT)
        .map(CaptureMoment)
        .map_err(|_| malformed())
}

fn has_exif_date_shape(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != EXIF_DATE_LEN {
        return false;
    }

    bytes.iter().enumerate().all(|(i, b)| match i {
        4 | 7 | 13 | 16 => *b == b':',
        10 => *b == b' ',
        _ => b.is_ascii_digit(),
    })
}

/// Minimal JPEG whose APP1 block holds a single `DateTimeOriginal` entry.
#[cfg(test)]
pub(crate) fn jpeg_with_capture_time(value: &str) -> Vec<u8> {
    assert_eq!(value.len(), EXIF_DATE_LEN, "fixture needs a 19 byte value");

    let mut tiff = Vec::<u8>::new();
    tiff.extend_from_slice(b"II*\0");
    tiff.extend_from_slice(&8u32.to_le_bytes());
    // IFD0: ExifIFDPointer -> 26
    tiff.extend_from_slice(&1u16.to_le_bytes());
    tiff.extend_from_slice(&0x8769u16.to_le_bytes());
    tiff.extend_from_slice(&4u16.to_le_bytes());
    tiff.extend_from_slice(&1u32.to_le_bytes());
    tiff.extend_from_slice(&26u32.to_le_bytes());
    tiff.extend_from_slice(&0u32.to_le_bytes());
    // Exif IFD: DateTimeOriginal, ASCII[20] at 44
    tiff.extend_from_slice(&1u16.to_le_bytes());
    tiff.extend_from_slice(&0x9003u16.to_le_bytes());
    tiff.extend_from_slice(&2u16.to_le_bytes());
    tiff.extend_from_slice(&20u32.to_le_bytes());
    tiff.extend_from_slice(&44u32.to_le_bytes());
    tiff.extend_from_slice(&0u32.to_le_bytes());
    tiff.extend_from_slice(value.as_bytes());
    tiff.push(0);

    let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE1];
    let segment_len = (2 + 6 + tiff.len()) as u16;
    jpeg.extend_from_slice(&segment_len.to_be_bytes());
    jpeg.extend_from_slice(b"Exif\0\0");
    jpeg.extend_from_slice(&tiff);
    jpeg.extend_from_slice(&[0xFF, 0xD9]);
    jpeg
}
