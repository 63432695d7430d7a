//! WAV payload exchanged with the remote service
//!
//! Uploads are written by `hound` in the canonical 44-byte PCM layout:
//!
//! ```text
//!  0..4   "RIFF"          4..8   total size - 8
//!  8..12  "WAVE"         12..16  "fmt "
//! 16..20  16             20..22  audio format (1 = PCM)
//! 22..24  channels       24..28  sample rate
//! 28..32  byte rate      32..34  block align
//! 34..36  bits/sample    36..40  "data"
//! 40..44  data length    44..    samples (little-endian i16)
//! ```
//!
//! Responses are parsed by walking chunks, so extra chunks between `fmt ` and
//! `data` are skipped.

use std::io::Cursor;

use crate::{Error, Result};

/// Length of the canonical header
pub const HEADER_LEN: usize = 44;

/// Container tag at offset 0
pub const RIFF_TAG: [u8; 4] = *b"RIFF";

/// Format tag at offset 8
pub const WAVE_TAG: [u8; 4] = *b"WAVE";

/// Format chunk tag
pub const FMT_TAG: [u8; 4] = *b"fmt ";

/// Sample data chunk tag
pub const DATA_TAG: [u8; 4] = *b"data";

/// Integer PCM audio format code
pub const PCM_FORMAT: u16 = 1;

/// Body length of a PCM format chunk
const FMT_CHUNK_LEN: u32 = 16;

/// Bytes before the first chunk: container tag, size, format tag
const PROLOGUE_LEN: usize = 12;

/// Fields of the `fmt ` chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    pub audio_format: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl WavFormat {
    fn parse(body: &[u8]) -> Result<Self> {
        if body.len() < FMT_CHUNK_LEN as usize {
            return Err(Error::Payload(format!(
                "format chunk too short: {} bytes",
                body.len()
            )));
        }
        Ok(Self {
            audio_format: read_u16(body, 0),
            channels: read_u16(body, 2),
            sample_rate: read_u32(body, 4),
            byte_rate: read_u32(body, 8),
            block_align: read_u16(body, 12),
            bits_per_sample: read_u16(body, 14),
        })
    }
}

/// Wrap raw 16-bit samples in a WAV container, entirely in memory
///
/// # Errors
///
/// Returns error if the samples do not fit a 32-bit data length or the
/// writer rejects the stream shape
pub fn encode(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let data_len = samples
        .len()
        .checked_mul(2)
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| n.checked_add(HEADER_LEN as u32 - 8).is_some())
        .ok_or_else(|| Error::Payload(format!("{} samples exceed WAV size limit", samples.len())))?;

    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(HEADER_LEN + data_len as usize));
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Payload(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Payload(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Payload(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// A parsed WAV buffer borrowing its sample bytes
#[derive(Debug, Clone, Copy)]
pub struct DecodedWav<'a> {
    pub format: WavFormat,
    /// Length declared by the `data` chunk
    pub declared_len: u32,
    /// Sample bytes actually present
    pub data: &'a [u8],
}

impl DecodedWav<'_> {
    /// Decode the sample bytes as little-endian i16
    #[must_use]
    pub fn samples(&self) -> Vec<i16> {
        self.data
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }

    /// Whole frames present
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.data.len() / usize::from(self.format.block_align.max(1))
    }
}

/// Parse a WAV buffer
///
/// # Errors
///
/// Returns error if the signature is wrong, the `data` chunk is missing, or the
/// encoding is not 16-bit PCM
pub fn decode(bytes: &[u8]) -> Result<DecodedWav<'_>> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::Payload(format!(
            "{} bytes is too small for a WAV header",
            bytes.len()
        )));
    }
    if bytes[0..4] != RIFF_TAG || bytes[8..12] != WAVE_TAG {
        return Err(Error::Payload("invalid WAV signature".to_string()));
    }

    let mut format = None;
    for chunk in Chunks::new(&bytes[PROLOGUE_LEN..]) {
        match chunk.id {
            FMT_TAG => format = Some(WavFormat::parse(chunk.body)?),
            DATA_TAG => {
                let format = format
                    .ok_or_else(|| Error::Payload("data chunk precedes format chunk".to_string()))?;
                validate(&format)?;
                if (chunk.body.len() as u64) < u64::from(chunk.declared_len) {
                    tracing::warn!(
                        declared = chunk.declared_len,
                        present = chunk.body.len(),
                        "WAV data chunk is truncated"
                    );
                }
                return Ok(DecodedWav {
                    format,
                    declared_len: chunk.declared_len,
                    data: chunk.body,
                });
            }
            _ => tracing::trace!(id = ?String::from_utf8_lossy(&chunk.id), "skipping WAV chunk"),
        }
    }

    Err(Error::Payload("could not find data chunk".to_string()))
}

fn validate(format: &WavFormat) -> Result<()> {
    if format.audio_format != PCM_FORMAT || format.bits_per_sample != 16 {
        return Err(Error::Payload(format!(
            "unsupported encoding: format {}, {} bits",
            format.audio_format, format.bits_per_sample
        )));
    }
    if format.channels == 0 || format.sample_rate == 0 {
        return Err(Error::Payload(format!(
            "invalid stream shape: {} Hz, {} channel(s)",
            format.sample_rate, format.channels
        )));
    }
    Ok(())
}

/// One RIFF chunk; `body` is clamped to the bytes present
struct Chunk<'a> {
    id: [u8; 4],
    declared_len: u32,
    body: &'a [u8],
}

/// Walks `id, size, body` chunks, honouring the pad byte after odd sizes
struct Chunks<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Chunks<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let header_end = self.pos.checked_add(8)?;
        if header_end > self.bytes.len() {
            return None;
        }

        let id = [
            self.bytes[self.pos],
            self.bytes[self.pos + 1],
            self.bytes[self.pos + 2],
            self.bytes[self.pos + 3],
        ];
        let declared_len = read_u32(self.bytes, self.pos + 4);
        let body_end = header_end
            .saturating_add(declared_len as usize)
            .min(self.bytes.len());

        self.pos = body_end.saturating_add(declared_len as usize & 1);
        Some(Chunk {
            id,
            declared_len,
            body: &self.bytes[header_end..body_end],
        })
    }
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_fields_land_at_fixed_offsets() {
        let bytes = encode(&[1, -1, 300], 16_000, 1).unwrap();

        assert_eq!(bytes.len(), HEADER_LEN + 6);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(read_u32(&bytes, 4), 36 + 6);
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(read_u32(&bytes, 16), 16);
        assert_eq!(read_u16(&bytes, 20), 1);
        assert_eq!(read_u16(&bytes, 22), 1);
        assert_eq!(read_u32(&bytes, 24), 16_000);
        assert_eq!(read_u32(&bytes, 28), 32_000);
        assert_eq!(read_u16(&bytes, 32), 2);
        assert_eq!(read_u16(&bytes, 34), 16);
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(read_u32(&bytes, 40), 6);
        assert_eq!(&bytes[44..46], &1i16.to_le_bytes());
    }

    #[test]
    fn stereo_payload_keeps_canonical_layout() {
        let samples = [1i16, -1, 2, -2];
        let bytes = encode(&samples, 24_000, 2).unwrap();

        assert_eq!(bytes.len(), HEADER_LEN + 8);
        assert_eq!(read_u16(&bytes, 22), 2);
        assert_eq!(read_u32(&bytes, 28), 96_000);
        assert_eq!(read_u16(&bytes, 32), 4);

        let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().channels, 2);
        let read: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(read, samples);
    }

    #[test]
    fn empty_payload_is_header_only() {
        let bytes = encode(&[], 16_000, 1).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(read_u32(&bytes, 40), 0);
        assert_eq!(read_u32(&bytes, 4), 36);
    }

    #[test]
    fn decode_recovers_samples_and_shape() {
        let samples: Vec<i16> = (0..480).map(|i| (i * 37 % 2000 - 1000) as i16).collect();
        let bytes = encode(&samples, 24_000, 2).unwrap();

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.format.sample_rate, 24_000);
        assert_eq!(decoded.format.channels, 2);
        assert_eq!(decoded.declared_len, 960);
        assert_eq!(decoded.samples(), samples);
        assert_eq!(decoded.frame_count(), 240);
    }

    #[test]
    fn rejects_short_buffer() {
        let err = decode(b"RIFF").unwrap_err();
        assert!(matches!(err, Error::Payload(_)));
    }

    #[test]
    fn rejects_wrong_container_tag() {
        let mut bytes = encode(&[0; 8], 16_000, 1).unwrap();
        bytes[0..4].copy_from_slice(b"RIFX");
        assert!(matches!(decode(&bytes), Err(Error::Payload(_))));
    }

    #[test]
    fn rejects_wrong_format_tag() {
        let mut bytes = encode(&[0; 8], 16_000, 1).unwrap();
        bytes[8..12].copy_from_slice(b"AVI ");
        assert!(matches!(decode(&bytes), Err(Error::Payload(_))));
    }

    #[test]
    fn missing_data_chunk_is_an_error() {
        let mut bytes = encode(&[0; 8], 16_000, 1).unwrap();
        bytes[36..40].copy_from_slice(b"junk");
        let err = decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("data chunk"));
    }

    #[test]
    fn skips_chunks_between_fmt_and_data() {
        let samples = [5i16, 6, 7];
        let plain = encode(&samples, 16_000, 1).unwrap();

        let mut bytes = plain[..36].to_vec();
        bytes.extend_from_slice(b"LIST");
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(b"abc\0");
        bytes.extend_from_slice(&plain[36..]);

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.samples(), samples);
    }

    #[test]
    fn truncated_data_uses_bytes_present() {
        let mut bytes = encode(&[9; 10], 16_000, 1).unwrap();
        bytes.truncate(HEADER_LEN + 8);

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.declared_len, 20);
        assert_eq!(decoded.samples(), vec![9; 4]);
    }

    #[test]
    fn rejects_non_pcm16() {
        let mut bytes = encode(&[0; 4], 16_000, 1).unwrap();
        bytes[34..36].copy_from_slice(&8u16.to_le_bytes());
        assert!(matches!(decode(&bytes), Err(Error::Payload(_))));
    }
}
