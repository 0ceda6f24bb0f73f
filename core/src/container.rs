use crate::error::{Result, TonemarkError};

// Recording container
//
// 40-byte little-endian header followed by tagged chunks:
//
//   magic "TMRK" | version u16 | total_length u64 | video_codec [4] |
//   audio_codec [4] | sample_rate u32 | channels u8 | bit_depth u8 |
//   duration_ms u64 | reserved [4]
//
// Each chunk is `id [4] | length u64 | data`. "AUDO" holds interleaved i16
// PCM and "END " (empty) closes the file. Unknown chunks are skipped.

pub const MAGIC: [u8; 4] = *b"TMRK";
pub const CONTAINER_VERSION: u16 = 1;
pub const HEADER_LEN: usize = 40;

const VIDEO_NONE: [u8; 4] = *b"NONE";
const AUDIO_PCM: [u8; 4] = *b"PCM ";
const AUDIO_FLAC: [u8; 4] = *b"FLAC";
const CHUNK_AUDIO: [u8; 4] = *b"AUDO";
const CHUNK_END: [u8; 4] = *b"END ";
const PCM_BIT_DEPTH: u8 = 16;
const CHUNK_HEADER_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub version: u16,
    pub total_length: u64,
    pub video_codec: [u8; 4],
    pub audio_codec: [u8; 4],
    pub sample_rate: u32,
    pub channels: u8,
    pub bit_depth: u8,
    pub duration_ms: u64,
}

/// Decoded audio track of a container
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerAudio {
    pub header: ContainerHeader,
    /// Interleaved samples in [-1, 1]
    pub samples: Vec<f32>,
}

impl ContainerAudio {
    pub fn sample_rate(&self) -> u32 {
        self.header.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.header.channels as usize
    }
}

fn invalid(msg: impl Into<String>) -> TonemarkError {
    TonemarkError::InvalidInput(msg.into())
}

/// Serialize interleaved float samples as a PCM container
pub fn write_container(samples: &[f32], channels: u8, sample_rate: u32) -> Result<Vec<u8>> {
    if channels == 0 || sample_rate == 0 {
        return Err(invalid("container needs at least one channel and a non-zero sample rate"));
    }
    if samples.len() % channels as usize != 0 {
        return Err(invalid(format!(
            "{} samples do not divide into {} channels",
            samples.len(),
            channels
        )));
    }

    let audio_len = samples.len() * 2;
    let total_length = HEADER_LEN + CHUNK_HEADER_LEN + audio_len + CHUNK_HEADER_LEN;
    let frames = (samples.len() / channels as usize) as u64;
    let duration_ms = frames * 1000 / sample_rate as u64;

    let mut out = Vec::with_capacity(total_length);
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&CONTAINER_VERSION.to_le_bytes());
    out.extend_from_slice(&(total_length as u64).to_le_bytes());
    out.extend_from_slice(&VIDEO_NONE);
    out.extend_from_slice(&AUDIO_PCM);
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.push(channels);
    out.push(PCM_BIT_DEPTH);
    out.extend_from_slice(&duration_ms.to_le_bytes());
    out.extend_from_slice(&[0u8; 4]);
    debug_assert_eq!(out.len(), HEADER_LEN);

    out.extend_from_slice(&CHUNK_AUDIO);
    out.extend_from_slice(&(audio_len as u64).to_le_bytes());
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }

    out.extend_from_slice(&CHUNK_END);
    out.extend_from_slice(&0u64.to_le_bytes());
    Ok(out)
}

/// Little-endian cursor over the container bytes
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| invalid(format!("container truncated at byte {}", self.pos)))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn tag(&mut self) -> Result<[u8; 4]> {
        let mut tag = [0u8; 4];
        tag.copy_from_slice(self.take(4)?);
        Ok(tag)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        buf.copy_from_slice(self.take(2)?);
        Ok(u16::from_le_bytes(buf))
    }

    fn u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }
}

pub fn read_header(bytes: &[u8]) -> Result<ContainerHeader> {
    let mut reader = Reader { bytes, pos: 0 };
    parse_header(&mut reader)
}

fn parse_header(reader: &mut Reader<'_>) -> Result<ContainerHeader> {
    if reader.tag()? != MAGIC {
        return Err(invalid("not a tonemark container (bad magic)"));
    }
    let header = ContainerHeader {
        version: reader.u16()?,
        total_length: reader.u64()?,
        video_codec: reader.tag()?,
        audio_codec: reader.tag()?,
        sample_rate: reader.u32()?,
        channels: reader.u8()?,
        bit_depth: reader.u8()?,
        duration_ms: reader.u64()?,
    };
    reader.take(4)?;

    if header.version != CONTAINER_VERSION {
        return Err(invalid(format!("unsupported container version {}", header.version)));
    }
    if header.audio_codec == AUDIO_FLAC {
        return Err(invalid("FLAC audio is not supported"));
    }
    if header.audio_codec != AUDIO_PCM || header.bit_depth != PCM_BIT_DEPTH {
        return Err(invalid(format!(
            "unsupported audio format '{}' at {} bits",
            String::from_utf8_lossy(&header.audio_codec),
            header.bit_depth
        )));
    }
    if header.channels == 0 || header.sample_rate == 0 {
        return Err(invalid("container declares no channels or a zero sample rate"));
    }
    Ok(header)
}

/// Parse a container and decode its PCM track
pub fn read_container(bytes: &[u8]) -> Result<ContainerAudio> {
    let mut reader = Reader { bytes, pos: 0 };
    let header = parse_header(&mut reader)?;

    let mut samples = Vec::new();
    loop {
        if reader.is_at_end() {
            return Err(invalid("container ends without an END chunk"));
        }
        let id = reader.tag()?;
        let len = reader.u64()?;
        let len = usize::try_from(len).map_err(|_| invalid("chunk length overflows"))?;
        let data = reader.take(len)?;

        match id {
            CHUNK_END => break,
            CHUNK_AUDIO => {
                if len % 2 != 0 {
                    return Err(invalid("odd-length PCM chunk"));
                }
                samples.extend(
                    data.chunks_exact(2)
                        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / i16::MAX as f32),
                );
            }
            other => log::debug!("Skipping unknown container chunk '{}'", String::from_utf8_lossy(&other)),
        }
    }

    if samples.len() % header.channels as usize != 0 {
        return Err(invalid("PCM data does not divide into whole frames"));
    }
    Ok(ContainerAudio { header, samples })
}
