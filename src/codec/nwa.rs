//! NWA stream decoder.
//!
//! NWA is the PCM container used by RealLive for music and, wrapped in NWK
//! archives, for voice. A stream is either raw PCM (compression level -1) or
//! a sequence of independently decodable blocks of delta-coded samples.
//!
//! ## Layout
//!
//! ```text
//! 0x00  i16  channels            0x14  i32  data size (decoded bytes)
//! 0x02  i16  bits per sample     0x18  i32  compressed size (whole stream)
//! 0x04  i32  sample rate         0x1c  i32  sample count (all channels)
//! 0x08  i32  compression level   0x20  i32  samples per block
//! 0x0c  i32  run-length flag     0x24  i32  samples in the last block
//! 0x10  i32  block count         0x28  i32  reserved
//! 0x2c  i32[blocks]  absolute block offsets (compressed streams only)
//! ```
//!
//! Each compressed block starts with the first sample of every channel at
//! full width, followed by a LSB-first bit stream of 3-bit codes applied
//! to alternating channels.

use byteorder::{LittleEndian, ReadBytesExt};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;

use super::{Codec, CodecError};

/// Samples per block assumed for raw (level -1) streams.
const RAW_BLOCK_SAMPLES: usize = 65536;

/// Upper bound on block count; anything larger is a corrupt header.
const MAX_BLOCKS: i32 = 1_000_000;

/// Parsed NWA stream header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NwaHeader {
    pub channels: u16,
    pub bits_per_sample: u16,
    pub sample_rate: u32,
    pub compression_level: i32,
    pub run_length: bool,
    pub blocks: usize,
    pub data_size: usize,
    pub compressed_size: usize,
    pub sample_count: usize,
    pub block_size: usize,
    pub rest_size: usize,
}

impl NwaHeader {
    pub const SIZE: usize = 0x2c;

    pub fn from_bytes(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < Self::SIZE {
            return Err(CodecError::Truncated {
                offset: 0,
                needed: Self::SIZE,
                available: data.len(),
            });
        }

        let mut cursor = Cursor::new(&data[..Self::SIZE]);
        let channels = cursor.read_i16::<LittleEndian>()?;
        let bits_per_sample = cursor.read_i16::<LittleEndian>()?;
        let sample_rate = cursor.read_i32::<LittleEndian>()?;
        let compression_level = cursor.read_i32::<LittleEndian>()?;
        let run_length = cursor.read_i32::<LittleEndian>()?;
        let blocks = cursor.read_i32::<LittleEndian>()?;
        let data_size = cursor.read_i32::<LittleEndian>()?;
        let compressed_size = cursor.read_i32::<LittleEndian>()?;
        let sample_count = cursor.read_i32::<LittleEndian>()?;
        let block_size = cursor.read_i32::<LittleEndian>()?;
        let rest_size = cursor.read_i32::<LittleEndian>()?;

        if channels != 1 && channels != 2 {
            return Err(invalid(format!("channels = {channels}")));
        }
        if bits_per_sample != 8 && bits_per_sample != 16 {
            return Err(invalid(format!("bits per sample = {bits_per_sample}")));
        }
        if sample_rate <= 0 {
            return Err(invalid(format!("sample rate = {sample_rate}")));
        }
        if !(-1..=5).contains(&compression_level) {
            return Err(CodecError::Unsupported(format!(
                "compression level {compression_level}"
            )));
        }
        if data_size < 0 || sample_count < 0 {
            return Err(invalid(format!(
                "data size = {data_size}, sample count = {sample_count}"
            )));
        }

        let bytes_per_sample = bits_per_sample as usize / 8;
        let data_size = data_size as usize;
        let sample_count = sample_count as usize;
        if data_size != sample_count * bytes_per_sample {
            return Err(invalid(format!(
                "data size {data_size} does not match {sample_count} samples"
            )));
        }

        let mut header = Self {
            channels: channels as u16,
            bits_per_sample: bits_per_sample as u16,
            sample_rate: sample_rate as u32,
            compression_level,
            run_length: run_length != 0,
            blocks: 0,
            data_size,
            compressed_size: 0,
            sample_count,
            block_size: 0,
            rest_size: 0,
        };

        if compression_level == -1 {
            // Raw streams carry no usable block fields
            let raw_block_bytes = RAW_BLOCK_SAMPLES * bytes_per_sample;
            header.block_size = RAW_BLOCK_SAMPLES;
            header.rest_size = (data_size % raw_block_bytes) / bytes_per_sample;
            header.blocks = data_size / raw_block_bytes + usize::from(header.rest_size > 0);
            header.compressed_size = Self::SIZE + data_size;
            return Ok(header);
        }

        if blocks <= 0 || blocks > MAX_BLOCKS {
            return Err(invalid(format!("block count = {blocks}")));
        }
        if block_size <= 0 || rest_size < 0 || compressed_size <= 0 {
            return Err(invalid(format!(
                "block size = {block_size}, rest size = {rest_size}, compressed size = {compressed_size}"
            )));
        }
        header.blocks = blocks as usize;
        header.block_size = block_size as usize;
        header.rest_size = rest_size as usize;
        header.compressed_size = compressed_size as usize;

        if sample_count != (header.blocks - 1) * header.block_size + header.rest_size {
            return Err(invalid(format!(
                "sample count {sample_count} does not match {blocks} blocks of {block_size}"
            )));
        }

        Ok(header)
    }

    pub fn is_compressed(&self) -> bool {
        self.compression_level != -1
    }

    fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    /// Decoded samples (all channels) held by block `index`.
    fn samples_in_block(&self, index: usize) -> usize {
        if index + 1 == self.blocks {
            self.rest_size
        } else {
            self.block_size
        }
    }

    fn wav_spec(&self) -> WavSpec {
        WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
            sample_format: SampleFormat::Int,
        }
    }
}

fn invalid(msg: String) -> CodecError {
    CodecError::InvalidHeader(msg)
}

/// Decodes NWA streams into PCM WAV files.
#[derive(Debug, Clone, Copy, Default)]
pub struct NwaDecoder;

impl NwaDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode a whole stream into interleaved samples.
    pub fn decode_samples(&self, data: &[u8]) -> Result<(NwaHeader, Vec<i32>), CodecError> {
        let header = NwaHeader::from_bytes(data)?;

        let samples = if header.is_compressed() {
            decode_compressed(&header, data)?
        } else {
            decode_raw(&header, data)?
        };

        Ok((header, samples))
    }
}

impl Codec for NwaDecoder {
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let (header, samples) = self.decode_samples(data)?;

        let mut out = Cursor::new(Vec::with_capacity(44 + header.data_size));
        let mut writer = WavWriter::new(&mut out, header.wav_spec())?;
        if header.bits_per_sample == 8 {
            for s in samples {
                writer.write_sample(s as i8)?;
            }
        } else {
            for s in samples {
                writer.write_sample(s as i16)?;
            }
        }
        writer.finalize()?;

        Ok(out.into_inner())
    }
}

fn decode_raw(header: &NwaHeader, data: &[u8]) -> Result<Vec<i32>, CodecError> {
    let end = NwaHeader::SIZE + header.data_size;
    let pcm = data.get(NwaHeader::SIZE..end).ok_or(CodecError::Truncated {
        offset: NwaHeader::SIZE,
        needed: header.data_size,
        available: data.len() - NwaHeader::SIZE,
    })?;

    let samples = if header.bits_per_sample == 8 {
        pcm.iter().map(|&b| b as i8 as i32).collect()
    } else {
        pcm.chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]) as i32)
            .collect()
    };
    Ok(samples)
}

fn decode_compressed(header: &NwaHeader, data: &[u8]) -> Result<Vec<i32>, CodecError> {
    let table_end = NwaHeader::SIZE + header.blocks * 4;
    if data.len() < table_end {
        return Err(CodecError::Truncated {
            offset: NwaHeader::SIZE,
            needed: header.blocks * 4,
            available: data.len() - NwaHeader::SIZE,
        });
    }

    if header.compressed_size > data.len() {
        return Err(CodecError::Truncated {
            offset: 0,
            needed: header.compressed_size,
            available: data.len(),
        });
    }

    let mut cursor = Cursor::new(&data[NwaHeader::SIZE..table_end]);
    let mut offsets = Vec::with_capacity(header.blocks);
    for _ in 0..header.blocks {
        let offset = cursor.read_i32::<LittleEndian>()?;
        if offset < table_end as i32 {
            return Err(invalid(format!("block offset {offset} inside header")));
        }
        offsets.push(offset as usize);
    }

    // Every block must be able to hold its samples before anything is allocated
    let mut ranges = Vec::with_capacity(header.blocks);
    for (i, &start) in offsets.iter().enumerate() {
        let end = offsets
            .get(i + 1)
            .copied()
            .unwrap_or(header.compressed_size);
        if end < start || end > data.len() {
            return Err(CodecError::Truncated {
                offset: start,
                needed: end.saturating_sub(start),
                available: data.len().saturating_sub(start),
            });
        }
        let count = header.samples_in_block(i);
        let capacity = block_capacity(header, end - start);
        if count > capacity {
            return Err(invalid(format!(
                "block {i} claims {count} samples but {} bytes hold at most {capacity}",
                end - start
            )));
        }
        ranges.push((start..end, count));
    }

    let mut samples = Vec::with_capacity(header.sample_count);
    for (range, count) in ranges {
        decode_block(header, &data[range], count, &mut samples)?;
    }

    Ok(samples)
}

/// Most samples a block of `len` bytes can encode.
///
/// Every code is at least 3 bits; a run-length code spends 14 bits on up
/// to 256 samples.
fn block_capacity(header: &NwaHeader, len: usize) -> usize {
    let lead = header.channels as usize * header.bytes_per_sample();
    let bits = len.saturating_sub(lead) * 8;
    if header.run_length {
        bits * 256 / 14 + 256
    } else {
        bits / 3 + 1
    }
}

/// Decode one block, appending exactly `count` samples to `out`.
fn decode_block(
    header: &NwaHeader,
    block: &[u8],
    count: usize,
    out: &mut Vec<i32>,
) -> Result<(), CodecError> {
    let channels = header.channels as usize;
    let width = header.bytes_per_sample();
    let lead = channels * width;
    if block.len() < lead {
        return Err(CodecError::Truncated {
            offset: 0,
            needed: lead,
            available: block.len(),
        });
    }

    let mut d = [0i32; 2];
    for (ch, value) in d.iter_mut().enumerate().take(channels) {
        let at = ch * width;
        *value = if width == 1 {
            block[at] as i8 as i32
        } else {
            i16::from_le_bytes([block[at], block[at + 1]]) as i32
        };
    }

    let level = header.compression_level;
    let mut bits = BitReader::new(&block[lead..]);
    let mut channel = 0;
    let mut run = 0;

    for decoded in 0..count {
        if run == 0 {
            if bits.exhausted() {
                return Err(CodecError::ShortBlock {
                    decoded,
                    expected: count,
                });
            }
            match bits.take(3) {
                7 => {
                    if bits.take(1) == 1 {
                        d[channel] = 0;
                    } else {
                        let (nbits, shift) = if level >= 3 { (8, 9) } else { (8 - level, 9 + level) };
                        d[channel] += bits.delta(nbits as u32, shift as u32);
                    }
                }
                0 => {
                    if header.run_length {
                        run = bits.take(1);
                        if run == 1 {
                            run = bits.take(2);
                            if run == 3 {
                                run = bits.take(8);
                            }
                        }
                    }
                }
                code => {
                    let (nbits, shift) = if level >= 3 {
                        (level + 3, 1 + code)
                    } else {
                        (5 - level, 2 + code + level)
                    };
                    d[channel] += bits.delta(nbits as u32, shift as u32);
                }
            }
        } else {
            run -= 1;
        }

        out.push(d[channel]);
        if channels == 2 {
            channel ^= 1;
        }
    }

    Ok(())
}

/// LSB-first reader over 16-bit little-endian windows.
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    shift: u32,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            shift: 0,
        }
    }

    fn exhausted(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, count: u32) -> i32 {
        if self.shift > 8 {
            self.pos += 1;
            self.shift -= 8;
        }
        let lo = self.data.get(self.pos).copied().unwrap_or(0) as u32;
        let hi = self.data.get(self.pos + 1).copied().unwrap_or(0) as u32;
        let word = lo | (hi << 8);
        self.shift += count;
        ((word >> (self.shift - count)) & ((1 << count) - 1)) as i32
    }

    /// Read a sign-magnitude value of `width` bits scaled by `shift`.
    fn delta(&mut self, width: u32, shift: u32) -> i32 {
        let raw = self.take(width);
        let sign = 1 << (width - 1);
        let magnitude = (raw & (sign - 1)) << shift;
        if raw & sign != 0 { -magnitude } else { magnitude }
    }
}
