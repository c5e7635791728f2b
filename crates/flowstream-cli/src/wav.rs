//! WAV files as raw stream bytes.

use std::io::{Seek, Write};
use std::path::Path;

use anyhow::{Context, bail};
use flowstream::{SampleFormat, SampleSpec};
use hound::{WavReader, WavSpec, WavWriter};

/// Interleaved little-endian sample bytes and their layout.
pub struct Pcm {
    pub spec: SampleSpec,
    pub bytes: Vec<u8>,
}

/// Stream format that carries a WAV file's samples unchanged.
fn stream_format(wav: &WavSpec) -> anyhow::Result<SampleFormat> {
    Ok(match (wav.sample_format, wav.bits_per_sample) {
        (hound::SampleFormat::Int, 8) => SampleFormat::U8,
        (hound::SampleFormat::Int, 16) => SampleFormat::S16Le,
        (hound::SampleFormat::Int, 24) => SampleFormat::S24Le,
        (hound::SampleFormat::Int, 32) => SampleFormat::S32Le,
        (hound::SampleFormat::Float, 32) => SampleFormat::F32Le,
        (format, bits) => bail!("unsupported WAV encoding: {bits}-bit {format:?}"),
    })
}

fn push_int(format: SampleFormat, sample: i32, bytes: &mut Vec<u8>) {
    let le = sample.to_le_bytes();
    match format {
        SampleFormat::U8 => bytes.push(le[0] ^ 0x80),
        SampleFormat::S16Le => bytes.extend_from_slice(&le[..2]),
        SampleFormat::S24Le => bytes.extend_from_slice(&le[..3]),
        _ => bytes.extend_from_slice(&le),
    }
}

/// Read a WAV file. With `as_float` every encoding is converted to
/// normalized `f32le`.
pub fn read_pcm(path: &Path, as_float: bool) -> anyhow::Result<Pcm> {
    let mut reader = WavReader::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let wav = reader.spec();
    let native = stream_format(&wav)?;
    let format = if as_float { SampleFormat::F32Le } else { native };
    let channels = u8::try_from(wav.channels).context("too many channels")?;

    let mut bytes = Vec::with_capacity(reader.len() as usize * format.sample_size());
    if native == SampleFormat::F32Le {
        for sample in reader.samples::<f32>() {
            bytes.extend_from_slice(&sample?.to_le_bytes());
        }
    } else {
        let scale = 1.0 / (1u64 << (wav.bits_per_sample - 1)) as f32;
        for sample in reader.samples::<i32>() {
            let sample = sample?;
            if as_float {
                bytes.extend_from_slice(&(sample as f32 * scale).to_le_bytes());
            } else {
                push_int(format, sample, &mut bytes);
            }
        }
    }

    Ok(Pcm {
        spec: SampleSpec::new(format, wav.sample_rate, channels),
        bytes,
    })
}

/// WAV encoding for a stream spec.
pub fn wav_spec(spec: &SampleSpec) -> anyhow::Result<WavSpec> {
    let (sample_format, bits_per_sample) = match spec.format {
        SampleFormat::U8 => (hound::SampleFormat::Int, 8),
        SampleFormat::S16Le => (hound::SampleFormat::Int, 16),
        SampleFormat::S24Le => (hound::SampleFormat::Int, 24),
        SampleFormat::S32Le => (hound::SampleFormat::Int, 32),
        SampleFormat::F32Le => (hound::SampleFormat::Float, 32),
        other => bail!("{other} samples cannot be stored in a WAV file"),
    };
    Ok(WavSpec {
        channels: u16::from(spec.channels),
        sample_rate: spec.rate,
        bits_per_sample,
        sample_format,
    })
}

/// Append raw stream bytes to a WAV writer. A trailing partial sample is
/// ignored.
pub fn write_bytes<W: Write + Seek>(
    writer: &mut WavWriter<W>,
    format: SampleFormat,
    bytes: &[u8],
) -> Result<(), hound::Error> {
    for s in bytes.chunks_exact(format.sample_size()) {
        match format {
            SampleFormat::U8 => writer.write_sample((s[0] ^ 0x80) as i8)?,
            SampleFormat::S16Le => writer.write_sample(i16::from_le_bytes([s[0], s[1]]))?,
            SampleFormat::S24Le => {
                let sign = if s[2] & 0x80 == 0 { 0 } else { 0xff };
                writer.write_sample(i32::from_le_bytes([s[0], s[1], s[2], sign]))?;
            }
            SampleFormat::S32Le => writer.write_sample(i32::from_le_bytes([s[0], s[1], s[2], s[3]]))?,
            SampleFormat::F32Le => writer.write_sample(f32::from_le_bytes([s[0], s[1], s[2], s[3]]))?,
            _ => return Err(hound::Error::Unsupported),
        }
    }
    Ok(())
}
