//! Sample formats and sample specifications.
//!
//! A [`SampleSpec`] fixes the byte layout of a stream for its whole lifetime.
//! The engine never converts between formats; it only needs the frame size to
//! turn latency targets (microseconds) into byte counts for buffer sizing.

use std::fmt;
use std::str::FromStr;

/// Upper bound on the sample rate a spec may carry, in Hz.
pub const RATE_MAX: u32 = 48000 * 16;

/// Upper bound on the channel count a spec may carry.
pub const CHANNELS_MAX: u8 = 32;

const USEC_PER_SEC: u64 = 1_000_000;

/// PCM and companded sample encodings understood by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Unsigned 8 bit PCM.
    U8,
    /// Signed 16 bit PCM, little endian.
    S16Le,
    /// Signed 16 bit PCM, big endian.
    S16Be,
    /// 32 bit IEEE float, little endian, range -1.0 to 1.0.
    F32Le,
    /// 32 bit IEEE float, big endian, range -1.0 to 1.0.
    F32Be,
    /// 8 bit a-Law.
    ALaw,
    /// 8 bit mu-Law.
    ULaw,
    /// Signed 32 bit PCM, little endian.
    S32Le,
    /// Signed 32 bit PCM, big endian.
    S32Be,
    /// Signed 24 bit PCM packed, little endian.
    S24Le,
    /// Signed 24 bit PCM packed, big endian.
    S24Be,
    /// Signed 24 bit PCM in the low bits of 32, little endian.
    S24_32Le,
    /// Signed 24 bit PCM in the low bits of 32, big endian.
    S24_32Be,
}

impl SampleFormat {
    /// Every format, in declaration order.
    pub const ALL: [SampleFormat; 13] = [
        SampleFormat::U8,
        SampleFormat::S16Le,
        SampleFormat::S16Be,
        SampleFormat::F32Le,
        SampleFormat::F32Be,
        SampleFormat::ALaw,
        SampleFormat::ULaw,
        SampleFormat::S32Le,
        SampleFormat::S32Be,
        SampleFormat::S24Le,
        SampleFormat::S24Be,
        SampleFormat::S24_32Le,
        SampleFormat::S24_32Be,
    ];

    /// Bytes occupied by one sample of one channel.
    pub const fn sample_size(self) -> usize {
        match self {
            SampleFormat::U8 | SampleFormat::ALaw | SampleFormat::ULaw => 1,
            SampleFormat::S16Le | SampleFormat::S16Be => 2,
            SampleFormat::S24Le | SampleFormat::S24Be => 3,
            SampleFormat::F32Le
            | SampleFormat::F32Be
            | SampleFormat::S32Le
            | SampleFormat::S32Be
            | SampleFormat::S24_32Le
            | SampleFormat::S24_32Be => 4,
        }
    }

    /// Lowercase identifier used in profiles and on the command line.
    pub const fn name(self) -> &'static str {
        match self {
            SampleFormat::U8 => "u8",
            SampleFormat::S16Le => "s16le",
            SampleFormat::S16Be => "s16be",
            SampleFormat::F32Le => "f32le",
            SampleFormat::F32Be => "f32be",
            SampleFormat::ALaw => "alaw",
            SampleFormat::ULaw => "ulaw",
            SampleFormat::S32Le => "s32le",
            SampleFormat::S32Be => "s32be",
            SampleFormat::S24Le => "s24le",
            SampleFormat::S24Be => "s24be",
            SampleFormat::S24_32Le => "s24_32le",
            SampleFormat::S24_32Be => "s24_32be",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SampleFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        SampleFormat::ALL
            .into_iter()
            .find(|format| format.name() == lower)
            .ok_or_else(|| format!("unknown sample format '{s}'"))
    }
}

/// Byte layout of a stream: encoding, rate and channel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleSpec {
    /// Sample encoding.
    pub format: SampleFormat,
    /// Frames per second.
    pub rate: u32,
    /// Interleaved channels per frame.
    pub channels: u8,
}

impl Default for SampleSpec {
    fn default() -> Self {
        Self {
            format: SampleFormat::S16Le,
            rate: 44100,
            channels: 2,
        }
    }
}

impl SampleSpec {
    /// Create a spec from its parts.
    pub const fn new(format: SampleFormat, rate: u32, channels: u8) -> Self {
        Self {
            format,
            rate,
            channels,
        }
    }

    /// Whether rate and channel count are within the supported bounds.
    pub fn is_valid(&self) -> bool {
        self.rate > 0 && self.rate <= RATE_MAX && self.channels > 0 && self.channels <= CHANNELS_MAX
    }

    /// Bytes per interleaved frame.
    pub fn frame_size(&self) -> usize {
        self.format.sample_size() * self.channels as usize
    }

    /// Bytes per second of audio.
    pub fn bytes_per_second(&self) -> usize {
        self.frame_size() * self.rate as usize
    }

    /// Convert a duration in microseconds to a byte count.
    ///
    /// Rounds down to a whole number of frames.
    pub fn usec_to_bytes(&self, usec: u64) -> usize {
        let frames = usec.saturating_mul(u64::from(self.rate)) / USEC_PER_SEC;
        frames as usize * self.frame_size()
    }

    /// Convert a byte count to a duration in microseconds.
    ///
    /// Partial trailing frames are ignored.
    pub fn bytes_to_usec(&self, bytes: usize) -> u64 {
        let frame_size = self.frame_size();
        if frame_size == 0 || self.rate == 0 {
            return 0;
        }
        let frames = (bytes / frame_size) as u64;
        frames * USEC_PER_SEC / u64::from(self.rate)
    }
}

impl fmt::Display for SampleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}ch {}Hz", self.format, self.channels, self.rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_sizes() {
        assert_eq!(SampleSpec::new(SampleFormat::S16Le, 44100, 2).frame_size(), 4);
        assert_eq!(SampleSpec::new(SampleFormat::S24Le, 48000, 2).frame_size(), 6);
        assert_eq!(SampleSpec::new(SampleFormat::F32Le, 48000, 1).frame_size(), 4);
        assert_eq!(SampleSpec::new(SampleFormat::ULaw, 8000, 1).frame_size(), 1);
    }

    #[test]
    fn usec_to_bytes_rounds_to_frames() {
        let spec = SampleSpec::new(SampleFormat::S16Le, 44100, 2);
        // 10ms at 44.1kHz is 441 frames
        assert_eq!(spec.usec_to_bytes(10_000), 441 * 4);
        // 1us is less than a frame
        assert_eq!(spec.usec_to_bytes(1), 0);
        assert_eq!(spec.usec_to_bytes(0), 0);
    }

    #[test]
    fn bytes_to_usec_ignores_partial_frames() {
        let spec = SampleSpec::new(SampleFormat::S16Le, 48000, 2);
        assert_eq!(spec.bytes_to_usec(192_000), 1_000_000);
        assert_eq!(spec.bytes_to_usec(192_003), 1_000_000);
        assert_eq!(spec.bytes_to_usec(3), 0);
    }

    #[test]
    fn format_names_round_trip() {
        for format in SampleFormat::ALL {
            assert_eq!(format.name().parse::<SampleFormat>(), Ok(format));
        }
        assert_eq!("S16LE".parse::<SampleFormat>(), Ok(SampleFormat::S16Le));
        assert!("s8".parse::<SampleFormat>().is_err());
    }

    #[test]
    fn spec_validity() {
        assert!(SampleSpec::default().is_valid());
        assert!(!SampleSpec::new(SampleFormat::U8, 0, 1).is_valid());
        assert!(!SampleSpec::new(SampleFormat::U8, 8000, 0).is_valid());
        assert!(!SampleSpec::new(SampleFormat::U8, RATE_MAX + 1, 1).is_valid());
    }
}
