//! Buffer sizing hints negotiated with the transport.

use std::fmt;

use crate::format::SampleSpec;
use crate::state::Direction;

/// Transport-tunable buffer metrics, in bytes.
///
/// Every field is independently optional: `None` lets the transport pick its
/// default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferAttr {
    /// Maximum bytes the transport buffers for this stream.
    pub max_length: Option<u32>,
    /// Playback: the fill level the transport tries to keep.
    pub target_length: Option<u32>,
    /// Playback: bytes required before playback starts.
    pub pre_buffer: Option<u32>,
    /// Playback: smallest write request the transport issues.
    pub min_request: Option<u32>,
    /// Record: size of each delivered chunk.
    pub fragment_size: Option<u32>,
}

impl BufferAttr {
    /// Attributes for a connect in `direction` with a latency target.
    ///
    /// A zero latency leaves everything to the transport. Playback turns the
    /// target into `target_length`, record into `fragment_size`. Upload
    /// streams always use the transport defaults.
    pub fn for_connect(direction: Direction, latency_usec: u64, spec: &SampleSpec) -> Self {
        let mut attr = Self::default();
        if latency_usec == 0 {
            return attr;
        }
        let bytes = u32::try_from(spec.usec_to_bytes(latency_usec)).unwrap_or(u32::MAX);
        match direction {
            Direction::Playback => attr.target_length = Some(bytes),
            Direction::Record => attr.fragment_size = Some(bytes),
            Direction::Upload | Direction::Unset => {}
        }
        attr
    }
}

impl fmt::Display for BufferAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn field(value: Option<u32>) -> String {
            value.map_or_else(|| "-1".to_string(), |v| v.to_string())
        }
        write!(
            f,
            "buffer_attr{{fragsize={},maxlength={},minreq={},prebuf={},tlength={}}}",
            field(self.fragment_size),
            field(self.max_length),
            field(self.min_request),
            field(self.pre_buffer),
            field(self.target_length),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SampleFormat;

    const SPEC: SampleSpec = SampleSpec::new(SampleFormat::S16Le, 48000, 2);

    #[test]
    fn zero_latency_leaves_defaults() {
        for direction in Direction::CONNECTABLE {
            assert_eq!(BufferAttr::for_connect(direction, 0, &SPEC), BufferAttr::default());
        }
    }

    #[test]
    fn playback_sets_target_length() {
        let attr = BufferAttr::for_connect(Direction::Playback, 20_000, &SPEC);
        assert_eq!(attr.target_length, Some(960 * 4));
        assert_eq!(attr.fragment_size, None);
    }

    #[test]
    fn record_sets_fragment_size() {
        let attr = BufferAttr::for_connect(Direction::Record, 20_000, &SPEC);
        assert_eq!(attr.fragment_size, Some(960 * 4));
        assert_eq!(attr.target_length, None);
    }

    #[test]
    fn upload_ignores_latency() {
        assert_eq!(
            BufferAttr::for_connect(Direction::Upload, 20_000, &SPEC),
            BufferAttr::default()
        );
    }

    #[test]
    fn display_marks_unset_fields() {
        let attr = BufferAttr {
            target_length: Some(4096),
            ..BufferAttr::default()
        };
        assert_eq!(
            attr.to_string(),
            "buffer_attr{fragsize=-1,maxlength=-1,minreq=-1,prebuf=-1,tlength=4096}"
        );
    }
}
