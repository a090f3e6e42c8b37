use serde::Serialize;

const SIZE_FLAG_POS: u8 = 2;
const ALIGN_FLAG_POS: u8 = 1;
const CHANNEL_FLAG_POS: u8 = 0;

/// Leading byte of an encoded frame. Each set flag means the corresponding
/// per-series field is elided from the body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Flags {
    /// every series has the same sample count, written once in the header
    pub size: bool,
    /// every series has the same time range, written once in the header
    pub align: bool,
    /// the frame holds exactly the codec's keys in canonical order, so keys are omitted
    pub channel: bool,
}

impl Flags {
    pub fn encode(self) -> u8 {
        ((self.size as u8) << SIZE_FLAG_POS)
            | ((self.align as u8) << ALIGN_FLAG_POS)
            | ((self.channel as u8) << CHANNEL_FLAG_POS)
    }

    /// High bits are ignored
    pub fn decode(b: u8) -> Self {
        Self {
            size: (b >> SIZE_FLAG_POS) & 1 == 1,
            align: (b >> ALIGN_FLAG_POS) & 1 == 1,
            channel: (b >> CHANNEL_FLAG_POS) & 1 == 1,
        }
    }
}
