use crate::{Error, Result};

pub const PACKET_SIZE: usize = 188;
pub const HEADER_SIZE: usize = 4;
pub const SYNC_BYTE: u8 = 0x47;

pub const VIDEO_PID: u16 = 0x100;
pub const AUDIO_PID: u16 = 0x101;

/// 6-byte PES packet header followed by the 3-byte optional header prefix.
/// The last prefix byte is `PES_header_data_length`.
const PES_HEADER_SIZE: usize = 9;

/// Byte window inside the whole stream buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadRange {
    pub offset: usize,
    pub length: usize,
}

impl PayloadRange {
    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsHeader {
    pub sync_byte: u8,
    pub transport_error: bool,
    pub payload_unit_start: bool,
    /// 13 bits
    pub pid: u16,
    /// 2 bits
    pub scrambling_control: u8,
    /// 2 bits
    pub adaptation_field_control: u8,
    /// 4 bits
    pub continuity_counter: u8,
}

impl TsHeader {
    pub fn parse(header: [u8; HEADER_SIZE]) -> Self {
        Self {
            sync_byte: header[0],
            transport_error: header[1] & 0x80 != 0,
            payload_unit_start: header[1] & 0x40 != 0,
            pid: (((header[1] & 0x1f) as u16) << 8) | header[2] as u16,
            scrambling_control: header[3] >> 6,
            adaptation_field_control: (header[3] >> 4) & 0b11,
            continuity_counter: header[3] & 0x0f,
        }
    }

    pub fn has_adaptation_field(&self) -> bool {
        self.adaptation_field_control & 0b10 != 0
    }

    pub fn has_payload(&self) -> bool {
        self.adaptation_field_control & 0b01 != 0
    }

    /// Whether the packet carries one of the two encrypted elementary streams.
    pub fn is_tracked(&self) -> bool {
        self.pid == VIDEO_PID || self.pid == AUDIO_PID
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsPacket {
    pub index: usize,
    /// Offset of the sync byte in the stream buffer.
    pub offset: usize,
    pub header: TsHeader,
    /// Elementary-stream payload window, absolute in the stream buffer.
    pub payload: PayloadRange,
}

impl TsPacket {
    /// Parses the packet starting at `offset` of `data`.
    ///
    /// Every fixed-offset read is checked against the packet bounds, a violation
    /// is reported as [Error::MalformedPacket] instead of reading the next packet.
    pub fn parse(data: &[u8], index: usize, offset: usize) -> Result<Self> {
        let packet = data
            .get(offset..offset + PACKET_SIZE)
            .ok_or(Error::MalformedPacket {
                index,
                offset,
                reason: "truncated packet",
            })?;

        if packet[0] != SYNC_BYTE {
            return Err(Error::InvalidSyncByte {
                index,
                offset,
                byte: packet[0],
            });
        }

        let header = TsHeader::parse([packet[0], packet[1], packet[2], packet[3]]);
        let malformed = |reason| Error::MalformedPacket {
            index,
            offset,
            reason,
        };

        let adaptation_length = if header.has_adaptation_field() {
            1 + packet[HEADER_SIZE] as usize
        } else {
            0
        };
        let mut start = HEADER_SIZE + adaptation_length;
        if start > PACKET_SIZE {
            return Err(malformed("adaptation field exceeds packet"));
        }

        // Only payload-start packets of the encrypted streams carry a PES header
        // that must be skipped. The header length byte is read relative to the
        // adaptation field end without cross-checking the adaptation length.
        if header.payload_unit_start && header.is_tracked() {
            let extra = *packet
                .get(start + PES_HEADER_SIZE - 1)
                .ok_or_else(|| malformed("PES header exceeds packet"))?;
            start += PES_HEADER_SIZE + extra as usize;
            if start > PACKET_SIZE {
                return Err(malformed("PES header exceeds packet"));
            }
        }

        Ok(Self {
            index,
            offset,
            header,
            payload: PayloadRange {
                offset: offset + start,
                length: PACKET_SIZE - start,
            },
        })
    }
}
