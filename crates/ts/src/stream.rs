use crate::{
    decrypt::EcbDecryptor,
    packet::{PayloadRange, TsPacket, AUDIO_PID, PACKET_SIZE, VIDEO_PID},
    Error, Result,
};

/// Payload windows of consecutive packets of one tracked PID, starting at a
/// payload-unit-start packet.
///
/// The windows are the write targets of the fragment: after decryption, the
/// bytes are scattered back into exactly these ranges, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PesFragment {
    pub pid: u16,
    pub targets: Vec<PayloadRange>,
}

impl PesFragment {
    fn new(packet: &TsPacket) -> Self {
        let mut fragment = Self {
            pid: packet.header.pid,
            targets: Vec::new(),
        };
        fragment.push(packet.payload);
        fragment
    }

    fn push(&mut self, payload: PayloadRange) {
        if !payload.is_empty() {
            self.targets.push(payload);
        }
    }

    /// Total payload length of the fragment.
    pub fn len(&self) -> usize {
        self.targets.iter().map(|t| t.length).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn gather(&self, data: &[u8]) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.len());
        for target in &self.targets {
            buffer.extend_from_slice(&data[target.offset..target.end()]);
        }
        buffer
    }

    pub fn scatter(&self, data: &mut [u8], mut buffer: &[u8]) {
        for target in &self.targets {
            let (head, tail) = buffer.split_at(target.length);
            data[target.offset..target.end()].copy_from_slice(head);
            buffer = tail;
        }
    }
}

/// A parsed transport stream, owning its bytes.
pub struct TransportStream {
    data: Vec<u8>,
    packets: Vec<TsPacket>,
    fragments: Vec<PesFragment>,
}

impl TransportStream {
    /// Parses `data` into packets and groups the payloads of the video and audio
    /// PIDs into fragments. Nothing is parsed if the length is not 188-aligned.
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        if data.len() % PACKET_SIZE != 0 {
            return Err(Error::NotTransportStream(data.len()));
        }

        let count = data.len() / PACKET_SIZE;
        let mut packets = Vec::with_capacity(count);
        let mut fragments = Vec::new();
        // [video, audio]
        let mut open: [Option<PesFragment>; 2] = [None, None];

        for index in 0..count {
            let packet = TsPacket::parse(&data, index, index * PACKET_SIZE)?;

            let slot = match packet.header.pid {
                VIDEO_PID => Some(0),
                AUDIO_PID => Some(1),
                _ => None,
            };
            if let Some(slot) = slot {
                if packet.header.payload_unit_start {
                    if let Some(fragment) = open[slot].replace(PesFragment::new(&packet)) {
                        fragments.push(fragment);
                    }
                } else if let Some(fragment) = open[slot].as_mut() {
                    fragment.push(packet.payload);
                } else {
                    log::trace!("packet {index} continues a PES without start, ignored");
                }
            }

            packets.push(packet);
        }
        fragments.extend(open.into_iter().flatten());

        if fragments.is_empty() {
            log::debug!("no video or audio payload found in {count} packets");
        }

        Ok(Self {
            data,
            packets,
            fragments,
        })
    }

    pub fn packets(&self) -> &[TsPacket] {
        &self.packets
    }

    pub fn fragments(&self) -> &[PesFragment] {
        &self.fragments
    }

    pub fn fragment_count(&self, pid: u16) -> usize {
        self.fragments.iter().filter(|f| f.pid == pid).count()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    /// Decrypts every fragment in place with AES-ECB. The output length never changes.
    pub fn decrypt(&mut self, key: &[u8]) -> Result<()> {
        let decryptor = EcbDecryptor::new(key)?;
        for fragment in &self.fragments {
            let mut buffer = fragment.gather(&self.data);
            let decrypted = decryptor.decrypt_prefix(&mut buffer);
            log::trace!(
                "pid {:#x}: decrypted {decrypted} of {} bytes",
                fragment.pid,
                buffer.len()
            );
            fragment.scatter(&mut self.data, &buffer);
        }
        Ok(())
    }
}
