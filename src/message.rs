//! Nexus messages.
//!
//! A message is an ordered sequence of packets and a packet is a run of bits.  Packets
//! are not byte aligned on the wire, so each one carries its own bit count alongside
//! `ceil(bits/8)` bytes of data.  `Message::pack` concatenates the packets into one
//! LSB-first bit stream and `Message::unpack` splits such a stream back up given the
//! packet widths, which is how a message arrives from a message port.
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::nrr::{byte_len, from_bytes, mask_tail, to_bytes};

pub const TCODE_BITS: usize = 6;
pub const SRC_BITS: usize = 4;

/// Message type codes for the messages this crate produces
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Tcode {
    Ownership = 2,
    DirectBranch = 3,
    IndirectBranch = 4,
    DataWrite = 5,
    DataRead = 6,
    Error = 8,
    Watchpoint = 15,
}

impl Tcode {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            2 => Tcode::Ownership,
            3 => Tcode::DirectBranch,
            4 => Tcode::IndirectBranch,
            5 => Tcode::DataWrite,
            6 => Tcode::DataRead,
            8 => Tcode::Error,
            15 => Tcode::Watchpoint,
            _ => return None,
        })
    }
}

/// A Nexus packet: a sequence of bits
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    bits: usize,
    data: Vec<u8>,
}

impl Packet {
    /// `data` must hold exactly `ceil(bits/8)` bytes.  Bits beyond `bits` in the last
    /// byte are cleared.
    pub fn new(bits: usize, mut data: Vec<u8>) -> Result<Self> {
        if data.len() != byte_len(bits) {
            return Err(Error::failed(alloc::format!(
                "packet of {} bits needs {} bytes, got {}",
                bits,
                byte_len(bits),
                data.len()
            )));
        }
        mask_tail(&mut data, bits);
        Ok(Self { bits, data })
    }

    pub fn from_value(value: u64, bits: usize) -> Self {
        Self { bits, data: to_bytes(value, bits) }
    }

    pub fn bits(&self) -> usize {
        self.bits
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The packet as an integer, if it fits in 64 bits.
    pub fn value(&self) -> Option<u64> {
        (self.bits <= 64).then(|| from_bytes(&self.data, self.bits))
    }

    fn bit(&self, n: usize) -> bool {
        self.data[n / 8] & (1 << (n % 8)) != 0
    }
}

/// A Nexus message: a sequence of packets
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    packets: Vec<Packet>,
}

impl Message {
    pub fn new(packets: Vec<Packet>) -> Self {
        Self { packets }
    }

    pub fn builder(tcode: Tcode) -> MessageBuilder {
        MessageBuilder::default().packet(tcode as u64, TCODE_BITS)
    }

    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    /// The type code, taken from the first packet.
    pub fn tcode(&self) -> Option<u8> {
        let first = self.packets.first()?;
        if first.bits != TCODE_BITS {
            return None;
        }
        first.value().map(|v| v as u8)
    }

    pub fn total_bits(&self) -> usize {
        self.packets.iter().map(Packet::bits).sum()
    }

    /// Bytes needed to hand this message to a client: a packet count, then per packet a
    /// bit count and its data.
    pub fn wire_size(&self) -> usize {
        4 + self.packets.iter().map(|p| 4 + p.data.len()).sum::<usize>()
    }

    /// Concatenate all packets into a single bit stream, first packet first.
    pub fn pack(&self) -> Packet {
        let total = self.total_bits();
        let mut data = alloc::vec![0u8; byte_len(total)];
        let mut pos = 0;
        for packet in &self.packets {
            for n in 0..packet.bits {
                if packet.bit(n) {
                    data[pos / 8] |= 1 << (pos % 8);
                }
                pos += 1;
            }
        }
        Packet { bits: total, data }
    }

    /// Split `stream` into packets of the given widths.  The widths must cover the stream
    /// exactly.
    pub fn unpack(stream: &Packet, widths: &[usize]) -> Result<Self> {
        let wanted: usize = widths.iter().sum();
        if wanted != stream.bits {
            return Err(Error::failed(alloc::format!(
                "packet widths cover {} bits, stream has {}",
                wanted,
                stream.bits
            )));
        }
        let mut packets = Vec::with_capacity(widths.len());
        let mut pos = 0;
        for &bits in widths {
            let mut data = alloc::vec![0u8; byte_len(bits)];
            for n in 0..bits {
                if stream.bit(pos + n) {
                    data[n / 8] |= 1 << (n % 8);
                }
            }
            pos += bits;
            packets.push(Packet { bits, data });
        }
        Ok(Self { packets })
    }
}

#[derive(Debug, Default)]
pub struct MessageBuilder {
    packets: Vec<Packet>,
}

impl MessageBuilder {
    pub fn packet(mut self, value: u64, bits: usize) -> Self {
        self.packets.push(Packet::from_value(value, bits));
        self
    }

    pub fn build(self) -> Message {
        Message { packets: self.packets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn packet_length_must_match_bit_count() {
        assert!(Packet::new(9, vec![0xff]).is_err());
        let p = Packet::new(9, vec![0xff, 0xff]).unwrap();
        assert_eq!(p.data(), &[0xff, 0x01]);
        assert_eq!(p.value(), Some(0x1ff));
    }

    #[test]
    fn builder_starts_with_tcode() {
        let msg = Message::builder(Tcode::Watchpoint).packet(3, SRC_BITS).packet(0x81, 8).build();
        assert_eq!(msg.tcode(), Some(15));
        assert_eq!(msg.packets().len(), 3);
        assert_eq!(msg.total_bits(), 18);
        assert_eq!(msg.wire_size(), 4 + (4 + 1) * 3);
    }

    #[test]
    fn packed_stream_is_not_byte_aligned() {
        let msg = Message::builder(Tcode::DataWrite)
            .packet(0x9, SRC_BITS)
            .packet(0x2000_1234, 32)
            .packet(0xab, 8)
            .build();
        let stream = msg.pack();
        assert_eq!(stream.bits(), 6 + 4 + 32 + 8);
        assert_eq!(stream.data().len(), 7);
        // tcode 5 in the low six bits, then the low two bits of the source
        assert_eq!(stream.data()[0], 0b01_000101);

        let back = Message::unpack(&stream, &[TCODE_BITS, SRC_BITS, 32, 8]).unwrap();
        assert_eq!(back, msg);
        assert!(Message::unpack(&stream, &[TCODE_BITS, SRC_BITS]).is_err());
    }

    #[test]
    fn tcodes_round_trip() {
        for t in [Tcode::Ownership, Tcode::IndirectBranch, Tcode::DataRead, Tcode::Error, Tcode::Watchpoint] {
            assert_eq!(Tcode::from_code(t as u8), Some(t));
        }
        assert_eq!(Tcode::from_code(63), None);
    }
}
