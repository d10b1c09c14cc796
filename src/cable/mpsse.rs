//! A `Cable` on top of any FTDI chip in MPSSE mode.  Commands are buffered and reads can be
//! queued, so a run of register accesses goes out in as few USB transfers as possible.
use std::format;
use std::vec;
use std::vec::Vec;

use ftdi_mpsse::{ClockTMS, ClockTMSOut};
use libftd2xx::{ClockBits, ClockBitsOut, ClockData, ClockDataOut, FtdiMpsse, MpsseCmdBuilder, MpsseCmdExecutor};

use crate::cable::{Cable, CableError};

// Size of the adapter's command and read buffers
const BUFFER_SIZE: usize = 4096;

struct QueuedRead {
    bits: usize,
    bytes: usize,
    write: bool,
    pause_after: bool,
}

pub struct Mpsse<T> {
    pub(crate) ft: T,
    // Commands not yet sent to the adapter
    buffer: Vec<u8>,
    // Data read from the adapter and not yet returned
    queued_reads: Vec<u8>,
    queued_read_state: Vec<QueuedRead>,
}

pub(crate) fn adapter_error<E: core::fmt::Debug>(e: E) -> CableError {
    CableError::Adapter(format!("{:?}", e))
}

// The last bit of a read/write goes out with a TMS clock and comes back in bit 7 of a byte of
// its own.  Fold it in behind the bits clocked before it.
fn repack(mut buf: Vec<u8>, total: usize) -> Vec<u8> {
    let last = buf.pop().unwrap_or(0) >> 7;
    let partial = (total - 1) % 8;
    if partial == 0 {
        buf.push(last);
    } else if let Some(byte) = buf.last_mut() {
        *byte >>= 8 - partial;
        *byte |= last << partial;
    }
    buf
}

impl<T: FtdiMpsse + MpsseCmdExecutor> Mpsse<T>
    where <T as MpsseCmdExecutor>::Error: core::fmt::Debug
{
    pub fn new(mut ft: T, clock: u32) -> Result<Self, CableError> {
        ft.initialize_mpsse_default().map_err(adapter_error)?;
        ft.set_clock(clock).map_err(adapter_error)?;

        let builder = MpsseCmdBuilder::new()
            .disable_3phase_data_clocking()
            .disable_adaptive_data_clocking();
        ft.send(builder.as_slice()).map_err(adapter_error)?;

        Ok(Self {
            ft,
            buffer: vec![],
            queued_reads: vec![],
            queued_read_state: vec![],
        })
    }

    fn push(&mut self, builder: MpsseCmdBuilder) -> Result<(), CableError> {
        if builder.as_slice().len() + self.buffer.len() > BUFFER_SIZE {
            self.flush()?;
        }
        self.buffer.extend_from_slice(builder.as_slice());
        Ok(())
    }

    fn queued_bytes(&self) -> usize {
        self.queued_read_state.iter().map(|q| q.bytes).sum()
    }
}

impl<T: FtdiMpsse + MpsseCmdExecutor> Cable for Mpsse<T>
    where <T as MpsseCmdExecutor>::Error: core::fmt::Debug
{
    fn change_mode(&mut self, tms: &[usize], tdi: bool) -> Result<(), CableError> {
        let mut builder = MpsseCmdBuilder::new();
        // At most seven TMS bits per command
        for chunk in tms.chunks(7) {
            let buf = chunk
                .iter()
                .enumerate()
                .fold(0u8, |buf, (i, x)| if *x != 0 { buf | 1 << i } else { buf });
            builder = builder.clock_tms_out(ClockTMSOut::NegEdge, buf, tdi, chunk.len() as u8);
        }
        self.push(builder)
    }

    fn queue_read(&mut self, bits: usize) -> Result<bool, CableError> {
        let mut bytes = bits / 8;
        let tail = bits % 8;
        let mut builder = MpsseCmdBuilder::new();
        if bytes > 0 {
            builder = builder.clock_data(ClockData::LsbPosIn, &vec![0xff; bytes]);
        }
        if tail > 0 {
            builder = builder.clock_bits(ClockBits::LsbPosIn, 0xff, tail as u8);
            bytes += 1;
        }

        if bytes + self.queued_bytes() >= BUFFER_SIZE {
            return Ok(false);
        }
        self.push(builder)?;
        self.queued_read_state.push(QueuedRead { bits, bytes, write: false, pause_after: false });
        Ok(true)
    }

    fn finish_read(&mut self, bits: usize) -> Result<Vec<u8>, CableError> {
        if self.queued_read_state.is_empty() {
            return Err(CableError::Adapter(format!("no queued read of {} bits", bits)));
        }
        let read = self.queued_read_state.remove(0);
        if read.bits != bits {
            return Err(CableError::Adapter(format!(
                "queued read was {} bits, collected as {}",
                read.bits, bits
            )));
        }

        if self.queued_reads.is_empty() {
            // Collect everything that is pending in one transfer
            let total = read.bytes + self.queued_bytes();
            self.queued_reads.resize(total, 0);
            self.ft.xfer(&self.buffer, &mut self.queued_reads).map_err(adapter_error)?;
            self.buffer.clear();
        }

        let rest = self.queued_reads.split_off(read.bytes.min(self.queued_reads.len()));
        let mut buf = core::mem::replace(&mut self.queued_reads, rest);

        if read.write {
            if read.pause_after {
                // TDO from the clock that reached Pause
                buf.pop();
            }
            return Ok(repack(buf, bits));
        }
        if bits % 8 != 0 {
            if let Some(last) = buf.last_mut() {
                *last >>= 8 - bits % 8;
            }
        }
        Ok(buf)
    }

    fn read_data(&mut self, bits: usize) -> Result<Vec<u8>, CableError> {
        if !self.queued_read_state.is_empty() {
            return Err(CableError::Adapter("read while queued reads are outstanding".into()));
        }
        if bits == 0 {
            return Ok(vec![]);
        }
        self.queue_read(bits)?;
        self.finish_read(bits)
    }

    fn write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<(), CableError> {
        let Some((&last_byte, head)) = data.split_last() else {
            return Ok(());
        };
        // The last bit goes out with clock_tms
        let bits = bits.clamp(1, 8) - 1;

        let mut builder = MpsseCmdBuilder::new();
        if !head.is_empty() {
            builder = builder.clock_data_out(ClockDataOut::LsbNeg, head);
        }
        if bits >= 1 {
            builder = builder.clock_bits_out(ClockBitsOut::LsbNeg, last_byte, bits);
        }
        let last_bit = last_byte & (1 << bits) != 0;
        builder = if pause_after {
            builder.clock_tms_out(ClockTMSOut::NegEdge, 1, last_bit, 2)
        } else {
            builder.clock_tms_out(ClockTMSOut::NegEdge, 0, last_bit, 1)
        };
        self.push(builder)
    }

    fn queue_read_write(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<bool, CableError> {
        let Some((&last_byte, head)) = data.split_last() else {
            return Ok(false);
        };
        let bits = bits.clamp(1, 8);
        let total_bits = head.len() * 8 + bits as usize;
        let bits = bits - 1;
        let mut read_bytes = 1;

        let mut builder = MpsseCmdBuilder::new();
        if !head.is_empty() {
            builder = builder.clock_data(ClockData::LsbPosIn, head);
            read_bytes += head.len();
        }
        if bits >= 1 {
            builder = builder.clock_bits(ClockBits::LsbPosIn, last_byte, bits);
            read_bytes += 1;
        }
        let last_bit = last_byte & (1 << bits) != 0;
        if pause_after {
            builder = builder
                .clock_tms(ClockTMS::NegTMSPosTDO, 1, last_bit, 1)
                .clock_tms(ClockTMS::NegTMSPosTDO, 0, last_bit, 1);
            read_bytes += 1;
        } else {
            builder = builder.clock_tms(ClockTMS::NegTMSPosTDO, 0, last_bit, 1);
        }

        if read_bytes + self.queued_bytes() >= BUFFER_SIZE {
            return Ok(false);
        }
        self.push(builder)?;
        self.queued_read_state.push(QueuedRead {
            bits: total_bits,
            bytes: read_bytes,
            write: true,
            pause_after,
        });
        Ok(true)
    }

    fn read_write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<Vec<u8>, CableError> {
        if !self.queued_read_state.is_empty() {
            return Err(CableError::Adapter("read while queued reads are outstanding".into()));
        }
        if !self.queue_read_write(data, bits, pause_after)? {
            return Err(CableError::Adapter(format!("{} byte scan does not fit the adapter buffer", data.len())));
        }
        let total_bits = (data.len() - 1) * 8 + bits.clamp(1, 8) as usize;
        self.finish_read(total_bits)
    }

    fn flush(&mut self) -> Result<(), CableError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.ft.send(&self.buffer).map_err(adapter_error)?;
        self.buffer.clear();
        Ok(())
    }
}
