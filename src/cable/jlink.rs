//! Implement the `Cable` trait for "jlink" compatible hardware adapters
use std::format;
use std::time::Duration;
use std::vec;
use std::vec::Vec;

use rusb::constants::*;
use rusb::{DeviceHandle, Direction, GlobalContext};

use crate::cable::{Cable, CableError};

const VID: u16 = 0x1366;
const PID: u16 = 0x0105;
const TIMEOUT: Duration = Duration::from_millis(100);
// Lowest target voltage, in millivolts, taken as a powered target
const MIN_VREF_MV: u16 = 1500;
// Longest TMS/TDI run a single HW_JTAG3 command takes, in bytes
const MAX_SEQUENCE_BYTES: usize = 390;

const CMD_SET_SPEED: u8 = 0x05;
const CMD_GET_STATE: u8 = 0x07;
const CMD_SELECT_INTERFACE: u8 = 0xc7;
const CMD_HW_JTAG3: u8 = 0xcd;
const CMD_RESET_SRST: u8 = 0xdc;
const CMD_SET_SRST: u8 = 0xdd;
const CMD_RESET_TRST: u8 = 0xde;
const CMD_SET_TRST: u8 = 0xdf;

fn usb_error(e: rusb::Error) -> CableError {
    CableError::Adapter(format!("usb: {}", e))
}

pub struct JLink {
    device: DeviceHandle<GlobalContext>,
    // queued bytes to send
    buffer: Vec<u8>,
    // bytes the adapter will answer the queued commands with, which nobody wants
    recv_bytes: usize,
    read_endpoint: u8,
    write_endpoint: u8,
}

impl JLink {
    pub fn new(clock: u32) -> Result<Self, CableError> {
        let device = rusb::open_device_with_vid_pid(VID, PID)
            .ok_or_else(|| CableError::NotFound(format!("no J-Link ({:04x}:{:04x}) attached", VID, PID)))?;
        let descriptor = device.device().active_config_descriptor().map_err(usb_error)?;

        let mut endpoints = None;
        for i in descriptor.interfaces() {
            for d in i.descriptors() {
                if d.class_code() != LIBUSB_CLASS_VENDOR_SPEC
                    || d.sub_class_code() != LIBUSB_CLASS_VENDOR_SPEC
                    || d.num_endpoints() < 2
                {
                    continue;
                }

                let mut read_endpoint = None;
                let mut write_endpoint = None;
                for e in d.endpoint_descriptors() {
                    match e.direction() {
                        Direction::In => read_endpoint = Some(e.address()),
                        Direction::Out => write_endpoint = Some(e.address()),
                    }
                }
                if let (Some(read), Some(write)) = (read_endpoint, write_endpoint) {
                    endpoints = Some((read, write));
                }
            }
        }
        let (read_endpoint, write_endpoint) =
            endpoints.ok_or_else(|| CableError::NotFound("J-Link has no vendor bulk interface".into()))?;

        // Drain anything left over from a previous session
        let mut buf = [0; 2];
        let _ = device.read_bulk(read_endpoint, &mut buf, Duration::from_millis(10));

        let mut jlink = Self {
            device,
            buffer: vec![],
            recv_bytes: 0,
            read_endpoint,
            write_endpoint,
        };
        jlink.get_status()?;
        jlink.set_clock(clock);
        jlink.set_interface(0)?;
        jlink.deassert_trst();
        jlink.deassert_srst();
        // The reset line commands are only queued until now
        jlink.flush()?;
        log::info!("opened J-Link at {} Hz", clock);
        Ok(jlink)
    }

    fn send_command(&mut self, cmd: u8, data: &[u8]) {
        self.buffer.push(cmd);
        self.buffer.extend_from_slice(data);
    }

    // Send everything queued, then collect `len` bytes of answer to the last command.
    fn transfer(&mut self, len: usize) -> Result<Vec<u8>, CableError> {
        if !self.buffer.is_empty() {
            let written = self.device.write_bulk(self.write_endpoint, &self.buffer, TIMEOUT).map_err(usb_error)?;
            if written != self.buffer.len() {
                return Err(CableError::Adapter(format!(
                    "short USB write: {} of {} bytes",
                    written,
                    self.buffer.len()
                )));
            }
            self.buffer.clear();
        }

        let mut remaining = len + self.recv_bytes;
        let mut data = Vec::with_capacity(remaining);
        while remaining > 0 {
            let mut chunk = vec![0; remaining];
            let got = self.device.read_bulk(self.read_endpoint, &mut chunk, TIMEOUT).map_err(usb_error)?;
            if got == 0 {
                return Err(CableError::Adapter("J-Link stopped answering".into()));
            }
            data.extend_from_slice(&chunk[..got.min(remaining)]);
            remaining -= got.min(remaining);
        }

        // Drop the answers to commands nobody read back
        let data = data.split_off(self.recv_bytes);
        self.recv_bytes = 0;
        Ok(data)
    }

    /// Read the adapter state.  Fails if the target looks unpowered.
    pub fn get_status(&mut self) -> Result<Vec<u8>, CableError> {
        self.send_command(CMD_GET_STATE, &[]);
        let data = self.transfer(8)?;
        let vref = u16::from_le_bytes([data[0], data[1]]);
        log::debug!("J-Link vref {} mV", vref);
        if vref < MIN_VREF_MV {
            return Err(CableError::Target(format!(
                "target voltage {} mV, possibly unpowered or disconnected",
                vref
            )));
        }
        Ok(data)
    }

    pub fn set_clock(&mut self, clock: u32) {
        let khz = (clock / 1000).min(u16::MAX as u32) as u16;
        self.send_command(CMD_SET_SPEED, &khz.to_le_bytes());
    }

    pub fn set_interface(&mut self, intf: u8) -> Result<(), CableError> {
        self.send_command(CMD_SELECT_INTERFACE, &[intf]);
        self.transfer(4).map(|_| ())
    }

    pub fn assert_srst(&mut self) {
        self.send_command(CMD_RESET_SRST, &[]);
    }

    pub fn deassert_srst(&mut self) {
        self.send_command(CMD_SET_SRST, &[]);
    }

    pub fn assert_trst(&mut self) {
        self.send_command(CMD_RESET_TRST, &[]);
    }

    pub fn deassert_trst(&mut self) {
        self.send_command(CMD_SET_TRST, &[]);
    }

    fn tap_sequence(&mut self, tms: &[u8], tdi: &[u8], bits: usize) -> Result<(), CableError> {
        if tms.len() != tdi.len() || tms.len() >= MAX_SEQUENCE_BYTES {
            return Err(CableError::Unsupported("scans longer than one J-Link sequence"));
        }
        let mut cmd = Vec::with_capacity(2 + tms.len() * 2);
        cmd.extend_from_slice(&(bits as u16).to_le_bytes());
        cmd.extend_from_slice(tms);
        cmd.extend_from_slice(tdi);
        self.send_command(CMD_HW_JTAG3, &cmd);
        Ok(())
    }

    // Queue a shift of `data`.  Returns how many bytes of TDO the adapter will send back.
    fn send_tdi(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<usize, CableError> {
        let bits = bits.clamp(1, 8);
        let mut total_bits = (data.len() - 1) * 8 + bits as usize;

        let mut tms = vec![0; data.len()];
        let mut data = data.to_vec();
        if pause_after {
            let last = tms.len() - 1;
            tms[last] |= 1 << (bits - 1);

            // One more clock, TMS low, reaches the pause state
            if total_bits % 8 == 0 {
                data.push(0xff);
                tms.push(0);
            }
            total_bits += 1;
        }

        self.tap_sequence(&tms, &data, total_bits)?;
        Ok(data.len())
    }
}

impl Cable for JLink {
    fn change_mode(&mut self, tms: &[usize], tdi: bool) -> Result<(), CableError> {
        let mut buf = vec![0u8; (tms.len() + 7) / 8];
        for (i, x) in tms.iter().enumerate() {
            if *x != 0 {
                buf[i / 8] |= 1 << (i % 8);
            }
        }
        let tdi_bytes = vec![if tdi { 0xff } else { 0 }; buf.len()];

        self.tap_sequence(&buf, &tdi_bytes, tms.len())?;
        // Nobody wants TDO here; it is collected with the next read
        self.recv_bytes += buf.len();
        Ok(())
    }

    fn read_data(&mut self, bits: usize) -> Result<Vec<u8>, CableError> {
        if bits == 0 {
            return Ok(vec![]);
        }
        let buf = vec![0xff; (bits + 7) / 8];
        let last = match bits % 8 {
            0 => 8,
            n => n as u8,
        };
        self.read_write_data(&buf, last, false)
    }

    fn write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<(), CableError> {
        if data.is_empty() {
            return Ok(());
        }
        let bytes = self.send_tdi(data, bits, pause_after)?;
        self.recv_bytes += bytes;
        Ok(())
    }

    fn read_write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<Vec<u8>, CableError> {
        if data.is_empty() {
            return Ok(vec![]);
        }
        let bytes = self.send_tdi(data, bits, pause_after)?;
        let mut out = self.transfer(bytes)?;
        out.truncate(data.len());
        crate::nrr::mask_tail(&mut out, (data.len() - 1) * 8 + bits.clamp(1, 8) as usize);
        Ok(out)
    }

    fn flush(&mut self) -> Result<(), CableError> {
        self.transfer(0).map(|_| ())
    }
}
