//! Implement the `Cable` trait for "jtagkey" compatible hardware adapters like the Bus Blaster
use std::time::Duration;
use std::vec::Vec;

use libftd2xx::{Ft2232h, Ftdi, FtdiCommon, FtdiMpsse, MpsseCmdBuilder, MpsseCmdExecutor};

use super::mpsse::{adapter_error, Mpsse};
use crate::cable::{Cable, CableError};

// Lower pins
const PIN_TCK: u8 = 1;
const PIN_TDI: u8 = 1 << 1;
const PIN_TMS: u8 = 1 << 3;
const PIN_N_OE: u8 = 1 << 4;
const LOWER_OUTPUT_PINS: u8 = PIN_TCK | PIN_TDI | PIN_TMS | PIN_N_OE;

// Upper pins
const PIN_N_TRST: u8 = 1;
const PIN_N_SRST: u8 = 1 << 1;
const PIN_N_TRST_OE: u8 = 1 << 2;
const PIN_N_SRST_OE: u8 = 1 << 3;
const UPPER_OUTPUT_PINS: u8 = PIN_N_TRST | PIN_N_SRST | PIN_N_TRST_OE | PIN_N_SRST_OE;

pub struct JtagKey {
    ft: Mpsse<Ft2232h>,
}

impl JtagKey {
    /// Open a JtagKey.  FT2232-based adapters like JtagKey have both an "A" interface and a
    /// "B" interface.  `primary` selects "A". `clock` is the TCK frequency in hertz.
    pub fn new(clock: u32, primary: bool) -> Result<Self, CableError> {
        let description = if primary {
            "Dual RS232-HS A"
        } else {
            "Dual RS232-HS B"
        };
        let ft = Ftdi::with_description(description)
            .map_err(|e| CableError::NotFound(std::format!("{}: {:?}", description, e)))?;
        let ft = Ft2232h::try_from(ft).map_err(adapter_error)?;
        let mut ft = Mpsse::new(ft, clock)?;
        ft.ft.set_latency_timer(Duration::from_millis(0)).map_err(adapter_error)?;
        ft.ft.set_gpio_upper(PIN_N_TRST | PIN_N_SRST, UPPER_OUTPUT_PINS).map_err(adapter_error)?;

        let builder = MpsseCmdBuilder::new().set_gpio_lower(PIN_TMS, LOWER_OUTPUT_PINS);
        ft.ft.send(builder.as_slice()).map_err(adapter_error)?;
        log::info!("opened {} at {} Hz", description, clock);

        Ok(JtagKey { ft })
    }

    /// Hold the target in system reset.
    pub fn assert_srst(&mut self) -> Result<(), CableError> {
        self.ft.flush()?;
        self.ft.ft.set_gpio_upper(PIN_N_TRST, UPPER_OUTPUT_PINS).map_err(adapter_error)
    }

    /// Release system reset.
    pub fn deassert_srst(&mut self) -> Result<(), CableError> {
        self.ft.flush()?;
        self.ft.ft.set_gpio_upper(PIN_N_TRST | PIN_N_SRST, UPPER_OUTPUT_PINS).map_err(adapter_error)
    }
}

impl Cable for JtagKey {
    fn change_mode(&mut self, tms: &[usize], tdi: bool) -> Result<(), CableError> {
        self.ft.change_mode(tms, tdi)
    }

    fn read_data(&mut self, bits: usize) -> Result<Vec<u8>, CableError> {
        self.ft.read_data(bits)
    }

    fn write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<(), CableError> {
        self.ft.write_data(data, bits, pause_after)
    }

    fn read_write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<Vec<u8>, CableError> {
        self.ft.read_write_data(data, bits, pause_after)
    }

    fn queue_read(&mut self, bits: usize) -> Result<bool, CableError> {
        self.ft.queue_read(bits)
    }

    fn queue_read_write(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<bool, CableError> {
        self.ft.queue_read_write(data, bits, pause_after)
    }

    fn finish_read(&mut self, bits: usize) -> Result<Vec<u8>, CableError> {
        self.ft.finish_read(bits)
    }

    fn flush(&mut self) -> Result<(), CableError> {
        self.ft.flush()
    }
}
