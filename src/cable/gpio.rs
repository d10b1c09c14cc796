//! Bit-banged JTAG over `embedded-hal` pins.
use alloc::vec::Vec;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{Error as _, InputPin, OutputPin, PinState};

use crate::cable::{self, Cable, CableError, Clocked};

fn pin_err<E: embedded_hal::digital::Error>(e: E) -> CableError {
    CableError::Pin(e.kind())
}

pub struct Gpio<Clk, Tdi, Tdo, Tms, Delay> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin, Delay: DelayNs {
    half_period: u32,
    delay: Delay,
    clock: Clk,
    tdi: Tdi,
    tdo: Tdo,
    tms: Tms,
}

impl<Clk, Tdi, Tdo, Tms, Delay> Gpio<Clk, Tdi, Tdo, Tms, Delay> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin, Delay: DelayNs {
    /// `freq_khz` sets TCK; the clock pin should start low.
    pub fn new(freq_khz: u32, clock: Clk, tdi: Tdi, tdo: Tdo, tms: Tms, delay: Delay) -> Gpio<Clk, Tdi, Tdo, Tms, Delay> {
        let period_ns = 1_000_000 / freq_khz.max(1);
        let half_period = period_ns / 2;
        Gpio { half_period, clock, tdi, tdo, tms, delay }
    }

    /// Give the pins back.
    pub fn release(self) -> (Clk, Tdi, Tdo, Tms, Delay) {
        (self.clock, self.tdi, self.tdo, self.tms, self.delay)
    }
}

impl<Clk, Tdi, Tdo, Tms, Delay> Clocked for Gpio<Clk, Tdi, Tdo, Tms, Delay> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin, Delay: DelayNs {
    fn clock(&mut self, tms: bool, tdi: bool) -> Result<bool, CableError> {
        self.tms.set_state(PinState::from(tms)).map_err(pin_err)?;
        self.tdi.set_state(PinState::from(tdi)).map_err(pin_err)?;

        // TDO changed on the last falling edge and is sampled before the rising one
        let tdo = self.tdo.is_high().map_err(pin_err)?;

        self.clock.set_high().map_err(pin_err)?;
        self.delay.delay_ns(self.half_period);
        self.clock.set_low().map_err(pin_err)?;
        self.delay.delay_ns(self.half_period);
        Ok(tdo)
    }
}

impl<Clk, Tdi, Tdo, Tms, Delay> Cable for Gpio<Clk, Tdi, Tdo, Tms, Delay> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin, Delay: DelayNs {
    fn change_mode(&mut self, tms: &[usize], tdi: bool) -> Result<(), CableError> {
        cable::clock_tms(self, tms, tdi)
    }

    fn read_data(&mut self, bits: usize) -> Result<Vec<u8>, CableError> {
        cable::shift_ones(self, bits)
    }

    fn write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<(), CableError> {
        cable::shift(self, data, bits, pause_after).map(|_| ())
    }

    fn read_write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<Vec<u8>, CableError> {
        cable::shift(self, data, bits, pause_after)
    }
}
