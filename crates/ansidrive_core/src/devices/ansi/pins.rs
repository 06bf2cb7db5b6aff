/*
    AnsiDrive

    Copyright 2024-2025 AnsiDrive contributors

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    devices::ansi::pins.rs

    Signal lines of the ANSI disk interface, and the adapter trait the bus
    state machine uses to sample and drive them.

    All discrete lines on the interface are active low.
*/

use std::fmt::{Display, Formatter};

/// Electrical level of a discrete interface line. Lines idle high.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Level {
    #[default]
    High,
    Low,
}

impl Level {
    #[inline]
    pub fn is_active(self) -> bool {
        matches!(self, Level::Low)
    }

    #[inline]
    pub fn from_active(active: bool) -> Self {
        if active {
            Level::Low
        }
        else {
            Level::High
        }
    }
}

/// Direction of the 8-bit control bus, from the host's point of view.
/// `Out` means the host drives the bus; `In` means the device drives it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ControlBusDirection {
    #[default]
    In,
    Out,
}

/// Discrete lines driven by the device.
#[derive(Copy, Clone, Debug, PartialEq, Eq, strum_macros::Display, strum_macros::EnumIter)]
pub enum OutputLine {
    BusAcknowledge,
    Attention,
    Busy,
}

/// A snapshot of every input line, sampled once per poll cycle.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AnsiPins {
    pub control_bus: u8,
    pub select_out_attn_in_strobe: Level,
    pub command_request: Level,
    pub parameter_request: Level,
    pub bus_direction_out: Level,
    pub port_enable: Level,
    pub read_gate: Level,
    pub write_gate: Level,
}

impl AnsiPins {
    #[inline]
    pub fn direction(&self) -> ControlBusDirection {
        if self.bus_direction_out.is_active() {
            ControlBusDirection::Out
        }
        else {
            ControlBusDirection::In
        }
    }

    /// True when the host has declared it is driving the control bus.
    #[inline]
    pub fn host_drives_bus(&self) -> bool {
        self.bus_direction_out.is_active()
    }

    #[inline]
    pub fn strobe(&self) -> bool {
        self.select_out_attn_in_strobe.is_active()
    }

    /// True if any line that starts a control bus handshake is active.
    #[inline]
    pub fn any_request(&self) -> bool {
        self.strobe() || self.command_request.is_active() || self.parameter_request.is_active()
    }
}

impl Display for AnsiPins {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let flag = |l: Level, c: char| if l.is_active() { c } else { '-' };
        write!(
            f,
            "bus:{:02X} {}{}{}{}{}{}{}",
            self.control_bus,
            flag(self.port_enable, 'E'),
            flag(self.bus_direction_out, 'O'),
            flag(self.select_out_attn_in_strobe, 'S'),
            flag(self.command_request, 'C'),
            flag(self.parameter_request, 'P'),
            flag(self.read_gate, 'R'),
            flag(self.write_gate, 'W'),
        )
    }
}

/// The hardware boundary consumed by the bus state machine.
///
/// An implementation may be a real GPIO port, or a simulation such as the
/// headless frontend's `SimulatedBus`.
pub trait AnsiSignals {
    /// Sample all input lines.
    fn sample(&mut self) -> AnsiPins;

    /// Place a byte on the control bus. Only meaningful while the device drives the bus.
    fn write_control_bus(&mut self, value: u8);

    /// Assert (`active == true`) or release a device output line.
    fn set_line(&mut self, line: OutputLine, active: bool);

    fn set_control_bus_direction(&mut self, direction: ControlBusDirection);

    /// Sense byte 1 fault bits that are still physically present.
    /// CLEAR_FAULT will not clear these. Without real fault detection, nothing persists.
    fn persistent_faults(&self) -> u8 {
        0
    }
}

impl<T: AnsiSignals + ?Sized> AnsiSignals for &mut T {
    fn sample(&mut self) -> AnsiPins {
        (**self).sample()
    }
    fn write_control_bus(&mut self, value: u8) {
        (**self).write_control_bus(value)
    }
    fn set_line(&mut self, line: OutputLine, active: bool) {
        (**self).set_line(line, active)
    }
    fn set_control_bus_direction(&mut self, direction: ControlBusDirection) {
        (**self).set_control_bus_direction(direction)
    }
    fn persistent_faults(&self) -> u8 {
        (**self).persistent_faults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_active_low() {
        assert!(Level::Low.is_active());
        assert!(!Level::High.is_active());
        assert_eq!(Level::from_active(true), Level::Low);
        assert_eq!(Level::default(), Level::High);
    }

    #[test]
    fn test_direction_follows_bus_direction_out() {
        let mut pins = AnsiPins::default();
        assert_eq!(pins.direction(), ControlBusDirection::In);
        pins.bus_direction_out = Level::Low;
        assert_eq!(pins.direction(), ControlBusDirection::Out);
        assert!(pins.host_drives_bus());
    }

    #[test]
    fn test_pins_display() {
        let pins = AnsiPins {
            control_bus: 0x08,
            port_enable: Level::Low,
            select_out_attn_in_strobe: Level::Low,
            ..Default::default()
        };
        assert_eq!(pins.to_string(), "bus:08 E-S----");
    }
}
