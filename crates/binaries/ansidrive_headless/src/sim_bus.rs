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

    ansidrive_headless::sim_bus.rs

    A software stand-in for the interface port. The host side sets input
    levels directly; device outputs are latched for the host to observe.
*/

use ansidrive_core::devices::ansi::{
    pins::AnsiPins,
    AnsiSignals,
    ControlBusDirection,
    Level,
    OutputLine,
};

#[derive(Default)]
pub struct SimulatedBus {
    /// Input levels as driven by the host.
    pub pins: AnsiPins,
    /// Last byte placed on the control bus by a device.
    pub bus_out: u8,
    pub ack: bool,
    pub attention: bool,
    pub busy: bool,
    pub direction: ControlBusDirection,
    /// Sense byte 1 faults that survive CLEAR_FAULT.
    pub faults: u8,
    trace: bool,
}

impl SimulatedBus {
    pub fn new(trace: bool) -> Self {
        Self {
            trace,
            ..Default::default()
        }
    }

    /// Drive the control bus from the host side.
    pub fn host_write(&mut self, value: u8) {
        self.pins.bus_direction_out = Level::Low;
        self.pins.control_bus = value;
    }

    /// Turn the control bus around so that devices drive it.
    pub fn host_release(&mut self) {
        self.pins.bus_direction_out = Level::High;
    }

    pub fn set_port_enable(&mut self, active: bool) {
        self.pins.port_enable = Level::from_active(active);
    }

    pub fn set_strobe(&mut self, active: bool) {
        self.pins.select_out_attn_in_strobe = Level::from_active(active);
    }

    pub fn set_command_request(&mut self, active: bool) {
        self.pins.command_request = Level::from_active(active);
    }

    pub fn set_parameter_request(&mut self, active: bool) {
        self.pins.parameter_request = Level::from_active(active);
    }

    pub fn set_read_gate(&mut self, active: bool) {
        self.pins.read_gate = Level::from_active(active);
    }

    pub fn set_write_gate(&mut self, active: bool) {
        self.pins.write_gate = Level::from_active(active);
    }
}

impl AnsiSignals for SimulatedBus {
    fn sample(&mut self) -> AnsiPins {
        self.pins
    }

    fn write_control_bus(&mut self, value: u8) {
        if self.trace {
            log::trace!("bus <- {:02X}", value);
        }
        self.bus_out = value;
    }

    fn set_line(&mut self, line: OutputLine, active: bool) {
        let latch = match line {
            OutputLine::BusAcknowledge => &mut self.ack,
            OutputLine::Attention => &mut self.attention,
            OutputLine::Busy => &mut self.busy,
        };
        if self.trace && *latch != active {
            log::trace!("{} {}", line, if active { "asserted" } else { "released" });
        }
        *latch = active;
    }

    fn set_control_bus_direction(&mut self, direction: ControlBusDirection) {
        self.direction = direction;
    }

    fn persistent_faults(&self) -> u8 {
        self.faults
    }
}
