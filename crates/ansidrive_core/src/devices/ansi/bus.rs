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

    devices::ansi::bus.rs

    The bus state machine. Each poll cycle samples the interface lines once,
    sets the control bus direction, then advances every device against that
    single snapshot.

    Handshakes follow the usual request/acknowledge pattern: the device
    asserts Bus Acknowledge when it has consumed or produced a byte, and
    releases it once the host drops every request line.
*/

use super::{
    command::{command_is_param_out, command_is_time_dependent},
    data_phase::DataPhaseKind,
    pins::{AnsiPins, AnsiSignals, ControlBusDirection, OutputLine},
    timed::TimedPoll,
    AnsiDevState,
    AnsiDevice,
    AnsiError,
    SB1_COMMAND_REJECT,
};

impl AnsiDevice {
    /// Run one poll cycle for a device that owns its signal adapter.
    pub fn poll<S: AnsiSignals>(&mut self, io: &mut S, elapsed_us: f64) {
        let pins = io.sample();
        io.set_control_bus_direction(pins.direction());
        self.step(&pins, io, elapsed_us);
    }

    /// Advance the state machine against an already sampled snapshot.
    /// The caller is responsible for sampling and for setting the control bus
    /// direction beforehand.
    pub fn step<S: AnsiSignals>(&mut self, pins: &AnsiPins, io: &mut S, elapsed_us: f64) {
        if *pins != self.previous_pins {
            log::trace!("Device {}: [{}] {}", self.id, self.state, pins);
        }
        self.timed.advance(elapsed_us);

        if self.ack_asserted && !pins.any_request() {
            self.drive(io, OutputLine::BusAcknowledge, false);
        }

        if self.state.in_command() && self.gate_asserted(pins) {
            log::warn!(
                "Device {}: gate asserted during {} (cmd {:02X}), rejecting",
                self.id,
                self.state,
                self.regs.cmd
            );
            self.set_sb1(SB1_COMMAND_REJECT);
        }

        match self.state {
            AnsiDevState::Disconnected => {
                if pins.port_enable.is_active() {
                    self.set_state(AnsiDevState::Connected);
                }
            }
            AnsiDevState::Connected => {
                if !pins.port_enable.is_active() {
                    self.disconnect(io);
                }
                else if pins.strobe() && pins.host_drives_bus() && self.selected_by(pins.control_bus) {
                    self.drive(io, OutputLine::BusAcknowledge, true);
                    self.set_state(AnsiDevState::Selected);
                }
            }
            AnsiDevState::Selected => {
                if pins.host_drives_bus() && pins.command_request.is_active() {
                    self.set_state(AnsiDevState::ReadCommand);
                }
                else if pins.read_gate.is_active() {
                    self.enter_data_phase(DataPhaseKind::Read);
                }
                else if pins.write_gate.is_active() {
                    self.enter_data_phase(DataPhaseKind::Write);
                }
                else if pins.strobe() {
                    if pins.host_drives_bus() {
                        if self.selected_by(pins.control_bus) {
                            self.drive(io, OutputLine::BusAcknowledge, true);
                        }
                        else {
                            self.set_state(AnsiDevState::Connected);
                        }
                    }
                    else {
                        // Radial status: each device answers on its own bit.
                        io.write_control_bus(1 << self.id);
                    }
                }
            }
            AnsiDevState::ReadCommand => {
                self.regs.cmd = pins.control_bus;
                self.drive(io, OutputLine::BusAcknowledge, true);
                if command_is_param_out(self.regs.cmd) {
                    self.set_state(AnsiDevState::AwaitingParamOut);
                }
                else {
                    self.set_state(AnsiDevState::ExecuteCommand);
                }
            }
            AnsiDevState::AwaitingParamOut => {
                if pins.host_drives_bus() && pins.parameter_request.is_active() {
                    self.regs.param_out = pins.control_bus;
                    self.drive(io, OutputLine::BusAcknowledge, true);
                    self.set_state(AnsiDevState::ExecuteCommand);
                }
            }
            AnsiDevState::ExecuteCommand => {
                let cmd = self.regs.cmd;
                let time_dependent = command_is_time_dependent(cmd);
                if time_dependent {
                    self.drive(io, OutputLine::Busy, true);
                }
                self.execute_command(cmd, self.regs.param_out, io.persistent_faults());

                if command_is_param_out(cmd) {
                    if time_dependent {
                        self.set_state(AnsiDevState::AwaitingTimeDependentCommand);
                    }
                    else {
                        self.set_state(AnsiDevState::Selected);
                    }
                }
                else {
                    self.set_state(AnsiDevState::AwaitingParamIn);
                }
            }
            AnsiDevState::AwaitingTimeDependentCommand => {
                if let TimedPoll::Complete(completion) = self.timed.poll() {
                    self.complete_timed(completion, io.persistent_faults());
                    self.drive(io, OutputLine::Busy, false);
                    self.raise_attention();
                    self.set_state(AnsiDevState::Selected);
                }
            }
            AnsiDevState::AwaitingParamIn => {
                if !pins.host_drives_bus() && pins.parameter_request.is_active() {
                    io.write_control_bus(self.regs.param_in);
                    self.drive(io, OutputLine::BusAcknowledge, true);
                    if command_is_time_dependent(self.regs.cmd) {
                        self.set_state(AnsiDevState::AwaitingTimeDependentCommand);
                    }
                    else {
                        self.set_state(AnsiDevState::Selected);
                    }
                }
            }
            AnsiDevState::Reading => {
                self.data_phase_cycle(DataPhaseKind::Read, pins.read_gate.is_active(), elapsed_us);
            }
            AnsiDevState::Writing => {
                self.data_phase_cycle(DataPhaseKind::Write, pins.write_gate.is_active(), elapsed_us);
            }
        }

        self.sync_attention(io);
        self.previous_pins = *pins;
    }

    #[inline]
    fn selected_by(&self, mask: u8) -> bool {
        mask & (1 << self.id) != 0
    }

    /// True on the cycle a read or write gate becomes active.
    fn gate_asserted(&self, pins: &AnsiPins) -> bool {
        (pins.read_gate.is_active() && !self.previous_pins.read_gate.is_active())
            || (pins.write_gate.is_active() && !self.previous_pins.write_gate.is_active())
    }

    fn drive<S: AnsiSignals>(&mut self, io: &mut S, line: OutputLine, active: bool) {
        let latch = match line {
            OutputLine::BusAcknowledge => &mut self.ack_asserted,
            OutputLine::Busy => &mut self.busy_asserted,
            OutputLine::Attention => &mut self.attention_line,
        };
        *latch = active;
        io.set_line(line, active);
    }

    /// Gate the internal attention condition onto the attention line.
    fn sync_attention<S: AnsiSignals>(&mut self, io: &mut S) {
        let level = self.attention && self.regs.attention_enabled;
        if level != self.attention_line {
            self.drive(io, OutputLine::Attention, level);
        }
    }

    fn disconnect<S: AnsiSignals>(&mut self, io: &mut S) {
        self.initial_state();
        if self.ack_asserted {
            self.drive(io, OutputLine::BusAcknowledge, false);
        }
        if self.busy_asserted {
            self.drive(io, OutputLine::Busy, false);
        }
        self.set_state(AnsiDevState::Disconnected);
    }

    fn enter_data_phase(&mut self, kind: DataPhaseKind) {
        self.gate_us = 0.0;
        if kind == DataPhaseKind::Write && !self.regs.write_enabled {
            log::debug!("Device {}: write gate with write circuitry disabled, no data recorded", self.id);
        }
        else {
            let ctx = self.data_phase_context();
            self.data_phase.begin(kind, &ctx);
            self.data_phase_kind = Some(kind);
        }
        self.set_state(match kind {
            DataPhaseKind::Read => AnsiDevState::Reading,
            DataPhaseKind::Write => AnsiDevState::Writing,
        });
    }

    fn data_phase_cycle(&mut self, kind: DataPhaseKind, gate_active: bool, elapsed_us: f64) {
        if gate_active {
            self.gate_us += elapsed_us.max(0.0);
            if self.data_phase_kind == Some(kind) {
                let ctx = self.data_phase_context();
                self.data_phase.continue_phase(kind, &ctx);
            }
            return;
        }

        if self.data_phase_kind.take() == Some(kind) {
            let ctx = self.data_phase_context();
            self.data_phase.end(kind, &ctx);
        }
        self.set_state(AnsiDevState::Selected);
    }
}

const LINE_COUNT: usize = 3;

#[inline]
fn line_index(line: OutputLine) -> usize {
    match line {
        OutputLine::BusAcknowledge => 0,
        OutputLine::Attention => 1,
        OutputLine::Busy => 2,
    }
}

/// The view of the shared signal adapter handed to a single device.
/// Output lines are open collector, so a line stays active while any device drives it.
struct DevicePort<'a, S: AnsiSignals> {
    signals: &'a mut S,
    id: u8,
    line_masks: &'a mut [u8; LINE_COUNT],
    bus_out: &'a mut u8,
}

impl<S: AnsiSignals> AnsiSignals for DevicePort<'_, S> {
    fn sample(&mut self) -> AnsiPins {
        self.signals.sample()
    }

    fn write_control_bus(&mut self, value: u8) {
        *self.bus_out |= value;
        self.signals.write_control_bus(*self.bus_out);
    }

    fn set_line(&mut self, line: OutputLine, active: bool) {
        let mask = &mut self.line_masks[line_index(line)];
        if active {
            *mask |= 1 << self.id;
        }
        else {
            *mask &= !(1 << self.id);
        }
        self.signals.set_line(line, *mask != 0);
    }

    fn set_control_bus_direction(&mut self, direction: ControlBusDirection) {
        self.signals.set_control_bus_direction(direction);
    }

    fn persistent_faults(&self) -> u8 {
        self.signals.persistent_faults()
    }
}

/// Several emulated devices sharing one interface port.
pub struct AnsiBus<S: AnsiSignals> {
    signals: S,
    devices: Vec<AnsiDevice>,
    line_masks: [u8; LINE_COUNT],
    bus_out: u8,
    cycles: u64,
}

impl<S: AnsiSignals> AnsiBus<S> {
    pub fn new(signals: S) -> Self {
        Self {
            signals,
            devices: Vec::new(),
            line_masks: [0; LINE_COUNT],
            bus_out: 0,
            cycles: 0,
        }
    }

    pub fn add_device(&mut self, device: AnsiDevice) -> Result<(), AnsiError> {
        if self.devices.iter().any(|d| d.id() == device.id()) {
            return Err(AnsiError::DuplicateDeviceId(device.id()));
        }
        log::debug!("AnsiBus: adding device {}: {}", device.id(), device.disk_type());
        self.devices.push(device);
        self.devices.sort_by_key(|d| d.id());
        Ok(())
    }

    /// Run one poll cycle for every device on the bus.
    pub fn poll(&mut self, elapsed_us: f64) {
        let Self {
            signals,
            devices,
            line_masks,
            bus_out,
            cycles,
        } = self;

        let pins = signals.sample();
        signals.set_control_bus_direction(pins.direction());
        *bus_out = 0;

        for device in devices.iter_mut() {
            let mut port = DevicePort {
                signals: &mut *signals,
                id: device.id(),
                line_masks: &mut *line_masks,
                bus_out: &mut *bus_out,
            };
            device.step(&pins, &mut port, elapsed_us);
        }
        *cycles += 1;
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn devices(&self) -> &[AnsiDevice] {
        &self.devices
    }

    pub fn device(&self, id: u8) -> Option<&AnsiDevice> {
        self.devices.iter().find(|d| d.id() == id)
    }

    pub fn device_mut(&mut self, id: u8) -> Option<&mut AnsiDevice> {
        self.devices.iter_mut().find(|d| d.id() == id)
    }

    pub fn signals(&self) -> &S {
        &self.signals
    }

    pub fn signals_mut(&mut self) -> &mut S {
        &mut self.signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        device_types::disk_type::AnsiDiskType,
        devices::ansi::{
            data_phase::{DataPhase, DataPhaseContext},
            pins::Level,
            GS_BUSY_EXECUTING,
            GS_ILLEGAL_COMMAND,
        },
    };
    use std::{cell::RefCell, rc::Rc};

    #[derive(Copy, Clone, Debug, PartialEq)]
    enum Event {
        Sample,
        Direction(ControlBusDirection),
        Bus(u8),
        Line(OutputLine, bool),
    }

    #[derive(Default)]
    struct MockSignals {
        pins: AnsiPins,
        bus: u8,
        ack: bool,
        attention: bool,
        busy: bool,
        faults: u8,
        events: Vec<Event>,
    }

    impl AnsiSignals for MockSignals {
        fn sample(&mut self) -> AnsiPins {
            self.events.push(Event::Sample);
            self.pins
        }
        fn write_control_bus(&mut self, value: u8) {
            self.bus = value;
            self.events.push(Event::Bus(value));
        }
        fn set_line(&mut self, line: OutputLine, active: bool) {
            match line {
                OutputLine::BusAcknowledge => self.ack = active,
                OutputLine::Attention => self.attention = active,
                OutputLine::Busy => self.busy = active,
            }
            self.events.push(Event::Line(line, active));
        }
        fn set_control_bus_direction(&mut self, direction: ControlBusDirection) {
            self.events.push(Event::Direction(direction));
        }
        fn persistent_faults(&self) -> u8 {
            self.faults
        }
    }

    const TIMESTEP_US: f64 = 100.0;
    const MAX_CYCLES: usize = 1000;

    /// Plays the host side of the interface against a single device.
    struct TestHost {
        io: MockSignals,
        dev: AnsiDevice,
    }

    impl TestHost {
        fn new(id: u8) -> Self {
            Self {
                io: MockSignals::default(),
                dev: AnsiDevice::new(id, AnsiDiskType::default()).unwrap(),
            }
        }

        fn cycle(&mut self) {
            self.dev.poll(&mut self.io, TIMESTEP_US);
        }

        fn cycle_until(&mut self, cond: impl Fn(&MockSignals) -> bool) {
            for _ in 0..MAX_CYCLES {
                self.cycle();
                if cond(&self.io) {
                    return;
                }
            }
            panic!("host timed out in state {}", self.dev.state());
        }

        fn enable(&mut self) {
            self.io.pins.port_enable = Level::Low;
            self.cycle();
        }

        fn select(&mut self, mask: u8) {
            self.io.pins.bus_direction_out = Level::Low;
            self.io.pins.control_bus = mask;
            self.io.pins.select_out_attn_in_strobe = Level::Low;
            self.cycle_until(|io| io.ack);
            self.io.pins.select_out_attn_in_strobe = Level::High;
            self.cycle_until(|io| !io.ack);
        }

        fn send(&mut self, value: u8, command: bool) {
            self.io.pins.bus_direction_out = Level::Low;
            self.io.pins.control_bus = value;
            if command {
                self.io.pins.command_request = Level::Low;
            }
            else {
                self.io.pins.parameter_request = Level::Low;
            }
            self.cycle_until(|io| io.ack);
            self.io.pins.command_request = Level::High;
            self.io.pins.parameter_request = Level::High;
            self.cycle_until(|io| !io.ack);
        }

        fn receive(&mut self) -> u8 {
            self.io.pins.bus_direction_out = Level::High;
            self.io.pins.parameter_request = Level::Low;
            self.cycle_until(|io| io.ack);
            let value = self.io.bus;
            self.io.pins.parameter_request = Level::High;
            self.cycle_until(|io| !io.ack);
            value
        }

        fn command_in(&mut self, cmd: u8) -> u8 {
            self.send(cmd, true);
            self.receive()
        }

        fn command_out(&mut self, cmd: u8, param: u8) {
            self.send(cmd, true);
            self.send(param, false);
        }
    }

    fn selected_host(id: u8) -> TestHost {
        let mut host = TestHost::new(id);
        host.enable();
        host.select(1 << id);
        host
    }

    #[test]
    fn test_select_device_3() {
        let mut host = TestHost::new(3);
        host.cycle();
        assert_eq!(host.dev.state(), AnsiDevState::Disconnected);
        host.enable();
        assert_eq!(host.dev.state(), AnsiDevState::Connected);

        host.io.pins.bus_direction_out = Level::Low;
        host.io.pins.control_bus = 0b0000_1000;
        host.io.pins.select_out_attn_in_strobe = Level::Low;
        host.cycle();
        assert_eq!(host.dev.state(), AnsiDevState::Selected);
        assert!(host.io.ack);
        assert!(host.dev.ack_asserted());
    }

    #[test]
    fn test_select_mask_matching() {
        for id in 0..8u8 {
            for mask in [0x00u8, 0xFF, 0x55, 0xAA, 1 << id, !(1 << id)] {
                for host_drives in [true, false] {
                    let mut host = TestHost::new(id);
                    host.enable();
                    host.io.pins.bus_direction_out = Level::from_active(host_drives);
                    host.io.pins.control_bus = mask;
                    host.io.pins.select_out_attn_in_strobe = Level::Low;
                    host.cycle();

                    let expect = host_drives && mask & (1 << id) != 0;
                    assert_eq!(host.dev.state() == AnsiDevState::Selected, expect, "id {id} mask {mask:02X}");
                }
            }
        }
    }

    #[test]
    fn test_direction_set_before_evaluation() {
        let states = [
            AnsiDevState::Disconnected,
            AnsiDevState::Connected,
            AnsiDevState::Selected,
            AnsiDevState::ReadCommand,
            AnsiDevState::AwaitingParamOut,
            AnsiDevState::ExecuteCommand,
            AnsiDevState::AwaitingParamIn,
            AnsiDevState::AwaitingTimeDependentCommand,
            AnsiDevState::Reading,
            AnsiDevState::Writing,
        ];
        for state in states {
            for direction_out in [Level::Low, Level::High] {
                let mut host = TestHost::new(0);
                host.dev.set_state(state);
                host.io.pins = AnsiPins {
                    control_bus: 0x01,
                    port_enable: Level::Low,
                    bus_direction_out: direction_out,
                    select_out_attn_in_strobe: Level::Low,
                    parameter_request: Level::Low,
                    ..Default::default()
                };
                host.cycle();

                let expected = if direction_out.is_active() {
                    ControlBusDirection::Out
                }
                else {
                    ControlBusDirection::In
                };
                assert_eq!(host.io.events[0], Event::Sample);
                assert_eq!(host.io.events[1], Event::Direction(expected), "state {state}");
            }
        }
    }

    #[test]
    fn test_deselect_and_radial_status() {
        let mut host = selected_host(2);

        // Attention-in strobe: the device answers on its own bit.
        host.io.pins.bus_direction_out = Level::High;
        host.io.pins.select_out_attn_in_strobe = Level::Low;
        host.cycle();
        assert_eq!(host.io.bus, 0b0000_0100);
        assert_eq!(host.dev.state(), AnsiDevState::Selected);
        host.io.pins.select_out_attn_in_strobe = Level::High;
        host.cycle();

        // Selecting another device deselects this one.
        host.io.pins.bus_direction_out = Level::Low;
        host.io.pins.control_bus = 0b0000_0001;
        host.io.pins.select_out_attn_in_strobe = Level::Low;
        host.cycle();
        assert_eq!(host.dev.state(), AnsiDevState::Connected);
    }

    #[test]
    fn test_report_general_status_over_bus() {
        let mut host = selected_host(0);
        assert_eq!(host.command_in(0x0F), 0x00);
        assert_eq!(host.dev.general_status(), 0x00);
        assert_eq!(host.dev.state(), AnsiDevState::Selected);
    }

    #[test]
    fn test_unknown_command_over_bus() {
        let mut host = selected_host(0);
        let response = host.command_in(0xAA);
        assert_eq!(response & GS_ILLEGAL_COMMAND, GS_ILLEGAL_COMMAND);
        assert_eq!(host.dev.state(), AnsiDevState::Selected);
    }

    #[test]
    fn test_seek_over_bus() {
        let mut host = selected_host(0);
        host.command_out(0x42, 0x01);
        host.command_out(0x43, 0x2C);
        assert_eq!(host.dev.load_cylinder(), 0x012C);

        let response = host.command_in(0x03);
        assert_eq!(response & GS_BUSY_EXECUTING, GS_BUSY_EXECUTING);
        assert!(host.io.busy);
        assert_eq!(host.dev.state(), AnsiDevState::AwaitingTimeDependentCommand);
        assert_eq!(host.dev.current_cylinder(), 0);

        host.cycle_until(|io| io.attention);
        assert_eq!(host.dev.state(), AnsiDevState::Selected);
        assert!(!host.io.busy);
        assert_eq!(host.dev.current_cylinder(), 0x012C);
        assert_eq!(host.dev.general_status() & GS_BUSY_EXECUTING, 0);

        assert_eq!(host.command_in(0x29), 0x01);
        assert_eq!(host.command_in(0x2A), 0x2C);

        // Clearing attention releases the line.
        host.command_in(0x02);
        assert!(!host.io.attention);
    }

    #[test]
    fn test_seek_takes_modeled_time() {
        let mut host = selected_host(0);
        host.command_out(0x43, 0x05);
        host.command_in(0x03);
        let mut cycles = 0;
        while !host.io.attention {
            host.cycle();
            cycles += 1;
            assert!(cycles < MAX_CYCLES);
        }
        // 5ms at 100us per cycle, less the cycles spent in the param in handshake
        assert!(cycles >= 45 && cycles <= 50, "seek took {cycles} cycles");
    }

    #[test]
    fn test_attention_gating() {
        let mut host = selected_host(0);
        host.command_out(0x40, 0x80);
        host.command_in(0x11);
        for _ in 0..100 {
            host.cycle();
        }
        assert!(host.dev.attention());
        assert!(!host.io.attention);

        host.command_out(0x40, 0x00);
        host.cycle();
        assert!(host.io.attention);
    }

    #[test]
    fn test_spin_control_is_param_out_time_dependent() {
        let mut host = selected_host(0);
        host.command_out(0x55, 0x00);
        assert_eq!(host.dev.state(), AnsiDevState::AwaitingTimeDependentCommand);
        assert!(host.io.busy);
        host.cycle_until(|io| io.attention);
        assert!(!host.dev.spindle_running());
        assert!(!host.io.busy);
    }

    #[test]
    fn test_gate_during_command_is_rejected() {
        let mut host = selected_host(0);
        host.command_in(0x03);
        assert_eq!(host.dev.state(), AnsiDevState::AwaitingTimeDependentCommand);
        host.io.pins.read_gate = Level::Low;
        host.cycle();
        assert_eq!(host.dev.sense_byte_1() & SB1_COMMAND_REJECT, SB1_COMMAND_REJECT);
        assert!(host.dev.attention());
    }

    #[test]
    fn test_disconnect_reinitializes() {
        let mut host = selected_host(1);
        host.command_out(0x50, 0x22);
        host.command_in(0x10);
        assert!(host.dev.attributes().is_initialized());
        host.command_out(0x44, 3);

        // Deselect, then drop port enable.
        host.io.pins.bus_direction_out = Level::Low;
        host.io.pins.control_bus = 0;
        host.io.pins.select_out_attn_in_strobe = Level::Low;
        host.cycle();
        host.io.pins.select_out_attn_in_strobe = Level::High;
        host.io.pins.port_enable = Level::High;
        host.cycle();
        assert_eq!(host.dev.state(), AnsiDevState::Disconnected);
        assert!(!host.dev.attributes().is_initialized());
        assert_eq!(host.dev.selected_head(), 0);
        assert!(!host.io.ack);
        assert!(!host.io.busy);
    }

    #[derive(Default)]
    struct PhaseLog {
        events: Vec<(&'static str, DataPhaseKind, u16, u8)>,
    }

    struct RecordingPhase(Rc<RefCell<PhaseLog>>);

    impl DataPhase for RecordingPhase {
        fn begin(&mut self, kind: DataPhaseKind, ctx: &DataPhaseContext) {
            self.0.borrow_mut().events.push(("begin", kind, ctx.cylinder, ctx.head));
        }
        fn continue_phase(&mut self, kind: DataPhaseKind, ctx: &DataPhaseContext) {
            self.0.borrow_mut().events.push(("continue", kind, ctx.cylinder, ctx.head));
        }
        fn end(&mut self, kind: DataPhaseKind, ctx: &DataPhaseContext) {
            self.0.borrow_mut().events.push(("end", kind, ctx.cylinder, ctx.head));
        }
    }

    #[test]
    fn test_data_phase_hooks() {
        let log = Rc::new(RefCell::new(PhaseLog::default()));
        let mut host = TestHost::new(0);
        host.dev = AnsiDevice::new(0, AnsiDiskType::default())
            .unwrap()
            .with_data_phase(Box::new(RecordingPhase(log.clone())));
        host.enable();
        host.select(0x01);
        host.command_out(0x44, 2);

        host.io.pins.read_gate = Level::Low;
        host.cycle();
        assert_eq!(host.dev.state(), AnsiDevState::Reading);
        host.cycle();
        host.io.pins.read_gate = Level::High;
        host.cycle();
        assert_eq!(host.dev.state(), AnsiDevState::Selected);

        // Write circuitry is disabled, so the handler sees nothing.
        host.io.pins.write_gate = Level::Low;
        host.cycle();
        assert_eq!(host.dev.state(), AnsiDevState::Writing);
        host.io.pins.write_gate = Level::High;
        host.cycle();

        let events = &log.borrow().events;
        assert_eq!(
            events.as_slice(),
            &[
                ("begin", DataPhaseKind::Read, 0, 2),
                ("continue", DataPhaseKind::Read, 0, 2),
                ("end", DataPhaseKind::Read, 0, 2),
            ]
        );
    }

    #[test]
    fn test_bus_shares_lines() {
        let mut bus = AnsiBus::new(MockSignals::default());
        bus.add_device(AnsiDevice::new(0, AnsiDiskType::default()).unwrap()).unwrap();
        bus.add_device(AnsiDevice::new(5, AnsiDiskType::default()).unwrap()).unwrap();
        assert_eq!(
            bus.add_device(AnsiDevice::new(5, AnsiDiskType::default()).unwrap()),
            Err(AnsiError::DuplicateDeviceId(5))
        );

        bus.signals_mut().pins.port_enable = Level::Low;
        bus.poll(TIMESTEP_US);
        assert!(bus.devices().iter().all(|d| d.state() == AnsiDevState::Connected));

        // Select both devices at once.
        {
            let pins = &mut bus.signals_mut().pins;
            pins.bus_direction_out = Level::Low;
            pins.control_bus = 0b0010_0001;
            pins.select_out_attn_in_strobe = Level::Low;
        }
        bus.poll(TIMESTEP_US);
        assert!(bus.devices().iter().all(|d| d.state() == AnsiDevState::Selected));
        assert!(bus.signals().ack);

        // Radial status combines both answers.
        bus.signals_mut().pins.bus_direction_out = Level::High;
        bus.poll(TIMESTEP_US);
        assert_eq!(bus.signals().bus, 0b0010_0001);

        bus.signals_mut().pins.select_out_attn_in_strobe = Level::High;
        bus.poll(TIMESTEP_US);
        assert!(!bus.signals().ack);
        assert_eq!(bus.cycles(), 4);
        assert!(bus.device(5).is_some());
        assert!(bus.device(3).is_none());
    }

    #[test]
    fn test_attention_line_held_by_any_device() {
        let mut bus = AnsiBus::new(MockSignals::default());
        bus.add_device(AnsiDevice::new(0, AnsiDiskType::default()).unwrap()).unwrap();
        bus.add_device(AnsiDevice::new(1, AnsiDiskType::default()).unwrap()).unwrap();

        bus.device_mut(0).unwrap().raise_attention();
        bus.device_mut(1).unwrap().raise_attention();
        bus.poll(TIMESTEP_US);
        assert!(bus.signals().attention);

        bus.device_mut(0).unwrap().clear_attention();
        bus.poll(TIMESTEP_US);
        assert!(bus.signals().attention);

        bus.device_mut(1).unwrap().clear_attention();
        bus.poll(TIMESTEP_US);
        assert!(!bus.signals().attention);
    }
}
