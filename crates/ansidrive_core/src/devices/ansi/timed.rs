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

    devices::ansi::timed.rs

    Tracks the single in-flight time-dependent command of a device.
*/

use std::fmt::{Display, Formatter};

/// Modeled duration of a seek and of most other time-dependent commands.
pub const SEEK_TIME_US: f64 = 5000.0; // 5ms in microseconds
pub const COMMAND_TIME_US: f64 = 5000.0;
pub const SPIN_TIME_US: f64 = 10000.0; // 10ms

/// The action to perform once a time-dependent command has run its course.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Completion {
    Seek { cylinder_high: u8, cylinder_low: u8 },
    Rezero,
    SetAttention,
    SelectiveReset,
    SeekLandingZone,
    ReformatTrack { sector_pulses: [u8; 3], bytes_per_sector: [u8; 3] },
    Spin { up: bool },
    /// A command refused with an illegal parameter. Only releases busy.
    Reject,
}

impl Display for Completion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Completion::Seek {
                cylinder_high,
                cylinder_low,
            } => write!(f, "Seek to {}", u16::from_be_bytes([*cylinder_high, *cylinder_low])),
            Completion::Rezero => write!(f, "Rezero"),
            Completion::SetAttention => write!(f, "Set Attention"),
            Completion::SelectiveReset => write!(f, "Selective Reset"),
            Completion::SeekLandingZone => write!(f, "Seek Landing Zone"),
            Completion::ReformatTrack { .. } => write!(f, "Reformat Track"),
            Completion::Spin { up: true } => write!(f, "Spin Up"),
            Completion::Spin { up: false } => write!(f, "Spin Down"),
            Completion::Reject => write!(f, "Reject"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TimedPoll {
    Running,
    /// The command has expired. The completion is only handed out once.
    Complete(Option<Completion>),
}

#[derive(Clone, Debug, Default)]
pub struct TimedCommand {
    duration_us: f64,
    elapsed_us: f64,
    completion: Option<Completion>,
}

impl TimedCommand {
    pub fn new() -> Self {
        Default::default()
    }

    /// Register a new time-dependent command, discarding any previous registration unfired.
    pub fn start(&mut self, duration_us: f64, completion: Option<Completion>) {
        if let Some(old) = self.completion {
            log::debug!("TimedCommand: discarding unfired completion: {}", old);
        }
        self.duration_us = duration_us.max(0.0);
        self.elapsed_us = 0.0;
        self.completion = completion;
    }

    pub fn advance(&mut self, us: f64) {
        if us > 0.0 {
            self.elapsed_us += us;
        }
    }

    pub fn poll(&mut self) -> TimedPoll {
        if self.elapsed_us < self.duration_us {
            TimedPoll::Running
        }
        else {
            TimedPoll::Complete(self.completion.take())
        }
    }

    pub fn cancel(&mut self) {
        self.duration_us = 0.0;
        self.elapsed_us = 0.0;
        self.completion = None;
    }

    pub fn is_running(&self) -> bool {
        self.elapsed_us < self.duration_us
    }

    pub fn pending(&self) -> Option<Completion> {
        self.completion
    }

    pub fn elapsed_us(&self) -> f64 {
        self.elapsed_us
    }
}
