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

    frontend_common::timestep_manager::mod.rs

    Supplies the elapsed time for each bus poll and keeps poll statistics.
*/

use web_time::{Duration, Instant};

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Timestep {
    /// Every poll advances emulated time by the same amount.
    Fixed(f64),
    /// Each poll advances emulated time by the wall clock time since the previous poll.
    WallClock,
}

#[derive(Copy, Clone, Default)]
pub struct PerfCounter {
    pub accum: u32, // Count accumulator
    pub total: u32, // Total count this timespan
    pub last:  u32, // Total count for last timespan
}

impl PerfCounter {
    #[inline]
    pub fn tick(&mut self) {
        self.accum += 1;
    }
    #[inline]
    pub fn mark_interval(&mut self) {
        self.last = self.total;
        self.total = self.accum;
        self.accum = 0;
    }
}

pub struct TimestepManager {
    mode: Timestep,
    last_poll: Option<Instant>,
    last_second: Instant,
    polls: u64,
    elapsed_us: f64,
    pub polls_per_second: PerfCounter,
}

impl TimestepManager {
    /// Use a fixed step when one is configured, else the wall clock.
    pub fn new(timestep_us: Option<f64>) -> Self {
        let mode = match timestep_us {
            Some(us) if us > 0.0 => Timestep::Fixed(us),
            Some(us) => {
                log::warn!("Ignoring invalid timestep {}us, using wall clock time", us);
                Timestep::WallClock
            }
            None => Timestep::WallClock,
        };
        log::debug!("Timestep mode: {:?}", mode);
        Self {
            mode,
            last_poll: None,
            last_second: Instant::now(),
            polls: 0,
            elapsed_us: 0.0,
            polls_per_second: PerfCounter::default(),
        }
    }

    pub fn mode(&self) -> Timestep {
        self.mode
    }

    /// Time in microseconds to pass to the next poll.
    pub fn next_step(&mut self) -> f64 {
        let now = Instant::now();
        let step_us = match self.mode {
            Timestep::Fixed(us) => us,
            Timestep::WallClock => match self.last_poll {
                Some(last) => now.duration_since(last).as_secs_f64() * 1_000_000.0,
                None => 0.0,
            },
        };
        self.last_poll = Some(now);

        self.polls += 1;
        self.elapsed_us += step_us;
        self.polls_per_second.tick();
        if now.duration_since(self.last_second) >= Duration::from_secs(1) {
            self.polls_per_second.mark_interval();
            self.last_second = now;
        }
        step_us
    }

    pub fn polls(&self) -> u64 {
        self.polls
    }

    /// Total emulated time handed out so far.
    pub fn elapsed_us(&self) -> f64 {
        self.elapsed_us
    }
}
