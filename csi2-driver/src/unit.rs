// Copyright 2022 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Per-unit and per-VC runtime state.

use csi2_interface::*;

#[derive(Debug, Default, Eq, PartialEq, Copy, Clone)]
pub enum UnitState {
    #[default]
    NotInitialized,
    On,
    Stopped,
    Off,
}

// Running extremes start at the opposite end of the sample range.
const MAX_START_SIGNED: i16 = 0xc000u16 as i16;
const MIN_START_SIGNED: i16 = 0x7ff8;
const MAX_START_FLIPPED: i16 = 0;
const MIN_START_FLIPPED: i16 = 0xffffu16 as i16;

/// Statistics gathered for one channel over a frame.
#[derive(Debug, Default, Eq, PartialEq, Copy, Clone)]
pub struct ChannelStats {
    pub sum: i64,
    pub min: i16,
    pub max: i16,
    /// Bit set: that bit changed at least once.
    pub toggle: u16,
    /// Offset currently programmed.
    pub dc: i16,
    /// Offset asked for, or OFFSET_AUTOCOMPUTE.
    pub req_dc: i16,
}
impl ChannelStats {
    /// Clears the frame accumulators; the offsets are kept.
    pub fn reset(&mut self, mode: OutputMode) {
        self.sum = 0;
        self.toggle = 0;
        if mode.contains(OutputMode::FLIP_SIGN) {
            self.max = MAX_START_FLIPPED;
            self.min = MIN_START_FLIPPED;
        } else {
            self.max = MAX_START_SIGNED;
            self.min = MIN_START_SIGNED;
        }
    }
}

#[derive(Debug, Default, Copy, Clone)]
pub struct VcState {
    /// None for a VC that was not configured.
    pub params: Option<VcParams>,
    pub aux: Option<VcParams>,
    pub output_mode: OutputMode,
    pub events_req: EventMask,
    /// Buffer line the hardware fills next.
    pub last_buf_line: u16,
    /// Lines received since frame start.
    pub last_chirp: u32,
    pub frames: u32,
    /// Frames completed on the auxiliary flow.
    pub aux_frames: u32,
    pub stats: [ChannelStats; MAX_CHANNELS],
}
impl VcState {
    pub fn is_active(&self) -> bool { self.params.is_some() }

    /// Channels delivered by hardware, capped to the statistics records.
    pub fn num_channels(&self) -> usize {
        self.params.map_or(0, |p| {
            crate::config::real_channels(p.channels, p.output_mode).min(MAX_CHANNELS)
        })
    }

    /// Sets up runtime state for `params`; the requested offsets in
    /// `stats` survive.
    pub fn start(&mut self, params: &VcParams) {
        self.params = Some(*params);
        self.output_mode = params.output_mode;
        self.events_req = params.events_req;
        self.last_buf_line = 0;
        self.last_chirp = params.expected_lines as u32;
        self.frames = 0;
        self.aux_frames = 0;
        for stat in self.stats.iter_mut() {
            stat.reset(params.output_mode);
        }
    }

    /// Advances to the next line of the circular buffer.
    pub fn next_buf_line(&mut self) {
        let lines = self.params.map_or(1, |p| p.buf_num_lines.max(1));
        self.last_buf_line = (self.last_buf_line + 1) % lines;
    }

    /// Counts a completed frame; never reports u32::MAX.
    pub fn count_frame(&mut self) { self.frames = next_frame(self.frames); }
    pub fn count_aux_frame(&mut self) { self.aux_frames = next_frame(self.aux_frames); }
}

fn next_frame(frames: u32) -> u32 {
    match frames.wrapping_add(1) {
        u32::MAX => 0,
        n => n,
    }
}

/// Callbacks per interrupt class, with unset classes already resolved to
/// the Rx error callback.
#[derive(Copy, Clone)]
pub struct CallbackTable([Csi2Callback; MAX_IRQ_CLASSES]);
impl CallbackTable {
    /// None if no Rx error callback was supplied.
    pub fn resolve(callbacks: &[Option<Csi2Callback>; MAX_IRQ_CLASSES]) -> Option<Self> {
        let fallback = callbacks[IrqClass::RxErr as usize]?;
        let mut table = [fallback; MAX_IRQ_CLASSES];
        for (slot, cb) in table.iter_mut().zip(callbacks.iter()) {
            if let Some(cb) = cb {
                *slot = *cb;
            }
        }
        Some(CallbackTable(table))
    }
    pub fn get(&self, class: IrqClass) -> Csi2Callback { self.0[class as usize] }
    pub fn dispatch(&self, class: IrqClass, report: &Csi2Report) { (self.get(class))(report) }
}

#[derive(Default)]
pub struct Unit {
    pub state: UnitState,
    /// Last accepted configuration, replayed by power on.
    pub params: Option<InitParams>,
    pub stat_policy: StatPolicy,
    pub callbacks: Option<CallbackTable>,
    pub vc: [VcState; MAX_VC],
}
impl Unit {
    pub fn is_initialized(&self) -> bool { self.state != UnitState::NotInitialized }

    /// Drops all runtime state, as if never configured.
    pub fn reset(&mut self) {
        self.state = UnitState::NotInitialized;
        self.stat_policy = StatPolicy::No;
        self.callbacks = None;
        self.vc = Default::default();
    }
}
