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

//! Statistics engine: folds the per-line trailers the hardware appends to
//! every buffer line into per-channel frame statistics, and at frame end
//! turns them into DC offsets and a stuck-bit report.

use crate::registers::{chnl_offset, ChannelStat, CHANNEL_STAT_SIZE};
use crate::unit::VcState;
use csi2_interface::*;
use log::trace;

/// Divides each trailer sum as it is accumulated.
pub const SUM_ADJUST: i64 = 1;
/// Scales the mean sample into the offset register format.
pub const DC_ADJUST: i64 = 4;
/// Sample bits expected to toggle during a frame.
pub const TOGGLE_MASK: u16 = 0xfff0;

/// Read-only window over a VC's circular buffer.
pub struct BufferView<'a, P: Csi2Platform + ?Sized> {
    platform: &'a P,
    base: usize,
    len: usize,
}
impl<'a, P: Csi2Platform + ?Sized> BufferView<'a, P> {
    pub fn new(platform: &'a P, params: &VcParams) -> Self {
        BufferView {
            platform,
            base: params.buf_addr,
            len: params.buf_num_lines as usize * params.buf_line_len as usize,
        }
    }

    /// The channel record at byte `offset`, None if it would run past the
    /// end of the buffer.
    pub fn read_stat(&self, offset: usize) -> Option<ChannelStat> {
        if offset.checked_add(CHANNEL_STAT_SIZE)? > self.len {
            return None;
        }
        let mut raw = [0u8; CHANNEL_STAT_SIZE];
        self.platform.read_memory(self.base + offset, &mut raw);
        Some(ChannelStat::from_bytes(raw))
    }
}

/// Byte offset of the statistics trailer of buffer `line`. The trailer
/// follows the samples of all channels.
pub fn trailer_offset(params: &VcParams, line: u16) -> usize {
    let channels = crate::config::real_channels(params.channels, params.output_mode);
    line as usize * params.buf_line_len as usize + channels * 2 * params.expected_samples as usize
}

/// Folds the trailer of buffer `line` into the channel statistics.
pub fn accumulate_line<P: Csi2Platform + ?Sized>(vc: &mut VcState, view: &BufferView<P>, line: u16) {
    let params = match vc.params {
        Some(params) => params,
        None => return,
    };
    let line = line % params.buf_num_lines.max(1);
    let offset = trailer_offset(&params, line);
    let channels = vc.num_channels();
    for (ch, stat) in vc.stats[..channels].iter_mut().enumerate() {
        let record = match view.read_stat(offset + ch * CHANNEL_STAT_SIZE) {
            Some(record) => record,
            None => continue,
        };
        // The hardware sum is a 32-bit two's complement value.
        stat.sum += record.sum() as i32 as i64 / SUM_ADJUST;
        stat.toggle |= record.toggle();
        stat.min = stat.min.min(record.min() as i16);
        stat.max = stat.max.max(record.max() as i16);
    }
}

/// Closes the frame on VC `vc_id`: recomputes auto DC offsets and writes
/// all offsets back, reports bits that never toggled, and clears the
/// accumulators. Returns true if any channel has a stuck bit.
pub fn finalize_frame(
    vc: &mut VcState,
    vc_id: usize,
    policy: StatPolicy,
    regs: &impl Csi2Registers,
    report: &mut Csi2Report,
) -> bool {
    let params = match vc.params {
        Some(params) => params,
        None => return false,
    };
    let mut div = params.expected_samples as i64;
    match policy {
        StatPolicy::EveryLine => div *= params.expected_lines as i64,
        StatPolicy::AtFrameEnd => div *= params.buf_num_lines as i64,
        _ => {}
    }
    let div = div.max(1);

    let channels = vc.num_channels();
    let mode = vc.output_mode;
    let mut stuck = false;
    for (ch, stat) in vc.stats[..channels].iter_mut().enumerate() {
        if stat.req_dc == OFFSET_AUTOCOMPUTE {
            // Truncate at the division, then scale.
            stat.dc = ((stat.sum / div) * DC_ADJUST) as i16;
        }
        let not_toggled = !stat.toggle & TOGGLE_MASK;
        report.not_toggled_bits[ch] = not_toggled;
        stuck |= not_toggled != 0;
        stat.reset(mode);
    }
    write_dc_offsets(vc, vc_id, regs);
    trace!("vc {} frame closed, stuck bits {}", vc_id, stuck);
    stuck
}

/// Writes the programmed offsets of `vc` to its DC compensation registers,
/// two channels per register with the even channel in the low half. For
/// complex data this puts the real and imaginary part of one channel in
/// the same register.
pub fn write_dc_offsets(vc: &VcState, vc_id: usize, regs: &impl Csi2Registers) {
    let channels = vc.num_channels();
    for (i, pair) in vc.stats[..channels].chunks(2).enumerate() {
        let value = pair
            .iter()
            .enumerate()
            .fold(0u32, |acc, (half, stat)| acc | (stat.dc as u16 as u32) << (16 * half));
        regs.write(chnl_offset(vc_id) + 4 * i, value);
    }
}
