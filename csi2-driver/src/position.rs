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

//! Where the next frame lands in a VC's circular buffer, and how many
//! frames have completed.

use crate::registers::{cbuf, CBUF_NXTLINE};
use crate::unit::{UnitState, VcState};
use crate::Csi2Driver;
use csi2_interface::*;
use log::trace;

impl<P: Csi2Platform> Csi2Driver<P> {
    fn vc_state(&self, unit: usize, vc: usize) -> Result<&VcState, Csi2Error> {
        self.check_unit_id(unit)?;
        self.units[unit].vc.get(vc).ok_or(Csi2Error::InvalidVcParams)
    }

    /// Buffer line the next frame of `vc` starts at. Meant to be called
    /// between frames, with the unit ON.
    pub fn first_line_pos(&self, unit: usize, vc: usize) -> Result<u32, Csi2Error> {
        self.vc_state(unit, vc)?;
        match self.units[unit].state {
            UnitState::On => {}
            UnitState::Off => return Err(Csi2Error::PoweredOff),
            UnitState::Stopped => return Err(Csi2Error::RxStopped),
            UnitState::NotInitialized => return Err(Csi2Error::NotInitialized),
        }
        let params = self.units[unit].vc[vc].params.ok_or(Csi2Error::InvalidVcParams)?;
        let regs = self.platform.registers(unit).ok_or(Csi2Error::NotInitialized)?;
        // The hardware points one past the line it will write next; a value
        // past the buffer end is clamped to the last line.
        let last = (params.buf_num_lines as u32).saturating_sub(1);
        let line = regs.read(cbuf(vc, CBUF_NXTLINE)).saturating_sub(1).min(last);
        trace!("unit {} vc {} first line {}", unit, vc, line);
        Ok(line)
    }

    /// Byte offset from the buffer start matching [`Self::first_line_pos`].
    /// The line is within the buffer, so the product fits the buffer size.
    pub fn first_byte_offset(&self, unit: usize, vc: usize) -> Result<u32, Csi2Error> {
        let line = self.first_line_pos(unit, vc)?;
        let line_len = self.vc_state(unit, vc)?.params.map_or(0, |p| p.buf_line_len as u32);
        Ok(line * line_len)
    }

    /// Frames completed on `vc` since it was configured.
    pub fn frames_counter(&self, unit: usize, vc: usize) -> Result<u32, Csi2Error> {
        Ok(self.vc_state(unit, vc)?.frames)
    }

    /// Frames completed on the auxiliary buffer of `vc`.
    pub fn aux_frames_counter(&self, unit: usize, vc: usize) -> Result<u32, Csi2Error> {
        Ok(self.vc_state(unit, vc)?.aux_frames)
    }
}
