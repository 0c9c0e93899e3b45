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

//! Interrupt handlers.
//!
//! Every handler reads its status registers and writes the value back to
//! clear exactly the bits it saw, decodes them into a fresh [`Csi2Report`]
//! and hands that to the callback of its class. A handler that finds
//! nothing it can decode reports a spurious condition instead, so no
//! interrupt goes unreported. Handlers for a unit with no register block
//! do nothing.

use crate::registers::*;
use crate::stats::{accumulate_line, finalize_frame, BufferView};
use crate::unit::Unit;
use crate::Csi2Driver;
use arrayvec::ArrayVec;
use csi2_interface::*;
use log::trace;

const PHY_LANE_MASK: u32 = (1 << PHY_ERR_BITS_PER_LANE) - 1;
const PACKET_ERR_MASK: u32 = 0x3f;
const PACKET_ERR_SHIFT: usize = 6;
const LINE_LEN_ERR: u32 = 1 << 0;
const LINE_CNT_ERR: u32 = 1 << 1;
const CBUF_VC_MASK: u32 = (1 << CBUF_ERR_BITS_PER_VC) - 1;

/// Folds the per-lane PHY error bits into one mask; lanes are not told
/// apart in the report.
pub fn phy_errors(status: u32) -> ErrorMask {
    (0..MAX_LANES).fold(ErrorMask::empty(), |mask, lane| {
        let bits = (status >> (lane * PHY_ERR_BITS_PER_LANE)) & PHY_LANE_MASK;
        mask | ErrorMask::from_bits_truncate(bits)
    })
}

pub fn packet_errors(status: PacketErr) -> ErrorMask {
    let bits = u32::from_ne_bytes(status.into_bytes()) & PACKET_ERR_MASK;
    ErrorMask::from_bits_truncate(bits << PACKET_ERR_SHIFT)
}

// Line length/count errors of circular buffer `buf`, reported on `vc`.
fn line_errors(regs: &impl Csi2Registers, buf: usize, vc: usize, bits: u32, report: &mut Csi2Report) {
    if bits & LINE_LEN_ERR != 0 {
        report.err_mask_vc[vc] |= ErrorMask::LINE_LEN;
        report.line_length_err[vc] = LineLengthErr {
            line_pos: regs.read(cbuf(buf, CBUF_ERRLINE)) as u16,
            line_length: regs.read(cbuf(buf, CBUF_ERRLEN)) as u16,
        };
    }
    if bits & LINE_CNT_ERR != 0 {
        report.err_mask_vc[vc] |= ErrorMask::LINE_CNT;
        report.line_length_err[vc].line_pos = regs.read(cbuf(buf, CBUF_RXLINE)) as u16;
    }
}

/// Programs the interrupt enables for the VCs configured on `unit`.
pub fn arm_interrupts(regs: &impl Csi2Registers, unit: &Unit) {
    // Events: frame end is always needed for the frame bookkeeping.
    let mut vc_enable = 0u32;
    let mut line_done = unit.stat_policy == StatPolicy::EveryLine;
    for (vc_id, vc) in unit.vc.iter().enumerate() {
        if !vc.is_active() {
            continue;
        }
        let mut req = vc.events_req | EventMask::FRAME_END;
        if let Some(aux) = vc.aux {
            req |= aux.events_req;
        }
        line_done |= req.contains(EventMask::LINE_END);
        let bits = req & (EventMask::FRAME_START | EventMask::FRAME_END | EventMask::SHORT_PACKET);
        vc_enable |= (bits.bits() as u32) << (vc_id * VC_EVT_BITS_PER_VC);
    }
    regs.write(RX_VCINTRE, vc_enable);

    // Rx errors.
    regs.write(RX_PHYERRIE, !0);
    for (vc_id, vc) in unit.vc.iter().enumerate() {
        let enable = if vc.is_active() { PACKET_ERR_MASK } else { 0 };
        regs.write(rx_vc(vc_id, VC_PPERRIE), enable);
    }

    // Path errors.
    regs.write(CONTROLLER_ERR_IE, !0);
    set_wr_chnl_intr_enable(regs, WrChnlIntr::new().with_buffovf(true).with_errresp(true));
    set_chnl_intr_enable(regs, ChnlIntr::new().with_linedone(line_done).with_buffovf(true));
    let mut cbuf_enable = 0u32;
    for (vc_id, vc) in unit.vc.iter().enumerate() {
        if vc.is_active() {
            cbuf_enable |= CBUF_VC_MASK << (vc_id * CBUF_ERR_BITS_PER_VC);
        }
        if vc.aux.is_some() {
            cbuf_enable |= CBUF_VC_MASK << (CBUF_AUX_SHIFT + vc_id * CBUF_ERR_BITS_PER_VC);
        }
    }
    regs.write(CBUF_INTRE, cbuf_enable);
}

impl<P: Csi2Platform> Csi2Driver<P> {
    /// Entry point for all interrupts of `unit`.
    pub fn handle_irq(&mut self, unit: usize, class: IrqClass) {
        match class {
            IrqClass::RxErr => self.handle_rx_err(unit),
            IrqClass::PathErr => self.handle_path_err(unit),
            IrqClass::Events => self.handle_events(unit),
            IrqClass::TxErr => self.handle_tx_err(unit),
        }
    }

    /// PHY errors at unit level, packet errors per VC.
    pub fn handle_rx_err(&mut self, unit: usize) {
        let (regs, state) = match (self.platform.registers(unit), self.units.get(unit)) {
            (Some(regs), Some(state)) => (regs, state),
            _ => return,
        };
        let mut report = Csi2Report::new(unit);

        let status = regs.read(RX_PHYERRIS);
        regs.write(RX_PHYERRIS, status);
        trace!("unit {} phy errors {:#x}", unit, status);
        report.err_mask_u = phy_errors(status);
        let mut to_call = !report.err_mask_u.is_empty();

        for vc in 0..MAX_VC {
            let err = get_packet_err_status(regs, vc);
            set_packet_err_status(regs, vc, err);
            let vc_state = &state.vc[vc];
            if !vc_state.is_active() && vc_state.aux.is_none() {
                continue;
            }
            let mask = packet_errors(err);
            if err.ecc1() {
                report.ecc_one_bit_pos[vc] = regs.read(rx_vc(vc, VC_ERRPOS)) as u8;
            }
            if err.crc() {
                let crc = get_crc(regs, vc);
                report.expected_crc[vc] = crc.expected();
                report.received_crc[vc] = crc.received();
            }
            if err.invalid_id() {
                let id = get_invalid_id(regs);
                if id.vcid() as usize == vc {
                    report.invalid_packet_id[vc] = id.dtype();
                }
            }
            report.err_mask_vc[vc] = mask;
            report.err_mask_u |= mask;
            to_call |= !mask.is_empty();
        }

        if !to_call {
            report.err_mask_u = ErrorMask::SPURIOUS_PHY;
        }
        if let Some(callbacks) = state.callbacks {
            callbacks.dispatch(IrqClass::RxErr, &report);
        }
    }

    /// Buffer, AXI and controller errors at unit level, line errors per VC.
    pub fn handle_path_err(&mut self, unit: usize) {
        let (regs, state) = match (self.platform.registers(unit), self.units.get(unit)) {
            (Some(regs), Some(state)) => (regs, state),
            _ => return,
        };
        let mut report = Csi2Report::new(unit);

        // Line done belongs to the events handler.
        let chnl = get_chnl_intr_status(regs);
        set_chnl_intr_status(regs, ChnlIntr::new().with_buffovf(chnl.buffovf()));
        if chnl.buffovf() {
            report.err_mask_u |= ErrorMask::BUF_OVERFLOW;
        }
        let wr = get_wr_chnl_intr_status(regs);
        set_wr_chnl_intr_status(regs, wr);
        if wr.buffovf() {
            report.err_mask_u |= ErrorMask::AXI_OVERFLOW;
        }
        if wr.errresp() {
            report.err_mask_u |= ErrorMask::AXI_RESPONSE;
        }
        let ctrl = get_controller_err_status(regs);
        set_controller_err_status(regs, ctrl);
        if ctrl.fifo_ovf() {
            report.err_mask_u |= ErrorMask::FIFO;
        }
        if ctrl.exit_hs() {
            report.err_mask_u |= ErrorMask::HS_EXIT;
        }
        let mut to_call = !report.err_mask_u.is_empty();

        let status = regs.read(CBUF_INTRS);
        regs.write(CBUF_INTRS, status);
        trace!("unit {} line errors {:#x}", unit, status);
        for vc in 0..MAX_VC {
            let vc_state = &state.vc[vc];
            if vc_state.is_active() {
                let bits = (status >> (vc * CBUF_ERR_BITS_PER_VC)) & CBUF_VC_MASK;
                line_errors(regs, vc, vc, bits, &mut report);
            }
            if vc_state.aux.is_some() {
                let bits = (status >> (CBUF_AUX_SHIFT + vc * CBUF_ERR_BITS_PER_VC)) & CBUF_VC_MASK;
                line_errors(regs, vc + MAX_VC, vc, bits, &mut report);
            }
            report.err_mask_u |= report.err_mask_vc[vc];
            to_call |= !report.err_mask_vc[vc].is_empty();
        }

        if !to_call {
            report.err_mask_u = ErrorMask::SPURIOUS_PKT;
        }
        if let Some(callbacks) = state.callbacks {
            callbacks.dispatch(IrqClass::PathErr, &report);
        }
    }

    /// Line done, frame start/end and short packets.
    pub fn handle_events(&mut self, unit: usize) {
        let platform = &self.platform;
        let (regs, state) = match (platform.registers(unit), self.units.get_mut(unit)) {
            (Some(regs), Some(state)) => (regs, state),
            _ => return,
        };
        let mut report = Csi2Report::new(unit);

        let chnl = get_chnl_intr_status(regs);
        set_chnl_intr_status(regs, ChnlIntr::new().with_linedone(chnl.linedone()));
        let vc_status = regs.read(RX_VCINTRS);
        regs.write(RX_VCINTRS, vc_status);
        trace!("unit {} events {:#x} line done {}", unit, vc_status, chnl.linedone());
        let callbacks = match state.callbacks {
            Some(callbacks) => callbacks,
            None => return,
        };
        let policy = state.stat_policy;
        let mut optional = chnl.linedone();
        let mut to_call = false;

        if chnl.linedone() {
            let vc_id = get_data_id(regs).vcid() as usize;
            let vc = &mut state.vc[vc_id];
            let next = vc.last_chirp.wrapping_add(1);
            if let Some(params) = vc.params {
                let trigger = params.buf_num_lines_trigger as u32;
                if params.events_req.contains(EventMask::LINE_END) && trigger != 0 && next % trigger == 0 {
                    // Reported right away; a frame end in the same
                    // interrupt gets its own callback below.
                    report.evt_mask_vc[vc_id] = EventMask::LINE_END;
                    callbacks.dispatch(IrqClass::Events, &report);
                    report.evt_mask_vc[vc_id] = EventMask::empty();
                }
                vc.last_chirp = next;
                if policy == StatPolicy::EveryLine {
                    let line = vc.last_buf_line;
                    accumulate_line(vc, &BufferView::new(platform, &params), line);
                }
                vc.next_buf_line();
            }
        }

        let mut frame_ends = ArrayVec::<usize, MAX_VC>::new();
        for (vc_id, vc) in state.vc.iter_mut().enumerate() {
            let ev = vc_events(vc_status, vc_id);
            let raw = EventMask::from_bits_truncate(ev.into_bytes()[0]);
            if let Some(params) = vc.params {
                if !raw.is_empty() {
                    optional = true;
                    if ev.frame_start() {
                        vc.last_chirp = 0;
                    }
                    if ev.frame_end() {
                        vc.last_chirp = 0;
                        frame_ends.push(vc_id);
                    }
                    if ev.short_packet() {
                        let sp = get_short_packet(regs, vc_id);
                        report.short_packets[vc_id] = ShortPacket {
                            data_id: sp.data_id(),
                            data: sp.data(),
                        };
                    }
                    let req = raw & params.events_req;
                    if !req.is_empty() {
                        report.evt_mask_vc[vc_id] |= req;
                        to_call = true;
                    }
                }
            }
            if let Some(aux) = vc.aux {
                if raw.intersects(aux.events_req) {
                    vc.count_aux_frame();
                    report.evt_mask_vc[vc_id] |= EventMask::FRAME_END;
                    to_call = true;
                }
            }
        }

        for &vc_id in frame_ends.iter() {
            let vc = &mut state.vc[vc_id];
            let lines = match policy {
                StatPolicy::No => None,
                StatPolicy::EveryLine => Some(0),
                StatPolicy::AtFrameEnd => vc.params.map(|p| p.buf_num_lines),
                StatPolicy::LastLine => Some(1),
            };
            if let (Some(params), Some(lines)) = (vc.params, lines) {
                let view = BufferView::new(platform, &params);
                for line in 0..lines {
                    accumulate_line(vc, &view, line);
                }
                let stuck = finalize_frame(vc, vc_id, policy, regs, &mut report);
                vc.last_chirp = 0;
                vc.last_buf_line = 0;
                if stuck && params.events_req.contains(EventMask::BIT_NOT_TOGGLE) {
                    report.evt_mask_vc[vc_id] |= EventMask::BIT_NOT_TOGGLE;
                    to_call = true;
                }
            }
            vc.count_frame();
        }

        if !to_call && !optional {
            report.err_mask_u |= ErrorMask::SPURIOUS_EVT;
            to_call = true;
        }
        if to_call {
            callbacks.dispatch(IrqClass::Events, &report);
        }
    }

    /// Transmit errors are registered but carry nothing to decode.
    pub fn handle_tx_err(&mut self, unit: usize) {
        trace!("unit {} tx irq", unit);
    }
}
