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

//! Unit configuration and the ON/STOPPED/OFF state machine.

use crate::config::*;
use crate::dphy::{program_pll, program_speed, Calibration};
use crate::irq::arm_interrupts;
use crate::registers::*;
use crate::stats::write_dc_offsets;
use crate::unit::{CallbackTable, Unit, UnitState, VcState};
use crate::Csi2Driver;
use csi2_interface::*;
use log::{error, info, trace};

// PHY reset pulse and power-up settling, in delay loops.
const DPHY_CLEAR_DELAY: u32 = 15;
const DPHY_SETTLE_DELAY: u32 = 5;
// Below this rate (Mbps) the receiver needs a longer flush.
const FLUSH_CNT_FREQ_LIMIT: u32 = 200;
const FLUSH_CNT_SLOW: u8 = 7;
const FLUSH_CNT_FAST: u8 = 3;
// Trigger enables: 3 bits per VC for each of the two enable masks.
const TRIGGER_ENABLE_MASK: u32 = 0x7007;
const TRIGGER_ENABLE2_SHIFT: usize = 12;

fn must_be_first(unit: usize) -> Csi2Error {
    match unit {
        0 => Csi2Error::Unit0MustBeFirst,
        1 => Csi2Error::Unit1MustBeFirst,
        2 => Csi2Error::Unit2MustBeFirst,
        _ => Csi2Error::WrongUnitId,
    }
}

fn lane_swap(params: &InitParams) -> u32 {
    params
        .lanes_map_rx
        .iter()
        .enumerate()
        .fold(0, |acc, (i, &lane)| acc | ((lane as u32 & 0x3) << (2 * i)))
}

// Records the requested offsets of every channel of `vc` and the value to
// program for each. Returns true if any channel asks for auto-compute.
fn set_requested_offsets(vc: &mut VcState, params: &VcParams) -> bool {
    let complex = params.output_mode.contains(OutputMode::COMPLEX);
    let channels = real_channels(params.channels, params.output_mode).min(MAX_CHANNELS);
    let mut auto = false;
    for (ch, stat) in vc.stats[..channels].iter_mut().enumerate() {
        let req = match (complex, ch & 1) {
            (true, 0) => params.offset_comp_real[ch / 2],
            (true, _) => params.offset_comp_img[ch / 2],
            (false, _) => params.offset_comp_real[ch],
        };
        stat.req_dc = req;
        if req == OFFSET_AUTOCOMPUTE {
            stat.dc = 0;
            auto = true;
        } else {
            // Scaled within its own half so a negative even channel leaves
            // the odd channel's bits alone.
            stat.dc = req.wrapping_shl(4);
        }
    }
    auto
}

fn set_triggers(regs: &impl Csi2Registers, trigger: usize, enable: usize, vc: usize, mask: u8, ena1: u8, ena2: u8) {
    let shift = 8 * vc;
    regs.modify(trigger, |v| (v & !(0xff << shift)) | ((mask as u32) << shift));
    let shift = 3 * vc;
    let en = ((ena2 as u32 & 0x7) << TRIGGER_ENABLE2_SHIFT) | (ena1 as u32 & 0x7);
    regs.modify(enable, |v| (v & !(TRIGGER_ENABLE_MASK << shift)) | (en << shift));
}

// Programs circular buffer `buf`: buffers below MAX_VC carry the data of
// VC `buf`, the others the auxiliary data of VC `buf - MAX_VC`.
fn config_buffer(regs: &impl Csi2Registers, unit: &mut Unit, buf: usize, p: &VcParams) -> Result<(), Csi2Error> {
    let channels = real_channels(p.channels, p.output_mode);
    if p.channels == 0 || channels > MAX_CHANNELS {
        return Err(Csi2Error::InvalidChannelNr);
    }
    let fifth_ch = p.output_mode.contains(OutputMode::FIFTH_CH_ON);
    let wire_len = wire_line_length(p);
    let mut line_len = real_line_length(p.stream_type, p.channels, p.expected_samples, false);
    if buf >= MAX_VC && fifth_ch && p.output_mode.fifth_ch_mode() == OutputMode::FIFTH_CH_MODE_1.bits() {
        // Mode 1 interleaves the auxiliary samples into the data line.
        regs.write(cbuf(buf - MAX_VC, CBUF_INPLINELEN), wire_len);
    }

    if buf < MAX_VC {
        regs.modify(RX_VCENABLE, |v| v | (1 << buf));
        line_len = align_up(line_len, BUF_ALIGN);
        let needed = match unit.stat_policy {
            StatPolicy::No => line_len,
            _ => line_len + LINE_STAT_LENGTH,
        };
        if needed > p.buf_line_len as u32 {
            error!("vc {}: line needs {} bytes, buffer has {}", buf, needed, p.buf_line_len);
            return Err(Csi2Error::TooSmallBuffer);
        }
        let vc = &mut unit.vc[buf];
        vc.start(p);
        regs.write(rx_vc(buf, VC_CHNLENBL), (1 << vc.num_channels()) - 1);
        let swap = if p.stream_type == DataStreamType::FROM_8_TO_16 {
            OutputMode::SWAP_RAW8.bits()
        } else {
            0
        };
        regs.write(rx_vc(buf, VC_OUTCFG), ((swap | p.output_mode.bits()) >> 4) as u32);
    }

    // 16-bit output from RAW8 is received as plain RAW8.
    let dtype = match p.stream_type.base() {
        t if t == DataStreamType::FROM_8_TO_16.0 => DataStreamType::RAW8.0,
        t => t,
    };
    set_cbuf_config(
        regs,
        buf,
        CbufConfig::new()
            .with_dtype(dtype as u8)
            .with_bufnr((buf % MAX_VC) as u8)
            .with_fifth_ch(fifth_ch && buf >= MAX_VC),
    );
    regs.write(cbuf(buf, CBUF_SRTPTR), p.buf_addr as u32);
    regs.write(cbuf(buf, CBUF_NUMLINE), p.buf_num_lines as u32);
    regs.write(cbuf(buf, CBUF_BUFLEN), p.buf_line_len as u32);
    regs.write(cbuf(buf, CBUF_INPLINELEN), wire_len);
    regs.write(cbuf(buf, CBUF_NUMLINES_CONFIG), p.expected_lines as u32);
    regs.write(cbuf(buf, CBUF_LINELEN_CONFIG), line_len);
    if p.buf_num_lines_trigger != 0 {
        regs.write(cbuf(buf, CBUF_LPDI), p.buf_num_lines_trigger as u32);
    }
    if buf < MAX_VC {
        write_dc_offsets(&unit.vc[buf], buf, regs);
    }
    Ok(())
}

impl<P: Csi2Platform> Csi2Driver<P> {
    pub(crate) fn check_unit_id(&self, unit: usize) -> Result<(), Csi2Error> {
        if unit >= self.platform.num_units().min(MAX_UNITS) {
            error!("unit {} out of range", unit);
            return Err(Csi2Error::WrongUnitId);
        }
        Ok(())
    }

    // The unit's state, once it has been configured.
    pub(crate) fn initialized_state(&self, unit: usize) -> Result<UnitState, Csi2Error> {
        self.check_unit_id(unit)?;
        match self.units[unit].state {
            UnitState::NotInitialized => Err(Csi2Error::NotInitialized),
            state => Ok(state),
        }
    }

    fn regs(&self, unit: usize) -> Result<&P::Registers, Csi2Error> {
        self.platform.registers(unit).ok_or(Csi2Error::NotInitialized)
    }

    fn set_state(&mut self, unit: usize, state: UnitState) {
        info!("unit {}: {:?}", unit, state);
        self.units[unit].state = state;
    }

    // The hardware ignored a transition; nothing is known about the unit.
    fn hw_failure(&mut self, unit: usize) -> Csi2Error {
        error!("unit {}: no hardware response", unit);
        self.units[unit].reset();
        Csi2Error::HwResponseError
    }

    /// Validates `params` and brings the unit up with them. Any failure
    /// leaves the unit not initialized.
    pub fn configure(&mut self, unit: usize, params: &InitParams) -> Result<(), Csi2Error> {
        trace!("configure unit {}", unit);
        self.check_unit_id(unit)?;
        match self.program_unit(unit, params) {
            Ok(()) => {
                info!("unit {}: configured, {} lanes at {} Mbps", unit, params.num_lanes_rx, params.rx_clk_freq);
                Ok(())
            }
            Err(e) => {
                error!("unit {}: configure failed: {:?}", unit, e);
                self.units[unit].reset();
                Err(e)
            }
        }
    }

    fn program_unit(&mut self, unit: usize, params: &InitParams) -> Result<(), Csi2Error> {
        validate_init_params(params, self.platform.irq_core_allowed(params.irq_core))?;
        if let Some(first) = self.platform.required_predecessor(unit) {
            if !self.units.get(first).map_or(false, Unit::is_initialized) {
                return Err(must_be_first(first));
            }
        }
        self.units[unit].reset();

        let Csi2Driver { platform, units } = self;
        let state = &mut units[unit];
        let regs = platform.registers(unit).ok_or(Csi2Error::WrongUnitId)?;
        let lanes = (1u32 << params.num_lanes_rx) - 1;

        // Calibration results do not survive the PHY reset.
        let calibration = Calibration::read(regs);
        regs.write(RX_SR, SOFTRESET_BIT);
        regs.write(RX_SR, 0);
        regs.write(RX_RXNULANE, params.num_lanes_rx as u32);
        platform.clock_tilt();
        set_dphy_rstcfg(regs, DphyRstCfg::new());
        regs.write(DPHY_CLEAR, 1);
        platform.delay(DPHY_CLEAR_DELAY);
        regs.write(DPHY_CLEAR, 0);
        calibration.apply(regs);
        if platform.owns_pll(unit) {
            program_pll(regs);
        }
        program_speed(regs, params.rx_clk_freq);

        regs.write(TURNCFG, lanes);
        let flush = if params.rx_clk_freq < FLUSH_CNT_FREQ_LIMIT {
            FLUSH_CNT_SLOW
        } else {
            FLUSH_CNT_FAST
        };
        set_rx_enable(
            regs,
            RxEnable::new()
                .with_clk_lane_en(true)
                .with_data_lane_en(lanes as u8)
                .with_flush_cnt(flush),
        );
        regs.write(RX_RXLANESWAP, lane_swap(params));

        regs.write(RX_VCENABLE, 0);
        let mut auto_dc = false;
        for (vc, p) in state.vc.iter_mut().zip(params.vc.iter()) {
            if let Some(p) = p {
                auto_dc |= set_requested_offsets(vc, p);
            }
        }
        state.stat_policy = if auto_dc { params.stat_policy } else { StatPolicy::No };
        for vc in 0..MAX_VC {
            let p = match &params.vc[vc] {
                Some(p) => p,
                None => continue,
            };
            config_buffer(regs, state, vc, p)?;
            if !p.output_mode.contains(OutputMode::FIFTH_CH_ON) {
                continue;
            }
            if let Some(aux) = &params.aux[vc] {
                config_buffer(regs, state, vc + MAX_VC, aux)?;
                state.vc[vc].aux = Some(*aux);
            }
        }
        set_stat_config(regs, StatConfig::new().with_staten(state.stat_policy != StatPolicy::No));

        regs.write(DPHY_CALTYPE_CNTRL, 1);
        platform.delay(DPHY_SETTLE_DELAY);
        set_dphy_rstcfg(regs, get_dphy_rstcfg(regs).with_shutdwnz(true));
        platform.delay(DPHY_SETTLE_DELAY);
        set_dphy_rstcfg(regs, get_dphy_rstcfg(regs).with_rstz(true));

        for (vc, p) in params.vc.iter().enumerate() {
            if let Some(p) = p {
                set_triggers(regs, TRIGGER_GPIO1, TRIGGEREN_GPIO, vc, p.gpio1_mask, p.gpio1_ena, p.gpio2_ena);
                set_triggers(regs, TRIGGER_SDMA1, TRIGGEREN_SDMA, vc, p.sdma1_mask, p.sdma1_ena, p.sdma2_ena);
            }
        }

        arm_interrupts(regs, state);
        let registered = IrqClass::ALL
            .iter()
            .try_for_each(|&class| platform.register_irq(unit, class, params.irq_core, params.irq_priority));
        if let Some(regs) = platform.registers(unit) {
            regs.write(TURNCFG, 0);
        }
        registered?;

        state.params = Some(*params);
        state.callbacks = CallbackTable::resolve(&params.callbacks);
        self.set_state(unit, UnitState::On);
        Ok(())
    }

    /// Gates the receive clock; an ON unit becomes STOPPED.
    pub fn rx_stop(&mut self, unit: usize) -> Result<(), Csi2Error> {
        trace!("rx_stop unit {}", unit);
        match self.initialized_state(unit)? {
            UnitState::On | UnitState::Stopped => {}
            _ => return Err(Csi2Error::WrongState),
        }
        let regs = self.regs(unit)?;
        set_rx_enable(regs, get_rx_enable(regs).with_clk_lane_en(false));
        if get_rx_enable(regs).clk_lane_en() {
            return Err(self.hw_failure(unit));
        }
        self.set_state(unit, UnitState::Stopped);
        Ok(())
    }

    /// Ungates the receive clock of a STOPPED unit.
    pub fn rx_start(&mut self, unit: usize) -> Result<(), Csi2Error> {
        trace!("rx_start unit {}", unit);
        match self.initialized_state(unit)? {
            UnitState::On => return Ok(()),
            UnitState::Stopped => {}
            _ => return Err(Csi2Error::WrongState),
        }
        let regs = self.regs(unit)?;
        set_rx_enable(regs, get_rx_enable(regs).with_clk_lane_en(true));
        if !get_rx_enable(regs).clk_lane_en() {
            return Err(self.hw_failure(unit));
        }
        self.set_state(unit, UnitState::On);
        Ok(())
    }

    /// Stops reception if needed, then shuts the PHY down.
    pub fn power_off(&mut self, unit: usize) -> Result<(), Csi2Error> {
        trace!("power_off unit {}", unit);
        if self.initialized_state(unit)? != UnitState::Off {
            self.rx_stop(unit)?;
        }
        let regs = self.regs(unit)?;
        set_dphy_rstcfg(regs, get_dphy_rstcfg(regs).with_shutdwnz(false));
        if get_dphy_rstcfg(regs).shutdwnz() {
            return Err(self.hw_failure(unit));
        }
        self.set_state(unit, UnitState::Off);
        Ok(())
    }

    /// Brings an OFF unit back up with its last accepted configuration.
    pub fn power_on(&mut self, unit: usize) -> Result<(), Csi2Error> {
        trace!("power_on unit {}", unit);
        if self.initialized_state(unit)? != UnitState::Off {
            return Err(Csi2Error::WrongState);
        }
        let params = self.units[unit].params.ok_or(Csi2Error::NotInitialized)?;
        self.configure(unit, &params)
    }

    pub fn interface_status(&self, unit: usize) -> Result<InterfaceStatus, Csi2Error> {
        let state = self.initialized_state(unit)?;
        self.regs(unit)?;
        Ok(match state {
            UnitState::Off => InterfaceStatus::Off,
            UnitState::Stopped => InterfaceStatus::Stopped,
            _ => InterfaceStatus::On,
        })
    }

    /// Hardware view of data lane `lane`. A unit that is not ON reports
    /// why, unless its lane is still receiving, which is a state mismatch.
    pub fn lane_status(&self, unit: usize, lane: usize) -> Result<LaneStatus, Csi2Error> {
        self.check_unit_id(unit)?;
        if lane >= MAX_LANES {
            return Err(Csi2Error::InvalidLanesNr);
        }
        let state = self.initialized_state(unit)?;
        let regs = self.regs(unit)?;
        let cs = get_lane_cs(regs, lane);
        match state {
            UnitState::On => {}
            _ if cs.rxacth() || cs.rxvalh() => return Err(Csi2Error::WrongState),
            UnitState::Off => return Err(Csi2Error::PoweredOff),
            _ => return Err(Csi2Error::RxStopped),
        }
        if lane as u32 >= regs.read(RX_RXNULANE) {
            return Ok(LaneStatus::Off);
        }
        Ok(if cs.rxvalh() {
            LaneStatus::ValidReceiving
        } else if cs.rxacth() {
            LaneStatus::Receiving
        } else if cs.stop() {
            LaneStatus::Stop
        } else if cs.ulpa() {
            LaneStatus::UltraLowPower
        } else if cs.mark() {
            LaneStatus::Mark
        } else {
            LaneStatus::On
        })
    }
}
