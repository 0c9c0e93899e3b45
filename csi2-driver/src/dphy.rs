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

//! D-PHY speed programming and calibration override.

use crate::registers::*;
use csi2_interface::Csi2Registers;
use log::trace;
use static_assertions::const_assert_eq;

pub const NUM_SPEEDS: usize = 63;

/// Programmable operating speeds, Mbps.
pub const SPEED_TABLE: [u16; NUM_SPEEDS] = [
    80, 90, 100, 110, 120, 130, 140, 150, 160, 170, 180, 190, 205, 220, 235, 250, //
    275, 300, 325, 350, 400, 450, 500, 550, 600, 650, 700, 750, 800, 850, 900, 950, //
    1000, 1050, 1100, 1150, 1200, 1250, 1300, 1350, 1400, 1450, 1500, 1550, 1600, 1650, 1700, 1750,
    1800, 1850, 1900, 1950, 2000, 2050, 2100, 2150, 2200, 2250, 2300, 2350, 2400, 2450, 2500,
];

/// HSFREQRNG code for each entry of SPEED_TABLE.
pub const HSFREQRNG_TABLE: [u8; NUM_SPEEDS] = [
    0, 16, 32, 48, 1, 17, 33, 49, 2, 18, 34, 50, 3, 19, 35, 51, //
    4, 20, 37, 53, 37, 22, 38, 55, 7, 24, 40, 57, 9, 25, 41, 58, //
    10, 26, 42, 59, 11, 27, 43, 60, 12, 28, 44, 61, 13, 29, 46, 62, //
    14, 30, 47, 63, 15, 64, 65, 66, 67, 68, 69, 70, 71, 72, 73,
];

/// DDL oscillator target for each entry of SPEED_TABLE.
pub const OSC_TARGET_TABLE: [u16; NUM_SPEEDS] = [
    489, 489, 489, 489, 489, 489, 489, 489, 489, 489, 489, 489, 489, 489, 489, 489, //
    489, 489, 489, 489, 489, 489, 489, 489, 489, 489, 489, 489, 489, 489, 489, 489, //
    489, 489, 489, 489, 489, 489, 489, 489, 489, 489, 489, 303, 313, 323, 333, 342, //
    352, 362, 372, 381, 391, 401, 411, 420, 430, 440, 450, 459, 469, 479, 489,
];

const_assert_eq!(SPEED_TABLE.len(), HSFREQRNG_TABLE.len());
const_assert_eq!(SPEED_TABLE.len(), OSC_TARGET_TABLE.len());

const ATB_VBE_SEL: u32 = 2;
const CB_VBE_SEL: u32 = 2;
const CLOCK_LANE_CNTRL: u32 = 1;
const CLKFREQRNG: u8 = 0xc;
const PLL_VREF: u32 = 3;

/// Index of the table entry nearest to `speed`. The first entry not below
/// `speed` wins unless its predecessor is strictly closer; speeds past the
/// end map to the last entry.
pub fn speed_index(speed: u32) -> usize {
    match SPEED_TABLE.iter().position(|&s| speed <= s as u32) {
        Some(0) => 0,
        Some(i) => {
            let below = speed - SPEED_TABLE[i - 1] as u32;
            let above = SPEED_TABLE[i] as u32 - speed;
            if below < above {
                i - 1
            } else {
                i
            }
        }
        None => NUM_SPEEDS - 1,
    }
}

/// Programs the frequency range and the DDL oscillator for `rx_clk_freq`.
pub fn program_speed(regs: &impl Csi2Registers, rx_clk_freq: u32) {
    let i = speed_index(rx_clk_freq);
    let osc = OSC_TARGET_TABLE[i] as u32;
    trace!("speed {} -> entry {} hsfreqrng {} osc {}", rx_clk_freq, i, HSFREQRNG_TABLE[i], osc);

    set_dphy_freqcfg(regs, DphyFreqCfg::new().with_hsfreqrng(HSFREQRNG_TABLE[i]));
    regs.write(DPHY_ATB_CB_ATB_VBE_SEL, ATB_VBE_SEL);
    regs.write(DPHY_CB_VBE_SEL, CB_VBE_SEL);
    regs.write(DPHY_CLOCK_LANE_CNTRL, CLOCK_LANE_CNTRL);
    regs.write(DPHY_DDLOSCFREQ_CFG1, osc & 0xff);
    regs.write(DPHY_DDLOSCFREQ_CFG2, osc >> 8);
    regs.write(DPHY_DDLOSCFREQ_OVREN, 1);
    let freq = get_dphy_freqcfg(regs).with_clkfreqrng(CLKFREQRNG);
    set_dphy_freqcfg(regs, freq);
}

/// Reference voltage of the PLL; only written by the unit owning it.
pub fn program_pll(regs: &impl Csi2Registers) { regs.write(DPHY_PLL_VREF_CONFIG, PLL_VREF); }

/// Calibration results left in the PHY test interface by a previous run.
#[derive(Debug, Default, Eq, PartialEq, Copy, Clone)]
pub struct Calibration {
    pub data_lanes: [u8; 4],
    pub clock: u8,
    pub termination: u8,
}
impl Calibration {
    /// Samples the calibration values; must run before the PHY is reset.
    pub fn read(regs: &impl Csi2Registers) -> Self {
        let mut data_lanes = [0u8; 4];
        for (val, &reg) in data_lanes.iter_mut().zip(DPHY_DATAL_OFFSETCAL_VALUE.iter()) {
            *val = regs.read_byte(dphy_test(reg));
        }
        Calibration {
            data_lanes,
            clock: regs.read_byte(dphy_test(DPHY_CLKCALVAL_COMPS)),
            termination: regs.read_byte(dphy_test(DPHY_TX_TERM_CAL)),
        }
    }

    /// True if a previous calibration left anything to reuse.
    pub fn is_valid(&self) -> bool { self.clock != 0 || self.data_lanes.iter().any(|&v| v != 0) }

    /// Writes the saved values back as overrides, skipping the startup
    /// calibration. No-op when nothing was saved.
    pub fn apply(&self, regs: &impl Csi2Registers) {
        if !self.is_valid() {
            return;
        }
        trace!("reusing calibration {:?}", self);
        regs.write_byte(dphy_test(DPHY_TX_RDWR_TERM_CAL_0), 0x3 + ((self.termination & 0x3c) << 2));
        regs.write_byte(dphy_test(DPHY_TX_RDWR_TERM_CAL_1), 0x1);
        regs.write_byte(dphy_test(DPHY_CLKOFFSETCAL_OVRRIDE), 0x1);
        regs.write_byte(dphy_test(DPHY_CLKOFFSETCAL_OVRRIDEVAL), self.clock & 0x7f);
        for (i, &val) in self.data_lanes.iter().enumerate() {
            regs.write_byte(dphy_test(DPHY_DATAL_OFFSETCAL_OVRVALUE[i]), ((val & 0x7f) << 1) + 1);
        }
        for &reg in DPHY_DATAL_OFFSETCAL_OVRCNTRL.iter() {
            regs.write_byte(dphy_test(reg), 0x4);
        }
        regs.write_byte(dphy_test(DPHY_RX_STARTUP_OVERRIDE), 0x4);
    }
}
