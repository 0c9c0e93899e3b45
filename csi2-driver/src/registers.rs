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

// Helpers to read/write MIPICSI2 unit registers.

use csi2_interface::Csi2Registers;
use modular_bitfield::prelude::*;

// Unit level registers.
pub const RX_SR: usize = 0x000;
pub const RX_RXNULANE: usize = 0x004;
pub const RX_RXENABLE: usize = 0x008;
pub const RX_RXLANESWAP: usize = 0x00c;
pub const RX_VCENABLE: usize = 0x010;
pub const RX_STAT_CONFIG: usize = 0x014;
pub const RX_LANCS_BASE: usize = 0x020;
pub const RX_PHYERRIS: usize = 0x030;
pub const RX_PHYERRIE: usize = 0x034;
pub const RX_CHNL_INTRS: usize = 0x040;
pub const RX_CHNL_INTRE: usize = 0x044;
pub const WR_CHNL_INTRS: usize = 0x048;
pub const WR_CHNL_INTRE: usize = 0x04c;
pub const CONTROLLER_ERR_STATUS: usize = 0x050;
pub const CONTROLLER_ERR_IE: usize = 0x054;
pub const RX_VCINTRS: usize = 0x058;
pub const RX_VCINTRE: usize = 0x05c;
pub const CBUF_INTRS: usize = 0x060;
pub const CBUF_INTRE: usize = 0x064;
pub const RX_DATAIDR: usize = 0x068;
pub const RX_INVIDR: usize = 0x06c;
pub const TRIGGER_GPIO1: usize = 0x070;
pub const TRIGGEREN_GPIO: usize = 0x074;
pub const TRIGGER_SDMA1: usize = 0x078;
pub const TRIGGEREN_SDMA: usize = 0x07c;

// D-PHY control.
pub const DPHY_RSTCFG: usize = 0x080;
pub const DPHY_CLEAR: usize = 0x084;
pub const DPHY_FREQCFG: usize = 0x088;
pub const TURNCFG: usize = 0x08c;
pub const DPHY_CALTYPE_CNTRL: usize = 0x090;
pub const DPHY_PLL_VREF_CONFIG: usize = 0x094;
pub const DPHY_ATB_CB_ATB_VBE_SEL: usize = 0x098;
pub const DPHY_CB_VBE_SEL: usize = 0x09c;
pub const DPHY_CLOCK_LANE_CNTRL: usize = 0x0a0;
pub const DPHY_DDLOSCFREQ_CFG1: usize = 0x0a4;
pub const DPHY_DDLOSCFREQ_CFG2: usize = 0x0a8;
pub const DPHY_DDLOSCFREQ_OVREN: usize = 0x0ac;

// Per-VC receive registers, RX_VC_STRIDE apart.
pub const RX_VC_BASE: usize = 0x100;
pub const RX_VC_STRIDE: usize = 0x20;
pub const VC_PPERRIS: usize = 0x00;
pub const VC_PPERRIE: usize = 0x04;
pub const VC_ERRPOS: usize = 0x08;
pub const VC_CRC_REGISTER: usize = 0x0c;
pub const VC_GNSPR: usize = 0x10;
pub const VC_CHNLENBL: usize = 0x14;
pub const VC_OUTCFG: usize = 0x18;

// Circular buffer registers; buffers 0..3 hold VC data, 4..7 the
// auxiliary data of the same VC.
pub const CBUF_BASE: usize = 0x200;
pub const CBUF_STRIDE: usize = 0x40;
pub const CBUF_CONFIG: usize = 0x00;
pub const CBUF_SRTPTR: usize = 0x04;
pub const CBUF_NUMLINE: usize = 0x08;
pub const CBUF_BUFLEN: usize = 0x0c;
pub const CBUF_INPLINELEN: usize = 0x10;
pub const CBUF_NUMLINES_CONFIG: usize = 0x14;
pub const CBUF_LINELEN_CONFIG: usize = 0x18;
pub const CBUF_LPDI: usize = 0x1c;
pub const CBUF_NXTLINE: usize = 0x20;
pub const CBUF_ERRLINE: usize = 0x24;
pub const CBUF_ERRLEN: usize = 0x28;
pub const CBUF_RXLINE: usize = 0x2c;
pub const MAX_BUFFERS: usize = 8;

// DC offset compensation, one 0x10 block per VC.
pub const CHNLOFFSET_BASE: usize = 0x400;
pub const CHNLOFFSET_STRIDE: usize = 0x10;

// D-PHY test interface, byte wide.
pub const DPHY_TEST_BASE: usize = 0x1_0000;
pub const DPHY_RX_STARTUP_OVERRIDE: usize = 0x06e4;
pub const DPHY_TX_RDWR_TERM_CAL_0: usize = 0x080d;
pub const DPHY_TX_RDWR_TERM_CAL_1: usize = 0x080e;
pub const DPHY_CLKOFFSETCAL_OVRRIDE: usize = 0x097f;
pub const DPHY_CLKOFFSETCAL_OVRRIDEVAL: usize = 0x0980;
pub const DPHY_CLKCALVAL_COMPS: usize = 0x09a0;
pub const DPHY_DATAL_OFFSETCAL_OVRCNTRL: [usize; 4] = [0x0b7f, 0x0d7f, 0x0f7f, 0x117f];
pub const DPHY_DATAL_OFFSETCAL_OVRVALUE: [usize; 4] = [0x0b80, 0x0d80, 0x0f80, 0x1180];
pub const DPHY_DATAL_OFFSETCAL_VALUE: [usize; 4] = [0x0ba5, 0x0da5, 0x0fa5, 0x11a5];
pub const DPHY_TX_TERM_CAL: usize = 0x1520;

pub const SOFTRESET_BIT: u32 = 0x8000_0000;
/// Buffer config flag routing a VC's fifth channel into an auxiliary buffer.
pub const FIFTH_CHANNEL_ON: u32 = 0x400;

// Bit positions, checked against the layouts below.
pub const RXENABLE_CLK_LANE_EN_BIT: u32 = 0;
pub const RXENABLE_DATA_LANE_EN_SHIFT: usize = 1;
pub const RXENABLE_FLUSH_CNT_SHIFT: usize = 8;
pub const RSTCFG_RSTZ_BIT: u32 = 0;
pub const RSTCFG_SHUTDWNZ_BIT: u32 = 1;
pub const FREQCFG_CLKFREQRNG_SHIFT: usize = 8;
pub const CHNL_LINEDONE_BIT: u32 = 0;
pub const CHNL_BUFFOVF_BIT: u32 = 1;
pub const WR_CHNL_BUFFOVF_BIT: u32 = 0;
pub const WR_CHNL_ERRRESP_BIT: u32 = 1;
pub const CTRL_FIFO_OVF_BIT: u32 = 0;
pub const CTRL_EXIT_HS_BIT: u32 = 1;
pub const LANCS_RXVALH_BIT: u32 = 0;
pub const LANCS_RXACTH_BIT: u32 = 1;
pub const LANCS_STOP_BIT: u32 = 3;
pub const LANCS_ULPA_BIT: u32 = 4;
pub const LANCS_MARK_BIT: u32 = 5;
pub const DATAID_VCID_SHIFT: usize = 6;
pub const GNSP_DATAID_SHIFT: usize = 16;
pub const CBUF_CONFIG_DTYPE_SHIFT: usize = 2;
pub const CBUF_CONFIG_BUFNR_SHIFT: usize = 8;

/// PHY error bits per lane in RX_PHYERRIS, lanes packed back to back.
pub const PHY_ERR_BITS_PER_LANE: usize = 5;
/// VC event bits per VC in RX_VCINTRS.
pub const VC_EVT_BITS_PER_VC: usize = 3;
/// Line error bits per VC in CBUF_INTRS.
pub const CBUF_ERR_BITS_PER_VC: usize = 2;
/// First CBUF_INTRS bit for the auxiliary buffers.
pub const CBUF_AUX_SHIFT: usize = 16;

pub fn rx_vc(vc: usize, reg: usize) -> usize { RX_VC_BASE + vc * RX_VC_STRIDE + reg }
pub fn cbuf(buf: usize, reg: usize) -> usize { CBUF_BASE + buf * CBUF_STRIDE + reg }
pub fn chnl_offset(vc: usize) -> usize { CHNLOFFSET_BASE + vc * CHNLOFFSET_STRIDE }
pub fn lancs(lane: usize) -> usize { RX_LANCS_BASE + lane * 4 }
pub fn dphy_test(reg: usize) -> usize { DPHY_TEST_BASE + reg }

// Receive enable register.
#[bitfield]
pub struct RxEnable {
    pub clk_lane_en: bool,
    pub data_lane_en: B4,
    #[skip]
    __: B3,
    pub flush_cnt: B4,
    #[skip]
    __: B20,
}
pub fn get_rx_enable(regs: &impl Csi2Registers) -> RxEnable {
    RxEnable::from_bytes(regs.read(RX_RXENABLE).to_ne_bytes())
}
pub fn set_rx_enable(regs: &impl Csi2Registers, enable: RxEnable) {
    regs.write(RX_RXENABLE, u32::from_ne_bytes(enable.into_bytes()))
}

// D-PHY reset configuration.
#[bitfield]
pub struct DphyRstCfg {
    pub rstz: bool,
    pub shutdwnz: bool,
    #[skip]
    __: B30,
}
pub fn get_dphy_rstcfg(regs: &impl Csi2Registers) -> DphyRstCfg {
    DphyRstCfg::from_bytes(regs.read(DPHY_RSTCFG).to_ne_bytes())
}
pub fn set_dphy_rstcfg(regs: &impl Csi2Registers, cfg: DphyRstCfg) {
    regs.write(DPHY_RSTCFG, u32::from_ne_bytes(cfg.into_bytes()))
}

// D-PHY frequency ranges.
#[bitfield]
pub struct DphyFreqCfg {
    pub hsfreqrng: B7,
    #[skip]
    __: B1,
    pub clkfreqrng: B8,
    #[skip]
    __: B16,
}
pub fn get_dphy_freqcfg(regs: &impl Csi2Registers) -> DphyFreqCfg {
    DphyFreqCfg::from_bytes(regs.read(DPHY_FREQCFG).to_ne_bytes())
}
pub fn set_dphy_freqcfg(regs: &impl Csi2Registers, cfg: DphyFreqCfg) {
    regs.write(DPHY_FREQCFG, u32::from_ne_bytes(cfg.into_bytes()))
}

// Statistics enable.
#[bitfield]
pub struct StatConfig {
    pub staten: bool,
    #[skip]
    __: B31,
}
pub fn set_stat_config(regs: &impl Csi2Registers, cfg: StatConfig) {
    regs.write(RX_STAT_CONFIG, u32::from_ne_bytes(cfg.into_bytes()))
}

// Receive channel interrupt status/enable; w1c.
#[bitfield]
#[derive(Clone, Copy)]
pub struct ChnlIntr {
    pub linedone: bool,
    pub buffovf: bool,
    #[skip]
    __: B30,
}
pub fn get_chnl_intr_status(regs: &impl Csi2Registers) -> ChnlIntr {
    ChnlIntr::from_bytes(regs.read(RX_CHNL_INTRS).to_ne_bytes())
}
pub fn set_chnl_intr_status(regs: &impl Csi2Registers, status: ChnlIntr) {
    regs.write(RX_CHNL_INTRS, u32::from_ne_bytes(status.into_bytes()))
}
pub fn set_chnl_intr_enable(regs: &impl Csi2Registers, enable: ChnlIntr) {
    regs.write(RX_CHNL_INTRE, u32::from_ne_bytes(enable.into_bytes()))
}

// AXI write channel interrupt status/enable; w1c.
#[bitfield]
#[derive(Clone, Copy)]
pub struct WrChnlIntr {
    pub buffovf: bool,
    pub errresp: bool,
    #[skip]
    __: B30,
}
pub fn get_wr_chnl_intr_status(regs: &impl Csi2Registers) -> WrChnlIntr {
    WrChnlIntr::from_bytes(regs.read(WR_CHNL_INTRS).to_ne_bytes())
}
pub fn set_wr_chnl_intr_status(regs: &impl Csi2Registers, status: WrChnlIntr) {
    regs.write(WR_CHNL_INTRS, u32::from_ne_bytes(status.into_bytes()))
}
pub fn set_wr_chnl_intr_enable(regs: &impl Csi2Registers, enable: WrChnlIntr) {
    regs.write(WR_CHNL_INTRE, u32::from_ne_bytes(enable.into_bytes()))
}

// Controller error status/enable; w1c.
#[bitfield]
#[derive(Clone, Copy)]
pub struct ControllerErr {
    pub fifo_ovf: bool,
    pub exit_hs: bool,
    #[skip]
    __: B30,
}
pub fn get_controller_err_status(regs: &impl Csi2Registers) -> ControllerErr {
    ControllerErr::from_bytes(regs.read(CONTROLLER_ERR_STATUS).to_ne_bytes())
}
pub fn set_controller_err_status(regs: &impl Csi2Registers, status: ControllerErr) {
    regs.write(CONTROLLER_ERR_STATUS, u32::from_ne_bytes(status.into_bytes()))
}

// Packet/protocol errors of one VC; w1c.
#[bitfield]
#[derive(Clone, Copy)]
pub struct PacketErr {
    pub ecc1: bool,
    pub ecc2: bool,
    pub frame_sync: bool,
    pub frame_data: bool,
    pub crc: bool,
    pub invalid_id: bool,
    #[skip]
    __: B26,
}
pub fn get_packet_err_status(regs: &impl Csi2Registers, vc: usize) -> PacketErr {
    PacketErr::from_bytes(regs.read(rx_vc(vc, VC_PPERRIS)).to_ne_bytes())
}
pub fn set_packet_err_status(regs: &impl Csi2Registers, vc: usize, status: PacketErr) {
    regs.write(rx_vc(vc, VC_PPERRIS), u32::from_ne_bytes(status.into_bytes()))
}

// Received CRC against the computed one.
#[bitfield]
pub struct CrcReg {
    pub received: u16,
    pub expected: u16,
}
pub fn get_crc(regs: &impl Csi2Registers, vc: usize) -> CrcReg {
    CrcReg::from_bytes(regs.read(rx_vc(vc, VC_CRC_REGISTER)).to_ne_bytes())
}

// Data identifier of the last packet (RX_DATAIDR), also the layout of the
// invalid identifier register.
#[bitfield]
pub struct DataId {
    pub dtype: B6,
    pub vcid: B2,
    #[skip]
    __: B24,
}
pub fn get_data_id(regs: &impl Csi2Registers) -> DataId {
    DataId::from_bytes(regs.read(RX_DATAIDR).to_ne_bytes())
}
pub fn get_invalid_id(regs: &impl Csi2Registers) -> DataId {
    DataId::from_bytes(regs.read(RX_INVIDR).to_ne_bytes())
}

// Generic short packet of one VC.
#[bitfield]
pub struct GenericShortPacket {
    pub data: u16,
    pub data_id: u8,
    #[skip]
    __: B8,
}
pub fn get_short_packet(regs: &impl Csi2Registers, vc: usize) -> GenericShortPacket {
    GenericShortPacket::from_bytes(regs.read(rx_vc(vc, VC_GNSPR)).to_ne_bytes())
}

// Frame start/end and short packet flags of one VC in RX_VCINTRS.
#[bitfield]
#[derive(Clone, Copy)]
pub struct VcEvents {
    pub frame_start: bool,
    pub frame_end: bool,
    pub short_packet: bool,
    #[skip]
    __: B5,
}
pub fn vc_events(status: u32, vc: usize) -> VcEvents {
    VcEvents::from_bytes([((status >> (vc * VC_EVT_BITS_PER_VC)) & 0x7) as u8])
}

// Analog lane state.
#[bitfield]
pub struct LaneCs {
    pub rxvalh: bool,
    pub rxacth: bool,
    #[skip]
    __: B1,
    pub stop: bool,
    pub ulpa: bool,
    pub mark: bool,
    #[skip]
    __: B26,
}
pub fn get_lane_cs(regs: &impl Csi2Registers, lane: usize) -> LaneCs {
    LaneCs::from_bytes(regs.read(lancs(lane)).to_ne_bytes())
}

// Circular buffer data type and routing.
#[bitfield]
pub struct CbufConfig {
    #[skip]
    __: B2,
    pub dtype: B6,
    pub bufnr: B2,
    pub fifth_ch: bool,
    #[skip]
    __: B21,
}
pub fn set_cbuf_config(regs: &impl Csi2Registers, buf: usize, cfg: CbufConfig) {
    regs.write(cbuf(buf, CBUF_CONFIG), u32::from_ne_bytes(cfg.into_bytes()))
}

/// Size of one channel record of the statistics trailer.
pub const CHANNEL_STAT_SIZE: usize = 10;

// Per-channel statistics record appended by hardware to every line, little
// endian: sum u32, min i16, max i16, toggle u16.
#[bitfield]
#[derive(Clone, Copy)]
pub struct ChannelStat {
    pub sum: u32,
    pub min: u16,
    pub max: u16,
    pub toggle: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bit(x: u32) -> u32 { 1 << x }
    fn field(v: u32, mask: u32, shift: usize) -> u32 { (v & mask) << shift }

    #[test]
    fn rx_enable() {
        assert_eq!(
            u32::from_ne_bytes(RxEnable::new().with_clk_lane_en(true).into_bytes()),
            bit(RXENABLE_CLK_LANE_EN_BIT)
        );
        assert_eq!(
            u32::from_ne_bytes(RxEnable::new().with_data_lane_en(0x5).into_bytes()),
            field(0x5, 0xf, RXENABLE_DATA_LANE_EN_SHIFT)
        );
        assert_eq!(
            u32::from_ne_bytes(RxEnable::new().with_flush_cnt(7).into_bytes()),
            field(7, 0xf, RXENABLE_FLUSH_CNT_SHIFT)
        );
    }
    #[test]
    fn dphy_rstcfg() {
        assert_eq!(
            u32::from_ne_bytes(DphyRstCfg::new().with_rstz(true).into_bytes()),
            bit(RSTCFG_RSTZ_BIT)
        );
        assert_eq!(
            u32::from_ne_bytes(DphyRstCfg::new().with_shutdwnz(true).into_bytes()),
            bit(RSTCFG_SHUTDWNZ_BIT)
        );
    }
    #[test]
    fn dphy_freqcfg() {
        assert_eq!(
            u32::from_ne_bytes(DphyFreqCfg::new().with_hsfreqrng(0x49).into_bytes()),
            0x49
        );
        assert_eq!(
            u32::from_ne_bytes(DphyFreqCfg::new().with_clkfreqrng(0xc).into_bytes()),
            field(0xc, 0xff, FREQCFG_CLKFREQRNG_SHIFT)
        );
    }
    #[test]
    fn interrupt_status() {
        assert_eq!(
            u32::from_ne_bytes(ChnlIntr::new().with_linedone(true).into_bytes()),
            bit(CHNL_LINEDONE_BIT)
        );
        assert_eq!(
            u32::from_ne_bytes(ChnlIntr::new().with_buffovf(true).into_bytes()),
            bit(CHNL_BUFFOVF_BIT)
        );
        assert_eq!(
            u32::from_ne_bytes(WrChnlIntr::new().with_buffovf(true).into_bytes()),
            bit(WR_CHNL_BUFFOVF_BIT)
        );
        assert_eq!(
            u32::from_ne_bytes(WrChnlIntr::new().with_errresp(true).into_bytes()),
            bit(WR_CHNL_ERRRESP_BIT)
        );
        assert_eq!(
            u32::from_ne_bytes(ControllerErr::new().with_fifo_ovf(true).into_bytes()),
            bit(CTRL_FIFO_OVF_BIT)
        );
        assert_eq!(
            u32::from_ne_bytes(ControllerErr::new().with_exit_hs(true).into_bytes()),
            bit(CTRL_EXIT_HS_BIT)
        );
    }
    #[test]
    fn packet_err() {
        // Packet errors land 6 bits higher in the report mask.
        assert_eq!(u32::from_ne_bytes(PacketErr::new().with_ecc1(true).into_bytes()), bit(0));
        assert_eq!(u32::from_ne_bytes(PacketErr::new().with_crc(true).into_bytes()), bit(4));
        assert_eq!(
            u32::from_ne_bytes(PacketErr::new().with_invalid_id(true).into_bytes()),
            bit(5)
        );
    }
    #[test]
    fn lane_cs() {
        let lane = LaneCs::from_bytes(bit(LANCS_MARK_BIT).to_ne_bytes());
        assert!(lane.mark());
        assert!(!lane.stop());
        let lane = LaneCs::from_bytes((bit(LANCS_STOP_BIT) | bit(LANCS_ULPA_BIT)).to_ne_bytes());
        assert!(lane.stop() && lane.ulpa());
        let lane = LaneCs::from_bytes((bit(LANCS_RXVALH_BIT) | bit(LANCS_RXACTH_BIT)).to_ne_bytes());
        assert!(lane.rxvalh() && lane.rxacth());
    }
    #[test]
    fn data_id() {
        let id = DataId::from_bytes(field(2, 0x3, DATAID_VCID_SHIFT).to_ne_bytes());
        assert_eq!(id.vcid(), 2);
        assert_eq!(id.dtype(), 0);
        let id = DataId::from_bytes((field(3, 0x3, DATAID_VCID_SHIFT) | 0x2c).to_ne_bytes());
        assert_eq!(id.vcid(), 3);
        assert_eq!(id.dtype(), 0x2c);
    }
    #[test]
    fn short_packet() {
        let sp = GenericShortPacket::from_bytes(
            (field(0x31, 0xff, GNSP_DATAID_SHIFT) | 0xbeef).to_ne_bytes(),
        );
        assert_eq!(sp.data_id(), 0x31);
        assert_eq!(sp.data(), 0xbeef);
    }
    #[test]
    fn cbuf_config() {
        let cfg = CbufConfig::new().with_dtype(0x2c).with_bufnr(1).with_fifth_ch(true);
        assert_eq!(
            u32::from_ne_bytes(cfg.into_bytes()),
            field(0x2c, 0x3f, CBUF_CONFIG_DTYPE_SHIFT)
                | field(1, 0x3, CBUF_CONFIG_BUFNR_SHIFT)
                | FIFTH_CHANNEL_ON
        );
    }
    #[test]
    fn vc_event_slices() {
        // VC2 frame end, VC3 frame start + short packet.
        let status = bit(2 * 3 + 1) | bit(3 * 3) | bit(3 * 3 + 2);
        let ev = vc_events(status, 2);
        assert!(ev.frame_end() && !ev.frame_start() && !ev.short_packet());
        let ev = vc_events(status, 3);
        assert!(ev.frame_start() && ev.short_packet() && !ev.frame_end());
        assert_eq!(vc_events(status, 0).into_bytes(), [0]);
    }
    #[test]
    fn channel_stat_layout() {
        let raw: [u8; CHANNEL_STAT_SIZE] = [0x78, 0x56, 0x34, 0x12, 0x00, 0xc0, 0xf8, 0x7f, 0xf0, 0xff];
        let stat = ChannelStat::from_bytes(raw);
        assert_eq!(stat.sum(), 0x1234_5678);
        assert_eq!(stat.min() as i16, -0x4000);
        assert_eq!(stat.max() as i16, 0x7ff8);
        assert_eq!(stat.toggle(), 0xfff0);
    }
}
