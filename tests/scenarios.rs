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

// Driver scenarios over the fake receiver.

use crate::*;
use csi2_driver::{real_line_length, Csi2Driver, Csi2Service};
use csi2_interface::*;
use fake_csi2::{FakePlatform, FakeRegisters};
use std::cell::RefCell;

const BUF0: usize = 0x8000_0000;
const BUF1: usize = 0x8010_0000;
const AUX0: usize = 0x8020_0000;

thread_local! {
    static REPORTS: RefCell<Vec<(IrqClass, Csi2Report)>> = RefCell::new(Vec::new());
}

fn record(class: IrqClass, report: &Csi2Report) {
    REPORTS.with(|reports| reports.borrow_mut().push((class, *report)));
}
fn on_rx_err(report: &Csi2Report) { record(IrqClass::RxErr, report) }
fn on_events(report: &Csi2Report) { record(IrqClass::Events, report) }

fn take_reports() -> Vec<(IrqClass, Csi2Report)> {
    REPORTS.with(|reports| reports.borrow_mut().drain(..).collect())
}

fn radar_vc(buf_addr: usize) -> VcParams {
    VcParams {
        stream_type: DataStreamType::RAW12,
        channels: 4,
        expected_samples: 512,
        expected_lines: 64,
        buf_num_lines: 2,
        buf_line_len: real_line_length(DataStreamType::RAW12, 4, 512, true) as u16,
        buf_addr,
        ..Default::default()
    }
}

fn radar_params() -> InitParams {
    let mut params = InitParams {
        num_lanes_rx: 2,
        lanes_map_rx: [0, 1, 2, 3],
        tx_clk_freq: 500,
        rx_clk_freq: 500,
        ..Default::default()
    };
    params.vc[0] = Some(radar_vc(BUF0));
    params.callbacks[IrqClass::RxErr as usize] = Some(on_rx_err);
    params
}

fn new_driver() -> Csi2Driver<FakePlatform> {
    let platform = FakePlatform::new(MAX_UNITS);
    for unit in 0..MAX_UNITS {
        let regs = platform.unit(unit);
        for offset in [
            RX_PHYERRIS,
            RX_CHNL_INTRS,
            WR_CHNL_INTRS,
            CONTROLLER_ERR_STATUS,
            RX_VCINTRS,
            CBUF_INTRS,
        ] {
            regs.set_w1c(offset);
        }
        for vc in 0..MAX_VC {
            regs.set_w1c(rx_vc(vc, VC_PPERRIS));
        }
    }
    take_reports();
    Csi2Driver::new(platform)
}

fn configured(params: &InitParams) -> Csi2Driver<FakePlatform> {
    let mut driver = new_driver();
    assert_eq!(driver.configure(0, params), Ok(()));
    driver
}

fn fake(driver: &Csi2Driver<FakePlatform>) -> &FakeRegisters { driver.platform().unit(0) }

// Trailer record of `ch` on buffer `line` of a VC set up by radar_vc.
fn put_stat(driver: &Csi2Driver<FakePlatform>, vc: &VcParams, line: usize, ch: usize, sum: i32, toggle: u16) {
    let offset = line * vc.buf_line_len as usize + 4 * 2 * 512 + ch * CHANNEL_STAT_SIZE;
    let record = ChannelStat::new().with_sum(sum as u32).with_toggle(toggle).into_bytes();
    driver.platform().write_memory(vc.buf_addr + offset, &record);
}

#[test]
fn configure_turns_unit_on() {
    let driver = configured(&radar_params());
    assert_eq!(driver.interface_status(0), Ok(InterfaceStatus::On));
    assert_eq!(driver.interface_status(0), Ok(InterfaceStatus::On));

    assert_eq!(fake(&driver).peek(RX_RXNULANE), 2);
    // Clock lane, data lanes 0-1, flush count 3.
    assert_eq!(fake(&driver).peek(RX_RXENABLE), 0x307);
    assert_eq!(fake(&driver).writes_to(TURNCFG), vec![0x3, 0]);
    assert_eq!(fake(&driver).peek(RX_VCENABLE), 1);
    assert_eq!(fake(&driver).peek(DPHY_RSTCFG), 0x3);
    assert_eq!(fake(&driver).peek(RX_STAT_CONFIG), 0);
    assert_eq!(fake(&driver).peek(rx_vc(0, VC_CHNLENBL)), 0xf);
    assert_eq!(fake(&driver).peek(cbuf(0, CBUF_SRTPTR)), BUF0 as u32);
    assert_eq!(fake(&driver).peek(cbuf(0, CBUF_BUFLEN)), 4176);
    assert_eq!(fake(&driver).peek(cbuf(0, CBUF_LINELEN_CONFIG)), 4096);
    assert_eq!(fake(&driver).peek(cbuf(0, CBUF_INPLINELEN)), 3072);
    assert_eq!(fake(&driver).peek(cbuf(0, CBUF_NUMLINES_CONFIG)), 64);
    assert_eq!(driver.platform().clock_tilts.get(), 1);

    let irqs = &driver.platform().irqs;
    assert_eq!(irqs.len(), 4);
    assert!(irqs.iter().all(|irq| irq.unit == 0));
    assert_eq!(irqs[2].class, IrqClass::Events);
}

#[test]
fn stop_start_round_trip() {
    let mut driver = configured(&radar_params());
    assert_eq!(driver.rx_stop(0), Ok(()));
    assert_eq!(driver.interface_status(0), Ok(InterfaceStatus::Stopped));
    assert_eq!(fake(&driver).peek(RX_RXENABLE) & 1, 0);
    assert_eq!(driver.rx_start(0), Ok(()));
    assert_eq!(driver.interface_status(0), Ok(InterfaceStatus::On));
    assert_eq!(fake(&driver).peek(RX_RXENABLE), 0x307);
    // Already on.
    assert_eq!(driver.rx_start(0), Ok(()));
}

#[test]
fn power_off_from_stopped() {
    let mut driver = configured(&radar_params());
    assert_eq!(driver.rx_stop(0), Ok(()));
    assert_eq!(driver.power_off(0), Ok(()));
    assert_eq!(driver.interface_status(0), Ok(InterfaceStatus::Off));
    assert_eq!(fake(&driver).peek(DPHY_RSTCFG) & 0x2, 0);

    assert_eq!(driver.rx_start(0), Err(Csi2Error::WrongState));
    assert_eq!(driver.interface_status(0), Ok(InterfaceStatus::Off));
    assert_eq!(driver.rx_stop(0), Err(Csi2Error::WrongState));
    assert_eq!(driver.power_off(0), Ok(()));
}

#[test]
fn power_on_replays_configuration() {
    let mut driver = configured(&radar_params());
    assert_eq!(driver.power_on(0), Err(Csi2Error::WrongState));
    assert_eq!(driver.power_off(0), Ok(()));
    fake(&driver).poke(RX_VCENABLE, 0);
    assert_eq!(driver.power_on(0), Ok(()));
    assert_eq!(driver.interface_status(0), Ok(InterfaceStatus::On));
    assert_eq!(fake(&driver).peek(RX_VCENABLE), 1);
    assert_eq!(driver.platform().irqs.len(), 8);
}

#[test]
fn not_initialized_until_configured() {
    let mut driver = new_driver();
    assert_eq!(driver.interface_status(0), Err(Csi2Error::NotInitialized));
    assert_eq!(driver.rx_stop(0), Err(Csi2Error::NotInitialized));
    assert_eq!(driver.power_on(0), Err(Csi2Error::NotInitialized));
    assert_eq!(driver.interface_status(4), Err(Csi2Error::WrongUnitId));
    assert_eq!(driver.configure(4, &radar_params()), Err(Csi2Error::WrongUnitId));
}

#[test]
fn failed_configure_forgets_unit() {
    let mut driver = configured(&radar_params());
    let mut params = radar_params();
    params.num_lanes_rx = 0;
    assert_eq!(driver.configure(0, &params), Err(Csi2Error::InvalidLanesNr));
    assert_eq!(driver.interface_status(0), Err(Csi2Error::NotInitialized));
    assert_eq!(driver.rx_stop(0), Err(Csi2Error::NotInitialized));
}

#[test]
fn buffer_too_small_for_trailer() {
    let mut driver = new_driver();
    let mut params = radar_params();
    params.stat_policy = StatPolicy::AtFrameEnd;
    let vc = params.vc[0].as_mut().unwrap();
    vc.offset_comp_real = [OFFSET_AUTOCOMPUTE; MAX_CHANNELS];
    vc.buf_line_len = 4096;
    assert_eq!(driver.configure(0, &params), Err(Csi2Error::TooSmallBuffer));
    assert_eq!(driver.interface_status(0), Err(Csi2Error::NotInitialized));

    // Without statistics the samples fit.
    let mut params = radar_params();
    params.vc[0].as_mut().unwrap().buf_line_len = 4096;
    assert_eq!(driver.configure(0, &params), Ok(()));
}

#[test]
fn unit_order_is_enforced() {
    let mut driver = new_driver();
    driver.platform_mut().set_predecessor(1, 0);
    assert_eq!(driver.configure(1, &radar_params()), Err(Csi2Error::Unit0MustBeFirst));
    assert_eq!(driver.configure(0, &radar_params()), Ok(()));
    assert_eq!(driver.configure(1, &radar_params()), Ok(()));
}

#[test]
fn irq_registration_failure() {
    let mut driver = new_driver();
    driver.platform_mut().fail_irq_registration(true);
    assert_eq!(driver.configure(0, &radar_params()), Err(Csi2Error::IrqHandlerRegistration));
    assert_eq!(driver.interface_status(0), Err(Csi2Error::NotInitialized));
    // The turnaround override is released either way.
    assert_eq!(fake(&driver).peek(TURNCFG), 0);
}

#[test]
fn irq_core_must_be_allowed() {
    let mut driver = new_driver();
    driver.platform_mut().set_allowed_core(1);
    assert_eq!(driver.configure(0, &radar_params()), Err(Csi2Error::InvalidCoreNr));
    let mut params = radar_params();
    params.irq_core = 1;
    assert_eq!(driver.configure(0, &params), Ok(()));
    assert_eq!(driver.platform().irqs[0].core, 1);
}

#[test]
fn stop_without_hardware_ack() {
    let mut driver = configured(&radar_params());
    fake(&driver).hold(RX_RXENABLE, 0x307);
    assert_eq!(driver.rx_stop(0), Err(Csi2Error::HwResponseError));
    assert_eq!(driver.interface_status(0), Err(Csi2Error::NotInitialized));
}

#[test]
fn power_off_without_hardware_ack() {
    let mut driver = configured(&radar_params());
    fake(&driver).hold(DPHY_RSTCFG, 0x3);
    assert_eq!(driver.power_off(0), Err(Csi2Error::HwResponseError));
    assert_eq!(driver.interface_status(0), Err(Csi2Error::NotInitialized));
}

#[test]
fn phy_sync_error_report() {
    let mut driver = configured(&radar_params());
    fake(&driver).raise(RX_PHYERRIS, 1);
    driver.handle_irq(0, IrqClass::RxErr);

    let reports = take_reports();
    assert_eq!(reports.len(), 1);
    let (class, report) = reports[0];
    assert_eq!(class, IrqClass::RxErr);
    assert_eq!(report.unit, 0);
    assert_eq!(report.err_mask_u, ErrorMask::PHY_SYNC);
    assert!(report.err_mask_vc.iter().all(|mask| mask.is_empty()));
    assert_eq!(fake(&driver).peek(RX_PHYERRIS), 0);
}

#[test]
fn packet_crc_error_report() {
    let mut driver = configured(&radar_params());
    fake(&driver).raise(rx_vc(0, VC_PPERRIS), 1 << 4);
    fake(&driver).poke(rx_vc(0, VC_CRC_REGISTER), 0x1234_5678);
    driver.handle_irq(0, IrqClass::RxErr);

    let (_, report) = take_reports()[0];
    assert_eq!(report.err_mask_vc[0], ErrorMask::PACK_CRC);
    assert_eq!(report.err_mask_u, ErrorMask::PACK_CRC);
    assert_eq!(report.expected_crc[0], 0x1234);
    assert_eq!(report.received_crc[0], 0x5678);
    assert_eq!(fake(&driver).peek(rx_vc(0, VC_PPERRIS)), 0);
}

#[test]
fn errors_on_unconfigured_vc_are_spurious() {
    let mut driver = configured(&radar_params());
    fake(&driver).raise(rx_vc(2, VC_PPERRIS), 1);
    driver.handle_irq(0, IrqClass::RxErr);

    let (_, report) = take_reports()[0];
    assert_eq!(report.err_mask_u, ErrorMask::SPURIOUS_PHY);
    assert!(report.err_mask_vc[2].is_empty());
    assert_eq!(fake(&driver).peek(rx_vc(2, VC_PPERRIS)), 0);
}

#[test]
fn line_length_error_on_second_vc() {
    let mut params = radar_params();
    params.vc[1] = Some(radar_vc(BUF1));
    let mut driver = configured(&params);
    assert_eq!(fake(&driver).peek(RX_VCENABLE), 0b11);
    fake(&driver).raise(CBUF_INTRS, 1 << 2);
    fake(&driver).poke(cbuf(1, CBUF_ERRLINE), 5);
    fake(&driver).poke(cbuf(1, CBUF_ERRLEN), 4000);
    driver.handle_irq(0, IrqClass::PathErr);

    let reports = take_reports();
    assert_eq!(reports.len(), 1);
    // No path error callback: the Rx error callback gets it.
    let (class, report) = reports[0];
    assert_eq!(class, IrqClass::RxErr);
    assert!(report.err_mask_vc[1].contains(ErrorMask::LINE_LEN));
    assert!(report.err_mask_vc[0].is_empty());
    assert!(report.err_mask_u.contains(ErrorMask::LINE_LEN));
    assert_eq!(
        report.line_length_err[1],
        LineLengthErr {
            line_pos: 5,
            line_length: 4000
        }
    );
    assert_eq!(fake(&driver).peek(CBUF_INTRS), 0);
}

#[test]
fn unit_path_errors() {
    let mut driver = configured(&radar_params());
    fake(&driver).raise(RX_CHNL_INTRS, 1 << CHNL_BUFFOVF_BIT);
    fake(&driver).raise(WR_CHNL_INTRS, 1 << WR_CHNL_ERRRESP_BIT);
    fake(&driver).raise(CONTROLLER_ERR_STATUS, 1 << CTRL_EXIT_HS_BIT);
    driver.handle_irq(0, IrqClass::PathErr);

    let (_, report) = take_reports()[0];
    assert_eq!(
        report.err_mask_u,
        ErrorMask::BUF_OVERFLOW | ErrorMask::AXI_RESPONSE | ErrorMask::HS_EXIT
    );
    assert_eq!(fake(&driver).peek(RX_CHNL_INTRS), 0);
    assert_eq!(fake(&driver).peek(WR_CHNL_INTRS), 0);
    assert_eq!(fake(&driver).peek(CONTROLLER_ERR_STATUS), 0);
}

#[test]
fn path_handler_leaves_line_done() {
    let mut driver = configured(&radar_params());
    fake(&driver).raise(RX_CHNL_INTRS, 1 << CHNL_LINEDONE_BIT);
    driver.handle_irq(0, IrqClass::PathErr);
    assert_eq!(take_reports()[0].1.err_mask_u, ErrorMask::SPURIOUS_PKT);
    assert_eq!(fake(&driver).peek(RX_CHNL_INTRS), 1 << CHNL_LINEDONE_BIT);
}

#[test]
fn spurious_interrupts_still_reported() {
    let mut driver = configured(&radar_params());
    driver.handle_irq(0, IrqClass::RxErr);
    driver.handle_irq(0, IrqClass::PathErr);
    driver.handle_irq(0, IrqClass::Events);
    driver.handle_irq(0, IrqClass::TxErr);
    let masks: Vec<ErrorMask> = take_reports().iter().map(|(_, r)| r.err_mask_u).collect();
    assert_eq!(
        masks,
        vec![ErrorMask::SPURIOUS_PHY, ErrorMask::SPURIOUS_PKT, ErrorMask::SPURIOUS_EVT]
    );
}

#[test]
fn handlers_ignore_unmapped_units() {
    let mut driver = Csi2Driver::new(FakePlatform::new(1));
    driver.handle_irq(3, IrqClass::RxErr);
    driver.handle_irq(3, IrqClass::Events);
    // Mapped but never configured: no callback to call.
    driver.platform().unit(0).raise(RX_VCINTRS, 0x2);
    driver.handle_irq(0, IrqClass::Events);
    assert!(take_reports().is_empty());
}

#[test]
fn line_end_callback() {
    let mut params = radar_params();
    let vc = params.vc[0].as_mut().unwrap();
    vc.events_req = EventMask::LINE_END;
    vc.buf_num_lines_trigger = 2;
    params.callbacks[IrqClass::Events as usize] = Some(on_events);
    let mut driver = configured(&params);
    assert_eq!(fake(&driver).peek(RX_CHNL_INTRE) & (1 << CHNL_LINEDONE_BIT), 1);
    assert_eq!(fake(&driver).peek(cbuf(0, CBUF_LPDI)), 2);

    // Frame start was not asked for, so it only resets the line count.
    fake(&driver).raise(RX_VCINTRS, 0x1);
    driver.handle_irq(0, IrqClass::Events);
    assert!(take_reports().is_empty());

    fake(&driver).raise(RX_CHNL_INTRS, 1 << CHNL_LINEDONE_BIT);
    driver.handle_irq(0, IrqClass::Events);
    assert!(take_reports().is_empty());
    fake(&driver).raise(RX_CHNL_INTRS, 1 << CHNL_LINEDONE_BIT);
    driver.handle_irq(0, IrqClass::Events);

    let reports = take_reports();
    assert_eq!(reports.len(), 1);
    let (class, report) = reports[0];
    assert_eq!(class, IrqClass::Events);
    assert_eq!(report.evt_mask_vc[0], EventMask::LINE_END);
    assert_eq!(fake(&driver).peek(RX_CHNL_INTRS), 0);
}

#[test]
fn frame_start_and_short_packet() {
    let mut params = radar_params();
    params.vc[0].as_mut().unwrap().events_req = EventMask::FRAME_START | EventMask::SHORT_PACKET;
    let mut driver = configured(&params);
    // Frame start, frame end and short packet enables of VC0.
    assert_eq!(fake(&driver).peek(RX_VCINTRE), 0x7);

    fake(&driver).raise(RX_VCINTRS, 0x5);
    fake(&driver).poke(rx_vc(0, VC_GNSPR), (0x31 << GNSP_DATAID_SHIFT) | 0xbeef);
    driver.handle_irq(0, IrqClass::Events);

    let (_, report) = take_reports()[0];
    assert_eq!(report.evt_mask_vc[0], EventMask::FRAME_START | EventMask::SHORT_PACKET);
    assert_eq!(
        report.short_packets[0],
        ShortPacket {
            data_id: 0x31,
            data: 0xbeef
        }
    );
    assert_eq!(fake(&driver).peek(RX_VCINTRS), 0);
}

#[test]
fn simultaneous_frame_ends() {
    let mut params = radar_params();
    params.vc[0].as_mut().unwrap().events_req = EventMask::FRAME_END;
    params.vc[1] = Some(VcParams {
        events_req: EventMask::FRAME_END,
        ..radar_vc(BUF1)
    });
    let mut driver = configured(&params);
    // Frame end of VC0 (bit 1) and VC1 (bit 4).
    fake(&driver).raise(RX_VCINTRS, (1 << 1) | (1 << 4));
    driver.handle_irq(0, IrqClass::Events);

    let reports = take_reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].1.evt_mask_vc[0], EventMask::FRAME_END);
    assert_eq!(reports[0].1.evt_mask_vc[1], EventMask::FRAME_END);
    assert_eq!(driver.frames_counter(0, 0), Ok(1));
    assert_eq!(driver.frames_counter(0, 1), Ok(1));
    assert_eq!(driver.frames_counter(0, 2), Ok(0));
    assert_eq!(driver.frames_counter(0, 4), Err(Csi2Error::InvalidVcParams));
}

#[test]
fn frame_end_statistics() {
    let mut params = radar_params();
    params.stat_policy = StatPolicy::AtFrameEnd;
    params.callbacks[IrqClass::Events as usize] = Some(on_events);
    let vc = params.vc[0].as_mut().unwrap();
    vc.events_req = EventMask::FRAME_END | EventMask::BIT_NOT_TOGGLE;
    vc.offset_comp_real = [OFFSET_AUTOCOMPUTE; MAX_CHANNELS];
    let vc = *vc;
    let mut driver = configured(&params);
    assert_eq!(fake(&driver).peek(RX_STAT_CONFIG), 1);

    // Channel 0 averages 4 over 512 samples x 2 lines; channel 3 never
    // toggles bit 4.
    put_stat(&driver, &vc, 0, 0, 3 * 1024, 0xfff0);
    put_stat(&driver, &vc, 1, 0, 1024, 0);
    put_stat(&driver, &vc, 0, 1, 0, 0xfff0);
    put_stat(&driver, &vc, 0, 2, 0, 0xfff0);
    put_stat(&driver, &vc, 0, 3, 0, 0xffe0);
    put_stat(&driver, &vc, 1, 3, 0, 0xffe0);
    fake(&driver).raise(RX_VCINTRS, 1 << 1);
    driver.handle_irq(0, IrqClass::Events);

    let reports = take_reports();
    assert_eq!(reports.len(), 1);
    let (class, report) = reports[0];
    assert_eq!(class, IrqClass::Events);
    assert_eq!(report.evt_mask_vc[0], EventMask::FRAME_END | EventMask::BIT_NOT_TOGGLE);
    assert_eq!(report.not_toggled_bits[..4], [0, 0, 0, 1 << 4]);
    assert_eq!(fake(&driver).peek(chnl_offset(0)), 4 * 4);
    assert_eq!(fake(&driver).peek(chnl_offset(0) + 4), 0);
    assert_eq!(driver.frames_counter(0, 0), Ok(1));
}

#[test]
fn auxiliary_buffer() {
    let mode = OutputMode::FIFTH_CH_ON | OutputMode::FIFTH_CH_1_OF_2;
    let mut params = radar_params();
    params.vc[0].as_mut().unwrap().output_mode = mode;
    params.aux[0] = Some(VcParams {
        stream_type: DataStreamType::R12_A0_DR_1OF2,
        output_mode: mode,
        events_req: EventMask::FRAME_END,
        buf_line_len: 2048,
        ..radar_vc(AUX0)
    });
    let mut driver = configured(&params);
    assert_eq!(
        fake(&driver).peek(cbuf(MAX_VC, CBUF_CONFIG)),
        (0x2c << CBUF_CONFIG_DTYPE_SHIFT) | FIFTH_CHANNEL_ON
    );
    assert_eq!(fake(&driver).peek(cbuf(MAX_VC, CBUF_LINELEN_CONFIG)), 2048);
    assert_eq!(fake(&driver).peek(CBUF_INTRE), 0x3 | (0x3 << CBUF_AUX_SHIFT));

    fake(&driver).raise(RX_VCINTRS, 1 << 1);
    driver.handle_irq(0, IrqClass::Events);
    assert_eq!(take_reports()[0].1.evt_mask_vc[0], EventMask::FRAME_END);
    assert_eq!(driver.aux_frames_counter(0, 0), Ok(1));
    assert_eq!(driver.frames_counter(0, 0), Ok(1));

    fake(&driver).raise(CBUF_INTRS, 1 << CBUF_AUX_SHIFT);
    fake(&driver).poke(cbuf(MAX_VC, CBUF_ERRLINE), 7);
    driver.handle_irq(0, IrqClass::PathErr);
    let (_, report) = take_reports()[0];
    assert_eq!(report.err_mask_vc[0], ErrorMask::LINE_LEN);
    assert_eq!(report.line_length_err[0].line_pos, 7);
}

#[test]
fn first_line_position() {
    let mut driver = configured(&radar_params());
    fake(&driver).poke(cbuf(0, CBUF_NXTLINE), 2);
    assert_eq!(driver.first_line_pos(0, 0), Ok(1));
    assert_eq!(driver.first_byte_offset(0, 0), Ok(4176));
    fake(&driver).poke(cbuf(0, CBUF_NXTLINE), 0);
    assert_eq!(driver.first_line_pos(0, 0), Ok(0));

    assert_eq!(driver.first_line_pos(0, 1), Err(Csi2Error::InvalidVcParams));
    assert_eq!(driver.first_line_pos(0, 4), Err(Csi2Error::InvalidVcParams));
    assert_eq!(driver.first_line_pos(1, 0), Err(Csi2Error::NotInitialized));
    assert_eq!(driver.rx_stop(0), Ok(()));
    assert_eq!(driver.first_line_pos(0, 0), Err(Csi2Error::RxStopped));
    assert_eq!(driver.power_off(0), Ok(()));
    assert_eq!(driver.first_byte_offset(0, 0), Err(Csi2Error::PoweredOff));
}

#[test]
fn line_position_beyond_buffer() {
    let driver = configured(&radar_params());
    fake(&driver).poke(cbuf(0, CBUF_NXTLINE), 0x0100_0000);
    assert_eq!(driver.first_line_pos(0, 0), Ok(1));
    assert_eq!(driver.first_byte_offset(0, 0), Ok(4176));
    fake(&driver).poke(cbuf(0, CBUF_NXTLINE), u32::MAX);
    assert_eq!(driver.first_byte_offset(0, 0), Ok(4176));
}

fn auto_dc_params(policy: StatPolicy) -> (InitParams, VcParams) {
    let mut params = radar_params();
    params.stat_policy = policy;
    params.callbacks[IrqClass::Events as usize] = Some(on_events);
    let vc = params.vc[0].as_mut().unwrap();
    vc.events_req = EventMask::FRAME_END | EventMask::BIT_NOT_TOGGLE;
    vc.offset_comp_real = [OFFSET_AUTOCOMPUTE; MAX_CHANNELS];
    let vc = *vc;
    (params, vc)
}

fn line_done(driver: &mut Csi2Driver<FakePlatform>) {
    fake(driver).raise(RX_CHNL_INTRS, 1 << CHNL_LINEDONE_BIT);
    driver.handle_irq(0, IrqClass::Events);
}

fn frame_end(driver: &mut Csi2Driver<FakePlatform>) -> Csi2Report {
    fake(driver).raise(RX_VCINTRS, 1 << 1);
    driver.handle_irq(0, IrqClass::Events);
    let reports = take_reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].0, IrqClass::Events);
    reports[0].1
}

#[test]
fn every_line_statistics() {
    let (params, vc) = auto_dc_params(StatPolicy::EveryLine);
    let mut driver = configured(&params);
    assert_eq!(fake(&driver).peek(RX_CHNL_INTRE) & (1 << CHNL_LINEDONE_BIT), 1);

    // Mean of channel 0 over 512 samples x 64 lines is 8. Channel 2 never
    // toggles bit 7.
    put_stat(&driver, &vc, 0, 0, 2 * 32768, 0xfff0);
    put_stat(&driver, &vc, 1, 0, 4 * 32768, 0);
    put_stat(&driver, &vc, 1, 1, 0, 0xfff0);
    put_stat(&driver, &vc, 1, 2, 0, 0xff70);
    put_stat(&driver, &vc, 1, 3, 0, 0xfff0);

    // Buffer lines 0, 1, then 0 again after the wrap.
    for _ in 0..3 {
        line_done(&mut driver);
    }
    assert!(take_reports().is_empty());

    let report = frame_end(&mut driver);
    assert_eq!(report.evt_mask_vc[0], EventMask::FRAME_END | EventMask::BIT_NOT_TOGGLE);
    assert_eq!(report.not_toggled_bits[..4], [0, 0, 0x80, 0]);
    assert_eq!(fake(&driver).peek(chnl_offset(0)), 8 * 4);
    assert_eq!(fake(&driver).peek(chnl_offset(0) + 4), 0);

    // Nothing accumulated since: sums and toggles start over.
    let report = frame_end(&mut driver);
    assert_eq!(report.not_toggled_bits[..4], [0xfff0; 4]);
    assert_eq!(fake(&driver).peek(chnl_offset(0)), 0);
    assert_eq!(driver.frames_counter(0, 0), Ok(2));
}

#[test]
fn last_line_statistics() {
    let (params, vc) = auto_dc_params(StatPolicy::LastLine);
    let mut driver = configured(&params);
    assert_eq!(fake(&driver).peek(RX_STAT_CONFIG), 1);
    assert_eq!(fake(&driver).peek(RX_CHNL_INTRE) & (1 << CHNL_LINEDONE_BIT), 0);

    // Only buffer line 0 counts, averaged over one line of samples.
    put_stat(&driver, &vc, 0, 0, 5 * 512, 0xfff0);
    put_stat(&driver, &vc, 0, 1, 0, 0x7ff0);
    put_stat(&driver, &vc, 0, 2, 0, 0xfff0);
    put_stat(&driver, &vc, 0, 3, 0, 0xfff0);
    put_stat(&driver, &vc, 1, 0, 99 * 512, 0);

    let report = frame_end(&mut driver);
    assert_eq!(report.evt_mask_vc[0], EventMask::FRAME_END | EventMask::BIT_NOT_TOGGLE);
    assert_eq!(report.not_toggled_bits[..4], [0, 0x8000, 0, 0]);
    assert_eq!(fake(&driver).peek(chnl_offset(0)), 5 * 4);

    // The same trailer again gives the same offset, not twice it.
    let report = frame_end(&mut driver);
    assert_eq!(report.not_toggled_bits[..4], [0, 0x8000, 0, 0]);
    assert_eq!(fake(&driver).peek(chnl_offset(0)), 5 * 4);
}

#[test]
fn lane_status() {
    let mut driver = configured(&radar_params());
    fake(&driver).poke(lancs(0), 1 << LANCS_RXVALH_BIT);
    fake(&driver).poke(lancs(1), 1 << LANCS_STOP_BIT);
    assert_eq!(driver.lane_status(0, 0), Ok(LaneStatus::ValidReceiving));
    assert_eq!(driver.lane_status(0, 1), Ok(LaneStatus::Stop));
    assert_eq!(driver.lane_status(0, 2), Ok(LaneStatus::Off));
    assert_eq!(driver.lane_status(0, 4), Err(Csi2Error::InvalidLanesNr));
    fake(&driver).poke(lancs(1), (1 << LANCS_MARK_BIT) | (1 << LANCS_ULPA_BIT));
    assert_eq!(driver.lane_status(0, 1), Ok(LaneStatus::UltraLowPower));

    assert_eq!(driver.rx_stop(0), Ok(()));
    assert_eq!(driver.lane_status(0, 0), Err(Csi2Error::WrongState));
    assert_eq!(driver.lane_status(0, 1), Err(Csi2Error::RxStopped));
    assert_eq!(driver.power_off(0), Ok(()));
    assert_eq!(driver.lane_status(0, 1), Err(Csi2Error::PoweredOff));
}

#[test]
fn service_guards_driver() {
    let service: Csi2Service<FakePlatform> = Csi2Service::empty();
    assert!(service.get().is_empty());
    assert_eq!(service.get().driver().err(), Some(Csi2Error::NotInitialized));
    service.get().handle_irq(0, IrqClass::RxErr);

    assert_eq!(service.get().init(FakePlatform::new(1)), Ok(()));
    assert_eq!(service.get().init(FakePlatform::new(1)), Err(Csi2Error::WrongState));
    let mut guard = service.get();
    let driver = guard.driver().unwrap();
    assert_eq!(driver.configure(0, &radar_params()), Ok(()));
    assert_eq!(driver.interface_status(0), Ok(InterfaceStatus::On));
}
