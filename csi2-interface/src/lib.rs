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

//! MIPI-CSI2 receiver interface: configuration types, error codes, the
//! interrupt report handed to application callbacks, and the hardware
//! seams a platform implements.

#![no_std]

use bitflags::bitflags;
use num_enum::{FromPrimitive, IntoPrimitive};

/// Receiver units supported by the largest SoC.
pub const MAX_UNITS: usize = 4;
/// Virtual channels per unit.
pub const MAX_VC: usize = 4;
/// Physical data lanes per unit.
pub const MAX_LANES: usize = 4;
pub const MIN_LANES: u8 = 1;
/// Channels per VC after complex (I/Q) doubling.
pub const MAX_CHANNELS: usize = 8;
/// Interrupt classes, see [`IrqClass`].
pub const MAX_IRQ_CLASSES: usize = 4;

/// Rx/Tx clock limits, in Mbps.
pub const MIN_CLK_FREQ: u32 = 80;
pub const MAX_CLK_FREQ: u32 = 2500;

pub const MIN_VC_BUF_LINES: u16 = 1;
/// Requests DC-offset auto-compute for a channel.
pub const OFFSET_AUTOCOMPUTE: i16 = 0x7fff;
/// Hardware-appended statistics trailer at the end of every buffer line.
pub const LINE_STAT_LENGTH: u32 = 80;
/// Buffer addresses and line lengths must be aligned to this.
pub const BUF_ALIGN: u32 = 16;

/// Return codes from the CSI2 driver api's.
#[repr(usize)]
#[derive(Debug, Default, Eq, PartialEq, FromPrimitive, IntoPrimitive, Copy, Clone)]
pub enum Csi2Error {
    Success = 0,
    WrongUnitId,
    NullParamPtr,
    NullVcParamPtr,
    VcAuxMismatch,
    NullErrCallback,
    NullIsrCallback,
    InvalidChannelNr,
    InvalidCalibMode,
    InvalidLanesNr,
    InvalidClockFreq,
    InvalidRxSwap,
    InvalidDataType,
    InvalidEventRequest,
    InvalidVcParams,
    InvalidDcParams,
    InvalidInitParams,
    TooSmallBuffer,
    NoSamplePerChirp,
    NoChirpsPerFrame,
    NoLineLength,
    BufLenNotAligned,
    BufPtrNull,
    BufPtrNotAligned,
    BufNumLinesErr,
    Unit0MustBeFirst,
    Unit1MustBeFirst,
    Unit2MustBeFirst,
    InvalidIrqNr,
    InvalidCoreNr,
    IrqHandlerRegistration,
    SwResetError,
    CalibrationTimeout,
    TimerError,
    HwResponseError,
    NotInitialized,
    WrongState,
    PoweredOff,
    RxStopped,
    #[default]
    UnknownError,
}
impl From<Csi2Error> for Result<(), Csi2Error> {
    fn from(err: Csi2Error) -> Result<(), Csi2Error> {
        if err == Csi2Error::Success {
            Ok(())
        } else {
            Err(err)
        }
    }
}

/// Interrupt sources of a unit; also indexes the callback table.
#[repr(usize)]
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum IrqClass {
    RxErr = 0,
    PathErr,
    Events,
    /// Turnaround/transmit errors; registered but not decoded.
    TxErr,
}
impl IrqClass {
    pub const ALL: [IrqClass; MAX_IRQ_CLASSES] =
        [IrqClass::RxErr, IrqClass::PathErr, IrqClass::Events, IrqClass::TxErr];
}

/// When the per-channel statistics are folded into the DC-offset computation.
#[derive(Debug, Default, Eq, PartialEq, Copy, Clone)]
pub enum StatPolicy {
    #[default]
    No,
    EveryLine,
    AtFrameEnd,
    LastLine,
}

bitflags! {
    /// Error bits reported at unit and VC level; the bits never overlap.
    #[derive(Default)]
    pub struct ErrorMask: u32 {
        const PHY_SYNC = 1 << 0;
        const PHY_NO_SYNC = 1 << 1;
        const PHY_ESC = 1 << 2;
        const PHY_SESC = 1 << 3;
        const PHY_CTRL = 1 << 4;
        const PACK_ECC1 = 1 << 6;
        const PACK_ECC2 = 1 << 7;
        const PACK_SYNC = 1 << 8;
        const PACK_DATA = 1 << 9;
        const PACK_CRC = 1 << 10;
        const PACK_ID = 1 << 11;
        const LINE_LEN = 1 << 13;
        const LINE_CNT = 1 << 14;
        const HS_EXIT = 1 << 15;
        const FIFO = 1 << 16;
        const BUF_OVERFLOW = 1 << 17;
        const AXI_OVERFLOW = 1 << 18;
        const AXI_RESPONSE = 1 << 19;
        const SPURIOUS_PHY = 1 << 20;
        const SPURIOUS_PKT = 1 << 21;
        const SPURIOUS_EVT = 1 << 22;
    }
}

bitflags! {
    /// Per-VC events, both requested at setup and reported by callback.
    #[derive(Default)]
    pub struct EventMask: u8 {
        const FRAME_START = 1 << 0;
        const FRAME_END = 1 << 1;
        const SHORT_PACKET = 1 << 2;
        const LINE_END = 1 << 3;
        const SKEW_CALIB = 1 << 4;
        const BIT_NOT_TOGGLE = 1 << 5;
        const NEXT_START_NOT_0 = 1 << 6;
        const IN_FRAME = 1 << 7;
    }
}

bitflags! {
    /// How a VC's data is laid out in its buffer.
    #[derive(Default)]
    pub struct OutputMode: u16 {
        const COMPLEX = 0x10;
        const FIFTH_CH_ON = 0x20;
        const FIFTH_CH_1_OF_2 = 0x40;
        const FIFTH_CH_3_OF_4 = 0x80;
        const FIFTH_CH_MODE_1 = 0xc0;
        const TILE8 = 0x100;
        const TILE16 = 0x200;
        const FLIP_SIGN = 0x400;
        const SWAP_RAW8 = 0x800;
    }
}
impl OutputMode {
    /// Fifth (auxiliary) channel drop mode field; 0 means mode 0 without drop.
    pub fn fifth_ch_mode(&self) -> u16 { self.bits() & Self::FIFTH_CH_MODE_1.bits() }
}

/// MIPI-CSI2 data type code, optionally tagged with an auxiliary sub-type
/// above bit 6.
#[derive(Debug, Default, Eq, PartialEq, Copy, Clone)]
pub struct DataStreamType(pub u16);
impl DataStreamType {
    pub const EMBD: Self = Self(0x12);
    pub const YUV422_8: Self = Self(0x1e);
    pub const YUV422_10: Self = Self(0x1f);
    pub const RGB565: Self = Self(0x22);
    pub const RGB888: Self = Self(0x24);
    pub const RAW8: Self = Self(0x2a);
    pub const RAW10: Self = Self(0x2b);
    pub const RAW12: Self = Self(0x2c);
    pub const RAW14: Self = Self(0x2d);
    pub const USR0: Self = Self(0x30);
    pub const USR1: Self = Self(0x31);
    pub const USR2: Self = Self(0x32);
    pub const USR3: Self = Self(0x33);
    pub const USR4: Self = Self(0x34);
    pub const USR5: Self = Self(0x35);
    /// Received as RAW8, written out as 16-bit samples.
    pub const FROM_8_TO_16: Self = Self(0x36);
    pub const USR7: Self = Self(0x37);

    // Auxiliary sub-type masks, and the RAW12 combinations to use with them.
    pub const AUX_0_NO_DROP: Self = Self(0x40);
    pub const R12_A0_NO_DROP: Self = Self(0x6c);
    pub const AUX_0_DR_1OF2: Self = Self(0x80);
    pub const R12_A0_DR_1OF2: Self = Self(0xac);
    pub const AUX_0_DR_3OF4: Self = Self(0xc0);
    pub const R12_A0_DR_3OF4: Self = Self(0xec);
    pub const AUX_1_NO_DROP: Self = Self(0x100);
    pub const R12_A1_NO_DROP: Self = Self(0x12c);
    pub const MAX: Self = Self(0x13f);

    pub const BASE_MASK: u16 = 0x3f;

    /// The standard MIPI code with any auxiliary tag removed.
    pub fn base(&self) -> u16 { self.0 & Self::BASE_MASK }
    /// The auxiliary sub-type tag, 0 for plain data.
    pub fn aux_mode(&self) -> u16 { self.0 & !Self::BASE_MASK }
    pub fn is_aux(&self) -> bool { self.0 >= Self::AUX_0_NO_DROP.0 }
}

/// Virtual channel configuration. Also used for the auxiliary (fifth
/// channel) buffer of a VC.
#[derive(Debug, Default, Copy, Clone)]
pub struct VcParams {
    pub stream_type: DataStreamType,
    /// Channels (antennas); doubled by the driver for complex data.
    pub channels: u8,
    pub events_req: EventMask,
    /// Samples per channel per line.
    pub expected_samples: u16,
    /// Lines (chirps) per frame.
    pub expected_lines: u16,
    /// Complete lines held by the circular buffer.
    pub buf_num_lines: u16,
    /// Bytes per buffer line, including the statistics trailer if used.
    pub buf_line_len: u16,
    pub output_mode: OutputMode,
    /// Physical address of the buffer.
    pub buf_addr: usize,
    pub offset_comp_real: [i16; MAX_CHANNELS],
    pub offset_comp_img: [i16; MAX_CHANNELS],
    pub gpio1_mask: u8,
    pub gpio1_ena: u8,
    pub gpio2_ena: u8,
    pub sdma1_mask: u8,
    pub sdma1_ena: u8,
    pub sdma2_ena: u8,
    /// Lines between two line-end callbacks.
    pub buf_num_lines_trigger: u8,
}

/// Callback invoked from interrupt context. The report is only valid for
/// the duration of the call.
pub type Csi2Callback = fn(&Csi2Report);

/// Unit configuration.
#[derive(Debug, Default, Copy, Clone)]
pub struct InitParams {
    pub num_lanes_rx: u8,
    /// Physical lane used for each logical lane.
    pub lanes_map_rx: [u8; MAX_LANES],
    pub num_lanes_tx: u8,
    pub stat_policy: StatPolicy,
    pub tx_clk_freq: u32,
    pub rx_clk_freq: u32,
    pub vc: [Option<VcParams>; MAX_VC],
    pub aux: [Option<VcParams>; MAX_VC],
    /// Indexed by [`IrqClass`]; unset classes use the Rx error callback.
    pub callbacks: [Option<Csi2Callback>; MAX_IRQ_CLASSES],
    pub irq_core: u8,
    pub irq_priority: u8,
}

#[derive(Debug, Default, Eq, PartialEq, Copy, Clone)]
pub struct ShortPacket {
    pub data_id: u8,
    pub data: u16,
}

#[derive(Debug, Default, Eq, PartialEq, Copy, Clone)]
pub struct LineLengthErr {
    /// First line with a wrong length, or the lines received for a count error.
    pub line_pos: u16,
    /// Received length; only meaningful for a line length error.
    pub line_length: u16,
}

/// Everything one interrupt occurrence has to say.
#[derive(Debug, Default, Eq, PartialEq, Copy, Clone)]
pub struct Csi2Report {
    pub unit: usize,
    pub err_mask_u: ErrorMask,
    pub err_mask_vc: [ErrorMask; MAX_VC],
    pub evt_mask_vc: [EventMask; MAX_VC],
    pub invalid_packet_id: [u8; MAX_VC],
    pub ecc_one_bit_pos: [u8; MAX_VC],
    pub expected_crc: [u16; MAX_VC],
    pub received_crc: [u16; MAX_VC],
    /// 1 means the bit never toggled during the frame.
    pub not_toggled_bits: [u16; MAX_CHANNELS],
    pub line_length_err: [LineLengthErr; MAX_VC],
    pub short_packets: [ShortPacket; MAX_VC],
}
impl Csi2Report {
    pub fn new(unit: usize) -> Self {
        Csi2Report {
            unit,
            ..Default::default()
        }
    }
}

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum InterfaceStatus {
    On,
    Stopped,
    Off,
}

/// Hardware-observed state of one data lane.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum LaneStatus {
    Off,
    On,
    Mark,
    UltraLowPower,
    Stop,
    Receiving,
    ValidReceiving,
}

/// Access to one unit's register block. Offsets are bytes from the block
/// base; status registers are write-1-to-clear.
pub trait Csi2Registers {
    fn read(&self, offset: usize) -> u32;
    fn write(&self, offset: usize, value: u32);
    fn read_byte(&self, offset: usize) -> u8;
    fn write_byte(&self, offset: usize, value: u8);

    fn modify(&self, offset: usize, f: impl FnOnce(u32) -> u32) {
        self.write(offset, f(self.read(offset)));
    }
}

/// Interrupt controller facility used to wire a unit's handlers.
pub trait IrqRegistrar {
    /// Returns false if the line could not be registered.
    fn register(&mut self, irq: u32, core: u8, priority: u8, unit: usize, class: IrqClass) -> bool;
}

/// Everything the driver needs from the SoC it runs on.
pub trait Csi2Platform {
    type Registers: Csi2Registers;

    /// Units wired on this SoC.
    fn num_units(&self) -> usize;
    /// None if the unit has no mapped register block.
    fn registers(&self, unit: usize) -> Option<&Self::Registers>;
    /// Unit that must be configured before `unit`, if any.
    fn required_predecessor(&self, unit: usize) -> Option<usize>;
    /// Whether `unit` drives the PLL shared with its sibling.
    fn owns_pll(&self, unit: usize) -> bool;
    fn irq_core_allowed(&self, core: u8) -> bool;
    fn register_irq(
        &mut self,
        unit: usize,
        class: IrqClass,
        core: u8,
        priority: u8,
    ) -> Result<(), Csi2Error>;
    /// Copies frame buffer memory at physical `addr` into `dest`.
    fn read_memory(&self, addr: usize, dest: &mut [u8]);
    /// Gates then ungates the receiver's interface clock.
    fn clock_tilt(&self);
    fn delay(&self, loops: u32);
}
