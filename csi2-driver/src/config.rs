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

//! Unit parameter validation and buffer geometry.

use csi2_interface::*;
use log::error;

/// Bytes one sample occupies in the output buffer; 0 for unknown types.
pub fn bytes_per_sample(stream_type: DataStreamType) -> u32 {
    match DataStreamType(stream_type.base()) {
        DataStreamType::EMBD
        | DataStreamType::USR0
        | DataStreamType::USR1
        | DataStreamType::USR2
        | DataStreamType::USR3
        | DataStreamType::USR4
        | DataStreamType::USR5
        | DataStreamType::USR7 => 1,
        DataStreamType::RAW8
        | DataStreamType::RAW10
        | DataStreamType::RAW12
        | DataStreamType::RAW14
        | DataStreamType::YUV422_8
        | DataStreamType::FROM_8_TO_16 => 2,
        DataStreamType::RGB888 | DataStreamType::YUV422_10 | DataStreamType::RGB565 => 3,
        _ => 0,
    }
}

/// Bits one sample occupies on the wire; 0 for unknown types.
pub fn bits_per_sample(stream_type: DataStreamType) -> u32 {
    match DataStreamType(stream_type.base()) {
        DataStreamType::EMBD
        | DataStreamType::USR0
        | DataStreamType::USR1
        | DataStreamType::USR2
        | DataStreamType::USR3
        | DataStreamType::USR4
        | DataStreamType::USR5
        | DataStreamType::USR7
        | DataStreamType::RAW8 => 8,
        DataStreamType::RAW10 => 10,
        DataStreamType::RAW12 => 12,
        DataStreamType::RAW14 => 14,
        DataStreamType::YUV422_8 | DataStreamType::RGB565 | DataStreamType::FROM_8_TO_16 => 16,
        DataStreamType::YUV422_10 => 20,
        DataStreamType::RGB888 => 24,
        _ => 0,
    }
}

pub fn align_up(len: u32, align: u32) -> u32 { (len + align - 1) & !(align - 1) }

/// Buffer bytes needed per line for `samples` samples on each of
/// `channels` channels. Auxiliary sub-types apply their drop ratio and are
/// not aligned; plain types get the statistics trailer if asked for, then
/// 16-byte alignment. Returns 0 for any invalid input.
pub fn real_line_length(
    stream_type: DataStreamType,
    channels: u8,
    samples: u16,
    want_stats: bool,
) -> u32 {
    let bytes = bytes_per_sample(stream_type);
    if channels == 0 || channels as usize > MAX_CHANNELS || samples == 0 || bytes == 0 {
        return 0;
    }
    let len = bytes * channels as u32 * samples as u32;
    if stream_type.0 > DataStreamType::AUX_0_NO_DROP.0 {
        match DataStreamType(stream_type.aux_mode()) {
            DataStreamType::AUX_0_NO_DROP => len,
            DataStreamType::AUX_0_DR_1OF2 | DataStreamType::AUX_1_NO_DROP => (len + 1) / 2,
            DataStreamType::AUX_0_DR_3OF4 => (len + 3) / 4,
            _ => 0,
        }
    } else {
        let len = if want_stats { len + LINE_STAT_LENGTH } else { len };
        align_up(len, BUF_ALIGN)
    }
}

/// Bytes per line as received on the interface. With the fifth channel
/// enabled the auxiliary samples travel interleaved with the data, so the
/// line grows by half (mode 1) or doubles (mode 0).
pub fn wire_line_length(params: &VcParams) -> u32 {
    let len = params.expected_samples as u32
        * bits_per_sample(params.stream_type)
        * params.channels as u32
        / 8;
    if !params.output_mode.contains(OutputMode::FIFTH_CH_ON) {
        len
    } else if params.output_mode.fifth_ch_mode() == OutputMode::FIFTH_CH_MODE_1.bits() {
        len * 3 / 2
    } else {
        len * 2
    }
}

/// Channels the hardware delivers for `params`: complex data carries the
/// real and imaginary parts as separate channels.
pub fn real_channels(channels: u8, mode: OutputMode) -> usize {
    if mode.contains(OutputMode::COMPLEX) {
        channels as usize * 2
    } else {
        channels as usize
    }
}

/// True if any channel asks for its DC offset to be computed.
pub fn wants_auto_dc(params: &VcParams) -> bool {
    let n = (params.channels as usize).min(MAX_CHANNELS);
    let complex = params.output_mode.contains(OutputMode::COMPLEX);
    (0..n).any(|i| {
        params.offset_comp_real[i] == OFFSET_AUTOCOMPUTE
            || (complex && params.offset_comp_img[i] == OFFSET_AUTOCOMPUTE)
    })
}

// The auxiliary sub-type tagged on the stream must match the fifth
// channel mode selected in the output mode.
fn check_aux_mode(params: &VcParams) -> Result<(), Csi2Error> {
    let aux = params.stream_type.aux_mode();
    if aux == 0 {
        return Ok(());
    }
    let expected = match DataStreamType(aux) {
        DataStreamType::AUX_0_NO_DROP => 0,
        DataStreamType::AUX_0_DR_1OF2 => OutputMode::FIFTH_CH_1_OF_2.bits(),
        DataStreamType::AUX_0_DR_3OF4 => OutputMode::FIFTH_CH_3_OF_4.bits(),
        DataStreamType::AUX_1_NO_DROP => OutputMode::FIFTH_CH_MODE_1.bits(),
        _ => return Err(Csi2Error::InvalidDataType),
    };
    if params.stream_type.0 > DataStreamType::MAX.0 || params.output_mode.fifth_ch_mode() != expected {
        return Err(Csi2Error::InvalidDataType);
    }
    Ok(())
}

/// Checks one VC (or auxiliary buffer) configuration.
pub fn check_vc_params(params: &VcParams) -> Result<(), Csi2Error> {
    if real_line_length(params.stream_type, params.channels, params.expected_samples, false) == 0 {
        return Err(Csi2Error::InvalidDataType);
    }
    if params.events_req.contains(EventMask::LINE_END) && params.buf_num_lines_trigger == 0 {
        return Err(Csi2Error::InvalidEventRequest);
    }
    if real_channels(params.channels, params.output_mode) > MAX_CHANNELS {
        return Err(Csi2Error::InvalidChannelNr);
    }
    if params.buf_num_lines < MIN_VC_BUF_LINES {
        return Err(Csi2Error::BufNumLinesErr);
    }
    if params.buf_addr & (BUF_ALIGN as usize - 1) != 0 {
        return Err(Csi2Error::BufPtrNotAligned);
    }
    if params.buf_addr == 0 {
        return Err(Csi2Error::BufPtrNull);
    }
    if params.buf_line_len as u32 & (BUF_ALIGN - 1) != 0 {
        return Err(Csi2Error::BufLenNotAligned);
    }
    if params.buf_line_len == 0 {
        return Err(Csi2Error::NoLineLength);
    }
    if params.expected_lines == 0 {
        return Err(Csi2Error::NoChirpsPerFrame);
    }
    if params.expected_samples == 0 {
        return Err(Csi2Error::NoSamplePerChirp);
    }
    if params.output_mode.contains(OutputMode::FIFTH_CH_ON) {
        check_aux_mode(params)?;
    }
    Ok(())
}

fn check_lanes(params: &InitParams) -> Result<(), Csi2Error> {
    if params.num_lanes_rx < MIN_LANES || params.num_lanes_rx as usize > MAX_LANES {
        return Err(Csi2Error::InvalidLanesNr);
    }
    Ok(())
}

// Logical lanes in use must map onto distinct physical lanes.
fn check_lane_swap(params: &InitParams) -> Result<(), Csi2Error> {
    let mut used = 0u32;
    for &lane in &params.lanes_map_rx[..params.num_lanes_rx as usize] {
        if lane as usize >= MAX_LANES {
            return Err(Csi2Error::InvalidRxSwap);
        }
        used |= 1 << lane;
    }
    if used.count_ones() != params.num_lanes_rx as u32 {
        return Err(Csi2Error::InvalidRxSwap);
    }
    Ok(())
}

fn check_clocks(params: &InitParams) -> Result<(), Csi2Error> {
    let range = MIN_CLK_FREQ..=MAX_CLK_FREQ;
    if !range.contains(&params.rx_clk_freq) || !range.contains(&params.tx_clk_freq) {
        return Err(Csi2Error::InvalidClockFreq);
    }
    Ok(())
}

fn check_virtual_channels(params: &InitParams) -> Result<(), Csi2Error> {
    for (vc, aux) in params.vc.iter().zip(params.aux.iter()) {
        if let Some(vc) = vc {
            check_vc_params(vc)?;
        }
        if let Some(aux) = aux {
            check_vc_params(aux)?;
        }
        if vc.map_or(false, |vc| vc.stream_type.0 > DataStreamType::USR7.0)
            || aux.map_or(false, |aux| aux.stream_type.0 < DataStreamType::AUX_0_NO_DROP.0)
        {
            return Err(Csi2Error::InvalidDataType);
        }
        if vc.is_none() && aux.is_some() {
            return Err(Csi2Error::VcAuxMismatch);
        }
    }
    Ok(())
}

/// Validates a unit configuration, returning the first violation found.
pub fn validate_init_params(params: &InitParams, irq_core_allowed: bool) -> Result<(), Csi2Error> {
    check_lanes(params)?;
    if params.vc.iter().all(Option::is_none) {
        return Err(Csi2Error::NullVcParamPtr);
    }
    check_lane_swap(params)?;
    check_clocks(params)?;
    check_virtual_channels(params)?;
    let auto_dc = params.vc.iter().flatten().any(wants_auto_dc);
    if auto_dc && params.stat_policy == StatPolicy::No {
        return Err(Csi2Error::InvalidDcParams);
    }
    if params.callbacks[IrqClass::RxErr as usize].is_none() {
        return Err(Csi2Error::NullErrCallback);
    }
    if !irq_core_allowed {
        error!("irq core {} not allowed", params.irq_core);
        return Err(Csi2Error::InvalidCoreNr);
    }
    Ok(())
}
