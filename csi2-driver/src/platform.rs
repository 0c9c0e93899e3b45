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

//! SoC descriptions and the memory-mapped platform.

use cfg_if::cfg_if;
use core::marker::PhantomData;
use csi2_interface::*;
use log::{error, trace};

/// What differs between the SoCs carrying the receiver.
pub trait Soc {
    const NAME: &'static str;
    const NUM_UNITS: usize;
    /// IRQ number of unit 0 for each interrupt class.
    const IRQ_BASE: [u32; MAX_IRQ_CLASSES];
    /// Position of each unit in the interrupt map.
    const IRQ_UNIT_REMAP: [u32; MAX_UNITS];
    const IRQ_UNIT_GAP: u32 = 4;

    fn required_predecessor(unit: usize) -> Option<usize>;
    fn owns_pll(unit: usize) -> bool;
    fn irq_core_allowed(core: u8, current_core: u8) -> bool;

    fn irq_number(unit: usize, class: IrqClass) -> u32 {
        Self::IRQ_BASE[class as usize] + Self::IRQ_UNIT_GAP * Self::IRQ_UNIT_REMAP[unit]
    }
}

/// Four units in two pairs; the first unit of each pair drives the PLL.
pub struct S32r45;
impl Soc for S32r45 {
    const NAME: &'static str = "S32R45";
    const NUM_UNITS: usize = 4;
    const IRQ_BASE: [u32; MAX_IRQ_CLASSES] = [204, 205, 206, 207];
    const IRQ_UNIT_REMAP: [u32; MAX_UNITS] = [1, 0, 3, 2];

    fn required_predecessor(unit: usize) -> Option<usize> {
        match unit {
            1 => Some(0),
            3 => Some(2),
            _ => None,
        }
    }
    fn owns_pll(unit: usize) -> bool { unit == 0 || unit == 2 }
    fn irq_core_allowed(_core: u8, _current_core: u8) -> bool { true }
}

/// Two units; unit 1 drives the PLL and handlers run on the calling core.
pub struct S32r294;
impl Soc for S32r294 {
    const NAME: &'static str = "S32R294";
    const NUM_UNITS: usize = 2;
    const IRQ_BASE: [u32; MAX_IRQ_CLASSES] = [758, 759, 760, 761];
    const IRQ_UNIT_REMAP: [u32; MAX_UNITS] = [0, 1, 2, 3];

    fn required_predecessor(unit: usize) -> Option<usize> {
        match unit {
            0 => Some(1),
            _ => None,
        }
    }
    fn owns_pll(unit: usize) -> bool { unit == 1 }
    fn irq_core_allowed(core: u8, current_core: u8) -> bool { core == current_core }
}

cfg_if! {
    if #[cfg(feature = "CONFIG_PLAT_S32R294")] {
        pub type DefaultSoc = S32r294;
    } else {
        pub type DefaultSoc = S32r45;
    }
}

/// A register block reached through volatile accesses.
#[derive(Debug)]
pub struct MmioRegisters {
    base: usize,
}
impl MmioRegisters {
    /// # Safety
    ///
    /// `base` must map a complete receiver (or DFS) register block for as
    /// long as the returned value is used.
    pub unsafe fn new(base: usize) -> Self { MmioRegisters { base } }
}
impl Csi2Registers for MmioRegisters {
    fn read(&self, offset: usize) -> u32 {
        unsafe { ((self.base + offset) as *const u32).read_volatile() }
    }
    fn write(&self, offset: usize, value: u32) {
        unsafe { ((self.base + offset) as *mut u32).write_volatile(value) }
    }
    fn read_byte(&self, offset: usize) -> u8 {
        unsafe { ((self.base + offset) as *const u8).read_volatile() }
    }
    fn write_byte(&self, offset: usize, value: u8) {
        unsafe { ((self.base + offset) as *mut u8).write_volatile(value) }
    }
}

// DFS port used to gate the receivers' interface clock.
const DFS_PORTSR: usize = 0x0c;
const DFS_PORTRESET: usize = 0x14;
const DFS_PORT_CSI2: u32 = 1 << 2;
const DFS_LOCK_TRIES: u32 = 3;
const DFS_LOCK_DELAY: u32 = 15;

/// The receivers of SoC `S` at fixed addresses, with interrupts wired
/// through `I`.
pub struct MmioPlatform<S: Soc, I: IrqRegistrar> {
    units: [Option<MmioRegisters>; MAX_UNITS],
    dfs: MmioRegisters,
    irq: I,
    current_core: u8,
    _soc: PhantomData<S>,
}
impl<S: Soc, I: IrqRegistrar> MmioPlatform<S, I> {
    /// # Safety
    ///
    /// Each entry of `unit_bases` must map the register block of that unit,
    /// `dfs_base` the DFS block, and buffers handed to the driver must be
    /// readable at their physical address.
    pub unsafe fn new(unit_bases: &[usize], dfs_base: usize, irq: I, current_core: u8) -> Self {
        let mut units: [Option<MmioRegisters>; MAX_UNITS] = Default::default();
        for (slot, &base) in units.iter_mut().zip(unit_bases.iter()).take(S::NUM_UNITS) {
            *slot = Some(MmioRegisters::new(base));
        }
        MmioPlatform {
            units,
            dfs: MmioRegisters::new(dfs_base),
            irq,
            current_core,
            _soc: PhantomData,
        }
    }
}
impl<S: Soc, I: IrqRegistrar> Csi2Platform for MmioPlatform<S, I> {
    type Registers = MmioRegisters;

    fn num_units(&self) -> usize { S::NUM_UNITS }
    fn registers(&self, unit: usize) -> Option<&MmioRegisters> {
        self.units.get(unit).and_then(Option::as_ref)
    }
    fn required_predecessor(&self, unit: usize) -> Option<usize> { S::required_predecessor(unit) }
    fn owns_pll(&self, unit: usize) -> bool { S::owns_pll(unit) }
    fn irq_core_allowed(&self, core: u8) -> bool { S::irq_core_allowed(core, self.current_core) }

    fn register_irq(
        &mut self,
        unit: usize,
        class: IrqClass,
        core: u8,
        priority: u8,
    ) -> Result<(), Csi2Error> {
        if unit >= S::NUM_UNITS {
            return Err(Csi2Error::InvalidIrqNr);
        }
        let irq = S::irq_number(unit, class);
        trace!("{}: unit {} {:?} -> irq {}", S::NAME, unit, class, irq);
        if !self.irq.register(irq, core, priority, unit, class) {
            error!("irq {} registration failed", irq);
            return Err(Csi2Error::IrqHandlerRegistration);
        }
        Ok(())
    }

    fn read_memory(&self, addr: usize, dest: &mut [u8]) {
        for (i, b) in dest.iter_mut().enumerate() {
            *b = unsafe { ((addr + i) as *const u8).read_volatile() };
        }
    }

    fn clock_tilt(&self) {
        self.dfs.modify(DFS_PORTRESET, |v| v | DFS_PORT_CSI2);
        let mut tries = DFS_LOCK_TRIES;
        while self.dfs.read(DFS_PORTSR) & DFS_PORT_CSI2 != 0 && tries > 0 {
            self.delay(DFS_LOCK_DELAY);
            tries -= 1;
        }
        self.dfs.modify(DFS_PORTRESET, |v| v & !DFS_PORT_CSI2);
    }

    fn delay(&self, loops: u32) {
        for _ in 0..loops {
            core::hint::spin_loop();
        }
    }
}
