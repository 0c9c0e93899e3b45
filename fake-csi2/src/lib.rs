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

//! fake-csi2 is a register-level stand-in for the MIPICSI2 receiver and
//! the SoC around it, for running the driver on a host.

#![no_std]

extern crate alloc;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use csi2_interface::*;
use hashbrown::{HashMap, HashSet};
use log::trace;

/// One unit's register block. Unwritten registers read as 0.
#[derive(Default)]
pub struct FakeRegisters {
    words: RefCell<HashMap<usize, u32>>,
    bytes: RefCell<HashMap<usize, u8>>,
    w1c: RefCell<HashSet<usize>>,
    held: RefCell<HashMap<usize, u32>>,
    writes: RefCell<Vec<(usize, u32)>>,
}
impl FakeRegisters {
    pub fn new() -> Self { Self::default() }

    /// Makes `offset` a status register: writing 1s clears those bits.
    pub fn set_w1c(&self, offset: usize) { self.w1c.borrow_mut().insert(offset); }

    /// Hardware side: sets status bits.
    pub fn raise(&self, offset: usize, bits: u32) {
        *self.words.borrow_mut().entry(offset).or_insert(0) |= bits;
    }

    /// Register contents, ignoring any held value.
    pub fn peek(&self, offset: usize) -> u32 {
        self.words.borrow().get(&offset).copied().unwrap_or(0)
    }
    pub fn poke(&self, offset: usize, value: u32) { self.words.borrow_mut().insert(offset, value); }

    pub fn peek_byte(&self, offset: usize) -> u8 {
        self.bytes.borrow().get(&offset).copied().unwrap_or(0)
    }
    pub fn poke_byte(&self, offset: usize, value: u8) { self.bytes.borrow_mut().insert(offset, value); }

    /// Forces reads of `offset` to return `value` whatever gets written,
    /// like a block that stopped responding.
    pub fn hold(&self, offset: usize, value: u32) { self.held.borrow_mut().insert(offset, value); }
    pub fn release(&self, offset: usize) { self.held.borrow_mut().remove(&offset); }

    /// Values written to `offset`, oldest first.
    pub fn writes_to(&self, offset: usize) -> Vec<u32> {
        self.writes
            .borrow()
            .iter()
            .filter(|(o, _)| *o == offset)
            .map(|(_, v)| *v)
            .collect()
    }
    pub fn clear_writes(&self) { self.writes.borrow_mut().clear(); }
}
impl Csi2Registers for FakeRegisters {
    fn read(&self, offset: usize) -> u32 {
        if let Some(&value) = self.held.borrow().get(&offset) {
            return value;
        }
        self.peek(offset)
    }
    fn write(&self, offset: usize, value: u32) {
        self.writes.borrow_mut().push((offset, value));
        let mut words = self.words.borrow_mut();
        if self.w1c.borrow().contains(&offset) {
            *words.entry(offset).or_insert(0) &= !value;
        } else {
            words.insert(offset, value);
        }
    }
    fn read_byte(&self, offset: usize) -> u8 { self.peek_byte(offset) }
    fn write_byte(&self, offset: usize, value: u8) { self.poke_byte(offset, value) }
}

/// An IRQ line as registered by the driver.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct IrqLine {
    pub unit: usize,
    pub class: IrqClass,
    pub core: u8,
    pub priority: u8,
}

/// A SoC with `num_units` receivers, sparse byte-addressed memory and a
/// recording interrupt controller.
pub struct FakePlatform {
    units: Vec<FakeRegisters>,
    memory: RefCell<HashMap<usize, u8>>,
    predecessors: Vec<Option<usize>>,
    pll_owners: Vec<bool>,
    allowed_core: Option<u8>,
    fail_irq: bool,
    pub irqs: Vec<IrqLine>,
    pub clock_tilts: Cell<u32>,
    pub delays: Cell<u32>,
}
impl FakePlatform {
    pub fn new(num_units: usize) -> Self {
        FakePlatform {
            units: (0..num_units).map(|_| FakeRegisters::new()).collect(),
            memory: RefCell::new(HashMap::new()),
            predecessors: (0..num_units).map(|_| None).collect(),
            pll_owners: (0..num_units).map(|_| true).collect(),
            allowed_core: None,
            fail_irq: false,
            irqs: Vec::new(),
            clock_tilts: Cell::new(0),
            delays: Cell::new(0),
        }
    }

    pub fn unit(&self, unit: usize) -> &FakeRegisters { &self.units[unit] }

    /// `unit` may only be configured after `first`.
    pub fn set_predecessor(&mut self, unit: usize, first: usize) {
        self.predecessors[unit] = Some(first);
    }
    pub fn set_pll_owner(&mut self, unit: usize, owner: bool) { self.pll_owners[unit] = owner; }
    /// Restricts interrupt handling to `core`.
    pub fn set_allowed_core(&mut self, core: u8) { self.allowed_core = Some(core); }
    pub fn fail_irq_registration(&mut self, fail: bool) { self.fail_irq = fail; }

    pub fn write_memory(&self, addr: usize, data: &[u8]) {
        let mut memory = self.memory.borrow_mut();
        for (i, &b) in data.iter().enumerate() {
            memory.insert(addr + i, b);
        }
    }
}
impl Csi2Platform for FakePlatform {
    type Registers = FakeRegisters;

    fn num_units(&self) -> usize { self.units.len() }
    fn registers(&self, unit: usize) -> Option<&FakeRegisters> { self.units.get(unit) }
    fn required_predecessor(&self, unit: usize) -> Option<usize> {
        self.predecessors.get(unit).copied().flatten()
    }
    fn owns_pll(&self, unit: usize) -> bool { self.pll_owners.get(unit).copied().unwrap_or(false) }
    fn irq_core_allowed(&self, core: u8) -> bool { self.allowed_core.map_or(true, |c| c == core) }
    fn register_irq(
        &mut self,
        unit: usize,
        class: IrqClass,
        core: u8,
        priority: u8,
    ) -> Result<(), Csi2Error> {
        if self.fail_irq {
            return Err(Csi2Error::IrqHandlerRegistration);
        }
        trace!("register irq unit {} class {:?}", unit, class);
        self.irqs.push(IrqLine {
            unit,
            class,
            core,
            priority,
        });
        Ok(())
    }
    fn read_memory(&self, addr: usize, dest: &mut [u8]) {
        let memory = self.memory.borrow();
        for (i, b) in dest.iter_mut().enumerate() {
            *b = memory.get(&(addr + i)).copied().unwrap_or(0);
        }
    }
    fn clock_tilt(&self) { self.clock_tilts.set(self.clock_tilts.get() + 1); }
    fn delay(&self, loops: u32) { self.delays.set(self.delays.get() + loops); }
}
