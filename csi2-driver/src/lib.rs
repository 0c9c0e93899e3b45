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

//! MIPI-CSI2 receiver driver.
//!
//! A [`Csi2Driver`] owns the platform and the runtime state of every unit.
//! Control operations (configure, stop/start, power off/on, status) are
//! called from thread context; the interrupt entry points decode the
//! hardware status and report through the callbacks given at configure
//! time. [`Csi2Service`] puts a driver behind a lock for sharing between
//! the two.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod control;
pub mod dphy;
pub mod irq;
pub mod platform;
pub mod position;
pub mod registers;
pub mod stats;
pub mod unit;

pub use config::{real_line_length, wire_line_length};
pub use platform::{DefaultSoc, MmioPlatform, MmioRegisters, S32r294, S32r45, Soc};
pub use unit::UnitState;

use csi2_interface::*;
use registers::{ChannelStat, CHANNEL_STAT_SIZE};
use spin::{Mutex, MutexGuard};
use static_assertions::const_assert_eq;
use unit::Unit;

const_assert_eq!(core::mem::size_of::<ChannelStat>(), CHANNEL_STAT_SIZE);

pub struct Csi2Driver<P> {
    pub(crate) platform: P,
    pub(crate) units: [Unit; MAX_UNITS],
}
impl<P: Csi2Platform> Csi2Driver<P> {
    pub fn new(platform: P) -> Self {
        Csi2Driver {
            platform,
            units: Default::default(),
        }
    }

    pub fn platform(&self) -> &P { &self.platform }
    pub fn platform_mut(&mut self) -> &mut P { &mut self.platform }

    /// None for a unit id out of range.
    pub fn unit_state(&self, unit: usize) -> Option<UnitState> {
        self.units.get(unit).map(|u| u.state)
    }
}

pub struct Csi2Service<P> {
    driver: Mutex<Option<Csi2Driver<P>>>,
}
impl<P> Csi2Service<P> {
    pub const fn empty() -> Csi2Service<P> {
        Csi2Service {
            driver: Mutex::new(None),
        }
    }

    pub fn get(&self) -> Guard<'_, P> {
        Guard {
            driver: self.driver.lock(),
        }
    }
}
pub struct Guard<'a, P> {
    driver: MutexGuard<'a, Option<Csi2Driver<P>>>,
}
impl<'a, P: Csi2Platform> Guard<'a, P> {
    pub fn is_empty(&self) -> bool { self.driver.is_none() }

    pub fn init(&mut self, platform: P) -> Result<(), Csi2Error> {
        if self.driver.is_some() {
            return Err(Csi2Error::WrongState);
        }
        *self.driver = Some(Csi2Driver::new(platform));
        Ok(())
    }

    pub fn driver(&mut self) -> Result<&mut Csi2Driver<P>, Csi2Error> {
        self.driver.as_mut().ok_or(Csi2Error::NotInitialized)
    }

    /// Interrupt entry; does nothing before init.
    pub fn handle_irq(&mut self, unit: usize, class: IrqClass) {
        if let Some(driver) = self.driver.as_mut() {
            driver.handle_irq(unit, class);
        }
    }
}
