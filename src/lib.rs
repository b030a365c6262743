// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025 1BitSquared <info@1bitsquared.com>

pub mod adi;
pub mod channel;
pub mod config;
pub mod coresight;
pub mod dap;
pub mod error;
pub mod mem_ap;

pub use crate::config::{DmemConfig, DmemParams};
pub use crate::dap::{DapAccess, DmemDap};
pub use crate::error::DapError;
