// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod address;
pub mod boot_script;
pub mod network;

pub use address::AddressBinder;
pub use boot_script::{shell_quote, BootScript};
pub use network::{ProvisionedHost, Provisioner};
