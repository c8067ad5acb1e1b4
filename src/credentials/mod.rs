// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Remote-access key material and bootstrap credential post-processing.

pub mod keypair;
pub mod rewrite;

pub use keypair::KeyPair;
pub use rewrite::{endpoint_for_address, rewrite, Rewrite};
