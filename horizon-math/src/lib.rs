// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

pub mod lattice;

pub use lattice::cubic::CellMap;
pub use lattice::{Lattice3, LatticeError, Shape3};
