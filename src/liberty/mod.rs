// SPDX-License-Identifier: Apache-2.0

pub mod family;
pub mod liberty_parser;
pub mod library;
pub mod timing_table;
pub use family::{split_cell_family, CellFamily};
pub use library::{Cell, Pin, PinDirection, TimingArc, TimingLibrary};
pub use timing_table::DelayTable;
