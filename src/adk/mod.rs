// SPDX-License-Identifier: MIT

//! Agent development kit: errors and the text-generation model seam

pub mod error;
pub mod model;
