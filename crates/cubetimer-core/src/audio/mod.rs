//! Audio processing module
//!
//! This module contains all Stackmat line-in functionality including:
//! - Line-in device management ([`engine`])
//! - Wire packet model and validation ([`packet`])
//! - Threshold/polarity search and majority vote decoding ([`decoder`])
//! - Continuous read-and-decode loop ([`reader`])
//! - Synthetic Stackmat signals for tests and simulation ([`signal`])

pub mod decoder;
pub mod engine;
pub mod packet;
pub mod reader;
pub mod signal;
