// Copyright (c) 2024 texer.ai Ltd.

//! AI-assisted Logic Fuzzer: surgically gate and DPI-punch RTL signals for
//! logic fuzzing. See `sess::Session` for the pipeline entry point and
//! `cli::main` for the command-line driver.

pub mod backup;
pub mod cli;
pub mod config;
pub mod diagnostic;
pub mod dpi;
pub mod error;
pub mod flist;
pub mod gate;
pub mod hierarchy;
pub mod model;
pub mod punch;
pub mod selection;
pub mod sess;
pub mod source_model;
