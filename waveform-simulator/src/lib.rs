//! Generates synthetic SiPM acquisitions in the text waveform format.
//!
//! Each run holds triggered single pulses, pulses followed by an afterpulse,
//! and untriggered dark pulses over gaussian noise, with optional clipping.
mod pulse;
mod simulation;

pub use pulse::Pulse;
pub use simulation::{
    SimulatedWaveform, SimulationConfig, SimulationError, Truth, simulate, write_run,
};
