//! Test helper modules for lectern-ap integration tests
//!
//! - audio_generator: in-memory WAV fixtures
//! - mock_synth: scripted speech provider
//! - test_engine: coordinator wired to a render pump

#![allow(dead_code)]

pub mod audio_generator;
pub mod mock_synth;
pub mod test_engine;

pub use audio_generator::{frames_for, sine_wav};
pub use mock_synth::MockSynthesizer;
pub use test_engine::{playlist, text_of, wait_until, TestEngine, TEST_RATE};
