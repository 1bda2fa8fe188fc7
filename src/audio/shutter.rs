use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rodio::Source;
use std::time::Duration;

/// Camera-shutter click: a burst of white noise with a fast exponential decay.
pub struct ShutterClick {
    sample_rate: u32,
    remaining: usize,
    gain: f32,
    rng: StdRng,
}

impl ShutterClick {
    pub fn new() -> Self {
        let sample_rate = 44100;
        Self {
            sample_rate,
            remaining: (sample_rate as usize * 80) / 1000,
            gain: 0.5,
            rng: StdRng::from_entropy(),
        }
    }
}

impl Iterator for ShutterClick {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let white: f32 = self.rng.gen_range(-1.0..1.0);
        self.gain *= 0.9985;

        Some(white * self.gain)
    }
}

impl Source for ShutterClick {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.remaining)
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_millis(80))
    }
}
