use rodio::Source;
use std::f32::consts::PI;
use std::time::Duration;

/// Short sine beep with a linear fade-out so it doesn't click at the end.
pub struct CueTone {
    freq: f32,
    sample_rate: u32,
    num_sample: usize,
    total_samples: usize,
}

impl CueTone {
    pub fn new(freq: f32, duration: Duration) -> Self {
        let sample_rate = 44100;
        Self {
            freq,
            sample_rate,
            num_sample: 0,
            total_samples: (duration.as_secs_f32() * sample_rate as f32) as usize,
        }
    }
}

impl Iterator for CueTone {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.num_sample >= self.total_samples {
            return None;
        }
        self.num_sample += 1;

        let t = self.num_sample as f32 / self.sample_rate as f32;
        let envelope = 1.0 - self.num_sample as f32 / self.total_samples as f32;

        Some((2.0 * PI * self.freq * t).sin() * envelope * 0.25)
    }
}

impl Source for CueTone {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.total_samples - self.num_sample)
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f32(
            self.total_samples as f32 / self.sample_rate as f32,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_is_finite_and_fades_out() {
        let tone = CueTone::new(880.0, Duration::from_millis(100));
        let samples: Vec<f32> = tone.collect();
        assert_eq!(samples.len(), 4410);
        assert!(samples.iter().all(|s| s.abs() <= 0.25));
        assert!(samples.last().unwrap().abs() < 1e-3);
    }
}
