// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

/// The shape of a gain ramp.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FadeCurve {
    Linear,
    /// Sine/cosine shaped, so that two opposing ramps sum to constant power.
    EqualPower,
}

/// A gain ramp, advanced one frame at a time by the mixer.
#[derive(Debug)]
pub struct Ramp {
    start: f32,
    target: f32,
    total_frames: u64,
    elapsed_frames: u64,
    curve: FadeCurve,
    current: f32,
}

impl Ramp {
    fn constant(value: f32) -> Ramp {
        Ramp {
            start: value,
            target: value,
            total_frames: 0,
            elapsed_frames: 0,
            curve: FadeCurve::Linear,
            current: value,
        }
    }

    /// Returns the gain for the next frame and advances the ramp.
    pub fn next_frame(&mut self) -> f32 {
        if self.elapsed_frames >= self.total_frames {
            self.current = self.target;
            return self.current;
        }

        let x = self.elapsed_frames as f32 / self.total_frames as f32;
        self.current = match self.curve {
            FadeCurve::Linear => self.start + (self.target - self.start) * x,
            FadeCurve::EqualPower if self.target >= self.start => {
                self.start + (self.target - self.start) * (x * FRAC_PI_2).sin()
            }
            FadeCurve::EqualPower => {
                self.target + (self.start - self.target) * (x * FRAC_PI_2).cos()
            }
        };
        self.elapsed_frames += 1;
        self.current
    }

    fn is_ramping(&self) -> bool {
        self.elapsed_frames < self.total_frames
    }
}

/// A gain handle shared between the control side, which schedules ramps, and the mixer,
/// which applies them.
#[derive(Clone, Debug)]
pub struct Gain {
    ramp: Arc<Mutex<Ramp>>,
}

impl Gain {
    pub fn new(value: f32) -> Gain {
        Gain {
            ramp: Arc::new(Mutex::new(Ramp::constant(value))),
        }
    }

    /// The most recently applied gain.
    pub fn value(&self) -> f32 {
        self.ramp.lock().current
    }

    /// Jumps to the given gain, cancelling any ramp.
    pub fn set(&self, value: f32) {
        *self.ramp.lock() = Ramp::constant(value);
    }

    /// Ramps from the current gain to the target over the given number of frames.
    pub fn ramp_to(&self, target: f32, frames: u64, curve: FadeCurve) {
        let mut ramp = self.ramp.lock();
        if frames == 0 {
            *ramp = Ramp::constant(target);
            return;
        }
        *ramp = Ramp {
            start: ramp.current,
            target,
            total_frames: frames,
            elapsed_frames: 0,
            curve,
            current: ramp.current,
        };
    }

    pub fn is_ramping(&self) -> bool {
        self.ramp.lock().is_ramping()
    }

    /// Locks the ramp for a block of frames.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Ramp> {
        self.ramp.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(gain: &Gain, frames: usize) -> Vec<f32> {
        let mut ramp = gain.lock();
        (0..frames).map(|_| ramp.next_frame()).collect()
    }

    #[test]
    fn test_constant_gain() {
        let gain = Gain::new(0.5);
        assert_eq!(vec![0.5; 4], run(&gain, 4));
        assert!(!gain.is_ramping());
    }

    #[test]
    fn test_linear_ramp() {
        let gain = Gain::new(1.0);
        gain.ramp_to(0.0, 4, FadeCurve::Linear);
        assert!(gain.is_ramping());
        assert_eq!(vec![1.0, 0.75, 0.5, 0.25, 0.0, 0.0], run(&gain, 6));
        assert!(!gain.is_ramping());
        assert_eq!(0.0, gain.value());
    }

    #[test]
    fn test_equal_power_crossfade_is_constant_power() {
        let fade_in = Gain::new(0.0);
        let fade_out = Gain::new(1.0);
        fade_in.ramp_to(1.0, 100, FadeCurve::EqualPower);
        fade_out.ramp_to(0.0, 100, FadeCurve::EqualPower);

        for (a, b) in run(&fade_in, 100).into_iter().zip(run(&fade_out, 100)) {
            assert!((a * a + b * b - 1.0).abs() < 1e-4, "{} {}", a, b);
        }
    }

    #[test]
    fn test_ramp_starts_from_current_value() {
        let gain = Gain::new(1.0);
        gain.ramp_to(0.0, 4, FadeCurve::Linear);
        run(&gain, 3);
        gain.ramp_to(1.0, 2, FadeCurve::Linear);
        assert_eq!(vec![0.5, 0.75, 1.0], run(&gain, 3));
    }

    #[test]
    fn test_zero_length_ramp_jumps() {
        let gain = Gain::new(1.0);
        gain.ramp_to(0.2, 0, FadeCurve::EqualPower);
        assert_eq!(0.2, gain.value());
        assert!(!gain.is_ramping());
    }
}
