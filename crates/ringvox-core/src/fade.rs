//! Linear fade envelope driven by wall-clock ticks.

/// Fade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeDirection {
    /// Ramp gain from 0 to 1.
    In,
    /// Ramp gain from 1 to 0, then finish the voice.
    Out,
}

/// Linear gain ramp over a fixed duration.
///
/// The envelope only advances when [`advance`](Fade::advance) is called, which
/// the owning voice does once per tick while it is playing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fade {
    /// Ramp direction
    direction: FadeDirection,
    /// Total ramp time in seconds
    duration: f32,
    /// Seconds elapsed since arming
    elapsed: f32,
}

/// Outcome of one [`Fade::advance`] step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeStep {
    /// Gain multiplier after the step, in `[0, 1]`.
    pub gain: f32,
    /// Whether the ramp has reached its end.
    pub complete: bool,
}

impl Fade {
    /// Arm a new fade. Negative durations are treated as 0.
    pub fn new(direction: FadeDirection, duration: f32) -> Self {
        Self {
            direction,
            duration: duration.max(0.0),
            elapsed: 0.0,
        }
    }

    /// Direction of this fade.
    pub fn direction(&self) -> FadeDirection {
        self.direction
    }

    /// Total ramp time in seconds.
    pub fn duration(&self) -> f32 {
        self.duration
    }

    /// Seconds elapsed since arming.
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Ramp progress in `[0, 1]`.
    pub fn progress(&self) -> f32 {
        if self.duration == 0.0 {
            1.0
        } else {
            (self.elapsed / self.duration).clamp(0.0, 1.0)
        }
    }

    /// Current gain multiplier.
    pub fn gain(&self) -> f32 {
        match self.direction {
            FadeDirection::In => self.progress(),
            FadeDirection::Out => 1.0 - self.progress(),
        }
    }

    /// Advance by `dt` seconds.
    pub fn advance(&mut self, dt: f32) -> FadeStep {
        self.elapsed += dt.max(0.0);
        FadeStep {
            gain: self.gain(),
            complete: self.progress() >= 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fade_in_starts_silent() {
        let fade = Fade::new(FadeDirection::In, 1.0);
        assert_eq!(fade.gain(), 0.0);
    }

    #[test]
    fn fade_out_starts_full() {
        let fade = Fade::new(FadeDirection::Out, 1.0);
        assert_eq!(fade.gain(), 1.0);
    }

    #[test]
    fn fade_in_is_linear() {
        let mut fade = Fade::new(FadeDirection::In, 2.0);
        let step = fade.advance(0.5);
        assert!((step.gain - 0.25).abs() < 1e-6);
        assert!(!step.complete);
        let step = fade.advance(1.0);
        assert!((step.gain - 0.75).abs() < 1e-6);
    }

    #[test]
    fn fade_out_completes_at_zero() {
        let mut fade = Fade::new(FadeDirection::Out, 1.0);
        fade.advance(0.6);
        let step = fade.advance(0.6);
        assert!(step.complete);
        assert_eq!(step.gain, 0.0);
    }

    #[test]
    fn zero_duration_completes_immediately() {
        let mut fade = Fade::new(FadeDirection::In, 0.0);
        assert_eq!(fade.progress(), 1.0);
        let step = fade.advance(0.0);
        assert!(step.complete);
        assert_eq!(step.gain, 1.0);
    }

    #[test]
    fn negative_inputs_are_ignored() {
        let mut fade = Fade::new(FadeDirection::Out, -3.0);
        assert_eq!(fade.duration(), 0.0);
        let mut other = Fade::new(FadeDirection::In, 1.0);
        other.advance(-1.0);
        assert_eq!(other.elapsed(), 0.0);
        assert!(fade.advance(0.1).complete);
    }
}
