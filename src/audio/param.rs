//! Parameter automation on the audio clock.
//!
//! An [`AudioParam`] holds a timeline of automation events (instant value
//! changes and linear ramps) and can be evaluated at any audio-clock time.
//! The control thread schedules events ahead of time; the render thread
//! evaluates the timeline once per frame, which keeps value changes sample
//! accurate no matter when the control thread got around to scheduling them.

/// A single automation event.
#[derive(Debug, Clone, Copy, PartialEq)]
enum AutomationEvent {
    /// Jump to `value` at `time`.
    SetValue { time: f64, value: f32 },
    /// Ramp linearly from the previous event's value, reaching `value` at `time`.
    LinearRamp { time: f64, value: f32 },
}

impl AutomationEvent {
    fn time(&self) -> f64 {
        match *self {
            AutomationEvent::SetValue { time, .. } | AutomationEvent::LinearRamp { time, .. } => {
                time
            }
        }
    }

    fn value(&self) -> f32 {
        match *self {
            AutomationEvent::SetValue { value, .. }
            | AutomationEvent::LinearRamp { value, .. } => value,
        }
    }
}

/// An automatable value (gain, frequency, ...).
#[derive(Debug, Clone)]
pub struct AudioParam {
    /// Value used before the first event.
    default: f32,
    /// Events sorted by time. Events with equal times keep insertion order.
    events: Vec<AutomationEvent>,
}

impl AudioParam {
    /// Creates a param with a constant value and no automation.
    pub fn new(value: f32) -> Self {
        Self {
            default: value,
            events: Vec::new(),
        }
    }

    /// Schedules an instant change to `value` at `time`.
    pub fn set_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(AutomationEvent::SetValue { time, value });
    }

    /// Schedules a linear ramp that reaches `value` at `time`.
    ///
    /// The ramp starts at the time and value of the preceding event.
    pub fn linear_ramp_to_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(AutomationEvent::LinearRamp { time, value });
    }

    /// Removes every event scheduled at or after `time`.
    pub fn cancel_scheduled_values(&mut self, time: f64) {
        self.events.retain(|event| event.time() < time);
    }

    /// Removes events at or after `time` but keeps the value the timeline
    /// would have had at `time`.
    ///
    /// A ramp in progress at `time` is truncated rather than dropped, so the
    /// param keeps moving along the same line up to `time` and then holds.
    /// This is what makes "fade from the current value" free of jumps.
    pub fn cancel_and_hold_at_time(&mut self, time: f64) {
        let held = self.value_at(time);
        let in_ramp = matches!(
            self.events.iter().find(|event| event.time() >= time),
            Some(AutomationEvent::LinearRamp { .. })
        );
        self.cancel_scheduled_values(time);
        if in_ramp {
            self.insert(AutomationEvent::LinearRamp { time, value: held });
        } else {
            self.insert(AutomationEvent::SetValue { time, value: held });
        }
    }

    /// Evaluates the timeline at `time`.
    pub fn value_at(&self, time: f64) -> f32 {
        let mut prev_value = self.default;
        let mut prev_time: Option<f64> = None;

        for event in &self.events {
            if event.time() <= time {
                prev_value = event.value();
                prev_time = Some(event.time());
                continue;
            }

            // First event still in the future: only a ramp affects "now".
            if let AutomationEvent::LinearRamp { time: end, value } = *event {
                if let Some(start) = prev_time {
                    let span = end - start;
                    if span > 0.0 {
                        let progress = ((time - start) / span) as f32;
                        return prev_value + (value - prev_value) * progress;
                    }
                }
            }
            return prev_value;
        }

        prev_value
    }

    /// Drops events that can no longer influence values at or after `time`.
    ///
    /// The last event at or before `time` is kept because it anchors any ramp
    /// that follows it.
    pub fn prune(&mut self, time: f64) {
        let past = self.events.partition_point(|event| event.time() <= time);
        if past > 1 {
            self.events.drain(..past - 1);
        }
    }

    fn insert(&mut self, event: AutomationEvent) {
        let index = self
            .events
            .partition_point(|existing| existing.time() <= event.time());
        self.events.insert(index, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_constant_value() {
        let param = AudioParam::new(0.5);
        assert!(approx(param.value_at(0.0), 0.5));
        assert!(approx(param.value_at(100.0), 0.5));
    }

    #[test]
    fn test_linear_ramp() {
        let mut param = AudioParam::new(0.0);
        param.set_value_at_time(0.0, 1.0);
        param.linear_ramp_to_value_at_time(1.0, 2.0);

        assert!(approx(param.value_at(0.5), 0.0));
        assert!(approx(param.value_at(1.0), 0.0));
        assert!(approx(param.value_at(1.5), 0.5));
        assert!(approx(param.value_at(2.0), 1.0));
        assert!(approx(param.value_at(3.0), 1.0));
    }

    #[test]
    fn test_set_value_at_time_steps() {
        let mut param = AudioParam::new(1.0);
        param.set_value_at_time(3.0, 2.0);
        assert!(approx(param.value_at(1.99), 1.0));
        assert!(approx(param.value_at(2.0), 3.0));
    }

    #[test]
    fn test_cancel_scheduled_values() {
        let mut param = AudioParam::new(0.0);
        param.set_value_at_time(0.0, 0.0);
        param.linear_ramp_to_value_at_time(1.0, 1.0);
        param.cancel_scheduled_values(0.5);

        // Ramp removed: value holds at the last remaining event
        assert!(approx(param.value_at(0.75), 0.0));
    }

    #[test]
    fn test_cancel_and_hold_mid_ramp() {
        let mut param = AudioParam::new(0.0);
        param.set_value_at_time(0.0, 0.0);
        param.linear_ramp_to_value_at_time(1.0, 1.0);

        param.cancel_and_hold_at_time(0.4);
        assert!(approx(param.value_at(0.2), 0.2));
        assert!(approx(param.value_at(0.4), 0.4));
        assert!(approx(param.value_at(0.9), 0.4));

        // Fade out from the held value
        param.linear_ramp_to_value_at_time(0.0, 1.2);
        assert!(approx(param.value_at(0.8), 0.2));
        assert!(approx(param.value_at(1.2), 0.0));
    }

    #[test]
    fn test_prune_keeps_anchor() {
        let mut param = AudioParam::new(0.0);
        param.set_value_at_time(0.2, 0.0);
        param.set_value_at_time(0.4, 1.0);
        param.linear_ramp_to_value_at_time(0.0, 3.0);

        param.prune(2.0);
        assert!(approx(param.value_at(2.0), 0.2));
        assert!(approx(param.value_at(2.5), 0.1));
    }
}
