//! Automation timelines: ordered event logs with deterministic replay.
//!
//! An [`AutomationTimeline`] stores the events scheduled on one param, sorted by
//! event time, and samples the resulting value curve. The same type backs the
//! graph-side params and the params of native engine nodes, so replaying a
//! graph param's timeline onto a freshly constructed native param reproduces
//! the original curve exactly.
//!
//! # Event ordering
//!
//! Ramps are keyed by their end time, set-target and value-curve events by
//! their start time, set-value by its time. Scheduling an event with the same
//! key and kind as an existing one replaces it; otherwise insertion is stable
//! after existing events sharing the key.
//!
//! # Curve semantics
//!
//! | Event | Value at `t` |
//! |-------|--------------|
//! | set-value | jumps to `v` at its time |
//! | linear ramp | `v0 + (v1 - v0) * (t - t0) / (t1 - t0)` from the previous event's end |
//! | exponential ramp | `v0 * (v1 / v0)^((t - t0) / (t1 - t0))`, holds `v0` when signs differ |
//! | set-target | `target + (v0 - target) * e^(-(t - start) / tau)` |
//! | value curve | linear interpolation across evenly spaced points |

use std::sync::Arc;

use crate::error::AutomationError;

/// One scheduled automation event.
#[derive(Debug, Clone, PartialEq)]
pub enum AutomationEvent {
    /// Jump to `value` at `time`.
    SetValue {
        /// Target value.
        value: f32,
        /// When the jump happens, in seconds.
        time: f64,
    },
    /// Linear ramp from the previous event, reaching `value` at `end_time`.
    LinearRamp {
        /// Value reached at the end.
        value: f32,
        /// End of the ramp, in seconds.
        end_time: f64,
    },
    /// Exponential ramp from the previous event, reaching `value` at `end_time`.
    ExponentialRamp {
        /// Value reached at the end.
        value: f32,
        /// End of the ramp, in seconds.
        end_time: f64,
    },
    /// Exponential approach towards `target` starting at `start_time`.
    SetTarget {
        /// Asymptotic target.
        target: f32,
        /// Start of the approach, in seconds.
        start_time: f64,
        /// First-order time constant in seconds (0 jumps immediately).
        time_constant: f64,
    },
    /// Values spread evenly between `start_time` and `start_time + duration`.
    SetValueCurve {
        /// Curve points.
        values: Arc<[f32]>,
        /// Start of the curve, in seconds.
        start_time: f64,
        /// Length of the curve, in seconds.
        duration: f64,
        /// Time at which the curve was frozen by a cancel-and-hold.
        hold_at: Option<f64>,
    },
}

impl AutomationEvent {
    /// Returns the ordering key of the event.
    pub fn time(&self) -> f64 {
        match self {
            Self::SetValue { time, .. } => *time,
            Self::LinearRamp { end_time, .. } | Self::ExponentialRamp { end_time, .. } => *end_time,
            Self::SetTarget { start_time, .. } | Self::SetValueCurve { start_time, .. } => *start_time,
        }
    }

    /// Returns the time at which the event stops shaping the curve on its own.
    fn end_time(&self) -> f64 {
        match self {
            Self::SetValueCurve {
                start_time,
                duration,
                hold_at,
                ..
            } => hold_at.unwrap_or(start_time + duration),
            other => other.time(),
        }
    }

    fn same_kind(&self, other: &Self) -> bool {
        core::mem::discriminant(self) == core::mem::discriminant(other)
    }

    /// Value the event settles on, when that is known without sampling.
    fn settled_value(&self) -> Option<f32> {
        match self {
            Self::SetValue { value, .. }
            | Self::LinearRamp { value, .. }
            | Self::ExponentialRamp { value, .. } => Some(*value),
            Self::SetValueCurve { values, hold_at: None, .. } => values.last().copied(),
            Self::SetTarget { .. } | Self::SetValueCurve { .. } => None,
        }
    }
}

/// Anything that accepts automation calls: graph params, native params,
/// timelines themselves.
pub trait AutomationTarget {
    /// Sets the intrinsic value used before the first event.
    fn set_value(&mut self, value: f32);

    /// Schedules an instantaneous value change.
    fn set_value_at_time(&mut self, value: f32, time: f64) -> Result<(), AutomationError>;

    /// Schedules a linear ramp ending at `end_time`.
    fn linear_ramp_to_value_at_time(&mut self, value: f32, end_time: f64) -> Result<(), AutomationError>;

    /// Schedules an exponential ramp ending at `end_time`.
    fn exponential_ramp_to_value_at_time(
        &mut self,
        value: f32,
        end_time: f64,
    ) -> Result<(), AutomationError>;

    /// Schedules an exponential approach towards `target`.
    fn set_target_at_time(
        &mut self,
        target: f32,
        start_time: f64,
        time_constant: f64,
    ) -> Result<(), AutomationError>;

    /// Schedules a value curve.
    fn set_value_curve_at_time(
        &mut self,
        values: &[f32],
        start_time: f64,
        duration: f64,
    ) -> Result<(), AutomationError>;

    /// Removes every event at or after `cancel_time`.
    fn cancel_scheduled_values(&mut self, cancel_time: f64) -> Result<(), AutomationError>;

    /// Removes events after `cancel_time` and freezes the value reached there.
    fn cancel_and_hold_at_time(&mut self, cancel_time: f64) -> Result<(), AutomationError>;
}

/// Ordered automation events for one param.
#[derive(Debug, Clone, PartialEq)]
pub struct AutomationTimeline {
    default_value: f32,
    events: Vec<AutomationEvent>,
}

impl AutomationTimeline {
    /// Creates an empty timeline whose curve sits at `default_value`.
    pub fn new(default_value: f32) -> Self {
        Self {
            default_value,
            events: Vec::new(),
        }
    }

    /// Returns the value used before the first event.
    #[inline]
    pub fn default_value(&self) -> f32 {
        self.default_value
    }

    /// Sets the value used before the first event.
    #[inline]
    pub fn set_default_value(&mut self, value: f32) {
        self.default_value = value;
    }

    /// Returns the scheduled events in time order.
    pub fn events(&self) -> &[AutomationEvent] {
        &self.events
    }

    /// Returns true when no event is scheduled.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns the number of scheduled events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Inserts a validated event, keeping time order.
    pub fn schedule(&mut self, event: AutomationEvent) -> Result<(), AutomationError> {
        self.validate(&event)?;
        self.insert(event);
        Ok(())
    }

    /// Replaces the event with the same key and kind, or inserts after every
    /// event sharing the key.
    fn insert(&mut self, event: AutomationEvent) {
        let time = event.time();
        if let Some(existing) = self
            .events
            .iter_mut()
            .find(|e| e.time() == time && e.same_kind(&event))
        {
            *existing = event;
            return;
        }
        let index = self.events.partition_point(|e| e.time() <= time);
        self.events.insert(index, event);
    }

    /// Samples the curve at `time` seconds.
    pub fn value_at(&self, time: f64) -> f32 {
        value_in(&self.events, self.default_value, time)
    }

    /// Samples consecutive frames starting at `start_time`.
    pub fn fill(&self, start_time: f64, sample_rate: f32, out: &mut [f32]) {
        if self.events.is_empty() {
            out.fill(self.default_value);
            return;
        }
        let period = 1.0 / f64::from(sample_rate);
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.value_at(start_time + i as f64 * period);
        }
    }

    /// Re-issues every stored event onto `target`, in order.
    ///
    /// The intrinsic value is not written; callers decide whether the target's
    /// own default already matches.
    pub fn replay(&self, target: &mut dyn AutomationTarget) -> Result<(), AutomationError> {
        for event in &self.events {
            match event {
                AutomationEvent::SetValue { value, time } => target.set_value_at_time(*value, *time)?,
                AutomationEvent::LinearRamp { value, end_time } => {
                    target.linear_ramp_to_value_at_time(*value, *end_time)?;
                }
                AutomationEvent::ExponentialRamp { value, end_time } => {
                    target.exponential_ramp_to_value_at_time(*value, *end_time)?;
                }
                AutomationEvent::SetTarget {
                    target: goal,
                    start_time,
                    time_constant,
                } => target.set_target_at_time(*goal, *start_time, *time_constant)?,
                AutomationEvent::SetValueCurve {
                    values,
                    start_time,
                    duration,
                    hold_at,
                } => {
                    target.set_value_curve_at_time(values, *start_time, *duration)?;
                    if let Some(hold) = hold_at {
                        target.cancel_and_hold_at_time(*hold)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn validate(&self, event: &AutomationEvent) -> Result<(), AutomationError> {
        match event {
            AutomationEvent::SetValue { value, time } => {
                check_value("value", *value)?;
                check_time("time", *time)?;
            }
            AutomationEvent::LinearRamp { value, end_time } => {
                check_value("value", *value)?;
                check_time("end time", *end_time)?;
            }
            AutomationEvent::ExponentialRamp { value, end_time } => {
                check_value("value", *value)?;
                check_time("end time", *end_time)?;
                if *value <= 0.0 {
                    return Err(AutomationError::ExponentialTarget(*value));
                }
                if let Some(start) = self.value_before(*end_time)
                    && start <= 0.0
                {
                    return Err(AutomationError::ExponentialStart(start));
                }
            }
            AutomationEvent::SetTarget {
                target,
                start_time,
                time_constant,
            } => {
                check_value("target", *target)?;
                check_time("start time", *start_time)?;
                check_time("time constant", *time_constant)?;
            }
            AutomationEvent::SetValueCurve {
                values,
                start_time,
                duration,
                ..
            } => {
                check_time("start time", *start_time)?;
                if !duration.is_finite() {
                    return Err(AutomationError::NonFinite {
                        what: "duration",
                        value: *duration,
                    });
                }
                if *duration <= 0.0 {
                    return Err(AutomationError::CurveDuration(*duration));
                }
                if values.len() < 2 {
                    return Err(AutomationError::CurveTooShort(values.len()));
                }
                for v in values.iter() {
                    check_value("curve value", *v)?;
                }
                let end = start_time + duration;
                if let Some(hit) = self
                    .events
                    .iter()
                    .map(AutomationEvent::time)
                    .find(|t| *t > *start_time && *t < end)
                {
                    return Err(AutomationError::Overlap { time: hit });
                }
            }
        }

        let time = event.time();
        if let Some(settled) = event.settled_value()
            && settled <= 0.0
        {
            let next = self.events.partition_point(|e| e.time() <= time);
            if matches!(self.events.get(next), Some(AutomationEvent::ExponentialRamp { .. })) {
                return Err(AutomationError::ExponentialStart(settled));
            }
        }
        let inside_curve = self.events.iter().any(|e| match e {
            AutomationEvent::SetValueCurve { start_time, .. } => {
                time > *start_time && time < e.end_time()
            }
            _ => false,
        });
        if inside_curve {
            return Err(AutomationError::Overlap { time });
        }
        Ok(())
    }

    /// Settled value of the event preceding `time`.
    ///
    /// The intrinsic value is not consulted: it stays writable after the ramp
    /// is scheduled, and a ramp starting from it at or below zero holds.
    fn value_before(&self, time: f64) -> Option<f32> {
        let index = self.events.partition_point(|e| e.time() <= time);
        index.checked_sub(1).and_then(|i| self.events[i].settled_value())
    }
}

impl AutomationTarget for AutomationTimeline {
    fn set_value(&mut self, value: f32) {
        self.default_value = value;
    }

    fn set_value_at_time(&mut self, value: f32, time: f64) -> Result<(), AutomationError> {
        self.schedule(AutomationEvent::SetValue { value, time })
    }

    fn linear_ramp_to_value_at_time(&mut self, value: f32, end_time: f64) -> Result<(), AutomationError> {
        self.schedule(AutomationEvent::LinearRamp { value, end_time })
    }

    fn exponential_ramp_to_value_at_time(
        &mut self,
        value: f32,
        end_time: f64,
    ) -> Result<(), AutomationError> {
        self.schedule(AutomationEvent::ExponentialRamp { value, end_time })
    }

    fn set_target_at_time(
        &mut self,
        target: f32,
        start_time: f64,
        time_constant: f64,
    ) -> Result<(), AutomationError> {
        self.schedule(AutomationEvent::SetTarget {
            target,
            start_time,
            time_constant,
        })
    }

    fn set_value_curve_at_time(
        &mut self,
        values: &[f32],
        start_time: f64,
        duration: f64,
    ) -> Result<(), AutomationError> {
        self.schedule(AutomationEvent::SetValueCurve {
            values: Arc::from(values),
            start_time,
            duration,
            hold_at: None,
        })
    }

    fn cancel_scheduled_values(&mut self, cancel_time: f64) -> Result<(), AutomationError> {
        check_time("cancel time", cancel_time)?;
        self.events.retain(|e| e.time() < cancel_time);
        Ok(())
    }

    fn cancel_and_hold_at_time(&mut self, cancel_time: f64) -> Result<(), AutomationError> {
        check_time("cancel time", cancel_time)?;
        let held = self.value_at(cancel_time);
        let keep = self.events.partition_point(|e| e.time() <= cancel_time);
        let interrupted = self.events.get(keep).cloned();
        self.events.truncate(keep);

        let last_is_running_curve = matches!(
            self.events.last(),
            Some(e @ AutomationEvent::SetValueCurve { .. }) if cancel_time < e.end_time()
        );
        if last_is_running_curve {
            if let Some(AutomationEvent::SetValueCurve { hold_at, .. }) = self.events.last_mut() {
                *hold_at = Some(cancel_time);
            }
            return Ok(());
        }

        let last_is_target = matches!(self.events.last(), Some(AutomationEvent::SetTarget { .. }));
        if matches!(
            self.events.last(),
            Some(AutomationEvent::SetTarget { start_time, .. }) if *start_time == cancel_time
        ) {
            self.events.pop();
        }
        let frozen = match interrupted {
            Some(AutomationEvent::LinearRamp { .. }) => Some(AutomationEvent::LinearRamp {
                value: held,
                end_time: cancel_time,
            }),
            Some(AutomationEvent::ExponentialRamp { .. }) if held > 0.0 => {
                Some(AutomationEvent::ExponentialRamp {
                    value: held,
                    end_time: cancel_time,
                })
            }
            Some(AutomationEvent::ExponentialRamp { .. }) => Some(AutomationEvent::SetValue {
                value: held,
                time: cancel_time,
            }),
            _ if last_is_target => Some(AutomationEvent::SetValue {
                value: held,
                time: cancel_time,
            }),
            _ => None,
        };
        if let Some(event) = frozen {
            self.insert(event);
        }
        Ok(())
    }
}

fn check_value(what: &'static str, value: f32) -> Result<(), AutomationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(AutomationError::NonFinite {
            what,
            value: f64::from(value),
        })
    }
}

fn check_time(what: &'static str, time: f64) -> Result<(), AutomationError> {
    if !time.is_finite() {
        return Err(AutomationError::NonFinite { what, value: time });
    }
    if time < 0.0 {
        return Err(AutomationError::Negative { what, value: time });
    }
    Ok(())
}

/// Samples the curve described by `events` (sorted) at `time`.
fn value_in(events: &[AutomationEvent], default: f32, time: f64) -> f32 {
    let index = events.partition_point(|e| e.time() <= time);

    if let Some(next) = events.get(index) {
        let ramp = match next {
            AutomationEvent::LinearRamp { value, end_time } => Some((false, *value, *end_time)),
            AutomationEvent::ExponentialRamp { value, end_time } => Some((true, *value, *end_time)),
            _ => None,
        };
        if let Some((exponential, v1, t1)) = ramp {
            let (t0, v0) = segment_start(events, index, default);
            if time >= t0 {
                return if exponential {
                    exponential_ramp(v0, v1, t0, t1, time)
                } else {
                    linear_ramp(v0, v1, t0, t1, time)
                };
            }
        }
    }

    if index == 0 {
        return default;
    }

    match &events[index - 1] {
        AutomationEvent::SetValue { value, .. }
        | AutomationEvent::LinearRamp { value, .. }
        | AutomationEvent::ExponentialRamp { value, .. } => *value,
        AutomationEvent::SetTarget {
            target,
            start_time,
            time_constant,
        } => {
            let v0 = value_in(&events[..index - 1], default, *start_time);
            if *time_constant == 0.0 {
                *target
            } else {
                let decay = (-(time - start_time) / time_constant).exp();
                (f64::from(*target) + (f64::from(v0) - f64::from(*target)) * decay) as f32
            }
        }
        event @ AutomationEvent::SetValueCurve {
            values,
            start_time,
            duration,
            ..
        } => curve_value(values, *start_time, *duration, time.min(event.end_time())),
    }
}

/// Time and value where the segment ending at `events[index]` begins.
fn segment_start(events: &[AutomationEvent], index: usize, default: f32) -> (f64, f32) {
    if index == 0 {
        return (0.0, default);
    }
    let t0 = events[index - 1].end_time();
    (t0, value_in(&events[..index], default, t0))
}

fn linear_ramp(v0: f32, v1: f32, t0: f64, t1: f64, time: f64) -> f32 {
    if t1 <= t0 {
        return v1;
    }
    let frac = (time - t0) / (t1 - t0);
    (f64::from(v0) + (f64::from(v1) - f64::from(v0)) * frac) as f32
}

fn exponential_ramp(v0: f32, v1: f32, t0: f64, t1: f64, time: f64) -> f32 {
    if t1 <= t0 {
        return v1;
    }
    if v0 == 0.0 || (v0 < 0.0) != (v1 < 0.0) {
        return v0;
    }
    let frac = (time - t0) / (t1 - t0);
    (f64::from(v0) * (f64::from(v1) / f64::from(v0)).powf(frac)) as f32
}

fn curve_value(values: &[f32], start_time: f64, duration: f64, time: f64) -> f32 {
    let last = values.len() - 1;
    let position = (time - start_time) / duration * last as f64;
    if position <= 0.0 {
        return values[0];
    }
    let k = position.floor() as usize;
    if k >= last {
        return values[last];
    }
    let frac = position - k as f64;
    (f64::from(values[k]) + (f64::from(values[k + 1]) - f64::from(values[k])) * frac) as f32
}
