//! Control parameters owned by graph nodes.
//!
//! Every node kind declares its params as [`ParamSpec`]s (name, bounds,
//! default, automation rate). [`AudioGraph`](crate::AudioGraph) instantiates
//! one [`Param`] per spec when the node is created. A param carries its
//! intrinsic value, an [`AutomationTimeline`], and the connections of nodes
//! that modulate it.

use serde::{Deserialize, Serialize};

use crate::automation::{AutomationTarget, AutomationTimeline};
use crate::error::AutomationError;
use crate::ids::{EdgeId, NodeId, ParamId};

/// Largest finite single-precision value; the nominal bound of unbounded params.
pub const MOST_POSITIVE: f32 = f32::MAX;

/// Nominal detune range in cents (`1200 * log2(f32::MAX)`).
pub const DETUNE_LIMIT: f32 = 153_600.0;

/// How often the engine samples a param.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutomationRate {
    /// One value per sample frame.
    #[default]
    ARate,
    /// One value per render quantum.
    KRate,
}

/// Static description of a param: bounds, default and rate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Name the param is looked up by.
    pub name: String,
    /// Value before any automation is applied.
    pub default: f32,
    /// Lower nominal bound.
    pub min: f32,
    /// Upper nominal bound.
    pub max: f32,
    /// Sampling rate of the param.
    #[serde(default)]
    pub rate: AutomationRate,
}

impl ParamSpec {
    /// Creates an a-rate spec.
    pub fn new(name: impl Into<String>, default: f32, min: f32, max: f32) -> Self {
        Self {
            name: name.into(),
            default,
            min,
            max,
            rate: AutomationRate::ARate,
        }
    }

    /// Creates an a-rate spec bounded only by the float range.
    pub fn unbounded(name: impl Into<String>, default: f32) -> Self {
        Self::new(name, default, -MOST_POSITIVE, MOST_POSITIVE)
    }

    /// Sets the automation rate.
    pub fn with_rate(mut self, rate: AutomationRate) -> Self {
        self.rate = rate;
        self
    }

    /// Clamps a computed value into the nominal range.
    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            self.default
        } else {
            value.clamp(self.min, self.max)
        }
    }
}

/// A control param owned by one node.
#[derive(Debug, Clone)]
pub struct Param {
    pub(crate) id: ParamId,
    pub(crate) node: NodeId,
    pub(crate) spec: ParamSpec,
    pub(crate) timeline: AutomationTimeline,
    pub(crate) inputs: Vec<EdgeId>,
}

impl Param {
    pub(crate) fn new(id: ParamId, node: NodeId, spec: ParamSpec) -> Self {
        let timeline = AutomationTimeline::new(spec.default);
        Self {
            id,
            node,
            spec,
            timeline,
            inputs: Vec::new(),
        }
    }

    /// Returns the param's id.
    pub fn id(&self) -> ParamId {
        self.id
    }

    /// Returns the node owning the param.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Returns the param name.
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Returns the static description.
    pub fn spec(&self) -> &ParamSpec {
        &self.spec
    }

    /// Returns the current intrinsic value.
    pub fn value(&self) -> f32 {
        self.timeline.default_value()
    }

    /// Sets the intrinsic value used before the first automation event.
    pub fn set_value(&mut self, value: f32) -> &mut Self {
        self.timeline.set_default_value(value);
        self
    }

    /// Returns the automation timeline.
    pub fn timeline(&self) -> &AutomationTimeline {
        &self.timeline
    }

    /// Returns connections of nodes driving this param, in insertion order.
    pub fn inputs(&self) -> &[EdgeId] {
        &self.inputs
    }

    /// Schedules an instantaneous value change.
    pub fn set_value_at_time(&mut self, value: f32, time: f64) -> Result<&mut Self, AutomationError> {
        self.timeline.set_value_at_time(value, time)?;
        Ok(self)
    }

    /// Schedules a linear ramp ending at `end_time`.
    pub fn linear_ramp_to_value_at_time(
        &mut self,
        value: f32,
        end_time: f64,
    ) -> Result<&mut Self, AutomationError> {
        self.timeline.linear_ramp_to_value_at_time(value, end_time)?;
        Ok(self)
    }

    /// Schedules an exponential ramp ending at `end_time`.
    pub fn exponential_ramp_to_value_at_time(
        &mut self,
        value: f32,
        end_time: f64,
    ) -> Result<&mut Self, AutomationError> {
        self.timeline
            .exponential_ramp_to_value_at_time(value, end_time)?;
        Ok(self)
    }

    /// Schedules an exponential approach towards `target`.
    pub fn set_target_at_time(
        &mut self,
        target: f32,
        start_time: f64,
        time_constant: f64,
    ) -> Result<&mut Self, AutomationError> {
        self.timeline
            .set_target_at_time(target, start_time, time_constant)?;
        Ok(self)
    }

    /// Schedules a curve of values spread evenly over `duration`.
    pub fn set_value_curve_at_time(
        &mut self,
        values: &[f32],
        start_time: f64,
        duration: f64,
    ) -> Result<&mut Self, AutomationError> {
        self.timeline
            .set_value_curve_at_time(values, start_time, duration)?;
        Ok(self)
    }

    /// Removes every event at or after `cancel_time`.
    pub fn cancel_scheduled_values(&mut self, cancel_time: f64) -> Result<&mut Self, AutomationError> {
        self.timeline.cancel_scheduled_values(cancel_time)?;
        Ok(self)
    }

    /// Removes events after `cancel_time` and freezes the value reached there.
    pub fn cancel_and_hold_at_time(&mut self, cancel_time: f64) -> Result<&mut Self, AutomationError> {
        self.timeline.cancel_and_hold_at_time(cancel_time)?;
        Ok(self)
    }
}
