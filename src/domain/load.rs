//! Load patterns and the time series that scale them

use std::f64::consts::PI;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Load factor as a function of (pseudo) time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TimeSeries {
    /// Same factor at every time
    Constant { factor: f64 },
    /// `factor * t`; with load control the pseudo time is the load factor
    Linear { factor: f64 },
    /// `factor` inside `[start, end]`, zero outside
    Rectangular { start: f64, end: f64, factor: f64 },
    /// `factor * sin(2 pi (t - start) / period + phase)` inside `[start, end]`
    Trig {
        start: f64,
        end: f64,
        period: f64,
        phase: f64,
        factor: f64,
    },
    /// Piecewise linear through `(times[i], values[i])`, zero outside
    Path { times: Vec<f64>, values: Vec<f64> },
}

impl Default for TimeSeries {
    fn default() -> Self {
        Self::Linear { factor: 1.0 }
    }
}

impl TimeSeries {
    pub fn constant() -> Self {
        Self::Constant { factor: 1.0 }
    }

    pub fn linear() -> Self {
        Self::Linear { factor: 1.0 }
    }

    /// Load factor at time `t`
    pub fn factor(&self, t: f64) -> f64 {
        match self {
            Self::Constant { factor } => *factor,
            Self::Linear { factor } => factor * t,
            Self::Rectangular { start, end, factor } => {
                if t >= *start && t <= *end {
                    *factor
                } else {
                    0.0
                }
            }
            Self::Trig {
                start,
                end,
                period,
                phase,
                factor,
            } => {
                if t >= *start && t <= *end && *period > 0.0 {
                    factor * (2.0 * PI * (t - start) / period + phase).sin()
                } else {
                    0.0
                }
            }
            Self::Path { times, values } => path_value(times, values, t),
        }
    }
}

fn path_value(times: &[f64], values: &[f64], t: f64) -> f64 {
    let n = times.len().min(values.len());
    if n == 0 || t < times[0] || t > times[n - 1] {
        return 0.0;
    }
    for i in 1..n {
        if t <= times[i] {
            let span = times[i] - times[i - 1];
            if span <= 0.0 {
                return values[i];
            }
            let s = (t - times[i - 1]) / span;
            return values[i - 1] + s * (values[i] - values[i - 1]);
        }
    }
    values[n - 1]
}

/// Reference load on a node, one value per nodal DOF
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodalLoad {
    pub node: usize,
    pub values: DVector<f64>,
}

/// Equivalent nodal load vector handed to an element, element DOF order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementLoad {
    pub element: usize,
    pub values: DVector<f64>,
}

/// A set of reference loads scaled by one time series
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadPattern {
    pub series: TimeSeries,
    pub nodal_loads: Vec<NodalLoad>,
    pub element_loads: Vec<ElementLoad>,
}

impl LoadPattern {
    /// Create an empty pattern scaled by `series`
    pub fn new(series: TimeSeries) -> Self {
        Self {
            series,
            nodal_loads: Vec::new(),
            element_loads: Vec::new(),
        }
    }

    /// Add a nodal load
    pub fn with_nodal_load(mut self, node: usize, values: &[f64]) -> Self {
        self.nodal_loads.push(NodalLoad {
            node,
            values: DVector::from_column_slice(values),
        });
        self
    }

    /// Add an element load
    pub fn with_element_load(mut self, element: usize, values: &[f64]) -> Self {
        self.element_loads.push(ElementLoad {
            element,
            values: DVector::from_column_slice(values),
        });
        self
    }

    /// Factor applied to this pattern at time `t`
    pub fn factor(&self, t: f64) -> f64 {
        self.series.factor(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_series_factors() {
        assert_relative_eq!(TimeSeries::linear().factor(0.25), 0.25);
        assert_relative_eq!(TimeSeries::constant().factor(7.0), 1.0);

        let rect = TimeSeries::Rectangular {
            start: 1.0,
            end: 2.0,
            factor: 3.0,
        };
        assert_relative_eq!(rect.factor(0.5), 0.0);
        assert_relative_eq!(rect.factor(1.5), 3.0);

        let trig = TimeSeries::Trig {
            start: 0.0,
            end: 10.0,
            period: 2.0,
            phase: 0.0,
            factor: 1.0,
        };
        assert_relative_eq!(trig.factor(0.5), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_path_interpolation() {
        let path = TimeSeries::Path {
            times: vec![0.0, 1.0, 3.0],
            values: vec![0.0, 2.0, 0.0],
        };
        assert_relative_eq!(path.factor(0.5), 1.0);
        assert_relative_eq!(path.factor(2.0), 1.0);
        assert_relative_eq!(path.factor(4.0), 0.0);
    }
}
