//! Tunable coefficients of the energy model.

use serde::{Deserialize, Serialize};

/// How node mass is assigned in the kinetic energy term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MassModel {
    /// `m_i = demand[i]`: change in busy modules costs more
    #[default]
    Demand,

    /// `m_i = 1` for every node
    Uniform,
}

/// Coefficients shared by the field and energy computations.
///
/// Every field is optional in serialized form; missing keys fall back to
/// the defaults below.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineParams {
    /// Badness weight of `1 - health` (α)
    pub alpha: f64,

    /// Badness weight of complexity (β)
    pub beta: f64,

    /// Badness weight of risk (γ)
    pub gamma: f64,

    /// Business potential weight of `1 - health` (λ1)
    pub lambda_health: f64,

    /// Business potential weight of complexity (λ2)
    pub lambda_complexity: f64,

    /// Scale of the business (x) component of the flow field
    pub flow_business: f64,

    /// Scale of the stability (y) component of the flow field
    pub flow_stability: f64,

    /// Mass assignment for kinetic energy
    pub mass: MassModel,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            alpha: 0.4,
            beta: 0.3,
            gamma: 0.3,
            lambda_health: 0.6,
            lambda_complexity: 0.4,
            flow_business: 0.6,
            flow_stability: 0.4,
            mass: MassModel::Demand,
        }
    }
}

impl EngineParams {
    /// Returns a copy with negative badness weights floored at zero.
    pub fn sanitized(mut self) -> Self {
        self.alpha = self.alpha.max(0.0);
        self.beta = self.beta.max(0.0);
        self.gamma = self.gamma.max(0.0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_params_use_defaults() {
        let params: EngineParams = serde_json::from_str(r#"{"alpha": 0.5}"#).unwrap();
        assert_eq!(params.alpha, 0.5);
        assert_eq!(params.beta, 0.3);
        assert_eq!(params.mass, MassModel::Demand);
    }

    #[test]
    fn test_sanitized_floors_weights() {
        let params = EngineParams { gamma: -1.0, ..Default::default() }.sanitized();
        assert_eq!(params.gamma, 0.0);
        assert_eq!(params.alpha, 0.4);
    }
}
