//! Forecast fields that can be requested from the filter service.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A GFS field selectable via a `var_<NAME>=on` query term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Variable {
    /// Wind gust
    Gust,
    /// Total precipitation
    Apcp,
    /// Relative humidity
    Rh,
    /// Temperature
    Tmp,
    /// Convective available potential energy
    Cape,
    /// Pressure reduced to mean sea level
    Prmsl,
    /// Minimum temperature
    Tmin,
    /// Maximum temperature
    Tmax,
    /// U component of wind
    Ugrd,
    /// V component of wind
    Vgrd,
    /// Total cloud cover
    Tcdc,
}

impl Variable {
    pub const ALL: [Variable; 11] = [
        Variable::Gust,
        Variable::Apcp,
        Variable::Rh,
        Variable::Tmp,
        Variable::Cape,
        Variable::Prmsl,
        Variable::Tmin,
        Variable::Tmax,
        Variable::Ugrd,
        Variable::Vgrd,
        Variable::Tcdc,
    ];

    /// Short name as used by the filter service.
    pub fn name(&self) -> &'static str {
        match self {
            Variable::Gust => "GUST",
            Variable::Apcp => "APCP",
            Variable::Rh => "RH",
            Variable::Tmp => "TMP",
            Variable::Cape => "CAPE",
            Variable::Prmsl => "PRMSL",
            Variable::Tmin => "TMIN",
            Variable::Tmax => "TMAX",
            Variable::Ugrd => "UGRD",
            Variable::Vgrd => "VGRD",
            Variable::Tcdc => "TCDC",
        }
    }

    /// Query parameter key, e.g. `var_TMP`.
    pub fn query_key(&self) -> String {
        format!("var_{}", self.name())
    }
}

/// Per-variable toggles. Variables absent from the map are enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableSelection(BTreeMap<Variable, bool>);

impl VariableSelection {
    pub fn is_enabled(&self, variable: Variable) -> bool {
        self.0.get(&variable).copied().unwrap_or(true)
    }

    /// Enabled variables in canonical order.
    pub fn enabled(&self) -> Vec<Variable> {
        Variable::ALL
            .into_iter()
            .filter(|v| self.is_enabled(*v))
            .collect()
    }
}

impl FromIterator<(Variable, bool)> for VariableSelection {
    fn from_iter<I: IntoIterator<Item = (Variable, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_enables_everything() {
        let selection = VariableSelection::default();
        assert_eq!(selection.enabled().len(), Variable::ALL.len());
    }

    #[test]
    fn test_disabled_variable_is_omitted() {
        let selection: VariableSelection =
            [(Variable::Cape, false), (Variable::Tmp, true)].into_iter().collect();
        let enabled = selection.enabled();
        assert!(!enabled.contains(&Variable::Cape));
        assert!(enabled.contains(&Variable::Tmp));
        assert_eq!(enabled.len(), Variable::ALL.len() - 1);
    }

    #[test]
    fn test_query_key() {
        assert_eq!(Variable::Prmsl.query_key(), "var_PRMSL");
    }
}
