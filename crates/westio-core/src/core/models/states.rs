/// A possible starting configuration for new trajectories.
///
/// Basis states are recorded once per "epoch" (whenever the set in effect
/// changes) rather than per iteration. Selection probabilities are recorded
/// verbatim; the store does not renormalize them.
#[derive(Debug, Clone, PartialEq)]
pub struct BasisState {
    /// Descriptive label; written into the 64-byte label field on disk.
    pub label: String,
    /// Probability that this state is selected when a trajectory recycles.
    pub probability: f64,
    /// Optional reference to auxiliary data (e.g. a structure file).
    pub auxref: Option<String>,
    /// Progress coordinate of the state.
    pub pcoord: Vec<f64>,
}

impl BasisState {
    pub fn new(label: &str, probability: f64, pcoord: Vec<f64>) -> Self {
        Self {
            label: label.to_string(),
            probability,
            auxref: None,
            pcoord,
        }
    }

    pub fn with_auxref(mut self, auxref: &str) -> Self {
        self.auxref = Some(auxref.to_string());
        self
    }
}

/// An absorbing or recycling boundary condition in progress-coordinate space.
///
/// A campaign may legitimately define no target states; an empty set is
/// recorded as an epoch entry with a null subgroup reference.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetState {
    pub label: String,
    pub pcoord: Vec<f64>,
}

impl TargetState {
    pub fn new(label: &str, pcoord: Vec<f64>) -> Self {
        Self {
            label: label.to_string(),
            pcoord,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basis_state_defaults_to_no_auxref() {
        let state = BasisState::new("unfolded", 1.0, vec![0.0]);
        assert_eq!(state.label, "unfolded");
        assert_eq!(state.probability, 1.0);
        assert!(state.auxref.is_none());
    }

    #[test]
    fn with_auxref_attaches_reference() {
        let state = BasisState::new("a", 0.5, vec![1.0]).with_auxref("bstates/a.ncrst");
        assert_eq!(state.auxref.as_deref(), Some("bstates/a.ncrst"));
    }

    #[test]
    fn target_state_keeps_pcoord() {
        let state = TargetState::new("folded", vec![0.3, 2.1]);
        assert_eq!(state.pcoord, vec![0.3, 2.1]);
    }
}
