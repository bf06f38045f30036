//! Graph sentinels and options

use serde::{Deserialize, Serialize};

/// Virtual node every workflow starts from
pub const START: &str = "__start__";

/// Virtual node that terminates a run
pub const END: &str = "__end__";

pub(crate) fn is_sentinel(name: &str) -> bool {
    name == START || name == END
}

/// Topology options checked by `WorkflowGraph::validate`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct GraphOptions {
    /// Permit cycles. Linear workflows keep this off; runs of cyclic graphs are
    /// bounded by the engine's step limit.
    #[serde(default)]
    pub allow_cycles: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels() {
        assert!(is_sentinel(START));
        assert!(is_sentinel(END));
        assert!(!is_sentinel("load"));
    }

    #[test]
    fn test_options_default_to_linear() {
        assert!(!GraphOptions::default().allow_cycles);
    }
}
