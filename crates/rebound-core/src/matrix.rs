use crate::error::{Error, Result};
use crate::types::{ConnectionMode, DetectionMethod, ExpectedOutcome, IcmpErrorKind};
use itertools::iproduct;
use std::fmt::{Display, Formatter};

/// One combination of the test dimensions.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Scenario {
    pub mode: ConnectionMode,
    pub kind: IcmpErrorKind,
    pub method: DetectionMethod,
    pub expected: ExpectedOutcome,
}

impl Scenario {
    #[must_use]
    pub const fn new(mode: ConnectionMode, kind: IcmpErrorKind, method: DetectionMethod) -> Self {
        Self {
            mode,
            kind,
            method,
            expected: ExpectedOutcome::for_flow(mode, kind),
        }
    }

    /// The unique name of the scenario, `{mode}/{kind}/{method}`.
    #[must_use]
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl Display for Scenario {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.mode, self.kind, self.method)
    }
}

/// The ordered list of scenarios to run.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Matrix {
    scenarios: Vec<Scenario>,
}

impl Matrix {
    /// Every combination of connection mode, ICMP error kind and detection method.
    #[must_use]
    pub fn all() -> Self {
        let scenarios = iproduct!(
            ConnectionMode::ALL,
            IcmpErrorKind::ALL,
            DetectionMethod::ALL
        )
        .map(|(mode, kind, method)| Scenario::new(mode, kind, method))
        .collect();
        Self { scenarios }
    }

    /// Keep the scenarios whose name contains `pattern`, ignoring ASCII case.
    pub fn filter(self, pattern: &str) -> Result<Self> {
        let needle = pattern.to_ascii_lowercase();
        self.retain(pattern, |scenario| {
            scenario.name().to_ascii_lowercase().contains(&needle)
        })
    }

    /// Keep the scenarios detected by `method`.
    pub fn with_method(self, method: DetectionMethod) -> Result<Self> {
        self.retain(&method.to_string(), |scenario| scenario.method == method)
    }

    fn retain(self, selection: &str, keep: impl Fn(&Scenario) -> bool) -> Result<Self> {
        let scenarios: Vec<_> = self.scenarios.into_iter().filter(|s| keep(s)).collect();
        if scenarios.is_empty() {
            return Err(Error::EmptySelection(selection.to_string()));
        }
        Ok(Self { scenarios })
    }

    #[must_use]
    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}
