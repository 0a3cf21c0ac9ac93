//! Role contract registry
//!
//! Maps each worker role to its required-evidence contract: an ordered list
//! of literal markers that must appear in the worker's output before the
//! phase can be accepted. Base markers prove the worker consulted its
//! prerequisite context and produced a structured pre-work report; when a
//! phase runs under strict-loop mode an additional marker sub-list is
//! appended as evidence of an iterative write/verify/refine pass.
//!
//! The registry is read-only at runtime. Adding a role means extending the
//! tables here; the validation gate stays role-agnostic and only ever sees a
//! resolved [`Contract`].

use serde::{Deserialize, Serialize};

use crate::error::PipewrightError;
use crate::types::WorkflowMode;

/// Worker role categories known to the registry.
///
/// Role strings in pipeline definitions are parsed into this enum at load
/// time, so downstream components (classifier, controller) never see an
/// unvalidated role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "ui-design")]
    UiDesign,
    #[serde(rename = "api-design")]
    ApiDesign,
    #[serde(rename = "schema-design")]
    SchemaDesign,
    #[serde(rename = "implementation")]
    Implementation,
    #[serde(rename = "integration")]
    Integration,
    #[serde(rename = "contract-verification")]
    ContractVerification,
}

impl Role {
    /// All roles the registry knows about
    pub const ALL: &'static [Role] = &[
        Role::UiDesign,
        Role::ApiDesign,
        Role::SchemaDesign,
        Role::Implementation,
        Role::Integration,
        Role::ContractVerification,
    ];

    /// Returns the string representation of the role
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UiDesign => "ui-design",
            Self::ApiDesign => "api-design",
            Self::SchemaDesign => "schema-design",
            Self::Implementation => "implementation",
            Self::Integration => "integration",
            Self::ContractVerification => "contract-verification",
        }
    }

    /// Parse a role string from a pipeline definition
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Role::ALL.iter().copied().find(|role| role.as_str() == s)
    }

    /// Whether this role's output is expected to reference source artifacts.
    ///
    /// Drives the validation gate's artifact-evidence heuristic; design and
    /// verification roles produce prose, not files.
    #[must_use]
    pub const fn expects_artifacts(&self) -> bool {
        matches!(self, Self::Implementation | Self::Integration)
    }

    /// Whether this role always runs in light mode.
    ///
    /// Purely declarative work (schema authoring) and purely evaluative work
    /// (contract verification) are exempt from classification; the
    /// complexity signals do not apply to them.
    #[must_use]
    pub const fn always_light(&self) -> bool {
        matches!(self, Self::SchemaDesign | Self::ContractVerification)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Role {
    type Error = PipewrightError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Role::parse(s).ok_or_else(|| PipewrightError::UnknownRole {
            role: s.to_string(),
        })
    }
}

/// Markers appended to every contract when the phase runs under strict-loop
/// mode: evidence of a write-test-first / verify / refine iteration.
pub const STRICT_LOOP_MARKERS: &[&str] = &[
    "Tests written first",
    "All tests passing",
    "Refinement notes",
];

/// Base required-evidence markers per role, in contract order
const fn base_markers(role: Role) -> &'static [&'static str] {
    match role {
        Role::UiDesign => &[
            "Design tokens reviewed",
            "Component inventory",
            "Accessibility notes",
        ],
        Role::ApiDesign => &[
            "Existing endpoints reviewed",
            "Endpoint table",
            "Error responses documented",
        ],
        Role::SchemaDesign => &[
            "Current schema reviewed",
            "Migration plan",
            "Rollback plan",
        ],
        Role::Implementation => &[
            "Requirements reviewed",
            "Files to modify",
            "Test plan",
        ],
        Role::Integration => &[
            "Interface contracts reviewed",
            "Failure modes considered",
            "Test plan",
        ],
        Role::ContractVerification => &["Checklist loaded", "Verdict"],
    }
}

/// A resolved required-evidence contract for one phase execution.
///
/// The marker order is preserved from the registry so `missing` lists in
/// validation reports are stable and readable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contract {
    /// Ordered markers that must literally appear in the worker output
    pub markers: Vec<String>,
    /// Whether the gate should also require artifact-path evidence
    pub expects_artifacts: bool,
}

impl Contract {
    /// Build a contract from explicit markers (used by tests and callers
    /// that bypass the registry)
    #[must_use]
    pub fn new<M: Into<String>>(markers: Vec<M>, expects_artifacts: bool) -> Self {
        Self {
            markers: markers.into_iter().map(Into::into).collect(),
            expects_artifacts,
        }
    }
}

/// Resolve the contract for a role under the given workflow mode.
///
/// Strict-loop mode appends [`STRICT_LOOP_MARKERS`] after the role's base
/// markers; light mode returns the base contract unchanged.
#[must_use]
pub fn contract_for(role: Role, mode: WorkflowMode) -> Contract {
    let base = base_markers(role);
    let mut markers: Vec<String> = base.iter().map(|m| (*m).to_string()).collect();
    if mode == WorkflowMode::StrictLoop {
        markers.extend(STRICT_LOOP_MARKERS.iter().map(|m| (*m).to_string()));
    }
    Contract {
        markers,
        expects_artifacts: role.expects_artifacts(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_round_trip() {
        for role in Role::ALL {
            assert_eq!(Role::parse(role.as_str()), Some(*role));
        }
    }

    #[test]
    fn test_role_parse_unknown() {
        assert_eq!(Role::parse("wizardry"), None);
        assert_eq!(Role::parse("UI-DESIGN"), None); // case-sensitive
        let err = Role::try_from("wizardry").unwrap_err();
        assert_eq!(err.to_string(), "Unknown worker role: wizardry");
    }

    #[test]
    fn test_role_serde_kebab_case() {
        let json = serde_json::to_string(&Role::ContractVerification).unwrap();
        assert_eq!(json, r#""contract-verification""#);
        let back: Role = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Role::ContractVerification);
    }

    #[test]
    fn test_every_role_has_base_markers() {
        for role in Role::ALL {
            let contract = contract_for(*role, WorkflowMode::Light);
            assert!(
                !contract.markers.is_empty(),
                "role {role} has an empty base contract"
            );
        }
    }

    #[test]
    fn test_strict_loop_appends_sub_markers_in_order() {
        let light = contract_for(Role::Implementation, WorkflowMode::Light);
        let strict = contract_for(Role::Implementation, WorkflowMode::StrictLoop);

        assert_eq!(
            strict.markers.len(),
            light.markers.len() + STRICT_LOOP_MARKERS.len()
        );
        assert_eq!(&strict.markers[..light.markers.len()], &light.markers[..]);
        assert_eq!(
            &strict.markers[light.markers.len()..],
            STRICT_LOOP_MARKERS
                .iter()
                .map(|m| (*m).to_string())
                .collect::<Vec<_>>()
                .as_slice()
        );
    }

    #[test]
    fn test_artifact_expectations() {
        assert!(Role::Implementation.expects_artifacts());
        assert!(Role::Integration.expects_artifacts());
        assert!(!Role::UiDesign.expects_artifacts());
        assert!(!Role::ContractVerification.expects_artifacts());
    }

    #[test]
    fn test_always_light_roles() {
        assert!(Role::SchemaDesign.always_light());
        assert!(Role::ContractVerification.always_light());
        assert!(!Role::Implementation.always_light());
        assert!(!Role::ApiDesign.always_light());
    }
}
