//! Pipeline definition: parsing, validation, execution order
//!
//! A pipeline is loaded from a TOML file and is immutable for the length
//! of a run. Validation is strict and happens entirely at load time; a
//! run is never created from a definition that fails any rule here.
//!
//! Execution order is declaration order, folded into units: consecutive
//! phases sharing a `parallel_group` form one concurrent unit, everything
//! else runs alone. A phase without an explicit `depends_on` implicitly
//! waits for the previous unit to reach a terminal status. An explicit
//! `depends_on = []` declares the phase independent of prior outcomes.

use std::collections::{HashMap, HashSet};

use camino::Utf8Path;
use serde::Deserialize;

use crate::contracts::Role;
use crate::error::{PipelineError, PipewrightError};
use crate::types::PhaseId;

/// One unit of delegated work
#[derive(Debug, Clone)]
pub struct Phase {
    pub id: PhaseId,
    pub role: Role,
    pub estimated_minutes: u32,
    pub task_description: String,
    /// Explicit dependencies; `None` means the implicit ordering
    /// dependency on the previous execution unit
    pub depends_on: Option<Vec<PhaseId>>,
    pub parallel_group: Option<String>,
    pub context_refs: Vec<String>,
}

/// One step of the schedule: a lone phase or a concurrent group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionUnit {
    Single(PhaseId),
    Group {
        name: String,
        members: Vec<PhaseId>,
    },
}

impl ExecutionUnit {
    #[must_use]
    pub fn member_ids(&self) -> Vec<PhaseId> {
        match self {
            Self::Single(id) => vec![id.clone()],
            Self::Group { members, .. } => members.clone(),
        }
    }
}

/// A validated pipeline definition
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub id: String,
    /// blake3 of the definition text, recorded in the run document to
    /// detect drift between runs and resumes
    pub source_checksum: String,
    phases: Vec<Phase>,
    units: Vec<ExecutionUnit>,
    index_by_id: HashMap<String, usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPipeline {
    id: Option<String>,
    #[serde(default, rename = "phase")]
    phases: Vec<RawPhase>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPhase {
    id: String,
    role: String,
    estimated_minutes: u32,
    task: String,
    #[serde(default)]
    depends_on: Option<Vec<String>>,
    #[serde(default)]
    parallel_group: Option<String>,
    #[serde(default)]
    context: Vec<String>,
}

impl Pipeline {
    /// Load and validate a definition from disk.
    ///
    /// # Errors
    /// Any read, parse, or validation failure; all are fatal at load time.
    pub fn load(path: &Utf8Path) -> Result<Self, PipewrightError> {
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::Parse {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_toml_str(path.as_str(), &text)?)
    }

    /// Parse and validate a definition from TOML text. `path_label` is
    /// used only in error messages.
    pub fn from_toml_str(path_label: &str, text: &str) -> Result<Self, PipelineError> {
        let raw: RawPipeline = toml::from_str(text).map_err(|e| PipelineError::Parse {
            path: path_label.to_string(),
            reason: e.to_string(),
        })?;

        let id = match raw.id {
            Some(id) if !id.trim().is_empty() => id,
            _ => return Err(PipelineError::MissingId),
        };

        if raw.phases.is_empty() {
            return Err(PipelineError::Empty);
        }

        let mut phases = Vec::with_capacity(raw.phases.len());
        let mut index_by_id: HashMap<String, usize> = HashMap::new();
        let mut seen: HashSet<String> = HashSet::new();

        // First pass: ids must exist and be unique before dependency
        // references can be resolved
        for (i, raw_phase) in raw.phases.iter().enumerate() {
            if raw_phase.id.trim().is_empty() {
                return Err(PipelineError::Parse {
                    path: path_label.to_string(),
                    reason: format!("phase at position {} has an empty id", i + 1),
                });
            }
            if !seen.insert(raw_phase.id.clone()) {
                return Err(PipelineError::DuplicatePhase {
                    id: raw_phase.id.clone(),
                });
            }
            index_by_id.insert(raw_phase.id.clone(), i);
        }

        // Second pass: per-phase rules
        let mut last_group_index: HashMap<String, usize> = HashMap::new();
        for (i, raw_phase) in raw.phases.into_iter().enumerate() {
            let role = Role::parse(&raw_phase.role).ok_or_else(|| PipelineError::UnknownRole {
                phase: raw_phase.id.clone(),
                role: raw_phase.role.clone(),
            })?;

            if raw_phase.estimated_minutes == 0 {
                return Err(PipelineError::ZeroEstimate {
                    phase: raw_phase.id.clone(),
                });
            }

            if raw_phase.depends_on.is_some() && raw_phase.parallel_group.is_some() {
                return Err(PipelineError::ConflictingDeclarations {
                    phase: raw_phase.id.clone(),
                });
            }

            if let Some(group) = &raw_phase.parallel_group {
                if group.trim().is_empty() {
                    return Err(PipelineError::Parse {
                        path: path_label.to_string(),
                        reason: format!("phase {} has an empty parallel_group", raw_phase.id),
                    });
                }
                if let Some(&last) = last_group_index.get(group)
                    && last != i - 1
                {
                    return Err(PipelineError::GroupNotContiguous {
                        group: group.clone(),
                    });
                }
                last_group_index.insert(group.clone(), i);
            }

            let depends_on = match raw_phase.depends_on {
                None => None,
                Some(deps) => {
                    let mut resolved: Vec<PhaseId> = Vec::new();
                    for dep in deps {
                        if dep == raw_phase.id {
                            return Err(PipelineError::SelfDependency {
                                phase: raw_phase.id.clone(),
                            });
                        }
                        let dep_index = *index_by_id.get(&dep).ok_or_else(|| {
                            PipelineError::UnknownDependency {
                                phase: raw_phase.id.clone(),
                                dependency: dep.clone(),
                            }
                        })?;
                        // Declaration order is the schedule: a dependency on
                        // a later phase can never be satisfied
                        if dep_index >= i {
                            return Err(PipelineError::CycleDetected {
                                phase: raw_phase.id.clone(),
                            });
                        }
                        let dep_id = PhaseId::new(dep);
                        if !resolved.contains(&dep_id) {
                            resolved.push(dep_id);
                        }
                    }
                    Some(resolved)
                }
            };

            phases.push(Phase {
                id: PhaseId::new(raw_phase.id),
                role,
                estimated_minutes: raw_phase.estimated_minutes,
                task_description: raw_phase.task,
                depends_on,
                parallel_group: raw_phase.parallel_group,
                context_refs: raw_phase.context,
            });
        }

        let units = build_units(&phases);
        Ok(Self {
            id,
            source_checksum: blake3::hash(text.as_bytes()).to_hex().to_string(),
            phases,
            units,
            index_by_id,
        })
    }

    #[must_use]
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    #[must_use]
    pub fn phase(&self, id: &PhaseId) -> Option<&Phase> {
        self.index_by_id.get(id.as_str()).map(|&i| &self.phases[i])
    }

    /// The schedule, in declaration order
    #[must_use]
    pub fn execution_units(&self) -> &[ExecutionUnit] {
        &self.units
    }

    #[must_use]
    pub fn total_estimated_minutes(&self) -> u32 {
        self.phases.iter().map(|p| p.estimated_minutes).sum()
    }
}

fn build_units(phases: &[Phase]) -> Vec<ExecutionUnit> {
    let mut units: Vec<ExecutionUnit> = Vec::new();
    for phase in phases {
        match &phase.parallel_group {
            Some(group) => {
                if let Some(ExecutionUnit::Group { name, members }) = units.last_mut()
                    && *name == *group
                {
                    members.push(phase.id.clone());
                    continue;
                }
                units.push(ExecutionUnit::Group {
                    name: group.clone(),
                    members: vec![phase.id.clone()],
                });
            }
            None => units.push(ExecutionUnit::Single(phase.id.clone())),
        }
    }
    units
}
