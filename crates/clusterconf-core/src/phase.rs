//! Cluster lifecycle phases
//!
//! The phase an operation runs in decides whether configuration changes are
//! checked at all. During `BaseInfra` the cluster does not exist yet, so no
//! change can be unsafe.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when parsing an unknown phase name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown phase '{name}'")]
pub struct ParsePhaseError {
    pub name: String,
}

/// Lifecycle phase of a bootstrap or converge operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationPhase {
    /// Initial infrastructure creation
    BaseInfra,
    RegistryPackagesProxy,
    ExecuteBashibleBundle,
    InstallDeckhouse,
    InstallAdditionalMastersAndStaticNodes,
    CreateResources,
    ExecPostBootstrap,
    Finalization,
    AllNodes,
    ScaleToMultiMaster,
    ScaleToSingleMaster,
    DeleteResources,
}

impl OperationPhase {
    pub const ALL: [OperationPhase; 12] = [
        Self::BaseInfra,
        Self::RegistryPackagesProxy,
        Self::ExecuteBashibleBundle,
        Self::InstallDeckhouse,
        Self::InstallAdditionalMastersAndStaticNodes,
        Self::CreateResources,
        Self::ExecPostBootstrap,
        Self::Finalization,
        Self::AllNodes,
        Self::ScaleToMultiMaster,
        Self::ScaleToSingleMaster,
        Self::DeleteResources,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BaseInfra => "BaseInfra",
            Self::RegistryPackagesProxy => "RegistryPackagesProxy",
            Self::ExecuteBashibleBundle => "ExecuteBashibleBundle",
            Self::InstallDeckhouse => "InstallDeckhouse",
            Self::InstallAdditionalMastersAndStaticNodes => "InstallAdditionalMastersAndStaticNodes",
            Self::CreateResources => "CreateResources",
            Self::ExecPostBootstrap => "ExecPostBootstrap",
            Self::Finalization => "Finalization",
            Self::AllNodes => "AllNodes",
            Self::ScaleToMultiMaster => "ScaleToMultiMaster",
            Self::ScaleToSingleMaster => "ScaleToSingleMaster",
            Self::DeleteResources => "DeleteResources",
        }
    }

    /// Whether configuration changes in this phase skip the safety policy
    pub fn bypasses_change_safety(self) -> bool {
        matches!(self, Self::BaseInfra)
    }
}

impl FromStr for OperationPhase {
    type Err = ParsePhaseError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|phase| phase.as_str() == name)
            .ok_or_else(|| ParsePhaseError {
                name: name.to_string(),
            })
    }
}

impl fmt::Display for OperationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
