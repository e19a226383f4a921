//! The structured event stream emitted by the checkout engine and build scheduler (§4.7).
//!
//! The core never prints directly; it emits these and leaves rendering to the CLI's
//! logging layer (`utica-tracing`), the same separation the teacher keeps between
//! `forc-pkg` and `forc`.

use crate::dependency::DependencyId;

/// One observable step of provisioning or building a dependency.
#[derive(Clone, Debug)]
pub enum ProjectEvent {
    Cloning(DependencyId),
    Fetching(DependencyId),
    CheckingOut { dep: DependencyId, revision: String },
    DownloadingBinaries { dep: DependencyId, rev_label: String },
    SkippedDownloadingBinaries { dep: DependencyId, reason: String },
    SkippedBuilding { dep: DependencyId, reason: String },
    SkippedBuildingCached(DependencyId),
    RebuildingCached(DependencyId),
    BuildingUncached(DependencyId),
    SkippedInstallingBinaries { dep: DependencyId, error: String },
}

impl ProjectEvent {
    /// The action verb used for the right-aligned, colorized action-line rendering
    /// (`utica_tracing::println_action_green`/`println_action_red`).
    pub fn action(&self) -> &'static str {
        match self {
            ProjectEvent::Cloning(_) => "Cloning",
            ProjectEvent::Fetching(_) => "Fetching",
            ProjectEvent::CheckingOut { .. } => "Checking out",
            ProjectEvent::DownloadingBinaries { .. } => "Downloading",
            ProjectEvent::SkippedDownloadingBinaries { .. } => "Skipped",
            ProjectEvent::SkippedBuilding { .. } => "Skipped",
            ProjectEvent::SkippedBuildingCached(_) => "Skipped",
            ProjectEvent::RebuildingCached(_) => "Rebuilding",
            ProjectEvent::BuildingUncached(_) => "Building",
            ProjectEvent::SkippedInstallingBinaries { .. } => "Skipped",
        }
    }

    /// Whether this event represents a successful or a downgraded/skipped outcome, for
    /// picking between `println_action_green` and `println_action_red`.
    pub fn is_nominal(&self) -> bool {
        !matches!(
            self,
            ProjectEvent::SkippedDownloadingBinaries { .. }
                | ProjectEvent::SkippedBuilding { .. }
                | ProjectEvent::SkippedInstallingBinaries { .. }
        )
    }

    pub fn dependency(&self) -> &DependencyId {
        match self {
            ProjectEvent::Cloning(d)
            | ProjectEvent::Fetching(d)
            | ProjectEvent::CheckingOut { dep: d, .. }
            | ProjectEvent::DownloadingBinaries { dep: d, .. }
            | ProjectEvent::SkippedDownloadingBinaries { dep: d, .. }
            | ProjectEvent::SkippedBuilding { dep: d, .. }
            | ProjectEvent::SkippedBuildingCached(d)
            | ProjectEvent::RebuildingCached(d)
            | ProjectEvent::BuildingUncached(d)
            | ProjectEvent::SkippedInstallingBinaries { dep: d, .. } => d,
        }
    }
}

/// A sink events are pushed to. The CLI layer implements this over `utica-tracing`'s
/// action-line helpers; tests implement it over a `Vec`.
pub trait EventSink {
    fn emit(&mut self, event: ProjectEvent);
}

impl EventSink for Vec<ProjectEvent> {
    fn emit(&mut self, event: ProjectEvent) {
        self.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::{DependencyId, Host};

    fn dep() -> DependencyId {
        DependencyId::Hosted {
            host: Host::Primary,
            owner: "owner".into(),
            name: "name".into(),
        }
    }

    #[test]
    fn skipped_events_are_not_nominal() {
        let ev = ProjectEvent::SkippedBuilding {
            dep: dep(),
            reason: "no shared schemes".into(),
        };
        assert!(!ev.is_nominal());
    }

    #[test]
    fn vec_sink_collects_events_in_order() {
        let mut sink: Vec<ProjectEvent> = Vec::new();
        sink.emit(ProjectEvent::Cloning(dep()));
        sink.emit(ProjectEvent::SkippedBuildingCached(dep()));
        assert_eq!(sink.len(), 2);
    }
}
