//! Deployment lifecycle tracking.

use std::fmt;
use std::time::{Duration, Instant};

/// Lifecycle phases of one deployment invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployPhase {
    /// Templates are being rendered.
    Synthesize,
    /// Function code is being built and uploaded.
    Package,
    /// A named stack is being provisioned.
    Provision(String),
    /// Static assets are being published and edge caches invalidated.
    Publish,
    /// A named stack is being deleted.
    Teardown(String),
    /// Deployment completed successfully.
    Complete,
    /// Deployment aborted.
    Failed(String),
}

impl fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Synthesize => write!(f, "synthesize"),
            Self::Package => write!(f, "package"),
            Self::Provision(stack) => write!(f, "provision:{}", stack),
            Self::Publish => write!(f, "publish"),
            Self::Teardown(stack) => write!(f, "teardown:{}", stack),
            Self::Complete => write!(f, "complete"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Ordered record of phases reached during a deployment.
#[derive(Debug, Clone)]
pub struct DeployTimeline {
    start: Instant,
    marks: Vec<(DeployPhase, Duration)>,
}

impl DeployTimeline {
    /// Start a new timeline.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            marks: Vec::new(),
        }
    }

    /// Record that a phase was reached.
    pub fn mark(&mut self, phase: DeployPhase) {
        self.marks.push((phase, self.start.elapsed()));
    }

    /// Phases in the order they were reached.
    pub fn phases(&self) -> impl Iterator<Item = &DeployPhase> {
        self.marks.iter().map(|(phase, _)| phase)
    }

    /// Phases with the offset from start at which each was reached.
    pub fn marks(&self) -> impl Iterator<Item = (&DeployPhase, Duration)> {
        self.marks.iter().map(|(phase, at)| (phase, *at))
    }

    /// Time at which a phase was first reached.
    pub fn reached_at(&self, phase: &DeployPhase) -> Option<Duration> {
        self.marks
            .iter()
            .find(|(p, _)| p == phase)
            .map(|(_, at)| *at)
    }

    /// Whether any stack has been provisioned.
    pub fn provisioned_any(&self) -> bool {
        self.phases().any(|p| matches!(p, DeployPhase::Provision(_)))
    }

    /// Whether the deployment completed.
    pub fn is_complete(&self) -> bool {
        self.phases().any(|p| *p == DeployPhase::Complete)
    }

    /// Reason of the failure, if the deployment aborted.
    pub fn failure(&self) -> Option<&str> {
        self.phases().find_map(|p| match p {
            DeployPhase::Failed(reason) => Some(reason.as_str()),
            _ => None,
        })
    }

    /// Elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for DeployTimeline {
    fn default() -> Self {
        Self::new()
    }
}
