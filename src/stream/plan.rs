//! Static description of a pipeline, recorded as operators are chained.
//!
//! The plan is for inspection only (logging, the demo's `plan` command);
//! the stage factory is what actually runs.

use serde::Serialize;
use std::fmt;

/// What a stage does, grouped coarsely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Source,
    Transform,
    Filter,
    TimeShift,
    Window,
    Backpressure,
    Combine,
    Recover,
    Boundary,
    Observe,
}

/// The operator that produced a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    // Sources
    Range,
    FromIterable,
    Just,
    Empty,
    Error,
    Generate,
    Interval,
    Defer,
    // Element-wise
    Map,
    TryMap,
    ConcatMap,
    FlatMap,
    Filter,
    Skip,
    SkipWhile,
    SkipUntil,
    SkipFor,
    Take,
    DelayElements,
    Buffer,
    BufferTimespan,
    OnBackpressure,
    // Combinators
    Concat,
    Merge,
    Zip,
    // Recovery
    OnErrorContinue,
    OnErrorReturn,
    OnErrorResume,
    OnErrorMap,
    // Plumbing
    RunOn,
    Log,
    DoOnNext,
}

impl StageKind {
    pub fn capability(self) -> Capability {
        use StageKind::*;
        match self {
            Range | FromIterable | Just | Empty | Error | Generate | Interval | Defer => {
                Capability::Source
            }
            Map | TryMap | ConcatMap | FlatMap => Capability::Transform,
            Filter | Skip | SkipWhile | SkipUntil | SkipFor | Take => Capability::Filter,
            DelayElements => Capability::TimeShift,
            Buffer | BufferTimespan => Capability::Window,
            OnBackpressure => Capability::Backpressure,
            Concat | Merge | Zip => Capability::Combine,
            OnErrorContinue | OnErrorReturn | OnErrorResume | OnErrorMap => Capability::Recover,
            RunOn => Capability::Boundary,
            Log | DoOnNext => Capability::Observe,
        }
    }
}

/// One entry of a [`Flux`](crate::stream::Flux) plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageDescriptor {
    pub kind: StageKind,
    pub capability: Capability,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Plans of the streams a combinator consumes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<Vec<StageDescriptor>>,
}

impl StageDescriptor {
    pub fn new(kind: StageKind) -> Self {
        Self {
            kind,
            capability: kind.capability(),
            detail: None,
            inputs: Vec::new(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_inputs(mut self, inputs: Vec<Vec<StageDescriptor>>) -> Self {
        self.inputs = inputs;
        self
    }
}

impl fmt::Display for StageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(detail) = &self.detail {
            write!(f, "({})", detail)?;
        }
        Ok(())
    }
}

/// Render a plan as `Range(1..=20) -> Map -> Buffer(3)`.
pub fn describe(plan: &[StageDescriptor]) -> String {
    plan.iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}
