// iamrestore/src/restore/plan.rs
//! The swap protocol as data: the forward steps, and what must be undone when
//! each of them fails.

use std::fmt;

use super::names::NameTriple;

/// A single administrative operation against the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Create(String),
    Load(String),
    Rename { from: String, to: String },
    Drop(String),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Create(db) => write!(f, "create database {}", db),
            Action::Load(db) => write!(f, "load backup into {}", db),
            Action::Rename { from, to } => write!(f, "rename database {} to {}", from, to),
            Action::Drop(db) => write!(f, "drop database {}", db),
        }
    }
}

/// Forward steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    CreateNew,
    LoadBackup,
    SwapOut,
    SwapIn,
    DropOld,
}

impl Step {
    pub const ALL: [Step; 5] = [
        Step::CreateNew,
        Step::LoadBackup,
        Step::SwapOut,
        Step::SwapIn,
        Step::DropOld,
    ];

    pub fn action(self, names: &NameTriple) -> Action {
        match self {
            Step::CreateNew => Action::Create(names.new.clone()),
            Step::LoadBackup => Action::Load(names.new.clone()),
            Step::SwapOut => Action::Rename {
                from: names.current.clone(),
                to: names.old.clone(),
            },
            Step::SwapIn => Action::Rename {
                from: names.new.clone(),
                to: names.current.clone(),
            },
            Step::DropOld => Action::Drop(names.old.clone()),
        }
    }

    /// State reached once this step has succeeded.
    pub fn reached(self) -> State {
        match self {
            Step::CreateNew => State::NewCreated,
            Step::LoadBackup => State::DataLoaded,
            Step::SwapOut => State::OldRenamed,
            Step::SwapIn => State::NewIsCurrent,
            Step::DropOld => State::Done,
        }
    }

    /// A failure of this step does not fail the restore.
    pub fn is_best_effort(self) -> bool {
        matches!(self, Step::DropOld)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Start,
    NewCreated,
    DataLoaded,
    OldRenamed,
    NewIsCurrent,
    Done,
}

/// One rollback action. A `required` action that fails leaves the server in a
/// state only an operator can repair, so rollback stops there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Undo {
    pub action: Action,
    pub required: bool,
}

impl Undo {
    fn best_effort(action: Action) -> Self {
        Self { action, required: false }
    }

    fn required(action: Action) -> Self {
        Self { action, required: true }
    }
}

/// Actions that undo the effects of the steps completed before `failed`, in
/// the order they must run.
pub fn compensation(failed: Step, names: &NameTriple) -> Vec<Undo> {
    match failed {
        Step::CreateNew | Step::DropOld => Vec::new(),
        Step::LoadBackup | Step::SwapOut => vec![Undo::best_effort(Action::Drop(names.new.clone()))],
        Step::SwapIn => vec![
            Undo::required(Action::Rename {
                from: names.old.clone(),
                to: names.current.clone(),
            }),
            Undo::best_effort(Action::Drop(names.new.clone())),
        ],
    }
}
