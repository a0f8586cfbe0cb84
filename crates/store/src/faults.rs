//! Fault injection for the in-memory adapters.
//!
//! Tests arm a rule per [`Operation`]; the adapter consults the plan before
//! touching its data so a failing call leaves no trace.

use std::collections::HashMap;

use crate::error::StoreError;

/// Every side-effecting or reading adapter call that can be failed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    InsertAccount,
    GetAccount,
    UpdateAccount,
    DeleteAccount,
    InsertGarment,
    GetGarment,
    UpdateGarment,
    DeleteGarment,
    ListGarments,
    InsertBinding,
    DeleteBinding,
    ListBindings,
    InsertOutfit,
    GetOutfit,
    UpdateOutfit,
    DeleteOutfit,
    InsertPlacement,
    DeletePlacement,
    ListPlacements,
    InsertPost,
    GetPost,
    DeletePost,
    ListPosts,
    WriteBlob,
    ReadBlob,
    DeleteBlob,
    PutSession,
    GetSession,
    RemoveSession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FaultRule {
    /// Fail only the n-th call (1-based) counted from when the rule was armed.
    Nth(u32),
    /// Fail every call.
    Always,
}

/// Armed fault rules plus per-operation call counters.
#[derive(Debug, Default)]
pub struct FaultPlan {
    rules: HashMap<Operation, FaultRule>,
    calls: HashMap<Operation, u32>,
}

impl FaultPlan {
    /// Fails the `nth` call (1-based) of `op` made after this point.
    pub fn fail_on(&mut self, op: Operation, nth: u32) {
        self.calls.insert(op, 0);
        self.rules.insert(op, FaultRule::Nth(nth.max(1)));
    }

    /// Fails every call of `op` until cleared.
    pub fn fail_always(&mut self, op: Operation) {
        self.rules.insert(op, FaultRule::Always);
    }

    /// Disarms every rule.
    pub fn clear(&mut self) {
        self.rules.clear();
    }

    /// Number of calls of `op` seen since its rule was last armed.
    pub fn calls(&self, op: Operation) -> u32 {
        self.calls.get(&op).copied().unwrap_or(0)
    }

    /// Records a call and returns an error if a rule matches it.
    pub fn check(&mut self, op: Operation) -> Result<(), StoreError> {
        let count = self.calls.entry(op).or_insert(0);
        *count += 1;
        let count = *count;

        match self.rules.get(&op) {
            Some(FaultRule::Always) => Err(Self::injected(op)),
            Some(FaultRule::Nth(n)) if *n == count => Err(Self::injected(op)),
            _ => Ok(()),
        }
    }

    fn injected(op: Operation) -> StoreError {
        StoreError::Unavailable(format!("injected fault on {op:?}"))
    }
}
