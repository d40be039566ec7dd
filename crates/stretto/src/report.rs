//! Human-readable summaries of recorded profiles.

use std::fmt;

use crate::{
    function::FunctionImpl,
    kind::Kind,
    node::{Expr, walk},
};

/// Snapshot of one function's recorded profiles: invocation count, observed
/// parameter kinds, and per-`if` branch counters.
#[derive(Debug, Clone)]
pub struct ProfileReport {
    pub name: String,
    pub invocations: u32,
    pub params: Vec<ParamReport>,
    /// One entry per `if` in the body, in preorder.
    pub branches: Vec<BranchReport>,
}

/// Observed facts about one declared parameter.
#[derive(Debug, Clone)]
pub struct ParamReport {
    pub name: String,
    /// The join of all kinds seen at entry, when any entry was recorded.
    pub observed: Option<Kind>,
    /// True when every reference value seen was the same object.
    pub monomorphic: bool,
}

/// Taken/not-taken counters of one `if`.
#[derive(Debug, Clone)]
pub struct BranchReport {
    /// Rendering of the condition expression.
    pub condition: String,
    pub true_count: u32,
    pub false_count: u32,
}

impl ProfileReport {
    pub(crate) fn for_function(func: &FunctionImpl) -> Self {
        let params = func
            .params
            .iter()
            .enumerate()
            .map(|(i, param)| {
                let profile = func.profile.param(i);
                ParamReport {
                    name: param.name.clone(),
                    observed: profile.has_data().then(|| profile.observed_kind().kind()).flatten(),
                    monomorphic: profile.is_monomorphic(),
                }
            })
            .collect();
        let mut branches = Vec::new();
        walk(&func.body, &mut |node| {
            if let Expr::If {
                cond,
                true_count,
                false_count,
                ..
            } = &node.expr
            {
                branches.push(BranchReport {
                    condition: cond.to_string(),
                    true_count: true_count.get(),
                    false_count: false_count.get(),
                });
            }
        });
        Self {
            name: func.name.clone(),
            invocations: func.profile.invocations(),
            params,
            branches,
        }
    }
}

impl fmt::Display for ProfileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {} invocation(s)", self.name, self.invocations)?;
        for p in &self.params {
            match p.observed {
                Some(kind) => {
                    let mono = if p.monomorphic { ", monomorphic" } else { "" };
                    writeln!(f, "  param {}: {kind}{mono}", p.name)?;
                }
                None => writeln!(f, "  param {}: never observed", p.name)?,
            }
        }
        for b in &self.branches {
            writeln!(
                f,
                "  if {}: true {} / false {}",
                b.condition, b.true_count, b.false_count
            )?;
        }
        Ok(())
    }
}
