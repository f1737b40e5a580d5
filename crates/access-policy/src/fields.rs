//! Field restriction selection.
//!
//! Field statements whose principal matches contribute their field names to
//! the bucket of their effect. The restricted set is then
//! `deny ∪ (default − allow)`, limited to the known field names, with `*`
//! handled per bucket:
//!
//! - `*` in deny restricts every known field
//! - `*` in allow empties the default bucket
//! - `*` in default expands to every known field

use crate::context::EvaluationContext;
use crate::policy::AccessPolicy;
use crate::statement::FieldStatement;
use crate::types::{Effect, WILDCARD};
use std::collections::BTreeSet;

#[derive(Debug, Default)]
struct Buckets<'s> {
    deny: BTreeSet<&'s str>,
    allow: BTreeSet<&'s str>,
    default: BTreeSet<&'s str>,
}

impl<'s> Buckets<'s> {
    fn collect(policy: &AccessPolicy, statements: &'s [FieldStatement], ctx: &EvaluationContext) -> Self {
        let mut buckets = Buckets::default();
        for statement in statements {
            if !statement.match_principal(policy, ctx) {
                continue;
            }
            let bucket = match statement.effect() {
                Some(Effect::Deny) => &mut buckets.deny,
                Some(Effect::Allow) => &mut buckets.allow,
                None => &mut buckets.default,
            };
            bucket.extend(statement.fields().iter());
        }
        buckets
    }
}

/// Selects the restricted field names among `known`.
pub fn select(
    policy: &AccessPolicy,
    statements: &[FieldStatement],
    ctx: &EvaluationContext,
    known: &BTreeSet<&str>,
) -> BTreeSet<String> {
    let buckets = Buckets::collect(policy, statements, ctx);

    if buckets.deny.contains(WILDCARD) {
        return known.iter().map(|name| name.to_string()).collect();
    }
    let allow_all = buckets.allow.contains(WILDCARD);
    let default_all = !allow_all && buckets.default.contains(WILDCARD);

    known
        .iter()
        .filter(|name| {
            let by_default = !allow_all && (default_all || buckets.default.contains(**name));
            buckets.deny.contains(**name) || (by_default && !buckets.allow.contains(**name))
        })
        .map(|name| name.to_string())
        .collect()
}
