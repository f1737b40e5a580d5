//! Principal matching.
//!
//! Principal tokens are either built-in roles (`*`, `admin`, `staff`,
//! `authenticated`, `anonymous`, `active`, `disabled`), an identity token
//! (`id:<actor id>`), or a group token (`group:<name>`). The identity and group
//! prefixes are configured per policy.
//!
//! Group tokens are resolved through one of two capabilities. When the policy
//! has a [`GroupResolver`], the actor's group values are fetched and compared
//! against the tokens. Otherwise the group names are stripped from the tokens
//! and handed to the policy's [`GroupMembership`]. Only one path runs.

use crate::types::{Actor, Tokens, WILDCARD};
use std::fmt;

/// Lists the group values of an actor.
pub trait GroupResolver: Send + Sync {
    fn group_values(&self, actor: &Actor) -> Vec<String>;
}

/// Answers whether an actor belongs to any of the named groups.
pub trait GroupMembership: Send + Sync {
    fn is_member_of_any(&self, actor: &Actor, groups: &[String]) -> bool;
}

impl<F> GroupResolver for F
where
    F: Fn(&Actor) -> Vec<String> + Send + Sync,
{
    fn group_values(&self, actor: &Actor) -> Vec<String> {
        self(actor)
    }
}

/// Membership backed by the groups carried on the actor itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActorGroups;

impl GroupMembership for ActorGroups {
    fn is_member_of_any(&self, actor: &Actor, groups: &[String]) -> bool {
        actor.groups.iter().any(|g| groups.contains(g))
    }
}

/// Matches principal tokens against an actor.
#[derive(Clone, Copy)]
pub struct PrincipalMatcher<'a> {
    pub group_prefix: &'a str,
    pub id_prefix: &'a str,
    pub resolver: Option<&'a dyn GroupResolver>,
    pub membership: &'a dyn GroupMembership,
}

impl<'a> PrincipalMatcher<'a> {
    /// Whether any of the tokens designates the actor.
    pub fn matches(&self, principals: &Tokens, actor: &Actor) -> bool {
        principals.contains(WILDCARD)
            || (principals.contains("admin") && actor.is_superuser)
            || (principals.contains("staff") && actor.is_staff)
            || (principals.contains("authenticated") && !actor.is_anonymous)
            || (principals.contains("anonymous") && actor.is_anonymous)
            || (principals.contains("active") && actor.is_active)
            || (principals.contains("disabled") && !actor.is_active && !actor.is_anonymous)
            || self.matches_id(principals, actor)
            || self.matches_group(principals, actor)
    }

    fn matches_id(&self, principals: &Tokens, actor: &Actor) -> bool {
        actor
            .id
            .as_ref()
            .is_some_and(|id| principals.contains(&format!("{}{}", self.id_prefix, id)))
    }

    fn matches_group(&self, principals: &Tokens, actor: &Actor) -> bool {
        match self.resolver {
            Some(resolver) => resolver
                .group_values(actor)
                .iter()
                .any(|group| principals.contains(&format!("{}{}", self.group_prefix, group))),
            None => self
                .membership
                .is_member_of_any(actor, &group_names(principals, self.group_prefix)),
        }
    }
}

impl fmt::Debug for PrincipalMatcher<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrincipalMatcher")
            .field("group_prefix", &self.group_prefix)
            .field("id_prefix", &self.id_prefix)
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

/// Group names named by group tokens, with the prefix stripped.
pub fn group_names(principals: &Tokens, group_prefix: &str) -> Vec<String> {
    principals
        .iter()
        .filter_map(|p| p.strip_prefix(group_prefix))
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}
