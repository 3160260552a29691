//! Route visibility and query planning.

use crate::context::SyncContext;
use crate::profile::{EntityProfile, RouteScope};
use fieldsync_core::{EntityKind, RecordId, UserId};
use fieldsync_remote::Query;
use serde_json::Value;
use std::collections::BTreeSet;

/// Routes the session may see for one entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAccess {
    /// Administrator: every route.
    All,
    /// Only these routes; empty means none.
    Routes(BTreeSet<RecordId>),
}

impl RouteAccess {
    /// Access of the session in `ctx`.
    pub fn for_kind(ctx: &SyncContext, kind: EntityKind) -> Self {
        if ctx.session.is_admin() {
            RouteAccess::All
        } else {
            RouteAccess::Routes(ctx.session.accessible_route_ids(kind).into_iter().collect())
        }
    }

    /// Returns true if records of `route` are visible.
    pub fn allows(&self, route: RecordId) -> bool {
        match self {
            RouteAccess::All => true,
            RouteAccess::Routes(routes) => routes.contains(&route),
        }
    }

    /// Returns true if no route is visible.
    pub fn is_empty(&self) -> bool {
        matches!(self, RouteAccess::Routes(routes) if routes.is_empty())
    }
}

/// Remote queries needed for one pull pass.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPlan {
    /// Nothing may be fetched for this session.
    Suppressed,
    /// Run each query to exhaustion.
    Run(Vec<Query>),
}

/// Restricts `base` to what the session may see.
///
/// Route-field kinds are split into `in` queries of at most
/// `where_in_limit` ids (a single id uses equality). Kinds scoped through a
/// parent are fetched unfiltered and checked per document.
pub fn plan_queries(
    ctx: &SyncContext,
    profile: &EntityProfile,
    base: Query,
    access: &RouteAccess,
    user: &UserId,
) -> QueryPlan {
    let RouteAccess::Routes(routes) = access else {
        return QueryPlan::Run(vec![base]);
    };
    match profile.route_scope {
        RouteScope::Unscoped => QueryPlan::Run(vec![base]),
        RouteScope::Owner(field) => QueryPlan::Run(vec![base.where_equal(field, user_value(user))]),
        _ if routes.is_empty() => QueryPlan::Suppressed,
        RouteScope::ViaParent(_) => QueryPlan::Run(vec![base]),
        RouteScope::Field(field) => {
            let ids: Vec<i64> = routes.iter().map(|r| r.as_i64()).collect();
            let chunk = ctx.config.where_in_limit.max(1);
            QueryPlan::Run(
                ids.chunks(chunk)
                    .map(|chunk| match chunk {
                        [single] => base.clone().where_equal(field, *single),
                        many => base.clone().where_in(field, many.iter().copied()),
                    })
                    .collect(),
            )
        }
    }
}

/// Value an owner field holds for `user`: numeric ids as numbers.
pub(crate) fn user_value(user: &UserId) -> Value {
    user.as_str()
        .parse::<i64>()
        .map_or_else(|_| Value::from(user.as_str()), Value::from)
}

/// Returns true if `value` identifies `user`.
pub(crate) fn is_owned_by(value: Option<&Value>, user: &UserId) -> bool {
    match value {
        Some(Value::String(s)) => s == user.as_str(),
        Some(Value::Number(n)) => n.to_string() == user.as_str(),
        _ => false,
    }
}
