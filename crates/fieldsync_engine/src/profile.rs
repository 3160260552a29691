//! Per-entity sync behaviour.
//!
//! Every [`EntityKind`] maps to one [`EntityProfile`] describing how its
//! documents are scoped to routes, which parents must exist locally before a
//! pulled record is stored, and which child kinds it owns.

use fieldsync_core::EntityKind;

/// How a kind's records relate to route visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteScope {
    /// Visible to every user of the tenant.
    Unscoped,
    /// Route id stored on the document in this field; filterable in queries.
    Field(&'static str),
    /// Route inherited from a local parent record of this kind.
    ViaParent(EntityKind),
    /// Document belongs to the user whose id is stored in this field.
    Owner(&'static str),
}

/// What to do when a declared parent is missing locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteFallback {
    /// Defer the child.
    None,
    /// Accept the child if it carries its own route id and the session may
    /// access that route.
    OwnRoute,
}

/// A declared parent reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentRef {
    /// Parent kind.
    pub kind: EntityKind,
    /// Foreign key field on the child.
    pub field: &'static str,
    /// Behaviour when the parent is absent.
    pub fallback: RouteFallback,
}

impl ParentRef {
    const fn strict(kind: EntityKind) -> Self {
        Self {
            kind,
            field: kind.reference_field(),
            fallback: RouteFallback::None,
        }
    }

    const fn own_route(kind: EntityKind) -> Self {
        Self {
            kind,
            field: kind.reference_field(),
            fallback: RouteFallback::OwnRoute,
        }
    }
}

/// Sync behaviour of one entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityProfile {
    /// Kind described.
    pub kind: EntityKind,
    /// Route visibility rule.
    pub route_scope: RouteScope,
    /// Parents checked before a pulled record is stored.
    pub parents: &'static [ParentRef],
    /// Kinds pulled and pushed by this kind's handler after its own records.
    pub children: &'static [EntityKind],
    /// Failure of this kind's pull aborts the rest of the cycle.
    pub hard_dependency: bool,
}

const ROUTE_FIELD: &str = "route_id";

const EMPLOYEE_ROUTE_PARENTS: &[ParentRef] = &[
    ParentRef::strict(EntityKind::Employee),
    ParentRef::own_route(EntityKind::Route),
];
const CLIENT_PARENTS: &[ParentRef] = &[ParentRef::own_route(EntityKind::Route)];
const CLIENT_CHILD_PARENTS: &[ParentRef] = &[ParentRef::strict(EntityKind::Client)];
const SETTLEMENT_PARENTS: &[ParentRef] = &[
    ParentRef::strict(EntityKind::Client),
    ParentRef::own_route(EntityKind::Cycle),
];
const SETTLEMENT_LINE_PARENTS: &[ParentRef] = &[
    ParentRef::strict(EntityKind::Settlement),
    ParentRef::strict(EntityKind::Table),
];
const EXPENSE_PARENTS: &[ParentRef] = &[ParentRef::own_route(EntityKind::Cycle)];
const AMENDMENT_PARENTS: &[ParentRef] = &[ParentRef::strict(EntityKind::Contract)];
const GOAL_PARENTS: &[ParentRef] = &[ParentRef::own_route(EntityKind::Employee)];
const AUDIT_LOG_PARENTS: &[ParentRef] = &[ParentRef::strict(EntityKind::Signature)];
const EXPENSE_TYPE_PARENTS: &[ParentRef] = &[ParentRef::strict(EntityKind::ExpenseCategory)];

// Stock rows outlive the tables they mention (sold or scrapped tables), so
// they carry no parent check.
const STOCK_CHILDREN: &[EntityKind] = &[
    EntityKind::SoldTable,
    EntityKind::RefurbishedTable,
    EntityKind::TableCloth,
    EntityKind::TableMaintenance,
];

impl EntityProfile {
    /// Profile of a kind.
    pub const fn for_kind(kind: EntityKind) -> Self {
        use EntityKind as K;
        let (route_scope, parents, children, hard_dependency): (
            RouteScope,
            &'static [ParentRef],
            &'static [EntityKind],
            bool,
        ) = match kind {
            K::Employee => (RouteScope::Unscoped, &[], &[], true),
            K::EmployeeRoute => (
                RouteScope::Owner("employee_id"),
                EMPLOYEE_ROUTE_PARENTS,
                &[],
                true,
            ),
            K::Route => (RouteScope::Field("id"), &[], &[], true),
            K::Client => (
                RouteScope::Field(ROUTE_FIELD),
                CLIENT_PARENTS,
                &[],
                false,
            ),
            K::Table => (
                RouteScope::ViaParent(K::Client),
                CLIENT_CHILD_PARENTS,
                &[],
                false,
            ),
            K::Cycle => (RouteScope::Field(ROUTE_FIELD), &[], &[], false),
            K::Settlement => (
                RouteScope::Field(ROUTE_FIELD),
                SETTLEMENT_PARENTS,
                &[K::SettlementLine],
                false,
            ),
            K::SettlementLine => (
                RouteScope::ViaParent(K::Settlement),
                SETTLEMENT_LINE_PARENTS,
                &[],
                false,
            ),
            K::Expense => (
                RouteScope::Field(ROUTE_FIELD),
                EXPENSE_PARENTS,
                &[],
                false,
            ),
            K::Contract => (
                RouteScope::ViaParent(K::Client),
                CLIENT_CHILD_PARENTS,
                &[K::ContractAmendment],
                false,
            ),
            K::ContractAmendment => (
                RouteScope::ViaParent(K::Contract),
                AMENDMENT_PARENTS,
                &[],
                false,
            ),
            K::Goal | K::EmployeeGoal => (
                RouteScope::Field(ROUTE_FIELD),
                GOAL_PARENTS,
                &[],
                false,
            ),
            K::Signature => (RouteScope::Unscoped, &[], &[K::SignatureAuditLog], false),
            K::SignatureAuditLog => (RouteScope::Unscoped, AUDIT_LOG_PARENTS, &[], false),
            K::ExpenseCategory => (RouteScope::Unscoped, &[], &[K::ExpenseType], false),
            K::ExpenseType => (RouteScope::Unscoped, EXPENSE_TYPE_PARENTS, &[], false),
            K::Cloth => (RouteScope::Unscoped, &[], STOCK_CHILDREN, false),
            K::Vehicle
            | K::Equipment
            | K::SoldTable
            | K::RefurbishedTable
            | K::TableCloth
            | K::TableMaintenance => (RouteScope::Unscoped, &[], &[], false),
        };
        Self {
            kind,
            route_scope,
            parents,
            children,
            hard_dependency,
        }
    }

    /// Kind whose handler owns this kind, if any.
    pub fn owner(kind: EntityKind) -> Option<EntityKind> {
        EntityKind::ALL
            .into_iter()
            .find(|candidate| Self::for_kind(*candidate).children.contains(&kind))
    }
}
