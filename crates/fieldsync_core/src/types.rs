//! Core type definitions for fieldsync.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Local identifier of a domain record.
///
/// Remote documents use the decimal rendering of this id as their document id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl RecordId {
    /// Creates a new record ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Self)
    }
}

/// Milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// The epoch; used as "never" for watermarks and missing timestamps.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Creates a timestamp from epoch milliseconds.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns epoch milliseconds.
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Returns true for the epoch value.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Returns the timestamp one millisecond earlier, saturating at zero.
    #[must_use]
    pub fn just_before(self) -> Self {
        Self(self.0.saturating_sub(1).max(0))
    }

    /// Milliseconds elapsed from `earlier` to `self`, zero if negative.
    #[must_use]
    pub fn millis_since(self, earlier: Timestamp) -> u64 {
        u64::try_from(self.0.saturating_sub(earlier.0)).unwrap_or(0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the signed-in user that owns sync bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Creates a user id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Every entity type the engine synchronizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Field employee (user identity).
    Employee,
    /// Assignment of an employee to a route.
    EmployeeRoute,
    /// Rental route grouping clients.
    Route,
    /// Client renting equipment on a route.
    Client,
    /// Rented table installed at a client.
    Table,
    /// Collection cycle of a route.
    Cycle,
    /// Periodic financial settlement with a client.
    Settlement,
    /// Per-table line of a settlement.
    SettlementLine,
    /// Route expense.
    Expense,
    /// Rental contract.
    Contract,
    /// Amendment to a rental contract.
    ContractAmendment,
    /// Company vehicle.
    Vehicle,
    /// Collection goal.
    Goal,
    /// Stock equipment.
    Equipment,
    /// Per-employee collection goal.
    EmployeeGoal,
    /// Representative signature used on contracts.
    Signature,
    /// Audit trail entry of a signature use.
    SignatureAuditLog,
    /// Grouping of expense types.
    ExpenseCategory,
    /// Type of route expense.
    ExpenseType,
    /// Table cloth held in stock.
    Cloth,
    /// Table sold out of the rental fleet.
    SoldTable,
    /// Table refurbished in the workshop.
    RefurbishedTable,
    /// Cloth installed on a table.
    TableCloth,
    /// Maintenance history entry of a table.
    TableMaintenance,
}

impl EntityKind {
    /// All kinds, in declaration order.
    pub const ALL: [EntityKind; 24] = [
        EntityKind::Employee,
        EntityKind::EmployeeRoute,
        EntityKind::Route,
        EntityKind::Client,
        EntityKind::Table,
        EntityKind::Cycle,
        EntityKind::Settlement,
        EntityKind::SettlementLine,
        EntityKind::Expense,
        EntityKind::Contract,
        EntityKind::ContractAmendment,
        EntityKind::Vehicle,
        EntityKind::Goal,
        EntityKind::Equipment,
        EntityKind::EmployeeGoal,
        EntityKind::Signature,
        EntityKind::SignatureAuditLog,
        EntityKind::ExpenseCategory,
        EntityKind::ExpenseType,
        EntityKind::Cloth,
        EntityKind::SoldTable,
        EntityKind::RefurbishedTable,
        EntityKind::TableCloth,
        EntityKind::TableMaintenance,
    ];

    /// Singular snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            EntityKind::Employee => "employee",
            EntityKind::EmployeeRoute => "employee_route",
            EntityKind::Route => "route",
            EntityKind::Client => "client",
            EntityKind::Table => "table",
            EntityKind::Cycle => "cycle",
            EntityKind::Settlement => "settlement",
            EntityKind::SettlementLine => "settlement_line",
            EntityKind::Expense => "expense",
            EntityKind::Contract => "contract",
            EntityKind::ContractAmendment => "contract_amendment",
            EntityKind::Vehicle => "vehicle",
            EntityKind::Goal => "goal",
            EntityKind::Equipment => "equipment",
            EntityKind::EmployeeGoal => "employee_goal",
            EntityKind::Signature => "signature",
            EntityKind::SignatureAuditLog => "signature_audit_log",
            EntityKind::ExpenseCategory => "expense_category",
            EntityKind::ExpenseType => "expense_type",
            EntityKind::Cloth => "cloth",
            EntityKind::SoldTable => "sold_table",
            EntityKind::RefurbishedTable => "refurbished_table",
            EntityKind::TableCloth => "table_cloth",
            EntityKind::TableMaintenance => "table_maintenance",
        }
    }

    /// Name of the remote collection holding this kind.
    ///
    /// Also used as the pull metadata key.
    #[must_use]
    pub const fn collection_name(self) -> &'static str {
        match self {
            EntityKind::Employee => "employees",
            EntityKind::EmployeeRoute => "employee_routes",
            EntityKind::Route => "routes",
            EntityKind::Client => "clients",
            EntityKind::Table => "tables",
            EntityKind::Cycle => "cycles",
            EntityKind::Settlement => "settlements",
            EntityKind::SettlementLine => "settlement_lines",
            EntityKind::Expense => "expenses",
            EntityKind::Contract => "contracts",
            EntityKind::ContractAmendment => "contract_amendments",
            EntityKind::Vehicle => "vehicles",
            EntityKind::Goal => "goals",
            EntityKind::Equipment => "equipment",
            EntityKind::EmployeeGoal => "employee_goals",
            EntityKind::Signature => "signatures",
            EntityKind::SignatureAuditLog => "signature_audit_logs",
            EntityKind::ExpenseCategory => "expense_categories",
            EntityKind::ExpenseType => "expense_types",
            EntityKind::Cloth => "cloths",
            EntityKind::SoldTable => "sold_tables",
            EntityKind::RefurbishedTable => "refurbished_tables",
            EntityKind::TableCloth => "table_cloths",
            EntityKind::TableMaintenance => "table_maintenance",
        }
    }

    /// Field name other records use to reference this kind.
    #[must_use]
    pub const fn reference_field(self) -> &'static str {
        match self {
            EntityKind::Employee => "employee_id",
            EntityKind::EmployeeRoute => "employee_route_id",
            EntityKind::Route => "route_id",
            EntityKind::Client => "client_id",
            EntityKind::Table => "table_id",
            EntityKind::Cycle => "cycle_id",
            EntityKind::Settlement => "settlement_id",
            EntityKind::SettlementLine => "settlement_line_id",
            EntityKind::Expense => "expense_id",
            EntityKind::Contract => "contract_id",
            EntityKind::ContractAmendment => "contract_amendment_id",
            EntityKind::Vehicle => "vehicle_id",
            EntityKind::Goal => "goal_id",
            EntityKind::Equipment => "equipment_id",
            EntityKind::EmployeeGoal => "employee_goal_id",
            EntityKind::Signature => "signature_id",
            EntityKind::SignatureAuditLog => "signature_audit_log_id",
            EntityKind::ExpenseCategory => "expense_category_id",
            EntityKind::ExpenseType => "expense_type_id",
            EntityKind::Cloth => "cloth_id",
            EntityKind::SoldTable => "sold_table_id",
            EntityKind::RefurbishedTable => "refurbished_table_id",
            EntityKind::TableCloth => "table_cloth_id",
            EntityKind::TableMaintenance => "table_maintenance_id",
        }
    }

    /// Fields forming the natural key, empty when the kind has none.
    #[must_use]
    pub const fn natural_key_fields(self) -> &'static [&'static str] {
        match self {
            EntityKind::Employee => &["email"],
            EntityKind::EmployeeRoute => &["employee_id", "route_id"],
            EntityKind::Route => &["name"],
            EntityKind::Client => &["name", "route_id"],
            EntityKind::Table => &["number"],
            EntityKind::Cycle => &["route_id", "year", "number"],
            EntityKind::Contract => &["contract_number"],
            EntityKind::Vehicle => &["plate"],
            EntityKind::Equipment => &["serial"],
            EntityKind::ExpenseCategory => &["name"],
            EntityKind::ExpenseType => &["expense_category_id", "name"],
            EntityKind::Cloth => &["number"],
            EntityKind::TableCloth => &["table_id", "cloth_id"],
            EntityKind::Settlement
            | EntityKind::SettlementLine
            | EntityKind::Expense
            | EntityKind::ContractAmendment
            | EntityKind::Goal
            | EntityKind::EmployeeGoal
            | EntityKind::Signature
            | EntityKind::SignatureAuditLog
            | EntityKind::SoldTable
            | EntityKind::RefurbishedTable
            | EntityKind::TableMaintenance => &[],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = CoreError;

    /// Accepts the singular name or the collection name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s || kind.collection_name() == s)
            .ok_or_else(|| CoreError::UnknownEntityKind(s.to_string()))
    }
}
