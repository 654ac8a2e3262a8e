// Copyright ArborDB Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;

use crate::driver::spi::SourceMeta;
use crate::error_::{ArborError, Result};
use crate::value::ValueReceive;

/// Root struct containing statement metadata.
///
/// Obtained from [`ResultCursor::consume()`]; it is materialised exactly once
/// per cursor and shared between repeated calls.
///
/// [`ResultCursor::consume()`]: crate::driver::cursor::ResultCursor::consume
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Summary {
    pub statement_type: Option<StatementType>,
    pub counters: Counters,
    pub notifications: Vec<Notification>,
    pub plan: Option<Plan>,
    pub profile: Option<Profile>,
    pub database: Option<String>,
}

impl Summary {
    pub(crate) fn parse(mut meta: SourceMeta) -> Result<Self> {
        let statement_type = StatementType::load_meta(&mut meta)?;
        let counters = Counters::load_meta(&mut meta)?;
        let notifications = Notification::load_meta(&mut meta)?;
        let plan = meta
            .remove("plan")
            .map(|plan| Plan::parse(try_into_map(plan, "plan")?))
            .transpose()?;
        let profile = meta
            .remove("profile")
            .map(|profile| Profile::parse(try_into_map(profile, "profile")?))
            .transpose()?;
        let database = meta
            .remove("db")
            .map(|db| try_into_string(db, "db in summary"))
            .transpose()?;
        Ok(Self {
            statement_type,
            counters,
            notifications,
            plan,
            profile,
            database,
        })
    }
}

/// What kind of effect a statement has on the database.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StatementType {
    ReadOnly,
    ReadWrite,
    WriteOnly,
    SchemaWrite,
}

impl StatementType {
    fn load_meta(meta: &mut SourceMeta) -> Result<Option<Self>> {
        let Some(statement_type) = meta.remove("type") else {
            return Ok(None);
        };
        let statement_type = try_into_string(statement_type, "type in summary")?;
        Ok(Some(match statement_type.as_str() {
            "r" => Self::ReadOnly,
            "rw" => Self::ReadWrite,
            "w" => Self::WriteOnly,
            "s" => Self::SchemaWrite,
            _ => {
                return Err(ArborError::protocol_error(format!(
                    "statement type in summary was an unknown string {:?}",
                    statement_type
                )))
            }
        }))
    }
}

/// Counts of changes a statement caused.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct Counters {
    pub nodes_created: i64,
    pub nodes_deleted: i64,
    pub relationships_created: i64,
    pub relationships_deleted: i64,
    pub properties_set: i64,
    pub labels_added: i64,
    pub labels_removed: i64,
    pub indexes_added: i64,
    pub indexes_removed: i64,
    pub constraints_added: i64,
    pub constraints_removed: i64,
    pub contains_updates: bool,
}

impl Counters {
    fn load_meta(meta: &mut SourceMeta) -> Result<Self> {
        let Some(stats) = meta.remove("stats") else {
            return Ok(Default::default());
        };
        let mut stats = try_into_map(stats, "stats")?;
        let mut stat =
            |name: &str| -> Result<i64> { opt_int(&mut stats, name, "in summary stats") };

        let nodes_created = stat("nodes-created")?;
        let nodes_deleted = stat("nodes-deleted")?;
        let relationships_created = stat("relationships-created")?;
        let relationships_deleted = stat("relationships-deleted")?;
        let properties_set = stat("properties-set")?;
        let labels_added = stat("labels-added")?;
        let labels_removed = stat("labels-removed")?;
        let indexes_added = stat("indexes-added")?;
        let indexes_removed = stat("indexes-removed")?;
        let constraints_added = stat("constraints-added")?;
        let constraints_removed = stat("constraints-removed")?;
        let contains_updates = match stats.remove("contains-updates") {
            Some(value) => value.try_into_bool().map_err(|v| {
                ArborError::protocol_error(format!(
                    "contains-updates in summary stats was not boolean but {:?}",
                    v
                ))
            })?,
            None => {
                nodes_created > 0
                    || nodes_deleted > 0
                    || relationships_created > 0
                    || relationships_deleted > 0
                    || properties_set > 0
                    || labels_added > 0
                    || labels_removed > 0
                    || indexes_added > 0
                    || indexes_removed > 0
                    || constraints_added > 0
                    || constraints_removed > 0
            }
        };
        Ok(Self {
            nodes_created,
            nodes_deleted,
            relationships_created,
            relationships_deleted,
            properties_set,
            labels_added,
            labels_removed,
            indexes_added,
            indexes_removed,
            constraints_added,
            constraints_removed,
            contains_updates,
        })
    }
}

/// A hint or warning the server attached to the statement.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Notification {
    pub code: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub position: Option<Position>,
}

impl Notification {
    fn load_meta(meta: &mut SourceMeta) -> Result<Vec<Self>> {
        let Some(raw) = meta.remove("notifications") else {
            return Ok(Vec::new());
        };
        let raw = try_into_list(raw, "notifications")?;
        raw.into_iter()
            .map(|notification| {
                let mut notification = try_into_map(notification, "notification")?;
                Ok(Self {
                    code: opt_string(&mut notification, "code", "in notification")?,
                    title: opt_string(&mut notification, "title", "in notification")?,
                    description: opt_string(&mut notification, "description", "in notification")?,
                    severity: notification
                        .remove("severity")
                        .map(|severity| {
                            Ok::<_, ArborError>(Severity::from_str(&try_into_string(
                                severity,
                                "severity in notification",
                            )?))
                        })
                        .transpose()?
                        .unwrap_or(Severity::Unknown),
                    position: notification
                        .remove("position")
                        .map(|position| {
                            Position::parse(try_into_map(position, "position in notification")?)
                        })
                        .transpose()?,
                })
            })
            .collect()
    }
}

/// Severity of a [`Notification`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Information,
    /// The server sent a severity the driver is unaware of.
    Unknown,
}

impl Severity {
    fn from_str(s: &str) -> Self {
        match s {
            "WARNING" => Self::Warning,
            "INFORMATION" => Self::Information,
            _ => Self::Unknown,
        }
    }
}

/// Where in the statement text a [`Notification`] applies.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Position {
    pub offset: i64,
    pub line: i64,
    pub column: i64,
}

impl Position {
    fn parse(mut meta: HashMap<String, ValueReceive>) -> Result<Self> {
        Ok(Self {
            offset: opt_int(&mut meta, "offset", "in position")?,
            line: opt_int(&mut meta, "line", "in position")?,
            column: opt_int(&mut meta, "column", "in position")?,
        })
    }
}

/// One operator of the server's execution plan.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Plan {
    pub operator_type: String,
    pub identifiers: Vec<String>,
    pub arguments: HashMap<String, ValueReceive>,
    pub children: Vec<Plan>,
}

impl Plan {
    fn parse(mut meta: HashMap<String, ValueReceive>) -> Result<Self> {
        let (operator_type, identifiers, arguments, children) = parse_plan_common(&mut meta)?;
        let children = children
            .into_iter()
            .map(|child| Plan::parse(try_into_map(child, "plan child")?))
            .collect::<Result<_>>()?;
        Ok(Self {
            operator_type,
            identifiers,
            arguments,
            children,
        })
    }
}

/// One operator of the server's execution plan, annotated with runtime
/// measurements.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Profile {
    pub operator_type: String,
    pub identifiers: Vec<String>,
    pub arguments: HashMap<String, ValueReceive>,
    pub db_hits: i64,
    pub rows: i64,
    pub children: Vec<Profile>,
}

impl Profile {
    fn parse(mut meta: HashMap<String, ValueReceive>) -> Result<Self> {
        let (operator_type, identifiers, arguments, children) = parse_plan_common(&mut meta)?;
        let db_hits = opt_int(&mut meta, "dbHits", "in profile")?;
        let rows = opt_int(&mut meta, "rows", "in profile")?;
        let children = children
            .into_iter()
            .map(|child| Profile::parse(try_into_map(child, "profile child")?))
            .collect::<Result<_>>()?;
        Ok(Self {
            operator_type,
            identifiers,
            arguments,
            db_hits,
            rows,
            children,
        })
    }
}

type PlanCommon = (
    String,
    Vec<String>,
    HashMap<String, ValueReceive>,
    Vec<ValueReceive>,
);

fn parse_plan_common(meta: &mut HashMap<String, ValueReceive>) -> Result<PlanCommon> {
    let operator_type = opt_string(meta, "operatorType", "in plan")?;
    let identifiers = meta
        .remove("identifiers")
        .map(|identifiers| {
            try_into_list(identifiers, "identifiers in plan")?
                .into_iter()
                .map(|identifier| try_into_string(identifier, "identifier in plan"))
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?
        .unwrap_or_default();
    let arguments = meta
        .remove("args")
        .map(|args| try_into_map(args, "args in plan"))
        .transpose()?
        .unwrap_or_default();
    let children = meta
        .remove("children")
        .map(|children| try_into_list(children, "children in plan"))
        .transpose()?
        .unwrap_or_default();
    Ok((operator_type, identifiers, arguments, children))
}

fn try_into_string(value: ValueReceive, context: &str) -> Result<String> {
    value.try_into_string().map_err(|v| {
        ArborError::protocol_error(format!("{} was not a string but {:?}", context, v))
    })
}

fn try_into_int(value: ValueReceive, context: &str) -> Result<i64> {
    value.try_into_int().map_err(|v| {
        ArborError::protocol_error(format!("{} was not an integer but {:?}", context, v))
    })
}

fn try_into_list(value: ValueReceive, context: &str) -> Result<Vec<ValueReceive>> {
    value
        .try_into_list()
        .map_err(|v| ArborError::protocol_error(format!("{} was not a list but {:?}", context, v)))
}

fn try_into_map(value: ValueReceive, context: &str) -> Result<HashMap<String, ValueReceive>> {
    value
        .try_into_map()
        .map_err(|v| ArborError::protocol_error(format!("{} was not a map but {:?}", context, v)))
}

fn opt_int(meta: &mut HashMap<String, ValueReceive>, key: &str, context: &str) -> Result<i64> {
    meta.remove(key)
        .map(|value| try_into_int(value, &format!("{} {}", key, context)))
        .unwrap_or(Ok(0))
}

fn opt_string(
    meta: &mut HashMap<String, ValueReceive>,
    key: &str,
    context: &str,
) -> Result<String> {
    meta.remove(key)
        .map(|value| try_into_string(value, &format!("{} {}", key, context)))
        .unwrap_or_else(|| Ok(String::new()))
}
