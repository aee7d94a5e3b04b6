use std::collections::HashMap;
use std::ops::ControlFlow;

use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor,
    TableObject, Value, ValueWithSpan, visit_relations,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Tables holding submitted requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTable {
    BookingRequests,
    ContactSubmissions,
    UserQuestions,
    Reviews,
}

impl RequestTable {
    fn from_name(name: &str) -> Option<RequestTable> {
        match name {
            "booking_requests" => Some(RequestTable::BookingRequests),
            "contact_submissions" => Some(RequestTable::ContactSubmissions),
            "user_questions" => Some(RequestTable::UserQuestions),
            "reviews" => Some(RequestTable::Reviews),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RequestTable::BookingRequests => "booking_requests",
            RequestTable::ContactSubmissions => "contact_submissions",
            RequestTable::UserQuestions => "user_questions",
            RequestTable::Reviews => "reviews",
        }
    }
}

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    UpsertSetting {
        key: SettingKey,
        value: serde_json::Value,
    },
    SelectSettings {
        key: Option<SettingKey>,
    },
    InsertBookingRequest(NewBookingRequest),
    InsertContact {
        name: String,
        email: String,
        phone: Option<String>,
        message: String,
    },
    InsertQuestion {
        email: String,
        question: String,
    },
    InsertReview {
        name: String,
        rating: u8,
        comment: String,
    },
    Select(RequestTable),
    Delete {
        table: RequestTable,
        id: Ulid,
    },
    ApproveReview {
        id: Ulid,
    },
    SelectQuote {
        check_in: CalendarDate,
        check_out: CalendarDate,
    },
    SelectCalendar {
        year: i32,
        /// 1-indexed.
        month: u32,
    },
}

impl Command {
    /// Commands only the admin login may run.
    pub fn requires_admin(&self) -> bool {
        match self {
            Command::UpsertSetting { .. }
            | Command::Delete { .. }
            | Command::ApproveReview { .. } => true,
            Command::Select(table) => *table != RequestTable::Reviews,
            _ => false,
        }
    }
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let Some(stmt) = stmts.first() else {
        return Err(SqlError::Empty);
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        Statement::Update { .. } => parse_update(stmt),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

// ── INSERT ────────────────────────────────────────────────────

/// Column name → value for the first VALUES row. Without a column list the
/// values are matched to `default_columns` in order.
fn insert_row(
    insert: &ast::Insert,
    table: &'static str,
    default_columns: &[&'static str],
) -> Result<HashMap<String, Expr>, SqlError> {
    let values = extract_insert_values(insert)?;
    let columns: Vec<String> = if insert.columns.is_empty() {
        default_columns.iter().map(|c| c.to_string()).collect()
    } else {
        insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
    };
    if columns.len() != values.len() {
        return Err(SqlError::WrongArity(table, columns.len(), values.len()));
    }
    Ok(columns.into_iter().zip(values).collect())
}

fn column<'a>(row: &'a HashMap<String, Expr>, name: &'static str) -> Result<&'a Expr, SqlError> {
    row.get(name).ok_or(SqlError::MissingColumn(name))
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;

    match table.as_str() {
        "site_settings" => {
            let row = insert_row(insert, "site_settings", &["key", "value"])?;
            let key_name = parse_text(column(&row, "key")?)?;
            let key = SettingKey::parse(&key_name).ok_or(SqlError::UnknownSetting(key_name))?;
            Ok(Command::UpsertSetting {
                key,
                value: parse_json(column(&row, "value")?)?,
            })
        }
        "booking_requests" => {
            let row = insert_row(
                insert,
                "booking_requests",
                &["name", "email", "check_in", "check_out", "nights", "total_price"],
            )?;
            let nights = parse_i64(column(&row, "nights")?)?;
            let total_price = parse_i64(column(&row, "total_price")?)?;
            Ok(Command::InsertBookingRequest(NewBookingRequest {
                name: parse_text(column(&row, "name")?)?,
                email: parse_text(column(&row, "email")?)?,
                check_in: parse_date(column(&row, "check_in")?)?,
                check_out: parse_date(column(&row, "check_out")?)?,
                nights: u32::try_from(nights)
                    .map_err(|_| SqlError::Parse(format!("{nights} out of range for nights")))?,
                total_price: u64::try_from(total_price).map_err(|_| {
                    SqlError::Parse(format!("{total_price} out of range for total_price"))
                })?,
            }))
        }
        "contact_submissions" => {
            let row = insert_row(
                insert,
                "contact_submissions",
                &["name", "email", "phone", "message"],
            )?;
            let phone = match row.get("phone") {
                Some(expr) => parse_text_or_null(expr)?,
                None => None,
            };
            Ok(Command::InsertContact {
                name: parse_text(column(&row, "name")?)?,
                email: parse_text(column(&row, "email")?)?,
                phone,
                message: parse_text(column(&row, "message")?)?,
            })
        }
        "user_questions" => {
            let row = insert_row(insert, "user_questions", &["email", "question"])?;
            Ok(Command::InsertQuestion {
                email: parse_text(column(&row, "email")?)?,
                question: parse_text(column(&row, "question")?)?,
            })
        }
        "reviews" => {
            let row = insert_row(insert, "reviews", &["name", "rating", "comment"])?;
            let rating = parse_i64(column(&row, "rating")?)?;
            Ok(Command::InsertReview {
                name: parse_text(column(&row, "name")?)?,
                rating: u8::try_from(rating)
                    .map_err(|_| SqlError::Parse(format!("{rating} out of range for rating")))?,
                comment: parse_text(column(&row, "comment")?)?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── DELETE / UPDATE ───────────────────────────────────────────

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let name = delete_table_name(delete)?;
    let table = RequestTable::from_name(&name).ok_or(SqlError::UnknownTable(name))?;
    let filters = eq_filters(delete.selection.as_ref());
    let id = parse_ulid(filters.get("id").ok_or(SqlError::MissingFilter("id"))?)?;
    Ok(Command::Delete { table, id })
}

/// Only `UPDATE reviews SET approved = true WHERE id = '...'`.
fn parse_update(stmt: &Statement) -> Result<Command, SqlError> {
    let mut tables = Vec::new();
    let _ = visit_relations(stmt, |name| {
        if let Some(t) = object_name_last(name) {
            tables.push(t);
        }
        ControlFlow::<()>::Continue(())
    });
    let table = tables
        .into_iter()
        .next()
        .ok_or_else(|| SqlError::Parse("UPDATE without table".into()))?;
    if table != "reviews" {
        return Err(SqlError::UnknownTable(table));
    }

    let Statement::Update {
        assignments,
        selection,
        ..
    } = stmt
    else {
        return Err(SqlError::Parse("expected UPDATE".into()));
    };
    let approves = match assignments.as_slice() {
        [assignment] => {
            let target = match &assignment.target {
                AssignmentTarget::ColumnName(name) => object_name_last(name),
                _ => None,
            };
            target.as_deref() == Some("approved")
                && matches!(extract_value(&assignment.value), Some(Value::Boolean(true)))
        }
        _ => false,
    };
    if !approves {
        return Err(SqlError::Unsupported(
            "only SET approved = true is supported on reviews".into(),
        ));
    }

    let filters = eq_filters(selection.as_ref());
    let id = filters.get("id").ok_or(SqlError::MissingFilter("id"))?;
    Ok(Command::ApproveReview { id: parse_ulid(id)? })
}

// ── SELECT ────────────────────────────────────────────────────

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };
    let from = select
        .from
        .first()
        .ok_or_else(|| SqlError::Parse("SELECT without FROM".into()))?;
    let table = table_factor_name(&from.relation)?;
    let filters = eq_filters(select.selection.as_ref());

    match table.as_str() {
        "site_settings" => {
            let key = match filters.get("key") {
                Some(expr) => {
                    let name = parse_text(expr)?;
                    Some(SettingKey::parse(&name).ok_or(SqlError::UnknownSetting(name))?)
                }
                None => None,
            };
            Ok(Command::SelectSettings { key })
        }
        "quote" => Ok(Command::SelectQuote {
            check_in: parse_date(filters.get("check_in").ok_or(SqlError::MissingFilter("check_in"))?)?,
            check_out: parse_date(filters.get("check_out").ok_or(SqlError::MissingFilter("check_out"))?)?,
        }),
        "calendar" => {
            let year = parse_i64(filters.get("year").ok_or(SqlError::MissingFilter("year"))?)?;
            let month = parse_i64(filters.get("month").ok_or(SqlError::MissingFilter("month"))?)?;
            Ok(Command::SelectCalendar {
                year: i32::try_from(year)
                    .map_err(|_| SqlError::Parse(format!("{year} out of range for year")))?,
                month: u32::try_from(month)
                    .ok()
                    .filter(|m| (1..=12).contains(m))
                    .ok_or_else(|| SqlError::Parse(format!("month must be 1-12, got {month}")))?,
            })
        }
        other => RequestTable::from_name(other)
            .map(Command::Select)
            .ok_or(SqlError::UnknownTable(table)),
    }
}

/// `column = value` pairs joined by AND. Other predicates are ignored.
fn eq_filters(selection: Option<&Expr>) -> HashMap<String, Expr> {
    let mut filters = HashMap::new();
    if let Some(expr) = selection {
        collect_eq_filters(expr, &mut filters);
    }
    filters
}

fn collect_eq_filters(expr: &Expr, out: &mut HashMap<String, Expr>) {
    match expr {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::And,
            right,
        } => {
            collect_eq_filters(left, out);
            collect_eq_filters(right, out);
        }
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            if let Some(col) = expr_column_name(left) {
                out.insert(col, right.as_ref().clone());
            }
        }
        Expr::Nested(inner) => collect_eq_filters(inner, out),
        _ => {}
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    match tables_with_joins.first() {
        Some(first) => table_factor_name(&first.relation),
        None => Err(SqlError::Parse("DELETE without table".into())),
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [row] => Ok(row.clone()),
            [] => Err(SqlError::Parse("empty VALUES".into())),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_text(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) | Some(Value::Number(s, _)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_text_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => parse_text(expr).map(Some),
    }
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        return Ok(-parse_i64(expr)?);
    }
    let text = parse_text(expr)?;
    text.trim()
        .parse()
        .map_err(|e| SqlError::Parse(format!("bad integer {text:?}: {e}")))
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    let text = parse_text(expr)?;
    Ulid::from_string(&text).map_err(|e| SqlError::Parse(format!("bad id {text:?}: {e}")))
}

fn parse_date(expr: &Expr) -> Result<CalendarDate, SqlError> {
    let text = parse_text(expr)?;
    CalendarDate::parse(&text)
        .ok_or_else(|| SqlError::Parse(format!("bad date {text:?} (expected YYYY-MM-DD)")))
}

/// Setting values. Quoted text is read as JSON, falling back to a plain
/// string (`'/images/hero.jpg'`). Bare literals map to their JSON form.
fn parse_json(expr: &Expr) -> Result<serde_json::Value, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(serde_json::from_str(s)
            .unwrap_or_else(|_| serde_json::Value::String(s.clone()))),
        Some(Value::Number(n, _)) => serde_json::from_str(n)
            .map_err(|e| SqlError::Parse(format!("bad number {n}: {e}"))),
        Some(Value::Boolean(b)) => Ok(serde_json::Value::Bool(*b)),
        Some(Value::Null) => Ok(serde_json::Value::Null),
        Some(value) => Err(SqlError::Parse(format!("unsupported value {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownSetting(String),
    WrongArity(&'static str, usize, usize),
    MissingColumn(&'static str),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownSetting(k) => write!(f, "unknown setting key: {k}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingColumn(col) => write!(f, "missing column: {col}"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
