use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::Sink;
use futures::stream;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldInfo, QueryResponse,
    Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::auth::{Role, VillettaAuthSource};
use crate::engine::{Engine, EngineError};
use crate::observability::{self, command_label};
use crate::sql::{self, Command, RequestTable, SqlError};

pub struct VillettaHandler {
    engine: Arc<Engine>,
    query_parser: Arc<VillettaQueryParser>,
}

fn client_role<C: ClientInfo>(client: &C) -> Role {
    Role::for_user(client.metadata().get("user").map(String::as_str))
}

impl VillettaHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            query_parser: Arc::new(VillettaQueryParser),
        }
    }

    /// Parse, authorize, run, and record metrics for one statement.
    async fn run(&self, role: Role, sql_text: &str, format: &Format) -> PgWireResult<Response> {
        let cmd = sql::parse_sql(sql_text).map_err(sql_err)?;
        let label = command_label(&cmd);
        if cmd.requires_admin() && role != Role::Admin {
            metrics::counter!(observability::PERMISSION_DENIED_TOTAL, "command" => label).increment(1);
            warn!("guest attempted admin command {label}");
            return Err(permission_err(label));
        }

        let start = Instant::now();
        let result = self.execute_command(role, cmd, format).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(start.elapsed().as_secs_f64());
        debug!("{label} {status} in {:?}", start.elapsed());
        result
    }

    async fn execute_command(
        &self,
        role: Role,
        cmd: Command,
        format: &Format,
    ) -> PgWireResult<Response> {
        let engine = &self.engine;
        match cmd {
            Command::UpsertSetting { key, value } => {
                engine.update_setting(key, value).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_oid(0).with_rows(1)))
            }
            Command::SelectSettings { key } => {
                let rows = match key {
                    Some(key) => vec![(key, engine.setting(key))],
                    None => engine.settings(),
                };
                let schema = Arc::new(settings_schema(format));
                let rows = rows
                    .into_iter()
                    .map(|(key, value)| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&key.as_str())?;
                        encoder.encode_field(&value.to_string())?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(query_response(schema, rows))
            }
            Command::InsertBookingRequest(request) => {
                engine.submit_booking_request(request).await.map_err(engine_err)?;
                Ok(inserted())
            }
            Command::InsertContact {
                name,
                email,
                phone,
                message,
            } => {
                engine
                    .submit_contact(&name, &email, phone.as_deref(), &message)
                    .await
                    .map_err(engine_err)?;
                Ok(inserted())
            }
            Command::InsertQuestion { email, question } => {
                engine.submit_question(&email, &question).await.map_err(engine_err)?;
                Ok(inserted())
            }
            Command::InsertReview {
                name,
                rating,
                comment,
            } => {
                engine.submit_review(&name, rating, &comment).await.map_err(engine_err)?;
                Ok(inserted())
            }
            Command::Select(table) => Ok(self.select_table(table, role, format)),
            Command::Delete { table, id } => {
                match table {
                    RequestTable::BookingRequests => engine.delete_booking_request(id).await,
                    RequestTable::ContactSubmissions => engine.delete_contact(id).await,
                    RequestTable::UserQuestions => engine.delete_question(id).await,
                    RequestTable::Reviews => engine.delete_review(id).await,
                }
                .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::ApproveReview { id } => {
                engine.approve_review(id).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::SelectQuote {
                check_in,
                check_out,
            } => {
                let row = engine.quote(check_in, check_out).map_err(engine_err)?;
                let schema = Arc::new(quote_schema(format));
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&row.check_in.to_string())?;
                encoder.encode_field(&row.check_out.to_string())?;
                encoder.encode_field(&(row.quote.nights as i64))?;
                encoder.encode_field(&(row.quote.total_price as i64))?;
                encoder.encode_field(&(row.quote.average_per_night() as i64))?;
                encoder.encode_field(&row.available)?;
                Ok(query_response(schema, vec![Ok(encoder.take_row())]))
            }
            Command::SelectCalendar { year, month } => {
                let days = engine.calendar_days(year, month).map_err(engine_err)?;
                let schema = Arc::new(calendar_schema(format));
                let rows = days
                    .into_iter()
                    .map(|day| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&day.date.to_string())?;
                        encoder.encode_field(&day.occupied)?;
                        encoder.encode_field(&(day.nightly_rate as i64))?;
                        encoder.encode_field(&(day.custom_price.unwrap_or(0) as i64))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(query_response(schema, rows))
            }
        }
    }

    fn select_table(&self, table: RequestTable, role: Role, format: &Format) -> Response {
        let engine = &self.engine;
        let schema = Arc::new(table_schema(table, format));
        let rows: Vec<PgWireResult<_>> = match table {
            RequestTable::BookingRequests => engine
                .booking_requests()
                .into_iter()
                .map(|r| {
                    let mut encoder = DataRowEncoder::new(schema.clone());
                    encoder.encode_field(&r.id.to_string())?;
                    encoder.encode_field(&r.name)?;
                    encoder.encode_field(&r.email)?;
                    encoder.encode_field(&r.check_in.to_string())?;
                    encoder.encode_field(&r.check_out.to_string())?;
                    encoder.encode_field(&(r.nights as i64))?;
                    encoder.encode_field(&(r.total_price as i64))?;
                    encoder.encode_field(&r.submitted_at)?;
                    Ok(encoder.take_row())
                })
                .collect(),
            RequestTable::ContactSubmissions => engine
                .contacts()
                .into_iter()
                .map(|c| {
                    let mut encoder = DataRowEncoder::new(schema.clone());
                    encoder.encode_field(&c.id.to_string())?;
                    encoder.encode_field(&c.name)?;
                    encoder.encode_field(&c.email)?;
                    encoder.encode_field(&c.phone.unwrap_or_default())?;
                    encoder.encode_field(&c.message)?;
                    encoder.encode_field(&c.submitted_at)?;
                    Ok(encoder.take_row())
                })
                .collect(),
            RequestTable::UserQuestions => engine
                .questions()
                .into_iter()
                .map(|q| {
                    let mut encoder = DataRowEncoder::new(schema.clone());
                    encoder.encode_field(&q.id.to_string())?;
                    encoder.encode_field(&q.email)?;
                    encoder.encode_field(&q.question)?;
                    encoder.encode_field(&q.submitted_at)?;
                    Ok(encoder.take_row())
                })
                .collect(),
            RequestTable::Reviews => engine
                .reviews(role == Role::Admin)
                .into_iter()
                .map(|r| {
                    let mut encoder = DataRowEncoder::new(schema.clone());
                    encoder.encode_field(&r.id.to_string())?;
                    encoder.encode_field(&r.name)?;
                    encoder.encode_field(&(r.rating as i64))?;
                    encoder.encode_field(&r.comment)?;
                    encoder.encode_field(&r.submitted_at)?;
                    encoder.encode_field(&r.approved)?;
                    Ok(encoder.take_row())
                })
                .collect(),
        };
        query_response(schema, rows)
    }
}

fn inserted() -> Response {
    Response::Execution(Tag::new("INSERT").with_oid(0).with_rows(1))
}

fn query_response(
    schema: Arc<Vec<FieldInfo>>,
    rows: Vec<PgWireResult<pgwire::messages::data::DataRow>>,
) -> Response {
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

// ── Result schemas ───────────────────────────────────────────────

fn fields(columns: &[(&str, Type)], format: &Format) -> Vec<FieldInfo> {
    columns
        .iter()
        .enumerate()
        .map(|(i, (name, ty))| {
            FieldInfo::new((*name).into(), None, None, ty.clone(), format.format_for(i))
        })
        .collect()
}

fn settings_schema(format: &Format) -> Vec<FieldInfo> {
    fields(&[("key", Type::VARCHAR), ("value", Type::VARCHAR)], format)
}

/// `custom_price` is 0 when the day has no custom price.
fn calendar_schema(format: &Format) -> Vec<FieldInfo> {
    fields(
        &[
            ("date", Type::VARCHAR),
            ("occupied", Type::BOOL),
            ("nightly_rate", Type::INT8),
            ("custom_price", Type::INT8),
        ],
        format,
    )
}

fn quote_schema(format: &Format) -> Vec<FieldInfo> {
    fields(
        &[
            ("check_in", Type::VARCHAR),
            ("check_out", Type::VARCHAR),
            ("nights", Type::INT8),
            ("total_price", Type::INT8),
            ("average_per_night", Type::INT8),
            ("available", Type::BOOL),
        ],
        format,
    )
}

/// `phone` is empty when not given.
fn table_schema(table: RequestTable, format: &Format) -> Vec<FieldInfo> {
    match table {
        RequestTable::BookingRequests => fields(
            &[
                ("id", Type::VARCHAR),
                ("name", Type::VARCHAR),
                ("email", Type::VARCHAR),
                ("check_in", Type::VARCHAR),
                ("check_out", Type::VARCHAR),
                ("nights", Type::INT8),
                ("total_price", Type::INT8),
                ("submitted_at", Type::INT8),
            ],
            format,
        ),
        RequestTable::ContactSubmissions => fields(
            &[
                ("id", Type::VARCHAR),
                ("name", Type::VARCHAR),
                ("email", Type::VARCHAR),
                ("phone", Type::VARCHAR),
                ("message", Type::VARCHAR),
                ("submitted_at", Type::INT8),
            ],
            format,
        ),
        RequestTable::UserQuestions => fields(
            &[
                ("id", Type::VARCHAR),
                ("email", Type::VARCHAR),
                ("question", Type::VARCHAR),
                ("submitted_at", Type::INT8),
            ],
            format,
        ),
        RequestTable::Reviews => fields(
            &[
                ("id", Type::VARCHAR),
                ("name", Type::VARCHAR),
                ("rating", Type::INT8),
                ("comment", Type::VARCHAR),
                ("submitted_at", Type::INT8),
                ("approved", Type::BOOL),
            ],
            format,
        ),
    }
}

/// Table named after the first `FROM` of a SELECT, lowercased.
fn selected_table(sql_text: &str) -> Option<String> {
    let lower = sql_text.to_lowercase();
    let mut words = lower
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty());
    if words.next()? != "select" {
        return None;
    }
    words.by_ref().find(|w| *w == "from")?;
    words.next().map(str::to_string)
}

/// Result columns of a statement before it runs, for Describe.
fn result_schema(sql_text: &str, format: &Format) -> Vec<FieldInfo> {
    match selected_table(sql_text).as_deref() {
        Some("site_settings") => settings_schema(format),
        Some("quote") => quote_schema(format),
        Some("calendar") => calendar_schema(format),
        Some("booking_requests") => table_schema(RequestTable::BookingRequests, format),
        Some("contact_submissions") => table_schema(RequestTable::ContactSubmissions, format),
        Some("user_questions") => table_schema(RequestTable::UserQuestions, format),
        Some("reviews") => table_schema(RequestTable::Reviews, format),
        _ => vec![],
    }
}

#[async_trait]
impl SimpleQueryHandler for VillettaHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let role = client_role(client);
        let response = self.run(role, query, &Format::UnifiedText).await?;
        Ok(vec![response])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct VillettaQueryParser;

#[async_trait]
impl QueryParser for VillettaQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt, column_format.unwrap_or(&Format::UnifiedText)))
    }
}

#[async_trait]
impl ExtendedQueryHandler for VillettaHandler {
    type Statement = String;
    type QueryParser = VillettaQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let role = client_role(client);
        let sql_text = substitute_params(portal);
        self.run(role, &sql_text, &portal.result_column_format).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement, &Format::UnifiedText),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
            &target.result_column_format,
        )))
    }
}

/// `$N` placeholders outside quoted literals and identifiers, as
/// `(byte range, N)` in order of appearance.
fn placeholders(sql_text: &str) -> Vec<(std::ops::Range<usize>, usize)> {
    let bytes = sql_text.as_bytes();
    let mut found = Vec::new();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            // A doubled quote inside a literal toggles twice and stays quoted.
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'\'' || b == b'"' => quote = Some(b),
            None if b == b'$' => {
                let start = i;
                let mut end = i + 1;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                if let Ok(n) = sql_text[start + 1..end].parse::<usize>() {
                    found.push((start..end, n));
                    i = end;
                    continue;
                }
            }
            None => {}
        }
        i += 1;
    }
    found
}

/// Highest `$N` placeholder in the statement.
fn count_params(sql_text: &str) -> usize {
    placeholders(sql_text).into_iter().map(|(_, n)| n).max().unwrap_or(0)
}

/// Replace `$N` placeholders with the bound text values, quoted.
fn substitute_params(portal: &Portal<String>) -> String {
    let params: Vec<Option<String>> = portal
        .parameters
        .iter()
        .map(|p| p.as_ref().map(|bytes| String::from_utf8_lossy(bytes).into_owned()))
        .collect();
    substitute(&portal.statement.statement, &params)
}

/// One pass over the template, so bound text is never scanned again.
/// Placeholders without a bound value are left as written.
fn substitute(sql_text: &str, params: &[Option<String>]) -> String {
    let mut result = String::with_capacity(sql_text.len());
    let mut copied = 0;
    for (range, n) in placeholders(sql_text) {
        let Some(param) = n.checked_sub(1).and_then(|i| params.get(i)) else {
            continue;
        };
        result.push_str(&sql_text[copied..range.start]);
        match param {
            Some(text) => {
                result.push('\'');
                result.push_str(&text.replace('\'', "''"));
                result.push('\'');
            }
            None => result.push_str("NULL"),
        }
        copied = range.end;
    }
    result.push_str(&sql_text[copied..]);
    result
}

// ── Factory ──────────────────────────────────────────────────────

#[derive(Clone)]
pub struct VillettaFactory {
    handler: Arc<VillettaHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<VillettaAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl VillettaFactory {
    pub fn new(engine: Arc<Engine>, admin_password: String, guest_password: String) -> Self {
        let auth_source = VillettaAuthSource::new(admin_password, guest_password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(VillettaHandler::new(engine)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for VillettaFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client until it disconnects.
pub async fn process_connection(
    socket: TcpStream,
    factory: VillettaFactory,
    tls_acceptor: Option<TlsAcceptor>,
) -> io::Result<()> {
    pgwire::tokio::process_socket(socket, tls_acceptor, factory).await
}

fn engine_err(e: EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "P0001".into(),
        e.to_string(),
    )))
}

fn sql_err(e: SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}

fn permission_err(command: &str) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42501".into(),
        format!("permission denied: {command} requires the admin login"),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_highest_placeholder() {
        assert_eq!(count_params("SELECT * FROM reviews"), 0);
        assert_eq!(
            count_params("SELECT * FROM quote WHERE check_in = $1 AND check_out = $2"),
            2
        );
        assert_eq!(count_params("INSERT INTO x VALUES ($2, $10, $1)"), 10);
        assert_eq!(count_params("SELECT '$'"), 0);
    }

    #[test]
    fn substitutes_and_escapes() {
        let sql_text = substitute(
            "INSERT INTO user_questions (email, question) VALUES ($1, $2)",
            &[Some("a@example.com".into()), Some("Isn't it lovely?".into())],
        );
        assert_eq!(
            sql_text,
            "INSERT INTO user_questions (email, question) VALUES ('a@example.com', 'Isn''t it lovely?')"
        );
        assert_eq!(substitute("VALUES ($1)", &[None]), "VALUES (NULL)");
    }

    #[test]
    fn bound_text_is_not_substituted_again() {
        let sql_text = substitute(
            "INSERT INTO user_questions (email, question) VALUES ($1, $2)",
            &[Some("a@example.com".into()), Some("Is it $1 per night?".into())],
        );
        assert_eq!(
            sql_text,
            "INSERT INTO user_questions (email, question) VALUES ('a@example.com', 'Is it $1 per night?')"
        );
        assert_eq!(
            sql::parse_sql(&sql_text).unwrap(),
            Command::InsertQuestion {
                email: "a@example.com".into(),
                question: "Is it $1 per night?".into(),
            }
        );
    }

    #[test]
    fn dollars_inside_literals_are_not_placeholders() {
        let template = "INSERT INTO reviews (name, rating, comment) VALUES ($1, 5, 'worth $2 and it''s $3')";
        assert_eq!(count_params(template), 1);
        assert_eq!(
            substitute(template, &[Some("Giulia".into())]),
            "INSERT INTO reviews (name, rating, comment) VALUES ('Giulia', 5, 'worth $2 and it''s $3')"
        );
    }

    #[test]
    fn ten_params_do_not_collide() {
        let params: Vec<Option<String>> = (1..=10).map(|i| Some(i.to_string())).collect();
        assert_eq!(substitute("$1 $10", &params), "'1' '10'");
    }

    #[test]
    fn finds_selected_table() {
        assert_eq!(selected_table("SELECT * FROM quote WHERE check_in = $1").as_deref(), Some("quote"));
        assert_eq!(selected_table("select key, value from Site_Settings").as_deref(), Some("site_settings"));
        assert_eq!(selected_table("DELETE FROM reviews WHERE id = 'x'"), None);
    }

    #[test]
    fn describe_schema_matches_table() {
        let names = |sql_text: &str| -> Vec<String> {
            result_schema(sql_text, &Format::UnifiedText)
                .iter()
                .map(|f| f.name().to_string())
                .collect()
        };
        assert_eq!(
            names("SELECT * FROM quote WHERE check_in = $1 AND check_out = $2"),
            ["check_in", "check_out", "nights", "total_price", "average_per_night", "available"]
        );
        assert_eq!(names("SELECT * FROM calendar WHERE year = 2025 AND month = 6").len(), 4);
        assert!(names("INSERT INTO reviews VALUES ('a', 5, 'b')").is_empty());
    }
}
