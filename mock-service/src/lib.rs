use axum::{
    body::Bytes,
    debug_handler,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
#[allow(unused)]
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::{
    num::NonZeroU32,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::{Duration, SystemTime},
};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// Clients and their credit limits. Every account starts with a zero balance.
pub const CLIENT_LIMITS: [(u32, i64); 5] = [
    (1, 100_000),
    (2, 80_000),
    (3, 1_000_000),
    (4, 10_000_000),
    (5, 500_000),
];

/// Number of transactions listed in a statement.
pub const STATEMENT_SIZE: usize = 10;

const MAX_DESCRIPTION_CHARS: usize = 10;

#[derive(Clone, Debug, Default)]
pub struct MockConfig {
    /// Added to every request before it is handled.
    pub delay: Duration,
    /// Requests over this rate are answered with a `500`.
    pub max_tps: Option<NonZeroU32>,
    /// Answer every statement request with a `500`.
    pub fail_statements: bool,
}

pub async fn run(addr: SocketAddr, config: MockConfig) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router(config)).await?;
    Ok(())
}

/// Serves on an ephemeral local port in the background, returning the bound address.
pub async fn spawn(config: MockConfig) -> anyhow::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = router(config);

    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            error!("Mock service stopped: {err}");
        }
    });

    debug!("Mock service spawned on {addr}");
    Ok(addr)
}

pub fn router(config: MockConfig) -> Router {
    let state = Arc::new(AppState::new(config));
    Router::new()
        .route("/clientes/:id/transacoes", post(transacao))
        .route("/clientes/:id/extrato", get(extrato))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

struct AppState {
    bank: Bank,
    config: MockConfig,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl AppState {
    fn new(config: MockConfig) -> Self {
        Self {
            bank: Bank::new(),
            limiter: config.max_tps.map(|tps| RateLimiter::direct(Quota::per_second(tps))),
            config,
        }
    }

    async fn admit(&self) -> Result<(), StatusCode> {
        TPS_MEASURE.fetch_add(1, Ordering::Relaxed);

        if !self.config.delay.is_zero() {
            tokio::time::sleep(self.config.delay).await;
        }

        match &self.limiter {
            Some(limiter) if limiter.check().is_err() => Err(StatusCode::INTERNAL_SERVER_ERROR),
            _ => Ok(()),
        }
    }
}

#[debug_handler]
async fn transacao(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u32>,
    body: Bytes,
) -> Response {
    counter!("mock-service.requests", "route" => "transacoes").increment(1);
    if let Err(status) = state.admit().await {
        return status.into_response();
    }

    let transacao = match NovaTransacao::parse(&body) {
        Ok(transacao) => transacao,
        Err(reason) => return (StatusCode::UNPROCESSABLE_ENTITY, reason).into_response(),
    };

    match state.bank.apply(id, transacao) {
        Ok(saldo) => Json(saldo).into_response(),
        Err(err) => err.into_response(),
    }
}

#[debug_handler]
async fn extrato(State(state): State<Arc<AppState>>, Path(id): Path<u32>) -> Response {
    counter!("mock-service.requests", "route" => "extrato").increment(1);
    if let Err(status) = state.admit().await {
        return status.into_response();
    }

    if state.config.fail_statements {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Statements unavailable").into_response();
    }

    match state.bank.extrato(id) {
        Ok(extrato) => Json(extrato).into_response(),
        Err(err) => err.into_response(),
    }
}

/** Bank **/

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Tipo {
    #[serde(rename = "c")]
    Credito,
    #[serde(rename = "d")]
    Debito,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NovaTransacao {
    pub valor: i64,
    pub tipo: Tipo,
    pub descricao: String,
}

impl NovaTransacao {
    /// Validates a request body: `valor` a positive integer, `tipo` one of `c` or `d`, and
    /// `descricao` between 1 and 10 characters.
    pub fn parse(body: &[u8]) -> Result<Self, &'static str> {
        if body.is_empty() {
            return Err("Empty request body");
        }

        let json: Value = serde_json::from_slice(body).map_err(|_| "Invalid JSON format")?;

        let valor = json
            .get("valor")
            .and_then(Value::as_i64)
            .filter(|valor| *valor > 0 && *valor <= i64::from(i32::MAX));
        let tipo = match json.get("tipo").and_then(Value::as_str) {
            Some("c") => Some(Tipo::Credito),
            Some("d") => Some(Tipo::Debito),
            _ => None,
        };
        let descricao = json
            .get("descricao")
            .and_then(Value::as_str)
            .filter(|d| (1..=MAX_DESCRIPTION_CHARS).contains(&d.chars().count()));

        match (valor, tipo, descricao) {
            (Some(valor), Some(tipo), Some(descricao)) => Ok(Self {
                valor,
                tipo,
                descricao: descricao.to_string(),
            }),
            _ => Err("Invalid transaction data"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Saldo {
    pub limite: i64,
    pub saldo: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Extrato {
    pub saldo: SaldoExtrato,
    pub ultimas_transacoes: Vec<Lancamento>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SaldoExtrato {
    pub total: i64,
    pub limite: i64,
    pub data_extrato: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Lancamento {
    pub valor: i64,
    pub tipo: Tipo,
    pub descricao: String,
    pub realizada_em: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BankError {
    UnknownClient,
    InsufficientFunds,
}

impl IntoResponse for BankError {
    fn into_response(self) -> Response {
        match self {
            BankError::UnknownClient => (StatusCode::NOT_FOUND, "Cliente não encontrado"),
            BankError::InsufficientFunds => (StatusCode::UNPROCESSABLE_ENTITY, "Saldo insuficiente"),
        }
        .into_response()
    }
}

#[derive(Debug)]
struct Account {
    limite: i64,
    saldo: i64,
    // Newest first.
    ultimas: VecDeque<Lancamento>,
}

/// In-memory accounts, each behind its own lock.
#[derive(Debug)]
pub struct Bank {
    accounts: HashMap<u32, Mutex<Account>>,
}

impl Default for Bank {
    fn default() -> Self {
        Self::new()
    }
}

impl Bank {
    pub fn new() -> Self {
        let accounts = CLIENT_LIMITS
            .iter()
            .map(|(id, limite)| {
                let account = Account {
                    limite: *limite,
                    saldo: 0,
                    ultimas: VecDeque::with_capacity(STATEMENT_SIZE),
                };
                (*id, Mutex::new(account))
            })
            .collect();
        Self { accounts }
    }

    /// A debit may not take the balance below minus the client's limit.
    pub fn apply(&self, id: u32, transacao: NovaTransacao) -> Result<Saldo, BankError> {
        let account = self.accounts.get(&id).ok_or(BankError::UnknownClient)?;
        let mut account = account.lock().unwrap_or_else(PoisonError::into_inner);

        let saldo = match transacao.tipo {
            Tipo::Credito => account.saldo + transacao.valor,
            Tipo::Debito if account.saldo - transacao.valor >= -account.limite => {
                account.saldo - transacao.valor
            }
            Tipo::Debito => return Err(BankError::InsufficientFunds),
        };
        account.saldo = saldo;

        account.ultimas.push_front(Lancamento {
            valor: transacao.valor,
            tipo: transacao.tipo,
            descricao: transacao.descricao,
            realizada_em: now(),
        });
        account.ultimas.truncate(STATEMENT_SIZE);

        Ok(Saldo {
            limite: account.limite,
            saldo,
        })
    }

    pub fn extrato(&self, id: u32) -> Result<Extrato, BankError> {
        let account = self.accounts.get(&id).ok_or(BankError::UnknownClient)?;
        let account = account.lock().unwrap_or_else(PoisonError::into_inner);

        Ok(Extrato {
            saldo: SaldoExtrato {
                total: account.saldo,
                limite: account.limite,
                data_extrato: now(),
            },
            ultimas_transacoes: account.ultimas.iter().cloned().collect(),
        })
    }
}

fn now() -> String {
    humantime::format_rfc3339_micros(SystemTime::now()).to_string()
}

/** TPS Printer **/

static TPS_MEASURE: AtomicU64 = AtomicU64::new(0);

pub async fn tps_measure_task() {
    loop {
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let transactions = TPS_MEASURE.swap(0, Ordering::Relaxed);
        info!("{transactions} TPS");
        gauge!("mock-service.tps").set(transactions as f64);
    }
}
