//! Workload against the banking API: clients posting transactions and reading statements.
use crate::executor::{Context, Scenario};
use crate::transport::{HttpTransport, Request, RequestError, Transport};
use rampa_core::{labels, Sample, Stage};
use rand::Rng;
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:9999";

/// Clients known to the API.
pub const CLIENT_IDS: [u32; 5] = [1, 2, 3, 4, 5];

/// Share of iterations that post a transaction rather than read the statement.
pub const TRANSACTION_PROBABILITY: f64 = 0.7;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Tipo {
    #[serde(rename = "c")]
    Credito,
    #[serde(rename = "d")]
    Debito,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Transacao {
    pub tipo: Tipo,
    pub valor: u64,
    pub descricao: &'static str,
}

pub const TRANSACTIONS: [Transacao; 5] = [
    Transacao {
        tipo: Tipo::Credito,
        valor: 1000,
        descricao: "salario",
    },
    Transacao {
        tipo: Tipo::Debito,
        valor: 100,
        descricao: "compra",
    },
    Transacao {
        tipo: Tipo::Credito,
        valor: 500,
        descricao: "estorno",
    },
    Transacao {
        tipo: Tipo::Debito,
        valor: 750,
        descricao: "aluguel",
    },
    Transacao {
        tipo: Tipo::Debito,
        valor: 90,
        descricao: "conta luz",
    },
];

/// Ramp to 10 users, then to 100, hold for a minute and drain.
pub fn default_stages() -> Vec<Stage> {
    vec![
        Stage::new(Duration::from_secs(10), 10),
        Stage::new(Duration::from_secs(30), 100),
        Stage::new(Duration::from_secs(60), 100),
        Stage::new(Duration::from_secs(30), 0),
    ]
}

pub fn transactions_path(client_id: u32) -> String {
    format!("/clientes/{client_id}/transacoes")
}

pub fn statement_path(client_id: u32) -> String {
    format!("/clientes/{client_id}/extrato")
}

/// Each iteration picks a client and a payload uniformly at random, then either posts the payload
/// as a transaction or reads the client's statement. Exactly one request is issued.
pub struct RinhaWorkload<T> {
    transport: T,
}

impl<T> RinhaWorkload<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl RinhaWorkload<HttpTransport> {
    pub fn http(base_url: impl Into<String>) -> Result<Self, RequestError> {
        Ok(Self::new(HttpTransport::new(base_url)?))
    }
}

impl<T> Scenario for RinhaWorkload<T>
where
    T: Transport + Sync,
{
    async fn run(&self, ctx: &mut Context) -> Vec<Sample> {
        let client_id = CLIENT_IDS[ctx.rng().gen_range(0..CLIENT_IDS.len())];
        let transacao = TRANSACTIONS[ctx.rng().gen_range(0..TRANSACTIONS.len())];
        let transport = &self.transport;

        let sample = if ctx.rng().gen_bool(TRANSACTION_PROBABILITY) {
            ctx.transaction(
                labels! { "name" => "transacoes", "method" => "POST" },
                async move {
                    let request = Request::post_json(transactions_path(client_id), &transacao)?;
                    transport.send(request).await
                },
            )
            .await
        } else {
            ctx.transaction(
                labels! { "name" => "extrato", "method" => "GET" },
                transport.send(Request::get(statement_path(client_id))),
            )
            .await
        };

        vec![sample]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ScenarioExecutor;
    use crate::transport::{Method, Response};
    use rampa_core::Outcome;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockTransport {
        transacoes_status: u16,
        extrato_status: u16,
        sent: Mutex<Vec<Request>>,
    }

    impl MockTransport {
        fn new(transacoes_status: u16, extrato_status: u16) -> Self {
            Self {
                transacoes_status,
                extrato_status,
                ..Default::default()
            }
        }

        fn sent(&self) -> Vec<Request> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Transport for MockTransport {
        async fn send(&self, request: Request) -> Result<Response, RequestError> {
            let status = if request.path.ends_with("/extrato") {
                self.extrato_status
            } else {
                self.transacoes_status
            };
            self.sent.lock().unwrap().push(request);
            Ok(Response::new(status))
        }
    }

    async fn iterate(
        transport: MockTransport,
        iterations: u64,
    ) -> (Vec<Sample>, Vec<Request>) {
        let executor = ScenarioExecutor::new(RinhaWorkload::new(transport));
        let mut ctx = Context::detached(1, 7);
        let mut samples = vec![];
        for _ in 0..iterations {
            samples.extend(executor.run(&mut ctx).await);
        }
        (samples, executor.scenario().transport().sent())
    }

    #[test]
    fn payload_encoding() {
        let body = serde_json::to_string(&TRANSACTIONS[0]).unwrap();
        assert_eq!(body, r#"{"tipo":"c","valor":1000,"descricao":"salario"}"#);
    }

    #[tokio::test]
    async fn posted_transactions_are_json_successes() {
        let (samples, sent) = iterate(MockTransport::new(200, 200), 200).await;
        assert_eq!(samples.len(), sent.len());

        let bodies: Vec<Vec<u8>> = TRANSACTIONS
            .iter()
            .map(|t| serde_json::to_vec(t).unwrap())
            .collect();
        let paths: Vec<String> = CLIENT_IDS.into_iter().map(transactions_path).collect();
        let salario = br#"{"tipo":"c","valor":1000,"descricao":"salario"}"#.as_slice();

        let mut salaries = 0;
        for (sample, request) in samples.iter().zip(sent.iter()) {
            if request.method != Method::Post {
                continue;
            }
            assert!(paths.contains(&request.path), "{}", request.path);
            assert_eq!(request.header("Content-Type"), Some("application/json"));

            let body = request.body.as_deref().unwrap();
            assert!(bodies.iter().any(|b| b.as_slice() == body));
            assert_eq!(sample.outcome, Outcome::Success);
            assert_eq!(sample.metric_name(), "method=POST,name=transacoes");

            if body == salario {
                salaries += 1;
            }
        }
        assert!(salaries > 0);
    }

    #[tokio::test]
    async fn failing_statement_is_recorded() {
        let (samples, sent) = iterate(MockTransport::new(200, 500), 200).await;
        assert_eq!(samples.len(), 200);
        assert_eq!(sent.len(), 200);

        for (sample, request) in samples.iter().zip(sent.iter()) {
            match request.method {
                Method::Get => {
                    assert_eq!(sample.outcome, Outcome::Failure);
                    assert_eq!(sample.error.as_deref(), Some("unexpected status 500"));
                    assert_eq!(sample.metric_name(), "method=GET,name=extrato");
                }
                Method::Post => {
                    assert_eq!(sample.outcome, Outcome::Success);
                    assert_eq!(sample.metric_name(), "method=POST,name=transacoes");
                }
            }
        }
    }

    #[tokio::test]
    async fn request_mix() {
        let (_, sent) = iterate(MockTransport::new(200, 200), 2_000).await;
        let posts = sent.iter().filter(|r| r.method == Method::Post).count();
        // 1400 expected
        assert!((1_250..=1_550).contains(&posts), "{posts} posts");

        for id in CLIENT_IDS {
            assert!(sent.iter().any(|r| r.path.starts_with(&format!("/clientes/{id}/"))));
        }
        for transacao in TRANSACTIONS {
            let body = serde_json::to_vec(&transacao).unwrap();
            assert!(sent.iter().any(|r| r.body.as_deref() == Some(body.as_slice())));
        }
    }

    #[tokio::test]
    async fn seeded_runs_repeat() {
        let (_, first) = iterate(MockTransport::new(200, 200), 50).await;
        let (_, second) = iterate(MockTransport::new(200, 200), 50).await;
        assert_eq!(first, second);
    }
}
