use chess_cluster::broker::broker::{Broker, LIVENESS_TIMEOUT};
use chess_cluster::client::agent::{ClientAgent, ClientConfig};
use chess_cluster::directory::announcer::Announcer;
use chess_cluster::directory::types::ServiceAdvert;
use chess_cluster::directory::{client_service_type, worker_service_type};
use chess_cluster::engine::board;
use chess_cluster::engine::evaluator::{Evaluate, MaterialEvaluator};
use chess_cluster::engine::uci::UciEvaluator;
use chess_cluster::transport::listener::Endpoint;
use chess_cluster::worker::agent::{WorkerAgent, WorkerConfig};

use shakmaty::Chess;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const DEFAULT_CATALOG: &str = "catalog.cse.nd.edu:9097";
const DEFAULT_DEPTH: u32 = 2;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

fn usage(program: &str) -> ! {
    eprintln!("Usage: {} <role> [options]", program);
    eprintln!();
    eprintln!("Roles:");
    eprintln!("  broker --name <cluster> [--catalog <host:port>] [--worker-port <port>] [--client-port <port>]");
    eprintln!("  worker --name <cluster> [--catalog <host:port>] [--engine material|<path-to-uci-binary>]");
    eprintln!("  client --name <cluster> [--catalog <host:port>] [--depth <n>]");
    eprintln!();
    eprintln!("Example: {} broker --name mycluster", program);
    eprintln!(
        "Example: {} worker --name mycluster --engine /usr/bin/stockfish",
        program
    );
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        usage(&args[0]);
    }

    let role = args[1].clone();

    let mut name: Option<String> = None;
    let mut catalog = DEFAULT_CATALOG.to_string();
    let mut worker_port: u16 = 0;
    let mut client_port: u16 = 0;
    let mut engine = "material".to_string();
    let mut depth = DEFAULT_DEPTH;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--name" => {
                name = Some(args[i + 1].clone());
                i += 2;
            }
            "--catalog" => {
                catalog = args[i + 1].clone();
                i += 2;
            }
            "--worker-port" => {
                worker_port = args[i + 1].parse()?;
                i += 2;
            }
            "--client-port" => {
                client_port = args[i + 1].parse()?;
                i += 2;
            }
            "--engine" => {
                engine = args[i + 1].clone();
                i += 2;
            }
            "--depth" => {
                depth = args[i + 1].parse()?;
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let name = match name {
        Some(name) => name,
        None => usage(&args[0]),
    };

    match role.as_str() {
        "broker" => run_broker(name, catalog, worker_port, client_port).await,
        "worker" => run_worker(name, catalog, engine).await,
        "client" => run_client(name, catalog, depth).await,
        _ => usage(&args[0]),
    }
}

async fn run_broker(
    name: String,
    catalog: String,
    worker_port: u16,
    client_port: u16,
) -> anyhow::Result<()> {
    let worker_bind: SocketAddr = format!("0.0.0.0:{}", worker_port).parse()?;
    let client_bind: SocketAddr = format!("0.0.0.0:{}", client_port).parse()?;

    let (worker_endpoint, worker_events) = Endpoint::bind(worker_bind).await?;
    let (client_endpoint, client_events) = Endpoint::bind(client_bind).await?;

    tracing::info!(
        "Broker up: workers on {}, clients on {}",
        worker_endpoint.local_addr(),
        client_endpoint.local_addr()
    );

    let owner = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    let adverts = vec![
        ServiceAdvert {
            service_type: worker_service_type(&name),
            port: worker_endpoint.local_addr().port(),
            owner: owner.clone(),
            project: name.clone(),
        },
        ServiceAdvert {
            service_type: client_service_type(&name),
            port: client_endpoint.local_addr().port(),
            owner,
            project: name.clone(),
        },
    ];

    let announcer = Announcer::new(catalog, adverts).await?;
    tokio::spawn(announcer.run());

    let broker = Broker::new(LIVENESS_TIMEOUT);
    chess_cluster::broker::broker::run(
        broker,
        worker_endpoint,
        worker_events,
        client_endpoint,
        client_events,
    )
    .await
}

async fn run_worker(name: String, catalog: String, engine: String) -> anyhow::Result<()> {
    let evaluator: Box<dyn Evaluate> = if engine == "material" {
        tracing::info!("Using the built-in material evaluator");
        Box::new(MaterialEvaluator)
    } else {
        Box::new(UciEvaluator::spawn(&engine).await?)
    };

    let agent = WorkerAgent::new(
        WorkerConfig {
            catalog,
            name,
            heartbeat_interval: HEARTBEAT_INTERVAL,
        },
        evaluator,
    );

    agent.run().await
}

/// Interactive play loop: the user enters moves in UCI notation and the
/// cluster answers for the other side.
async fn run_client(name: String, catalog: String, depth: u32) -> anyhow::Result<()> {
    let mut agent = ClientAgent::new(ClientConfig {
        catalog,
        name,
        heartbeat_interval: HEARTBEAT_INTERVAL,
    });

    let mut pos = Chess::default();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let fen = board::to_fen(&pos);
        stdout
            .write_all(format!("\nPosition: {}\nYour move (UCI): ", fen).as_bytes())
            .await?;
        stdout.flush().await?;

        let line = match stdin.next_line().await? {
            Some(line) => line,
            None => return Ok(()),
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" {
            return Ok(());
        }

        pos = match board::apply_uci(&pos, input) {
            Ok(next) => next,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        println!("Thinking at depth {}...", depth);
        let reply = agent.request_best_move(&board::to_fen(&pos), depth).await?;

        match reply.best_move {
            Some(best) => {
                println!("Cluster plays {} (score {})", best, reply.score);
                pos = board::apply_uci(&pos, &best)?;
            }
            None => {
                println!("No legal reply. Game over.");
                return Ok(());
            }
        }
    }
}
