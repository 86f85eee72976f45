//! A token-gated gateway in front of two toy backends.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example gateway
//!
//! Try:
//!   curl -i http://localhost:3000/resource?x=1         # 401 token is empty
//!   curl -i http://localhost:3000/resource?token=abc   # 200, with x-gateway header
//!   curl -i http://localhost:3000/orders/7?token=abc   # 200
//!   curl -i http://localhost:3000/flaky?token=abc      # 503 via the error phase

use std::time::Instant;

use tollgate::filter::{self, Phase, Signal, TokenFilter};
use tollgate::{Config, Gateway, Method, Request, Response, Router, Server, Status};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    let router = Router::new()
        .on(Method::Get, "/resource",    resource)
        .on(Method::Get, "/orders/{id}", order)
        .on(Method::Get, "/flaky",       flaky);

    let started = Instant::now();
    let gateway = Gateway::new(router)
        .configure(&config)
        .filter(TokenFilter::from_config(&config))
        .filter(filter::from_fn("stamp", Phase::Post, 0, move |ctx| {
            let uptime = started.elapsed().as_secs().to_string();
            if let Some(res) = ctx.response_mut() {
                res.set_header("x-gateway", "tollgate");
                res.set_header("x-gateway-uptime", &uptime);
            }
            Ok(Signal::none())
        }))
        .filter(filter::from_fn("send-error", Phase::Error, 0, |ctx| {
            let reason = ctx.failure().map(ToString::to_string).unwrap_or_default();
            ctx.terminate(Status::ServiceUnavailable);
            ctx.write_body(&format!("backend unavailable: {reason}"))?;
            Ok(Signal::note("backend failure answered with 503"))
        }));

    if let Err(e) = Server::bind(config.addr.as_str()).serve(gateway).await {
        eprintln!("server error: {e}");
        std::process::exit(1);
    }
}

async fn resource(_req: Request) -> Response {
    Response::text("hello from the backend")
}

// GET /orders/{id}
async fn order(req: Request) -> Response {
    let id = req.param("id").unwrap_or("unknown");
    Response::json(format!(r#"{{"id":"{id}","status":"shipped"}}"#))
}

async fn flaky(_req: Request) -> Result<Response, std::io::Error> {
    Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "upstream reset"))
}
