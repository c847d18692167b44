use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use clap::Parser;
use greeterd::{
    agent::{Agent, AgentConfig, NoopAgent, TracingAgent},
    diagnostics::{AgentSettings, Diagnostics, DEFAULT_EXPLORE_PATH},
    function_service, webserver,
};
use regex::Regex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Greeting function custom handler
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// bind address
    #[arg(short = 'a', long, env = "GREETERD_ADDR", default_value_t = IpAddr::from([127, 0, 0, 1]))]
    addr: IpAddr,

    /// bind port, set by the functions host
    #[arg(short = 'p', long, env = "FUNCTIONS_CUSTOMHANDLER_PORT", default_value_t = 3000)]
    port: u16,

    /// function name, used for the default route and the transaction name
    #[arg(short = 'n', long, env = "GREETERD_FUNCTION_NAME", default_value = "fngreetings")]
    function_name: String,

    /// incoming path filters, defaults to `/api/<function-name>`
    #[arg(short = 'f', long)]
    filters: Vec<Regex>,

    /// log diagnostics on every invocation
    #[arg(short = 'd', long, env = "GREETERD_DIAGNOSTICS")]
    diagnostics: bool,

    /// directory listed by diagnostics
    #[arg(long, env = "GREETERD_EXPLORE_PATH", default_value = DEFAULT_EXPLORE_PATH)]
    explore_path: PathBuf,

    /// environment variables logged by diagnostics
    #[arg(long = "env-var", default_values = ["JAVA_OPTS", "NODE_OPTIONS"])]
    env_vars: Vec<String>,

    /// disable the monitoring agent
    #[arg(long, env = "GREETERD_NO_AGENT")]
    no_agent: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let agent: Arc<dyn Agent> = if args.no_agent {
        Arc::new(NoopAgent)
    } else {
        let config = AgentConfig::from_env();
        if config.is_empty() {
            warn!("No agent settings found in the environment");
        }
        Arc::new(TracingAgent::new(config))
    };

    let settings = AgentSettings::read(agent.as_ref());
    info!(
        function = %args.function_name,
        app_name = settings.app_name.as_deref().unwrap_or("<unset>"),
        "Starting function host"
    );

    let filters = if args.filters.is_empty() {
        vec![webserver::function_route(&args.function_name)?]
    } else {
        args.filters
    };

    let diagnostics = args
        .diagnostics
        .then(|| Diagnostics::new(agent.clone(), args.explore_path, args.env_vars));

    webserver::run(
        SocketAddr::new(args.addr, args.port),
        filters,
        function_service(agent, &args.function_name, diagnostics),
    )
    .await
}
